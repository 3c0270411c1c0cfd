use bistro_auth_service::Identity;
use bistro_notification_service::NotificationKind;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::OrderError;
use crate::models::{Order, OrderStatus, StatusStamp};

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// The order state graph. Every status change is checked here.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;

        matches!(
            (self, next),
            (Created, AwaitingPayment)
                | (Created, Accepted)
                | (AwaitingPayment, Accepted)
                | (Accepted, InPrep)
                | (InPrep, Ready)
                | (Ready, Completed)
        ) || (next == Cancelled && !self.is_terminal())
    }

    /// Accepted or any later state reached through acceptance.
    pub fn is_paid_or_later(&self) -> bool {
        matches!(
            self,
            OrderStatus::Accepted | OrderStatus::InPrep | OrderStatus::Ready | OrderStatus::Completed
        )
    }

    pub fn notification_kind(&self) -> Option<NotificationKind> {
        match self {
            OrderStatus::Accepted => Some(NotificationKind::OrderAccepted),
            OrderStatus::InPrep => Some(NotificationKind::OrderInPrep),
            OrderStatus::Ready => Some(NotificationKind::OrderReady),
            OrderStatus::Completed => Some(NotificationKind::OrderCompleted),
            OrderStatus::Cancelled => Some(NotificationKind::OrderCancelled),
            OrderStatus::Created | OrderStatus::AwaitingPayment => None,
        }
    }
}

/// Who is asking for a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Customer(Uuid),
    Staff(Uuid),
    PaymentProvider,
}

impl Actor {
    pub fn from_identity(identity: &Identity) -> Self {
        if identity.is_staff() {
            Actor::Staff(identity.user_id)
        } else {
            Actor::Customer(identity.user_id)
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Actor::Customer(_) => "customer",
            Actor::Staff(_) => "staff",
            Actor::PaymentProvider => "payment_provider",
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Actor::Customer(id) | Actor::Staff(id) => Some(*id),
            Actor::PaymentProvider => None,
        }
    }
}

/// Checks the state graph first, then whether `actor` may drive the edge.
pub fn authorize(order: &Order, next: OrderStatus, actor: &Actor) -> Result<(), OrderError> {
    let current = order.status;
    if !current.can_transition_to(next) {
        return Err(OrderError::InvalidTransition {
            from: current,
            to: next,
        });
    }

    let allowed = match actor {
        // Payment confirmation is the only way out of AWAITING_PAYMENT into
        // ACCEPTED.
        Actor::Staff(_) => !(current == OrderStatus::AwaitingPayment && next == OrderStatus::Accepted),
        Actor::Customer(id) => {
            *id == order.customer_id
                && next == OrderStatus::Cancelled
                && matches!(current, OrderStatus::Created | OrderStatus::AwaitingPayment)
        }
        Actor::PaymentProvider => matches!(
            (current, next),
            (OrderStatus::Created, OrderStatus::AwaitingPayment)
                | (OrderStatus::AwaitingPayment, OrderStatus::Accepted)
                | (OrderStatus::Created, OrderStatus::Cancelled)
                | (OrderStatus::AwaitingPayment, OrderStatus::Cancelled)
        ),
    };

    if allowed {
        Ok(())
    } else {
        Err(OrderError::Forbidden)
    }
}

/// Columns to write when moving into `next` at `now`.
pub fn stamp_for(
    next: OrderStatus,
    now: DateTime<Utc>,
    reason: Option<String>,
    payment_reference: Option<String>,
) -> StatusStamp {
    StatusStamp {
        status: next,
        updated_at: now,
        accepted_at: (next == OrderStatus::Accepted).then_some(now),
        ready_at: (next == OrderStatus::Ready).then_some(now),
        completed_at: (next == OrderStatus::Completed).then_some(now),
        cancelled_at: (next == OrderStatus::Cancelled).then_some(now),
        cancel_reason: if next == OrderStatus::Cancelled {
            Some(reason.unwrap_or_else(|| "cancelled".to_string()))
        } else {
            None
        },
        payment_reference,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderType;
    use crate::models::OrderStatus::*;

    const ALL: [OrderStatus; 7] = [
        Created,
        AwaitingPayment,
        Accepted,
        InPrep,
        Ready,
        Completed,
        Cancelled,
    ];

    fn order(status: OrderStatus, customer_id: Uuid) -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            customer_id,
            customer_phone: None,
            order_type: OrderType::Pickup,
            status,
            subtotal: 1000,
            delivery_fee: 0,
            service_fee: 0,
            discount: 0,
            total: 1000,
            promo_code: None,
            payment_reference: None,
            notes: None,
            delivery_address: None,
            table_number: None,
            cancel_reason: None,
            placed_at: now,
            accepted_at: None,
            ready_at: None,
            completed_at: None,
            cancelled_at: None,
            updated_at: now,
        }
    }

    #[test]
    fn test_transition_table() {
        let allowed: Vec<(OrderStatus, OrderStatus)> = ALL
            .iter()
            .flat_map(|from| ALL.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .collect();

        assert_eq!(
            allowed,
            vec![
                (Created, AwaitingPayment),
                (Created, Accepted),
                (Created, Cancelled),
                (AwaitingPayment, Accepted),
                (AwaitingPayment, Cancelled),
                (Accepted, InPrep),
                (Accepted, Cancelled),
                (InPrep, Ready),
                (InPrep, Cancelled),
                (Ready, Completed),
                (Ready, Cancelled),
            ]
        );
        assert!(!Created.can_transition_to(Completed));
        assert!(!Ready.can_transition_to(Created));
    }

    #[test]
    fn test_staff_cannot_confirm_payment() {
        let staff = Actor::Staff(Uuid::new_v4());

        assert!(authorize(&order(Created, Uuid::new_v4()), Accepted, &staff).is_ok());
        assert!(matches!(
            authorize(&order(AwaitingPayment, Uuid::new_v4()), Accepted, &staff),
            Err(OrderError::Forbidden)
        ));
        assert!(authorize(&order(AwaitingPayment, Uuid::new_v4()), Accepted, &Actor::PaymentProvider).is_ok());
    }

    #[test]
    fn test_customer_may_only_cancel_own_unpaid_order() {
        let customer_id = Uuid::new_v4();
        let customer = Actor::Customer(customer_id);

        assert!(authorize(&order(Created, customer_id), Cancelled, &customer).is_ok());
        assert!(authorize(&order(AwaitingPayment, customer_id), Cancelled, &customer).is_ok());
        assert!(matches!(
            authorize(&order(Accepted, customer_id), Cancelled, &customer),
            Err(OrderError::Forbidden)
        ));
        assert!(matches!(
            authorize(&order(Created, Uuid::new_v4()), Cancelled, &customer),
            Err(OrderError::Forbidden)
        ));
        assert!(matches!(
            authorize(&order(Created, customer_id), Accepted, &customer),
            Err(OrderError::Forbidden)
        ));
    }

    #[test]
    fn test_illegal_edge_is_reported_before_role() {
        let result = authorize(&order(Ready, Uuid::new_v4()), Created, &Actor::Staff(Uuid::new_v4()));

        assert!(matches!(
            result,
            Err(OrderError::InvalidTransition { from: Ready, to: Created })
        ));
    }

    #[test]
    fn test_stamp_sets_matching_timestamp() {
        let now = Utc::now();

        let ready = stamp_for(Ready, now, None, None);
        assert_eq!(ready.ready_at, Some(now));
        assert_eq!(ready.accepted_at, None);

        let cancelled = stamp_for(Cancelled, now, Some("payment_failed".to_string()), None);
        assert_eq!(cancelled.cancelled_at, Some(now));
        assert_eq!(cancelled.cancel_reason.as_deref(), Some("payment_failed"));
    }
}
