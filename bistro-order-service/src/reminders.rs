use bistro_notification_service::{Notification, NotificationKind};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use crate::error::OrderError;
use crate::models::Order;
use crate::service::OrderService;

#[derive(Debug, Clone, Copy)]
pub struct ReminderPolicy {
    /// How long a pickup order sits in READY before the customer is nudged.
    pub ready_for: TimeDelta,
    /// No second reminder for the same order inside this window.
    pub dedup_window: TimeDelta,
}

impl Default for ReminderPolicy {
    fn default() -> Self {
        Self {
            ready_for: TimeDelta::minutes(20),
            dedup_window: TimeDelta::minutes(30),
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepSummary {
    pub candidates: usize,
    pub sent: usize,
    pub failed: usize,
}

impl OrderService {
    /// Pickup orders READY for at least `ready_for` with no pickup reminder
    /// recorded within `dedup_window`.
    pub async fn find_stale_pickup_ready(
        &self,
        now: DateTime<Utc>,
        ready_for: TimeDelta,
        dedup_window: TimeDelta,
    ) -> Result<Vec<Order>, OrderError> {
        let candidates = self.store.ready_pickups_before(now - ready_for).await?;
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let ids: Vec<_> = candidates.iter().map(|order| order.id).collect();
        let reminded = self
            .notifications
            .referenced_since(NotificationKind::PickupReminder, &ids, now - dedup_window)
            .await?;
        Ok(candidates
            .into_iter()
            .filter(|order| !reminded.contains(&order.id))
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn run_pickup_reminders(
        &self,
        now: DateTime<Utc>,
        policy: ReminderPolicy,
    ) -> Result<SweepSummary, OrderError> {
        let stale = self
            .find_stale_pickup_ready(now, policy.ready_for, policy.dedup_window)
            .await?;
        let settings = self.restaurant_settings().await;

        let mut summary = SweepSummary {
            candidates: stale.len(),
            ..SweepSummary::default()
        };
        for order in &stale {
            let outcome = self
                .dispatcher
                .dispatch(Notification {
                    kind: NotificationKind::PickupReminder,
                    recipient: order.customer_phone.clone(),
                    body: format!(
                        "{}: order {} is still waiting for you at the counter.",
                        settings.restaurant_name,
                        order.reference()
                    ),
                    reference_id: Some(order.id),
                })
                .await;
            if outcome.success {
                summary.sent += 1;
            } else {
                summary.failed += 1;
            }
        }

        info!(
            candidates = summary.candidates,
            sent = summary.sent,
            failed = summary.failed,
            "pickup reminder sweep finished"
        );
        Ok(summary)
    }
}
