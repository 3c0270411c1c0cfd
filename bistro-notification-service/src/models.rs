use std::io::Write;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::{
    deserialize::{self, FromSql, FromSqlRow},
    expression::AsExpression,
    pg::{Pg, PgValue},
    prelude::*,
    serialize::{self, IsNull, Output, ToSql},
    sql_types::Text,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::notifications;

/// Declares an enum persisted as a lower snake case `TEXT` column.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $value:literal),+ $(,)? }) => {
        #[derive(
            FromSqlRow, AsExpression, Serialize, Deserialize, PartialEq, Eq, Hash, Copy, Clone, Debug,
        )]
        #[diesel(sql_type = Text)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $value),+
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($value => Ok($name::$variant),)+
                    other => Err(format!("Unrecognized {} `{}`", stringify!($name), other)),
                }
            }
        }

        impl ToSql<Text, Pg> for $name {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                out.write_all(self.as_str().as_bytes())?;
                Ok(IsNull::No)
            }
        }

        impl FromSql<Text, Pg> for $name {
            fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
                Ok(std::str::from_utf8(bytes.as_bytes())?.parse::<$name>()?)
            }
        }
    };
}

text_enum!(NotificationKind {
    Otp => "otp",
    OrderPlaced => "order_placed",
    OrderAccepted => "order_accepted",
    OrderInPrep => "order_in_prep",
    OrderReady => "order_ready",
    OrderCompleted => "order_completed",
    OrderCancelled => "order_cancelled",
    PickupReminder => "pickup_reminder",
});

text_enum!(NotificationChannel {
    Sms => "sms",
    Push => "push",
    Log => "log",
});

text_enum!(NotificationStatus {
    Sent => "sent",
    Failed => "failed",
    Logged => "logged",
});

#[derive(Queryable, Selectable, Insertable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = notifications)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub channel: NotificationChannel,
    pub recipient: Option<String>,
    pub body: String,
    pub reference_id: Option<Uuid>,
    pub status: NotificationStatus,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_its_column_text() {
        for kind in [
            NotificationKind::Otp,
            NotificationKind::OrderReady,
            NotificationKind::PickupReminder,
        ] {
            assert_eq!(kind.as_str().parse::<NotificationKind>(), Ok(kind));
        }
        assert!("pickup".parse::<NotificationKind>().is_err());
    }
}
