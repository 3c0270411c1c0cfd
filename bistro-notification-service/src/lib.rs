use diesel_migrations::{embed_migrations, EmbeddedMigrations};

pub mod dispatch;
pub mod models;
pub mod schema;
pub mod sender;
pub mod store;

pub use dispatch::{DispatchOutcome, Dispatcher, Notification};
pub use models::{NotificationChannel, NotificationKind, NotificationRecord, NotificationStatus};
pub use sender::{LogOnlySender, MessageSender, RecordingSender, SendError, SendReceipt};
pub use store::{MemoryNotificationLog, NotificationLog, PgNotificationLog};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");
