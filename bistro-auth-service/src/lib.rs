use diesel_migrations::{embed_migrations, EmbeddedMigrations};

pub mod identity;
pub mod models;
pub mod otp;
pub mod schema;
pub mod store;
pub mod token;

pub use identity::{require_any_role, require_role, AuthError, Authenticator, Identity};
pub use models::{Role, User};
pub use otp::{OtpError, OtpPolicy, OtpService};
pub use store::{MemoryUserStore, PgUserStore, UserStore};
pub use token::{Claims, IssuedToken, TokenError, TokenIssuer};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");
