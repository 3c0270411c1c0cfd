use diesel_migrations::{embed_migrations, EmbeddedMigrations};

pub mod cache;
pub mod catalog;
pub mod models;
pub mod schema;
pub mod settings;
pub mod store;

pub use cache::{Cache, FileCache, MemoryCache};
pub use catalog::{CatalogError, ItemDetails, MenuCatalog, MenuDocument, MenuItemView};
pub use settings::{BusinessHours, DayHours, PublicSettings, SettingKey, Settings, SettingsError, SettingsService};
pub use store::{CatalogSnapshot, CatalogStore, MemoryCatalogStore, MemorySettingStore, PgCatalogStore, PgSettingStore, SettingStore};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");
