use std::sync::Arc;
use std::time::Duration;

use bistro_auth_service::{Authenticator, OtpPolicy, OtpService, PgUserStore, TokenIssuer, UserStore};
use bistro_common::DbPool;
use bistro_notification_service::{Dispatcher, MessageSender, NotificationLog, PgNotificationLog};
use bistro_order_service::{OrderService, OrderStore, PgOrderStore, ReminderPolicy, WebhookVerifier};
use bistro_restaurant_service::{
    Cache, CatalogStore, FileCache, MemoryCache, MenuCatalog, MenuDocument, PgCatalogStore,
    PgSettingStore, SettingStore, Settings, SettingsService,
};
use chrono::TimeDelta;

use crate::config::Config;

/// Persistence behind every service.
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub catalog: Arc<dyn CatalogStore>,
    pub settings: Arc<dyn SettingStore>,
    pub orders: Arc<dyn OrderStore>,
    pub notifications: Arc<dyn NotificationLog>,
}

impl Stores {
    pub fn postgres(pool: DbPool) -> Self {
        Self {
            users: Arc::new(PgUserStore::new(pool.clone())),
            catalog: Arc::new(PgCatalogStore::new(pool.clone())),
            settings: Arc::new(PgSettingStore::new(pool.clone())),
            orders: Arc::new(PgOrderStore::new(pool.clone())),
            notifications: Arc::new(PgNotificationLog::new(pool)),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub authenticator: Arc<Authenticator>,
    pub otp: Arc<OtpService>,
    pub catalog: Arc<MenuCatalog>,
    pub settings: Arc<SettingsService>,
    pub orders: Arc<OrderService>,
    pub webhooks: Arc<WebhookVerifier>,
    pub reminders: ReminderPolicy,
    pub debug: bool,
}

impl AppState {
    /// Wires the services over `stores`; the menu is cached in the file at
    /// `config.menu_cache_path`.
    pub fn new(config: &Config, stores: Stores, sender: Arc<dyn MessageSender>) -> Self {
        let menu_cache: Arc<dyn Cache<MenuDocument>> = Arc::new(FileCache::new(
            &config.menu_cache_path,
            Duration::from_secs(config.menu_cache_ttl_seconds),
        ));
        Self::with_menu_cache(config, stores, sender, menu_cache)
    }

    pub fn with_menu_cache(
        config: &Config,
        stores: Stores,
        sender: Arc<dyn MessageSender>,
        menu_cache: Arc<dyn Cache<MenuDocument>>,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(
            sender,
            stores.notifications.clone(),
            Duration::from_millis(config.notification_timeout_ms),
        ));
        let issuer = Arc::new(TokenIssuer::new(
            config.jwt_secret.as_bytes(),
            TimeDelta::seconds(config.token_ttl_seconds),
        ));
        let catalog = Arc::new(MenuCatalog::new(stores.catalog, menu_cache));
        let settings = Arc::new(SettingsService::new(
            stores.settings,
            Arc::new(MemoryCache::<Settings>::new(Duration::from_secs(
                config.settings_cache_ttl_seconds,
            ))),
        ));

        Self {
            authenticator: Arc::new(Authenticator::new(issuer.clone(), stores.users.clone())),
            otp: Arc::new(OtpService::new(
                stores.users,
                issuer,
                dispatcher.clone(),
                OtpPolicy {
                    country_code: config.phone_country_code.clone(),
                    ..OtpPolicy::default()
                },
            )),
            orders: Arc::new(OrderService::new(
                stores.orders,
                catalog.clone(),
                settings.clone(),
                dispatcher,
                stores.notifications,
            )),
            catalog,
            settings,
            webhooks: Arc::new(WebhookVerifier::new(
                &config.webhook_secret,
                TimeDelta::seconds(config.webhook_tolerance_seconds),
            )),
            reminders: ReminderPolicy {
                ready_for: TimeDelta::minutes(config.pickup_reminder_after_minutes),
                dedup_window: TimeDelta::minutes(config.pickup_reminder_window_minutes),
            },
            debug: config.debug,
        }
    }
}
