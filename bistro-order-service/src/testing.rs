use std::sync::Arc;
use std::time::Duration;

use bistro_auth_service::{Identity, Role};
use bistro_notification_service::{Dispatcher, MemoryNotificationLog, RecordingSender};
use bistro_restaurant_service::models::{Category, MenuItem, Modifier, ModifierGroup};
use bistro_restaurant_service::{
    CatalogSnapshot, MemoryCache, MemoryCatalogStore, MemorySettingStore, MenuCatalog,
    MenuDocument, Settings, SettingsService,
};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::models::{DiscountType, OrderType, PromoCode};
use crate::pricing::CartLine;
use crate::service::{Cart, OrderService};
use crate::store::MemoryOrderStore;

pub(crate) const CUSTOMER_PHONE: &str = "+27820000001";
pub(crate) const STAFF_PHONE: &str = "+27829999999";

pub(crate) struct Fixture {
    pub service: OrderService,
    pub store: Arc<MemoryOrderStore>,
    pub catalog: Arc<MenuCatalog>,
    pub settings: Arc<SettingsService>,
    pub sender: Arc<RecordingSender>,
    pub dispatcher: Arc<Dispatcher>,
    pub log: Arc<MemoryNotificationLog>,
    pub burger: Uuid,
    pub cheese: Uuid,
    pub fries: Uuid,
}

/// Monday 10:00 UTC, inside the default opening hours.
pub(crate) fn open_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap()
}

pub(crate) fn identity(role: Role) -> Identity {
    Identity {
        user_id: Uuid::new_v4(),
        role,
        token_id: Uuid::new_v4().to_string(),
        expires_at: Utc::now(),
    }
}

pub(crate) fn line(menu_item_id: Uuid, quantity: i32, modifier_ids: Vec<Uuid>) -> CartLine {
    CartLine {
        menu_item_id,
        quantity,
        modifier_ids,
    }
}

pub(crate) fn pickup(items: Vec<CartLine>) -> Cart {
    Cart {
        order_type: OrderType::Pickup,
        items,
        promo_code: None,
        notes: None,
        delivery_address: None,
        table_number: None,
    }
}

pub(crate) fn promo(code: &str, discount_type: DiscountType, value: i64) -> PromoCode {
    PromoCode {
        code: code.to_string(),
        description: None,
        discount_type,
        value,
        minimum_order: 0,
        usage_limit: None,
        usage_count: 0,
        starts_at: None,
        ends_at: None,
        is_active: true,
        created_at: open_time(),
    }
}

pub(crate) fn fixture() -> Fixture {
    let category_id = Uuid::new_v4();
    let burger = Uuid::new_v4();
    let fries = Uuid::new_v4();
    let extras = Uuid::new_v4();
    let cheese = Uuid::new_v4();
    let item = |id: Uuid, name: &str, price: i64, is_available: bool| MenuItem {
        id,
        category_id,
        name: name.to_string(),
        description: None,
        price,
        image_url: None,
        is_active: true,
        is_available,
        sort_order: 0,
        updated_at: open_time(),
    };
    let snapshot = CatalogSnapshot {
        categories: vec![Category {
            id: category_id,
            name: "Mains".to_string(),
            description: None,
            sort_order: 0,
            is_active: true,
        }],
        items: vec![
            item(burger, "Burger", 5000, true),
            item(fries, "Fries", 1500, false),
        ],
        groups: vec![ModifierGroup {
            id: extras,
            menu_item_id: burger,
            name: "Extras".to_string(),
            min_select: 0,
            max_select: 2,
            is_required: false,
            sort_order: 0,
        }],
        modifiers: vec![Modifier {
            id: cheese,
            group_id: extras,
            name: "Cheese".to_string(),
            price_delta: 500,
            is_active: true,
            sort_order: 0,
        }],
        specials: vec![],
    };

    let store = Arc::new(MemoryOrderStore::new());
    let catalog = Arc::new(MenuCatalog::new(
        Arc::new(MemoryCatalogStore::new(snapshot)),
        Arc::new(MemoryCache::<MenuDocument>::new(Duration::from_secs(60))),
    ));
    let settings = Arc::new(SettingsService::new(
        Arc::new(MemorySettingStore::new()),
        Arc::new(MemoryCache::<Settings>::new(Duration::from_secs(60))),
    ));
    let sender = Arc::new(RecordingSender::new());
    let log = Arc::new(MemoryNotificationLog::new());
    let dispatcher = Arc::new(Dispatcher::new(
        sender.clone(),
        log.clone(),
        Duration::from_secs(1),
    ));

    Fixture {
        service: OrderService::new(
            store.clone(),
            catalog.clone(),
            settings.clone(),
            dispatcher.clone(),
            log.clone(),
        ),
        store,
        catalog,
        settings,
        sender,
        dispatcher,
        log,
        burger,
        cheese,
        fries,
    }
}

impl Fixture {
    pub async fn set(&self, key: &str, value: serde_json::Value) {
        self.settings.update(key, value, open_time()).await.unwrap();
    }

    pub async fn require_online_payment(&self) {
        self.set("online_payment_required", json!(true)).await;
    }
}
