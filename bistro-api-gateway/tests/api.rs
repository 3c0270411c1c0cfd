use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use bistro_api_gateway::{app, AppState, Config, Stores};
use bistro_auth_service::{MemoryUserStore, Role, User};
use bistro_notification_service::{MemoryNotificationLog, RecordingSender};
use bistro_order_service::{DiscountType, MemoryOrderStore, PromoCode};
use async_trait::async_trait;
use bistro_common::StoreError;
use bistro_restaurant_service::models::{Category, MenuItem, Modifier, ModifierGroup, SettingRow};
use bistro_restaurant_service::{
    CatalogSnapshot, MemoryCache, MemoryCatalogStore, MemorySettingStore, MenuDocument,
    SettingStore,
};
use chrono::{Timelike, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

const CUSTOMER_PHONE: &str = "+27820000001";

struct Harness {
    app: Router,
    state: AppState,
    users: Arc<MemoryUserStore>,
    orders: Arc<MemoryOrderStore>,
    sender: Arc<RecordingSender>,
    burger: Uuid,
    cheese: Uuid,
}

fn snapshot(burger: Uuid, cheese: Uuid) -> CatalogSnapshot {
    let category_id = Uuid::new_v4();
    let extras = Uuid::new_v4();
    let now = Utc::now();
    CatalogSnapshot {
        categories: vec![Category {
            id: category_id,
            name: "Mains".to_string(),
            description: None,
            sort_order: 0,
            is_active: true,
        }],
        items: vec![MenuItem {
            id: burger,
            category_id,
            name: "Burger".to_string(),
            description: None,
            price: 5000,
            image_url: None,
            is_active: true,
            is_available: true,
            sort_order: 0,
            updated_at: now,
        }],
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
    }
}

impl Harness {
    async fn new() -> Self {
        let burger = Uuid::new_v4();
        let cheese = Uuid::new_v4();
        let users = Arc::new(MemoryUserStore::new());
        let orders = Arc::new(MemoryOrderStore::new());
        let sender = Arc::new(RecordingSender::new());
        let stores = Stores {
            users: users.clone(),
            catalog: Arc::new(MemoryCatalogStore::new(snapshot(burger, cheese))),
            settings: Arc::new(MemorySettingStore::new()),
            orders: orders.clone(),
            notifications: Arc::new(MemoryNotificationLog::new()),
        };
        let config = Config::with_secrets("postgres://unused", "test-jwt-secret", "whsec_dGVzdC13ZWJob29r");
        let state = AppState::with_menu_cache(
            &config,
            stores,
            sender.clone(),
            Arc::new(MemoryCache::<MenuDocument>::new(Duration::from_secs(60))),
        );

        // Shift the restaurant's clock so it is always around local noon.
        let now = Utc::now();
        let utc_minute = i64::from(now.hour() * 60 + now.minute());
        state
            .settings
            .update("utc_offset_minutes", json!(720 - utc_minute), now)
            .await
            .unwrap();

        Harness {
            app: app(state.clone()),
            state,
            users,
            orders,
            sender,
            burger,
            cheese,
        }
    }

    async fn token_for(&self, role: Role, phone: &str) -> String {
        let mut user = User::customer(phone, Utc::now());
        user.role = role;
        self.users.insert_user(user.clone()).await;
        self.state
            .authenticator
            .issuer()
            .issue_default(user.id, role)
            .unwrap()
            .access_token
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(request(Method::GET, uri, token, None)).await
    }

    async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(request(Method::POST, uri, token, Some(body))).await
    }

    async fn place_burger_order(&self, token: &str, promo_code: Option<&str>) -> Value {
        let (status, body) = self
            .post(
                "/orders",
                Some(token),
                json!({
                    "order_type": "pickup",
                    "items": [{ "menu_item_id": self.burger, "quantity": 2, "modifier_ids": [self.cheese] }],
                    "promo_code": promo_code,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["data"].clone()
    }

    async fn send_webhook(&self, id: &str, body: &Value, signature: Option<String>) -> (StatusCode, Value) {
        let raw = body.to_string();
        let timestamp = Utc::now().timestamp();
        let signature = match signature {
            Some(signature) => signature,
            None => self.state.webhooks.sign(id, timestamp, raw.as_bytes()).unwrap(),
        };
        let request = Request::builder()
            .method(Method::POST)
            .uri("/webhooks/paystack")
            .header(header::CONTENT_TYPE, "application/json")
            .header("webhook-id", id)
            .header("webhook-timestamp", timestamp.to_string())
            .header("webhook-signature", signature)
            .body(Body::from(raw))
            .unwrap();
        self.send(request).await
    }
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn save10() -> PromoCode {
    PromoCode {
        code: "SAVE10".to_string(),
        description: Some("10% off".to_string()),
        discount_type: DiscountType::Percentage,
        value: 10,
        minimum_order: 0,
        usage_limit: None,
        usage_count: 0,
        starts_at: None,
        ends_at: None,
        is_active: true,
        created_at: Utc::now(),
    }
}

fn code_from(message: &str) -> String {
    message
        .split_whitespace()
        .map(|word| word.trim_end_matches('.'))
        .find(|word| word.len() == 6 && word.chars().all(|c| c.is_ascii_digit()))
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_health() {
    let h = Harness::new().await;

    let (status, body) = h.get("/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "data": { "status": "ok" } }));
}

#[tokio::test]
async fn test_menu_and_unknown_item() {
    let h = Harness::new().await;

    let (status, menu) = h.get("/menu", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(menu["data"].to_string().contains("Burger"));

    let (status, item) = h.get(&format!("/menu/items/{}", h.burger), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(item["data"]["price"], 5000);

    let (status, missing) = h.get(&format!("/menu/items/{}", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(missing["success"], false);
    assert_eq!(missing["error"]["code"], "not_found");

    let (status, bad) = h.get("/menu/items/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(bad["error"]["code"], "invalid_path");
}

#[tokio::test]
async fn test_public_settings_hide_staff_fields() {
    let h = Harness::new().await;
    let manager = h.token_for(Role::Manager, "+27825550000").await;
    let (status, _) = h
        .send(request(
            Method::PUT,
            "/admin/settings/staff_alert_phone",
            Some(&manager),
            Some(json!({ "value": "+27829999999" })),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = h.get("/settings", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["accepting_orders"], true);
    assert!(body["data"].get("staff_alert_phone").is_none());
}

#[tokio::test]
async fn test_otp_login_me_and_logout() {
    let h = Harness::new().await;

    let (status, requested) = h
        .post("/auth/otp/request", None, json!({ "phone": "082 000 0001" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(requested["data"]["phone"], CUSTOMER_PHONE);

    let code = code_from(&h.sender.last_message_to(CUSTOMER_PHONE).unwrap());
    let (status, session) = h
        .post(
            "/auth/otp/verify",
            None,
            json!({ "phone": "0820000001", "code": code }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["data"]["is_new_user"], true);
    assert_eq!(session["data"]["user"]["role"], "customer");
    let token = session["data"]["access_token"].as_str().unwrap().to_string();

    let (status, me) = h.get("/auth/me", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["data"]["phone"], CUSTOMER_PHONE);

    let (status, _) = h.post("/auth/logout", Some(&token), json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, after) = h.get("/auth/me", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(after["error"]["code"], "unauthenticated");
}

#[tokio::test]
async fn test_wrong_code_is_unauthenticated() {
    let h = Harness::new().await;
    h.post("/auth/otp/request", None, json!({ "phone": CUSTOMER_PHONE }))
        .await;
    let code = code_from(&h.sender.last_message_to(CUSTOMER_PHONE).unwrap());
    let wrong = if code == "000000" { "111111" } else { "000000" };

    let (status, body) = h
        .post(
            "/auth/otp/verify",
            None,
            json!({ "phone": CUSTOMER_PHONE, "code": wrong }),
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_place_order_with_promo() {
    let h = Harness::new().await;
    h.orders.insert_promo(save10()).await;
    let customer = h.token_for(Role::Customer, CUSTOMER_PHONE).await;

    let order = h.place_burger_order(&customer, Some("save10")).await;

    assert_eq!(order["subtotal"], 11000);
    assert_eq!(order["discount"], 1100);
    assert_eq!(order["total"], 9900);
    assert_eq!(order["status"], "CREATED");
    assert_eq!(order["items"][0]["unit_price"], 5000);
    assert_eq!(order["items"][0]["modifiers"][0]["name"], "Cheese");
    assert!(h
        .sender
        .last_message_to(CUSTOMER_PHONE)
        .unwrap()
        .contains("99.00"));

    let (status, list) = h.get("/orders", Some(&customer)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["data"]["orders"].as_array().unwrap().len(), 1);
    assert!(list["data"]["orders"][0].get("items").is_none());
}

#[tokio::test]
async fn test_order_requires_token() {
    let h = Harness::new().await;

    let (status, body) = h
        .post("/orders", None, json!({ "order_type": "pickup", "items": [] }))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthenticated");
}

#[tokio::test]
async fn test_cart_rejections_use_envelope() {
    let h = Harness::new().await;
    let customer = h.token_for(Role::Customer, CUSTOMER_PHONE).await;

    let (status, body) = h
        .post(
            "/orders",
            Some(&customer),
            json!({ "order_type": "pickup", "items": [] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "empty_cart");

    let (status, body) = h
        .post(
            "/orders",
            Some(&customer),
            json!({ "order_type": "drone", "items": [] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_order_type");

    let (status, body) = h.post("/orders", Some(&customer), json!({ "items": 3 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_body");
}

#[tokio::test]
async fn test_validate_promo() {
    let h = Harness::new().await;
    h.orders.insert_promo(save10()).await;

    let (status, body) = h
        .post("/promo/validate", None, json!({ "code": "Save10", "subtotal": 11000 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["discount"], 1100);
    assert_eq!(body["data"]["discount_type"], "percentage");

    let (status, body) = h
        .post("/promo/validate", None, json!({ "code": "NOPE" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_other_customers_order_is_not_found() {
    let h = Harness::new().await;
    let owner = h.token_for(Role::Customer, CUSTOMER_PHONE).await;
    let other = h.token_for(Role::Customer, "+27820000002").await;
    let order = h.place_burger_order(&owner, None).await;
    let uri = format!("/orders/{}", order["id"].as_str().unwrap());

    let (status, _) = h.get(&uri, Some(&other)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = h.get(&uri, Some(&owner)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], order["id"]);
}

#[tokio::test]
async fn test_kitchen_flow_and_history() {
    let h = Harness::new().await;
    let customer = h.token_for(Role::Customer, CUSTOMER_PHONE).await;
    let staff = h.token_for(Role::Staff, "+27825550001").await;
    let order = h.place_burger_order(&customer, None).await;
    let id = order["id"].as_str().unwrap();
    let status_uri = format!("/admin/orders/{id}/status");

    let (status, body) = h
        .post(&status_uri, Some(&customer), json!({ "status": "ACCEPTED" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");

    for next in ["ACCEPTED", "IN_PREP", "READY"] {
        let (status, body) = h
            .post(&status_uri, Some(&staff), json!({ "status": next }))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["status"], next);
    }

    let (status, body) = h
        .post(&status_uri, Some(&staff), json!({ "status": "IN_PREP" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "invalid_transition");

    let (status, body) = h
        .post(&status_uri, Some(&staff), json!({ "status": "EATEN" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_status");

    let (status, history) = h
        .get(&format!("/orders/{id}/history"), Some(&customer))
        .await;
    assert_eq!(status, StatusCode::OK);
    let steps: Vec<_> = history["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|change| change["to_status"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(steps, ["CREATED", "ACCEPTED", "IN_PREP", "READY"]);
    assert!(h
        .sender
        .last_message_to(CUSTOMER_PHONE)
        .unwrap()
        .contains("ready for collection"));
}

#[tokio::test]
async fn test_customer_cancel() {
    let h = Harness::new().await;
    let customer = h.token_for(Role::Customer, CUSTOMER_PHONE).await;
    let order = h.place_burger_order(&customer, None).await;
    let uri = format!("/orders/{}/cancel", order["id"].as_str().unwrap());

    let (status, body) = h
        .send(request(Method::POST, &uri, Some(&customer), None))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "CANCELLED");
    assert_eq!(body["data"]["cancel_reason"], "cancelled");

    let (status, _) = h
        .post(&uri, Some(&customer), json!({ "reason": "changed my mind" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_menu_item_update_reaches_menu_and_orders() {
    let h = Harness::new().await;
    let staff = h.token_for(Role::Staff, "+27825550001").await;
    let customer = h.token_for(Role::Customer, CUSTOMER_PHONE).await;
    let uri = format!("/admin/menu/items/{}", h.burger);

    let (status, _) = h
        .send(request(Method::PATCH, &uri, Some(&customer), Some(json!({ "price": 1 }))))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = h
        .send(request(Method::PATCH, &uri, Some(&staff), Some(json!({}))))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "empty_update");

    h.get("/menu", None).await;
    let (status, _) = h
        .send(request(
            Method::PATCH,
            &uri,
            Some(&staff),
            Some(json!({ "is_available": false })),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, item) = h.get(&format!("/menu/items/{}", h.burger), None).await;
    assert_eq!(item["data"]["is_available"], false);

    let (status, body) = h
        .post(
            "/orders",
            Some(&customer),
            json!({ "order_type": "pickup", "items": [{ "menu_item_id": h.burger, "quantity": 1 }] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "item_unavailable");
}

#[tokio::test]
async fn test_settings_update_roles_and_validation() {
    let h = Harness::new().await;
    let staff = h.token_for(Role::Staff, "+27825550001").await;
    let manager = h.token_for(Role::Manager, "+27825550002").await;
    let put = |token: &str, key: &str, value: Value| {
        request(
            Method::PUT,
            &format!("/admin/settings/{key}"),
            Some(token),
            Some(json!({ "value": value })),
        )
    };

    let (status, _) = h.send(put(&staff, "minimum_order", json!(2000))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = h.send(put(&manager, "minimum_order", json!(-5))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_setting");

    let (status, _) = h.send(put(&manager, "favourite_colour", json!("red"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = h.send(put(&manager, "minimum_order", json!(20000))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["minimum_order"], 20000);

    let (_, public) = h.get("/settings", None).await;
    assert_eq!(public["data"]["minimum_order"], 20000);
}

#[tokio::test]
async fn test_payment_webhook_accepts_order_once() {
    let h = Harness::new().await;
    let manager = h.token_for(Role::Manager, "+27825550002").await;
    h.send(request(
        Method::PUT,
        "/admin/settings/online_payment_required",
        Some(&manager),
        Some(json!({ "value": true })),
    ))
    .await;
    let customer = h.token_for(Role::Customer, CUSTOMER_PHONE).await;
    let order = h.place_burger_order(&customer, None).await;
    assert_eq!(order["status"], "AWAITING_PAYMENT");

    let event = json!({
        "id": "evt_1",
        "type": "payment.succeeded",
        "payload": { "id": "pay_1", "amount": 11000, "currency": "ZAR", "metadata": { "orderId": order["id"] } },
    });

    let (status, body) = h.send_webhook("msg_1", &event, None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["outcome"], "accepted");

    let (status, body) = h.send_webhook("msg_1", &event, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"], "duplicate");

    let (_, stored) = h
        .get(&format!("/orders/{}", order["id"].as_str().unwrap()), Some(&customer))
        .await;
    assert_eq!(stored["data"]["status"], "ACCEPTED");
    assert_eq!(stored["data"]["payment_reference"], "pay_1");
}

#[tokio::test]
async fn test_payment_webhook_amount_mismatch_is_final() {
    let h = Harness::new().await;
    let customer = h.token_for(Role::Customer, CUSTOMER_PHONE).await;
    let order = h.place_burger_order(&customer, None).await;
    let event = json!({
        "id": "evt_2",
        "type": "payment.succeeded",
        "payload": { "id": "pay_2", "amount": 100, "metadata": { "orderId": order["id"] } },
    });

    let (status, body) = h.send_webhook("msg_2", &event, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "amount_mismatch");
}

#[tokio::test]
async fn test_webhook_signature_and_header_errors() {
    let h = Harness::new().await;
    let event = json!({ "id": "evt_3", "type": "payment.succeeded", "payload": {} });

    let (status, body) = h
        .send_webhook(
            "msg_3",
            &event,
            Some("v1,+LorNJuAww24Jd6/Fy7ToRnlTUbKbWkN7YVS7UQOuwE=".to_string()),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "invalid_signature");

    let unsigned = Request::builder()
        .method(Method::POST)
        .uri("/webhooks/paystack")
        .body(Body::from(event.to_string()))
        .unwrap();
    let (status, body) = h.send(unsigned).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "missing_header");
}

#[tokio::test]
async fn test_webhook_bad_payload_is_final() {
    let h = Harness::new().await;
    let (status, body) = h.send_webhook("msg_4", &json!({ "kind": "payment.succeeded" }), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "invalid_payload");
}

struct BrokenSettingStore;

#[async_trait]
impl SettingStore for BrokenSettingStore {
    async fn load_settings(&self) -> Result<Vec<SettingRow>, StoreError> {
        Err(StoreError::Database(diesel::result::Error::BrokenTransactionManager))
    }

    async fn upsert_setting(&self, _row: &SettingRow) -> Result<(), StoreError> {
        Err(StoreError::Database(diesel::result::Error::BrokenTransactionManager))
    }
}

async fn settings_failure(debug: bool) -> (StatusCode, Value) {
    let mut config = Config::with_secrets("postgres://unused", "test-jwt-secret", "whsec_dGVzdC13ZWJob29r");
    config.debug = debug;
    let stores = Stores {
        users: Arc::new(MemoryUserStore::new()),
        catalog: Arc::new(MemoryCatalogStore::new(snapshot(Uuid::new_v4(), Uuid::new_v4()))),
        settings: Arc::new(BrokenSettingStore),
        orders: Arc::new(MemoryOrderStore::new()),
        notifications: Arc::new(MemoryNotificationLog::new()),
    };
    let state = AppState::with_menu_cache(
        &config,
        stores,
        Arc::new(RecordingSender::new()),
        Arc::new(MemoryCache::<MenuDocument>::new(Duration::from_secs(60))),
    );
    let response = app(state)
        .oneshot(request(Method::GET, "/settings", None, None))
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_dependency_failure_detail_only_in_debug() {
    let (status, body) = settings_failure(false).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "dependency_error");
    assert!(!body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("database error"));

    let (status, body) = settings_failure(true).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("database error"));
}
