use std::sync::Arc;

use bistro_common::StoreError;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, NaiveTime, Offset, Utc, Weekday};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::cache::Cache;
use crate::models::SettingRow;
use crate::store::SettingStore;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DayHours {
    /// `HH:MM`, local time.
    pub open: String,
    /// `HH:MM`. A close before `open` means the day runs past midnight.
    pub close: String,
}

impl DayHours {
    pub fn new(open: &str, close: &str) -> Self {
        Self {
            open: open.to_string(),
            close: close.to_string(),
        }
    }

    fn window(&self) -> Option<(NaiveTime, NaiveTime)> {
        let open = NaiveTime::parse_from_str(&self.open, "%H:%M").ok()?;
        let close = NaiveTime::parse_from_str(&self.close, "%H:%M").ok()?;
        (open != close).then_some((open, close))
    }
}

/// Opening hours per weekday; `None` is closed all day.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct BusinessHours {
    #[serde(default)]
    pub monday: Option<DayHours>,
    #[serde(default)]
    pub tuesday: Option<DayHours>,
    #[serde(default)]
    pub wednesday: Option<DayHours>,
    #[serde(default)]
    pub thursday: Option<DayHours>,
    #[serde(default)]
    pub friday: Option<DayHours>,
    #[serde(default)]
    pub saturday: Option<DayHours>,
    #[serde(default)]
    pub sunday: Option<DayHours>,
}

impl BusinessHours {
    pub fn every_day(hours: DayHours) -> Self {
        Self {
            monday: Some(hours.clone()),
            tuesday: Some(hours.clone()),
            wednesday: Some(hours.clone()),
            thursday: Some(hours.clone()),
            friday: Some(hours.clone()),
            saturday: Some(hours.clone()),
            sunday: Some(hours),
        }
    }

    pub fn day(&self, weekday: Weekday) -> Option<&DayHours> {
        match weekday {
            Weekday::Mon => self.monday.as_ref(),
            Weekday::Tue => self.tuesday.as_ref(),
            Weekday::Wed => self.wednesday.as_ref(),
            Weekday::Thu => self.thursday.as_ref(),
            Weekday::Fri => self.friday.as_ref(),
            Weekday::Sat => self.saturday.as_ref(),
            Weekday::Sun => self.sunday.as_ref(),
        }
    }

    fn days(&self) -> impl Iterator<Item = &DayHours> {
        [
            &self.monday,
            &self.tuesday,
            &self.wednesday,
            &self.thursday,
            &self.friday,
            &self.saturday,
            &self.sunday,
        ]
        .into_iter()
        .flatten()
    }

    /// Whether `local` falls inside today's window or inside the
    /// after-midnight tail of yesterday's.
    pub fn is_open_at(&self, local: NaiveDateTime) -> bool {
        let time = local.time();
        let weekday = local.weekday();

        let today = self.day(weekday).and_then(DayHours::window);
        let open_today = match today {
            Some((open, close)) if open < close => open <= time && time < close,
            Some((open, _)) => open <= time,
            None => false,
        };
        if open_today {
            return true;
        }

        match self.day(weekday.pred()).and_then(DayHours::window) {
            Some((open, close)) if close < open => time < close,
            _ => false,
        }
    }
}

/// Typed view over the settings table. Missing keys take the default.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Settings {
    pub restaurant_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub announcement: Option<String>,
    pub ordering_enabled: bool,
    pub delivery_enabled: bool,
    pub dine_in_enabled: bool,
    pub online_payment_required: bool,
    pub minimum_order: i64,
    pub delivery_fee: i64,
    pub service_fee: i64,
    pub prep_time_minutes: i32,
    pub utc_offset_minutes: i32,
    pub business_hours: BusinessHours,
    /// Receives a copy of every new-order notification.
    pub staff_alert_phone: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            restaurant_name: "Bistro".to_string(),
            phone: None,
            address: None,
            announcement: None,
            ordering_enabled: true,
            delivery_enabled: false,
            dine_in_enabled: true,
            online_payment_required: false,
            minimum_order: 0,
            delivery_fee: 0,
            service_fee: 0,
            prep_time_minutes: 20,
            utc_offset_minutes: 120,
            business_hours: BusinessHours::every_day(DayHours::new("08:00", "22:00")),
            staff_alert_phone: None,
        }
    }
}

impl Settings {
    pub fn local_time(&self, now: DateTime<Utc>) -> NaiveDateTime {
        let offset = FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix());
        now.with_timezone(&offset).naive_local()
    }

    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.business_hours.is_open_at(self.local_time(now))
    }

    pub fn accepts_orders_at(&self, now: DateTime<Utc>) -> bool {
        self.ordering_enabled && self.is_open_at(now)
    }

    pub fn public_view(&self, now: DateTime<Utc>) -> PublicSettings {
        PublicSettings {
            restaurant_name: self.restaurant_name.clone(),
            phone: self.phone.clone(),
            address: self.address.clone(),
            announcement: self.announcement.clone(),
            ordering_enabled: self.ordering_enabled,
            delivery_enabled: self.delivery_enabled,
            dine_in_enabled: self.dine_in_enabled,
            online_payment_required: self.online_payment_required,
            minimum_order: self.minimum_order,
            delivery_fee: self.delivery_fee,
            service_fee: self.service_fee,
            prep_time_minutes: self.prep_time_minutes,
            business_hours: self.business_hours.clone(),
            is_open: self.is_open_at(now),
            accepting_orders: self.accepts_orders_at(now),
        }
    }
}

/// What unauthenticated clients may see.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PublicSettings {
    pub restaurant_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub announcement: Option<String>,
    pub ordering_enabled: bool,
    pub delivery_enabled: bool,
    pub dine_in_enabled: bool,
    pub online_payment_required: bool,
    pub minimum_order: i64,
    pub delivery_fee: i64,
    pub service_fee: i64,
    pub prep_time_minutes: i32,
    pub business_hours: BusinessHours,
    pub is_open: bool,
    pub accepting_orders: bool,
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("unknown setting `{0}`")]
    UnknownKey(String),
    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue { key: &'static str, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    RestaurantName,
    Phone,
    Address,
    Announcement,
    OrderingEnabled,
    DeliveryEnabled,
    DineInEnabled,
    OnlinePaymentRequired,
    MinimumOrder,
    DeliveryFee,
    ServiceFee,
    PrepTimeMinutes,
    UtcOffsetMinutes,
    BusinessHours,
    StaffAlertPhone,
}

impl SettingKey {
    pub const ALL: [SettingKey; 15] = [
        SettingKey::RestaurantName,
        SettingKey::Phone,
        SettingKey::Address,
        SettingKey::Announcement,
        SettingKey::OrderingEnabled,
        SettingKey::DeliveryEnabled,
        SettingKey::DineInEnabled,
        SettingKey::OnlinePaymentRequired,
        SettingKey::MinimumOrder,
        SettingKey::DeliveryFee,
        SettingKey::ServiceFee,
        SettingKey::PrepTimeMinutes,
        SettingKey::UtcOffsetMinutes,
        SettingKey::BusinessHours,
        SettingKey::StaffAlertPhone,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::RestaurantName => "restaurant_name",
            SettingKey::Phone => "phone",
            SettingKey::Address => "address",
            SettingKey::Announcement => "announcement",
            SettingKey::OrderingEnabled => "ordering_enabled",
            SettingKey::DeliveryEnabled => "delivery_enabled",
            SettingKey::DineInEnabled => "dine_in_enabled",
            SettingKey::OnlinePaymentRequired => "online_payment_required",
            SettingKey::MinimumOrder => "minimum_order",
            SettingKey::DeliveryFee => "delivery_fee",
            SettingKey::ServiceFee => "service_fee",
            SettingKey::PrepTimeMinutes => "prep_time_minutes",
            SettingKey::UtcOffsetMinutes => "utc_offset_minutes",
            SettingKey::BusinessHours => "business_hours",
            SettingKey::StaffAlertPhone => "staff_alert_phone",
        }
    }

    pub fn parse(key: &str) -> Result<Self, SettingsError> {
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == key)
            .ok_or_else(|| SettingsError::UnknownKey(key.to_string()))
    }

    pub fn is_public(&self) -> bool {
        !matches!(self, SettingKey::StaffAlertPhone | SettingKey::UtcOffsetMinutes)
    }

    /// Validates `value` against this key's schema and writes it into
    /// `settings`.
    pub fn apply(&self, settings: &mut Settings, value: Value) -> Result<(), SettingsError> {
        match self {
            SettingKey::RestaurantName => {
                let name: String = self.decode(value)?;
                if name.trim().is_empty() {
                    return Err(self.invalid("must not be empty"));
                }
                settings.restaurant_name = name.trim().to_string();
            }
            SettingKey::Phone => settings.phone = self.optional_text(value)?,
            SettingKey::Address => settings.address = self.optional_text(value)?,
            SettingKey::Announcement => settings.announcement = self.optional_text(value)?,
            SettingKey::StaffAlertPhone => settings.staff_alert_phone = self.optional_text(value)?,
            SettingKey::OrderingEnabled => settings.ordering_enabled = self.decode(value)?,
            SettingKey::DeliveryEnabled => settings.delivery_enabled = self.decode(value)?,
            SettingKey::DineInEnabled => settings.dine_in_enabled = self.decode(value)?,
            SettingKey::OnlinePaymentRequired => {
                settings.online_payment_required = self.decode(value)?
            }
            SettingKey::MinimumOrder => settings.minimum_order = self.amount(value)?,
            SettingKey::DeliveryFee => settings.delivery_fee = self.amount(value)?,
            SettingKey::ServiceFee => settings.service_fee = self.amount(value)?,
            SettingKey::PrepTimeMinutes => {
                let minutes: i32 = self.decode(value)?;
                if !(1..=240).contains(&minutes) {
                    return Err(self.invalid("must be between 1 and 240"));
                }
                settings.prep_time_minutes = minutes;
            }
            SettingKey::UtcOffsetMinutes => {
                let minutes: i32 = self.decode(value)?;
                if !(-720..=840).contains(&minutes) {
                    return Err(self.invalid("must be between -720 and 840"));
                }
                settings.utc_offset_minutes = minutes;
            }
            SettingKey::BusinessHours => {
                let hours: BusinessHours = self.decode(value)?;
                if hours.days().any(|day| day.window().is_none()) {
                    return Err(self.invalid("times must be distinct HH:MM values"));
                }
                settings.business_hours = hours;
            }
        }
        Ok(())
    }

    fn invalid(&self, reason: &str) -> SettingsError {
        SettingsError::InvalidValue {
            key: self.as_str(),
            reason: reason.to_string(),
        }
    }

    fn decode<T: DeserializeOwned>(&self, value: Value) -> Result<T, SettingsError> {
        serde_json::from_value(value).map_err(|err| self.invalid(&err.to_string()))
    }

    fn optional_text(&self, value: Value) -> Result<Option<String>, SettingsError> {
        let text: Option<String> = self.decode(value)?;
        Ok(text
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty()))
    }

    fn amount(&self, value: Value) -> Result<i64, SettingsError> {
        let amount: i64 = self.decode(value)?;
        if amount < 0 {
            return Err(self.invalid("must not be negative"));
        }
        Ok(amount)
    }
}

pub struct SettingsService {
    store: Arc<dyn SettingStore>,
    cache: Arc<dyn Cache<Settings>>,
}

impl SettingsService {
    pub fn new(store: Arc<dyn SettingStore>, cache: Arc<dyn Cache<Settings>>) -> Self {
        Self { store, cache }
    }

    pub async fn current(&self) -> Result<Settings, StoreError> {
        if let Some(settings) = self.cache.get().await {
            return Ok(settings);
        }
        let settings = self.load().await?;
        self.cache.put(&settings).await;
        Ok(settings)
    }

    /// Reads the table directly, skipping the cache.
    pub async fn load(&self) -> Result<Settings, StoreError> {
        let mut settings = Settings::default();
        for row in self.store.load_settings().await? {
            let applied = SettingKey::parse(&row.key)
                .and_then(|key| key.apply(&mut settings, row.value));
            if let Err(err) = applied {
                warn!(key = %row.key, error = %err, "ignoring stored setting");
            }
        }
        Ok(settings)
    }

    pub async fn public_view(&self, now: DateTime<Utc>) -> Result<PublicSettings, StoreError> {
        Ok(self.current().await?.public_view(now))
    }

    #[instrument(skip(self, value))]
    pub async fn update(
        &self,
        key: &str,
        value: Value,
        now: DateTime<Utc>,
    ) -> Result<Settings, SettingsError> {
        let key = SettingKey::parse(key)?;
        let mut settings = self.load().await?;
        key.apply(&mut settings, value.clone())?;

        self.store
            .upsert_setting(&SettingRow {
                key: key.as_str().to_string(),
                value,
                is_public: key.is_public(),
                updated_at: now,
            })
            .await?;
        self.cache.invalidate().await;
        info!(key = key.as_str(), "setting updated");
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{NaiveDate, TimeZone};
    use serde_json::json;

    use super::*;
    use crate::cache::MemoryCache;
    use crate::store::MemorySettingStore;

    fn service() -> SettingsService {
        SettingsService::new(
            Arc::new(MemorySettingStore::new()),
            Arc::new(MemoryCache::<Settings>::new(Duration::from_secs(60))),
        )
    }

    fn local(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        // 2025-06-02 is a Monday.
        NaiveDate::from_ymd_opt(2025, 6, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn test_regular_hours() {
        let hours = BusinessHours {
            monday: Some(DayHours::new("09:00", "17:00")),
            ..Default::default()
        };

        assert!(!hours.is_open_at(local(2, 8, 59)));
        assert!(hours.is_open_at(local(2, 9, 0)));
        assert!(!hours.is_open_at(local(2, 17, 0)));
        assert!(!hours.is_open_at(local(3, 10, 0)));
    }

    #[test]
    fn test_overnight_hours_span_midnight() {
        let hours = BusinessHours {
            friday: Some(DayHours::new("18:00", "02:00")),
            ..Default::default()
        };

        // Friday 2025-06-06, Saturday 2025-06-07.
        assert!(hours.is_open_at(local(6, 23, 30)));
        assert!(hours.is_open_at(local(7, 1, 59)));
        assert!(!hours.is_open_at(local(7, 2, 0)));
        assert!(!hours.is_open_at(local(6, 1, 0)));
    }

    #[test]
    fn test_utc_offset_applies() {
        let settings = Settings {
            business_hours: BusinessHours::every_day(DayHours::new("09:00", "17:00")),
            utc_offset_minutes: 120,
            ..Default::default()
        };

        let utc_0730 = Utc.with_ymd_and_hms(2025, 6, 2, 7, 30, 0).unwrap();
        let utc_1530 = Utc.with_ymd_and_hms(2025, 6, 2, 15, 30, 0).unwrap();

        assert!(settings.is_open_at(utc_0730));
        assert!(!settings.is_open_at(utc_1530));
    }

    #[test]
    fn test_ordering_gate() {
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap();
        let mut settings = Settings::default();
        assert!(settings.accepts_orders_at(now));

        settings.ordering_enabled = false;
        assert!(settings.is_open_at(now));
        assert!(!settings.accepts_orders_at(now));
    }

    #[test]
    fn test_apply_rejects_bad_values() {
        let mut settings = Settings::default();

        assert!(SettingKey::MinimumOrder
            .apply(&mut settings, json!(-5))
            .is_err());
        assert!(SettingKey::OrderingEnabled
            .apply(&mut settings, json!("yes"))
            .is_err());
        assert!(SettingKey::BusinessHours
            .apply(&mut settings, json!({"monday": {"open": "9am", "close": "17:00"}}))
            .is_err());
        assert!(SettingKey::BusinessHours
            .apply(&mut settings, json!({"funday": null}))
            .is_err());
        assert!(matches!(
            SettingKey::parse("colour"),
            Err(SettingsError::UnknownKey(_))
        ));
        assert_eq!(settings, Settings::default());
    }

    #[tokio::test]
    async fn test_update_persists_and_refreshes_cache() {
        let service = service();
        let now = Utc::now();
        assert_eq!(service.current().await.unwrap().minimum_order, 0);

        service
            .update("minimum_order", json!(9000), now)
            .await
            .unwrap();
        service
            .update("announcement", json!("  Closed on Monday "), now)
            .await
            .unwrap();

        let current = service.current().await.unwrap();
        assert_eq!(current.minimum_order, 9000);
        assert_eq!(current.announcement.as_deref(), Some("Closed on Monday"));
    }

    #[tokio::test]
    async fn test_invalid_update_is_not_stored() {
        let service = service();

        let result = service
            .update("delivery_fee", json!("free"), Utc::now())
            .await;

        assert!(matches!(
            result,
            Err(SettingsError::InvalidValue { key: "delivery_fee", .. })
        ));
        assert!(service.store.load_settings().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_public_view_hides_private_keys() {
        let service = service();
        service
            .update("staff_alert_phone", json!("+27820000000"), Utc::now())
            .await
            .unwrap();

        let view = service.public_view(Utc::now()).await.unwrap();
        let json = serde_json::to_value(&view).unwrap();

        assert!(json.get("staff_alert_phone").is_none());
        assert!(json.get("utc_offset_minutes").is_none());
        assert!(json.get("is_open").is_some());
        assert!(!SettingKey::StaffAlertPhone.is_public());
    }
}
