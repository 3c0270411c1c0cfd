use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::models::{DiscountType, PromoCode};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PromoRejection {
    #[error("promo code not found")]
    NotFound,
    #[error("promo code is no longer active")]
    Inactive,
    #[error("promo code is not valid yet")]
    NotStarted,
    #[error("promo code has expired")]
    Expired,
    #[error("promo code has reached its usage limit")]
    UsageLimitReached,
    #[error("promo code needs a minimum order of {minimum}")]
    MinimumNotMet { minimum: i64 },
}

impl PromoRejection {
    pub fn code(&self) -> &'static str {
        match self {
            PromoRejection::NotFound => "promo_not_found",
            PromoRejection::Inactive => "promo_inactive",
            PromoRejection::NotStarted => "promo_not_started",
            PromoRejection::Expired => "promo_expired",
            PromoRejection::UsageLimitReached => "promo_usage_limit",
            PromoRejection::MinimumNotMet { .. } => "promo_minimum_not_met",
        }
    }
}

/// Codes are stored upper case and matched case-insensitively.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

impl PromoCode {
    /// Checks everything except the order minimum.
    pub fn check_usable(&self, now: DateTime<Utc>) -> Result<(), PromoRejection> {
        if !self.is_active {
            return Err(PromoRejection::Inactive);
        }
        if self.starts_at.is_some_and(|starts| now < starts) {
            return Err(PromoRejection::NotStarted);
        }
        if self.ends_at.is_some_and(|ends| now > ends) {
            return Err(PromoRejection::Expired);
        }
        if self
            .usage_limit
            .is_some_and(|limit| self.usage_count >= limit)
        {
            return Err(PromoRejection::UsageLimitReached);
        }
        Ok(())
    }

    pub fn check(&self, subtotal: i64, now: DateTime<Utc>) -> Result<(), PromoRejection> {
        self.check_usable(now)?;
        if subtotal < self.minimum_order {
            return Err(PromoRejection::MinimumNotMet {
                minimum: self.minimum_order,
            });
        }
        Ok(())
    }

    /// Discount in minor units, never more than `subtotal`. Percentages
    /// round half up.
    pub fn discount_for(&self, subtotal: i64) -> i64 {
        let discount = match self.discount_type {
            DiscountType::Percentage => (subtotal * self.value.clamp(0, 100) + 50) / 100,
            DiscountType::Fixed => self.value,
        };
        discount.clamp(0, subtotal.max(0))
    }
}

/// Preview returned by promo validation.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PromoQuote {
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub value: i64,
    pub minimum_order: i64,
    /// Present when a subtotal was supplied.
    pub discount: Option<i64>,
}
