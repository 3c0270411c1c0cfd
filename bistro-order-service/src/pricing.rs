use std::collections::HashMap;

use bistro_restaurant_service::ItemDetails;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::OrderError;
use crate::models::{LineModifier, LineModifiers};

pub const MAX_LINE_QUANTITY: i32 = 50;

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct CartLine {
    pub menu_item_id: Uuid,
    pub quantity: i32,
    #[serde(default)]
    pub modifier_ids: Vec<Uuid>,
}

/// A cart line priced from live catalog rows.
#[derive(Debug, Clone, PartialEq)]
pub struct PricedLine {
    pub menu_item_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price: i64,
    pub modifiers: LineModifiers,
    pub line_total: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub subtotal: i64,
    pub delivery_fee: i64,
    pub service_fee: i64,
    pub discount: i64,
    pub total: i64,
}

impl Totals {
    /// `discount` is clamped to the subtotal so the total never goes
    /// negative.
    pub fn new(subtotal: i64, delivery_fee: i64, service_fee: i64, discount: i64) -> Self {
        let discount = discount.clamp(0, subtotal.max(0));
        Self {
            subtotal,
            delivery_fee,
            service_fee,
            discount,
            total: subtotal + delivery_fee + service_fee - discount,
        }
    }
}

/// Prices every line against `items`, validating quantity, item
/// availability, modifier membership and per-group selection counts.
pub fn price_lines(
    lines: &[CartLine],
    items: &HashMap<Uuid, ItemDetails>,
) -> Result<Vec<PricedLine>, OrderError> {
    if lines.is_empty() {
        return Err(OrderError::EmptyCart);
    }
    lines.iter().map(|line| price_line(line, items)).collect()
}

fn price_line(
    line: &CartLine,
    items: &HashMap<Uuid, ItemDetails>,
) -> Result<PricedLine, OrderError> {
    if !(1..=MAX_LINE_QUANTITY).contains(&line.quantity) {
        return Err(OrderError::InvalidQuantity(line.menu_item_id));
    }
    let details = items
        .get(&line.menu_item_id)
        .filter(|details| details.item.is_active)
        .ok_or(OrderError::UnknownItem(line.menu_item_id))?;
    if !details.item.is_available {
        return Err(OrderError::ItemUnavailable(line.menu_item_id));
    }

    let mut chosen = Vec::with_capacity(line.modifier_ids.len());
    for modifier_id in &line.modifier_ids {
        let (group, modifier) = details
            .find_modifier(*modifier_id)
            .ok_or(OrderError::UnknownModifier(*modifier_id))?;
        if chosen
            .iter()
            .any(|picked: &LineModifier| picked.modifier_id == modifier.id)
        {
            return Err(OrderError::ModifierSelection {
                group: group.name.clone(),
                min: group.effective_min(),
                max: group.max_select,
            });
        }
        chosen.push(LineModifier {
            modifier_id: modifier.id,
            group: group.name.clone(),
            name: modifier.name.clone(),
            price_delta: modifier.price_delta,
        });
    }

    for (group, options) in &details.groups {
        let selected = options
            .iter()
            .filter(|option| line.modifier_ids.contains(&option.id))
            .count() as i32;
        if selected < group.effective_min() || selected > group.max_select {
            return Err(OrderError::ModifierSelection {
                group: group.name.clone(),
                min: group.effective_min(),
                max: group.max_select,
            });
        }
    }

    let unit_price = details.item.price;
    let modifier_total: i64 = chosen.iter().map(|modifier| modifier.price_delta).sum();
    Ok(PricedLine {
        menu_item_id: details.item.id,
        name: details.item.name.clone(),
        quantity: line.quantity,
        unit_price,
        line_total: (unit_price + modifier_total).max(0) * i64::from(line.quantity),
        modifiers: LineModifiers(chosen),
    })
}

pub fn subtotal(lines: &[PricedLine]) -> i64 {
    lines.iter().map(|line| line.line_total).sum()
}
