use std::collections::HashMap;
use std::sync::Arc;

use bistro_common::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::cache::Cache;
use crate::models::{MenuItem, Modifier, ModifierGroup};
use crate::store::{CatalogSnapshot, CatalogStore};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MenuDocument {
    pub categories: Vec<CategoryView>,
    pub specials: Vec<SpecialView>,
    pub generated_at: DateTime<Utc>,
}

impl MenuDocument {
    pub fn find_item(&self, id: Uuid) -> Option<&MenuItemView> {
        self.categories
            .iter()
            .flat_map(|category| category.items.iter())
            .find(|item| item.id == id)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CategoryView {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub items: Vec<MenuItemView>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MenuItemView {
    pub id: Uuid,
    pub category_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub image_url: Option<String>,
    pub is_available: bool,
    pub modifier_groups: Vec<ModifierGroupView>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ModifierGroupView {
    pub id: Uuid,
    pub name: String,
    pub min_select: i32,
    pub max_select: i32,
    pub is_required: bool,
    pub modifiers: Vec<ModifierView>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ModifierView {
    pub id: Uuid,
    pub name: String,
    pub price_delta: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SpecialView {
    pub id: Uuid,
    pub menu_item_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub price: Option<i64>,
}

/// Live rows for one item, as checkout needs them for pricing.
#[derive(Debug, Clone)]
pub struct ItemDetails {
    pub item: MenuItem,
    pub groups: Vec<(ModifierGroup, Vec<Modifier>)>,
}

impl ItemDetails {
    pub fn find_modifier(&self, id: Uuid) -> Option<(&ModifierGroup, &Modifier)> {
        self.groups.iter().find_map(|(group, modifiers)| {
            modifiers
                .iter()
                .find(|modifier| modifier.id == id)
                .map(|modifier| (group, modifier))
        })
    }
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("menu item not found")]
    ItemNotFound,
    #[error("price must not be negative")]
    InvalidPrice,
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct MenuCatalog {
    store: Arc<dyn CatalogStore>,
    cache: Arc<dyn Cache<MenuDocument>>,
}

impl MenuCatalog {
    pub fn new(store: Arc<dyn CatalogStore>, cache: Arc<dyn Cache<MenuDocument>>) -> Self {
        Self { store, cache }
    }

    /// Public menu, served from the cache while fresh.
    pub async fn menu(&self, now: DateTime<Utc>) -> Result<MenuDocument, StoreError> {
        if let Some(document) = self.cache.get().await {
            return Ok(document);
        }
        let snapshot = self.store.load_catalog().await?;
        let document = build_document(snapshot, now);
        self.cache.put(&document).await;
        Ok(document)
    }

    pub async fn item(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<MenuItemView>, StoreError> {
        Ok(self.menu(now).await?.find_item(id).cloned())
    }

    /// Reads straight from the store, bypassing the cache. Inactive
    /// modifiers are dropped; inactive or unavailable items are kept so the
    /// caller can report them precisely.
    pub async fn items_for_pricing(
        &self,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, ItemDetails>, StoreError> {
        let CatalogSnapshot {
            items,
            mut groups,
            modifiers,
            ..
        } = self.store.load_items(ids).await?;
        groups.sort_by_key(|group| group.sort_order);

        Ok(items
            .into_iter()
            .map(|item| {
                let groups = groups
                    .iter()
                    .filter(|group| group.menu_item_id == item.id)
                    .map(|group| {
                        let options = modifiers
                            .iter()
                            .filter(|modifier| modifier.group_id == group.id && modifier.is_active)
                            .cloned()
                            .collect();
                        (group.clone(), options)
                    })
                    .collect();
                (item.id, ItemDetails { item, groups })
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn set_item_availability(
        &self,
        id: Uuid,
        is_available: bool,
        now: DateTime<Utc>,
    ) -> Result<(), CatalogError> {
        if !self.store.set_item_availability(id, is_available, now).await? {
            return Err(CatalogError::ItemNotFound);
        }
        self.cache.invalidate().await;
        info!(%id, is_available, "item availability changed");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn update_item_price(
        &self,
        id: Uuid,
        price: i64,
        now: DateTime<Utc>,
    ) -> Result<(), CatalogError> {
        if price < 0 {
            return Err(CatalogError::InvalidPrice);
        }
        if !self.store.update_item_price(id, price, now).await? {
            return Err(CatalogError::ItemNotFound);
        }
        self.cache.invalidate().await;
        info!(%id, price, "item price changed");
        Ok(())
    }
}

/// Projects raw rows into the nested public menu: active categories, their
/// active items, each item's groups with active modifiers, and specials
/// live at `now`. Every level is ordered by `sort_order`.
pub fn build_document(snapshot: CatalogSnapshot, now: DateTime<Utc>) -> MenuDocument {
    let CatalogSnapshot {
        mut categories,
        mut items,
        mut groups,
        mut modifiers,
        mut specials,
    } = snapshot;
    categories.sort_by_key(|category| category.sort_order);
    items.sort_by_key(|item| item.sort_order);
    groups.sort_by_key(|group| group.sort_order);
    modifiers.sort_by_key(|modifier| modifier.sort_order);
    specials.sort_by_key(|special| special.sort_order);

    let group_view = |group: &ModifierGroup| ModifierGroupView {
        id: group.id,
        name: group.name.clone(),
        min_select: group.min_select,
        max_select: group.max_select,
        is_required: group.is_required,
        modifiers: modifiers
            .iter()
            .filter(|modifier| modifier.group_id == group.id && modifier.is_active)
            .map(|modifier| ModifierView {
                id: modifier.id,
                name: modifier.name.clone(),
                price_delta: modifier.price_delta,
            })
            .collect(),
    };

    let item_view = |item: &MenuItem| MenuItemView {
        id: item.id,
        category_id: item.category_id,
        name: item.name.clone(),
        description: item.description.clone(),
        price: item.price,
        image_url: item.image_url.clone(),
        is_available: item.is_available,
        modifier_groups: groups
            .iter()
            .filter(|group| group.menu_item_id == item.id)
            .map(&group_view)
            .collect(),
    };

    let categories = categories
        .iter()
        .filter(|category| category.is_active)
        .map(|category| CategoryView {
            id: category.id,
            name: category.name.clone(),
            description: category.description.clone(),
            items: items
                .iter()
                .filter(|item| item.category_id == category.id && item.is_active)
                .map(&item_view)
                .collect(),
        })
        .collect();

    let specials = specials
        .into_iter()
        .filter(|special| special.is_live_at(now))
        .map(|special| SpecialView {
            id: special.id,
            menu_item_id: special.menu_item_id,
            title: special.title,
            description: special.description,
            price: special.price,
        })
        .collect();

    MenuDocument {
        categories,
        specials,
        generated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeDelta;

    use super::*;
    use crate::cache::MemoryCache;
    use crate::models::{Category, Special};
    use crate::store::MemoryCatalogStore;

    struct Seed {
        snapshot: CatalogSnapshot,
        burger: Uuid,
        sold_out: Uuid,
        hidden: Uuid,
        cheese: Uuid,
        retired_modifier: Uuid,
    }

    fn seed() -> Seed {
        let now = Utc::now();
        let mains = Uuid::new_v4();
        let drinks = Uuid::new_v4();
        let item = |category_id, name: &str, price, sort_order| MenuItem {
            id: Uuid::new_v4(),
            category_id,
            name: name.to_string(),
            description: None,
            price,
            image_url: None,
            is_active: true,
            is_available: true,
            sort_order,
            updated_at: now,
        };
        let burger = item(mains, "Burger", 5000, 2);
        let mut sold_out = item(mains, "Ribs", 9000, 1);
        sold_out.is_available = false;
        let mut hidden = item(mains, "Old Special", 1000, 3);
        hidden.is_active = false;
        let cola = item(drinks, "Cola", 1500, 1);

        let extras = ModifierGroup {
            id: Uuid::new_v4(),
            menu_item_id: burger.id,
            name: "Extras".to_string(),
            min_select: 0,
            max_select: 2,
            is_required: false,
            sort_order: 1,
        };
        let modifier = |name: &str, price_delta, is_active| Modifier {
            id: Uuid::new_v4(),
            group_id: extras.id,
            name: name.to_string(),
            price_delta,
            is_active,
            sort_order: 0,
        };
        let cheese = modifier("Cheese", 500, true);
        let retired = modifier("Truffle", 3000, false);

        let special = |title: &str, starts_at, ends_at| Special {
            id: Uuid::new_v4(),
            menu_item_id: None,
            title: title.to_string(),
            description: None,
            price: Some(4000),
            starts_at,
            ends_at,
            is_active: true,
            sort_order: 0,
        };

        Seed {
            burger: burger.id,
            sold_out: sold_out.id,
            hidden: hidden.id,
            cheese: cheese.id,
            retired_modifier: retired.id,
            snapshot: CatalogSnapshot {
                categories: vec![
                    Category {
                        id: drinks,
                        name: "Drinks".to_string(),
                        description: None,
                        sort_order: 2,
                        is_active: true,
                    },
                    Category {
                        id: mains,
                        name: "Mains".to_string(),
                        description: None,
                        sort_order: 1,
                        is_active: true,
                    },
                ],
                items: vec![burger, sold_out, hidden, cola],
                groups: vec![extras],
                modifiers: vec![cheese, retired],
                specials: vec![
                    special("Lunch deal", Some(now - TimeDelta::hours(1)), None),
                    special("Next week", Some(now + TimeDelta::days(7)), None),
                ],
            },
        }
    }

    fn catalog(seed: &Seed) -> MenuCatalog {
        MenuCatalog::new(
            Arc::new(MemoryCatalogStore::new(seed.snapshot.clone())),
            Arc::new(MemoryCache::<MenuDocument>::new(Duration::from_secs(60))),
        )
    }

    #[test]
    fn test_build_document_filters_and_sorts() {
        let seed = seed();

        let document = build_document(seed.snapshot.clone(), Utc::now());

        let names: Vec<_> = document.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Mains", "Drinks"]);
        let mains: Vec<_> = document.categories[0]
            .items
            .iter()
            .map(|i| i.name.as_str())
            .collect();
        assert_eq!(mains, ["Ribs", "Burger"]);
        assert!(document.find_item(seed.hidden).is_none());
        assert!(!document.find_item(seed.sold_out).unwrap().is_available);

        let burger = document.find_item(seed.burger).unwrap();
        assert_eq!(burger.modifier_groups[0].modifiers.len(), 1);
        assert_eq!(burger.modifier_groups[0].modifiers[0].id, seed.cheese);

        assert_eq!(document.specials.len(), 1);
        assert_eq!(document.specials[0].title, "Lunch deal");
    }

    #[tokio::test]
    async fn test_menu_is_cached_until_mutation() {
        let seed = seed();
        let catalog = catalog(&seed);
        let now = Utc::now();

        let first = catalog.menu(now).await.unwrap();
        let second = catalog.menu(now + TimeDelta::seconds(5)).await.unwrap();
        assert_eq!(first.generated_at, second.generated_at);

        catalog
            .update_item_price(seed.burger, 5500, now)
            .await
            .unwrap();
        let item = catalog.item(seed.burger, now).await.unwrap().unwrap();

        assert_eq!(item.price, 5500);
    }

    #[tokio::test]
    async fn test_availability_change_is_visible() {
        let seed = seed();
        let catalog = catalog(&seed);
        let now = Utc::now();
        catalog.menu(now).await.unwrap();

        catalog
            .set_item_availability(seed.burger, false, now)
            .await
            .unwrap();

        let item = catalog.item(seed.burger, now).await.unwrap().unwrap();
        assert!(!item.is_available);
        assert!(matches!(
            catalog
                .set_item_availability(Uuid::new_v4(), false, now)
                .await,
            Err(CatalogError::ItemNotFound)
        ));
        assert!(matches!(
            catalog.update_item_price(seed.burger, -1, now).await,
            Err(CatalogError::InvalidPrice)
        ));
    }

    #[tokio::test]
    async fn test_items_for_pricing_reads_store() {
        let seed = seed();
        let catalog = catalog(&seed);

        let details = catalog
            .items_for_pricing(&[seed.burger, seed.hidden])
            .await
            .unwrap();

        assert_eq!(details.len(), 2);
        let burger = &details[&seed.burger];
        assert!(burger.find_modifier(seed.cheese).is_some());
        assert!(burger.find_modifier(seed.retired_modifier).is_none());
        assert!(!details[&seed.hidden].item.is_orderable());
    }
}
