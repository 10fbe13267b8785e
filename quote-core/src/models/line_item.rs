use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CatalogItem, Yen};

/// Category assigned to items the customer types in by hand.
pub const CUSTOM_CATEGORY: &str = "カスタム";

/// A catalog or custom item selected for disposal.
///
/// `quantity` is never zero: an edit that would drive it to zero or below
/// removes the line instead (see [`LineItem::patched`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub id: String,
    pub name: String,
    #[serde(rename = "price")]
    pub unit_price: Yen,
    pub category: String,
    pub quantity: u32,
    #[serde(rename = "customPrice")]
    pub custom_unit_price: Yen,
    #[serde(rename = "imageUrl", default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
}

impl LineItem {
    pub fn from_catalog(item: &CatalogItem) -> Self {
        Self {
            id: item.id.clone(),
            name: item.name.clone(),
            unit_price: item.price,
            category: item.category.clone(),
            quantity: 1,
            custom_unit_price: item.price,
            image_ref: None,
        }
    }

    /// Builds a line for a hand-entered item with a fresh `custom-` id.
    pub fn custom(
        name: impl Into<String>,
        price: Yen,
    ) -> Self {
        Self {
            id: format!("custom-{}", Uuid::new_v4()),
            name: name.into(),
            unit_price: price,
            category: CUSTOM_CATEGORY.to_string(),
            quantity: 1,
            custom_unit_price: price,
            image_ref: None,
        }
    }

    /// Returns the line with `patch` applied, or `None` when the patched
    /// quantity is zero or negative and the line must be dropped.
    pub fn patched(
        &self,
        patch: &LineItemPatch,
    ) -> Option<Self> {
        let mut next = self.clone();

        if let Some(quantity) = patch.quantity {
            if quantity <= 0 {
                return None;
            }
            next.quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        }
        if let Some(price) = patch.custom_unit_price {
            next.custom_unit_price = price;
        }
        if let Some(name) = &patch.name {
            next.name = name.clone();
        }
        if let Some(image_ref) = &patch.image_ref {
            next.image_ref = Some(image_ref.clone()).filter(|r| !r.is_empty());
        }

        Some(next)
    }
}

/// Partial edit of a [`LineItem`].
///
/// `quantity` is signed so a decrement past one can be expressed and
/// resolved into a removal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemPatch {
    pub quantity: Option<i64>,
    pub custom_unit_price: Option<Yen>,
    pub name: Option<String>,
    pub image_ref: Option<String>,
}

impl LineItemPatch {
    pub fn quantity(quantity: i64) -> Self {
        Self {
            quantity: Some(quantity),
            ..Default::default()
        }
    }

    pub fn price(price: Yen) -> Self {
        Self {
            custom_unit_price: Some(price),
            ..Default::default()
        }
    }
}
