use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::{CatalogItem, Category};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog unavailable: {0}")]
    Unavailable(String),

    #[error("invalid catalog response: {0}")]
    InvalidResponse(String),
}

/// Read-only source of disposal categories and their items.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch all categories. With `sort` the categories come back ordered by name.
    async fn fetch_categories(
        &self,
        sort: bool,
    ) -> Result<Vec<Category>, CatalogError>;
}

/// Where a loaded catalog came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogOrigin {
    Remote,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogLoad {
    pub categories: Vec<Category>,
    pub origin: CatalogOrigin,
}

/// Loads the catalog from `source`, falling back to [`StaticCatalog`] on any
/// error so the wizard is never blocked by the catalog service.
pub async fn load_catalog_with_fallback(
    source: &dyn CatalogSource,
    sort: bool,
) -> CatalogLoad {
    match source.fetch_categories(sort).await {
        Ok(categories) => CatalogLoad {
            categories,
            origin: CatalogOrigin::Remote,
        },
        Err(error) => {
            warn!(%error, "catalog fetch failed, using built-in catalog");
            CatalogLoad {
                categories: StaticCatalog::categories(sort),
                origin: CatalogOrigin::Fallback,
            }
        }
    }
}

/// Built-in catalog used when the remote one is unreachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticCatalog;

impl StaticCatalog {
    pub fn categories(sort: bool) -> Vec<Category> {
        let mut categories = vec![
            category(
                "1",
                "家具",
                &[
                    ("1-1", "オフィスチェア", 3000),
                    ("1-2", "オフィスデスク", 5000),
                    ("1-3", "会議テーブル", 8000),
                    ("1-4", "書類棚", 4000),
                    ("1-5", "ロッカー", 3500),
                ],
            ),
            category(
                "2",
                "電子機器",
                &[
                    ("2-1", "デスクトップPC", 8000),
                    ("2-2", "ノートPC", 6000),
                    ("2-3", "モニター", 3000),
                    ("2-4", "プリンター", 4000),
                    ("2-5", "スキャナー", 2500),
                    ("2-6", "プロジェクター", 5000),
                ],
            ),
            category(
                "3",
                "家電",
                &[
                    ("3-1", "冷蔵庫", 10000),
                    ("3-2", "電子レンジ", 3000),
                    ("3-3", "コーヒーメーカー", 2000),
                    ("3-4", "空気清浄機", 4000),
                    ("3-5", "加湿器", 2500),
                ],
            ),
            category(
                "4",
                "その他",
                &[
                    ("4-1", "ホワイトボード", 2000),
                    ("4-2", "観葉植物", 1000),
                    ("4-3", "掃除機", 3000),
                    ("4-4", "シュレッダー", 2500),
                    ("4-5", "傘立て", 1500),
                ],
            ),
        ];

        if sort {
            categories.sort_by(|a, b| a.name.cmp(&b.name));
        }
        categories
    }

    /// Looks up an item by id across all categories.
    pub fn find_item(id: &str) -> Option<CatalogItem> {
        Self::categories(false)
            .into_iter()
            .flat_map(|c| c.items)
            .find(|item| item.id == id)
    }
}

#[async_trait]
impl CatalogSource for StaticCatalog {
    async fn fetch_categories(
        &self,
        sort: bool,
    ) -> Result<Vec<Category>, CatalogError> {
        Ok(Self::categories(sort))
    }
}

fn category(
    id: &str,
    name: &str,
    items: &[(&str, &str, i64)],
) -> Category {
    Category {
        id: id.to_string(),
        name: name.to_string(),
        items: items
            .iter()
            .map(|(item_id, item_name, price)| CatalogItem {
                id: (*item_id).to_string(),
                name: (*item_name).to_string(),
                price: *price,
                category: name.to_string(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    struct FailingCatalog;

    #[async_trait]
    impl CatalogSource for FailingCatalog {
        async fn fetch_categories(
            &self,
            _sort: bool,
        ) -> Result<Vec<Category>, CatalogError> {
            Err(CatalogError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn falls_back_to_static_catalog_on_error() {
        let load = load_catalog_with_fallback(&FailingCatalog, false).await;

        assert_eq!(load.origin, CatalogOrigin::Fallback);
        assert_eq!(load.categories, StaticCatalog::categories(false));
    }

    #[tokio::test]
    async fn uses_remote_catalog_when_available() {
        let load = load_catalog_with_fallback(&StaticCatalog, false).await;

        assert_eq!(load.origin, CatalogOrigin::Remote);
        assert_eq!(load.categories.len(), 4);
    }

    #[test]
    fn items_carry_their_category_name() {
        let categories = StaticCatalog::categories(false);

        assert!(
            categories
                .iter()
                .all(|c| c.items.iter().all(|item| item.category == c.name))
        );
    }

    #[test]
    fn sorted_catalog_is_ordered_by_name() {
        let names: Vec<_> = StaticCatalog::categories(true)
            .into_iter()
            .map(|c| c.name)
            .collect();

        let mut expected = names.clone();
        expected.sort();
        assert_eq!(names, expected);
    }

    #[test]
    fn find_item_locates_nested_items() {
        let item = StaticCatalog::find_item("3-1").unwrap();

        assert_eq!(item.name, "冷蔵庫");
        assert_eq!(item.price, 10000);
        assert!(StaticCatalog::find_item("9-9").is_none());
    }
}
