use async_trait::async_trait;

use quote_core::backend::{StoreConfig, StoreFactory};
use quote_core::{CustomerInfoStore, StoreError};

use crate::repository::SqliteCustomerStore;

/// Turns a configured connection string into a sqlx URL.
///
/// * `:memory:` or empty → `sqlite::memory:`
/// * a bare path such as `prefill.db` → `sqlite:prefill.db?mode=rwc`
/// * anything already starting with `sqlite:` is passed through
fn database_url(connection_string: &str) -> String {
    match connection_string.trim() {
        "" | ":memory:" => "sqlite::memory:".to_string(),
        s if s.starts_with("sqlite:") => s.to_string(),
        path => format!("sqlite:{path}?mode=rwc"),
    }
}

/// [`StoreFactory`] for SQLite.
///
/// Register this with a [`quote_core::backend::StoreRegistry`] to make the
/// `"sqlite"` backend available:
///
/// ```rust,no_run
/// use quote_core::backend::StoreRegistry;
/// use quote_store_sqlite::SqliteStoreFactory;
///
/// let mut registry = StoreRegistry::new();
/// registry.register(Box::new(SqliteStoreFactory));
/// ```
pub struct SqliteStoreFactory;

#[async_trait]
impl StoreFactory for SqliteStoreFactory {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    /// Open the database described by `config.connection_string` and run
    /// migrations.
    async fn create(
        &self,
        config: &StoreConfig,
    ) -> Result<Box<dyn CustomerInfoStore>, StoreError> {
        let url = database_url(&config.connection_string);
        let store = SqliteCustomerStore::new(&url)
            .await
            .map_err(|e| StoreError::Connection(format!("{e:#}")))?;
        store
            .run_migrations()
            .await
            .map_err(|e| StoreError::Database(format!("{e:#}")))?;
        Ok(Box::new(store))
    }
}
