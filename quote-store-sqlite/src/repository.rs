use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::debug;

use quote_core::{CustomerInfo, CustomerInfoStore, StoreError};

pub struct SqliteCustomerStore {
    pool: SqlitePool,
}

impl SqliteCustomerStore {
    /// Connect to `database_url` (a sqlx URL such as `sqlite:prefill.db?mode=rwc`).
    ///
    /// The pool holds a single connection so `sqlite::memory:` behaves as one
    /// database rather than one per connection.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await
            .with_context(|| format!("Failed to connect to database: {}", database_url))?;
        Ok(Self { pool })
    }

    pub async fn new_with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_customer_info(row: &SqliteRow) -> Result<CustomerInfo, StoreError> {
    let info = CustomerInfo {
        name: row
            .try_get("name")
            .map_err(|e| StoreError::Database(e.to_string()))?,
        address: row
            .try_get("address")
            .map_err(|e| StoreError::Database(e.to_string()))?,
        phone: row
            .try_get("phone")
            .map_err(|e| StoreError::Database(e.to_string()))?,
        email: row
            .try_get("email")
            .map_err(|e| StoreError::Database(e.to_string()))?,
        disposal_date: row
            .try_get("disposal_date")
            .map_err(|e| StoreError::Database(e.to_string()))?,
    };
    Ok(info.normalized())
}

#[async_trait]
impl CustomerInfoStore for SqliteCustomerStore {
    async fn load_last(&self) -> Result<Option<CustomerInfo>, StoreError> {
        let row = sqlx::query(
            "SELECT name, address, phone, email, disposal_date
             FROM customer_prefill WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        row.as_ref().map(row_to_customer_info).transpose()
    }

    async fn save_last(
        &self,
        info: &CustomerInfo,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO customer_prefill (id, name, address, phone, email, disposal_date, updated_at)
             VALUES (1, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                address = excluded.address,
                phone = excluded.phone,
                email = excluded.email,
                disposal_date = excluded.disposal_date,
                updated_at = excluded.updated_at",
        )
        .bind(&info.name)
        .bind(&info.address)
        .bind(&info.phone)
        .bind(info.email.as_deref())
        .bind(info.disposal_date.as_deref())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        debug!("saved customer prefill record");
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM customer_prefill")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }
}
