//! Repository layer for database operations.
//!
//! `Repository` implements [`ListingStore`] over a SQLite pool:
//! - `lock.rs` - the purchase transaction held between `get_for_update` and commit

mod lock;

use crate::domain::{
    Category, Decimal, Listing, ListingId, NewListing, PriceAnchor, PricingParams,
    PurchaseId, PurchaseRecord, TimeMs, UserId,
};
use crate::store::{ListingFilter, ListingLock, ListingStore, StoreError};
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

pub use lock::SqliteListingLock;

const LISTING_COLUMNS: &str = r#"
    id, seller_id, title, description, category, start_price, min_price,
    decay_rate_per_hour, anchor_value, anchor_time_ms, sold, buyer_id, created_at_ms
"#;

const PURCHASE_COLUMNS: &str = "id, listing_id, buyer_id, price_paid, purchased_at_ms";

/// Repository for database operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if is_busy(&err) {
            StoreError::LockTimeout
        } else {
            StoreError::Unavailable(err.to_string())
        }
    }
}

/// SQLITE_BUSY / SQLITE_LOCKED, including their extended codes.
fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .map_or(false, |code| matches!(code & 0xff, 5 | 6)),
        _ => false,
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn decimal_column(row: &SqliteRow, column: &str) -> Result<Decimal, StoreError> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw)
        .map_err(|e| StoreError::Corrupt(format!("{} = {:?}: {}", column, raw, e)))
}

fn listing_from_row(row: &SqliteRow) -> Result<Listing, StoreError> {
    let category_raw: String = row.try_get("category")?;
    let category = Category::from_str(&category_raw).map_err(StoreError::Corrupt)?;
    let sold: i64 = row.try_get("sold")?;
    let buyer_id: Option<String> = row.try_get("buyer_id")?;

    Ok(Listing {
        id: ListingId::new(row.try_get("id")?),
        seller_id: UserId::new(row.try_get::<String, _>("seller_id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        category,
        params: PricingParams {
            start_price: decimal_column(row, "start_price")?,
            min_price: decimal_column(row, "min_price")?,
            decay_rate_per_hour: decimal_column(row, "decay_rate_per_hour")?,
        },
        anchor: PriceAnchor::new(
            decimal_column(row, "anchor_value")?,
            TimeMs::new(row.try_get("anchor_time_ms")?),
        ),
        sold: sold != 0,
        buyer_id: buyer_id.map(UserId::new),
        created_at: TimeMs::new(row.try_get("created_at_ms")?),
    })
}

fn purchase_from_row(row: &SqliteRow) -> Result<PurchaseRecord, StoreError> {
    let id_raw: String = row.try_get("id")?;
    let id = PurchaseId::from_str(&id_raw)
        .map_err(|e| StoreError::Corrupt(format!("purchase id {:?}: {}", id_raw, e)))?;

    Ok(PurchaseRecord {
        id,
        listing_id: ListingId::new(row.try_get("listing_id")?),
        buyer_id: UserId::new(row.try_get::<String, _>("buyer_id")?),
        price_paid: decimal_column(row, "price_paid")?,
        purchased_at: TimeMs::new(row.try_get("purchased_at_ms")?),
    })
}

#[async_trait]
impl ListingStore for Repository {
    async fn get_for_read(&self, id: ListingId) -> Result<Option<Listing>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM listings WHERE id = ?",
            LISTING_COLUMNS
        ))
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(listing_from_row).transpose()
    }

    async fn get_for_update(
        &self,
        id: ListingId,
    ) -> Result<Option<Box<dyn ListingLock>>, StoreError> {
        Ok(SqliteListingLock::acquire(&self.pool, id)
            .await?
            .map(|lock| Box::new(lock) as Box<dyn ListingLock>))
    }

    async fn apply_price_anchor(
        &self,
        id: ListingId,
        expected: PriceAnchor,
        next: PriceAnchor,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE listings
            SET anchor_value = ?, anchor_time_ms = ?
            WHERE id = ? AND sold = 0 AND anchor_value = ? AND anchor_time_ms = ?
            "#,
        )
        .bind(next.value.to_canonical_string())
        .bind(next.time.as_ms())
        .bind(id.as_i64())
        .bind(expected.value.to_canonical_string())
        .bind(expected.time.as_ms())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_listing(
        &self,
        listing: NewListing,
        created_at: TimeMs,
    ) -> Result<Listing, StoreError> {
        let start_price = listing.params.start_price.to_canonical_string();
        let result = sqlx::query(
            r#"
            INSERT INTO listings (
                seller_id, title, description, category, start_price, min_price,
                decay_rate_per_hour, anchor_value, anchor_time_ms, sold, buyer_id, created_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, NULL, ?)
            "#,
        )
        .bind(listing.seller_id.as_str())
        .bind(&listing.title)
        .bind(&listing.description)
        .bind(listing.category.as_str())
        .bind(&start_price)
        .bind(listing.params.min_price.to_canonical_string())
        .bind(listing.params.decay_rate_per_hour.to_canonical_string())
        .bind(&start_price)
        .bind(created_at.as_ms())
        .bind(created_at.as_ms())
        .execute(&self.pool)
        .await?;

        let id = ListingId::new(result.last_insert_rowid());
        Ok(Listing::from_new(id, listing, created_at))
    }

    async fn list_listings(&self, filter: &ListingFilter) -> Result<Vec<Listing>, StoreError> {
        let category = filter.category.map(|c| c.as_str());
        let seller = filter.seller_id.as_ref().map(|s| s.as_str());

        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM listings
            WHERE (? IS NULL OR category = ?)
              AND (? IS NULL OR seller_id = ?)
              AND (? = 1 OR sold = 0)
            ORDER BY id ASC
            "#,
            LISTING_COLUMNS
        ))
        .bind(category)
        .bind(category)
        .bind(seller)
        .bind(seller)
        .bind(filter.include_sold as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(listing_from_row).collect()
    }

    async fn purchases_by_buyer(
        &self,
        buyer: &UserId,
    ) -> Result<Vec<PurchaseRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM purchases WHERE buyer_id = ? ORDER BY purchased_at_ms DESC, id ASC",
            PURCHASE_COLUMNS
        ))
        .bind(buyer.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(purchase_from_row).collect()
    }

    async fn purchase_for_listing(
        &self,
        id: ListingId,
    ) -> Result<Option<PurchaseRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM purchases WHERE listing_id = ?",
            PURCHASE_COLUMNS
        ))
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(purchase_from_row).transpose()
    }
}
