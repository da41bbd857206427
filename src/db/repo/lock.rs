use super::{is_unique_violation, listing_from_row, LISTING_COLUMNS};
use crate::domain::{Listing, ListingId, PurchaseRecord, Sale};
use crate::store::{ListingLock, StoreError};
use async_trait::async_trait;
use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::Transaction;

/// An open transaction holding the database write lock plus the listing read under it.
///
/// Dropping it without committing rolls the transaction back.
pub struct SqliteListingLock {
    tx: Transaction<'static, Sqlite>,
    listing: Listing,
}

impl SqliteListingLock {
    pub(super) async fn acquire(
        pool: &SqlitePool,
        id: ListingId,
    ) -> Result<Option<Self>, StoreError> {
        let mut tx = pool.begin().await?;

        // A write as the first statement takes the write lock up front (like BEGIN IMMEDIATE),
        // so competing purchases queue on busy_timeout instead of reading a row they cannot
        // later update.
        sqlx::query("UPDATE listings SET sold = sold WHERE id = ?")
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM listings WHERE id = ?",
            LISTING_COLUMNS
        ))
        .bind(id.as_i64())
        .fetch_optional(&mut *tx)
        .await?;

        match row {
            Some(row) => Ok(Some(Self {
                listing: listing_from_row(&row)?,
                tx,
            })),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ListingLock for SqliteListingLock {
    fn listing(&self) -> &Listing {
        &self.listing
    }

    async fn commit(
        self: Box<Self>,
        sale: &Sale,
        record: &PurchaseRecord,
    ) -> Result<(), StoreError> {
        let SqliteListingLock { mut tx, listing } = *self;

        let updated = sqlx::query(
            r#"
            UPDATE listings
            SET sold = 1, buyer_id = ?, anchor_value = ?, anchor_time_ms = ?
            WHERE id = ? AND sold = 0
            "#,
        )
        .bind(sale.buyer_id.as_str())
        .bind(sale.price.to_canonical_string())
        .bind(sale.sold_at.as_ms())
        .bind(listing.id.as_i64())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() != 1 {
            return Err(StoreError::Conflict(listing.id));
        }

        sqlx::query(
            r#"
            INSERT INTO purchases (id, listing_id, buyer_id, price_paid, purchased_at_ms)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.listing_id.as_i64())
        .bind(record.buyer_id.as_str())
        .bind(record.price_paid.to_canonical_string())
        .bind(record.purchased_at.as_ms())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(listing.id)
            } else {
                StoreError::from(e)
            }
        })?;

        tx.commit().await?;
        Ok(())
    }
}
