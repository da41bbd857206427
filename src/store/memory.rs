//! In-process listing store for tests and embedding.
//!
//! Each listing sits behind its own async mutex, so purchases on one listing serialize while
//! other listings stay independent.

use super::{ListingFilter, ListingLock, ListingStore, StoreError};
use crate::domain::{
    Listing, ListingId, NewListing, PriceAnchor, PurchaseRecord, Sale, TimeMs, UserId,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as RowMutex, OwnedMutexGuard};

type Row = Arc<RowMutex<Listing>>;

#[derive(Debug, Default)]
struct Rows {
    next_id: i64,
    by_id: BTreeMap<ListingId, Row>,
}

#[derive(Debug, Default)]
pub struct MemoryListingStore {
    rows: Mutex<Rows>,
    purchases: Arc<Mutex<Vec<PurchaseRecord>>>,
    fail_anchor_writes: AtomicBool,
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Unavailable("memory store lock poisoned".to_string())
}

impl MemoryListingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `apply_price_anchor` fail, to exercise the read path's error handling.
    pub fn fail_anchor_writes(&self, fail: bool) {
        self.fail_anchor_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of purchase records for a listing.
    pub fn purchase_count(&self, id: ListingId) -> usize {
        self.purchases
            .lock()
            .map(|p| p.iter().filter(|r| r.listing_id == id).count())
            .unwrap_or(0)
    }

    fn rows(&self) -> Result<MutexGuard<'_, Rows>, StoreError> {
        self.rows.lock().map_err(poisoned)
    }

    fn row(&self, id: ListingId) -> Result<Option<Row>, StoreError> {
        Ok(self.rows()?.by_id.get(&id).cloned())
    }
}

#[async_trait]
impl ListingStore for MemoryListingStore {
    async fn get_for_read(&self, id: ListingId) -> Result<Option<Listing>, StoreError> {
        match self.row(id)? {
            Some(row) => Ok(Some(row.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn get_for_update(
        &self,
        id: ListingId,
    ) -> Result<Option<Box<dyn ListingLock>>, StoreError> {
        let Some(row) = self.row(id)? else {
            return Ok(None);
        };
        let guard = row.lock_owned().await;
        Ok(Some(Box::new(MemoryListingLock {
            guard,
            purchases: self.purchases.clone(),
        })))
    }

    async fn apply_price_anchor(
        &self,
        id: ListingId,
        expected: PriceAnchor,
        next: PriceAnchor,
    ) -> Result<bool, StoreError> {
        if self.fail_anchor_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("anchor writes disabled".to_string()));
        }
        let Some(row) = self.row(id)? else {
            return Ok(false);
        };
        let mut listing = row.lock().await;
        if listing.sold || listing.anchor != expected {
            return Ok(false);
        }
        listing.anchor = next;
        Ok(true)
    }

    async fn insert_listing(
        &self,
        listing: NewListing,
        created_at: TimeMs,
    ) -> Result<Listing, StoreError> {
        let mut rows = self.rows()?;
        rows.next_id += 1;
        let id = ListingId::new(rows.next_id);
        let listing = Listing::from_new(id, listing, created_at);
        rows.by_id
            .insert(id, Arc::new(RowMutex::new(listing.clone())));
        Ok(listing)
    }

    async fn list_listings(&self, filter: &ListingFilter) -> Result<Vec<Listing>, StoreError> {
        let rows: Vec<Row> = self.rows()?.by_id.values().cloned().collect();
        let mut out = Vec::new();
        for row in rows {
            let listing = row.lock().await;
            if filter.matches(&listing) {
                out.push(listing.clone());
            }
        }
        Ok(out)
    }

    async fn purchases_by_buyer(
        &self,
        buyer: &UserId,
    ) -> Result<Vec<PurchaseRecord>, StoreError> {
        let purchases = self.purchases.lock().map_err(poisoned)?;
        let mut out: Vec<PurchaseRecord> = purchases
            .iter()
            .filter(|p| &p.buyer_id == buyer)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.purchased_at.cmp(&a.purchased_at));
        Ok(out)
    }

    async fn purchase_for_listing(
        &self,
        id: ListingId,
    ) -> Result<Option<PurchaseRecord>, StoreError> {
        let purchases = self.purchases.lock().map_err(poisoned)?;
        Ok(purchases.iter().find(|p| p.listing_id == id).cloned())
    }
}

struct MemoryListingLock {
    guard: OwnedMutexGuard<Listing>,
    purchases: Arc<Mutex<Vec<PurchaseRecord>>>,
}

#[async_trait]
impl ListingLock for MemoryListingLock {
    fn listing(&self) -> &Listing {
        &self.guard
    }

    async fn commit(
        mut self: Box<Self>,
        sale: &Sale,
        record: &PurchaseRecord,
    ) -> Result<(), StoreError> {
        let id = self.guard.id;
        let mut purchases = self.purchases.lock().map_err(poisoned)?;
        if self.guard.sold || purchases.iter().any(|p| p.listing_id == id) {
            return Err(StoreError::Conflict(id));
        }

        purchases.push(record.clone());
        let listing = &mut *self.guard;
        listing.sold = true;
        listing.buyer_id = Some(sale.buyer_id.clone());
        listing.anchor = PriceAnchor::new(sale.price, sale.sold_at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Category, Decimal, PricingParams};

    fn new_listing(seller: &str) -> NewListing {
        NewListing {
            seller_id: UserId::new(seller),
            title: "Road bike".to_string(),
            description: "Aluminium frame, 56cm".to_string(),
            category: Category::Other,
            params: PricingParams {
                start_price: Decimal::from_i64(100),
                min_price: Decimal::from_i64(20),
                decay_rate_per_hour: Decimal::one(),
            },
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_sequential_ids() {
        let store = MemoryListingStore::new();
        let a = store.insert_listing(new_listing("s"), TimeMs::new(0)).await.unwrap();
        let b = store.insert_listing(new_listing("s"), TimeMs::new(0)).await.unwrap();
        assert_eq!(a.id, ListingId::new(1));
        assert_eq!(b.id, ListingId::new(2));
        assert_eq!(store.get_for_read(b.id).await.unwrap(), Some(b));
    }

    #[tokio::test]
    async fn test_anchor_write_is_compare_and_swap() {
        let store = MemoryListingStore::new();
        let listing = store.insert_listing(new_listing("s"), TimeMs::new(0)).await.unwrap();
        let next = PriceAnchor::new(Decimal::from_i64(99), TimeMs::new(3_600_000));

        let stale = PriceAnchor::new(Decimal::from_i64(50), TimeMs::new(0));
        assert!(!store.apply_price_anchor(listing.id, stale, next).await.unwrap());
        assert!(store
            .apply_price_anchor(listing.id, listing.anchor, next)
            .await
            .unwrap());

        let stored = store.get_for_read(listing.id).await.unwrap().unwrap();
        assert_eq!(stored.anchor, next);
    }

    #[tokio::test]
    async fn test_dropped_lock_leaves_no_changes() {
        let store = MemoryListingStore::new();
        let listing = store.insert_listing(new_listing("s"), TimeMs::new(0)).await.unwrap();

        let lock = store.get_for_update(listing.id).await.unwrap().unwrap();
        drop(lock);

        let stored = store.get_for_read(listing.id).await.unwrap().unwrap();
        assert!(!stored.sold);
        assert_eq!(store.purchase_count(listing.id), 0);
    }

    #[tokio::test]
    async fn test_commit_twice_conflicts() {
        let store = MemoryListingStore::new();
        let listing = store.insert_listing(new_listing("s"), TimeMs::new(0)).await.unwrap();
        let sale = Sale {
            buyer_id: UserId::new("b"),
            price: Decimal::from_i64(90),
            sold_at: TimeMs::new(10),
        };
        let record = PurchaseRecord::for_sale(listing.id, &sale);

        let lock = store.get_for_update(listing.id).await.unwrap().unwrap();
        store.commit_purchase(lock, &sale, &record).await.unwrap();

        let lock = store.get_for_update(listing.id).await.unwrap().unwrap();
        assert!(lock.listing().sold);
        let err = store.commit_purchase(lock, &sale, &record).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.purchase_count(listing.id), 1);
    }

    #[tokio::test]
    async fn test_anchor_write_ignored_after_sale() {
        let store = MemoryListingStore::new();
        let listing = store.insert_listing(new_listing("s"), TimeMs::new(0)).await.unwrap();
        let sale = Sale {
            buyer_id: UserId::new("b"),
            price: Decimal::from_i64(100),
            sold_at: TimeMs::new(0),
        };
        let record = PurchaseRecord::for_sale(listing.id, &sale);
        let lock = store.get_for_update(listing.id).await.unwrap().unwrap();
        store.commit_purchase(lock, &sale, &record).await.unwrap();

        let next = PriceAnchor::new(Decimal::from_i64(99), TimeMs::new(3_600_000));
        let frozen = PriceAnchor::new(Decimal::from_i64(100), TimeMs::new(0));
        assert!(!store.apply_price_anchor(listing.id, frozen, next).await.unwrap());
    }
}
