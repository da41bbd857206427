//! Listing store abstraction.
//!
//! The store exclusively owns listing and purchase state. The pricing engine and the purchase
//! coordinator are stateless and call into it for every request.

use crate::domain::{
    Category, Listing, ListingId, NewListing, PriceAnchor, PurchaseRecord, Sale, TimeMs, UserId,
};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub mod memory;

pub use memory::MemoryListingStore;

/// Durable storage of listings and purchase records.
#[async_trait]
pub trait ListingStore: Send + Sync + fmt::Debug {
    /// Fetch a listing without taking any lock.
    async fn get_for_read(&self, id: ListingId) -> Result<Option<Listing>, StoreError>;

    /// Fetch a listing and hold its purchase lock until the returned handle is committed or
    /// dropped. Dropping the handle without committing discards every change made under it.
    async fn get_for_update(
        &self,
        id: ListingId,
    ) -> Result<Option<Box<dyn ListingLock>>, StoreError>;

    /// Best-effort anchor write-back.
    ///
    /// Applies `next` only if the listing is unsold and its stored anchor still equals
    /// `expected`. Returns whether the row was updated.
    async fn apply_price_anchor(
        &self,
        id: ListingId,
        expected: PriceAnchor,
        next: PriceAnchor,
    ) -> Result<bool, StoreError>;

    /// Mark the locked listing sold and insert its purchase record, atomically.
    async fn commit_purchase(
        &self,
        lock: Box<dyn ListingLock>,
        sale: &Sale,
        record: &PurchaseRecord,
    ) -> Result<(), StoreError> {
        lock.commit(sale, record).await
    }

    /// Insert a validated listing; the anchor starts at `(start_price, created_at)`.
    async fn insert_listing(
        &self,
        listing: NewListing,
        created_at: TimeMs,
    ) -> Result<Listing, StoreError>;

    /// Listings matching `filter`, ordered by id.
    async fn list_listings(&self, filter: &ListingFilter) -> Result<Vec<Listing>, StoreError>;

    /// Purchases made by `buyer`, newest first.
    async fn purchases_by_buyer(&self, buyer: &UserId)
        -> Result<Vec<PurchaseRecord>, StoreError>;

    async fn purchase_for_listing(
        &self,
        id: ListingId,
    ) -> Result<Option<PurchaseRecord>, StoreError>;
}

/// A listing held under its purchase lock.
#[async_trait]
pub trait ListingLock: Send {
    /// The listing as read under the lock.
    fn listing(&self) -> &Listing;

    /// Apply the sale and insert the record, then release the lock.
    async fn commit(self: Box<Self>, sale: &Sale, record: &PurchaseRecord)
        -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingFilter {
    pub category: Option<Category>,
    pub seller_id: Option<UserId>,
    pub include_sold: bool,
}

impl ListingFilter {
    pub fn unsold() -> Self {
        Self::default()
    }

    pub fn matches(&self, listing: &Listing) -> bool {
        (self.include_sold || !listing.sold)
            && self.category.map_or(true, |c| listing.category == c)
            && self
                .seller_id
                .as_ref()
                .map_or(true, |s| &listing.seller_id == s)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The lock could not be acquired in time. Retryable.
    #[error("timed out waiting for the listing lock")]
    LockTimeout,
    /// The listing was sold by someone else between lock and commit.
    #[error("listing {0} was already sold")]
    Conflict(ListingId),
    #[error("corrupt stored data: {0}")]
    Corrupt(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Decimal, PricingParams};

    fn listing(seller: &str, category: Category, sold: bool) -> Listing {
        Listing {
            id: ListingId::new(1),
            seller_id: UserId::new(seller),
            title: "Lamp".to_string(),
            description: "Brass desk lamp".to_string(),
            category,
            params: PricingParams {
                start_price: Decimal::from_i64(10),
                min_price: Decimal::from_i64(1),
                decay_rate_per_hour: Decimal::one(),
            },
            anchor: PriceAnchor::new(Decimal::from_i64(10), TimeMs::new(0)),
            sold,
            buyer_id: None,
            created_at: TimeMs::new(0),
        }
    }

    #[test]
    fn test_filter_matches() {
        let unsold = ListingFilter::unsold();
        assert!(unsold.matches(&listing("a", Category::Books, false)));
        assert!(!unsold.matches(&listing("a", Category::Books, true)));

        let books = ListingFilter {
            category: Some(Category::Books),
            ..ListingFilter::default()
        };
        assert!(!books.matches(&listing("a", Category::Other, false)));

        let by_seller = ListingFilter {
            seller_id: Some(UserId::new("a")),
            include_sold: true,
            ..ListingFilter::default()
        };
        assert!(by_seller.matches(&listing("a", Category::Other, true)));
        assert!(!by_seller.matches(&listing("b", Category::Other, true)));
    }

    #[test]
    fn test_store_error_display() {
        assert_eq!(
            StoreError::Conflict(ListingId::new(4)).to_string(),
            "listing 4 was already sold"
        );
        assert_eq!(
            StoreError::Unavailable("disk".to_string()).to_string(),
            "store unavailable: disk"
        );
    }
}
