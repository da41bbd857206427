//! Purchase coordination: one winner per listing, price computed once and frozen.

use crate::domain::{ListingId, PurchaseRecord, Sale, UserId};
use crate::engine::{current_price_at, Clock, PricingError};
use crate::store::{ListingStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum PurchaseError {
    #[error("listing {0} not found")]
    NotFound(ListingId),
    #[error("listing {0} has already been sold")]
    AlreadySold(ListingId),
    #[error("sellers cannot buy their own listing {0}")]
    SelfPurchase(ListingId),
    /// Lock wait timed out. Nothing was written; the caller may retry.
    #[error("listing {0} is busy, try again")]
    Busy(ListingId),
    #[error("listing {id} has invalid pricing data: {reason}")]
    InvariantViolation { id: ListingId, reason: String },
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl PurchaseError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PurchaseError::Busy(_) | PurchaseError::StoreUnavailable(_)
        )
    }

    fn from_store(id: ListingId, err: StoreError) -> Self {
        match err {
            StoreError::LockTimeout => PurchaseError::Busy(id),
            StoreError::Conflict(_) => PurchaseError::AlreadySold(id),
            StoreError::Corrupt(reason) => PurchaseError::InvariantViolation { id, reason },
            StoreError::Unavailable(msg) => PurchaseError::StoreUnavailable(msg),
        }
    }
}

impl From<PricingError> for PurchaseError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::NotFound(id) => PurchaseError::NotFound(id),
            PricingError::InvariantViolation { id, reason } => {
                PurchaseError::InvariantViolation { id, reason }
            }
            PricingError::Store(e) => PurchaseError::StoreUnavailable(e.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PurchaseCoordinator {
    store: Arc<dyn ListingStore>,
    clock: Arc<dyn Clock>,
    lock_timeout: Duration,
}

impl PurchaseCoordinator {
    pub fn new(store: Arc<dyn ListingStore>, clock: Arc<dyn Clock>, lock_timeout: Duration) -> Self {
        Self {
            store,
            clock,
            lock_timeout,
        }
    }

    /// Buy `listing_id` for `buyer_id` at the price in effect once the listing is locked.
    ///
    /// Either the listing is marked sold and exactly one purchase record is written, or
    /// nothing changes.
    pub async fn purchase(
        &self,
        listing_id: ListingId,
        buyer_id: &UserId,
    ) -> Result<PurchaseRecord, PurchaseError> {
        let lock = match tokio::time::timeout(
            self.lock_timeout,
            self.store.get_for_update(listing_id),
        )
        .await
        {
            Err(_elapsed) => return Err(PurchaseError::Busy(listing_id)),
            Ok(result) => result
                .map_err(|e| PurchaseError::from_store(listing_id, e))?
                .ok_or(PurchaseError::NotFound(listing_id))?,
        };

        // Sampled once, under the lock.
        let now = self.clock.now();

        let (sale, seller_id) = {
            let listing = lock.listing();

            if listing.sold {
                debug!(listing_id = %listing_id, buyer = %buyer_id, "Lost purchase race");
                return Err(PurchaseError::AlreadySold(listing_id));
            }
            if &listing.seller_id == buyer_id {
                debug!(listing_id = %listing_id, "Rejected self-purchase");
                return Err(PurchaseError::SelfPurchase(listing_id));
            }

            let step = current_price_at(listing, now).map_err(|e| {
                error!(listing_id = %listing_id, error = %e, "Refusing to sell listing");
                PurchaseError::from(e)
            })?;

            let sale = Sale {
                buyer_id: buyer_id.clone(),
                price: step.price,
                sold_at: now,
            };
            (sale, listing.seller_id.clone())
        };
        let record = PurchaseRecord::for_sale(listing_id, &sale);

        self.store
            .commit_purchase(lock, &sale, &record)
            .await
            .map_err(|e| PurchaseError::from_store(listing_id, e))?;

        info!(
            listing_id = %listing_id,
            buyer = %buyer_id,
            seller = %seller_id,
            price = %record.price_paid,
            purchase_id = %record.id,
            "Listing purchased"
        );

        Ok(record)
    }
}
