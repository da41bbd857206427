//! Lazy, server-side price computation over stored anchors.

use super::clock::Clock;
use super::decay::{effective_price, DecayStep};
use crate::domain::{Decimal, Listing, ListingId, TimeMs};
use crate::store::{ListingStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Price view returned to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceQuote {
    pub listing_id: ListingId,
    pub price: Decimal,
    pub min_price: Decimal,
    pub start_price: Decimal,
    /// Next hourly step; `None` once sold.
    pub next_decay_at: Option<TimeMs>,
    pub sold: bool,
}

impl PriceQuote {
    pub fn new(listing: &Listing, step: &DecayStep) -> Self {
        Self {
            listing_id: listing.id,
            price: step.price,
            min_price: listing.params.min_price,
            start_price: listing.params.start_price,
            next_decay_at: (!listing.sold).then(|| step.anchor.time.plus_hours(1)),
            sold: listing.sold,
        }
    }
}

#[derive(Debug, Error)]
pub enum PricingError {
    #[error("listing {0} not found")]
    NotFound(ListingId),
    #[error("listing {id} has invalid pricing data: {reason}")]
    InvariantViolation { id: ListingId, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Pure pricing of a listing at `now`.
///
/// Sold listings return their frozen anchor. Stored parameters are re-checked first; a
/// listing that fails the check is reported, never repaired.
pub fn current_price_at(listing: &Listing, now: TimeMs) -> Result<DecayStep, PricingError> {
    let violation = |reason: String| PricingError::InvariantViolation {
        id: listing.id,
        reason,
    };

    listing.params.check().map_err(violation)?;

    if listing.sold {
        return Ok(DecayStep {
            price: listing.anchor.value,
            anchor: listing.anchor,
            changed: false,
        });
    }

    let anchor = listing.anchor;
    if anchor.value < listing.params.min_price || anchor.value > listing.params.start_price {
        return Err(violation(format!(
            "anchor {} outside [{}, {}]",
            anchor.value, listing.params.min_price, listing.params.start_price
        )));
    }

    Ok(effective_price(&listing.params, anchor, now))
}

/// Computes current prices on demand and lazily advances stored anchors.
#[derive(Debug, Clone)]
pub struct PricingEngine {
    store: Arc<dyn ListingStore>,
    clock: Arc<dyn Clock>,
}

impl PricingEngine {
    pub fn new(store: Arc<dyn ListingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Current price of a listing, persisting the advanced anchor when it moved.
    ///
    /// The returned price is authoritative whether or not the write-back lands.
    pub async fn current_price(&self, id: ListingId) -> Result<PriceQuote, PricingError> {
        let listing = self.load(id).await?;
        let now = self.clock.now();
        let step = self.evaluate(&listing, now)?;

        if step.changed {
            self.write_back(&listing, &step).await;
        }

        Ok(PriceQuote::new(&listing, &step))
    }

    /// Price a listing at an arbitrary instant without touching the stored anchor.
    pub async fn preview_price(
        &self,
        id: ListingId,
        at: TimeMs,
    ) -> Result<PriceQuote, PricingError> {
        let listing = self.load(id).await?;
        let step = self.evaluate(&listing, at)?;
        Ok(PriceQuote::new(&listing, &step))
    }

    async fn load(&self, id: ListingId) -> Result<Listing, PricingError> {
        self.store
            .get_for_read(id)
            .await?
            .ok_or(PricingError::NotFound(id))
    }

    fn evaluate(&self, listing: &Listing, now: TimeMs) -> Result<DecayStep, PricingError> {
        current_price_at(listing, now).map_err(|e| {
            if let PricingError::InvariantViolation { id, reason } = &e {
                error!(listing_id = %id, %reason, "Stored pricing data violates invariants");
            }
            e
        })
    }

    async fn write_back(&self, listing: &Listing, step: &DecayStep) {
        match self
            .store
            .apply_price_anchor(listing.id, listing.anchor, step.anchor)
            .await
        {
            Ok(true) => debug!(
                listing_id = %listing.id,
                price = %step.anchor.value,
                anchor_ms = step.anchor.time.as_ms(),
                "Advanced price anchor"
            ),
            Ok(false) => debug!(
                listing_id = %listing.id,
                "Anchor changed concurrently, skipping write-back"
            ),
            Err(e) => warn!(
                listing_id = %listing.id,
                error = %e,
                "Failed to persist advanced price anchor"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Category, NewListing, PriceAnchor, PricingParams, PurchaseRecord, Sale, UserId, HOUR_MS,
    };
    use crate::engine::clock::ManualClock;
    use crate::store::MemoryListingStore;
    use std::str::FromStr;

    const T0: i64 = 1_700_000_000_000;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn new_listing() -> NewListing {
        NewListing {
            seller_id: UserId::new("seller"),
            title: "Camera".to_string(),
            description: "35mm film camera".to_string(),
            category: Category::Electronics,
            params: PricingParams {
                start_price: d("100"),
                min_price: d("20"),
                decay_rate_per_hour: d("1"),
            },
        }
    }

    async fn setup() -> (PricingEngine, Arc<MemoryListingStore>, Arc<ManualClock>, Listing) {
        let store = Arc::new(MemoryListingStore::new());
        let clock = Arc::new(ManualClock::new(TimeMs::new(T0)));
        let listing = store
            .insert_listing(new_listing(), TimeMs::new(T0))
            .await
            .unwrap();
        let engine = PricingEngine::new(store.clone(), clock.clone());
        (engine, store, clock, listing)
    }

    #[tokio::test]
    async fn test_current_price_writes_back_whole_hour_anchor() {
        let (engine, store, clock, listing) = setup().await;
        clock.set(TimeMs::new(T0 + 5 * HOUR_MS / 2));

        let quote = engine.current_price(listing.id).await.unwrap();
        assert_eq!(quote.price, d("98"));
        assert_eq!(quote.next_decay_at, Some(TimeMs::new(T0 + 3 * HOUR_MS)));

        let stored = store.get_for_read(listing.id).await.unwrap().unwrap();
        assert_eq!(
            stored.anchor,
            PriceAnchor::new(d("98"), TimeMs::new(T0 + 2 * HOUR_MS))
        );
    }

    #[tokio::test]
    async fn test_repeated_reads_do_not_double_apply() {
        let (engine, _store, clock, listing) = setup().await;
        clock.set(TimeMs::new(T0 + 4 * HOUR_MS + 10));

        let first = engine.current_price(listing.id).await.unwrap();
        let second = engine.current_price(listing.id).await.unwrap();
        assert_eq!(first.price, d("96"));
        assert_eq!(second.price, d("96"));
    }

    #[tokio::test]
    async fn test_write_back_failure_still_returns_price() {
        let (engine, store, clock, listing) = setup().await;
        store.fail_anchor_writes(true);
        clock.set(TimeMs::new(T0 + 3 * HOUR_MS));

        let quote = engine.current_price(listing.id).await.unwrap();
        assert_eq!(quote.price, d("97"));

        let stored = store.get_for_read(listing.id).await.unwrap().unwrap();
        assert_eq!(stored.anchor, listing.anchor);
    }

    #[tokio::test]
    async fn test_preview_does_not_persist() {
        let (engine, store, _clock, listing) = setup().await;

        let quote = engine
            .preview_price(listing.id, TimeMs::new(T0 + 10 * HOUR_MS))
            .await
            .unwrap();
        assert_eq!(quote.price, d("90"));

        let stored = store.get_for_read(listing.id).await.unwrap().unwrap();
        assert_eq!(stored.anchor, listing.anchor);
    }

    #[tokio::test]
    async fn test_not_found() {
        let (engine, _store, _clock, _listing) = setup().await;
        let err = engine.current_price(ListingId::new(999)).await.unwrap_err();
        assert!(matches!(err, PricingError::NotFound(id) if id == ListingId::new(999)));
    }

    #[tokio::test]
    async fn test_sold_listing_price_is_frozen() {
        let (engine, store, clock, listing) = setup().await;
        let sale = Sale {
            buyer_id: UserId::new("buyer"),
            price: d("93"),
            sold_at: TimeMs::new(T0 + 7 * HOUR_MS),
        };
        let record = PurchaseRecord::for_sale(listing.id, &sale);
        let lock = store.get_for_update(listing.id).await.unwrap().unwrap();
        store.commit_purchase(lock, &sale, &record).await.unwrap();

        clock.set(TimeMs::new(T0 + 500 * HOUR_MS));
        let quote = engine.current_price(listing.id).await.unwrap();
        assert_eq!(quote.price, d("93"));
        assert!(quote.sold);
        assert_eq!(quote.next_decay_at, None);
    }

    #[test]
    fn test_corrupt_parameters_are_invariant_violations() {
        let mut listing = Listing::from_new(ListingId::new(1), new_listing(), TimeMs::new(T0));
        listing.params.decay_rate_per_hour = d("-2");
        let err = current_price_at(&listing, TimeMs::new(T0)).unwrap_err();
        assert!(matches!(err, PricingError::InvariantViolation { .. }));

        let mut listing = Listing::from_new(ListingId::new(1), new_listing(), TimeMs::new(T0));
        listing.anchor.value = d("150");
        let err = current_price_at(&listing, TimeMs::new(T0)).unwrap_err();
        assert!(matches!(err, PricingError::InvariantViolation { .. }));
    }
}
