//! Domain types for the decaying-price marketplace.
//!
//! This module provides:
//! - Lossless money handling via the Decimal wrapper
//! - Primitives: TimeMs, ListingId, UserId, PurchaseId, Category
//! - Listing, pricing anchor and purchase record types
//! - Creation-time validation of listing input

pub mod decimal;
pub mod listing;
pub mod primitives;

pub use decimal::Decimal;
pub use listing::{
    Listing, ListingDraft, NewListing, PriceAnchor, PricingParams, PurchaseRecord, Sale,
    ValidationError,
};
pub use primitives::{Category, ListingId, PurchaseId, TimeMs, UserId, HOUR_MS};
