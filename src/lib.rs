pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;
pub mod store;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{Decimal, Listing, ListingId, PriceAnchor, PurchaseRecord, TimeMs, UserId};
pub use engine::{Clock, ManualClock, PriceQuote, PricingEngine, SystemClock};
pub use error::AppError;
pub use orchestration::{Catalog, PurchaseCoordinator, PurchaseError};
pub use store::{ListingStore, MemoryListingStore, StoreError};
