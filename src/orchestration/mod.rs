//! Request-level coordination over the store and the pricing engine.

pub mod catalog;
pub mod purchase;

pub use catalog::{BrowsePage, BrowseQuery, Catalog, CatalogError, PricedListing, SortOrder};
pub use purchase::{PurchaseCoordinator, PurchaseError};
