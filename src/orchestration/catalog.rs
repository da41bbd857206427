//! Listing creation and browsing with live prices.

use crate::domain::{
    Category, Decimal, Listing, ListingDraft, TimeMs, UserId, ValidationError,
};
use crate::engine::{current_price_at, Clock, PriceQuote};
use crate::store::{ListingFilter, ListingStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest" => Ok(SortOrder::Newest),
            "price-asc" => Ok(SortOrder::PriceAsc),
            "price-desc" => Ok(SortOrder::PriceDesc),
            other => Err(format!(
                "must be newest, price-asc, or price-desc, got {}",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BrowseQuery {
    pub category: Option<Category>,
    /// Case-insensitive substring of the title or description.
    pub search: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub sort: SortOrder,
    pub page: u32,
    pub limit: u32,
}

/// A listing paired with its live price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedListing {
    pub listing: Listing,
    pub quote: PriceQuote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowsePage {
    pub items: Vec<PricedListing>,
    pub total: usize,
    pub page: u32,
    pub total_pages: u32,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct Catalog {
    store: Arc<dyn ListingStore>,
    clock: Arc<dyn Clock>,
    default_decay_rate: Decimal,
}

impl Catalog {
    pub fn new(
        store: Arc<dyn ListingStore>,
        clock: Arc<dyn Clock>,
        default_decay_rate: Decimal,
    ) -> Self {
        Self {
            store,
            clock,
            default_decay_rate,
        }
    }

    pub async fn create_listing(&self, draft: ListingDraft) -> Result<Listing, CatalogError> {
        let new = draft.validate(self.default_decay_rate)?;
        let listing = self.store.insert_listing(new, self.clock.now()).await?;
        info!(
            listing_id = %listing.id,
            seller = %listing.seller_id,
            category = %listing.category,
            start_price = %listing.params.start_price,
            "Listing created"
        );
        Ok(listing)
    }

    /// Unsold listings priced at the current instant, filtered, sorted and paginated.
    pub async fn browse(&self, query: &BrowseQuery) -> Result<BrowsePage, CatalogError> {
        let filter = ListingFilter {
            category: query.category,
            ..ListingFilter::unsold()
        };
        let listings = self.store.list_listings(&filter).await?;
        let mut priced = self.price_all(listings, self.clock.now());

        let needle = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        priced.retain(|p| {
            needle.as_deref().map_or(true, |n| matches_text(&p.listing, n))
                && query.min_price.map_or(true, |min| p.quote.price >= min)
                && query.max_price.map_or(true, |max| p.quote.price <= max)
        });

        match query.sort {
            SortOrder::Newest => priced.sort_by(|a, b| {
                b.listing
                    .created_at
                    .cmp(&a.listing.created_at)
                    .then(b.listing.id.cmp(&a.listing.id))
            }),
            SortOrder::PriceAsc => priced.sort_by(|a, b| {
                a.quote
                    .price
                    .cmp(&b.quote.price)
                    .then(a.listing.id.cmp(&b.listing.id))
            }),
            SortOrder::PriceDesc => priced.sort_by(|a, b| {
                b.quote
                    .price
                    .cmp(&a.quote.price)
                    .then(a.listing.id.cmp(&b.listing.id))
            }),
        }

        let page = query.page.max(1);
        let limit = match query.limit {
            0 => DEFAULT_PAGE_SIZE,
            n => n.min(MAX_PAGE_SIZE),
        };
        let total = priced.len();
        let total_pages = total.div_ceil(limit as usize) as u32;
        let items = priced
            .into_iter()
            .skip((page as usize - 1) * limit as usize)
            .take(limit as usize)
            .collect();

        Ok(BrowsePage {
            items,
            total,
            page,
            total_pages,
        })
    }

    /// Every listing of a seller, sold or not, with live prices.
    pub async fn seller_listings(
        &self,
        seller_id: &UserId,
    ) -> Result<Vec<PricedListing>, CatalogError> {
        let filter = ListingFilter {
            seller_id: Some(seller_id.clone()),
            include_sold: true,
            ..ListingFilter::default()
        };
        let mut listings = self.store.list_listings(&filter).await?;
        listings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(self.price_all(listings, self.clock.now()))
    }

    fn price_all(&self, listings: Vec<Listing>, now: TimeMs) -> Vec<PricedListing> {
        listings
            .into_iter()
            .filter_map(|listing| match current_price_at(&listing, now) {
                Ok(step) => Some(PricedListing {
                    quote: PriceQuote::new(&listing, &step),
                    listing,
                }),
                Err(e) => {
                    warn!(listing_id = %listing.id, error = %e, "Skipping unpriceable listing");
                    None
                }
            })
            .collect()
    }
}

fn matches_text(listing: &Listing, needle: &str) -> bool {
    listing.title.to_lowercase().contains(needle)
        || listing.description.to_lowercase().contains(needle)
}
