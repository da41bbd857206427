//! Listing and purchase record types.

use super::{Category, Decimal, ListingId, PurchaseId, TimeMs, UserId};
use thiserror::Error;

/// Immutable pricing parameters fixed at listing creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingParams {
    pub start_price: Decimal,
    pub min_price: Decimal,
    pub decay_rate_per_hour: Decimal,
}

impl PricingParams {
    /// Check the stored parameters still satisfy `0 <= min <= start`, `start > 0`, `rate >= 0`.
    pub fn check(&self) -> Result<(), String> {
        if !self.start_price.is_positive() {
            return Err(format!("start price {} is not positive", self.start_price));
        }
        if self.min_price.is_negative() {
            return Err(format!("min price {} is negative", self.min_price));
        }
        if self.min_price > self.start_price {
            return Err(format!(
                "min price {} exceeds start price {}",
                self.min_price, self.start_price
            ));
        }
        if self.decay_rate_per_hour.is_negative() {
            return Err(format!(
                "decay rate {} is negative",
                self.decay_rate_per_hour
            ));
        }
        Ok(())
    }
}

/// The `(price, time)` pair future decay is computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceAnchor {
    pub value: Decimal,
    pub time: TimeMs,
}

impl PriceAnchor {
    pub fn new(value: Decimal, time: TimeMs) -> Self {
        Self { value, time }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub id: ListingId,
    pub seller_id: UserId,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub params: PricingParams,
    pub anchor: PriceAnchor,
    pub sold: bool,
    pub buyer_id: Option<UserId>,
    pub created_at: TimeMs,
}

impl Listing {
    /// Build a fresh unsold listing whose anchor starts at the start price.
    pub fn from_new(id: ListingId, new: NewListing, created_at: TimeMs) -> Self {
        Self {
            id,
            seller_id: new.seller_id,
            title: new.title,
            description: new.description,
            category: new.category,
            anchor: PriceAnchor::new(new.params.start_price, created_at),
            params: new.params,
            sold: false,
            buyer_id: None,
            created_at,
        }
    }
}

/// A validated listing awaiting insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewListing {
    pub seller_id: UserId,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub params: PricingParams,
}

/// Unvalidated listing input as received from a caller.
#[derive(Debug, Clone, Default)]
pub struct ListingDraft {
    pub seller_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub start_price: Decimal,
    pub min_price: Decimal,
    pub decay_rate_per_hour: Option<Decimal>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field}: {message}")]
    Field {
        field: &'static str,
        message: String,
    },
}

fn invalid(field: &'static str, message: impl Into<String>) -> ValidationError {
    ValidationError::Field {
        field,
        message: message.into(),
    }
}

impl ListingDraft {
    /// Validate the draft, filling the decay rate from `default_rate` when absent.
    pub fn validate(self, default_rate: Decimal) -> Result<NewListing, ValidationError> {
        let seller_id = self.seller_id.trim().to_string();
        if seller_id.is_empty() {
            return Err(invalid("sellerId", "is required"));
        }

        let title = self.title.trim().to_string();
        let title_len = title.chars().count();
        if !(3..=255).contains(&title_len) {
            return Err(invalid("title", "must be between 3 and 255 characters"));
        }

        let description = self.description.trim().to_string();
        let description_len = description.chars().count();
        if !(10..=1000).contains(&description_len) {
            return Err(invalid(
                "description",
                "must be between 10 and 1000 characters",
            ));
        }

        let category = self
            .category
            .parse::<Category>()
            .map_err(|_| invalid("category", "invalid category selected"))?;

        if self.start_price < Decimal::one() {
            return Err(invalid("startPrice", "must be at least 1"));
        }
        if self.start_price > Decimal::from_i64(1_000_000) {
            return Err(invalid("startPrice", "cannot exceed 1000000"));
        }
        if self.min_price.is_negative() {
            return Err(invalid("minPrice", "cannot be negative"));
        }
        if self.min_price > self.start_price {
            return Err(invalid("minPrice", "cannot be higher than startPrice"));
        }

        let decay_rate_per_hour = self.decay_rate_per_hour.unwrap_or(default_rate);
        if !decay_rate_per_hour.is_positive() {
            return Err(invalid("decayRatePerHour", "must be greater than 0"));
        }

        Ok(NewListing {
            seller_id: UserId::new(seller_id),
            title,
            description,
            category,
            params: PricingParams {
                start_price: self.start_price,
                min_price: self.min_price,
                decay_rate_per_hour,
            },
        })
    }
}

/// Fields written to a listing when it is sold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sale {
    pub buyer_id: UserId,
    pub price: Decimal,
    pub sold_at: TimeMs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseRecord {
    pub id: PurchaseId,
    pub listing_id: ListingId,
    pub buyer_id: UserId,
    pub price_paid: Decimal,
    pub purchased_at: TimeMs,
}

impl PurchaseRecord {
    pub fn for_sale(listing_id: ListingId, sale: &Sale) -> Self {
        Self {
            id: PurchaseId::generate(),
            listing_id,
            buyer_id: sale.buyer_id.clone(),
            price_paid: sale.price,
            purchased_at: sale.sold_at,
        }
    }
}
