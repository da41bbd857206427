use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::AppState;
use crate::domain::{Category, Decimal, ListingDraft, ListingId, TimeMs, UserId};
use crate::engine::{current_price_at, PriceQuote};
use crate::error::AppError;
use crate::orchestration::{BrowseQuery, PricedListing, SortOrder};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDto {
    pub id: &'static str,
    pub name: &'static str,
}

pub async fn get_categories() -> Json<Vec<CategoryDto>> {
    Json(
        Category::ALL
            .iter()
            .map(|c| CategoryDto {
                id: c.as_str(),
                name: c.label(),
            })
            .collect(),
    )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingDto {
    pub id: i64,
    pub seller_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub start_price: String,
    pub min_price: String,
    pub current_price: String,
    pub decay_rate_per_hour: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_decay_at: Option<i64>,
    pub sold: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer_id: Option<String>,
    pub created_at: i64,
}

impl From<&PricedListing> for ListingDto {
    fn from(p: &PricedListing) -> Self {
        let listing = &p.listing;
        ListingDto {
            id: listing.id.as_i64(),
            seller_id: listing.seller_id.to_string(),
            title: listing.title.clone(),
            description: listing.description.clone(),
            category: listing.category.to_string(),
            start_price: listing.params.start_price.to_canonical_string(),
            min_price: listing.params.min_price.to_canonical_string(),
            current_price: p.quote.price.to_canonical_string(),
            decay_rate_per_hour: listing.params.decay_rate_per_hour.to_canonical_string(),
            next_decay_at: p.quote.next_decay_at.map(|t| t.as_ms()),
            sold: listing.sold,
            buyer_id: listing.buyer_id.as_ref().map(|b| b.to_string()),
            created_at: listing.created_at.as_ms(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateListingRequest {
    pub seller_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub start_price: rust_decimal::Decimal,
    pub min_price: rust_decimal::Decimal,
    pub decay_rate_per_hour: Option<rust_decimal::Decimal>,
}

pub async fn create_listing(
    State(state): State<AppState>,
    Json(body): Json<CreateListingRequest>,
) -> Result<(StatusCode, Json<ListingDto>), AppError> {
    let draft = ListingDraft {
        seller_id: body.seller_id,
        title: body.title,
        description: body.description,
        category: body.category,
        start_price: body.start_price.into(),
        min_price: body.min_price.into(),
        decay_rate_per_hour: body.decay_rate_per_hour.map(Decimal::from),
    };

    let listing = state.catalog.create_listing(draft).await?;
    let step = current_price_at(&listing, listing.created_at)?;
    let quote = PriceQuote::new(&listing, &step);

    Ok((
        StatusCode::CREATED,
        Json(ListingDto::from(&PricedListing { listing, quote })),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowseParams {
    pub category: Option<String>,
    pub search: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub sort: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowseResponse {
    pub items: Vec<ListingDto>,
    pub total: usize,
    pub page: u32,
    pub total_pages: u32,
}

pub async fn browse_listings(
    Query(params): Query<BrowseParams>,
    State(state): State<AppState>,
) -> Result<Json<BrowseResponse>, AppError> {
    let category = match params.category.as_deref() {
        Some("") | None => None,
        Some(c) => Some(
            Category::from_str(c).map_err(|_| AppError::BadRequest("Invalid category".into()))?,
        ),
    };
    let sort = match params.sort.as_deref() {
        Some("") | None => SortOrder::default(),
        Some(s) => {
            SortOrder::from_str(s).map_err(|e| AppError::BadRequest(format!("sort {}", e)))?
        }
    };

    let query = BrowseQuery {
        category,
        search: params.search,
        min_price: parse_price_filter("minPrice", params.min_price.as_deref())?,
        max_price: parse_price_filter("maxPrice", params.max_price.as_deref())?,
        sort,
        page: params.page.unwrap_or(1),
        limit: params.limit.unwrap_or(0),
    };

    let page = state.catalog.browse(&query).await?;

    Ok(Json(BrowseResponse {
        items: page.items.iter().map(ListingDto::from).collect(),
        total: page.total,
        page: page.page,
        total_pages: page.total_pages,
    }))
}

fn parse_price_filter(name: &str, raw: Option<&str>) -> Result<Option<Decimal>, AppError> {
    match raw {
        Some("") | None => Ok(None),
        Some(s) => Decimal::from_str(s)
            .map(Some)
            .map_err(|_| AppError::BadRequest(format!("Invalid {}", name))),
    }
}

pub async fn get_user_listings(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<ListingDto>>, AppError> {
    let listings = state
        .catalog
        .seller_listings(&UserId::new(user_id))
        .await?;
    Ok(Json(listings.iter().map(ListingDto::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct PriceParams {
    /// Preview instant in ms; read-only.
    pub at: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceResponse {
    pub listing_id: i64,
    pub price: String,
    pub min_price: String,
    pub start_price: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_decay_at: Option<i64>,
    pub sold: bool,
}

impl From<PriceQuote> for PriceResponse {
    fn from(q: PriceQuote) -> Self {
        PriceResponse {
            listing_id: q.listing_id.as_i64(),
            price: q.price.to_canonical_string(),
            min_price: q.min_price.to_canonical_string(),
            start_price: q.start_price.to_canonical_string(),
            next_decay_at: q.next_decay_at.map(|t| t.as_ms()),
            sold: q.sold,
        }
    }
}

pub async fn get_price(
    Path(id): Path<i64>,
    Query(params): Query<PriceParams>,
    State(state): State<AppState>,
) -> Result<Json<PriceResponse>, AppError> {
    let id = ListingId::new(id);
    let quote = match params.at {
        Some(at) => state.pricing.preview_price(id, TimeMs::new(at)).await?,
        None => state.pricing.current_price(id).await?,
    };
    Ok(Json(quote.into()))
}
