use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::domain::{ListingId, PurchaseRecord, UserId};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub buyer_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseDto {
    pub purchase_id: String,
    pub listing_id: i64,
    pub buyer_id: String,
    pub price_paid: String,
    pub purchased_at: i64,
}

impl From<&PurchaseRecord> for PurchaseDto {
    fn from(r: &PurchaseRecord) -> Self {
        PurchaseDto {
            purchase_id: r.id.to_string(),
            listing_id: r.listing_id.as_i64(),
            buyer_id: r.buyer_id.to_string(),
            price_paid: r.price_paid.to_canonical_string(),
            purchased_at: r.purchased_at.as_ms(),
        }
    }
}

/// The price is never taken from the request; it is computed under the listing lock.
pub async fn purchase_listing(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Json(body): Json<PurchaseRequest>,
) -> Result<Json<PurchaseDto>, AppError> {
    let buyer_id = body.buyer_id.trim();
    if buyer_id.is_empty() {
        return Err(AppError::BadRequest("buyerId is required".into()));
    }

    let record = state
        .purchases
        .purchase(ListingId::new(id), &UserId::new(buyer_id))
        .await?;

    Ok(Json(PurchaseDto::from(&record)))
}

pub async fn get_user_purchases(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<PurchaseDto>>, AppError> {
    let purchases = state
        .store
        .purchases_by_buyer(&UserId::new(user_id))
        .await?;
    Ok(Json(purchases.iter().map(PurchaseDto::from).collect()))
}
