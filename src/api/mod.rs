pub mod health;
pub mod listings;
pub mod purchases;

use crate::config::Config;
use crate::engine::{Clock, PricingEngine};
use crate::orchestration::{Catalog, PurchaseCoordinator};
use crate::store::ListingStore;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ListingStore>,
    pub pricing: Arc<PricingEngine>,
    pub purchases: Arc<PurchaseCoordinator>,
    pub catalog: Arc<Catalog>,
}

impl AppState {
    /// Wire the pricing engine, purchase coordinator and catalog over one store and clock.
    pub fn new(store: Arc<dyn ListingStore>, clock: Arc<dyn Clock>, config: &Config) -> Self {
        Self {
            pricing: Arc::new(PricingEngine::new(store.clone(), clock.clone())),
            purchases: Arc::new(PurchaseCoordinator::new(
                store.clone(),
                clock.clone(),
                config.purchase_lock_timeout,
            )),
            catalog: Arc::new(Catalog::new(
                store.clone(),
                clock,
                config.default_decay_rate_per_hour,
            )),
            store,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/categories", get(listings::get_categories))
        .route(
            "/v1/listings",
            get(listings::browse_listings).post(listings::create_listing),
        )
        .route("/v1/listings/:id/price", get(listings::get_price))
        .route("/v1/listings/:id/purchase", post(purchases::purchase_listing))
        .route("/v1/users/:id/purchases", get(purchases::get_user_purchases))
        .route("/v1/users/:id/listings", get(listings::get_user_listings))
        .layer(cors)
        .with_state(state)
}
