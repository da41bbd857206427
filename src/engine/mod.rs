//! Pure pricing computation and the lazy pricing engine built on it.

pub mod clock;
pub mod decay;
pub mod pricing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use decay::{effective_price, elapsed_hours, DecayStep};
pub use pricing::{current_price_at, PriceQuote, PricingEngine, PricingError};
