//! Pure hourly price decay.
//!
//! Price steps down by `decay_rate_per_hour` for every whole hour elapsed since the anchor.
//! When a step would land below the floor the price snaps back to the start price and the
//! anchor restarts at `now`.

use crate::domain::{Decimal, PriceAnchor, PricingParams, TimeMs, HOUR_MS};

/// Result of evaluating the decay at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecayStep {
    pub price: Decimal,
    pub anchor: PriceAnchor,
    /// True when `anchor` differs from the input anchor.
    pub changed: bool,
}

impl DecayStep {
    fn unchanged(anchor: PriceAnchor) -> Self {
        Self {
            price: anchor.value,
            anchor,
            changed: false,
        }
    }
}

/// Whole hours between `anchor_time` and `now`, truncated toward zero.
pub fn elapsed_hours(anchor_time: TimeMs, now: TimeMs) -> i64 {
    now.as_ms().saturating_sub(anchor_time.as_ms()) / HOUR_MS
}

/// Price in effect at `now` for a listing anchored at `anchor`.
///
/// Feeding the returned anchor back in with the same `now` is a no-op. Only whole hours are
/// consumed, so the sub-hour remainder carries over to the next evaluation.
pub fn effective_price(params: &PricingParams, anchor: PriceAnchor, now: TimeMs) -> DecayStep {
    let hours = elapsed_hours(anchor.time, now);
    if hours < 1 {
        return DecayStep::unchanged(anchor);
    }

    let candidate = params
        .decay_rate_per_hour
        .checked_mul(Decimal::from_i64(hours))
        .and_then(|drop| anchor.value.checked_sub(drop));

    let next = match candidate {
        Some(value) if value >= params.min_price => {
            PriceAnchor::new(value, anchor.time.plus_hours(hours))
        }
        // Overflow can only mean the decay ran far past the floor.
        _ => PriceAnchor::new(params.start_price, now),
    };

    DecayStep {
        price: next.value,
        anchor: next,
        changed: next != anchor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const T0: i64 = 1_700_000_000_000;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn params(start: &str, min: &str, rate: &str) -> PricingParams {
        PricingParams {
            start_price: d(start),
            min_price: d(min),
            decay_rate_per_hour: d(rate),
        }
    }

    fn at_hours(h: f64) -> TimeMs {
        TimeMs::new(T0 + (h * HOUR_MS as f64) as i64)
    }

    #[test]
    fn test_under_one_hour_is_unchanged() {
        let p = params("100", "20", "1");
        let anchor = PriceAnchor::new(d("100"), TimeMs::new(T0));
        let step = effective_price(&p, anchor, at_hours(0.99));
        assert_eq!(step.price, d("100"));
        assert_eq!(step.anchor, anchor);
        assert!(!step.changed);
    }

    #[test]
    fn test_clock_behind_anchor_is_unchanged() {
        let p = params("100", "20", "1");
        let anchor = PriceAnchor::new(d("90"), TimeMs::new(T0));
        let step = effective_price(&p, anchor, at_hours(-5.0));
        assert_eq!(step.price, d("90"));
        assert!(!step.changed);
    }

    #[test]
    fn test_advances_by_whole_hours_only() {
        let p = params("100", "20", "1");
        let anchor = PriceAnchor::new(d("100"), TimeMs::new(T0));

        let step = effective_price(&p, anchor, at_hours(2.5));
        assert_eq!(step.price, d("98"));
        assert_eq!(step.anchor, PriceAnchor::new(d("98"), at_hours(2.0)));
        assert!(step.changed);

        // 0.5h remainder + 0.6h = one more step, anchored on the 3h boundary.
        let next = effective_price(&p, step.anchor, at_hours(3.1));
        assert_eq!(next.price, d("97"));
        assert_eq!(next.anchor, PriceAnchor::new(d("97"), at_hours(3.0)));

        // Not yet at the 4h boundary.
        let later = effective_price(&p, next.anchor, at_hours(3.99));
        assert_eq!(later.price, d("97"));
        assert!(!later.changed);
    }

    #[test]
    fn test_reset_when_crossing_floor() {
        let p = params("100", "20", "1");
        let anchor = PriceAnchor::new(d("100"), TimeMs::new(T0));

        let at_floor = effective_price(&p, anchor, at_hours(80.0));
        assert_eq!(at_floor.price, d("20"));

        let now = at_hours(81.0);
        let crossed = effective_price(&p, anchor, now);
        assert_eq!(crossed.price, d("100"));
        assert_eq!(crossed.anchor, PriceAnchor::new(d("100"), now));
    }

    #[test]
    fn test_reset_uses_now_not_hour_boundary() {
        let p = params("10", "5", "2");
        let anchor = PriceAnchor::new(d("6"), TimeMs::new(T0));
        let now = at_hours(1.75);
        let step = effective_price(&p, anchor, now);
        assert_eq!(step.anchor, PriceAnchor::new(d("10"), now));
    }

    #[test]
    fn test_idempotent_for_same_now() {
        let p = params("100", "20", "1.25");
        let anchor = PriceAnchor::new(d("100"), TimeMs::new(T0));
        let now = at_hours(7.3);

        let first = effective_price(&p, anchor, now);
        let second = effective_price(&p, first.anchor, now);
        assert_eq!(first.price, second.price);
        assert_eq!(first.anchor, second.anchor);
        assert!(!second.changed);
    }

    #[test]
    fn test_fractional_rate() {
        let p = params("10", "0", "0.25");
        let anchor = PriceAnchor::new(d("10"), TimeMs::new(T0));
        let step = effective_price(&p, anchor, at_hours(3.0));
        assert_eq!(step.price, d("9.25"));
    }

    #[test]
    fn test_zero_floor_reaches_zero_before_reset() {
        let p = params("3", "0", "1");
        let anchor = PriceAnchor::new(d("3"), TimeMs::new(T0));
        assert_eq!(effective_price(&p, anchor, at_hours(3.0)).price, d("0"));
        assert_eq!(effective_price(&p, anchor, at_hours(4.0)).price, d("3"));
    }

    #[test]
    fn test_overflow_is_treated_as_reset() {
        let p = params("100", "20", "79228162514264337593543950335");
        let anchor = PriceAnchor::new(d("100"), TimeMs::new(T0));
        let now = at_hours(10.0);
        let step = effective_price(&p, anchor, now);
        assert_eq!(step.anchor, PriceAnchor::new(d("100"), now));
    }

    #[test]
    fn test_bounds_and_monotonicity_over_increasing_times() {
        let cases = [
            params("100", "20", "1"),
            params("50", "0", "7"),
            params("12.5", "12.5", "0.5"),
            params("1000", "999", "3"),
        ];

        for p in cases {
            let mut anchor = PriceAnchor::new(p.start_price, TimeMs::new(T0));
            let mut previous = p.start_price;
            // Irregular offsets so steps land both on and off hour boundaries.
            let mut now = T0;
            for i in 0..500i64 {
                now += (i % 7 + 1) * HOUR_MS / 3 + i % 11;
                let step = effective_price(&p, anchor, TimeMs::new(now));
                assert!(step.price >= p.min_price, "below floor: {:?}", step);
                assert!(step.price <= p.start_price, "above start: {:?}", step);

                let reset = step.changed && step.price == p.start_price
                    && step.anchor.time == TimeMs::new(now);
                if !reset {
                    assert!(step.price <= previous, "price rose without reset");
                }
                previous = step.price;
                anchor = step.anchor;
            }
        }
    }
}
