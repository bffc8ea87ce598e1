//! Small pure helpers for order-number and amount-tail generation.
use chrono::{DateTime, Utc};
use rand::Rng;
use upg_common::MicroUsdt;

use crate::db_types::Currency;

/// Generates a human-readable order number: the creation timestamp down to seconds followed by
/// six random digits, e.g. `20250806142501093712`. Gateways echo this back as `out_trade_no`.
pub fn new_order_number(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    format!("{}{:06}", now.format("%Y%m%d%H%M%S"), rng.gen_range(0..1_000_000))
}

/// Generates a random disambiguation tail for the given currency.
///
/// The tail keeps concurrently pending orders of the same base amount distinguishable by the
/// payment amount alone. For crypto the tail is sub-cent (1..10_000 micro-units, so at most
/// 0.009999 USDT); for fiat gateways that truncate to two decimals it is a whole number of
/// cents (0.01..0.99).
pub fn random_amount_tail(currency: Currency) -> MicroUsdt {
    let mut rng = rand::thread_rng();
    let units = match currency {
        Currency::Usdt => rng.gen_range(1..10_000),
        Currency::Fiat => rng.gen_range(1..100) * 10_000,
    };
    MicroUsdt::from(units)
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn order_number_format() {
        let t = Utc.with_ymd_and_hms(2025, 8, 6, 14, 25, 1).unwrap();
        let n = new_order_number(t);
        assert_eq!(n.len(), 20);
        assert!(n.starts_with("20250806142501"));
        assert!(n.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn tail_stays_in_range() {
        for _ in 0..1000 {
            let t = random_amount_tail(Currency::Usdt).value();
            assert!((1..10_000).contains(&t));
            let t = random_amount_tail(Currency::Fiat).value();
            assert!((10_000..1_000_000).contains(&t));
            assert_eq!(t % 10_000, 0);
        }
    }
}
