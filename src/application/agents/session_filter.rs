use chrono::{DateTime, Datelike, NaiveTime, Timelike, Utc, Weekday};
use chrono_tz::America::New_York;

const CRYPTO_KEYWORDS: &[&str] = &["BTC", "ETH", "LTC", "BCH", "XRP", "DOGE", "SOL"];
const FX_KEYWORDS: &[&str] = &[
    "EUR", "USD", "JPY", "GBP", "CHF", "CAD", "AUD", "NZD", "XAU", "XAG", "WTI", "BRENT",
];
const INDEX_KEYWORDS: &[&str] = &["GER40", "US30", "SPX500", "NAS100", "UK100", "JPN225", "AUS200"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetClass {
    Crypto,
    /// FX, metals, energies and index CFDs: the Sunday-to-Friday 17:00 New York week.
    ForexOrIndex,
    /// Cash equities: New York regular session.
    Equity,
}

impl AssetClass {
    pub fn classify(symbol: &str) -> Self {
        let upper = symbol.to_uppercase();
        let contains_any = |keys: &[&str]| keys.iter().any(|k| upper.contains(k));

        if contains_any(CRYPTO_KEYWORDS) {
            AssetClass::Crypto
        } else if contains_any(FX_KEYWORDS) || contains_any(INDEX_KEYWORDS) {
            AssetClass::ForexOrIndex
        } else {
            AssetClass::Equity
        }
    }
}

/// Whether `symbol` is in its trading session at `now`.
pub fn is_tradable(symbol: &str, now: DateTime<Utc>) -> bool {
    let ny = now.with_timezone(&New_York);
    let weekday = ny.weekday();

    match AssetClass::classify(symbol) {
        AssetClass::Crypto => true,
        AssetClass::ForexOrIndex => match weekday {
            Weekday::Sat => false,
            Weekday::Fri => ny.hour() < 17,
            Weekday::Sun => ny.hour() >= 17,
            _ => true,
        },
        AssetClass::Equity => {
            if matches!(weekday, Weekday::Sat | Weekday::Sun) {
                return false;
            }
            let t = ny.time();
            let open = NaiveTime::from_hms_opt(9, 30, 0);
            let close = NaiveTime::from_hms_opt(16, 0, 0);
            match (open, close) {
                (Some(open), Some(close)) => t >= open && t <= close,
                _ => false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // March 2024: New York is on EDT (UTC-4) from the 10th.
    fn utc(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_classification() {
        assert_eq!(AssetClass::classify("BTCUSD"), AssetClass::Crypto);
        assert_eq!(AssetClass::classify("EURUSD"), AssetClass::ForexOrIndex);
        assert_eq!(AssetClass::classify("GER40"), AssetClass::ForexOrIndex);
        assert_eq!(AssetClass::classify("AAPL"), AssetClass::Equity);
    }

    #[test]
    fn test_crypto_trades_on_saturday() {
        // Saturday 16 March
        assert!(is_tradable("BTCUSD", utc(16, 12, 0)));
        assert!(!is_tradable("EURUSD", utc(16, 12, 0)));
    }

    #[test]
    fn test_fx_week_boundaries() {
        // Friday 15 March 16:59 and 17:00 New York
        assert!(is_tradable("EURUSD", utc(15, 20, 59)));
        assert!(!is_tradable("EURUSD", utc(15, 21, 0)));
        // Sunday 17 March 16:00 and 17:00 New York
        assert!(!is_tradable("XAUUSD", utc(17, 20, 0)));
        assert!(is_tradable("XAUUSD", utc(17, 21, 0)));
    }

    #[test]
    fn test_equity_regular_session() {
        // Tuesday 12 March 09:29, 09:30, 16:00, 16:01 New York
        assert!(!is_tradable("AAPL", utc(12, 13, 29)));
        assert!(is_tradable("AAPL", utc(12, 13, 30)));
        assert!(is_tradable("AAPL", utc(12, 20, 0)));
        assert!(!is_tradable("AAPL", utc(12, 20, 1)));
        assert!(!is_tradable("AAPL", utc(16, 15, 0)));
    }
}
