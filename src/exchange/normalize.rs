// =============================================================================
// Symbol normalisation and timeframe parsing
// =============================================================================

/// Known quote assets of length 4, used to split a bare `BASEQUOTE` ticker
/// (e.g. `BTCUSDT`) into canonical `BASE/QUOTE` form when no separator is
/// present.
const KNOWN_QUOTES_4: &[&str] = &["USDT", "USDC", "BUSD", "TUSD", "FDUSD"];

/// Normalise a venue symbol into canonical `BASE/QUOTE` form: uppercase,
/// `-`/`:`/whitespace collapsed to `/`, and a bare `BASEQUOTE` ticker split
/// when the tail matches a known 4-letter quote. Idempotent:
/// `normalize(normalize(s)) == normalize(s)`.
pub fn normalize(symbol: &str) -> String {
    let upper = symbol.trim().to_uppercase();
    let collapsed: String = upper
        .chars()
        .map(|c| match c {
            '-' | ':' => '/',
            c if c.is_whitespace() => '/',
            c => c,
        })
        .collect();

    // Collapse any run of duplicate separators (e.g. a venue's `"BTC//USDT"`
    // quirk) down to one.
    let mut parts: Vec<&str> = collapsed.split('/').filter(|s| !s.is_empty()).collect();

    if parts.len() >= 2 {
        return format!("{}/{}", parts[0], parts[1]);
    }

    if parts.len() == 1 {
        let single = parts.remove(0);
        for quote in KNOWN_QUOTES_4 {
            if single.len() > quote.len() && single.ends_with(quote) {
                let base = &single[..single.len() - quote.len()];
                return format!("{base}/{quote}");
            }
        }
        return single.to_string();
    }

    String::new()
}

/// Parse a timeframe string (`"15m"`, `"1h"`, `"4h"`, `"1d"`, `"1w"`) into its
/// duration in milliseconds. Rejects empty, negative, zero, or unsupported
/// unit strings.
pub fn parse_tf_to_ms(tf: &str) -> Result<i64, String> {
    if tf.is_empty() {
        return Err("empty timeframe".to_string());
    }

    let unit = tf
        .chars()
        .last()
        .ok_or_else(|| "empty timeframe".to_string())?;
    let digits = &tf[..tf.len() - unit.len_utf8()];

    let amount: i64 = digits
        .parse()
        .map_err(|_| format!("invalid numeric component in timeframe '{tf}'"))?;

    if amount <= 0 {
        return Err(format!("timeframe amount must be positive: '{tf}'"));
    }

    let unit_ms: i64 = match unit {
        'm' => 60_000,
        'h' => 3_600_000,
        'd' => 86_400_000,
        'w' => 604_800_000,
        other => return Err(format!("unsupported timeframe unit '{other}' in '{tf}'")),
    };

    Ok(amount * unit_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_uppercases_and_splits_bare_ticker() {
        assert_eq!(normalize("btcusdt"), "BTC/USDT");
    }

    #[test]
    fn normalize_collapses_dash() {
        assert_eq!(normalize("BTC-USDT"), "BTC/USDT");
    }

    #[test]
    fn normalize_collapses_colon_and_whitespace() {
        assert_eq!(normalize("BTC:USDT"), "BTC/USDT");
        assert_eq!(normalize("BTC USDT"), "BTC/USDT");
    }

    #[test]
    fn normalize_collapses_duplicate_separators() {
        assert_eq!(normalize("BTC//USDT"), "BTC/USDT");
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize("btc-usdt");
        let twice = normalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_unknown_quote_without_separator_is_passed_through() {
        assert_eq!(normalize("XAUT"), "XAUT");
    }

    #[test]
    fn parse_tf_minutes() {
        assert_eq!(parse_tf_to_ms("15m").unwrap(), 900_000);
    }

    #[test]
    fn parse_tf_hours_days_weeks() {
        assert_eq!(parse_tf_to_ms("1h").unwrap(), 3_600_000);
        assert_eq!(parse_tf_to_ms("4h").unwrap(), 14_400_000);
        assert_eq!(parse_tf_to_ms("1d").unwrap(), 86_400_000);
        assert_eq!(parse_tf_to_ms("1w").unwrap(), 604_800_000);
    }

    #[test]
    fn parse_tf_rejects_empty() {
        assert!(parse_tf_to_ms("").is_err());
    }

    #[test]
    fn parse_tf_rejects_negative_and_zero() {
        assert!(parse_tf_to_ms("-5m").is_err());
        assert!(parse_tf_to_ms("0m").is_err());
    }

    #[test]
    fn parse_tf_rejects_unsupported_unit() {
        assert!(parse_tf_to_ms("15s").is_err());
    }
}
