// =============================================================================
// Pair filter — pure function over a symbol list
// =============================================================================
//
// Drops stable-to-stable pairs, leveraged-token variants, and any
// caller-supplied blocklist token. Order-preserving.

/// Fixed stablecoin set. A symbol whose base *and* quote are both in this set
/// (e.g. `USDC/USDT`) carries no directional signal and is dropped.
const STABLECOINS: &[&str] = &["USDT", "USDC", "BUSD", "TUSD", "DAI", "FDUSD", "USDP"];

/// Leveraged-token suffixes (e.g. `BTCUP/USDT`), excluded per the original
/// implementation's pair filter.
const LEVERAGED_SUFFIXES: &[&str] = &["UP", "DOWN", "BULL", "BEAR"];

fn split_base_quote(symbol: &str) -> Option<(&str, &str)> {
    symbol.split_once('/')
}

fn is_stable_pair(symbol: &str) -> bool {
    match split_base_quote(symbol) {
        Some((base, quote)) => STABLECOINS.contains(&base) && STABLECOINS.contains(&quote),
        None => false,
    }
}

fn is_leveraged_token(symbol: &str) -> bool {
    let base = split_base_quote(symbol).map(|(b, _)| b).unwrap_or(symbol);
    LEVERAGED_SUFFIXES
        .iter()
        .any(|suffix| base.ends_with(suffix))
}

fn matches_exclusion(symbol: &str, token: &str) -> bool {
    !token.is_empty() && symbol.to_uppercase().contains(&token.to_uppercase())
}

/// Filter `symbols`, dropping stable-to-stable pairs, leveraged-token
/// variants, and any symbol containing one of `extra_exclusions`.
/// Order-preserving.
pub fn filter(symbols: &[String], extra_exclusions: &[String]) -> Vec<String> {
    symbols
        .iter()
        .filter(|s| !is_stable_pair(s))
        .filter(|s| !is_leveraged_token(s))
        .filter(|s| !extra_exclusions.iter().any(|tok| matches_exclusion(s, tok)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syms(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn drops_stable_to_stable_pairs() {
        let input = syms(&["BTC/USDT", "USDC/USDT", "ETH/USDT"]);
        let result = filter(&input, &[]);
        assert_eq!(result, syms(&["BTC/USDT", "ETH/USDT"]));
    }

    #[test]
    fn drops_leveraged_tokens() {
        let input = syms(&["BTC/USDT", "BTCUP/USDT", "BTCBEAR/USDT"]);
        let result = filter(&input, &[]);
        assert_eq!(result, syms(&["BTC/USDT"]));
    }

    #[test]
    fn drops_custom_exclusions() {
        let input = syms(&["BTC/USDT", "ETH/USDT", "DOGE/USDT"]);
        let result = filter(&input, &syms(&["DOGE"]));
        assert_eq!(result, syms(&["BTC/USDT", "ETH/USDT"]));
    }

    #[test]
    fn preserves_order() {
        let input = syms(&["ZZZ/USDT", "AAA/USDT"]);
        let result = filter(&input, &[]);
        assert_eq!(result, syms(&["ZZZ/USDT", "AAA/USDT"]));
    }

    #[test]
    fn non_stable_pair_with_stable_base_is_kept() {
        let input = syms(&["USDT/BTC"]);
        // Same-symbol orderings aside, a pair where one side is not a
        // recognised stablecoin at all should survive.
        let input2 = syms(&["SOL/USDT"]);
        assert_eq!(filter(&input, &[]), input);
        assert_eq!(filter(&input2, &[]), input2);
    }
}
