// =============================================================================
// Execution-hint bundle
// =============================================================================
//
// New module: bundles a maker-timeout fallback onto the entry legs built by
// `entries::build_entries`. Grounded on the old top-level `execution.rs`'s
// `ExecutionResult` enum shape (Filled/Rejected/Cancelled outcomes attached to
// an order placement) — redirected here from a post-hoc placement result to a
// pre-placement plan: what to do if the maker leg sits unfilled.

use serde::{Deserialize, Serialize};

use crate::planner::entries::{EntryLeg, EntryType};

/// If the near leg is a maker order and it has not filled within this many
/// milliseconds, cancel it and re-submit as a taker (stop/market) order.
pub const DEFAULT_MAKER_TIMEOUT_MS: i64 = 45_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackPlan {
    pub timeout_ms: i64,
    pub fallback_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub leg: EntryLeg,
    pub fallback: Option<FallbackPlan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionBundle {
    pub near: ExecutionPlan,
    pub far: ExecutionPlan,
}

/// Attach a maker-timeout fallback to any limit leg: if it sits unfilled past
/// `timeout_ms`, the executor cancels it and re-submits at the leg's own
/// price as a stop/market order. Stop legs need no fallback; they are
/// already taker orders.
pub fn decide_execution(near: EntryLeg, far: EntryLeg, timeout_ms: i64) -> ExecutionBundle {
    let wrap = |leg: EntryLeg| -> ExecutionPlan {
        let fallback = match leg.kind {
            EntryType::Limit => Some(FallbackPlan { timeout_ms, fallback_price: leg.price }),
            EntryType::Stop => None,
        };
        ExecutionPlan { leg, fallback }
    };

    ExecutionBundle { near: wrap(near), far: wrap(far) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leg(price: f64, kind: EntryType) -> EntryLeg {
        EntryLeg { price, kind, post_only: matches!(kind, EntryType::Limit), reason: "test".into() }
    }

    #[test]
    fn limit_leg_gets_fallback() {
        let bundle = decide_execution(leg(100.0, EntryType::Limit), leg(101.0, EntryType::Stop), 30_000);
        assert!(bundle.near.fallback.is_some());
        assert!(bundle.far.fallback.is_none());
    }

    #[test]
    fn fallback_uses_each_legs_own_price() {
        let bundle = decide_execution(leg(100.0, EntryType::Limit), leg(105.5, EntryType::Limit), 30_000);
        assert_eq!(bundle.near.fallback.unwrap().fallback_price, 100.0);
        assert_eq!(bundle.far.fallback.unwrap().fallback_price, 105.5);
        assert_eq!(bundle.far.fallback.unwrap().timeout_ms, 30_000);
    }
}
