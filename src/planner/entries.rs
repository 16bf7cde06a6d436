// =============================================================================
// Near/far entry derivation
// =============================================================================
//
// Derives a near/far entry price pair from structure anchors (order-block
// mid/edge, fair-value gap, VWAP bias) rather than a single entry at current
// market, with an ATR-scaled-by-regime style of deriving distance
// multipliers from one ATR reading.

use serde::{Deserialize, Serialize};

use crate::types::Direction;

/// Minimum |OBI| required before a maker (post-only limit) entry is allowed.
pub const OBI_MAKER_THRESHOLD: f64 = 0.15;
/// Maximum spread, in bps, before a maker entry is allowed.
pub const MAKER_SPREAD_MAX_BPS: f64 = 8.0;
/// Minimum fraction of ATR the entry must clear the stop by.
pub const ENTRY_ATR_MIN_FRAC: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    Limit,
    Stop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryLeg {
    pub price: f64,
    pub kind: EntryType,
    pub post_only: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Copy)]
pub struct StructureAnchors {
    pub ob_mid: f64,
    pub ob_edge: f64,
    pub fvg: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct OrderFlowContext {
    pub obi: f64,
    pub spread_bps: f64,
    pub liq_in_zone: bool,
}

/// Trading-session tag, used to tighten/loosen the entry pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Session {
    Asia,
    London,
    NewYork,
    Other,
}

#[derive(Debug, Clone)]
pub struct Entries {
    pub near: EntryLeg,
    pub far: EntryLeg,
}

#[derive(Debug)]
pub struct InvalidEntry(pub String);

impl std::fmt::Display for InvalidEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid entry: {}", self.0)
    }
}
impl std::error::Error for InvalidEntry {}

/// `bias = vwap ± k·σ`, signed toward the trade direction.
fn vwap_bias(vwap: f64, sigma: f64, k: f64, direction: Direction) -> f64 {
    match direction {
        Direction::Long => vwap + k * sigma,
        Direction::Short => vwap - k * sigma,
        Direction::Neutral => vwap,
    }
}

/// London/NY tighten the entry pair toward the anchor; Asia loosens it.
fn session_tilt(session: Session) -> f64 {
    match session {
        Session::London | Session::NewYork => 0.85,
        Session::Asia => 1.15,
        Session::Other => 1.0,
    }
}

fn round_to_tick(price: f64, tick: f64) -> f64 {
    if tick <= 0.0 {
        price
    } else {
        (price / tick).round() * tick
    }
}

/// Step a limit price one tick toward `current_price` ("inside").
fn step_inside(price: f64, current_price: f64, tick: f64) -> f64 {
    if tick <= 0.0 || (price - current_price).abs() <= tick {
        return current_price;
    }
    if price > current_price {
        price - tick
    } else {
        price + tick
    }
}

/// Step a stop price one tick further in the trade direction ("outside").
fn step_outside(price: f64, direction: Direction, tick: f64) -> f64 {
    match direction {
        Direction::Long => price + tick,
        Direction::Short => price - tick,
        Direction::Neutral => price,
    }
}

/// Build the near/far entry pair. `direction` must not be
/// `Neutral`. Fails if the near entry does not clear the stop by at least
/// `ENTRY_ATR_MIN_FRAC × atr`.
#[allow(clippy::too_many_arguments)]
pub fn build_entries(
    direction: Direction,
    current_price: f64,
    tick_size: f64,
    atr: f64,
    anchors: StructureAnchors,
    vwap: f64,
    sigma: f64,
    k: f64,
    flow: OrderFlowContext,
    session: Session,
    stop_loss: f64,
) -> Result<Entries, InvalidEntry> {
    let bias = vwap_bias(vwap, sigma, k, direction);
    let tilt = session_tilt(session);

    let raw_near = (anchors.ob_mid + bias) / 2.0;
    let raw_far = (anchors.ob_edge + anchors.fvg) / 2.0;

    let near_price = anchors.ob_mid + (raw_near - anchors.ob_mid) * tilt;
    let far_price = anchors.ob_edge + (raw_far - anchors.ob_edge) * tilt;

    let maker_allowed_near =
        flow.obi.abs() >= OBI_MAKER_THRESHOLD && flow.spread_bps <= MAKER_SPREAD_MAX_BPS && !flow.liq_in_zone;
    let maker_allowed_far = flow.obi.abs() >= OBI_MAKER_THRESHOLD && flow.spread_bps <= MAKER_SPREAD_MAX_BPS;

    let near_type = if maker_allowed_near { EntryType::Limit } else { EntryType::Stop };
    let far_type = if maker_allowed_far { EntryType::Limit } else { EntryType::Stop };

    let near_stepped = match near_type {
        EntryType::Limit => step_inside(near_price, current_price, tick_size),
        EntryType::Stop => step_outside(near_price, direction, tick_size),
    };
    let far_stepped = match far_type {
        EntryType::Limit => step_inside(far_price, current_price, tick_size),
        EntryType::Stop => step_outside(far_price, direction, tick_size),
    };

    let near_final = round_to_tick(near_stepped, tick_size);
    let far_final = round_to_tick(far_stepped, tick_size);

    if (near_final - stop_loss).abs() < atr * ENTRY_ATR_MIN_FRAC {
        return Err(InvalidEntry(format!(
            "near entry {near_final:.6} within {:.6} of stop {stop_loss:.6} (min {:.6})",
            (near_final - stop_loss).abs(),
            atr * ENTRY_ATR_MIN_FRAC
        )));
    }

    Ok(Entries {
        near: EntryLeg {
            price: near_final,
            kind: near_type,
            post_only: matches!(near_type, EntryType::Limit),
            reason: if maker_allowed_near {
                "OBI/spread support a passive maker entry".to_string()
            } else {
                "flow conditions require a stop entry".to_string()
            },
        },
        far: EntryLeg {
            price: far_final,
            kind: far_type,
            post_only: matches!(far_type, EntryType::Limit),
            reason: if maker_allowed_far {
                "OBI/spread support a passive maker entry".to_string()
            } else {
                "flow conditions require a stop entry".to_string()
            },
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchors() -> StructureAnchors {
        StructureAnchors { ob_mid: 100.0, ob_edge: 99.0, fvg: 98.5 }
    }

    fn flow(maker_ok: bool) -> OrderFlowContext {
        if maker_ok {
            OrderFlowContext { obi: 0.3, spread_bps: 2.0, liq_in_zone: false }
        } else {
            OrderFlowContext { obi: 0.0, spread_bps: 50.0, liq_in_zone: false }
        }
    }

    #[test]
    fn maker_allowed_produces_limit_entries() {
        let entries = build_entries(
            Direction::Long,
            100.0,
            0.01,
            2.0,
            anchors(),
            99.5,
            1.0,
            0.5,
            flow(true),
            Session::Other,
            90.0,
        )
        .unwrap();
        assert_eq!(entries.near.kind, EntryType::Limit);
        assert!(entries.near.post_only);
    }

    #[test]
    fn poor_flow_forces_stop_entries() {
        let entries = build_entries(
            Direction::Long,
            100.0,
            0.01,
            2.0,
            anchors(),
            99.5,
            1.0,
            0.5,
            flow(false),
            Session::Other,
            90.0,
        )
        .unwrap();
        assert_eq!(entries.near.kind, EntryType::Stop);
        assert!(!entries.near.post_only);
    }

    #[test]
    fn too_close_to_stop_is_rejected() {
        let err = build_entries(
            Direction::Long,
            100.0,
            0.01,
            2.0,
            anchors(),
            99.5,
            1.0,
            0.5,
            flow(true),
            Session::Other,
            99.95, // stop almost at entry
        );
        assert!(err.is_err());
    }

    #[test]
    fn session_tilt_changes_entry_distance() {
        let london = build_entries(
            Direction::Long,
            100.0,
            0.01,
            2.0,
            anchors(),
            99.5,
            1.0,
            0.5,
            flow(true),
            Session::London,
            90.0,
        )
        .unwrap();
        let asia = build_entries(
            Direction::Long,
            100.0,
            0.01,
            2.0,
            anchors(),
            99.5,
            1.0,
            0.5,
            flow(true),
            Session::Asia,
            90.0,
        )
        .unwrap();
        assert_ne!(london.near.price, asia.near.price);
    }
}
