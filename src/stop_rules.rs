use crate::candles::{last_closed_in_lookup, CandleLookup};
use crate::models::{
    price_from_f64, Candle, DatePrice, IndicatorKind, OrderType, Price, Timeframe, TradeDirection,
};
use crate::policy::{OrderPolicy, DYNAMIC_TRAIL_ATR_MULTIPLIER, DYNAMIC_TRAIL_TIMEFRAME};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Walks a historical revision schedule as simulated time advances. Each
/// revision applies at the first step whose time has reached it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScheduleCursor {
    next: usize,
}

impl ScheduleCursor {
    pub fn advance(&mut self, schedule: &[DatePrice], now: DateTime<Utc>) -> Option<DatePrice> {
        let entry = schedule.get(self.next)?;
        if entry.date > now {
            return None;
        }
        self.next += 1;
        Some(*entry)
    }

    /// Whether at least one revision has been consumed.
    pub fn started(&self) -> bool {
        self.next > 0
    }
}

/// Long: an order at or below the current ask fills on a dip (limit entry),
/// above it on a breakout (stop entry). Inverse for short.
pub fn classify_order_type(
    direction: TradeDirection,
    order_price: Price,
    ask_close: Price,
) -> OrderType {
    match direction {
        TradeDirection::Long => {
            if order_price <= ask_close {
                OrderType::LimitEntry
            } else {
                OrderType::StopEntry
            }
        }
        TradeDirection::Short => {
            if order_price <= ask_close {
                OrderType::StopEntry
            } else {
                OrderType::LimitEntry
            }
        }
    }
}

/// Shifts an order price by the configured percentage, toward a cheaper fill
/// for "better" and away from it for "worse", relative to the direction.
pub fn adjust_order_price(policy: OrderPolicy, direction: TradeDirection, price: Price) -> Price {
    let percent = match policy {
        OrderPolicy::Original => return price,
        OrderPolicy::PercentBetter { percent } => -percent,
        OrderPolicy::PercentWorse { percent } => percent,
    };
    let shift = price * percent * direction.sign() / Decimal::ONE_HUNDRED;
    price + shift
}

/// `order + (order − initialStop) × R`; the short-side mirror falls out of
/// the signs. Computed once when both inputs exist, never revised after.
pub fn fixed_r_limit(order_price: Price, initial_stop: Price, multiple: Decimal) -> Price {
    order_price + (order_price - initial_stop) * multiple
}

fn improves_stop(direction: TradeDirection, candidate: Price, current: Price) -> bool {
    match direction {
        TradeDirection::Long => candidate > current,
        TradeDirection::Short => candidate < current,
    }
}

/// Candidate stop from the named EMA on the policy timeframe at the current
/// simulated time. Returns a new stop only when it reduces risk; a trailing
/// stop never moves against the position. Missing candle or indicator data
/// is a no-op.
pub fn trail_indicator_stop(
    direction: TradeDirection,
    current_stop: Price,
    timeframe: Timeframe,
    indicator: IndicatorKind,
    lookup: &CandleLookup,
    now: DateTime<Utc>,
) -> Option<Price> {
    let candle = last_closed_in_lookup(lookup, timeframe, now)?;
    let candidate = price_from_f64(candle.indicator(indicator)?)?;
    improves_stop(direction, candidate, current_stop).then_some(candidate)
}

/// Candidate stop trailing the current close by an ATR multiple on the fixed
/// volatility timeframe; same monotonic-improvement rule.
pub fn trail_dynamic_stop(
    direction: TradeDirection,
    current_stop: Price,
    current_candle: &Candle,
    lookup: &CandleLookup,
    now: DateTime<Utc>,
) -> Option<Price> {
    let atr_candle = last_closed_in_lookup(lookup, DYNAMIC_TRAIL_TIMEFRAME, now)?;
    let atr = atr_candle.indicator(IndicatorKind::Atr)?;
    let offset = DYNAMIC_TRAIL_ATR_MULTIPLIER * atr;
    let candidate = match direction {
        TradeDirection::Long => price_from_f64(current_candle.close_bid - offset)?,
        TradeDirection::Short => price_from_f64(current_candle.close_ask + offset)?,
    };
    improves_stop(direction, candidate, current_stop).then_some(candidate)
}
