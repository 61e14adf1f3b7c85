use crate::candles::CandleLookup;
use crate::models::{
    price_from_f64, Candle, CloseReason, DatePrice, OrderType, Trade, TradeDirection, TradeStatus,
};
use crate::policy::{LimitPolicy, SimulationOptions, StopPolicy};
use crate::stop_rules::{
    adjust_order_price, classify_order_type, fixed_r_limit, trail_dynamic_stop,
    trail_indicator_stop, ScheduleCursor,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// The historical revision schedules a replay draws from, detached from the
/// simulated trade so the replay rebuilds that trade's own schedules from
/// scratch.
#[derive(Debug, Clone)]
struct SourceSchedules {
    order_prices: Vec<DatePrice>,
    stop_prices: Vec<DatePrice>,
    limit_prices: Vec<DatePrice>,
    order_amount: Option<Decimal>,
}

/// One trade advancing through `Seed → OrderPending → Open → Closed` as
/// simulated time passes. A trade that never activates inside the window
/// simply stays in its pre-entry state; that is a reported outcome, not an
/// error.
#[derive(Debug)]
pub struct ReplayTrade {
    trade: Trade,
    source: SourceSchedules,
    order_cursor: ScheduleCursor,
    stop_cursor: ScheduleCursor,
    limit_cursor: ScheduleCursor,
}

impl ReplayTrade {
    /// Accepts a historical trade or an already-stripped seed order; outcome
    /// fields are cleared either way.
    pub fn new(trade: &Trade) -> Self {
        let mut seed = trade.to_seed_order();
        let source = SourceSchedules {
            order_prices: std::mem::take(&mut seed.order_prices),
            stop_prices: std::mem::take(&mut seed.stop_prices),
            limit_prices: std::mem::take(&mut seed.limit_prices),
            order_amount: seed.order_amount,
        };
        Self {
            trade: seed,
            source,
            order_cursor: ScheduleCursor::default(),
            stop_cursor: ScheduleCursor::default(),
            limit_cursor: ScheduleCursor::default(),
        }
    }

    pub fn trade(&self) -> &Trade {
        &self.trade
    }

    pub fn into_trade(self) -> Trade {
        self.trade
    }

    pub fn is_closed(&self) -> bool {
        self.trade.is_closed()
    }

    /// Advances the trade by one finest-granularity candle close.
    pub fn step(
        &mut self,
        candle: &Candle,
        now: DateTime<Utc>,
        lookup: &CandleLookup,
        options: &SimulationOptions,
    ) {
        if self.trade.is_closed() {
            return;
        }

        self.update_order(candle, now, options);
        self.check_fill(candle, now);
        self.update_stop(candle, now, lookup, options);
        self.update_limit(now, options);
        self.check_close(candle, now);
    }

    fn update_order(&mut self, candle: &Candle, now: DateTime<Utc>, options: &SimulationOptions) {
        if self.trade.status != TradeStatus::Seed && self.trade.status != TradeStatus::OrderPending
        {
            return;
        }
        let Some(revision) = self.order_cursor.advance(&self.source.order_prices, now) else {
            return;
        };

        let price = adjust_order_price(options.order_policy, self.trade.direction, revision.price);
        self.trade.add_order_price(revision.date, price);
        self.trade.order_price = Some(price);
        self.trade.order_amount = self.source.order_amount;
        if self.trade.order_date.is_none() {
            self.trade.order_date = Some(revision.date);
        }
        if let Some(ask) = price_from_f64(candle.close_ask) {
            self.trade.order_type = Some(classify_order_type(self.trade.direction, price, ask));
        }
        if self.trade.status == TradeStatus::Seed {
            self.trade.status = TradeStatus::OrderPending;
        }
    }

    fn check_fill(&mut self, candle: &Candle, now: DateTime<Utc>) {
        if self.trade.status != TradeStatus::OrderPending {
            return;
        }
        let (Some(order), Some(order_type)) = (self.trade.order_price, self.trade.order_type)
        else {
            return;
        };

        let crossed = match (self.trade.direction, order_type) {
            (TradeDirection::Long, OrderType::LimitEntry) => {
                price_from_f64(candle.low_ask).is_some_and(|low| low <= order)
            }
            (TradeDirection::Long, OrderType::StopEntry) => {
                price_from_f64(candle.high_ask).is_some_and(|high| high >= order)
            }
            (TradeDirection::Short, OrderType::LimitEntry) => {
                price_from_f64(candle.high_bid).is_some_and(|high| high >= order)
            }
            (TradeDirection::Short, OrderType::StopEntry) => {
                price_from_f64(candle.low_bid).is_some_and(|low| low <= order)
            }
        };
        if !crossed {
            return;
        }

        // Fills happen at the order price, not the candle close.
        self.trade.entry_price = Some(order);
        self.trade.entry_date = Some(now);
        self.trade.entry_quantity = self.trade.order_amount;
        self.trade.status = TradeStatus::Open;
    }

    fn update_stop(
        &mut self,
        candle: &Candle,
        now: DateTime<Utc>,
        lookup: &CandleLookup,
        options: &SimulationOptions,
    ) {
        let scheduled = match options.stop_policy {
            StopPolicy::OriginalSchedule => {
                self.stop_cursor.advance(&self.source.stop_prices, now)
            }
            // Every other mode consumes only the initial stop revision.
            StopPolicy::InitialOnly
            | StopPolicy::IndicatorTrail { .. }
            | StopPolicy::DynamicTrail => {
                if self.stop_cursor.started() {
                    None
                } else {
                    self.stop_cursor.advance(&self.source.stop_prices, now)
                }
            }
        };
        if let Some(revision) = scheduled {
            self.trade.add_stop_price(revision.date, revision.price);
            self.trade.stop_price = Some(revision.price);
        }

        if !self.trade.is_open() {
            return;
        }
        let Some(current_stop) = self.trade.stop_price else {
            return;
        };
        let candidate = match options.stop_policy {
            StopPolicy::IndicatorTrail {
                timeframe,
                indicator,
            } => trail_indicator_stop(
                self.trade.direction,
                current_stop,
                timeframe,
                indicator,
                lookup,
                now,
            ),
            StopPolicy::DynamicTrail => {
                trail_dynamic_stop(self.trade.direction, current_stop, candle, lookup, now)
            }
            StopPolicy::OriginalSchedule | StopPolicy::InitialOnly => None,
        };
        if let Some(price) = candidate {
            self.trade.add_stop_price(now, price);
            self.trade.stop_price = Some(price);
        }
    }

    fn update_limit(&mut self, now: DateTime<Utc>, options: &SimulationOptions) {
        match options.limit_policy {
            LimitPolicy::Original => {
                if let Some(revision) = self.limit_cursor.advance(&self.source.limit_prices, now) {
                    self.trade.add_limit_price(revision.date, revision.price);
                    self.trade.limit_price = Some(revision.price);
                }
            }
            LimitPolicy::FixedR { multiple } => {
                if !self.trade.limit_prices.is_empty() {
                    return;
                }
                let (Some(order), Some(stop)) =
                    (self.trade.order_price, self.trade.initial_stop())
                else {
                    return;
                };
                let limit = fixed_r_limit(order, stop, multiple);
                let date = self.trade.stop_prices.first().map(|e| e.date).unwrap_or(now);
                self.trade.add_limit_price(date, limit);
                self.trade.limit_price = Some(limit);
            }
            LimitPolicy::None => {
                self.trade.limit_price = None;
            }
        }
    }

    fn check_close(&mut self, candle: &Candle, now: DateTime<Utc>) {
        if !self.trade.is_open() {
            return;
        }

        // Crossing is detected on the candle close; the stop wins a
        // same-candle tie against the limit.
        if let Some(stop) = self.trade.stop_price {
            let crossed = match self.trade.direction {
                TradeDirection::Long => {
                    price_from_f64(candle.close_bid).is_some_and(|close| close <= stop)
                }
                TradeDirection::Short => {
                    price_from_f64(candle.close_ask).is_some_and(|close| close >= stop)
                }
            };
            if crossed {
                self.close(now, stop, CloseReason::HitStop);
                return;
            }
        }

        if let Some(limit) = self.trade.limit_price {
            let crossed = match self.trade.direction {
                TradeDirection::Long => {
                    price_from_f64(candle.close_bid).is_some_and(|close| close >= limit)
                }
                TradeDirection::Short => {
                    price_from_f64(candle.close_ask).is_some_and(|close| close <= limit)
                }
            };
            if crossed {
                self.close(now, limit, CloseReason::HitLimit);
            }
        }
    }

    fn close(&mut self, now: DateTime<Utc>, level: Decimal, reason: CloseReason) {
        self.trade.close_date = Some(now);
        self.trade.close_price = Some(level);
        self.trade.close_reason = Some(reason);
        self.trade.status = TradeStatus::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Price;
    use chrono::{Duration, TimeZone};

    fn price(s: &str) -> Price {
        s.parse().unwrap()
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap()
    }

    fn candle(minute: i64, bid_close: f64, bid_low: f64, bid_high: f64) -> Candle {
        let spread = 0.0002;
        let open_time = base_time() + Duration::minutes(minute);
        Candle {
            open_time,
            close_time: open_time + Duration::minutes(1),
            open_bid: bid_close,
            high_bid: bid_high,
            low_bid: bid_low,
            close_bid: bid_close,
            open_ask: bid_close + spread,
            high_ask: bid_high + spread,
            low_ask: bid_low + spread,
            close_ask: bid_close + spread,
        }
    }

    fn long_seed() -> Trade {
        let mut trade = Trade::new("EURUSD", TradeDirection::Long);
        trade.add_order_price(base_time(), price("1.2000"));
        trade.add_stop_price(base_time(), price("1.1950"));
        trade.order_amount = Some(price("10000"));
        trade
    }

    fn options() -> SimulationOptions {
        SimulationOptions::original(base_time(), base_time() + Duration::days(1))
    }

    fn step_at(replay: &mut ReplayTrade, minute: i64, candle: &Candle, options: &SimulationOptions) {
        let lookup = CandleLookup::new();
        let now = base_time() + Duration::minutes(minute + 1);
        replay.step(candle, now, &lookup, options);
    }

    #[test]
    fn order_fills_when_range_crosses_and_closes_on_stop() {
        let mut replay = ReplayTrade::new(&long_seed());
        let options = options();

        // Ask close 1.1992 < 1.2000: a breakout order, not yet crossed.
        let first = candle(0, 1.1990, 1.1985, 1.1995);
        step_at(&mut replay, 0, &first, &options);
        assert_eq!(replay.trade().status, TradeStatus::OrderPending);
        assert_eq!(replay.trade().order_type, Some(OrderType::StopEntry));
        assert_eq!(replay.trade().stop_price, Some(price("1.1950")));
        assert!(replay.trade().entry_price.is_none());

        // High ask 1.2007 crosses the order; entry is the order price.
        let second = candle(1, 1.2002, 1.1995, 1.2005);
        step_at(&mut replay, 1, &second, &options);
        assert_eq!(replay.trade().status, TradeStatus::Open);
        assert_eq!(replay.trade().entry_price, Some(price("1.2000")));
        assert_eq!(replay.trade().entry_quantity, Some(price("10000")));

        // Bid close at the stop level closes the trade at that level.
        let third = candle(2, 1.1948, 1.1945, 1.2003);
        step_at(&mut replay, 2, &third, &options);
        let trade = replay.trade();
        assert_eq!(trade.status, TradeStatus::Closed);
        assert_eq!(trade.close_price, Some(price("1.1950")));
        assert_eq!(trade.close_reason, Some(CloseReason::HitStop));
    }

    #[test]
    fn closed_is_terminal() {
        let mut replay = ReplayTrade::new(&long_seed());
        let options = options();
        step_at(&mut replay, 0, &candle(0, 1.1990, 1.1985, 1.2005), &options);
        step_at(&mut replay, 1, &candle(1, 1.1940, 1.1935, 1.1995), &options);
        assert_eq!(replay.trade().status, TradeStatus::Closed);
        let closed = replay.trade().clone();

        // Price recovering far beyond the old limit must not reopen it.
        step_at(&mut replay, 2, &candle(2, 1.2100, 1.2050, 1.2150), &options);
        assert_eq!(replay.trade().status, TradeStatus::Closed);
        assert_eq!(replay.trade().close_price, closed.close_price);
        assert_eq!(replay.trade().close_date, closed.close_date);
    }

    #[test]
    fn stop_wins_a_same_candle_tie_against_the_limit() {
        // One candle fills the breakout order and collapses through both the
        // stop and a limit sitting below it; the stop takes precedence.
        let mut seed = long_seed();
        seed.add_limit_price(base_time(), price("1.1940"));
        let mut replay = ReplayTrade::new(&seed);
        let options = options();

        let both_crossed = candle(0, 1.1945, 1.1942, 1.2003);
        step_at(&mut replay, 0, &both_crossed, &options);
        assert_eq!(replay.trade().status, TradeStatus::Closed);
        assert_eq!(replay.trade().close_reason, Some(CloseReason::HitStop));
        assert_eq!(replay.trade().close_price, Some(price("1.1950")));
    }

    #[test]
    fn unfilled_order_stays_pending_without_error() {
        let mut replay = ReplayTrade::new(&long_seed());
        let options = options();
        for minute in 0..10 {
            let c = candle(minute, 1.1980, 1.1975, 1.1985);
            step_at(&mut replay, minute, &c, &options);
        }
        assert_eq!(replay.trade().status, TradeStatus::OrderPending);
        assert!(replay.trade().entry_price.is_none());
        assert!(replay.trade().close_price.is_none());
    }

    #[test]
    fn fixed_r_limit_is_set_once_and_closes_the_trade() {
        let mut replay = ReplayTrade::new(&long_seed());
        let mut options = options();
        options.limit_policy = LimitPolicy::FixedR {
            multiple: price("2"),
        };

        step_at(&mut replay, 0, &candle(0, 1.2002, 1.1995, 1.2005), &options);
        // 1.2000 + (1.2000 − 1.1950) × 2
        assert_eq!(replay.trade().limit_price, Some(price("1.2100")));
        assert_eq!(replay.trade().limit_prices.len(), 1);

        // Later steps never revise it.
        step_at(&mut replay, 1, &candle(1, 1.2050, 1.2040, 1.2060), &options);
        assert_eq!(replay.trade().limit_prices.len(), 1);

        step_at(&mut replay, 2, &candle(2, 1.2101, 1.2090, 1.2110), &options);
        let trade = replay.trade();
        assert_eq!(trade.close_reason, Some(CloseReason::HitLimit));
        assert_eq!(trade.close_price, Some(price("1.2100")));
    }

    #[test]
    fn initial_only_suppresses_later_scheduled_stops() {
        let mut seed = long_seed();
        seed.add_stop_price(base_time() + Duration::minutes(1), price("1.1970"));
        let mut options = options();
        options.stop_policy = StopPolicy::InitialOnly;
        let mut replay = ReplayTrade::new(&seed);

        step_at(&mut replay, 0, &candle(0, 1.2002, 1.1995, 1.2005), &options);
        step_at(&mut replay, 1, &candle(1, 1.2002, 1.1995, 1.2005), &options);
        step_at(&mut replay, 2, &candle(2, 1.2002, 1.1995, 1.2005), &options);
        assert_eq!(replay.trade().stop_price, Some(price("1.1950")));
        assert_eq!(replay.trade().stop_prices.len(), 1);
    }

    #[test]
    fn original_schedule_replays_every_stop_revision() {
        let mut seed = long_seed();
        seed.add_stop_price(base_time() + Duration::minutes(2), price("1.1970"));
        let options = options();
        let mut replay = ReplayTrade::new(&seed);

        step_at(&mut replay, 0, &candle(0, 1.2002, 1.1995, 1.2005), &options);
        assert_eq!(replay.trade().stop_price, Some(price("1.1950")));
        step_at(&mut replay, 1, &candle(1, 1.2002, 1.1995, 1.2005), &options);
        step_at(&mut replay, 2, &candle(2, 1.2002, 1.1995, 1.2005), &options);
        assert_eq!(replay.trade().stop_price, Some(price("1.1970")));
        assert_eq!(replay.trade().stop_prices.len(), 2);
    }
}
