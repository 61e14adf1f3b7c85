use crate::candles::{CandleLookup, CandleSource, MarketDataSource};
use crate::indicators::attach_indicators;
use crate::models::{price_from_f64, Timeframe, Trade};
use crate::outcome::{recalculate_trade, OutcomeOptions};
use crate::policy::SimulationOptions;
use crate::replay::ReplayTrade;
use anyhow::Result;
use log::{debug, info, warn};
use std::sync::Arc;

/// Replays one market's seed orders over one time range: populates the
/// required timeframes with indicators attached, steps simulated time one M1
/// candle at a time, and recomputes every trade's outcome afterwards.
pub struct SimulationRunner {
    candles: Arc<dyn CandleSource>,
    markets: Arc<dyn MarketDataSource>,
}

impl SimulationRunner {
    pub fn new(candles: Arc<dyn CandleSource>, markets: Arc<dyn MarketDataSource>) -> Self {
        Self { candles, markets }
    }

    pub fn run(
        &self,
        options: &SimulationOptions,
        market: &str,
        orders: &[Trade],
    ) -> Result<Vec<Trade>> {
        options.validate()?;

        let m1 = self
            .candles
            .candles(market, Timeframe::M1, Some(options.end))?;
        let start_index = m1.partition_point(|c| c.close_time < options.start);
        let window = &m1[start_index..];
        if window.is_empty() {
            info!(
                "No M1 candles for {} between {} and {}; market yields no trades",
                market, options.start, options.end
            );
            return Ok(Vec::new());
        }

        let mut lookup = CandleLookup::new();
        for timeframe in options.required_timeframes() {
            let series = self.candles.candles(market, timeframe, Some(options.end))?;
            let kinds = options.required_indicators(timeframe);
            lookup.insert(timeframe, attach_indicators(&series, &kinds));
        }

        let details = self.markets.market_details(market);
        if details.is_none() {
            warn!(
                "No market details for {}; profit fields will stay unset",
                market
            );
        }

        let mut replays: Vec<ReplayTrade> = orders.iter().map(ReplayTrade::new).collect();
        for candle in window {
            let now = candle.close_time;
            for replay in replays.iter_mut() {
                if !replay.is_closed() {
                    replay.step(candle, now, &lookup, options);
                }
            }
        }

        // Still-open trades are valued at the last close of the window.
        let outcome_options = OutcomeOptions {
            include_open_trades: true,
            current_price: window.last().and_then(|c| price_from_f64(c.close_bid)),
        };
        let mut trades = Vec::with_capacity(replays.len());
        for replay in replays {
            let mut trade = replay.into_trade();
            recalculate_trade(&mut trade, details.as_ref(), &outcome_options);
            trades.push(trade);
        }

        debug!(
            "Replayed {} trades for {} over {} candles ({} closed)",
            trades.len(),
            market,
            window.len(),
            trades.iter().filter(|t| t.is_closed()).count()
        );
        Ok(trades)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candles::{InMemoryCandleStore, InMemoryMarketData};
    use crate::models::{MarketDetails, TradeDirection};
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn market_without_candles_yields_empty_result() {
        let store = Arc::new(InMemoryCandleStore::new());
        let markets = Arc::new(InMemoryMarketData::new());
        markets.insert(MarketDetails {
            market: "EURUSD".to_string(),
            pip_size: "0.0001".parse().unwrap(),
            pip_value: "0.0001".parse().unwrap(),
        });
        let runner = SimulationRunner::new(store, markets);

        let start = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        let options = SimulationOptions::original(start, start + Duration::days(1));
        let mut seed = Trade::new("EURUSD", TradeDirection::Long);
        seed.add_order_price(start, "1.2000".parse().unwrap());

        let trades = runner.run(&options, "EURUSD", &[seed]).unwrap();
        assert!(trades.is_empty());
    }

    #[test]
    fn invalid_options_fail_fast() {
        let runner = SimulationRunner::new(
            Arc::new(InMemoryCandleStore::new()),
            Arc::new(InMemoryMarketData::new()),
        );
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        let options = SimulationOptions::original(start, start);
        assert!(runner.run(&options, "EURUSD", &[]).is_err());
    }
}
