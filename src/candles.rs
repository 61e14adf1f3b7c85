use crate::models::{Candle, IndicatorKind, MarketDetails, Timeframe};
use anyhow::Result;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// Read interface over historical candle data. Implementations may block on
/// cache population or broker I/O; the simulation core treats that as
/// opaque. A market/timeframe with no data yields an empty sequence, not an
/// error.
pub trait CandleSource: Send + Sync {
    /// Ordered candles for one market and timeframe, optionally truncated to
    /// those closing at or before `up_to`.
    fn candles(
        &self,
        market: &str,
        timeframe: Timeframe,
        up_to: Option<DateTime<Utc>>,
    ) -> Result<Arc<Vec<Candle>>>;

    /// The most recent candle fully closed at `at`.
    fn last_closed_candle(
        &self,
        market: &str,
        timeframe: Timeframe,
        at: DateTime<Utc>,
    ) -> Option<Candle>;
}

/// Market metadata used to convert price distances to P&L.
pub trait MarketDataSource: Send + Sync {
    fn market_details(&self, market: &str) -> Option<MarketDetails>;
}

/// Concurrent in-memory candle store. Serves as the test-time candle source
/// and as the cache layer in front of whatever broker feed the host
/// application wires in.
#[derive(Default)]
pub struct InMemoryCandleStore {
    series: DashMap<(String, Timeframe), Arc<Vec<Candle>>>,
}

impl InMemoryCandleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the stored series for one market/timeframe. Candles are
    /// sorted by close time on the way in.
    pub fn insert_candles(&self, market: &str, timeframe: Timeframe, mut candles: Vec<Candle>) {
        candles.sort_by(|a, b| a.close_time.cmp(&b.close_time));
        self.series
            .insert((market.to_string(), timeframe), Arc::new(candles));
    }
}

impl CandleSource for InMemoryCandleStore {
    fn candles(
        &self,
        market: &str,
        timeframe: Timeframe,
        up_to: Option<DateTime<Utc>>,
    ) -> Result<Arc<Vec<Candle>>> {
        let Some(series) = self
            .series
            .get(&(market.to_string(), timeframe))
            .map(|entry| entry.value().clone())
        else {
            return Ok(Arc::new(Vec::new()));
        };

        match up_to {
            Some(cutoff) if series.last().is_some_and(|c| c.close_time > cutoff) => {
                let end = series.partition_point(|c| c.close_time <= cutoff);
                Ok(Arc::new(series[..end].to_vec()))
            }
            _ => Ok(series),
        }
    }

    fn last_closed_candle(
        &self,
        market: &str,
        timeframe: Timeframe,
        at: DateTime<Utc>,
    ) -> Option<Candle> {
        let series = self.series.get(&(market.to_string(), timeframe))?;
        let end = series.partition_point(|c| c.close_time <= at);
        series.get(end.checked_sub(1)?).copied()
    }
}

#[derive(Default)]
pub struct InMemoryMarketData {
    details: DashMap<String, MarketDetails>,
}

impl InMemoryMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, details: MarketDetails) {
        self.details.insert(details.market.clone(), details);
    }
}

impl MarketDataSource for InMemoryMarketData {
    fn market_details(&self, market: &str) -> Option<MarketDetails> {
        self.details.get(market).map(|entry| entry.value().clone())
    }
}

/// A candle annotated with the indicator values the active policies need.
#[derive(Debug, Clone, Copy)]
pub struct CandleWithIndicators {
    pub candle: Candle,
    values: [Option<f64>; IndicatorKind::COUNT],
}

impl CandleWithIndicators {
    pub fn new(candle: Candle) -> Self {
        Self {
            candle,
            values: [None; IndicatorKind::COUNT],
        }
    }

    pub fn set_indicator(&mut self, kind: IndicatorKind, value: f64) {
        self.values[kind.index()] = Some(value);
    }

    pub fn indicator(&self, kind: IndicatorKind) -> Option<f64> {
        self.values[kind.index()]
    }
}

/// Dense map from timeframe to per-timeframe data, so the replay can consult
/// coarser timeframes while stepping at the finest one.
pub struct TimeframeLookup<T> {
    slots: [Option<T>; Timeframe::ALL.len()],
}

impl<T> TimeframeLookup<T> {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    pub fn insert(&mut self, timeframe: Timeframe, value: T) {
        self.slots[timeframe.index()] = Some(value);
    }

    pub fn get(&self, timeframe: Timeframe) -> Option<&T> {
        self.slots[timeframe.index()].as_ref()
    }
}

impl<T> Default for TimeframeLookup<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub type CandleLookup = TimeframeLookup<Vec<CandleWithIndicators>>;

/// Last fully-closed annotated candle of `timeframe` at simulated time `at`.
pub fn last_closed_in_lookup(
    lookup: &CandleLookup,
    timeframe: Timeframe,
    at: DateTime<Utc>,
) -> Option<&CandleWithIndicators> {
    let series = lookup.get(timeframe)?;
    let end = series.partition_point(|c| c.candle.close_time <= at);
    series.get(end.checked_sub(1)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn candle(offset_minutes: i64, timeframe: Timeframe, close: f64) -> Candle {
        let open_time =
            Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap() + Duration::minutes(offset_minutes);
        Candle {
            open_time,
            close_time: open_time + timeframe.duration(),
            open_bid: close,
            high_bid: close,
            low_bid: close,
            close_bid: close,
            open_ask: close,
            high_ask: close,
            low_ask: close,
            close_ask: close,
        }
    }

    #[test]
    fn store_sorts_and_truncates() {
        let store = InMemoryCandleStore::new();
        let candles = vec![
            candle(2, Timeframe::M1, 1.2),
            candle(0, Timeframe::M1, 1.1),
            candle(1, Timeframe::M1, 1.15),
        ];
        store.insert_candles("EURUSD", Timeframe::M1, candles);

        let all = store.candles("EURUSD", Timeframe::M1, None).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].close_time <= w[1].close_time));

        let cutoff = Utc.with_ymd_and_hms(2024, 3, 4, 0, 2, 0).unwrap();
        let truncated = store
            .candles("EURUSD", Timeframe::M1, Some(cutoff))
            .unwrap();
        assert_eq!(truncated.len(), 2);
    }

    #[test]
    fn unknown_market_is_empty_not_error() {
        let store = InMemoryCandleStore::new();
        let candles = store.candles("XAUUSD", Timeframe::M1, None).unwrap();
        assert!(candles.is_empty());
        assert!(store
            .last_closed_candle("XAUUSD", Timeframe::M1, Utc::now())
            .is_none());
    }

    #[test]
    fn last_closed_respects_close_time() {
        let store = InMemoryCandleStore::new();
        store.insert_candles(
            "EURUSD",
            Timeframe::H2,
            vec![candle(0, Timeframe::H2, 1.2), candle(120, Timeframe::H2, 1.3)],
        );

        let base = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        assert!(store
            .last_closed_candle("EURUSD", Timeframe::H2, base + Duration::minutes(119))
            .is_none());
        let first = store
            .last_closed_candle("EURUSD", Timeframe::H2, base + Duration::minutes(120))
            .unwrap();
        assert_eq!(first.close_bid, 1.2);
        let second = store
            .last_closed_candle("EURUSD", Timeframe::H2, base + Duration::minutes(300))
            .unwrap();
        assert_eq!(second.close_bid, 1.3);
    }
}
