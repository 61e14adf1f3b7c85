use crate::models::{IndicatorKind, Timeframe};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Timeframe whose ATR drives the dynamic volatility trailing stop.
pub const DYNAMIC_TRAIL_TIMEFRAME: Timeframe = Timeframe::H2;
/// ATR multiple used by the dynamic volatility trailing stop.
pub const DYNAMIC_TRAIL_ATR_MULTIPLIER: f64 = 2.0;

/// How stop revisions are produced during the replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "mode")]
pub enum StopPolicy {
    /// Replay the historical stop revisions verbatim.
    OriginalSchedule,
    /// Apply only the first historical stop revision.
    InitialOnly,
    /// Initial stop, then trail an EMA on the given timeframe.
    IndicatorTrail {
        timeframe: Timeframe,
        indicator: IndicatorKind,
    },
    /// Initial stop, then trail the current price by an ATR multiple.
    DynamicTrail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "mode")]
pub enum LimitPolicy {
    /// Replay the historical limit revisions verbatim.
    Original,
    /// One limit at entry plus `multiple` times the initial risk, set once.
    FixedR { multiple: Decimal },
    /// No limit; the trade closes only on its stop.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "mode")]
pub enum OrderPolicy {
    Original,
    /// Shift order prices toward a more favourable fill by `percent`.
    PercentBetter { percent: Decimal },
    /// Shift order prices toward a less favourable fill by `percent`.
    PercentWorse { percent: Decimal },
}

/// Configuration errors indicate caller bugs and fail fast; missing data
/// during a replay never does.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("simulation window end {end} is not after start {start}")]
    EmptyWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("limit R multiple must be positive (value: {0})")]
    NonPositiveRMultiple(Decimal),
    #[error("order adjustment percent must be positive (value: {0})")]
    NonPositivePercent(Decimal),
    #[error("stop indicator trail requires an EMA indicator (value: {0:?})")]
    NonEmaTrailIndicator(IndicatorKind),
    #[error("worker count must be greater than zero")]
    ZeroWorkers,
}

/// One replay run: the date range plus the policy selection for each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationOptions {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub stop_policy: StopPolicy,
    pub limit_policy: LimitPolicy,
    pub order_policy: OrderPolicy,
}

impl SimulationOptions {
    /// All-original policies over the given window.
    pub fn original(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            stop_policy: StopPolicy::OriginalSchedule,
            limit_policy: LimitPolicy::Original,
            order_policy: OrderPolicy::Original,
        }
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.end <= self.start {
            return Err(PolicyError::EmptyWindow {
                start: self.start,
                end: self.end,
            });
        }
        if let StopPolicy::IndicatorTrail { indicator, .. } = self.stop_policy {
            if indicator == IndicatorKind::Atr {
                return Err(PolicyError::NonEmaTrailIndicator(indicator));
            }
        }
        if let LimitPolicy::FixedR { multiple } = self.limit_policy {
            if multiple <= Decimal::ZERO {
                return Err(PolicyError::NonPositiveRMultiple(multiple));
            }
        }
        match self.order_policy {
            OrderPolicy::PercentBetter { percent } | OrderPolicy::PercentWorse { percent }
                if percent <= Decimal::ZERO =>
            {
                return Err(PolicyError::NonPositivePercent(percent));
            }
            _ => {}
        }
        Ok(())
    }

    /// Timeframes the replay must populate: the stepping timeframe plus
    /// whatever the stop policy consults.
    pub fn required_timeframes(&self) -> Vec<Timeframe> {
        let mut timeframes = vec![Timeframe::M1];
        match self.stop_policy {
            StopPolicy::IndicatorTrail { timeframe, .. } => {
                if !timeframes.contains(&timeframe) {
                    timeframes.push(timeframe);
                }
            }
            StopPolicy::DynamicTrail => {
                if !timeframes.contains(&DYNAMIC_TRAIL_TIMEFRAME) {
                    timeframes.push(DYNAMIC_TRAIL_TIMEFRAME);
                }
            }
            StopPolicy::OriginalSchedule | StopPolicy::InitialOnly => {}
        }
        timeframes
    }

    /// Indicators to precompute for `timeframe` during candle population.
    pub fn required_indicators(&self, timeframe: Timeframe) -> Vec<IndicatorKind> {
        match self.stop_policy {
            StopPolicy::IndicatorTrail {
                timeframe: trail_timeframe,
                indicator,
            } if trail_timeframe == timeframe => vec![indicator, IndicatorKind::Atr],
            StopPolicy::DynamicTrail if timeframe == DYNAMIC_TRAIL_TIMEFRAME => {
                vec![IndicatorKind::Atr]
            }
            _ => Vec::new(),
        }
    }
}
