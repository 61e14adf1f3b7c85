use crate::candles::CandleWithIndicators;
use crate::models::{Candle, IndicatorKind};

pub fn calculate_ema(prices: &[f64], period: usize) -> Vec<f64> {
    if prices.is_empty() {
        return Vec::new();
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema_values = Vec::with_capacity(prices.len());
    ema_values.push(prices[0]);

    for i in 1..prices.len() {
        let ema = (prices[i] * multiplier) + (ema_values[i - 1] * (1.0 - multiplier));
        ema_values.push(ema);
    }

    ema_values
}

/// Wilder ATR aligned to candle indices; entries before `period` are NaN.
pub fn calculate_atr(candles: &[Candle], period: usize) -> Vec<f64> {
    let n = candles.len();
    let mut atr = vec![f64::NAN; n];
    if n == 0 || period == 0 {
        return atr;
    }

    let mut tr_sum = 0.0f64;
    let mut prev_close = candles[0].close_bid;
    for i in 1..n {
        let c = &candles[i];
        let high_low = c.high_bid - c.low_bid;
        let high_prev = (c.high_bid - prev_close).abs();
        let low_prev = (c.low_bid - prev_close).abs();
        let tr = high_low.max(high_prev).max(low_prev);

        if i <= period {
            tr_sum += tr;
            if i == period {
                atr[i] = tr_sum / period as f64;
            }
        } else {
            let prev_atr = atr[i - 1];
            atr[i] = ((prev_atr * (period as f64 - 1.0)) + tr) / period as f64;
        }
        prev_close = c.close_bid;
    }

    atr
}

/// Computes the requested indicator series over bid closes and attaches the
/// values per candle.
pub fn attach_indicators(candles: &[Candle], kinds: &[IndicatorKind]) -> Vec<CandleWithIndicators> {
    let mut result: Vec<CandleWithIndicators> = candles
        .iter()
        .map(|c| CandleWithIndicators::new(*c))
        .collect();

    for kind in kinds {
        let series = match kind {
            IndicatorKind::Ema8 | IndicatorKind::Ema25 => {
                let closes: Vec<f64> = candles.iter().map(|c| c.close_bid).collect();
                calculate_ema(&closes, kind.period())
            }
            IndicatorKind::Atr => calculate_atr(candles, kind.period()),
        };
        for (entry, value) in result.iter_mut().zip(series) {
            if value.is_finite() {
                entry.set_indicator(*kind, value);
            }
        }
    }

    result
}
