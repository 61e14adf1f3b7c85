use crate::models::{MarketDetails, Price, Trade, TradeStatus};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use statrs::statistics::Statistics;

/// Options for outcome recomputation. Open trades are valued at
/// `current_price` only when `include_open_trades` is set; otherwise they
/// keep empty outcome fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutcomeOptions {
    pub include_open_trades: bool,
    pub current_price: Option<Price>,
}

/// Recomputes R-multiple and gross/net profit from entry/close/stop state.
/// The same calculation serves replayed and live trades. Missing inputs
/// (no entry, no stop, no market details) leave the affected fields unset.
pub fn recalculate_trade(
    trade: &mut Trade,
    details: Option<&MarketDetails>,
    options: &OutcomeOptions,
) {
    let exit = match trade.status {
        TradeStatus::Closed => trade.close_price,
        TradeStatus::Open if options.include_open_trades => options.current_price,
        _ => None,
    };

    let (Some(entry), Some(exit)) = (trade.entry_price, exit) else {
        trade.r_multiple = None;
        trade.gross_profit = None;
        trade.net_profit = None;
        return;
    };

    trade.r_multiple = trade.initial_stop().and_then(|stop| {
        let risk = entry - stop;
        if risk.is_zero() {
            None
        } else {
            // The sign of the risk distance flips with the direction, so
            // one formula covers long and short.
            Some((exit - entry) / risk)
        }
    });

    let profit = details.and_then(|details| {
        let quantity = trade.entry_quantity?;
        if details.pip_size.is_zero() {
            return None;
        }
        let pips = (exit - entry) * trade.direction.sign() / details.pip_size;
        Some(pips * details.pip_value * quantity)
    });
    trade.gross_profit = profit;
    trade.net_profit = profit.map(|gross| {
        gross + trade.rollover.unwrap_or(Decimal::ZERO) - trade.commission.unwrap_or(Decimal::ZERO)
    });
}

/// Aggregate view over one simulation's recomputed trades, the numbers the
/// host application's summary display binds to.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSummary {
    pub total_trades: usize,
    pub closed_trades: usize,
    pub open_trades: usize,
    pub unfilled_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub mean_r_multiple: Option<f64>,
    pub median_r_multiple: Option<f64>,
    pub total_net_profit: Decimal,
}

pub fn summarize(trades: &[Trade], include_open_trades: bool) -> SimulationSummary {
    let mut closed_trades = 0usize;
    let mut open_trades = 0usize;
    let mut unfilled_trades = 0usize;
    let mut r_values: Vec<f64> = Vec::new();
    let mut winning_trades = 0usize;
    let mut losing_trades = 0usize;
    let mut total_net_profit = Decimal::ZERO;

    for trade in trades {
        match trade.status {
            TradeStatus::Closed => closed_trades += 1,
            TradeStatus::Open => open_trades += 1,
            TradeStatus::Seed | TradeStatus::OrderPending => {
                unfilled_trades += 1;
                continue;
            }
        }
        if trade.status == TradeStatus::Open && !include_open_trades {
            continue;
        }

        if let Some(r) = trade.r_multiple {
            if r > Decimal::ZERO {
                winning_trades += 1;
            } else if r < Decimal::ZERO {
                losing_trades += 1;
            }
            if let Some(value) = r.to_f64() {
                r_values.push(value);
            }
        }
        if let Some(net) = trade.net_profit {
            total_net_profit += net;
        }
    }

    let win_rate = if winning_trades + losing_trades > 0 {
        winning_trades as f64 / (winning_trades + losing_trades) as f64
    } else {
        0.0
    };

    SimulationSummary {
        total_trades: trades.len(),
        closed_trades,
        open_trades,
        unfilled_trades,
        winning_trades,
        losing_trades,
        win_rate,
        mean_r_multiple: if r_values.is_empty() {
            None
        } else {
            Some(Statistics::mean(&r_values))
        },
        median_r_multiple: median(&r_values),
        total_net_profit,
    }
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}
