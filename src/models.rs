use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// All trade price and quantity fields are fixed-point; candle data stays
/// `f64` and is converted at the boundary.
pub type Price = Decimal;

/// Converts a candle-side price into a trade-side price. Non-finite inputs
/// have no decimal representation and surface as `None`.
pub fn price_from_f64(value: f64) -> Option<Price> {
    Decimal::from_f64(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H2,
    H4,
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 8] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H2,
        Timeframe::H4,
        Timeframe::D1,
    ];

    pub fn seconds(self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 5 * 60,
            Timeframe::M15 => 15 * 60,
            Timeframe::M30 => 30 * 60,
            Timeframe::H1 => 60 * 60,
            Timeframe::H2 => 2 * 60 * 60,
            Timeframe::H4 => 4 * 60 * 60,
            Timeframe::D1 => 24 * 60 * 60,
        }
    }

    pub fn duration(self) -> Duration {
        Duration::seconds(self.seconds())
    }

    /// Dense slot index used by `TimeframeLookup`.
    pub(crate) fn index(self) -> usize {
        match self {
            Timeframe::M1 => 0,
            Timeframe::M5 => 1,
            Timeframe::M15 => 2,
            Timeframe::M30 => 3,
            Timeframe::H1 => 4,
            Timeframe::H2 => 5,
            Timeframe::H4 => 6,
            Timeframe::D1 => 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndicatorKind {
    Ema8,
    Ema25,
    Atr,
}

impl IndicatorKind {
    pub const COUNT: usize = 3;

    pub fn period(self) -> usize {
        match self {
            IndicatorKind::Ema8 => 8,
            IndicatorKind::Ema25 => 25,
            IndicatorKind::Atr => 14,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            IndicatorKind::Ema8 => 0,
            IndicatorKind::Ema25 => 1,
            IndicatorKind::Atr => 2,
        }
    }
}

/// One OHLC bucket for a market and timeframe, bid and ask sides kept
/// separately. Immutable once produced by the candle store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open_bid: f64,
    pub high_bid: f64,
    pub low_bid: f64,
    pub close_bid: f64,
    pub open_ask: f64,
    pub high_ask: f64,
    pub low_ask: f64,
    pub close_ask: f64,
}

/// One revision in a trade's order/stop/limit schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatePrice {
    pub date: DateTime<Utc>,
    pub price: Price,
}

impl DatePrice {
    pub fn new(date: DateTime<Utc>, price: Price) -> Self {
        Self { date, price }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeDirection {
    Long,
    Short,
}

impl TradeDirection {
    pub fn sign(self) -> Decimal {
        match self {
            TradeDirection::Long => Decimal::ONE,
            TradeDirection::Short => -Decimal::ONE,
        }
    }
}

/// Entry order classification relative to the market at placement time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderType {
    LimitEntry,
    StopEntry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CloseReason {
    HitStop,
    HitLimit,
    /// Never produced by the simulator; inherited from real trading history.
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TradeStatus {
    /// No order placed yet.
    Seed,
    /// Order price set, awaiting a fill.
    OrderPending,
    /// Entry recorded, awaiting a close.
    Open,
    /// Terminal.
    Closed,
}

/// Per-market metadata used to convert price distances into P&L.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDetails {
    pub market: String,
    /// Smallest quoted price increment, e.g. 0.0001 for EURUSD.
    pub pip_size: Decimal,
    /// Account-currency value of one pip per unit of quantity.
    pub pip_value: Decimal,
}

/// The central mutable trade record. Price schedules are kept in
/// chronological order by the `add_*_price` methods; `status` holds the
/// single pending-order/open-position state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: String,
    pub market: String,
    pub direction: TradeDirection,
    pub status: TradeStatus,
    pub order_prices: Vec<DatePrice>,
    pub stop_prices: Vec<DatePrice>,
    pub limit_prices: Vec<DatePrice>,
    pub order_price: Option<Price>,
    pub order_amount: Option<Decimal>,
    pub order_date: Option<DateTime<Utc>>,
    pub order_type: Option<OrderType>,
    pub stop_price: Option<Price>,
    pub limit_price: Option<Price>,
    pub entry_date: Option<DateTime<Utc>>,
    pub entry_price: Option<Price>,
    pub entry_quantity: Option<Decimal>,
    pub close_date: Option<DateTime<Utc>>,
    pub close_price: Option<Price>,
    pub close_reason: Option<CloseReason>,
    pub commission: Option<Decimal>,
    pub rollover: Option<Decimal>,
    pub gross_profit: Option<Decimal>,
    pub net_profit: Option<Decimal>,
    pub r_multiple: Option<Decimal>,
}

impl Trade {
    pub fn new(market: impl Into<String>, direction: TradeDirection) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            market: market.into(),
            direction,
            status: TradeStatus::Seed,
            order_prices: Vec::new(),
            stop_prices: Vec::new(),
            limit_prices: Vec::new(),
            order_price: None,
            order_amount: None,
            order_date: None,
            order_type: None,
            stop_price: None,
            limit_price: None,
            entry_date: None,
            entry_price: None,
            entry_quantity: None,
            close_date: None,
            close_price: None,
            close_reason: None,
            commission: None,
            rollover: None,
            gross_profit: None,
            net_profit: None,
            r_multiple: None,
        }
    }

    pub fn add_order_price(&mut self, date: DateTime<Utc>, price: Price) {
        Self::insert_sorted(&mut self.order_prices, DatePrice::new(date, price));
    }

    pub fn add_stop_price(&mut self, date: DateTime<Utc>, price: Price) {
        Self::insert_sorted(&mut self.stop_prices, DatePrice::new(date, price));
    }

    pub fn add_limit_price(&mut self, date: DateTime<Utc>, price: Price) {
        Self::insert_sorted(&mut self.limit_prices, DatePrice::new(date, price));
    }

    fn insert_sorted(schedule: &mut Vec<DatePrice>, entry: DatePrice) {
        let at = schedule.partition_point(|e| e.date <= entry.date);
        schedule.insert(at, entry);
    }

    /// First stop revision; the risk anchor for R-multiples.
    pub fn initial_stop(&self) -> Option<Price> {
        self.stop_prices.first().map(|e| e.price)
    }

    pub fn initial_limit(&self) -> Option<Price> {
        self.limit_prices.first().map(|e| e.price)
    }

    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    pub fn is_closed(&self) -> bool {
        self.status == TradeStatus::Closed
    }

    /// Builds the simulation input for this historical trade: one explicit
    /// clone with outcome fields reset, rather than a field-by-field copy.
    /// Order history is preserved; a trade entered directly at market gets a
    /// single synthetic order revision at its original entry.
    pub fn to_seed_order(&self) -> Trade {
        let mut seed = self.clone();
        if seed.order_prices.is_empty() {
            if let (Some(date), Some(price)) = (self.entry_date, self.entry_price) {
                seed.order_prices.push(DatePrice::new(date, price));
            }
        }
        seed.status = TradeStatus::Seed;
        seed.order_amount = self.order_amount.or(self.entry_quantity);
        seed.order_price = None;
        seed.order_date = None;
        seed.order_type = None;
        seed.stop_price = None;
        seed.limit_price = None;
        seed.entry_date = None;
        seed.entry_price = None;
        seed.entry_quantity = None;
        seed.close_date = None;
        seed.close_price = None;
        seed.close_reason = None;
        seed.gross_profit = None;
        seed.net_profit = None;
        seed.r_multiple = None;
        seed
    }
}
