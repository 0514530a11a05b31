use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Caller-chosen key that ties a market data subscription to its observers
/// and to the upstream request.
pub type RequestId = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SecType {
    #[default]
    Stock,
    Option,
    Future,
    Index,
    Forex,
}

impl SecType {
    pub fn code(&self) -> &'static str {
        match self {
            SecType::Stock => "STK",
            SecType::Option => "OPT",
            SecType::Future => "FUT",
            SecType::Index => "IND",
            SecType::Forex => "CASH",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionRight {
    Call,
    Put,
}

impl OptionRight {
    pub fn code(&self) -> &'static str {
        match self {
            OptionRight::Call => "C",
            OptionRight::Put => "P",
        }
    }

    /// Accepts the short and long spellings TWS uses; anything else means
    /// "both rights".
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "C" | "CALL" => Some(OptionRight::Call),
            "P" | "PUT" => Some(OptionRight::Put),
            _ => None,
        }
    }
}

/// Contract description as understood by the upstream API.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Instrument {
    pub con_id: i64,
    pub symbol: String,
    pub sec_type: SecType,
    /// Expiry (`YYYYMMDD`) or contract month (`YYYYMM`); empty for "any"
    pub last_trade_date_or_contract_month: String,
    /// 0.0 means unset
    pub strike: f64,
    pub right: Option<OptionRight>,
    pub multiplier: String,
    pub exchange: String,
    pub primary_exchange: String,
    pub currency: String,
    pub local_symbol: String,
    pub trading_class: String,
}

impl Instrument {
    pub fn stock(symbol: &str, exchange: &str, currency: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            sec_type: SecType::Stock,
            exchange: exchange.to_string(),
            currency: currency.to_string(),
            ..Default::default()
        }
    }

    /// Option query template on the same symbol/exchange/currency as `underlying`.
    pub fn option_template(
        underlying: &Instrument,
        expiration: &str,
        right: Option<OptionRight>,
    ) -> Self {
        Self {
            symbol: underlying.symbol.clone(),
            sec_type: SecType::Option,
            last_trade_date_or_contract_month: expiration.to_string(),
            right,
            exchange: underlying.exchange.clone(),
            currency: underlying.currency.clone(),
            ..Default::default()
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.symbol, self.sec_type.code())?;
        if !self.last_trade_date_or_contract_month.is_empty() {
            write!(f, " {}", self.last_trade_date_or_contract_month)?;
        }
        if self.strike > 0.0 {
            write!(f, " {}", self.strike)?;
        }
        if let Some(right) = self.right {
            write!(f, " {}", right.code())?;
        }
        write!(f, " @{}", self.exchange)
    }
}

/// Which quote field a tick updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickType {
    BidSize,
    Bid,
    Ask,
    AskSize,
    Last,
    Volume,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickKind {
    Price { field: TickType, price: f64 },
    Size { field: TickType, size: f64 },
}

/// One market data update delivered to every observer of `request_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub request_id: RequestId,
    pub kind: TickKind,
    pub received_at: DateTime<Utc>,
}

impl Tick {
    pub fn new(request_id: RequestId, kind: TickKind) -> Self {
        Self {
            request_id,
            kind,
            received_at: Utc::now(),
        }
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TickKind::Price { field, price } => write!(f, "[{}] {:?} {:.4}", self.request_id, field, price),
            TickKind::Size { field, size } => write!(f, "[{}] {:?} {}", self.request_id, field, size),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WhatToShow {
    Trades,
    #[default]
    Midpoint,
    Bid,
    Ask,
    BidAsk,
}

/// Parameters of a historical bar query.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalRequest {
    pub end: NaiveDateTime,
    /// e.g. "50 D"
    pub duration: String,
    /// e.g. "1 min", "1 day"
    pub bar_size: String,
    pub what_to_show: WhatToShow,
    pub use_rth: bool,
}

impl HistoricalRequest {
    pub fn new(end: NaiveDateTime, duration: &str, bar_size: &str) -> Self {
        Self {
            end,
            duration: duration.to_string(),
            bar_size: bar_size.to_string(),
            what_to_show: WhatToShow::default(),
            use_rth: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub wap: f64,
    pub count: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountValue {
    pub tag: String,
    pub value: String,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AccountSummary {
    pub account: String,
    pub values: Vec<AccountValue>,
}

impl AccountSummary {
    pub fn value(&self, tag: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|v| v.tag == tag)
            .map(|v| v.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub account: String,
    pub instrument: Instrument,
    pub quantity: f64,
    pub avg_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractDetails {
    pub contract: Instrument,
    pub market_name: String,
    pub min_tick: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_historical_request_defaults() {
        let end = NaiveDate::from_ymd_opt(2025, 1, 17)
            .unwrap()
            .and_hms_opt(16, 0, 5)
            .unwrap();
        let req = HistoricalRequest::new(end, "50 D", "1 day");
        assert_eq!(req.end, end);
        assert_eq!(req.what_to_show, WhatToShow::Midpoint);
        assert!(!req.use_rth);
    }

    #[test]
    fn test_option_template_copies_underlying_venue() {
        let spy = Instrument::stock("SPY", "SMART", "USD");
        let opt = Instrument::option_template(&spy, "20250117", Some(OptionRight::Put));
        assert_eq!(opt.sec_type, SecType::Option);
        assert_eq!(opt.exchange, "SMART");
        assert_eq!(opt.right, Some(OptionRight::Put));
        assert_eq!(opt.strike, 0.0);
    }

    #[test]
    fn test_right_codes() {
        assert_eq!(OptionRight::from_code("CALL"), Some(OptionRight::Call));
        assert_eq!(OptionRight::from_code("P"), Some(OptionRight::Put));
        assert_eq!(OptionRight::from_code(""), None);
    }
}
