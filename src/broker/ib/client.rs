//! [`Gateway`] backed by the `ibapi` async client.
//!
//! Market data uses the tick-by-tick bid/ask feed; every quote update is
//! split into bid, ask and size ticks. One-shot queries drain their
//! subscription until the end marker under [`IB_REQUEST_TIMEOUT_SECS`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use ibapi::contracts::Contract;
use ibapi::market_data::historical;
use ibapi::prelude::*;
use time::OffsetDateTime;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::broker::error::{BrokerError, Result};
use crate::broker::types::{
    AccountSummary, AccountValue, Bar, ContractDetails, HistoricalRequest, Instrument, OptionRight, Position,
    RequestId, SecType, Tick, TickKind, TickType, WhatToShow,
};
use crate::config::{ACCOUNT_SUMMARY_TAGS, IB_REQUEST_TIMEOUT_SECS};

use super::gateway::{ConnectParams, Gateway};

const ALL_ACCOUNTS: &str = "All";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One API session per connect. Each market data stream runs on its own
/// task that owns the `ibapi` subscription; aborting the task drops the
/// subscription, which cancels it upstream.
#[derive(Default)]
pub struct IbClient {
    client: Mutex<Option<Arc<Client>>>,
    streams: Mutex<HashMap<RequestId, JoinHandle<()>>>,
}

impl IbClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn session(&self) -> Result<Arc<Client>> {
        lock(&self.client).clone().ok_or(BrokerError::NotConnected)
    }

    fn stop_streams(&self) {
        for (_, stream) in lock(&self.streams).drain() {
            stream.abort();
        }
    }
}

/// Runs a one-shot query with the request timeout.
async fn bounded<T, F>(what: &'static str, request: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, ibapi::Error>>,
{
    match timeout(Duration::from_secs(IB_REQUEST_TIMEOUT_SECS), request).await {
        Ok(result) => result.map_err(|e| BrokerError::Api(e.to_string())),
        Err(_) => Err(BrokerError::RequestTimeout(what)),
    }
}

fn security_type(sec_type: SecType) -> SecurityType {
    match sec_type {
        SecType::Stock => SecurityType::Stock,
        SecType::Option => SecurityType::Option,
        SecType::Future => SecurityType::Future,
        SecType::Index => SecurityType::Index,
        SecType::Forex => SecurityType::ForexPair,
    }
}

fn sec_type(security_type: &SecurityType) -> SecType {
    match security_type {
        SecurityType::Option => SecType::Option,
        SecurityType::Future => SecType::Future,
        SecurityType::Index => SecType::Index,
        SecurityType::ForexPair => SecType::Forex,
        _ => SecType::Stock,
    }
}

fn contract_for(instrument: &Instrument) -> Contract {
    Contract {
        contract_id: instrument.con_id as i32,
        symbol: Symbol(instrument.symbol.clone()),
        security_type: security_type(instrument.sec_type),
        last_trade_date_or_contract_month: instrument.last_trade_date_or_contract_month.clone(),
        strike: instrument.strike,
        right: instrument.right.map(|r| r.code().to_string()).unwrap_or_default(),
        multiplier: instrument.multiplier.clone(),
        exchange: Exchange(instrument.exchange.clone()),
        currency: Currency(instrument.currency.clone()),
        local_symbol: instrument.local_symbol.clone(),
        trading_class: instrument.trading_class.clone(),
        ..Default::default()
    }
}

fn instrument_from(contract: &Contract) -> Instrument {
    Instrument {
        con_id: i64::from(contract.contract_id),
        symbol: contract.symbol.0.clone(),
        sec_type: sec_type(&contract.security_type),
        last_trade_date_or_contract_month: contract.last_trade_date_or_contract_month.clone(),
        strike: contract.strike,
        right: OptionRight::from_code(&contract.right),
        multiplier: contract.multiplier.clone(),
        exchange: contract.exchange.0.clone(),
        currency: contract.currency.0.clone(),
        local_symbol: contract.local_symbol.clone(),
        trading_class: contract.trading_class.clone(),
        ..Default::default()
    }
}

/// Splits "50 D" into its count and unit letter.
fn split_duration(spec: &str) -> Option<(i32, char)> {
    let mut parts = spec.split_whitespace();
    let count = parts.next()?.parse().ok()?;
    let unit = parts.next()?.chars().next()?.to_ascii_uppercase();
    match parts.next() {
        None => Some((count, unit)),
        Some(_) => None,
    }
}

fn duration(spec: &str) -> Result<historical::Duration> {
    let invalid = || BrokerError::InvalidRequest(format!("unsupported duration '{spec}'"));
    let (count, unit) = split_duration(spec).ok_or_else(invalid)?;
    Ok(match unit {
        'S' => historical::Duration::seconds(count),
        'D' => historical::Duration::days(count),
        'W' => historical::Duration::weeks(count),
        'M' => historical::Duration::months(count),
        'Y' => historical::Duration::years(count),
        _ => return Err(invalid()),
    })
}

fn bar_size(spec: &str) -> Result<historical::BarSize> {
    use historical::BarSize;
    let normalized = spec.trim().to_lowercase();
    let size = match normalized.trim_end_matches('s') {
        "1 sec" => BarSize::Sec,
        "5 sec" => BarSize::Sec5,
        "15 sec" => BarSize::Sec15,
        "30 sec" => BarSize::Sec30,
        "1 min" => BarSize::Min,
        "2 min" => BarSize::Min2,
        "3 min" => BarSize::Min3,
        "5 min" => BarSize::Min5,
        "15 min" => BarSize::Min15,
        "20 min" => BarSize::Min20,
        "30 min" => BarSize::Min30,
        "1 hour" => BarSize::Hour,
        "2 hour" => BarSize::Hour2,
        "3 hour" => BarSize::Hour3,
        "4 hour" => BarSize::Hour4,
        "8 hour" => BarSize::Hour8,
        "1 day" => BarSize::Day,
        "1 week" => BarSize::Week,
        "1 month" => BarSize::Month,
        _ => return Err(BrokerError::InvalidRequest(format!("unsupported bar size '{spec}'"))),
    };
    Ok(size)
}

fn what_to_show(value: WhatToShow) -> historical::WhatToShow {
    match value {
        WhatToShow::Trades => historical::WhatToShow::Trades,
        WhatToShow::Midpoint => historical::WhatToShow::MidPoint,
        WhatToShow::Bid => historical::WhatToShow::Bid,
        WhatToShow::Ask => historical::WhatToShow::Ask,
        WhatToShow::BidAsk => historical::WhatToShow::BidAsk,
    }
}

/// Daily and longer bars are dated `YYYYMMDD`, intraday bars carry the time.
fn bar_date(unix_seconds: i64, daily: bool) -> String {
    let format = if daily { "%Y%m%d" } else { "%Y%m%d %H:%M:%S" };
    DateTime::from_timestamp(unix_seconds, 0)
        .map(|date| date.format(format).to_string())
        .unwrap_or_default()
}

fn quote_ticks(request_id: RequestId, bid: f64, ask: f64, bid_size: f64, ask_size: f64) -> [Tick; 4] {
    [
        Tick::new(request_id, TickKind::Price { field: TickType::Bid, price: bid }),
        Tick::new(request_id, TickKind::Size { field: TickType::BidSize, size: bid_size }),
        Tick::new(request_id, TickKind::Price { field: TickType::Ask, price: ask }),
        Tick::new(request_id, TickKind::Size { field: TickType::AskSize, size: ask_size }),
    ]
}

#[async_trait]
impl Gateway for IbClient {
    async fn connect(&self, params: &ConnectParams) -> Result<()> {
        let address = format!("{}:{}", params.host, params.port);
        let client = match timeout(
            Duration::from_secs(params.timeout_secs),
            Client::connect(&address, params.client_id),
        )
        .await
        {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => return Err(BrokerError::Handshake(e.to_string())),
            Err(_) => {
                return Err(BrokerError::ConnectTimeout {
                    host: params.host.clone(),
                    port: params.port,
                    secs: params.timeout_secs,
                })
            }
        };

        self.stop_streams();
        *lock(&self.client) = Some(Arc::new(client));
        info!(%address, client_id = params.client_id, read_only = params.read_only, "IB API session opened");
        Ok(())
    }

    fn disconnect(&self) {
        self.stop_streams();
        if lock(&self.client).take().is_some() {
            debug!("IB API session closed");
        }
    }

    fn is_connected(&self) -> bool {
        lock(&self.client).is_some()
    }

    async fn req_mkt_data(&self, request_id: RequestId, instrument: &Instrument) -> Result<UnboundedReceiver<Tick>> {
        let client = self.session()?;
        let contract = contract_for(instrument);
        let (ready_tx, ready_rx) = oneshot::channel::<std::result::Result<(), String>>();
        let (tx, rx) = mpsc::unbounded_channel();

        let stream = tokio::spawn(async move {
            let mut quotes = match client.tick_by_tick_bid_ask(&contract, 0, false).await {
                Ok(quotes) => {
                    let _ = ready_tx.send(Ok(()));
                    quotes
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };
            while let Some(update) = quotes.next().await {
                match update {
                    Ok(quote) => {
                        let ticks = quote_ticks(request_id, quote.bid_price, quote.ask_price, quote.bid_size, quote.ask_size);
                        for tick in ticks {
                            if tx.send(tick).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(request_id, error = %e, "market data stream failed");
                        break;
                    }
                }
            }
        });

        match ready_rx.await {
            Ok(Ok(())) => {
                if let Some(previous) = lock(&self.streams).insert(request_id, stream) {
                    previous.abort();
                }
                Ok(rx)
            }
            Ok(Err(message)) => Err(BrokerError::Upstream { request_id, message }),
            Err(_) => Err(BrokerError::Upstream {
                request_id,
                message: "market data task ended before the request was sent".into(),
            }),
        }
    }

    async fn cancel_mkt_data(&self, request_id: RequestId) -> Result<()> {
        self.session()?;
        if let Some(stream) = lock(&self.streams).remove(&request_id) {
            stream.abort();
        }
        Ok(())
    }

    async fn req_historical_data(&self, instrument: &Instrument, request: &HistoricalRequest) -> Result<Vec<Bar>> {
        let client = self.session()?;
        let contract = contract_for(instrument);
        let end = OffsetDateTime::from_unix_timestamp(request.end.and_utc().timestamp())
            .map_err(|e| BrokerError::InvalidRequest(e.to_string()))?;
        let size = bar_size(&request.bar_size)?;
        let daily = matches!(
            size,
            historical::BarSize::Day | historical::BarSize::Week | historical::BarSize::Month
        );
        let hours = if request.use_rth {
            ibapi::market_data::TradingHours::Regular
        } else {
            ibapi::market_data::TradingHours::Extended
        };

        let data = bounded(
            "historical data",
            client.historical_data(
                &contract,
                Some(end),
                duration(&request.duration)?,
                size,
                Some(what_to_show(request.what_to_show)),
                hours,
            ),
        )
        .await?;

        Ok(data
            .bars
            .iter()
            .map(|bar| Bar {
                date: bar_date(bar.date.unix_timestamp(), daily),
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
                wap: bar.wap,
                count: bar.count,
            })
            .collect())
    }

    async fn req_account_summary(&self) -> Result<AccountSummary> {
        let client = self.session()?;
        let tags: Vec<&str> = ACCOUNT_SUMMARY_TAGS.split(',').collect();
        bounded("account summary", async {
            let group = ibapi::accounts::types::AccountGroup(ALL_ACCOUNTS.to_string());
            let mut rows = client.account_summary(&group, &tags).await?;
            let mut summary = AccountSummary::default();
            while let Some(row) = rows.next().await {
                let ibapi::accounts::AccountSummaryResult::Summary(row) = row? else {
                    break;
                };
                if summary.account.is_empty() {
                    summary.account = row.account.clone();
                }
                summary.values.push(AccountValue {
                    tag: row.tag,
                    value: row.value,
                    currency: row.currency,
                });
            }
            Ok::<_, ibapi::Error>(summary)
        })
        .await
    }

    async fn req_positions(&self) -> Result<Vec<Position>> {
        let client = self.session()?;
        bounded("positions", async {
            let mut updates = client.positions().await?;
            let mut positions = Vec::new();
            while let Some(update) = updates.next().await {
                let ibapi::accounts::PositionUpdate::Position(position) = update? else {
                    break;
                };
                positions.push(Position {
                    account: position.account,
                    instrument: instrument_from(&position.contract),
                    quantity: position.position,
                    avg_cost: position.average_cost,
                });
            }
            Ok::<_, ibapi::Error>(positions)
        })
        .await
    }

    async fn req_contract_details(&self, instrument: &Instrument) -> Result<Vec<ContractDetails>> {
        let client = self.session()?;
        let contract = contract_for(instrument);
        let details = bounded("contract details", client.contract_details(&contract)).await?;
        Ok(details
            .into_iter()
            .map(|d| ContractDetails {
                contract: instrument_from(&d.contract),
                market_name: d.market_name,
                min_tick: d.min_tick,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_conversion_keeps_option_fields() {
        let underlying = Instrument::stock("SPY", "SMART", "USD");
        let mut option = Instrument::option_template(&underlying, "20250117", Some(OptionRight::Put));
        option.strike = 450.0;
        option.multiplier = "100".into();

        let contract = contract_for(&option);
        assert_eq!(contract.symbol.0, "SPY");
        assert_eq!(contract.right, "P");
        assert!(matches!(contract.security_type, SecurityType::Option));
        assert_eq!(instrument_from(&contract), option);
    }

    #[test]
    fn test_stock_contract_has_no_right() {
        let contract = contract_for(&Instrument::stock("AAPL", "SMART", "USD"));
        assert!(contract.right.is_empty());
        assert!(matches!(contract.security_type, SecurityType::Stock));
        assert_eq!(instrument_from(&contract).right, None);
    }

    #[test]
    fn test_duration_and_bar_size_parsing() {
        assert_eq!(split_duration("50 D"), Some((50, 'D')));
        assert_eq!(split_duration("2 w"), Some((2, 'W')));
        assert_eq!(split_duration("D 50"), None);
        assert_eq!(split_duration("50 D extra"), None);
        assert!(duration("3 Y").is_ok());
        assert!(matches!(duration("3 Q"), Err(BrokerError::InvalidRequest(_))));

        assert!(matches!(bar_size("1 day"), Ok(historical::BarSize::Day)));
        assert!(matches!(bar_size("5 mins"), Ok(historical::BarSize::Min5)));
        assert!(matches!(bar_size("1 Hour"), Ok(historical::BarSize::Hour)));
        assert!(matches!(bar_size("7 mins"), Err(BrokerError::InvalidRequest(_))));
    }

    #[test]
    fn test_bar_dates() {
        // 2025-02-03 16:00:00 UTC
        assert_eq!(bar_date(1_738_598_400, true), "20250203");
        assert_eq!(bar_date(1_738_598_400, false), "20250203 16:00:00");
    }

    #[test]
    fn test_quote_update_becomes_price_and_size_ticks() {
        let ticks = quote_ticks(4, 187.1, 187.2, 300.0, 200.0);
        let kinds: Vec<&TickKind> = ticks.iter().map(|t| &t.kind).collect();
        assert!(ticks.iter().all(|t| t.request_id == 4));
        assert_eq!(kinds[0], &TickKind::Price { field: TickType::Bid, price: 187.1 });
        assert_eq!(kinds[1], &TickKind::Size { field: TickType::BidSize, size: 300.0 });
        assert_eq!(kinds[2], &TickKind::Price { field: TickType::Ask, price: 187.2 });
        assert_eq!(kinds[3], &TickKind::Size { field: TickType::AskSize, size: 200.0 });
    }

    #[tokio::test]
    async fn test_requests_without_session_fail_fast() {
        let client = IbClient::new();
        assert!(!client.is_connected());
        assert!(matches!(client.req_positions().await, Err(BrokerError::NotConnected)));
        assert!(matches!(client.cancel_mkt_data(1).await, Err(BrokerError::NotConnected)));
        let aapl = Instrument::stock("AAPL", "SMART", "USD");
        assert!(matches!(client.req_mkt_data(1, &aapl).await, Err(BrokerError::NotConnected)));
        client.disconnect();
    }
}
