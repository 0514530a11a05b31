//! In-memory upstream used by the broker tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::broker::error::{BrokerError, Result};
use crate::broker::types::*;

use super::gateway::{ConnectParams, Gateway};

#[derive(Default)]
pub struct MockGateway {
    connected: AtomicBool,
    pub mkt_data_requests: AtomicUsize,
    pub cancel_requests: AtomicUsize,
    pub fail_mkt_data: AtomicBool,
    pub fail_cancel: AtomicBool,
    pub fail_connect: AtomicBool,
    streams: Mutex<HashMap<RequestId, UnboundedSender<Tick>>>,
    connect_params: Mutex<Option<ConnectParams>>,
    contract_details: Mutex<Vec<ContractDetails>>,
    contract_queries: Mutex<Vec<Instrument>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a tick into the upstream stream of `request_id`.
    pub fn push(&self, request_id: RequestId, kind: TickKind) -> bool {
        let streams = self.streams.lock().unwrap();
        match streams.get(&request_id) {
            Some(tx) => tx.send(Tick::new(request_id, kind)).is_ok(),
            None => false,
        }
    }

    /// Ends the upstream stream of `request_id` as if the session dropped it.
    pub fn close_stream(&self, request_id: RequestId) -> bool {
        self.streams.lock().unwrap().remove(&request_id).is_some()
    }

    pub fn has_stream(&self, request_id: RequestId) -> bool {
        self.streams.lock().unwrap().contains_key(&request_id)
    }

    pub fn set_contract_details(&self, details: Vec<ContractDetails>) {
        *self.contract_details.lock().unwrap() = details;
    }

    pub fn last_contract_query(&self) -> Option<Instrument> {
        self.contract_queries.lock().unwrap().last().cloned()
    }

    pub fn connect_params(&self) -> Option<ConnectParams> {
        self.connect_params.lock().unwrap().clone()
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn connect(&self, params: &ConnectParams) -> Result<()> {
        *self.connect_params.lock().unwrap() = Some(params.clone());
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(BrokerError::Handshake("connection refused".into()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.streams.lock().unwrap().clear();
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn req_mkt_data(&self, request_id: RequestId, _instrument: &Instrument) -> Result<UnboundedReceiver<Tick>> {
        self.mkt_data_requests.fetch_add(1, Ordering::SeqCst);
        // Yield so concurrent subscribe calls really interleave here.
        tokio::task::yield_now().await;
        if self.fail_mkt_data.load(Ordering::SeqCst) {
            return Err(BrokerError::Upstream {
                request_id,
                message: "No security definition has been found".into(),
            });
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.streams.lock().unwrap().insert(request_id, tx);
        Ok(rx)
    }

    async fn cancel_mkt_data(&self, request_id: RequestId) -> Result<()> {
        self.cancel_requests.fetch_add(1, Ordering::SeqCst);
        if self.fail_cancel.load(Ordering::SeqCst) {
            return Err(BrokerError::NotConnected);
        }
        self.streams.lock().unwrap().remove(&request_id);
        Ok(())
    }

    async fn req_historical_data(&self, _instrument: &Instrument, request: &HistoricalRequest) -> Result<Vec<Bar>> {
        Ok(vec![Bar {
            date: request.end.format("%Y%m%d").to_string(),
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 100.0,
            wap: 1.2,
            count: 7,
        }])
    }

    async fn req_account_summary(&self) -> Result<AccountSummary> {
        Ok(AccountSummary {
            account: "DU1234567".into(),
            values: vec![AccountValue {
                tag: "NetLiquidation".into(),
                value: "25000.00".into(),
                currency: "USD".into(),
            }],
        })
    }

    async fn req_positions(&self) -> Result<Vec<Position>> {
        Ok(vec![Position {
            account: "DU1234567".into(),
            instrument: Instrument::stock("MSFT", "SMART", "USD"),
            quantity: 10.0,
            avg_cost: 410.5,
        }])
    }

    async fn req_contract_details(&self, instrument: &Instrument) -> Result<Vec<ContractDetails>> {
        self.contract_queries.lock().unwrap().push(instrument.clone());
        Ok(self.contract_details.lock().unwrap().clone())
    }
}
