use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::broker::error::Result;
use crate::broker::types::*;

/// Everything needed to open an API session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub client_id: i32,
    pub read_only: bool,
    pub timeout_secs: u64,
}

/// The upstream market data / account API. `IbClient` implements it over
/// `ibapi`; tests plug in an in-memory double.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn connect(&self, params: &ConnectParams) -> Result<()>;

    fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Starts streaming market data for `request_id`. The receiver closes
    /// when the stream is cancelled or the session drops.
    async fn req_mkt_data(
        &self,
        request_id: RequestId,
        instrument: &Instrument,
    ) -> Result<UnboundedReceiver<Tick>>;

    async fn cancel_mkt_data(&self, request_id: RequestId) -> Result<()>;

    async fn req_historical_data(
        &self,
        instrument: &Instrument,
        request: &HistoricalRequest,
    ) -> Result<Vec<Bar>>;

    async fn req_account_summary(&self) -> Result<AccountSummary>;

    async fn req_positions(&self) -> Result<Vec<Position>>;

    async fn req_contract_details(&self, instrument: &Instrument) -> Result<Vec<ContractDetails>>;
}
