pub mod client;
pub mod gateway;
#[cfg(test)]
pub mod mock;
pub mod option_chain;
pub mod reachability;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};

use crate::config::IB_CONNECT_TIMEOUT_SECS;
use crate::settings::SharedSettings;

use super::error::{BrokerError, Result};
use super::subscriptions::{log_fan_out_failures, Registration, SubscriptionTable};
use super::types::*;
use super::{Broker, BrokerKind, Observer, OptionChainProvider, SubscribeOutcome};

pub use gateway::{ConnectParams, Gateway};
pub use option_chain::OptionChain;
pub use reachability::{Reachability, SystemReachability};
pub use client::IbClient;

const LOCALHOST: &str = "127.0.0.1";

/// Live Interactive Brokers connection.
///
/// Market data is multiplexed per request id: the first observer of an id
/// opens one upstream stream, every later observer of the same id shares it.
/// Connection settings are read from the shared settings tree at connect time.
pub struct IbBroker {
    settings: SharedSettings,
    gateway: Arc<dyn Gateway>,
    reachability: Arc<dyn Reachability>,
    subscriptions: Arc<SubscriptionTable>,
    chain: OptionChain,
}

impl IbBroker {
    pub fn new(settings: SharedSettings, gateway: Arc<dyn Gateway>, reachability: Arc<dyn Reachability>) -> Self {
        Self {
            settings,
            chain: OptionChain::new(Arc::clone(&gateway)),
            gateway,
            reachability,
            subscriptions: Arc::new(SubscriptionTable::new()),
        }
    }

    /// Broker backed by a real `ibapi` session.
    pub fn live(settings: SharedSettings) -> Self {
        Self::new(settings, Arc::new(IbClient::new()), Arc::new(SystemReachability))
    }

    pub fn subscriptions(&self) -> &SubscriptionTable {
        &self.subscriptions
    }

    async fn connect_params(&self) -> ConnectParams {
        let settings = self.settings.read().await;
        let ib = &settings.broker.ib;
        ConnectParams {
            host: ib.ip.clone(),
            port: ib.port,
            client_id: ib.client_id,
            read_only: ib.read_only,
            timeout_secs: IB_CONNECT_TIMEOUT_SECS,
        }
    }
}

/// Forwards one upstream stream to the observers of `request_id`. The table
/// lock is only taken to snapshot the observer list. When the upstream ends
/// on its own the entry is dropped, so the next subscribe for the id issues a
/// fresh request.
async fn pump_ticks(
    table: Arc<SubscriptionTable>,
    request_id: RequestId,
    generation: u64,
    mut upstream: UnboundedReceiver<Tick>,
) {
    while let Some(tick) = upstream.recv().await {
        if let Some(report) = table.dispatch(request_id, &tick) {
            log_fan_out_failures(&report);
        }
    }
    if table.remove_if_current(request_id, generation) {
        warn!(request_id, "Upstream market data stream ended, subscription dropped");
    } else {
        debug!(request_id, "upstream market data stream closed");
    }
}

#[async_trait]
impl Broker for IbBroker {
    fn kind(&self) -> BrokerKind {
        BrokerKind::InteractiveBrokers
    }

    async fn connect(&self) -> Result<()> {
        let params = self.connect_params().await;

        if params.host == LOCALHOST {
            if !self.reachability.local_gateway_running().await {
                warn!("TWS or IB Gateway is not running");
                return Err(BrokerError::GatewayNotRunning);
            }
        } else if !self.reachability.host_reachable(&params.host).await {
            warn!(host = %params.host, "IB host is not reachable");
            return Err(BrokerError::HostUnreachable(params.host));
        }

        match self.gateway.connect(&params).await {
            Ok(()) => {
                self.subscriptions.clear();
                info!(host = %params.host, port = params.port, client_id = params.client_id, "Connected to Interactive Brokers API");
                Ok(())
            }
            Err(e) => {
                error!(host = %params.host, port = params.port, error = %e, "Failed to connect to IB");
                Err(e)
            }
        }
    }

    async fn disconnect(&self) -> Result<()> {
        if self.gateway.is_connected() {
            self.gateway.disconnect();
            self.subscriptions.clear();
            info!("Disconnected from Interactive Brokers API");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.gateway.is_connected()
    }

    async fn subscribe_market_data(
        &self,
        instrument: &Instrument,
        observer: Observer,
        request_id: RequestId,
    ) -> Result<SubscribeOutcome> {
        let _sequence = self.subscriptions.sequence().await;

        let generation = match self.subscriptions.register(request_id, instrument, observer) {
            Registration::Created { generation } => generation,
            Registration::Attached | Registration::Duplicate => return Ok(SubscribeOutcome::Attached),
        };

        match self.gateway.req_mkt_data(request_id, instrument).await {
            Ok(upstream) => {
                let pump = tokio::spawn(pump_ticks(Arc::clone(&self.subscriptions), request_id, generation, upstream));
                self.subscriptions.attach_pump(request_id, generation, pump);
                info!(request_id, %instrument, "Subscribed market data");
                Ok(SubscribeOutcome::Requested)
            }
            Err(e) => {
                error!(request_id, error = %e, "Error subscribing to market data");
                self.subscriptions.remove(request_id);
                Err(e)
            }
        }
    }

    async fn unsubscribe_market_data(&self, request_id: RequestId) -> Result<bool> {
        let _sequence = self.subscriptions.sequence().await;

        if !self.subscriptions.contains(request_id) {
            warn!(request_id, "No active subscription");
            return Ok(false);
        }
        if let Err(e) = self.gateway.cancel_mkt_data(request_id).await {
            error!(request_id, error = %e, "Error unsubscribing market data");
            return Err(e);
        }
        self.subscriptions.remove(request_id);
        info!(request_id, "Unsubscribed market data");
        Ok(true)
    }

    async fn fetch_historical_data(
        &self,
        instrument: &Instrument,
        request: &HistoricalRequest,
    ) -> Result<Vec<Bar>> {
        self.gateway
            .req_historical_data(instrument, request)
            .await
            .inspect_err(|e| error!(%instrument, error = %e, "Error fetching historical data"))
    }

    async fn fetch_account_info(&self) -> Result<AccountSummary> {
        self.gateway
            .req_account_summary()
            .await
            .inspect_err(|e| error!(error = %e, "Error fetching account info"))
    }

    async fn fetch_portfolio(&self) -> Result<Vec<Position>> {
        self.gateway
            .req_positions()
            .await
            .inspect_err(|e| error!(error = %e, "Error fetching portfolio"))
    }

    fn active_subscriptions(&self) -> Vec<RequestId> {
        self.subscriptions.request_ids()
    }

    fn option_chain(&self) -> &dyn OptionChainProvider {
        &self.chain
    }
}
