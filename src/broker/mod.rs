pub mod error;
pub mod ib;
pub mod observer;
pub mod simulator;
pub mod subscriptions;
pub mod types;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use error::{BrokerError, Result};
pub use ib::IbBroker;
pub use observer::{FanOutReport, Observer, ObserverError, ObserverFailure};
pub use simulator::SimulatorBroker;
pub use subscriptions::{Registration, SubscriptionTable};
pub use types::*;

/// The closed set of brokers the workstation can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BrokerKind {
    InteractiveBrokers,
    Simulator,
}

impl BrokerKind {
    pub fn name(&self) -> &'static str {
        match self {
            BrokerKind::InteractiveBrokers => "Interactive Brokers",
            BrokerKind::Simulator => "Simulator",
        }
    }

    /// Unknown names fall back to the simulator.
    pub fn from_name(name: &str) -> Self {
        match name {
            "Interactive Brokers" => BrokerKind::InteractiveBrokers,
            _ => BrokerKind::Simulator,
        }
    }
}

impl From<String> for BrokerKind {
    fn from(name: String) -> Self {
        BrokerKind::from_name(&name)
    }
}

impl From<BrokerKind> for String {
    fn from(kind: BrokerKind) -> Self {
        kind.name().to_string()
    }
}

impl fmt::Display for BrokerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a subscribe call opened a new upstream stream or joined one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Requested,
    Attached,
}

/// Capability set shared by the live broker and the simulator.
#[async_trait]
pub trait Broker: Send + Sync {
    fn kind(&self) -> BrokerKind;

    async fn connect(&self) -> Result<()>;

    /// Idempotent; does nothing when not connected.
    async fn disconnect(&self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Attaches `observer` to `request_id`. Only the first observer of an id
    /// issues an upstream request; later ones share its stream.
    async fn subscribe_market_data(
        &self,
        instrument: &Instrument,
        observer: Observer,
        request_id: RequestId,
    ) -> Result<SubscribeOutcome>;

    /// Returns `Ok(false)` when `request_id` has no active subscription.
    async fn unsubscribe_market_data(&self, request_id: RequestId) -> Result<bool>;

    async fn fetch_historical_data(
        &self,
        instrument: &Instrument,
        request: &HistoricalRequest,
    ) -> Result<Vec<Bar>>;

    async fn fetch_account_info(&self) -> Result<AccountSummary>;

    async fn fetch_portfolio(&self) -> Result<Vec<Position>>;

    fn active_subscriptions(&self) -> Vec<RequestId>;

    fn option_chain(&self) -> &dyn OptionChainProvider;
}

/// Option metadata lookups for an underlying.
#[async_trait]
pub trait OptionChainProvider: Send + Sync {
    async fn fetch_available_expirations(&self, underlying: &Instrument) -> Result<Vec<String>>;

    async fn fetch_available_strikes(&self, underlying: &Instrument, expiration: &str) -> Result<Vec<f64>>;

    async fn fetch_option_chain(
        &self,
        underlying: &Instrument,
        expiration: &str,
        strike_min: Option<f64>,
        strike_max: Option<f64>,
        right: Option<OptionRight>,
    ) -> Result<Vec<ContractDetails>>;
}
