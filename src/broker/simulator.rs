use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::{
    SIMULATOR_ACCOUNT_ID, SIMULATOR_BASE_PRICE, SIMULATOR_LATENCY_MS, SIMULATOR_TICK_INTERVAL_MS,
};
use crate::settings::SimulatorSettings;

use super::error::Result;
use super::subscriptions::{log_fan_out_failures, Registration, SubscriptionTable};
use super::types::*;
use super::{Broker, BrokerKind, Observer, OptionChainProvider, SubscribeOutcome};

/// Offline broker returning canned data and synthetic ticks. Connecting
/// always succeeds after a short delay.
pub struct SimulatorBroker {
    settings: SimulatorSettings,
    connected: AtomicBool,
    subscriptions: Arc<SubscriptionTable>,
    latency: Duration,
    tick_interval: Duration,
}

impl SimulatorBroker {
    pub fn new(settings: SimulatorSettings) -> Self {
        Self {
            settings,
            connected: AtomicBool::new(false),
            subscriptions: Arc::new(SubscriptionTable::new()),
            latency: Duration::from_millis(SIMULATOR_LATENCY_MS),
            tick_interval: Duration::from_millis(SIMULATOR_TICK_INTERVAL_MS),
        }
    }

    pub fn with_timing(mut self, latency: Duration, tick_interval: Duration) -> Self {
        self.latency = latency;
        self.tick_interval = tick_interval;
        self
    }

    pub fn subscriptions(&self) -> &SubscriptionTable {
        &self.subscriptions
    }

    async fn simulate_latency(&self) {
        tokio::time::sleep(self.latency).await;
    }
}

impl Drop for SimulatorBroker {
    fn drop(&mut self) {
        self.subscriptions.clear();
    }
}

/// Emits one price and one size update per interval for as long as the
/// subscription created with `generation` is still in the table. Removal is
/// noticed at the next interval boundary.
async fn generate_ticks(
    table: Arc<SubscriptionTable>,
    request_id: RequestId,
    generation: u64,
    interval: Duration,
) {
    let mut price = SIMULATOR_BASE_PRICE;
    while table.is_current(request_id, generation) {
        price = {
            let mut rng = rand::thread_rng();
            (price + rng.gen_range(-0.05..=0.05)).max(0.01)
        };
        let updates = [
            TickKind::Price { field: TickType::Last, price },
            TickKind::Size { field: TickType::Volume, size: 10.0 },
        ];
        for kind in updates {
            let tick = Tick::new(request_id, kind);
            if let Some(report) = table.dispatch(request_id, &tick) {
                log_fan_out_failures(&report);
            }
        }
        tokio::time::sleep(interval).await;
    }
    debug!(request_id, "simulator tick generator stopped");
}

#[async_trait]
impl Broker for SimulatorBroker {
    fn kind(&self) -> BrokerKind {
        BrokerKind::Simulator
    }

    async fn connect(&self) -> Result<()> {
        self.simulate_latency().await;
        self.connected.store(true, Ordering::SeqCst);
        info!(read_only = self.settings.read_only, "Simulator connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.simulate_latency().await;
        self.connected.store(false, Ordering::SeqCst);
        info!("Simulator disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn subscribe_market_data(
        &self,
        instrument: &Instrument,
        observer: Observer,
        request_id: RequestId,
    ) -> Result<SubscribeOutcome> {
        match self.subscriptions.register(request_id, instrument, observer) {
            Registration::Created { generation } => {
                tokio::spawn(generate_ticks(
                    Arc::clone(&self.subscriptions),
                    request_id,
                    generation,
                    self.tick_interval,
                ));
                info!(request_id, %instrument, "Simulator subscribed market data");
                Ok(SubscribeOutcome::Requested)
            }
            Registration::Attached | Registration::Duplicate => Ok(SubscribeOutcome::Attached),
        }
    }

    async fn unsubscribe_market_data(&self, request_id: RequestId) -> Result<bool> {
        // The generator notices the removal on its next interval.
        if self.subscriptions.remove(request_id) {
            info!(request_id, "Simulator unsubscribed market data");
            Ok(true)
        } else {
            warn!(request_id, "No active subscription in simulator");
            Ok(false)
        }
    }

    async fn fetch_historical_data(
        &self,
        _instrument: &Instrument,
        request: &HistoricalRequest,
    ) -> Result<Vec<Bar>> {
        self.simulate_latency().await;
        Ok(vec![Bar {
            date: request.end.format("%Y%m%d").to_string(),
            open: 100.0,
            high: 105.0,
            low: 95.0,
            close: 102.0,
            volume: 0.0,
            wap: 0.0,
            count: 0,
        }])
    }

    async fn fetch_account_info(&self) -> Result<AccountSummary> {
        self.simulate_latency().await;
        Ok(AccountSummary {
            account: SIMULATOR_ACCOUNT_ID.to_string(),
            values: vec![AccountValue {
                tag: "TotalCashValue".to_string(),
                value: "10000".to_string(),
                currency: "USD".to_string(),
            }],
        })
    }

    async fn fetch_portfolio(&self) -> Result<Vec<Position>> {
        self.simulate_latency().await;
        Ok(vec![Position {
            account: SIMULATOR_ACCOUNT_ID.to_string(),
            instrument: Instrument::stock("SIM_STOCK", "SMART", "USD"),
            quantity: 50.0,
            avg_cost: 100.0,
        }])
    }

    fn active_subscriptions(&self) -> Vec<RequestId> {
        self.subscriptions.request_ids()
    }

    fn option_chain(&self) -> &dyn OptionChainProvider {
        self
    }
}

#[async_trait]
impl OptionChainProvider for SimulatorBroker {
    async fn fetch_available_expirations(&self, _underlying: &Instrument) -> Result<Vec<String>> {
        self.simulate_latency().await;
        Ok(vec!["20250117".to_string(), "20250221".to_string()])
    }

    async fn fetch_available_strikes(&self, _underlying: &Instrument, _expiration: &str) -> Result<Vec<f64>> {
        self.simulate_latency().await;
        Ok(vec![90.0, 95.0, 100.0, 105.0, 110.0])
    }

    async fn fetch_option_chain(
        &self,
        underlying: &Instrument,
        expiration: &str,
        _strike_min: Option<f64>,
        _strike_max: Option<f64>,
        _right: Option<OptionRight>,
    ) -> Result<Vec<ContractDetails>> {
        self.simulate_latency().await;
        let mut contract = Instrument::option_template(underlying, expiration, Some(OptionRight::Call));
        contract.strike = 100.0;
        Ok(vec![ContractDetails {
            contract,
            market_name: underlying.symbol.clone(),
            min_tick: 0.01,
        }])
    }
}
