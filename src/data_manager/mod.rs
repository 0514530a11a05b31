//! Chooses which broker backs the workstation and swaps it on request.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broker::{self, Broker, BrokerKind, IbBroker, SimulatorBroker};
use crate::settings::SharedSettings;

/// Builds broker instances. Tests substitute their own to avoid sockets.
#[async_trait]
pub trait BrokerFactory: Send + Sync {
    async fn create(&self, kind: BrokerKind, settings: &SharedSettings) -> Arc<dyn Broker>;
}

pub struct DefaultBrokerFactory;

#[async_trait]
impl BrokerFactory for DefaultBrokerFactory {
    async fn create(&self, kind: BrokerKind, settings: &SharedSettings) -> Arc<dyn Broker> {
        match kind {
            BrokerKind::InteractiveBrokers => Arc::new(IbBroker::live(Arc::clone(settings))),
            BrokerKind::Simulator => {
                let simulator = settings.read().await.broker.simulator.clone();
                Arc::new(SimulatorBroker::new(simulator))
            }
        }
    }
}

/// Holds the active broker. The choice is written back into the settings
/// tree so it survives a restart.
pub struct DataManager {
    settings: SharedSettings,
    factory: Box<dyn BrokerFactory>,
    broker: Arc<dyn Broker>,
}

impl DataManager {
    /// Starts with the persisted broker choice, or the simulator when none
    /// was saved.
    pub async fn new(settings: SharedSettings, factory: Box<dyn BrokerFactory>) -> Self {
        let kind = settings
            .read()
            .await
            .broker
            .selected_broker
            .unwrap_or(BrokerKind::Simulator);
        let broker = factory.create(kind, &settings).await;
        settings.write().await.broker.selected_broker = Some(kind);
        info!(broker = %kind, "Broker selected");
        Self { settings, factory, broker }
    }

    pub fn broker(&self) -> Arc<dyn Broker> {
        Arc::clone(&self.broker)
    }

    pub fn kind(&self) -> BrokerKind {
        self.broker.kind()
    }

    /// Switches to the broker called `name`; unknown names select the
    /// simulator. Selecting the active kind again changes nothing and
    /// returns `false`.
    pub async fn set_broker(&mut self, name: &str) -> bool {
        let kind = BrokerKind::from_name(name);
        if kind == self.broker.kind() {
            debug!(broker = %kind, "Broker already selected");
            return false;
        }
        self.replace(kind).await;
        true
    }

    /// Rebuilds the active broker, e.g. after its settings changed.
    pub async fn reload_broker(&mut self) {
        self.replace(self.broker.kind()).await;
    }

    async fn replace(&mut self, kind: BrokerKind) {
        if let Err(e) = self.broker.disconnect().await {
            warn!(broker = %self.broker.kind(), error = %e, "Error disconnecting previous broker");
        }
        self.broker = self.factory.create(kind, &self.settings).await;
        self.settings.write().await.broker.selected_broker = Some(kind);
        info!(broker = %kind, "Broker selected");
    }

    /// Runs a connect attempt of the active broker on its own task.
    pub fn spawn_connect(&self) -> JoinHandle<broker::Result<()>> {
        let broker = self.broker();
        tokio::spawn(async move { broker.connect().await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{shared, Settings};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingFactory {
        created: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BrokerFactory for CountingFactory {
        async fn create(&self, kind: BrokerKind, settings: &SharedSettings) -> Arc<dyn Broker> {
            self.created.fetch_add(1, Ordering::SeqCst);
            match kind {
                BrokerKind::Simulator => {
                    let sim = SimulatorBroker::new(settings.read().await.broker.simulator.clone())
                        .with_timing(Duration::ZERO, Duration::from_millis(10));
                    Arc::new(sim)
                }
                BrokerKind::InteractiveBrokers => DefaultBrokerFactory.create(kind, settings).await,
            }
        }
    }

    async fn manager(settings: Settings) -> (SharedSettings, Arc<AtomicUsize>, DataManager) {
        let settings = shared(settings);
        let factory = CountingFactory::default();
        let created = Arc::clone(&factory.created);
        let manager = DataManager::new(Arc::clone(&settings), Box::new(factory)).await;
        (settings, created, manager)
    }

    #[tokio::test]
    async fn test_defaults_to_simulator_and_persists_choice() {
        let (settings, created, manager) = manager(Settings::default()).await;
        assert_eq!(manager.kind(), BrokerKind::Simulator);
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(settings.read().await.broker.selected_broker, Some(BrokerKind::Simulator));
    }

    #[tokio::test]
    async fn test_persisted_choice_is_used() {
        let mut initial = Settings::default();
        initial.broker.selected_broker = Some(BrokerKind::InteractiveBrokers);
        let (_settings, _created, manager) = manager(initial).await;
        assert_eq!(manager.kind(), BrokerKind::InteractiveBrokers);
        assert!(!manager.broker().is_connected());
    }

    #[tokio::test]
    async fn test_switch_broker_and_unknown_name() {
        let (settings, created, mut manager) = manager(Settings::default()).await;

        assert!(manager.set_broker("Interactive Brokers").await);
        assert_eq!(manager.kind(), BrokerKind::InteractiveBrokers);
        assert_eq!(settings.read().await.broker.selected_broker, Some(BrokerKind::InteractiveBrokers));

        assert!(manager.set_broker("Kraken").await);
        assert_eq!(manager.kind(), BrokerKind::Simulator);
        assert_eq!(settings.read().await.broker.selected_broker, Some(BrokerKind::Simulator));
        assert_eq!(created.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_reselecting_active_broker_is_a_no_op() {
        let (_settings, created, mut manager) = manager(Settings::default()).await;
        let before = manager.broker();

        assert!(!manager.set_broker("Simulator").await);
        assert!(Arc::ptr_eq(&before, &manager.broker()));
        assert_eq!(created.load(Ordering::SeqCst), 1);

        manager.reload_broker().await;
        assert!(!Arc::ptr_eq(&before, &manager.broker()));
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_switch_disconnects_previous_broker() {
        let (_settings, _created, mut manager) = manager(Settings::default()).await;
        manager.spawn_connect().await.unwrap().unwrap();
        let previous = manager.broker();
        assert!(previous.is_connected());

        manager.set_broker("Interactive Brokers").await;
        assert!(!previous.is_connected());
    }
}
