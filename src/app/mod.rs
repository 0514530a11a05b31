//! Application lifecycle: startup, the cooperative run loop, shutdown.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use crossbeam_channel::Sender;
use tracing::{error, info, warn};

use crate::broker::{self, HistoricalRequest, Instrument, Observer, Tick};
use crate::config::{self, COMMAND_POLL_INTERVAL_MS, IB_CONNECT_TIMEOUT_SECS};
use crate::controller::{AppState, ControlResponse, WorkstationCommand, WorkstationController};
use crate::data_manager::{BrokerFactory, DataManager, DefaultBrokerFactory};
use crate::logger::{self, LogBuffer};
use crate::settings::{SettingsStore, SharedSettings};
use crate::theme::ThemeManager;
use crate::workspace::{ConnectorPanel, Workspace};

/// Files the application reads and writes.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub settings_file: PathBuf,
    pub themes_file: PathBuf,
    pub theme_template: PathBuf,
    pub stylesheet_out: PathBuf,
}

impl AppPaths {
    pub fn from_env() -> Self {
        Self {
            settings_file: config::settings_file_path(),
            themes_file: config::themes_file_path(),
            theme_template: config::theme_template_path(),
            stylesheet_out: config::stylesheet_output_path(),
        }
    }
}

pub struct Application {
    paths: AppPaths,
    store: SettingsStore,
    settings: SharedSettings,
    logs: LogBuffer,
    themes: Option<ThemeManager>,
    data: DataManager,
    workspace: Workspace,
    controller: WorkstationController,
    /// Shared by every console subscription
    console: Observer,
}

impl Application {
    pub async fn startup(paths: AppPaths, controller: WorkstationController, ticks: Sender<Tick>) -> Result<Self> {
        Self::startup_with(paths, controller, ticks, Box::new(DefaultBrokerFactory)).await
    }

    pub async fn startup_with(
        paths: AppPaths,
        controller: WorkstationController,
        ticks: Sender<Tick>,
        factory: Box<dyn BrokerFactory>,
    ) -> Result<Self> {
        controller.set_state(AppState::Startup);

        let store = SettingsStore::open(&paths.settings_file)
            .with_context(|| format!("loading settings from {}", paths.settings_file.display()))?;
        let settings = store.settings();

        let logger_settings = settings.read().await.logger.clone();
        let logs = match logger::init_logging(&logger_settings) {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!(error = %e, "Logging already initialised, keeping a detached log buffer");
                LogBuffer::new(&logger_settings)
            }
        };
        info!(path = %paths.settings_file.display(), "Settings loaded");

        let themes = match ThemeManager::new(&paths.themes_file, &paths.theme_template) {
            Ok(themes) => {
                themes.set_stylesheet(&paths.stylesheet_out).await;
                Some(themes)
            }
            Err(e) => {
                error!(error = %e, "Error loading themes");
                None
            }
        };

        let data = DataManager::new(settings.clone(), factory).await;
        controller.set_state(AppState::Production);

        if settings.read().await.broker.ib.connect_at_startup {
            data.spawn_connect();
        }

        let mut workspace = Workspace::default();
        workspace.restore(&settings.read().await.workspace);
        if let Some(window) = workspace.windows_mut().first_mut() {
            window.panels.push(Box::new(ConnectorPanel::default()));
        }

        info!(broker = %data.kind(), windows = workspace.windows().len(), "Workstation started");
        Ok(Self {
            paths,
            store,
            settings,
            logs,
            themes,
            data,
            workspace,
            controller,
            console: Observer::from_channel(ticks),
        })
    }

    pub fn state(&self) -> AppState {
        self.controller.state()
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn data(&self) -> &DataManager {
        &self.data
    }

    /// Polls the controller until a shutdown command or Ctrl-C, then shuts
    /// down.
    pub async fn run(&mut self) -> Result<()> {
        let mut poll = tokio::time::interval(Duration::from_millis(COMMAND_POLL_INTERVAL_MS));
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        'run: loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Interrupt received");
                    break 'run;
                }
                _ = poll.tick() => {
                    while let Some(command) = self.controller.poll() {
                        if !self.execute(command).await {
                            break 'run;
                        }
                    }
                }
            }
        }
        self.shutdown().await
    }

    /// Runs one command and answers it. Returns `false` when the loop should
    /// stop.
    pub async fn execute(&mut self, command: WorkstationCommand) -> bool {
        let response = match command {
            WorkstationCommand::Shutdown => {
                self.controller.respond(ControlResponse::ShuttingDown);
                return false;
            }
            WorkstationCommand::SelectBroker(name) => {
                let changed = self.data.set_broker(&name).await;
                Ok(ControlResponse::BrokerSelected { name: self.data.kind().to_string(), changed })
            }
            WorkstationCommand::ReloadBroker => {
                self.data.reload_broker().await;
                Ok(ControlResponse::BrokerSelected { name: self.data.kind().to_string(), changed: true })
            }
            WorkstationCommand::Logs => Ok(ControlResponse::Logs(self.logs.entries())),
            WorkstationCommand::Themes => Ok(self.list_themes()),
            WorkstationCommand::SetTheme(name) => self.activate_theme(&name).await,
            WorkstationCommand::SetMode(state) => self.set_mode(state),
            WorkstationCommand::Save => self.persist().await.map(|()| ControlResponse::Saved),
            command => self.broker_command(command).await.map_err(anyhow::Error::from),
        };
        match response {
            Ok(response) => self.controller.respond(response),
            Err(e) => {
                error!(error = %e, "Command failed");
                self.controller.respond(ControlResponse::Error(format!("{e:#}")));
            }
        }
        true
    }

    async fn broker_command(&self, command: WorkstationCommand) -> broker::Result<ControlResponse> {
        let broker = self.data.broker();
        let response = match command {
            WorkstationCommand::Connect => {
                broker.connect().await?;
                ControlResponse::Connected
            }
            WorkstationCommand::Disconnect => {
                broker.disconnect().await?;
                ControlResponse::Disconnected
            }
            WorkstationCommand::Subscribe { request_id, symbol } => {
                let instrument = Instrument::stock(&symbol, "SMART", "USD");
                let outcome = broker
                    .subscribe_market_data(&instrument, self.console.clone(), request_id)
                    .await?;
                ControlResponse::Subscribed { request_id, outcome }
            }
            WorkstationCommand::Unsubscribe(request_id) => {
                let existed = broker.unsubscribe_market_data(request_id).await?;
                ControlResponse::Unsubscribed { request_id, existed }
            }
            WorkstationCommand::History { symbol } => {
                let instrument = Instrument::stock(&symbol, "SMART", "USD");
                let request = HistoricalRequest::new(Utc::now().naive_utc(), "50 D", "1 day");
                ControlResponse::History(broker.fetch_historical_data(&instrument, &request).await?)
            }
            WorkstationCommand::Account => ControlResponse::Account(broker.fetch_account_info().await?),
            WorkstationCommand::Portfolio => ControlResponse::Portfolio(broker.fetch_portfolio().await?),
            WorkstationCommand::Expirations { symbol } => {
                let underlying = Instrument::stock(&symbol, "SMART", "USD");
                ControlResponse::Expirations(broker.option_chain().fetch_available_expirations(&underlying).await?)
            }
            WorkstationCommand::Strikes { symbol, expiration } => {
                let underlying = Instrument::stock(&symbol, "SMART", "USD");
                let strikes = broker
                    .option_chain()
                    .fetch_available_strikes(&underlying, &expiration)
                    .await?;
                ControlResponse::Strikes(strikes)
            }
            WorkstationCommand::Chain { symbol, expiration, right } => {
                let underlying = Instrument::stock(&symbol, "SMART", "USD");
                let chain = broker
                    .option_chain()
                    .fetch_option_chain(&underlying, &expiration, None, None, right)
                    .await?;
                ControlResponse::Chain(chain)
            }
            other => ControlResponse::Error(format!("{other:?} is not a broker command")),
        };
        Ok(response)
    }

    fn list_themes(&self) -> ControlResponse {
        match &self.themes {
            Some(themes) => ControlResponse::Themes {
                names: themes.catalog().themes.iter().map(|t| t.name.clone()).collect(),
                active: themes.active_theme().map(str::to_string),
            },
            None => ControlResponse::Themes { names: Vec::new(), active: None },
        }
    }

    async fn activate_theme(&mut self, name: &str) -> Result<ControlResponse> {
        let themes = self.themes.as_mut().context("theme catalog is not available")?;
        themes.set_active_theme(name)?;
        let rendered = themes.set_stylesheet(&self.paths.stylesheet_out).await;
        Ok(ControlResponse::ThemeApplied { name: name.to_string(), rendered })
    }

    fn set_mode(&self, state: AppState) -> Result<ControlResponse> {
        match state {
            AppState::Production | AppState::Edit => {
                self.controller.set_state(state);
                info!(mode = %state, "Mode changed");
                Ok(ControlResponse::ModeChanged(state))
            }
            other => anyhow::bail!("cannot switch to {other} mode"),
        }
    }

    /// Writes the live workspace into the settings tree and saves the file.
    async fn persist(&self) -> Result<()> {
        let tree = self.workspace.save();
        self.settings.write().await.workspace = tree;
        self.store
            .save()
            .await
            .with_context(|| format!("saving settings to {}", self.store.path().display()))
    }

    /// Disconnects best-effort, then persists workspace and settings.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.controller.set_state(AppState::Closing);
        let broker = self.data.broker();
        match tokio::time::timeout(Duration::from_secs(IB_CONNECT_TIMEOUT_SECS), broker.disconnect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Error during disconnect"),
            Err(_) => error!("Disconnect timed out"),
        }
        self.persist().await?;
        self.controller.stop();
        info!("Workstation stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{BrokerKind, SimulatorBroker, SubscribeOutcome};
    use crate::controller::{control_channel, ControlHandle};
    use crate::settings::Settings;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct FastSimulator;

    #[async_trait]
    impl BrokerFactory for FastSimulator {
        async fn create(&self, _kind: BrokerKind, settings: &SharedSettings) -> Arc<dyn broker::Broker> {
            let sim = SimulatorBroker::new(settings.read().await.broker.simulator.clone())
                .with_timing(Duration::ZERO, Duration::from_millis(5));
            Arc::new(sim)
        }
    }

    fn paths(dir: &tempfile::TempDir) -> AppPaths {
        AppPaths {
            settings_file: dir.path().join("settings.json"),
            themes_file: dir.path().join("themes.json"),
            theme_template: dir.path().join("template.qss"),
            stylesheet_out: dir.path().join("active.qss"),
        }
    }

    async fn start(dir: &tempfile::TempDir) -> (Application, ControlHandle, crossbeam_channel::Receiver<Tick>) {
        let (controller, handle) = control_channel();
        let (tick_tx, tick_rx) = crossbeam_channel::unbounded();
        let app = Application::startup_with(paths(dir), controller, tick_tx, Box::new(FastSimulator))
            .await
            .unwrap();
        (app, handle, tick_rx)
    }

    fn next_response(handle: &ControlHandle) -> ControlResponse {
        handle.responses().try_recv().unwrap()
    }

    #[tokio::test]
    async fn test_startup_reaches_production_with_default_window() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _handle, _ticks) = start(&dir).await;
        assert_eq!(app.state(), AppState::Production);
        assert_eq!(app.data().kind(), BrokerKind::Simulator);
        assert_eq!(app.workspace().windows().len(), 1);
        assert!(!dir.path().join("active.qss").exists());
    }

    #[tokio::test]
    async fn test_commands_round_trip_through_controller() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, handle, ticks) = start(&dir).await;

        assert!(app.execute(WorkstationCommand::Connect).await);
        assert!(matches!(next_response(&handle), ControlResponse::Connected));

        app.execute(WorkstationCommand::Subscribe { request_id: 4, symbol: "AAPL".into() }).await;
        assert!(matches!(
            next_response(&handle),
            ControlResponse::Subscribed { request_id: 4, outcome: SubscribeOutcome::Requested }
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(ticks.try_recv().unwrap().request_id, 4);

        app.execute(WorkstationCommand::Account).await;
        let ControlResponse::Account(summary) = next_response(&handle) else { panic!("expected account") };
        assert_eq!(summary.account, "SIM123");

        app.execute(WorkstationCommand::Unsubscribe(4)).await;
        assert!(matches!(next_response(&handle), ControlResponse::Unsubscribed { existed: true, .. }));

        app.execute(WorkstationCommand::SetMode(AppState::Closing)).await;
        assert!(matches!(next_response(&handle), ControlResponse::Error(_)));

        assert!(!app.execute(WorkstationCommand::Shutdown).await);
        assert!(matches!(next_response(&handle), ControlResponse::ShuttingDown));
    }

    #[tokio::test]
    async fn test_shutdown_persists_selection_and_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _handle, _ticks) = start(&dir).await;
        app.execute(WorkstationCommand::SelectBroker("Kraken".into())).await;
        app.shutdown().await.unwrap();
        assert_eq!(app.state(), AppState::Closing);

        let raw = std::fs::read_to_string(dir.path().join("settings.json")).unwrap();
        let saved: Settings = serde_json::from_str(&raw).unwrap();
        assert_eq!(saved.broker.selected_broker, Some(BrokerKind::Simulator));
        assert_eq!(saved.workspace.len(), 1);
        let window = saved.workspace.values().next().unwrap();
        assert!(window.widgets.is_empty());
    }
}
