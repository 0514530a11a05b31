use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::broker::{AccountSummary, Bar, ContractDetails, OptionRight, Position, RequestId, SubscribeOutcome};
use crate::logger::LogEntry;

/// Workstation commands sent by the front end (Command Pattern)
#[derive(Debug, Clone, PartialEq)]
pub enum WorkstationCommand {
    /// Connect the active broker
    Connect,
    /// Disconnect the active broker
    Disconnect,
    /// Select a broker by display name
    SelectBroker(String),
    /// Rebuild the active broker from current settings
    ReloadBroker,
    /// Start streaming market data for a stock symbol
    Subscribe { request_id: RequestId, symbol: String },
    /// Stop a market data subscription
    Unsubscribe(RequestId),
    /// Daily bars for the last 50 days
    History { symbol: String },
    /// Account summary
    Account,
    /// Open positions
    Portfolio,
    /// Option expirations of an underlying
    Expirations { symbol: String },
    /// Option strikes of an underlying for one expiration
    Strikes { symbol: String, expiration: String },
    /// Option contracts of an underlying for one expiration
    Chain {
        symbol: String,
        expiration: String,
        right: Option<OptionRight>,
    },
    /// Recent log entries
    Logs,
    /// List the theme catalog
    Themes,
    /// Activate a theme and re-render the stylesheet
    SetTheme(String),
    /// Switch between production and edit mode
    SetMode(AppState),
    /// Persist the workspace and settings now
    Save,
    /// Leave the run loop
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseCommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("'{command}' needs {argument}")]
    MissingArgument { command: &'static str, argument: &'static str },
    #[error("'{0}' is not a valid number")]
    InvalidNumber(String),
}

fn arg<'a>(
    parts: &mut impl Iterator<Item = &'a str>,
    command: &'static str,
    argument: &'static str,
) -> Result<&'a str, ParseCommandError> {
    parts
        .next()
        .ok_or(ParseCommandError::MissingArgument { command, argument })
}

fn request_id(raw: &str) -> Result<RequestId, ParseCommandError> {
    raw.parse()
        .map_err(|_| ParseCommandError::InvalidNumber(raw.to_string()))
}

impl FromStr for WorkstationCommand {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let verb = parts.next().ok_or(ParseCommandError::Empty)?;
        let command = match verb.to_ascii_lowercase().as_str() {
            "connect" => WorkstationCommand::Connect,
            "disconnect" => WorkstationCommand::Disconnect,
            "broker" => {
                let name: Vec<&str> = parts.by_ref().collect();
                if name.is_empty() {
                    return Err(ParseCommandError::MissingArgument { command: "broker", argument: "a broker name" });
                }
                WorkstationCommand::SelectBroker(name.join(" "))
            }
            "reload" => WorkstationCommand::ReloadBroker,
            "sub" | "subscribe" => WorkstationCommand::Subscribe {
                request_id: request_id(arg(&mut parts, "sub", "a request id")?)?,
                symbol: arg(&mut parts, "sub", "a symbol")?.to_uppercase(),
            },
            "unsub" | "unsubscribe" => {
                WorkstationCommand::Unsubscribe(request_id(arg(&mut parts, "unsub", "a request id")?)?)
            }
            "history" => WorkstationCommand::History {
                symbol: arg(&mut parts, "history", "a symbol")?.to_uppercase(),
            },
            "account" => WorkstationCommand::Account,
            "portfolio" => WorkstationCommand::Portfolio,
            "expirations" => WorkstationCommand::Expirations {
                symbol: arg(&mut parts, "expirations", "a symbol")?.to_uppercase(),
            },
            "strikes" => WorkstationCommand::Strikes {
                symbol: arg(&mut parts, "strikes", "a symbol")?.to_uppercase(),
                expiration: arg(&mut parts, "strikes", "an expiration")?.to_string(),
            },
            "chain" => WorkstationCommand::Chain {
                symbol: arg(&mut parts, "chain", "a symbol")?.to_uppercase(),
                expiration: arg(&mut parts, "chain", "an expiration")?.to_string(),
                right: parts
                    .next()
                    .and_then(|r| OptionRight::from_code(&r.to_ascii_uppercase())),
            },
            "logs" => WorkstationCommand::Logs,
            "themes" => WorkstationCommand::Themes,
            "theme" => {
                let name: Vec<&str> = parts.by_ref().collect();
                if name.is_empty() {
                    return Err(ParseCommandError::MissingArgument { command: "theme", argument: "a theme name" });
                }
                WorkstationCommand::SetTheme(name.join(" "))
            }
            "edit" => WorkstationCommand::SetMode(AppState::Edit),
            "production" => WorkstationCommand::SetMode(AppState::Production),
            "save" => WorkstationCommand::Save,
            "quit" | "exit" | "shutdown" => WorkstationCommand::Shutdown,
            other => return Err(ParseCommandError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

/// Responses sent back to the front end
#[derive(Debug, Clone)]
pub enum ControlResponse {
    /// Broker selection handled; `changed` is false when it was already active
    BrokerSelected { name: String, changed: bool },
    Connected,
    Disconnected,
    Subscribed { request_id: RequestId, outcome: SubscribeOutcome },
    /// `existed` is false when there was nothing to cancel
    Unsubscribed { request_id: RequestId, existed: bool },
    History(Vec<Bar>),
    Account(AccountSummary),
    Portfolio(Vec<Position>),
    Expirations(Vec<String>),
    Strikes(Vec<f64>),
    Chain(Vec<ContractDetails>),
    Logs(Vec<LogEntry>),
    Themes { names: Vec<String>, active: Option<String> },
    ThemeApplied { name: String, rendered: bool },
    ModeChanged(AppState),
    Saved,
    /// Error occurred
    Error(String),
    ShuttingDown,
}

/// Application lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Startup,
    Production,
    Edit,
    Closing,
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppState::Startup => write!(f, "Startup"),
            AppState::Production => write!(f, "Production"),
            AppState::Edit => write!(f, "Edit"),
            AppState::Closing => write!(f, "Closing"),
        }
    }
}
