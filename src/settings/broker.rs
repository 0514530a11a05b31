use serde::{Deserialize, Serialize};

use crate::broker::BrokerKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IbSettings {
    pub ip: String,
    pub port: u16,
    #[serde(rename = "clientId")]
    pub client_id: i32,
    pub read_only: bool,
    pub connect_at_startup: bool,
}

impl Default for IbSettings {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".to_string(),
            port: 7496,
            client_id: 1,
            read_only: true,
            connect_at_startup: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorSettings {
    pub read_only: bool,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self { read_only: true }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    /// Written as the broker's display name; `null` until one is chosen
    pub selected_broker: Option<BrokerKind>,
    pub ib: IbSettings,
    pub simulator: SimulatorSettings,
}
