use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::broker::error::Result;
use crate::broker::types::*;
use crate::broker::OptionChainProvider;

use super::gateway::Gateway;

/// Option metadata for an underlying, derived from contract detail queries
/// on option templates.
pub struct OptionChain {
    gateway: Arc<dyn Gateway>,
}

impl OptionChain {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }
}

/// Keeps contracts whose strike lies within the inclusive bounds.
pub fn filter_by_strike(
    details: Vec<ContractDetails>,
    strike_min: Option<f64>,
    strike_max: Option<f64>,
) -> Vec<ContractDetails> {
    if strike_min.is_none() && strike_max.is_none() {
        return details;
    }
    details
        .into_iter()
        .filter(|d| strike_min.map_or(true, |min| d.contract.strike >= min))
        .filter(|d| strike_max.map_or(true, |max| d.contract.strike <= max))
        .collect()
}

fn distinct_strikes(details: &[ContractDetails]) -> Vec<f64> {
    let mut strikes: Vec<f64> = details.iter().map(|d| d.contract.strike).collect();
    strikes.sort_by(|a, b| a.total_cmp(b));
    strikes.dedup();
    strikes
}

#[async_trait]
impl OptionChainProvider for OptionChain {
    async fn fetch_available_expirations(&self, underlying: &Instrument) -> Result<Vec<String>> {
        let template = Instrument::option_template(underlying, "", None);
        let details = self.gateway.req_contract_details(&template).await?;
        let expirations: BTreeSet<String> = details
            .into_iter()
            .map(|d| d.contract.last_trade_date_or_contract_month)
            .collect();
        debug!(symbol = %underlying.symbol, count = expirations.len(), "option expirations");
        Ok(expirations.into_iter().collect())
    }

    async fn fetch_available_strikes(&self, underlying: &Instrument, expiration: &str) -> Result<Vec<f64>> {
        let template = Instrument::option_template(underlying, expiration, None);
        let details = self.gateway.req_contract_details(&template).await?;
        Ok(distinct_strikes(&details))
    }

    async fn fetch_option_chain(
        &self,
        underlying: &Instrument,
        expiration: &str,
        strike_min: Option<f64>,
        strike_max: Option<f64>,
        right: Option<OptionRight>,
    ) -> Result<Vec<ContractDetails>> {
        let template = Instrument::option_template(underlying, expiration, right);
        let details = self.gateway.req_contract_details(&template).await?;
        Ok(filter_by_strike(details, strike_min, strike_max))
    }
}
