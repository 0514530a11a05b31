/// Connect timeout for the TWS / IB Gateway API session
pub const IB_CONNECT_TIMEOUT_SECS: u64 = 4;

/// Upper bound for one-shot upstream queries (history, account, positions, contract details)
pub const IB_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Account summary tags requested by `fetch_account_info`
pub const ACCOUNT_SUMMARY_TAGS: &str =
    "AccountType,NetLiquidation,TotalCashValue,BuyingPower,AvailableFunds,GrossPositionValue";

pub const SIMULATOR_ACCOUNT_ID: &str = "SIM123";
pub const SIMULATOR_BASE_PRICE: f64 = 100.0;
