mod broker;
mod paths;
mod timing;

pub use broker::*;
pub use paths::*;
pub use timing::*;
