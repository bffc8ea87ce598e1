mod agent_api;
mod order_flow_api;
mod rescan_api;

pub use agent_api::AgentApi;
pub use order_flow_api::OrderFlowApi;
pub use rescan_api::{RescanApi, RescanError};
