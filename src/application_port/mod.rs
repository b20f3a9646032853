mod auth_gateway;
mod session_service;

pub use auth_gateway::*;
pub use session_service::*;
