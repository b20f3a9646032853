mod auth_gateway_fake;
mod navigator_fake;
mod refresh_coordinator;
mod refresh_schedule;
mod session_manager_impl;

pub use auth_gateway_fake::*;
pub use navigator_fake::*;
pub use refresh_coordinator::*;
pub use refresh_schedule::*;
pub use session_manager_impl::*;
