mod navigator;
mod session_notifier;
mod token_store;

pub use navigator::*;
pub use session_notifier::*;
pub use token_store::*;
