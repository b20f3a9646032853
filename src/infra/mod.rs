mod file_session_store;
mod login_navigator;
mod memory_session_store;

pub use file_session_store::*;
pub use login_navigator::*;
pub use memory_session_store::*;
