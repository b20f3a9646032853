//! The `settings` module is a simple utility that requires manual
//! verification; `bin/cross_tab_demo.rs` exercises the surrounding wiring.

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;
