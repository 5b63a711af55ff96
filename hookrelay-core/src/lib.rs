pub mod backoff;
pub mod cleanup;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod memory_adapters;
pub mod payload;
pub mod signature;
pub mod state_machine;
pub mod types;

pub use cleanup::*;
pub use engine::*;
pub use filter::*;
pub use memory_adapters::*;
pub use state_machine::*;
pub use types::*;
