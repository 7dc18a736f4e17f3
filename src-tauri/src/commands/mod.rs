mod config;
mod download;
pub mod registry;
mod speech;

// Re-export all commands for convenience
pub use config::*;
pub use download::*;
pub use speech::*;
