pub mod config;
pub mod error_handler;
pub mod ws_client;

pub use config::{BackendType, ConfigError, RuntimeConfig};
pub use error_handler::{ReconnectBackoff, RetriesExhausted};
pub use ws_client::{run_with_reconnect, ClientError, FeedHandler};
