pub mod config;
pub mod error;
pub mod filter;
pub mod schema;
pub mod service;
pub mod store;

pub use config::{Config, ConfigError, default_base_dir, default_config_path};
pub use error::{Result, StoreError};
pub use service::{CapsuleService, Health, SearchResults};
pub use store::Store;
