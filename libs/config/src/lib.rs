//! # DataLink Centralized Configuration
//!
//! This crate provides configuration loading and shared defaults for the
//! DataLink messaging core and its console front end.
//!
//! ## Features
//!
//! - **Link Settings**: endpoint, retry policy, socket buffer sizes, framing
//! - **Console Settings**: log level, prompt, startup auto-connect
//! - **Layered Loading**: optional TOML file, environment-specific overrides,
//!   then `DATALINK_` environment variables
//!
//! ## Usage
//!
//! ```rust,no_run
//! use datalink_config::load_config;
//!
//! let config = load_config(None).expect("configuration");
//! println!("connecting to {}", config.link.endpoint);
//! ```

pub mod defaults;
pub mod settings;

// Re-export commonly used types
pub use settings::{load_config, ConsoleSettings, DataLinkConfig, LinkSettings};
