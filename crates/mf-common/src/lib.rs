//! ---
//! mfg_section: "01-core-functionality"
//! mfg_type: "source"
//! mfg_scope: "code"
//! mfg_description: "Shared primitives and utilities for the gateway runtime."
//! mfg_version: "v0.1.0-alpha"
//! mfg_owner: "tbd"
//! ---
//! Shared primitives for the microfactory gateway workspace: configuration
//! loading with environment overrides and the tracing bootstrap.

pub mod config;
pub mod logging;

pub use config::{ApiConfig, AppConfig, BusConfig, GatewayConfig, LoggingConfig};
pub use logging::{init_tracing, LogFormat};
