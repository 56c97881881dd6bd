//! # Utility Modules
//!
//! Supporting utilities shared across the crate.
//!
//! ## Components
//! - **Logging**: structured logging configuration via `tracing`

pub mod logging;
