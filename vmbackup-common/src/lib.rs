//! # vmbackup Common
//!
//! Shared utilities for the vmbackup components.
//!
//! ## Logging
//!
//! ```rust,no_run
//! use vmbackup_common::init_logging;
//!
//! // stderr only
//! init_logging("info", None).unwrap();
//! ```

pub mod logging;

pub use logging::{init_logging, init_logging_json, DEFAULT_LOG_FILE};
