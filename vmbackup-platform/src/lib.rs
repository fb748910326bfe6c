//! # vmbackup Platform
//!
//! Typed facade over the virtualization management API.
//!
//! The engine only talks to the [`Platform`] trait. Two implementations ship
//! with the crate:
//! - **OvirtClient** - oVirt/RHV REST API v4 over HTTPS
//! - **MockPlatform** - in-memory platform with scripted state transitions
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             Platform Trait              │
//! │  (find_vm, add_snapshot, create_vm...)  │
//! └─────────────────────┬───────────────────┘
//!                       │
//!         ┌─────────────┴─────────────┐
//!         ▼                           ▼
//! ┌───────────────────┐     ┌───────────────────┐
//! │    OvirtClient    │     │   MockPlatform    │
//! │    (REST, v4)     │     │    (in-memory)    │
//! └───────────────────┘     └───────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vmbackup_platform::{MockPlatform, Platform, VmPowerState};
//!
//! #[tokio::main]
//! async fn main() {
//!     let platform = MockPlatform::new();
//!     platform.add_vm("web01", VmPowerState::Up);
//!
//!     let vm = platform.get_vm("web01").await.unwrap();
//!     platform.add_snapshot(&vm.id, "web01-202401010000").await.unwrap();
//! }
//! ```

pub mod error;
pub mod traits;
pub mod types;
pub mod mock;
pub mod ovirt;

pub use error::PlatformError;
pub use traits::Platform;
pub use types::*;
pub use mock::{MockOperation, MockPlatform};
pub use ovirt::{OvirtClient, OvirtConfig};
