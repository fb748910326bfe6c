//! # vmbackup Engine
//!
//! Backup and restore orchestration for oVirt/RHV virtual machines.
//!
//! ## Backup
//!
//! ```text
//! create snapshot ──▶ wait ok ──▶ write OVF ──▶ clone from snapshot ──▶ wait down
//!                                                        │
//!                     delete snapshot ◀── wait down ◀── export clone
//! ```
//!
//! Every remote step that completes asynchronously is awaited with
//! [`poll::poll_until`], which is bounded by a [`PollPolicy`] and cancellable
//! through a `CancellationToken`. Nothing is retried.
//!
//! ## Restore
//!
//! The archive tool retrieves an exported tree, whose OVF names the image
//! directories to move into the export domain. See [`restore`].

pub mod archive;
pub mod backup;
pub mod error;
pub mod export;
pub mod ovf;
pub mod poll;
pub mod restore;
pub mod snapshot;

pub use archive::{ArchiveTool, CommandArchive};
pub use backup::{BackupOptions, BackupReport, BackupWorkflow};
pub use error::{BackupError, RelocationTarget, Result};
pub use export::{ExportOrchestrator, OvfArtifacts};
pub use ovf::{DiskReference, OvfDescriptor};
pub use poll::{PollPolicy, PollStats};
pub use restore::{restore_from_directory, RestorePipeline, RestoreReport};
pub use snapshot::SnapshotManager;
