//! External archive retrieval.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, instrument, warn};

use crate::error::{BackupError, Result};

/// Retrieves an archived directory tree into the local filesystem.
#[async_trait]
pub trait ArchiveTool: Send + Sync {
    /// Retrieve `path` (and everything below it) to the same location on
    /// local disk.
    async fn retrieve(&self, path: &Path) -> Result<()>;
}

/// Archive client run as a subprocess: `<program> <args...> retrieve <path>/ -subdir=yes`.
#[derive(Debug, Clone)]
pub struct CommandArchive {
    program: String,
    args: Vec<String>,
}

impl Default for CommandArchive {
    fn default() -> Self {
        Self::new("sudo", vec!["dsmc".to_string()])
    }
}

impl CommandArchive {
    /// Create an archive client from a program and its leading arguments.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args }
    }

    /// Full argument list for retrieving `path`.
    pub fn retrieve_args(&self, path: &Path) -> Vec<String> {
        let mut target = path.to_string_lossy().into_owned();
        if !target.ends_with('/') {
            target.push('/');
        }
        let mut args = self.args.clone();
        args.extend(["retrieve".to_string(), target, "-subdir=yes".to_string()]);
        args
    }

    fn tool_name(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl ArchiveTool for CommandArchive {
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn retrieve(&self, path: &Path) -> Result<()> {
        let args = self.retrieve_args(path);
        info!(program = %self.program, args = ?args, "Retrieving from archive");

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .map_err(|e| BackupError::io(PathBuf::from(&self.program), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(code = ?output.status.code(), error = %stderr, "Archive retrieval failed");
            return Err(BackupError::Subprocess {
                tool: self.tool_name(),
                code: output.status.code(),
                stderr,
            });
        }

        info!("Archive retrieval complete");
        Ok(())
    }
}
