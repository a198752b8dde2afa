//! Per-project build log

use tokio::fs;
use tokio::io::{self, AsyncWriteExt};
use tracing::debug;

use crate::errors::DeployError;
use crate::filesys::file::File;

/// Append-only build output sink.
///
/// Every chunk goes byte-for-byte to the project's `log.txt` (flushed per
/// write so pollers see progress) and, when mirroring is on, to this
/// process's stdout.
pub struct BuildLog {
    file: fs::File,
    stdout: Option<io::Stdout>,
}

impl BuildLog {
    /// Truncate `file` and open it for appending
    pub async fn create(file: &File, mirror_stdout: bool) -> Result<Self, DeployError> {
        file.truncate().await?;
        Self::append_to(file, mirror_stdout).await
    }

    /// Open `file` for appending without truncating it
    pub async fn append_to(file: &File, mirror_stdout: bool) -> Result<Self, DeployError> {
        let handle = file.open_append().await?;
        Ok(Self {
            file: handle,
            stdout: mirror_stdout.then(io::stdout),
        })
    }

    /// Write raw build output
    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), DeployError> {
        self.file.write_all(bytes).await?;
        self.file.flush().await?;

        if let Some(stdout) = self.stdout.as_mut() {
            // The file is the record; a closed stdout must not fail the build.
            if let Err(e) = stdout.write_all(bytes).await {
                debug!("Failed to mirror build output to stdout: {}", e);
            } else {
                let _ = stdout.flush().await;
            }
        }
        Ok(())
    }

    /// Write a single newline-terminated line
    pub async fn line(&mut self, message: &str) -> Result<(), DeployError> {
        let mut text = String::with_capacity(message.len() + 1);
        text.push_str(message);
        text.push('\n');
        self.write(text.as_bytes()).await
    }
}
