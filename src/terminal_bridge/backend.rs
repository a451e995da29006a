use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, warn};
use tokio::io::AsyncWriteExt;

use crate::container_runtime::types::AttachedIo;
use crate::error_handling::types::ContainerError;

/// Read/write contract shared by the live container stream and the
/// simulated shell, so the bridge pump loop is backend-agnostic.
#[async_trait]
pub trait TerminalBackend: Send {
    /// Next chunk of terminal output. `None` means the backend is
    /// exhausted (stream EOF or unrecoverable error) and the bridge
    /// should degrade or hang up.
    async fn read_output(&mut self) -> Option<Vec<u8>>;

    /// Feeds client keystrokes to the terminal.
    async fn write_input(&mut self, bytes: &[u8]) -> Result<(), ContainerError>;
}

/// Backend forwarding bytes verbatim to and from an attached container
/// TTY.
pub struct LiveContainerStream {
    io: AttachedIo,
}

impl LiveContainerStream {
    pub fn new(io: AttachedIo) -> Self {
        LiveContainerStream { io }
    }
}

#[async_trait]
impl TerminalBackend for LiveContainerStream {
    async fn read_output(&mut self) -> Option<Vec<u8>> {
        match self.io.output.next().await {
            Some(Ok(bytes)) => Some(bytes),
            Some(Err(e)) => {
                warn!("Container stream error: {}", e);
                None
            }
            None => {
                debug!("Container stream reached EOF");
                None
            }
        }
    }

    async fn write_input(&mut self, bytes: &[u8]) -> Result<(), ContainerError> {
        self.io
            .input
            .write_all(bytes)
            .await
            .map_err(|e| ContainerError::EngineFailure(e.to_string()))?;
        self.io
            .input
            .flush()
            .await
            .map_err(|e| ContainerError::EngineFailure(e.to_string()))?;
        Ok(())
    }
}
