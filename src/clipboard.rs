use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::ChatError;

#[async_trait]
pub trait Clipboard: Send + Sync {
    /// Replace the clipboard contents with exactly `text`.
    async fn copy(&self, text: &str) -> Result<(), ChatError>;
}

/// System clipboard. Tries native wl-clipboard-rs first (wlroots protocol),
/// falls back to wl-copy (standard Wayland protocol via wl_data_device_manager).
#[derive(Debug, Default)]
pub struct WaylandClipboard;

impl WaylandClipboard {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Clipboard for WaylandClipboard {
    async fn copy(&self, text: &str) -> Result<(), ChatError> {
        let text_for_native = text.to_string();
        let native_result = tokio::task::spawn_blocking(move || {
            use wl_clipboard_rs::copy::{MimeType, Options, Source};
            let opts = Options::new();
            opts.copy(
                Source::Bytes(text_for_native.into_bytes().into()),
                MimeType::Text,
            )
        })
        .await
        .map_err(|e| ChatError::Clipboard(format!("clipboard task failed: {}", e)))?;

        if native_result.is_ok() {
            return Ok(());
        }

        debug!("Native clipboard write unavailable, using wl-copy");
        let mut child = Command::new("wl-copy")
            .stdin(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| ChatError::Clipboard(format!("Failed to run wl-copy: {}", e)))?;

        if let Some(ref mut stdin) = child.stdin {
            use tokio::io::AsyncWriteExt;
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| ChatError::Clipboard(format!("Failed to write to wl-copy: {}", e)))?;
        }
        drop(child.stdin.take());

        let status = child
            .wait()
            .await
            .map_err(|e| ChatError::Clipboard(format!("wl-copy failed: {}", e)))?;

        if !status.success() {
            return Err(ChatError::Clipboard("wl-copy exited with error".to_string()));
        }

        Ok(())
    }
}
