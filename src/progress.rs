//! Progress reporting channel (§4.1). The orchestrator emits a discrete
//! event at the start and end of each pipeline stage when a sink is given.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: String,
    pub progress_percent: f32,
    pub total_files: Option<u64>,
    pub files_processed: Option<u64>,
    pub message: String,
    pub error_flag: bool,
}

impl ProgressEvent {
    pub fn new(stage: impl Into<String>, progress_percent: f32, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            progress_percent,
            total_files: None,
            files_processed: None,
            message: message.into(),
            error_flag: false,
        }
    }

    pub fn with_files(mut self, total_files: u64, files_processed: u64) -> Self {
        self.total_files = Some(total_files);
        self.files_processed = Some(files_processed);
        self
    }

    pub fn with_error_flag(mut self, error_flag: bool) -> Self {
        self.error_flag = error_flag;
        self
    }
}

pub struct ProgressSink {
    sender: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Non-fatal: a closed receiver (caller dropped interest) must not
    /// interrupt the pipeline.
    pub fn emit(&self, event: ProgressEvent) {
        let _ = self.sender.send(event);
    }
}
