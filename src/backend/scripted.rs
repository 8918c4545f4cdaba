//! In-memory backend that replays queued responses and records every call
//!
//! Used by the unit and integration test suites in place of a hosted model.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{GenerativeBackend, Generated, ImagePayload, Modality};
use crate::error::Result;

/// One call as seen by the backend
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub images: Vec<ImagePayload>,
    pub prompt: String,
    pub mode: Modality,
}

/// Replays responses in FIFO order; an empty queue answers with no content
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<Result<Generated>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw response
    pub fn push(&self, response: Result<Generated>) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(response);
    }

    /// Queue a text-only response
    pub fn push_text(&self, text: &str) {
        self.push(Ok(Generated {
            text: Some(text.to_string()),
            images: Vec::new(),
        }));
    }

    /// Queue a response carrying one PNG image
    pub fn push_image(&self, data: &[u8]) {
        self.push(Ok(Generated {
            text: None,
            images: vec![ImagePayload {
                mime_type: "image/png".to_string(),
                data: data.to_vec(),
            }],
        }));
    }

    /// Queue a response with neither text nor image
    pub fn push_empty(&self) {
        self.push(Ok(Generated::default()));
    }

    /// Calls received so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of calls received so far
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl GenerativeBackend for ScriptedBackend {
    async fn generate(
        &self,
        images: &[ImagePayload],
        prompt: &str,
        mode: Modality,
    ) -> Result<Generated> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedCall {
                images: images.to_vec(),
                prompt: prompt.to_string(),
                mode,
            });

        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Ok(Generated::default()))
    }
}
