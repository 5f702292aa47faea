//! Mutable state of the inference screen.

use std::{path::PathBuf, sync::Arc};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    api::llm::InferenceApi,
    events::AppEvent,
    uploads::{UploadError, UploadEvent, UploadNotice, UploadSession},
};

/// Token accounting reported by the last successful call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input: Option<u64>,
    pub output: Option<u64>,
    pub total: Option<u64>,
}

/// Inputs and outputs of one round trip to the model.
///
/// Uploads are written only through `UploadSession`; the text, result and
/// OCR fields only by the composer. Async completions carry the generation
/// they were started under and are dropped once `clear` moved past it.
#[derive(Debug)]
pub struct InferenceSession {
    pub prompt: String,
    /// Optional image URL sent after the uploaded ones.
    pub extra_url: String,
    pub uploads: UploadSession,
    /// OCR text from the last successful call, sent back as context.
    pub ocr_text: Option<String>,
    pub result: Option<String>,
    pub tokens: Option<TokenUsage>,
    pub error: Option<String>,
    /// Local validation message; never touches result or error.
    pub validation: Option<String>,
    /// An inference call is outstanding. Consumers must not submit while set.
    pub loading: bool,
    pub(crate) generation: u64,
}

impl InferenceSession {
    pub fn new(max_files: usize) -> Self {
        Self {
            prompt: String::new(),
            extra_url: String::new(),
            uploads: UploadSession::new(max_files),
            ocr_text: None,
            result: None,
            tokens: None,
            error: None,
            validation: None,
            loading: false,
            generation: 0,
        }
    }

    /// Reset every field. Responses still in flight become stale.
    pub fn clear(&mut self) {
        self.generation += 1;
        self.prompt.clear();
        self.extra_url.clear();
        self.uploads.clear();
        self.ocr_text = None;
        self.result = None;
        self.tokens = None;
        self.error = None;
        self.validation = None;
        self.loading = false;
        tracing::info!("inference session cleared (generation {})", self.generation);
    }

    /// Start uploading a local image into this session.
    pub fn start_upload(
        &mut self,
        path: PathBuf,
        api: Arc<dyn InferenceApi>,
        tx: mpsc::Sender<AppEvent>,
    ) -> Result<Uuid, UploadError> {
        let generation = self.generation;
        self.uploads.start_upload(path, generation, api, tx)
    }

    pub fn apply_upload(&mut self, ev: UploadEvent) -> Option<UploadNotice> {
        self.uploads.apply(ev, self.generation)
    }
}
