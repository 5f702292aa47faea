//! Turns the session into one inference request and folds the answer back in.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::{
    api::llm::{InferenceApi, InferenceRequest, InferenceResponse},
    events::{AppEvent, spawn_reported},
    session::{InferenceSession, TokenUsage},
};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ComposeError {
    #[error("enter a prompt first")]
    EmptyPrompt,
    #[error("an inference call is already running")]
    Busy,
}

#[derive(Debug)]
pub enum InferenceEvent {
    Finished {
        generation: u64,
        /// `Err` carries a transport or decoding failure message.
        outcome: Result<InferenceResponse, String>,
    },
}

/// Build the request for the current session without side effects.
///
/// Image URLs are the finished uploads in session order followed by the
/// extra URL. A single image goes out as `imageUrl`, several as `imageUrls`.
pub fn compose_request(
    session: &InferenceSession,
    model: Option<&str>,
) -> Result<InferenceRequest, ComposeError> {
    let prompt = session.prompt.trim();
    if prompt.is_empty() {
        return Err(ComposeError::EmptyPrompt);
    }

    let mut urls = session.uploads.done_urls();
    if let Some(extra) = non_blank(&session.extra_url) {
        urls.push(extra);
    }
    let (image_url, image_urls) = match urls.len() {
        0 => (None, None),
        1 => (urls.pop(), None),
        _ => (None, Some(urls)),
    };

    Ok(InferenceRequest {
        prompt: prompt.to_string(),
        image_urls,
        image_url,
        ocr_text: session.ocr_text.as_deref().and_then(non_blank),
        model: model.and_then(non_blank),
    })
}

/// Validate, then send the session to the model in the background.
///
/// Previous result and error are cleared before the call resolves. A blank
/// prompt only sets `validation`; nothing else changes and no call is made.
pub fn submit(
    session: &mut InferenceSession,
    model: Option<&str>,
    api: Arc<dyn InferenceApi>,
    tx: mpsc::Sender<AppEvent>,
) -> Result<(), ComposeError> {
    if session.loading {
        return Err(ComposeError::Busy);
    }
    let req = match compose_request(session, model) {
        Ok(req) => req,
        Err(e) => {
            session.validation = Some(e.to_string());
            return Err(e);
        }
    };

    session.validation = None;
    session.result = None;
    session.error = None;
    session.loading = true;

    let generation = session.generation;
    tracing::info!(
        "inference submitted: prompt {} chars, {} image(s), model {:?}",
        req.prompt.chars().count(),
        req.image_urls.as_ref().map_or(req.image_url.iter().count(), Vec::len),
        req.model
    );

    spawn_reported(
        tx,
        async move { api.infer(&req).await.map_err(|e| e.to_string()) },
        move |outcome| {
            AppEvent::Inference(InferenceEvent::Finished {
                generation,
                outcome,
            })
        },
    );
    Ok(())
}

/// Reconcile a finished call into the session.
///
/// Any failure, reported or transport, clears result, tokens and carried
/// OCR text so stale output never sits next to a new error.
pub fn apply(session: &mut InferenceSession, ev: InferenceEvent) {
    let InferenceEvent::Finished {
        generation,
        outcome,
    } = ev;
    if generation != session.generation {
        tracing::debug!("dropping inference result for cleared session");
        return;
    }
    session.loading = false;

    match outcome {
        Ok(resp) if resp.success => {
            tracing::info!("inference done: total tokens {:?}", resp.total_tokens);
            session.result = Some(resp.content.unwrap_or_default());
            session.tokens = Some(TokenUsage {
                input: resp.input_tokens,
                output: resp.output_tokens,
                total: resp.total_tokens,
            });
            session.ocr_text = resp.ocr_text.as_deref().and_then(non_blank);
            session.error = None;
        }
        Ok(resp) => {
            let message = resp.error.unwrap_or_else(|| "inference failed".into());
            tracing::warn!("inference rejected: {message}");
            fail(session, message);
        }
        Err(message) => {
            tracing::error!("inference call failed: {message}");
            fail(session, message);
        }
    }
}

fn fail(session: &mut InferenceSession, message: String) {
    session.result = None;
    session.tokens = None;
    session.ocr_text = None;
    session.error = Some(message);
}

fn non_blank(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}
