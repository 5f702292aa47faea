//! Per-file upload tracking for one inference session.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::Arc,
};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    api::llm::{InferenceApi, QualityInfo, file_name},
    events::AppEvent,
};

/// Where one file is in its upload lifecycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadStatus {
    Pending,
    Done { url: String },
    Error(String),
}

/// Client-side record of one uploaded file.
#[derive(Clone, Debug, PartialEq)]
pub struct UploadEntry {
    /// Stable id assigned when the upload starts.
    pub id: Uuid,
    pub filename: String,
    pub status: UploadStatus,
    /// Only ever set on a `Done` entry.
    pub quality: Option<QualityInfo>,
}

impl UploadEntry {
    pub fn url(&self) -> Option<&str> {
        match &self.status {
            UploadStatus::Done { url } => Some(url),
            _ => None,
        }
    }
}

/// Result of the upload call as seen by the session.
#[derive(Debug, PartialEq)]
pub enum UploadOutcome {
    Done {
        url: String,
        quality: Option<QualityInfo>,
    },
    Failed(String),
}

#[derive(Debug)]
pub enum UploadEvent {
    Finished {
        generation: u64,
        id: Uuid,
        outcome: UploadOutcome,
    },
    /// Quality probed after the upload completed.
    Quality {
        generation: u64,
        id: Uuid,
        url: String,
        quality: QualityInfo,
    },
}

/// What the user should be told after applying an event.
#[derive(Debug, PartialEq, Eq)]
pub enum UploadNotice {
    Uploaded(String),
    Failed { filename: String, message: String },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("at most {0} images per request")]
    TooManyFiles(usize),
}

/// Uploads of the current session, keyed by id, shown in start order.
#[derive(Debug)]
pub struct UploadSession {
    entries: HashMap<Uuid, UploadEntry>,
    order: Vec<Uuid>,
    max_files: usize,
}

impl UploadSession {
    pub fn new(max_files: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: vec![],
            max_files,
        }
    }

    /// Register a PENDING entry, then upload in the background.
    ///
    /// The entry is visible before the request is sent. Completion is
    /// reported as `UploadEvent`s tagged with `generation`.
    pub fn start_upload(
        &mut self,
        path: PathBuf,
        generation: u64,
        api: Arc<dyn InferenceApi>,
        tx: mpsc::Sender<AppEvent>,
    ) -> Result<Uuid, UploadError> {
        if self.entries.len() >= self.max_files {
            return Err(UploadError::TooManyFiles(self.max_files));
        }

        let id = Uuid::new_v4();
        let filename = file_name(&path);
        self.entries.insert(
            id,
            UploadEntry {
                id,
                filename: filename.clone(),
                status: UploadStatus::Pending,
                quality: None,
            },
        );
        self.order.push(id);
        tracing::info!("upload started: {filename} ({id})");

        tokio::spawn(upload_one(api, path, id, generation, tx));
        Ok(id)
    }

    /// Apply an upload completion. Events for another generation or for
    /// entries that were removed meanwhile are dropped.
    pub fn apply(&mut self, ev: UploadEvent, current_generation: u64) -> Option<UploadNotice> {
        match ev {
            UploadEvent::Finished {
                generation,
                id,
                outcome,
            } => {
                if generation != current_generation {
                    tracing::debug!("dropping upload result for cleared session ({id})");
                    return None;
                }
                let entry = self.entries.get_mut(&id)?;
                match outcome {
                    UploadOutcome::Done { url, quality } => {
                        tracing::info!("upload done: {} -> {url}", entry.filename);
                        entry.status = UploadStatus::Done { url };
                        entry.quality = quality;
                        Some(UploadNotice::Uploaded(entry.filename.clone()))
                    }
                    UploadOutcome::Failed(message) => {
                        tracing::warn!("upload failed: {}: {message}", entry.filename);
                        // Kept in the list so the failure stays visible.
                        entry.status = UploadStatus::Error(message.clone());
                        Some(UploadNotice::Failed {
                            filename: entry.filename.clone(),
                            message,
                        })
                    }
                }
            }
            UploadEvent::Quality {
                generation,
                id,
                url,
                quality,
            } => {
                if generation != current_generation {
                    return None;
                }
                if let Some(entry) = self.entries.get_mut(&id)
                    && entry.url() == Some(url.as_str())
                {
                    entry.quality = Some(quality);
                }
                None
            }
        }
    }

    /// Drop an entry together with its quality descriptor.
    pub fn remove(&mut self, id: Uuid) -> bool {
        if self.entries.remove(&id).is_none() {
            return false;
        }
        self.order.retain(|x| *x != id);
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// URLs of finished uploads, in the order they were started.
    pub fn done_urls(&self) -> Vec<String> {
        self.entries()
            .filter_map(|e| e.url().map(str::to_string))
            .collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &UploadEntry> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    /// Id of the `idx`-th entry in display order.
    pub fn id_at(&self, idx: usize) -> Option<Uuid> {
        self.order.get(idx).copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| e.status == UploadStatus::Pending)
            .count()
    }
}

#[cfg(test)]
impl UploadSession {
    pub(crate) fn get(&self, id: Uuid) -> Option<&UploadEntry> {
        self.entries.get(&id)
    }

    /// Register an already finished upload carrying HD quality.
    pub(crate) fn insert_done(&mut self, filename: &str, url: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.entries.insert(
            id,
            UploadEntry {
                id,
                filename: filename.into(),
                status: UploadStatus::Done { url: url.into() },
                quality: Some(tests::hd()),
            },
        );
        self.order.push(id);
        id
    }
}

async fn upload_one(
    api: Arc<dyn InferenceApi>,
    path: PathBuf,
    id: Uuid,
    generation: u64,
    tx: mpsc::Sender<AppEvent>,
) {
    let outcome = match api.upload(&path).await {
        Ok(resp) => match (resp.success, resp.file_url.clone()) {
            (true, Some(url)) => UploadOutcome::Done {
                url,
                quality: resp.inline_quality(),
            },
            _ => UploadOutcome::Failed(resp.error.unwrap_or_else(|| "upload failed".into())),
        },
        Err(e) => UploadOutcome::Failed(e.to_string()),
    };

    // Probe only when the upload itself did not report quality.
    let probe_url = match &outcome {
        UploadOutcome::Done { url, quality: None } => Some(url.clone()),
        _ => None,
    };

    let _ = tx
        .send(AppEvent::Upload(UploadEvent::Finished {
            generation,
            id,
            outcome,
        }))
        .await;

    let Some(url) = probe_url else {
        return;
    };
    match api.quality(&url).await {
        Ok(resp) => match resp.into_quality() {
            Some(quality) => {
                let _ = tx
                    .send(AppEvent::Upload(UploadEvent::Quality {
                        generation,
                        id,
                        url,
                        quality,
                    }))
                    .await;
            }
            None => tracing::debug!("no quality info for {url}"),
        },
        // Enrichment only; the upload already succeeded.
        Err(e) => tracing::debug!("quality probe failed for {url}: {e}"),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::{
        ApiError, ApiResult,
        llm::{
            HealthResponse, InferenceRequest, InferenceResponse, QualityResponse, ServiceInfo,
            UploadResponse,
        },
    };
    use async_trait::async_trait;
    use std::{path::Path, sync::Mutex};

    /// Scriptable inference service shared by the session tests.
    #[derive(Default)]
    pub(crate) struct FakeLlm {
        /// Upload answers by file name; missing names fail at transport level.
        pub uploads: Mutex<HashMap<String, UploadResponse>>,
        pub quality: Mutex<Option<QualityResponse>>,
        pub infer_reply: Mutex<Option<ApiResult<InferenceResponse>>>,
        pub health_reply: Mutex<Option<ApiResult<HealthResponse>>>,
        pub infer_calls: Mutex<Vec<InferenceRequest>>,
        pub quality_calls: Mutex<Vec<String>>,
        /// Health and infer calls panic instead of answering.
        pub crash: Mutex<bool>,
    }

    impl FakeLlm {
        fn crash_if_asked(&self) {
            let crash = *self.crash.lock().unwrap();
            if crash {
                panic!("inference client crashed");
            }
        }

        pub fn upload_ok(&self, name: &str, url: &str) {
            self.uploads.lock().unwrap().insert(
                name.into(),
                UploadResponse {
                    success: true,
                    file_url: Some(url.into()),
                    ..Default::default()
                },
            );
        }
    }

    #[async_trait]
    impl InferenceApi for FakeLlm {
        async fn service_info(&self) -> ApiResult<ServiceInfo> {
            Ok(ServiceInfo {
                service: "Local LLM Client".into(),
                version: "1.0.0".into(),
                status: "running".into(),
                endpoints: Default::default(),
            })
        }

        async fn health(&self) -> ApiResult<HealthResponse> {
            self.crash_if_asked();
            self.health_reply
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(ApiError::NotFound("health".into())))
        }

        async fn infer(&self, req: &InferenceRequest) -> ApiResult<InferenceResponse> {
            self.infer_calls.lock().unwrap().push(req.clone());
            self.crash_if_asked();
            self.infer_reply
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(InferenceResponse::default()))
        }

        async fn upload(&self, path: &Path) -> ApiResult<UploadResponse> {
            let name = file_name(path);
            self.uploads
                .lock()
                .unwrap()
                .get(&name)
                .cloned()
                .ok_or(ApiError::NotFound(name))
        }

        async fn quality(&self, file_url: &str) -> ApiResult<QualityResponse> {
            self.quality_calls.lock().unwrap().push(file_url.to_string());
            self.quality
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| ApiError::NotFound(file_url.to_string()))
        }
    }

    pub(crate) fn hd() -> QualityInfo {
        QualityInfo {
            width: 1920,
            height: 1080,
            resolution: "1080p".into(),
            quality: "HD".into(),
        }
    }

    fn hd_response() -> QualityResponse {
        QualityResponse {
            success: true,
            width: Some(1920),
            height: Some(1080),
            resolution: Some("1080p".into()),
            quality: Some("HD".into()),
            error: None,
        }
    }

    async fn drain(session: &mut UploadSession, rx: &mut mpsc::Receiver<AppEvent>, n: usize) {
        for _ in 0..n {
            let Some(AppEvent::Upload(ev)) = rx.recv().await else {
                panic!("unexpected event");
            };
            session.apply(ev, 0);
        }
    }

    #[tokio::test]
    async fn entry_is_pending_before_upload_completes() {
        let api = Arc::new(FakeLlm::default());
        api.upload_ok("a.png", "file:///up/a.png");
        let (tx, mut rx) = mpsc::channel(16);
        let mut s = UploadSession::new(10);

        let id = s
            .start_upload(PathBuf::from("/pics/a.png"), 0, api.clone(), tx)
            .unwrap();
        assert_eq!(s.get(id).unwrap().status, UploadStatus::Pending);
        assert_eq!(s.get(id).unwrap().filename, "a.png");
        assert_eq!(s.pending_count(), 1);

        drain(&mut s, &mut rx, 1).await;
        assert_eq!(s.done_urls(), vec!["file:///up/a.png"]);
    }

    #[tokio::test]
    async fn quality_is_probed_when_not_inline() {
        let api = Arc::new(FakeLlm::default());
        api.upload_ok("a.png", "file:///up/a.png");
        *api.quality.lock().unwrap() = Some(hd_response());
        let (tx, mut rx) = mpsc::channel(16);
        let mut s = UploadSession::new(10);

        let id = s.start_upload("a.png".into(), 0, api.clone(), tx).unwrap();
        drain(&mut s, &mut rx, 2).await;

        assert_eq!(s.get(id).unwrap().quality, Some(hd()));
        assert_eq!(*api.quality_calls.lock().unwrap(), vec!["file:///up/a.png"]);
    }

    #[tokio::test]
    async fn inline_quality_skips_probe() {
        let api = Arc::new(FakeLlm::default());
        api.uploads.lock().unwrap().insert(
            "a.png".into(),
            UploadResponse {
                success: true,
                file_url: Some("file:///up/a.png".into()),
                width: Some(1920),
                height: Some(1080),
                resolution: Some("1080p".into()),
                quality: Some("HD".into()),
                ..Default::default()
            },
        );
        let (tx, mut rx) = mpsc::channel(16);
        let mut s = UploadSession::new(10);

        let id = s.start_upload("a.png".into(), 0, api.clone(), tx).unwrap();
        drain(&mut s, &mut rx, 1).await;

        assert_eq!(s.get(id).unwrap().quality, Some(hd()));
        assert!(api.quality_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_probe_leaves_upload_done() {
        let api = Arc::new(FakeLlm::default());
        api.upload_ok("a.png", "file:///up/a.png");
        let (tx, mut rx) = mpsc::channel(16);
        let mut s = UploadSession::new(10);

        let id = s.start_upload("a.png".into(), 0, api.clone(), tx).unwrap();
        drain(&mut s, &mut rx, 1).await;
        // The probe runs after Finished; wait for the spawned task to finish it.
        while api.quality_calls.lock().unwrap().is_empty() {
            tokio::task::yield_now().await;
        }

        let e = s.get(id).unwrap();
        assert_eq!(e.url(), Some("file:///up/a.png"));
        assert!(e.quality.is_none());
    }

    #[tokio::test]
    async fn rejected_upload_stays_listed_as_error() {
        let api = Arc::new(FakeLlm::default());
        api.uploads.lock().unwrap().insert(
            "big.png".into(),
            UploadResponse {
                success: false,
                error: Some("file too large".into()),
                ..Default::default()
            },
        );
        let (tx, mut rx) = mpsc::channel(16);
        let mut s = UploadSession::new(10);

        let id = s.start_upload("big.png".into(), 0, api, tx).unwrap();
        let Some(AppEvent::Upload(ev)) = rx.recv().await else {
            panic!("unexpected event");
        };
        let notice = s.apply(ev, 0);

        assert_eq!(
            notice,
            Some(UploadNotice::Failed {
                filename: "big.png".into(),
                message: "file too large".into(),
            })
        );
        assert_eq!(
            s.get(id).unwrap().status,
            UploadStatus::Error("file too large".into())
        );
        assert!(s.done_urls().is_empty());
        assert_eq!(s.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_uploads_only_touch_their_own_entry() {
        let api = Arc::new(FakeLlm::default());
        api.upload_ok("a.png", "file:///up/a.png");
        api.upload_ok("b.png", "file:///up/b.png");
        let (tx, mut rx) = mpsc::channel(16);
        let mut s = UploadSession::new(10);

        let a = s.start_upload("a.png".into(), 0, api.clone(), tx.clone()).unwrap();
        let b = s.start_upload("b.png".into(), 0, api.clone(), tx.clone()).unwrap();
        let c = s.start_upload("missing.png".into(), 0, api, tx).unwrap();

        let mut events = vec![];
        for _ in 0..3 {
            let Some(AppEvent::Upload(ev)) = rx.recv().await else {
                panic!("unexpected event");
            };
            events.push(ev);
        }
        // Apply completions in reverse arrival order.
        for ev in events.into_iter().rev() {
            s.apply(ev, 0);
        }

        assert_eq!(s.get(a).unwrap().url(), Some("file:///up/a.png"));
        assert_eq!(s.get(b).unwrap().url(), Some("file:///up/b.png"));
        assert!(matches!(s.get(c).unwrap().status, UploadStatus::Error(_)));
        assert_eq!(s.done_urls(), vec!["file:///up/a.png", "file:///up/b.png"]);
    }

    #[test]
    fn remove_drops_entry_and_quality_only() {
        let mut s = UploadSession::new(10);
        let ids: Vec<Uuid> = (0..5)
            .map(|i| s.insert_done(&format!("{i}.png"), &format!("u{i}")))
            .collect();
        let before: Vec<UploadEntry> = s.entries().cloned().collect();

        assert!(s.remove(ids[2]));
        assert!(s.get(ids[2]).is_none());
        assert!(!s.remove(ids[2]));

        let after: Vec<UploadEntry> = s.entries().cloned().collect();
        let expected: Vec<UploadEntry> = before
            .into_iter()
            .filter(|e| e.id != ids[2])
            .collect();
        assert_eq!(after, expected);
        assert_eq!(s.done_urls(), vec!["u0", "u1", "u3", "u4"]);
    }

    #[test]
    fn completion_after_clear_is_ignored() {
        let mut s = UploadSession::new(10);
        let id = s.insert_done("a.png", "u0");
        s.clear();

        let notice = s.apply(
            UploadEvent::Finished {
                generation: 0,
                id,
                outcome: UploadOutcome::Done {
                    url: "u0".into(),
                    quality: None,
                },
            },
            0,
        );
        assert!(notice.is_none());
        assert!(s.is_empty());
    }

    #[test]
    fn stale_generation_is_ignored() {
        let mut s = UploadSession::new(10);
        s.entries.insert(
            Uuid::nil(),
            UploadEntry {
                id: Uuid::nil(),
                filename: "a.png".into(),
                status: UploadStatus::Pending,
                quality: None,
            },
        );
        s.order.push(Uuid::nil());

        let notice = s.apply(
            UploadEvent::Finished {
                generation: 1,
                id: Uuid::nil(),
                outcome: UploadOutcome::Failed("late".into()),
            },
            2,
        );
        assert!(notice.is_none());
        assert_eq!(s.get(Uuid::nil()).unwrap().status, UploadStatus::Pending);
    }

    #[test]
    fn quality_for_a_different_url_is_not_attached() {
        let mut s = UploadSession::new(10);
        let id = s.insert_done("a.png", "u0");
        s.entries.get_mut(&id).unwrap().quality = None;

        s.apply(
            UploadEvent::Quality {
                generation: 0,
                id,
                url: "other".into(),
                quality: hd(),
            },
            0,
        );
        assert!(s.get(id).unwrap().quality.is_none());
    }

    #[tokio::test]
    async fn file_limit_is_enforced_locally() {
        let api = Arc::new(FakeLlm::default());
        let (tx, _rx) = mpsc::channel(16);
        let mut s = UploadSession::new(1);
        s.start_upload("a.png".into(), 0, api.clone(), tx.clone()).unwrap();
        assert_eq!(
            s.start_upload("b.png".into(), 0, api, tx),
            Err(UploadError::TooManyFiles(1))
        );
        assert_eq!(s.len(), 1);
    }
}
