//! TUI event loop, input dispatch and the state it owns.

mod handlers;
mod render;

use anyhow::Result;
use crossterm::event::{self, Event};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::mpsc;

use crate::{
    api::{
        llm::{HttpInferenceClient, InferenceApi},
        task::{HttpTaskClient, TaskApi, TaskSubmitRequest},
    },
    composer,
    config::Config,
    events::{AppEvent, Screen, UiState},
    input::InputBoxState,
    monitor::ServiceMonitor,
    poller::TaskPoller,
    session::InferenceSession,
    shortcuts::Shortcuts,
    tasks::{BoardNotice, TaskBoard},
    ui::Tui,
    uploads::UploadNotice,
};

use handlers::{handle_key, is_ctrl_c};
use render::draw;

/// Everything the key handlers and the renderer share.
///
/// Only the UI loop mutates it; spawned calls report back through `rx`.
pub struct App {
    pub cfg: Config,
    pub ui: UiState,
    pub shortcuts: Shortcuts,
    /// Open text entry popup, if any.
    pub input_box: Option<InputBoxState>,

    pub board: TaskBoard,
    pub poller: TaskPoller,
    pub session: InferenceSession,
    pub monitor: ServiceMonitor,
    /// Task form being filled in through consecutive input boxes.
    pub task_draft: TaskSubmitRequest,

    pub llm: Arc<dyn InferenceApi>,
    pub tx: mpsc::Sender<AppEvent>,
    pub rx: mpsc::Receiver<AppEvent>,
}

impl App {
    pub fn new(
        cfg: Config,
        shortcuts: Shortcuts,
        tasks: Arc<dyn TaskApi>,
        llm: Arc<dyn InferenceApi>,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<AppEvent>(256);
        Self {
            ui: UiState::new(Screen::Tasks),
            shortcuts,
            input_box: None,
            board: TaskBoard::new(tasks.clone(), cfg.tasks.page_size, tx.clone()),
            poller: TaskPoller::new(tasks, cfg.poll_interval(), tx.clone()),
            session: InferenceSession::new(cfg.upload.max_files),
            monitor: ServiceMonitor::new(),
            task_draft: TaskSubmitRequest::default(),
            llm,
            tx,
            rx,
            cfg,
        }
    }

    /// Initial fetches issued once at startup.
    pub fn start(&mut self) {
        self.board.refresh();
        self.monitor.refresh(self.llm.clone(), self.tx.clone());
        self.monitor.load_info(self.llm.clone(), self.tx.clone());
        self.ui.status = "Loading tasks...".into();
    }

    /// Apply everything spawned calls reported since the last frame.
    pub fn drain_events(&mut self) {
        while let Ok(ev) = self.rx.try_recv() {
            handle_event(self, ev);
        }
    }
}

/// Run the TUI until the user quits.
pub async fn run_app(terminal: &mut Tui) -> Result<()> {
    // Created with defaults on first run.
    let cfg_path = PathBuf::from("console.toml");
    let cfg = Config::load_or_default(&cfg_path)?;

    let shortcuts_path = PathBuf::from("shortcut.toml");
    let shortcuts = Shortcuts::load_or_default(&shortcuts_path)?;

    let http = reqwest::Client::builder().timeout(cfg.timeout()).build()?;
    tracing::info!(
        "task service {}, inference service {}",
        cfg.api.task_base_url,
        cfg.api.llm_base_url
    );
    let tasks: Arc<dyn TaskApi> =
        Arc::new(HttpTaskClient::new(http.clone(), cfg.api.task_base_url.clone()));
    let llm: Arc<dyn InferenceApi> =
        Arc::new(HttpInferenceClient::new(http, cfg.api.llm_base_url.clone()));

    let mut app = App::new(cfg, shortcuts, tasks, llm);
    app.start();

    loop {
        terminal.draw(|f| draw(f, &app))?;

        // Fold in finished calls before reading input.
        app.drain_events();

        // Short timeout keeps the UI responsive to completions.
        if event::poll(Duration::from_millis(50))?
            && let Event::Key(k) = event::read()?
        {
            if is_ctrl_c(&k) {
                break;
            }
            if handle_key(&mut app, k)? {
                break;
            }
        }
    }
    app.poller.stop();
    Ok(())
}

/// Route a completion to the component that issued it.
fn handle_event(app: &mut App, ev: AppEvent) {
    match ev {
        AppEvent::Poll(ev) => app.poller.apply(ev),
        AppEvent::Board(ev) => match app.board.apply(ev) {
            Some(BoardNotice::Created(id)) => app.ui.notify(format!("Created task {id}")),
            Some(BoardNotice::Cancelled(id)) => {
                app.ui.notify(format!("Cancelled task {id}"));
                // The detail view shows the new state right away.
                if app.poller.task_id() == Some(id.as_str()) {
                    app.poller.refresh();
                }
            }
            Some(BoardNotice::Failed(msg)) => app.ui.fail(msg),
            None => {
                if !app.board.loading && app.board.error.is_none() {
                    app.ui.selected = app
                        .ui
                        .selected
                        .min(app.board.tasks.len().saturating_sub(1));
                    app.ui.status = format!(
                        "Loaded {} of {} tasks (page {})",
                        app.board.tasks.len(),
                        app.board.total,
                        app.board.page
                    );
                }
            }
        },
        AppEvent::Upload(ev) => match app.session.apply_upload(ev) {
            Some(UploadNotice::Uploaded(name)) => app.ui.notify(format!("Uploaded {name}")),
            Some(UploadNotice::Failed { filename, message }) => {
                app.ui.fail(format!("upload of {filename} failed: {message}"))
            }
            None => {}
        },
        AppEvent::Inference(ev) => {
            let was_loading = app.session.loading;
            composer::apply(&mut app.session, ev);
            if was_loading && !app.session.loading {
                match &app.session.error {
                    Some(e) => app.ui.fail(format!("inference failed: {e}")),
                    None => app.ui.notify("Inference done"),
                }
            }
        }
        AppEvent::Monitor(ev) => app.monitor.apply(ev),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        api::{
            ApiResult,
            task::{TaskListQuery, TaskListResponse, TaskSnapshot, TaskStatus},
        },
        uploads::tests::FakeLlm,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Task service with a fixed list of RUNNING tasks.
    #[derive(Default)]
    pub(crate) struct FakeTasks {
        pub(crate) created: Mutex<Vec<TaskSubmitRequest>>,
        pub(crate) fetched: Mutex<Vec<String>>,
    }

    pub(crate) fn running(id: &str) -> TaskSnapshot {
        TaskSnapshot {
            task_id: id.into(),
            status: TaskStatus::Running,
            task_type: Some("VIDEO_ANALYSIS".into()),
            created_at: Some("2026-10-16T09:30:00".into()),
            updated_at: None,
            completed_at: None,
            progress: Some(40),
            error_message: None,
            result: None,
            video_key: None,
        }
    }

    #[async_trait]
    impl TaskApi for FakeTasks {
        async fn create_task(&self, req: &TaskSubmitRequest) -> ApiResult<TaskSnapshot> {
            self.created.lock().unwrap().push(req.clone());
            Ok(running("created"))
        }

        async fn list_tasks(&self, q: &TaskListQuery) -> ApiResult<TaskListResponse> {
            Ok(TaskListResponse {
                tasks: vec![running("t-1"), running("t-2")],
                total: 2,
                page: q.page,
                page_size: q.page_size,
            })
        }

        async fn get_task(&self, task_id: &str) -> ApiResult<TaskSnapshot> {
            self.fetched.lock().unwrap().push(task_id.to_string());
            Ok(running(task_id))
        }

        async fn cancel_task(&self, _task_id: &str) -> ApiResult<()> {
            Ok(())
        }
    }

    pub(crate) fn test_app() -> (App, Arc<FakeTasks>, Arc<FakeLlm>) {
        let tasks = Arc::new(FakeTasks::default());
        let llm = Arc::new(FakeLlm::default());
        let app = App::new(
            Config::default(),
            Shortcuts::default(),
            tasks.clone(),
            llm.clone(),
        );
        (app, tasks, llm)
    }

    /// Wait for one event and apply it.
    pub(crate) async fn pump(app: &mut App) {
        let Some(ev) = app.rx.recv().await else {
            panic!("channel closed");
        };
        handle_event(app, ev);
    }

    #[tokio::test]
    async fn startup_loads_tasks_and_service_state() {
        let (mut app, _tasks, llm) = test_app();
        *llm.health_reply.lock().unwrap() = Some(Ok(crate::api::llm::HealthResponse {
            status: "UP".into(),
            service: "Local LLM Client".into(),
            service_available: true,
            available_models: Some(vec!["llava".into()]),
        }));
        app.start();
        for _ in 0..3 {
            pump(&mut app).await;
        }
        assert_eq!(app.board.tasks.len(), 2);
        assert!(app.ui.status.starts_with("Loaded 2 of 2"));
        assert!(app.monitor.available);
        assert_eq!(app.monitor.selected.as_deref(), Some("llava"));
        assert!(app.monitor.info.is_some());
    }

    #[tokio::test]
    async fn reported_inference_failure_reaches_the_status_bar() {
        let (mut app, _tasks, llm) = test_app();
        *llm.infer_reply.lock().unwrap() = Some(Ok(crate::api::llm::InferenceResponse {
            success: false,
            error: Some("model not loaded".into()),
            ..Default::default()
        }));
        app.session.prompt = "describe".into();
        composer::submit(&mut app.session, None, app.llm.clone(), app.tx.clone()).unwrap();
        pump(&mut app).await;
        assert_eq!(app.session.error.as_deref(), Some("model not loaded"));
        assert_eq!(
            app.ui.error.as_deref(),
            Some("inference failed: model not loaded")
        );
    }
}
