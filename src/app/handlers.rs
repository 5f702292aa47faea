//! Key handlers, one per screen plus the input box.

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::path::PathBuf;

use crate::{
    api::task::TaskSubmitRequest,
    composer,
    events::Screen,
    input::{InputBoxState, InputCallbackId},
    shortcuts::matches_shortcut,
    tasks::TaskFilter,
};

use super::App;

/// Handle one key press. Returns true when the app should exit.
pub fn handle_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    // The popup captures every key while open.
    if app.input_box.is_some() {
        return handle_input_box_key(app, k);
    }

    match app.ui.screen {
        Screen::Tasks => handle_tasks_key(app, k),
        Screen::TaskDetail => handle_detail_key(app, k),
        Screen::Inference => handle_inference_key(app, k),
    }
}

pub fn is_ctrl_c(k: &KeyEvent) -> bool {
    k.modifiers.contains(KeyModifiers::CONTROL) && k.code == KeyCode::Char('c')
}

fn handle_tasks_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let sc = &app.shortcuts.tasks;

    if matches_shortcut(&k, &sc.quit) {
        return Ok(true);
    } else if matches_shortcut(&k, &sc.refresh) {
        app.board.refresh();
        app.ui.status = "Refreshing tasks...".into();
    } else if matches_shortcut(&k, &sc.down) {
        if app.ui.selected + 1 < app.board.tasks.len() {
            app.ui.selected += 1;
        }
    } else if matches_shortcut(&k, &sc.up) {
        app.ui.selected = app.ui.selected.saturating_sub(1);
    } else if matches_shortcut(&k, &sc.next_page) {
        if app.board.next_page() {
            app.ui.selected = 0;
        }
    } else if matches_shortcut(&k, &sc.prev_page) {
        if app.board.prev_page() {
            app.ui.selected = 0;
        }
    } else if matches_shortcut(&k, &sc.status_filter) {
        app.board.cycle_status();
        app.ui.selected = 0;
        let label = app
            .board
            .filter
            .status
            .map_or("all".to_string(), |s| s.to_string());
        app.ui.notify(format!("Status filter: {label}"));
    } else if matches_shortcut(&k, &sc.type_filter) {
        let current = app.board.filter.task_type.clone().unwrap_or_default();
        app.input_box = Some(InputBoxState::new(
            "Task type filter (empty for all):",
            &current,
            InputCallbackId::TypeFilter,
        ));
    } else if matches_shortcut(&k, &sc.reset_filter) {
        app.board.reset_filter();
        app.ui.selected = 0;
        app.ui.notify("Filters cleared");
    } else if matches_shortcut(&k, &sc.new_task) {
        app.task_draft = TaskSubmitRequest::default();
        app.input_box = Some(InputBoxState::new(
            "Task type:",
            "",
            InputCallbackId::NewTaskType,
        ));
    } else if matches_shortcut(&k, &sc.inference) {
        app.ui.screen = Screen::Inference;
    } else if matches_shortcut(&k, &sc.open)
        && let Some(task) = app.board.tasks.get(app.ui.selected)
    {
        let id = task.task_id.clone();
        tracing::info!("opening task {id}");
        app.poller.watch(Some(id));
        app.ui.screen = Screen::TaskDetail;
    }

    Ok(false)
}

fn handle_detail_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let sc = &app.shortcuts.detail;

    if matches_shortcut(&k, &sc.back) {
        // Leaving the view releases the poll timer.
        app.poller.watch(None);
        app.ui.screen = Screen::Tasks;
    } else if matches_shortcut(&k, &sc.refresh) {
        app.poller.refresh();
    } else if matches_shortcut(&k, &sc.cancel_task)
        && let Some(id) = app.poller.task_id()
    {
        let id = id.to_string();
        app.board.cancel(&id);
        app.ui.notify(format!("Cancelling task {id}..."));
    }

    Ok(false)
}

fn handle_inference_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let sc = &app.shortcuts.inference;

    if matches_shortcut(&k, &sc.back) {
        app.ui.screen = Screen::Tasks;
    } else if matches_shortcut(&k, &sc.prompt) {
        app.input_box = Some(InputBoxState::new(
            "Prompt:",
            &app.session.prompt,
            InputCallbackId::Prompt,
        ));
    } else if matches_shortcut(&k, &sc.image_url) {
        app.input_box = Some(InputBoxState::new(
            "Image URL (optional):",
            &app.session.extra_url,
            InputCallbackId::ImageUrl,
        ));
    } else if matches_shortcut(&k, &sc.upload) {
        app.input_box = Some(InputBoxState::new(
            "Image file path:",
            "",
            InputCallbackId::UploadPath,
        ));
    } else if matches_shortcut(&k, &sc.remove) {
        if let Some(id) = app.session.uploads.id_at(app.ui.selected_upload)
            && app.session.uploads.remove(id)
        {
            app.ui.selected_upload = app
                .ui
                .selected_upload
                .min(app.session.uploads.len().saturating_sub(1));
            app.ui.notify("Removed image");
        }
    } else if matches_shortcut(&k, &sc.down) {
        if app.ui.selected_upload + 1 < app.session.uploads.len() {
            app.ui.selected_upload += 1;
        }
    } else if matches_shortcut(&k, &sc.up) {
        app.ui.selected_upload = app.ui.selected_upload.saturating_sub(1);
    } else if matches_shortcut(&k, &sc.next_model) {
        app.monitor.cycle(1);
    } else if matches_shortcut(&k, &sc.prev_model) {
        app.monitor.cycle(-1);
    } else if matches_shortcut(&k, &sc.submit) {
        // One call at a time.
        if app.session.loading {
            return Ok(false);
        }
        let model = app.monitor.selected.clone();
        match composer::submit(
            &mut app.session,
            model.as_deref(),
            app.llm.clone(),
            app.tx.clone(),
        ) {
            Ok(()) => app.ui.notify("Running inference..."),
            Err(e) => app.ui.fail(e.to_string()),
        }
    } else if matches_shortcut(&k, &sc.clear) {
        app.session.clear();
        app.ui.selected_upload = 0;
        app.ui.notify("Session cleared");
    } else if matches_shortcut(&k, &sc.health) {
        app.monitor.refresh(app.llm.clone(), app.tx.clone());
        app.ui.status = "Checking service...".into();
    }

    Ok(false)
}

fn handle_input_box_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let Some(input_state) = &mut app.input_box else {
        return Ok(false);
    };
    let sc = &app.shortcuts.input_box;

    if is_ctrl_c(&k) {
        return Ok(true);
    }

    if matches_shortcut(&k, &sc.confirm) {
        let value = input_state.value.clone();
        let callback_id = input_state.callback_id.clone();
        app.input_box = None;
        apply_input_callback(app, callback_id, value);
    } else if matches_shortcut(&k, &sc.cancel) {
        app.input_box = None;
    } else if matches_shortcut(&k, &sc.backspace) {
        input_state.backspace();
    } else if matches_shortcut(&k, &sc.delete) {
        input_state.delete();
    } else if matches_shortcut(&k, &sc.left) {
        input_state.move_left();
    } else if matches_shortcut(&k, &sc.right) {
        input_state.move_right();
    } else if matches_shortcut(&k, &sc.home) {
        input_state.move_home();
    } else if matches_shortcut(&k, &sc.end) {
        input_state.move_end();
    } else if matches_shortcut(&k, &sc.clear_line) {
        input_state.clear_line();
    } else if let KeyCode::Char(c) = k.code
        && !k.modifiers.contains(KeyModifiers::CONTROL)
    {
        input_state.insert_char(c);
    }

    Ok(false)
}

fn apply_input_callback(app: &mut App, callback_id: InputCallbackId, value: String) {
    match callback_id {
        InputCallbackId::TypeFilter => {
            let filter = TaskFilter {
                task_type: non_blank(&value),
                ..app.board.filter.clone()
            };
            app.board.set_filter(filter);
            app.ui.selected = 0;
        }
        InputCallbackId::NewTaskType => {
            app.task_draft.task_type = non_blank(&value);
            if app.task_draft.task_type.is_none() {
                submit_draft(app);
                return;
            }
            next_task_step(app, InputCallbackId::NewTaskVideoKey);
        }
        InputCallbackId::NewTaskVideoKey => {
            app.task_draft.video_key = non_blank(&value);
            next_task_step(app, InputCallbackId::NewTaskLinkName);
        }
        InputCallbackId::NewTaskLinkName => {
            app.task_draft.link_name = non_blank(&value);
            next_task_step(app, InputCallbackId::NewTaskSubmitDate);
        }
        InputCallbackId::NewTaskSubmitDate => {
            app.task_draft.submit_date = non_blank(&value);
            next_task_step(app, InputCallbackId::NewTaskImageUrl);
        }
        InputCallbackId::NewTaskImageUrl => {
            app.task_draft.image_url = non_blank(&value);
            next_task_step(app, InputCallbackId::NewTaskVideoPath);
        }
        InputCallbackId::NewTaskVideoPath => {
            app.task_draft.video_path = non_blank(&value);
            next_task_step(app, InputCallbackId::NewTaskPrompt);
        }
        InputCallbackId::NewTaskPrompt => {
            app.task_draft.prompt = non_blank(&value);
            next_task_step(app, InputCallbackId::NewTaskCustomData);
        }
        InputCallbackId::NewTaskCustomData => match parse_custom_data(&value) {
            Ok(data) => {
                app.task_draft.custom_data = data;
                submit_draft(app);
            }
            Err(e) => {
                // Keep the draft and let the user fix the text.
                app.ui.fail(format!("custom data must be a JSON object: {e}"));
                app.input_box = Some(InputBoxState::new(
                    task_step_prompt(&InputCallbackId::NewTaskCustomData),
                    &value,
                    InputCallbackId::NewTaskCustomData,
                ));
            }
        },
        InputCallbackId::Prompt => app.session.prompt = value,
        InputCallbackId::ImageUrl => app.session.extra_url = value,
        InputCallbackId::UploadPath => {
            let Some(path) = non_blank(&value) else {
                return;
            };
            let path = PathBuf::from(path);
            match app
                .session
                .start_upload(path.clone(), app.llm.clone(), app.tx.clone())
            {
                Ok(_) => app.ui.notify(format!("Uploading {}...", path.display())),
                Err(e) => app.ui.fail(e.to_string()),
            }
        }
    }
}

/// Open the next field of the new-task form.
fn next_task_step(app: &mut App, id: InputCallbackId) {
    app.input_box = Some(InputBoxState::new(task_step_prompt(&id), "", id));
}

fn task_step_prompt(id: &InputCallbackId) -> &'static str {
    match id {
        InputCallbackId::NewTaskVideoKey => "Video key, e.g. videos/example.mp4 (optional):",
        InputCallbackId::NewTaskLinkName => "Link name (optional):",
        InputCallbackId::NewTaskSubmitDate => "Submit date, e.g. 2024-01-01 (optional):",
        InputCallbackId::NewTaskImageUrl => "Image URL (optional):",
        InputCallbackId::NewTaskVideoPath => "Video path (optional):",
        InputCallbackId::NewTaskPrompt => "Prompt (optional):",
        InputCallbackId::NewTaskCustomData => "Custom data as a JSON object (optional):",
        _ => "Task type:",
    }
}

/// Blank means no custom data; anything else must be a JSON object.
fn parse_custom_data(
    s: &str,
) -> Result<Option<serde_json::Map<String, serde_json::Value>>, serde_json::Error> {
    match non_blank(s) {
        Some(text) => serde_json::from_str(&text).map(Some),
        None => Ok(None),
    }
}

fn submit_draft(app: &mut App) {
    let draft = std::mem::take(&mut app.task_draft);
    match app.board.submit(draft) {
        Ok(()) => app.ui.notify("Submitting task..."),
        Err(e) => app.ui.fail(e.to_string()),
    }
}

fn non_blank(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::{pump, test_app};

    fn press(app: &mut App, code: KeyCode) -> bool {
        handle_key(app, KeyEvent::new(code, KeyModifiers::empty())).unwrap()
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    #[tokio::test]
    async fn submit_is_ignored_while_inference_runs() {
        let (mut app, _tasks, llm) = test_app();
        app.ui.screen = Screen::Inference;
        app.session.prompt = "describe".into();

        press(&mut app, KeyCode::Enter);
        assert!(app.session.loading);
        press(&mut app, KeyCode::Enter);
        assert!(app.ui.error.is_none());

        pump(&mut app).await;
        assert_eq!(llm.infer_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn blank_prompt_shows_validation_without_calling() {
        let (mut app, _tasks, llm) = test_app();
        app.ui.screen = Screen::Inference;

        press(&mut app, KeyCode::Enter);
        assert_eq!(app.ui.error.as_deref(), Some("enter a prompt first"));
        assert_eq!(
            app.session.validation.as_deref(),
            Some("enter a prompt first")
        );
        tokio::task::yield_now().await;
        assert!(llm.infer_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn prompt_is_entered_through_the_popup() {
        let (mut app, _tasks, _llm) = test_app();
        app.ui.screen = Screen::Inference;

        press(&mut app, KeyCode::Char('p'));
        assert!(app.input_box.is_some());
        type_text(&mut app, "what is this");
        press(&mut app, KeyCode::Enter);
        assert!(app.input_box.is_none());
        assert_eq!(app.session.prompt, "what is this");
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_detail_stops_polling() {
        let (mut app, tasks, _llm) = test_app();
        app.board.refresh();
        pump(&mut app).await;

        press(&mut app, KeyCode::Enter);
        assert_eq!(app.ui.screen, Screen::TaskDetail);
        assert_eq!(app.poller.task_id(), Some("t-1"));

        press(&mut app, KeyCode::Esc);
        assert_eq!(app.ui.screen, Screen::Tasks);
        assert!(app.poller.task_id().is_none());
        assert!(!app.poller.is_polling());

        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        assert!(tasks.fetched.lock().unwrap().len() <= 1);
    }

    #[tokio::test]
    async fn new_task_form_collects_fields_then_submits() {
        let (mut app, tasks, _llm) = test_app();

        press(&mut app, KeyCode::Char('a'));
        for field in [
            "VIDEO_ANALYSIS",
            "videos/example.mp4",
            "example-link",
            "2024-01-01",
            "https://example.com/image.jpg",
            "",
            "",
            r#"{"priority": 2}"#,
        ] {
            assert!(app.input_box.is_some());
            type_text(&mut app, field);
            press(&mut app, KeyCode::Enter);
        }
        assert!(app.input_box.is_none());

        pump(&mut app).await;
        assert_eq!(app.ui.status, "Created task created");
        let created = tasks.created.lock().unwrap();
        let req = &created[0];
        assert_eq!(req.task_type.as_deref(), Some("VIDEO_ANALYSIS"));
        assert_eq!(req.video_key.as_deref(), Some("videos/example.mp4"));
        assert_eq!(req.link_name.as_deref(), Some("example-link"));
        assert_eq!(req.submit_date.as_deref(), Some("2024-01-01"));
        assert_eq!(req.image_url.as_deref(), Some("https://example.com/image.jpg"));
        assert!(req.video_path.is_none());
        assert!(req.prompt.is_none());
        let custom = req.custom_data.as_ref().unwrap();
        assert_eq!(custom["priority"], 2);
    }

    #[tokio::test]
    async fn invalid_custom_data_reopens_the_field() {
        let (mut app, tasks, _llm) = test_app();

        press(&mut app, KeyCode::Char('a'));
        type_text(&mut app, "OCR");
        for _ in 0..7 {
            press(&mut app, KeyCode::Enter);
        }
        type_text(&mut app, "[1, 2]");
        press(&mut app, KeyCode::Enter);

        let input = app.input_box.as_ref().unwrap();
        assert_eq!(input.callback_id, InputCallbackId::NewTaskCustomData);
        assert_eq!(input.value, "[1, 2]");
        assert!(app.ui.error.is_some());
        assert_eq!(app.task_draft.task_type.as_deref(), Some("OCR"));
        tokio::task::yield_now().await;
        assert!(tasks.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_task_type_is_rejected_immediately() {
        let (mut app, tasks, _llm) = test_app();

        press(&mut app, KeyCode::Char('a'));
        press(&mut app, KeyCode::Enter);
        assert!(app.input_box.is_none());
        assert_eq!(app.ui.error.as_deref(), Some("task type is required"));
        tokio::task::yield_now().await;
        assert!(tasks.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn too_many_uploads_are_refused() {
        let (mut app, _tasks, _llm) = test_app();
        app.ui.screen = Screen::Inference;
        for i in 0..app.cfg.upload.max_files {
            app.session.uploads.insert_done(&format!("{i}.png"), "http://x");
        }

        press(&mut app, KeyCode::Char('o'));
        type_text(&mut app, "/tmp/one-more.png");
        press(&mut app, KeyCode::Enter);
        assert!(app.ui.error.is_some());
        assert_eq!(app.session.uploads.len(), app.cfg.upload.max_files);
    }
}
