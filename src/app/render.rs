//! Drawing of the three screens.

use chrono::{DateTime, NaiveDateTime};
use ratatui::{
    Frame,
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Row, Table, TableState, Wrap},
};

use crate::{
    api::task::{TaskSnapshot, TaskStatus},
    events::Screen,
    input, layout,
    shortcuts::Shortcuts,
    uploads::{UploadEntry, UploadStatus},
};

use super::App;

pub fn draw(f: &mut Frame, app: &App) {
    let main_layout = layout::create_main_layout(f.area());

    match app.ui.screen {
        Screen::Tasks => draw_tasks(f, app, main_layout.body),
        Screen::TaskDetail => draw_detail(f, app, main_layout.body),
        Screen::Inference => draw_inference(f, app, main_layout.body),
    }

    let help_bar = Paragraph::new(help_text(app.ui.screen, &app.shortcuts))
        .block(Block::default().borders(Borders::ALL).title("HELP"))
        .wrap(Wrap { trim: true });
    f.render_widget(help_bar, main_layout.help_bar);

    f.render_widget(build_status_bar(app), main_layout.status_bar);

    if let Some(input_state) = &app.input_box {
        input::render_input_box(f, input_state);
    }
}

fn draw_tasks(f: &mut Frame, app: &App, area: Rect) {
    let body = layout::create_body_layout(area);

    let rows = app.board.tasks.iter().map(|t| {
        Row::new(vec![
            short_id(&t.task_id),
            t.task_type.clone().unwrap_or_else(|| "-".into()),
            t.status.to_string(),
            t.progress.map_or("-".into(), |p| format!("{p}%")),
            t.created_at.as_deref().map_or("-".into(), format_timestamp),
        ])
        .style(Style::default().fg(status_color(t.status)))
    });

    let title = if app.board.loading {
        "TASKS (loading...)"
    } else {
        "TASKS"
    };
    let table = Table::new(
        rows,
        [
            Constraint::Length(10),
            Constraint::Min(12),
            Constraint::Length(10),
            Constraint::Length(6),
            Constraint::Length(20),
        ],
    )
    .block(Block::default().borders(Borders::ALL).title(title))
    .header(Row::new(vec!["id", "type", "status", "prog", "created"]).bold())
    .row_highlight_style(
        Style::default()
            .bg(Color::Rgb(255, 140, 0))
            .fg(Color::Black)
            .add_modifier(Modifier::BOLD),
    );

    let mut table_state = TableState::default();
    if !app.board.tasks.is_empty() {
        table_state.select(Some(app.ui.selected));
    }
    f.render_stateful_widget(table, body.main, &mut table_state);

    let pages = app.board.total.div_ceil(u64::from(app.board.page_size)).max(1);
    let info = format!(
        "Status: {}\nType: {}\nPage: {}/{}\nTotal: {}\n{}\nLog:\n{}",
        app.board
            .filter
            .status
            .map_or("all".to_string(), |s| s.to_string()),
        app.board.filter.task_type.as_deref().unwrap_or("all"),
        app.board.page,
        pages,
        app.board.total,
        app.board
            .error
            .as_deref()
            .map_or(String::new(), |e| format!("Error: {e}\n")),
        recent_log(app),
    );
    let info_panel = Paragraph::new(info)
        .block(Block::default().borders(Borders::ALL).title("FILTER"))
        .wrap(Wrap { trim: true });
    f.render_widget(info_panel, body.side);
}

fn draw_detail(f: &mut Frame, app: &App, area: Rect) {
    let body = layout::create_body_layout(area);

    let text = match app.poller.snapshot() {
        Some(t) => snapshot_text(t),
        None if app.poller.error().is_some() => "Task could not be loaded.".to_string(),
        None => "Loading...".to_string(),
    };
    let detail = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title("TASK"))
        .wrap(Wrap { trim: false });
    f.render_widget(detail, body.main);

    let polling = if app.poller.is_loading() {
        "fetching"
    } else if app.poller.is_polling() {
        "waiting"
    } else {
        "stopped"
    };
    let mut side = format!(
        "Polling: {polling}\nEvery: {} ms\n",
        app.cfg.polling.interval_ms
    );
    if let Some(e) = app.poller.error() {
        side.push_str(&format!("\nError: {e}\nPress refresh to retry.\n"));
    }
    side.push_str(&format!("\nLog:\n{}", recent_log(app)));
    let side_panel = Paragraph::new(side)
        .block(Block::default().borders(Borders::ALL).title("POLL"))
        .wrap(Wrap { trim: true });
    f.render_widget(side_panel, body.side);
}

fn snapshot_text(t: &TaskSnapshot) -> String {
    let mut lines = vec![
        format!("Id:        {}", t.task_id),
        format!("Type:      {}", t.task_type.as_deref().unwrap_or("-")),
        format!("Status:    {}", t.status),
        format!(
            "Progress:  {}",
            t.progress.map_or("-".into(), |p| format!("{p}%"))
        ),
        format!("Created:   {}", opt_time(t.created_at.as_deref())),
        format!("Updated:   {}", opt_time(t.updated_at.as_deref())),
        format!("Completed: {}", opt_time(t.completed_at.as_deref())),
    ];
    if let Some(key) = &t.video_key {
        lines.push(format!("Video key: {key}"));
    }
    if let Some(e) = &t.error_message {
        lines.push(String::new());
        lines.push(format!("Error: {e}"));
    }
    if let Some(result) = &t.result {
        lines.push(String::new());
        lines.push("Result:".into());
        lines.push(serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string()));
    }
    lines.join("\n")
}

fn draw_inference(f: &mut Frame, app: &App, area: Rect) {
    let areas = layout::create_inference_layout(area);
    let monitor = &app.monitor;
    let session = &app.session;

    let service_name = monitor
        .info
        .as_ref()
        .map_or("inference service".to_string(), |i| {
            format!("{} {}", i.service, i.version)
        });
    let state = if monitor.loading {
        ("checking...", Color::Yellow)
    } else if monitor.available {
        ("available", Color::Green)
    } else {
        ("unavailable", Color::Red)
    };
    let service = Paragraph::new(vec![
        Line::from(vec![
            Span::raw(format!("{service_name}: ")),
            Span::styled(state.0, Style::default().fg(state.1)),
        ]),
        Line::from(format!(
            "Model: {} ({} known)",
            monitor.selected.as_deref().unwrap_or("server default"),
            monitor.models.len()
        )),
    ])
    .block(Block::default().borders(Borders::ALL).title("SERVICE"));
    f.render_widget(service, areas.service);

    let mut inputs = vec![
        Line::from(format!("Prompt: {}", or_dash(&session.prompt))),
        Line::from(format!("Image URL: {}", or_dash(&session.extra_url))),
    ];
    if let Some(v) = &session.validation {
        inputs.push(Line::styled(v.clone(), Style::default().fg(Color::Yellow)));
    }
    let inputs = Paragraph::new(inputs)
        .block(Block::default().borders(Borders::ALL).title("REQUEST"))
        .wrap(Wrap { trim: true });
    f.render_widget(inputs, areas.inputs);

    let items: Vec<ListItem> = session.uploads.entries().map(upload_item).collect();
    let pending = session.uploads.pending_count();
    let title = if pending > 0 {
        format!("IMAGES ({pending} uploading)")
    } else {
        format!("IMAGES ({}/{})", session.uploads.len(), app.cfg.upload.max_files)
    };
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    let mut list_state = ListState::default();
    if !session.uploads.is_empty() {
        list_state.select(Some(app.ui.selected_upload));
    }
    f.render_stateful_widget(list, areas.uploads, &mut list_state);

    let mut out: Vec<Line> = Vec::new();
    if session.loading {
        out.push(Line::styled("Running...", Style::default().fg(Color::Yellow)));
    }
    if let Some(e) = &session.error {
        out.push(Line::styled(format!("Error: {e}"), Style::default().fg(Color::Red)));
    }
    if let Some(result) = &session.result {
        out.extend(result.lines().map(|l| Line::from(l.to_string())));
    }
    if let Some(t) = &session.tokens {
        out.push(Line::from(""));
        out.push(Line::from(format!(
            "Tokens: in {} / out {} / total {}",
            opt_num(t.input),
            opt_num(t.output),
            opt_num(t.total)
        )));
    }
    if let Some(ocr) = &session.ocr_text {
        out.push(Line::from(""));
        out.push(Line::styled(
            "OCR text (sent with the next request):",
            Style::default().fg(Color::Cyan),
        ));
        out.extend(ocr.lines().map(|l| Line::from(l.to_string())));
    }
    let result = Paragraph::new(out)
        .block(Block::default().borders(Borders::ALL).title("RESULT"))
        .wrap(Wrap { trim: false });
    f.render_widget(result, areas.result);
}

fn upload_item(e: &UploadEntry) -> ListItem<'static> {
    let (state, color) = match &e.status {
        UploadStatus::Pending => ("uploading".to_string(), Color::Yellow),
        UploadStatus::Done { .. } => ("ok".to_string(), Color::Green),
        UploadStatus::Error(msg) => (format!("error: {msg}"), Color::Red),
    };
    let quality = e.quality.as_ref().map_or(String::new(), |q| {
        format!(" {}x{} {} {}", q.width, q.height, q.resolution, q.quality)
    });
    ListItem::new(Line::from(vec![
        Span::raw(e.filename.clone()),
        Span::styled(format!(" [{state}]"), Style::default().fg(color)),
        Span::raw(quality),
    ]))
}

fn build_status_bar(app: &App) -> Paragraph<'static> {
    let screen_name = match app.ui.screen {
        Screen::Tasks => "Tasks",
        Screen::TaskDetail => "Task",
        Screen::Inference => "Inference",
    };

    let status_text = if let Some(err) = &app.ui.error {
        format!("[{screen_name}] ERROR: {err}")
    } else {
        format!("[{screen_name}] {}", app.ui.status)
    };

    let mut status_bar = Paragraph::new(status_text)
        .block(Block::default().borders(Borders::ALL).title("STATUS"))
        .wrap(Wrap { trim: true });
    if app.ui.error.is_some() {
        status_bar = status_bar.style(Style::default().fg(Color::Red));
    }
    status_bar
}

fn help_text(screen: Screen, sc: &Shortcuts) -> String {
    match screen {
        Screen::Tasks => format!(
            "{}: quit | {}: refresh | {}: open | {}/{}: page | {}: status | {}: type | {}: reset | {}: new | {}: inference",
            format_keys(&sc.tasks.quit),
            format_keys(&sc.tasks.refresh),
            format_keys(&sc.tasks.open),
            format_keys(&sc.tasks.prev_page),
            format_keys(&sc.tasks.next_page),
            format_keys(&sc.tasks.status_filter),
            format_keys(&sc.tasks.type_filter),
            format_keys(&sc.tasks.reset_filter),
            format_keys(&sc.tasks.new_task),
            format_keys(&sc.tasks.inference),
        ),
        Screen::TaskDetail => format!(
            "{}: back | {}: refresh | {}: cancel task",
            format_keys(&sc.detail.back),
            format_keys(&sc.detail.refresh),
            format_keys(&sc.detail.cancel_task),
        ),
        Screen::Inference => format!(
            "{}: prompt | {}: url | {}: upload | {}: remove | {}/{}: model | {}: run | {}: clear | {}: health | {}: back",
            format_keys(&sc.inference.prompt),
            format_keys(&sc.inference.image_url),
            format_keys(&sc.inference.upload),
            format_keys(&sc.inference.remove),
            format_keys(&sc.inference.next_model),
            format_keys(&sc.inference.prev_model),
            format_keys(&sc.inference.submit),
            format_keys(&sc.inference.clear),
            format_keys(&sc.inference.health),
            format_keys(&sc.inference.back),
        ),
    }
}

fn format_keys(keys: &[String]) -> String {
    keys.join("/")
}

fn recent_log(app: &App) -> String {
    let skip = app.ui.log.len().saturating_sub(8);
    app.ui.log[skip..].join("\n")
}

fn status_color(s: TaskStatus) -> Color {
    match s {
        TaskStatus::Pending => Color::Gray,
        TaskStatus::Running => Color::Yellow,
        TaskStatus::Completed => Color::Green,
        TaskStatus::Failed => Color::Red,
        TaskStatus::Cancelled => Color::DarkGray,
    }
}

/// First 8 chars of an id, enough to tell rows apart.
fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

/// Render a server timestamp as local-looking `YYYY-MM-DD HH:MM:SS`.
///
/// Accepts RFC 3339 and zone-less ISO timestamps; anything else is shown as is.
fn format_timestamp(raw: &str) -> String {
    const OUT: &str = "%Y-%m-%d %H:%M:%S";
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.format(OUT).to_string();
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return dt.format(OUT).to_string();
    }
    raw.to_string()
}

fn opt_time(raw: Option<&str>) -> String {
    raw.map_or("-".into(), format_timestamp)
}

fn opt_num(n: Option<u64>) -> String {
    n.map_or("-".into(), |n| n.to_string())
}

fn or_dash(s: &str) -> &str {
    if s.trim().is_empty() { "-" } else { s }
}
