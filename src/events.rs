//! 画面遷移用のUI状態と、バックグラウンド呼び出しの完了イベント。

use crate::{
    composer::InferenceEvent, monitor::MonitorEvent, poller::PollEvent, tasks::BoardEvent,
    uploads::UploadEvent,
};
use tokio::sync::mpsc;

/// ログの保持件数。超えた分は古いものから捨てる。
pub const LOG_CAPACITY: usize = 100;

/// TUIで現在表示中の画面。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Screen {
    /// フィルタとページ送り付きのタスク一覧画面。
    Tasks,
    /// 実行中はポーリングされるタスク詳細画面。
    TaskDetail,
    /// マルチモーダル推論画面。
    Inference,
}

/// 描画側と共有するUI状態。
#[derive(Clone, Debug)]
pub struct UiState {
    /// 現在の画面。
    pub screen: Screen,
    /// タスク一覧の選択行。
    pub selected: usize,
    /// 画像一覧の選択行。
    pub selected_upload: usize,
    /// 右側パネルに表示するログ。
    pub log: Vec<String>,
    /// 画面下部のステータス文言。
    pub status: String,
    /// エラーメッセージ（赤で強調表示）。
    pub error: Option<String>,
}

impl UiState {
    pub fn new(screen: Screen) -> Self {
        Self {
            screen,
            selected: 0,
            selected_upload: 0,
            log: vec![],
            status: "Ready".into(),
            error: None,
        }
    }

    /// ステータスバーに表示し、ログにも残す。
    pub fn notify(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        self.error = None;
        self.push_log(msg.clone());
        self.status = msg;
    }

    /// 失敗を赤で表示し、ログにも残す。
    pub fn fail(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        self.push_log(format!("error: {msg}"));
        self.error = Some(msg);
    }

    fn push_log(&mut self, entry: String) {
        // 末尾に追加し、上限を超えた分を先頭から捨てる。
        self.log.push(entry);
        if self.log.len() > LOG_CAPACITY {
            let excess = self.log.len() - LOG_CAPACITY;
            self.log.drain(..excess);
        }
    }
}

/// UIループが適用するリモート呼び出しの完了イベント。
#[derive(Debug)]
pub enum AppEvent {
    Poll(PollEvent),
    Board(BoardEvent),
    Upload(UploadEvent),
    Inference(InferenceEvent),
    Monitor(MonitorEvent),
}

/// リモート呼び出しをバックグラウンドで実行し、結果を必ず送信する。
///
/// 呼び出しは内側のタスクで実行するため、パニックしても `Err` として
/// 報告され、ローディング表示などの待ち状態がどの経路でも解除される。
pub fn spawn_reported<T, F>(
    tx: mpsc::Sender<AppEvent>,
    call: F,
    report: impl FnOnce(Result<T, String>) -> AppEvent + Send + 'static,
) where
    T: Send + 'static,
    F: Future<Output = Result<T, String>> + Send + 'static,
{
    tokio::spawn(async move {
        // パニックはJoinErrorとして受け取り、失敗結果に変換する。
        let outcome = match tokio::spawn(call).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("background call aborted: {e}");
                Err(format!("call aborted: {e}"))
            }
        };
        let _ = tx.send(report(outcome)).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_clears_previous_error() {
        let mut ui = UiState::new(Screen::Tasks);
        ui.fail("boom");
        assert_eq!(ui.error.as_deref(), Some("boom"));
        ui.notify("loaded 3 tasks");
        assert!(ui.error.is_none());
        assert_eq!(ui.status, "loaded 3 tasks");
        assert_eq!(ui.log, vec!["error: boom", "loaded 3 tasks"]);
    }

    #[test]
    fn log_keeps_only_the_newest_entries() {
        let mut ui = UiState::new(Screen::Tasks);
        for i in 0..LOG_CAPACITY + 5 {
            ui.notify(format!("event {i}"));
        }
        ui.fail("last");
        assert_eq!(ui.log.len(), LOG_CAPACITY);
        assert_eq!(ui.log[0], "event 6");
        assert_eq!(ui.log[LOG_CAPACITY - 1], "error: last");
    }
}
