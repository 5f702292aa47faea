//! レイアウト計算のヘルパー関数

use ratatui::prelude::*;

/// メインレイアウトの3つの領域
pub struct MainLayout {
    /// 画面本体の領域
    pub body: Rect,
    /// HELPバーの領域
    pub help_bar: Rect,
    /// STATUSバーの領域
    pub status_bar: Rect,
}

/// ボディ部の2つの領域（メインテーブル + サイドパネル）
pub struct BodyLayout {
    /// タスク一覧や詳細の領域
    pub main: Rect,
    /// アクティビティログの領域
    pub side: Rect,
}

/// 推論画面の領域
pub struct InferenceLayout {
    /// サービス状態と選択中モデル
    pub service: Rect,
    /// プロンプトと追加画像URL
    pub inputs: Rect,
    /// アップロード済み画像の一覧
    pub uploads: Rect,
    /// 推論結果、トークン数、引き継ぎOCRテキスト
    pub result: Rect,
}

/// メイン画面を3つの領域に分割（Body + HELP + STATUS）
pub fn create_main_layout(area: Rect) -> MainLayout {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),    // Body
            Constraint::Length(3), // HELP
            Constraint::Length(3), // STATUS
        ])
        .split(area);

    MainLayout {
        body: chunks[0],
        help_bar: chunks[1],
        status_bar: chunks[2],
    }
}

/// ボディ部を左右に分割（70% / 30%）
pub fn create_body_layout(area: Rect) -> BodyLayout {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
        .split(area);

    BodyLayout {
        main: chunks[0],
        side: chunks[1],
    }
}

/// 推論画面を分割（左: 状態・入力・画像、右: 結果）
pub fn create_inference_layout(area: Rect) -> InferenceLayout {
    // 左右の列に分ける。
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(area);
    // 左列を上から順に積む。
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // サービス状態
            Constraint::Length(6), // 入力
            Constraint::Min(3),    // 画像一覧
        ])
        .split(columns[0]);

    InferenceLayout {
        service: left[0],
        inputs: left[1],
        uploads: left[2],
        result: columns[1],
    }
}
