//! TUI内での文字列入力コンポーネント（InputBox）。

use ratatui::{
    layout::Alignment,
    prelude::*,
    widgets::{Block, Borders, Clear, Paragraph},
};

/// InputBox入力状態
#[derive(Clone, Debug)]
pub struct InputBoxState {
    /// プロンプトメッセージ
    pub prompt: String,
    /// 現在の入力値
    pub value: String,
    /// カーソル位置（文字単位）
    pub cursor: usize,
    /// 入力完了時のコールバック識別子
    pub callback_id: InputCallbackId,
}

/// 入力完了時のコールバック識別子
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputCallbackId {
    // タスク一覧画面用
    TypeFilter,
    // 新規タスクフォーム（この順に入力する）
    NewTaskType,
    NewTaskVideoKey,
    NewTaskLinkName,
    NewTaskSubmitDate,
    NewTaskImageUrl,
    NewTaskVideoPath,
    NewTaskPrompt,
    NewTaskCustomData,

    // 推論画面用
    Prompt,
    ImageUrl,
    UploadPath,
}

impl InputBoxState {
    /// 初期値を入れた状態で開く。カーソルは末尾。
    pub fn new(prompt: impl Into<String>, value: &str, callback_id: InputCallbackId) -> Self {
        Self {
            prompt: prompt.into(),
            value: value.to_string(),
            cursor: value.chars().count(),
            callback_id,
        }
    }

    /// 文字位置 `idx` のバイトオフセット（範囲外なら末尾）
    fn byte_at(&self, idx: usize) -> usize {
        self.value
            .char_indices()
            .nth(idx)
            .map_or(self.value.len(), |(b, _)| b)
    }

    fn char_len(&self) -> usize {
        self.value.chars().count()
    }

    /// 文字を挿入
    pub fn insert_char(&mut self, c: char) {
        // カーソル位置をバイト単位に直して挿入する。
        let at = self.byte_at(self.cursor);
        self.value.insert(at, c);
        // 挿入した分だけカーソルを進める。
        self.cursor += 1;
    }

    /// Backspace（カーソル前の文字を削除）
    pub fn backspace(&mut self) {
        // カーソルが先頭なら何もしない。
        if self.cursor > 0 {
            // 先にカーソルを左へ移し、その位置の文字を消す。
            self.cursor -= 1;
            let at = self.byte_at(self.cursor);
            self.value.remove(at);
        }
    }

    /// Delete（カーソル位置の文字を削除）
    pub fn delete(&mut self) {
        // カーソルが末尾なら何もしない。
        if self.cursor < self.char_len() {
            let at = self.byte_at(self.cursor);
            self.value.remove(at);
        }
    }

    /// カーソルを左に移動
    pub fn move_left(&mut self) {
        // 先頭より左へは移動しない。
        self.cursor = self.cursor.saturating_sub(1);
    }

    /// カーソルを右に移動
    pub fn move_right(&mut self) {
        // 末尾を超えないようにする。
        if self.cursor < self.char_len() {
            self.cursor += 1;
        }
    }

    /// カーソルを先頭に移動
    pub fn move_home(&mut self) {
        self.cursor = 0;
    }

    /// カーソルを末尾に移動
    pub fn move_end(&mut self) {
        self.cursor = self.char_len();
    }

    /// 行全体をクリア
    pub fn clear_line(&mut self) {
        // 入力値を空にし、カーソルも先頭へ。
        self.value.clear();
        self.cursor = 0;
    }

    /// 表示幅 `width` に収まる部分を切り出し、カーソル位置に `|` を入れる。
    fn visible_with_cursor(&self, width: usize) -> String {
        // カーソルが表示幅を超えた分だけ横スクロールする。
        let scroll = self.cursor.saturating_sub(width.saturating_sub(2));
        // 可視範囲の文字を切り出す。
        let mut out: String = self.value.chars().skip(scroll).take(width).collect();
        // 可視範囲内でのカーソル位置に `|` を挿入する。
        let at = out
            .char_indices()
            .nth(self.cursor - scroll)
            .map_or(out.len(), |(b, _)| b);
        out.insert(at, '|');
        out
    }
}

/// InputBoxをポップアップとして描画
pub fn render_input_box(f: &mut Frame, state: &InputBoxState) {
    // 中央に配置されたポップアップ領域を計算する。
    let popup_area = centered_popup(f.area(), 70, 7);

    // 既存の描画を消してポップアップ用の背景にする。
    f.render_widget(Clear, popup_area);

    // ポップアップの外枠とスタイルを描画する。
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Input")
        .style(Style::default().bg(Color::DarkGray));
    f.render_widget(block, popup_area);

    // 内部レイアウト（プロンプト + 入力フィールド + ヘルプ）を定義する。
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(1), // プロンプト
            Constraint::Length(1), // 入力フィールド
            Constraint::Length(1), // 空行
            Constraint::Length(1), // ヘルプ
        ])
        .split(popup_area);

    // プロンプトメッセージを描画する。
    let prompt = Paragraph::new(state.prompt.clone()).style(
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    );
    f.render_widget(prompt, rows[0]);

    // 文字列とカーソルを含む入力欄を描画する。
    let value = Paragraph::new(state.visible_with_cursor(rows[1].width as usize))
        .style(Style::default().fg(Color::Green));
    f.render_widget(value, rows[1]);

    // 操作ヘルプを中央寄せで表示する。
    let help = Paragraph::new("Enter=confirm | Esc=cancel | Ctrl+U=clear")
        .style(Style::default().fg(Color::Gray))
        .alignment(Alignment::Center);
    f.render_widget(help, rows[3]);
}

/// 中央配置のポップアップ領域を計算
fn centered_popup(area: Rect, width_percent: u16, height: u16) -> Rect {
    // 縦方向に上下の余白と本体を割り当てる。
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length((area.height.saturating_sub(height)) / 2),
            Constraint::Length(height),
            Constraint::Min(0),
        ])
        .split(area);

    // 横方向に左右の余白と本体を割り当て、中央を返す。
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - width_percent) / 2),
            Constraint::Percentage(width_percent),
            Constraint::Percentage((100 - width_percent) / 2),
        ])
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed(value: &str) -> InputBoxState {
        InputBoxState::new("Prompt:", value, InputCallbackId::Prompt)
    }

    #[test]
    fn opens_with_cursor_at_end() {
        // 初期値の文字数（バイト数ではない）がカーソル位置になる。
        let b = boxed("héllo");
        assert_eq!(b.cursor, 5);
    }

    #[test]
    fn edits_multibyte_text_at_the_cursor() {
        let mut b = boxed("画像");
        // 2文字の間に挿入する。
        b.move_left();
        b.insert_char('の');
        assert_eq!(b.value, "画の像");
        // 挿入した文字をBackspaceで消す。
        b.backspace();
        assert_eq!(b.value, "画像");
        // 先頭でDeleteすると1文字目が消える。
        b.move_home();
        b.delete();
        assert_eq!(b.value, "像");
        assert_eq!(b.cursor, 0);
    }

    #[test]
    fn cursor_stays_in_bounds() {
        let mut b = boxed("ab");
        // 末尾より右へは進まず、末尾のDeleteは何もしない。
        b.move_right();
        assert_eq!(b.cursor, 2);
        b.delete();
        assert_eq!(b.value, "ab");
        // 先頭より左へは進まず、先頭のBackspaceは何もしない。
        b.move_home();
        b.move_left();
        b.backspace();
        assert_eq!((b.value.as_str(), b.cursor), ("ab", 0));
        // クリアで値とカーソルが初期化される。
        b.clear_line();
        assert_eq!((b.value.as_str(), b.cursor), ("", 0));
    }

    #[test]
    fn long_values_scroll_to_keep_the_cursor_visible() {
        // 末尾カーソルの長い値は右端が見えるようにスクロールする。
        let b = boxed("abcdefghij");
        assert_eq!(b.visible_with_cursor(6), "ghij|");
        // 先頭カーソルならスクロールしない。
        let mut b = boxed("abc");
        b.move_home();
        assert_eq!(b.visible_with_cursor(10), "|abc");
    }
}
