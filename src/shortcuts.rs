//! ショートカット設定の管理。

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// ショートカット設定の全体（画面ごとのセクション）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shortcuts {
    pub tasks: TasksShortcuts,
    pub detail: DetailShortcuts,
    pub inference: InferenceShortcuts,
    pub input_box: InputBoxShortcuts,
}

/// タスク一覧画面のショートカット。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksShortcuts {
    pub quit: Vec<String>,
    pub refresh: Vec<String>,
    pub open: Vec<String>,
    pub down: Vec<String>,
    pub up: Vec<String>,
    pub next_page: Vec<String>,
    pub prev_page: Vec<String>,
    pub status_filter: Vec<String>,
    pub type_filter: Vec<String>,
    pub reset_filter: Vec<String>,
    pub new_task: Vec<String>,
    pub inference: Vec<String>,
}

/// タスク詳細画面のショートカット。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailShortcuts {
    pub back: Vec<String>,
    pub refresh: Vec<String>,
    pub cancel_task: Vec<String>,
}

/// 推論画面のショートカット。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceShortcuts {
    pub back: Vec<String>,
    pub prompt: Vec<String>,
    pub image_url: Vec<String>,
    pub upload: Vec<String>,
    pub remove: Vec<String>,
    pub down: Vec<String>,
    pub up: Vec<String>,
    pub next_model: Vec<String>,
    pub prev_model: Vec<String>,
    pub submit: Vec<String>,
    pub clear: Vec<String>,
    pub health: Vec<String>,
}

/// InputBoxのショートカット。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputBoxShortcuts {
    pub confirm: Vec<String>,
    pub cancel: Vec<String>,
    pub backspace: Vec<String>,
    pub delete: Vec<String>,
    pub left: Vec<String>,
    pub right: Vec<String>,
    pub home: Vec<String>,
    pub end: Vec<String>,
    pub clear_line: Vec<String>,
}

impl Shortcuts {
    /// TOMLから読み込み、無ければデフォルトを返す。
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            // 既存ファイルを読み込んでパースする。
            let content = std::fs::read_to_string(path)?;
            let shortcuts: Shortcuts = toml::from_str(&content)?;
            Ok(shortcuts)
        } else {
            // 未作成の場合は既定値を利用する。
            Ok(Self::default())
        }
    }
}

/// 既定値の記述を短くするための補助。
fn keys(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for Shortcuts {
    fn default() -> Self {
        Self {
            tasks: TasksShortcuts {
                quit: keys(&["q"]),
                refresh: keys(&["r"]),
                open: keys(&["Enter"]),
                down: keys(&["Down", "j"]),
                up: keys(&["Up", "k"]),
                next_page: keys(&["Right", "n"]),
                prev_page: keys(&["Left", "p"]),
                status_filter: keys(&["s"]),
                type_filter: keys(&["f"]),
                reset_filter: keys(&["x"]),
                new_task: keys(&["a"]),
                inference: keys(&["i", "Tab"]),
            },
            detail: DetailShortcuts {
                back: keys(&["Esc", "q"]),
                refresh: keys(&["r"]),
                cancel_task: keys(&["c"]),
            },
            inference: InferenceShortcuts {
                back: keys(&["Esc", "Tab"]),
                prompt: keys(&["p"]),
                image_url: keys(&["u"]),
                upload: keys(&["o"]),
                remove: keys(&["d", "Delete"]),
                down: keys(&["Down", "j"]),
                up: keys(&["Up", "k"]),
                next_model: keys(&["m"]),
                prev_model: keys(&["M"]),
                submit: keys(&["Enter", "Ctrl+s"]),
                clear: keys(&["Ctrl+l"]),
                health: keys(&["h"]),
            },
            input_box: InputBoxShortcuts {
                confirm: keys(&["Enter"]),
                cancel: keys(&["Esc"]),
                backspace: keys(&["Backspace"]),
                delete: keys(&["Delete"]),
                left: keys(&["Left"]),
                right: keys(&["Right"]),
                home: keys(&["Home"]),
                end: keys(&["End"]),
                clear_line: keys(&["Ctrl+u"]),
            },
        }
    }
}

/// KeyEventがいずれかのショートカット文字列と一致するか判定する。
pub fn matches_shortcut(key: &KeyEvent, shortcuts: &[String]) -> bool {
    shortcuts.iter().any(|s| matches_single_shortcut(key, s))
}

/// KeyEventが単一のショートカット文字列と一致するか判定する。
fn matches_single_shortcut(key: &KeyEvent, shortcut: &str) -> bool {
    // ショートカット文字列を分解する（例: "Ctrl+u", "a", "Enter"）。
    let parts: Vec<&str> = shortcut.split('+').collect();

    let (modifiers_str, key_str) = if parts.len() > 1 {
        // 修飾キー付きの形式（例: "Ctrl+u"）。
        (&parts[0..parts.len() - 1], parts[parts.len() - 1])
    } else {
        // 修飾キーなしの形式（例: "a", "Enter"）。
        (&[][..], parts[0])
    };

    // 修飾キーを解析して期待値を作る。
    let mut expected_modifiers = KeyModifiers::empty();
    for modifier in modifiers_str {
        match *modifier {
            "Ctrl" | "ctrl" => expected_modifiers |= KeyModifiers::CONTROL,
            "Alt" | "alt" => expected_modifiers |= KeyModifiers::ALT,
            "Shift" | "shift" => expected_modifiers |= KeyModifiers::SHIFT,
            _ => return false,
        }
    }

    // 大文字はSHIFT付きでもなしでも届く端末があるため、修飾キーなしの
    // 大文字バインドは両方を受け付ける。
    let bare_upper = modifiers_str.is_empty()
        && key_str.len() == 1
        && key_str.chars().all(|c| c.is_ascii_uppercase());
    let modifiers_ok = key.modifiers == expected_modifiers
        || (bare_upper && key.modifiers == KeyModifiers::SHIFT);
    // 修飾キーが一致しなければ即座に不一致とする。
    if !modifiers_ok {
        return false;
    }

    // キーコードの種別ごとに一致判定を行う。
    match key_str {
        "Enter" | "enter" => key.code == KeyCode::Enter,
        "Esc" | "esc" => key.code == KeyCode::Esc,
        "Tab" | "tab" => key.code == KeyCode::Tab,
        "Backspace" | "backspace" => key.code == KeyCode::Backspace,
        "Delete" | "delete" => key.code == KeyCode::Delete,
        "Up" | "up" => key.code == KeyCode::Up,
        "Down" | "down" => key.code == KeyCode::Down,
        "Left" | "left" => key.code == KeyCode::Left,
        "Right" | "right" => key.code == KeyCode::Right,
        "Home" | "home" => key.code == KeyCode::Home,
        "End" | "end" => key.code == KeyCode::End,
        // 単一文字は Char として比較する。
        s if s.len() == 1 => {
            if let Some(c) = s.chars().next() {
                key.code == KeyCode::Char(c)
            } else {
                false
            }
        }
        _ => false,
    }
}
