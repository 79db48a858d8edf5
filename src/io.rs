//! External interfaces the core needs from its host: a screen to print to,
//! a line/char input source, and persistent storage for save/restore
//! (spec.md §6). The core never assumes a terminal; production hosts
//! implement these traits with whatever UI they like.

use std::collections::VecDeque;

/// Where `print`/`print_char`/`new_line`/status-line opcodes send text.
pub trait Screen {
    fn print(&mut self, text: &str);
    fn print_char(&mut self, ch: char);
    fn new_line(&mut self);
    /// `show_status` (V3 only): left side (room/score text) and right side
    /// (score/moves or time), per spec.md §6.
    fn show_status(&mut self, left: &str, right: &str);
    fn split_window(&mut self, _lines: u16) {}
    fn set_window(&mut self, _window: u16) {}
}

/// Line and single-character input (`sread`/`read_char`).
pub trait Input {
    fn read_line(&mut self, max_len: usize) -> String;
    fn read_char(&mut self) -> char;
}

/// Save/restore persistence (spec.md §4.8). A host can back this with a
/// filesystem, a database row, or (in tests) plain memory.
pub trait Storage {
    fn save(&mut self, name: &str, data: &[u8]) -> Result<(), String>;
    fn load(&mut self, name: &str) -> Result<Vec<u8>, String>;
}

/// In-memory `Screen` that just accumulates everything printed, for tests
/// and headless hosts.
#[derive(Default)]
pub struct HeadlessScreen {
    pub transcript: String,
    pub last_status: Option<(String, String)>,
}

impl Screen for HeadlessScreen {
    fn print(&mut self, text: &str) {
        self.transcript.push_str(text);
    }

    fn print_char(&mut self, ch: char) {
        self.transcript.push(ch);
    }

    fn new_line(&mut self) {
        self.transcript.push('\n');
    }

    fn show_status(&mut self, left: &str, right: &str) {
        self.last_status = Some((left.to_string(), right.to_string()));
    }
}

/// `Input` fed from a fixed script of lines/chars, for deterministic tests.
#[derive(Default)]
pub struct ScriptedInput {
    lines: VecDeque<String>,
    chars: VecDeque<char>,
}

impl ScriptedInput {
    pub fn new(lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        ScriptedInput {
            lines: lines.into_iter().map(Into::into).collect(),
            chars: VecDeque::new(),
        }
    }

    pub fn push_char(&mut self, ch: char) {
        self.chars.push_back(ch);
    }
}

impl Input for ScriptedInput {
    fn read_line(&mut self, max_len: usize) -> String {
        let mut line = self.lines.pop_front().unwrap_or_default();
        line.truncate(max_len);
        line
    }

    fn read_char(&mut self) -> char {
        self.chars.pop_front().unwrap_or('\n')
    }
}

/// In-memory `Storage`, for tests that exercise save/restore without a
/// filesystem.
#[derive(Default)]
pub struct MemStorage {
    slots: std::collections::HashMap<String, Vec<u8>>,
}

impl Storage for MemStorage {
    fn save(&mut self, name: &str, data: &[u8]) -> Result<(), String> {
        self.slots.insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn load(&mut self, name: &str) -> Result<Vec<u8>, String> {
        self.slots
            .get(name)
            .cloned()
            .ok_or_else(|| format!("no save named {name:?}"))
    }
}
