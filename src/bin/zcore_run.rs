//! Minimal stdio front-end: loads a story file and drives `Interpreter`
//! with simple terminal-based `Screen`/`Input`/`Storage` adapters.

use std::io::Write;
use std::path::{Path, PathBuf};

use zcore::config::Config;
use zcore::io::{Input, Screen, Storage};
use zcore::vm::Game;
use zcore::{Interpreter, RunOutcome, VM};

struct StdioScreen;

impl Screen for StdioScreen {
    fn print(&mut self, text: &str) {
        print!("{text}");
        let _ = std::io::stdout().flush();
    }

    fn print_char(&mut self, ch: char) {
        print!("{ch}");
        let _ = std::io::stdout().flush();
    }

    fn new_line(&mut self) {
        println!();
    }

    fn show_status(&mut self, left: &str, right: &str) {
        eprintln!("[ {left} | {right} ]");
    }
}

struct StdioInput;

impl Input for StdioInput {
    fn read_line(&mut self, max_len: usize) -> String {
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return String::new();
        }
        line.truncate(max_len);
        line.trim_end_matches(['\n', '\r']).to_string()
    }

    fn read_char(&mut self) -> char {
        let mut buf = [0u8; 1];
        use std::io::Read;
        std::io::stdin().read_exact(&mut buf).unwrap_or(());
        buf[0] as char
    }
}

struct FileStorage {
    dir: PathBuf,
    extension: String,
}

impl Storage for FileStorage {
    fn save(&mut self, name: &str, data: &[u8]) -> Result<(), String> {
        let path = self.dir.join(format!("{name}.{}", self.extension));
        std::fs::write(&path, data).map_err(|e| e.to_string())
    }

    fn load(&mut self, name: &str) -> Result<Vec<u8>, String> {
        let path = self.dir.join(format!("{name}.{}", self.extension));
        std::fs::read(&path).map_err(|e| e.to_string())
    }
}

fn main() {
    let config = Config::load(Path::new("zcore.toml"));
    config.init_logging();

    let story_path = match std::env::args().nth(1) {
        Some(p) => p,
        None => {
            eprintln!("usage: zcore-run <story-file.z3>");
            std::process::exit(2);
        }
    };

    let memory = std::fs::read(&story_path).unwrap_or_else(|e| {
        eprintln!("failed to read {story_path}: {e}");
        std::process::exit(1);
    });

    let game = Game::from_memory(memory).unwrap_or_else(|e| {
        eprintln!("failed to load story file: {e}");
        std::process::exit(1);
    });

    let mut vm = VM::new(game);
    vm.max_call_depth = config.max_call_depth;

    let storage = FileStorage {
        dir: PathBuf::from("."),
        extension: config.save_extension.clone(),
    };

    let mut interpreter = Interpreter::new(vm, StdioScreen, StdioInput, storage, config);

    loop {
        match interpreter.run() {
            Ok(RunOutcome::Finished) => break,
            Ok(RunOutcome::Yielded) => continue,
            Err(e) => {
                eprintln!("fatal interpreter error: {e}");
                std::process::exit(1);
            }
        }
    }
}
