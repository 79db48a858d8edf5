//! Interpreter-level configuration, separate from story-file data.
//!
//! Loaded from an optional `zcore.toml`; every field has a sane default so
//! the interpreter runs with no config file present at all.

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum call-frame depth before a fatal `FrameOverflow`.
    pub max_call_depth: usize,
    /// Maximum per-frame evaluation stack depth.
    pub max_eval_stack: usize,
    /// Instructions executed between yields to the host (spec.md §5).
    pub yield_interval: u64,
    /// Default extension used when the host doesn't specify one for saves.
    pub save_extension: String,
    /// `log` level filter to install if the host hasn't configured one.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_call_depth: 1024,
            max_eval_stack: 1024,
            yield_interval: 100,
            save_extension: "sav".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Load from a TOML file, falling back to defaults for any missing
    /// keys and for a missing file entirely.
    pub fn load(path: &Path) -> Config {
        match std::fs::read_to_string(path) {
            Ok(text) => toml::from_str(&text).unwrap_or_default(),
            Err(_) => Config::default(),
        }
    }

    /// Install an `env_logger` using `self.log_level` unless `RUST_LOG` is
    /// already set in the environment.
    pub fn init_logging(&self) {
        if std::env::var("RUST_LOG").is_err() {
            std::env::set_var("RUST_LOG", &self.log_level);
        }
        let _ = env_logger::try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let c = Config::default();
        assert_eq!(c.max_call_depth, 1024);
        assert_eq!(c.yield_interval, 100);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let c = Config::load(Path::new("/nonexistent/zcore.toml"));
        assert_eq!(c.max_eval_stack, 1024);
    }
}
