//! Run configuration read from the environment.

use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jsonl,
    Sqlite,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "jsonl" | "json" => Some(OutputFormat::Jsonl),
            "sqlite" | "db" => Some(OutputFormat::Sqlite),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Jsonl => "jsonl",
            OutputFormat::Sqlite => "sqlite",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Root for relative weight source paths.
    pub data_dir: Option<PathBuf>,
    /// Root for relative event file paths.
    pub input_dir: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub output_format: OutputFormat,
    /// Stop after this many events; `None` reads everything.
    pub max_entries: Option<u64>,
    /// Write a record for every event, not only selected ones.
    pub write_all: bool,
    pub use_timers: bool,
    /// Events between progress log lines; 0 disables them.
    pub progress_interval: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            input_dir: None,
            output_dir: PathBuf::from("./out/skim"),
            output_format: OutputFormat::Jsonl,
            max_entries: None,
            write_all: false,
            use_timers: false,
            progress_interval: 100_000,
        }
    }
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes" | "on"))
}

impl Config {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            data_dir: std::env::var("DATA_DIR").ok().map(PathBuf::from),
            input_dir: std::env::var("INPUT_DIR").ok().map(PathBuf::from),
            output_dir: std::env::var("OUTPUT_DIR").map(PathBuf::from).unwrap_or(d.output_dir),
            output_format: std::env::var("OUTPUT_FORMAT")
                .ok()
                .and_then(|v| OutputFormat::parse(&v))
                .unwrap_or(d.output_format),
            max_entries: std::env::var("MAX_ENTRIES").ok().and_then(|v| v.parse().ok()),
            write_all: env_flag("WRITE_ALL").unwrap_or(d.write_all),
            use_timers: env_flag("USE_TIMERS").unwrap_or(d.use_timers),
            progress_interval: std::env::var("PROGRESS_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(d.progress_interval),
        }
    }

    /// Resolve an input path against `input_dir`.
    pub fn input_path(&self, path: &str) -> PathBuf {
        let p = PathBuf::from(path);
        match &self.input_dir {
            Some(dir) if p.is_relative() => dir.join(p),
            _ => p,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parse() {
        assert_eq!(OutputFormat::parse("SQLite"), Some(OutputFormat::Sqlite));
        assert_eq!(OutputFormat::parse("jsonl"), Some(OutputFormat::Jsonl));
        assert_eq!(OutputFormat::parse("root"), None);
    }

    #[test]
    fn test_input_path_resolution() {
        let cfg = Config {
            input_dir: Some(PathBuf::from("/store/skims")),
            ..Config::default()
        };
        assert_eq!(cfg.input_path("a.jsonl"), PathBuf::from("/store/skims/a.jsonl"));
        assert_eq!(cfg.input_path("/tmp/a.jsonl"), PathBuf::from("/tmp/a.jsonl"));
        assert_eq!(Config::default().input_path("a.jsonl"), PathBuf::from("a.jsonl"));
    }
}
