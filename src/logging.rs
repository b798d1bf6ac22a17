//! Structured logging for skim runs.
//!
//! Design goals:
//! 1. Multi-level granularity (TRACE → FATAL)
//! 2. Domain categories for filtering (setup, pipeline, weights, ...)
//! 3. One run directory per process with JSONL event and trace streams
//! 4. Reproducibility support via configuration fingerprints

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("info") => Level::Info,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            Ok("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains (categories for filtering)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Setup,    // Pipeline construction, operator configuration
    Pipeline, // Per-event evaluation
    Weights,  // Weight source loading
    Driver,   // Event loop progress
    Output,   // Sinks
    Profile,  // Operator timing
    System,   // Startup, shutdown
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Setup => "setup",
            Domain::Pipeline => "pipeline",
            Domain::Weights => "weights",
            Domain::Driver => "driver",
            Domain::Output => "output",
            Domain::Profile => "profile",
            Domain::System => "system",
        }
    }

    pub fn is_enabled(&self) -> bool {
        // LOG_DOMAINS: comma-separated list or "all"
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    events: Option<Mutex<BufWriter<File>>>,
    trace: Option<Mutex<BufWriter<File>>>,
}

fn open_stream(path: PathBuf) -> Option<Mutex<BufWriter<File>>> {
    match File::create(&path) {
        Ok(f) => Some(Mutex::new(BufWriter::new(f))),
        Err(err) => {
            eprintln!("[log] failed to create {}: {}", path.display(), err);
            None
        }
    }
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let base = std::env::var("LOG_DIR").unwrap_or_else(|_| "out/runs".to_string());
        let mut run_dir = PathBuf::from(base);
        run_dir.push(&run_id);
        if let Err(err) = create_dir_all(&run_dir) {
            eprintln!("[log] failed to create run dir: {}", err);
        }

        let _ = std::fs::write(
            run_dir.join("manifest.json"),
            json!({
                "run_id": run_id,
                "ts": ts_now(),
                "pid": process::id(),
                "log_dir": run_dir.to_string_lossy(),
            })
            .to_string(),
        );

        RunContext {
            events: open_stream(run_dir.join("events.jsonl")),
            trace: open_stream(run_dir.join("trace.jsonl")),
            run_id,
        }
    })
}

fn write_line(writer: &Option<Mutex<BufWriter<File>>>, line: &str) {
    if let Some(writer) = writer {
        if let Ok(mut w) = writer.lock() {
            let _ = writeln!(w, "{}", line);
        }
    }
}

/// Flush buffered log streams (call before process exit).
pub fn flush() {
    if let Some(ctx) = RUN_CONTEXT.get() {
        for stream in [&ctx.events, &ctx.trace].into_iter().flatten() {
            if let Ok(mut w) = stream.lock() {
                let _ = w.flush();
            }
        }
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Epoch milliseconds
pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    let min_level = Level::from_env();
    if level < min_level || !domain.is_enabled() {
        return;
    }

    emit_record(level, domain, event, fields);
}

fn emit_record(level: Level, domain: Domain, event: &str, mut fields: Map<String, Value>) {
    let ctx = ensure_run_context();

    let msg = fields.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(ctx.run_id.clone()));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(domain.as_str()));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for key in ["pipeline", "operator"] {
        if let Some(value) = fields.remove(key) {
            entry.insert(key.to_string(), value);
        }
    }
    entry.insert("data".to_string(), Value::Object(fields));

    let line = Value::Object(entry).to_string();
    match level {
        Level::Trace | Level::Debug => write_line(&ctx.trace, &line),
        _ => write_line(&ctx.events, &line),
    }
    if level >= Level::Info {
        eprintln!("{}", line);
    }
}

// =============================================================================
// Domain-Specific Logging Helpers
// =============================================================================

pub fn log_operator_added(pipeline: &str, operator: &str, kind: &str, index: usize) {
    log(
        Level::Debug,
        Domain::Setup,
        "operator_added",
        obj(&[
            ("pipeline", v_str(pipeline)),
            ("operator", v_str(operator)),
            ("kind", v_str(kind)),
            ("index", json!(index)),
        ]),
    );
}

pub fn log_operator_removed(pipeline: &str, operator: &str) {
    log(
        Level::Debug,
        Domain::Setup,
        "operator_removed",
        obj(&[("pipeline", v_str(pipeline)), ("operator", v_str(operator))]),
    );
}

pub fn log_pipeline_started(pipeline: &str, operators: &[String], variations: &[String], config_hash: &str) {
    log(
        Level::Info,
        Domain::Setup,
        "pipeline_started",
        obj(&[
            ("pipeline", v_str(pipeline)),
            ("operators", Value::Array(operators.iter().map(|s| v_str(s)).collect())),
            ("variations", Value::Array(variations.iter().map(|s| v_str(s)).collect())),
            ("config_hash", v_str(config_hash)),
        ]),
    );
}

pub fn log_weight_load(path: &str, name: &str, sha256: &str) {
    log(
        Level::Info,
        Domain::Weights,
        "table_loaded",
        obj(&[
            ("path", v_str(path)),
            ("name", v_str(name)),
            ("sha256", v_str(sha256)),
        ]),
    );
}

pub fn log_progress(events: u64, elapsed_ms: f64) {
    log(
        Level::Info,
        Domain::Driver,
        "progress",
        obj(&[("events", json!(events)), ("elapsed_ms", v_num(elapsed_ms))]),
    );
}

pub fn log_cutflow(pipeline: &str, rows: &[(String, u64, u64, u64)]) {
    let rows: Vec<Value> = rows
        .iter()
        .map(|(name, evaluated, passed, surviving)| {
            json!({
                "operator": name,
                "evaluated": evaluated,
                "passed": passed,
                "surviving": surviving,
            })
        })
        .collect();
    log(
        Level::Info,
        Domain::Pipeline,
        "cutflow",
        obj(&[("pipeline", v_str(pipeline)), ("rows", Value::Array(rows))]),
    );
}

pub fn log_run_summary(sample: &str, events: u64, selected: &[(String, u64)], elapsed_ms: f64) {
    let sel: Map<String, Value> = selected
        .iter()
        .map(|(k, v)| (k.clone(), json!(v)))
        .collect();
    log(
        Level::Info,
        Domain::System,
        "run_summary",
        obj(&[
            ("sample", v_str(sample)),
            ("events", json!(events)),
            ("selected", Value::Object(sel)),
            ("elapsed_ms", v_num(elapsed_ms)),
        ]),
    );
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Stable hex fingerprint of a configuration string.
pub fn params_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(&digest[..8])
}

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Profiling Scope
// =============================================================================

/// Profiling scope that emits structured timing on drop.
pub struct ProfileScope {
    label: &'static str,
    context: Map<String, Value>,
    started: Instant,
}

impl ProfileScope {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            context: Map::new(),
            started: Instant::now(),
        }
    }

    pub fn with_context(label: &'static str, fields: &[(&str, Value)]) -> Self {
        Self {
            label,
            context: obj(fields),
            started: Instant::now(),
        }
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let mut fields = std::mem::take(&mut self.context);
        fields.insert("label".to_string(), v_str(self.label));
        fields.insert("elapsed_ms".to_string(), v_num(elapsed_ms));
        log(Level::Trace, Domain::Profile, "profile", fields);
    }
}

// =============================================================================
// Tests
// =============================================================================
