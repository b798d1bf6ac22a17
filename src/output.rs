//! Per-event result sinks and the cut-flow file.
//!
//! Sinks see every event; [`should_write`] decides which ones are recorded.
//! Selected object collections are attached only when the skim decision holds.

use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use rusqlite::{params_from_iter, types::Value as SqlValue, Connection};
use serde::Serialize;
use serde_json::json;

use crate::error::Result;
use crate::event::Event;
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::pipeline::{EventResult, Pipeline, SelectedObjects};

pub trait ResultSink {
    /// Called once per pipeline before any event.
    fn begin(&mut self, pipeline: &str, variations: &[String]) -> Result<()>;

    fn write(&mut self, pipeline: &str, event: &Event, result: &EventResult) -> Result<()>;

    fn finish(&mut self) -> Result<()>;
}

/// Selected or skimmed events are always recorded; `write_all` adds the rest.
pub fn should_write(result: &EventResult, write_all: bool) -> bool {
    write_all || result.decision || result.skim
}

#[derive(Debug, Serialize)]
pub struct OutputRecord<'a> {
    pub run: u32,
    pub lumi: u32,
    pub event: u64,
    pub decision: bool,
    pub skim: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub blinded: bool,
    pub weight: f64,
    pub variations: BTreeMap<&'a str, f64>,
    pub branches: &'a BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objects: Option<&'a SelectedObjects>,
}

impl<'a> OutputRecord<'a> {
    pub fn new(event: &Event, result: &'a EventResult) -> Self {
        Self {
            run: event.run,
            lumi: event.lumi,
            event: event.event,
            decision: result.decision,
            skim: result.skim,
            blinded: result.blinded,
            weight: result.weight,
            variations: result.variations.iter().map(|(n, w)| (n.as_str(), *w)).collect(),
            branches: &result.branches,
            objects: if result.skim { result.objects.as_ref() } else { None },
        }
    }
}

fn log_sink_opened(kind: &str, path: &Path) {
    log(
        Level::Info,
        Domain::Output,
        "sink_opened",
        obj(&[("kind", v_str(kind)), ("path", v_str(&path.display().to_string()))]),
    );
}

// =============================================================================
// JSON Lines
// =============================================================================

/// One `<dir>/<sample>_<pipeline>.jsonl` file per pipeline.
pub struct JsonlSink {
    dir: PathBuf,
    sample: String,
    files: HashMap<String, BufWriter<File>>,
}

impl JsonlSink {
    pub fn new(dir: &Path, sample: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            sample: sample.to_string(),
            files: HashMap::new(),
        })
    }

    pub fn path_for(&self, pipeline: &str) -> PathBuf {
        self.dir.join(format!("{}_{}.jsonl", self.sample, pipeline))
    }
}

impl ResultSink for JsonlSink {
    fn begin(&mut self, pipeline: &str, _variations: &[String]) -> Result<()> {
        let path = self.path_for(pipeline);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        log_sink_opened("jsonl", &path);
        self.files.insert(pipeline.to_string(), BufWriter::new(file));
        Ok(())
    }

    fn write(&mut self, pipeline: &str, event: &Event, result: &EventResult) -> Result<()> {
        let Some(w) = self.files.get_mut(pipeline) else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no output open for pipeline {}", pipeline),
            )
            .into());
        };
        serde_json::to_writer(&mut *w, &OutputRecord::new(event, result))?;
        w.write_all(b"\n")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        for w in self.files.values_mut() {
            w.flush()?;
        }
        Ok(())
    }
}

// =============================================================================
// SQLite
// =============================================================================

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// One table per pipeline in `<dir>/<sample>.sqlite`:
/// `run, lumi, event, decision, skim, weight, weight_<variation>..., branches, objects`.
pub struct SqliteSink {
    conn: Connection,
    inserts: HashMap<String, (String, usize)>,
    in_tx: bool,
}

impl SqliteSink {
    pub fn new(dir: &Path, sample: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = Self::path_for(dir, sample);
        let conn = Connection::open(&path)?;
        log_sink_opened("sqlite", &path);
        Ok(Self {
            conn,
            inserts: HashMap::new(),
            in_tx: false,
        })
    }

    pub fn path_for(dir: &Path, sample: &str) -> PathBuf {
        dir.join(format!("{}.sqlite", sample))
    }
}

impl ResultSink for SqliteSink {
    fn begin(&mut self, pipeline: &str, variations: &[String]) -> Result<()> {
        let table = quote_ident(pipeline);
        let mut columns = vec![
            "run INTEGER NOT NULL".to_string(),
            "lumi INTEGER NOT NULL".to_string(),
            "event INTEGER NOT NULL".to_string(),
            "decision INTEGER NOT NULL".to_string(),
            "skim INTEGER NOT NULL".to_string(),
            "weight REAL NOT NULL".to_string(),
        ];
        for v in variations {
            columns.push(format!("{} REAL NOT NULL", quote_ident(&format!("weight_{}", v))));
        }
        columns.push("branches TEXT NOT NULL".to_string());
        columns.push("objects TEXT".to_string());

        self.conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {table};
             CREATE TABLE {table} ({});",
            columns.join(", ")
        ))?;

        let n = 8 + variations.len();
        let placeholders: Vec<String> = (1..=n).map(|i| format!("?{}", i)).collect();
        let sql = format!("INSERT INTO {} VALUES ({})", table, placeholders.join(", "));
        self.inserts.insert(pipeline.to_string(), (sql, variations.len()));

        if !self.in_tx {
            self.conn.execute_batch("BEGIN;")?;
            self.in_tx = true;
        }
        Ok(())
    }

    fn write(&mut self, pipeline: &str, event: &Event, result: &EventResult) -> Result<()> {
        let Some((sql, n_variations)) = self.inserts.get(pipeline) else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no table created for pipeline {}", pipeline),
            )
            .into());
        };
        if result.variations.len() != *n_variations {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("pipeline {}: variation count changed", pipeline),
            )
            .into());
        }

        let event_number = i64::try_from(event.event).map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("event number {} does not fit an SQLite integer", event.event),
            )
        })?;
        let mut values: Vec<SqlValue> = vec![
            SqlValue::Integer(i64::from(event.run)),
            SqlValue::Integer(i64::from(event.lumi)),
            SqlValue::Integer(event_number),
            SqlValue::Integer(result.decision as i64),
            SqlValue::Integer(result.skim as i64),
            SqlValue::Real(result.weight),
        ];
        values.extend(result.variations.iter().map(|(_, w)| SqlValue::Real(*w)));
        values.push(SqlValue::Text(serde_json::to_string(&result.branches)?));
        values.push(match (&result.objects, result.skim) {
            (Some(objects), true) => SqlValue::Text(serde_json::to_string(objects)?),
            _ => SqlValue::Null,
        });

        let mut stmt = self.conn.prepare_cached(sql)?;
        stmt.execute(params_from_iter(values))?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.in_tx {
            self.conn.execute_batch("COMMIT;")?;
            self.in_tx = false;
        }
        Ok(())
    }
}

// =============================================================================
// Cut flow
// =============================================================================

/// Write `<dir>/<sample>_<pipeline>_cutflow.json`.
pub fn write_cutflow(dir: &Path, sample: &str, pipeline: &Pipeline) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}_{}_cutflow.json", sample, pipeline.name()));
    let (evaluated, selected) = pipeline.counts();
    let doc = json!({
        "pipeline": pipeline.name(),
        "config_hash": pipeline.config_hash(),
        "evaluated": evaluated,
        "selected": selected,
        "variations": pipeline.variation_names(),
        "operators": pipeline.cutflow(),
    });
    std::fs::write(&path, serde_json::to_string_pretty(&doc)?)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(decision: bool, skim: bool) -> EventResult {
        EventResult {
            decision,
            skim,
            blinded: false,
            weight: 0.5,
            variations: vec![("up".to_string(), 0.6), ("down".to_string(), 0.4)],
            branches: BTreeMap::from([("Met.pt".to_string(), 180.0)]),
            objects: Some(SelectedObjects {
                photons: Vec::new(),
                electrons: Vec::new(),
                muons: Vec::new(),
                taus: Vec::new(),
                jets: Vec::new(),
                met: Default::default(),
            }),
        }
    }

    #[test]
    fn test_should_write() {
        assert!(should_write(&result(true, true), false));
        assert!(should_write(&result(false, true), false));
        assert!(!should_write(&result(false, false), false));
        assert!(should_write(&result(false, false), true));
    }

    #[test]
    fn test_record_drops_objects_without_skim() {
        let event = Event {
            run: 1,
            event: 7,
            ..Default::default()
        };
        let r = result(true, false);
        let v = serde_json::to_value(OutputRecord::new(&event, &r)).unwrap();
        assert!(v.get("objects").is_none());
        assert!(v.get("blinded").is_none());
        assert_eq!(v["variations"]["up"], json!(0.6));

        let r = result(true, true);
        let v = serde_json::to_value(OutputRecord::new(&event, &r)).unwrap();
        assert!(v["objects"]["photons"].is_array());
    }

    #[test]
    fn test_jsonl_sink_writes_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonlSink::new(dir.path(), "sph-16b").unwrap();
        sink.begin("monoph", &["up".to_string(), "down".to_string()]).unwrap();
        let event = Event::default();
        sink.write("monoph", &event, &result(true, true)).unwrap();
        sink.write("monoph", &event, &result(true, false)).unwrap();
        sink.finish().unwrap();

        let text = std::fs::read_to_string(sink.path_for("monoph")).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(sink.write("other", &event, &result(true, true)).is_err());
    }

    #[test]
    fn test_sqlite_sink_columns() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = SqliteSink::new(dir.path(), "znng").unwrap();
        sink.begin("monoph", &["up".to_string(), "down".to_string()]).unwrap();
        sink.write("monoph", &Event::default(), &result(true, true)).unwrap();
        sink.finish().unwrap();

        let conn = Connection::open(SqliteSink::path_for(dir.path(), "znng")).unwrap();
        let (w, up): (f64, f64) = conn
            .query_row("SELECT weight, weight_up FROM monoph", [], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap();
        assert_eq!(w, 0.5);
        assert_eq!(up, 0.6);
    }

    #[test]
    fn test_sqlite_sink_rejects_oversized_event_number() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = SqliteSink::new(dir.path(), "sph-16b").unwrap();
        sink.begin("monoph", &["up".to_string(), "down".to_string()]).unwrap();
        let event = Event {
            event: u64::MAX,
            ..Default::default()
        };
        assert!(sink.write("monoph", &event, &result(true, true)).is_err());

        let event = Event {
            event: i64::MAX as u64,
            ..Default::default()
        };
        sink.write("monoph", &event, &result(true, true)).unwrap();
        sink.finish().unwrap();
    }
}
