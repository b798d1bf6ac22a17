//! Event loop: read events, run every pipeline in order, hand results to the
//! sink, and write the cut flows and run manifest at the end.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use serde_json::json;

use crate::config::Config;
use crate::event::Event;
use crate::logging::{log, log_cutflow, log_progress, log_run_summary, obj, ts_now, v_str, Domain, Level, ProfileScope};
use crate::output::{should_write, write_cutflow, ResultSink};
use crate::pipeline::Pipeline;
use crate::selectors::{RegionRequest, Sample, SelectorRegistry, SetupEnv};

/// Source of decoded events.
pub trait EventSource {
    fn next_event(&mut self) -> crate::error::Result<Option<Event>>;

    /// Human-readable position for error messages.
    fn position(&self) -> String;
}

/// One JSON event per line; blank lines are skipped.
pub struct JsonlEventReader {
    path: PathBuf,
    reader: BufReader<File>,
    line: u64,
    buf: String,
}

impl JsonlEventReader {
    pub fn open(path: &Path) -> crate::error::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            line: 0,
            buf: String::new(),
        })
    }
}

impl EventSource for JsonlEventReader {
    fn next_event(&mut self) -> crate::error::Result<Option<Event>> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line += 1;
            let trimmed = self.buf.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Ok(Some(serde_json::from_str(trimmed)?));
        }
    }

    fn position(&self) -> String {
        format!("{}:{}", self.path.display(), self.line)
    }
}

/// In-memory source, mostly for tests and replays.
impl EventSource for std::vec::IntoIter<Event> {
    fn next_event(&mut self) -> crate::error::Result<Option<Event>> {
        Ok(self.next())
    }

    fn position(&self) -> String {
        format!("{} events remaining", self.len())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub events: u64,
    /// (pipeline, selected events), in pipeline order.
    pub selected: Vec<(String, u64)>,
    pub cutflow_files: Vec<PathBuf>,
    pub elapsed_ms: f64,
}

pub struct Driver {
    sample: Sample,
    config: Config,
    pipelines: Vec<Pipeline>,
}

impl Driver {
    pub fn new(sample: Sample, config: Config) -> Self {
        Self {
            sample,
            config,
            pipelines: Vec::new(),
        }
    }

    pub fn add_pipeline(&mut self, pipeline: Pipeline) {
        self.pipelines.push(pipeline);
    }

    /// Build the named regions (all registered ones when `regions` is empty).
    pub fn add_regions(&mut self, registry: &SelectorRegistry, regions: &[String], env: &SetupEnv<'_>) -> Result<()> {
        let names: Vec<String> = if regions.is_empty() {
            registry.names().iter().map(|s| s.to_string()).collect()
        } else {
            regions.to_vec()
        };
        for name in names {
            let pipeline = registry
                .build(&self.sample, &name, env)
                .with_context(|| format!("building region {} for sample {}", name, self.sample.name))?;
            self.add_pipeline(pipeline);
        }
        Ok(())
    }

    /// Build one pipeline per request, e.g. from [`crate::selectors::sample_regions`].
    pub fn add_requests(&mut self, registry: &SelectorRegistry, requests: &[RegionRequest], env: &SetupEnv<'_>) -> Result<()> {
        for request in requests {
            let pipeline = registry.build_request(&self.sample, request, env).with_context(|| {
                format!(
                    "building region {} as {} for sample {}",
                    request.region, request.name, self.sample.name
                )
            })?;
            self.add_pipeline(pipeline);
        }
        Ok(())
    }

    pub fn pipelines(&self) -> &[Pipeline] {
        &self.pipelines
    }

    pub fn run(&mut self, source: &mut dyn EventSource, sink: &mut dyn ResultSink) -> Result<RunSummary> {
        let started_at = ts_now();
        let started = Instant::now();

        for p in &mut self.pipelines {
            p.set_use_timers(self.config.use_timers);
            p.start().with_context(|| format!("starting pipeline {}", p.name()))?;
            sink.begin(p.name(), p.variation_names())?;
        }

        let mut events: u64 = 0;
        while self.config.max_entries.map_or(true, |max| events < max) {
            let event = match source.next_event() {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(e) => return Err(e).with_context(|| format!("reading {}", source.position())),
            };
            events += 1;

            for p in &mut self.pipelines {
                let result = p
                    .evaluate(&event)
                    .with_context(|| format!("pipeline {} at {}", p.name(), source.position()))?;
                if should_write(&result, self.config.write_all) {
                    sink.write(p.name(), &event, &result)?;
                }
            }

            if self.config.progress_interval > 0 && events % self.config.progress_interval == 0 {
                log_progress(events, started.elapsed().as_secs_f64() * 1000.0);
            }
        }
        sink.finish()?;

        let _scope = ProfileScope::new("cutflow_write");
        let mut cutflow_files = Vec::new();
        for p in &self.pipelines {
            let rows: Vec<(String, u64, u64, u64)> = p
                .cutflow()
                .iter()
                .map(|e| (e.operator.clone(), e.evaluated, e.passed, e.surviving))
                .collect();
            log_cutflow(p.name(), &rows);
            cutflow_files.push(write_cutflow(&self.config.output_dir, &self.sample.name, p)?);
        }

        let selected: Vec<(String, u64)> = self
            .pipelines
            .iter()
            .map(|p| (p.name().to_string(), p.counts().1))
            .collect();
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        log_run_summary(&self.sample.name, events, &selected, elapsed_ms);
        self.write_manifest(&started_at, events)?;

        Ok(RunSummary {
            events,
            selected,
            cutflow_files,
            elapsed_ms,
        })
    }

    fn write_manifest(&self, started_at: &str, events: u64) -> Result<()> {
        let path = self
            .config
            .output_dir
            .join(format!("{}_manifest.json", self.sample.name));
        let pipelines: Vec<_> = self
            .pipelines
            .iter()
            .map(|p| {
                json!({
                    "name": p.name(),
                    "config_hash": p.config_hash(),
                    "operators": p.operator_names(),
                    "variations": p.variation_names(),
                })
            })
            .collect();
        let doc = json!({
            "sample": self.sample,
            "started_at": started_at,
            "finished_at": ts_now(),
            "events": events,
            "output_format": self.config.output_format.as_str(),
            "write_all": self.config.write_all,
            "pipelines": pipelines,
        });
        std::fs::create_dir_all(&self.config.output_dir)?;
        std::fs::write(&path, serde_json::to_string_pretty(&doc)?)
            .with_context(|| format!("writing {}", path.display()))?;
        log(
            Level::Info,
            Domain::Output,
            "manifest_written",
            obj(&[("path", v_str(&path.display().to_string()))]),
        );
        Ok(())
    }
}
