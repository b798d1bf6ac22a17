use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use evskim::config::{Config, OutputFormat};
use evskim::driver::{Driver, JsonlEventReader};
use evskim::logging::{self, log, obj, v_str, Domain, Level};
use evskim::output::{JsonlSink, ResultSink, SqliteSink};
use evskim::selectors::{sample_regions, RegionRequest, Sample, SelectorRegistry, SetupEnv};
use evskim::weights::{JsonTableProvider, WeightSourceCache};

const USAGE: &str = "usage: evskim [--list] [--regions a,b] [--nentries N] [--all] <sample.json> <events.jsonl>";

#[derive(Debug, Default)]
struct Args {
    list: bool,
    regions: Vec<String>,
    nentries: Option<u64>,
    all: bool,
    positional: Vec<String>,
}

fn parse_args(raw: impl Iterator<Item = String>) -> Result<Args> {
    let mut args = Args::default();
    let mut it = raw;
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--list" => args.list = true,
            "--all" => args.all = true,
            "--regions" => {
                let v = it.next().context("--regions needs a value")?;
                args.regions = v.split(',').filter(|s| !s.is_empty()).map(String::from).collect();
            }
            "--nentries" => {
                let v = it.next().context("--nentries needs a value")?;
                args.nentries = Some(v.parse().with_context(|| format!("bad --nentries {}", v))?);
            }
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            s if s.starts_with("--") => bail!("unknown option {}\n{}", s, USAGE),
            _ => args.positional.push(arg),
        }
    }
    Ok(args)
}

fn main() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;
    let registry = SelectorRegistry::with_defaults();

    if args.list {
        for name in registry.names() {
            println!("{}", name);
        }
        return Ok(());
    }

    let [sample_path, events_path] = args.positional.as_slice() else {
        bail!("{}", USAGE);
    };
    for region in &args.regions {
        if !registry.contains(region) {
            bail!("unknown region {} (see --list)", region);
        }
    }

    let mut cfg = Config::from_env();
    if args.nentries.is_some() {
        cfg.max_entries = args.nentries;
    }
    cfg.write_all |= args.all;

    let sample = Sample::from_file(&PathBuf::from(sample_path))
        .with_context(|| format!("loading sample {}", sample_path))?;
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("sample", v_str(&sample.name)),
            ("events", v_str(events_path)),
            ("output", v_str(&cfg.output_dir.display().to_string())),
        ]),
    );

    let tables = WeightSourceCache::new(Box::new(JsonTableProvider::new(cfg.data_dir.clone())));
    let env = SetupEnv::new(&tables);

    let requests: Vec<RegionRequest> = if args.regions.is_empty() {
        sample_regions(&sample)
    } else {
        args.regions.iter().map(|r| RegionRequest::plain(r)).collect()
    };
    if requests.is_empty() {
        bail!("no regions defined for sample {} (pass --regions)", sample.name);
    }

    let mut driver = Driver::new(sample.clone(), cfg.clone());
    driver.add_requests(&registry, &requests, &env)?;

    let input = cfg.input_path(events_path);
    let mut source = JsonlEventReader::open(&input).with_context(|| format!("opening {}", input.display()))?;
    let mut sink: Box<dyn ResultSink> = match cfg.output_format {
        OutputFormat::Jsonl => Box::new(JsonlSink::new(&cfg.output_dir, &sample.name)?),
        OutputFormat::Sqlite => Box::new(SqliteSink::new(&cfg.output_dir, &sample.name)?),
    };

    let summary = driver.run(&mut source, sink.as_mut());
    logging::flush();
    let summary = summary?;
    for (pipeline, n) in &summary.selected {
        println!("{:<12} {:>10} / {}", pipeline, n, summary.events);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(v: &[&str]) -> Result<Args> {
        parse_args(v.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_full_command_line() {
        let a = parse(&["--regions", "monoph,dimu", "--nentries", "100", "--all", "s.json", "e.jsonl"]).unwrap();
        assert_eq!(a.regions, vec!["monoph", "dimu"]);
        assert_eq!(a.nentries, Some(100));
        assert!(a.all);
        assert_eq!(a.positional, vec!["s.json", "e.jsonl"]);
    }

    #[test]
    fn test_parse_rejects_unknown_option() {
        assert!(parse(&["--fast"]).is_err());
        assert!(parse(&["--nentries", "ten"]).is_err());
    }
}
