//! lahar-stream: simplified DEM, flow direction and flow totals from a DEM

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use lahar_algorithms::hydrology::{
    FillSinksParams, FlowDirectionParams, FlowGrid, Hydrology, HydrologyParams,
};
use lahar_core::io::{load_raster, load_raster_from_reader, write_stream, OutputFiles};
use lahar_core::{Algorithm, Error};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "lahar-stream")]
#[command(author, version, about = "Fill sinks, route flow and count upstream cells of a DEM", long_about = None)]
struct Cli {
    /// Read topography from this file (GeoTIFF or TSV grid)
    #[arg(short = 'f', long)]
    input_file: Option<PathBuf>,

    /// Read topography from standard input. Can't be used with --input-file
    #[arg(short = 'i', long)]
    std_in: bool,

    /// Write output files using this base name
    #[arg(short = 'o', long, value_name = "BASENAME")]
    output_file: Option<PathBuf>,

    /// Write all outputs to standard output (silences logging)
    #[arg(short = 't', long)]
    std_out: bool,

    /// Worker threads per phase
    #[arg(short = 'r', long, default_value_t = 4)]
    threads: usize,

    /// silent, normal, progress or debug
    #[arg(short = 'l', long)]
    loglevel: Option<String>,

    /// Minimum drop per unit distance imposed while filling
    #[arg(long, default_value_t = 0.01, allow_hyphen_values = true)]
    min_slope: f64,

    /// Heights below this are treated as no-data
    #[arg(long, default_value_t = -1000.0, allow_hyphen_values = true)]
    nodata_threshold: f32,

    /// Print -1 on standard output when done, even in silent mode
    #[arg(short = 'e', long)]
    eof: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum LogLevel {
    Silent,
    Normal,
    Progress,
    Debug,
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "silent" => Ok(LogLevel::Silent),
            "normal" => Ok(LogLevel::Normal),
            "progress" => Ok(LogLevel::Progress),
            "debug" => Ok(LogLevel::Debug),
            _ => Err(Error::OptionConflict(format!(
                "bad loglevel '{}': use silent, normal, progress or debug",
                s
            ))),
        }
    }
}

impl LogLevel {
    fn max_level(self) -> Option<Level> {
        match self {
            LogLevel::Silent => None,
            LogLevel::Normal | LogLevel::Progress => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Source {
    File(PathBuf),
    Stdin,
}

/// Validated options; output files are already open.
struct Options {
    source: Source,
    files: Option<OutputFiles>,
    std_out: bool,
    eof: bool,
    log_level: LogLevel,
    params: HydrologyParams,
}

impl Options {
    /// Check every option before any work starts.
    fn from_cli(cli: Cli) -> lahar_core::Result<Self> {
        let log_level = if cli.std_out {
            LogLevel::Silent
        } else {
            match cli.loglevel.as_deref() {
                Some(level) => level.parse()?,
                None => LogLevel::Normal,
            }
        };

        let source = match (cli.input_file, cli.std_in) {
            (Some(_), true) => {
                return Err(conflict("can't read from both --input-file and --std-in at once"))
            }
            (Some(path), false) => {
                if !path.exists() {
                    return Err(conflict(format!("{}: No such file or directory", path.display())));
                }
                if path.is_dir() {
                    return Err(conflict(format!("{}: Is a directory", path.display())));
                }
                Source::File(path)
            }
            (None, true) => Source::Stdin,
            (None, false) => return Err(conflict("no input source specified (use -f or -i)")),
        };

        if cli.output_file.is_none() && !cli.std_out {
            return Err(conflict("no output method specified (use -o or -t)"));
        }

        let params = HydrologyParams {
            fill: FillSinksParams {
                min_slope: cli.min_slope,
                ..Default::default()
            },
            direction: FlowDirectionParams {
                nodata_threshold: cli.nodata_threshold,
            },
            threads: cli.threads,
        };
        params.validate().map_err(|e| conflict(e.to_string()))?;

        let files = match cli.output_file {
            Some(base) if base.as_os_str().is_empty() => return Err(conflict("invalid filename")),
            Some(base) => Some(OutputFiles::create(&base).map_err(|e| {
                conflict(format!("couldn't open output files: {}", e))
            })?),
            None => None,
        };

        Ok(Self {
            source,
            files,
            std_out: cli.std_out,
            eof: cli.eof,
            log_level,
            params,
        })
    }
}

fn conflict(msg: impl Into<String>) -> Error {
    Error::OptionConflict(msg.into())
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let options = Options::from_cli(cli)?;
    setup_logging(options.log_level);
    run(options)
}

fn run(options: Options) -> Result<()> {
    let start = Instant::now();
    let show_progress = options.log_level >= LogLevel::Progress;

    let pb = show_progress.then(|| spinner("Reading topography..."));
    let (raster, meta) = match &options.source {
        Source::File(path) => load_raster(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        Source::Stdin => {
            load_raster_from_reader(std::io::stdin().lock()).context("Failed to read standard input")?
        }
    };
    finish(pb, "Topography loaded");

    let grid = FlowGrid::new(raster, meta).context("Input DEM is unusable")?;
    let (rows, cols) = grid.shape();

    let pb = show_progress.then(|| spinner("Filling sinks and routing flow..."));
    let (grid, report) = Hydrology
        .execute(grid, options.params.clone())
        .context("Hydrology run failed")?;
    finish(pb, "Hydrology complete");
    for (phase, elapsed) in &report.timings {
        debug!(phase, ?elapsed, "phase timing");
    }

    let products = grid.into_products().context("Failed to collect products")?;
    if let Some(files) = options.files {
        files.write(&products).context("Failed to write output files")?;
    }
    if options.std_out || options.eof {
        let stdout = std::io::stdout();
        let mut out = BufWriter::new(stdout.lock());
        if options.std_out {
            write_stream(&mut out, &products).context("Failed to write standard output")?;
        }
        if options.eof {
            writeln!(out, "-1").context("Failed to write standard output")?;
        }
        out.flush().context("Failed to write standard output")?;
    }

    info!(
        rows,
        cols,
        fill_iterations = report.fill.iterations,
        max_accumulation = report.accumulation.max_accumulation,
        elapsed = ?start.elapsed(),
        "done"
    );
    Ok(())
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(level: LogLevel) {
    let Some(max) = level.max_level() else {
        return;
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(max)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("lahar-stream: logging was already initialised");
    }
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn finish(pb: Option<ProgressBar>, msg: &'static str) {
    if let Some(pb) = pb {
        pb.finish_with_message(msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("lahar-stream").chain(args.iter().copied())).unwrap()
    }

    fn input(dir: &TempDir) -> String {
        let path = dir.path().join("dem.tsv");
        std::fs::write(&path, "3\t3\t3\n3\t1\t3\n3\t3\t3\n").unwrap();
        path.to_string_lossy().into_owned()
    }

    fn option_error(args: &[&str]) -> String {
        match Options::from_cli(parse(args)) {
            Err(Error::OptionConflict(msg)) => msg,
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("options accepted: {args:?}"),
        }
    }

    #[test]
    fn test_defaults() {
        let dir = TempDir::new().unwrap();
        let file = input(&dir);
        let opts = Options::from_cli(parse(&["-f", &file, "-t"])).unwrap();
        assert_eq!(opts.source, Source::File(PathBuf::from(&file)));
        assert!(opts.std_out);
        assert!(opts.files.is_none());
        assert_eq!(opts.params.threads, 4);
        assert!((opts.params.fill.min_slope - 0.01).abs() < 1e-12);
        assert_eq!(opts.params.direction.nodata_threshold, -1000.0);
        assert_eq!(opts.log_level, LogLevel::Silent);
    }

    #[test]
    fn test_missing_input() {
        assert!(option_error(&["-t"]).contains("no input source"));
    }

    #[test]
    fn test_both_inputs() {
        let dir = TempDir::new().unwrap();
        let file = input(&dir);
        assert!(option_error(&["-f", &file, "-i", "-t"]).contains("both"));
    }

    #[test]
    fn test_missing_output() {
        assert!(option_error(&["-i"]).contains("no output method"));
    }

    #[test]
    fn test_input_is_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_string_lossy().into_owned();
        assert!(option_error(&["-f", &path, "-t"]).contains("Is a directory"));
    }

    #[test]
    fn test_bad_loglevel() {
        assert!(option_error(&["-i", "-o", "out", "-l", "chatty"]).contains("loglevel"));
    }

    #[test]
    fn test_loglevel_ignored_on_stdout() {
        let opts = Options::from_cli(parse(&["-i", "-t", "-l", "chatty"])).unwrap();
        assert_eq!(opts.log_level, LogLevel::Silent);
    }

    #[test]
    fn test_zero_threads() {
        assert!(option_error(&["-i", "-t", "-r", "0"]).contains("threads"));
    }

    #[test]
    fn test_negative_slope() {
        assert!(option_error(&["-i", "-t", "--min-slope", "-1"]).contains("min_slope"));
    }

    #[test]
    fn test_output_files_opened_during_validation() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("run");
        let base_str = base.to_string_lossy().into_owned();
        let opts = Options::from_cli(parse(&["-i", "-o", &base_str, "-l", "debug"])).unwrap();
        assert!(opts.files.is_some());
        assert_eq!(opts.log_level, LogLevel::Debug);
        assert!(dir.path().join("run-sdem.tsv").exists());
        assert!(dir.path().join("run.ini").exists());
    }

    #[test]
    fn test_unwritable_output() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("missing").join("run");
        let base_str = base.to_string_lossy().into_owned();
        assert!(option_error(&["-i", "-o", &base_str]).contains("couldn't open output files"));
    }

    #[test]
    fn test_log_levels_order() {
        assert!(LogLevel::Debug > LogLevel::Progress);
        assert_eq!("PROGRESS".parse::<LogLevel>().unwrap(), LogLevel::Progress);
        assert_eq!(LogLevel::Silent.max_level(), None);
        assert_eq!(LogLevel::Debug.max_level(), Some(Level::DEBUG));
    }
}
