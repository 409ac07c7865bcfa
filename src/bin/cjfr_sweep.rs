use anyhow::{bail, Context};
use cjfr_sweep::harness::{
    SweepConfig, DEFAULT_CONFIGURATION, DEFAULT_OUTPUT, DEFAULT_RUNS, DEFAULT_TOOL, SMALL_FILTER,
};
use cjfr_sweep::report;
use cjfr_sweep::runner::ProcessRunner;
use cjfr_sweep::schema::ResultsDocument;
use cjfr_sweep::stats::Comparison;
use cjfr_sweep::store::ResultStore;
use cjfr_sweep::sweep::Sweep;
use cjfr_sweep::Algorithm;
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Subcommand, Debug)]
enum Command {
    /// Benchmark every compression algorithm, `--runs` times each, and write JSON results.
    Sweep {
        /// Number of runs per compression algorithm.
        #[arg(short, long, default_value_t = DEFAULT_RUNS)]
        runs: u32,

        /// Where to write the JSON results (rewritten after every parsed result).
        #[arg(short, long, value_name = "FILE", default_value = DEFAULT_OUTPUT)]
        output: PathBuf,

        /// Regex selecting which benchmark files the tool runs (e.g. "dotty.*").
        #[arg(short, long, value_name = "PATTERN", conflicts_with = "small")]
        filter_regex: Option<String>,

        /// Shortcut for the small/fast file subset.
        #[arg(short, long, default_value_t = false)]
        small: bool,

        /// Baseline compression for relative comparison.
        #[arg(short, long, value_enum, ignore_case = true, default_value_t = Algorithm::default())]
        baseline: Algorithm,

        /// Restrict the sweep to these algorithms (repeatable). Defaults to all, in sweep order.
        #[arg(short, long = "algorithm", value_enum, ignore_case = true, action = clap::ArgAction::Append)]
        algorithms: Vec<Algorithm>,

        /// Benchmark tool to invoke.
        #[arg(long, value_name = "PATH", default_value = DEFAULT_TOOL)]
        tool: PathBuf,

        /// Benchmark configuration passed to the tool.
        #[arg(long, default_value = DEFAULT_CONFIGURATION)]
        configuration: String,

        /// Kill a single benchmark invocation after this many seconds.
        #[arg(long, value_name = "SECS")]
        timeout_secs: Option<u64>,

        /// Skip the summary tables after the sweep.
        #[arg(long, default_value_t = false)]
        no_report: bool,
    },

    /// Print summary tables for an existing results file.
    Report {
        #[arg(short, long, value_name = "FILE", default_value = DEFAULT_OUTPUT)]
        input: PathBuf,

        /// Override the baseline recorded in the file.
        #[arg(short, long, value_enum, ignore_case = true)]
        baseline: Option<Algorithm>,

        /// Also print the per-file comparison.
        #[arg(long, default_value_t = false)]
        per_file: bool,

        /// Also print every individual result.
        #[arg(long, default_value_t = false)]
        individual: bool,
    },
}

#[derive(Parser, Debug)]
#[command(name = "cjfr-sweep")]
#[command(about = "Compression benchmark sweep runner for cjfr (JSON output)")]
struct Args {
    #[command(subcommand)]
    cmd: Command,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn write_report(
    out: &mut impl Write,
    doc: &ResultsDocument,
    baseline: &str,
    expected: &[Algorithm],
    individual: bool,
    per_file: bool,
) -> io::Result<()> {
    let cmp = Comparison::build(doc, baseline, expected);
    if individual {
        report::write_individual_results(out, doc)?;
    }
    report::write_summary(out, doc, &cmp)?;
    if per_file {
        report::write_per_file(out, &cmp)?;
    }
    out.flush()
}

/// The sweep's results are already on disk, so a closed stdout is only worth a warning.
fn report_after_sweep(
    out: &mut impl Write,
    doc: &ResultsDocument,
    baseline: &str,
    expected: &[Algorithm],
) {
    if let Err(e) = write_report(out, doc, baseline, expected, true, false) {
        tracing::warn!(error = %e, "could not print sweep report");
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    match args.cmd {
        Command::Sweep {
            runs,
            output,
            filter_regex,
            small,
            baseline,
            algorithms,
            tool,
            configuration,
            timeout_secs,
            no_report,
        } => {
            let filter = if small {
                Some(SMALL_FILTER.to_string())
            } else {
                filter_regex
            };
            let config = SweepConfig {
                tool,
                configuration,
                runs,
                filter,
                baseline,
                algorithms: if algorithms.is_empty() {
                    Algorithm::ALL.to_vec()
                } else {
                    algorithms
                },
                output,
                timeout: timeout_secs.map(Duration::from_secs),
            };
            config.validate().context("invalid sweep setup")?;

            let interrupt = Arc::new(AtomicBool::new(false));
            {
                let interrupt = Arc::clone(&interrupt);
                ctrlc::set_handler(move || {
                    eprintln!("\nReceived Ctrl+C, stopping after the current benchmark is killed...");
                    interrupt.store(true, Ordering::SeqCst);
                })
                .context("failed to install Ctrl-C handler")?;
            }

            tracing::info!(
                runs = config.runs,
                output = %config.output.display(),
                baseline = %config.baseline,
                filter = config.filter.as_deref().unwrap_or("<none>"),
                "starting sweep"
            );

            let document = ResultsDocument::new(
                config.configuration.clone(),
                config.runs,
                config.filter.clone(),
                config.baseline,
            );
            let store = ResultStore::create(document, &config.output);
            let runner = ProcessRunner::new()
                .with_timeout(config.timeout)
                .with_interrupt(interrupt);

            let expected = config.algorithms.clone();
            let baseline = config.baseline;
            let mut sweep = Sweep::new(config, store, runner);
            let outcome = sweep.run();
            let store = sweep.into_store();

            tracing::info!(
                completed = outcome.completed(),
                failed = outcome.failed(),
                persist_failures = outcome.persist_failures,
                interrupted = outcome.interrupted,
                output = %store.path().map(|p| p.display().to_string()).unwrap_or_default(),
                "sweep finished"
            );

            if !no_report && !outcome.interrupted {
                report_after_sweep(
                    &mut io::stdout().lock(),
                    store.document(),
                    baseline.as_str(),
                    &expected,
                );
            }
        }
        Command::Report {
            input,
            baseline,
            per_file,
            individual,
        } => {
            let doc = match ResultStore::load(&input)? {
                Some(doc) => doc,
                None => bail!("results file not found: {}", input.display()),
            };
            let baseline = baseline
                .map(|b| b.as_str().to_string())
                .unwrap_or_else(|| doc.baseline.clone());
            write_report(
                &mut io::stdout().lock(),
                &doc,
                &baseline,
                &Algorithm::ALL,
                individual,
                per_file,
            )?;
        }
    }

    Ok(())
}
