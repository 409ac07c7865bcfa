//! Drives the algorithm x run matrix, one child process at a time.
//!
//! Pairs run in a fixed nested order (algorithms outer, runs inner). A failed pair abandons the
//! remaining runs of that algorithm; the sweep moves on to the next algorithm. An interrupt stops
//! the sweep where it is. Whatever the store persisted up to that point is the final result.

use std::fmt;

use crate::error::RunnerError;
use crate::extract::{self, LineExtractor};
use crate::harness::SweepConfig;
use crate::runner::BenchmarkRunner;
use crate::stats::{self, RunSummary};
use crate::store::ResultStore;
use crate::Algorithm;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PairFailure {
    /// The tool exited non-zero (`None`: killed by a signal).
    Exit(Option<i32>),
    /// The tool could not be started, timed out, or its output could not be read.
    Runner(String),
    Interrupted,
}

impl fmt::Display for PairFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairFailure::Exit(Some(code)) => write!(f, "exited with code {code}"),
            PairFailure::Exit(None) => f.write_str("terminated by signal"),
            PairFailure::Runner(msg) => f.write_str(msg),
            PairFailure::Interrupted => f.write_str("interrupted"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PairState {
    Pending,
    Running,
    Completed,
    Failed(PairFailure),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pair {
    pub algorithm: Algorithm,
    pub run: u32,
    pub state: PairState,
    /// Records extracted from this pair's output.
    pub records: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Every scheduled pair in execution order. Abandoned pairs stay `Pending`.
    pub pairs: Vec<Pair>,
    pub persist_failures: usize,
    pub interrupted: bool,
}

impl SweepOutcome {
    pub fn pair(&self, algorithm: Algorithm, run: u32) -> Option<&Pair> {
        self.pairs
            .iter()
            .find(|p| p.algorithm == algorithm && p.run == run)
    }

    pub fn completed(&self) -> usize {
        self.pairs
            .iter()
            .filter(|p| p.state == PairState::Completed)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.pairs
            .iter()
            .filter(|p| matches!(p.state, PairState::Failed(_)))
            .count()
    }
}

pub struct Sweep<R> {
    config: SweepConfig,
    store: ResultStore,
    runner: R,
    extractor: LineExtractor,
}

impl<R: BenchmarkRunner> Sweep<R> {
    pub fn new(config: SweepConfig, store: ResultStore, runner: R) -> Self {
        Self {
            config,
            store,
            runner,
            extractor: extract::extract,
        }
    }

    /// Replace the line grammar, e.g. for a tool that emits a different format.
    pub fn with_extractor(mut self, extractor: LineExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn into_store(self) -> ResultStore {
        self.store
    }

    pub fn run(&mut self) -> SweepOutcome {
        let mut outcome = SweepOutcome {
            pairs: self
                .config
                .algorithms
                .iter()
                .flat_map(|&algorithm| {
                    (1..=self.config.runs).map(move |run| Pair {
                        algorithm,
                        run,
                        state: PairState::Pending,
                        records: 0,
                    })
                })
                .collect(),
            ..Default::default()
        };

        // Make the output exist (with its metadata) before the first record arrives.
        if let Err(e) = self.store.flush() {
            tracing::warn!(error = %e, "could not write initial results document");
            outcome.persist_failures += 1;
        }

        let runs = self.config.runs;
        let algorithms = self.config.algorithms.clone();
        'algorithms: for (a_idx, &algorithm) in algorithms.iter().enumerate() {
            tracing::info!(
                algorithm = %algorithm,
                filter = self.config.filter.as_deref().unwrap_or("<none>"),
                "benchmarking"
            );

            for run in 1..=runs {
                let idx = a_idx * runs as usize + (run as usize - 1);
                outcome.pairs[idx].state = PairState::Running;
                tracing::info!(algorithm = %algorithm, "run {run}/{runs}");

                let (state, summary, persist_failures) = self.run_pair(algorithm, run);
                outcome.pairs[idx].records = summary.files;
                outcome.persist_failures += persist_failures;

                outcome.pairs[idx].state = state.clone();

                match state {
                    PairState::Completed => {
                        tracing::info!(
                            algorithm = %algorithm,
                            run,
                            files = summary.files,
                            total_size = summary.total_size,
                            total_duration_s = summary.total_duration,
                            "run complete"
                        );
                    }
                    PairState::Failed(PairFailure::Interrupted) => {
                        tracing::warn!(algorithm = %algorithm, run, "sweep interrupted");
                        outcome.interrupted = true;
                        break 'algorithms;
                    }
                    PairState::Failed(reason) => {
                        tracing::error!(
                            algorithm = %algorithm,
                            run,
                            %reason,
                            "benchmark failed; skipping remaining runs for this algorithm"
                        );
                        break;
                    }
                    PairState::Pending | PairState::Running => {}
                }
            }

            if let Some(s) = stats::aggregate(self.store.document(), algorithm.as_str()) {
                tracing::info!(
                    algorithm = %algorithm,
                    avg_size = s.avg_size.round(),
                    avg_duration_s = s.avg_duration,
                    samples = s.sample_count,
                    "algorithm complete"
                );
            }
        }

        if let Err(e) = self.store.flush() {
            tracing::warn!(error = %e, "could not write final results document");
            outcome.persist_failures += 1;
        }
        outcome
    }

    fn run_pair(&mut self, algorithm: Algorithm, run: u32) -> (PairState, RunSummary, usize) {
        let invocation = self.config.invocation(algorithm);
        tracing::debug!(command = %invocation.display(), "starting benchmark");

        let extractor = self.extractor;
        let store = &mut self.store;
        let mut accepted = Vec::new();
        let mut persist_failures = 0usize;

        let result = self.runner.run(&invocation, &mut |line: &str| {
            let Some(record) = extractor(line) else {
                return;
            };
            tracing::debug!(
                file = %record.file,
                duration = record.duration_seconds,
                size = record.size_bytes,
                "parsed"
            );
            accepted.push(record.clone());
            if let Err(e) = store.append(algorithm, run, record) {
                tracing::warn!(error = %e, "failed to persist results; continuing in memory");
                persist_failures += 1;
            }
        });

        let state = match result {
            Ok(report) if report.success() => PairState::Completed,
            Ok(report) => PairState::Failed(PairFailure::Exit(report.code)),
            Err(RunnerError::Interrupted) => PairState::Failed(PairFailure::Interrupted),
            Err(e) => PairState::Failed(PairFailure::Runner(e.to_string())),
        };
        (state, RunSummary::of(&accepted), persist_failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::Invocation;
    use crate::runner::ExitReport;
    use crate::schema::ResultsDocument;
    use std::collections::VecDeque;

    /// Plays back canned output per invocation, in call order.
    struct Canned {
        calls: Vec<Invocation>,
        script: VecDeque<(Vec<&'static str>, Result<i32, RunnerError>)>,
    }

    impl BenchmarkRunner for Canned {
        fn run(
            &mut self,
            invocation: &Invocation,
            on_line: &mut dyn FnMut(&str),
        ) -> Result<ExitReport, RunnerError> {
            self.calls.push(invocation.clone());
            let (lines, exit) = self.script.pop_front().expect("unscripted invocation");
            for l in lines.iter().copied() {
                on_line(l);
            }
            exit.map(|code| ExitReport {
                code: Some(code),
                lines: lines.len(),
            })
        }
    }

    fn config(algorithms: Vec<Algorithm>, runs: u32) -> SweepConfig {
        SweepConfig {
            algorithms,
            runs,
            ..Default::default()
        }
    }

    fn store() -> ResultStore {
        ResultStore::in_memory(ResultsDocument::new("reasonable-default", 2, None, Algorithm::None))
    }

    #[test]
    fn test_pairs_run_in_nested_order() {
        let ok = || (vec!["Benchmarked a.jfr with x in 1.0s, size: 1 bytes"], Ok(0));
        let runner = Canned {
            calls: Vec::new(),
            script: VecDeque::from(vec![ok(), ok(), ok(), ok()]),
        };
        let mut sweep = Sweep::new(config(vec![Algorithm::Gzip, Algorithm::None], 2), store(), runner);
        let outcome = sweep.run();

        assert_eq!(outcome.completed(), 4);
        let order: Vec<(Algorithm, u32)> = outcome.pairs.iter().map(|p| (p.algorithm, p.run)).collect();
        assert_eq!(
            order,
            vec![
                (Algorithm::Gzip, 1),
                (Algorithm::Gzip, 2),
                (Algorithm::None, 1),
                (Algorithm::None, 2)
            ]
        );
        let compressions: Vec<String> = sweep.runner.calls.iter().map(|c| c.args[4].clone()).collect();
        assert_eq!(compressions, vec!["GZIP", "GZIP", "NONE", "NONE"]);
    }

    #[test]
    fn test_failure_abandons_remaining_runs_of_that_algorithm_only() {
        let runner = Canned {
            calls: Vec::new(),
            script: VecDeque::from(vec![
                (vec!["Benchmarked a.jfr with x in 1.0s, size: 1 bytes"], Ok(0)),
                (vec!["Benchmarked a.jfr with x in 1.1s, size: 1 bytes"], Ok(1)),
                (vec!["Benchmarked a.jfr with x in 0.5s, size: 1 bytes"], Ok(0)),
                (vec!["Benchmarked a.jfr with x in 0.6s, size: 1 bytes"], Ok(0)),
                (vec!["Benchmarked a.jfr with x in 0.7s, size: 1 bytes"], Ok(0)),
            ]),
        };
        let mut sweep = Sweep::new(config(vec![Algorithm::Xz, Algorithm::Zstd], 3), store(), runner);
        let outcome = sweep.run();

        assert_eq!(outcome.pair(Algorithm::Xz, 1).unwrap().state, PairState::Completed);
        assert_eq!(
            outcome.pair(Algorithm::Xz, 2).unwrap().state,
            PairState::Failed(PairFailure::Exit(Some(1)))
        );
        assert_eq!(outcome.pair(Algorithm::Xz, 3).unwrap().state, PairState::Pending);
        assert_eq!(outcome.failed(), 1);
        assert_eq!(outcome.completed(), 4);

        let doc = sweep.store().document();
        // Records streamed before the failure are kept.
        assert_eq!(doc.records_for("XZ").count(), 2);
        assert_eq!(doc.records_for("ZSTD").count(), 3);
    }

    #[test]
    fn test_spawn_error_is_a_pair_failure() {
        let runner = Canned {
            calls: Vec::new(),
            script: VecDeque::from(vec![
                (
                    vec![],
                    Err(RunnerError::Spawn {
                        program: "./cjfr".into(),
                        source: std::io::Error::from(std::io::ErrorKind::NotFound),
                    }),
                ),
                (vec!["Benchmarked a.jfr with x in 0.5s, size: 1 bytes"], Ok(0)),
            ]),
        };
        let mut sweep = Sweep::new(config(vec![Algorithm::Gzip, Algorithm::Snappy], 1), store(), runner);
        let outcome = sweep.run();
        assert!(matches!(
            outcome.pair(Algorithm::Gzip, 1).unwrap().state,
            PairState::Failed(PairFailure::Runner(_))
        ));
        assert_eq!(outcome.pair(Algorithm::Snappy, 1).unwrap().state, PairState::Completed);
        assert!(!outcome.interrupted);
    }

    #[test]
    fn test_interrupt_stops_the_sweep() {
        let runner = Canned {
            calls: Vec::new(),
            script: VecDeque::from(vec![
                (vec!["Benchmarked a.jfr with x in 1.0s, size: 1 bytes"], Ok(0)),
                (vec![], Err(RunnerError::Interrupted)),
            ]),
        };
        let mut sweep = Sweep::new(config(vec![Algorithm::None, Algorithm::Gzip], 2), store(), runner);
        let outcome = sweep.run();
        assert!(outcome.interrupted);
        assert_eq!(sweep.runner.calls.len(), 2);
        assert_eq!(outcome.pair(Algorithm::Gzip, 1).unwrap().state, PairState::Pending);
        assert_eq!(sweep.store().document().records_for("NONE").count(), 1);
    }

    #[test]
    fn test_non_record_lines_are_ignored() {
        let runner = Canned {
            calls: Vec::new(),
            script: VecDeque::from(vec![(
                vec![
                    "Running...",
                    "Benchmarked a.jfr with x in 1.0s, size: 10 bytes",
                    "WARNING: something",
                    "Benchmarked b.jfr with x in 2.0s, size: 20 bytes",
                ],
                Ok(0),
            )]),
        };
        let mut sweep = Sweep::new(config(vec![Algorithm::Lzma], 1), store(), runner);
        let outcome = sweep.run();
        assert_eq!(outcome.pair(Algorithm::Lzma, 1).unwrap().records, 2);
        let files: Vec<&str> = sweep
            .store()
            .document()
            .records_for("LZMA")
            .map(|r| r.file.as_str())
            .collect();
        assert_eq!(files, vec!["a.jfr", "b.jfr"]);
    }

    #[test]
    fn test_custom_extractor() {
        fn every_line(line: &str) -> Option<crate::schema::MeasurementRecord> {
            Some(crate::schema::MeasurementRecord {
                file: line.to_string(),
                duration_seconds: 1.0,
                size_bytes: 1,
            })
        }
        let runner = Canned {
            calls: Vec::new(),
            script: VecDeque::from(vec![(vec!["x", "y"], Ok(0))]),
        };
        let mut sweep =
            Sweep::new(config(vec![Algorithm::Bzip2], 1), store(), runner).with_extractor(every_line);
        sweep.run();
        assert_eq!(sweep.into_store().document().records_for("BZIP2").count(), 2);
    }
}
