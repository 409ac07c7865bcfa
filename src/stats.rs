//! Reductions over a [`ResultsDocument`]: per-algorithm and per-file statistics, and
//! baseline-relative percentages.
//!
//! Nothing here is cached; every call recomputes from the document it is given.

use std::collections::BTreeMap;

use crate::error::StatsError;
use crate::schema::{MeasurementRecord, ResultsDocument};
use crate::Algorithm;

#[derive(Clone, Debug, PartialEq)]
pub struct AggregatedStats {
    pub avg_duration: f64,
    pub std_duration: f64,
    pub avg_size: f64,
    pub std_size: f64,
    pub total_duration: f64,
    pub total_size: u64,
    /// Records across all runs.
    pub sample_count: usize,
    /// Runs with at least one entry in the document.
    pub num_runs: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FileStats {
    pub avg_duration: f64,
    pub std_duration: f64,
    pub avg_size: f64,
    pub std_size: f64,
    pub samples: usize,
    /// Distinct runs that measured this file.
    pub num_runs: usize,
}

/// Totals for a single run, used for progress logging.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunSummary {
    pub files: usize,
    pub total_size: u64,
    pub total_duration: f64,
}

impl RunSummary {
    pub fn of(records: &[MeasurementRecord]) -> Self {
        Self {
            files: records.len(),
            total_size: saturating_total(records.iter().map(|r| r.size_bytes)),
            total_duration: records.iter().map(|r| r.duration_seconds).sum(),
        }
    }
}

/// Byte totals clamp at `u64::MAX` instead of overflowing.
fn saturating_total(sizes: impl Iterator<Item = u64>) -> u64 {
    sizes.fold(0u64, u64::saturating_add)
}

/// Sorted before summing so results do not depend on record arrival order.
fn sorted(mut xs: Vec<f64>) -> Vec<f64> {
    xs.sort_by(f64::total_cmp);
    xs
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample standard deviation (n - 1 denominator).
fn sample_std(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    let var = xs.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / (xs.len() - 1) as f64;
    var.sqrt()
}

/// Spread is only meaningful across repeated runs; a single run reports 0.
fn spread(xs: &[f64], num_runs: usize) -> f64 {
    if num_runs > 1 && xs.len() > 1 {
        sample_std(xs)
    } else {
        0.0
    }
}

/// Whole-algorithm statistics, or `None` when the algorithm has no records.
pub fn aggregate(doc: &ResultsDocument, algorithm: &str) -> Option<AggregatedStats> {
    let results = doc.algorithm(algorithm)?;
    let num_runs = results.runs.len();

    let durations = sorted(results.records().map(|r| r.duration_seconds).collect());
    if durations.is_empty() {
        return None;
    }
    let sizes = sorted(results.records().map(|r| r.size_bytes as f64).collect());

    Some(AggregatedStats {
        avg_duration: mean(&durations),
        std_duration: spread(&durations, num_runs),
        avg_size: mean(&sizes),
        std_size: spread(&sizes, num_runs),
        total_duration: durations.iter().sum(),
        total_size: saturating_total(results.records().map(|r| r.size_bytes)),
        sample_count: durations.len(),
        num_runs,
    })
}

#[derive(Default)]
struct FileSamples {
    durations: Vec<f64>,
    sizes: Vec<f64>,
    runs: Vec<u32>,
}

impl FileSamples {
    fn finish(self) -> FileStats {
        let mut runs = self.runs;
        runs.sort_unstable();
        runs.dedup();
        let durations = sorted(self.durations);
        let sizes = sorted(self.sizes);
        FileStats {
            avg_duration: mean(&durations),
            std_duration: spread(&durations, runs.len()),
            avg_size: mean(&sizes),
            std_size: spread(&sizes, runs.len()),
            samples: durations.len(),
            num_runs: runs.len(),
        }
    }
}

/// Statistics for every file measured under `algorithm`, grouped by file name.
pub fn per_file_all(doc: &ResultsDocument, algorithm: &str) -> BTreeMap<String, FileStats> {
    let mut groups: BTreeMap<String, FileSamples> = BTreeMap::new();
    if let Some(results) = doc.algorithm(algorithm) {
        for run in &results.runs {
            for r in &run.results {
                let g = groups.entry(r.file.clone()).or_default();
                g.durations.push(r.duration_seconds);
                g.sizes.push(r.size_bytes as f64);
                g.runs.push(run.run);
            }
        }
    }
    groups.into_iter().map(|(k, g)| (k, g.finish())).collect()
}

pub fn per_file_aggregate(doc: &ResultsDocument, algorithm: &str, file: &str) -> Option<FileStats> {
    let results = doc.algorithm(algorithm)?;
    let mut g = FileSamples::default();
    for run in &results.runs {
        for r in run.results.iter().filter(|r| r.file == file) {
            g.durations.push(r.duration_seconds);
            g.sizes.push(r.size_bytes as f64);
            g.runs.push(run.run);
        }
    }
    if g.durations.is_empty() {
        None
    } else {
        Some(g.finish())
    }
}

/// `subject / baseline * 100`. A baseline that is zero, negative or not finite has nothing to
/// normalize against and is reported as missing.
///
/// The returned error names no algorithm; [`StatsError::for_baseline`] attaches one.
pub fn relative(subject: f64, baseline: f64) -> Result<f64, StatsError> {
    if baseline.is_finite() && baseline > 0.0 {
        Ok(subject / baseline * 100.0)
    } else {
        Err(StatsError::MissingBaseline {
            baseline: String::new(),
        })
    }
}

/// Percentages of one subject against the baseline. Each column resolves on its own, so a
/// baseline with an unusable size average still yields a duration percentage.
#[derive(Clone, Debug, PartialEq)]
pub struct Relative {
    pub duration: Result<f64, StatsError>,
    pub size: Result<f64, StatsError>,
}

/// Baseline averages that percentages are computed against.
struct Baseline<'a> {
    name: &'a str,
    duration: Option<f64>,
    size: Option<f64>,
}

impl<'a> Baseline<'a> {
    fn new(name: &'a str, avg_duration: Option<f64>, avg_size: Option<f64>) -> Self {
        Self {
            name,
            duration: avg_duration,
            size: avg_size,
        }
    }

    fn column(&self, subject: f64, base: Option<f64>) -> Result<f64, StatsError> {
        let base = base.ok_or_else(|| StatsError::for_baseline(self.name))?;
        relative(subject, base).map_err(|_| StatsError::for_baseline(self.name))
    }

    fn apply(&self, avg_duration: f64, avg_size: f64) -> Relative {
        Relative {
            duration: self.column(avg_duration, self.duration),
            size: self.column(avg_size, self.size),
        }
    }

    /// `Err` only when neither column can be computed.
    fn status(&self) -> Result<(), StatsError> {
        self.column(1.0, self.duration)
            .or_else(|_| self.column(1.0, self.size))
            .map(|_| ())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FileComparison {
    pub file: String,
    pub stats: FileStats,
    pub relative: Relative,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RowResult {
    NoResults,
    Measured {
        stats: AggregatedStats,
        relative: Relative,
        files: Vec<FileComparison>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ComparisonRow {
    pub algorithm: String,
    pub is_baseline: bool,
    pub result: RowResult,
}

/// Every algorithm expressed relative to one baseline.
#[derive(Clone, Debug, PartialEq)]
pub struct Comparison {
    pub baseline: String,
    /// `Err` when the baseline has no usable samples; rows still carry absolute numbers.
    pub baseline_status: Result<(), StatsError>,
    pub rows: Vec<ComparisonRow>,
}

impl Comparison {
    /// Rows cover `expected` plus any other algorithm in the document, in sweep order.
    pub fn build(doc: &ResultsDocument, baseline: &str, expected: &[Algorithm]) -> Self {
        let mut names: Vec<String> = expected.iter().map(|a| a.as_str().to_string()).collect();
        for alg in doc.compressions.iter() {
            if !names.contains(&alg.algorithm) {
                names.push(alg.algorithm.clone());
            }
        }
        names.sort_by_key(|n| Algorithm::sweep_rank(n));

        let base_stats = aggregate(doc, baseline);
        let base = Baseline::new(
            baseline,
            base_stats.as_ref().map(|s| s.avg_duration),
            base_stats.as_ref().map(|s| s.avg_size),
        );
        let base_files = per_file_all(doc, baseline);

        let rows = names
            .into_iter()
            .map(|name| {
                let result = match aggregate(doc, &name) {
                    None => RowResult::NoResults,
                    Some(stats) => {
                        let relative = base.apply(stats.avg_duration, stats.avg_size);
                        let files = per_file_all(doc, &name)
                            .into_iter()
                            .map(|(file, fs)| {
                                let bf = base_files.get(&file);
                                let relative = Baseline::new(
                                    baseline,
                                    bf.map(|b| b.avg_duration),
                                    bf.map(|b| b.avg_size),
                                )
                                .apply(fs.avg_duration, fs.avg_size);
                                FileComparison {
                                    file,
                                    stats: fs,
                                    relative,
                                }
                            })
                            .collect();
                        RowResult::Measured {
                            stats,
                            relative,
                            files,
                        }
                    }
                };
                ComparisonRow {
                    is_baseline: name == baseline,
                    algorithm: name,
                    result,
                }
            })
            .collect();

        Self {
            baseline: baseline.to_string(),
            baseline_status: base.status(),
            rows,
        }
    }

    pub fn row(&self, algorithm: &str) -> Option<&ComparisonRow> {
        self.rows.iter().find(|r| r.algorithm == algorithm)
    }
}
