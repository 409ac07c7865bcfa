use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::Algorithm;

/// One `Benchmarked <file> ...` line from the tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub file: String,
    pub duration_seconds: f64,
    pub size_bytes: u64,
}

/// All records observed during one invocation of the tool, in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEntry {
    /// 1-based run index, unique within an algorithm.
    pub run: u32,
    pub results: Vec<MeasurementRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlgorithmResults {
    pub algorithm: String,
    pub runs: Vec<RunEntry>,
}

impl AlgorithmResults {
    pub fn new(algorithm: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            runs: Vec::new(),
        }
    }

    pub fn run(&self, run: u32) -> Option<&RunEntry> {
        self.runs.iter().find(|r| r.run == run)
    }

    /// Locate the entry for `run`, creating it at the end of the run list on first use.
    pub fn run_mut(&mut self, run: u32) -> &mut RunEntry {
        let idx = match self.runs.iter().position(|r| r.run == run) {
            Some(idx) => idx,
            None => {
                self.runs.push(RunEntry {
                    run,
                    results: Vec::new(),
                });
                self.runs.len() - 1
            }
        };
        &mut self.runs[idx]
    }

    /// Every record across every run, runs in list order.
    pub fn records(&self) -> impl Iterator<Item = &MeasurementRecord> + '_ {
        self.runs.iter().flat_map(|r| r.results.iter())
    }

    pub fn sample_count(&self) -> usize {
        self.runs.iter().map(|r| r.results.len()).sum()
    }
}

/// `algorithm -> runs`, kept in first-insertion order so the persisted file reads in sweep order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Compressions(Vec<AlgorithmResults>);

impl Compressions {
    pub fn get(&self, algorithm: &str) -> Option<&AlgorithmResults> {
        self.0.iter().find(|a| a.algorithm == algorithm)
    }

    pub fn entry_mut(&mut self, algorithm: &str) -> &mut AlgorithmResults {
        let idx = match self.0.iter().position(|a| a.algorithm == algorithm) {
            Some(idx) => idx,
            None => {
                self.0.push(AlgorithmResults::new(algorithm));
                self.0.len() - 1
            }
        };
        &mut self.0[idx]
    }

    pub fn iter(&self) -> impl Iterator<Item = &AlgorithmResults> + '_ {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Compressions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for alg in &self.0 {
            map.serialize_entry(&alg.algorithm, &alg.runs)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Compressions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CompressionsVisitor;

        impl<'de> Visitor<'de> for CompressionsVisitor {
            type Value = Compressions;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of algorithm name to run list")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut out = Compressions::default();
                while let Some((algorithm, runs)) = access.next_entry::<String, Vec<RunEntry>>()? {
                    let entry = out.entry_mut(&algorithm);
                    // Duplicate keys merge into the first occurrence.
                    for run in runs {
                        entry.run_mut(run.run).results.extend(run.results);
                    }
                }
                Ok(out)
            }
        }

        deserializer.deserialize_map(CompressionsVisitor)
    }
}

fn default_baseline() -> String {
    Algorithm::default().as_str().to_string()
}

/// The persisted result document. This is the whole state of a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsDocument {
    /// ISO-8601 time the sweep started.
    pub timestamp: String,
    /// Benchmark configuration name passed to the tool.
    pub configuration: String,
    /// Requested runs per algorithm.
    pub runs: u32,
    /// File filter pattern, if any.
    pub regexp: Option<String>,
    // Documents written before baselines existed lack this field.
    #[serde(default = "default_baseline")]
    pub baseline: String,
    #[serde(default)]
    pub compressions: Compressions,
}

impl ResultsDocument {
    pub fn new(
        configuration: impl Into<String>,
        runs: u32,
        regexp: Option<String>,
        baseline: Algorithm,
    ) -> Self {
        Self {
            timestamp: now_local_iso8601(),
            configuration: configuration.into(),
            runs,
            regexp,
            baseline: baseline.as_str().to_string(),
            compressions: Compressions::default(),
        }
    }

    pub fn algorithm(&self, algorithm: &str) -> Option<&AlgorithmResults> {
        self.compressions.get(algorithm)
    }

    /// Records for `algorithm` flattened across runs, or an empty iterator.
    pub fn records_for<'a>(
        &'a self,
        algorithm: &str,
    ) -> impl Iterator<Item = &'a MeasurementRecord> + 'a {
        self.compressions
            .get(algorithm)
            .into_iter()
            .flat_map(|a| a.records())
    }
}

fn now_local_iso8601() -> String {
    chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, false)
}
