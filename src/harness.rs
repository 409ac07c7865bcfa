use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::SetupError;
use crate::Algorithm;

pub const DEFAULT_TOOL: &str = "./cjfr";
pub const DEFAULT_CONFIGURATION: &str = "reasonable-default";
pub const DEFAULT_RUNS: u32 = 3;
pub const DEFAULT_OUTPUT: &str = "compression_benchmark_results.json";

/// File filter used by `--small`: the dotty and "all" G1 recordings are the quick ones.
pub const SMALL_FILTER: &str = "(.*dotty.*|.*all.*).*G1.*";

/// A concrete command line for one child process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Shell-ish rendering for logs only.
    pub fn display(&self) -> String {
        let mut out = self.program.display().to_string();
        for a in &self.args {
            out.push(' ');
            out.push_str(a);
        }
        out
    }
}

#[derive(Clone, Debug)]
pub struct SweepConfig {
    /// Path (or `PATH`-resolved name) of the benchmarking tool.
    pub tool: PathBuf,
    pub configuration: String,
    pub runs: u32,
    pub filter: Option<String>,
    pub baseline: Algorithm,
    /// Algorithms to sweep, in order.
    pub algorithms: Vec<Algorithm>,
    pub output: PathBuf,
    /// Per-invocation limit; `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            tool: PathBuf::from(DEFAULT_TOOL),
            configuration: DEFAULT_CONFIGURATION.to_string(),
            runs: DEFAULT_RUNS,
            filter: None,
            baseline: Algorithm::default(),
            algorithms: Algorithm::ALL.to_vec(),
            output: PathBuf::from(DEFAULT_OUTPUT),
            timeout: None,
        }
    }
}

impl SweepConfig {
    /// `<tool> benchmark --configuration <cfg> --compression <ALG> [--regexp <filter>]`
    pub fn invocation(&self, algorithm: Algorithm) -> Invocation {
        let mut inv = Invocation::new(&self.tool)
            .arg("benchmark")
            .arg("--configuration")
            .arg(&self.configuration)
            .arg("--compression")
            .arg(algorithm.as_str());
        if let Some(filter) = &self.filter {
            inv = inv.arg("--regexp").arg(filter);
        }
        inv
    }

    /// Fatal setup checks. Nothing has been spawned or written when this fails.
    pub fn validate(&self) -> Result<(), SetupError> {
        if self.runs == 0 {
            return Err(SetupError::InvalidRuns(self.runs));
        }
        if self.algorithms.is_empty() {
            return Err(SetupError::NoAlgorithms);
        }
        if let Some(pattern) = &self.filter {
            Regex::new(pattern).map_err(|source| SetupError::InvalidFilter {
                pattern: pattern.clone(),
                source,
            })?;
        }
        validate_output_path(&self.output)?;

        // Bare names are looked up on PATH at spawn time; a spawn failure there is a pair failure.
        if has_separator(&self.tool) && !self.tool.is_file() {
            return Err(SetupError::ToolNotFound {
                path: self.tool.clone(),
            });
        }
        Ok(())
    }
}

fn has_separator(path: &Path) -> bool {
    path.components().count() > 1 || path.is_absolute()
}

fn validate_output_path(path: &Path) -> Result<(), SetupError> {
    let fail = |reason: &str| SetupError::OutputPath {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    if path.as_os_str().is_empty() {
        return Err(fail("path is empty"));
    }
    if path.is_dir() {
        return Err(fail("path is a directory"));
    }
    if path.file_name().is_none() {
        return Err(fail("path has no file name"));
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            Err(fail("parent directory does not exist"))
        }
        _ => Ok(()),
    }
}
