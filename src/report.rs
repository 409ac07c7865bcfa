//! Plain-text tables for a result document.
//!
//! Rendering is a pure consumer of [`ResultsDocument`] and [`Comparison`]; all output goes to a
//! caller-supplied writer.

use std::io::{self, Write};

use crate::error::StatsError;
use crate::schema::ResultsDocument;
use crate::stats::{Comparison, RowResult};

/// `1234567` -> `"1,234,567"`.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn grouped_f64(x: f64) -> String {
    if x.is_finite() && x >= 0.0 {
        group_thousands(x.round() as u64)
    } else {
        format!("{x:.0}")
    }
}

fn rel_cell(rel: &Result<f64, StatsError>) -> String {
    match rel {
        Ok(pct) => format!("{pct:.1}%"),
        Err(_) => "n/a".to_string(),
    }
}

/// One table per algorithm listing every record with its run index.
pub fn write_individual_results(w: &mut impl Write, doc: &ResultsDocument) -> io::Result<()> {
    writeln!(w, "{}", "=".repeat(80))?;
    writeln!(w, "INDIVIDUAL BENCHMARK RESULTS")?;
    writeln!(w, "{}", "=".repeat(80))?;

    for alg in doc.compressions.iter().filter(|a| a.sample_count() > 0) {
        writeln!(w)?;
        writeln!(w, "{} Results:", alg.algorithm)?;
        writeln!(w, "{}", "-".repeat(80))?;
        writeln!(
            w,
            "{:<40} {:>12} {:>15} {:>8}",
            "File", "Duration (s)", "Size (bytes)", "Run"
        )?;
        writeln!(w, "{}", "-".repeat(80))?;
        for run in &alg.runs {
            for r in &run.results {
                writeln!(
                    w,
                    "{:<40} {:>12.2} {:>15} {:>8}",
                    r.file,
                    r.duration_seconds,
                    group_thousands(r.size_bytes),
                    run.run
                )?;
            }
        }
    }
    Ok(())
}

/// The per-algorithm summary, relative to the comparison's baseline.
///
/// Standard deviation columns appear only when the document asked for more than one run.
pub fn write_summary(w: &mut impl Write, doc: &ResultsDocument, cmp: &Comparison) -> io::Result<()> {
    let show_stddev = doc.runs > 1;
    let width = if show_stddev { 100 } else { 75 };

    writeln!(w)?;
    writeln!(w, "{}", "=".repeat(width))?;
    writeln!(w, "COMPREHENSIVE SUMMARY")?;
    if let Some(filter) = &doc.regexp {
        writeln!(w, "(Filter: {filter})")?;
    }
    writeln!(w, "Baseline: {}", cmp.baseline)?;
    writeln!(w, "{}", "=".repeat(width))?;

    if show_stddev {
        writeln!(
            w,
            "  {:<12} {:>12} {:>10} {:>8} {:>15} {:>12} {:>8} {:>8}",
            "Algorithm", "Avg Duration", "±StdDev", "Rel%", "Avg Size", "±StdDev", "Rel%", "Files"
        )?;
    } else {
        writeln!(
            w,
            "  {:<12} {:>12} {:>8} {:>15} {:>8} {:>8}",
            "Algorithm", "Avg Duration", "Rel%", "Avg Size", "Rel%", "Files"
        )?;
    }
    writeln!(w, "{}", "-".repeat(width))?;

    for row in &cmp.rows {
        let marker = if row.is_baseline { "→ " } else { "  " };
        let (stats, relative) = match &row.result {
            RowResult::NoResults => {
                writeln!(w, "{marker}{:<12} {:<70}", row.algorithm, "No results")?;
                continue;
            }
            RowResult::Measured {
                stats, relative, ..
            } => (stats, relative),
        };

        let rel_d = rel_cell(&relative.duration);
        let rel_s = rel_cell(&relative.size);
        if show_stddev {
            writeln!(
                w,
                "{marker}{:<12} {:>11.2}s ±{:>8.2}s {:>8} {:>14} ±{:>10} {:>8} {:>8}",
                row.algorithm,
                stats.avg_duration,
                stats.std_duration,
                rel_d,
                grouped_f64(stats.avg_size),
                grouped_f64(stats.std_size),
                rel_s,
                stats.sample_count
            )?;
        } else {
            writeln!(
                w,
                "{marker}{:<12} {:>11.2}s {:>8} {:>14} {:>8} {:>8}",
                row.algorithm,
                stats.avg_duration,
                rel_d,
                grouped_f64(stats.avg_size),
                rel_s,
                stats.sample_count
            )?;
        }
    }

    writeln!(w)?;
    writeln!(w, "{}", "=".repeat(width))?;
    writeln!(w, "NOTES:")?;
    match &cmp.baseline_status {
        Ok(()) => writeln!(w, "- Baseline ({}) is marked with →", cmp.baseline)?,
        Err(e) => writeln!(w, "- Baseline unavailable: {e}; Rel% not computed")?,
    }
    writeln!(w, "- Rel% = Relative percentage compared to baseline (lower is better)")?;
    writeln!(w, "- Duration: Time to compress one file, averaged over files and runs")?;
    writeln!(w, "- Size: Compressed file size, averaged over files and runs")?;
    writeln!(w, "- Files: Total number of benchmark results across runs")?;
    if show_stddev {
        writeln!(w, "- StdDev: Sample standard deviation across multiple runs")?;
    } else {
        writeln!(w, "- Standard deviation not shown (single run mode)")?;
    }
    Ok(())
}

/// File-level comparison: each file's averages relative to the same file under the baseline.
pub fn write_per_file(w: &mut impl Write, cmp: &Comparison) -> io::Result<()> {
    writeln!(w)?;
    writeln!(w, "{}", "=".repeat(100))?;
    writeln!(w, "PER-FILE COMPARISON (Baseline: {})", cmp.baseline)?;
    writeln!(w, "{}", "=".repeat(100))?;

    for row in &cmp.rows {
        let RowResult::Measured { files, .. } = &row.result else {
            continue;
        };
        writeln!(w)?;
        writeln!(w, "{}:", row.algorithm)?;
        writeln!(
            w,
            "  {:<40} {:>12} {:>8} {:>15} {:>8} {:>8}",
            "File", "Avg Duration", "Rel%", "Avg Size", "Rel%", "Samples"
        )?;
        for f in files {
            writeln!(
                w,
                "  {:<40} {:>11.2}s {:>8} {:>15} {:>8} {:>8}",
                f.file,
                f.stats.avg_duration,
                rel_cell(&f.relative.duration),
                grouped_f64(f.stats.avg_size),
                rel_cell(&f.relative.size),
                f.stats.samples
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MeasurementRecord;
    use crate::Algorithm;

    fn doc(runs: u32) -> ResultsDocument {
        let mut doc = ResultsDocument::new("reasonable-default", runs, Some("dotty.*".into()), Algorithm::None);
        for (alg, run, d, s) in [
            ("NONE", 1, 1.0, 1_000_000),
            ("NONE", 2, 1.2, 1_000_000),
            ("GZIP", 1, 0.5, 300_000),
            ("GZIP", 2, 0.6, 340_000),
        ] {
            doc.compressions.entry_mut(alg).run_mut(run).results.push(MeasurementRecord {
                file: "a.jfr".into(),
                duration_seconds: d,
                size_bytes: s,
            });
        }
        doc
    }

    fn render(f: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn row<'a>(out: &'a str, algorithm: &str) -> &'a str {
        out.lines()
            .find(|l| l.trim_start_matches(['→', ' ']).starts_with(algorithm))
            .unwrap()
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1234567), "1,234,567");
    }

    #[test]
    fn test_summary_marks_baseline_and_missing() {
        let d = doc(2);
        let cmp = Comparison::build(&d, "NONE", &[Algorithm::None, Algorithm::Gzip, Algorithm::Xz]);
        let out = render(|w| write_summary(w, &d, &cmp));

        assert!(out.contains("(Filter: dotty.*)"));
        assert!(out.contains("±StdDev"));
        let none = row(&out, "NONE");
        assert!(none.starts_with("→ "));
        assert!(none.contains("100.0%"));
        let gzip = row(&out, "GZIP");
        assert!(gzip.starts_with("  "));
        assert!(gzip.contains("50.0%"));
        assert!(gzip.contains("320,000"));
        assert!(row(&out, "XZ").contains("No results"));
    }

    #[test]
    fn test_single_run_hides_stddev() {
        let d = doc(1);
        let cmp = Comparison::build(&d, "NONE", &[]);
        let out = render(|w| write_summary(w, &d, &cmp));
        assert!(!out.contains("±StdDev"));
        assert!(out.contains("single run mode"));
    }

    #[test]
    fn test_missing_baseline_renders_na() {
        let d = doc(2);
        let cmp = Comparison::build(&d, "ZSTD", &[]);
        let out = render(|w| write_summary(w, &d, &cmp));
        let gzip = row(&out, "GZIP");
        assert!(gzip.contains("n/a"));
        assert!(out.contains("Baseline unavailable: baseline ZSTD has no results"));
    }

    #[test]
    fn test_individual_and_per_file_tables() {
        let d = doc(2);
        let out = render(|w| write_individual_results(w, &d));
        assert!(out.contains("GZIP Results:"));
        assert_eq!(out.lines().filter(|l| l.starts_with("a.jfr")).count(), 4);

        let cmp = Comparison::build(&d, "NONE", &[]);
        let out = render(|w| write_per_file(w, &cmp));
        assert!(out.contains("PER-FILE COMPARISON (Baseline: NONE)"));
        assert!(out.lines().any(|l| l.contains("a.jfr") && l.contains("50.0%")));
    }
}
