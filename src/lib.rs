use clap::ValueEnum;
use std::fmt;
use std::str::FromStr;

pub mod error;
pub mod extract;
pub mod harness;
pub mod report;
pub mod runner;
pub mod schema;
pub mod stats;
pub mod store;
pub mod sweep;

/// Compression variant accepted by `cjfr benchmark --compression`.
///
/// Declaration order is the sweep order.
#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[value(rename_all = "UPPER")]
pub enum Algorithm {
    /// No compression, raw condensed stream.
    None,
    Gzip,
    /// LZ4 frame format with independent blocks; the default baseline.
    #[default]
    Lz4framed,
    Zlib,
    Xz,
    Bzip2,
    Lzma,
    Zstd,
    Snappy,
}

impl Algorithm {
    pub const ALL: [Algorithm; 9] = [
        Algorithm::None,
        Algorithm::Gzip,
        Algorithm::Lz4framed,
        Algorithm::Zlib,
        Algorithm::Xz,
        Algorithm::Bzip2,
        Algorithm::Lzma,
        Algorithm::Zstd,
        Algorithm::Snappy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::None => "NONE",
            Algorithm::Gzip => "GZIP",
            Algorithm::Lz4framed => "LZ4FRAMED",
            Algorithm::Zlib => "ZLIB",
            Algorithm::Xz => "XZ",
            Algorithm::Bzip2 => "BZIP2",
            Algorithm::Lzma => "LZMA",
            Algorithm::Zstd => "ZSTD",
            Algorithm::Snappy => "SNAPPY",
        }
    }

    /// Position in the sweep order; unknown document keys sort after every known one.
    pub fn sweep_rank(name: &str) -> usize {
        Algorithm::ALL
            .iter()
            .position(|a| a.as_str() == name)
            .unwrap_or(Algorithm::ALL.len())
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown compression algorithm: {0}")]
pub struct UnknownAlgorithm(pub String);

impl FromStr for Algorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Algorithm::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownAlgorithm(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("gzip".parse::<Algorithm>().unwrap(), Algorithm::Gzip);
        assert_eq!("LZ4FRAMED".parse::<Algorithm>().unwrap(), Algorithm::Lz4framed);
        assert!("brotli".parse::<Algorithm>().is_err());
    }

    #[test]
    fn test_sweep_order_is_declaration_order() {
        let names: Vec<&str> = Algorithm::ALL.iter().map(Algorithm::as_str).collect();
        assert_eq!(
            names,
            ["NONE", "GZIP", "LZ4FRAMED", "ZLIB", "XZ", "BZIP2", "LZMA", "ZSTD", "SNAPPY"]
        );
        assert_eq!(Algorithm::sweep_rank("GZIP"), 1);
        assert_eq!(Algorithm::sweep_rank("BROTLI"), Algorithm::ALL.len());
    }

    #[test]
    fn test_value_enum_names_match_tool_identifiers() {
        for alg in Algorithm::ALL {
            let pv = alg.to_possible_value().unwrap();
            assert_eq!(pv.get_name(), alg.as_str());
        }
    }
}
