use anyhow::{anyhow, Result};
use cache_sim::sim::Timing;
use serde::Deserialize;

use crate::Cli;

/// geometry and timing read from `--config`. every field may be overridden on the command line.
#[derive(Default, Deserialize, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub cache_kb: Option<u64>,
    pub block: Option<u64>,
    pub assoc: Option<u64>,
    pub hit_time: Option<f64>,
    pub miss_penalty: Option<f64>,
}

impl FileConfig {
    pub fn deser(file: impl std::io::Read) -> Result<Self> {
        Ok(serde_json::from_reader(file)?)
    }
}

#[derive(Debug, PartialEq)]
pub struct SimConfig {
    pub cache_kb: u64,
    pub block: u64,
    pub assoc: u64,
    pub timing: Timing,
}

impl SimConfig {
    pub fn merge(args: &Cli, file: Option<FileConfig>) -> Result<Self> {
        let file = file.unwrap_or_default();
        let g = &args.geometry;
        let cache_kb = g
            .cache_kb
            .or(file.cache_kb)
            .ok_or_else(|| anyhow!("cache size not given (--cache-kb or `cache_kb`)"))?;
        let block = g
            .block
            .or(file.block)
            .ok_or_else(|| anyhow!("block size not given (--block or `block`)"))?;
        let assoc = g
            .assoc
            .or(file.assoc)
            .ok_or_else(|| anyhow!("associativity not given (--assoc or `assoc`)"))?;
        let timing = Timing {
            hit_time: args
                .hit_time
                .or(file.hit_time)
                .unwrap_or(Timing::DEFAULT_HIT_TIME),
            miss_penalty: args
                .miss_penalty
                .or(file.miss_penalty)
                .unwrap_or(Timing::DEFAULT_MISS_PENALTY),
        };
        Ok(Self {
            cache_kb,
            block,
            assoc,
            timing,
        })
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("cli").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_flags_only() {
        let cli = parse(&["--cache-kb", "32", "--block", "64", "--assoc", "4", "-t", "t.txt"]);
        let c = SimConfig::merge(&cli, None).unwrap();
        assert_eq!(
            c,
            SimConfig {
                cache_kb: 32,
                block: 64,
                assoc: 4,
                timing: Timing::default(),
            }
        );
    }

    #[test]
    fn test_geometry_required_without_config() {
        let r = Cli::try_parse_from(["cli", "--cache-kb", "32", "--trace", "t.txt"]);
        assert!(r.is_err());
    }

    #[test]
    fn test_flags_override_file() {
        let cli = parse(&[
            "--config",
            "c.json",
            "--assoc",
            "0",
            "--miss-penalty",
            "100",
            "--trace",
            "t.txt",
        ]);
        let file = FileConfig::deser(
            r#"{ "cache_kb": 8, "block": 32, "assoc": 2, "hit_time": 2.0, "miss_penalty": 20.0 }"#
                .as_bytes(),
        )
        .unwrap();
        let c = SimConfig::merge(&cli, Some(file)).unwrap();
        assert_eq!(c.cache_kb, 8);
        assert_eq!(c.block, 32);
        assert_eq!(c.assoc, 0);
        assert_eq!(c.timing.hit_time, 2.0);
        assert_eq!(c.timing.miss_penalty, 100.0);
    }

    #[test]
    fn test_incomplete_config() {
        let cli = parse(&["--config", "c.json", "--trace", "t.txt"]);
        let file = FileConfig::deser(r#"{ "cache_kb": 8, "block": 32 }"#.as_bytes()).unwrap();
        assert!(SimConfig::merge(&cli, Some(file)).is_err());
    }

    #[test]
    fn test_unknown_config_field() {
        assert!(FileConfig::deser(r#"{ "cache_size": 8 }"#.as_bytes()).is_err());
    }
}
