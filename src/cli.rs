//! Command line surface for the `vigil` binary

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tabled::{Table, Tabled};

use crate::config::AppConfig;
use crate::coordinator::Manifest;
use crate::domain::{SessionSpec, StartPosition};
use crate::error::{Result, VigilError};
use crate::heuristics::HeuristicEngine;

#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(author, version, about = "Session-based blockchain threat monitoring")]
pub struct Cli {
    /// Directory holding default.toml and environment overrides
    #[arg(long, global = true, default_value = "config", env = "VIGIL_CONFIG_DIR")]
    pub config_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the monitoring service until SIGINT/SIGTERM
    Run {
        /// Session manifest to apply at startup (overrides bootstrap_path)
        #[arg(short, long)]
        bootstrap: Option<PathBuf>,
    },

    /// Check a session manifest without starting anything
    Validate {
        manifest: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the registered heuristics and their parameters
    Heuristics {
        #[arg(long)]
        json: bool,
    },
}

/// One manifest entry as seen by `vigil validate`
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct ValidationRow {
    pub index: usize,
    pub chain: String,
    pub heuristic: String,
    pub result: String,
}

impl ValidationRow {
    pub fn is_ok(&self) -> bool {
        self.result == "ok"
    }
}

#[derive(Debug, Clone, Serialize, Tabled)]
pub struct ParamRow {
    pub heuristic: String,
    pub param: String,
    #[tabled(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub required: bool,
    pub description: String,
}

/// Offline checks: heuristic params, configured chain targets, height range
pub fn check_spec(engine: &HeuristicEngine, config: &AppConfig, spec: &SessionSpec) -> Result<()> {
    engine.validate(spec)?;

    if !config.chains.contains_key(spec.chain_target.as_str()) {
        return Err(VigilError::InvalidSpec(format!(
            "unknown chain target '{}'",
            spec.chain_target
        )));
    }

    if let (StartPosition::Height(start), Some(end)) = (spec.start, spec.end_height) {
        if end < start {
            return Err(VigilError::InvalidSpec(format!(
                "end height {} is before start height {}",
                end, start
            )));
        }
    }
    Ok(())
}

pub fn validate_manifest(engine: &HeuristicEngine, config: &AppConfig, manifest: &Manifest) -> Vec<ValidationRow> {
    manifest
        .entries
        .iter()
        .zip(manifest.specs())
        .enumerate()
        .map(|(index, (raw, decoded))| {
            let field = |name: &str| {
                raw.get(name)
                    .and_then(|v| v.as_str())
                    .unwrap_or("?")
                    .to_string()
            };
            match decoded {
                Ok(spec) => ValidationRow {
                    index,
                    chain: spec.chain_target.to_string(),
                    heuristic: spec.heuristic_type.to_string(),
                    result: match check_spec(engine, config, &spec) {
                        Ok(()) => "ok".to_string(),
                        Err(e) => e.to_string(),
                    },
                },
                Err(e) => ValidationRow {
                    index,
                    chain: field("chain_target"),
                    heuristic: field("heuristic_type"),
                    result: e.to_string(),
                },
            }
        })
        .collect()
}

pub fn heuristic_rows(engine: &HeuristicEngine) -> Vec<ParamRow> {
    let mut rows = Vec::new();
    for heuristic in engine.heuristics() {
        for param in heuristic.schema() {
            rows.push(ParamRow {
                heuristic: heuristic.kind().to_string(),
                param: param.name.to_string(),
                kind: param.kind.as_str().to_string(),
                required: param.required,
                description: param.description.to_string(),
            });
        }
    }
    rows
}

/// Print rows as a table, or as pretty JSON with `json`
pub fn print_rows<T: Tabled + Serialize>(rows: &[T], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(rows)?);
    } else if rows.is_empty() {
        println!("(no results)");
    } else {
        println!("{}", Table::new(rows));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainConfig;

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.chains.insert(
            "layer1".to_string(),
            ChainConfig {
                rpc_url: "http://127.0.0.1:8545".to_string(),
                confirmations: 0,
                max_blocks_per_batch: 10,
                request_timeout_ms: 1_000,
                connect_attempts: 1,
            },
        );
        config
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from(["vigil", "run", "--bootstrap", "sessions.json"]).unwrap();
        match cli.command {
            Commands::Run { bootstrap } => assert_eq!(bootstrap, Some(PathBuf::from("sessions.json"))),
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.config_dir, PathBuf::from("config"));
    }

    #[test]
    fn test_validate_manifest_reports_each_entry() {
        let manifest = Manifest::parse(
            r#"[
                {"chain_target": "layer1", "heuristic_type": "large_transfer", "params": {"threshold": "10"}},
                {"chain_target": "layer9", "heuristic_type": "large_transfer", "params": {"threshold": "10"}},
                {"chain_target": "layer1", "heuristic_type": "large_transfer", "params": {"threshold": "10"}, "start": 20, "end_height": 5},
                {"chain_target": "layer1", "heuristic_type": "bogus"}
            ]"#,
        )
        .unwrap();

        let rows = validate_manifest(&HeuristicEngine::with_defaults(), &config(), &manifest);
        assert_eq!(rows.len(), 4);
        assert!(rows[0].is_ok());
        assert!(rows[1].result.contains("unknown chain target"));
        assert!(rows[2].result.contains("before start height"));
        assert_eq!(rows[3].heuristic, "bogus");
        assert!(!rows[3].is_ok());
    }

    #[test]
    fn test_heuristic_rows_cover_every_kind() {
        let rows = heuristic_rows(&HeuristicEngine::with_defaults());
        for kind in crate::domain::HeuristicKind::ALL {
            assert!(rows.iter().any(|r| r.heuristic == kind.to_string()));
        }
    }
}
