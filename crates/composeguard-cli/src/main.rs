mod display;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use composeguard_core::config::{generate_default_config, load_config, EngineConfig};
use composeguard_core::parser::compose::ComposeParser;
use composeguard_core::report::{Report, Severity};
use composeguard_core::Engine;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_CONFIG: &str = ".composeguard.toml";

/// Exit code when findings reach the `--fail-on` threshold.
const EXIT_THRESHOLD: i32 = 2;

#[derive(Parser)]
#[command(
    name = "composeguard",
    version,
    about = "composeguard: static security checks for compose files and Dockerfiles",
    long_about = "Evaluate docker-compose manifests and Dockerfiles against container hardening rules, \
        detect hardcoded secrets, and map which services can reach each other."
)]
struct Cli {
    /// Configuration file (defaults to ./.composeguard.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a compose file
    Check {
        /// Path to the compose file
        #[arg(default_value = "docker-compose.yml")]
        path: PathBuf,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Exit with status 2 if any finding is at or above this severity
        #[arg(long)]
        fail_on: Option<Severity>,
    },

    /// Check a Dockerfile for baked-in secrets
    Dockerfile {
        #[arg(default_value = "Dockerfile")]
        path: PathBuf,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        #[arg(long)]
        fail_on: Option<Severity>,
    },

    /// Scan files for hardcoded secrets
    Scan {
        /// File or directory to scan
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Skip paths containing this substring (repeatable)
        #[arg(long)]
        ignore: Vec<String>,

        /// Suppress matches that look like test or example values
        #[arg(long)]
        ignore_test_values: bool,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show which services can reach each other
    Graph {
        #[arg(default_value = "docker-compose.yml")]
        path: PathBuf,

        #[arg(short, long, value_enum, default_value = "text")]
        format: GraphFormat,
    },

    /// Print a starter configuration file
    Init,

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum GraphFormat {
    Text,
    Mermaid,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match cli.command {
        Commands::Check { path, format, fail_on } => {
            cmd_check(&path, cli.config.as_deref(), format, fail_on)?
        }
        Commands::Dockerfile { path, format, fail_on } => {
            cmd_dockerfile(&path, cli.config.as_deref(), format, fail_on)?
        }
        Commands::Scan {
            path,
            ignore,
            ignore_test_values,
            format,
        } => cmd_scan(&path, cli.config.as_deref(), ignore, ignore_test_values, format)?,
        Commands::Graph { path, format } => cmd_graph(&path, cli.config.as_deref(), format)?,
        Commands::Init => {
            print!("{}", generate_default_config());
            0
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
            0
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "composeguard=debug,composeguard_core=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Explicit `--config`, else `./.composeguard.toml` if it exists, else defaults.
fn resolve_config(explicit: Option<&Path>) -> Result<EngineConfig> {
    match explicit {
        Some(path) => load_config(path),
        None => {
            let fallback = Path::new(DEFAULT_CONFIG);
            if fallback.is_file() {
                load_config(fallback)
            } else {
                Ok(EngineConfig::default())
            }
        }
    }
}

fn build_engine(config: EngineConfig) -> Result<Engine> {
    Engine::new(config).context("Invalid scanner pattern in configuration")
}

fn threshold_exit(report: &Report, fail_on: Option<Severity>) -> i32 {
    match fail_on {
        Some(threshold) if report.exceeds(threshold) => EXIT_THRESHOLD,
        _ => 0,
    }
}

fn cmd_check(
    path: &Path,
    config: Option<&Path>,
    format: OutputFormat,
    fail_on: Option<Severity>,
) -> Result<i32> {
    let engine = build_engine(resolve_config(config)?)?;
    let report = engine.validate_file(path)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => display::print_report(&report, &path.display().to_string()),
    }

    Ok(threshold_exit(&report, fail_on))
}

fn cmd_dockerfile(
    path: &Path,
    config: Option<&Path>,
    format: OutputFormat,
    fail_on: Option<Severity>,
) -> Result<i32> {
    let engine = build_engine(resolve_config(config)?)?;
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read Dockerfile: {}", path.display()))?;
    let report = engine.validate_dockerfile(&content);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => display::print_report(&report, &path.display().to_string()),
    }

    Ok(threshold_exit(&report, fail_on))
}

fn cmd_scan(
    path: &Path,
    config: Option<&Path>,
    ignore: Vec<String>,
    ignore_test_values: bool,
    format: OutputFormat,
) -> Result<i32> {
    let mut config = resolve_config(config)?;
    config.scanner.ignore.extend(ignore);
    config.scanner.ignore_test_values |= ignore_test_values;
    let engine = build_engine(config)?;

    let files = discover_files(path)?;
    tracing::debug!(files = files.len(), root = %path.display(), "discovered files");
    let result = engine.scan_paths(&files);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => display::print_scan_result(&result),
    }

    Ok(if result.total_matches > 0 { 1 } else { 0 })
}

fn cmd_graph(path: &Path, config: Option<&Path>, format: GraphFormat) -> Result<i32> {
    let engine = build_engine(resolve_config(config)?)?;
    let manifest = ComposeParser::parse_file(path)?;
    let analysis = engine.network_analysis(&manifest);

    match format {
        GraphFormat::Mermaid => println!("{}", analysis.topology.to_mermaid()),
        GraphFormat::Json => println!("{}", serde_json::to_string_pretty(&analysis)?),
        GraphFormat::Text => display::print_network_analysis(&analysis, &path.display().to_string()),
    }

    Ok(0)
}

fn discover_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    if path.is_dir() {
        let pattern = format!("{}/**/*", path.display());
        let mut files: Vec<PathBuf> = glob::glob(&pattern)
            .context("Failed to read glob pattern")?
            .filter_map(|r| r.ok())
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        return Ok(files);
    }

    anyhow::bail!("Path '{}' does not exist", path.display());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_check_with_threshold() {
        let cli = Cli::try_parse_from([
            "composeguard",
            "check",
            "compose.yml",
            "--format",
            "json",
            "--fail-on",
            "high",
        ])
        .unwrap();
        match cli.command {
            Commands::Check { path, format, fail_on } => {
                assert_eq!(path, PathBuf::from("compose.yml"));
                assert!(format == OutputFormat::Json);
                assert_eq!(fail_on, Some(Severity::High));
            }
            _ => panic!("expected check"),
        }
    }

    #[test]
    fn test_discover_files_walks_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("a.env"), "A=1").unwrap();
        std::fs::write(dir.path().join("nested/b.js"), "let b;").unwrap();

        let files = discover_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(discover_files(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_resolve_explicit_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "profile = \"lenient\"\n").unwrap();
        let config = resolve_config(Some(&path)).unwrap();
        assert!(!config.is_enabled("recommend-seccomp"));
    }

    #[test]
    fn test_threshold_exit() {
        let engine = Engine::with_defaults().unwrap();
        let report = engine
            .validate_str("services:\n  app:\n    privileged: true\n")
            .unwrap();
        assert_eq!(threshold_exit(&report, Some(Severity::Critical)), EXIT_THRESHOLD);
        assert_eq!(threshold_exit(&report, None), 0);

        let clean = engine.validate_dockerfile("FROM alpine\n");
        assert_eq!(threshold_exit(&clean, Some(Severity::Low)), 0);
    }
}
