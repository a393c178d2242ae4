use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;
use flowgraph_core::gexf::save_gexf;
use flowgraph_core::{
    IdentityMode, IngestOptions, IngestOutcome, IngestProgressCallback, execute_ingest,
    generate_ingest_report,
};
use flowgraph_source::BatchReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use tracing::level_filters::LevelFilter;

/// Typed view of the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub input_dir: PathBuf,
    pub base_dir: Option<PathBuf>,
    pub output: PathBuf,
    pub identity: IdentityMode,
    pub include_first_party: bool,
    pub silent: bool,
    pub verbosity: u8,
}

impl RunConfig {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        let path_arg = |id: &str| matches.get_one::<String>(id).map(|p| expand_path(p));

        let identity = if matches.get_flag("sld") {
            IdentityMode::Sld
        } else {
            IdentityMode::Fqdn
        };

        Self {
            input_dir: path_arg("INPUT_DIR").unwrap_or_default(),
            base_dir: path_arg("base-dir"),
            output: path_arg("output").unwrap_or_else(|| PathBuf::from("graph.gexf")),
            identity,
            include_first_party: matches.get_flag("first-party"),
            silent: matches.get_flag("silent"),
            verbosity: matches.get_count("verbose"),
        }
    }

    /// Input directory after `--base-dir` resolution
    pub fn resolved_input_dir(&self) -> PathBuf {
        resolve_input_dir(&self.input_dir, self.base_dir.as_deref())
    }
}

/// Expand a leading `~` to the user's home directory
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

/// The path as given when it exists; otherwise a relative path is tried under
/// `base_dir`.
pub fn resolve_input_dir(input: &Path, base_dir: Option<&Path>) -> PathBuf {
    if input.exists() {
        return input.to_path_buf();
    }
    match base_dir {
        Some(base) if input.is_relative() => base.join(input),
        _ => input.to_path_buf(),
    }
}

pub fn verbosity_level(count: u8) -> LevelFilter {
    match count {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Read every batch, aggregate the graph and write it to `config.output`.
/// Nothing is written when any step fails.
pub async fn run(config: &RunConfig) -> Result<IngestOutcome> {
    let input_dir = config.resolved_input_dir();
    let reader = BatchReader::discover(&input_dir)
        .with_context(|| format!("Cannot read batches from {}", input_dir.display()))?;

    debug!(
        "Building {} graph from {} batch(es), first-party {}",
        config.identity.as_str(),
        reader.len(),
        if config.include_first_party { "included" } else { "excluded" }
    );

    let options = IngestOptions {
        reader,
        identity: config.identity,
        include_first_party: config.include_first_party,
        show_progress: !config.silent,
    };
    let progress_callback: IngestProgressCallback = Arc::new(|msg: String| debug!("{}", msg));

    let outcome = execute_ingest(options, Some(progress_callback))
        .await
        .context("Ingestion failed")?;

    save_gexf(&outcome.graph, &config.output).context("Cannot save graph")?;

    Ok(outcome)
}

pub async fn handle_build(matches: &ArgMatches) {
    let config = RunConfig::from_matches(matches);

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(verbosity_level(config.verbosity))
        .with_target(false)
        .init();

    match run(&config).await {
        Ok(outcome) => {
            if !config.silent {
                println!(
                    "\n{} Graph written to {}\n",
                    "✓".green().bold(),
                    config.output.display()
                );
                print!("{}", generate_ingest_report(&outcome.stats, &outcome.graph));
            }
        }
        Err(e) => {
            eprintln!("{} {:#}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    }
}
