use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use floundermode_api::{BackendConfig, DictionaryApi};
use floundermode_build::{
    live_vote_source, run, BuildOptions, BuildSummary, SiteConfig, VoteSource, DEFAULT_CONFIG_FILE,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "flounder-build")]
#[command(about = "Generate term pages for the Floundermode dictionary, re-rendering only changed files")]
struct Cli {
    /// Ignore the manifest and regenerate every page.
    #[arg(short, long)]
    force: bool,

    /// Also report unchanged files.
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn vote_source(config: &SiteConfig) -> Option<DictionaryApi> {
    if !config.live_votes {
        return None;
    }
    match BackendConfig::from_env() {
        Ok(backend) => live_vote_source(config, &backend),
        Err(err) => {
            tracing::warn!(error = %err, "live votes disabled; rendering file counts");
            None
        }
    }
}

fn print_summary(summary: &BuildSummary, verbose: bool) {
    println!(
        "Build complete: {} new, {} changed, {} regenerated, {} unchanged, {} failed, {} pruned",
        summary.new.len(),
        summary.changed.len(),
        summary.regenerated.len(),
        summary.unchanged.len(),
        summary.failures.len(),
        summary.pruned.len()
    );
    for file_id in &summary.new {
        println!("  new: {file_id}");
    }
    for file_id in &summary.changed {
        println!("  changed: {file_id}");
    }
    for file_id in &summary.regenerated {
        println!("  regenerated: {file_id}");
    }
    if verbose {
        for file_id in &summary.unchanged {
            println!("  unchanged: {file_id}");
        }
    }
    for failure in &summary.failures {
        println!("  failed: {} ({})", failure.file_id, failure.reason);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = std::env::var_os("FLOUNDER_CONFIG")
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from);
    let config = SiteConfig::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    let votes = vote_source(&config);
    let options = BuildOptions { force_regenerate: cli.force, verbose: cli.verbose };
    let summary = run(&config, options, votes.as_ref().map(|api| api as &dyn VoteSource))
        .context("build aborted")?;

    print_summary(&summary, cli.verbose);
    Ok(())
}
