// repolens CLI - ingest source repositories into a queryable project store
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use repolens::{
    init_logging_with_level, FileProjectStore, GitAccessor, GitAccessorConfig, ProjectIngestor,
    ProjectOptions, ProjectStatus, RepoProjectResult,
};

#[derive(Parser)]
#[command(name = "repolens", about = "Ingest source repositories for retrieval-augmented querying", version)]
struct Cli {
    /// Root directory for the project store and working trees
    #[arg(short = 'd', long, default_value = ".repolens", env = "REPOLENS_DATA_DIR", global = true)]
    data_dir: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors and the status line
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// Local directory or remote git URL
    location: String,

    /// Project name (inferred from the location when omitted)
    #[arg(long)]
    name: Option<String>,

    /// Access token for the remote host
    #[arg(long, env = "REPOLENS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Only ingest files under this subdirectory
    #[arg(long)]
    subdir: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a project from a repository, or apply updates to it
    Ingest(SourceArgs),
    /// Check whether a previously ingested repository has updates
    Probe(SourceArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging_with_level(cli.verbose, cli.quiet)?;

    let store = Arc::new(FileProjectStore::new(cli.data_dir.join("store")));
    let accessor = Arc::new(GitAccessor::new(GitAccessorConfig::new(
        cli.data_dir.join("worktrees"),
    )));
    let ingestor = ProjectIngestor::new(store, accessor);

    let (source, probe_only) = match cli.command {
        Commands::Ingest(args) => (args, false),
        Commands::Probe(args) => (args, true),
    };

    let result = ingestor
        .create_project_from_repo(
            &source.location,
            ProjectOptions {
                name: source.name,
                token: source.token,
                subdirectory: source.subdir,
                probe_only,
            },
        )
        .await?;

    print_result(&result, cli.quiet);
    Ok(())
}

fn print_result(result: &RepoProjectResult, quiet: bool) {
    println!("status: {}", result.status);
    if quiet {
        return;
    }

    match result.status {
        ProjectStatus::Created | ProjectStatus::Applied => {
            println!("files ingested: {}", result.files_ingested);
            println!("files skipped:  {}", result.files_skipped);
        }
        ProjectStatus::UpdatesAvailable => {
            println!(
                "previous: {}",
                result.previous_identifier.as_deref().unwrap_or("none")
            );
            println!(
                "new:      {}",
                result.new_identifier.as_deref().unwrap_or("none")
            );
            println!("run `repolens ingest` to apply");
        }
        ProjectStatus::Unchanged => {}
    }

    if let Some(identifier) = result.new_identifier.as_deref() {
        println!("identifier: {}", identifier);
    }
    for warning in &result.warnings {
        println!("warning: {}: {}", warning.path, warning.reason);
    }
}
