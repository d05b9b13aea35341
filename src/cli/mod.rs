mod clear;
mod index;
mod query;
mod stats;
mod watch;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use symdex::analyzer::FactoryRegistry;

#[derive(Parser)]
#[command(
    name = "symdex",
    version,
    about = "A federated symbol-index engine with a small pipelined query DSL",
    long_about = "Symdex maintains queryable symbol indexes over source packages and \
                  federates navigation queries across the project, workspace siblings, \
                  and cached dependency indexes. Indexing and watching run through a \
                  registered language analyzer; querying also works straight off a \
                  cached artifact."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build (or rebuild) a project's index and persist it
    #[command(
        long_about = "Runs a full index of the project through its registered analyzer and \
                      persists the artifact to the cache. Fails when no analyzer factory \
                      claims the project."
    )]
    Index {
        /// Path to the project root directory to index
        #[arg(value_name = "PROJECT_PATH")]
        path: PathBuf,
    },
    /// Watch a project and refresh its index on changes
    #[command(
        long_about = "Opens the project with its registered analyzer, starts the workspace \
                      watcher, and logs index updates until interrupted. Fails when no \
                      analyzer factory claims the project."
    )]
    Watch {
        /// Path to the project root directory to watch
        #[arg(value_name = "PROJECT_PATH")]
        path: PathBuf,
    },
    /// Run a query against a project's cached index
    #[command(
        long_about = "Executes a query (e.g. `def AuthRepository`, `find Auth* kind:class | members`) \
                      against the cached index of the given project, plus any dependency indexes \
                      resolvable from its lockfile."
    )]
    Query {
        /// Path to the project root
        #[arg(value_name = "PROJECT_PATH")]
        path: PathBuf,

        /// Query text, e.g. "refs AuthRepository"
        #[arg(value_name = "QUERY")]
        query: String,

        /// Emit the structured result as JSON instead of text
        #[arg(long)]
        json: bool,

        /// Also load dependency indexes named by the lockfile
        #[arg(long)]
        deps: bool,
    },
    /// Show index statistics for a project's cached index
    Stats {
        /// Path to the project root
        #[arg(value_name = "PROJECT_PATH")]
        path: PathBuf,
    },
    /// Remove cached index artifacts
    Clear {
        /// Path to the project whose artifact should be removed
        #[arg(value_name = "PROJECT_PATH")]
        path: Option<PathBuf>,

        /// Remove the entire cache instead of one project's artifact
        #[arg(long)]
        all: bool,
    },
}

pub async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Index { path } => index::run(path).await,
        Commands::Watch { path } => watch::run(path).await,
        Commands::Query {
            path,
            query,
            json,
            deps,
        } => query::run(path, query, json, deps).await,
        Commands::Stats { path } => stats::run(path).await,
        Commands::Clear { path, all } => clear::run(path, all),
    }
}

/// Analyzer factories available to this binary. The core ships no language;
/// downstream builds register their factories here.
fn analyzers() -> FactoryRegistry {
    FactoryRegistry::new()
}

fn no_analyzer_error(path: &Path) -> Box<dyn std::error::Error> {
    format!(
        "no registered analyzer claims {} — this build carries no language factories; \
         embed symdex with one, or use `query`/`stats` against a cached index",
        path.display()
    )
    .into()
}
