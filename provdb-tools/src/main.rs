// SPDX-License-Identifier: AGPL-3.0-or-later
// ProvDB - Columnar Provenance Index for Software Archives
// Copyright (C) 2026 The ProvDB Authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! The `provdb` command-line tool
//!
//! ```bash
//! # build the tables, stage by stage
//! provdb index earliest-timestamps --graph graph.json --database ./db
//! provdb index directory-max-leaf-timestamps --graph graph.json --database ./db
//! provdb index directory-frontier --graph graph.json --database ./db
//! provdb index relations --graph graph.json --database ./db
//!
//! # serve point lookups
//! provdb grpc-serve --graph graph.json --database ./db --bind '[::]:50051'
//!
//! # produce a small archive + table set for tests
//! provdb gen-test-database --out ./fixtures/sample
//! ```
//!
//! `--graph` and `--database` fall back to `SWH_PROVENANCE_GRAPH_PATH` and
//! `SWH_PROVENANCE_DB_URL`. Exit codes: 0 success, 1 argument error, 2
//! storage error, 3 incomplete input, 64 invariant violation.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use provdb_core::config::Settings;
use provdb_core::error::ProvError;
use provdb_core::graph::{GraphSource, MemoryGraph};
use provdb_core::metrics::Metrics;
use provdb_core::store::{store_from_url, TableStore};
use provdb_index::filters::NodeFilter;
use provdb_index::pipeline::{
    run_earliest_timestamps, run_frontier, run_max_leaf_timestamps, run_relations, BuildConfig,
};
use provdb_index::testdb;
use provdb_query::QueryEngine;

/// ProvDB: provenance indexes and point lookups over a software archive
#[derive(Parser)]
#[command(name = "provdb")]
#[command(about = "Build and serve software provenance indexes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build index tables from a graph snapshot
    Index {
        #[command(subcommand)]
        stage: IndexStage,
    },
    /// Serve the ProvenanceService gRPC API
    GrpcServe {
        #[command(flatten)]
        common: CommonArgs,
        /// Address to listen on
        #[arg(long, default_value = "[::]:50051")]
        bind: SocketAddr,
        /// StatsD address for metrics (host:port)
        #[arg(long)]
        statsd: Option<String>,
    },
    /// Generate a deterministic test archive with its full table set
    GenTestDatabase {
        /// Output directory
        #[arg(long)]
        out: PathBuf,
        /// Hash buckets per table
        #[arg(long, default_value_t = 4)]
        buckets: usize,
    },
}

#[derive(Subcommand)]
enum IndexStage {
    /// Stage 1: earliest containing-anchor date per content
    EarliestTimestamps(IndexArgs),
    /// Stage 2: newest contained-leaf date per directory
    DirectoryMaxLeafTimestamps(IndexArgs),
    /// Stage 3: the isochrone frontier
    DirectoryFrontier(IndexArgs),
    /// Stage 4: the relation tables and the nodes table
    Relations(IndexArgs),
}

#[derive(Args)]
struct CommonArgs {
    /// Path to the graph snapshot (JSON); defaults to $SWH_PROVENANCE_GRAPH_PATH
    #[arg(long)]
    graph: Option<PathBuf>,
    /// Table store location (path or URL); defaults to $SWH_PROVENANCE_DB_URL
    #[arg(long)]
    database: Option<String>,
    /// Worker threads
    #[arg(long)]
    workers: Option<usize>,
}

#[derive(Args)]
struct IndexArgs {
    #[command(flatten)]
    common: CommonArgs,
    /// Which anchors to traverse from: "heads" or "all"
    #[arg(long, default_value = "heads")]
    node_filter: String,
    /// Hash buckets per table
    #[arg(long, default_value_t = 8)]
    buckets: usize,
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // clap prints help/version through this path too
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    match run(cli) {
        Ok(()) => {}
        Err(e) => {
            tracing::error!("{e:#}");
            std::process::exit(exit_code(&e));
        }
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<ProvError>() {
        Some(ProvError::InvalidArgument(_) | ProvError::InvalidSwhid(_)) => 1,
        Some(
            ProvError::Io(_)
            | ProvError::Transient(_)
            | ProvError::NotFound(_)
            | ProvError::Cancelled
            | ProvError::DeadlineExceeded,
        ) => 2,
        Some(ProvError::IncompleteInput(_)) => 3,
        Some(ProvError::Corruption { .. } | ProvError::Internal(_)) => 64,
        None => 1,
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Index { stage } => {
            let (args, runner): (&IndexArgs, StageRunner) = match &stage {
                IndexStage::EarliestTimestamps(args) => (args, StageRunner::Earliest),
                IndexStage::DirectoryMaxLeafTimestamps(args) => (args, StageRunner::MaxLeaf),
                IndexStage::DirectoryFrontier(args) => (args, StageRunner::Frontier),
                IndexStage::Relations(args) => (args, StageRunner::Relations),
            };
            run_index_stage(args, runner)
        }
        Command::GrpcServe { common, bind, statsd } => run_grpc_serve(common, bind, statsd),
        Command::GenTestDatabase { out, buckets } => {
            let config = BuildConfig {
                buckets,
                ..BuildConfig::default()
            };
            testdb::generate(&out, &config)
                .with_context(|| format!("cannot generate test database in {}", out.display()))?;
            tracing::info!("test database written to {}", out.display());
            Ok(())
        }
    }
}

enum StageRunner {
    Earliest,
    MaxLeaf,
    Frontier,
    Relations,
}

fn run_index_stage(args: &IndexArgs, runner: StageRunner) -> Result<()> {
    let settings = resolve_settings(&args.common);
    let graph = load_graph(&settings)?;
    let store = open_store(&settings)?;
    let staging = staging_root(&settings)?;

    let config = BuildConfig {
        workers: settings.workers,
        buckets: args.buckets,
        node_filter: args.node_filter.parse::<NodeFilter>()?,
    };

    match runner {
        StageRunner::Earliest => run_earliest_timestamps(&graph, store.as_ref(), &config)?,
        StageRunner::MaxLeaf => run_max_leaf_timestamps(&graph, store.as_ref(), &config)?,
        StageRunner::Frontier => run_frontier(&graph, store.as_ref(), &staging, &config)?,
        StageRunner::Relations => {
            run_relations(&graph, store.as_ref(), &staging, &config)?;
        }
    }
    Ok(())
}

fn run_grpc_serve(common: CommonArgs, bind: SocketAddr, statsd: Option<String>) -> Result<()> {
    let settings = {
        let mut settings = resolve_settings(&common);
        if statsd.is_some() {
            settings.statsd_addr = statsd;
        }
        settings
    };
    let graph = Arc::new(load_graph(&settings)?);
    let store = open_store(&settings)?;
    let metrics = Metrics::new("provdb", settings.statsd_addr.as_deref())?;

    let engine = Arc::new(QueryEngine::open(
        store,
        graph as Arc<dyn GraphSource>,
        settings,
        metrics.clone(),
    )?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("cannot start async runtime")?;
    runtime.block_on(provdb_grpc::serve(engine, bind, metrics))
}

fn resolve_settings(common: &CommonArgs) -> Settings {
    let mut settings = Settings::from_env();
    if let Some(graph) = &common.graph {
        settings.graph_path = Some(graph.clone());
    }
    if let Some(database) = &common.database {
        settings.db_url = Some(database.clone());
    }
    if let Some(workers) = common.workers {
        settings.workers = workers;
    }
    settings
}

fn load_graph(settings: &Settings) -> Result<MemoryGraph> {
    let path = settings.graph_path.as_ref().ok_or_else(|| {
        ProvError::InvalidArgument(
            "no graph given: pass --graph or set SWH_PROVENANCE_GRAPH_PATH".into(),
        )
    })?;
    // a database directory produced by gen-test-database carries its snapshot
    let path: PathBuf = if path.is_dir() {
        path.join(testdb::GRAPH_FILE)
    } else {
        path.clone()
    };
    tracing::info!("loading graph snapshot from {}", path.display());
    let graph = MemoryGraph::load(&path)?;
    tracing::info!(
        "graph loaded: snapshot {} with {} nodes",
        graph.snapshot_id(),
        graph.num_nodes()
    );
    Ok(graph)
}

fn open_store(settings: &Settings) -> Result<Arc<dyn TableStore>> {
    let url = settings.db_url.as_ref().ok_or_else(|| {
        ProvError::InvalidArgument(
            "no database given: pass --database or set SWH_PROVENANCE_DB_URL".into(),
        )
    })?;
    Ok(store_from_url(url)?)
}

/// Builder staging must be renameable into a local store; remote stores stage
/// in the system temp directory and upload on promote.
fn staging_root(settings: &Settings) -> Result<PathBuf> {
    let url = settings.db_url.as_deref().unwrap_or(".");
    if let Ok(parsed) = url::Url::parse(url) {
        if parsed.scheme().len() > 1 && parsed.scheme() != "file" {
            let staging = std::env::temp_dir().join("provdb-staging");
            std::fs::create_dir_all(&staging)?;
            return Ok(staging);
        }
        if parsed.scheme() == "file" {
            if let Ok(path) = parsed.to_file_path() {
                return Ok(path);
            }
        }
    }
    Ok(PathBuf::from(url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_index_subcommands_parse() {
        for stage in [
            "earliest-timestamps",
            "directory-max-leaf-timestamps",
            "directory-frontier",
            "relations",
        ] {
            Cli::try_parse_from([
                "provdb", "index", stage, "--graph", "g.json", "--database", "./db",
                "--workers", "4", "--node-filter", "all",
            ])
            .unwrap();
        }
    }

    #[test]
    fn test_grpc_serve_parses() {
        Cli::try_parse_from([
            "provdb",
            "grpc-serve",
            "--graph",
            "g.json",
            "--database",
            "./db",
            "--bind",
            "127.0.0.1:9000",
        ])
        .unwrap();
    }
}
