//! Thin CLI over the search-mcp backend.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use search_mcp::{DEBOUNCE, FileWatcher, ProjectIndex, SearchMode, ToolHandler};
use serde_json::json;

#[derive(Parser)]
#[command(name = "search-mcp", about = "Local semantic code and docs search", version)]
struct Cli {
  /// Project directory (defaults to the current directory).
  #[arg(long, global = true)]
  project: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Serve tool calls over stdio.
  Serve,
  /// Build the code and docs indexes for the project.
  Index,
  /// Rebuild the indexes from scratch, preserving configuration.
  Reindex,
  /// Show index status.
  Status,
  /// Search the code index (or docs with --docs).
  Search {
    query: String,
    #[arg(long, default_value_t = 10)]
    top_k: usize,
    #[arg(long, value_enum, default_value = "hybrid")]
    mode: Mode,
    #[arg(long)]
    alpha: Option<f32>,
    #[arg(long)]
    compact: bool,
    #[arg(long)]
    docs: bool,
  },
  /// Watch the project and apply incremental updates until interrupted.
  Watch,
  /// List indexed paths matching a glob.
  Paths { pattern: String },
  /// Delete the project's index directory.
  Delete,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Mode {
  Vector,
  Fts,
  Hybrid,
}

impl From<Mode> for SearchMode {
  fn from(mode: Mode) -> Self {
    match mode {
      Mode::Vector => SearchMode::Vector,
      Mode::Fts => SearchMode::Fts,
      Mode::Hybrid => SearchMode::Hybrid,
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  let _guard = search_mcp::logging::init();

  let cli = Cli::parse();
  let project = match cli.project {
    Some(project) => project,
    None => std::env::current_dir()?,
  };
  let handler = ToolHandler::new(project.clone());

  let result = match cli.command {
    Command::Serve => {
      search_mcp::run_stdio(handler).await?;
      return Ok(());
    }
    Command::Watch => {
      let index = ProjectIndex::open(&project).await?;
      let watcher = FileWatcher::start(&index, DEBOUNCE)?;
      eprintln!("watching {} (ctrl-c to stop)", index.root().display());
      tokio::signal::ctrl_c().await?;
      watcher.stop().await;
      return Ok(());
    }
    Command::Index => handler.create_index().await,
    Command::Reindex => handler.reindex_project().await,
    Command::Status => handler.get_index_status().await,
    Command::Search {
      query,
      top_k,
      mode,
      alpha,
      compact,
      docs,
    } => {
      let mut args = json!({
        "query": query,
        "topK": top_k,
        "mode": SearchMode::from(mode),
        "compact": compact,
      });
      if let Some(alpha) = alpha {
        args["alpha"] = json!(alpha);
      }
      if docs {
        handler.search_docs(args).await
      } else {
        handler.search_code(args).await
      }
    }
    Command::Paths { pattern } => handler.search_by_path(json!({ "pattern": pattern })).await,
    Command::Delete => handler.delete_index().await,
  };

  match result {
    Ok(value) => {
      println!("{}", serde_json::to_string_pretty(&value)?);
      handler.shutdown().await;
      Ok(())
    }
    Err(e) => {
      eprintln!("[{}] {}", e.tag(), e.user_message());
      std::process::exit(1);
    }
  }
}
