use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use tower_lsp::lsp_types::{Position, TextEdit, Url};
use tracing::{info, warn};

use context_snippets::config::Settings;
use context_snippets::document::{RopeDocument, TextDocument};
use context_snippets::engine::SnippetEngine;
use context_snippets::error::EngineError;
use context_snippets::host::EditorHost;
use context_snippets::logging::init_logger;
use context_snippets::oracle::DisabledOracle;
use context_snippets::rules::SideEffectCommand;

#[derive(Parser, Debug)]
#[command(name = "context-snippets")]
#[command(about = "Resolve context-aware snippets for a file position")]
#[command(version)]
struct Cli {
    /// Settings JSON file (customSnippets, typingSnippets, ...)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level for stderr (otherwise RUST_LOG, then "info")
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[arg(long, global = true)]
    no_color: bool,

    /// Also write a debug session log to the cache directory
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// List snippets offered at a position
    Candidates {
        file: PathBuf,
        #[arg(long)]
        line: u32,
        #[arg(long)]
        character: u32,
        /// Skip the asynchronous phase (manifests, syntax)
        #[arg(long)]
        sync_only: bool,
    },
    /// Apply a snippet at a position and print the resulting text
    Expand {
        file: PathBuf,
        #[arg(long)]
        line: u32,
        #[arg(long)]
        character: u32,
        /// Snippet name; omit to apply the typing snippet completed at the position
        #[arg(long)]
        name: Option<String>,
        /// Write the result back to the file
        #[arg(long)]
        write: bool,
    },
    /// Load the configuration and report rejected snippets
    Check,
}

/// Host editing one in-memory document.
struct FileHost {
    document: Mutex<RopeDocument>,
}

impl FileHost {
    fn snapshot(&self) -> Arc<dyn TextDocument> {
        Arc::new(self.document.lock().clone())
    }
}

#[async_trait::async_trait]
impl EditorHost for FileHost {
    fn document(&self, uri: &Url) -> Option<Arc<dyn TextDocument>> {
        let snapshot = self.snapshot();
        (snapshot.uri() == uri).then_some(snapshot)
    }

    async fn apply_edits(&self, _uri: &Url, edits: Vec<TextEdit>) -> context_snippets::error::Result<()> {
        self.document.lock().apply_edits(&edits);
        Ok(())
    }

    async fn execute_command(&self, command: &SideEffectCommand) -> context_snippets::error::Result<()> {
        info!("Snippet requested editor command {} {:?}", command.command, command.args);
        Ok(())
    }

    fn show_warning(&self, message: &str) {
        warn!("{}", message);
    }
}

fn load_settings(path: Option<&PathBuf>) -> anyhow::Result<Settings> {
    let mut settings = match path {
        Some(path) => Settings::from_file(path)
            .with_context(|| format!("Failed to load settings from {:?}", path))?,
        None => Settings::default(),
    };
    settings.apply_env_overrides();
    Ok(settings)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = load_settings(cli.config.as_ref())?;
    let engine = SnippetEngine::new(settings, Arc::new(DisabledOracle));

    match cli.command {
        CliCommand::Check => {
            let table = engine.rules();
            println!("{} snippets loaded", table.len());
            for message in table.rejected() {
                println!("rejected: {}", message);
            }
            if !table.rejected().is_empty() {
                bail!("{} snippets were rejected", table.rejected().len());
            }
        }
        CliCommand::Candidates { file, line, character, sync_only } => {
            let document: Arc<dyn TextDocument> = Arc::new(RopeDocument::open(&file)?);
            if let Some(root) = file.parent() {
                engine.set_workspace_roots(vec![root.to_path_buf()]).await;
            }
            let position = Position::new(line, character);
            let set = if sync_only {
                engine.candidates(document, position)
            } else {
                engine.candidates_async(document, position).await
            };
            for candidate in context_snippets::candidates::display_order(&set.candidates) {
                let description = candidate.rule.base().description.as_deref().unwrap_or("");
                println!("{}\t{}", candidate.label(), description);
            }
        }
        CliCommand::Expand { file, line, character, name, write } => {
            let document = RopeDocument::open(&file)?;
            let uri = document.uri().clone();
            let host = FileHost { document: Mutex::new(document) };
            let position = Position::new(line, character);

            let plan = match name {
                Some(name) => {
                    let set = engine.candidates_async(host.snapshot(), position).await;
                    let candidate = set
                        .candidates
                        .iter()
                        .find(|c| c.label() == name)
                        .ok_or(EngineError::UnknownSnippet { kind: "custom", name: name.clone() })?;
                    engine.compile(candidate, &set.context)
                }
                None => engine
                    .on_typed(host.snapshot(), position)
                    .await
                    .context("No typing snippet completes at this position")?,
            };
            let plan = plan.resolve_variables(host.snapshot().as_ref());
            engine.accept(&host, &uri, &plan).await?;

            let text = host.document.lock().text();
            if write {
                std::fs::write(&file, &text).with_context(|| format!("Failed to write {:?}", file))?;
            } else {
                print!("{}", text);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_logger(cli.no_color, cli.log_level.as_deref(), cli.log_file)?;
    run(cli).await
}
