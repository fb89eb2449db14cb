mod cli;

use std::path::PathBuf;

use anyhow::Result;
use cairn::config::CairnConfig;
use cairn::memory::search::RecallDepth;
use cairn::memory::types::{ItemType, Relation, Status};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cairn", version, about = "File-backed knowledge and checkpoint memory")]
struct Cli {
    /// Storage root (defaults to `[storage] root` in the config)
    #[arg(long, global = true, env = "CAIRN_ROOT")]
    root: Option<PathBuf>,

    /// Config file (defaults to ~/.cairn/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add a knowledge item, or replace the item with the same id
    Add {
        id: String,
        /// Item body; read from stdin when omitted
        body: Option<String>,
        /// Trigger keyword (repeatable)
        #[arg(short, long = "keyword")]
        keywords: Vec<String>,
        /// Trigger regex (repeatable)
        #[arg(short, long = "pattern")]
        patterns: Vec<String>,
        /// Restrict the item to a skill (repeatable)
        #[arg(short, long = "skill")]
        skills: Vec<String>,
        /// Return the item on every recall in its scope
        #[arg(long)]
        always_inject: bool,
        #[arg(long, default_value = "")]
        source: String,
        #[arg(short = 't', long = "type", default_value = "knowledge")]
        item_type: ItemType,
        #[arg(long, default_value = "active")]
        status: Status,
    },
    /// Recall the items relevant to a query
    Recall {
        query: String,
        /// quick, standard or deep
        #[arg(short, long, default_value = "standard")]
        depth: RecallDepth,
        /// Caller skill; scoped items outside it are hidden
        #[arg(short, long)]
        scope: Option<String>,
        /// Comma-separated item types to consider
        #[arg(long, value_delimiter = ',')]
        types: Vec<ItemType>,
        #[arg(long)]
        max_items: Option<usize>,
        /// Ignore the embedder and score by keywords only
        #[arg(long)]
        keyword_only: bool,
        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one item with its body and links
    Show {
        id: String,
        /// Link hops to follow
        #[arg(long, default_value_t = 1)]
        depth: usize,
    },
    /// List items
    List {
        #[arg(short = 't', long = "type")]
        item_type: Option<ItemType>,
        #[arg(long)]
        status: Option<Status>,
        #[arg(short, long)]
        skill: Option<String>,
    },
    /// Link two items
    Link {
        source: String,
        target: String,
        #[arg(short, long, default_value = "related")]
        relation: Relation,
        #[arg(long, default_value = "")]
        note: String,
        /// Also write the reverse edge
        #[arg(short, long)]
        bidirectional: bool,
    },
    /// Remove the edge from source to target
    Unlink { source: String, target: String },
    /// Mark an item deprecated
    Deprecate {
        id: String,
        /// Item that replaces it
        #[arg(long)]
        superseded_by: Option<String>,
    },
    /// Mark an item archived
    Archive { id: String },
    /// Delete an item
    Remove { id: String },
    /// Prune items older than the configured maximum age
    Sweep {
        /// Override `[knowledge] max_age_days`
        #[arg(long)]
        max_age_days: Option<i64>,
    },
    /// Show storage statistics
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Check the index against content files, vectors and links
    Doctor,
    /// Rebuild every knowledge vector with the configured embedder
    ReEmbed,
    /// Manage research checkpoints
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },
    /// Manage the embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// Save a checkpoint unless its thesis duplicates an existing one
    Save {
        #[arg(short, long)]
        question: String,
        #[arg(short, long)]
        thesis: String,
        #[arg(short, long, default_value_t = 0.5)]
        confidence: f64,
        #[arg(long)]
        evidence: Vec<String>,
        #[arg(long = "open-question")]
        open_questions: Vec<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Save even if a near-duplicate exists
        #[arg(long)]
        force: bool,
    },
    /// List checkpoints, newest first
    List,
    /// Show one checkpoint
    Show { id: String },
    /// Delete a checkpoint
    Delete { id: String },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model to the configured cache directory
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => CairnConfig::load_from(path)?,
        None => CairnConfig::load()?,
    };

    // Log to stderr so stdout stays clean for command output.
    let filter = EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let root = cli.root.clone();
    match cli.command {
        Command::Add {
            id,
            body,
            keywords,
            patterns,
            skills,
            always_inject,
            source,
            item_type,
            status,
        } => {
            let item = cairn::memory::store::NewItem {
                id,
                body: match body {
                    Some(body) => body,
                    None => cli::read_stdin()?,
                },
                keywords,
                patterns,
                skills,
                always_inject,
                source,
                item_type,
                status,
            };
            cli::items::add(&config, root.as_deref(), item)?;
        }
        Command::Recall {
            query,
            depth,
            scope,
            types,
            max_items,
            keyword_only,
            json,
        } => {
            let options = cli::search::RecallOptions {
                depth,
                scope,
                types,
                max_items,
                keyword_only,
                json,
            };
            cli::search::recall(&config, root.as_deref(), &query, options).await?;
        }
        Command::Show { id, depth } => cli::items::show(&config, root.as_deref(), &id, depth)?,
        Command::List {
            item_type,
            status,
            skill,
        } => {
            let filter = cairn::memory::store::ItemFilter {
                item_type,
                status,
                skill,
            };
            cli::items::list(&config, root.as_deref(), &filter)?;
        }
        Command::Link {
            source,
            target,
            relation,
            note,
            bidirectional,
        } => cli::items::link(
            &config,
            root.as_deref(),
            &source,
            &target,
            relation,
            &note,
            bidirectional,
        )?,
        Command::Unlink { source, target } => {
            cli::items::unlink(&config, root.as_deref(), &source, &target)?
        }
        Command::Deprecate { id, superseded_by } => {
            cli::items::deprecate(&config, root.as_deref(), &id, superseded_by.as_deref())?
        }
        Command::Archive { id } => cli::items::archive(&config, root.as_deref(), &id)?,
        Command::Remove { id } => cli::items::remove(&config, root.as_deref(), &id)?,
        Command::Sweep { max_age_days } => {
            cli::maintenance::sweep(&config, root.as_deref(), max_age_days)?
        }
        Command::Stats { json } => cli::stats::stats(&config, root.as_deref(), json)?,
        Command::Doctor => cli::doctor::doctor(&config, root.as_deref())?,
        Command::ReEmbed => cli::re_embed::re_embed(&config, root.as_deref()).await?,
        Command::Checkpoint { action } => match action {
            CheckpointAction::Save {
                question,
                thesis,
                confidence,
                evidence,
                open_questions,
                tags,
                force,
            } => {
                let checkpoint = cairn::memory::checkpoints::NewCheckpoint {
                    question,
                    thesis,
                    confidence,
                    evidence,
                    open_questions,
                    tags,
                };
                cli::checkpoints::save(&config, root.as_deref(), checkpoint, force)?;
            }
            CheckpointAction::List => cli::checkpoints::list(&config, root.as_deref())?,
            CheckpointAction::Show { id } => cli::checkpoints::show(&config, root.as_deref(), &id)?,
            CheckpointAction::Delete { id } => {
                cli::checkpoints::delete(&config, root.as_deref(), &id)?
            }
        },
        Command::Model { action } => match action {
            ModelAction::Download => {
                cli::model_download(&config.embedding).await?;
            }
        },
    }

    Ok(())
}
