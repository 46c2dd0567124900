use std::path::PathBuf;

use clap::{Parser, Subcommand};
use taskboard_core::{BoardSession, DropTarget, GestureEnd, MutationReport, RequestContext, TaskId};
use taskboard_client::render::render_board;
use taskboard_client::{default_config_path, load_config, ClientError, HttpTaskStore};

/// Command-line client for the task board.
#[derive(Parser)]
#[command(name = "taskboard")]
#[command(about = "Inspect and reorder a remote task board")]
struct Args {
    /// Config file (defaults to the platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the server base URL from the config
    #[arg(long)]
    base_url: Option<String>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG wins when set
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the board
    Board,
    /// Drop a task onto a column ("col-<id>") or before another task ("<id>")
    Move {
        task_id: TaskId,
        over: String,
        /// Insertion index inside the target column, overriding `over`
        #[arg(long)]
        index: Option<usize>,
    },
    /// Append a new task to a column
    Create { column_id: i64, title: String },
    /// Change a task's title
    Rename { task_id: TaskId, title: String },
    /// Delete a task
    Delete { task_id: TaskId },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level)).init();

    if let Err(e) = run(args).await {
        log::error!("{}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), ClientError> {
    let config_path = args.config.unwrap_or_else(default_config_path);
    let mut config = load_config(&config_path)?;
    if let Some(base_url) = args.base_url {
        config.base_url = base_url;
    }

    let store = HttpTaskStore::from_config(&config)?;
    let context = match config.token.as_deref() {
        Some(token) => RequestContext::with_bearer(token),
        None => RequestContext::anonymous(),
    };
    log::info!("Opening board at {}", store.base_url());
    let session = BoardSession::open(store, context, config.engine.clone()).await?;

    let report = match args.command {
        Command::Board => None,
        Command::Move { task_id, over, index } => {
            let target = DropTarget::parse(&over).ok_or_else(|| ClientError::Target(over.clone()))?;
            let mut gesture = GestureEnd::new(task_id, target);
            if let Some(index) = index {
                gesture = gesture.with_hover_index(index);
            }
            Some(session.drop_task(gesture).await)
        }
        Command::Create { column_id, title } => {
            let task = session.create_task(column_id, &title).await?.ok_or_else(|| {
                ClientError::Mutation(format!("column {} cannot take new tasks", column_id))
            })?;
            println!("Created task #{} at position {}", task.id, task.position);
            None
        }
        Command::Rename { task_id, title } => Some(session.edit_title(task_id, &title).await),
        Command::Delete { task_id } => Some(session.delete_task(task_id).await),
    };

    match report {
        Some(MutationReport::RolledBack(e)) => return Err(e.into()),
        Some(MutationReport::Discarded) => {
            return Err(ClientError::Mutation("nothing to do: unknown task or target".to_string()))
        }
        Some(other) => log::info!("Result: {:?}", other),
        None => {}
    }

    print!("{}", render_board(&session.snapshot()));
    Ok(())
}
