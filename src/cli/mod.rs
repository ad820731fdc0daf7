//! Command-line interface parsing and handling
//!
//! Parses arguments, loads configuration, wires up logging and the thread
//! store, then runs the requested command.

use std::error::Error;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::info;

use crate::core::app::App;
use crate::core::config::Config;
use crate::core::persist::{FileStore, KeyValueStore, MemoryStore, ReadOnlyStore};
use crate::core::store::ThreadStore;
use crate::core::thread::ThreadId;
use crate::ui::chat_loop::run_chat;
use crate::ui::markdown::render_document;
use crate::utils::logging::{init_tracing, DEFAULT_LOG_FILE};


#[derive(Parser)]
#[command(name = "threadline")]
#[command(about = "A terminal chat client with persistent threads for Azure OpenAI")]
#[command(
    long_about = "Threadline keeps several independent conversations side by side and streams \
replies from an Azure OpenAI chat deployment as they are generated.\n\n\
Environment Variables (override config.toml):\n\
  AZURE_OPENAI_ENDPOINT          Resource base URL\n\
  AZURE_OPENAI_DEPLOYMENT_NAME   Deployment used in the request path\n\
  AZURE_OPENAI_API_KEY           API key\n\
  THREADLINE_CONFIG              Path to config.toml\n\
  THREADLINE_LOG                 Log filter directives (default: info)\n\n\
Controls:\n\
  Enter             Send the message\n\
  Alt+Enter         Insert a newline\n\
  Esc               Stop the reply being generated\n\
  Ctrl+N            New thread\n\
  Ctrl+Up/Down      Previous/next thread\n\
  Ctrl+D            Delete the current thread\n\
  Ctrl+B            Show or hide the thread list\n\
  PgUp/PgDn         Scroll the conversation\n\
  Ctrl+C            Quit"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Read configuration from FILE instead of the default location
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Store threads in DIR
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Write diagnostics to FILE (defaults to threadline.log in the data directory)
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Keep threads in memory only; nothing is written to disk
    #[arg(long, global = true)]
    pub ephemeral: bool,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Start the chat interface (default)
    Chat,
    /// List saved threads
    Threads,
    /// Export a thread as a standalone HTML page
    Export {
        /// Thread id to export (defaults to the active thread)
        #[arg(long)]
        thread: Option<ThreadId>,
        /// Write to FILE instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Show the effective configuration
    Config,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    tokio::runtime::Runtime::new()?.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(dir) = &args.data_dir {
        config.data_dir = Some(dir.clone());
    }

    let command = args.command.unwrap_or(Commands::Chat);
    if command == Commands::Config {
        print!("{}", config.describe());
        return Ok(());
    }

    let data_dir = config.resolve_data_dir()?;
    let log_path = args
        .log
        .clone()
        .unwrap_or_else(|| data_dir.join(DEFAULT_LOG_FILE));
    init_tracing(&log_path);

    let backend = open_backend(&data_dir, args.ephemeral);

    match command {
        Commands::Chat => {
            let app = App::new(&config, backend);
            run_chat(app).await
        }
        Commands::Threads => {
            let store = load_read_only(backend);
            list_threads(&store, &mut io::stdout().lock())?;
            Ok(())
        }
        Commands::Export { thread, output } => {
            let store = load_read_only(backend);
            let html = export_thread(&store, thread)?;
            match output {
                Some(path) => {
                    fs::write(&path, html)?;
                    println!("✅ Exported to {}", path.display());
                }
                None => io::stdout().lock().write_all(html.as_bytes())?,
            }
            Ok(())
        }
        Commands::Config => Ok(()),
    }
}

fn open_backend(data_dir: &Path, ephemeral: bool) -> Box<dyn KeyValueStore> {
    if ephemeral {
        info!("ephemeral session; threads will not be saved");
        Box::new(MemoryStore::new())
    } else {
        info!(dir = %data_dir.display(), "storing threads");
        Box::new(FileStore::new(data_dir))
    }
}

/// Load saved threads for inspection without writing anything back.
pub fn load_read_only(backend: Box<dyn KeyValueStore>) -> ThreadStore {
    ThreadStore::load(Box::new(ReadOnlyStore::new(backend)))
}

/// One line per thread: active marker, id, message count and title.
pub fn list_threads<W: Write>(store: &ThreadStore, out: &mut W) -> io::Result<()> {
    let active = store.active_id();
    for thread in store.threads() {
        let marker = if Some(thread.id) == active { '*' } else { ' ' };
        writeln!(
            out,
            "{marker} {}  {:>3} msgs  {}",
            thread.id,
            thread.messages.len(),
            thread.title()
        )?;
    }
    Ok(())
}

pub fn export_thread(store: &ThreadStore, id: Option<ThreadId>) -> Result<String, Box<dyn Error>> {
    let thread = match id {
        Some(id) => store
            .thread(id)
            .ok_or_else(|| format!("No thread with id {id}"))?,
        None => store.active_thread().ok_or("No active thread")?,
    };
    Ok(render_document(&thread.title(), &thread.messages))
}
