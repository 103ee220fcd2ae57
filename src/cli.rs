use clap::{Parser, Subcommand};

use crate::commands;

#[derive(Parser)]
#[command(name = "keywatch")]
#[command(about = "Game key marketplace price monitor", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the server and the collection scheduler
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 3000)]
        port: u16,
    },
    /// Collect one game (or all registered games) once, then exit
    Collect {
        /// Game id; omit to collect every registered game
        game_id: Option<String>,
    },
    /// Show store and configuration status
    Status,
}

pub async fn run() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port } => {
            commands::serve::run(port).await;
        }
        Commands::Collect { game_id } => {
            commands::collect::run(game_id).await;
        }
        Commands::Status => {
            commands::status::run().await;
        }
    }
}
