use clap::{Parser, Subcommand};

use crate::commands;

/// nexusctl - operate a Nexus orchestration platform instance
#[derive(Parser, Debug)]
#[command(name = "nexusctl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP request shell (auth, chat, workflow, admin endpoints)
    Serve {
        /// Configuration file (YAML); defaults are used if omitted
        #[arg(short, long)]
        config: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Directory for on-disk persistence; an in-memory store is used if omitted
        #[arg(long)]
        data_dir: Option<String>,
    },

    /// List the workflow templates and the agent names each one expects
    Templates,

    /// Show version information
    Version,

    /// Generate shell completion scripts
    Completion {
        #[arg(value_enum)]
        shell: commands::completion::Shell,
    },
}

impl Cli {
    pub async fn execute(self) -> anyhow::Result<()> {
        match self.command {
            Commands::Serve { config, port, host, data_dir } => {
                commands::serve::execute(config.as_deref(), port, &host, data_dir.as_deref()).await
            }
            Commands::Templates => commands::templates::execute(),
            Commands::Version => commands::version::execute(),
            Commands::Completion { shell } => commands::completion::execute(shell),
        }
    }
}
