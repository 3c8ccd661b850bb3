//! Command line

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "Voice assistant for a realtime room", long_about = None)]
pub struct Cli {
    /// Configuration overlay: loads `config/<ENV>.yaml` on top of the defaults
    #[arg(long, global = true, env = "ROOM_ASSISTANT_ENV")]
    pub env: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Join the room named in settings
    Start,
    /// Join an explicit room
    Connect {
        /// Room name
        #[arg(long)]
        room: String,
    },
    /// Build or load the document index, then exit (RAG assistant only)
    Provision,
}
