//! Command-line surface.

use crate::speech::SpeechMode;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "readaloud", version, about = "Read web pages and text files aloud")]
pub struct Cli {
    /// Configuration file.
    #[arg(long, global = true, default_value = "conf/config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Read a file or URL aloud with live highlighting.
    Read(ReadArgs),
    /// Sign in to the cloud library.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account and sign in.
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        name: Option<String>,
    },
    Logout,
    /// Show the signed-in account.
    Whoami,
    /// Save a page to the cloud library.
    Save {
        source: String,
        #[arg(long)]
        collection: Option<String>,
        #[arg(long)]
        title: Option<String>,
    },
    #[command(subcommand)]
    Articles(ArticleCommand),
    #[command(subcommand)]
    Collections(CollectionCommand),
    #[command(subcommand)]
    Cast(CastCommand),
    #[command(subcommand)]
    Server(ServerCommand),
}

/// Playback options shared by `read` and `articles play`.
#[derive(Debug, Clone, Args)]
pub struct PlaybackArgs {
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,
    /// Speech rate, 0.5 to 2.0.
    #[arg(long)]
    pub rate: Option<f32>,
    /// Highlight words in the page text instead of the context panel.
    #[arg(long)]
    pub page_highlight: bool,
    /// Send synthesized audio to the cast relay when a device is connected.
    #[arg(long)]
    pub cast: bool,
    /// Quit once the last word has been read.
    #[arg(long)]
    pub exit_on_finish: bool,
}

#[derive(Debug, Args)]
pub struct ReadArgs {
    /// Path to an HTML or text file, or an http(s) URL.
    pub source: String,
    /// Read only this text instead of the whole page.
    #[arg(long)]
    pub selection: Option<String>,
    #[command(flatten)]
    pub playback: PlaybackArgs,
}

#[derive(Debug, Subcommand)]
pub enum ArticleCommand {
    List {
        #[arg(long, default_value_t = 0)]
        skip: usize,
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long)]
        collection: Option<String>,
    },
    Show {
        id: String,
    },
    Delete {
        id: String,
    },
    /// Play a saved article, resuming from its stored position.
    Play {
        id: String,
        #[command(flatten)]
        playback: PlaybackArgs,
    },
}

#[derive(Debug, Subcommand)]
pub enum CollectionCommand {
    List,
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    Show {
        id: String,
    },
    Rename {
        id: String,
        name: String,
    },
    Delete {
        id: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum CastCommand {
    Status,
    Disconnect,
}

#[derive(Debug, Subcommand)]
pub enum ServerCommand {
    /// Check that the synthesis server answers.
    Check,
    /// Remember a synthesis server URL for later sessions.
    SetUrl { url: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Auto,
    Local,
    Remote,
}

impl From<ModeArg> for SpeechMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Auto => SpeechMode::Auto,
            ModeArg::Local => SpeechMode::Local,
            ModeArg::Remote => SpeechMode::Remote,
        }
    }
}
