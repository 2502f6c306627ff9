use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Translate a WebVTT or SRT caption file into an SRT file
    Translate {
        /// Input caption file
        #[arg(short, long)]
        input: PathBuf,

        /// Output SRT file
        #[arg(short, long)]
        output: PathBuf,

        /// Source language code
        #[arg(short, long)]
        source: Option<String>,

        /// Target language code
        #[arg(short, long)]
        target: Option<String>,

        /// Skip the LLM context analysis and use keyword rules only
        #[arg(long)]
        no_context: bool,

        /// Run the localization refinement pass
        #[arg(long)]
        refine: bool,

        /// Item identifier (defaults to the input file stem)
        #[arg(long)]
        item_id: Option<String>,
    },

    /// Translate an item from the caption directory, falling back to speech recognition
    Item {
        /// Item reference (file stem inside the caption directory)
        item: String,

        /// Caption directory, overrides `source.caption_dir`
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Output SRT file (defaults to `<item>.<target>.srt` in the caption directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Source language code, or `auto` to detect it from speech
        #[arg(short, long)]
        source: Option<String>,

        /// Target language code
        #[arg(short, long)]
        target: Option<String>,

        /// Use speech recognition even when a manual caption exists
        #[arg(long)]
        force_speech: bool,

        /// Skip the LLM context analysis and use keyword rules only
        #[arg(long)]
        no_context: bool,

        /// Run the localization refinement pass
        #[arg(long)]
        refine: bool,
    },

    /// List models available on the completion service
    Models,

    /// Check that the completion service is reachable
    Check,

    /// Write the default configuration to a file
    InitConfig {
        /// Output configuration file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
