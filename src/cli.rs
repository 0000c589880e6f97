use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use browser::LaunchConfig;
use exporter::ExportFormat;
use harvester::{FallbackConfig, HarvestConfig};

#[derive(Parser, Debug)]
#[command(name = "smule-archiver")]
#[command(version)]
#[command(about = "Download the recorded performances of a Smule user", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Quiet mode (no progress bars, warnings only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// SQLite database holding profiles and songs
    #[arg(long, global = true, env = "SMULE_ARCHIVER_DB", default_value = "smule-archiver.db")]
    pub database: PathBuf,

    /// Directory receiving the audio/ and video/ folders
    #[arg(short, long, global = true, env = "SMULE_ARCHIVER_OUTPUT", default_value = "./media")]
    pub output: PathBuf,

    #[command(flatten)]
    pub fetch: FetchArgs,
}

#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// Attempts per recording page before the song is marked deleted
    #[arg(long, global = true, default_value = "3")]
    pub max_attempts: u32,

    /// Base delay between attempts in milliseconds
    #[arg(long, global = true, default_value = "2000")]
    pub retry_backoff_ms: u64,
}

#[derive(Args, Debug, Clone)]
pub struct BrowserArgs {
    /// Where the diagnostic screenshot is written
    #[arg(long, default_value = "screenshots/screen.png")]
    pub screenshot: PathBuf,

    /// Seconds to wait after clicking play
    #[arg(long, default_value = "10")]
    pub settle_secs: u64,

    /// Seconds to wait for the play button
    #[arg(long, default_value = "10")]
    pub selector_timeout_secs: u64,

    /// Show the browser window
    #[arg(long)]
    pub headful: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Retrieve the user's songs from Smule, then download the active ones
    Sync {
        /// Smule username
        #[arg(value_name = "USERNAME")]
        username: String,

        /// Delete stored songs and scrape the whole profile again
        #[arg(long)]
        force: bool,

        /// Only refresh the database
        #[arg(long)]
        skip_download: bool,
    },

    /// Fix missing song urls by asking Smule to generate them
    Fix {
        /// Smule username
        #[arg(value_name = "USERNAME")]
        username: String,

        #[command(flatten)]
        browser: BrowserArgs,
    },

    /// Download stored songs whose media url is known
    Download {
        /// Smule username
        #[arg(value_name = "USERNAME")]
        username: String,
    },

    /// Show stored song counts
    Status {
        /// Smule username
        #[arg(value_name = "USERNAME")]
        username: String,
    },

    /// Export the stored songs of a user
    Export {
        /// Smule username
        #[arg(value_name = "USERNAME")]
        username: String,

        /// Destination file
        #[arg(short, long)]
        file: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "json")]
        format: FormatArg,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Json,
    Csv,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => ExportFormat::Json,
            FormatArg::Csv => ExportFormat::Csv,
        }
    }
}

impl BrowserArgs {
    pub fn fallback_config(&self) -> FallbackConfig {
        FallbackConfig {
            settle: Duration::from_secs(self.settle_secs),
            selector_timeout: Duration::from_secs(self.selector_timeout_secs),
            screenshot_path: self.screenshot.clone(),
            ..FallbackConfig::default()
        }
    }

    pub fn launch_config(&self) -> LaunchConfig {
        LaunchConfig {
            headless: !self.headful,
            ..LaunchConfig::default()
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn harvest_config(&self) -> HarvestConfig {
        let fallback = match &self.command {
            Commands::Fix { browser, .. } => browser.fallback_config(),
            _ => FallbackConfig::default(),
        };

        HarvestConfig {
            max_fetch_attempts: self.fetch.max_attempts,
            retry_backoff: Duration::from_millis(self.fetch.retry_backoff_ms),
            output_dir: self.output.clone(),
            fallback,
        }
    }
}
