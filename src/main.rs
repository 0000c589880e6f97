mod cli;
mod progress;
mod report;

use anyhow::{Context, Result};
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use browser::{ChromeDriver, LazySession};
use cli::{Cli, Commands};
use crawler::{Endpoints, FetchConfig, HttpFetcher};
use exporter::Exporter;
use harvester::Harvester;
use progress::PassProgress;
use storage::{Profile, SongFilter, SongRepository, SqliteStore};

type App = Harvester<HttpFetcher, SqliteStore>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_tracing(&cli);

    let store = SqliteStore::open(&cli.database)
        .with_context(|| format!("Failed to open database {}", cli.database.display()))?;
    let fetcher = HttpFetcher::new(&FetchConfig::default()).context("Failed to build HTTP client")?;
    let app = Harvester::new(fetcher, store, Endpoints::default(), cli.harvest_config());
    let show_progress = !cli.quiet;

    match &cli.command {
        Commands::Sync {
            username,
            force,
            skip_download,
        } => {
            println!("Smule Music Downloader: {}", username);
            let profile = app.find_or_create_profile(username).await?;

            app.sync_songs(&profile, *force, &PassProgress::new(show_progress))
                .await
                .context("Song retrieval failed")?;

            if *skip_download {
                info!("Skipping downloads");
            } else {
                download(&app, &profile, show_progress).await?;
            }
            print_counts(&app, &profile)?;
        }

        Commands::Fix { username, browser } => {
            println!("Smule Music Fixer: {}", username);
            let profile = app.find_or_create_profile(username).await?;

            let launch_config = browser.launch_config();
            let mut session = LazySession::new(move || ChromeDriver::launch(&launch_config));
            let summary = app
                .fix_missing_urls(&profile, &mut session, &PassProgress::new(show_progress))
                .await
                .context("Fix pass failed")?;

            print!("{}", report::fix_table(&summary));
            if summary.requested > 0 {
                println!("Run `fix` again later to pick up the generated links");
            }
        }

        Commands::Download { username } => {
            let profile = stored_profile(&app, username)?;
            download(&app, &profile, show_progress).await?;
            print_counts(&app, &profile)?;
        }

        Commands::Status { username } => {
            let profile = stored_profile(&app, username)?;
            print_counts(&app, &profile)?;
        }

        Commands::Export {
            username,
            file,
            format,
        } => {
            let profile = stored_profile(&app, username)?;
            let songs = app.repository().find_songs(&profile, SongFilter::all())?;
            let written = Exporter::new()
                .export(&songs, file, (*format).into())
                .with_context(|| format!("Failed to export to {}", file.display()))?;
            info!("Exported {} songs to {}", written, file.display());
        }
    }

    Ok(())
}

fn init_tracing(cli: &Cli) {
    let level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::WARN
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn stored_profile(app: &App, username: &str) -> Result<Profile> {
    app.repository()
        .find_profile(username)?
        .with_context(|| format!("Profile {} is not in the database, run `sync` first", username))
}

async fn download(app: &App, profile: &Profile, show_progress: bool) -> Result<()> {
    let report = app
        .download_songs(profile, &PassProgress::new(show_progress))
        .await
        .context("Download pass failed")?;

    if report.failed > 0 {
        warn!("{} of {} downloads failed and will be retried next run", report.failed, report.total);
    }
    println!("Download done");
    Ok(())
}

fn print_counts(app: &App, profile: &Profile) -> Result<()> {
    let counts = app.summarize(profile)?;
    print!("{}", report::counts_table(&counts));
    Ok(())
}
