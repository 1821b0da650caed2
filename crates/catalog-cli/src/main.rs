//! Anime/manga catalog CLI.
//!
//! Browses the Jikan catalog and manages the local wishlist.

mod commands;
mod indicator;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use jikan_client::api::{
    AnimeRating, AnimeStatus, AnimeType, MangaStatus, MangaType, OrderBy, SortDirection,
};
use jikan_client::{AnimeFilters, MangaFilters};
use shared::{Config, LogConfig, MediaKind};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "catalog")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Browse anime
    Anime {
        #[command(subcommand)]
        action: AnimeCommand,
    },
    /// Browse manga
    Manga {
        #[command(subcommand)]
        action: MangaCommand,
    },
    /// List the genres of anime or manga
    Genres { kind: MediaKind },
    /// Manage the wishlist
    Wishlist {
        #[command(subcommand)]
        action: WishlistCommand,
    },
    /// Write a configuration file with default settings
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum AnimeCommand {
    /// Search anime
    Search(AnimeSearchArgs),
    /// Show one anime
    Show { id: u32 },
}

#[derive(Subcommand, Debug)]
enum MangaCommand {
    /// Search manga
    Search(MangaSearchArgs),
    /// Show one manga
    Show { id: u32 },
}

#[derive(Subcommand, Debug)]
pub enum WishlistCommand {
    /// Fetch an entry and save it
    Add { kind: MediaKind, id: u32 },
    /// Remove a saved entry
    Remove { kind: MediaKind, id: u32 },
    /// List saved entries
    List {
        /// Only show this kind
        #[arg(long)]
        kind: Option<MediaKind>,
    },
    /// Print the wishlist whenever it changes, until interrupted
    Watch,
}

/// Options shared by both searches
#[derive(ClapArgs, Debug)]
struct PageArgs {
    /// Search text
    query: Option<String>,

    #[arg(long, default_value_t = 1)]
    page: u32,

    #[arg(long, default_value_t = jikan_client::api::filters::DEFAULT_LIMIT)]
    limit: u32,

    /// Genre ids, comma separated
    #[arg(long, value_delimiter = ',')]
    genres: Vec<u32>,

    #[arg(long)]
    min_score: Option<f64>,

    #[arg(long)]
    order_by: Option<OrderBy>,

    #[arg(long)]
    sort: Option<SortDirection>,
}

#[derive(ClapArgs, Debug)]
struct AnimeSearchArgs {
    #[command(flatten)]
    page: PageArgs,

    #[arg(long = "type")]
    anime_type: Option<AnimeType>,

    #[arg(long)]
    status: Option<AnimeStatus>,

    #[arg(long)]
    rating: Option<AnimeRating>,
}

#[derive(ClapArgs, Debug)]
struct MangaSearchArgs {
    #[command(flatten)]
    page: PageArgs,

    #[arg(long = "type")]
    manga_type: Option<MangaType>,

    #[arg(long)]
    status: Option<MangaStatus>,
}

impl From<AnimeSearchArgs> for AnimeFilters {
    fn from(args: AnimeSearchArgs) -> Self {
        Self {
            q: args.page.query,
            page: args.page.page,
            limit: args.page.limit,
            anime_type: args.anime_type,
            status: args.status,
            rating: args.rating,
            genres: args.page.genres,
            min_score: args.page.min_score,
            order_by: args.page.order_by,
            sort: args.page.sort,
        }
    }
}

impl From<MangaSearchArgs> for MangaFilters {
    fn from(args: MangaSearchArgs) -> Self {
        Self {
            q: args.page.query,
            page: args.page.page,
            limit: args.page.limit,
            manga_type: args.manga_type,
            status: args.status,
            genres: args.page.genres,
            min_score: args.page.min_score,
            order_by: args.page.order_by,
            sort: args.page.sort,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Command::InitConfig { force } = args.command {
        return commands::init_config(&args.config, force);
    }

    // Load configuration
    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Initialize logging
    let mut log_config = LogConfig::from_config(&config, "catalog-cli");
    if args.verbose {
        log_config.default_level = tracing::Level::DEBUG;
    }
    shared::logging::init(log_config)?;

    info!(config_file = %args.config.display(), "Loaded configuration");

    let app = commands::App::new(config)?;

    match args.command {
        Command::Anime { action } => match action {
            AnimeCommand::Search(search) => app.search_anime(search.into()).await,
            AnimeCommand::Show { id } => app.show_anime(id).await,
        },
        Command::Manga { action } => match action {
            MangaCommand::Search(search) => app.search_manga(search.into()).await,
            MangaCommand::Show { id } => app.show_manga(id).await,
        },
        Command::Genres { kind } => app.genres(kind).await,
        Command::Wishlist { action } => app.wishlist(action).await,
        Command::InitConfig { .. } => Ok(()),
    }
}
