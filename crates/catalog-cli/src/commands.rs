//! Subcommand handlers.

use crate::indicator;
use crate::WishlistCommand;
use anyhow::{bail, Context, Result};
use jikan_client::api::Pagination;
use jikan_client::{AnimeFilters, ApiError, JikanClient, MangaFilters};
use shared::{Config, DataPaths, MediaKind, SqliteStorage, WishlistItem};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use wishlist::WishlistStore;

/// Write the default configuration to `path`
pub fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    Config::default()
        .save(path)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

/// Everything the subcommands need, opened on demand
pub struct App {
    config: Config,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let storage_path = config.storage_path();
        let mut extra = Vec::new();
        if let Some(parent) = storage_path.parent() {
            extra.push(parent);
        }

        DataPaths::new(config.data_dir())
            .create_dirs(&extra)
            .context("Failed to create data directories")?;

        Ok(Self { config })
    }

    /// API client with the rate limit indicator attached
    fn client(&self) -> Result<(JikanClient, JoinHandle<()>)> {
        let client = JikanClient::new(&self.config.api).context("Failed to create Jikan client")?;
        let indicator = indicator::spawn(client.subscribe());
        Ok((client, indicator))
    }

    fn storage(&self) -> Result<Arc<SqliteStorage>> {
        let path = self.config.storage_path();
        info!(path = %path.display(), "Opening storage");
        let storage = SqliteStorage::open(&path)
            .with_context(|| format!("Failed to open storage at {}", path.display()))?;
        Ok(Arc::new(storage))
    }

    fn store(&self, storage: Arc<SqliteStorage>) -> WishlistStore {
        WishlistStore::with_key(storage, self.config.storage.wishlist_key.as_str())
    }

    pub async fn search_anime(&self, filters: AnimeFilters) -> Result<()> {
        let (client, indicator) = self.client()?;
        let page = client
            .search_anime(&filters)
            .await
            .context("Anime search failed")?;
        indicator.abort();

        for anime in &page.data {
            println!(
                "{:>6}  {}  [{}] score {}",
                anime.mal_id,
                anime.title,
                anime.anime_type.as_deref().unwrap_or("?"),
                score(anime.score)
            );
        }
        print_pagination(&page.pagination, page.data.len());
        Ok(())
    }

    pub async fn search_manga(&self, filters: MangaFilters) -> Result<()> {
        let (client, indicator) = self.client()?;
        let page = client
            .search_manga(&filters)
            .await
            .context("Manga search failed")?;
        indicator.abort();

        for manga in &page.data {
            println!(
                "{:>6}  {}  [{}] score {}",
                manga.mal_id,
                manga.title,
                manga.manga_type.as_deref().unwrap_or("?"),
                score(manga.score)
            );
        }
        print_pagination(&page.pagination, page.data.len());
        Ok(())
    }

    pub async fn show_anime(&self, id: u32) -> Result<()> {
        let (client, indicator) = self.client()?;
        let anime = fetch_or_explain(client.get_anime(id).await, MediaKind::Anime, id)?;
        indicator.abort();

        let store = self.store(self.storage()?);

        println!("{} ({})", anime.title, anime.mal_id);
        if let Some(english) = &anime.title_english {
            println!("English: {}", english);
        }
        println!(
            "Type: {}  Episodes: {}  Status: {}",
            anime.anime_type.as_deref().unwrap_or("?"),
            anime.episodes.map_or("?".to_string(), |n| n.to_string()),
            anime.status.as_deref().unwrap_or("?")
        );
        println!("Score: {}", score(anime.score));
        if !anime.genres.is_empty() {
            let genres: Vec<&str> = anime.genres.iter().map(|g| g.name.as_str()).collect();
            println!("Genres: {}", genres.join(", "));
        }
        if let Some(synopsis) = &anime.synopsis {
            println!();
            println!("{}", synopsis);
        }
        println!();
        println!("In wishlist: {}", yes_no(store.contains(id, MediaKind::Anime)));
        Ok(())
    }

    pub async fn show_manga(&self, id: u32) -> Result<()> {
        let (client, indicator) = self.client()?;
        let manga = fetch_or_explain(client.get_manga(id).await, MediaKind::Manga, id)?;
        indicator.abort();

        let store = self.store(self.storage()?);

        println!("{} ({})", manga.title, manga.mal_id);
        if let Some(english) = &manga.title_english {
            println!("English: {}", english);
        }
        println!(
            "Type: {}  Chapters: {}  Volumes: {}  Status: {}",
            manga.manga_type.as_deref().unwrap_or("?"),
            manga.chapters.map_or("?".to_string(), |n| n.to_string()),
            manga.volumes.map_or("?".to_string(), |n| n.to_string()),
            manga.status.as_deref().unwrap_or("?")
        );
        println!("Score: {}", score(manga.score));
        if !manga.authors.is_empty() {
            let authors: Vec<&str> = manga.authors.iter().map(|a| a.name.as_str()).collect();
            println!("Authors: {}", authors.join(", "));
        }
        if let Some(synopsis) = &manga.synopsis {
            println!();
            println!("{}", synopsis);
        }
        println!();
        println!("In wishlist: {}", yes_no(store.contains(id, MediaKind::Manga)));
        Ok(())
    }

    pub async fn genres(&self, kind: MediaKind) -> Result<()> {
        let (client, indicator) = self.client()?;
        let genres = match kind {
            MediaKind::Anime => client.anime_genres().await,
            MediaKind::Manga => client.manga_genres().await,
        }
        .with_context(|| format!("Failed to fetch {} genres", kind))?;
        indicator.abort();

        for genre in genres {
            println!("{:>4}  {} ({})", genre.mal_id, genre.name, genre.count);
        }
        Ok(())
    }

    pub async fn wishlist(&self, command: WishlistCommand) -> Result<()> {
        match command {
            WishlistCommand::Add { kind, id } => {
                let (client, indicator) = self.client()?;
                let store = self.store(self.storage()?);

                if store.contains(id, kind) {
                    println!("{} {} is already in the wishlist", kind, id);
                    return Ok(());
                }

                let added = match kind {
                    MediaKind::Anime => {
                        let anime = fetch_or_explain(client.get_anime(id).await, kind, id)?;
                        store.add(&anime, kind)
                    }
                    MediaKind::Manga => {
                        let manga = fetch_or_explain(client.get_manga(id).await, kind, id)?;
                        store.add(&manga, kind)
                    }
                };
                indicator.abort();

                if added {
                    println!("Added {} {} to the wishlist", kind, id);
                } else {
                    println!("{} {} is already in the wishlist", kind, id);
                }
            }
            WishlistCommand::Remove { kind, id } => {
                let store = self.store(self.storage()?);
                if store.remove(id, kind) {
                    println!("Removed {} {} from the wishlist", kind, id);
                } else {
                    println!("{} {} is not in the wishlist", kind, id);
                }
            }
            WishlistCommand::List { kind } => {
                let store = self.store(self.storage()?);
                let items = match kind {
                    Some(kind) => store.items_of_kind(kind),
                    None => store.items(),
                };
                let counts = store.counts();

                println!(
                    "Wishlist: {} items ({} anime, {} manga)",
                    counts.total, counts.anime, counts.manga
                );
                print_items(&items);
            }
            WishlistCommand::Watch => self.watch_wishlist().await?,
        }

        Ok(())
    }

    /// Follow changes made by other processes until Ctrl-C
    async fn watch_wishlist(&self) -> Result<()> {
        let storage = self.storage()?;
        let watcher = storage.start_watcher(self.config.sync_poll_interval());
        let store = self.store(storage);

        let subscription = store.subscribe(|items| {
            println!("--- wishlist: {} items ---", items.len());
            print_items(items);
        });
        let sync = store.start_sync();

        println!("Watching the wishlist, press Ctrl-C to stop");
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;

        subscription.unsubscribe();
        sync.shutdown();
        watcher.abort();
        info!("Stopped watching the wishlist");
        Ok(())
    }
}

/// Turn a 404 into a readable message
fn fetch_or_explain<T>(result: Result<T, ApiError>, kind: MediaKind, id: u32) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if e.is_not_found() => {
            warn!(kind = %kind, id = id, "Entry not found");
            bail!("No {} with id {}", kind, id)
        }
        Err(e) => Err(e).with_context(|| format!("Failed to fetch {} {}", kind, id)),
    }
}

fn print_items(items: &[WishlistItem]) {
    for item in items {
        println!("{:>6}  {:<5}  {}", item.id, item.kind.as_str(), item.title);
    }
}

fn print_pagination(pagination: &Pagination, shown: usize) {
    match &pagination.items {
        Some(items) => println!(
            "Page {} of {} ({} of {} results)",
            pagination.current_page, pagination.last_visible_page, shown, items.total
        ),
        None => println!(
            "Page {} of {}",
            pagination.current_page, pagination.last_visible_page
        ),
    }
}

fn score(score: Option<f64>) -> String {
    score.map_or("-".to_string(), |s| format!("{:.2}", s))
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
