use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use postpulse_core::{
    load_selectors_if_present, AppConfig, Post, SelectorConfig, StoreBackend,
};
use postpulse_db::{CachePolicy, CachedPosts, DocumentStore, MemoryStore, PgStore, PostCache};
use postpulse_scraper::{BrowserScrapeService, ScrapeBackend};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "postpulse-cli")]
#[command(about = "Operator commands for the post scraping service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Open a visible browser, log in (completing any verification by hand),
    /// and save the session for the service to reuse.
    Login {
        /// Keep the browser headless even for manual verification.
        #[arg(long)]
        headless: bool,
    },
    /// Fetch posts from a profile, through the cache unless --fresh is given.
    ScrapeProfile {
        profile_url: String,
        #[arg(short = 'n', long, default_value_t = 10)]
        n_posts: usize,
        /// Skip the cache and print a fresh scrape without storing it.
        #[arg(long)]
        fresh: bool,
    },
    /// Fetch posts for a hashtag, through the cache unless --fresh is given.
    ScrapeHashtag {
        hashtag: String,
        #[arg(short = 'n', long, default_value_t = 5)]
        n_posts: usize,
        #[arg(long)]
        fresh: bool,
    },
    /// Remove duplicate posts from one profile, or from all profiles.
    Cleanup {
        #[arg(long)]
        username: Option<String>,
    },
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    Ping,
    Migrate,
}

#[derive(Debug, Serialize)]
struct ScrapeOutput {
    total_posts: usize,
    from_cache: bool,
    posts: Vec<Post>,
}

impl From<CachedPosts> for ScrapeOutput {
    fn from(cached: CachedPosts) -> Self {
        Self {
            total_posts: cached.posts.len(),
            from_cache: cached.from_cache,
            posts: cached.posts,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let mut config = postpulse_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let Some(command) = cli.command else {
        println!("postpulse-cli ready; run with --help for commands");
        return Ok(());
    };

    match command {
        Commands::Login { headless } => {
            config.browser_headless = headless;
            let service = BrowserScrapeService::from_config(&config, load_selectors(&config)?);
            service
                .bootstrap_login()
                .await
                .context("login did not complete")?;
            println!("session saved to {}", config.session_state_path.display());
        }
        Commands::ScrapeProfile {
            profile_url,
            n_posts,
            fresh,
        } => {
            let n = n_posts.clamp(1, config.max_posts_per_request.max(1));
            let service = BrowserScrapeService::from_config(&config, load_selectors(&config)?);
            let output = if fresh {
                let posts = service.profile_posts(&profile_url, n).await?;
                ScrapeOutput::from(CachedPosts {
                    posts,
                    from_cache: false,
                })
            } else {
                let cache = open_cache(&config).await?;
                cache
                    .get_or_scrape_profile(&profile_url, n, || {
                        service.profile_posts(&profile_url, n)
                    })
                    .await?
                    .into()
            };
            print_json(&output)?;
        }
        Commands::ScrapeHashtag {
            hashtag,
            n_posts,
            fresh,
        } => {
            let n = n_posts.clamp(1, config.max_posts_per_request.max(1));
            let service = BrowserScrapeService::from_config(&config, load_selectors(&config)?);
            let output = if fresh {
                let posts = service.hashtag_posts(&hashtag, n).await?;
                ScrapeOutput::from(CachedPosts {
                    posts,
                    from_cache: false,
                })
            } else {
                let cache = open_cache(&config).await?;
                cache
                    .get_or_scrape_hashtag(&hashtag, n, || service.hashtag_posts(&hashtag, n))
                    .await?
                    .into()
            };
            print_json(&output)?;
        }
        Commands::Cleanup { username } => {
            let cache = open_cache(&config).await?;
            let report = cache.cleanup_duplicates(username.as_deref()).await?;
            print_json(&report)?;
        }
        Commands::Db { command } => {
            let pool = postpulse_db::connect_pool_from_config(&config).await?;
            match command {
                DbCommands::Ping => {
                    postpulse_db::ping(&pool).await?;
                    println!("database reachable");
                }
                DbCommands::Migrate => {
                    let applied = postpulse_db::run_migrations(&pool).await?;
                    println!("applied {applied} migration(s)");
                }
            }
        }
    }

    Ok(())
}

fn load_selectors(config: &AppConfig) -> anyhow::Result<Arc<SelectorConfig>> {
    let selectors = load_selectors_if_present(&config.selectors_path)?.unwrap_or_else(|| {
        tracing::warn!(
            path = %config.selectors_path.display(),
            "selectors file not found, using built-in selectors"
        );
        SelectorConfig::default()
    });
    Ok(Arc::new(selectors))
}

async fn open_cache(config: &AppConfig) -> anyhow::Result<PostCache> {
    let store: Arc<dyn DocumentStore> = match config.store {
        StoreBackend::Postgres => {
            let pool = postpulse_db::connect_pool_from_config(config).await?;
            postpulse_db::run_migrations(&pool).await?;
            Arc::new(PgStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("in-memory store selected; results will not be kept");
            Arc::new(MemoryStore::new())
        }
    };
    Ok(PostCache::new(store, CachePolicy::from_app_config(config)))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
