use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use log::info;
use serde_json::json;
use std::sync::Arc;

use crate::agent::{NotesFile, SecurePromptAgent};
use crate::config::Config;
use crate::data::{ArticleStore, Database, DowngradeTarget, MigrationManager, ObjectStore};
use crate::feed::FeedCurator;
use crate::http;
use crate::llm::{get_llm, RateLimiter};
use crate::models::FeedId;
use crate::news::source::google_news::{
    register_google_news_sources, GoogleNewsFetcher, GoogleNewsKind, GoogleNewsSource, Topic,
};
use crate::news::{NewsArticleReader, NewsSourceRegistry, ReaderSettings};
use crate::services::{
    run_workflow_with_history, CurationSettings, FeedService, NewsDigestService, PopulateFeedService,
    UserService, FEED_QUERY_OBJECTIVE,
};
use crate::utils::db_inspector::DbInspector;

#[derive(Debug, Parser)]
#[command(name = "duksu", version, about = "Duksu CLI for news feed workflows")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Add a new user
    AddUser {
        #[arg(long = "user_id")]
        user_id: String,
    },
    /// Create a news feed for a user
    CreateNewsFeed {
        #[arg(long = "user_id")]
        user_id: String,
        /// What the feed should cover
        #[arg(long = "query_prompt")]
        query_prompt: String,
    },
    /// Populate an existing feed with the latest articles
    PopulateFeed {
        #[arg(long = "feed_id")]
        feed_id: i64,
    },
    /// List a user's feeds
    ListFeeds {
        #[arg(long = "user_id")]
        user_id: String,
    },
    /// Show a feed and its articles
    ShowFeed {
        #[arg(long = "feed_id")]
        feed_id: i64,
    },
    /// Research and summarize tech news with the supervisor agent
    NewsDigest {
        #[arg(long)]
        query: String,
    },
    /// Manage the database schema
    Migrate {
        #[command(subcommand)]
        command: MigrateCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum MigrateCommand {
    /// Apply revisions up to `head` or a given revision
    Upgrade {
        #[arg(default_value = "head")]
        target: String,
    },
    /// Revert to `-N` revisions back, `base`, or a given revision
    Downgrade {
        #[arg(allow_hyphen_values = true)]
        target: String,
    },
    /// Show the current revision
    Current,
    /// List all revisions
    History,
    /// Compare the database against the expected schema
    Check,
}

pub async fn run(cli: Cli, config: &Config) -> Result<()> {
    match cli.command {
        Command::Migrate { command } => migrate(command, config),
        Command::AddUser { user_id } => add_user(config, &user_id).await,
        Command::CreateNewsFeed { user_id, query_prompt } => create_news_feed(config, &user_id, &query_prompt).await,
        Command::PopulateFeed { feed_id } => populate_feed(config, FeedId(feed_id)).await,
        Command::ListFeeds { user_id } => list_feeds(config, &user_id),
        Command::ShowFeed { feed_id } => show_feed(config, FeedId(feed_id)),
        Command::NewsDigest { query } => news_digest(config, &query).await,
    }
}

fn migrate(command: MigrateCommand, config: &Config) -> Result<()> {
    let database_path = config.database_path();

    if let MigrateCommand::Check = command {
        let inspector = DbInspector::new(&database_path)?;
        let issues = inspector.check_schema()?;
        if !issues.is_empty() {
            for issue in &issues {
                println!("{}", issue);
            }
            bail!("Schema check found {} issue(s)", issues.len());
        }
        inspector.print_database_report()?;
        println!("Schema is up to date");
        return Ok(());
    }

    let database = Database::open_unmigrated(&database_path)?;
    let pool = database.pool();
    let conn = pool.get()?;
    let manager = MigrationManager::new(&conn);

    match command {
        MigrateCommand::Upgrade { target } => {
            for revision in manager.upgrade(&target)? {
                println!("Applied {}", revision);
            }
        }
        MigrateCommand::Downgrade { target } => {
            for revision in manager.downgrade(&DowngradeTarget::parse(&target)?)? {
                println!("Reverted {}", revision);
            }
        }
        MigrateCommand::Current => match manager.current()? {
            Some(revision) => println!("{} (head: {})", revision, is_head(revision)),
            None => println!("base"),
        },
        MigrateCommand::History => {
            for (migration, applied) in manager.history()? {
                let marker = if applied { "applied" } else { "pending" };
                println!("{} {} ({})", migration.revision, migration.name, marker);
            }
        }
        MigrateCommand::Check => {}
    }
    Ok(())
}

fn is_head(revision: &str) -> bool {
    crate::data::migration::MIGRATIONS
        .last()
        .is_some_and(|m| m.revision == revision)
}

async fn add_user(config: &Config, user_id: &str) -> Result<()> {
    let database = Database::open(&config.database_path())?;
    let service = UserService::new(database.user_repository());

    run_workflow_with_history(
        database.workflow_run_repository().as_ref(),
        "add-user",
        &json!({ "user_id": user_id }),
        service.add_user(user_id),
    )
    .await?;
    Ok(())
}

async fn create_news_feed(config: &Config, user_id: &str, query_prompt: &str) -> Result<()> {
    let database = Database::open(&config.database_path())?;
    let mut service = FeedService::new(
        database.user_repository(),
        database.feed_repository(),
        database.feed_item_repository(),
    );
    if config.query_prompt_security_check {
        let llm = get_llm(config, 0.0, None)?;
        service = service.with_security_check(SecurePromptAgent::new(llm, Some(FEED_QUERY_OBJECTIVE.to_string())));
    }

    run_workflow_with_history(
        database.workflow_run_repository().as_ref(),
        "create-news-feed",
        &json!({ "user_id": user_id, "query_prompt": query_prompt }),
        service.create_news_feed(user_id, query_prompt),
    )
    .await?;
    Ok(())
}

async fn populate_feed(config: &Config, feed_id: FeedId) -> Result<()> {
    let database = Database::open(&config.database_path())?;
    let client = http::build_client()?;

    let mut registry = NewsSourceRegistry::new(
        config.article_collection_age_cap.clone(),
        config.article_registry_max_news_sources,
    );
    register_google_news_sources(&mut registry, Arc::new(GoogleNewsFetcher::new(client.clone())?));

    let llm = get_llm(config, 0.0, None)?;
    let limiter = Arc::new(RateLimiter::new(config.llm_requests_per_second));
    let reader_llm = get_llm(config, 0.0, Some(limiter))?;
    let reader = NewsArticleReader::new(client, reader_llm, None, ReaderSettings::from_config(config));

    let article_store = ArticleStore::new(database.article_repository(), ObjectStore::from_config(config)?);
    let service = PopulateFeedService::new(
        database.feed_repository(),
        database.feed_item_repository(),
        article_store,
        Arc::new(registry),
        llm.clone(),
        Arc::new(reader),
        FeedCurator::new(llm, None),
        CurationSettings {
            min_relevance_score: config.feed_min_relevance_score,
            max_articles_per_batch: config.feed_max_articles_per_batch,
        },
    );

    run_workflow_with_history(
        database.workflow_run_repository().as_ref(),
        "populate-feed",
        &json!({ "feed_id": feed_id }),
        service.populate_feed(feed_id),
    )
    .await?;
    Ok(())
}

fn list_feeds(config: &Config, user_id: &str) -> Result<()> {
    let database = Database::open(&config.database_path())?;
    let service = FeedService::new(
        database.user_repository(),
        database.feed_repository(),
        database.feed_item_repository(),
    );

    let feeds = service.list_feeds(user_id)?;
    if feeds.is_empty() {
        println!("No feeds for user '{}'", user_id);
    }
    for feed in feeds {
        println!("[{}] {} (created {})", feed.id, feed.query_prompt, feed.created_at.format("%Y-%m-%d %H:%M"));
    }
    Ok(())
}

fn show_feed(config: &Config, feed_id: FeedId) -> Result<()> {
    let database = Database::open(&config.database_path())?;
    let service = FeedService::new(
        database.user_repository(),
        database.feed_repository(),
        database.feed_item_repository(),
    );

    let (feed, articles) = service.show_feed(feed_id)?;
    println!("Feed {} for user '{}': {}", feed.id, feed.user_id, feed.query_prompt);
    println!("{} article(s)", articles.len());
    for article in articles {
        println!();
        println!("{} ({})", article.title, article.source);
        println!("  {}", article.url);
        if let Some(summary) = article.summary_short.as_deref().or(article.summary.as_deref()) {
            println!("  {}", summary);
        }
    }
    Ok(())
}

async fn news_digest(config: &Config, query: &str) -> Result<()> {
    let database = Database::open(&config.database_path())?;
    let fetcher = Arc::new(GoogleNewsFetcher::new(http::build_client()?)?);
    let trending = Arc::new(GoogleNewsSource::new(GoogleNewsKind::Topic(Topic::Technology), fetcher.clone()));
    let search = Arc::new(GoogleNewsSource::new(GoogleNewsKind::Search, fetcher));
    let notes = Arc::new(NotesFile::open(&config.notes_dir)?);
    info!("Writing research notes to {}", notes.path().display());

    let service = NewsDigestService::new(get_llm(config, 0.0, None)?, trending, search, notes, config.supervisor_max_steps);

    let result = run_workflow_with_history(
        database.workflow_run_repository().as_ref(),
        "news-digest",
        &json!({ "query": query }),
        service.run(query),
    )
    .await?;

    if let Some(summary) = result.final_summary {
        println!("{}", summary);
    }
    Ok(())
}
