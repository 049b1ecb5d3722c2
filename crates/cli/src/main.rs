use std::sync::Arc;

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    feedrelay_config::RelayConfig,
    feedrelay_feed::{FeedFetcher, HttpFetcher, MessageTemplate},
    feedrelay_scheduler::{FeedCreate, PipelineOptions, PollService, parse_schedule},
    feedrelay_storage::{Feed, FeedPatch, FeedStore, InMemoryStore, SqliteStore},
    feedrelay_telegram::TelegramSender,
};

#[derive(Parser)]
#[command(name = "feedrelay", about = "Forward feed entries to Telegram chats")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file path (overrides discovery).
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Database file path (overrides config value).
    #[arg(long, global = true, env = "FEEDRELAY_DB")]
    db: Option<std::path::PathBuf>,

    /// Keep everything in memory; nothing survives exit.
    #[arg(long, global = true, default_value_t = false)]
    in_memory: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the polling service (default when no subcommand is provided).
    Run,
    /// Register a feed.
    Add {
        name: String,
        url:  String,
        /// Destination chat id (e.g. `-1001234567890`).
        chat_id: String,
        /// Poll schedule, e.g. `30m`, `2h`, `1d`.
        #[arg(long)]
        schedule: Option<String>,
        /// Template: simple, detailed, minimal, or a custom format string.
        #[arg(long)]
        template: Option<String>,
        /// Display-only timezone label.
        #[arg(long)]
        timezone: Option<String>,
        /// Skip fetching the URL to validate it first.
        #[arg(long, default_value_t = false)]
        no_probe: bool,
    },
    /// List registered feeds.
    List,
    /// Deactivate a feed, keeping its delivery history.
    Remove {
        id: String,
        /// Physically delete the feed and its delivery history.
        #[arg(long, default_value_t = false)]
        purge: bool,
    },
    /// Edit a feed.
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        chat_id: Option<String>,
        #[arg(long)]
        schedule: Option<String>,
        #[arg(long)]
        template: Option<String>,
        #[arg(long)]
        timezone: Option<String>,
        #[arg(long, conflicts_with = "disable", default_value_t = false)]
        enable: bool,
        #[arg(long, default_value_t = false)]
        disable: bool,
    },
    /// Poll one feed right now, outside its schedule.
    Fetch { id: String },
    /// Show counters and registered feeds.
    Status,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    let config = match &cli.config {
        Some(path) => feedrelay_config::load_config(path)?,
        None => feedrelay_config::discover_and_load(),
    };

    let store = open_store(&cli, &config).await?;

    match cli.command {
        None | Some(Commands::Run) => run(store, &config).await,
        Some(Commands::Add {
            name,
            url,
            chat_id,
            schedule,
            template,
            timezone,
            no_probe,
        }) => {
            let create = FeedCreate {
                name,
                url,
                chat_id,
                schedule,
                template: template.as_deref().map(MessageTemplate::parse),
                timezone,
            };
            add_feed(store.as_ref(), &config, create, no_probe).await
        },
        Some(Commands::List) => list_feeds(store.as_ref()).await,
        Some(Commands::Remove { id, purge }) => remove_feed(store.as_ref(), &id, purge).await,
        Some(Commands::Edit {
            id,
            name,
            url,
            chat_id,
            schedule,
            template,
            timezone,
            enable,
            disable,
        }) => {
            let patch = FeedPatch {
                name,
                url,
                chat_id,
                schedule_minutes: schedule.as_deref().map(parse_schedule),
                template: template.as_deref().map(MessageTemplate::parse),
                timezone,
                enabled: if enable {
                    Some(true)
                } else if disable {
                    Some(false)
                } else {
                    None
                },
            };
            edit_feed(store.as_ref(), &id, patch).await
        },
        Some(Commands::Fetch { id }) => fetch_feed(store, &config, &id).await,
        Some(Commands::Status) => show_status(store.as_ref()).await,
    }
}

async fn open_store(cli: &Cli, config: &RelayConfig) -> anyhow::Result<Arc<dyn FeedStore>> {
    if cli.in_memory {
        return Ok(Arc::new(InMemoryStore::new()));
    }

    let path = cli.db.clone().unwrap_or_else(|| config.database_path());
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let store = SqliteStore::new(&url)
        .await
        .with_context(|| format!("failed to open database at {}", path.display()))?;
    Ok(Arc::new(store))
}

fn build_service(
    store: Arc<dyn FeedStore>,
    config: &RelayConfig,
) -> anyhow::Result<Arc<PollService>> {
    let token = config
        .telegram_token()
        .context("telegram bot token is not configured (set TELEGRAM_BOT_TOKEN or [telegram] token)")?;

    let fetcher = HttpFetcher::new(config.poll.fetch_timeout_secs)?;
    let sender = TelegramSender::new(&token)?;
    let options = PipelineOptions {
        entries_per_poll:     config.poll.entries_per_poll,
        send_delay_ms:        config.poll.send_delay_ms,
        fetch_timeout_secs:   config.poll.fetch_timeout_secs,
        disable_link_preview: config.poll.disable_link_preview,
    };

    Ok(PollService::new(
        store,
        Arc::new(fetcher),
        Arc::new(sender),
        options,
    ))
}

async fn run(store: Arc<dyn FeedStore>, config: &RelayConfig) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "feedrelay starting");

    seed_feeds(store.as_ref(), config).await?;

    let service = build_service(store, config)?;
    service.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    service.stop().await;
    Ok(())
}

/// Register feeds declared in the config file, keyed by URL so restarts
/// do not duplicate them.
async fn seed_feeds(store: &dyn FeedStore, config: &RelayConfig) -> anyhow::Result<()> {
    if config.feeds.is_empty() {
        return Ok(());
    }

    let known: Vec<String> = store.load_feeds().await?.into_iter().map(|f| f.url).collect();

    for seed in &config.feeds {
        if known.iter().any(|url| url == &seed.url) {
            continue;
        }
        let mut feed = Feed::new(&seed.name, &seed.url, &seed.chat_id);
        feed.schedule_minutes = seed
            .schedule
            .as_deref()
            .map(parse_schedule)
            .unwrap_or(config.poll.default_schedule_minutes);
        if let Some(template) = &seed.template {
            feed.template = MessageTemplate::parse(template);
        }
        info!(name = %feed.name, url = %feed.url, "registering feed from config");
        store.save_feed(&feed).await?;
    }
    Ok(())
}

async fn add_feed(
    store: &dyn FeedStore,
    config: &RelayConfig,
    create: FeedCreate,
    no_probe: bool,
) -> anyhow::Result<()> {
    if !no_probe {
        let fetcher = HttpFetcher::new(config.poll.fetch_timeout_secs)?;
        let probe = fetcher
            .probe(&create.url)
            .await
            .with_context(|| format!("{} does not look like a usable feed", create.url))?;
        info!(
            title = probe.title.as_deref().unwrap_or("?"),
            entries = probe.entry_count,
            "feed validated"
        );
    }

    let mut feed = Feed::new(create.name, create.url, create.chat_id);
    feed.schedule_minutes = create
        .schedule
        .as_deref()
        .map(parse_schedule)
        .unwrap_or(config.poll.default_schedule_minutes);
    if let Some(template) = create.template {
        feed.template = template;
    }
    feed.timezone = create.timezone;

    store.save_feed(&feed).await?;
    println!("added feed {} ({})", feed.name, feed.id);
    Ok(())
}

async fn list_feeds(store: &dyn FeedStore) -> anyhow::Result<()> {
    let mut feeds = store.load_feeds().await?;
    if feeds.is_empty() {
        println!("no feeds registered");
        return Ok(());
    }
    feeds.sort_by(|a, b| a.name.cmp(&b.name));

    for feed in feeds {
        let state = if feed.enabled { "" } else { " [disabled]" };
        let last = feed
            .last_check
            .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "never".into());
        println!(
            "{}  {}{}\n    url: {}  chat: {}  every {}m  template: {}  last check: {}",
            feed.id,
            feed.name,
            state,
            feed.url,
            feed.chat_id,
            feed.schedule_minutes,
            feed.template.as_str(),
            last,
        );
    }
    Ok(())
}

async fn remove_feed(store: &dyn FeedStore, id: &str, purge: bool) -> anyhow::Result<()> {
    let mut feed = store.get_feed(id).await?;
    if purge {
        store.delete_feed(id).await?;
        let purged = store.purge_posted(id).await?;
        println!("deleted feed {} ({purged} ledger entries purged)", feed.name);
    } else {
        feed.enabled = false;
        store.save_feed(&feed).await?;
        println!("deactivated feed {} (history kept; --purge to delete)", feed.name);
    }
    Ok(())
}

async fn edit_feed(store: &dyn FeedStore, id: &str, patch: FeedPatch) -> anyhow::Result<()> {
    let mut feed = store.get_feed(id).await?;
    patch.apply(&mut feed);
    store.save_feed(&feed).await?;
    println!("updated feed {}", feed.name);
    Ok(())
}

async fn fetch_feed(
    store: Arc<dyn FeedStore>,
    config: &RelayConfig,
    id: &str,
) -> anyhow::Result<()> {
    // Fail on unknown ids before bothering with the sender.
    store.get_feed(id).await?;

    let service = build_service(store, config)?;
    match service.poll_feed_once(id).await {
        Ok(outcome) => {
            println!(
                "posted {} entries ({} duplicates, {} skipped, {} send errors)",
                outcome.posted, outcome.duplicates, outcome.unidentified, outcome.send_errors,
            );
            Ok(())
        },
        Err(err) => {
            warn!(id, error = %err, "manual poll failed");
            Err(err.into())
        },
    }
}

async fn show_status(store: &dyn FeedStore) -> anyhow::Result<()> {
    let counters = store.load_status().await?;
    let feeds = store.load_feeds().await?;
    let enabled = feeds.iter().filter(|f| f.enabled).count();

    let fmt_time = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".into())
    };

    println!("feeds:           {} ({enabled} enabled)", feeds.len());
    println!("entries posted:  {}", counters.entries_posted);
    println!("feeds processed: {}", counters.feeds_processed);
    println!("errors:          {}", counters.errors);
    println!("last check:      {}", fmt_time(counters.last_check));
    println!("started at:      {}", fmt_time(counters.started_at));
    Ok(())
}
