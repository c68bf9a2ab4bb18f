use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};

use bitredict_live::alerts::{AlertGate, TerminalNotifier};
use bitredict_live::api::HttpNotificationApi;
use bitredict_live::cache::NotificationCache;
use bitredict_live::center::{Applied, NotificationCenter};
use bitredict_live::community::{CommunityStore, NewComment, NewThread};
use bitredict_live::config::{AppConfig, CONFIG_PATH};
use bitredict_live::reporter::{self, timestamp};
use bitredict_live::types::LiveEvent;
use bitredict_live::{Channel, EventPayload, RealtimeClient};

#[derive(Parser)]
#[command(name = "bitredict", about = "BitRedict realtime updates and community store")]
struct Args {
    /// Path to the TOML config file
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stream notifications and pool updates as JSON lines until Ctrl+C
    Watch {
        /// Wallet address whose notifications to follow
        #[arg(long)]
        address: String,

        /// Pool id to follow (repeatable); also follows its bets channel
        #[arg(long = "pool")]
        pools: Vec<String>,

        /// Follow the global liquidity channel
        #[arg(long)]
        liquidity: bool,
    },
    /// One-shot notification operations
    Notifications {
        /// Wallet address the notifications belong to
        #[arg(long)]
        address: String,

        #[command(subcommand)]
        action: NotificationAction,
    },
    /// Community threads and comments
    Community {
        #[command(subcommand)]
        action: CommunityAction,
    },
}

#[derive(Subcommand)]
enum NotificationAction {
    List,
    Read { id: i64 },
    ReadAll,
    Delete { id: i64 },
    Clear,
}

#[derive(Subcommand)]
enum CommunityAction {
    List {
        #[arg(long)]
        category: Option<String>,
    },
    Show {
        id: String,
    },
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
        #[arg(long)]
        author: String,
        #[arg(long)]
        category: Option<String>,
    },
    Comment {
        thread_id: String,
        #[arg(long)]
        author: String,
        #[arg(long)]
        content: String,
    },
    Like {
        id: String,
    },
    Delete {
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            warn!("Failed to load .env: {e}");
        }
    }

    let args = Args::parse();
    let mut config = AppConfig::load_or_default(&args.config)?;
    config.apply_env_overrides();

    match args.command {
        Command::Watch {
            address,
            pools,
            liquidity,
        } => watch(&config, &address, &pools, liquidity).await,
        Command::Notifications { address, action } => {
            notifications(&config, &address, action).await
        }
        Command::Community { action } => community(&config.community.store_path, action),
    }
}

fn notification_center(config: &AppConfig) -> Result<NotificationCenter> {
    let api = HttpNotificationApi::new(&config.endpoints.api_base)
        .with_context(|| format!("invalid api_base {}", config.endpoints.api_base))?;
    let cache = NotificationCache::new(config.cache_store());
    let mut center = NotificationCenter::new(Arc::new(api), cache)
        .with_cap(config.notifications.cap)
        .with_history_limit(config.notifications.history_limit);
    if config.notifications.system_alerts {
        center = center.with_alerts(AlertGate::new(Box::new(TerminalNotifier)));
    }
    Ok(center)
}

async fn watch(config: &AppConfig, address: &str, pools: &[String], liquidity: bool) -> Result<()> {
    let mut center = notification_center(config)?;

    // Subscribe before fetching history; pushes that race the fetch queue in
    // the stream and are deduplicated when replayed below.
    let client = RealtimeClient::websocket(config.client_options());
    let mut status = client.watch_status();
    let mut user_events = client.subscribe_stream(Channel::user(address));

    let snapshot = center.load(address).await;
    reporter::report_event(&LiveEvent::Snapshot {
        timestamp: timestamp(),
        address: address.to_lowercase(),
        snapshot,
    });

    let mut feed_channels: Vec<Channel> = pools
        .iter()
        .flat_map(|id| [Channel::pool(id), Channel::pool_bets(id)])
        .collect();
    if liquidity {
        feed_channels.push(Channel::liquidity_added());
    }
    let (feed_tx, mut feed_rx) = mpsc::unbounded_channel::<(Channel, Value)>();
    let feeds: Vec<_> = feed_channels
        .into_iter()
        .map(|channel| {
            let tx = feed_tx.clone();
            let label = channel.clone();
            client.subscribe(channel, move |event| {
                if let EventPayload::Update(data) = &event.payload {
                    let _ = tx.send((label.clone(), data.clone()));
                }
            })
        })
        .collect();
    drop(feed_tx);

    info!(
        address = %address,
        feeds = feeds.len(),
        url = %config.endpoints.ws_url,
        "Watching. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            Some(event) = user_events.recv() => {
                let line = match center.apply(&event) {
                    Applied::Inserted(record) => Some(LiveEvent::Notification {
                        timestamp: timestamp(),
                        record,
                        unread_count: center.unread_count(),
                    }),
                    Applied::Duplicate(id) => Some(LiveEvent::DuplicateDropped {
                        timestamp: timestamp(),
                        id,
                    }),
                    Applied::UnreadCount(unread_count) => Some(LiveEvent::UnreadCount {
                        timestamp: timestamp(),
                        unread_count,
                    }),
                    Applied::Ignored => None,
                };
                if let Some(line) = line {
                    reporter::report_event(&line);
                }
            }
            Some((channel, data)) = feed_rx.recv() => {
                reporter::report_event(&LiveEvent::FeedUpdate {
                    timestamp: timestamp(),
                    channel,
                    data,
                });
            }
            changed = status.changed() => {
                if changed.is_err() {
                    warn!("Realtime client stopped");
                    break;
                }
                let current = *status.borrow_and_update();
                reporter::report_event(&LiveEvent::Connection {
                    timestamp: timestamp(),
                    status: current,
                });
            }
        }
    }

    drop(feeds);
    drop(user_events);
    client.shutdown().await;
    center.dispose();
    Ok(())
}

async fn notifications(config: &AppConfig, address: &str, action: NotificationAction) -> Result<()> {
    let mut center = notification_center(config)?;
    let snapshot = center.load(address).await;

    let mutation = match action {
        NotificationAction::List => {
            reporter::report_value(&snapshot);
            return Ok(());
        }
        NotificationAction::Read { id } => center.mark_as_read(id).await,
        NotificationAction::ReadAll => center.mark_all_as_read().await,
        NotificationAction::Delete { id } => center.delete_notification(id).await,
        NotificationAction::Clear => center.delete_all_notifications().await,
    };
    if let Some(mutation) = mutation {
        reporter::report_event(&LiveEvent::Mutation {
            timestamp: timestamp(),
            mutation,
        });
    }
    reporter::report_value(&center.snapshot());
    Ok(())
}

fn community(path: &Path, action: CommunityAction) -> Result<()> {
    let store = CommunityStore::open(path);
    match action {
        CommunityAction::List { category } => {
            reporter::report_value(&store.list_threads(category.as_deref())?);
        }
        CommunityAction::Show { id } => {
            reporter::report_value(&store.get_thread(&id)?);
        }
        CommunityAction::Create {
            title,
            content,
            author,
            category,
        } => {
            let thread = store.create_thread(NewThread {
                title,
                content,
                author,
                category,
            })?;
            reporter::report_value(&thread);
        }
        CommunityAction::Comment {
            thread_id,
            author,
            content,
        } => {
            let comment = store.add_comment(&thread_id, NewComment { author, content })?;
            reporter::report_value(&comment);
        }
        CommunityAction::Like { id } => {
            reporter::report_value(&store.like_thread(&id)?);
        }
        CommunityAction::Delete { id } => {
            reporter::report_value(&store.delete_thread(&id)?);
        }
    }
    Ok(())
}
