//! mpx command line tool
//!
//! Reads objects from the mpx data services and follows their notification
//! feeds. Results are written to stdout as JSON, one object per line for
//! lists and notifications; logs go to stderr.
//!
//! ```text
//! mpx get media 2602559
//! mpx list media --by title="Most Excellent Video" --sort added|desc --limit 20
//! mpx notify media --client-id my-watcher
//! mpx config example > mpx.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::{info, warn};

use mpx_config::{CacheBackend, ConfigLoader, LockBackend, MpxConfig};
use mpx_sdk::lock::{LocalLock, RedisLock, SessionLock};
use mpx_sdk::query::{ByFields, Fields, ObjectListQuery, QQuery, Range, Sort, SortOrder, Term};
use mpx_sdk::token_cache::RedisCacheBackend;
use mpx_sdk::{
    Account, Client, DataService, Error, Notification, NotificationEntry, StaticResolver, TokenCachePool,
    UserSession, ACCOUNT_DATA_SERVICE, MEDIA_DATA_SERVICE, PLAYER_DATA_SERVICE,
};

#[derive(Parser, Debug)]
#[command(name = "mpx")]
#[command(about = "Query mpx data services and follow their notifications")]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(long, short, env = "MPX_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load one object by id or URI
    Get {
        service: ServiceName,
        id: String,
        /// Account the object belongs to
        #[arg(long)]
        account: Option<String>,
    },
    /// Select objects, paging through every result unless a range is given
    List {
        service: ServiceName,
        /// Exact-match filter, repeatable
        #[arg(long = "by", value_name = "FIELD=VALUE", value_parser = parse_by)]
        by: Vec<(String, String)>,
        /// Full-text query term
        #[arg(long)]
        search: Option<String>,
        /// Sort fields, e.g. `added|desc,title`
        #[arg(long)]
        sort: Option<String>,
        /// Comma separated fields to return
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,
        /// First index (1-based) of a single page to fetch
        #[arg(long)]
        start: Option<u32>,
        /// Last index of a single page to fetch
        #[arg(long)]
        end: Option<u32>,
        /// Stop after this many objects
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        account: Option<String>,
    },
    /// Print notifications as they arrive until interrupted
    Notify {
        service: ServiceName,
        /// Consumer name reported to mpx
        #[arg(long, env = "MPX_NOTIFY_CLIENT_ID")]
        client_id: Option<String>,
        /// Resume after this sequence id instead of syncing to the head
        #[arg(long)]
        since: Option<i64>,
        #[arg(long)]
        account: Option<String>,
    },
    /// Configuration helpers
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print a documented example configuration
    Example,
    /// Print the effective configuration, password redacted
    Show,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ServiceName {
    Media,
    Player,
    Account,
}

impl ServiceName {
    fn data_service(self) -> DataService {
        match self {
            Self::Media => MEDIA_DATA_SERVICE,
            Self::Player => PLAYER_DATA_SERVICE,
            Self::Account => ACCOUNT_DATA_SERVICE,
        }
    }
}

fn parse_by(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((field, value)) if !field.trim().is_empty() => Ok((field.trim().to_string(), value.to_string())),
        _ => Err(format!("expected FIELD=VALUE, got '{}'", s)),
    }
}

fn parse_sort(s: &str) -> Result<Sort> {
    let mut sort: Option<Sort> = None;
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (field, order) = match part.split_once('|') {
            None => (part, SortOrder::Ascending),
            Some((field, "asc")) => (field, SortOrder::Ascending),
            Some((field, "desc")) => (field, SortOrder::Descending),
            Some((_, other)) => bail!("unknown sort order '{}'", other),
        };
        sort = Some(match (sort, order) {
            (None, SortOrder::Ascending) => Sort::by(field),
            (None, SortOrder::Descending) => Sort::by_desc(field),
            (Some(sort), order) => sort.then(field, order),
        });
    }
    sort.ok_or_else(|| anyhow!("empty sort"))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn notification_json(notification: Notification<Value>) -> Value {
    let entry = match notification.entry {
        Some(NotificationEntry::Loaded(object)) => object,
        Some(NotificationEntry::Reference(reference)) => json!({ "reference": reference }),
        None => Value::Null,
    };
    json!({
        "id": notification.id,
        "method": notification.method.map(|m| m.as_str()),
        "type": notification.object_type,
        "entry": entry,
    })
}

async fn build_client(config: &MpxConfig) -> Result<Client> {
    config.validate()?;

    let sdk_config = config.sdk_config();
    let http_client = sdk_config.http_client()?;

    let cache = match config.cache.backend {
        CacheBackend::Memory => TokenCachePool::in_memory(),
        CacheBackend::Redis => {
            let url = config.cache.redis_url.as_deref().context("cache.redis_url is not set")?;
            TokenCachePool::new(Arc::new(RedisCacheBackend::connect(url).await?))
        }
    }
    .with_key_prefix(config.cache.key_prefix.clone());

    let lock: Arc<dyn SessionLock> = match config.lock.backend {
        LockBackend::Local => Arc::new(LocalLock::new()),
        LockBackend::Redis => {
            let lock_config = config.redis_lock_config().context("lock.redis_url is not set")?;
            Arc::new(RedisLock::new(lock_config).await?)
        }
    };

    let session = UserSession::from_config(&sdk_config, http_client.clone())
        .with_token_cache(cache)
        .with_lock(lock);
    let mut client = Client::from_session(sdk_config, http_client, session)?;

    if !config.endpoints.services.is_empty() {
        let mut resolver = StaticResolver::new();
        for (name, base) in &config.endpoints.services {
            resolver = resolver.with_service(name, base)?;
        }
        client = client.with_resolver(Arc::new(resolver));
    }

    Ok(client)
}

fn build_query(
    client: &Client,
    by: Vec<(String, String)>,
    search: Option<String>,
    sort: Option<String>,
    fields: Vec<String>,
) -> Result<ObjectListQuery> {
    let mut query = client.query()?;

    if !by.is_empty() {
        let filters = by
            .into_iter()
            .fold(ByFields::new(), |filters, (field, value)| filters.field(field, value));
        query = query.add(filters);
    }
    if let Some(text) = search {
        query = query.add(QQuery::new(Term::new(text)));
    }
    if let Some(sort) = sort {
        query = query.with_sort(parse_sort(&sort)?);
    }
    if !fields.is_empty() {
        query = query.add(Fields::new(fields));
    }

    Ok(query)
}

#[tokio::main]
async fn main() -> Result<()> {
    mpx_common::logging::init_logging("mpx-cli");

    let args = Args::parse();

    if let Command::Config { action: ConfigAction::Example } = &args.command {
        print!("{}", MpxConfig::example_toml());
        return Ok(());
    }

    let loader = match &args.config {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    let config = loader.load()?;

    match args.command {
        Command::Config { action: ConfigAction::Show } | Command::Config { action: ConfigAction::Example } => {
            println!("{:#?}", config);
            Ok(())
        }
        Command::Get { service, id, account } => {
            let client = build_client(&config).await?;
            let factory = client.factory::<Value>(service.data_service());
            let account = account.map(Account::new);

            let object = factory.load(&id, account.as_ref()).await?;
            println!("{}", serde_json::to_string_pretty(&object)?);

            finish(&client, &config).await;
            Ok(())
        }
        Command::List {
            service,
            by,
            search,
            sort,
            fields,
            start,
            end,
            limit,
            account,
        } => {
            let client = build_client(&config).await?;
            let factory = client.factory::<Value>(service.data_service());
            let account = account.map(Account::new);
            let mut query = build_query(&client, by, search, sort, fields)?;

            if start.is_some() || end.is_some() {
                let start = start.unwrap_or(1);
                let end = end.unwrap_or(start + config.paging.page_size - 1);
                query = query.with_range(Range::new(start, end)?);

                let list = factory.select(&query, account.as_ref()).await?;
                info!(
                    start_index = list.start_index(),
                    entry_count = list.entry_count(),
                    total_results = ?list.total_results(),
                    has_next = list.has_next(),
                    "Fetched page"
                );
                for object in list.into_entries().into_iter().take(limit.unwrap_or(usize::MAX)) {
                    print_json(&object)?;
                }
            } else {
                let stream = factory
                    .iter(query, account)
                    .into_stream()
                    .take(limit.unwrap_or(usize::MAX));
                let mut stream = std::pin::pin!(stream);
                let mut count = 0usize;
                while let Some(object) = stream.next().await {
                    print_json(&object?)?;
                    count += 1;
                }
                info!(count, "Listed objects");
            }

            finish(&client, &config).await;
            Ok(())
        }
        Command::Notify {
            service,
            client_id,
            since,
            account,
        } => {
            let client = build_client(&config).await?;
            let client_id = client_id.unwrap_or_else(|| config.notify.client_id.clone());

            let mut listener = client.listener::<Value>(service.data_service(), client_id);
            if let Some(account) = account {
                listener = listener.with_account(Account::new(account));
            }
            if let Some(since) = since {
                listener = listener.with_last_id(since);
            }

            let ctrl_c = tokio::signal::ctrl_c();
            let mut ctrl_c = std::pin::pin!(ctrl_c);

            loop {
                let polled = tokio::select! {
                    _ = &mut ctrl_c => {
                        info!("Interrupted, stopping listener");
                        break;
                    }
                    polled = async {
                        if listener.last_id().is_none() {
                            listener.sync().await?;
                        }
                        listener.listen().await
                    } => polled,
                };

                match polled {
                    Ok(batch) => {
                        for notification in batch {
                            print_json(&notification_json(notification))?;
                        }
                    }
                    Err(Error::NotificationExpired { since }) if config.notify.resync_on_expiry => {
                        warn!(since, "Notification id expired, resynchronizing");
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            finish(&client, &config).await;
            Ok(())
        }
    }
}

/// Sign out tokens nobody else can reuse
async fn finish(client: &Client, config: &MpxConfig) {
    if config.cache.backend == CacheBackend::Memory {
        if let Err(e) = client.sign_out().await {
            warn!(error = %e, "Sign out failed");
        }
    }
}
