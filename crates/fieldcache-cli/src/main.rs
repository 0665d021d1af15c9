//! Fieldcache CLI - drive the session and resource store from a terminal.
//!
//! Every command bootstraps the services against the on-disk store, so
//! state (credential, collections, configuration snapshot) persists between
//! invocations exactly as it would between page loads.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{Map, Value};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fieldcache_core::utils::truncate_string;
use fieldcache_core::{ListQuery, Services, Settings};

const USAGE: &str = "\
Usage: fieldcache <command> [args]

Commands:
  seed                               Populate empty collections with demo data
  login <identifier> [secret]        Log in (prompts for the secret if omitted)
  logout                             Forget the stored credential
  whoami                             Show the current user
  list <collection> [search] [page]  List one page of a collection
  get <collection> <id>              Show one record
  create <collection> <json>         Create a record from a JSON object
  update <collection> <id> <json>    Merge a JSON object into a record
  delete <collection> <id>           Delete a record
  config [--refresh|--clear]         Show the configuration manifest
  migrate                            Run startup migration and report";

/// Width of the record summary column in `list` output
const SUMMARY_WIDTH: usize = 72;

/// Initialize the tracing subscriber. Logs go to stderr, and also to a
/// daily-rolling file when `log_dir` is set.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "fieldcache.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let (mut settings, load_error) = match Settings::load() {
        Ok(settings) => (settings, None),
        Err(e) => (Settings::default(), Some(e)),
    };
    if let Ok(dir) = std::env::var("FIELDCACHE_DATA_DIR") {
        settings.data_dir = Some(PathBuf::from(dir));
    }
    if let Ok(dir) = std::env::var("FIELDCACHE_LOG_DIR") {
        settings.log_dir = Some(PathBuf::from(dir));
    }

    let _guard = init_tracing(settings.log_dir.as_deref());
    if let Some(e) = load_error {
        warn!(error = %e, "Failed to load settings, using defaults");
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{}", USAGE);
        return Ok(());
    };
    if command == "--help" || command == "-h" || command == "help" {
        println!("{}", USAGE);
        return Ok(());
    }

    let services = Services::open(settings)?;
    info!(command = %command, "fieldcache starting");

    if command != "migrate" {
        services.credentials.migrate_legacy();
    }

    run(&services, command, &args[1..]).await
}

async fn run(services: &Services, command: &str, args: &[String]) -> Result<()> {
    match command {
        "seed" => {
            let written = services.seed_demo_data().await?;
            println!("Seeded {} records", written);
        }
        "login" => {
            let identifier = arg(args, 0, "identifier")?;
            let secret = match args.get(1) {
                Some(secret) => secret.clone(),
                None => rpassword::prompt_password("Password: ").context("Failed to read password")?,
            };
            let outcome = services.session.login(identifier, &secret).await;
            print_json(&outcome)?;
            if !outcome.success {
                bail!(outcome.message.unwrap_or_else(|| "Login failed".to_string()));
            }
        }
        "logout" => {
            services.session.logout().await;
            println!("Logged out");
        }
        "whoami" => whoami(services).await?,
        "list" => {
            let collection = arg(args, 0, "collection")?;
            let mut query = ListQuery::new();
            if let Some(search) = args.get(1).filter(|s| !s.is_empty()) {
                query = query.search(search.clone());
            }
            if let Some(page) = args.get(2) {
                query = query.page(page.parse().with_context(|| format!("Invalid page: {}", page))?);
            }
            list(services, collection, &query).await?;
        }
        "get" => {
            let collection = arg(args, 0, "collection")?;
            let id = parse_id(arg(args, 1, "id")?)?;
            match services.resources.get_by_id(collection, id).await {
                Some(record) => print_json(&record)?,
                None => bail!("Record {} not found in {}", id, collection),
            }
        }
        "create" => {
            let collection = arg(args, 0, "collection")?;
            let fields = parse_object(arg(args, 1, "json")?)?;
            let record = services.resources.create(collection, fields).await?;
            print_json(&record)?;
        }
        "update" => {
            let collection = arg(args, 0, "collection")?;
            let id = parse_id(arg(args, 1, "id")?)?;
            let fields = parse_object(arg(args, 2, "json")?)?;
            let record = services.resources.update(collection, id, fields).await?;
            print_json(&record)?;
        }
        "delete" => {
            let collection = arg(args, 0, "collection")?;
            let id = parse_id(arg(args, 1, "id")?)?;
            services.resources.remove(collection, id).await?;
            println!("Deleted {} from {}", id, collection);
        }
        "config" => config(services, args.first().map(String::as_str)).await?,
        "migrate" => {
            let report = services.bootstrap().await;
            println!(
                "Legacy credential migrated: {}",
                if report.migrated_credential { "yes" } else { "no" }
            );
            println!("Configuration: {:?}", report.config_origin);
        }
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }
    Ok(())
}

async fn whoami(services: &Services) -> Result<()> {
    let Some(user) = services.session.current_user().await else {
        println!("Not logged in");
        return Ok(());
    };

    print_json(&user)?;
    match services.credentials.expiry().expires_at() {
        Some(at) => println!("Session expires {}", at.to_rfc3339()),
        None => println!("Session has no recorded expiry"),
    }
    Ok(())
}

async fn list(services: &Services, collection: &str, query: &ListQuery) -> Result<()> {
    let page = services.resources.list(collection, query).await;

    for record in &page.items {
        let summary = serde_json::to_string(&record.fields)?;
        println!("{:>5}  {}", record.id, truncate_string(&summary, SUMMARY_WIDTH));
    }
    println!(
        "Page {} of {} ({} records{})",
        page.page,
        page.total_pages,
        page.total,
        if page.has_next() { ", more available" } else { "" }
    );
    Ok(())
}

async fn config(services: &Services, flag: Option<&str>) -> Result<()> {
    let snapshot = match flag {
        None => services.config.get().await,
        Some("--refresh") => services.config.refresh().await,
        Some("--clear") => {
            services.config.clear();
            println!("Configuration cache cleared");
            return Ok(());
        }
        Some(other) => bail!("Unknown config flag: {}", other),
    };

    print_json(&snapshot.data)?;
    println!(
        "Origin: {:?}, cached {}",
        snapshot.origin,
        snapshot.age_display()
    );
    Ok(())
}

fn arg<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("Missing argument <{}>\n\n{}", name, USAGE))
}

fn parse_id(raw: &str) -> Result<u64> {
    raw.parse().with_context(|| format!("Invalid id: {}", raw))
}

fn parse_object(raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw).context("Invalid JSON")? {
        Value::Object(fields) => Ok(fields),
        _ => bail!("Expected a JSON object"),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
