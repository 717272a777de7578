mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use pixxiden_db::SqliteGameStore;
use pixxiden_library::{Library, LibraryEvent};
use pixxiden_model::StoreId;
use pixxiden_sidecar::SidecarRunner;
use pixxiden_stores::StoreRegistry;
use pixxiden_sync::SyncOptions;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use config::LauncherConfig;

const USAGE: &str = "usage: pixxiden <command>

commands:
  sync [store...]         sync every enabled store, or only those named
  sync --skip-enrichment  sync without metadata enrichment
  sync --force-enrich     re-enrich games enriched before
  games                   list the library
  search <query>          find games by title or developer
  recent [limit]          recently played games (default 10)
  favorites               list favorite games
  favorite <id>           toggle a game's favorite flag
  status                  show store availability and login state
  launch <id>             launch a game
  install <id> [path]     install a game
  uninstall <id>          uninstall a game
  config                  print the effective configuration
  config init             write the configuration file";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,pixxiden=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let cfg = LauncherConfig::load().unwrap_or_default();

    match args.as_slice() {
        ["config"] => return print_json(&cfg),
        ["config", "init"] => {
            cfg.save()?;
            println!("{}", config::config_path()?.display());
            return Ok(());
        }
        [] | ["help"] | ["--help"] | ["-h"] => {
            println!("{USAGE}");
            return Ok(());
        }
        _ => {}
    }

    let library = build_library(&cfg)?;
    match args.as_slice() {
        ["sync", rest @ ..] => {
            let options = sync_options(rest)?;
            let token = CancellationToken::new();
            let on_interrupt = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupted, cancelling sync");
                    on_interrupt.cancel();
                }
            });
            print_json(&library.sync_games_with_options(&options, token).await?)
        }
        ["games"] => print_json(&library.get_games().await?),
        ["search", query] => print_json(&library.search_games(query).await?),
        ["recent"] => print_json(&library.get_recently_played(10).await?),
        ["recent", limit] => {
            let limit = limit.parse().context("limit must be a number")?;
            print_json(&library.get_recently_played(limit).await?)
        }
        ["favorites"] => print_json(&library.get_favorites().await?),
        ["favorite", id] => {
            let favorite = library.toggle_favorite(id).await?;
            println!("{id}: {}", if favorite { "favorite" } else { "not favorite" });
            Ok(())
        }
        ["status"] => print_json(&library.get_store_status().await),
        ["launch", id] => {
            library.launch_game(id).await?;
            Ok(())
        }
        ["install", id] => install(&library, id, None).await,
        ["install", id, path] => install(&library, id, Some(PathBuf::from(*path))).await,
        ["uninstall", id] => {
            library.uninstall_game(id).await?;
            Ok(())
        }
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }
}

fn sync_options(args: &[&str]) -> anyhow::Result<SyncOptions> {
    let mut options = SyncOptions::default();
    let mut stores = Vec::new();
    for arg in args {
        match *arg {
            "--skip-enrichment" => options.skip_enrichment = true,
            "--force-enrich" => options.force_enrich = true,
            name => stores.push(name.parse::<StoreId>()?),
        }
    }
    if !stores.is_empty() {
        options.stores = Some(stores);
    }
    Ok(options)
}

fn build_library(cfg: &LauncherConfig) -> anyhow::Result<Library> {
    let db_path = cfg.database_path()?;
    let db = SqliteGameStore::open(&db_path)
        .with_context(|| format!("opening {}", db_path.display()))?;

    let runner = SidecarRunner::new(cfg.sidecar_timeout());
    let registry = StoreRegistry::from_config(&cfg.stores, runner.clone());

    Ok(Library::builder(registry, Arc::new(db))
        .max_concurrent_stores(cfg.max_concurrent_stores)
        .auth_timeout(cfg.auth_timeout())
        .runner(runner)
        .build())
}

async fn install(library: &Library, id: &str, path: Option<PathBuf>) -> anyhow::Result<()> {
    let mut events = library.subscribe();
    let progress = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let LibraryEvent::InstallProgress(p) = event {
                eprintln!("{}: {:.1}%", p.app_id, p.percent);
            }
        }
    });

    let result = library.install_game(id, path).await;
    progress.abort();
    result?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
