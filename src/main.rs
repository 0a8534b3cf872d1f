use actix_files::Files;
use actix_web::{web, App, HttpServer};
use clap::Parser;
use std::path::PathBuf;

mod actors;
mod boot;
mod compile;
mod config;
mod content;
mod dom;
mod errors;
mod gateway;
mod logger;
mod merge;
mod model;
mod overlay;
mod present;
mod routes;
mod routing;
mod store;

use crate::actors::engine::{Advance, IsActive};
use crate::boot::BootSpec;
use crate::compile::{compile, ResolveMode};
use crate::content::{load_merged, FsContentSource};
use crate::dom::page::StaticPage;
use crate::dom::PageHost;
use crate::gateway::MemoryGateway;
use crate::model::{BootInfo, VersionContext};
use crate::present::{HtmlTooltipRenderer, LogNotifier};
use crate::store::UserConfigStore;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "usher")]
#[command(about = "Guided-tour backend and tour data toolchain.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Runs the backend serving tour data and per-user config
    Serve {
        #[clap(long, default_value = "127.0.0.1")]
        host: String,
        #[clap(long, default_value_t = 3000)]
        port: u16,
    },
    /// Plays an app's tours headlessly against a page snapshot
    Play {
        #[clap(long)]
        app: String,
        /// HTML snapshot standing in for the live page
        #[clap(long)]
        page: PathBuf,
        #[clap(long, default_value = "en")]
        language: String,
        #[clap(long)]
        data: Option<PathBuf>,
        #[clap(long, default_value = "0")]
        server_version: String,
        #[clap(long, default_value = "0")]
        app_version: String,
    },
    /// Validates tour data and optionally dry-runs it against a page snapshot
    Check {
        /// Only check this app's tours
        #[clap(long)]
        app: Option<String>,
        #[clap(long, default_value = "en")]
        language: String,
        /// HTML snapshot to resolve step selectors against
        #[clap(long)]
        page: Option<PathBuf>,
        /// Data directory, overriding the configured one
        #[clap(long)]
        data: Option<PathBuf>,
        #[clap(long, default_value = "0")]
        server_version: String,
        #[clap(long, default_value = "0")]
        app_version: String,
    },
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Check {
            app,
            language,
            page,
            data,
            server_version,
            app_version,
        }) => run_check(app, language, page, data, server_version, app_version).await,
        Some(Commands::Play {
            app,
            page,
            language,
            data,
            server_version,
            app_version,
        }) => run_play(app, page, language, data, server_version, app_version).await,
        Some(Commands::Serve { host, port }) => run_server(host, port).await,
        None => run_server("127.0.0.1".to_string(), 3000).await,
    }
}

async fn run_server(host: String, port: u16) -> std::io::Result<()> {
    let log_level = config::CONFIG.log_level.as_deref().unwrap_or("info");
    logger::init_logger(log_level);

    let data_path = config::CONFIG.data_path.clone().unwrap_or_else(|| "data".to_string());

    let store = match &config::CONFIG.store_path {
        Some(path) => UserConfigStore::open(path).map_err(as_io_error)?,
        None => UserConfigStore::new(),
    };
    let store = web::Data::new(store);

    logger::print_banner(&host, port);
    log::info!("serving tour data from {}", data_path);

    HttpServer::new(move || {
        App::new()
            .app_data(store.clone())
            .configure(routing::configure)
            .service(Files::new("/data", &data_path))
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}

/// Merges and compiles the tour documents, then resolves every step selector
/// against the snapshot when one is given. Bad data fails the run.
async fn run_check(
    app: Option<String>,
    language: String,
    page_path: Option<PathBuf>,
    data: Option<PathBuf>,
    server_version: String,
    app_version: String,
) -> std::io::Result<()> {
    logger::init_logger(config::CONFIG.log_level.as_deref().unwrap_or("info"));

    let data_dir = data
        .map(|p| p.display().to_string())
        .or_else(|| config::CONFIG.data_path.clone())
        .unwrap_or_else(|| "data".to_string());
    let source = FsContentSource::new(&data_dir, config::CONFIG.languages.as_deref());

    let versions = VersionContext {
        server_version,
        app_version,
    };
    let doc = load_merged(&source, &language, &versions).await.map_err(as_io_error)?;

    let snapshot = match page_path {
        Some(path) => {
            let html = std::fs::read_to_string(&path)?;
            Some(StaticPage::from_html(&html, "/"))
        }
        None => None,
    };

    let mut floats = 0usize;
    let mut tours = 0usize;
    for tour_id in doc.keys() {
        if let Some(app) = &app {
            if tour_id != app && !tour_id.starts_with(&format!("{}-", app)) {
                continue;
            }
        }

        let tour = compile(tour_id, &doc).map_err(as_io_error)?;
        tours += 1;
        log::info!(
            "{}: {} steps ({} gated, {} lazy)",
            tour_id,
            tour.step_count(),
            tour.gated.len(),
            tour.lazy.len()
        );

        let Some(page) = &snapshot else { continue };
        for (index, step) in tour.steps.iter().enumerate() {
            let selector = match &step.mode {
                ResolveMode::Floating => continue,
                ResolveMode::Lazy { selector, .. } => selector.clone(),
                ResolveMode::Gated { opener, .. } => opener.clone(),
            };
            if page.query(&selector).await.is_none() {
                log::warn!("{} step {}: '{}' not found, would float", tour_id, index + 1, selector);
                floats += 1;
            }
        }
    }

    if tours == 0 {
        log::warn!("no tours matched");
    }
    if floats > 0 {
        log::warn!("{} step(s) would fall back to floating", floats);
    } else {
        log::info!("all checks passed ({} tour(s))", tours);
    }
    Ok(())
}

/// Boots the app's tours against a parsed snapshot and keeps advancing the
/// main tour until it exits, logging what a user would see. Sidebar tours
/// start too if the snapshot contains their panel.
async fn run_play(
    app: String,
    page_path: PathBuf,
    language: String,
    data: Option<PathBuf>,
    server_version: String,
    app_version: String,
) -> std::io::Result<()> {
    logger::init_logger(config::CONFIG.log_level.as_deref().unwrap_or("info"));

    let data_dir = data
        .map(|p| p.display().to_string())
        .or_else(|| config::CONFIG.data_path.clone())
        .unwrap_or_else(|| "data".to_string());
    let source = Arc::new(FsContentSource::new(&data_dir, config::CONFIG.languages.as_deref()));

    let html = std::fs::read_to_string(&page_path)?;
    let page: Arc<StaticPage> = Arc::new(StaticPage::from_html(&html, &format!("/apps/{}", app)));

    let launched = boot::launch(
        page.clone(),
        Arc::new(MemoryGateway::new()),
        source,
        Arc::new(HtmlTooltipRenderer::new(page.clone())),
        Arc::new(LogNotifier),
        BootSpec {
            boot: BootInfo {
                app_name: app.clone(),
                app_version,
                server_version,
            },
            viewport: (1920, 1080),
            user_language: language,
            route_plan: None,
        },
    )
    .await
    .map_err(as_io_error)?;

    let Some(engine) = launched.main else {
        log::warn!("no tour declared for app '{}'", app);
        return Ok(());
    };

    loop {
        actix_rt::time::sleep(Duration::from_millis(300)).await;
        match engine.send(IsActive).await {
            Ok(true) => {
                if let Some(mount) = page.query(model::MOUNT_SELECTOR).await {
                    if let Some(tooltip) = page.outer_html(mount) {
                        log::info!("showing: {}", tooltip);
                    }
                }
                engine.do_send(Advance);
            }
            _ => break,
        }
    }
    log::info!("tour for '{}' finished", app);
    Ok(())
}

fn as_io_error(e: errors::UsherError) -> std::io::Error {
    std::io::Error::other(e.to_string())
}
