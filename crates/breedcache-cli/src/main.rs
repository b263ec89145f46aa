//! breedcache - browse The Cat API breed catalog from the command line.
//!
//! Every command goes through the same offline-first catalog the library
//! exposes: cached rows are printed first, then the refreshed result. Each
//! `ResourceState` transition is printed on its own line.

use std::io;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures::StreamExt;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use breedcache_core::screens::{BreedDetail, CatalogBrowser, Notice};
use breedcache_core::{Catalog, CatalogItem, Config, JsonPreferences, PreferenceStore, ResourceState};

// ============================================================================
// Constants
// ============================================================================

/// Pages fetched by `list` when `--pages` is not given
const DEFAULT_LIST_PAGES: u32 = 1;

/// Log file prefix inside `log_dir`
const LOG_FILE_PREFIX: &str = "breedcache";

const USAGE: &str = "\
Usage: breedcache <command> [options]

Commands:
  list [--pages N] [--refresh]   Show the breed list, N pages deep
  search <term>                  Search breeds by name
  show <id> [--refresh]          Show one breed and its gallery
  favorite <id>                  Toggle a breed's favorite flag
  favorites                      List favorited breeds
  theme [dark|light]             Show or set the theme preference";

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` controls the level (default `warn`). When `log_dir` is set,
/// events are also written to a daily rolling file; keep the returned guard
/// alive until exit so buffered lines are flushed.
fn init_tracing(config: &Config) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_FILE_PREFIX)
                .filename_suffix("log")
                .build(dir)
                .with_context(|| format!("Failed to open log directory {}", dir.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{}", USAGE);
        return Ok(());
    };
    let rest = &args[1..];

    let config = Config::load().context("Failed to load configuration")?;
    let _guard = init_tracing(&config)?;
    info!(command = %command, "breedcache starting");

    match command.as_str() {
        "list" => {
            let pages = match flag_value(rest, "--pages") {
                Some(value) => value
                    .parse::<u32>()
                    .with_context(|| format!("Invalid page count: {}", value))?,
                None => DEFAULT_LIST_PAGES,
            };
            let catalog = Catalog::open(&config)?;
            list(&catalog, pages.max(1), has_flag(rest, "--refresh")).await
        }
        "search" => {
            let term = rest.join(" ");
            if term.trim().is_empty() {
                bail!("search needs a term\n\n{}", USAGE);
            }
            let catalog = Arc::new(Catalog::open(&config)?);
            let prefs = JsonPreferences::open(config.preferences_path()?)
                .context("Failed to load preferences")?;
            let browser = CatalogBrowser::new(catalog, Arc::new(prefs), config.search_debounce());
            search(browser, &term).await
        }
        "show" => {
            let id = positional(rest).context("show needs a breed id")?;
            let catalog = Arc::new(Catalog::open(&config)?);
            show(catalog, id, has_flag(rest, "--refresh")).await
        }
        "favorite" => {
            let id = positional(rest).context("favorite needs a breed id")?;
            let catalog = Arc::new(Catalog::open(&config)?);
            favorite(catalog, id).await
        }
        "favorites" => {
            let catalog = Catalog::open(&config)?;
            let favorites = catalog.favorites().await.context("Failed to read favorites")?;
            if favorites.is_empty() {
                println!("No favorites yet");
            }
            for item in &favorites {
                println!("{}", item_line(item));
            }
            Ok(())
        }
        "theme" => theme(&config, rest.first().map(String::as_str)).await,
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn list(catalog: &Catalog, pages: u32, refresh: bool) -> Result<()> {
    // A restart can restore several cached pages at once, so the next request
    // follows the returned window rather than counting up from zero.
    let mut next = 0;
    let mut first = true;
    loop {
        let mut states = catalog.breeds(next, refresh && first);
        first = false;
        let mut last = None;
        while let Some(state) = states.next().await {
            print_state(&format!("page {}", next), &state, |page| {
                format!("{} breeds", page.len())
            });
            last = Some(state);
        }

        match last {
            Some(ResourceState::Success(page)) => {
                if page.window.page_index + 1 >= pages || !page.window.has_more {
                    for item in &page.items {
                        println!("{}", item_line(item));
                    }
                    if !page.window.has_more {
                        println!("(end of catalog)");
                    }
                    break;
                }
                next = page.window.next_page();
            }
            Some(ResourceState::Error { partial, .. }) => {
                if let Some(page) = partial {
                    for item in &page.items {
                        println!("{}", item_line(item));
                    }
                }
                break;
            }
            _ => break,
        }
    }
    Ok(())
}

async fn search(browser: Arc<CatalogBrowser>, term: &str) -> Result<()> {
    let mut search = browser.search();
    browser.listen();
    browser.set_search_term(term);

    let label = format!("search \"{}\"", term.trim());
    let mut last = None;
    while search.changed().await.is_ok() {
        let state = search.borrow_and_update().clone();
        let Some(results) = state.results() else { continue };
        print_state(&label, results, |items| format!("{} matches", items.len()));
        if results.is_terminal() {
            last = Some(results.clone());
            break;
        }
    }

    if let Some(items) = last.and_then(ResourceState::into_data) {
        for item in &items {
            println!("{}", item_line(item));
        }
    }
    print_notice(browser.notice().borrow().as_ref());
    browser.dispose();
    Ok(())
}

async fn show(catalog: Arc<Catalog>, id: &str, refresh: bool) -> Result<()> {
    let detail = BreedDetail::new(catalog, id);
    let mut breed = detail.breed();
    let mut images = detail.images();

    let load = if refresh { detail.refresh() } else { detail.load() };
    let printer = async {
        loop {
            tokio::select! {
                changed = breed.changed() => {
                    if changed.is_err() { break; }
                    let state = breed.borrow_and_update().clone();
                    print_state("breed", &state, |item| item.name.clone());
                }
                changed = images.changed() => {
                    if changed.is_err() { break; }
                    let state = images.borrow_and_update().clone();
                    print_state("images", &state, |urls| format!("{} images", urls.len()));
                }
            }
        }
    };
    tokio::select! {
        joined = load => joined.context("Detail load task failed")?,
        _ = printer => {}
    }
    // Transitions published after the printer last ran
    if breed.has_changed().unwrap_or(false) {
        print_state("breed", &breed.borrow_and_update().clone(), |item| item.name.clone());
    }
    if images.has_changed().unwrap_or(false) {
        print_state("images", &images.borrow_and_update().clone(), |urls| format!("{} images", urls.len()));
    }

    if let Some(item) = detail.breed().borrow().data() {
        print_detail(item);
    }
    if let Some(urls) = detail.images().borrow().data() {
        for url in urls {
            println!("  {}", url);
        }
    }
    print_notice(detail.notice().borrow().as_ref());
    detail.dispose();
    Ok(())
}

async fn favorite(catalog: Arc<Catalog>, id: &str) -> Result<()> {
    let detail = BreedDetail::new(catalog, id);
    detail.load().await.context("Detail load task failed")?;

    let Some(toggle) = detail.toggle_favorite() else {
        print_notice(detail.notice().borrow().as_ref());
        bail!("Breed {} is not available", id);
    };
    toggle.await.context("Favorite task failed")?;

    if let Some(item) = detail.breed().borrow().data() {
        println!("{}", item_line(item));
    }
    print_notice(detail.notice().borrow().as_ref());
    detail.dispose();
    Ok(())
}

async fn theme(config: &Config, value: Option<&str>) -> Result<()> {
    let path = config.preferences_path()?;
    let prefs = JsonPreferences::open(path).context("Failed to load preferences")?;

    match value {
        None => {}
        Some("dark") => prefs.set_dark_theme(true).await.context("Failed to save theme")?,
        Some("light") => prefs.set_dark_theme(false).await.context("Failed to save theme")?,
        Some(other) => bail!("Unknown theme: {} (expected dark or light)", other),
    }

    let dark = *prefs.theme_flag().borrow();
    println!("Theme: {}", if dark { "dark" } else { "light" });
    Ok(())
}

// ============================================================================
// Output
// ============================================================================

fn print_state<T>(label: &str, state: &ResourceState<T>, summary: impl Fn(&T) -> String) {
    match state {
        ResourceState::Loading(None) => println!("[{}] loading", label),
        ResourceState::Loading(Some(data)) => {
            println!("[{}] loading (showing cached: {})", label, summary(data))
        }
        ResourceState::Success(data) => println!("[{}] ok: {}", label, summary(data)),
        ResourceState::Error { message, partial } => match partial {
            Some(data) => println!("[{}] error: {} (showing cached: {})", label, message, summary(data)),
            None => println!("[{}] error: {}", label, message),
        },
    }
}

fn print_notice(notice: Option<&Notice>) {
    if let Some(notice) = notice {
        let hint = if notice.offers_retry() { " (retry with --refresh)" } else { "" };
        eprintln!("{}{}", notice.message, hint);
    }
}

fn item_line(item: &CatalogItem) -> String {
    let star = if item.is_favorite { "*" } else { " " };
    format!("{} {:<6} {}", star, item.id, item.name)
}

fn print_detail(item: &CatalogItem) {
    println!("{} ({})", item.name, item.id);
    if !item.origin.is_empty() {
        println!("  Origin:      {}", item.origin);
    }
    if !item.temperament.is_empty() {
        println!("  Temperament: {}", item.temperament);
    }
    if !item.life_span.is_empty() {
        println!("  Life span:   {} years", item.life_span);
    }
    if !item.weight.is_empty() {
        println!("  Weight:      {}", item.weight);
    }
    println!(
        "  Affection {}/5, child friendly {}/5, stranger friendly {}/5",
        item.traits.affection, item.traits.child_friendly, item.traits.stranger_friendly
    );
    if item.is_hypoallergenic() {
        println!("  Hypoallergenic");
    }
    if let Some(url) = &item.wikipedia_url {
        println!("  {}", url);
    }
    if item.is_favorite {
        println!("  Favorite");
    }
    if !item.description.is_empty() {
        println!();
        println!("{}", item.description);
    }
}

// ============================================================================
// Argument helpers
// ============================================================================

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|arg| arg == flag)
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

/// First argument that is not a flag
fn positional(args: &[String]) -> Option<&str> {
    args.iter().map(String::as_str).find(|arg| !arg.starts_with("--"))
}
