use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use clap::Parser;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;

#[allow(unused_imports)]
use log::{debug, info, warn, error};

use gallery_slider::build_info::BuildInfo;
use gallery_slider::logging;
use gallery_slider::settings::UserSettings;
use gallery_slider::{
    CardCatalog, Config, FsImageSource, GalleryRuntime, GallerySession, ImageCache, Intent,
    Message, SharedHintQueue, SlideKey, View, CONFIG,
};

const APP_NAME: &str = "gallery-slider";

/// Gallery Slider - browse gallery cards with decode-before-swap slides.
///
/// Reads one command per line from stdin: open <id>, edge <id>, go <n>,
/// next, prev, left, right, esc, key <name>, close, quit.
#[derive(Parser, Debug)]
#[command(name = "gallery-slider", version = BuildInfo::display_version(), about, long_about)]
struct Args {
    /// Settings file (defaults to the per-user settings.yaml)
    #[arg(long)]
    settings: Option<String>,

    /// YAML card file, overrides `cards_path` from the settings
    #[arg(long)]
    cards: Option<PathBuf>,

    /// Directory image references are resolved against
    #[arg(long)]
    assets: Option<PathBuf>,

    /// Print each view as a JSON line
    #[arg(long)]
    json: bool,

    /// Export the debug log buffer on exit
    #[arg(long)]
    export_logs: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let log_buffer = logging::setup_logger(APP_NAME);
    logging::setup_panic_hook(APP_NAME, Arc::clone(&log_buffer));
    debug!("{}", BuildInfo::detailed_info().replace('\n', ", "));

    let mut config = match &args.settings {
        Some(path) => Config::from_settings(&UserSettings::load(Some(path))),
        None => CONFIG.clone(),
    };
    if let Some(cards) = args.cards {
        config.cards_path = Some(cards);
    }
    if let Some(assets) = args.assets {
        config.asset_root = assets;
    }

    let catalog = match &config.cards_path {
        Some(path) => match CardCatalog::load(path) {
            Ok(catalog) => catalog,
            Err(e) => {
                error!("{}", e);
                eprintln!("{e}");
                return ExitCode::FAILURE;
            }
        },
        None => CardCatalog::builtin(),
    };

    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to start tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };
    rt.block_on(run_gallery(catalog, config, args.json));

    if args.export_logs {
        match logging::export_debug_logs(APP_NAME, &log_buffer) {
            Ok(path) => eprintln!("Debug log written to {}", path.display()),
            Err(e) => {
                eprintln!("Failed to export debug log: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}

async fn run_gallery(catalog: CardCatalog, config: Config, json: bool) {
    let queue = SharedHintQueue::new();
    let session = GallerySession::new(Arc::new(catalog), queue.clone(), &config);
    let source = FsImageSource::new(&config.asset_root, config.decode_images);
    let cache = ImageCache::new(Arc::new(source), config.cache_size, Handle::current())
        .with_warm_timeout(config.warm_timeout);

    let mut runtime = GalleryRuntime::new(session, cache);
    spawn_input_reader(runtime.sender());

    runtime.run(|view| print_view(view, &queue, json)).await;
    info!("Gallery closed, {} hints left in queue", queue.len());
}

// stdin is blocking, so it gets its own thread
fn spawn_input_reader(sender: UnboundedSender<Message>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    break;
                }
            };
            match parse_command(&line) {
                Ok(Some(message)) => {
                    let stop = message == Message::Shutdown;
                    if sender.send(message).is_err() || stop {
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => eprintln!("{e}"),
            }
        }
        let _ = sender.send(Message::Shutdown);
    });
}

fn parse_command(line: &str) -> Result<Option<Message>, String> {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        return Ok(None);
    };
    let arg = parts.next();

    let intent = match (command, arg) {
        ("open", Some(id)) => Intent::OpenCard(id.to_string()),
        ("edge", Some(id)) => Intent::OpenEdge(id.to_string()),
        ("go", Some(n)) => {
            let index = n.parse::<usize>().map_err(|_| format!("not a slide number: {n}"))?;
            Intent::Navigate(index)
        }
        ("key", Some(name)) => Intent::Key(SlideKey::from_name(name)),
        ("next", None) => Intent::Next,
        ("prev", None) => Intent::Prev,
        ("left", None) => Intent::Key(SlideKey::ArrowLeft),
        ("right", None) => Intent::Key(SlideKey::ArrowRight),
        ("esc", None) => Intent::Key(SlideKey::Escape),
        ("close", None) => Intent::Close,
        ("quit", None) | ("exit", None) => return Ok(Some(Message::Shutdown)),
        _ => return Err(format!("unknown command: {}", line.trim())),
    };
    Ok(Some(Message::Intent(intent)))
}

fn print_view(view: &View, queue: &SharedHintQueue, json: bool) {
    if json {
        match serde_json::to_string(view) {
            Ok(line) => println!("{line}"),
            Err(e) => error!("Failed to serialize view: {}", e),
        }
        return;
    }

    match view {
        View::Grid { cards } => {
            println!("grid ({} cards)", cards.len());
            for card in cards {
                println!(
                    "  {:<16} {:<20} {} | {}",
                    card.id,
                    card.title,
                    card.preview_a.as_deref().unwrap_or("-"),
                    card.preview_b.as_deref().unwrap_or("-")
                );
            }
        }
        View::Slider(slider) => {
            println!(
                "{} [{}] {} {}{}",
                slider.title,
                slider.card_id,
                slider.alt_text,
                slider.current_image.as_deref().unwrap_or("-"),
                if slider.is_clarifying { " (loading next)" } else { "" }
            );
            let edge = |e: &Option<gallery_slider::CardSummary>| {
                e.as_ref().map(|c| c.id.clone()).unwrap_or_else(|| "-".to_string())
            };
            println!(
                "  edges: {} < > {}   hints: {}",
                edge(&slider.left_edge),
                edge(&slider.right_edge),
                queue.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("   "), Ok(None));
        assert_eq!(
            parse_command("open cardSolutions"),
            Ok(Some(Message::Intent(Intent::OpenCard("cardSolutions".to_string()))))
        );
        assert_eq!(parse_command("go 3"), Ok(Some(Message::Intent(Intent::Navigate(3)))));
        assert_eq!(parse_command("esc"), Ok(Some(Message::Intent(Intent::Key(SlideKey::Escape)))));
        assert_eq!(
            parse_command("key ArrowRight"),
            Ok(Some(Message::Intent(Intent::Key(SlideKey::ArrowRight))))
        );
        assert_eq!(parse_command("quit"), Ok(Some(Message::Shutdown)));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_command("go -1").is_err());
        assert!(parse_command("open").is_err());
        assert!(parse_command("next 2").is_err());
        assert!(parse_command("dance").is_err());
    }
}
