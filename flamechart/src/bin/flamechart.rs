use chrome_trace_format::{load_from_reader, LoadError, LoadProgress, LoaderClient, RawTrace};
use clap::Parser;
use eyre::{eyre, Context, Result};
use flamechart::config::Config;
use flamechart::modifications::ModificationsManager;
use flamechart::network_provider::NetworkFlameChartDataProvider;
use flamechart::range_stats::{stats_for_range, RangeDebouncer, RangeUpdate};
use flamechart::search::TextFilter;
use flamechart::time::format_ms;
use flamechart::trace::{EventCategory, Micros};
use flamechart::tree_view::{top_down, CallTreeNode};
use flamechart::{FlameChartDataProvider, TraceData};
use std::fs::File;
use std::io::BufReader;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

static LONG_VERSION: OnceLock<String> = OnceLock::new();

fn get_long_version() -> &'static str {
    LONG_VERSION.get_or_init(|| {
        format!(
            "{} (commit: {})",
            env!("CARGO_PKG_VERSION"),
            env!("GIT_REVISION", "unknown")
        )
    })
}

#[derive(Parser)]
#[command(name = "flamechart")]
#[command(about = "lay out a performance trace as flame chart tracks")]
#[command(version = None, long_version = get_long_version())]
struct Args {
    #[arg(help = "trace file (trace event array, trace object or cpu profile)")]
    trace: String,

    #[arg(short, long, help = "configuration file path (toml format)")]
    config: Option<String>,

    #[arg(short, long, help = "print entries matching this text")]
    search: Option<String>,

    #[arg(long, help = "treat --search as a regular expression")]
    regex: bool,

    #[arg(long, help = "window start in ms from trace start")]
    from: Option<f64>,

    #[arg(long, help = "window end in ms from trace start")]
    to: Option<f64>,

    #[arg(long, help = "print the network track")]
    network: bool,

    #[arg(long, help = "print the main thread call tree down to this depth")]
    tree: Option<usize>,

    #[arg(short, long, help = "persisted modifications to apply (json)")]
    modifications: Option<String>,
}

#[derive(Default)]
struct CollectingClient {
    trace: Option<RawTrace>,
    error: Option<String>,
}

impl LoaderClient for CollectingClient {
    fn loading_progress(&mut self, progress: LoadProgress) {
        tracing::debug!(
            bytes = progress.bytes_read,
            events = progress.events_parsed,
            fraction = progress.fraction(),
            "loading"
        );
    }

    fn processing_started(&mut self) {
        tracing::debug!("processing trace");
    }

    fn loading_complete(&mut self, trace: Option<RawTrace>) {
        self.trace = trace;
    }

    fn loading_error(&mut self, error: &LoadError) {
        self.error = Some(error.to_string());
    }
}

fn print_tree(node: &CallTreeNode, depth: usize, max_depth: usize) {
    println!(
        "{:indent$}{} self={} total={}",
        "",
        node.name,
        format_ms(node.self_time as f64 / 1000.0),
        format_ms(node.total_time as f64 / 1000.0),
        indent = depth * 2
    );
    if depth + 1 < max_depth {
        for child in &node.children {
            print_tree(child, depth + 1, max_depth);
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("failed to load config path={path}"))?,
        None => Config::default(),
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let c = cancel.clone();
    ctrlc::set_handler(move || {
        tracing::info!("received ctrl+c, cancelling load...");
        c.store(true, Ordering::SeqCst);
    })?;

    let file = File::open(&args.trace).with_context(|| format!("failed to open trace path={}", args.trace))?;
    let total_bytes = file.metadata().ok().map(|metadata| metadata.len() as usize);
    let options = config.load.options(total_bytes);
    let (client, result) = load_from_reader(BufReader::new(file), CollectingClient::default(), options, Some(&cancel));
    result.with_context(|| format!("failed to load trace path={}", args.trace))?;
    let raw = client
        .trace
        .ok_or_else(|| eyre!("trace not loaded: {}", client.error.unwrap_or_default()))?;

    let trace = Arc::new(TraceData::build(&raw));
    tracing::info!(
        events = raw.events.len(),
        threads = trace.threads.len(),
        duration_ms = trace.to_ms(trace.bounds.max),
        "trace loaded"
    );

    let mut provider = FlameChartDataProvider::new(config.layout.clone());
    provider.set_model(Some(trace.clone()));
    if let Some(path) = &args.modifications {
        let json = std::fs::read_to_string(path).with_context(|| format!("failed to read modifications path={path}"))?;
        let modifications = ModificationsManager::from_json(trace.clone(), &json)
            .with_context(|| format!("failed to restore modifications path={path}"))?;
        provider.set_modifications(modifications);
    }

    let data = provider.timeline_data(false);
    println!("{} entries on {} levels", data.len(), data.level_count());
    for group in data.groups() {
        println!("  level {:>3}  {}", group.start_level, group.name);
    }

    let from_ms = args.from.unwrap_or(0.0);
    let to_ms = args.to.unwrap_or_else(|| trace.to_ms(trace.bounds.max));

    if let Some(text) = &args.search {
        let filter = if args.regex {
            TextFilter::from_pattern(text)
        } else {
            TextFilter::new(text)
        }
        .with_context(|| format!("invalid search text={text}"))?;
        let results = provider.search(from_ms, to_ms, Some(&filter));
        println!("{} matches for {text:?}", results.len());
        for result in results {
            println!(
                "  {:>10}  {}",
                format_ms(result.start_ms),
                provider.entry_title(result.index).unwrap_or_default()
            );
        }
    }

    if let Some(main) = trace.threads.first() {
        let to_micros = |ms: f64| trace.bounds.min + (ms * 1000.0).round().max(0.0) as Micros;
        let mut selection = RangeDebouncer::new(config.selection.debounce());
        let range = (to_micros(from_ms), to_micros(to_ms));
        let (start, end) = selection
            .submit(range, RangeUpdate::Discrete, Instant::now())
            .unwrap_or(range);
        let stats = stats_for_range(&trace, main, start, end);
        println!("main thread {} .. {}", format_ms(from_ms), format_ms(to_ms));
        for category in EventCategory::ALL {
            let time = stats.get(category);
            if time > 0 {
                println!("  {:<12} {}", category.title(), format_ms(time as f64 / 1000.0));
            }
        }

        if let Some(depth) = args.tree {
            for root in top_down(&trace, &main.entries) {
                print_tree(&root, 0, depth);
            }
        }
    }

    if args.network {
        let mut network = NetworkFlameChartDataProvider::new();
        network.set_model(Some(trace.clone()));
        let data = network.timeline_data(false);
        let rows: Vec<(usize, f64, f64)> = (0..data.len())
            .map(|index| {
                (
                    data.entry_levels()[index],
                    data.entry_start_times()[index],
                    data.entry_total_times()[index],
                )
            })
            .collect();
        println!("{} network requests", rows.len());
        for (index, (level, start, total)) in rows.into_iter().enumerate() {
            println!(
                "  row {:>2}  {:>10}  {:>10}  {}",
                level,
                format_ms(start),
                format_ms(total),
                network.entry_title(index).unwrap_or_default()
            );
        }
    }

    Ok(())
}
