use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use crossbeam_channel::{bounded, select};

use flowmon::cli::{Cli, Command, EngineArgs, FieldsArgs, MonitorArgs, OutputFormat, ReplayArgs};
use flowmon::enrichment::EnricherChain;
use flowmon::enrichment::ovn::{AclEnricher, CatalogWatcher, LogicalFlowEnricher};
use flowmon::error::FlowmonError;
use flowmon::ingest::{self, FlowConsumer, IngestStats};
use flowmon::model::fields::{FieldTable, TableMode};
use flowmon::output;
use flowmon::state::FlowTable;
use flowmon::state::sort::SortKey;

fn exit_code(err: &FlowmonError) -> i32 {
    match err {
        FlowmonError::UnknownField(_)
        | FlowmonError::NotAggregated(_)
        | FlowmonError::EmptyAggregate
        | FlowmonError::Decode { .. }
        | FlowmonError::UnsupportedDomain(_)
        | FlowmonError::Enrichment(_)
        | FlowmonError::Catalog(_) => 1,
        FlowmonError::Io(_) | FlowmonError::Serialization(_) => 2,
        FlowmonError::Fatal(_) => 4,
    }
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level)
        .parse_default_env()
        .init();

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| run(cli)));

    match result {
        Ok(Ok(())) => std::process::exit(0),
        Ok(Err(e)) => {
            eprintln!("error: {e}");
            std::process::exit(exit_code(&e));
        }
        Err(_) => {
            eprintln!("error: fatal: unexpected panic");
            std::process::exit(4);
        }
    }
}

fn run(cli: Cli) -> Result<(), FlowmonError> {
    match cli.command {
        Command::Replay(args) => run_replay(&args),
        Command::Monitor(args) => run_monitor(&args),
        Command::Fields(args) => run_fields(&args),
    }
}

// ---------------------------------------------------------------------------
// Engine setup
// ---------------------------------------------------------------------------

/// Build the flow table and enricher chain described by the engine args.
/// The catalog watcher is returned when a catalog was loaded.
fn build_engine(
    args: &EngineArgs,
) -> Result<(FlowConsumer, Option<CatalogWatcher>), FlowmonError> {
    let table = FlowTable::new(args.mode);
    if let Some(keys) = &args.keys {
        table.set_active_keys(keys)?;
    }
    table.set_sort_key(&args.sort)?;

    let mut enrichers = EnricherChain::new();
    let mut watcher = None;
    if let Some(path) = &args.catalog {
        let w = CatalogWatcher::open(path)?;
        let handle = Arc::clone(w.handle());
        match args.mode {
            TableMode::Ovn => enrichers.push(Box::new(LogicalFlowEnricher::new(handle))),
            TableMode::OvnAcl => enrichers.push(Box::new(AclEnricher::new(handle))),
            TableMode::Normal => {
                log::warn!("Catalog {} is unused in normal mode", path.display());
            }
        }
        watcher = Some(w);
    }
    log::info!(
        "Mode {:?}: aggregating by {:?}, sorting by {}, {} enricher(s)",
        args.mode,
        table.active_keys(),
        table.sort_key().name(table.fields()),
        enrichers.len()
    );

    let consumer = FlowConsumer::new(Arc::new(table), Arc::new(enrichers));
    Ok((consumer, watcher))
}

fn open_input(args: &EngineArgs) -> Result<Box<dyn BufRead + Send>, FlowmonError> {
    if args.reads_stdin() {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(&args.input).map_err(FlowmonError::Io)?;
    Ok(Box::new(BufReader::new(file)))
}

fn warn_skipped(stats: &IngestStats) {
    if stats.skipped > 0 {
        log::warn!(
            "{} malformed line(s) skipped out of {}",
            stats.skipped,
            stats.records + stats.skipped
        );
    }
}

// ---------------------------------------------------------------------------
// Replay mode
// ---------------------------------------------------------------------------

/// Replay mode: ingest the whole input, then print one snapshot.
fn run_replay(args: &ReplayArgs) -> Result<(), FlowmonError> {
    let (consumer, _watcher) = build_engine(&args.engine)?;
    let input = open_input(&args.engine)?;

    let stats = ingest::ingest_all(input, consumer.clone(), args.engine.workers)?;
    warn_skipped(&stats);

    let snapshot = consumer.table().snapshot();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    output::write_snapshot(&snapshot, args.format, args.limit, &mut out)?;
    out.flush().map_err(FlowmonError::Serialization)
}

// ---------------------------------------------------------------------------
// Monitor mode
// ---------------------------------------------------------------------------

/// Monitor mode: ingest on a background thread and print the ranked table
/// every interval until the input ends.
fn run_monitor(args: &MonitorArgs) -> Result<(), FlowmonError> {
    let (consumer, mut watcher) = build_engine(&args.engine)?;
    let input = open_input(&args.engine)?;

    let (done_tx, done_rx) = bounded::<Result<IngestStats, FlowmonError>>(1);
    let reader_consumer = consumer.clone();
    let workers = args.engine.workers;
    let reader = thread::Builder::new()
        .name("flowmon-reader".into())
        .spawn(move || {
            let result = ingest::ingest_all(input, reader_consumer, workers);
            let _ = done_tx.send(result);
        })
        .map_err(|e| FlowmonError::Fatal(format!("spawn reader thread: {e}")))?;

    let ticker = crossbeam_channel::tick(Duration::from_secs_f64(args.interval));
    let result = loop {
        select! {
            recv(ticker) -> _ => {
                if let Some(w) = watcher.as_mut()
                    && w.reload_if_changed()
                {
                    log::info!("Catalog reloaded, new flows use the updated tables");
                }
                render_pretty(consumer.table(), args.limit)?;
            },
            recv(done_rx) -> msg => {
                break msg.unwrap_or_else(|_| {
                    Err(FlowmonError::Fatal("reader thread exited without a result".to_string()))
                });
            },
        }
    };

    if reader.join().is_err() {
        return Err(FlowmonError::Fatal("reader thread panicked".to_string()));
    }
    let stats = result?;
    warn_skipped(&stats);
    render_pretty(consumer.table(), args.limit)
}

fn render_pretty(table: &FlowTable, limit: Option<usize>) -> Result<(), FlowmonError> {
    let snapshot = table.snapshot();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    output::write_snapshot(&snapshot, OutputFormat::Pretty, limit, &mut out)?;
    writeln!(out).map_err(FlowmonError::Serialization)?;
    out.flush().map_err(FlowmonError::Serialization)
}

// ---------------------------------------------------------------------------
// Field listing
// ---------------------------------------------------------------------------

fn run_fields(args: &FieldsArgs) -> Result<(), FlowmonError> {
    let fields = FieldTable::new(args.mode);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "Key fields ({:?} mode):", args.mode).map_err(FlowmonError::Serialization)?;
    for name in fields.names() {
        writeln!(out, "  {name}").map_err(FlowmonError::Serialization)?;
    }
    writeln!(out, "Sort metrics:").map_err(FlowmonError::Serialization)?;
    for name in SortKey::reserved_names() {
        writeln!(out, "  {name}").map_err(FlowmonError::Serialization)?;
    }
    Ok(())
}
