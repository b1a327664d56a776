use chrono::Local;
use clap::{ArgAction, Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use slowmark::bench::{CancelToken, ProgressUpdate, RunSession, ShutdownSignals};
use slowmark::config::persistence::ResultsStorage;
use slowmark::config::{BenchmarkConfig, TestKind};
use slowmark::io::create_disk_io;
use slowmark::models::WorkerKind;
use slowmark::report::{aggregate_dir, render_history, FileReporter};
use slowmark::util::parse_bytes;
use slowmark::{error, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "slowmark", version, about = "Sustained storage throughput benchmark")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Workers to run: r, w or rw
    #[arg(short, long)]
    test: Option<TestKind>,

    /// Block size, e.g. 4MiB or 1048576
    #[arg(short, long, value_parser = parse_bytes)]
    block_size: Option<u64>,

    /// Size of each written file in MB
    #[arg(short = 's', long)]
    file_size_mb: Option<u64>,

    /// Number of files to write
    #[arg(short = 'n', long)]
    file_count: Option<u32>,

    /// Directory the write test fills
    #[arg(long = "out")]
    write_dir: Option<PathBuf>,

    /// Directory tree the read test walks
    #[arg(long = "in")]
    read_dir: Option<PathBuf>,

    /// Base directory for reports
    #[arg(long)]
    report_dir: Option<PathBuf>,

    /// Chart width in pixels, bounds the chunk count
    #[arg(long)]
    image_width: Option<u32>,

    /// Chart padding in pixels
    #[arg(long)]
    image_padding: Option<u32>,

    /// Model string of the device under test
    #[arg(short = 'm', long)]
    disk_model: Option<String>,

    /// Keep written files after a read+write run
    #[arg(long)]
    keep_files: bool,

    /// Configuration file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Do not append run summaries to the history file
    #[arg(long)]
    no_history: bool,

    /// Write the effective settings to the config file before running
    #[arg(long)]
    save_config: bool,

    /// More log output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Only errors, no progress bars
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Merge the per-GB averages of report files into All-<test>.csv
    Aggregate {
        /// Directory holding *_Chunks.csv files
        #[arg(long)]
        input: PathBuf,

        /// Directory for the merged files
        #[arg(long, default_value = ".")]
        output: PathBuf,
    },
    /// List the newest recorded runs
    History {
        /// How many runs to show
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,

        /// Delete the history file instead
        #[arg(long)]
        clear: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            warn!(error = %e, "Run failed");
            eprintln!("Error: {}", error::user_friendly_message(&e));
            1
        }
    };

    // stdin may still be blocked in the Enter listener
    std::process::exit(code);
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::WARN,
        (false, 1) => Level::INFO,
        (false, 2) => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Some(Command::Aggregate { input, output }) => {
            let summary = aggregate_dir(input, output)?;
            println!(
                "Aggregated {} chunk files into {} merged files",
                summary.chunk_files,
                summary.outputs.len()
            );
            for path in &summary.outputs {
                println!("  {}", path.display());
            }
            return Ok(());
        }
        Some(Command::History { limit, clear }) => {
            let storage = ResultsStorage::new()?;
            if *clear {
                storage.clear()?;
                println!("Cleared {}", storage.path().display());
            } else {
                let records = storage.recent_records(*limit)?;
                print!("{}", render_history(&records, storage.count_records()?));
            }
            return Ok(());
        }
        None => {}
    }

    let config = build_config(&cli)?;
    config.validate()?;
    if cli.save_config {
        match &cli.config {
            Some(path) => config.save_to(path)?,
            None => config.save()?,
        }
        info!("Configuration saved");
    }

    let mut signals = ShutdownSignals::new()?;

    let (progress_tx, progress_rx) = mpsc::channel(256);
    let progress = tokio::spawn(render_progress(progress_rx, cli.quiet));

    let session = RunSession::start(config.clone(), create_disk_io(), CancelToken::new(), Some(progress_tx))?;
    if !cli.quiet {
        println!("Press Enter to stop the test early");
    }

    tokio::select! {
        _ = session.wait_finished() => info!("All workers finished"),
        signal = signals.recv() => {
            warn!(signal, "Interrupted, finishing with partial data");
            session.cancel();
        }
        _ = wait_for_enter() => session.cancel(),
    }

    let mut reporter = FileReporter::new(&config.report_dir, &config.disk_model, Local::now());
    if !cli.no_history {
        match ResultsStorage::new() {
            Ok(storage) => reporter = reporter.with_history(storage),
            Err(e) => warn!(error = %e, "Run history disabled"),
        }
    }

    // a second interrupt while reporting only cancels harder, it never finalizes twice
    let finalize = session.finalize(&reporter);
    tokio::pin!(finalize);
    let outcome = loop {
        tokio::select! {
            outcome = &mut finalize => break outcome,
            signal = signals.recv() => {
                warn!(signal, "Interrupted again while reporting");
                session.cancel();
            }
        }
    };

    let _ = progress.await;
    let runs = outcome?;
    if runs.iter().any(|r| !r.chunks.is_empty()) {
        println!("Reports written to {}", reporter.dir().display());
    }
    Ok(())
}

fn build_config(cli: &Cli) -> Result<BenchmarkConfig> {
    let mut config = match &cli.config {
        Some(path) => BenchmarkConfig::load_from(path)?,
        None => BenchmarkConfig::load()?,
    };

    if let Some(test) = cli.test {
        config = config.with_test(test);
    }
    if let Some(size) = cli.block_size {
        config = config.with_block_size(size);
    }
    if let Some(size_mb) = cli.file_size_mb {
        config = config.with_file_size_mb(size_mb);
    }
    if let Some(count) = cli.file_count {
        config = config.with_file_count(count);
    }
    if let Some(dir) = &cli.write_dir {
        config = config.with_write_dir(dir.clone());
    }
    if let Some(dir) = &cli.read_dir {
        config = config.with_read_dir(dir.clone());
    }
    if let Some(dir) = &cli.report_dir {
        config = config.with_report_dir(dir.clone());
    }
    let width = cli.image_width.unwrap_or(config.image_width);
    let padding = cli.image_padding.unwrap_or(config.image_padding);
    config = config.with_image_size(width, padding);
    if let Some(model) = &cli.disk_model {
        config = config.with_disk_model(model.clone());
    }
    if cli.keep_files {
        config = config.with_keep_files(true);
    }

    Ok(config)
}

/// Resolve on a line from stdin; never resolves once stdin is closed
async fn wait_for_enter() {
    let mut line = String::new();
    let mut stdin = BufReader::new(tokio::io::stdin());
    match stdin.read_line(&mut line).await {
        Ok(n) if n > 0 => {}
        _ => std::future::pending::<()>().await,
    }
}

/// Draw one bar per worker until every sender is gone
async fn render_progress(mut rx: mpsc::Receiver<ProgressUpdate>, quiet: bool) {
    let multi = if quiet {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    } else {
        MultiProgress::new()
    };
    let sized = ProgressStyle::with_template("{prefix:>5} {bar:30} {bytes}/{total_bytes} ({eta}) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    let open = ProgressStyle::with_template("{prefix:>5} {spinner} {bytes} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());

    let mut bars: HashMap<WorkerKind, ProgressBar> = HashMap::new();

    while let Some(update) = rx.recv().await {
        let bar = bars.entry(update.kind).or_insert_with(|| {
            let bar = multi.add(ProgressBar::new(0));
            bar.set_prefix(update.kind.label());
            bar.set_style(open.clone());
            bar
        });

        if let Some(total) = update.total_bytes {
            if bar.length() != Some(total) {
                bar.set_length(total);
                bar.set_style(sized.clone());
            }
        }
        bar.set_position(update.bytes_done);
        bar.set_message(format!(
            "file {} | {:.1} MB/s (min {:.1}, max {:.1})",
            update.file_index, update.current_mbps, update.min_mbps, update.max_mbps
        ));
    }

    for bar in bars.values() {
        bar.finish();
    }
}
