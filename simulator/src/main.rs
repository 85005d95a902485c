use anyhow::Context;
use clap::Parser;
use parkcore::processing::analytics::{self, PatternAnalysis, DEFAULT_PATTERN_WINDOW};
use parkcore::processing::monitor::format_slot_ids;
use parkcore::processing::{LogReportSink, ReportSink};
use std::fs::{self, OpenOptions};
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Builder as TokioBuilder;
use tokio::{signal, time};
use workflow::config::{SourceConfig, WorkflowConfig};
use workflow::console::ConsoleReportSink;
use workflow::runner::Runner;

mod generator;
mod upstream;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Parking occupancy monitor driver")]
struct Args {
    /// Run a single processing cycle and append its summary to the report log
    #[arg(long, default_value_t = false)]
    offline: bool,
    /// Load a workflow config from YAML
    #[arg(long)]
    config: Option<PathBuf>,
    /// Rows of the generated slot grid when no config is given
    #[arg(long, default_value_t = 4)]
    rows: usize,
    #[arg(long, default_value_t = 6)]
    cols: usize,
    /// Auto-processing interval
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,
    /// Status report interval
    #[arg(long, default_value_t = 10_000)]
    monitor_interval_ms: u64,
    /// Fetch frames from `<url>/latest_frame` instead of the synthetic camera
    #[arg(long)]
    source_url: Option<String>,
    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(long)]
    duration_secs: Option<u64>,
    /// Write retained results as JSON lines on shutdown
    #[arg(long)]
    export: Option<PathBuf>,
    #[arg(long, default_value = "output/offline_results.log")]
    report_log: PathBuf,
}

fn append_line(path: &Path, line: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    writeln!(file, "{}", line)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut workflow_config = if let Some(path) = &args.config {
        WorkflowConfig::load(path)?
    } else {
        WorkflowConfig::from_args(args.rows, args.cols, args.interval_ms, args.monitor_interval_ms)
    };
    if let Some(base_url) = args.source_url.clone() {
        workflow_config.source = SourceConfig::Http { base_url };
    }

    // The blocking HTTP client must be built before entering the runtime.
    let runner = Runner::new(workflow_config)?;
    let runtime = TokioBuilder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating tokio runtime")?;

    if args.offline {
        let result = runtime.block_on(runner.run_offline())?;
        println!(
            "Offline run -> available {}/{}, slots [{}], vehicles {}, {} ms",
            result.available_count,
            result.total_slots,
            format_slot_ids(&result.available_slot_ids, runner.config().monitor.display_limit),
            result.vehicle_count,
            result.processing_time_ms
        );
        let line = serde_json::to_string(result.as_ref()).context("serializing offline result")?;
        append_line(&args.report_log, &line)?;
        return Ok(());
    }

    println!(
        "Monitoring {} slots (processing every {} ms, Ctrl+C to stop)...",
        runner.slot_map().len(),
        runner.config().processing_interval_ms
    );
    // Redirected output gets status lines through the logger instead of the console frame.
    let sink: Arc<dyn ReportSink> = if std::io::stdout().is_terminal() {
        Arc::new(ConsoleReportSink)
    } else {
        Arc::new(LogReportSink::new())
    };
    let duration = args.duration_secs.map(Duration::from_secs);
    let pipeline = runtime.block_on(runner.run_until(sink, async move {
        match duration {
            Some(limit) => {
                tokio::select! {
                    _ = signal::ctrl_c() => {}
                    _ = time::sleep(limit) => {}
                }
            }
            None => {
                if let Err(err) = signal::ctrl_c().await {
                    log::warn!("Ctrl+C handler unavailable: {}", err);
                }
            }
        }
    }))?;

    let history = pipeline.history();
    if let Some(path) = &args.export {
        let lines = history
            .export_json_lines(history.len())
            .context("serializing result history")?;
        fs::write(path, lines).with_context(|| format!("writing {}", path.display()))?;
        println!("Exported {} results to {}", history.len(), path.display());
    }

    let metrics = pipeline.metrics().snapshot();
    println!(
        "Cycles {} | fetch failures {} | detection failures {} | skipped ticks {} | avg {:.1} ms",
        metrics.cycles_completed,
        metrics.fetch_failures,
        metrics.detection_failures,
        metrics.skipped_ticks,
        metrics.average_processing_ms
    );
    if let Some(stats) = analytics::occupancy_statistics(&history) {
        println!(
            "Frames {} | occupied avg {:.1} (min {}, max {}) | occupancy {:.1}%",
            stats.frames,
            stats.average_occupied,
            stats.min_occupied,
            stats.max_occupied,
            stats.average_occupancy_rate * 100.0
        );
    }
    match analytics::analyze_patterns(&history, DEFAULT_PATTERN_WINDOW) {
        PatternAnalysis::Ready(report) => println!(
            "Trend {:?} over {} frames (std dev {:.2}, detection stability {:.2})",
            report.trend, report.window, report.occupied_std_dev, report.detection_stability
        ),
        PatternAnalysis::InsufficientData {
            frames_needed,
            frames_available,
        } => println!(
            "Pattern analysis needs {} frames, have {}",
            frames_needed, frames_available
        ),
    }

    Ok(())
}
