mod capture;
mod commands;

use anyhow::{Context, anyhow};
use basalt_engine::PassThrough;
use capture::UdpCapture;
use clap::Parser;
use granite_engine::{OutputSettings, OutputStage, RotateRequest};
use granite_meta::{KvStore, MemoryStore, RespClient};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use strata_config::HsdConfig;
use strata_databuf::{Databuf, RingConfig};
use strata_events::{InputBlock, N_INPUT_BLOCKS, N_OUTPUT_BLOCKS, OutputBlock};
use strata_stage::{CancelToken, StageError, StageExit, StageRunner, StatusBoard};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const KV_CONNECT_ATTEMPTS: u32 = 5;
const KV_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(name = "hsd")]
#[command(about = "High-speed data acquisition: capture, compute and write PFF files")]
struct Args {
    /// TOML configuration file; missing means all defaults
    #[arg(short, long, default_value = "hsd.toml")]
    config: PathBuf,

    /// Mirror metadata from an empty in-memory store instead of the
    /// configured key/value server
    #[arg(long)]
    no_kv: bool,
}

fn init_tracing(fallback: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn connect_store(config: &HsdConfig, no_kv: bool) -> anyhow::Result<Box<dyn KvStore + Send>> {
    match config.kv_addr.as_deref() {
        Some(addr) if !no_kv => {
            let client = RespClient::connect_with_retry(addr, KV_CONNECT_ATTEMPTS, KV_RETRY_DELAY)
                .with_context(|| format!("connecting to key/value store at {addr}"))?;
            Ok(Box::new(client))
        }
        _ => {
            info!("metadata mirror uses an empty in-memory store");
            Ok(Box::new(MemoryStore::new()))
        }
    }
}

/// Any stage failure stops the whole pipeline.
fn guard(
    result: Result<StageExit, StageError>,
    stop: &[&CancelToken],
) -> Result<StageExit, StageError> {
    if result.is_err() {
        for token in stop {
            token.cancel();
        }
    }
    result
}

fn settle(
    name: &str,
    joined: thread::Result<Result<StageExit, StageError>>,
) -> anyhow::Result<()> {
    match joined {
        Ok(Ok(exit)) => {
            info!(stage = name, ?exit, "stage joined");
            Ok(())
        }
        Ok(Err(e)) => Err(anyhow::Error::new(e).context(format!("{name} stage failed"))),
        Err(_) => Err(anyhow!("{name} stage panicked")),
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = HsdConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    init_tracing(&config.log_level);
    info!(config = %args.config.display(), "hsd starting");

    let status = StatusBoard::new();
    OutputSettings {
        save_location: config.save_location.clone(),
        module_config: config.module_config.clone(),
        max_file_size: config.max_file_size,
    }
    .publish(&status);

    let wait = Duration::from_millis(config.wait_timeout_ms);
    let input = Databuf::<InputBlock>::anonymous(RingConfig::new(N_INPUT_BLOCKS))
        .context("allocating input ring buffer")?;
    let output = Databuf::<OutputBlock>::anonymous(RingConfig::new(N_OUTPUT_BLOCKS))
        .context("allocating output ring buffer")?;

    let rotate = RotateRequest::new();
    let store = connect_store(&config, args.no_kv)?;
    let mut output_stage = OutputStage::new(
        status.clone(),
        &config.observatory,
        config.dome,
        config.auto_create_modules,
        store,
        rotate.clone(),
    )
    .context("initialising output stage")?;
    let mut capture = UdpCapture::bind(config.capture_addr.as_str(), wait)
        .with_context(|| format!("binding capture socket {}", config.capture_addr))?;
    let mut compute = PassThrough::new();

    // `quit` stops capture; the interrupt flag then drains the stages below.
    // `abort` stops everything when a stage fails, including a capture stage
    // still waiting to send the interrupt flag.
    let quit = CancelToken::new();
    let abort = CancelToken::new();
    commands::spawn_stdin(rotate, quit.clone()).context("starting operator command thread")?;

    let net = StageRunner::new("capture", "NET", status.clone(), quit.clone())
        .with_wait_timeout(wait)
        .with_downstream_cancel(abort.clone());
    let cpu = StageRunner::new("compute", "COMPUTE", status.clone(), abort.clone())
        .with_wait_timeout(wait);
    let out =
        StageRunner::new("output", "OUT", status.clone(), abort.clone()).with_wait_timeout(wait);

    let stop = [&quit, &abort];
    let results = thread::scope(|s| {
        let capture = s.spawn(|| guard(net.run_source(&mut capture, &input), &stop));
        let compute = s.spawn(|| guard(cpu.run_transform(&mut compute, &input, &output), &stop));
        let write = s.spawn(|| guard(out.run_sink(&mut output_stage, &output), &stop));
        [
            settle("capture", capture.join()),
            settle("compute", compute.join()),
            settle("output", write.join()),
        ]
    });

    let stats = output_stage.router().stats();
    info!(
        written = stats.records_written,
        dropped = stats.records_dropped,
        rotations = stats.rotations,
        "hsd stopped"
    );
    let mut first = None;
    for result in results {
        if let Err(e) = result {
            error!(error = %format!("{e:#}"), "pipeline failure");
            first.get_or_insert(e);
        }
    }
    first.map_or(Ok(()), Err)
}
