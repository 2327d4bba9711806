//! # framelink output
//!
//! Reads stdin in chunks, publishes each chunk as one frame, and streams the
//! frames to a receiver with windowed acknowledgment.
//!
//! ## Usage
//!
//! ```bash
//! # Stream a file to a receiver on the default port
//! framelink-output --address 10.0.0.7 < capture.mjpeg
//!
//! # Allow 32 frames in flight, settings from a file
//! framelink-output --config output.toml -w 32 < /dev/video-pipe
//! ```

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use framelink_output::config::{ConfigError, OutputConfig, HELP};
use framelink_output::source::{FrameSource, FrameSources};
use framelink_output::worker::{OutputWorker, WorkerExit};

/// Bytes of stdin carried by each frame.
const CHUNK_SIZE: usize = 64 * 1024;

fn main() -> anyhow::Result<()> {
    // ── Logging ─────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    // ── Parse CLI ───────────────────────────────────────────────
    let config = match OutputConfig::from_args(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(ConfigError::HelpRequested) => {
            eprintln!("{HELP}");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("{HELP}");
            return Err(e).context("invalid options");
        }
    };

    // ── Source + worker ─────────────────────────────────────────
    let stdin_source = Arc::new(FrameSource::new("stdin"));
    let sources: FrameSources = std::iter::once(stdin_source.clone()).collect();
    let mut worker = OutputWorker::start(&config, &sources)?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            tracing::info!("shutting down...");
            running.store(false, Ordering::Relaxed);
        })
        .context("installing Ctrl-C handler")?;
    }

    {
        let running = running.clone();
        let source = stdin_source.clone();
        std::thread::Builder::new()
            .name("stdin-reader".into())
            .spawn(move || read_stdin(&source, &running))?;
    }

    // ── Wait for the session to end ─────────────────────────────
    let exit = loop {
        if !running.load(Ordering::Relaxed) {
            break worker.stop();
        }
        match worker.exits().recv_timeout(Duration::from_millis(100)) {
            Ok(exit) => break Some(exit),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break worker.wait(),
        }
    };
    running.store(false, Ordering::Relaxed);
    drop(worker);

    // ── Report ──────────────────────────────────────────────────
    match exit {
        Some(WorkerExit::Failed { error, stats }) => {
            tracing::info!(stats = %serde_json::to_string(&stats)?, "output stopped");
            Err(error).context("output session failed")
        }
        Some(exit) => {
            tracing::info!(stats = %serde_json::to_string(exit.stats())?, "output stopped");
            Ok(())
        }
        None => Ok(()),
    }
}

/// Publishes stdin chunk by chunk, waiting for the sender to take each one
/// so no input is overwritten unread.
fn read_stdin(source: &FrameSource, running: &AtomicBool) {
    let mut stdin = std::io::stdin().lock();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = match stdin.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::error!(error = %e, "stdin read failed");
                break;
            }
        };
        let generation = source.publish(&buf[..n]);
        while !source.wait_consumed(generation, Duration::from_millis(100)) {
            if !running.load(Ordering::Relaxed) {
                return;
            }
        }
    }
    source.close();
}
