// SPDX-License-Identifier: MIT OR Apache-2.0
//! Light-field capture host.
//!
//! Drives a camera array across its sample grid and writes one frame per
//! position into a timestamped session directory:
//! - Grid layout, tripod orientation and output from a RON settings file
//! - Software preview renderer standing in for the engine
//! - Frame pacing and Ctrl+C cancellation
//!
//! ## Architecture
//!
//! The engine-independent pieces (grid model, scan sequencer, tripod) live in
//! `lightfield_rig`. This binary supplies the collaborators the rig expects:
//! a scene graph for the camera and pivots, a renderer, an image exporter and
//! the frame loop.

mod cli;
mod exporter;
mod host;
mod renderer;
mod scene;
mod settings;

use clap::Parser;
use cli::{Cli, Command, GridArgs, RunArgs};
use host::CaptureHost;
use settings::CaptureSettings;
use std::path::Path;
use std::sync::atomic::Ordering;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn main() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("lightfield_capture=info,lightfield_rig=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run(args) => run(&args),
        Command::Init { path, force } => init(&path, force),
        Command::Layout(args) => layout(&args),
    };

    if let Err(e) = result {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

type AppResult = Result<(), Box<dyn std::error::Error>>;

fn run(args: &RunArgs) -> AppResult {
    let settings = args.load()?;

    tracing::info!(
        "Starting light-field capture v{}: {}x{} grid, spacing {}",
        env!("CARGO_PKG_VERSION"),
        settings.grid.columns(),
        settings.grid.rows(),
        settings.grid.spacing()
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let host = CaptureHost::new(settings);
    let status = host.status();
    let summary = runtime.block_on(async {
        let cancel = host.status();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Ctrl+C received, stopping after the current frame");
                    cancel.cancel();
                }
                Err(e) => tracing::warn!("Ctrl+C handler unavailable: {e}"),
            }
        });
        host.run().await
    })?;

    if summary.failed > 0 {
        tracing::warn!(
            "{} of {} frames failed to export",
            status.failed.load(Ordering::Relaxed),
            status.completed.load(Ordering::Relaxed)
        );
    }
    tracing::debug!(
        "Final status: {} after {} frames ({} positions)",
        status.step(),
        summary.frame_count,
        status.total.load(Ordering::Relaxed)
    );
    Ok(())
}

fn init(path: &Path, force: bool) -> AppResult {
    if path.exists() && !force {
        return Err(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )
        .into());
    }

    CaptureSettings::default().save(path)?;
    tracing::info!("Wrote default settings to {}", path.display());
    Ok(())
}

fn layout(args: &GridArgs) -> AppResult {
    let settings = args.load()?;
    let grid = settings.grid;
    let [width, height] = grid.array_extent();

    println!(
        "{} x {} samples, spacing {}, extent {} x {}",
        grid.columns(),
        grid.rows(),
        grid.spacing(),
        width,
        height
    );
    for (position, offset) in grid.sample_offsets() {
        println!(
            "{:<12} {:>10.4} {:>10.4} {:>10.4}  {}",
            position.to_string(),
            offset[0],
            offset[1],
            offset[2],
            lightfield_rig::frame_file_name(position, settings.output.format)
        );
    }
    Ok(())
}
