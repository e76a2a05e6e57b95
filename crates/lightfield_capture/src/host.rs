// SPDX-License-Identifier: MIT OR Apache-2.0
//! Capture host.
//!
//! This module owns the frame loop that the engine would normally provide:
//! - Frame pacing at the configured frame rate
//! - Per-frame update of the camera array and tripod
//! - Rendering and end-of-frame export
//! - Cancellation and progress reporting

use crate::exporter::{FrameBuffer, ImageExporter};
use crate::renderer::SoftwareRenderer;
use crate::scene::TripodScene;
use crate::settings::CaptureSettings;
use chrono::Utc;
use lightfield_rig::{
    CameraArray, ExportOutcome, FrameExporter, FsDirectories, PanTiltRig, ScanError, ScanSequencer, ScanState,
    ScanStep,
};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{Interval, MissedTickBehavior};

/// Errors that end a capture run
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Scan could not start
    #[error("Scan failed to start: {0}")]
    Scan(#[from] ScanError),
    /// Session manifest could not be written
    #[error("Failed to write session manifest: {0}")]
    Manifest(#[source] std::io::Error),
}

/// Progress shared with whoever started the run
pub struct CaptureStatus {
    /// Positions visited so far
    pub completed: AtomicU64,
    /// Positions in the grid
    pub total: AtomicU64,
    /// Positions whose export failed
    pub failed: AtomicU64,
    /// Set to stop the run after the current frame
    pub cancelled: AtomicBool,
    /// Human-readable step
    pub step: Mutex<String>,
}

impl CaptureStatus {
    /// Fresh status in the idle step
    pub fn new() -> Self {
        Self {
            completed: AtomicU64::new(0),
            total: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            step: Mutex::new("Idle".to_string()),
        }
    }

    pub fn set_step(&self, step: impl Into<String>) {
        *self.step.lock() = step.into();
    }

    pub fn step(&self) -> String {
        self.step.lock().clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    fn record(&self, outcome: &ExportOutcome) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        if !outcome.is_ok() {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Default for CaptureStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// What a finished run produced
#[derive(Debug, Clone)]
pub struct CaptureSummary {
    /// Session directory
    pub session_dir: PathBuf,
    /// Final sequencer state (`Done` or `Aborted`)
    pub state: ScanState,
    /// Frames written
    pub exported: usize,
    /// Frames that failed to export
    pub failed: usize,
    /// Host frames run
    pub frame_count: u64,
    /// Wall-clock duration
    pub elapsed: Duration,
}

/// Paces the frame loop
enum FrameClock {
    /// Fixed frame rate
    Fixed(Interval),
    /// As fast as possible, yielding between frames
    Unlimited,
}

impl FrameClock {
    fn new(target_frame_rate: u32) -> Self {
        if target_frame_rate == 0 {
            return FrameClock::Unlimited;
        }
        let period = Duration::from_secs_f64(1.0 / f64::from(target_frame_rate));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        FrameClock::Fixed(interval)
    }

    async fn tick(&mut self) {
        match self {
            FrameClock::Fixed(interval) => {
                interval.tick().await;
            }
            FrameClock::Unlimited => tokio::task::yield_now().await,
        }
    }
}

/// Runs one scan from settings to a finished session directory
pub struct CaptureHost {
    settings: CaptureSettings,
    status: Arc<CaptureStatus>,
}

impl CaptureHost {
    /// Create a host for `settings`
    pub fn new(settings: CaptureSettings) -> Self {
        Self {
            settings,
            status: Arc::new(CaptureStatus::new()),
        }
    }

    /// Shared progress and cancellation handle
    pub fn status(&self) -> Arc<CaptureStatus> {
        Arc::clone(&self.status)
    }

    /// Run the scan until it finishes or the status is cancelled
    pub async fn run(&self) -> Result<CaptureSummary, CaptureError> {
        let frame = FrameBuffer::new();
        let mut exporter = ImageExporter::new(frame.clone(), self.settings.output.format);
        let summary = self.run_with_exporter(&frame, &mut exporter).await?;
        tracing::debug!("Exporter wrote {} files", exporter.frames_written());
        Ok(summary)
    }

    /// Frame loop presenting into `frame` and exporting through `exporter`
    async fn run_with_exporter<E: FrameExporter>(
        &self,
        frame: &FrameBuffer,
        exporter: &mut E,
    ) -> Result<CaptureSummary, CaptureError> {
        let settings = &self.settings;
        let started = Instant::now();

        // Scene and behaviours
        let scene = TripodScene::new();
        let mut array = CameraArray::new(settings.grid, settings.base_position, scene.camera());
        let mut tripod = PanTiltRig::new(scene.azimuth_pivot(), scene.elevation_pivot());
        tripod.set_angles(settings.tripod.azimuth, settings.tripod.elevation);
        tripod.initialize();
        array.initialize();

        let renderer = SoftwareRenderer::new(settings.render, settings.base_position);

        self.status.set_step("Initializing");
        let mut sequencer = ScanSequencer::new(settings.output.export_policy);
        let session = sequencer
            .start(
                &array,
                &mut FsDirectories,
                &settings.output.root,
                Utc::now(),
                settings.output.format,
            )?
            .clone();

        let mut manifest = session.manifest(*array.config(), settings.base_position);
        manifest.save(&session.dir).map_err(CaptureError::Manifest)?;

        self.status
            .total
            .store(array.config().sample_count(), Ordering::Relaxed);
        self.status.set_step("Scanning");

        let mut clock = FrameClock::new(settings.timing.target_frame_rate);
        let mut frame_count: u64 = 0;

        loop {
            clock.tick().await;

            if self.status.is_cancelled() {
                tracing::info!("Capture cancelled");
                sequencer.abort();
                break;
            }

            // Update
            array.tick();
            tripod.tick();
            let ScanStep::AwaitingFrame(position) = sequencer.tick(&mut array) else {
                break;
            };

            // Render
            frame.present(renderer.render(&scene.camera_pose()));
            frame_count += 1;

            // End of frame
            if let Some(outcome) = sequencer.end_of_frame(exporter) {
                self.status.record(&outcome);
                let progress = sequencer.progress();
                self.status.set_step(format!(
                    "Captured {position} ({}/{})",
                    progress.completed, progress.total
                ));
            }
        }

        let state = sequencer.state();
        let report = sequencer.take_report();

        manifest.completed = state == ScanState::Done && report.is_clean();
        manifest.save(&session.dir).map_err(CaptureError::Manifest)?;

        self.status.set_step(state.status_text());

        let summary = CaptureSummary {
            session_dir: session.dir,
            state,
            exported: report.exported.len(),
            failed: report.failures.len(),
            frame_count,
            elapsed: started.elapsed(),
        };

        tracing::info!(
            "Capture {}: {} frames exported, {} failed, {:.1}s, session {}",
            state.status_text().to_lowercase(),
            summary.exported,
            summary.failed,
            summary.elapsed.as_secs_f64(),
            summary.session_dir.display()
        );

        Ok(summary)
    }
}
