// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scan sequencer.
//!
//! Visits every grid position once in column-major order. Each position takes
//! one host frame:
//!
//! 1. [`ScanSequencer::tick`] moves the camera to the next position;
//! 2. the host renders the frame;
//! 3. [`ScanSequencer::end_of_frame`] exports it and advances.

use crate::camera_array::{CameraArray, CameraHandle};
use crate::capture::{
    CaptureSession, DirectoryCreator, ExportError, FrameExporter, FrameFormat, StorageError,
};
use crate::grid::{GridConfig, GridPosition, SamplePositions};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::iter::Peekable;
use std::path::{Path, PathBuf};

/// Sequencer state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanState {
    /// No scan started
    #[default]
    Idle,
    /// Preparing the session directory
    Initializing,
    /// Visiting positions
    Scanning,
    /// Every position was visited
    Done,
    /// Stopped early; exported frames are kept
    Aborted,
}

impl ScanState {
    /// Whether a scan is in progress
    pub fn is_active(&self) -> bool {
        matches!(self, ScanState::Initializing | ScanState::Scanning)
    }

    /// Whether the scan has reached a terminal state
    pub fn is_finished(&self) -> bool {
        matches!(self, ScanState::Done | ScanState::Aborted)
    }

    /// Status string for display
    pub fn status_text(&self) -> &'static str {
        match self {
            ScanState::Idle => "Idle",
            ScanState::Initializing => "Initializing",
            ScanState::Scanning => "Scanning",
            ScanState::Done => "Done",
            ScanState::Aborted => "Aborted",
        }
    }
}

/// What to do when a frame fails to export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExportPolicy {
    /// Record the failure and move on
    #[default]
    Continue,
    /// Abort the scan after the failing position
    Halt,
}

/// Errors returned when starting a scan
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// A scan is already running on this sequencer
    #[error("A scan is already running")]
    AlreadyRunning,
    /// The session directory could not be created
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result of [`ScanSequencer::tick`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStep {
    /// Camera is at this position; render, then call `end_of_frame`
    AwaitingFrame(GridPosition),
    /// Nothing to do this frame
    Inert,
}

/// Result of one export request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// Frame written
    Exported {
        /// Grid position
        position: GridPosition,
        /// Written file
        path: PathBuf,
    },
    /// Frame could not be written
    Failed {
        /// Grid position
        position: GridPosition,
        /// Target file
        path: PathBuf,
        /// Error description
        message: String,
    },
}

impl ExportOutcome {
    /// Grid position of this export
    pub fn position(&self) -> GridPosition {
        match self {
            ExportOutcome::Exported { position, .. } | ExportOutcome::Failed { position, .. } => {
                *position
            }
        }
    }

    /// Whether the frame was written
    pub fn is_ok(&self) -> bool {
        matches!(self, ExportOutcome::Exported { .. })
    }
}

/// Fraction of positions handled so far
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanProgress {
    /// Positions whose export was requested
    pub completed: u64,
    /// Total positions in the scan
    pub total: u64,
}

impl ScanProgress {
    /// Progress in `[0, 1]`
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f32 / self.total as f32
        }
    }

    /// Progress as a percentage (0-100)
    pub fn percent(&self) -> u32 {
        (self.fraction() * 100.0).round() as u32
    }
}

/// Everything that happened during a scan
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Positions visited, in order
    pub visited: Vec<GridPosition>,
    /// Files written
    pub exported: Vec<PathBuf>,
    /// Export failures keyed by position, in order of occurrence
    pub failures: IndexMap<GridPosition, ExportError>,
}

impl ScanReport {
    /// Whether every visited position was exported
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Drives a camera array through every grid position, exporting one frame each
#[derive(Debug)]
pub struct ScanSequencer {
    state: ScanState,
    policy: ExportPolicy,
    session: Option<CaptureSession>,
    grid: Option<GridConfig>,
    positions: Option<Peekable<SamplePositions>>,
    pending: Option<GridPosition>,
    total: u64,
    report: ScanReport,
}

impl ScanSequencer {
    /// Create an idle sequencer
    pub fn new(policy: ExportPolicy) -> Self {
        Self {
            state: ScanState::Idle,
            policy,
            session: None,
            grid: None,
            positions: None,
            pending: None,
            total: 0,
            report: ScanReport::default(),
        }
    }

    /// Open the session directory and begin scanning the grid `array` is
    /// configured with.
    ///
    /// Fails without visiting any position if the directory cannot be
    /// created. A finished sequencer can be started again.
    pub fn start<C: CameraHandle>(
        &mut self,
        array: &CameraArray<C>,
        dirs: &mut dyn DirectoryCreator,
        root: &Path,
        started_at: DateTime<Utc>,
        format: FrameFormat,
    ) -> Result<&CaptureSession, ScanError> {
        if self.state.is_active() {
            return Err(ScanError::AlreadyRunning);
        }

        self.state = ScanState::Initializing;
        self.session = None;
        self.grid = None;
        self.positions = None;
        self.pending = None;
        self.report = ScanReport::default();

        let session = match CaptureSession::open(dirs, root, started_at, format) {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("Scan aborted before start: {e}");
                self.state = ScanState::Idle;
                return Err(e.into());
            }
        };

        let grid = *array.config();
        self.total = grid.sample_count();
        self.positions = Some(grid.sample_positions().peekable());
        self.grid = Some(grid);
        self.state = ScanState::Scanning;

        tracing::info!(
            "Scan started: {}x{} positions into {}",
            grid.columns(),
            grid.rows(),
            session.dir.display()
        );

        Ok(&*self.session.insert(session))
    }

    /// Move the camera to the next position.
    ///
    /// Calling this again before [`end_of_frame`](Self::end_of_frame) keeps
    /// the same position. If the array's grid no longer matches the one the
    /// scan started with, the scan is aborted instead.
    pub fn tick<C: CameraHandle>(&mut self, array: &mut CameraArray<C>) -> ScanStep {
        if self.state != ScanState::Scanning {
            return ScanStep::Inert;
        }

        if self.grid.as_ref() != Some(array.config()) {
            tracing::warn!(
                "Camera array grid changed to {}x{} during the scan",
                array.config().columns(),
                array.config().rows()
            );
            self.abort();
            return ScanStep::Inert;
        }

        if let Some(position) = self.pending {
            return ScanStep::AwaitingFrame(position);
        }

        let Some(position) = self.positions.as_mut().and_then(Iterator::next) else {
            self.finish();
            return ScanStep::Inert;
        };

        let applied = array.move_to(position);
        if applied != position {
            tracing::warn!("Camera array clamped {position} to {applied}");
            self.abort();
            return ScanStep::Inert;
        }
        tracing::debug!("Scan moved camera to {position}");

        self.pending = Some(position);
        ScanStep::AwaitingFrame(position)
    }

    /// The frame for the pending position has been rendered; export it.
    ///
    /// Returns `None` when no position is waiting.
    pub fn end_of_frame<E: FrameExporter + ?Sized>(
        &mut self,
        exporter: &mut E,
    ) -> Option<ExportOutcome> {
        if self.state != ScanState::Scanning {
            return None;
        }
        let position = self.pending.take()?;
        let path = self.session.as_ref()?.frame_path(position);

        self.report.visited.push(position);

        let outcome = match exporter.export(&path) {
            Ok(()) => {
                self.report.exported.push(path.clone());
                ExportOutcome::Exported { position, path }
            }
            Err(e) => {
                tracing::warn!("Failed to export frame at {position}: {e}");
                let message = e.to_string();
                self.report.failures.insert(position, e);
                ExportOutcome::Failed {
                    position,
                    path,
                    message,
                }
            }
        };

        if !outcome.is_ok() && self.policy == ExportPolicy::Halt {
            tracing::info!("Scan halted after export failure at {position}");
            self.state = ScanState::Aborted;
            self.positions = None;
        } else if self
            .positions
            .as_mut()
            .map_or(true, |positions| positions.peek().is_none())
        {
            self.finish();
        }

        Some(outcome)
    }

    /// Stop the scan. Already exported frames are left in place.
    ///
    /// Returns `false` if no scan was running.
    pub fn abort(&mut self) -> bool {
        if !self.state.is_active() {
            return false;
        }

        self.state = ScanState::Aborted;
        self.positions = None;
        self.pending = None;
        self.grid = None;

        tracing::info!(
            "Scan aborted after {} of {} positions",
            self.report.visited.len(),
            self.total
        );
        true
    }

    /// Current state
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Failure policy
    pub fn policy(&self) -> ExportPolicy {
        self.policy
    }

    /// Change the failure policy
    pub fn set_policy(&mut self, policy: ExportPolicy) {
        self.policy = policy;
    }

    /// Session of the current or last scan
    pub fn session(&self) -> Option<&CaptureSession> {
        self.session.as_ref()
    }

    /// Position waiting for its frame
    pub fn pending(&self) -> Option<GridPosition> {
        self.pending
    }

    /// Report of the current or last scan
    pub fn report(&self) -> &ScanReport {
        &self.report
    }

    /// Take the report, leaving an empty one
    pub fn take_report(&mut self) -> ScanReport {
        std::mem::take(&mut self.report)
    }

    /// Positions handled so far
    pub fn progress(&self) -> ScanProgress {
        ScanProgress {
            completed: self.report.visited.len() as u64,
            total: self.total,
        }
    }

    fn finish(&mut self) {
        self.state = ScanState::Done;
        self.positions = None;
        tracing::info!(
            "Scan complete: {} exported, {} failed",
            self.report.exported.len(),
            self.report.failures.len()
        );
    }
}

impl Default for ScanSequencer {
    fn default() -> Self {
        Self::new(ExportPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::FsDirectories;
    use chrono::TimeZone;
    use std::collections::HashSet;

    #[derive(Default)]
    struct RecordingCamera {
        writes: Vec<[f32; 3]>,
    }

    impl CameraHandle for RecordingCamera {
        fn set_position(&mut self, position: [f32; 3]) {
            self.writes.push(position);
        }
    }

    /// Writes a small file per frame, failing for the listed file names
    #[derive(Default)]
    struct FileExporter {
        fail_for: HashSet<String>,
        calls: Vec<PathBuf>,
    }

    impl FrameExporter for FileExporter {
        fn export(&mut self, path: &Path) -> Result<(), ExportError> {
            self.calls.push(path.to_path_buf());
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            if self.fail_for.contains(&name) {
                return Err(ExportError::Encode {
                    path: path.to_path_buf(),
                    message: "disk full".to_string(),
                });
            }
            std::fs::write(path, name.as_bytes()).map_err(|source| ExportError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    struct FailingDirectories;

    impl DirectoryCreator for FailingDirectories {
        fn create_dir_all(&mut self, _path: &Path) -> std::io::Result<()> {
            Err(std::io::Error::other("no space"))
        }

        fn create_dir(&mut self, _path: &Path) -> std::io::Result<()> {
            Err(std::io::Error::other("no space"))
        }
    }

    fn started_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2016, 3, 7, 9, 5, 1).unwrap()
    }

    fn array(columns: u32, rows: u32) -> CameraArray<RecordingCamera> {
        let config = GridConfig::new(columns, rows, 0.05).unwrap();
        CameraArray::new(config, [0.0; 3], RecordingCamera::default())
    }

    fn start(
        sequencer: &mut ScanSequencer,
        array: &CameraArray<RecordingCamera>,
        root: &Path,
    ) -> PathBuf {
        sequencer
            .start(array, &mut FsDirectories, root, started_at(), FrameFormat::Png)
            .unwrap()
            .dir
            .clone()
    }

    /// Tick / end-of-frame until the sequencer goes inert
    fn run(
        sequencer: &mut ScanSequencer,
        array: &mut CameraArray<RecordingCamera>,
        exporter: &mut FileExporter,
    ) -> Vec<GridPosition> {
        let mut order = Vec::new();
        while let ScanStep::AwaitingFrame(position) = sequencer.tick(array) {
            order.push(position);
            sequencer.end_of_frame(exporter);
        }
        order
    }

    #[test]
    fn test_full_scan_order() {
        let root = tempfile::tempdir().unwrap();
        let mut array = array(3, 2);
        let mut sequencer = ScanSequencer::default();
        let mut exporter = FileExporter::default();

        let dir = start(&mut sequencer, &array, root.path());
        assert_eq!(sequencer.state(), ScanState::Scanning);

        let order = run(&mut sequencer, &mut array, &mut exporter);
        let expected: Vec<_> = [(0, 0), (0, 1), (1, 0), (1, 1), (2, 0), (2, 1)]
            .into_iter()
            .map(|(c, r)| GridPosition::new(c, r))
            .collect();

        assert_eq!(order, expected);
        assert_eq!(sequencer.report().visited, expected);
        assert_eq!(sequencer.state(), ScanState::Done);
        assert!(sequencer.report().is_clean());
        assert_eq!(
            sequencer.progress(),
            ScanProgress {
                completed: 6,
                total: 6
            }
        );

        for position in &expected {
            let name = format!("frame_s_{}_t_{}.png", position.col, position.row);
            assert!(dir.join(name).is_file());
        }
    }

    #[test]
    fn test_done_after_last_export_and_inert() {
        let root = tempfile::tempdir().unwrap();
        let mut array = array(1, 1);
        let mut sequencer = ScanSequencer::default();
        let mut exporter = FileExporter::default();
        start(&mut sequencer, &array, root.path());

        assert_eq!(
            sequencer.tick(&mut array),
            ScanStep::AwaitingFrame(GridPosition::new(0, 0))
        );
        assert!(sequencer.end_of_frame(&mut exporter).unwrap().is_ok());
        assert_eq!(sequencer.state(), ScanState::Done);

        let writes = array.camera().writes.len();
        assert_eq!(sequencer.tick(&mut array), ScanStep::Inert);
        assert!(sequencer.end_of_frame(&mut exporter).is_none());
        assert_eq!(array.camera().writes.len(), writes);
        assert_eq!(exporter.calls.len(), 1);
    }

    #[test]
    fn test_camera_follows_grid_offsets() {
        let root = tempfile::tempdir().unwrap();
        let mut array = array(2, 2);
        let mut sequencer = ScanSequencer::default();
        let mut exporter = FileExporter::default();
        start(&mut sequencer, &array, root.path());

        let step = sequencer.tick(&mut array);
        assert_eq!(step, ScanStep::AwaitingFrame(GridPosition::new(0, 0)));
        let first = *array.camera().writes.last().unwrap();
        assert!((first[0] + 0.025).abs() < 1e-6);
        assert!((first[1] + 0.025).abs() < 1e-6);

        sequencer.end_of_frame(&mut exporter);
        sequencer.tick(&mut array);
        assert_eq!(array.position(), GridPosition::new(0, 1));
    }

    #[test]
    fn test_repeated_tick_waits_for_frame() {
        let root = tempfile::tempdir().unwrap();
        let mut array = array(2, 2);
        let mut sequencer = ScanSequencer::default();
        start(&mut sequencer, &array, root.path());

        let first = sequencer.tick(&mut array);
        let second = sequencer.tick(&mut array);
        assert_eq!(first, second);
        assert_eq!(sequencer.pending(), Some(GridPosition::new(0, 0)));
        assert!(sequencer.report().visited.is_empty());
    }

    #[test]
    fn test_storage_error_prevents_scan() {
        let mut array = array(2, 2);
        let mut sequencer = ScanSequencer::default();

        let result = sequencer.start(
            &array,
            &mut FailingDirectories,
            Path::new("captures"),
            started_at(),
            FrameFormat::Png,
        );

        assert!(matches!(result, Err(ScanError::Storage(_))));
        assert_eq!(sequencer.state(), ScanState::Idle);
        assert_eq!(sequencer.tick(&mut array), ScanStep::Inert);
        assert!(array.camera().writes.is_empty());
    }

    #[test]
    fn test_export_failure_continues() {
        let root = tempfile::tempdir().unwrap();
        let mut array = array(3, 2);
        let mut sequencer = ScanSequencer::new(ExportPolicy::Continue);
        let mut exporter = FileExporter::default();
        exporter.fail_for.insert("frame_s_1_t_0.png".to_string());
        let dir = start(&mut sequencer, &array, root.path());

        let order = run(&mut sequencer, &mut array, &mut exporter);

        assert_eq!(order.len(), 6);
        assert!(order.contains(&GridPosition::new(1, 1)));
        assert!(order.contains(&GridPosition::new(2, 1)));
        assert_eq!(sequencer.state(), ScanState::Done);

        let report = sequencer.report();
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures.contains_key(&GridPosition::new(1, 0)));
        assert_eq!(report.exported.len(), 5);
        assert!(!dir.join("frame_s_1_t_0.png").exists());
        assert!(dir.join("frame_s_1_t_1.png").is_file());
    }

    #[test]
    fn test_export_failure_halts_when_requested() {
        let root = tempfile::tempdir().unwrap();
        let mut array = array(3, 2);
        let mut sequencer = ScanSequencer::new(ExportPolicy::Halt);
        let mut exporter = FileExporter::default();
        exporter.fail_for.insert("frame_s_1_t_0.png".to_string());
        start(&mut sequencer, &array, root.path());

        let order = run(&mut sequencer, &mut array, &mut exporter);

        assert_eq!(
            order,
            vec![
                GridPosition::new(0, 0),
                GridPosition::new(0, 1),
                GridPosition::new(1, 0)
            ]
        );
        assert_eq!(sequencer.state(), ScanState::Aborted);
        assert_eq!(sequencer.report().failures.len(), 1);
    }

    #[test]
    fn test_abort_keeps_exported_frames() {
        let root = tempfile::tempdir().unwrap();
        let mut array = array(3, 3);
        let mut sequencer = ScanSequencer::default();
        let mut exporter = FileExporter::default();
        let dir = start(&mut sequencer, &array, root.path());

        for _ in 0..2 {
            sequencer.tick(&mut array);
            sequencer.end_of_frame(&mut exporter);
        }
        // Third position moved but never rendered
        sequencer.tick(&mut array);

        assert!(sequencer.abort());
        assert_eq!(sequencer.state(), ScanState::Aborted);
        assert!(!sequencer.abort());

        assert_eq!(sequencer.tick(&mut array), ScanStep::Inert);
        assert!(sequencer.end_of_frame(&mut exporter).is_none());

        let first = dir.join("frame_s_0_t_0.png");
        let second = dir.join("frame_s_0_t_1.png");
        assert_eq!(std::fs::read(&first).unwrap(), b"frame_s_0_t_0.png");
        assert_eq!(std::fs::read(&second).unwrap(), b"frame_s_0_t_1.png");
        assert!(!dir.join("frame_s_0_t_2.png").exists());
        assert_eq!(exporter.calls.len(), 2);
        assert_eq!(sequencer.progress().completed, 2);
    }

    #[test]
    fn test_start_while_running_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let array = array(2, 2);
        let mut sequencer = ScanSequencer::default();
        start(&mut sequencer, &array, root.path());

        let result = sequencer.start(
            &array,
            &mut FsDirectories,
            root.path(),
            started_at(),
            FrameFormat::Png,
        );
        assert!(matches!(result, Err(ScanError::AlreadyRunning)));
        assert_eq!(sequencer.state(), ScanState::Scanning);
    }

    #[test]
    fn test_restart_after_done() {
        let root = tempfile::tempdir().unwrap();
        let mut array = array(2, 1);
        let mut sequencer = ScanSequencer::default();
        let mut exporter = FileExporter::default();

        let first = start(&mut sequencer, &array, root.path());
        run(&mut sequencer, &mut array, &mut exporter);
        assert_eq!(sequencer.state(), ScanState::Done);
        let first_frame = first.join("frame_s_0_t_0.png");
        std::fs::write(&first_frame, b"first session").unwrap();

        // Same timestamp: the earlier session stays untouched
        let second = start(&mut sequencer, &array, root.path());
        assert_ne!(first, second);
        assert!(sequencer.report().visited.is_empty());
        let order = run(&mut sequencer, &mut array, &mut exporter);
        assert_eq!(order.len(), 2);
        assert_eq!(sequencer.state(), ScanState::Done);

        assert_eq!(std::fs::read(&first_frame).unwrap(), b"first session");
        assert!(second.join("frame_s_0_t_0.png").is_file());
    }

    #[test]
    fn test_restart_after_abort_keeps_earlier_session() {
        let root = tempfile::tempdir().unwrap();
        let mut array = array(2, 2);
        let mut sequencer = ScanSequencer::default();
        let mut exporter = FileExporter::default();

        let first = start(&mut sequencer, &array, root.path());
        sequencer.tick(&mut array);
        sequencer.end_of_frame(&mut exporter);
        sequencer.abort();

        let second = start(&mut sequencer, &array, root.path());
        assert_ne!(first, second);
        assert_eq!(
            sequencer.session().map(|session| session.dir.clone()),
            Some(second)
        );
        assert!(first.join("frame_s_0_t_0.png").is_file());
    }

    #[test]
    fn test_grid_change_mid_scan_aborts() {
        let root = tempfile::tempdir().unwrap();
        let mut array = array(3, 2);
        let mut sequencer = ScanSequencer::default();
        let mut exporter = FileExporter::default();
        let dir = start(&mut sequencer, &array, root.path());

        for _ in 0..2 {
            sequencer.tick(&mut array);
            sequencer.end_of_frame(&mut exporter);
        }
        array.set_config(GridConfig::new(2, 2, 0.05).unwrap());

        assert_eq!(sequencer.tick(&mut array), ScanStep::Inert);
        assert_eq!(sequencer.state(), ScanState::Aborted);
        assert!(sequencer.end_of_frame(&mut exporter).is_none());
        assert_eq!(exporter.calls.len(), 2);
        assert!(!dir.join("frame_s_2_t_0.png").exists());
    }

    #[test]
    fn test_progress_fraction() {
        let progress = ScanProgress {
            completed: 3,
            total: 12,
        };
        assert_eq!(progress.percent(), 25);
        assert_eq!(ScanProgress::default().fraction(), 0.0);
    }
}
