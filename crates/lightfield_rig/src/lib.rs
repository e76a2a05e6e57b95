// SPDX-License-Identifier: MIT OR Apache-2.0
//! Light-field camera-array capture rig.
//!
//! This crate provides the engine-independent parts of a grid camera array:
//! - Grid model (sample index to centred offset)
//! - Camera array behaviour (apply-on-mutation camera positioning)
//! - Scan sequencer (column-major sweep with per-frame export)
//! - Capture sessions (directory naming, frame naming, manifest)
//! - Pan/tilt tripod controller
//!
//! ## Architecture
//!
//! The host owns the frame loop and supplies the collaborators through
//! traits:
//! - [`CameraHandle`] receives camera positions
//! - [`FrameExporter`] writes the last rendered frame
//! - [`DirectoryCreator`] prepares the session directory
//! - [`PivotHandle`] receives tripod rotations

pub mod camera_array;
pub mod capture;
pub mod grid;
pub mod orientation;
pub mod scan;

pub use camera_array::{CameraArray, CameraHandle};
pub use capture::{
    frame_file_name, session_dir_name, CaptureSession, DirectoryCreator, ExportError,
    FrameExporter, FrameFormat, FsDirectories, SessionId, SessionManifest, StorageError,
    MANIFEST_FILE_NAME,
};
pub use grid::{clamp_position, offset_for, ConfigError, GridConfig, GridPosition, SamplePositions};
pub use orientation::{PanTiltRig, PivotHandle};
pub use scan::{
    ExportOutcome, ExportPolicy, ScanError, ScanProgress, ScanReport, ScanSequencer, ScanState,
    ScanStep,
};
