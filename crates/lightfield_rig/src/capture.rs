// SPDX-License-Identifier: MIT OR Apache-2.0
//! Capture sessions and frame export.
//!
//! A session is a directory named by its UTC start time holding one frame per
//! grid position. A second session started within the same second gets a
//! numeric suffix (`2024-05-01-12-30-00-1`) so earlier frames are never
//! overwritten:
//!
//! ```text
//! <root>/2024-05-01-12-30-00/
//!     frame_s_0_t_0.png
//!     frame_s_0_t_1.png
//!     ...
//!     session.ron
//! ```

use crate::grid::{GridConfig, GridPosition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Timestamp layout used for session directory names
pub const SESSION_DIR_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// Manifest file written into each session directory
pub const MANIFEST_FILE_NAME: &str = "session.ron";

/// Current manifest format version
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

/// Highest suffix tried for sessions sharing a timestamp
const MAX_SESSION_SUFFIX: u32 = 999;

/// Session directory could not be prepared
#[derive(Debug, thiserror::Error)]
#[error("Failed to create session directory {path}: {source}")]
pub struct StorageError {
    /// Directory that could not be created
    pub path: PathBuf,
    /// Underlying IO error
    #[source]
    pub source: std::io::Error,
}

/// A single frame could not be written
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Nothing has been rendered yet
    #[error("No rendered frame available for {0}")]
    NoFrame(PathBuf),
    /// Encoding the frame failed
    #[error("Failed to encode {path}: {message}")]
    Encode {
        /// Target file
        path: PathBuf,
        /// Encoder message
        message: String,
    },
    /// Writing the file failed
    #[error("IO error writing {path}: {source}")]
    Io {
        /// Target file
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },
}

/// Directory creation used to open sessions
pub trait DirectoryCreator {
    /// Create `path` and any missing parents; succeeds if it already exists
    fn create_dir_all(&mut self, path: &Path) -> std::io::Result<()>;

    /// Create exactly `path`, failing with [`ErrorKind::AlreadyExists`] if it
    /// is already there
    fn create_dir(&mut self, path: &Path) -> std::io::Result<()>;
}

/// [`DirectoryCreator`] backed by the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsDirectories;

impl DirectoryCreator for FsDirectories {
    fn create_dir_all(&mut self, path: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn create_dir(&mut self, path: &Path) -> std::io::Result<()> {
        std::fs::create_dir(path)
    }
}

/// Captures the most recently rendered frame to a file
pub trait FrameExporter {
    /// Write the current frame to `path`
    fn export(&mut self, path: &Path) -> Result<(), ExportError>;
}

impl<E: FrameExporter + ?Sized> FrameExporter for &mut E {
    fn export(&mut self, path: &Path) -> Result<(), ExportError> {
        (**self).export(path)
    }
}

/// Image container used for exported frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FrameFormat {
    /// Lossless PNG
    #[default]
    Png,
    /// JPEG
    Jpeg,
    /// Uncompressed BMP
    Bmp,
    /// Truevision TGA
    Tga,
}

impl FrameFormat {
    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            FrameFormat::Png => "png",
            FrameFormat::Jpeg => "jpg",
            FrameFormat::Bmp => "bmp",
            FrameFormat::Tga => "tga",
        }
    }

    /// Look up a format by file extension (case-insensitive)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(FrameFormat::Png),
            "jpg" | "jpeg" => Some(FrameFormat::Jpeg),
            "bmp" => Some(FrameFormat::Bmp),
            "tga" => Some(FrameFormat::Tga),
            _ => None,
        }
    }

    /// All supported formats
    pub fn all() -> &'static [FrameFormat] {
        &[
            FrameFormat::Png,
            FrameFormat::Jpeg,
            FrameFormat::Bmp,
            FrameFormat::Tga,
        ]
    }
}

/// `frame_s_<col>_t_<row>.<ext>`
pub fn frame_file_name(position: GridPosition, format: FrameFormat) -> String {
    format!(
        "frame_s_{}_t_{}.{}",
        position.col,
        position.row,
        format.extension()
    )
}

/// Session directory name for a start time, e.g. `2024-05-01-12-30-00`
pub fn session_dir_name(started_at: &DateTime<Utc>) -> String {
    started_at.format(SESSION_DIR_FORMAT).to_string()
}

/// Unique identifier for a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

/// An opened session directory
#[derive(Debug, Clone)]
pub struct CaptureSession {
    /// Session ID
    pub id: SessionId,
    /// UTC start time
    pub started_at: DateTime<Utc>,
    /// Directory holding the frames
    pub dir: PathBuf,
    /// Frame container
    pub format: FrameFormat,
}

impl CaptureSession {
    /// Create a fresh `<root>/<timestamp>` directory through `dirs`.
    ///
    /// An existing directory for the same timestamp is left alone and the
    /// next free `<timestamp>-<n>` is used instead.
    pub fn open(
        dirs: &mut dyn DirectoryCreator,
        root: &Path,
        started_at: DateTime<Utc>,
        format: FrameFormat,
    ) -> Result<Self, StorageError> {
        dirs.create_dir_all(root).map_err(|source| StorageError {
            path: root.to_path_buf(),
            source,
        })?;

        let base = session_dir_name(&started_at);
        let mut suffix = 0;
        let dir = loop {
            let dir = if suffix == 0 {
                root.join(&base)
            } else {
                root.join(format!("{base}-{suffix}"))
            };
            match dirs.create_dir(&dir) {
                Ok(()) => break dir,
                Err(e)
                    if e.kind() == ErrorKind::AlreadyExists && suffix < MAX_SESSION_SUFFIX =>
                {
                    tracing::debug!("Session directory {} taken", dir.display());
                    suffix += 1;
                }
                Err(source) => return Err(StorageError { path: dir, source }),
            }
        };

        tracing::info!("Opened capture session at {}", dir.display());

        Ok(Self {
            id: SessionId::new(),
            started_at,
            dir,
            format,
        })
    }

    /// Full path of the frame for `position`
    pub fn frame_path(&self, position: GridPosition) -> PathBuf {
        self.dir.join(frame_file_name(position, self.format))
    }

    /// Path of the manifest file
    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE_NAME)
    }

    /// Describe this session for a viewer
    pub fn manifest(&self, grid: GridConfig, base_position: [f32; 3]) -> SessionManifest {
        SessionManifest {
            version: MANIFEST_FORMAT_VERSION,
            id: self.id,
            started_at: self.started_at,
            grid,
            base_position,
            format: self.format,
            completed: false,
        }
    }
}

/// Description of a session written as [`MANIFEST_FILE_NAME`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionManifest {
    /// Manifest format version
    pub version: u32,
    /// Session ID
    pub id: SessionId,
    /// UTC start time
    pub started_at: DateTime<Utc>,
    /// Grid the frames were captured on
    pub grid: GridConfig,
    /// Array origin in world space
    pub base_position: [f32; 3],
    /// Frame container
    pub format: FrameFormat,
    /// Whether every position was exported
    #[serde(default)]
    pub completed: bool,
}

impl SessionManifest {
    /// Serialize to RON
    pub fn to_ron(&self) -> Result<String, ron::Error> {
        let config = ron::ser::PrettyConfig::default().struct_names(true);
        ron::ser::to_string_pretty(self, config)
    }

    /// Deserialize from RON
    pub fn from_ron(s: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(s)
    }

    /// Write the manifest into `dir`
    pub fn save(&self, dir: &Path) -> std::io::Result<()> {
        let content = self.to_ron().map_err(|e| {
            std::io::Error::new(ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(dir.join(MANIFEST_FILE_NAME), content)
    }

    /// Read the manifest from a session directory
    pub fn load(dir: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(dir.join(MANIFEST_FILE_NAME))?;
        let manifest = Self::from_ron(&content).map_err(|e| {
            std::io::Error::new(ErrorKind::InvalidData, e.to_string())
        })?;

        if manifest.version > MANIFEST_FORMAT_VERSION {
            return Err(std::io::Error::new(
                ErrorKind::InvalidData,
                format!(
                    "Manifest version {} is newer than supported version {}",
                    manifest.version, MANIFEST_FORMAT_VERSION
                ),
            ));
        }

        Ok(manifest)
    }

    /// Frame path for `(col, row)` relative to the session directory `dir`
    pub fn frame_path(&self, dir: &Path, col: u32, row: u32) -> Option<PathBuf> {
        let position = GridPosition::new(col, row);
        self.grid
            .contains(position)
            .then(|| dir.join(frame_file_name(position, self.format)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn read_only() -> std::io::Error {
        std::io::Error::new(ErrorKind::PermissionDenied, "read-only")
    }

    /// Root exists, session directories cannot be created
    struct ReadOnlyRoot;

    impl DirectoryCreator for ReadOnlyRoot {
        fn create_dir_all(&mut self, _path: &Path) -> std::io::Result<()> {
            Ok(())
        }

        fn create_dir(&mut self, _path: &Path) -> std::io::Result<()> {
            Err(read_only())
        }
    }

    /// Every timestamp directory already exists
    struct AlwaysTaken;

    impl DirectoryCreator for AlwaysTaken {
        fn create_dir_all(&mut self, _path: &Path) -> std::io::Result<()> {
            Ok(())
        }

        fn create_dir(&mut self, _path: &Path) -> std::io::Result<()> {
            Err(ErrorKind::AlreadyExists.into())
        }
    }

    fn timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2016, 3, 7, 9, 5, 1).unwrap()
    }

    #[test]
    fn test_frame_file_name() {
        assert_eq!(
            frame_file_name(GridPosition::new(3, 11), FrameFormat::Png),
            "frame_s_3_t_11.png"
        );
        assert_eq!(
            frame_file_name(GridPosition::new(0, 0), FrameFormat::Jpeg),
            "frame_s_0_t_0.jpg"
        );
    }

    #[test]
    fn test_session_dir_name() {
        assert_eq!(session_dir_name(&timestamp()), "2016-03-07-09-05-01");
    }

    #[test]
    fn test_frame_format_extensions() {
        for format in FrameFormat::all() {
            assert_eq!(FrameFormat::from_extension(format.extension()), Some(*format));
        }
        assert_eq!(FrameFormat::from_extension("JPEG"), Some(FrameFormat::Jpeg));
        assert_eq!(FrameFormat::from_extension("exr"), None);
    }

    #[test]
    fn test_open_creates_directory() {
        let root = tempfile::tempdir().unwrap();
        let session =
            CaptureSession::open(&mut FsDirectories, root.path(), timestamp(), FrameFormat::Png)
                .unwrap();

        assert!(session.dir.is_dir());
        assert_eq!(session.dir, root.path().join("2016-03-07-09-05-01"));
        assert_eq!(
            session.frame_path(GridPosition::new(1, 2)),
            session.dir.join("frame_s_1_t_2.png")
        );

    }

    #[test]
    fn test_same_timestamp_gets_new_directory() {
        let root = tempfile::tempdir().unwrap();
        let first =
            CaptureSession::open(&mut FsDirectories, root.path(), timestamp(), FrameFormat::Png)
                .unwrap();
        let frame = first.frame_path(GridPosition::new(0, 0));
        std::fs::write(&frame, b"first").unwrap();

        let second =
            CaptureSession::open(&mut FsDirectories, root.path(), timestamp(), FrameFormat::Png)
                .unwrap();
        let third =
            CaptureSession::open(&mut FsDirectories, root.path(), timestamp(), FrameFormat::Png)
                .unwrap();

        assert_eq!(second.dir, root.path().join("2016-03-07-09-05-01-1"));
        assert_eq!(third.dir, root.path().join("2016-03-07-09-05-01-2"));
        assert!(second.dir.is_dir());
        assert_eq!(std::fs::read(&frame).unwrap(), b"first");
    }

    #[test]
    fn test_open_creates_missing_root() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("captures").join("rig_a");
        let session =
            CaptureSession::open(&mut FsDirectories, &nested, timestamp(), FrameFormat::Png)
                .unwrap();
        assert_eq!(session.dir, nested.join("2016-03-07-09-05-01"));
        assert!(session.dir.is_dir());
    }

    #[test]
    fn test_open_reports_storage_error() {
        let err = CaptureSession::open(
            &mut ReadOnlyRoot,
            Path::new("/captures"),
            timestamp(),
            FrameFormat::Png,
        )
        .unwrap_err();
        assert_eq!(err.path, Path::new("/captures/2016-03-07-09-05-01"));
        assert_eq!(err.source.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_open_gives_up_when_every_suffix_is_taken() {
        let err = CaptureSession::open(
            &mut AlwaysTaken,
            Path::new("/captures"),
            timestamp(),
            FrameFormat::Png,
        )
        .unwrap_err();
        assert_eq!(err.source.kind(), ErrorKind::AlreadyExists);
        assert_eq!(
            err.path,
            Path::new("/captures").join(format!("2016-03-07-09-05-01-{MAX_SESSION_SUFFIX}"))
        );
    }

    #[test]
    fn test_manifest_save_and_load() {
        let root = tempfile::tempdir().unwrap();
        let session =
            CaptureSession::open(&mut FsDirectories, root.path(), timestamp(), FrameFormat::Bmp)
                .unwrap();
        let grid = GridConfig::new(4, 3, 0.1).unwrap();

        let mut manifest = session.manifest(grid, [0.0, 1.0, -2.0]);
        manifest.completed = true;
        manifest.save(&session.dir).unwrap();

        let loaded = SessionManifest::load(&session.dir).unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.grid, grid);
        assert_eq!(loaded.format, FrameFormat::Bmp);
        assert_eq!(loaded.started_at, timestamp());
        assert!(loaded.completed);
    }

    #[test]
    fn test_manifest_frame_path_checks_range() {
        let session = CaptureSession {
            id: SessionId::new(),
            started_at: timestamp(),
            dir: PathBuf::from("lf"),
            format: FrameFormat::Png,
        };
        let manifest = session.manifest(GridConfig::new(2, 2, 0.1).unwrap(), [0.0; 3]);
        let dir = Path::new("lf");

        assert_eq!(
            manifest.frame_path(dir, 1, 0),
            Some(PathBuf::from("lf/frame_s_1_t_0.png"))
        );
        assert_eq!(manifest.frame_path(dir, 2, 0), None);
    }

    #[test]
    fn test_manifest_rejects_newer_version() {
        let root = tempfile::tempdir().unwrap();
        let session = CaptureSession {
            id: SessionId::new(),
            started_at: timestamp(),
            dir: root.path().to_path_buf(),
            format: FrameFormat::Png,
        };
        let mut manifest = session.manifest(GridConfig::default(), [0.0; 3]);
        manifest.version = MANIFEST_FORMAT_VERSION + 1;
        manifest.save(root.path()).unwrap();

        let err = SessionManifest::load(root.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }
}
