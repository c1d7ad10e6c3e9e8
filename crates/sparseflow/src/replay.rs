//! Record optical flow results to disk and replay them later.
//!
//! A [`FlowRecorder`] in [`ReplayMode::Store`] writes one [`FlowRecord`] per frame pair to
//! `<base>/<sequence>/<id>.bin`. The same recorder in [`ReplayMode::Load`] reads them back
//! in order, so a consumer can be rerun without paying for detection and tracking.

use std::{
    fmt, fs,
    io::{self, Write},
    path::{Path, PathBuf},
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

use bincode::config::{Configuration, Fixint, Limit, LittleEndian};
use sparseflow_tracking::TrackPoint;

/// Name of the log appended to on every recorder start.
pub const RUN_LOG_FILENAME: &str = "run_log.txt";

/// Largest record [`decode_record`] accepts, in decoded bytes.
pub const MAX_RECORD_BYTES: usize = 256 * 1024 * 1024;

/// An error type for the replay module.
#[derive(thiserror::Error, Debug)]
pub enum ReplayError {
    /// A file could not be read or written.
    #[error("Replay io error: {0}")]
    Io(#[from] io::Error),

    /// A record could not be encoded.
    #[error("Failed to encode flow record: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// A record could not be decoded.
    #[error("Failed to decode flow record: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    /// Storing and loading need a base path.
    #[error("Unspecified base path for {0} mode")]
    MissingBasePath(ReplayMode),

    /// The mode name is not one of `vanilla`, `store` or `load`.
    #[error("Unknown replay mode: {0}, expected one of vanilla, store, load")]
    UnknownMode(String),
}

/// What a [`FlowRecorder`] does with records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum ReplayMode {
    /// Neither store nor load.
    #[default]
    Passthrough,
    /// Write every record.
    Store,
    /// Read records back.
    Load,
}

impl ReplayMode {
    /// The command line name of the mode.
    pub fn name(&self) -> &'static str {
        match self {
            ReplayMode::Passthrough => "vanilla",
            ReplayMode::Store => "store",
            ReplayMode::Load => "load",
        }
    }
}

impl fmt::Display for ReplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ReplayMode {
    type Err = ReplayError;

    /// An empty string selects [`ReplayMode::Passthrough`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "vanilla" => Ok(ReplayMode::Passthrough),
            "store" => Ok(ReplayMode::Store),
            "load" => Ok(ReplayMode::Load),
            _ => Err(ReplayError::UnknownMode(s.to_string())),
        }
    }
}

/// The optical flow of one frame pair.
///
/// The field order is the on-disk layout.
#[derive(Debug, Clone, Default, PartialEq, bincode::Encode, bincode::Decode)]
pub struct FlowRecord {
    /// Points tracked from the previous frame.
    pub prev_corners: Vec<[f32; 2]>,
    /// Points detected on the current frame.
    pub corners: Vec<[f32; 2]>,
    /// Tracked positions of `prev_corners` in the current frame.
    pub flow_corners: Vec<[f32; 2]>,
    /// One byte per tracked point, 1 when tracked.
    pub status: Vec<u8>,
}

impl FlowRecord {
    /// Assemble a record from tracker output.
    pub fn from_tracks(
        prev_corners: Vec<[f32; 2]>,
        corners: Vec<[f32; 2]>,
        tracks: &[TrackPoint],
    ) -> Self {
        Self {
            prev_corners,
            corners,
            flow_corners: tracks.iter().map(|t| t.position).collect(),
            status: tracks.iter().map(|t| u8::from(t.status)).collect(),
        }
    }
}

// Length prefixes are checked against the limit before anything is allocated.
fn codec() -> Configuration<LittleEndian, Fixint, Limit<MAX_RECORD_BYTES>> {
    bincode::config::standard()
        .with_little_endian()
        .with_fixed_int_encoding()
        .with_limit::<MAX_RECORD_BYTES>()
}

/// Encode a record.
pub fn encode_record(record: &FlowRecord) -> Result<Vec<u8>, ReplayError> {
    Ok(bincode::encode_to_vec(record, codec())?)
}

/// Decode a record.
pub fn decode_record(bytes: &[u8]) -> Result<FlowRecord, ReplayError> {
    let (record, _) = bincode::decode_from_slice(bytes, codec())?;
    Ok(record)
}

/// Stores or loads numbered [`FlowRecord`] files.
#[derive(Debug, Clone)]
pub struct FlowRecorder {
    mode: ReplayMode,
    sequence_path: PathBuf,
    current_id: usize,
}

impl FlowRecorder {
    /// Create a recorder.
    ///
    /// Outside of [`ReplayMode::Passthrough`] this creates `<base_path>/<sequence_name>` and
    /// appends the start time and `command` to its run log.
    ///
    /// # Errors
    ///
    /// Fails when storing or loading without a base path, or when the directory or the
    /// log cannot be written.
    pub fn new(
        mode: ReplayMode,
        base_path: impl AsRef<Path>,
        sequence_name: &str,
        command: &str,
    ) -> Result<Self, ReplayError> {
        let base_path = base_path.as_ref();
        let sequence_path = base_path.join(sequence_name);

        if mode != ReplayMode::Passthrough {
            if base_path.as_os_str().is_empty() {
                return Err(ReplayError::MissingBasePath(mode));
            }
            fs::create_dir_all(&sequence_path)?;
            write_run_log(&sequence_path, command)?;
            log::debug!("flow recorder in {mode} mode at {}", sequence_path.display());
        }

        Ok(Self {
            mode,
            sequence_path,
            current_id: 0,
        })
    }

    /// A recorder that neither stores nor loads.
    pub fn passthrough() -> Self {
        Self {
            mode: ReplayMode::Passthrough,
            sequence_path: PathBuf::new(),
            current_id: 0,
        }
    }

    /// The mode of the recorder.
    pub fn mode(&self) -> ReplayMode {
        self.mode
    }

    /// Directory holding the records.
    pub fn sequence_path(&self) -> &Path {
        &self.sequence_path
    }

    /// Index of the next record.
    pub fn current_id(&self) -> usize {
        self.current_id
    }

    /// Path of the next record.
    pub fn record_path(&self) -> PathBuf {
        self.sequence_path.join(format!("{}.bin", self.current_id))
    }

    /// Write a record and advance to the next one.
    ///
    /// Returns `false` without writing unless the recorder is storing.
    pub fn store(&mut self, record: &FlowRecord) -> Result<bool, ReplayError> {
        if self.mode != ReplayMode::Store {
            return Ok(false);
        }

        let bytes = encode_record(record)?;
        fs::write(self.record_path(), bytes)?;
        self.current_id += 1;
        Ok(true)
    }

    /// Read the next record and advance past it.
    ///
    /// Returns `None` unless the recorder is loading, or when the next record does not
    /// exist; the position is kept in that case.
    pub fn load(&mut self) -> Result<Option<FlowRecord>, ReplayError> {
        if self.mode != ReplayMode::Load {
            return Ok(None);
        }

        let path = self.record_path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::warn!("no flow record at {}", path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let record = decode_record(&bytes)?;
        self.current_id += 1;
        Ok(Some(record))
    }
}

fn write_run_log(sequence_path: &Path, command: &str) -> Result<(), ReplayError> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(sequence_path.join(RUN_LOG_FILENAME))?;

    writeln!(file, "==========================================")?;
    writeln!(file, "Run Timestamp: {timestamp}")?;
    writeln!(file, "Execution Command: {command}")?;
    writeln!(file, "==========================================")?;
    writeln!(file)?;
    Ok(())
}
