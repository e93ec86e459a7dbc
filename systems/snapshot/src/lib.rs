#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Persisted lifecycle state and the codecs that move it to and from storage.
//!
//! [`Snapshot`] is the complete, immutable picture of a lifecycle. Every
//! field is optional on the wire and falls back to the dormant baseline, so
//! older snapshots keep loading as the schema grows. Systems convert their
//! own state into the record types defined here; this crate never reaches
//! into them.

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use collapse_core::{BlockPos, CollapseDirection, Phase, WorldBorder};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

mod store;

pub use store::SnapshotStore;

/// Schema version written by this build.
pub const SNAPSHOT_VERSION: u32 = 1;

const LINE_DOMAIN: &str = "collapse";
const LINE_VERSION: &str = "v1";
const FIELD_DELIMITER: char = ':';

/// Complete serialized lifecycle state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Snapshot {
    /// Schema version that produced the snapshot.
    pub version: u32,
    /// Stable name of the active phase.
    pub phase: String,
    /// Ticks processed since the lifecycle was armed.
    pub ticks: i64,
    /// Center selected when the lifecycle was armed.
    pub center: Option<BlockPos>,
    /// Packed coordinates awaiting destructive edits, in processing order.
    pub collapse_queue: Vec<i64>,
    /// Regions queued when the collapse job started.
    pub collapse_total: u64,
    /// Regions completed or skipped so far.
    pub collapse_completed: u64,
    /// Packed coordinates awaiting regeneration, in processing order.
    pub reset_queue: Vec<i64>,
    /// Ticks left before the first regeneration batch.
    pub reset_delay: u64,
    /// Cosmetic border state.
    pub border: BorderRecord,
    /// Ticks left on the fuse.
    pub fuse_remaining: u64,
    /// Ticks elapsed in the collapse job.
    pub elapsed_ticks: i64,
    /// Schedule of the collapse job.
    pub job: Option<JobRecord>,
    /// Resumption point inside the region being edited.
    pub cursor: Option<CursorRecord>,
    /// Regions skipped because they could not be accessed.
    pub skipped_missing: u64,
    /// Distance ring of the most recently completed region.
    pub last_ring: Option<u32>,
    /// Ticks left before the next regeneration batch.
    pub reset_countdown: u64,
    /// Preparation queues and pins.
    pub preparation: PreparationRecord,
    /// Stall counters.
    pub watchdog: WatchdogRecord,
    /// Last progress notification emitted.
    pub last_progress: Option<ProgressRecord>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            phase: Phase::Dormant.name().to_owned(),
            ticks: 0,
            center: None,
            collapse_queue: Vec::new(),
            collapse_total: 0,
            collapse_completed: 0,
            reset_queue: Vec::new(),
            reset_delay: 0,
            border: BorderRecord::default(),
            fuse_remaining: 0,
            elapsed_ticks: 0,
            job: None,
            cursor: None,
            skipped_missing: 0,
            last_ring: None,
            reset_countdown: 0,
            preparation: PreparationRecord::default(),
            watchdog: WatchdogRecord::default(),
            last_progress: None,
        }
    }
}

impl Snapshot {
    /// Phase recorded in the snapshot; unknown names resolve to dormant.
    #[must_use]
    pub fn phase(&self) -> Phase {
        Phase::from_name(&self.phase).unwrap_or_else(|| {
            warn!(
                "snapshot phase '{}' is not recognised; resuming dormant",
                self.phase
            );
            Phase::Dormant
        })
    }

    /// Serializes the snapshot as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        serde_json::to_string_pretty(self).map_err(SnapshotError::Json)
    }

    /// Parses a snapshot from JSON, defaulting absent fields.
    pub fn from_json(text: &str) -> Result<Self, SnapshotError> {
        if text.trim().is_empty() {
            return Err(SnapshotError::EmptyPayload);
        }
        serde_json::from_str(text).map_err(SnapshotError::Json)
    }

    /// Encodes the snapshot into a single line suitable for clipboard transfer.
    pub fn encode_line(&self) -> Result<String, SnapshotError> {
        let json = serde_json::to_vec(self).map_err(SnapshotError::Json)?;
        let encoded = STANDARD_NO_PAD.encode(json);
        Ok(format!("{LINE_DOMAIN}{FIELD_DELIMITER}{LINE_VERSION}{FIELD_DELIMITER}{encoded}"))
    }

    /// Decodes a snapshot produced by [`Snapshot::encode_line`].
    pub fn decode_line(value: &str) -> Result<Self, SnapshotError> {
        let bytes = Self::line_payload(value)?;
        serde_json::from_slice(&bytes).map_err(SnapshotError::Json)
    }

    fn line_payload(value: &str) -> Result<Vec<u8>, SnapshotError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(SnapshotError::EmptyPayload);
        }

        let mut parts = trimmed.splitn(3, FIELD_DELIMITER);
        let domain = parts.next().ok_or(SnapshotError::MissingHeader)?;
        let version = parts.next().ok_or(SnapshotError::MissingHeader)?;
        let payload = parts.next().ok_or(SnapshotError::MissingHeader)?;

        if domain != LINE_DOMAIN {
            return Err(SnapshotError::InvalidPrefix(domain.to_owned()));
        }
        if version != LINE_VERSION {
            return Err(SnapshotError::UnsupportedVersion(version.to_owned()));
        }

        STANDARD_NO_PAD
            .decode(payload.as_bytes())
            .map_err(SnapshotError::Encoding)
    }

    /// Decodes either representation, falling back to the dormant baseline.
    ///
    /// Top-level fields that cannot be read keep their defaults; the rest of
    /// the document is still restored.
    #[must_use]
    pub fn decode_lenient(text: &str) -> Self {
        let trimmed = text.trim();
        let document: Result<Value, SnapshotError> = if trimmed.starts_with(LINE_DOMAIN) {
            Self::line_payload(trimmed)
                .and_then(|bytes| serde_json::from_slice(&bytes).map_err(SnapshotError::Json))
        } else {
            serde_json::from_str::<Value>(trimmed).map_err(SnapshotError::Json)
        };
        match document {
            Ok(document) => Self::from_document(document),
            Err(error) => {
                warn!("discarding unreadable snapshot: {error}");
                Self::default()
            }
        }
    }

    fn from_document(document: Value) -> Self {
        let Value::Object(fields) = document else {
            warn!("discarding snapshot that is not a json object");
            return Self::default();
        };

        let mut readable = Map::new();
        for (name, value) in fields {
            let mut single = Map::new();
            let _ = single.insert(name.clone(), value.clone());
            match serde_json::from_value::<Self>(Value::Object(single)) {
                Ok(_) => {
                    let _ = readable.insert(name, value);
                }
                Err(error) => warn!("defaulting unreadable snapshot field '{name}': {error}"),
            }
        }
        serde_json::from_value(Value::Object(readable)).unwrap_or_else(|error| {
            warn!("discarding unreadable snapshot: {error}");
            Self::default()
        })
    }
}

/// Cosmetic border state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BorderRecord {
    /// Indicates whether the interpolation is deployed.
    pub active: bool,
    /// Border center along the x axis.
    pub center_x: f64,
    /// Border center along the z axis.
    pub center_z: f64,
    /// Diameter at deployment.
    pub initial_diameter: f64,
    /// Diameter at the end of the interpolation.
    pub target_diameter: f64,
    /// Interpolation length in ticks.
    pub duration_ticks: i64,
    /// Ticks elapsed since deployment.
    pub elapsed_ticks: i64,
    /// Diameter after the latest tick.
    pub last_diameter: f64,
    /// Border that governed the world before deployment.
    pub original: Option<WorldBorder>,
    /// Ticks left before the original border is restored.
    pub reset_countdown: Option<u64>,
}

/// Collapse job schedule.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JobRecord {
    /// Center the radius is measured from.
    pub center: BlockPos,
    /// Radius at tick zero.
    pub start_radius: f64,
    /// Radius once the duration elapsed.
    pub end_radius: f64,
    /// Schedule length in ticks.
    pub duration_ticks: i64,
    /// Direction of travel.
    pub direction: CollapseDirection,
}

impl Default for JobRecord {
    fn default() -> Self {
        Self {
            center: BlockPos::new(0, 0, 0),
            start_radius: 0.0,
            end_radius: 0.0,
            duration_ticks: 1,
            direction: CollapseDirection::default(),
        }
    }
}

/// Pass being executed on the region at the front of the collapse queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassStage {
    /// Solid content is cleared.
    #[default]
    Fill,
    /// Fluid content is drained.
    Drain,
}

/// Resumption point inside a region.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CursorRecord {
    /// Packed coordinate of the region being edited.
    pub coord: i64,
    /// Pass being executed.
    pub stage: PassStage,
    /// Linear index of the next cell to visit.
    pub index: u64,
    /// Edits already spent on the region.
    pub operations: u64,
}

/// Preparation queues and pins.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PreparationRecord {
    /// Packed center region the rings were built around.
    pub center: Option<i64>,
    /// Pre-generation queue.
    pub pre_generation: QueueRecord,
    /// Preload queue.
    pub preload: QueueRecord,
    /// Keep-resident reference counts.
    pub pinned: Vec<PinRecord>,
}

/// One preparation queue.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueueRecord {
    /// Packed coordinates still pending, in processing order.
    pub pending: Vec<i64>,
    /// Regions attempted so far.
    pub processed: u64,
    /// Regions that could not be materialized.
    pub missing: u64,
    /// Indicates whether the queue was ever populated.
    pub populated: bool,
    /// Indicates whether the queue drained.
    pub complete: bool,
    /// Indicates whether the completion side effect already fired.
    pub announced: bool,
}

/// Keep-resident reference count of a single region.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PinRecord {
    /// Packed coordinate.
    pub coord: i64,
    /// Outstanding pins.
    pub count: u32,
}

/// Stall counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WatchdogRecord {
    /// Fuse-phase counter.
    pub fuse: CounterRecord,
    /// Collapse-phase counter.
    pub collapse: CounterRecord,
}

/// A single stall counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CounterRecord {
    /// Consecutive non-productive ticks.
    pub count: u64,
    /// Indicates whether the warning for this episode was emitted.
    pub warned: bool,
}

/// Last emitted progress notification.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProgressRecord {
    /// Indicates whether the border was deployed.
    pub active: bool,
    /// Reported diameter in hundredths of a cell.
    pub diameter_centi: i64,
    /// Stable name of the reported phase.
    pub phase: String,
}

/// Errors raised while encoding, decoding, or storing snapshots.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The provided text was empty or whitespace.
    #[error("snapshot payload was empty")]
    EmptyPayload,
    /// The single-line form lacked its header segments.
    #[error("snapshot line is missing its header")]
    MissingHeader,
    /// The single-line form used an unexpected prefix.
    #[error("snapshot prefix '{0}' is not supported")]
    InvalidPrefix(String),
    /// The single-line form used an unsupported version.
    #[error("snapshot version '{0}' is not supported")]
    UnsupportedVersion(String),
    /// The base64 payload could not be decoded.
    #[error("could not decode snapshot payload: {0}")]
    Encoding(#[from] base64::DecodeError),
    /// The JSON document could not be produced or parsed.
    #[error("could not process snapshot json: {0}")]
    Json(#[from] serde_json::Error),
    /// Reading or writing the snapshot file failed.
    #[error("snapshot file {path} could not be accessed: {source}")]
    Io {
        /// File that was accessed.
        path: String,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },
}
