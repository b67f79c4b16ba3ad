//! Frame dump and restore
//!
//! The dump is a JSON array of `{"data": [14 bytes], "timestamp": secs}`
//! records, oldest first. Empty frames are never written and are dropped on
//! restore, together with records whose data is not exactly 14 bytes.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

use crate::buffer::FrameBuffer;
use crate::types::{FRAME_LEN, Frame};
use crate::{CoeError, Result};

#[derive(Debug, Serialize, Deserialize)]
struct FrameRecord {
    data: Vec<u8>,
    #[serde(with = "crate::types::timestamp")]
    timestamp: SystemTime,
}

impl FrameRecord {
    fn into_frame(self) -> Option<Frame> {
        let data: [u8; FRAME_LEN] = self.data.try_into().ok()?;
        let frame = Frame::restored(data, self.timestamp);
        (!frame.is_empty()).then_some(frame)
    }
}

/// Dump file of one gateway.
#[derive(Debug, Clone)]
pub struct FrameStore {
    path: PathBuf,
}

impl FrameStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write every non-empty buffered frame. Returns the number written.
    ///
    /// The file is replaced atomically through a sibling temp file.
    pub fn save(&self, buffer: &FrameBuffer) -> Result<usize> {
        let records: Vec<FrameRecord> = buffer
            .snapshot()
            .iter()
            .filter(|frame| !frame.is_empty())
            .map(|frame| FrameRecord {
                data: frame.as_bytes().to_vec(),
                timestamp: frame.timestamp(),
            })
            .collect();

        let json = serde_json::to_vec(&records)
            .map_err(|e| CoeError::parse_error("frame dump", e.to_string()))?;

        let tmp = self.temp_path();
        std::fs::write(&tmp, json).map_err(|e| CoeError::file_error(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| CoeError::file_error(&self.path, e))?;

        debug!(path = %self.path.display(), frames = records.len(), "Saved frame dump");
        Ok(records.len())
    }

    /// Replace the buffer content with the dump. Returns the number restored.
    ///
    /// A missing dump leaves the buffer untouched.
    pub fn restore(&self, buffer: &FrameBuffer) -> Result<usize> {
        let text = match std::fs::read(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No frame dump to restore");
                return Ok(0);
            }
            Err(e) => return Err(CoeError::file_error(&self.path, e)),
        };

        let records: Vec<FrameRecord> = serde_json::from_slice(&text).map_err(|e| {
            let context = self.path.display().to_string();
            CoeError::parse_error(context, format!("JSON parsing failed: {}", e))
        })?;

        let total = records.len();
        let frames: Vec<Frame> = records.into_iter().filter_map(FrameRecord::into_frame).collect();
        if frames.len() < total {
            warn!(dropped = total - frames.len(), "Dropped empty or malformed dump records");
        }

        let restored = buffer.replace(frames);
        info!(path = %self.path.display(), frames = restored, "Restored frame dump");
        Ok(restored)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
