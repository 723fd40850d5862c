/// Audio clips
///
/// A clip is encoded audio preloaded into memory. Clips are cheap to clone and
/// compare by identity: two clips loaded from the same file are different clips.
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AudioError, Result};

static NEXT_CLIP_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique clip identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClipId(u64);

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clip#{}", self.0)
    }
}

#[derive(Debug)]
struct ClipData {
    id: ClipId,
    name: String,
    bytes: Arc<[u8]>,
    duration: Option<Duration>,
}

/// Shared, immutable audio clip
#[derive(Clone)]
pub struct AudioClip {
    data: Arc<ClipData>,
}

impl AudioClip {
    fn build(name: String, bytes: Arc<[u8]>, duration: Option<Duration>) -> Self {
        let id = ClipId(NEXT_CLIP_ID.fetch_add(1, Ordering::Relaxed));
        Self {
            data: Arc::new(ClipData {
                id,
                name,
                bytes,
                duration,
            }),
        }
    }

    /// Wrap encoded audio already in memory
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::build(name.into(), Arc::from(bytes), None)
    }

    /// A clip with no encoded data, for backends that do not decode
    pub fn silent(name: impl Into<String>, duration: Duration) -> Self {
        Self::build(name.into(), Arc::from(Vec::new()), Some(duration))
    }

    /// Preload an audio file into memory
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(AudioError::NotFound(path.display().to_string()));
        }

        let bytes = std::fs::read(path).map_err(|source| AudioError::LoadFailed {
            path: path.display().to_string(),
            source,
        })?;
        tracing::info!(
            "Preloaded audio file: {} ({} bytes)",
            path.display(),
            bytes.len()
        );

        Ok(Self::build(path.display().to_string(), Arc::from(bytes), None))
    }

    pub fn id(&self) -> ClipId {
        self.data.id
    }

    /// Display name, or the source path for loaded files
    pub fn name(&self) -> &str {
        &self.data.name
    }

    /// Encoded audio bytes
    pub fn bytes(&self) -> &Arc<[u8]> {
        &self.data.bytes
    }

    pub fn duration(&self) -> Option<Duration> {
        self.data.duration
    }
}

impl PartialEq for AudioClip {
    fn eq(&self, other: &Self) -> bool {
        self.data.id == other.data.id
    }
}

impl Eq for AudioClip {}

impl fmt::Debug for AudioClip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioClip")
            .field("id", &self.data.id)
            .field("name", &self.data.name)
            .field("bytes", &self.data.bytes.len())
            .field("duration", &self.data.duration)
            .finish()
    }
}
