//! Byte-window sampling.
//!
//! Only a bounded window of an object is ever read: the footer of Parquet
//! files, the first kilobyte or two of everything else. A sample feeds schema
//! inference and nothing else; object identity comes from
//! [`fingerprint`], which reads no bytes at all.

use crate::backend::StorageBackend;
use crate::config::SamplingConfig;
use blobscout_protocol::{FileFormat, ObjectDescriptor, SampleSummary, SampleWindow, StorageKind};
use bytes::Bytes;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

pub use blobscout_protocol::fingerprint;

/// Allowed head window sizes.
pub const HEAD_BYTES_RANGE: RangeInclusive<u64> = 1024..=2048;
pub const DEFAULT_TAIL_BYTES: u64 = 8192;

/// How many bytes to read, and from which end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplePolicy {
    pub head_bytes: u64,
    pub tail_bytes: u64,
}

impl SamplePolicy {
    /// Backend defaults: 1024 head bytes for blob containers, 2048 for data
    /// lake filesystems.
    pub fn for_backend(kind: StorageKind) -> Self {
        let head_bytes = match kind {
            StorageKind::Blob => 1024,
            StorageKind::DataLake => 2048,
        };
        Self {
            head_bytes,
            tail_bytes: DEFAULT_TAIL_BYTES,
        }
    }

    pub fn from_config(kind: StorageKind, config: &SamplingConfig) -> Self {
        let defaults = Self::for_backend(kind);
        let head_bytes = config
            .head_bytes
            .unwrap_or(defaults.head_bytes)
            .clamp(*HEAD_BYTES_RANGE.start(), *HEAD_BYTES_RANGE.end());
        Self {
            head_bytes,
            tail_bytes: config.tail_bytes.max(1),
        }
    }

    pub fn window_for(&self, format: FileFormat) -> (SampleWindow, u64) {
        match format {
            FileFormat::Parquet => (SampleWindow::Tail, self.tail_bytes),
            _ => (SampleWindow::Head, self.head_bytes),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub bytes: Bytes,
    pub window: SampleWindow,
    pub object_size: u64,
}

impl Sample {
    /// The window did not cover the whole object.
    pub fn truncated(&self) -> bool {
        (self.bytes.len() as u64) < self.object_size
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    Sampled(Sample),
    /// Treated downstream as "schema unknown".
    Unavailable { reason: String },
}

impl SampleOutcome {
    pub fn sample(&self) -> Option<&Sample> {
        match self {
            SampleOutcome::Sampled(sample) => Some(sample),
            SampleOutcome::Unavailable { .. } => None,
        }
    }

    pub fn summary(&self) -> SampleSummary {
        match self {
            SampleOutcome::Sampled(sample) => SampleSummary {
                window: Some(sample.window),
                bytes_read: sample.bytes.len() as u64,
                degraded: None,
            },
            SampleOutcome::Unavailable { reason } => SampleSummary {
                window: None,
                bytes_read: 0,
                degraded: Some(reason.clone()),
            },
        }
    }
}

pub struct Sampler {
    backend: Arc<dyn StorageBackend>,
    policy: SamplePolicy,
    call_timeout: Duration,
}

impl Sampler {
    pub fn new(backend: Arc<dyn StorageBackend>, policy: SamplePolicy, call_timeout: Duration) -> Self {
        Self {
            backend,
            policy,
            call_timeout,
        }
    }

    /// Read the sample window of `object`. Never fails: read errors and
    /// timeouts come back as [`SampleOutcome::Unavailable`].
    pub async fn sample(&self, container: &str, object: &ObjectDescriptor) -> SampleOutcome {
        if object.size_bytes == 0 {
            return SampleOutcome::Unavailable {
                reason: "empty object".to_string(),
            };
        }

        let (window, len) = self.policy.window_for(object.format());
        let read = async {
            match window {
                SampleWindow::Head => {
                    self.backend
                        .read_head(container, &object.full_path, len)
                        .await
                }
                SampleWindow::Tail => {
                    self.backend
                        .read_tail(container, &object.full_path, len, Some(object.size_bytes))
                        .await
                }
            }
        };

        match timeout(self.call_timeout, read).await {
            Ok(Ok(bytes)) if bytes.is_empty() => SampleOutcome::Unavailable {
                reason: "backend returned no bytes".to_string(),
            },
            Ok(Ok(bytes)) => {
                debug!(path = %object.full_path, ?window, bytes = bytes.len(), "Sampled object");
                SampleOutcome::Sampled(Sample {
                    bytes,
                    window,
                    object_size: object.size_bytes,
                })
            }
            Ok(Err(e)) => {
                warn!(path = %object.full_path, error = %e, "Sample read failed");
                SampleOutcome::Unavailable {
                    reason: e.to_string(),
                }
            }
            Err(_) => {
                warn!(path = %object.full_path, timeout_secs = self.call_timeout.as_secs(), "Sample read timed out");
                SampleOutcome::Unavailable {
                    reason: format!("sample read timed out after {}s", self.call_timeout.as_secs()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use std::collections::BTreeMap;

    fn object(path: &str, size: u64) -> ObjectDescriptor {
        ObjectDescriptor {
            name: path.rsplit('/').next().unwrap().to_string(),
            full_path: path.to_string(),
            size_bytes: size,
            etag: "\"0x1\"".to_string(),
            last_modified: None,
            created_at: None,
            content_type: None,
            backend_specific: BTreeMap::new(),
        }
    }

    #[test]
    fn head_window_is_clamped() {
        let config = SamplingConfig {
            head_bytes: Some(64 * 1024),
            ..SamplingConfig::default()
        };
        assert_eq!(SamplePolicy::from_config(StorageKind::Blob, &config).head_bytes, 2048);

        let config = SamplingConfig {
            head_bytes: Some(10),
            ..SamplingConfig::default()
        };
        assert_eq!(SamplePolicy::from_config(StorageKind::Blob, &config).head_bytes, 1024);

        let defaults = SamplePolicy::from_config(StorageKind::DataLake, &SamplingConfig::default());
        assert_eq!(defaults.head_bytes, 2048);
        assert_eq!(defaults.tail_bytes, 8192);
    }

    #[tokio::test]
    async fn parquet_reads_the_tail_others_the_head() {
        let backend = Arc::new(MemoryBackend::new());
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        backend.put("c", "big.parquet", data.clone());
        backend.put("c", "big.csv", data.clone());

        let sampler = Sampler::new(backend.clone(), SamplePolicy::for_backend(StorageKind::Blob), Duration::from_secs(5));

        let tail = sampler.sample("c", &object("big.parquet", 20_000)).await;
        let tail = tail.sample().unwrap();
        assert_eq!(tail.window, SampleWindow::Tail);
        assert_eq!(tail.bytes.len(), 8192);
        assert_eq!(&tail.bytes[..], &data[20_000 - 8192..]);
        assert!(tail.truncated());

        let head = sampler.sample("c", &object("big.csv", 20_000)).await;
        let head = head.sample().unwrap();
        assert_eq!(head.window, SampleWindow::Head);
        assert_eq!(&head.bytes[..], &data[..1024]);

        assert_eq!(backend.bytes_read(), 8192 + 1024);
    }

    #[tokio::test]
    async fn failures_degrade_to_unavailable() {
        let backend = Arc::new(MemoryBackend::new());
        backend.put("c", "locked.csv", b"a,b\n".to_vec());
        backend.fail_reads("locked.csv");
        let sampler = Sampler::new(backend, SamplePolicy::for_backend(StorageKind::Blob), Duration::from_secs(5));

        let outcome = sampler.sample("c", &object("locked.csv", 4)).await;
        assert!(matches!(outcome, SampleOutcome::Unavailable { .. }));
        assert!(outcome.summary().degraded.is_some());

        let empty = sampler.sample("c", &object("empty.csv", 0)).await;
        assert_eq!(
            empty,
            SampleOutcome::Unavailable {
                reason: "empty object".to_string()
            }
        );
    }
}
