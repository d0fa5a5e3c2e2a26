//! Persisted detector with an integrity checksum.
//!
//! The bundle is a single JSON document. `checksum` is the base64 SHA-256 over the
//! declared dimensions and the payload's JSON encoding; a bundle that is missing,
//! unparsable or fails the checksum is reported as unavailable so callers can fall
//! back to rules. A bundle built for a different feature dimension is a hard error.

use super::DetectorBackend;
use crate::error::{EngineError, Result};
use crate::features::FEATURE_DIM;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use uuid::Uuid;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBundle {
    pub format_version: u32,
    pub bundle_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub sequence_length: usize,
    pub feature_dim: usize,
    pub checksum: String,
    pub payload: DetectorBackend,
}

impl ModelBundle {
    /// Seal a fitted detector. Unfitted detectors cannot be bundled.
    pub fn new(payload: DetectorBackend, sequence_length: usize) -> Result<Self> {
        if !payload.is_fitted() {
            return Err(EngineError::not_fitted("bundle payload"));
        }
        let mut bundle = Self {
            format_version: FORMAT_VERSION,
            bundle_id: Uuid::new_v4(),
            created_at: Utc::now(),
            sequence_length,
            feature_dim: FEATURE_DIM,
            checksum: String::new(),
            payload,
        };
        bundle.checksum = bundle.compute_checksum()?;
        Ok(bundle)
    }

    pub fn compute_checksum(&self) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(self.sequence_length.to_le_bytes());
        hasher.update(self.feature_dim.to_le_bytes());
        hasher.update(serde_json::to_vec(&self.payload)?);
        Ok(BASE64.encode(hasher.finalize()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, serde_json::to_vec(self)?)?;
        tracing::info!(
            path = %path.display(),
            bundle_id = %self.bundle_id,
            backend = ?self.payload.kind(),
            "model bundle saved"
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let unavailable = |reason: String| EngineError::BundleUnavailable {
            path: path.to_path_buf(),
            reason,
        };

        let data = std::fs::read(path).map_err(|e| unavailable(e.to_string()))?;
        let bundle: ModelBundle = serde_json::from_slice(&data).map_err(|e| unavailable(e.to_string()))?;

        if bundle.format_version != FORMAT_VERSION {
            return Err(unavailable(format!("unsupported format version {}", bundle.format_version)));
        }
        if bundle.feature_dim != FEATURE_DIM {
            return Err(EngineError::DimensionMismatch {
                expected: FEATURE_DIM,
                actual: bundle.feature_dim,
            });
        }
        let expected = bundle.compute_checksum()?;
        if expected != bundle.checksum {
            return Err(unavailable("checksum mismatch".to_string()));
        }
        if !bundle.payload.is_fitted() {
            return Err(unavailable("payload is not fitted".to_string()));
        }

        tracing::info!(
            path = %path.display(),
            bundle_id = %bundle.bundle_id,
            created_at = %bundle.created_at,
            backend = ?bundle.payload.kind(),
            "model bundle loaded"
        );
        Ok(bundle)
    }

    pub fn into_detector(self) -> DetectorBackend {
        self.payload
    }
}
