// src/artifact.rs
//
// Versioned, checksummed envelope for frozen weight and table artifacts.
//
// On disk:
//   {
//     "format_version": 1,
//     "kind": "risk_scorer" | "policy_agent" | "domain_table",
//     "model_version": "...",
//     "payload_sha256": "<hex of the exact payload bytes>",
//     "payload": { ... }
//   }
//
// The checksum covers the payload bytes exactly as they appear in the file,
// so floats are never re-serialized before hashing.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use sha2::{Digest, Sha256};

use crate::error::ConfigError;

/// Envelope format understood by this build.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    RiskScorer,
    PolicyAgent,
    DomainTable,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::RiskScorer => "risk_scorer",
            ArtifactKind::PolicyAgent => "policy_agent",
            ArtifactKind::DomainTable => "domain_table",
        }
    }
}

/// Envelope metadata reported after a successful load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub kind: ArtifactKind,
    pub model_version: String,
    pub payload_sha256: String,
}

#[derive(Debug, Clone)]
pub struct LoadedArtifact<T> {
    pub info: ArtifactInfo,
    pub payload: T,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    format_version: u32,
    kind: String,
    model_version: String,
    payload_sha256: String,
    payload: Box<RawValue>,
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Serialize `payload` into an envelope string.
pub fn encode_artifact<T: Serialize>(
    kind: ArtifactKind,
    model_version: &str,
    payload: &T,
) -> Result<(String, ArtifactInfo), ConfigError> {
    let encode_err = |e: serde_json::Error| ConfigError::Parse {
        path: format!("<{}>", kind.as_str()),
        source: e.to_string(),
    };
    let payload_text = serde_json::to_string(payload).map_err(encode_err)?;
    let payload_sha256 = sha256_hex(payload_text.as_bytes());
    let envelope = Envelope {
        format_version: ARTIFACT_FORMAT_VERSION,
        kind: kind.as_str().to_string(),
        model_version: model_version.to_string(),
        payload_sha256: payload_sha256.clone(),
        payload: RawValue::from_string(payload_text).map_err(encode_err)?,
    };
    let text = serde_json::to_string_pretty(&envelope).map_err(encode_err)?;
    Ok((
        text,
        ArtifactInfo {
            kind,
            model_version: model_version.to_string(),
            payload_sha256,
        },
    ))
}

/// Write an envelope atomically (temp file in the same directory, then rename).
pub fn write_artifact<T: Serialize>(
    path: &Path,
    kind: ArtifactKind,
    model_version: &str,
    payload: &T,
) -> Result<ArtifactInfo, ConfigError> {
    let (text, info) = encode_artifact(kind, model_version, payload)?;
    let io_err = |e: std::io::Error| ConfigError::Io {
        path: path.display().to_string(),
        source: e.to_string(),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let temp_path = path.with_file_name(format!(
        ".tmp_{}_{}",
        std::process::id(),
        path.file_name()
            .map(|s| s.to_string_lossy())
            .unwrap_or_default()
    ));
    let mut file = File::create(&temp_path).map_err(io_err)?;
    file.write_all(text.as_bytes()).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    fs::rename(&temp_path, path).map_err(io_err)?;
    Ok(info)
}

/// Validate an envelope and decode its payload.
///
/// `label` names the source in error messages (usually the file path).
pub fn decode_artifact<T: DeserializeOwned>(
    text: &str,
    label: &str,
    expected: ArtifactKind,
) -> Result<LoadedArtifact<T>, ConfigError> {
    let parse_err = |e: serde_json::Error| ConfigError::Parse {
        path: label.to_string(),
        source: e.to_string(),
    };
    let envelope: Envelope = serde_json::from_str(text).map_err(parse_err)?;

    if envelope.format_version != ARTIFACT_FORMAT_VERSION {
        return Err(ConfigError::VersionMismatch {
            path: label.to_string(),
            expected: ARTIFACT_FORMAT_VERSION,
            found: envelope.format_version,
        });
    }
    if envelope.kind != expected.as_str() {
        return Err(ConfigError::KindMismatch {
            path: label.to_string(),
            expected: expected.as_str().to_string(),
            found: envelope.kind,
        });
    }
    let found = sha256_hex(envelope.payload.get().as_bytes());
    if !found.eq_ignore_ascii_case(&envelope.payload_sha256) {
        return Err(ConfigError::ChecksumMismatch {
            path: label.to_string(),
            expected: envelope.payload_sha256,
            found,
        });
    }

    let payload: T = serde_json::from_str(envelope.payload.get()).map_err(parse_err)?;
    Ok(LoadedArtifact {
        info: ArtifactInfo {
            kind: expected,
            model_version: envelope.model_version,
            payload_sha256: found,
        },
        payload,
    })
}

pub fn read_artifact<T: DeserializeOwned>(
    path: &Path,
    expected: ArtifactKind,
) -> Result<LoadedArtifact<T>, ConfigError> {
    let text = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e.to_string(),
    })?;
    decode_artifact(&text, &path.display().to_string(), expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        values: Vec<f32>,
        name: String,
    }

    fn payload() -> Payload {
        Payload {
            values: vec![0.1, -2.5e-8, 1.0 / 3.0],
            name: "fixture".to_string(),
        }
    }

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_encode_decode_preserves_payload() {
        let (text, info) = encode_artifact(ArtifactKind::RiskScorer, "v-test", &payload()).unwrap();
        let loaded: LoadedArtifact<Payload> =
            decode_artifact(&text, "mem", ArtifactKind::RiskScorer).unwrap();
        assert_eq!(loaded.payload, payload());
        assert_eq!(loaded.info, info);
    }

    #[test]
    fn test_kind_mismatch() {
        let (text, _) = encode_artifact(ArtifactKind::PolicyAgent, "v", &payload()).unwrap();
        let err = decode_artifact::<Payload>(&text, "mem", ArtifactKind::RiskScorer).unwrap_err();
        assert!(matches!(err, ConfigError::KindMismatch { ref found, .. } if found == "policy_agent"));
    }

    #[test]
    fn test_version_mismatch() {
        let (text, _) = encode_artifact(ArtifactKind::DomainTable, "v", &payload()).unwrap();
        let text = text.replace("\"format_version\": 1", "\"format_version\": 2");
        let err = decode_artifact::<Payload>(&text, "mem", ArtifactKind::DomainTable).unwrap_err();
        assert_eq!(
            err,
            ConfigError::VersionMismatch {
                path: "mem".to_string(),
                expected: 1,
                found: 2
            }
        );
    }

    #[test]
    fn test_tampered_payload_fails_checksum() {
        let (text, _) = encode_artifact(ArtifactKind::RiskScorer, "v", &payload()).unwrap();
        let text = text.replace("fixture", "fixturf");
        let err = decode_artifact::<Payload>(&text, "mem", ArtifactKind::RiskScorer).unwrap_err();
        assert!(matches!(err, ConfigError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_garbage_is_parse_error() {
        let err = decode_artifact::<Payload>("not json", "mem", ArtifactKind::RiskScorer).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
