// src/rl/domain.rs
//
// Per-variable clamp domains derived from a reference dataset.
//
// Every mutation the environment applies lands inside the domain of the
// mutated variable. The table is built once (offline, by `build_artifacts`)
// and shared read-only afterwards.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::artifact::{read_artifact, write_artifact, ArtifactInfo, ArtifactKind};
use crate::error::{ConfigError, IndexOutOfRange};
use crate::types::{
    index_of, is_network_finite, ClinicalState, PatientInput, FEATURE_NAMES, STATE_DIM,
};

/// Closed interval `[min, max]`, `min <= max`, both finite in single precision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariableDomain {
    pub min: f64,
    pub max: f64,
}

impl VariableDomain {
    pub fn new(min: f64, max: f64) -> Result<Self, ConfigError> {
        if !is_network_finite(min) || !is_network_finite(max) {
            return Err(ConfigError::validation(
                "domain",
                format!("non-finite bound [{}, {}]", min, max),
            ));
        }
        if min > max {
            return Err(ConfigError::validation(
                "domain",
                format!("min {} exceeds max {}", min, max),
            ));
        }
        Ok(Self { min, max })
    }

    /// Saturate `value` into the domain.
    ///
    /// NaN maps to `min` here; callers that need "no change" for NaN handle
    /// it before clamping.
    #[inline]
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.min;
        }
        value.max(self.min).min(self.max)
    }

    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// On-disk entry; the name pins the index mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEntry {
    pub name: String,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainTablePayload {
    /// Number of reference rows the bounds were observed over.
    pub source_rows: usize,
    pub entries: Vec<DomainEntry>,
}

/// Observed (min, max) for each of the 34 state variables.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDomainTable {
    domains: [VariableDomain; STATE_DIM],
    source_rows: usize,
}

impl VariableDomainTable {
    pub fn from_domains(domains: [VariableDomain; STATE_DIM]) -> Self {
        Self {
            domains,
            source_rows: 0,
        }
    }

    /// Column-wise min/max over in-memory reference states.
    pub fn from_reference_rows(rows: &[ClinicalState]) -> Result<Self, ConfigError> {
        let first = rows.first().ok_or_else(|| {
            ConfigError::validation("reference_dataset", "dataset has no rows")
        })?;
        let mut domains = [VariableDomain { min: 0.0, max: 0.0 }; STATE_DIM];
        for (d, v) in domains.iter_mut().zip(first.values().iter()) {
            *d = VariableDomain { min: *v, max: *v };
        }
        for row in &rows[1..] {
            for (d, v) in domains.iter_mut().zip(row.values().iter()) {
                d.min = d.min.min(*v);
                d.max = d.max.max(*v);
            }
        }
        Ok(Self {
            domains,
            source_rows: rows.len(),
        })
    }

    /// Build from a JSONL dataset: one named-variable object per line.
    /// Blank lines are skipped; every other line must satisfy the input contract.
    pub fn from_reference_jsonl(path: &Path) -> Result<Self, ConfigError> {
        let label = path.display().to_string();
        let file = File::open(path).map_err(|e| ConfigError::Io {
            path: label.clone(),
            source: e.to_string(),
        })?;
        let mut rows = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| ConfigError::Io {
                path: label.clone(),
                source: e.to_string(),
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let state = PatientInput::from_json_str(&line)
                .and_then(|input| input.to_state())
                .map_err(|e| ConfigError::Parse {
                    path: format!("{}:{}", label, line_no + 1),
                    source: e.to_string(),
                })?;
            rows.push(state);
        }
        Self::from_reference_rows(&rows)
    }

    pub fn from_payload(payload: &DomainTablePayload) -> Result<Self, ConfigError> {
        if payload.entries.len() != STATE_DIM {
            return Err(ConfigError::validation(
                "domain_table.entries",
                format!("{} entries (expected {})", payload.entries.len(), STATE_DIM),
            ));
        }
        let mut domains = [VariableDomain { min: 0.0, max: 0.0 }; STATE_DIM];
        for (i, entry) in payload.entries.iter().enumerate() {
            if entry.name != FEATURE_NAMES[i] {
                return Err(ConfigError::validation(
                    format!("domain_table.entries[{}]", i),
                    format!("name '{}' (expected '{}')", entry.name, FEATURE_NAMES[i]),
                ));
            }
            domains[i] = VariableDomain::new(entry.min, entry.max).map_err(|e| match e {
                ConfigError::Validation { message, .. } => ConfigError::Validation {
                    field: format!("domain_table.{}", entry.name),
                    message,
                },
                other => other,
            })?;
        }
        Ok(Self {
            domains,
            source_rows: payload.source_rows,
        })
    }

    pub fn to_payload(&self) -> DomainTablePayload {
        DomainTablePayload {
            source_rows: self.source_rows,
            entries: FEATURE_NAMES
                .iter()
                .zip(self.domains.iter())
                .map(|(name, d)| DomainEntry {
                    name: name.to_string(),
                    min: d.min,
                    max: d.max,
                })
                .collect(),
        }
    }

    pub fn load(path: &Path) -> Result<(Self, ArtifactInfo), ConfigError> {
        let loaded = read_artifact::<DomainTablePayload>(path, ArtifactKind::DomainTable)?;
        let table = Self::from_payload(&loaded.payload)?;
        Ok((table, loaded.info))
    }

    pub fn save(&self, path: &Path, version: &str) -> Result<ArtifactInfo, ConfigError> {
        write_artifact(path, ArtifactKind::DomainTable, version, &self.to_payload())
    }

    /// `(min, max)` for the variable at `index`.
    pub fn lookup(&self, index: usize) -> Result<(f64, f64), IndexOutOfRange> {
        self.domain(index).map(|d| (d.min, d.max))
    }

    pub fn domain(&self, index: usize) -> Result<VariableDomain, IndexOutOfRange> {
        self.domains.get(index).copied().ok_or(IndexOutOfRange {
            index,
            len: STATE_DIM,
        })
    }

    pub fn lookup_name(&self, name: &str) -> Option<(f64, f64)> {
        index_of(name).map(|i| (self.domains[i].min, self.domains[i].max))
    }

    pub fn source_rows(&self) -> usize {
        self.source_rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{scenario_input, wide_domains};

    fn row(fill: f64) -> ClinicalState {
        ClinicalState::from_values([fill; STATE_DIM])
    }

    #[test]
    fn test_from_reference_rows_min_max() {
        let mut hi = [5.0; STATE_DIM];
        hi[3] = 9.0;
        let rows = vec![row(1.0), ClinicalState::from_values(hi), row(-2.0)];
        let table = VariableDomainTable::from_reference_rows(&rows).unwrap();
        assert_eq!(table.lookup(0).unwrap(), (-2.0, 5.0));
        assert_eq!(table.lookup(3).unwrap(), (-2.0, 9.0));
        assert_eq!(table.source_rows(), 3);
    }

    #[test]
    fn test_empty_dataset_rejected() {
        assert!(matches!(
            VariableDomainTable::from_reference_rows(&[]),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn test_lookup_out_of_range() {
        let table = wide_domains();
        assert_eq!(
            table.lookup(34).unwrap_err(),
            IndexOutOfRange { index: 34, len: 34 }
        );
        assert!(table.lookup(33).is_ok());
    }

    #[test]
    fn test_lookup_name_matches_index() {
        let state = scenario_input().to_state().unwrap();
        let table = VariableDomainTable::from_reference_rows(&[state]).unwrap();
        assert_eq!(table.lookup_name("bmi"), Some((35.7, 35.7)));
        assert_eq!(table.lookup_name("bmi"), table.lookup(9).ok());
        assert_eq!(table.lookup_name("context"), None);
    }

    #[test]
    fn test_clamp_saturates() {
        let d = VariableDomain::new(0.0, 100.0).unwrap();
        assert_eq!(d.clamp(10_000.0), 100.0);
        assert_eq!(d.clamp(-1.0), 0.0);
        assert_eq!(d.clamp(42.0), 42.0);
        assert_eq!(d.clamp(f64::INFINITY), 100.0);
        assert_eq!(d.clamp(f64::NEG_INFINITY), 0.0);
        assert!(VariableDomain::new(2.0, 1.0).is_err());
        assert!(VariableDomain::new(f64::NAN, 1.0).is_err());
        assert!(VariableDomain::new(0.0, 1.0e300).is_err());
        assert!(d.contains(100.0) && !d.contains(100.5));
    }

    #[test]
    fn test_payload_validation() {
        let table = wide_domains();
        let mut payload = table.to_payload();
        assert_eq!(VariableDomainTable::from_payload(&payload).unwrap(), table);

        payload.entries.swap(0, 1);
        assert!(VariableDomainTable::from_payload(&payload).is_err());

        let mut payload = table.to_payload();
        payload.entries[4].min = 10.0;
        payload.entries[4].max = 1.0;
        let err = VariableDomainTable::from_payload(&payload).unwrap_err();
        assert!(err.to_string().contains("marry"));

        let mut payload = table.to_payload();
        payload.entries.pop();
        assert!(VariableDomainTable::from_payload(&payload).is_err());
    }
}
