//! Persisted form of the reference tables.
//!
//! Layout: `b"ANRF"` magic, little-endian `u32` version, then the CBOR-encoded
//! [`ReferenceBundle`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Formula, Term};

pub const BUNDLE_MAGIC: &[u8; 4] = b"ANRF";
pub const BUNDLE_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ReferenceError {
    #[error("invalid reference bundle header")]
    InvalidHeader,

    #[error("unsupported reference bundle version: {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("failed to CBOR-encode reference bundle: {0}")]
    Encode(String),

    #[error("failed to CBOR-decode reference bundle: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One row of the reaction-template membership matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRow {
    pub term: Term,
    pub formulas: Vec<Formula>,
}

/// Raw reference tables, as persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceBundle {
    /// chemical term -> synonyms (any case)
    pub synonyms: BTreeMap<Term, Vec<String>>,
    /// chemical term -> canonical formula
    pub formulas: BTreeMap<Term, Formula>,
    pub templates: Vec<TemplateRow>,
    /// reaction term -> chemical terms of its reactants and products
    #[serde(default)]
    pub template_components: BTreeMap<Term, Vec<Term>>,
    /// any Rhea term -> bidirectional master term
    #[serde(default)]
    pub rhea_to_master: BTreeMap<Term, Term>,
    /// kegg.reaction id -> master term
    #[serde(default)]
    pub kegg_to_master: BTreeMap<String, Term>,
    /// EC number -> master terms
    #[serde(default)]
    pub ec_to_master: BTreeMap<String, Vec<Term>>,
    #[serde(default)]
    pub labels: BTreeMap<Term, String>,
}

impl ReferenceBundle {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ReferenceError> {
        let mut out = Vec::new();
        out.extend_from_slice(BUNDLE_MAGIC);
        out.extend_from_slice(&BUNDLE_VERSION.to_le_bytes());
        ciborium::ser::into_writer(self, &mut out)
            .map_err(|e| ReferenceError::Encode(e.to_string()))?;
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ReferenceError> {
        if bytes.len() < 8 || &bytes[0..4] != BUNDLE_MAGIC {
            return Err(ReferenceError::InvalidHeader);
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&bytes[4..8]);
        let version = u32::from_le_bytes(version);
        if version != BUNDLE_VERSION {
            return Err(ReferenceError::UnsupportedVersion {
                found: version,
                expected: BUNDLE_VERSION,
            });
        }
        ciborium::de::from_reader(&bytes[8..]).map_err(|e| ReferenceError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ReferenceBundle {
        let mut bundle = ReferenceBundle::default();
        bundle.synonyms.insert(
            Term::new("CHEBI:15422"),
            vec!["ATP".to_string(), "adenosine 5'-triphosphate".to_string()],
        );
        bundle
            .formulas
            .insert(Term::new("CHEBI:15422"), Formula::new("C10N5O13P3"));
        bundle.templates.push(TemplateRow {
            term: Term::new("RHEA:10000"),
            formulas: vec![Formula::new("C10N5O13P3")],
        });
        bundle
    }

    #[test]
    fn bytes_carry_header() {
        let bytes = sample().to_bytes().unwrap();
        assert_eq!(&bytes[0..4], BUNDLE_MAGIC);
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 1);
        assert_eq!(ReferenceBundle::from_bytes(&bytes).unwrap(), sample());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            ReferenceBundle::from_bytes(&bytes),
            Err(ReferenceError::InvalidHeader)
        ));
        assert!(matches!(
            ReferenceBundle::from_bytes(b"AN"),
            Err(ReferenceError::InvalidHeader)
        ));
    }

    #[test]
    fn rejects_future_version() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[4..8].copy_from_slice(&7u32.to_le_bytes());
        match ReferenceBundle::from_bytes(&bytes) {
            Err(ReferenceError::UnsupportedVersion { found, expected }) => {
                assert_eq!(found, 7);
                assert_eq!(expected, BUNDLE_VERSION);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn rejects_truncated_body() {
        let bytes = sample().to_bytes().unwrap();
        let cut = &bytes[..bytes.len() - 3];
        assert!(matches!(
            ReferenceBundle::from_bytes(cut),
            Err(ReferenceError::Decode(_))
        ));
    }
}
