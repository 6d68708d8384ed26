//! Reference tables for ChEBI/Rhea annotation recommendation.
//!
//! [`ReferenceData`] is a read-only value object built once (from a persisted
//! [`ReferenceBundle`] or with [`ReferenceBuilder`]) and then shared, usually
//! behind an `Arc`, by every matcher. It holds:
//!
//! - chemical synonyms (lowercased) and their character profiles,
//! - the chemical term -> canonical formula map,
//! - the reaction-template membership matrix, one Roaring bitmap per template
//!   over interned formula ids,
//! - template components (reaction term -> chemical terms),
//! - cross references from alternate reaction namespaces to master terms,
//! - display labels.
//!
//! Every lookup is total: a term missing from a table is "no evidence"
//! (`None` or an empty collection), never an error.

pub mod builder;
pub mod bundle;
pub mod profile;

use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use ahash::AHashMap;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

pub use builder::ReferenceBuilder;
pub use bundle::{ReferenceBundle, ReferenceError, TemplateRow, BUNDLE_MAGIC, BUNDLE_VERSION};
pub use profile::{char_profile, CharProfile, CHAR_VOCAB, PROFILE_DIM};

pub const CHEBI_PREFIX: &str = "CHEBI:";
pub const RHEA_PREFIX: &str = "RHEA:";
pub const EC_PREFIX: &str = "EC:";
pub const CHEBI_DEFAULT_URL: &str = "https://www.ebi.ac.uk/chebi/searchId.do?chebiId=CHEBI%3A";
pub const RHEA_DEFAULT_URL: &str = "https://www.rhea-db.org/rhea/";

// ============================================================================
// Identifiers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Chebi,
    Rhea,
    Other,
}

/// Opaque ontology identifier (`CHEBI:15422`, `RHEA:12420`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Term(String);

impl Term {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn namespace(&self) -> Namespace {
        if self.0.starts_with(CHEBI_PREFIX) {
            Namespace::Chebi
        } else if self.0.starts_with(RHEA_PREFIX) {
            Namespace::Rhea
        } else {
            Namespace::Other
        }
    }

    /// Deep link for the term, if its namespace has one.
    pub fn url(&self) -> Option<String> {
        if let Some(local) = self.0.strip_prefix(CHEBI_PREFIX) {
            return Some(format!("{CHEBI_DEFAULT_URL}{local}"));
        }
        self.0
            .strip_prefix(RHEA_PREFIX)
            .map(|local| format!("{RHEA_DEFAULT_URL}{local}"))
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Term {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Term {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Term {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Canonical structural signature shared by terms denoting the same molecule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Formula(String);

impl Formula {
    pub fn new(formula: impl Into<String>) -> Self {
        Self(formula.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Formula {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Formula {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// Reaction templates
// ============================================================================

/// A reference reaction: its master term and the set of formula ids it involves.
#[derive(Debug, Clone, PartialEq)]
pub struct ReactionTemplate {
    pub term: Term,
    pub formulas: RoaringBitmap,
}

impl ReactionTemplate {
    pub fn size(&self) -> u64 {
        self.formulas.len()
    }

    /// Number of this template's formulas present in `query`.
    pub fn overlap(&self, query: &RoaringBitmap) -> u64 {
        self.formulas.intersection_len(query)
    }
}

// ============================================================================
// ReferenceData
// ============================================================================

#[derive(Debug, Clone)]
pub struct ReferenceData {
    /// Sorted by term.
    synonyms: Vec<(Term, Vec<String>)>,
    /// Parallel to `synonyms`: distinct profiles per term.
    profiles: Vec<Vec<CharProfile>>,
    synonym_index: AHashMap<Term, usize>,

    formulas: AHashMap<Term, Formula>,
    formula_ids: AHashMap<Formula, u32>,
    formula_names: Vec<Formula>,

    /// Sorted by term.
    templates: Vec<ReactionTemplate>,
    template_index: AHashMap<Term, usize>,
    template_components: AHashMap<Term, Vec<Term>>,

    rhea_to_master: AHashMap<Term, Term>,
    kegg_to_master: AHashMap<String, Term>,
    ec_to_master: AHashMap<String, Vec<Term>>,

    labels: AHashMap<Term, String>,
}

impl ReferenceData {
    pub fn builder() -> ReferenceBuilder {
        ReferenceBuilder::default()
    }

    pub fn from_bundle(bundle: ReferenceBundle) -> Self {
        let ReferenceBundle {
            synonyms: raw_synonyms,
            formulas: raw_formulas,
            templates: raw_templates,
            template_components: raw_components,
            rhea_to_master,
            kegg_to_master,
            ec_to_master,
            labels,
        } = bundle;

        let mut synonyms = Vec::with_capacity(raw_synonyms.len());
        let mut profiles = Vec::with_capacity(raw_synonyms.len());
        let mut synonym_index = AHashMap::with_capacity(raw_synonyms.len());
        for (term, names) in raw_synonyms {
            let lowered: BTreeSet<String> = names
                .iter()
                .map(|s| s.to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
            if lowered.is_empty() {
                continue;
            }
            let mut rows: Vec<CharProfile> = Vec::new();
            for name in &lowered {
                let profile = CharProfile::from_text(name);
                if !rows.contains(&profile) {
                    rows.push(profile);
                }
            }
            synonym_index.insert(term.clone(), synonyms.len());
            synonyms.push((term, lowered.into_iter().collect()));
            profiles.push(rows);
        }

        let mut interner = FormulaInterner::default();
        for formula in raw_formulas.values() {
            interner.intern(formula);
        }

        // Duplicate template rows merge into one.
        let mut rows: BTreeMap<Term, RoaringBitmap> = BTreeMap::new();
        for row in raw_templates {
            let bitmap = rows.entry(row.term).or_default();
            for formula in &row.formulas {
                bitmap.insert(interner.intern(formula));
            }
        }
        let templates: Vec<ReactionTemplate> = rows
            .into_iter()
            .map(|(term, formulas)| ReactionTemplate { term, formulas })
            .collect();
        let template_index = templates
            .iter()
            .enumerate()
            .map(|(i, t)| (t.term.clone(), i))
            .collect();

        let template_components = raw_components
            .into_iter()
            .map(|(term, mut comps)| {
                comps.sort();
                comps.dedup();
                (term, comps)
            })
            .collect();

        Self {
            synonyms,
            profiles,
            synonym_index,
            formulas: raw_formulas.into_iter().collect(),
            formula_ids: interner.ids,
            formula_names: interner.names,
            templates,
            template_index,
            template_components,
            rhea_to_master: rhea_to_master.into_iter().collect(),
            kegg_to_master: kegg_to_master.into_iter().collect(),
            ec_to_master: ec_to_master.into_iter().collect(),
            labels: labels.into_iter().collect(),
        }
    }

    /// Rebuild the persisted form of these tables.
    pub fn to_bundle(&self) -> ReferenceBundle {
        let templates = self
            .templates
            .iter()
            .map(|t| TemplateRow {
                term: t.term.clone(),
                formulas: t
                    .formulas
                    .iter()
                    .filter_map(|id| self.formula_name(id).cloned())
                    .collect(),
            })
            .collect();
        ReferenceBundle {
            synonyms: self.synonyms.iter().cloned().collect(),
            formulas: self
                .formulas
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            templates,
            template_components: self
                .template_components
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            rhea_to_master: self
                .rhea_to_master
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            kegg_to_master: self
                .kegg_to_master
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            ec_to_master: self
                .ec_to_master
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            labels: self
                .labels
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ReferenceError> {
        let bundle = ReferenceBundle::from_bytes(bytes)?;
        let data = Self::from_bundle(bundle);
        tracing::debug!(
            chemicals = data.synonyms.len(),
            formulas = data.formula_names.len(),
            templates = data.templates.len(),
            "loaded reference bundle"
        );
        Ok(data)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ReferenceError> {
        self.to_bundle().to_bytes()
    }

    pub fn load(path: &Path) -> Result<Self, ReferenceError> {
        let bytes = std::fs::read(path)?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "reading reference bundle");
        Self::from_bytes(&bytes)
    }

    pub fn save(&self, path: &Path) -> Result<(), ReferenceError> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Chemical tables
    // ------------------------------------------------------------------------

    /// Chemical terms with at least one synonym, in term order.
    pub fn chemical_terms(&self) -> impl Iterator<Item = &Term> {
        self.synonyms.iter().map(|(t, _)| t)
    }

    /// `(term, lowercase synonyms)` rows, in term order.
    pub fn synonym_rows(&self) -> &[(Term, Vec<String>)] {
        &self.synonyms
    }

    /// Character profiles, parallel to [`Self::synonym_rows`].
    pub fn profile_rows(&self) -> &[Vec<CharProfile>] {
        &self.profiles
    }

    pub fn synonyms_of(&self, term: &str) -> &[String] {
        self.synonym_index
            .get(term)
            .map(|&i| self.synonyms[i].1.as_slice())
            .unwrap_or(&[])
    }

    pub fn formula_of(&self, term: &str) -> Option<&Formula> {
        self.formulas.get(term)
    }

    /// Deduplicated formulas of `terms`; terms without a formula are dropped.
    pub fn formulas_of<'a, I>(&self, terms: I) -> BTreeSet<Formula>
    where
        I: IntoIterator<Item = &'a Term>,
    {
        terms
            .into_iter()
            .filter_map(|t| self.formula_of(t.as_str()).cloned())
            .collect()
    }

    pub fn label_of(&self, term: &str) -> Option<&str> {
        self.labels.get(term).map(|s| s.as_str())
    }

    // ------------------------------------------------------------------------
    // Formula interning
    // ------------------------------------------------------------------------

    pub fn formula_count(&self) -> usize {
        self.formula_names.len()
    }

    pub fn formula_id(&self, formula: &str) -> Option<u32> {
        self.formula_ids.get(formula).copied()
    }

    pub fn formula_name(&self, id: u32) -> Option<&Formula> {
        self.formula_names.get(id as usize)
    }

    /// Indicator column of a query: ids of the known formulas in `formulas`.
    pub fn formula_bitmap<'a, I>(&self, formulas: I) -> RoaringBitmap
    where
        I: IntoIterator<Item = &'a Formula>,
    {
        formulas
            .into_iter()
            .filter_map(|f| self.formula_id(f.as_str()))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Reaction templates
    // ------------------------------------------------------------------------

    /// All templates, in term order (rows of the membership matrix).
    pub fn templates(&self) -> &[ReactionTemplate] {
        &self.templates
    }

    pub fn template(&self, term: &str) -> Option<&ReactionTemplate> {
        self.template_index.get(term).map(|&i| &self.templates[i])
    }

    pub fn template_size(&self, term: &str) -> Option<u64> {
        self.template(term).map(ReactionTemplate::size)
    }

    pub fn template_components(&self, term: &str) -> &[Term] {
        self.template_components
            .get(term)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// `formula -> chemical term` over the template's components.
    ///
    /// Components without a formula are excluded. When several components
    /// share a formula the smallest term is kept.
    pub fn template_formula_map(&self, term: &str) -> BTreeMap<Formula, Term> {
        let mut out = BTreeMap::new();
        for chem in self.template_components(term) {
            if let Some(formula) = self.formula_of(chem.as_str()) {
                out.entry(formula.clone()).or_insert_with(|| chem.clone());
            }
        }
        out
    }

    // ------------------------------------------------------------------------
    // Cross references
    // ------------------------------------------------------------------------

    /// Master term for a Rhea id (`"RHEA:10003"` or `"10003"`).
    pub fn to_master_reaction_term(&self, rhea: &str) -> Option<&Term> {
        let key = if rhea.starts_with(RHEA_PREFIX) {
            rhea.to_string()
        } else {
            format!("{RHEA_PREFIX}{rhea}")
        };
        if let Some(master) = self.rhea_to_master.get(key.as_str()) {
            return Some(master);
        }
        self.template(&key).map(|t| &t.term)
    }

    pub fn kegg_to_master(&self, kegg: &str) -> Option<&Term> {
        self.kegg_to_master.get(kegg)
    }

    /// Master terms for an EC number (`"EC:2.7.3.2"` or `"2.7.3.2"`).
    pub fn ec_to_master(&self, ec: &str) -> &[Term] {
        let key = ec.strip_prefix(EC_PREFIX).unwrap_or(ec);
        self.ec_to_master
            .get(key)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Merge reaction annotations arriving via Rhea, KEGG and EC into master terms.
    pub fn merge_reaction_annotations(
        &self,
        rhea: &[String],
        kegg: &[String],
        ec: &[String],
    ) -> BTreeSet<Term> {
        let mut out = BTreeSet::new();
        for id in rhea {
            if let Some(master) = self.to_master_reaction_term(id) {
                out.insert(master.clone());
            }
        }
        for id in kegg {
            if let Some(master) = self.kegg_to_master(id) {
                out.insert(master.clone());
            }
        }
        for id in ec {
            out.extend(self.ec_to_master(id).iter().cloned());
        }
        out
    }
}

#[derive(Debug, Default)]
struct FormulaInterner {
    ids: AHashMap<Formula, u32>,
    names: Vec<Formula>,
}

impl FormulaInterner {
    fn intern(&mut self, formula: &Formula) -> u32 {
        if let Some(&id) = self.ids.get(formula) {
            return id;
        }
        let id = self.names.len() as u32;
        self.ids.insert(formula.clone(), id);
        self.names.push(formula.clone());
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> ReferenceData {
        ReferenceData::builder()
            .chemical("CHEBI:30616", &["ATP", "ATP(4-)"], Some("C10N5O13P3"), "ATP(4-)")
            .chemical("CHEBI:456216", &["ADP", "ADP(3-)"], Some("C10N5O10P2"), "ADP(3-)")
            .chemical("CHEBI:15378", &["H+", "hydron"], Some("H"), "hydron")
            .chemical("CHEBI:24636", &["proton"], Some("H"), "proton")
            .chemical("CHEBI:99999", &["mystery"], None, "mystery")
            .reaction(
                "RHEA:12420",
                &["CHEBI:30616", "CHEBI:456216", "CHEBI:15378", "CHEBI:24636"],
                "kinase",
            )
            .reaction("RHEA:99990", &["CHEBI:99999"], "no formulas")
            .rhea_alias("RHEA:12421", "RHEA:12420")
            .kegg_alias("R00001", "RHEA:12420")
            .ec_alias("2.7.1.11", &["RHEA:12420", "RHEA:99990"])
            .build()
    }

    #[test]
    fn term_urls_follow_namespace() {
        assert_eq!(
            Term::new("CHEBI:15414").url().as_deref(),
            Some("https://www.ebi.ac.uk/chebi/searchId.do?chebiId=CHEBI%3A15414")
        );
        assert_eq!(
            Term::new("RHEA:22964").url().as_deref(),
            Some("https://www.rhea-db.org/rhea/22964")
        );
        assert_eq!(Term::new("GO:0004111").url(), None);
        assert_eq!(Term::new("GO:0004111").namespace(), Namespace::Other);
    }

    #[test]
    fn synonyms_are_lowercased_and_deduplicated() {
        let data = ReferenceData::builder()
            .chemical("CHEBI:1", &["ATP", "atp", "", "Atp"], Some("X"), "x")
            .chemical("CHEBI:2", &[""], Some("Y"), "y")
            .build();
        assert_eq!(data.synonyms_of("CHEBI:1"), ["atp".to_string()]);
        assert_eq!(data.profile_rows()[0].len(), 1);
        // a term with only empty synonyms is not matchable
        assert!(data.synonyms_of("CHEBI:2").is_empty());
        assert_eq!(data.chemical_terms().count(), 1);
        // but still has its formula
        assert_eq!(data.formula_of("CHEBI:2").map(Formula::as_str), Some("Y"));
    }

    #[test]
    fn template_rows_derive_from_component_formulas() {
        let data = small();
        // H is shared by two components; ATP, ADP, H => 3
        assert_eq!(data.template_size("RHEA:12420"), Some(3));
        assert_eq!(data.template_size("RHEA:99990"), Some(0));
        assert_eq!(data.template_size("RHEA:0"), None);
        let names: Vec<&str> = data.templates().iter().map(|t| t.term.as_str()).collect();
        assert_eq!(names, ["RHEA:12420", "RHEA:99990"]);
    }

    #[test]
    fn template_formula_map_keeps_smallest_term_per_formula() {
        let data = small();
        let map = data.template_formula_map("RHEA:12420");
        assert_eq!(map.len(), 3);
        assert_eq!(map[&Formula::new("H")].as_str(), "CHEBI:15378");
        assert_eq!(map[&Formula::new("C10N5O13P3")].as_str(), "CHEBI:30616");
        assert!(data.template_formula_map("RHEA:99990").is_empty());
        assert!(data.template_formula_map("RHEA:unknown").is_empty());
    }

    #[test]
    fn formula_projection_drops_unmapped_terms() {
        let data = small();
        let terms = [
            Term::new("CHEBI:15378"),
            Term::new("CHEBI:24636"),
            Term::new("CHEBI:99999"),
            Term::new("CHEBI:404"),
        ];
        let formulas = data.formulas_of(terms.iter());
        assert_eq!(formulas.into_iter().collect::<Vec<_>>(), [Formula::new("H")]);
    }

    #[test]
    fn formula_bitmap_skips_unknown_formulas() {
        let data = small();
        let query = [Formula::new("H"), Formula::new("NOPE")];
        let bitmap = data.formula_bitmap(query.iter());
        assert_eq!(bitmap.len(), 1);
        let kinase = data.template("RHEA:12420").unwrap();
        assert_eq!(kinase.overlap(&bitmap), 1);
    }

    #[test]
    fn cross_references_resolve_to_master_terms() {
        let data = small();
        assert_eq!(
            data.to_master_reaction_term("12421").map(Term::as_str),
            Some("RHEA:12420")
        );
        assert_eq!(
            data.to_master_reaction_term("RHEA:12420").map(Term::as_str),
            Some("RHEA:12420")
        );
        assert_eq!(data.to_master_reaction_term("RHEA:5"), None);
        assert_eq!(data.ec_to_master("EC:2.7.1.11").len(), 2);

        let merged = data.merge_reaction_annotations(
            &["12421".to_string()],
            &["R00001".to_string(), "R99999".to_string()],
            &["2.7.1.11".to_string()],
        );
        let merged: Vec<&str> = merged.iter().map(Term::as_str).collect();
        assert_eq!(merged, ["RHEA:12420", "RHEA:99990"]);
    }

    #[test]
    fn bundle_round_trip_preserves_tables() {
        let data = small();
        let bytes = data.to_bytes().unwrap();
        let back = ReferenceData::from_bytes(&bytes).unwrap();
        assert_eq!(back.to_bundle(), data.to_bundle());
        assert_eq!(back.template_size("RHEA:12420"), Some(3));
        assert_eq!(back.label_of("CHEBI:30616"), Some("ATP(4-)"));
    }

    #[test]
    fn save_and_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reference.anrf");
        small().save(&path).unwrap();
        let back = ReferenceData::load(&path).unwrap();
        assert_eq!(back.synonyms_of("CHEBI:15378"), ["h+", "hydron"]);
        assert!(matches!(
            ReferenceData::load(&dir.path().join("missing.anrf")),
            Err(ReferenceError::Io(_))
        ));
    }
}
