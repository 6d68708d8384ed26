//! Fluent construction of reference tables, mostly for tests and small
//! curated references.
//!
//! Reactions declared with [`ReferenceBuilder::reaction`] get their template
//! row derived from the formulas of their components; explicit rows added with
//! [`ReferenceBuilder::template_row`] are merged into that.

use std::collections::BTreeSet;

use crate::bundle::{ReferenceBundle, TemplateRow};
use crate::{Formula, ReferenceData, Term};

#[derive(Debug, Clone, Default)]
pub struct ReferenceBuilder {
    bundle: ReferenceBundle,
}

impl ReferenceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chemical(
        mut self,
        term: &str,
        synonyms: &[&str],
        formula: Option<&str>,
        label: &str,
    ) -> Self {
        let term = Term::new(term);
        let entry = self.bundle.synonyms.entry(term.clone()).or_default();
        entry.extend(synonyms.iter().map(|s| s.to_string()));
        if let Some(formula) = formula {
            self.bundle.formulas.insert(term.clone(), Formula::new(formula));
        }
        if !label.is_empty() {
            self.bundle.labels.insert(term, label.to_string());
        }
        self
    }

    pub fn reaction(mut self, term: &str, components: &[&str], label: &str) -> Self {
        let term = Term::new(term);
        let entry = self
            .bundle
            .template_components
            .entry(term.clone())
            .or_default();
        entry.extend(components.iter().map(|c| Term::new(*c)));
        if !label.is_empty() {
            self.bundle.labels.insert(term, label.to_string());
        }
        self
    }

    pub fn template_row(mut self, term: &str, formulas: &[&str]) -> Self {
        self.bundle.templates.push(TemplateRow {
            term: Term::new(term),
            formulas: formulas.iter().map(|f| Formula::new(*f)).collect(),
        });
        self
    }

    pub fn rhea_alias(mut self, rhea: &str, master: &str) -> Self {
        self.bundle
            .rhea_to_master
            .insert(Term::new(rhea), Term::new(master));
        self
    }

    pub fn kegg_alias(mut self, kegg: &str, master: &str) -> Self {
        self.bundle
            .kegg_to_master
            .insert(kegg.to_string(), Term::new(master));
        self
    }

    pub fn ec_alias(mut self, ec: &str, masters: &[&str]) -> Self {
        self.bundle
            .ec_to_master
            .entry(ec.to_string())
            .or_default()
            .extend(masters.iter().map(|m| Term::new(*m)));
        self
    }

    pub fn into_bundle(self) -> ReferenceBundle {
        let mut bundle = self.bundle;
        let mut derived = Vec::with_capacity(bundle.template_components.len());
        for (term, components) in &bundle.template_components {
            let formulas: BTreeSet<Formula> = components
                .iter()
                .filter_map(|c| bundle.formulas.get(c).cloned())
                .collect();
            derived.push(TemplateRow {
                term: term.clone(),
                formulas: formulas.into_iter().collect(),
            });
        }
        bundle.templates.extend(derived);
        bundle
    }

    pub fn build(self) -> ReferenceData {
        ReferenceData::from_bundle(self.into_bundle())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_rows_merge_with_derived_ones() {
        let data = ReferenceBuilder::new()
            .chemical("CHEBI:1", &["one"], Some("A"), "")
            .reaction("RHEA:1", &["CHEBI:1"], "")
            .template_row("RHEA:1", &["B"])
            .template_row("RHEA:2", &["A", "B", "B"])
            .build();
        assert_eq!(data.template_size("RHEA:1"), Some(2));
        assert_eq!(data.template_size("RHEA:2"), Some(2));
        // explicit-only templates have no components
        assert!(data.template_components("RHEA:2").is_empty());
        assert_eq!(data.label_of("RHEA:1"), None);
    }

    #[test]
    fn aliases_accumulate() {
        let bundle = ReferenceBuilder::new()
            .ec_alias("1.1.1.1", &["RHEA:1"])
            .ec_alias("1.1.1.1", &["RHEA:2"])
            .into_bundle();
        assert_eq!(bundle.ec_to_master["1.1.1.1"].len(), 2);
    }
}
