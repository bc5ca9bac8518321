// Mapping coverage validation for generated documents
use std::collections::BTreeSet;

use crate::domain::mapping::PointMapping;
use crate::domain::placeholder;
use crate::domain::report::ValidationReport;
use crate::domain::template::DashboardDocument;

/// Cross-check the keys a template declares against the mapping table.
///
/// Only keys missing from the mapping count as errors; unused mapping entries
/// are informational. Nothing here stops an upload.
pub fn validate(
    document: &DashboardDocument,
    mapping: &PointMapping,
    template_declared_keys: &BTreeSet<String>,
) -> ValidationReport {
    let missing_in_mapping: BTreeSet<String> = template_declared_keys
        .iter()
        .filter(|key| !mapping.contains(key))
        .cloned()
        .collect();

    let unused_in_template: BTreeSet<String> = mapping
        .keys()
        .filter(|key| !template_declared_keys.contains(*key))
        .map(str::to_string)
        .collect();

    let unresolved: BTreeSet<String> = document
        .model
        .strings()
        .into_iter()
        .filter(|s| placeholder::has_placeholder(s))
        .collect();

    ValidationReport {
        has_errors: !missing_in_mapping.is_empty(),
        missing_in_mapping,
        unused_in_template,
        unresolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::instantiator::tests::{mapping, site_template};
    use crate::application::instantiator::{Instantiator, Scope};
    use chrono::Utc;

    fn keys(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|k| k.to_string()).collect()
    }

    fn site_document(mapping: &PointMapping) -> DashboardDocument {
        let scope = Scope {
            campus: "PNNL",
            building: "ROB",
            device: None,
            mapping,
            generated_at: Utc::now(),
        };
        Instantiator::default()
            .instantiate(&site_template(), &scope)
            .unwrap()
            .document
    }

    #[test]
    fn test_unused_keys_are_informational() {
        let mapping = mapping(&[("a", "A"), ("b", "B"), ("c", "C")]);
        let document = site_document(&mapping);

        let report = validate(&document, &mapping, &keys(&["a", "b"]));
        assert_eq!(report.unused_in_template, keys(&["c"]));
        assert!(report.missing_in_mapping.is_empty());
        assert!(!report.has_errors);
    }

    #[test]
    fn test_missing_keys_are_errors() {
        let mapping = mapping(&[("a", "A")]);
        let document = site_document(&mapping);
        let declared = site_template().referenced_keys().unwrap();

        let report = validate(&document, &mapping, &declared);
        assert_eq!(report.missing_in_mapping, keys(&["zone_temperature"]));
        assert_eq!(report.unused_in_template, keys(&["a"]));
        assert!(report.has_errors);
        assert!(report.unresolved.is_empty());
    }
}
