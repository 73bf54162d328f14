// ==========================================
// Hierarchy Recon - Conflict handler
// ==========================================
// Duplicate hierarchy_id policy: first occurrence wins, repeats are skipped;
// ids already persisted in the project are skipped without mutation.
// ==========================================

use crate::importer::hierarchy_importer_trait::ConflictHandler as ConflictHandlerTrait;
use std::collections::{HashMap, HashSet};

pub struct ConflictHandler;

impl ConflictHandlerTrait for ConflictHandler {
    /// # Returns
    /// - Vec<(row_number, hierarchy_id)>: repeats, first occurrence excluded
    fn detect_duplicates(&self, keys: &[(usize, String)]) -> Vec<(usize, String)> {
        let mut first_occurrence: HashMap<&str, usize> = HashMap::new();
        let mut duplicates = Vec::new();

        for (row_number, hierarchy_id) in keys {
            if first_occurrence.contains_key(hierarchy_id.as_str()) {
                duplicates.push((*row_number, hierarchy_id.clone()));
            } else {
                first_occurrence.insert(hierarchy_id.as_str(), *row_number);
            }
        }

        duplicates
    }

    fn detect_existing(
        &self,
        keys: &[(usize, String)],
        existing_ids: &HashSet<String>,
    ) -> Vec<(usize, String)> {
        keys.iter()
            .filter(|(_, id)| existing_ids.contains(id))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(ids: &[&str]) -> Vec<(usize, String)> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| (i + 1, id.to_string()))
            .collect()
    }

    #[test]
    fn test_detect_duplicates_keeps_first() {
        let handler = ConflictHandler;
        let dups = handler.detect_duplicates(&keys(&["A", "B", "A", "A"]));
        assert_eq!(dups, vec![(3, "A".to_string()), (4, "A".to_string())]);
    }

    #[test]
    fn test_detect_existing() {
        let handler = ConflictHandler;
        let existing: HashSet<String> = ["B".to_string()].into_iter().collect();
        let hits = handler.detect_existing(&keys(&["A", "B"]), &existing);
        assert_eq!(hits, vec![(2, "B".to_string())]);
    }

    #[test]
    fn test_no_conflicts() {
        let handler = ConflictHandler;
        assert!(handler.detect_duplicates(&keys(&["A", "B"])).is_empty());
        assert!(handler
            .detect_existing(&keys(&["A"]), &HashSet::new())
            .is_empty());
    }
}
