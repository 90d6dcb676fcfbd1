//! Insert/update/delete partition of merged rows against prior rows

use std::collections::HashSet;

use super::model::CanvasPainting;

/// Row-level changes needed to turn the prior set into the merged set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanvasPaintingChangeset {
    /// Rows without a row id
    pub insert: Vec<CanvasPainting>,
    /// Matched rows whose content changed
    pub update: Vec<CanvasPainting>,
    /// Prior rows nothing matched
    pub delete: Vec<CanvasPainting>,
    /// Matched rows with identical content
    pub unchanged: usize,
}

impl CanvasPaintingChangeset {
    pub fn is_empty(&self) -> bool {
        self.insert.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }
}

/// Partition `merged` against `prior` using the row ids carried by the merge
pub fn diff(prior: &[CanvasPainting], merged: &[CanvasPainting]) -> CanvasPaintingChangeset {
    let mut changes = CanvasPaintingChangeset::default();
    let mut kept = HashSet::new();

    for row in merged {
        let Some(id) = row.canvas_painting_id else {
            changes.insert.push(row.clone());
            continue;
        };
        kept.insert(id);

        match prior.iter().find(|p| p.canvas_painting_id == Some(id)) {
            Some(existing) if existing == row => changes.unchanged += 1,
            Some(existing) => {
                let mut updated = existing.clone();
                updated.update_from(row);
                changes.update.push(updated);
            }
            // Row id unknown to this Manifest: store it as new
            None => {
                let mut inserted = row.clone();
                inserted.canvas_painting_id = None;
                changes.insert.push(inserted);
            }
        }
    }

    changes.delete = prior
        .iter()
        .filter(|p| p.canvas_painting_id.map_or(true, |id| !kept.contains(&id)))
        .cloned()
        .collect();

    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: Option<i32>, canvas: &str, canvas_order: i32) -> CanvasPainting {
        CanvasPainting {
            canvas_painting_id: id,
            manifest_id: "m1".into(),
            customer_id: 1,
            canvas_id: Some(canvas.into()),
            canvas_order,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_desired_deletes_everything() {
        let prior = vec![row(Some(1), "c1", 0)];
        let changes = diff(&prior, &[]);
        assert!(changes.insert.is_empty());
        assert!(changes.update.is_empty());
        assert_eq!(changes.delete, prior);
    }

    #[test]
    fn test_partition() {
        let prior = vec![row(Some(1), "c1", 0), row(Some(2), "c2", 1), row(Some(3), "c3", 2)];
        let merged = vec![row(Some(1), "c1", 0), row(Some(2), "c2", 5), row(None, "c4", 6)];

        let changes = diff(&prior, &merged);
        assert_eq!(changes.unchanged, 1);
        assert_eq!(changes.update.len(), 1);
        assert_eq!(changes.update[0].canvas_painting_id, Some(2));
        assert_eq!(changes.update[0].canvas_order, 5);
        assert_eq!(changes.insert.len(), 1);
        assert_eq!(changes.insert[0].canvas_id.as_deref(), Some("c4"));
        assert_eq!(changes.delete.len(), 1);
        assert_eq!(changes.delete[0].canvas_painting_id, Some(3));
    }

    #[test]
    fn test_identical_sets_produce_no_changes() {
        let prior = vec![row(Some(1), "c1", 0), row(Some(2), "c2", 1)];
        let changes = diff(&prior, &prior);
        assert!(changes.is_empty());
        assert_eq!(changes.unchanged, 2);
    }
}
