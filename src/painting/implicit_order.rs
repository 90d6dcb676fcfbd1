//! Implicit canvas and choice order assignment
//!
//! Rows flagged `implicit_order` get their `canvas_order` by walking the
//! submitted sequence: a new canvas starts whenever the canvas identity
//! changes from the previous row, otherwise the row joins the previous
//! canvas as another Choice member. Explicit values are never changed; the
//! walk resumes after them. Collisions between explicit and implicit values
//! are left in place for the validators to report.

use std::collections::BTreeMap;

use tracing::debug;

use super::interim::InterimCanvasPainting;
use super::model::CanvasPlacement;

/// Identity used to decide whether consecutive rows share a canvas
#[derive(Debug, Clone, PartialEq, Eq)]
enum CanvasKey {
    Known(String),
    /// No canvas identity: never shared with any other row
    Anonymous(usize),
}

impl CanvasKey {
    fn of(row: &InterimCanvasPainting, index: usize) -> Self {
        match row.canvas_identity() {
            Some(identity) => CanvasKey::Known(identity.to_string()),
            None => CanvasKey::Anonymous(index),
        }
    }
}

/// Assign `canvas_order` and `choice_order` to every implicitly ordered row.
///
/// `choice_order` is only filled for implicit rows that share their canvas
/// with a sibling of the same canvas identity. A sole row keeps `None`.
pub fn assign_implicit_order(rows: &mut [InterimCanvasPainting]) {
    let mut next_free = 0;
    let mut previous: Option<(CanvasKey, i32)> = None;

    for (index, row) in rows.iter_mut().enumerate() {
        let key = CanvasKey::of(row, index);

        if row.implicit_order {
            row.painting.canvas_order = match &previous {
                Some((previous_key, previous_order)) if *previous_key == key => *previous_order,
                _ => next_free,
            };
        }

        let order = row.painting.canvas_order;
        next_free = next_free.max(order + 1);
        previous = Some((key, order));
    }

    assign_choice_orders(rows);
}

fn assign_choice_orders(rows: &mut [InterimCanvasPainting]) {
    let mut groups: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
    for (index, row) in rows.iter().enumerate() {
        groups.entry(row.painting.canvas_order).or_default().push(index);
    }

    for (canvas_order, members) in groups {
        if members.len() < 2 {
            continue;
        }

        // Only a group that really is one canvas is a Choice
        let identity = rows[members[0]].canvas_identity();
        let shared = identity.is_some()
            && members
                .iter()
                .all(|&i| rows[i].canvas_identity() == identity);
        if !shared {
            continue;
        }

        let mut next_choice = members
            .iter()
            .filter_map(|&i| rows[i].painting.choice_order)
            .max()
            .unwrap_or(0)
            + 1;

        for &i in &members {
            let row = &mut rows[i];
            if row.implicit_order && row.painting.choice_order.is_none() {
                row.painting.choice_order = Some(next_choice);
                next_choice += 1;
            }
        }

        debug!(canvas_order, members = members.len(), "Assigned implicit choice orders");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::painting::interim::Provenance;
    use crate::painting::model::CanvasPainting;

    fn implicit(canvas: Option<&str>) -> InterimCanvasPainting {
        let mut row = InterimCanvasPainting::new(
            CanvasPainting {
                manifest_id: "m1".into(),
                customer_id: 1,
                canvas_id: canvas.map(str::to_string),
                ..Default::default()
            },
            Provenance::PaintedResource,
        );
        row.implicit_order = true;
        row
    }

    fn explicit(canvas: Option<&str>, canvas_order: i32, choice_order: Option<i32>) -> InterimCanvasPainting {
        let mut row = implicit(canvas);
        row.implicit_order = false;
        row.painting.canvas_order = canvas_order;
        row.painting.choice_order = choice_order;
        row
    }

    fn orders(rows: &[InterimCanvasPainting]) -> Vec<(i32, Option<i32>)> {
        rows.iter()
            .map(|r| (r.painting.canvas_order, r.painting.choice_order))
            .collect()
    }

    #[test]
    fn test_shared_canvas_becomes_choice() {
        let mut rows = vec![implicit(Some("c1")), implicit(Some("c1")), implicit(Some("c2"))];
        assign_implicit_order(&mut rows);
        assert_eq!(orders(&rows), vec![(0, Some(1)), (0, Some(2)), (1, None)]);
    }

    #[test]
    fn test_distinct_canvases_count_up() {
        let mut rows = vec![implicit(Some("a")), implicit(Some("b")), implicit(Some("c"))];
        assign_implicit_order(&mut rows);
        assert_eq!(orders(&rows), vec![(0, None), (1, None), (2, None)]);
    }

    #[test]
    fn test_rows_without_identity_never_share() {
        let mut rows = vec![implicit(None), implicit(None)];
        assign_implicit_order(&mut rows);
        assert_eq!(orders(&rows), vec![(0, None), (1, None)]);
    }

    #[test]
    fn test_walk_resumes_after_explicit_value() {
        let mut rows = vec![implicit(Some("a")), explicit(Some("b"), 5, None), implicit(Some("c"))];
        assign_implicit_order(&mut rows);
        assert_eq!(orders(&rows), vec![(0, None), (5, None), (6, None)]);
    }

    #[test]
    fn test_implicit_joins_explicit_choice() {
        let mut rows = vec![explicit(Some("a"), 3, Some(1)), implicit(Some("a"))];
        assign_implicit_order(&mut rows);
        assert_eq!(orders(&rows), vec![(3, Some(1)), (3, Some(2))]);
    }

    #[test]
    fn test_collision_is_left_for_validation() {
        let mut rows = vec![implicit(Some("a")), explicit(Some("b"), 0, None)];
        assign_implicit_order(&mut rows);
        assert_eq!(orders(&rows), vec![(0, None), (0, None)]);
    }

    #[test]
    fn test_explicit_values_are_never_changed() {
        let mut rows = vec![explicit(Some("a"), 2, None), explicit(Some("a"), 2, Some(4))];
        assign_implicit_order(&mut rows);
        assert_eq!(orders(&rows), vec![(2, None), (2, Some(4))]);
    }
}
