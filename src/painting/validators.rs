//! Ordering conflict checks
//!
//! Every check runs and every failure is collected. The same ordering checks
//! run over submitted descriptors and again over the merged rows; the
//! descriptor checks only apply to client input.

use std::collections::{BTreeMap, BTreeSet};

use super::interim::InterimCanvasPainting;
use super::model::{CanvasPainting, CanvasPlacement};
use crate::error::ValidationFailure;

pub const SHARED_ORDER_MESSAGE: &str = "Canvases that share canvasOrder must have same canvasId";
pub const CHOICE_COMPLETENESS_MESSAGE: &str =
    "Detected conflicting implicit and explicit 'canvasOrder' values";
pub const ZERO_CHOICE_MESSAGE: &str = "Canvases cannot have a 'choiceOrder' of 0";
pub const DUPLICATE_CHOICE_MESSAGE: &str = "'choiceOrder' cannot be a duplicate within a 'canvasOrder'";
pub const PARTIAL_STATIC_SIZE_MESSAGE: &str =
    "'staticWidth' and 'staticHeight' must both be set or both be absent";

type Check<T> = fn(&[T]) -> Vec<ValidationFailure>;

/// Run the ordering checks shared by both validation passes
pub fn validate_ordering<T: CanvasPlacement>(rows: &[T]) -> Vec<ValidationFailure> {
    let checks: [Check<T>; 2] = [shared_order_same_canvas::<T>, choice_completeness::<T>];
    checks.iter().flat_map(|check| check(rows)).collect()
}

/// Rows carrying client-specified static dimensions
pub trait StaticSize {
    fn static_size(&self) -> (Option<i32>, Option<i32>);
}

impl StaticSize for CanvasPainting {
    fn static_size(&self) -> (Option<i32>, Option<i32>) {
        (self.static_width, self.static_height)
    }
}

impl StaticSize for InterimCanvasPainting {
    fn static_size(&self) -> (Option<i32>, Option<i32>) {
        self.painting.static_size()
    }
}

/// Run the ordering checks plus the client descriptor checks
pub fn validate_descriptors<T: CanvasPlacement + StaticSize>(rows: &[T]) -> Vec<ValidationFailure> {
    let checks: [Check<T>; 3] = [
        no_zero_choice_order::<T>,
        unique_choice_order::<T>,
        static_size_pairs::<T>,
    ];
    let mut failures = validate_ordering(rows);
    failures.extend(checks.iter().flat_map(|check| check(rows)));
    failures
}

fn groups<T: CanvasPlacement>(rows: &[T]) -> BTreeMap<i32, Vec<&T>> {
    let mut groups: BTreeMap<i32, Vec<&T>> = BTreeMap::new();
    for row in rows {
        groups.entry(row.canvas_order()).or_default().push(row);
    }
    groups
}

/// Every group sharing a `canvas_order` references one canvas
pub fn shared_order_same_canvas<T: CanvasPlacement>(rows: &[T]) -> Vec<ValidationFailure> {
    groups(rows)
        .into_iter()
        .filter(|(_, members)| {
            let identities: BTreeSet<Option<&str>> =
                members.iter().map(|m| m.canvas_identity()).collect();
            identities.len() > 1
        })
        .map(|(canvas_order, _)| {
            ValidationFailure::new(format!("canvasOrder {}", canvas_order), SHARED_ORDER_MESSAGE)
        })
        .collect()
}

/// A group with more than one member is a Choice, so all members need a `choice_order`
pub fn choice_completeness<T: CanvasPlacement>(rows: &[T]) -> Vec<ValidationFailure> {
    groups(rows)
        .into_iter()
        .filter(|(_, members)| members.len() > 1 && members.iter().any(|m| m.choice_order().is_none()))
        .map(|(canvas_order, _)| {
            ValidationFailure::new(
                format!("canvasOrder {}", canvas_order),
                CHOICE_COMPLETENESS_MESSAGE,
            )
        })
        .collect()
}

fn no_zero_choice_order<T: CanvasPlacement>(rows: &[T]) -> Vec<ValidationFailure> {
    rows.iter()
        .filter(|row| row.choice_order() == Some(0))
        .map(|row| ValidationFailure::new(row.location(), ZERO_CHOICE_MESSAGE))
        .collect()
}

fn unique_choice_order<T: CanvasPlacement>(rows: &[T]) -> Vec<ValidationFailure> {
    let mut seen = BTreeSet::new();
    let mut reported = BTreeSet::new();
    let mut failures = Vec::new();

    for row in rows {
        let Some(choice_order) = row.choice_order() else {
            continue;
        };
        let key = (row.canvas_order(), choice_order);
        if !seen.insert(key) && reported.insert(key) {
            failures.push(ValidationFailure::new(row.location(), DUPLICATE_CHOICE_MESSAGE));
        }
    }
    failures
}

fn static_size_pairs<T: CanvasPlacement + StaticSize>(rows: &[T]) -> Vec<ValidationFailure> {
    rows.iter()
        .filter(|row| {
            let (width, height) = row.static_size();
            width.is_some() != height.is_some()
        })
        .map(|row| ValidationFailure::new(row.location(), PARTIAL_STATIC_SIZE_MESSAGE))
        .collect()
}
