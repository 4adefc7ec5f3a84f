//! Canonical snapshot ordering used at serialization boundaries.

use crate::models::BoxEntry;

/// Reorders a snapshot into the canonical interchange sequence: all
/// negative-valued entries ascending by value (most negative first),
/// followed by all positive-valued entries ascending by value (smallest
/// magnitude first). Ties keep their relative engine order.
///
/// The ordering has no numerical meaning; it only guarantees that two
/// snapshots with the same entry multiset serialize identically no matter
/// how the engine ordered them internally.
#[must_use]
pub fn canonicalize(entries: &[BoxEntry]) -> Vec<BoxEntry> {
    let mut negatives: Vec<BoxEntry> = Vec::new();
    let mut positives: Vec<BoxEntry> = Vec::new();

    for &entry in entries {
        if entry.value.is_sign_negative() {
            negatives.push(entry);
        } else {
            positives.push(entry);
        }
    }

    negatives.sort_by(|a, b| a.value.cmp(&b.value));
    positives.sort_by(|a, b| a.value.cmp(&b.value));

    negatives.extend(positives);
    negatives
}
