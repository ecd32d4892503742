//! First-expired-first-out ordering over batch snapshots.

use std::cmp::Ordering;

use crate::models::batch::{Batch, StorageClass};

/// Total consumption order: batches with an expiry come first (earliest first), then
/// older entries, then id so that equal dates still order deterministically.
pub fn fifo_cmp(a: &Batch, b: &Batch) -> Ordering {
    match (a.expiry_date, b.expiry_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.entry_date.cmp(&b.entry_date))
    .then_with(|| a.id.cmp(&b.id))
}

/// Active batches of `ingredient`, optionally restricted to one storage class, in
/// consumption order.
pub fn fifo_order<'a>(
    batches: &'a [Batch],
    ingredient: &str,
    storage: Option<StorageClass>,
) -> Vec<&'a Batch> {
    fifo_order_matching(batches, Some(ingredient), storage)
}

/// Like [`fifo_order`], with both filters optional.
pub fn fifo_order_matching<'a>(
    batches: &'a [Batch],
    ingredient: Option<&str>,
    storage: Option<StorageClass>,
) -> Vec<&'a Batch> {
    let mut ordered: Vec<&Batch> = batches
        .iter()
        .filter(|b| b.active)
        .filter(|b| ingredient.map_or(true, |name| b.ingredient_name == name))
        .filter(|b| storage.map_or(true, |s| b.storage == s))
        .collect();
    ordered.sort_by(|a, b| fifo_cmp(a, b));
    ordered
}

/// Every active batch in consumption order.
pub fn fifo_order_all(batches: &[Batch]) -> Vec<&Batch> {
    let mut ordered: Vec<&Batch> = batches.iter().filter(|b| b.active).collect();
    ordered.sort_by(|a, b| fifo_cmp(a, b));
    ordered
}
