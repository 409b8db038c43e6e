use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;

/// A row of a persisted dataset, identified by a unique key.
pub trait DatasetRecord: Clone {
    type Key: Eq + Hash + Clone;

    fn key(&self) -> Self::Key;
}

/// Combine `old` and `new` rows by key.
///
/// A new row replaces the old row with the same key entirely, rows only present
/// in `old` are kept. The result keeps the order of `old`, rows with a new key
/// are appended in arrival order. Within one input the last occurrence of a key
/// wins, so the result never holds two rows with the same key.
pub fn upsert<T: DatasetRecord>(old: Vec<T>, new: Vec<T>) -> Vec<T> {
    let mut rows: Vec<T> = Vec::with_capacity(old.len() + new.len());
    let mut positions: HashMap<T::Key, usize> = HashMap::new();
    for row in old.into_iter().chain(new) {
        match positions.entry(row.key()) {
            Entry::Occupied(slot) => rows[*slot.get()] = row,
            Entry::Vacant(slot) => {
                slot.insert(rows.len());
                rows.push(row);
            }
        }
    }
    rows
}
