//! Set difference over key lists

use std::collections::HashSet;
use std::hash::Hash;

/// Elements of `current` absent from `previous`, in `current`'s order.
pub fn diff<T>(current: &[T], previous: &[T]) -> Vec<T>
where
    T: Eq + Hash + Clone,
{
    let seen: HashSet<&T> = previous.iter().collect();
    current
        .iter()
        .filter(|item| !seen.contains(item))
        .cloned()
        .collect()
}
