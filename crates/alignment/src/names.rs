//! Band name de-duplication.

use std::collections::{HashMap, HashSet};

/// Make `names` unique while keeping order.
///
/// The first occurrence of a name is kept; later duplicates receive the
/// smallest suffix `.k` (k >= 1) that collides with no name in the list and
/// no suffix handed out before. Already unique lists come back unchanged.
pub fn make_unique<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut used: HashSet<String> = names.iter().map(|n| n.as_ref().to_string()).collect();
    let mut kept: HashSet<&str> = HashSet::with_capacity(names.len());
    let mut next_suffix: HashMap<&str, usize> = HashMap::new();

    names
        .iter()
        .map(|n| {
            let name = n.as_ref();
            if kept.insert(name) {
                return name.to_string();
            }

            let k = next_suffix.entry(name).or_insert(1);
            loop {
                let candidate = format!("{}.{}", name, k);
                *k += 1;
                if used.insert(candidate.clone()) {
                    return candidate;
                }
            }
        })
        .collect()
}
