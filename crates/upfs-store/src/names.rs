//! Name resolution: unique display names for every item of an index.
//!
//! Items are visited oldest first. The first item with a given raw name keeps
//! it; later ones get ` (1)`, ` (2)`, ... inserted before the extension.
//!
//! Display names are single path components: `/` and NUL become `_`, and a
//! blank, `.` or `..` name falls back to the item's ID.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::index::Index;
use crate::item::Item;

/// Unique display name → item, in resolution order
#[derive(Debug, Clone, Default)]
pub struct NameMapping {
    entries: Vec<(String, Arc<Item>)>,
    by_name: HashMap<String, usize>,
}

impl NameMapping {
    pub fn get(&self, name: &str) -> Option<&Arc<Item>> {
        self.by_name.get(name).map(|&i| &self.entries[i].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries oldest first; the order is stable for a given index
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<Item>)> {
        self.entries.iter().map(|(name, item)| (name.as_str(), item))
    }

    fn push(&mut self, name: String, item: Arc<Item>) {
        self.by_name.insert(name.clone(), self.entries.len());
        self.entries.push((name, item));
    }
}

/// Assign every item of `index` a unique display name.
///
/// Deterministic for the same index content: ties in modification time are
/// ordered by ID.
pub fn resolve(index: &Index) -> NameMapping {
    let mut items: Vec<&Arc<Item>> = index.items().collect();
    items.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.id.cmp(&b.id)));

    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut taken: HashSet<String> = HashSet::with_capacity(items.len());
    let mut mapping = NameMapping::default();

    for item in items {
        let base = component(item);
        let count = counts.entry(base.clone()).or_insert(0);

        let mut name = if *count == 0 {
            base.clone()
        } else {
            suffixed(&base, *count)
        };
        // A suffixed name may already exist as somebody's raw name
        while taken.contains(&name) {
            *count += 1;
            name = suffixed(&base, *count);
        }
        *count += 1;

        taken.insert(name.clone());
        mapping.push(name, Arc::clone(item));
    }

    mapping
}

/// The item's name as a usable path component
fn component(item: &Item) -> String {
    if matches!(item.name.as_str(), "" | "." | "..") {
        return item.id.clone();
    }
    item.name.replace(['/', '\0'], "_")
}

/// `"<stem> (<n>)<ext>"`, splitting at the last `.`
fn suffixed(name: &str, n: usize) -> String {
    let (stem, ext) = match name.rfind('.') {
        Some(dot) => name.split_at(dot),
        None => (name, ""),
    };
    format!("{stem} ({n}){ext}")
}
