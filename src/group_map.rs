use crate::position::Position;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Location of one group's sections in a dataset file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupEntry {
    pub name: String,
    pub contig: String,
    /// Number of examples in the group
    pub size: u64,
    pub start: Position,
    pub end: Position,
    pub positions_offset: u64,
    pub labels_offset: Option<u64>,
    pub examples_offset: u64,
}

/// Group table: entries in write order plus a name lookup
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct GroupMap {
    entries: Vec<GroupEntry>,
    by_name: FxHashMap<String, usize>,
}

impl GroupMap {
    /// Create a new empty group map
    pub fn new() -> Self {
        Self::default()
    }

    /// `<contig>_<start>-<end>`, suffixed with `.N` if the name is taken
    pub fn unique_name(&self, contig: &str, start: &Position, end: &Position) -> String {
        let base = format!("{}_{}-{}", contig, start.reference, end.reference);
        if !self.by_name.contains_key(&base) {
            return base;
        }
        (1..)
            .map(|n| format!("{base}.{n}"))
            .find(|name| !self.by_name.contains_key(name))
            .unwrap_or(base)
    }

    /// Add an entry; its name must not be in use
    pub fn add_entry(&mut self, entry: GroupEntry) -> bool {
        if self.by_name.contains_key(&entry.name) {
            return false;
        }
        self.by_name.insert(entry.name.clone(), self.entries.len());
        self.entries.push(entry);
        true
    }

    /// Get a group by name
    pub fn get(&self, name: &str) -> Option<&GroupEntry> {
        self.by_name.get(name).map(|&i| &self.entries[i])
    }

    /// Entries in write order
    pub fn entries(&self) -> &[GroupEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of examples over all groups
    pub fn total_examples(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> GroupEntry {
        GroupEntry {
            name: name.to_string(),
            contig: "chr1".to_string(),
            size: 2,
            start: Position::new(0, 0),
            end: Position::new(99, 0),
            positions_offset: 16,
            labels_offset: None,
            examples_offset: 64,
        }
    }

    #[test]
    fn test_names_are_suffixed_only_on_collision() {
        let mut map = GroupMap::new();
        let (start, end) = (Position::new(0, 0), Position::new(99, 0));

        let name = map.unique_name("chr1", &start, &end);
        assert_eq!(name, "chr1_0-99");
        assert!(map.add_entry(entry(&name)));
        assert!(!map.add_entry(entry(&name)));

        let name = map.unique_name("chr1", &start, &end);
        assert_eq!(name, "chr1_0-99.1");
        assert!(map.add_entry(entry(&name)));
        assert_eq!(map.unique_name("chr1", &start, &end), "chr1_0-99.2");

        assert_eq!(map.len(), 2);
        assert_eq!(map.total_examples(), 4);
        assert_eq!(map.get("chr1_0-99.1").map(|e| e.size), Some(2));
    }
}
