// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

/// PARTITION QoS policy: logical separation within a topic.
///
/// An empty name set means the default partition. Endpoints match when
/// their partition sets overlap; a mismatch silently prevents the match
/// (it is not an incompatible-QoS condition).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Partition {
    pub names: Vec<String>,
}

impl Partition {
    #[must_use]
    pub fn new(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    #[must_use]
    pub fn is_default(&self) -> bool {
        self.names.is_empty()
    }

    /// Whether two partition sets share at least one partition.
    /// Both empty (default partition) also overlaps.
    #[must_use]
    pub fn overlaps(&self, other: &Partition) -> bool {
        if self.is_default() && other.is_default() {
            return true;
        }
        self.names.iter().any(|n| other.names.contains(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_partitions_overlap() {
        assert!(Partition::default().overlaps(&Partition::default()));
    }

    #[test]
    fn test_named_overlap() {
        let a = Partition::new(&["sensors", "control"]);
        let b = Partition::new(&["control"]);
        let c = Partition::new(&["logging"]);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_default_does_not_overlap_named() {
        let named = Partition::new(&["sensors"]);
        assert!(!Partition::default().overlaps(&named));
        assert!(!named.overlaps(&Partition::default()));
    }
}
