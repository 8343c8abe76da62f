use std::collections::BTreeSet;

/// Set whose edits are staged during a tick and applied at one commit point.
///
/// Readers always see the committed contents. Staging an add cancels a
/// staged remove of the same value and vice versa, so the last edit wins.
#[derive(Debug, Clone)]
pub struct StagedSet<T: Ord> {
    committed: BTreeSet<T>,
    adds: BTreeSet<T>,
    removes: BTreeSet<T>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed<T> {
    pub added: Vec<T>,
    pub removed: Vec<T>,
}

impl<T> Committed<T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl<T: Ord> Default for StagedSet<T> {
    fn default() -> Self {
        Self {
            committed: BTreeSet::new(),
            adds: BTreeSet::new(),
            removes: BTreeSet::new(),
        }
    }
}

impl<T: Ord + Clone> StagedSet<T> {
    pub fn stage_add(&mut self, value: T) {
        self.removes.remove(&value);
        self.adds.insert(value);
    }

    pub fn stage_remove(&mut self, value: T) {
        self.adds.remove(&value);
        self.removes.insert(value);
    }

    #[cfg(test)]
    pub fn has_staged(&self) -> bool {
        !self.adds.is_empty() || !self.removes.is_empty()
    }

    /// Apply staged edits. Only values that actually changed membership are
    /// reported.
    pub fn commit(&mut self) -> Committed<T> {
        let mut change = Committed {
            added: Vec::new(),
            removed: Vec::new(),
        };
        for value in std::mem::take(&mut self.removes) {
            if self.committed.remove(&value) {
                change.removed.push(value);
            }
        }
        for value in std::mem::take(&mut self.adds) {
            if self.committed.insert(value.clone()) {
                change.added.push(value);
            }
        }
        change
    }

    /// Drop committed and staged contents immediately.
    pub fn clear(&mut self) {
        self.committed.clear();
        self.adds.clear();
        self.removes.clear();
    }

    pub fn contains(&self, value: &T) -> bool {
        self.committed.contains(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.committed.iter()
    }

    pub fn len(&self) -> usize {
        self.committed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.committed.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_edits_invisible_until_commit() {
        let mut set = StagedSet::default();
        set.stage_add("a");
        assert!(!set.contains(&"a"));
        let change = set.commit();
        assert!(set.contains(&"a"));
        assert_eq!(change.added, vec!["a"]);
    }

    #[test]
    fn last_edit_wins() {
        let mut set = StagedSet::default();
        set.stage_add(1);
        set.commit();
        set.stage_remove(1);
        set.stage_add(1);
        let change = set.commit();
        assert!(set.contains(&1));
        assert!(change.is_empty(), "re-adding a member is not a change");
    }

    #[test]
    fn removing_absent_value_reports_nothing() {
        let mut set: StagedSet<u32> = StagedSet::default();
        set.stage_remove(7);
        assert!(set.has_staged());
        assert!(set.commit().is_empty());
        assert!(!set.has_staged());
    }
}
