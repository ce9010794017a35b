use alloc::boxed::Box;
use alloc::vec::Vec;
use core::ops::Range;

/// Items that know their own position in an [`OrderedDataStore`].
pub trait Indexed {
    fn index(&self) -> usize;
    fn set_index(&mut self, index: usize);
}

/// A structural change recorded by an [`OrderedDataStore`].
///
/// Consecutive appends and removals at the same position are merged into one entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StoreChange {
    Inserted { index: usize, count: usize },
    Removed { index: usize, count: usize },
    Cleared { count: usize },
}

impl StoreChange {
    /// `(inserted, removed)` item counts.
    pub fn counts(self) -> (usize, usize) {
        match self {
            StoreChange::Inserted { count, .. } => (count, 0),
            StoreChange::Removed { count, .. } | StoreChange::Cleared { count } => (0, count),
        }
    }
}

/// An ordered, indexed collection.
///
/// Invariant: `store[i].index() == i` after every mutation. Mutations re-index from the
/// mutation point onwards and append to a change journal the owner drains with
/// [`Self::take_changes`]. Equality compares items and template, not the journal.
#[derive(Clone, Debug)]
pub struct OrderedDataStore<T> {
    items: Vec<T>,
    template: Option<Box<T>>,
    changes: Vec<StoreChange>,
}

impl<T: PartialEq> PartialEq for OrderedDataStore<T> {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items && self.template == other.template
    }
}

impl<T> Default for OrderedDataStore<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            template: None,
            changes: Vec::new(),
        }
    }
}

impl<T: Indexed> OrderedDataStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(template: T) -> Self {
        Self {
            template: Some(Box::new(template)),
            ..Self::default()
        }
    }

    pub fn template(&self) -> Option<&T> {
        self.template.as_deref()
    }

    pub fn set_template(&mut self, template: Option<T>) {
        self.template = template.map(Box::new);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn last(&self) -> Option<&T> {
        self.items.last()
    }

    pub fn iter(&self) -> core::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> core::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn push(&mut self, mut item: T) -> usize {
        let index = self.items.len();
        item.set_index(index);
        self.items.push(item);
        self.journal(StoreChange::Inserted { index, count: 1 });
        index
    }

    /// Inserts at `index` (clamped to `len`) and re-indexes the tail.
    pub fn insert(&mut self, index: usize, item: T) -> usize {
        let index = index.min(self.items.len());
        self.items.insert(index, item);
        self.reindex_from(index);
        self.journal(StoreChange::Inserted { index, count: 1 });
        index
    }

    pub fn remove(&mut self, index: usize) -> Option<T> {
        if index >= self.items.len() {
            return None;
        }
        let item = self.items.remove(index);
        self.reindex_from(index);
        self.journal(StoreChange::Removed { index, count: 1 });
        Some(item)
    }

    /// Removes a contiguous range (clamped to `len`) and re-indexes the tail.
    pub fn remove_range(&mut self, range: Range<usize>) -> Vec<T> {
        let end = range.end.min(self.items.len());
        let start = range.start.min(end);
        let removed: Vec<T> = self.items.drain(start..end).collect();
        self.reindex_from(start);
        if !removed.is_empty() {
            self.journal(StoreChange::Removed {
                index: start,
                count: removed.len(),
            });
        }
        removed
    }

    /// Removes every item and hands them back (in order) so the caller can dispose them.
    pub fn clear(&mut self) -> Vec<T> {
        let count = self.items.len();
        let removed = core::mem::take(&mut self.items);
        if count > 0 {
            self.journal(StoreChange::Cleared { count });
        }
        removed
    }

    pub fn take_changes(&mut self) -> Vec<StoreChange> {
        core::mem::take(&mut self.changes)
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    fn journal(&mut self, change: StoreChange) {
        if let Some(last) = self.changes.last_mut() {
            match (last, change) {
                (
                    StoreChange::Inserted { index, count },
                    StoreChange::Inserted { index: at, count: n },
                ) if *index + *count == at => {
                    *count += n;
                    return;
                }
                (
                    StoreChange::Removed { index, count },
                    StoreChange::Removed { index: at, count: n },
                ) if *index == at => {
                    *count += n;
                    return;
                }
                _ => {}
            }
        }
        self.changes.push(change);
    }

    fn reindex_from(&mut self, from: usize) {
        for (i, item) in self.items.iter_mut().enumerate().skip(from) {
            item.set_index(i);
        }
    }
}

impl<T: Indexed + Clone + Default> OrderedDataStore<T> {
    /// Creates a detached item cloned from the template (or `Default`), not yet in the store.
    pub fn create(&self) -> T {
        self.template.as_deref().cloned().unwrap_or_default()
    }
}

/// Collecting builds a fresh store; construction is not journaled.
impl<T: Indexed> FromIterator<T> for OrderedDataStore<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut items: Vec<T> = iter.into_iter().collect();
        for (i, item) in items.iter_mut().enumerate() {
            item.set_index(i);
        }
        Self {
            items,
            ..Self::default()
        }
    }
}

impl<'a, T> IntoIterator for &'a OrderedDataStore<T> {
    type Item = &'a T;
    type IntoIter = core::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T> core::ops::Index<usize> for OrderedDataStore<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.items[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Row {
        index: usize,
        tag: &'static str,
    }

    impl Indexed for Row {
        fn index(&self) -> usize {
            self.index
        }
        fn set_index(&mut self, index: usize) {
            self.index = index;
        }
    }

    fn row(tag: &'static str) -> Row {
        Row {
            index: usize::MAX,
            tag,
        }
    }

    fn assert_indexed(store: &OrderedDataStore<Row>) {
        for (i, r) in store.iter().enumerate() {
            assert_eq!(r.index, i);
        }
    }

    #[test]
    fn insert_in_the_middle_reindexes_tail() {
        let mut s = OrderedDataStore::new();
        s.push(row("a"));
        s.push(row("c"));
        s.insert(1, row("b"));
        assert_indexed(&s);
        let tags: Vec<_> = s.iter().map(|r| r.tag).collect();
        assert_eq!(tags, ["a", "b", "c"]);
    }

    #[test]
    fn remove_range_reindexes_and_journals() {
        let mut s = OrderedDataStore::new();
        for tag in ["a", "b", "c", "d"] {
            s.push(row(tag));
        }
        s.take_changes();

        let removed = s.remove_range(0..2);
        assert_eq!(removed.len(), 2);
        assert_indexed(&s);
        assert_eq!(s[0].tag, "c");
        assert_eq!(
            s.take_changes(),
            vec![StoreChange::Removed { index: 0, count: 2 }]
        );
        assert!(!s.has_changes());
    }

    #[test]
    fn out_of_bounds_operations_are_clamped() {
        let mut s = OrderedDataStore::new();
        s.push(row("a"));
        assert!(s.remove(5).is_none());
        assert_eq!(s.insert(99, row("z")), 1);
        assert!(s.remove_range(3..10).is_empty());
        assert_indexed(&s);
    }

    #[test]
    fn create_clones_the_template() {
        let s = OrderedDataStore::with_template(row("tpl"));
        let a = s.create();
        assert_eq!(a.tag, "tpl");
        assert!(s.is_empty());
    }

    #[test]
    fn clear_hands_back_items() {
        let mut s = OrderedDataStore::new();
        s.push(row("a"));
        s.push(row("b"));
        let items = s.clear();
        assert_eq!(items.len(), 2);
        assert!(s.is_empty());
        assert!(s.take_changes().contains(&StoreChange::Cleared { count: 2 }));
    }

    #[test]
    fn journal_merges_runs_of_appends_and_removals() {
        let mut s = OrderedDataStore::new();
        for tag in ["a", "b", "c"] {
            s.push(row(tag));
        }
        s.insert(0, row("z"));
        s.remove(1);
        s.remove(1);
        assert_eq!(
            s.take_changes(),
            vec![
                StoreChange::Inserted { index: 0, count: 3 },
                StoreChange::Inserted { index: 0, count: 1 },
                StoreChange::Removed { index: 1, count: 2 },
            ]
        );
        let totals = [
            StoreChange::Inserted { index: 0, count: 3 },
            StoreChange::Cleared { count: 4 },
        ]
        .map(StoreChange::counts);
        assert_eq!(totals, [(3, 0), (0, 4)]);
    }

    #[test]
    fn collected_stores_are_indexed_without_a_journal() {
        let s: OrderedDataStore<Row> = ["a", "b"].into_iter().map(row).collect();
        assert_indexed(&s);
        assert!(!s.has_changes());
        assert_eq!(s, {
            let mut other = OrderedDataStore::new();
            other.push(Row { index: 0, tag: "a" });
            other.push(Row { index: 1, tag: "b" });
            other
        });
    }
}
