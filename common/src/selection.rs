use crate::{
    catalog::CATALOG_LEN,
    store::{KeyValueStore, StoreError, SELECTION_KEY, SELECTION_RECORD_SIZE},
};

/// Maximum number of extra timezones shown next to the home zone.
pub const SELECTION_CAP: usize = 2;

const _: () = assert!(CATALOG_LEN <= SELECTION_RECORD_SIZE);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Selected,
    Unselected,
    Rejected,
}

/// The set of selected catalog entries plus its persisted copy.
///
/// The cap is enforced in [`SelectionStore::toggle`] only. A persisted record
/// that already exceeds it is loaded as-is.
pub struct SelectionStore<S> {
    backend: S,
    selected: [bool; CATALOG_LEN],
    count: usize,
    dirty: bool,
    touched: [bool; CATALOG_LEN],
}

impl<S: KeyValueStore> SelectionStore<S> {
    pub fn new(backend: S) -> Self {
        Self {
            backend,
            selected: [false; CATALOG_LEN],
            count: 0,
            dirty: false,
            touched: [false; CATALOG_LEN],
        }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut S {
        &mut self.backend
    }

    /// Replaces the in-memory set with the persisted record and returns the count.
    pub fn load(&mut self) -> Result<usize, StoreError> {
        let mut record = [0_u8; SELECTION_RECORD_SIZE];
        let len = self
            .backend
            .read_record(SELECTION_KEY, &mut record)?
            .unwrap_or(0);

        for (index, slot) in self.selected.iter_mut().enumerate() {
            *slot = index < len && record[index] == 1;
        }
        self.count = self.selected.iter().filter(|selected| **selected).count();
        self.dirty = false;
        self.touched = [false; CATALOG_LEN];
        Ok(self.count)
    }

    pub fn toggle(&mut self, index: usize) -> ToggleOutcome {
        let Some(selected) = self.selected.get_mut(index) else {
            return ToggleOutcome::Rejected;
        };

        let outcome = if *selected {
            *selected = false;
            self.count -= 1;
            ToggleOutcome::Unselected
        } else if self.count < SELECTION_CAP {
            *selected = true;
            self.count += 1;
            ToggleOutcome::Selected
        } else {
            return ToggleOutcome::Rejected;
        };

        self.dirty = true;
        self.touched[index] = true;
        outcome
    }

    /// Writes the full record. Returns `false` when nothing changed since the
    /// last load or save and the write was skipped.
    pub fn save(&mut self) -> Result<bool, StoreError> {
        if !self.dirty {
            return Ok(false);
        }

        let mut record = [0_u8; SELECTION_RECORD_SIZE];
        for (byte, selected) in record.iter_mut().zip(self.selected.iter()) {
            *byte = u8::from(*selected);
        }
        self.backend.write_record(SELECTION_KEY, &record)?;
        self.dirty = false;
        Ok(true)
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.get(index).copied().unwrap_or(false)
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn selected_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.selected
            .iter()
            .enumerate()
            .filter(|(_, selected)| **selected)
            .map(|(index, _)| index)
    }

    /// Entries shown on the clock screen: the first `SELECTION_CAP` in catalog order.
    pub fn display_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.selected_indices().take(SELECTION_CAP)
    }

    /// Indices toggled since this was last called (or loaded). An entry turned
    /// off and on again still counts.
    pub fn take_changed(&mut self) -> Vec<usize> {
        let changed = self
            .touched
            .iter()
            .enumerate()
            .filter(|(_, touched)| **touched)
            .map(|(index, _)| index)
            .collect();
        self.touched = [false; CATALOG_LEN];
        changed
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::store::MemoryStore;

    fn record_with(indices: &[usize]) -> Vec<u8> {
        let mut record = vec![0_u8; SELECTION_RECORD_SIZE];
        for index in indices {
            record[*index] = 1;
        }
        record
    }

    #[test]
    fn missing_record_loads_empty() {
        let mut store = SelectionStore::new(MemoryStore::new());
        assert_eq!(store.load().unwrap(), 0);
        assert_eq!(store.selected_indices().count(), 0);
    }

    #[test]
    fn erased_bytes_are_not_selected() {
        let backend =
            MemoryStore::new().with_record(SELECTION_KEY, &[0xFF; SELECTION_RECORD_SIZE]);
        let mut store = SelectionStore::new(backend);

        assert_eq!(store.load().unwrap(), 0);
    }

    #[test]
    fn toggle_is_its_own_inverse_below_cap() {
        let mut store = SelectionStore::new(MemoryStore::new());

        for index in 0..CATALOG_LEN {
            let before = store.is_selected(index);
            store.toggle(index);
            store.toggle(index);
            assert_eq!(store.is_selected(index), before);
            assert_eq!(store.count(), 0);
        }
    }

    #[test]
    fn cap_holds_for_any_toggle_sequence() {
        let mut store = SelectionStore::new(MemoryStore::new());
        let sequence = [0, 1, 2, 3, 1, 4, 5, 0, 9, 9, 8, 7, 2, 6, 3, 3, 1, 0];

        for index in sequence {
            store.toggle(index);
            assert!(store.count() <= SELECTION_CAP);
            assert_eq!(store.count(), store.selected_indices().count());
        }
    }

    #[test]
    fn third_selection_is_rejected() {
        let mut store = SelectionStore::new(MemoryStore::new());

        assert_eq!(store.toggle(0), ToggleOutcome::Selected);
        assert_eq!(store.toggle(4), ToggleOutcome::Selected);
        assert_eq!(store.toggle(7), ToggleOutcome::Rejected);
        assert!(!store.is_selected(7));
        assert_eq!(store.toggle(0), ToggleOutcome::Unselected);
        assert_eq!(store.toggle(7), ToggleOutcome::Selected);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mut store = SelectionStore::new(MemoryStore::new());
        assert_eq!(store.toggle(CATALOG_LEN), ToggleOutcome::Rejected);
        assert!(!store.is_dirty());
    }

    #[test]
    fn stale_record_over_cap_is_tolerated() {
        let backend = MemoryStore::new().with_record(SELECTION_KEY, &record_with(&[1, 3, 8]));
        let mut store = SelectionStore::new(backend);

        assert_eq!(store.load().unwrap(), 3);
        assert_eq!(store.toggle(0), ToggleOutcome::Rejected);
        assert_eq!(store.count(), 3);
        assert_eq!(store.display_indices().collect::<Vec<_>>(), vec![1, 3]);

        assert_eq!(store.toggle(3), ToggleOutcome::Unselected);
        assert_eq!(store.toggle(0), ToggleOutcome::Rejected);
        assert_eq!(store.toggle(8), ToggleOutcome::Unselected);
        assert_eq!(store.toggle(0), ToggleOutcome::Selected);
    }

    #[test]
    fn save_writes_full_record_once() {
        let mut store = SelectionStore::new(MemoryStore::new());
        store.toggle(2);
        store.toggle(9);

        assert!(store.save().unwrap());
        assert!(!store.save().unwrap());
        assert_eq!(store.backend().writes(), 1);
        assert_eq!(
            store.backend().record(SELECTION_KEY),
            Some(record_with(&[2, 9]).as_slice())
        );
    }

    #[test]
    fn saved_selection_round_trips_through_load() {
        let mut store = SelectionStore::new(MemoryStore::new());
        store.toggle(5);
        store.save().unwrap();

        let backend = store.backend().clone();
        let mut reloaded = SelectionStore::new(backend);
        assert_eq!(reloaded.load().unwrap(), 1);
        assert!(reloaded.is_selected(5));
    }

    #[test]
    fn take_changed_reports_every_toggled_entry() {
        let mut store = SelectionStore::new(MemoryStore::new());
        store.toggle(1);
        store.toggle(2);
        store.toggle(2);
        store.toggle(3);
        assert_eq!(store.toggle(4), ToggleOutcome::Rejected);

        assert_eq!(store.take_changed(), vec![1, 2, 3]);
        assert!(store.take_changed().is_empty());
    }
}
