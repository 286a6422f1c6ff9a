use crate::{
    catalog::{self, CATALOG_LEN},
    screen::{MenuRow, MenuView},
    selection::{SelectionStore, ToggleOutcome, SELECTION_CAP},
    store::{KeyValueStore, StoreError},
};

pub const MENU_WINDOW: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuCursor {
    index: usize,
    window_size: usize,
}

impl MenuCursor {
    pub fn new(window_size: usize) -> Self {
        Self {
            index: 0,
            window_size: window_size.max(1),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn window_start(&self) -> usize {
        self.index - (self.index % self.window_size)
    }
}

/// Timezone picker. Exists only while the configuration sub-mode is open.
#[derive(Debug)]
pub struct MenuController {
    cursor: MenuCursor,
}

impl Default for MenuController {
    fn default() -> Self {
        Self::enter()
    }
}

impl MenuController {
    pub fn enter() -> Self {
        Self {
            cursor: MenuCursor::new(MENU_WINDOW),
        }
    }

    pub fn cursor(&self) -> MenuCursor {
        self.cursor
    }

    pub fn advance(&mut self) {
        self.cursor.index = (self.cursor.index + 1) % CATALOG_LEN;
    }

    pub fn select<S: KeyValueStore>(&self, store: &mut SelectionStore<S>) -> ToggleOutcome {
        store.toggle(self.cursor.index)
    }

    /// Closes the menu and flushes the selection. The cursor is dropped either way;
    /// on failure the selection stays dirty for the next exit.
    pub fn exit<S: KeyValueStore>(self, store: &mut SelectionStore<S>) -> Result<bool, StoreError> {
        store.save()
    }

    pub fn view<S: KeyValueStore>(&self, store: &SelectionStore<S>) -> MenuView {
        let start = self.cursor.window_start();
        let rows = (start..(start + self.cursor.window_size).min(CATALOG_LEN))
            .filter_map(|index| {
                catalog::entry(index).map(|entry| MenuRow {
                    abbreviation: entry.abbreviation,
                    name: entry.short_name(),
                    selected: store.is_selected(index),
                    highlighted: index == self.cursor.index,
                })
            })
            .collect();

        MenuView {
            title: "SELECT TIMEZONES",
            rows,
            selected_count: store.count(),
            cap: SELECTION_CAP,
            hints: "BTN1:Next BTN2:Select Hold:Exit",
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::store::{MemoryStore, SELECTION_KEY};

    #[test]
    fn window_start_snaps_to_page() {
        let mut menu = MenuController::enter();
        let mut starts = Vec::new();
        for _ in 0..CATALOG_LEN {
            starts.push(menu.cursor().window_start());
            menu.advance();
        }

        assert_eq!(starts, vec![0, 0, 0, 3, 3, 3, 6, 6, 6, 9]);
    }

    #[test]
    fn advance_wraps_at_catalog_end() {
        let mut menu = MenuController::enter();
        for _ in 0..CATALOG_LEN {
            menu.advance();
        }
        assert_eq!(menu.cursor().index(), 0);
    }

    #[test]
    fn last_window_is_partial() {
        let store = SelectionStore::new(MemoryStore::new());
        let mut menu = MenuController::enter();
        for _ in 0..9 {
            menu.advance();
        }

        let view = menu.view(&store);
        assert_eq!(view.rows.len(), 1);
        assert!(view.rows[0].highlighted);
        assert_eq!(view.rows[0].abbreviation, "MOW");
    }

    #[test]
    fn select_toggles_entry_under_cursor() {
        let mut store = SelectionStore::new(MemoryStore::new());
        let mut menu = MenuController::enter();
        menu.advance();

        assert_eq!(menu.select(&mut store), ToggleOutcome::Selected);
        let view = menu.view(&store);

        assert_eq!(view.selected_count, 1);
        assert_eq!(
            view.rows
                .iter()
                .map(|row| (row.abbreviation, row.selected, row.highlighted))
                .collect::<Vec<_>>(),
            vec![("NYC", false, false), ("LON", true, true), ("TYO", false, false)]
        );
    }

    #[test]
    fn exit_persists_selection() {
        let mut store = SelectionStore::new(MemoryStore::new());
        let menu = MenuController::enter();
        menu.select(&mut store);

        assert!(menu.exit(&mut store).unwrap());
        assert_eq!(store.backend().record(SELECTION_KEY).map(|r| r[0]), Some(1));
    }

    #[test]
    fn exit_without_changes_skips_write() {
        let mut store = SelectionStore::new(MemoryStore::new());
        let menu = MenuController::enter();

        assert!(!menu.exit(&mut store).unwrap());
        assert_eq!(store.backend().writes(), 0);
    }
}
