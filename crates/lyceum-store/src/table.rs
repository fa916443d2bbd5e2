use std::collections::{BTreeMap, VecDeque};

use tracing::trace;

use crate::error::StoreError;

/// A row stored in a [`Table`].
///
/// Rows are plain cloneable values; the table assigns the id at creation and
/// the row must carry it back unchanged.
pub trait StoreObject: Clone {
    /// Table name for diagnostics and errors.
    const TYPE_NAME: &'static str;

    fn id(&self) -> u64;
}

/// Prior state of every row touched while one undo level was open.
///
/// First write wins: once a row's pre-level value is recorded, later writes
/// in the same level never overwrite it. `None` means the row did not exist
/// when the level opened (it was created inside the level).
struct UndoLevel<T> {
    prior: BTreeMap<u64, Option<T>>,
    prior_next_id: u64,
}

/// A typed, versioned table of rows with store-assigned monotonically
/// increasing ids and a stack of copy-on-write undo levels.
///
/// Levels nest: `begin_level` opens a child, `undo_level` discards the
/// child's changes in O(changes), `squash_level` merges the child's change
/// log into its parent, and `commit_oldest` makes the bottom level permanent
/// (irreversibility). Mutations while no level is open are permanent
/// immediately; chain genesis runs in that mode.
///
/// Level lifecycles are coordinated across all tables by the state aggregate
/// that owns them; a lone table never opens levels on its own.
pub struct Table<T: StoreObject> {
    rows: BTreeMap<u64, T>,
    next_id: u64,
    levels: VecDeque<UndoLevel<T>>,
}

impl<T: StoreObject> Default for Table<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: StoreObject> Table<T> {
    pub fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 0,
            levels: VecDeque::new(),
        }
    }

    // ------------------------------------------------------------------
    // Row access
    // ------------------------------------------------------------------

    /// Creates a row. `build` receives the assigned id and must store it in
    /// the returned row.
    pub fn create(&mut self, build: impl FnOnce(u64) -> T) -> &T {
        let id = self.next_id;
        let row = build(id);
        assert_eq!(
            row.id(),
            id,
            "{} row built with mismatched id",
            T::TYPE_NAME
        );
        self.record_prior(id);
        self.next_id += 1;
        self.rows.insert(id, row);
        self.rows.get(&id).expect("row inserted above")
    }

    pub fn get(&self, id: u64) -> Option<&T> {
        self.rows.get(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.rows.contains_key(&id)
    }

    /// Applies `mutate` to the row, recording its prior value first.
    pub fn modify(&mut self, id: u64, mutate: impl FnOnce(&mut T)) -> Result<(), StoreError> {
        if !self.rows.contains_key(&id) {
            return Err(StoreError::NotFound {
                type_name: T::TYPE_NAME,
                id,
            });
        }
        self.record_prior(id);
        let row = self.rows.get_mut(&id).expect("checked above");
        mutate(row);
        assert_eq!(row.id(), id, "{} row id mutated", T::TYPE_NAME);
        Ok(())
    }

    pub fn remove(&mut self, id: u64) -> Result<(), StoreError> {
        if !self.rows.contains_key(&id) {
            return Err(StoreError::NotFound {
                type_name: T::TYPE_NAME,
                id,
            });
        }
        self.record_prior(id);
        self.rows.remove(&id);
        Ok(())
    }

    /// Rows in ascending id order. Deterministic, which matters: reward
    /// distribution iterates tables and must visit rows in consensus order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    // ------------------------------------------------------------------
    // Undo levels
    // ------------------------------------------------------------------

    pub fn level_depth(&self) -> usize {
        self.levels.len()
    }

    /// Opens a nested undo level. O(1).
    pub fn begin_level(&mut self) {
        self.levels.push_back(UndoLevel {
            prior: BTreeMap::new(),
            prior_next_id: self.next_id,
        });
        trace!(table = T::TYPE_NAME, depth = self.levels.len(), "level opened");
    }

    /// Discards the newest level, restoring every touched row. O(changes).
    pub fn undo_level(&mut self) {
        let level = self
            .levels
            .pop_back()
            .unwrap_or_else(|| panic!("{}: undo with no open level", T::TYPE_NAME));
        trace!(
            table = T::TYPE_NAME,
            restored = level.prior.len(),
            "level undone"
        );
        for (id, prior) in level.prior {
            match prior {
                Some(row) => {
                    self.rows.insert(id, row);
                }
                None => {
                    self.rows.remove(&id);
                }
            }
        }
        self.next_id = level.prior_next_id;
    }

    /// Merges the newest level's change log into its parent. O(changes).
    pub fn squash_level(&mut self) {
        assert!(
            self.levels.len() >= 2,
            "{}: squash needs two open levels",
            T::TYPE_NAME
        );
        let child = self.levels.pop_back().expect("len checked");
        let parent = self.levels.back_mut().expect("len checked");
        for (id, prior) in child.prior {
            parent.prior.entry(id).or_insert(prior);
        }
    }

    /// Makes the oldest level permanent: its changes can no longer be undone.
    pub fn commit_oldest(&mut self) {
        assert!(
            !self.levels.is_empty(),
            "{}: commit with no open level",
            T::TYPE_NAME
        );
        self.levels.pop_front();
        trace!(
            table = T::TYPE_NAME,
            depth = self.levels.len(),
            "oldest level committed"
        );
    }

    fn record_prior(&mut self, id: u64) {
        if let Some(level) = self.levels.back_mut() {
            if !level.prior.contains_key(&id) {
                level.prior.insert(id, self.rows.get(&id).cloned());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq)]
    struct Row {
        id: u64,
        value: i64,
    }

    impl StoreObject for Row {
        const TYPE_NAME: &'static str = "row";

        fn id(&self) -> u64 {
            self.id
        }
    }

    fn table_with(values: &[i64]) -> Table<Row> {
        let mut table = Table::new();
        for v in values {
            table.create(|id| Row { id, value: *v });
        }
        table
    }

    fn snapshot(table: &Table<Row>) -> Vec<(u64, i64)> {
        table.iter().map(|r| (r.id, r.value)).collect()
    }

    // ------------------------------------------------------------------
    // Basic row access
    // ------------------------------------------------------------------

    #[test]
    fn ids_are_assigned_sequentially() {
        let table = table_with(&[10, 20, 30]);
        assert_eq!(snapshot(&table), vec![(0, 10), (1, 20), (2, 30)]);
    }

    #[test]
    fn modify_changes_the_row() {
        let mut table = table_with(&[10]);
        table.modify(0, |r| r.value = 99).unwrap();
        assert_eq!(table.get(0).unwrap().value, 99);
    }

    #[test]
    fn modify_missing_row_errors() {
        let mut table = table_with(&[]);
        assert_eq!(
            table.modify(5, |r| r.value = 1),
            Err(StoreError::NotFound {
                type_name: "row",
                id: 5
            })
        );
    }

    #[test]
    fn removed_ids_are_not_reused() {
        let mut table = table_with(&[10, 20]);
        table.remove(1).unwrap();
        table.create(|id| Row { id, value: 30 });
        assert_eq!(snapshot(&table), vec![(0, 10), (2, 30)]);
    }

    // ------------------------------------------------------------------
    // Undo semantics
    // ------------------------------------------------------------------

    #[test]
    fn undo_restores_created_modified_and_removed_rows() {
        let mut table = table_with(&[10, 20]);
        let before = snapshot(&table);

        table.begin_level();
        table.create(|id| Row { id, value: 30 });
        table.modify(0, |r| r.value = 11).unwrap();
        table.remove(1).unwrap();
        assert_eq!(snapshot(&table), vec![(0, 11), (2, 30)]);

        table.undo_level();
        assert_eq!(snapshot(&table), before);
    }

    #[test]
    fn undo_rolls_back_the_id_watermark() {
        let mut table = table_with(&[10]);
        table.begin_level();
        table.create(|id| Row { id, value: 20 });
        table.undo_level();
        // The freed id is handed to the next creation.
        let row = table.create(|id| Row { id, value: 30 });
        assert_eq!(row.id, 1);
    }

    #[test]
    fn modify_then_remove_restores_original() {
        let mut table = table_with(&[10]);
        table.begin_level();
        table.modify(0, |r| r.value = 50).unwrap();
        table.remove(0).unwrap();
        table.undo_level();
        assert_eq!(table.get(0).unwrap().value, 10);
    }

    #[test]
    fn nested_undo_unwinds_only_the_inner_level() {
        let mut table = table_with(&[10]);

        table.begin_level();
        table.modify(0, |r| r.value = 11).unwrap();

        table.begin_level();
        table.modify(0, |r| r.value = 12).unwrap();
        table.undo_level();

        assert_eq!(table.get(0).unwrap().value, 11);
        table.undo_level();
        assert_eq!(table.get(0).unwrap().value, 10);
    }

    #[test]
    fn squash_merges_into_parent() {
        let mut table = table_with(&[10]);

        table.begin_level();
        table.modify(0, |r| r.value = 11).unwrap();

        table.begin_level();
        table.modify(0, |r| r.value = 12).unwrap();
        table.create(|id| Row { id, value: 20 });
        table.squash_level();

        // Child changes survive the squash...
        assert_eq!(snapshot(&table), vec![(0, 12), (1, 20)]);
        // ...and undoing the merged level rolls everything back to the start.
        table.undo_level();
        assert_eq!(snapshot(&table), vec![(0, 10)]);
    }

    #[test]
    fn commit_oldest_makes_bottom_level_permanent() {
        let mut table = table_with(&[10]);

        table.begin_level();
        table.modify(0, |r| r.value = 11).unwrap();
        table.begin_level();
        table.modify(0, |r| r.value = 12).unwrap();

        table.commit_oldest();
        assert_eq!(table.level_depth(), 1);

        // The remaining level still undoes its own changes, landing on the
        // committed value.
        table.undo_level();
        assert_eq!(table.get(0).unwrap().value, 11);
    }

    #[test]
    fn mutations_without_a_level_are_permanent() {
        let mut table = table_with(&[10]);
        table.modify(0, |r| r.value = 42).unwrap();
        table.begin_level();
        table.undo_level();
        assert_eq!(table.get(0).unwrap().value, 42);
    }

    #[test]
    #[should_panic(expected = "undo with no open level")]
    fn undo_without_level_panics() {
        let mut table = table_with(&[]);
        table.undo_level();
    }

    #[test]
    #[should_panic(expected = "mismatched id")]
    fn create_with_wrong_id_panics() {
        let mut table: Table<Row> = Table::new();
        table.create(|_| Row { id: 999, value: 0 });
    }

    // ------------------------------------------------------------------
    // Model-based property test
    // ------------------------------------------------------------------

    mod props {
        use proptest::prelude::*;

        use super::*;

        /// One scripted action against both the table and a snapshot model.
        #[derive(Clone, Debug)]
        enum Action {
            Create(i64),
            Modify(usize, i64),
            Remove(usize),
            Begin,
            Undo,
            Squash,
            Commit,
        }

        fn action() -> impl Strategy<Value = Action> {
            prop_oneof![
                any::<i64>().prop_map(Action::Create),
                (any::<usize>(), any::<i64>()).prop_map(|(k, v)| Action::Modify(k, v)),
                any::<usize>().prop_map(Action::Remove),
                Just(Action::Begin),
                Just(Action::Undo),
                Just(Action::Squash),
                Just(Action::Commit),
            ]
        }

        /// The model keeps a whole-table snapshot per open level; the
        /// incremental undo log must land exactly on those snapshots.
        #[derive(Clone, Debug, PartialEq)]
        struct Model {
            rows: BTreeMap<u64, i64>,
            next_id: u64,
        }

        fn nth_id(model: &Model, k: usize) -> Option<u64> {
            if model.rows.is_empty() {
                return None;
            }
            model.rows.keys().nth(k % model.rows.len()).copied()
        }

        fn observed(table: &Table<Row>) -> BTreeMap<u64, i64> {
            table.iter().map(|r| (r.id, r.value)).collect()
        }

        proptest! {
            #[test]
            fn undo_log_matches_snapshot_model(
                actions in prop::collection::vec(action(), 0..120)
            ) {
                let mut table: Table<Row> = Table::new();
                let mut model = Model { rows: BTreeMap::new(), next_id: 0 };
                let mut saved: Vec<Model> = Vec::new();

                for action in actions {
                    match action {
                        Action::Create(v) => {
                            table.create(|id| Row { id, value: v });
                            model.rows.insert(model.next_id, v);
                            model.next_id += 1;
                        }
                        Action::Modify(k, v) => {
                            let Some(id) = nth_id(&model, k) else { continue };
                            table.modify(id, |r| r.value = v).unwrap();
                            model.rows.insert(id, v);
                        }
                        Action::Remove(k) => {
                            let Some(id) = nth_id(&model, k) else { continue };
                            table.remove(id).unwrap();
                            model.rows.remove(&id);
                        }
                        Action::Begin => {
                            table.begin_level();
                            saved.push(model.clone());
                        }
                        Action::Undo => {
                            if let Some(prior) = saved.pop() {
                                table.undo_level();
                                model = prior;
                            }
                        }
                        Action::Squash => {
                            if saved.len() >= 2 {
                                table.squash_level();
                                saved.pop();
                            }
                        }
                        Action::Commit => {
                            if !saved.is_empty() {
                                table.commit_oldest();
                                saved.remove(0);
                            }
                        }
                    }
                    prop_assert_eq!(observed(&table), model.rows.clone());
                }

                // Unwind whatever is still open; every restore must land on
                // the snapshot taken when that level opened.
                while let Some(prior) = saved.pop() {
                    table.undo_level();
                    prop_assert_eq!(observed(&table), prior.rows.clone());
                }
                prop_assert_eq!(table.level_depth(), 0);
            }
        }
    }
}
