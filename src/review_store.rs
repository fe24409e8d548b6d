//! In-memory, paged store of duplicate-group review rows.
//!
//! Mirrors the role the original implementation gave an in-memory SQLite
//! table (`adp/widgets/duplicates_db.py`): one row per file within a
//! duplicate group, grouped, paged, and independently selectable for
//! deletion. Everything here is plain in-memory collections; there is no
//! database, just the same query shapes ported to Rust structures that
//! give the same algorithmic complexity.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::model::{self, DuplicateGroup, FileEntry, Kind};

pub const PAGE_SIZE: usize = 15;

#[derive(Default)]
pub struct ReviewStore {
    entries: BTreeMap<String, FileEntry>,
    /// group_id -> ordered file_ids (creation-time order within the group)
    groups: HashMap<String, Vec<String>>,
    /// page number -> ordered group_ids
    pages: BTreeMap<usize, Vec<String>>,
    /// each group's anchor (first-assigned) serial number -> group_id;
    /// since groups and their members are inserted in strictly increasing
    /// sn order, this reproduces the original's `MIN(sn)` grouping query
    /// as an O(log n) range lookup instead of a table scan.
    group_sn: BTreeMap<u64, String>,
    /// group_id -> its anchor sn, the reverse of `group_sn`, kept so
    /// `previous_page_of`/`next_page_of` don't need a linear scan to find
    /// the anchor for a given group.
    group_anchor: HashMap<String, u64>,
    next_sn: u64,
}

impl ReviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populates the store from grouped duplicate images found under
    /// `root`. `root` must exist and be a directory. Groups are assigned
    /// ids `G0`, `G1`, ... in input order; members within a group are
    /// ordered by creation time (ties broken per
    /// [`model::sort_by_creation_time`]), with the first member marked
    /// `Original` and the rest `Copy`.
    pub fn populate(&mut self, root: &Path, groups: Vec<DuplicateGroup>) -> Result<()> {
        if !root.is_dir() {
            return Err(Error::InvalidRoot(root.to_path_buf()));
        }

        for (n, group) in groups.into_iter().enumerate() {
            let group_id = format!("G{}", n);
            let page = n / PAGE_SIZE;

            let paths: Vec<PathBuf> = group.members.iter().map(|m| m.path.clone()).collect();
            let ordered_paths = model::sort_by_creation_time(&paths);

            let sizes: HashMap<&Path, u64> = group
                .members
                .iter()
                .map(|m| (m.path.as_path(), m.byte_size))
                .collect();

            let mut file_ids = Vec::with_capacity(ordered_paths.len());
            let mut group_anchor_sn = None;

            for (m, full_path) in ordered_paths.into_iter().enumerate() {
                let file_id = format!("{}_F{}", group_id, m);
                let sn = self.next_sn;
                self.next_sn += 1;
                if group_anchor_sn.is_none() {
                    group_anchor_sn = Some(sn);
                }

                let created_at = model::format_timestamp(
                    std::fs::metadata(&full_path)
                        .and_then(|meta| meta.created().or_else(|_| meta.modified()))
                        .unwrap_or(std::time::SystemTime::UNIX_EPOCH),
                );
                let byte_size = sizes.get(full_path.as_path()).copied().unwrap_or(0);

                let entry = FileEntry {
                    file_id: file_id.clone(),
                    group_id: group_id.clone(),
                    hash: group.hash.clone(),
                    display_path: model::display_path(root, &full_path),
                    full_path,
                    created_at,
                    size_text: model::format_filesize(byte_size),
                    selected: false,
                    kind: if m == 0 { Kind::Original } else { Kind::Copy },
                    page,
                    sn,
                };

                file_ids.push(file_id.clone());
                self.entries.insert(file_id, entry);
            }

            self.groups.insert(group_id.clone(), file_ids);
            self.pages.entry(page).or_default().push(group_id.clone());
            if let Some(sn) = group_anchor_sn {
                self.group_sn.insert(sn, group_id.clone());
                self.group_anchor.insert(group_id, sn);
            }
        }

        Ok(())
    }

    pub fn get_group_ids_of_page(&self, page: usize) -> Vec<String> {
        self.pages.get(&page).cloned().unwrap_or_default()
    }

    pub fn get_all_page_numbers(&self) -> Vec<usize> {
        self.pages.keys().copied().collect()
    }

    pub fn get_group_items(&self, group_id: &str) -> Vec<&FileEntry> {
        self.groups
            .get(group_id)
            .map(|ids| ids.iter().filter_map(|id| self.entries.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn get_item_ids_of_group(&self, group_id: &str) -> Vec<String> {
        self.groups.get(group_id).cloned().unwrap_or_default()
    }

    /// Returns the selection state of every member of `group_id`, in the
    /// same order as [`Self::get_group_items`] — one boolean per member,
    /// not just the selected subset. Mirrors `get_selected_of_group` in
    /// the original, which returns a parallel list of booleans rather
    /// than filtering down to selected ids.
    pub fn selected_of_group(&self, group_id: &str) -> Vec<bool> {
        self.get_group_items(group_id)
            .into_iter()
            .map(|e| e.selected)
            .collect()
    }

    pub fn get_group_id_of_item(&self, item_id: &str) -> Option<String> {
        self.entries.get(item_id).map(|e| e.group_id.clone())
    }

    pub fn get_full_paths_of_group(&self, group_id: &str) -> Vec<PathBuf> {
        self.get_group_items(group_id)
            .into_iter()
            .map(|e| e.full_path.clone())
            .collect()
    }

    pub fn get_item(&self, item_id: &str) -> Option<&FileEntry> {
        self.entries.get(item_id)
    }

    pub fn get_selected_of_item(&self, item_id: &str) -> bool {
        self.entries.get(item_id).map(|e| e.selected).unwrap_or(false)
    }

    pub fn get_selected_of_kind(&self, kind: Kind) -> Vec<String> {
        self.entries
            .values()
            .filter(|e| e.kind == kind && e.selected)
            .map(|e| e.file_id.clone())
            .collect()
    }

    /// Returns every item whose selection state equals `value`, as
    /// `file_id -> full_path`. `value = true` drives deletion; `value =
    /// false` is occasionally useful for surfacing what's left untouched.
    /// Mirrors `get_selected(value=True)` in the original.
    pub fn selected_entries(&self, value: bool) -> HashMap<String, PathBuf> {
        self.entries
            .values()
            .filter(|e| e.selected == value)
            .map(|e| (e.file_id.clone(), e.full_path.clone()))
            .collect()
    }

    /// Like [`Self::selected_entries`], but also carries each item's
    /// group id, as `file_id -> (group_id, full_path)`. Mirrors
    /// `get_fiid_giid_fpath_of_selected(value=True)` in the original.
    pub fn selected_entries_with_group(&self, value: bool) -> HashMap<String, (String, PathBuf)> {
        self.entries
            .values()
            .filter(|e| e.selected == value)
            .map(|e| (e.file_id.clone(), (e.group_id.clone(), e.full_path.clone())))
            .collect()
    }

    /// True if the store holds no entries at all. Mirrors
    /// `is_table_empty` in the original, used to decide whether a fresh
    /// scan found anything before presenting the review UI.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clears every entry, group, page, and serial-number index, resetting
    /// the store to its just-constructed state. Mirrors `reset_table` in
    /// the original; required before a second `populate` call against the
    /// same root, since group ids are assigned starting at `G0` again and
    /// would otherwise collide with the previous run's bookkeeping.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.groups.clear();
        self.pages.clear();
        self.group_sn.clear();
        self.group_anchor.clear();
        self.next_sn = 0;
    }

    pub fn get_last_group_id(&self) -> Option<String> {
        self.group_sn.values().next_back().cloned()
    }

    /// Returns up to `span` group ids preceding `group_id`'s page window,
    /// in ascending (page) order. Ported from `get_previous_page_of_group_ids`:
    /// the original finds `MIN(sn)` for the anchor group, then every group
    /// with a smaller sn, takes the nearest `span` of them, and reverses
    /// them back into ascending order.
    pub fn previous_page_of(&self, group_id: &str, span: usize) -> Vec<String> {
        let anchor_sn = match self.anchor_sn_of(group_id) {
            Some(sn) => sn,
            None => return Vec::new(),
        };
        let mut found: Vec<String> = self
            .group_sn
            .range(..anchor_sn)
            .rev()
            .take(span)
            .map(|(_, id)| id.clone())
            .collect();
        found.reverse();
        found
    }

    /// Returns up to `span` group ids following `group_id`'s page window,
    /// in ascending order. Ported from `get_next_page_of_group_ids`.
    pub fn next_page_of(&self, group_id: &str, span: usize) -> Vec<String> {
        let anchor_sn = match self.anchor_sn_of(group_id) {
            Some(sn) => sn,
            None => return Vec::new(),
        };
        self.group_sn
            .range((anchor_sn + 1)..)
            .take(span)
            .map(|(_, id)| id.clone())
            .collect()
    }

    fn anchor_sn_of(&self, group_id: &str) -> Option<u64> {
        self.group_anchor.get(group_id).copied()
    }

    pub fn toggle_selected_of_item(&mut self, item_id: &str) {
        if let Some(entry) = self.entries.get_mut(item_id) {
            entry.selected = !entry.selected;
        }
    }

    pub fn toggle_selected_of_items(&mut self, item_ids: &[String]) {
        for id in item_ids {
            self.toggle_selected_of_item(id);
        }
    }

    pub fn toggle_all_selected_of_kind(&mut self, kind: Kind) {
        for entry in self.entries.values_mut() {
            if entry.kind == kind {
                entry.selected = !entry.selected;
            }
        }
    }

    pub fn set_selected_of_kind(&mut self, kind: Kind, value: bool) {
        for entry in self.entries.values_mut() {
            if entry.kind == kind {
                entry.selected = value;
            }
        }
    }

    /// Removes a single file entry from the store, including its group
    /// and page membership. If the removed entry was its group's sn
    /// anchor, the next-oldest remaining member (if any) becomes the new
    /// anchor so previous/next-page traversal stays correct. A group left
    /// with no members is removed from its page entirely.
    pub fn delete_item(&mut self, item_id: &str) {
        let Some(entry) = self.entries.remove(item_id) else {
            return;
        };

        if let Some(members) = self.groups.get_mut(&entry.group_id) {
            members.retain(|id| id != item_id);
            if members.is_empty() {
                self.groups.remove(&entry.group_id);
                if let Some(group_ids) = self.pages.get_mut(&entry.page) {
                    group_ids.retain(|g| g != &entry.group_id);
                    if group_ids.is_empty() {
                        self.pages.remove(&entry.page);
                    }
                }
                self.group_sn.retain(|_, g| g != &entry.group_id);
                self.group_anchor.remove(&entry.group_id);
            } else if self.group_anchor.get(&entry.group_id).copied() == Some(entry.sn) {
                self.group_sn.remove(&entry.sn);
                if let Some(next_id) = members.first() {
                    if let Some(next_entry) = self.entries.get(next_id) {
                        self.group_sn.insert(next_entry.sn, entry.group_id.clone());
                        self.group_anchor.insert(entry.group_id.clone(), next_entry.sn);
                    }
                }
            }
        }
    }

    /// Reassigns serial numbers densely in current order, closing the
    /// gaps left by deletions. Never called on the normal ingest/query/
    /// mutate path; exists as an explicit maintenance operation, mirroring
    /// `duplicates_db.py`'s separately-invoked `renumber_sn`.
    pub fn renumber(&mut self) {
        let mut ordered: Vec<(u64, String, String)> = self
            .entries
            .values()
            .map(|e| (e.sn, e.group_id.clone(), e.file_id.clone()))
            .collect();
        ordered.sort_by_key(|(sn, _, _)| *sn);

        self.group_sn.clear();
        self.group_anchor.clear();
        let mut seen_groups = std::collections::HashSet::new();
        for (new_sn, (_, group_id, file_id)) in ordered.into_iter().enumerate() {
            let new_sn = new_sn as u64;
            if let Some(entry) = self.entries.get_mut(&file_id) {
                entry.sn = new_sn;
            }
            if seen_groups.insert(group_id.clone()) {
                self.group_sn.insert(new_sn, group_id.clone());
                self.group_anchor.insert(group_id, new_sn);
            }
        }
        self.next_sn = self.entries.len() as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RasterImage;

    fn make_group(root: &Path, hash: &str, names: &[&str]) -> DuplicateGroup {
        let members = names
            .iter()
            .map(|name| {
                let path = root.join(name);
                std::fs::write(&path, b"x").unwrap();
                RasterImage {
                    hash: hash.to_string(),
                    path,
                    byte_size: 1,
                }
            })
            .collect();
        DuplicateGroup {
            hash: hash.to_string(),
            members,
        }
    }

    #[test]
    fn populate_assigns_group_ids_pages_and_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let group = make_group(dir.path(), "h1", &["a.jpg", "b.jpg"]);

        let mut store = ReviewStore::new();
        store.populate(dir.path(), vec![group]).unwrap();

        let ids = store.get_group_ids_of_page(0);
        assert_eq!(ids, vec!["G0".to_string()]);

        let items = store.get_group_items("G0");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].kind, Kind::Original);
        assert_eq!(items[1].kind, Kind::Copy);
    }

    #[test]
    fn populate_rejects_missing_root() {
        let mut store = ReviewStore::new();
        let err = store
            .populate(Path::new("/does/not/exist"), vec![])
            .unwrap_err();
        matches!(err, Error::InvalidRoot(_));
    }

    #[test]
    fn pages_fill_up_to_page_size() {
        let dir = tempfile::tempdir().unwrap();
        let groups: Vec<DuplicateGroup> = (0..20)
            .map(|i| {
                let a = format!("a{}.jpg", i);
                let b = format!("b{}.jpg", i);
                make_group(dir.path(), &format!("h{}", i), &[&a, &b])
            })
            .collect();

        let mut store = ReviewStore::new();
        store.populate(dir.path(), groups).unwrap();

        assert_eq!(store.get_group_ids_of_page(0).len(), PAGE_SIZE);
        assert_eq!(store.get_group_ids_of_page(1).len(), 5);
        assert_eq!(store.get_all_page_numbers(), vec![0, 1]);
    }

    #[test]
    fn previous_and_next_page_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let groups: Vec<DuplicateGroup> = (0..5)
            .map(|i| {
                let a = format!("a{}.jpg", i);
                let b = format!("b{}.jpg", i);
                make_group(dir.path(), &format!("h{}", i), &[&a, &b])
            })
            .collect();

        let mut store = ReviewStore::new();
        store.populate(dir.path(), groups).unwrap();

        let next = store.next_page_of("G1", 2);
        assert_eq!(next, vec!["G2".to_string(), "G3".to_string()]);

        let prev = store.previous_page_of("G3", 2);
        assert_eq!(prev, vec!["G1".to_string(), "G2".to_string()]);
    }

    #[test]
    fn toggle_selected_of_item_is_idempotent_pairwise() {
        let dir = tempfile::tempdir().unwrap();
        let group = make_group(dir.path(), "h1", &["a.jpg", "b.jpg"]);
        let mut store = ReviewStore::new();
        store.populate(dir.path(), vec![group]).unwrap();

        store.toggle_selected_of_item("G0_F1");
        assert!(store.get_selected_of_item("G0_F1"));
        store.toggle_selected_of_item("G0_F1");
        assert!(!store.get_selected_of_item("G0_F1"));
    }

    #[test]
    fn set_selected_of_kind_affects_only_that_kind() {
        let dir = tempfile::tempdir().unwrap();
        let group = make_group(dir.path(), "h1", &["a.jpg", "b.jpg", "c.jpg"]);
        let mut store = ReviewStore::new();
        store.populate(dir.path(), vec![group]).unwrap();

        store.set_selected_of_kind(Kind::Copy, true);
        assert!(!store.get_selected_of_item("G0_F0"));
        assert!(store.get_selected_of_item("G0_F1"));
        assert!(store.get_selected_of_item("G0_F2"));
    }

    #[test]
    fn delete_item_reassigns_group_anchor() {
        let dir = tempfile::tempdir().unwrap();
        let groups = vec![
            make_group(dir.path(), "h0", &["a0.jpg", "b0.jpg"]),
            make_group(dir.path(), "h1", &["a1.jpg", "b1.jpg"]),
        ];
        let mut store = ReviewStore::new();
        store.populate(dir.path(), groups).unwrap();

        store.delete_item("G0_F0");
        assert_eq!(store.get_item_ids_of_group("G0"), vec!["G0_F1".to_string()]);
        assert_eq!(store.next_page_of("G0", 1), vec!["G1".to_string()]);
    }

    #[test]
    fn delete_last_member_removes_group_from_page() {
        let dir = tempfile::tempdir().unwrap();
        let group = make_group(dir.path(), "h0", &["a.jpg", "b.jpg"]);
        let mut store = ReviewStore::new();
        store.populate(dir.path(), vec![group]).unwrap();

        store.delete_item("G0_F0");
        store.delete_item("G0_F1");
        assert!(store.get_group_ids_of_page(0).is_empty());
        assert!(store.get_all_page_numbers().is_empty());
    }

    #[test]
    fn is_empty_reflects_population_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ReviewStore::new();
        assert!(store.is_empty());

        let group = make_group(dir.path(), "h0", &["a.jpg", "b.jpg"]);
        store.populate(dir.path(), vec![group]).unwrap();
        assert!(!store.is_empty());
    }

    #[test]
    fn reset_clears_store_and_avoids_group_id_collisions_on_rerun() {
        let dir = tempfile::tempdir().unwrap();
        let group = make_group(dir.path(), "h0", &["a.jpg", "b.jpg"]);
        let mut store = ReviewStore::new();
        store.populate(dir.path(), vec![group]).unwrap();
        assert!(!store.is_empty());

        store.reset();
        assert!(store.is_empty());
        assert!(store.get_all_page_numbers().is_empty());

        let group = make_group(dir.path(), "h1", &["c.jpg", "d.jpg"]);
        store.populate(dir.path(), vec![group]).unwrap();
        assert_eq!(store.get_group_ids_of_page(0), vec!["G0".to_string()]);
    }

    #[test]
    fn selected_of_group_is_ordered_booleans_not_a_filtered_id_list() {
        let dir = tempfile::tempdir().unwrap();
        let group = make_group(dir.path(), "h0", &["a.jpg", "b.jpg", "c.jpg"]);
        let mut store = ReviewStore::new();
        store.populate(dir.path(), vec![group]).unwrap();

        store.toggle_selected_of_item("G0_F1");
        assert_eq!(store.selected_of_group("G0"), vec![false, true, false]);
    }

    #[test]
    fn selected_entries_honors_value_parameter() {
        let dir = tempfile::tempdir().unwrap();
        let group = make_group(dir.path(), "h0", &["a.jpg", "b.jpg"]);
        let mut store = ReviewStore::new();
        store.populate(dir.path(), vec![group]).unwrap();

        store.toggle_selected_of_item("G0_F0");
        let selected = store.selected_entries(true);
        assert_eq!(selected.len(), 1);
        assert!(selected.contains_key("G0_F0"));

        let unselected = store.selected_entries(false);
        assert_eq!(unselected.len(), 1);
        assert!(unselected.contains_key("G0_F1"));
    }

    #[test]
    fn selected_entries_with_group_carries_group_id() {
        let dir = tempfile::tempdir().unwrap();
        let group = make_group(dir.path(), "h0", &["a.jpg", "b.jpg"]);
        let mut store = ReviewStore::new();
        store.populate(dir.path(), vec![group]).unwrap();

        store.toggle_selected_of_item("G0_F0");
        let selected = store.selected_entries_with_group(true);
        assert_eq!(selected.len(), 1);
        let (group_id, _path) = &selected["G0_F0"];
        assert_eq!(group_id, "G0");
    }
}
