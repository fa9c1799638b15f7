//! Listing store keyed by listing id.
//!
//! Each listing is held once, tagged with the partitions it belongs to.
//! Tags are independent: hiding a listing does not take it out of Unseen,
//! and a hidden listing can also be a favorite. Each partition is persisted
//! as its own ordered JSON list and flushed after every mutation that
//! touches it. Writes are not transactional across partitions.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{Partition, Rental};
use crate::storage::KeyValueStore;

/// Partitions a listing is tagged with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Membership {
    pub unseen: bool,
    pub seen: bool,
    pub favorite: bool,
}

impl Membership {
    pub fn contains(&self, partition: Partition) -> bool {
        match partition {
            Partition::Unseen => self.unseen,
            Partition::Seen => self.seen,
            Partition::Favorite => self.favorite,
        }
    }

    fn set(&mut self, partition: Partition, member: bool) {
        match partition {
            Partition::Unseen => self.unseen = member,
            Partition::Seen => self.seen = member,
            Partition::Favorite => self.favorite = member,
        }
    }

    fn is_empty(&self) -> bool {
        !(self.unseen || self.seen || self.favorite)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    rental: Rental,
    membership: Membership,
}

/// Listings in Unseen whose id is not in Seen, keeping Unseen's order.
pub fn unseen_relative_to(unseen: &[Rental], seen: &[Rental]) -> Vec<Rental> {
    let seen_ids: HashSet<&str> = seen.iter().map(|r| r.id.as_str()).collect();
    unseen
        .iter()
        .filter(|r| !seen_ids.contains(r.id.as_str()))
        .cloned()
        .collect()
}

/// Collapse duplicate ids, keeping the first position and the last value.
pub fn unique_by_id(rentals: impl IntoIterator<Item = Rental>) -> Vec<Rental> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<Rental> = Vec::new();
    for rental in rentals {
        match positions.get(&rental.id) {
            Some(&pos) => unique[pos] = rental,
            None => {
                positions.insert(rental.id.clone(), unique.len());
                unique.push(rental);
            }
        }
    }
    unique
}

/// Three-partition listing store with write-through persistence.
pub struct RecordStore {
    storage: Arc<dyn KeyValueStore>,
    entries: HashMap<String, Entry>,
    /// Ids per partition, in the order they joined it
    order: [Vec<String>; 3],
}

fn slot(partition: Partition) -> usize {
    match partition {
        Partition::Unseen => 0,
        Partition::Seen => 1,
        Partition::Favorite => 2,
    }
}

impl RecordStore {
    /// Empty store backed by `storage`; nothing is read.
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            storage,
            entries: HashMap::new(),
            order: Default::default(),
        }
    }

    /// Load every partition from storage.
    ///
    /// A missing, unreadable or malformed blob yields an empty partition.
    pub async fn load(storage: Arc<dyn KeyValueStore>) -> Self {
        let mut store = Self::new(storage);
        for partition in Partition::ALL {
            let rentals = store.read_partition(partition).await;
            debug!("Loaded {} {} listings", rentals.len(), partition);
            for rental in rentals {
                store.upsert(rental, partition);
            }
        }
        store
    }

    async fn read_partition(&self, partition: Partition) -> Vec<Rental> {
        let key = partition.storage_key();
        let blob = match self.storage.get(key).await {
            Ok(Some(blob)) => blob,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("Failed to read {}: {}. Starting empty.", key, e);
                return Vec::new();
            }
        };
        match serde_json::from_str::<Option<Vec<Rental>>>(&blob) {
            Ok(rentals) => rentals.unwrap_or_default(),
            Err(e) => {
                warn!("Failed to parse {}: {}. Starting empty.", key, e);
                Vec::new()
            }
        }
    }

    /// Whether a listing with this id is in any partition.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn contains_in(&self, partition: Partition, id: &str) -> bool {
        self.membership(id)
            .is_some_and(|membership| membership.contains(partition))
    }

    pub fn membership(&self, id: &str) -> Option<Membership> {
        self.entries.get(id).map(|e| e.membership)
    }

    pub fn get(&self, id: &str) -> Option<&Rental> {
        self.entries.get(id).map(|e| &e.rental)
    }

    /// Stored listings of a partition, in the order they joined it.
    pub fn records(&self, partition: Partition) -> Vec<Rental> {
        self.order[slot(partition)]
            .iter()
            .filter_map(|id| self.entries.get(id))
            .map(|e| e.rental.clone())
            .collect()
    }

    pub fn len(&self, partition: Partition) -> usize {
        self.order[slot(partition)].len()
    }

    /// What a partition shows to the user: Unseen hides anything already
    /// seen, the other partitions are shown as stored.
    pub fn view(&self, partition: Partition) -> Vec<Rental> {
        match partition {
            Partition::Unseen => unseen_relative_to(
                &self.records(Partition::Unseen),
                &self.records(Partition::Seen),
            ),
            other => self.records(other),
        }
    }

    /// Listings from `rentals` whose id is not known to any partition.
    pub fn novel(&self, rentals: &[Rental]) -> Vec<Rental> {
        rentals
            .iter()
            .filter(|r| !self.contains(&r.id))
            .cloned()
            .collect()
    }

    /// Union listings into a partition, replacing stored data for ids that
    /// already exist. Returns how many ids were new to the partition.
    ///
    /// On a failed write the listings stay merged in memory.
    pub async fn merge(
        &mut self,
        partition: Partition,
        rentals: impl IntoIterator<Item = Rental>,
    ) -> Result<usize> {
        let mut touched = false;
        let mut added = 0;
        for rental in rentals {
            touched = true;
            if self.upsert(rental, partition) {
                added += 1;
            }
        }
        if touched {
            self.flush(partition).await?;
        }
        Ok(added)
    }

    /// Move a listing between partitions. No-op if it is not in `from`.
    pub async fn move_record(&mut self, id: &str, from: Partition, to: Partition) -> Result<bool> {
        if from == to || !self.contains_in(from, id) {
            return Ok(false);
        }
        // Join first so the entry is never momentarily empty
        self.set_membership(id, to, true);
        self.set_membership(id, from, false);
        self.flush(from).await?;
        self.flush(to).await?;
        Ok(true)
    }

    /// Mark a listing as seen. It stays in Unseen storage.
    pub async fn hide(&mut self, id: &str) -> Result<bool> {
        if !self.contains(id) || self.contains_in(Partition::Seen, id) {
            return Ok(false);
        }
        self.set_membership(id, Partition::Seen, true);
        self.flush(Partition::Seen).await?;
        Ok(true)
    }

    /// Mark every Unseen listing as seen, in Unseen order.
    pub async fn hide_all(&mut self) -> Result<usize> {
        let pending: Vec<String> = self.order[slot(Partition::Unseen)]
            .iter()
            .filter(|id| !self.contains_in(Partition::Seen, id))
            .cloned()
            .collect();
        for id in &pending {
            self.set_membership(id, Partition::Seen, true);
        }
        if !pending.is_empty() {
            self.flush(Partition::Seen).await?;
        }
        Ok(pending.len())
    }

    /// Add or remove a listing from Favorite.
    ///
    /// Returns the new favorite state, or `None` for an unknown id.
    pub async fn toggle_favorite(&mut self, id: &str) -> Result<Option<bool>> {
        let Some(membership) = self.membership(id) else {
            return Ok(None);
        };
        let favorite = !membership.favorite;
        self.set_membership(id, Partition::Favorite, favorite);
        self.flush(Partition::Favorite).await?;
        Ok(Some(favorite))
    }

    /// Write one partition back to storage.
    pub async fn flush(&self, partition: Partition) -> Result<()> {
        let records = self.records(partition);
        let json = serde_json::to_string(&records)?;
        self.storage.set(partition.storage_key(), &json).await?;
        debug!("Persisted {} {} listings", records.len(), partition);
        Ok(())
    }

    /// Insert or replace; returns true if the id was new to `partition`.
    fn upsert(&mut self, rental: Rental, partition: Partition) -> bool {
        let id = rental.id.clone();
        let added = match self.entries.get_mut(&id) {
            Some(entry) => {
                let added = !entry.membership.contains(partition);
                entry.rental = rental;
                entry.membership.set(partition, true);
                added
            }
            None => {
                let mut membership = Membership::default();
                membership.set(partition, true);
                self.entries.insert(id.clone(), Entry { rental, membership });
                true
            }
        };
        if added {
            self.order[slot(partition)].push(id);
        }
        added
    }

    fn set_membership(&mut self, id: &str, partition: Partition, member: bool) {
        let Some(entry) = self.entries.get_mut(id) else {
            return;
        };
        if entry.membership.contains(partition) == member {
            return;
        }
        entry.membership.set(partition, member);
        let empty = entry.membership.is_empty();

        let order = &mut self.order[slot(partition)];
        if member {
            order.push(id.to_string());
        } else {
            order.retain(|other| other != id);
        }

        if empty {
            self.entries.remove(id);
            info!("Dropped listing {} from all partitions", id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::storage::MemoryStorage;

    fn rental(id: &str) -> Rental {
        Rental {
            id: id.to_string(),
            url: format!("https://www.daft.ie/listing-{id}/"),
            ..Rental::default()
        }
    }

    fn ids(rentals: &[Rental]) -> Vec<&str> {
        rentals.iter().map(|r| r.id.as_str()).collect()
    }

    fn memory() -> Arc<MemoryStorage> {
        Arc::new(MemoryStorage::new())
    }

    /// Storage whose every read and write fails.
    struct UnreachableStorage;

    #[async_trait::async_trait]
    impl KeyValueStore for UnreachableStorage {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            Err(AppError::persistence(key, "disk unavailable"))
        }

        async fn set(&self, key: &str, _value: &str) -> Result<()> {
            Err(AppError::persistence(key, "disk unavailable"))
        }
    }

    async fn blob_ids(storage: &MemoryStorage, key: &str) -> Vec<String> {
        let blob = storage.get(key).await.unwrap().unwrap();
        let rentals: Vec<Rental> = serde_json::from_str(&blob).unwrap();
        rentals.into_iter().map(|r| r.id).collect()
    }

    #[test]
    fn test_unseen_relative_to_scenario() {
        let unseen = vec![rental("a"), rental("b")];
        let seen = vec![rental("a")];
        assert_eq!(ids(&unseen_relative_to(&unseen, &seen)), vec!["b"]);
    }

    #[test]
    fn test_unseen_relative_to_keeps_order() {
        let unseen = vec![rental("d"), rental("a"), rental("c"), rental("b")];
        let seen = vec![rental("c"), rental("x")];
        assert_eq!(ids(&unseen_relative_to(&unseen, &seen)), vec!["d", "a", "b"]);
    }

    #[test]
    fn test_unique_by_id_last_write_wins() {
        let mut newer = rental("a");
        newer.price = "€2,000".to_string();
        let unique = unique_by_id(vec![rental("a"), rental("b"), newer]);
        assert_eq!(ids(&unique), vec!["a", "b"]);
        assert_eq!(unique[0].price, "€2,000");
    }

    #[tokio::test]
    async fn test_merge_is_idempotent() {
        let mut store = RecordStore::new(memory());
        let batch = vec![rental("a"), rental("b")];

        assert_eq!(store.merge(Partition::Unseen, batch.clone()).await.unwrap(), 2);
        let once = store.records(Partition::Unseen);
        assert_eq!(store.merge(Partition::Unseen, batch).await.unwrap(), 0);
        let twice = store.records(Partition::Unseen);

        assert_eq!(ids(&once), ids(&twice));
    }

    #[tokio::test]
    async fn test_merge_replaces_data_for_same_id() {
        let mut store = RecordStore::new(memory());
        store.merge(Partition::Unseen, vec![rental("a")]).await.unwrap();

        let mut updated = rental("a");
        updated.price = "€1,950".to_string();
        store.merge(Partition::Unseen, vec![updated]).await.unwrap();

        assert_eq!(store.len(Partition::Unseen), 1);
        assert_eq!(store.get("a").unwrap().price, "€1,950");
    }

    #[tokio::test]
    async fn test_hide_keeps_unseen_membership() {
        let mut store = RecordStore::new(memory());
        store
            .merge(Partition::Unseen, vec![rental("a"), rental("b")])
            .await
            .unwrap();

        assert!(store.hide("a").await.unwrap());
        assert!(!store.hide("a").await.unwrap());
        assert!(!store.hide("missing").await.unwrap());

        assert!(store.contains_in(Partition::Unseen, "a"));
        assert!(store.contains_in(Partition::Seen, "a"));
        assert_eq!(ids(&store.view(Partition::Unseen)), vec!["b"]);
        assert_eq!(ids(&store.view(Partition::Seen)), vec!["a"]);
    }

    #[tokio::test]
    async fn test_hide_all() {
        let mut store = RecordStore::new(memory());
        store
            .merge(Partition::Unseen, vec![rental("a"), rental("b")])
            .await
            .unwrap();
        store.hide("a").await.unwrap();

        assert_eq!(store.hide_all().await.unwrap(), 1);
        assert!(store.view(Partition::Unseen).is_empty());
        assert_eq!(store.len(Partition::Seen), 2);
    }

    #[tokio::test]
    async fn test_toggle_favorite_on_seen_listing() {
        let mut store = RecordStore::new(memory());
        store.merge(Partition::Unseen, vec![rental("a")]).await.unwrap();
        store.hide("a").await.unwrap();

        assert_eq!(store.toggle_favorite("a").await.unwrap(), Some(true));
        let membership = store.membership("a").unwrap();
        assert!(membership.seen && membership.favorite);

        assert_eq!(store.toggle_favorite("a").await.unwrap(), Some(false));
        assert!(!store.contains_in(Partition::Favorite, "a"));
        assert_eq!(store.toggle_favorite("zzz").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_move_record() {
        let mut store = RecordStore::new(memory());
        store.merge(Partition::Seen, vec![rental("a")]).await.unwrap();

        assert!(!store.move_record("a", Partition::Unseen, Partition::Favorite).await.unwrap());
        assert!(store.move_record("a", Partition::Seen, Partition::Favorite).await.unwrap());
        assert!(!store.contains_in(Partition::Seen, "a"));
        assert!(store.contains_in(Partition::Favorite, "a"));
    }

    #[tokio::test]
    async fn test_listing_dropped_when_no_partition_left() {
        let mut store = RecordStore::new(memory());
        store
            .merge(Partition::Favorite, vec![rental("a"), rental("b")])
            .await
            .unwrap();

        store.toggle_favorite("a").await.unwrap();
        assert!(!store.contains("a"));
        assert_eq!(store.get("b").unwrap().id, "b");
    }

    #[tokio::test]
    async fn test_novel_checks_every_partition() {
        let mut store = RecordStore::new(memory());
        store.merge(Partition::Unseen, vec![rental("a")]).await.unwrap();
        store.merge(Partition::Seen, vec![rental("b")]).await.unwrap();
        store.merge(Partition::Favorite, vec![rental("c")]).await.unwrap();

        let batch = vec![rental("a"), rental("b"), rental("c"), rental("d")];
        assert_eq!(ids(&store.novel(&batch)), vec!["d"]);
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let storage = memory();
        let mut store = RecordStore::new(storage.clone());
        store
            .merge(Partition::Unseen, vec![rental("a"), rental("b")])
            .await
            .unwrap();
        store.hide("b").await.unwrap();
        store.toggle_favorite("a").await.unwrap();

        let reloaded = RecordStore::load(storage).await;
        assert_eq!(ids(&reloaded.records(Partition::Unseen)), vec!["a", "b"]);
        assert_eq!(ids(&reloaded.records(Partition::Seen)), vec!["b"]);
        assert_eq!(ids(&reloaded.records(Partition::Favorite)), vec!["a"]);
    }

    #[tokio::test]
    async fn test_corrupt_or_missing_blobs_load_empty() {
        let storage = Arc::new(MemoryStorage::with_blobs([
            ("_rentals", "{not json"),
            ("_seenRentals", "null"),
            ("_favRentals", r#"[{"id":"f","url":"u"},{"id":"f","url":"u2"}]"#),
        ]));

        let store = RecordStore::load(storage).await;
        assert_eq!(store.len(Partition::Unseen), 0);
        assert_eq!(store.len(Partition::Seen), 0);
        assert_eq!(store.len(Partition::Favorite), 1);
        assert_eq!(store.get("f").unwrap().url, "u2");
    }

    #[tokio::test]
    async fn test_blobs_use_original_keys() {
        let storage = memory();
        let mut store = RecordStore::new(storage.clone());
        store.merge(Partition::Unseen, vec![rental("a")]).await.unwrap();

        let blob = storage.get("_rentals").await.unwrap().unwrap();
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&blob).unwrap();
        assert_eq!(parsed[0]["id"], "a");
        assert!(storage.get("_seenRentals").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_seen_keeps_hide_order() {
        let storage = memory();
        let mut store = RecordStore::new(storage.clone());
        store
            .merge(Partition::Unseen, vec![rental("a"), rental("b"), rental("c")])
            .await
            .unwrap();

        store.hide("c").await.unwrap();
        store.hide("a").await.unwrap();

        assert_eq!(blob_ids(&storage, "_seenRentals").await, vec!["c", "a"]);
        assert_eq!(ids(&store.view(Partition::Seen)), vec!["c", "a"]);
        assert_eq!(ids(&store.view(Partition::Unseen)), vec!["b"]);
    }

    #[tokio::test]
    async fn test_loaded_order_survives_rewrite() {
        let storage = Arc::new(MemoryStorage::with_blobs([
            ("_rentals", r#"[{"id":"a","url":"u"},{"id":"b","url":"u"},{"id":"c","url":"u"}]"#),
            ("_favRentals", r#"[{"id":"c","url":"u"},{"id":"a","url":"u"}]"#),
        ]));
        let mut store = RecordStore::load(storage.clone()).await;

        assert_eq!(store.toggle_favorite("b").await.unwrap(), Some(true));
        assert_eq!(blob_ids(&storage, "_favRentals").await, vec!["c", "a", "b"]);

        assert_eq!(store.toggle_favorite("a").await.unwrap(), Some(false));
        assert_eq!(blob_ids(&storage, "_favRentals").await, vec!["c", "b"]);
        assert_eq!(blob_ids(&storage, "_rentals").await.len(), 3);
    }

    #[tokio::test]
    async fn test_move_appends_to_target() {
        let mut store = RecordStore::new(memory());
        store.merge(Partition::Favorite, vec![rental("x")]).await.unwrap();
        store
            .merge(Partition::Seen, vec![rental("a"), rental("b")])
            .await
            .unwrap();

        store.move_record("a", Partition::Seen, Partition::Favorite).await.unwrap();
        assert_eq!(ids(&store.records(Partition::Favorite)), vec!["x", "a"]);
        assert_eq!(ids(&store.records(Partition::Seen)), vec!["b"]);
    }

    #[tokio::test]
    async fn test_unseen_view_follows_unseen_order() {
        let mut store = RecordStore::new(memory());
        store.merge(Partition::Seen, vec![rental("c")]).await.unwrap();
        store
            .merge(Partition::Unseen, vec![rental("d"), rental("a"), rental("c"), rental("b")])
            .await
            .unwrap();

        assert_eq!(ids(&store.view(Partition::Unseen)), vec!["d", "a", "b"]);
    }

    #[tokio::test]
    async fn test_unreadable_storage_loads_empty() {
        let store = RecordStore::load(Arc::new(UnreachableStorage)).await;
        for partition in Partition::ALL {
            assert_eq!(store.len(partition), 0);
        }
    }

    #[tokio::test]
    async fn test_failed_write_keeps_listings_in_memory() {
        let mut store = RecordStore::new(Arc::new(UnreachableStorage));

        let result = store.merge(Partition::Unseen, vec![rental("a")]).await;
        assert!(matches!(result, Err(AppError::Persistence { .. })));
        assert!(store.contains_in(Partition::Unseen, "a"));
        assert!(store.novel(&[rental("a")]).is_empty());
    }
}
