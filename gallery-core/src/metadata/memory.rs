use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{
    group_counts, new_uuid_id, parse_uuid_id, ItemField, ItemFilter, MetadataError, MetadataResult,
    MetadataStore,
};
use crate::item::{ItemId, ItemPatch, ItemRecord, NewItem};

/// Process-local metadata store with test hooks for injecting failures.
#[derive(Clone, Default)]
pub struct MemoryMetadataStore {
    records: Arc<RwLock<HashMap<ItemId, ItemRecord>>>,
    closed: Arc<AtomicBool>,
    fail_creates: Arc<AtomicBool>,
    fail_updates: Arc<AtomicBool>,
    fail_deletes: Arc<AtomicBool>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Insert a record verbatim (ids and dates included). Test seeding only.
    pub fn insert_record(&self, record: ItemRecord) {
        self.records.write().insert(record.id.clone(), record);
    }

    pub fn set_fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    fn ensure_open(&self) -> MetadataResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MetadataError::Closed);
        }
        Ok(())
    }

    fn check(flag: &AtomicBool, op: &str) -> MetadataResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(MetadataError::backend(format!("injected {op} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn open(&self) -> MetadataResult<()> {
        self.closed.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> MetadataResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn ping(&self) -> MetadataResult<()> {
        self.ensure_open()
    }

    fn parse_id(&self, raw: &str) -> MetadataResult<ItemId> {
        parse_uuid_id(raw)
    }

    async fn create(&self, item: NewItem) -> MetadataResult<ItemId> {
        self.ensure_open()?;
        Self::check(&self.fail_creates, "create")?;

        let id = new_uuid_id();
        self.records
            .write()
            .insert(id.clone(), item.into_record(id.clone()));
        Ok(id)
    }

    async fn find_by_id(&self, id: &ItemId) -> MetadataResult<Option<ItemRecord>> {
        self.ensure_open()?;
        Ok(self.records.read().get(id).cloned())
    }

    async fn find_by_section(&self, section: &str) -> MetadataResult<Vec<ItemRecord>> {
        self.ensure_open()?;
        Ok(self
            .records
            .read()
            .values()
            .filter(|r| r.section == section)
            .cloned()
            .collect())
    }

    async fn update(&self, id: &ItemId, patch: &ItemPatch) -> MetadataResult<ItemRecord> {
        self.ensure_open()?;
        Self::check(&self.fail_updates, "update")?;

        let mut records = self.records.write();
        let record = records.get_mut(id).ok_or_else(|| MetadataError::not_found(id))?;
        patch.apply(record);
        Ok(record.clone())
    }

    async fn delete(&self, id: &ItemId) -> MetadataResult<bool> {
        self.ensure_open()?;
        Self::check(&self.fail_deletes, "delete")?;
        Ok(self.records.write().remove(id).is_some())
    }

    async fn count_grouped_by(&self, field: ItemField) -> MetadataResult<BTreeMap<String, u64>> {
        self.ensure_open()?;
        Ok(group_counts(self.records.read().values(), field))
    }

    async fn count_where(&self, filter: &ItemFilter) -> MetadataResult<u64> {
        self.ensure_open()?;
        Ok(self.records.read().values().filter(|r| filter.matches(r)).count() as u64)
    }
}
