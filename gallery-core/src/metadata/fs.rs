use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{
    group_counts, new_uuid_id, parse_uuid_id, ItemField, ItemFilter, MetadataError, MetadataResult,
    MetadataStore,
};
use crate::item::{ItemId, ItemPatch, ItemRecord, NewItem};

/// Metadata kept as one sidecar JSON document per item: `{root}/{id}.json`.
///
/// Queries scan the directory. Mutations hold `write_lock` across their
/// read-modify-write and land via temp file + rename, so a document is always
/// either the old or the new version.
pub struct FsMetadataStore {
    root: PathBuf,
    write_lock: Mutex<()>,
    closed: AtomicBool,
}

impl FsMetadataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
            closed: AtomicBool::new(true),
        }
    }

    /// Construct and open in one step.
    pub async fn open_at(root: impl Into<PathBuf>) -> MetadataResult<Self> {
        let store = Self::new(root);
        store.open().await?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_open(&self) -> MetadataResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MetadataError::Closed);
        }
        Ok(())
    }

    fn doc_path(&self, id: &ItemId) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    async fn read_doc(path: &Path) -> MetadataResult<Option<ItemRecord>> {
        let raw = match fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|source| MetadataError::Corrupt {
                location: path.display().to_string(),
                source,
            })
    }

    async fn write_doc(&self, record: &ItemRecord) -> MetadataResult<()> {
        let body = serde_json::to_vec_pretty(record).map_err(|source| MetadataError::Corrupt {
            location: record.id.to_string(),
            source,
        })?;
        let target = self.doc_path(&record.id);
        let temp = self.root.join(format!(".{}.json.tmp", record.id));

        let result = async {
            let mut file = fs::File::create(&temp).await?;
            file.write_all(&body).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp, &target).await
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Every readable record. Unparseable documents are logged and skipped.
    async fn scan(&self) -> MetadataResult<Vec<ItemRecord>> {
        let mut entries = fs::read_dir(&self.root).await?;
        let mut records = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_doc = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(".json") && !n.starts_with('.'))
                .unwrap_or(false);
            if !is_doc {
                continue;
            }

            match Self::read_doc(&path).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(MetadataError::Corrupt { location, source }) => {
                    tracing::warn!(%location, error = %source, "skipping unreadable metadata document");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(records)
    }
}

#[async_trait]
impl MetadataStore for FsMetadataStore {
    async fn open(&self) -> MetadataResult<()> {
        fs::create_dir_all(&self.root).await?;
        self.closed.store(false, Ordering::SeqCst);
        tracing::debug!(root = %self.root.display(), "metadata store opened");
        Ok(())
    }

    async fn close(&self) -> MetadataResult<()> {
        let _guard = self.write_lock.lock().await;
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn ping(&self) -> MetadataResult<()> {
        self.ensure_open()?;
        let meta = fs::metadata(&self.root).await?;
        if !meta.is_dir() {
            return Err(MetadataError::backend(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }
        Ok(())
    }

    fn parse_id(&self, raw: &str) -> MetadataResult<ItemId> {
        parse_uuid_id(raw)
    }

    async fn create(&self, item: NewItem) -> MetadataResult<ItemId> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock().await;

        let id = new_uuid_id();
        self.write_doc(&item.into_record(id.clone())).await?;
        Ok(id)
    }

    async fn find_by_id(&self, id: &ItemId) -> MetadataResult<Option<ItemRecord>> {
        self.ensure_open()?;
        Self::read_doc(&self.doc_path(id)).await
    }

    async fn find_by_section(&self, section: &str) -> MetadataResult<Vec<ItemRecord>> {
        self.ensure_open()?;
        let mut records = self.scan().await?;
        records.retain(|r| r.section == section);
        Ok(records)
    }

    async fn update(&self, id: &ItemId, patch: &ItemPatch) -> MetadataResult<ItemRecord> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock().await;

        let mut record = Self::read_doc(&self.doc_path(id))
            .await?
            .ok_or_else(|| MetadataError::not_found(id))?;
        patch.apply(&mut record);
        self.write_doc(&record).await?;
        Ok(record)
    }

    async fn delete(&self, id: &ItemId) -> MetadataResult<bool> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock().await;

        match fs::remove_file(self.doc_path(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn count_grouped_by(&self, field: ItemField) -> MetadataResult<BTreeMap<String, u64>> {
        self.ensure_open()?;
        let records = self.scan().await?;
        Ok(group_counts(&records, field))
    }

    async fn count_where(&self, filter: &ItemFilter) -> MetadataResult<u64> {
        self.ensure_open()?;
        let records = self.scan().await?;
        Ok(records.iter().filter(|r| filter.matches(r)).count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn new_item(section: &str, age_days: i64) -> NewItem {
        NewItem {
            section: section.into(),
            blob_key: format!("{section}/2024/01/x.jpg"),
            original_name: "x.jpg".into(),
            title: "Title".into(),
            description: "Desc".into(),
            materials: String::new(),
            dimensions: String::new(),
            upload_date: Utc::now() - Duration::days(age_days),
            content_type: "image/jpeg".into(),
            size_bytes: 10,
        }
    }

    async fn temp_store() -> (FsMetadataStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsMetadataStore::open_at(dir.path().join("items")).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("items");

        let store = FsMetadataStore::open_at(&root).await.unwrap();
        let id = store.create(new_item("paintings", 0)).await.unwrap();
        store.close().await.unwrap();

        let reopened = FsMetadataStore::open_at(&root).await.unwrap();
        let record = reopened.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(record.title, "Title");
        assert_eq!(record.section, "paintings");
    }

    #[tokio::test]
    async fn update_rewrites_document_in_place() {
        let (store, _dir) = temp_store().await;
        let id = store.create(new_item("drawings", 0)).await.unwrap();

        let patch = ItemPatch {
            description: Some(String::new()),
            ..Default::default()
        };
        store.update(&id, &patch).await.unwrap();

        let record = store.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(record.description, "");
        assert_eq!(record.title, "Title");

        let mut entries = fs::read_dir(store.root()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec![format!("{id}.json")]);
    }

    #[tokio::test]
    async fn counts_and_sections_scan_documents() {
        let (store, _dir) = temp_store().await;
        store.create(new_item("paintings", 0)).await.unwrap();
        store.create(new_item("paintings", 20)).await.unwrap();
        store.create(new_item("drawings", 40)).await.unwrap();

        let grouped = store.count_grouped_by(ItemField::Section).await.unwrap();
        assert_eq!(grouped.get("paintings"), Some(&2));
        assert_eq!(grouped.get("drawings"), Some(&1));

        let recent = ItemFilter::all().uploaded_since(Utc::now() - Duration::days(30));
        assert_eq!(store.count_where(&recent).await.unwrap(), 2);
        assert_eq!(store.find_by_section("drawings").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn corrupt_documents_are_skipped_by_scans() {
        let (store, _dir) = temp_store().await;
        store.create(new_item("paintings", 0)).await.unwrap();
        fs::write(store.root().join("garbage.json"), b"{not json").await.unwrap();

        assert_eq!(store.count_where(&ItemFilter::all()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_reports_absence() {
        let (store, _dir) = temp_store().await;
        let id = store.create(new_item("paintings", 0)).await.unwrap();
        assert!(store.delete(&id).await.unwrap());
        assert!(!store.delete(&id).await.unwrap());
    }

    #[tokio::test]
    async fn unopened_store_is_closed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsMetadataStore::new(dir.path().join("items"));
        assert!(matches!(store.ping().await, Err(MetadataError::Closed)));
    }
}
