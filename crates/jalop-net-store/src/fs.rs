//! Filesystem implementation of the RecordStore trait.
//!
//! This is the primary storage backend. Every operation runs on the
//! blocking pool via `tokio::task::spawn_blocking`.
//!
//! ```text
//! <root>/<publisher>/<type>/0000000001/status.json
//!                                     /sys_metadata.xml
//!                                     /app_metadata.xml
//!                                     /payload
//! <root>/<publisher>/<type>/last_confirmed.json
//! <root>/<type>/0000000001/...            (confirmed)
//! ```

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use jalop_net_core::{PublisherId, RecordId, RecordLengths, RecordPart, RecordType};

use crate::error::{Result, StoreError};
use crate::status::RecordStatus;
use crate::traits::{ConfirmedRecord, RecordSlot, RecordStore, TempRecord};

pub const STATUS_FILENAME: &str = "status.json";
pub const SYS_METADATA_FILENAME: &str = "sys_metadata.xml";
pub const APP_METADATA_FILENAME: &str = "app_metadata.xml";
pub const PAYLOAD_FILENAME: &str = "payload";
pub const CONFIRMED_MARKER_FILENAME: &str = "confirmed";
pub const LAST_CONFIRMED_FILENAME: &str = "last_confirmed.json";
pub const NEXT_SEQ_FILENAME: &str = "next_seq.json";

fn part_filename(part: RecordPart) -> &'static str {
    match part {
        RecordPart::SystemMetadata => SYS_METADATA_FILENAME,
        RecordPart::ApplicationMetadata => APP_METADATA_FILENAME,
        RecordPart::Payload => PAYLOAD_FILENAME,
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LastConfirmed {
    record_id: RecordId,
}

/// Per-namespace high-water mark; numbers below `next` are never handed out again.
#[derive(Debug, Serialize, Deserialize)]
struct SeqMark {
    next: u64,
}

/// Filesystem-based store implementation.
///
/// Sequence allocation and confirmation are serialized by an internal
/// mutex; all other operations touch a single record directory.
#[derive(Clone)]
pub struct FsRecordStore {
    layout: Arc<Layout>,
    alloc: Arc<Mutex<()>>,
}

struct Layout {
    root: PathBuf,
    create_confirmed_file: bool,
}

impl FsRecordStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            layout: Arc::new(Layout {
                root,
                create_confirmed_file: false,
            }),
            alloc: Arc::new(Mutex::new(())),
        })
    }

    /// Also write an empty `confirmed` marker into confirmed records.
    pub fn with_confirmed_marker(self, enabled: bool) -> Self {
        Self {
            layout: Arc::new(Layout {
                root: self.layout.root.clone(),
                create_confirmed_file: enabled,
            }),
            alloc: self.alloc,
        }
    }

    pub fn root(&self) -> &Path {
        &self.layout.root
    }

    /// Directory of a temporary record.
    pub fn temp_dir(&self, slot: &RecordSlot) -> PathBuf {
        self.layout.temp_dir(slot)
    }

    /// Directory of a confirmed record.
    pub fn confirmed_dir(&self, record_type: RecordType, seq: u64) -> PathBuf {
        self.layout.confirmed_namespace(record_type).join(seq_dirname(seq))
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Layout) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let layout = Arc::clone(&self.layout);
        tokio::task::spawn_blocking(move || f(&layout))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    async fn blocking_locked<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Layout) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let alloc = Arc::clone(&self.alloc);
        self.blocking(move |layout| {
            let _guard = alloc.lock().map_err(|_| StoreError::LockPoisoned)?;
            f(layout)
        })
        .await
    }
}

fn seq_dirname(seq: u64) -> String {
    format!("{:010}", seq)
}

impl Layout {
    fn temp_namespace(&self, publisher_id: &PublisherId, record_type: RecordType) -> PathBuf {
        self.root
            .join(publisher_id.to_string())
            .join(record_type.as_str())
    }

    fn temp_dir(&self, slot: &RecordSlot) -> PathBuf {
        self.temp_namespace(&slot.publisher_id, slot.record_type)
            .join(seq_dirname(slot.seq))
    }

    fn confirmed_namespace(&self, record_type: RecordType) -> PathBuf {
        self.root.join(record_type.as_str())
    }

    /// Sequence numbers of the record directories under `dir`, ascending.
    fn scan_seqs(dir: &Path) -> Result<Vec<u64>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut seqs = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(seq) = entry.file_name().to_str().and_then(|n| n.parse::<u64>().ok()) {
                seqs.push(seq);
            }
        }
        seqs.sort_unstable();
        Ok(seqs)
    }

    /// Allocate the next sequence number of a namespace.
    ///
    /// The persisted mark and the directories on disk are both consulted,
    /// so a missing or stale mark never lets a number be reused.
    fn next_seq(dir: &Path) -> Result<u64> {
        let mark_path = dir.join(NEXT_SEQ_FILENAME);
        let marked = fs::read(&mark_path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<SeqMark>(&bytes).ok())
            .map(|m| m.next)
            .unwrap_or(1);
        let scanned = Self::scan_seqs(dir)?.last().map(|s| s + 1).unwrap_or(1);
        let seq = marked.max(scanned);

        let tmp = dir.join(format!("{}.tmp", NEXT_SEQ_FILENAME));
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&serde_json::to_vec(&SeqMark { next: seq + 1 })?)?;
        file.sync_all()?;
        fs::rename(&tmp, &mark_path)?;
        Ok(seq)
    }

    fn write_status(dir: &Path, status: &RecordStatus) -> Result<()> {
        let tmp = dir.join(format!("{}.tmp", STATUS_FILENAME));
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&status.to_json()?)?;
        file.sync_all()?;
        fs::rename(&tmp, dir.join(STATUS_FILENAME))?;
        Ok(())
    }

    fn read_status(dir: &Path) -> Option<RecordStatus> {
        fs::read(dir.join(STATUS_FILENAME))
            .ok()
            .and_then(|bytes| RecordStatus::from_json(&bytes))
    }

    fn file_len(path: &Path) -> Result<u64> {
        match fs::metadata(path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn existing_dir(&self, slot: &RecordSlot) -> Result<PathBuf> {
        let dir = self.temp_dir(slot);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(StoreError::NotFound(slot.to_string()))
        }
    }
}

#[async_trait]
impl RecordStore for FsRecordStore {
    async fn create(
        &self,
        publisher_id: &PublisherId,
        record_type: RecordType,
        record_id: &RecordId,
        declared: RecordLengths,
    ) -> Result<RecordSlot> {
        let publisher_id = *publisher_id;
        let record_id = record_id.clone();

        self.blocking_locked(move |layout| {
            let namespace = layout.temp_namespace(&publisher_id, record_type);
            fs::create_dir_all(&namespace)?;
            let slot = RecordSlot {
                publisher_id,
                record_type,
                seq: Layout::next_seq(&namespace)?,
            };
            let dir = layout.temp_dir(&slot);
            fs::create_dir(&dir)?;
            Layout::write_status(&dir, &RecordStatus::new(record_id, declared))?;
            Ok(slot)
        })
        .await
    }

    async fn append(&self, slot: &RecordSlot, part: RecordPart, bytes: &[u8]) -> Result<u64> {
        let slot = *slot;
        let bytes = bytes.to_vec();

        self.blocking(move |layout| {
            let dir = layout.existing_dir(&slot)?;
            let path = dir.join(part_filename(part));
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            file.write_all(&bytes)?;
            file.flush()?;
            let total = Layout::file_len(&path)?;

            if let Some(mut status) = Layout::read_status(&dir) {
                status.progress.set(part, total);
                Layout::write_status(&dir, &status)?;
            }
            Ok(total)
        })
        .await
    }

    async fn status(&self, slot: &RecordSlot) -> Result<Option<RecordStatus>> {
        let slot = *slot;
        self.blocking(move |layout| Ok(Layout::read_status(&layout.temp_dir(&slot))))
            .await
    }

    async fn write_status(&self, slot: &RecordSlot, status: &RecordStatus) -> Result<()> {
        let slot = *slot;
        let status = status.clone();
        self.blocking(move |layout| {
            let dir = layout.existing_dir(&slot)?;
            Layout::write_status(&dir, &status)
        })
        .await
    }

    async fn read_payload(&self, slot: &RecordSlot) -> Result<Vec<u8>> {
        let slot = *slot;
        self.blocking(move |layout| {
            let dir = layout.existing_dir(&slot)?;
            match fs::read(dir.join(PAYLOAD_FILENAME)) {
                Ok(bytes) => Ok(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn clear_metadata(&self, slot: &RecordSlot) -> Result<()> {
        let slot = *slot;
        self.blocking(move |layout| {
            let dir = layout.existing_dir(&slot)?;
            for name in [SYS_METADATA_FILENAME, APP_METADATA_FILENAME] {
                match fs::remove_file(dir.join(name)) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
            if let Some(mut status) = Layout::read_status(&dir) {
                status.progress.system_metadata = 0;
                status.progress.application_metadata = 0;
                Layout::write_status(&dir, &status)?;
            }
            Ok(())
        })
        .await
    }

    async fn list_temp(
        &self,
        publisher_id: &PublisherId,
        record_type: RecordType,
    ) -> Result<Vec<TempRecord>> {
        let publisher_id = *publisher_id;
        self.blocking(move |layout| {
            let namespace = layout.temp_namespace(&publisher_id, record_type);
            let mut records = Vec::new();
            for seq in Layout::scan_seqs(&namespace)? {
                let slot = RecordSlot {
                    publisher_id,
                    record_type,
                    seq,
                };
                let dir = layout.temp_dir(&slot);
                records.push(TempRecord {
                    slot,
                    status: Layout::read_status(&dir),
                    payload_len: Layout::file_len(&dir.join(PAYLOAD_FILENAME))?,
                });
            }
            Ok(records)
        })
        .await
    }

    async fn confirm(&self, slot: &RecordSlot) -> Result<ConfirmedRecord> {
        let slot = *slot;
        self.blocking_locked(move |layout| {
            let dir = layout.existing_dir(&slot)?;
            let mut status = Layout::read_status(&dir).ok_or_else(|| {
                StoreError::InvalidData(format!("{} has no readable status marker", slot))
            })?;
            status.confirmed = true;
            Layout::write_status(&dir, &status)?;

            let confirmed_ns = layout.confirmed_namespace(slot.record_type);
            fs::create_dir_all(&confirmed_ns)?;
            let seq = Layout::next_seq(&confirmed_ns)?;
            let dest = confirmed_ns.join(seq_dirname(seq));
            fs::rename(&dir, &dest)?;

            if layout.create_confirmed_file {
                fs::File::create(dest.join(CONFIRMED_MARKER_FILENAME))?;
            }

            let pointer = LastConfirmed {
                record_id: status.record_id.clone(),
            };
            let namespace = layout.temp_namespace(&slot.publisher_id, slot.record_type);
            fs::write(
                namespace.join(LAST_CONFIRMED_FILENAME),
                serde_json::to_vec(&pointer)?,
            )?;

            Ok(ConfirmedRecord {
                record_type: slot.record_type,
                seq,
                record_id: status.record_id,
            })
        })
        .await
    }

    async fn delete(&self, slot: &RecordSlot) -> Result<()> {
        let slot = *slot;
        self.blocking(move |layout| match fs::remove_dir_all(layout.temp_dir(&slot)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        })
        .await
    }

    async fn last_confirmed(
        &self,
        publisher_id: &PublisherId,
        record_type: RecordType,
    ) -> Result<Option<RecordId>> {
        let publisher_id = *publisher_id;
        self.blocking(move |layout| {
            let path = layout
                .temp_namespace(&publisher_id, record_type)
                .join(LAST_CONFIRMED_FILENAME);
            match fs::read(path) {
                Ok(bytes) => {
                    let pointer: LastConfirmed = serde_json::from_slice(&bytes)?;
                    Ok(Some(pointer.record_id))
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn list_confirmed(&self, record_type: RecordType) -> Result<Vec<ConfirmedRecord>> {
        self.blocking(move |layout| {
            let namespace = layout.confirmed_namespace(record_type);
            let mut records = Vec::new();
            for seq in Layout::scan_seqs(&namespace)? {
                let dir = namespace.join(seq_dirname(seq));
                if let Some(status) = Layout::read_status(&dir) {
                    records.push(ConfirmedRecord {
                        record_type,
                        seq,
                        record_id: status.record_id,
                    });
                }
            }
            Ok(records)
        })
        .await
    }
}
