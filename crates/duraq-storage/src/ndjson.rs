//! Newline-delimited-JSON file backend
//!
//! One UTF-8 file per queue under a base directory, one message record
//! object per line. Appends are flushed to durable storage before they
//! return; every other mutation goes through an atomic
//! write-temp-then-rename rewrite, so readers never observe a
//! partially-written file and a failed rewrite leaves the original
//! untouched.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use duraq_types::{Error, MessageRecord, Result};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::traits::RecordStore;

/// File extension for queue files
const QUEUE_FILE_SUFFIX: &str = ".ndjson";

/// Suffix of the scratch file used during rewrites
const TEMP_FILE_SUFFIX: &str = ".ndjson.tmp";

/// Ceiling on any single store operation. A stuck filesystem surfaces as
/// an i/o failure instead of blocking the caller indefinitely; the
/// operation's outcome is then unknown to the caller.
const IO_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

async fn timed<T>(
    path: &Path,
    op: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(IO_TIMEOUT, op).await {
        Ok(result) => result,
        Err(_) => Err(Error::io(
            path,
            std::io::Error::new(std::io::ErrorKind::TimedOut, "file operation timed out"),
        )),
    }
}

/// NDJSON file store implementation
pub struct NdjsonStore {
    /// Root directory holding one file per queue
    base_dir: PathBuf,
}

impl NdjsonStore {
    /// Create a store rooted at the given directory. The directory is
    /// created lazily on first write.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        info!(base_dir = %base_dir.display(), "Initializing NDJSON record store");
        Self { base_dir }
    }

    /// Path of the queue's backing file
    pub fn queue_path(&self, queue: &str) -> PathBuf {
        self.base_dir.join(format!("{queue}{QUEUE_FILE_SUFFIX}"))
    }

    fn temp_path(&self, queue: &str) -> PathBuf {
        self.base_dir.join(format!("{queue}{TEMP_FILE_SUFFIX}"))
    }

    async fn ensure_base_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| Error::io(&self.base_dir, e))
    }
}

fn encode_lines(records: &[MessageRecord]) -> Result<String> {
    let mut out = String::new();
    for record in records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    Ok(out)
}

fn decode_lines(contents: &str) -> Result<Vec<MessageRecord>> {
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(Error::from))
        .collect()
}

#[async_trait]
impl RecordStore for NdjsonStore {
    async fn append(&self, queue: &str, record: &MessageRecord) -> Result<()> {
        self.ensure_base_dir().await?;
        let path = self.queue_path(queue);

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        timed(&path, async {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .map_err(|e| Error::io(&path, e))?;
            file.write_all(line.as_bytes())
                .await
                .map_err(|e| Error::io(&path, e))?;
            file.sync_all().await.map_err(|e| Error::io(&path, e))
        })
        .await?;

        debug!(
            queue = %queue,
            message_id = %record.message_id,
            "Record appended"
        );
        Ok(())
    }

    async fn load_all(&self, queue: &str) -> Result<Vec<MessageRecord>> {
        let path = self.queue_path(queue);
        let contents = timed(&path, async {
            match fs::read_to_string(&path).await {
                Ok(contents) => Ok(Some(contents)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(Error::io(&path, e)),
            }
        })
        .await?;

        match contents {
            Some(contents) => decode_lines(&contents),
            None => Ok(Vec::new()),
        }
    }

    async fn rewrite_all(&self, queue: &str, records: &[MessageRecord]) -> Result<()> {
        self.ensure_base_dir().await?;
        let path = self.queue_path(queue);
        let temp = self.temp_path(queue);

        let contents = encode_lines(records)?;

        // Write the full record set to a scratch file in the same
        // directory, then rename over the original. Rename is atomic for
        // same-volume moves, so the original is either fully replaced or
        // untouched.
        timed(&path, async {
            let mut file = fs::File::create(&temp)
                .await
                .map_err(|e| Error::io(&temp, e))?;
            file.write_all(contents.as_bytes())
                .await
                .map_err(|e| Error::io(&temp, e))?;
            file.sync_all().await.map_err(|e| Error::io(&temp, e))?;
            drop(file);

            fs::rename(&temp, &path)
                .await
                .map_err(|e| Error::io(&path, e))
        })
        .await?;

        debug!(queue = %queue, records = records.len(), "Record set rewritten");
        Ok(())
    }

    async fn list_queues(&self) -> Result<Vec<String>> {
        let mut entries = match fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(&self.base_dir, e)),
        };

        let mut queues = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::io(&self.base_dir, e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(queue) = name.strip_suffix(QUEUE_FILE_SUFFIX) {
                queues.push(queue.to_string());
            }
        }
        queues.sort();
        Ok(queues)
    }

    async fn remove(&self, queue: &str) -> Result<()> {
        let path = self.queue_path(queue);
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!(queue = %queue, "Queue file removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, NdjsonStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = NdjsonStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn test_append_and_load_preserve_order() {
        let (_dir, store) = store();

        for body in ["a", "b", "c"] {
            store
                .append("orders", &MessageRecord::new(body))
                .await
                .unwrap();
        }

        let records = store.load_all("orders").await.unwrap();
        let bodies: Vec<&str> = records.iter().map(|r| r.body.as_str()).collect();
        assert_eq!(bodies, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_load_missing_queue_is_empty() {
        let (_dir, store) = store();
        assert!(store.load_all("nothing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rewrite_replaces_contents() {
        let (_dir, store) = store();

        store
            .append("q", &MessageRecord::new("old"))
            .await
            .unwrap();

        let replacement = vec![MessageRecord::new("new-1"), MessageRecord::new("new-2")];
        store.rewrite_all("q", &replacement).await.unwrap();

        let records = store.load_all("q").await.unwrap();
        let bodies: Vec<&str> = records.iter().map(|r| r.body.as_str()).collect();
        assert_eq!(bodies, ["new-1", "new-2"]);
    }

    #[tokio::test]
    async fn test_rewrite_leaves_no_scratch_file() {
        let (dir, store) = store();
        store
            .rewrite_all("q", &[MessageRecord::new("x")])
            .await
            .unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .filter(|name| name.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "scratch files left: {leftovers:?}");
    }

    #[tokio::test]
    async fn test_rewrite_with_empty_set_empties_the_queue() {
        let (_dir, store) = store();
        store.append("q", &MessageRecord::new("x")).await.unwrap();
        store.rewrite_all("q", &[]).await.unwrap();
        assert!(store.load_all("q").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mutable_fields_survive_rewrite() {
        let (_dir, store) = store();

        let mut record = MessageRecord::new("leased");
        record.receive_count = 2;
        record.lease_owner_handle = Some("handle-1".into());
        record.deleted = true;
        store.rewrite_all("q", &[record.clone()]).await.unwrap();

        let loaded = &store.load_all("q").await.unwrap()[0];
        assert_eq!(loaded.receive_count, 2);
        assert_eq!(loaded.lease_owner_handle.as_deref(), Some("handle-1"));
        assert!(loaded.deleted);
    }

    #[tokio::test]
    async fn test_list_queues_ignores_foreign_files() {
        let (dir, store) = store();
        store.append("beta", &MessageRecord::new("x")).await.unwrap();
        store.append("alpha", &MessageRecord::new("y")).await.unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        assert_eq!(store.list_queues().await.unwrap(), ["alpha", "beta"]);
    }

    #[tokio::test]
    async fn test_remove_missing_queue_is_ok() {
        let (_dir, store) = store();
        store.remove("ghost").await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_line_is_a_serialization_error() {
        let (dir, store) = store();
        std::fs::write(dir.path().join("bad.ndjson"), "{not json\n").unwrap();

        let err = store.load_all("bad").await.unwrap_err();
        assert!(matches!(err, Error::Serialization(_)), "got {err:?}");
    }
}
