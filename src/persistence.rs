//! Snapshot files.
//!
//! A snapshot directory holds `manifest.json` (snapshot id, timestamp,
//! index definitions) and `documents.jsonl` (one checksummed record per
//! document). Index structures are not persisted; recovery replays the
//! definitions over the restored documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};
use ulid::Ulid;
use xxhash_rust::xxh3::xxh3_64;

use crate::config::EngineConfig;
use crate::engine::{Engine, SearchCommands};
use crate::error::{Result, TesseraError};
use crate::schema::IndexDefinition;
use crate::types::{Document, DocumentKey, Fields};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const DOCUMENTS_FILE: &str = "documents.jsonl";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub id: Ulid,
    pub created_at: DateTime<Utc>,
    pub document_count: usize,
    /// xxh3 of the documents file as written.
    pub documents_checksum: u64,
    pub indexes: Vec<IndexDefinition>,
}

/// One line of the documents file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DocumentRecord {
    key: DocumentKey,
    version: u64,
    fields: Fields,
    checksum: u64,
}

impl DocumentRecord {
    fn new(doc: Document) -> Result<Self> {
        let checksum = Self::compute_checksum(&doc.key, doc.version, &doc.fields)?;
        Ok(Self {
            key: doc.key,
            version: doc.version,
            fields: doc.fields,
            checksum,
        })
    }

    fn compute_checksum(key: &str, version: u64, fields: &Fields) -> Result<u64> {
        let payload = serde_json::to_vec(&(key, version, fields))?;
        Ok(xxh3_64(&payload))
    }

    fn into_document(self) -> Result<Document> {
        let expected = Self::compute_checksum(&self.key, self.version, &self.fields)?;
        if expected != self.checksum {
            return Err(TesseraError::ChecksumMismatch {
                key: self.key,
                expected,
                actual: self.checksum,
            });
        }
        Ok(Document {
            key: self.key,
            version: self.version,
            fields: self.fields,
        })
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `bytes` next to `path` and rename over it.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = tmp_path(path);
    {
        let mut file = BufWriter::new(File::create(&tmp)?);
        file.write_all(bytes)?;
        file.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

impl Engine {
    /// Write a snapshot of every document and index definition into `dir`.
    #[instrument(skip(self), fields(dir = %dir.display()))]
    pub fn snapshot_to(&self, dir: &Path) -> Result<SnapshotManifest> {
        fs::create_dir_all(dir)?;
        let indexes = self.definitions();
        let docs = self.store().snapshot();
        let document_count = docs.len();

        let mut buf = Vec::new();
        for doc in docs {
            serde_json::to_writer(&mut buf, &DocumentRecord::new(doc)?)?;
            buf.push(b'\n');
        }
        let manifest = SnapshotManifest {
            id: Ulid::new(),
            created_at: Utc::now(),
            document_count,
            documents_checksum: xxh3_64(&buf),
            indexes,
        };

        write_atomic(&dir.join(DOCUMENTS_FILE), &buf)?;
        write_atomic(&dir.join(MANIFEST_FILE), &serde_json::to_vec_pretty(&manifest)?)?;

        info!(
            snapshot = %manifest.id,
            documents = document_count,
            indexes = manifest.indexes.len(),
            "wrote snapshot"
        );
        Ok(manifest)
    }

    /// Rebuild an engine from the snapshot in `dir`. A directory without a
    /// manifest yields an empty engine.
    #[instrument(skip(config), fields(dir = %dir.display()))]
    pub fn recover_from(config: EngineConfig, dir: &Path) -> Result<Self> {
        let engine = Engine::new(config);
        let Some((manifest, docs)) = read_snapshot(dir)? else {
            info!("no snapshot found, starting empty");
            return Ok(engine);
        };

        for doc in docs {
            engine.store().restore(doc);
        }
        for definition in manifest.indexes {
            engine.define_index(definition)?;
        }
        info!(
            snapshot = %manifest.id,
            documents = manifest.document_count,
            "recovered from snapshot"
        );
        Ok(engine)
    }
}

/// Read and verify a snapshot. `Ok(None)` if `dir` holds no manifest.
pub fn read_snapshot(dir: &Path) -> Result<Option<(SnapshotManifest, Vec<Document>)>> {
    let manifest_path = dir.join(MANIFEST_FILE);
    if !manifest_path.exists() {
        return Ok(None);
    }
    let manifest: SnapshotManifest = serde_json::from_slice(&fs::read(&manifest_path)?)?;

    let raw = fs::read(dir.join(DOCUMENTS_FILE))?;
    let actual = xxh3_64(&raw);
    if actual != manifest.documents_checksum {
        return Err(TesseraError::ChecksumMismatch {
            key: DOCUMENTS_FILE.to_string(),
            expected: manifest.documents_checksum,
            actual,
        });
    }

    let mut docs = Vec::with_capacity(manifest.document_count);
    for line in BufReader::new(raw.as_slice()).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: DocumentRecord = serde_json::from_str(&line)?;
        docs.push(record.into_document()?);
    }
    if docs.len() != manifest.document_count {
        return Err(TesseraError::Internal(format!(
            "snapshot lists {} documents, found {}",
            manifest.document_count,
            docs.len()
        )));
    }
    Ok(Some((manifest, docs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldValue;

    fn doc(key: &str) -> Document {
        Document {
            key: key.to_string(),
            version: 3,
            fields: Fields::from([
                ("title".to_string(), FieldValue::text("hello")),
                ("vec".to_string(), FieldValue::Vector(vec![0.1, 0.2, 0.3])),
            ]),
        }
    }

    #[test]
    fn test_record_checksum_roundtrip() {
        let record = DocumentRecord::new(doc("a")).unwrap();
        let line = serde_json::to_string(&record).unwrap();
        let back: DocumentRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(back.into_document().unwrap(), doc("a"));
    }

    #[test]
    fn test_tampered_record_rejected() {
        let mut record = DocumentRecord::new(doc("a")).unwrap();
        record.version = 4;
        assert!(matches!(
            record.into_document(),
            Err(TesseraError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_manifest_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_snapshot(dir.path()).unwrap().is_none());
    }
}
