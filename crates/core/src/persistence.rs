use crate::config::StorageLayout;
use crate::error::PersistenceError;
use crate::models::{Chunk, DocumentRecord};
use crate::stores::{Bm25Store, FlatVectorStore};
use crate::traits::VectorIndex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info, warn};

pub type DocumentMap = BTreeMap<String, DocumentRecord>;

#[derive(Debug, Default)]
pub struct LoadedSnapshot {
    pub vectors: Option<FlatVectorStore>,
    pub chunks: Option<Vec<Chunk>>,
    pub documents: Option<DocumentMap>,
    pub keyword: Option<Bm25Store>,
}

pub struct SnapshotRefs<'a> {
    pub vectors: &'a FlatVectorStore,
    pub chunks: &'a [Chunk],
    pub documents: &'a DocumentMap,
    pub keyword: Option<&'a Bm25Store>,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    layout: StorageLayout,
}

impl SnapshotStore {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn save(&self, snapshot: SnapshotRefs<'_>) -> Result<(), PersistenceError> {
        write_json(&self.layout.vectors_path(), snapshot.vectors)?;
        write_json(&self.layout.chunks_path(), snapshot.chunks)?;
        write_json(&self.layout.documents_path(), snapshot.documents)?;
        if let Some(keyword) = snapshot.keyword {
            write_json(&self.layout.keyword_index_path(), keyword)?;
        }

        debug!(
            root = %self.layout.root().display(),
            chunks = snapshot.chunks.len(),
            documents = snapshot.documents.len(),
            "saved snapshot"
        );
        Ok(())
    }

    pub fn load(&self) -> LoadedSnapshot {
        let snapshot = LoadedSnapshot {
            vectors: read_artifact(&self.layout.vectors_path()),
            chunks: read_artifact(&self.layout.chunks_path()),
            documents: read_artifact(&self.layout.documents_path()),
            keyword: read_artifact(&self.layout.keyword_index_path()),
        };

        if let Some(vectors) = &snapshot.vectors {
            info!(count = vectors.len(), "loaded vector index");
        }
        if let Some(chunks) = &snapshot.chunks {
            info!(count = chunks.len(), "loaded chunks");
        }
        if let Some(documents) = &snapshot.documents {
            info!(count = documents.len(), "loaded document metadata");
        }
        if snapshot.keyword.is_some() {
            info!("loaded keyword index");
        }

        snapshot
    }
}

fn read_artifact<T: DeserializeOwned>(path: &Path) -> Option<T> {
    match read_json(path) {
        Ok(value) => value,
        Err(error) => {
            warn!(%error, "treating snapshot artifact as absent");
            None
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistenceError> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PersistenceError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_slice(&raw)
        .map(Some)
        .map_err(|source| PersistenceError::Serialization {
            path: path.to_path_buf(),
            source,
        })
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let io_error = |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }

    let data = serde_json::to_vec(value).map_err(|source| PersistenceError::Serialization {
        path: path.to_path_buf(),
        source,
    })?;

    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, data).map_err(io_error)?;
    fs::rename(&temp_path, path).map_err(io_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::KeywordIndex;
    use tempfile::tempdir;

    fn sample_chunk() -> Chunk {
        Chunk {
            id: Chunk::make_id("doc", 1, 0),
            document_id: "doc".to_string(),
            filename: "doc.pdf".to_string(),
            page_number: 1,
            chunk_index: 0,
            content: "mechanical room".to_string(),
        }
    }

    #[test]
    fn missing_artifacts_load_as_absent() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = SnapshotStore::new(StorageLayout::new(dir.path()));

        let loaded = store.load();
        assert!(loaded.vectors.is_none());
        assert!(loaded.chunks.is_none());
        assert!(loaded.documents.is_none());
        assert!(loaded.keyword.is_none());
        Ok(())
    }

    #[test]
    fn artifacts_round_trip() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = SnapshotStore::new(StorageLayout::new(dir.path().join("nested")));

        let mut vectors = FlatVectorStore::new(3);
        vectors.add(&[vec![0.1, 0.2, 0.3]])?;
        let chunks = vec![sample_chunk()];
        let mut keyword = Bm25Store::default();
        keyword.rebuild(&chunks);
        let mut documents = DocumentMap::new();
        documents.insert(
            "doc".to_string(),
            DocumentRecord {
                document_id: "doc".to_string(),
                filename: "doc.pdf".to_string(),
                storage_path: "/tmp/doc.pdf".to_string(),
                chunk_count: 1,
                ingested_at: None,
            },
        );

        store.save(SnapshotRefs {
            vectors: &vectors,
            chunks: &chunks,
            documents: &documents,
            keyword: Some(&keyword),
        })?;

        let loaded = store.load();
        assert_eq!(loaded.vectors, Some(vectors));
        assert_eq!(loaded.chunks, Some(chunks));
        assert_eq!(loaded.documents, Some(documents));
        assert_eq!(loaded.keyword, Some(keyword));
        Ok(())
    }

    #[test]
    fn corrupt_artifact_is_treated_as_absent() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let layout = StorageLayout::new(dir.path());
        fs::write(layout.chunks_path(), b"{not json")?;
        fs::write(layout.documents_path(), b"{}")?;

        let loaded = SnapshotStore::new(layout).load();
        assert!(loaded.chunks.is_none());
        assert_eq!(loaded.documents.map(|documents| documents.len()), Some(0));
        Ok(())
    }
}
