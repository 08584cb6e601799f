//! On-disk generation store.
//!
//! Layout under the store root:
//!
//! ```text
//! CURRENT                  name of the served generation directory
//! .build.lock              present while a writer holds the store
//! generations/gen-000007/  manifest.json, vectors.bin, documents.json, index.bin
//! ```
//!
//! A generation is written into a staging directory inside the root,
//! renamed into `generations/` in one step, and only then made current
//! by atomically replacing `CURRENT`. Readers resolve `CURRENT` once, so
//! they see either the previous generation or the new one, never a mix.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::lock::BuildLock;
use super::manifest::{
    ArtifactInfo, ArtifactSet, DOCUMENTS_FILE, GenerationManifest, INDEX_FILE, MANIFEST_FILE,
    MANIFEST_FORMAT_VERSION, VECTORS_FILE,
};
use crate::documents::MetadataStore;
use crate::error::{IndexError, IndexResult, IoResultExt};
use crate::vector::{FlatIndex, MmapVectorStorage};

pub const CURRENT_FILE: &str = "CURRENT";
pub const GENERATIONS_DIR: &str = "generations";

const GENERATION_PREFIX: &str = "gen-";
const STAGING_PREFIX: &str = ".staging-";

/// Encoded artifacts of a generation that has not been published yet.
#[derive(Debug, Clone)]
pub struct StagedGeneration {
    pub dim: usize,
    pub vector_count: usize,
    pub model: String,
    pub vectors: Vec<u8>,
    pub documents: Vec<u8>,
    pub index: Vec<u8>,
}

/// A verified generation, ready to serve.
#[derive(Debug)]
pub struct LoadedGeneration {
    pub manifest: GenerationManifest,
    pub index: FlatIndex,
    pub metadata: MetadataStore,
    pub path: PathBuf,
}

/// Listing entry for one generation directory.
#[derive(Debug, Clone)]
pub struct GenerationInfo {
    pub generation: u64,
    pub path: PathBuf,
    /// `None` when the manifest is missing or unreadable.
    pub manifest: Option<GenerationManifest>,
    pub is_current: bool,
}

#[derive(Debug, Clone)]
pub struct GenerationStore {
    root: PathBuf,
}

impl GenerationStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn generations_dir(&self) -> PathBuf {
        self.root.join(GENERATIONS_DIR)
    }

    #[must_use]
    pub fn generation_dir(&self, generation: u64) -> PathBuf {
        self.generations_dir().join(generation_dir_name(generation))
    }

    /// Takes the single-writer lock for this store.
    pub fn lock(&self) -> IndexResult<BuildLock> {
        BuildLock::acquire(&self.root)
    }

    /// Generation numbers present on disk, ascending.
    pub fn generation_numbers(&self) -> IndexResult<Vec<u64>> {
        let dir = self.generations_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(IndexError::FileRead { path: dir, source }),
        };

        let mut numbers = Vec::new();
        for entry in entries {
            let entry = entry.read_context(&dir)?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(generation) = entry.file_name().to_str().and_then(parse_generation_dir) {
                numbers.push(generation);
            }
        }
        numbers.sort_unstable();
        Ok(numbers)
    }

    /// Next number to publish: one past the largest on disk.
    pub fn next_generation(&self) -> IndexResult<u64> {
        Ok(self.generation_numbers()?.last().map_or(1, |n| n + 1))
    }

    /// The generation `CURRENT` points at, if any.
    pub fn current_generation(&self) -> IndexResult<Option<u64>> {
        let path = self.root.join(CURRENT_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(IndexError::FileRead { path, source }),
        };
        parse_generation_dir(content.trim())
            .map(Some)
            .ok_or_else(|| IndexError::Serialization {
                path,
                reason: format!("unexpected pointer contents '{}'", content.trim()),
            })
    }

    /// Writes a staged generation and makes it current.
    ///
    /// Nothing becomes visible to readers until the final pointer swap.
    /// On any error the previous generation stays current.
    pub fn publish(
        &self,
        lock: &BuildLock,
        staged: StagedGeneration,
    ) -> IndexResult<GenerationManifest> {
        self.check_lock(lock)?;

        let generations_dir = self.generations_dir();
        fs::create_dir_all(&generations_dir).write_context(&generations_dir)?;
        let generation = self.next_generation()?;

        // Dropping the temp dir removes a half-written staging area.
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.root)
            .write_context(&self.root)?;

        write_synced(&staging.path().join(VECTORS_FILE), &staged.vectors)?;
        write_synced(&staging.path().join(DOCUMENTS_FILE), &staged.documents)?;
        write_synced(&staging.path().join(INDEX_FILE), &staged.index)?;

        let manifest = GenerationManifest::new(
            generation,
            staged.dim,
            staged.vector_count,
            staged.model,
            ArtifactSet {
                vectors: ArtifactInfo::describe(VECTORS_FILE, &staged.vectors),
                documents: ArtifactInfo::describe(DOCUMENTS_FILE, &staged.documents),
                index: ArtifactInfo::describe(INDEX_FILE, &staged.index),
            },
        );
        manifest.save(staging.path())?;
        sync_dir(staging.path())?;

        let final_dir = self.generation_dir(generation);
        fs::rename(staging.path(), &final_dir).write_context(&final_dir)?;
        sync_dir(&generations_dir)?;

        self.write_current(generation)?;

        tracing::info!(
            generation,
            vectors = manifest.vector_count,
            dim = manifest.dim,
            path = %final_dir.display(),
            "published generation"
        );
        Ok(manifest)
    }

    /// Loads and verifies the current generation.
    pub fn load_current(&self) -> IndexResult<LoadedGeneration> {
        let generation = self
            .current_generation()?
            .ok_or_else(|| IndexError::NoGeneration {
                path: self.root.clone(),
            })?;
        self.load(generation)
    }

    /// Loads one generation and verifies it end to end.
    ///
    /// # Errors
    /// - `GenerationNotFound` if the directory does not exist
    /// - `GenerationInconsistent` on any checksum, shape or row mismatch
    /// - `EmptyIndex` if the generation holds no vectors
    pub fn load(&self, generation: u64) -> IndexResult<LoadedGeneration> {
        let dir = self.generation_dir(generation);
        if !dir.is_dir() {
            return Err(IndexError::GenerationNotFound {
                generation,
                path: self.root.clone(),
            });
        }
        let inconsistent =
            |reason: String| IndexError::GenerationInconsistent { generation, reason };

        let manifest = GenerationManifest::load(&dir)
            .map_err(|e| inconsistent(format!("{MANIFEST_FILE}: {e}")))?;
        if manifest.format_version > MANIFEST_FORMAT_VERSION {
            return Err(inconsistent(format!(
                "manifest format {} is newer than supported {MANIFEST_FORMAT_VERSION}",
                manifest.format_version
            )));
        }
        if manifest.generation != generation {
            return Err(inconsistent(format!(
                "manifest describes generation {}",
                manifest.generation
            )));
        }

        let storage = MmapVectorStorage::open(dir.join(VECTORS_FILE))
            .map_err(|e| inconsistent(format!("{VECTORS_FILE}: {e}")))?;
        manifest
            .artifacts
            .vectors
            .verify(storage.as_bytes())
            .map_err(&inconsistent)?;

        let documents_path = dir.join(DOCUMENTS_FILE);
        let documents = fs::read(&documents_path)
            .map_err(|e| inconsistent(format!("{DOCUMENTS_FILE}: {e}")))?;
        manifest
            .artifacts
            .documents
            .verify(&documents)
            .map_err(&inconsistent)?;
        let metadata = MetadataStore::deserialize(&documents)
            .map_err(|e| inconsistent(format!("{DOCUMENTS_FILE}: {e}")))?;

        let index_path = dir.join(INDEX_FILE);
        let index_bytes =
            fs::read(&index_path).map_err(|e| inconsistent(format!("{INDEX_FILE}: {e}")))?;
        manifest
            .artifacts
            .index
            .verify(&index_bytes)
            .map_err(&inconsistent)?;
        let index = FlatIndex::deserialize(&index_bytes)
            .map_err(|e| inconsistent(format!("{INDEX_FILE}: {e}")))?;

        let vector_count = storage.vector_count();
        if index.len() != vector_count {
            return Err(inconsistent(format!(
                "vector data holds {vector_count} rows but the index holds {}",
                index.len()
            )));
        }
        if metadata.len() != vector_count {
            return Err(inconsistent(format!(
                "vector data holds {vector_count} rows but metadata holds {} documents",
                metadata.len()
            )));
        }
        if manifest.vector_count != vector_count {
            return Err(inconsistent(format!(
                "manifest records {} rows but vector data holds {vector_count}",
                manifest.vector_count
            )));
        }

        let dim = storage.dimension().get();
        if index.dimension().get() != dim || manifest.dim != dim {
            return Err(inconsistent(format!(
                "dimension disagreement: vectors {dim}, index {}, manifest {}",
                index.dimension(),
                manifest.dim
            )));
        }

        if vector_count == 0 {
            return Err(IndexError::EmptyIndex { generation });
        }

        let from_vectors = FlatIndex::from_storage(&storage)
            .map_err(|e| inconsistent(format!("{VECTORS_FILE}: {e}")))?;
        if from_vectors != index {
            return Err(inconsistent(
                "index rows differ from the vector data".to_string(),
            ));
        }

        tracing::info!(generation, vectors = vector_count, dim, "loaded generation");
        Ok(LoadedGeneration {
            manifest,
            index,
            metadata,
            path: dir,
        })
    }

    /// Every generation on disk, oldest first.
    pub fn list(&self) -> IndexResult<Vec<GenerationInfo>> {
        let current = self.current_generation()?;
        Ok(self
            .generation_numbers()?
            .into_iter()
            .map(|generation| {
                let path = self.generation_dir(generation);
                GenerationInfo {
                    generation,
                    manifest: GenerationManifest::load(&path).ok(),
                    path,
                    is_current: current == Some(generation),
                }
            })
            .collect())
    }

    /// Points `CURRENT` back at a retained generation after verifying it.
    pub fn rollback(&self, generation: u64) -> IndexResult<GenerationManifest> {
        let _lock = self.lock()?;

        let loaded = self.load(generation)?;
        self.write_current(generation)?;
        tracing::info!(generation, "rolled back current generation");
        Ok(loaded.manifest)
    }

    /// Deletes generations outside the newest `retain` and stale staging
    /// directories. The current generation is always kept.
    ///
    /// Failures to delete are logged and skipped.
    pub fn prune(&self, lock: &BuildLock, retain: usize) -> IndexResult<Vec<u64>> {
        self.check_lock(lock)?;

        let current = self.current_generation()?;
        let numbers = self.generation_numbers()?;
        let keep_from = numbers.len().saturating_sub(retain.max(1));

        let mut removed = Vec::new();
        for &generation in &numbers[..keep_from] {
            if Some(generation) == current {
                continue;
            }
            let dir = self.generation_dir(generation);
            match fs::remove_dir_all(&dir) {
                Ok(()) => removed.push(generation),
                Err(e) => tracing::warn!(
                    generation,
                    path = %dir.display(),
                    error = %e,
                    "failed to prune generation"
                ),
            }
        }

        // Staging directories only survive a crash; we hold the lock so
        // none of them belongs to a live build.
        if let Ok(entries) = fs::read_dir(&self.root) {
            for entry in entries.flatten() {
                let is_staging = entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with(STAGING_PREFIX));
                if is_staging {
                    if let Err(e) = fs::remove_dir_all(entry.path()) {
                        tracing::warn!(
                            path = %entry.path().display(),
                            error = %e,
                            "failed to remove staging directory"
                        );
                    }
                }
            }
        }

        if !removed.is_empty() {
            tracing::info!(?removed, "pruned old generations");
        }
        Ok(removed)
    }

    fn check_lock(&self, lock: &BuildLock) -> IndexResult<()> {
        if lock.path().parent() != Some(self.root.as_path()) {
            return Err(IndexError::ConfigError {
                reason: format!(
                    "build lock {} does not belong to store {}",
                    lock.path().display(),
                    self.root.display()
                ),
            });
        }
        Ok(())
    }

    /// Atomically repoints `CURRENT`.
    fn write_current(&self, generation: u64) -> IndexResult<()> {
        let tmp = self.root.join(format!("{CURRENT_FILE}.tmp"));
        write_synced(&tmp, format!("{}\n", generation_dir_name(generation)).as_bytes())?;

        let current = self.root.join(CURRENT_FILE);
        fs::rename(&tmp, &current).write_context(&current)?;
        sync_dir(&self.root)
    }
}

fn generation_dir_name(generation: u64) -> String {
    format!("{GENERATION_PREFIX}{generation:06}")
}

fn parse_generation_dir(name: &str) -> Option<u64> {
    name.strip_prefix(GENERATION_PREFIX)?.parse().ok()
}

fn write_synced(path: &Path, contents: &[u8]) -> IndexResult<()> {
    let mut file = File::create(path).write_context(path)?;
    file.write_all(contents).write_context(path)?;
    file.sync_all().write_context(path)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> IndexResult<()> {
    File::open(dir)
        .and_then(|f| f.sync_all())
        .write_context(dir)
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> IndexResult<()> {
    Ok(())
}
