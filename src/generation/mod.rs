//! Persisted generations: the unit of atomicity for vectors and documents.
//!
//! A generation bundles the vector data artifact, the metadata artifact
//! and the serialized index under one manifest. Generations are written
//! once, verified on every load, and replaced only as a whole.

pub mod lock;
pub mod manifest;
pub mod store;

pub use lock::{BuildLock, LOCK_FILE};
pub use manifest::{
    ArtifactInfo, ArtifactSet, DOCUMENTS_FILE, GenerationManifest, INDEX_FILE, MANIFEST_FILE,
    MANIFEST_FORMAT_VERSION, VECTORS_FILE, calculate_sha256,
};
pub use store::{
    CURRENT_FILE, GENERATIONS_DIR, GenerationInfo, GenerationStore, LoadedGeneration,
    StagedGeneration,
};
