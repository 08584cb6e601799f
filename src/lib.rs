/// The main library module for ragindex
pub mod builder;
pub mod completion;
pub mod config;
pub mod corpus;
pub mod display;
pub mod documents;
pub mod error;
pub mod generation;
pub mod logging;
pub mod retrieve;
pub mod vector;

// Explicit exports for better API clarity
pub use builder::{BuildReport, IndexBuilder};
pub use config::Settings;
pub use corpus::CorpusUnit;
pub use documents::{Document, MetadataStore};
pub use error::{IndexError, IndexResult};
pub use generation::{GenerationManifest, GenerationStore};
pub use retrieve::{EngineHandle, RetrievalEngine, RetrievedDocument};
pub use vector::{EmbeddingGenerator, FlatIndex, RowId, VectorError};
