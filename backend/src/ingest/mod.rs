//! Import normalization: Reference Resolver and Fact Normalizer.
//!
//! Each stage is a pure function from one typed row schema to the next:
//!
//! ```text
//! bytes ─► sheet::Table ─► RawImportRow ─► CleanedRow ─► EnrichedRow ─► CanonicalFact
//!  Read        (locate)       raw.rs        clean.rs     resolver.rs   derive.rs + shape.rs
//! ```

pub mod clean;
pub mod derive;
pub mod error;
pub mod pipeline;
pub mod raw;
pub mod resolver;
pub mod shape;
pub mod sheet;

pub use error::{IngestError, IngestResult};
pub use pipeline::{normalize, NormalizeOptions, NormalizeStats, NormalizedImport};
pub use resolver::{JoinPolicy, JoinStats, ReferenceIndex, CARGO_FALLBACK};
pub use sheet::{read_grid, Cell, Table};
