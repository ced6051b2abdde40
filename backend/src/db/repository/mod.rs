//! Repository trait definitions for database operations.
//!
//! This module provides a collection of focused repository traits that abstract
//! persistence. By splitting responsibilities across multiple traits,
//! implementations can be more focused and testable.
//!
//! # Module Organization
//!
//! - [`error`]: Error types for repository operations
//! - [`facts`]: Canonical fact store and coverage index
//! - [`calculations`]: CalcTOU records, filter links and status transitions
//! - [`reference`]: Reference dictionaries used by the resolver
//! - [`seasonal`]: Seasonal coefficient sets
//! - [`journal`]: Progress logs, audit trail and stored files
//!
//! # Convenience Trait Bound
//!
//! For functions that need all repository capabilities, use the [`FullRepository`] trait bound:
//!
//! ```ignore
//! async fn my_service<R: FullRepository + ?Sized>(repo: &R) -> RepositoryResult<()> {
//!     let snapshot = repo.reference_snapshot().await?;
//!     repo.replace_facts(SourceSystem::Sap, Some(range), &facts).await?;
//!     Ok(())
//! }
//! ```

pub mod calculations;
pub mod error;
pub mod facts;
pub mod journal;
pub mod reference;
pub mod seasonal;

// Re-export error types
pub use error::{ErrorContext, RepositoryError, RepositoryResult};

// Re-export all traits
pub use calculations::CalculationRepository;
pub use facts::FactRepository;
pub use journal::JournalRepository;
pub use reference::ReferenceRepository;
pub use seasonal::SeasonalRepository;

/// Composite trait bound for a complete repository implementation.
///
/// This trait is automatically implemented for any type that implements
/// all five repository traits.
pub trait FullRepository:
    FactRepository + CalculationRepository + ReferenceRepository + SeasonalRepository + JournalRepository
{
}

// Blanket implementation: any type implementing all five traits automatically implements FullRepository
impl<T> FullRepository for T where
    T: FactRepository
        + CalculationRepository
        + ReferenceRepository
        + SeasonalRepository
        + JournalRepository
{
}
