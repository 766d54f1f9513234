//! In-process document engine.
//!
//! Stands in for the CAD engine: exclusive authority, template-seeded
//! documents, journaled transactions, artifact persistence and raster export.

pub mod artifact;
pub mod authority;
pub mod document;
pub mod element;
pub mod error;
pub mod raster;
pub mod template;
pub mod transaction;

pub use artifact::ArtifactStore;
pub use authority::{AuthorityLease, ModelAuthority, ModelContext};
pub use document::Document;
pub use element::{Element, ElementData, ElementId, ElementKind, SymbolCategory};
pub use error::ModelError;
pub use template::TemplateSpec;
pub use transaction::Transaction;
