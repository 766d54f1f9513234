//! Symbolic reference resolution for one build.
//!
//! Names resolve by exact match against the document (template entities and
//! elements created earlier in the job). Recipe-local ids resolve through the
//! reference table. Zero matches and several matches are both errors; the
//! resolver never picks one of several candidates.

use std::collections::{HashMap, HashSet};

use planforge_model::{Document, Element, ElementId, ElementKind, Transaction};

use crate::error::{ResolveError, StepError};

#[derive(Debug, Default)]
pub struct ReferenceResolver {
    table: HashMap<String, ElementId>,
    activated: HashSet<ElementId>,
    activations: usize,
}

fn unique(kind: &'static str, name: &str, found: Vec<&Element>) -> Result<ElementId, ResolveError> {
    match found.as_slice() {
        [only] => Ok(only.id),
        [] => Err(ResolveError::ReferenceNotFound {
            kind,
            name: name.to_string(),
        }),
        many => Err(ResolveError::AmbiguousReference {
            kind,
            name: name.to_string(),
            count: many.len(),
        }),
    }
}

impl ReferenceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the element a step with a recipe-local id created.
    pub fn record(&mut self, local_id: impl Into<String>, id: ElementId) {
        self.table.insert(local_id.into(), id);
    }

    /// Number of symbols this resolver had to activate.
    pub fn activations(&self) -> usize {
        self.activations
    }

    pub fn resolve_level(&self, doc: &Document, name: &str) -> Result<ElementId, ResolveError> {
        unique("level", name, doc.find_named(ElementKind::Level, name))
    }

    pub fn resolve_wall_type(&self, doc: &Document, name: &str) -> Result<ElementId, ResolveError> {
        unique("wall type", name, doc.find_named(ElementKind::WallType, name))
    }

    pub fn resolve_floor_type(&self, doc: &Document, name: &str) -> Result<ElementId, ResolveError> {
        unique("floor type", name, doc.find_named(ElementKind::FloorType, name))
    }

    /// Resolve a family symbol, activating it on first use in this job.
    pub fn resolve_family_symbol(
        &mut self,
        tx: &mut Transaction<'_>,
        family: &str,
        symbol: &str,
    ) -> Result<ElementId, StepError> {
        let label = format!("{family}: {symbol}");
        let id = unique(
            "family symbol",
            &label,
            tx.document().find_symbols(family, symbol),
        )?;

        if self.activated.insert(id) && tx.activate_symbol(id)? {
            self.activations += 1;
            tracing::debug!(family, symbol, "Activated family symbol");
        }
        Ok(id)
    }

    /// Resolve a recipe-local id to the wall it created.
    pub fn resolve_host_element(
        &self,
        doc: &Document,
        local_id: &str,
    ) -> Result<ElementId, ResolveError> {
        let not_found = || ResolveError::ReferenceNotFound {
            kind: "host wall",
            name: local_id.to_string(),
        };
        let id = *self.table.get(local_id).ok_or_else(not_found)?;
        match doc.get(id) {
            Some(element) if element.kind() == ElementKind::Wall => Ok(id),
            _ => Err(not_found()),
        }
    }
}
