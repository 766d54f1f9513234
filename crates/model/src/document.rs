//! The mutable in-memory model built by one job.

use std::collections::BTreeMap;

use planforge_core::commands::ViewType;
use planforge_core::recipe::ProjectInfo;

use crate::element::{Element, ElementData, ElementId, ElementKind};
use crate::error::ModelError;
use crate::transaction::Transaction;

/// An object graph of elements keyed by [`ElementId`].
///
/// Elements are only added or changed through a [`Transaction`]; the
/// document itself exposes read access.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub project_info: Option<ProjectInfo>,
    pub(crate) elements: BTreeMap<ElementId, Element>,
    pub(crate) next_id: u64,
}

impl Document {
    pub fn new() -> Self {
        Self {
            project_info: None,
            elements: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(&id)
    }

    /// All elements in creation order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    pub fn elements_of_kind(&self, kind: ElementKind) -> impl Iterator<Item = &Element> {
        self.elements.values().filter(move |e| e.kind() == kind)
    }

    pub fn count_of_kind(&self, kind: ElementKind) -> usize {
        self.elements_of_kind(kind).count()
    }

    /// Every element of `kind` whose name matches exactly.
    pub fn find_named(&self, kind: ElementKind, name: &str) -> Vec<&Element> {
        self.elements_of_kind(kind)
            .filter(|e| e.name == name)
            .collect()
    }

    /// Every family symbol matching `family` and `symbol` exactly.
    pub fn find_symbols(&self, family: &str, symbol: &str) -> Vec<&Element> {
        self.elements
            .values()
            .filter(|e| {
                e.name == symbol
                    && matches!(&e.data, ElementData::FamilySymbol { family: f, .. } if f == family)
            })
            .collect()
    }

    /// The first view of `view_type` in creation order.
    pub fn first_view(&self, view_type: ViewType) -> Option<&Element> {
        self.elements.values().find(|e| {
            matches!(&e.data, ElementData::View { view_type: t, .. } if *t == view_type)
        })
    }

    /// Elevation in feet of a level element.
    pub fn level_elevation(&self, id: ElementId) -> Result<f64, ModelError> {
        match self.get(id).map(|e| &e.data) {
            Some(ElementData::Level { elevation }) => Ok(elevation.value()),
            Some(other) => Err(ModelError::WrongElementKind {
                id,
                expected: ElementKind::Level,
                actual: other.kind(),
            }),
            None => Err(ModelError::MissingElement(id)),
        }
    }

    /// Check that `id` exists and is of `expected` kind.
    pub fn expect_kind(&self, id: ElementId, expected: ElementKind) -> Result<&Element, ModelError> {
        let element = self.get(id).ok_or(ModelError::MissingElement(id))?;
        if element.kind() != expected {
            return Err(ModelError::WrongElementKind {
                id,
                expected,
                actual: element.kind(),
            });
        }
        Ok(element)
    }

    /// Open a transaction. Changes are undone unless it is committed.
    pub fn begin_transaction(&mut self, name: impl Into<String>) -> Transaction<'_> {
        Transaction::begin(self, name.into())
    }

    pub(crate) fn allocate_id(&mut self) -> ElementId {
        let id = ElementId(self.next_id);
        self.next_id += 1;
        id
    }
}
