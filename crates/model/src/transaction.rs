//! Journaled document transactions.
//!
//! Every mutation records its inverse. [`Transaction::rollback`] (or dropping
//! an unfinished transaction) replays the journal backwards, restoring the
//! document exactly as it was when the transaction began.

use serde_json::{Map, Value};

use crate::document::Document;
use crate::element::{Element, ElementData, ElementId, ElementKind, SymbolCategory};
use crate::error::ModelError;

/// Minimum wall length, in feet, the engine accepts.
const MIN_CURVE_LENGTH: f64 = 1e-6;

enum Undo {
    Remove(ElementId),
    Deactivate(ElementId),
}

pub struct Transaction<'d> {
    document: &'d mut Document,
    name: String,
    journal: Vec<Undo>,
    start_next_id: u64,
    finished: bool,
}

impl<'d> Transaction<'d> {
    pub(crate) fn begin(document: &'d mut Document, name: String) -> Self {
        tracing::debug!(transaction = %name, "Transaction started");
        let start_next_id = document.next_id;
        Self {
            document,
            name,
            journal: Vec::new(),
            start_next_id,
            finished: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn document(&self) -> &Document {
        self.document
    }

    /// Number of journaled changes so far.
    pub fn change_count(&self) -> usize {
        self.journal.len()
    }

    /// Create an element after checking it against the document.
    pub fn create(
        &mut self,
        name: impl Into<String>,
        data: ElementData,
        properties: Map<String, Value>,
    ) -> Result<ElementId, ModelError> {
        let name = name.into();
        self.check_integrity(&name, &data)?;

        let id = self.document.allocate_id();
        self.document.elements.insert(
            id,
            Element {
                id,
                name,
                data,
                properties,
            },
        );
        self.journal.push(Undo::Remove(id));
        Ok(id)
    }

    /// Activate a family symbol. Returns `true` if it was inactive.
    pub fn activate_symbol(&mut self, id: ElementId) -> Result<bool, ModelError> {
        let element = self
            .document
            .elements
            .get_mut(&id)
            .ok_or(ModelError::MissingElement(id))?;
        match &mut element.data {
            ElementData::FamilySymbol { active, .. } => {
                if *active {
                    return Ok(false);
                }
                *active = true;
                self.journal.push(Undo::Deactivate(id));
                Ok(true)
            }
            other => Err(ModelError::WrongElementKind {
                id,
                expected: ElementKind::FamilySymbol,
                actual: other.kind(),
            }),
        }
    }

    /// Keep every change. Returns the number of changes committed.
    pub fn commit(mut self) -> usize {
        self.finished = true;
        let changes = self.journal.len();
        tracing::debug!(transaction = %self.name, changes, "Transaction committed");
        changes
    }

    /// Discard every change made since the transaction began.
    pub fn rollback(mut self) {
        self.undo_all();
    }

    fn undo_all(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let changes = self.journal.len();
        while let Some(undo) = self.journal.pop() {
            match undo {
                Undo::Remove(id) => {
                    self.document.elements.remove(&id);
                }
                Undo::Deactivate(id) => {
                    if let Some(Element {
                        data: ElementData::FamilySymbol { active, .. },
                        ..
                    }) = self.document.elements.get_mut(&id)
                    {
                        *active = false;
                    }
                }
            }
        }
        self.document.next_id = self.start_next_id;
        tracing::debug!(transaction = %self.name, changes, "Transaction rolled back");
    }

    // ---- integrity checks ----

    fn check_integrity(&self, name: &str, data: &ElementData) -> Result<(), ModelError> {
        let doc = &*self.document;
        match data {
            ElementData::Level { .. } => {
                if !doc.find_named(ElementKind::Level, name).is_empty() {
                    return Err(ModelError::DuplicateName {
                        kind: ElementKind::Level,
                        name: name.to_string(),
                    });
                }
            }
            ElementData::View { view_type, level } => {
                // A floor plan and a ceiling plan may share a level's name.
                let taken = doc.find_named(ElementKind::View, name).iter().any(|e| {
                    matches!(&e.data, ElementData::View { view_type: t, .. } if t == view_type)
                });
                if taken {
                    return Err(ModelError::DuplicateName {
                        kind: ElementKind::View,
                        name: name.to_string(),
                    });
                }
                if let Some(level) = level {
                    doc.expect_kind(*level, ElementKind::Level)?;
                }
            }
            ElementData::WallType { .. }
            | ElementData::FloorType { .. }
            | ElementData::FamilySymbol { .. } => {}
            ElementData::Wall {
                start,
                end,
                wall_type,
                level,
                height,
                ..
            } => {
                doc.expect_kind(*wall_type, ElementKind::WallType)?;
                doc.expect_kind(*level, ElementKind::Level)?;
                if start.distance_to(end) < MIN_CURVE_LENGTH {
                    return Err(ModelError::InvalidGeometry(
                        "wall curve is too short".into(),
                    ));
                }
                if height.value() <= 0.0 {
                    return Err(ModelError::InvalidGeometry(
                        "wall height must be positive".into(),
                    ));
                }
            }
            ElementData::Door {
                symbol, host, level, ..
            } => {
                self.check_symbol(*symbol, SymbolCategory::Door)?;
                doc.expect_kind(*host, ElementKind::Wall)?;
                doc.expect_kind(*level, ElementKind::Level)?;
            }
            ElementData::Window {
                symbol, host, level, ..
            } => {
                self.check_symbol(*symbol, SymbolCategory::Window)?;
                doc.expect_kind(*host, ElementKind::Wall)?;
                doc.expect_kind(*level, ElementKind::Level)?;
            }
            ElementData::Column {
                symbol,
                level,
                height,
                ..
            } => {
                self.check_symbol(*symbol, SymbolCategory::Column)?;
                doc.expect_kind(*level, ElementKind::Level)?;
                if height.value() <= 0.0 {
                    return Err(ModelError::InvalidGeometry(
                        "column height must be positive".into(),
                    ));
                }
            }
            ElementData::Floor {
                floor_type,
                level,
                boundary,
                ..
            } => {
                doc.expect_kind(*floor_type, ElementKind::FloorType)?;
                doc.expect_kind(*level, ElementKind::Level)?;
                if boundary.len() < 3 {
                    return Err(ModelError::InvalidGeometry(
                        "floor boundary needs at least three points".into(),
                    ));
                }
            }
            ElementData::Room { level, .. } => {
                doc.expect_kind(*level, ElementKind::Level)?;
            }
        }
        Ok(())
    }

    /// A placed instance needs an active symbol of the right category.
    fn check_symbol(&self, id: ElementId, requested: SymbolCategory) -> Result<(), ModelError> {
        let element = self.document.expect_kind(id, ElementKind::FamilySymbol)?;
        if let ElementData::FamilySymbol {
            family,
            category,
            active,
        } = &element.data
        {
            if *category != requested {
                return Err(ModelError::WrongCategory {
                    family: family.clone(),
                    symbol: element.name.clone(),
                    requested: requested.as_str(),
                });
            }
            if !active {
                return Err(ModelError::InactiveSymbol {
                    family: family.clone(),
                    symbol: element.name.clone(),
                });
            }
        }
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(transaction = %self.name, "Transaction dropped without commit, rolling back");
            self.undo_all();
        }
    }
}
