//! Project templates: the pre-existing entities every fresh document starts
//! with (wall types, floor types, loadable family symbols, optional levels).

use std::path::Path;

use planforge_core::units::Millimeters;
use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::document::Document;
use crate::element::{Element, ElementData, SymbolCategory};
use crate::error::ModelError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateLevel {
    pub name: String,
    pub elevation: Millimeters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateWallType {
    pub name: String,
    pub width: Millimeters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateFloorType {
    pub name: String,
    pub thickness: Millimeters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSymbol {
    pub family: String,
    pub symbol: String,
    pub category: SymbolCategory,
    /// Loaded symbols start inactive and must be activated before placement.
    #[serde(default)]
    pub active: bool,
}

/// Declarative description of a project template.
///
/// Template lengths are millimetres like recipes; they are converted when a
/// document is instantiated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateSpec {
    #[serde(default)]
    pub levels: Vec<TemplateLevel>,
    #[serde(default)]
    pub wall_types: Vec<TemplateWallType>,
    #[serde(default)]
    pub floor_types: Vec<TemplateFloorType>,
    #[serde(default)]
    pub family_symbols: Vec<TemplateSymbol>,
}

impl TemplateSpec {
    /// The built-in metric architectural template.
    pub fn builtin() -> Self {
        let wall_types = [100.0, 150.0, 200.0, 300.0]
            .into_iter()
            .map(|w| TemplateWallType {
                name: format!("Generic - {w}mm"),
                width: Millimeters(w),
            })
            .collect();

        let floor_types = [150.0, 200.0, 300.0]
            .into_iter()
            .map(|t| TemplateFloorType {
                name: format!("Generic - {t}mm"),
                thickness: Millimeters(t),
            })
            .collect();

        let mut family_symbols = Vec::new();
        let mut add = |family: &str, symbol: String, category| {
            family_symbols.push(TemplateSymbol {
                family: family.to_string(),
                symbol,
                category,
                active: false,
            });
        };
        for width in [800, 900, 1000] {
            add("M_Single-Flush", format!("{width}mm x 2100mm"), SymbolCategory::Door);
        }
        for width in [1200, 1500, 1800] {
            add("M_Double-Flush", format!("{width}mm x 2100mm"), SymbolCategory::Door);
            add("M_Sliding", format!("{width}mm x 2100mm"), SymbolCategory::Door);
        }
        for family in ["M_Fixed", "M_Casement"] {
            for (w, h) in [(600, 900), (900, 1200), (1200, 1500), (1800, 1500)] {
                add(family, format!("{w}mm x {h}mm"), SymbolCategory::Window);
            }
        }
        for size in ["300 x 300mm", "450 x 600mm", "600 x 750mm"] {
            add("M_Rectangular Column", size.to_string(), SymbolCategory::Column);
        }

        Self {
            levels: Vec::new(),
            wall_types,
            floor_types,
            family_symbols,
        }
    }

    /// Load a template from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ModelError::InvalidTemplate(format!("{}: {e}", path.display())))
    }

    /// Create a fresh document containing the template entities.
    ///
    /// Template entities are inserted directly rather than through a
    /// transaction: a template may legitimately contain duplicate names,
    /// which resolution later reports as ambiguous.
    pub fn instantiate(&self) -> Document {
        fn insert(doc: &mut Document, name: &str, data: ElementData) {
            let id = doc.allocate_id();
            doc.elements.insert(
                id,
                Element {
                    id,
                    name: name.to_string(),
                    data,
                    properties: Map::new(),
                },
            );
        }

        let mut doc = Document::new();

        for level in &self.levels {
            insert(
                &mut doc,
                &level.name,
                ElementData::Level {
                    elevation: level.elevation.to_feet(),
                },
            );
        }
        for wall_type in &self.wall_types {
            insert(
                &mut doc,
                &wall_type.name,
                ElementData::WallType {
                    width: wall_type.width.to_feet(),
                },
            );
        }
        for floor_type in &self.floor_types {
            insert(
                &mut doc,
                &floor_type.name,
                ElementData::FloorType {
                    thickness: floor_type.thickness.to_feet(),
                },
            );
        }
        for symbol in &self.family_symbols {
            insert(
                &mut doc,
                &symbol.symbol,
                ElementData::FamilySymbol {
                    family: symbol.family.clone(),
                    category: symbol.category,
                    active: symbol.active,
                },
            );
        }

        doc
    }
}
