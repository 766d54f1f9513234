//! Elements of the in-memory document.

use std::fmt;

use planforge_core::commands::ViewType;
use planforge_core::units::{Feet, Xyz};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Handle to an element inside one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub u64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Level,
    WallType,
    FloorType,
    FamilySymbol,
    Wall,
    Door,
    Window,
    Column,
    Floor,
    Room,
    View,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementKind::Level => "level",
            ElementKind::WallType => "wall type",
            ElementKind::FloorType => "floor type",
            ElementKind::FamilySymbol => "family symbol",
            ElementKind::Wall => "wall",
            ElementKind::Door => "door",
            ElementKind::Window => "window",
            ElementKind::Column => "column",
            ElementKind::Floor => "floor",
            ElementKind::Room => "room",
            ElementKind::View => "view",
        };
        f.write_str(name)
    }
}

/// Placement category of a loadable family symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolCategory {
    Door,
    Window,
    Column,
}

impl SymbolCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            SymbolCategory::Door => "door",
            SymbolCategory::Window => "window",
            SymbolCategory::Column => "column",
        }
    }
}

/// Kind-specific element payload. All lengths are in feet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElementData {
    Level {
        elevation: Feet,
    },
    WallType {
        width: Feet,
    },
    FloorType {
        thickness: Feet,
    },
    FamilySymbol {
        family: String,
        category: SymbolCategory,
        active: bool,
    },
    Wall {
        start: Xyz,
        end: Xyz,
        wall_type: ElementId,
        level: ElementId,
        height: Feet,
        offset: Feet,
        flip: bool,
        structural: bool,
    },
    Door {
        symbol: ElementId,
        host: ElementId,
        level: ElementId,
        location: Xyz,
        rotation_deg: f64,
    },
    Window {
        symbol: ElementId,
        host: ElementId,
        level: ElementId,
        location: Xyz,
    },
    Column {
        symbol: ElementId,
        level: ElementId,
        location: Xyz,
        height: Feet,
        structural: bool,
    },
    Floor {
        floor_type: ElementId,
        level: ElementId,
        boundary: Vec<Xyz>,
        structural: bool,
    },
    Room {
        number: String,
        level: ElementId,
        point: Xyz,
    },
    View {
        view_type: ViewType,
        level: Option<ElementId>,
    },
}

impl ElementData {
    pub fn kind(&self) -> ElementKind {
        match self {
            ElementData::Level { .. } => ElementKind::Level,
            ElementData::WallType { .. } => ElementKind::WallType,
            ElementData::FloorType { .. } => ElementKind::FloorType,
            ElementData::FamilySymbol { .. } => ElementKind::FamilySymbol,
            ElementData::Wall { .. } => ElementKind::Wall,
            ElementData::Door { .. } => ElementKind::Door,
            ElementData::Window { .. } => ElementKind::Window,
            ElementData::Column { .. } => ElementKind::Column,
            ElementData::Floor { .. } => ElementKind::Floor,
            ElementData::Room { .. } => ElementKind::Room,
            ElementData::View { .. } => ElementKind::View,
        }
    }
}

/// A named element with its payload and free-form recipe properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    pub name: String,
    pub data: ElementData,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
}

impl Element {
    pub fn kind(&self) -> ElementKind {
        self.data.kind()
    }
}
