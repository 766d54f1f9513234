//! Typed command parameters.
//!
//! Each struct is the validated form of one recipe step. Lengths stay in
//! [`Millimeters`] here; they are converted to feet when the command is
//! applied to a document, never earlier.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::units::{Millimeters, PointMm};

fn invalid(code: &'static str, message: impl Into<Cow<'static, str>>) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(message.into());
    error
}

fn require_finite(value: Millimeters, field: &'static str) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(invalid("finite", format!("{field} must be a finite number")))
    }
}

fn require_positive(value: Millimeters, field: &'static str) -> Result<(), ValidationError> {
    require_finite(value, field)?;
    if value.0 > 0.0 {
        Ok(())
    } else {
        Err(invalid("positive", format!("{field} must be greater than zero")))
    }
}

fn require_finite_point(point: &PointMm, field: &'static str) -> Result<(), ValidationError> {
    if point.is_finite() {
        Ok(())
    } else {
        Err(invalid("finite", format!("{field} coordinates must be finite")))
    }
}

// ---------------------------------------------------------------------------
// Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "validate_level"))]
pub struct CreateLevel {
    #[validate(length(min = 1, max = 256))]
    pub name: String,
    pub elevation: Millimeters,
    /// Also create a floor plan view named after the level.
    #[serde(default)]
    pub create_plan_view: bool,
    /// Also create a ceiling plan view named after the level.
    #[serde(default)]
    pub create_ceiling_plan: bool,
}

fn validate_level(level: &CreateLevel) -> Result<(), ValidationError> {
    require_finite(level.elevation, "elevation")
}

// ---------------------------------------------------------------------------
// Walls
// ---------------------------------------------------------------------------

/// Curve shapes a wall may follow. Only straight lines are supported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum CurveKind {
    #[default]
    Line,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LineCurve {
    #[serde(rename = "type", default)]
    pub kind: CurveKind,
    pub start: PointMm,
    pub end: PointMm,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "validate_wall"))]
pub struct CreateWall {
    pub curve: LineCurve,
    #[validate(length(min = 1))]
    pub wall_type: String,
    #[validate(length(min = 1))]
    pub level: String,
    pub height: Millimeters,
    #[serde(default)]
    pub offset: Millimeters,
    #[serde(default)]
    pub flip: bool,
    #[serde(default)]
    pub structural: bool,
}

fn validate_wall(wall: &CreateWall) -> Result<(), ValidationError> {
    require_finite_point(&wall.curve.start, "curve.start")?;
    require_finite_point(&wall.curve.end, "curve.end")?;
    require_positive(wall.height, "height")?;
    require_finite(wall.offset, "offset")?;
    if wall.curve.start == wall.curve.end {
        return Err(invalid(
            "zero_length",
            "curve start and end must be different points",
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Hosted and free-standing family instances
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "validate_door"))]
pub struct CreateDoor {
    #[validate(length(min = 1))]
    pub family: String,
    #[validate(length(min = 1))]
    pub symbol: String,
    pub location: PointMm,
    /// Recipe-local id of the wall hosting the door.
    #[validate(length(min = 1))]
    pub host_wall_id: String,
    #[validate(length(min = 1))]
    pub level: String,
    /// Rotation in degrees about the vertical axis.
    #[serde(default)]
    pub rotation: f64,
}

fn validate_door(door: &CreateDoor) -> Result<(), ValidationError> {
    require_finite_point(&door.location, "location")?;
    if !door.rotation.is_finite() {
        return Err(invalid("finite", "rotation must be a finite number"));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "validate_window"))]
pub struct CreateWindow {
    #[validate(length(min = 1))]
    pub family: String,
    #[validate(length(min = 1))]
    pub symbol: String,
    pub location: PointMm,
    #[validate(length(min = 1))]
    pub host_wall_id: String,
    #[validate(length(min = 1))]
    pub level: String,
    /// Overrides `location.z` when present.
    #[serde(default)]
    pub sill_height: Option<Millimeters>,
}

fn validate_window(window: &CreateWindow) -> Result<(), ValidationError> {
    require_finite_point(&window.location, "location")?;
    if let Some(sill) = window.sill_height {
        require_finite(sill, "sill_height")?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "validate_column"))]
pub struct CreateColumn {
    #[validate(length(min = 1))]
    pub family: String,
    #[validate(length(min = 1))]
    pub symbol: String,
    pub location: PointMm,
    #[validate(length(min = 1))]
    pub level: String,
    pub height: Millimeters,
    #[serde(default)]
    pub structural: bool,
}

fn validate_column(column: &CreateColumn) -> Result<(), ValidationError> {
    require_finite_point(&column.location, "location")?;
    require_positive(column.height, "height")
}

// ---------------------------------------------------------------------------
// Floors and rooms
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "validate_floor"))]
pub struct CreateFloor {
    #[validate(length(min = 3))]
    pub boundary: Vec<PointMm>,
    #[validate(length(min = 1))]
    pub floor_type: String,
    #[validate(length(min = 1))]
    pub level: String,
    #[serde(default)]
    pub structural: bool,
}

fn validate_floor(floor: &CreateFloor) -> Result<(), ValidationError> {
    for point in &floor.boundary {
        require_finite_point(point, "boundary")?;
    }
    // Shoelace area in the XY plane; a zero area outline cannot be extruded.
    let n = floor.boundary.len();
    let twice_area: f64 = (0..n)
        .map(|i| {
            let a = &floor.boundary[i];
            let b = &floor.boundary[(i + 1) % n];
            a.x.0 * b.y.0 - b.x.0 * a.y.0
        })
        .sum();
    if n >= 3 && twice_area.abs() < f64::EPSILON {
        return Err(invalid("degenerate", "boundary encloses no area"));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "validate_room"))]
pub struct CreateRoom {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub number: String,
    #[validate(length(min = 1))]
    pub level: String,
    pub point: PointMm,
}

fn validate_room(room: &CreateRoom) -> Result<(), ValidationError> {
    require_finite_point(&room.point, "point")
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Kinds of view a model can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViewType {
    FloorPlan,
    CeilingPlan,
    #[serde(alias = "3D")]
    ThreeD,
}

impl ViewType {
    pub fn is_plan(self) -> bool {
        matches!(self, ViewType::FloorPlan | ViewType::CeilingPlan)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "validate_view"))]
pub struct CreateView {
    pub view_type: ViewType,
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(default)]
    pub level: Option<String>,
}

fn validate_view(view: &CreateView) -> Result<(), ValidationError> {
    match (&view.level, view.view_type.is_plan()) {
        (None, true) => Err(invalid("level_required", "plan views require a level")),
        (Some(level), _) if level.is_empty() => {
            Err(invalid("level_required", "level must not be empty"))
        }
        _ => Ok(()),
    }
}
