//! Applying typed commands to an open transaction.
//!
//! This is the only place recipe millimetres become document feet.

use planforge_core::commands::{
    Command, CreateColumn, CreateDoor, CreateFloor, CreateLevel, CreateRoom, CreateView,
    CreateWall, CreateWindow, ParsedStep, ViewType,
};
use planforge_model::{ElementData, ElementId, Transaction};
use serde_json::{Map, Value};

use crate::error::StepError;
use crate::resolver::ReferenceResolver;

/// Apply one step. Returns the id of the primary element it created.
pub fn apply_step(
    tx: &mut Transaction<'_>,
    resolver: &mut ReferenceResolver,
    step: &ParsedStep,
) -> Result<ElementId, StepError> {
    let name = step
        .local_id
        .clone()
        .unwrap_or_else(|| default_name(&step.command, step.index));
    let properties = step.properties.clone();

    let id = match &step.command {
        Command::CreateLevel(cmd) => create_level(tx, cmd, properties)?,
        Command::CreateWall(cmd) => create_wall(tx, resolver, cmd, name, properties)?,
        Command::CreateDoor(cmd) => create_door(tx, resolver, cmd, name, properties)?,
        Command::CreateWindow(cmd) => create_window(tx, resolver, cmd, name, properties)?,
        Command::CreateColumn(cmd) => create_column(tx, resolver, cmd, name, properties)?,
        Command::CreateFloor(cmd) => create_floor(tx, resolver, cmd, name, properties)?,
        Command::CreateRoom(cmd) => create_room(tx, resolver, cmd, properties)?,
        Command::CreateView(cmd) => create_view(tx, resolver, cmd, properties)?,
    };

    if let Some(local_id) = &step.local_id {
        resolver.record(local_id.clone(), id);
    }
    Ok(id)
}

fn default_name(command: &Command, index: usize) -> String {
    let noun = command.kind().trim_start_matches("Create");
    format!("{noun} {}", index + 1)
}

fn create_level(
    tx: &mut Transaction<'_>,
    cmd: &CreateLevel,
    properties: Map<String, Value>,
) -> Result<ElementId, StepError> {
    let level = tx.create(
        cmd.name.clone(),
        ElementData::Level {
            elevation: cmd.elevation.to_feet(),
        },
        properties,
    )?;

    let views = [
        (cmd.create_plan_view, ViewType::FloorPlan),
        (cmd.create_ceiling_plan, ViewType::CeilingPlan),
    ];
    for (wanted, view_type) in views {
        if wanted {
            tx.create(
                cmd.name.clone(),
                ElementData::View {
                    view_type,
                    level: Some(level),
                },
                Map::new(),
            )?;
        }
    }
    Ok(level)
}

fn create_wall(
    tx: &mut Transaction<'_>,
    resolver: &ReferenceResolver,
    cmd: &CreateWall,
    name: String,
    properties: Map<String, Value>,
) -> Result<ElementId, StepError> {
    let wall_type = resolver.resolve_wall_type(tx.document(), &cmd.wall_type)?;
    let level = resolver.resolve_level(tx.document(), &cmd.level)?;
    let id = tx.create(
        name,
        ElementData::Wall {
            start: cmd.curve.start.to_xyz(),
            end: cmd.curve.end.to_xyz(),
            wall_type,
            level,
            height: cmd.height.to_feet(),
            offset: cmd.offset.to_feet(),
            flip: cmd.flip,
            structural: cmd.structural,
        },
        properties,
    )?;
    Ok(id)
}

fn create_door(
    tx: &mut Transaction<'_>,
    resolver: &mut ReferenceResolver,
    cmd: &CreateDoor,
    name: String,
    properties: Map<String, Value>,
) -> Result<ElementId, StepError> {
    let host = resolver.resolve_host_element(tx.document(), &cmd.host_wall_id)?;
    let level = resolver.resolve_level(tx.document(), &cmd.level)?;
    let symbol = resolver.resolve_family_symbol(tx, &cmd.family, &cmd.symbol)?;
    let id = tx.create(
        name,
        ElementData::Door {
            symbol,
            host,
            level,
            location: cmd.location.to_xyz(),
            rotation_deg: cmd.rotation,
        },
        properties,
    )?;
    Ok(id)
}

fn create_window(
    tx: &mut Transaction<'_>,
    resolver: &mut ReferenceResolver,
    cmd: &CreateWindow,
    name: String,
    properties: Map<String, Value>,
) -> Result<ElementId, StepError> {
    let host = resolver.resolve_host_element(tx.document(), &cmd.host_wall_id)?;
    let level = resolver.resolve_level(tx.document(), &cmd.level)?;
    let symbol = resolver.resolve_family_symbol(tx, &cmd.family, &cmd.symbol)?;

    let mut location = cmd.location.to_xyz();
    if let Some(sill) = cmd.sill_height {
        location.z = sill.to_feet().value();
    }
    let id = tx.create(
        name,
        ElementData::Window {
            symbol,
            host,
            level,
            location,
        },
        properties,
    )?;
    Ok(id)
}

fn create_column(
    tx: &mut Transaction<'_>,
    resolver: &mut ReferenceResolver,
    cmd: &CreateColumn,
    name: String,
    properties: Map<String, Value>,
) -> Result<ElementId, StepError> {
    let level = resolver.resolve_level(tx.document(), &cmd.level)?;
    let symbol = resolver.resolve_family_symbol(tx, &cmd.family, &cmd.symbol)?;
    let id = tx.create(
        name,
        ElementData::Column {
            symbol,
            level,
            location: cmd.location.to_xyz(),
            height: cmd.height.to_feet(),
            structural: cmd.structural,
        },
        properties,
    )?;
    Ok(id)
}

fn create_floor(
    tx: &mut Transaction<'_>,
    resolver: &ReferenceResolver,
    cmd: &CreateFloor,
    name: String,
    properties: Map<String, Value>,
) -> Result<ElementId, StepError> {
    let floor_type = resolver.resolve_floor_type(tx.document(), &cmd.floor_type)?;
    let level = resolver.resolve_level(tx.document(), &cmd.level)?;
    let id = tx.create(
        name,
        ElementData::Floor {
            floor_type,
            level,
            boundary: cmd.boundary.iter().map(|p| p.to_xyz()).collect(),
            structural: cmd.structural,
        },
        properties,
    )?;
    Ok(id)
}

fn create_room(
    tx: &mut Transaction<'_>,
    resolver: &ReferenceResolver,
    cmd: &CreateRoom,
    properties: Map<String, Value>,
) -> Result<ElementId, StepError> {
    let level = resolver.resolve_level(tx.document(), &cmd.level)?;
    let id = tx.create(
        cmd.name.clone(),
        ElementData::Room {
            number: cmd.number.clone(),
            level,
            point: cmd.point.to_xyz(),
        },
        properties,
    )?;
    Ok(id)
}

fn create_view(
    tx: &mut Transaction<'_>,
    resolver: &ReferenceResolver,
    cmd: &CreateView,
    properties: Map<String, Value>,
) -> Result<ElementId, StepError> {
    let level = cmd
        .level
        .as_deref()
        .map(|name| resolver.resolve_level(tx.document(), name))
        .transpose()?;
    let id = tx.create(
        cmd.name.clone(),
        ElementData::View {
            view_type: cmd.view_type,
            level,
        },
        properties,
    )?;
    Ok(id)
}
