//! Command registry: maps recipe step tags to typed, validated commands.
//!
//! A recipe is converted in full before any model work begins, so a single
//! unknown tag or malformed parameter bag fails the job without touching the
//! model.

pub mod params;

use std::collections::{HashMap, HashSet};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use validator::Validate;

use crate::recipe::Recipe;

pub use params::{
    CreateColumn, CreateDoor, CreateFloor, CreateLevel, CreateRoom, CreateView, CreateWall,
    CreateWindow, CurveKind, LineCurve, ViewType,
};

/// A validated, executable unit derived from one recipe step.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateLevel(CreateLevel),
    CreateWall(CreateWall),
    CreateDoor(CreateDoor),
    CreateWindow(CreateWindow),
    CreateColumn(CreateColumn),
    CreateFloor(CreateFloor),
    CreateRoom(CreateRoom),
    CreateView(CreateView),
}

impl Command {
    /// Canonical tag of this command.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::CreateLevel(_) => "CreateLevel",
            Command::CreateWall(_) => "CreateWall",
            Command::CreateDoor(_) => "CreateDoor",
            Command::CreateWindow(_) => "CreateWindow",
            Command::CreateColumn(_) => "CreateColumn",
            Command::CreateFloor(_) => "CreateFloor",
            Command::CreateRoom(_) => "CreateRoom",
            Command::CreateView(_) => "CreateView",
        }
    }
}

/// Errors raised while turning recipe steps into commands.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("Unknown command type '{0}'")]
    UnknownCommandKind(String),

    #[error("Invalid parameters for {command}: {reason}")]
    InvalidParameters {
        command: &'static str,
        reason: String,
    },

    #[error("Duplicate step id '{0}'")]
    DuplicateStepId(String),

    #[error("Recipe has no steps")]
    EmptyRecipe,
}

/// A recipe step after conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedStep {
    pub index: usize,
    pub local_id: Option<String>,
    pub command: Command,
    pub properties: Map<String, Value>,
}

/// Constructor registered for a tag.
pub type CommandConstructor = fn(&Value) -> Result<Command, CommandError>;

/// Tag -> constructor table.
///
/// [`CommandRegistry::default`] registers every built-in command under its
/// canonical tag plus the dotted aliases older recipe generators emit
/// (`Wall.Create`, `Level.Create`, `FamilyInstance.Create`, ...).
#[derive(Clone)]
pub struct CommandRegistry {
    constructors: HashMap<&'static str, CommandConstructor>,
}

/// Deserialize and validate a parameter bag into `T`.
///
/// A missing (`null`) bag is treated as an empty object so the error names
/// the first missing field rather than the bag itself.
fn decode<T>(command: &'static str, params: &Value) -> Result<T, CommandError>
where
    T: DeserializeOwned + Validate,
{
    let params = if params.is_null() {
        Value::Object(Map::new())
    } else {
        params.clone()
    };
    let typed: T =
        serde_json::from_value(params).map_err(|e| CommandError::InvalidParameters {
            command,
            reason: e.to_string(),
        })?;
    typed
        .validate()
        .map_err(|e| CommandError::InvalidParameters {
            command,
            reason: e.to_string(),
        })?;
    Ok(typed)
}

impl CommandRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register (or replace) the constructor for `tag`.
    pub fn register(&mut self, tag: &'static str, constructor: CommandConstructor) {
        self.constructors.insert(tag, constructor);
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    /// Build a command from a tag and its parameter bag.
    pub fn create(&self, tag: &str, params: &Value) -> Result<Command, CommandError> {
        let constructor = self
            .constructors
            .get(tag)
            .ok_or_else(|| CommandError::UnknownCommandKind(tag.to_string()))?;
        constructor(params)
    }

    /// Convert every step of `recipe`, stopping at the first failure.
    ///
    /// On failure the offending step index is returned alongside the error
    /// (`None` for recipe-level problems such as an empty step list).
    pub fn parse_recipe(
        &self,
        recipe: &Recipe,
    ) -> Result<Vec<ParsedStep>, (Option<usize>, CommandError)> {
        if recipe.steps.is_empty() {
            return Err((None, CommandError::EmptyRecipe));
        }

        let mut seen_ids = HashSet::new();
        let mut parsed = Vec::with_capacity(recipe.steps.len());

        for (index, step) in recipe.steps.iter().enumerate() {
            if let Some(id) = &step.id {
                if !seen_ids.insert(id.as_str()) {
                    return Err((Some(index), CommandError::DuplicateStepId(id.clone())));
                }
            }
            let command = self
                .create(&step.command_type, &step.parameters)
                .map_err(|e| (Some(index), e))?;
            parsed.push(ParsedStep {
                index,
                local_id: step.id.clone(),
                command,
                properties: step.properties.clone(),
            });
        }

        Ok(parsed)
    }
}

/// `FamilyInstance.Create` carries no explicit category.
///
/// - Unhosted instances are columns.
/// - Hosted instances with a `rotation` are doors.
/// - Other hosted instances are windows.
///
/// The placed symbol's category is still checked against the model, so a
/// door symbol sent without a rotation fails as a category mismatch.
fn family_instance(params: &Value) -> Result<Command, CommandError> {
    let hosted = params.get("host_wall_id").is_some_and(|v| !v.is_null());
    if !hosted {
        return decode("CreateColumn", params).map(Command::CreateColumn);
    }
    if params.get("rotation").is_some() {
        decode("CreateDoor", params).map(Command::CreateDoor)
    } else {
        decode("CreateWindow", params).map(Command::CreateWindow)
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();

        let level: CommandConstructor =
            |p| decode("CreateLevel", p).map(Command::CreateLevel);
        let wall: CommandConstructor = |p| decode("CreateWall", p).map(Command::CreateWall);
        let door: CommandConstructor = |p| decode("CreateDoor", p).map(Command::CreateDoor);
        let window: CommandConstructor =
            |p| decode("CreateWindow", p).map(Command::CreateWindow);
        let column: CommandConstructor =
            |p| decode("CreateColumn", p).map(Command::CreateColumn);
        let floor: CommandConstructor = |p| decode("CreateFloor", p).map(Command::CreateFloor);
        let room: CommandConstructor = |p| decode("CreateRoom", p).map(Command::CreateRoom);
        let view: CommandConstructor = |p| decode("CreateView", p).map(Command::CreateView);

        registry.register("CreateLevel", level);
        registry.register("Level.Create", level);
        registry.register("CreateWall", wall);
        registry.register("Wall.Create", wall);
        registry.register("CreateDoor", door);
        registry.register("CreateWindow", window);
        registry.register("CreateColumn", column);
        registry.register("FamilyInstance.Create", family_instance);
        registry.register("CreateFloor", floor);
        registry.register("Floor.Create", floor);
        registry.register("CreateRoom", room);
        registry.register("Room.Create", room);
        registry.register("CreateView", view);
        registry.register("View.Create", view);

        registry
    }
}
