//! Durable model and image artifacts.
//!
//! Files are written to a temporary sibling and renamed into place, so a
//! reader never sees a partially written artifact and a failed write leaves
//! nothing behind.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use planforge_core::job::ResultLocator;
use planforge_core::recipe::ProjectInfo;
use planforge_core::types::JobId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::document::Document;
use crate::element::{Element, ElementData, ElementId, ElementKind};
use crate::error::ModelError;

pub const MODEL_FORMAT: &str = "planforge-model";
pub const MODEL_FORMAT_VERSION: u32 = 1;
pub const MODEL_EXTENSION: &str = "pfm.json";
pub const MODEL_CONTENT_TYPE: &str = "application/octet-stream";
pub const IMAGE_EXTENSION: &str = "png";
pub const IMAGE_CONTENT_TYPE: &str = "image/png";

#[derive(Serialize, Deserialize)]
struct ArtifactFile {
    format: String,
    version: u32,
    #[serde(default)]
    project_info: Option<ProjectInfo>,
    next_id: u64,
    elements: Vec<Element>,
}

/// Serialize a document into the artifact format.
pub fn encode(document: &Document) -> Result<Vec<u8>, ModelError> {
    let file = ArtifactFile {
        format: MODEL_FORMAT.to_string(),
        version: MODEL_FORMAT_VERSION,
        project_info: document.project_info.clone(),
        next_id: document.next_id,
        elements: document.elements().cloned().collect(),
    };
    serde_json::to_vec_pretty(&file).map_err(|e| ModelError::CorruptArtifact(e.to_string()))
}

/// Rebuild a document from artifact bytes.
pub fn decode(bytes: &[u8]) -> Result<Document, ModelError> {
    let file: ArtifactFile =
        serde_json::from_slice(bytes).map_err(|e| ModelError::CorruptArtifact(e.to_string()))?;
    if file.format != MODEL_FORMAT {
        return Err(ModelError::CorruptArtifact(format!(
            "unexpected format '{}'",
            file.format
        )));
    }
    if file.version != MODEL_FORMAT_VERSION {
        return Err(ModelError::CorruptArtifact(format!(
            "unsupported version {}",
            file.version
        )));
    }

    let mut document = Document::new();
    document.project_info = file.project_info;
    for element in file.elements {
        if element.id.0 >= file.next_id {
            return Err(ModelError::CorruptArtifact(format!(
                "element {} is beyond next id {}",
                element.id, file.next_id
            )));
        }
        if document.elements.insert(element.id, element).is_some() {
            return Err(ModelError::CorruptArtifact("duplicate element id".into()));
        }
    }
    document.next_id = file.next_id;
    check_references(&document)?;
    Ok(document)
}

/// Every id an element points at must exist and be of the right kind.
fn check_references(document: &Document) -> Result<(), ModelError> {
    for element in document.elements() {
        let references: Vec<(ElementId, ElementKind)> = match &element.data {
            ElementData::Level { .. }
            | ElementData::WallType { .. }
            | ElementData::FloorType { .. }
            | ElementData::FamilySymbol { .. } => Vec::new(),
            ElementData::Wall {
                wall_type, level, ..
            } => vec![(*wall_type, ElementKind::WallType), (*level, ElementKind::Level)],
            ElementData::Door {
                symbol, host, level, ..
            }
            | ElementData::Window {
                symbol, host, level, ..
            } => vec![
                (*symbol, ElementKind::FamilySymbol),
                (*host, ElementKind::Wall),
                (*level, ElementKind::Level),
            ],
            ElementData::Column { symbol, level, .. } => vec![
                (*symbol, ElementKind::FamilySymbol),
                (*level, ElementKind::Level),
            ],
            ElementData::Floor {
                floor_type, level, ..
            } => vec![(*floor_type, ElementKind::FloorType), (*level, ElementKind::Level)],
            ElementData::Room { level, .. } => vec![(*level, ElementKind::Level)],
            ElementData::View { level, .. } => {
                level.iter().map(|id| (*id, ElementKind::Level)).collect()
            }
        };
        for (id, kind) in references {
            document.expect_kind(id, kind).map_err(|e| {
                ModelError::CorruptArtifact(format!("element {}: {e}", element.id))
            })?;
        }
    }
    Ok(())
}

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Directory of persisted job outputs.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn model_file_name(job_id: &JobId) -> String {
        format!("{job_id}.{MODEL_EXTENSION}")
    }

    pub fn image_file_name(job_id: &JobId) -> String {
        format!("{job_id}.{IMAGE_EXTENSION}")
    }

    pub fn artifact_path(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    /// Persist a committed document as `<job_id>.pfm.json`.
    pub fn persist_model(
        &self,
        job_id: &JobId,
        document: &Document,
    ) -> Result<ResultLocator, ModelError> {
        let bytes = encode(document)?;
        self.write_atomically(&Self::model_file_name(job_id), &bytes, MODEL_CONTENT_TYPE)
    }

    /// Persist an exported PNG as `<job_id>.png`.
    pub fn persist_image(&self, job_id: &JobId, png: &[u8]) -> Result<ResultLocator, ModelError> {
        self.write_atomically(&Self::image_file_name(job_id), png, IMAGE_CONTENT_TYPE)
    }

    /// Delete an artifact. A missing file is not an error.
    pub fn remove(&self, locator: &ResultLocator) -> Result<(), ModelError> {
        match fs::remove_file(&locator.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_atomically(
        &self,
        file_name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<ResultLocator, ModelError> {
        fs::create_dir_all(&self.root)?;
        let path = self.artifact_path(file_name);
        let tmp = self.root.join(format!(".{file_name}.tmp"));

        let written = (|| -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, &path)
        })();
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        tracing::debug!(path = %path.display(), size = bytes.len(), "Artifact persisted");
        Ok(ResultLocator {
            path,
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            size_bytes: bytes.len() as u64,
            sha256: sha256_hex(bytes),
        })
    }
}
