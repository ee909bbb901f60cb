//! Add-on data model shared by the pipeline, the bundler and the store

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::raster::RasterImage;
use crate::sizing::TextureSize;

/// Generated file contents keyed by archive path.
pub type FileMap = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub uri: String,
}

/// Web-grounded research summary gathered before content generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundedContext {
    pub summary: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

/// Four-field qualitative evaluation plus a summary line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub complexity: String,
    pub quality: String,
    pub innovation: String,
    pub common: String,
    pub summary: String,
}

/// Finalized output of a successful run, or of an archive import.
///
/// Imports only carry `files`; every other field is left empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub files: FileMap,
    #[serde(default)]
    pub image: Option<RasterImage>,
    #[serde(default)]
    pub evaluation: Option<Evaluation>,
    #[serde(default)]
    pub context: Option<GroundedContext>,
    #[serde(default)]
    pub critique: Option<String>,
    #[serde(default)]
    pub texture_size: Option<TextureSize>,
}

impl GenerationResult {
    /// A result holding nothing but file contents.
    pub fn from_files(files: FileMap) -> Self {
        Self {
            name: None,
            description: None,
            files,
            image: None,
            evaluation: None,
            context: None,
            critique: None,
            texture_size: None,
        }
    }
}
