//! Archive Builder - flat path-addressed bundles and their zip form

use std::io::{Cursor, Read, Write};
use std::path::Path;

use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::addon::{FileMap, GenerationResult};
use crate::raster::RasterImage;

/// Where a texture icon is placed in an exported bundle: the item texture
/// and the icons of both packs.
pub const ICON_PATHS: [&str; 3] = [
    "resource_pack/textures/items/custom_item.png",
    "behavior_pack/pack_icon.png",
    "resource_pack/pack_icon.png",
];

pub const ARCHIVE_EXTENSION: &str = "mcaddon";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Archive is unreadable or corrupt: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleEntry {
    pub path: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bundle {
    entries: Vec<BundleEntry>,
}

impl Bundle {
    /// Package text entries verbatim, plus the icon at every [`ICON_PATHS`]
    /// location when present.
    ///
    /// Paths are opaque. Duplicates among `files` are the caller's problem.
    pub fn build<'a, I>(files: I, icon: Option<&RasterImage>) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut entries: Vec<BundleEntry> = files
            .into_iter()
            .map(|(path, content)| BundleEntry {
                path: path.to_string(),
                bytes: content.as_bytes().to_vec(),
            })
            .collect();

        if let Some(icon) = icon {
            for path in ICON_PATHS {
                entries.push(BundleEntry {
                    path: path.to_string(),
                    bytes: icon.png_bytes().to_vec(),
                });
            }
        }

        Self { entries }
    }

    /// Bundle a generation result using its own image as the icon.
    pub fn from_result(result: &GenerationResult) -> Self {
        Self::from_files(&result.files, result.image.as_ref())
    }

    pub fn from_files(files: &FileMap, icon: Option<&RasterImage>) -> Self {
        Self::build(files.iter().map(|(p, c)| (p.as_str(), c.as_str())), icon)
    }

    pub fn entries(&self) -> &[BundleEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| e.path == path)
            .map(|e| e.bytes.as_slice())
    }

    /// Serialize as a single deflate-compressed zip archive.
    pub fn to_zip(&self) -> Result<Vec<u8>, ArchiveError> {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        for entry in &self.entries {
            writer.start_file(entry.path.as_str(), options)?;
            writer.write_all(&entry.bytes)?;
        }

        Ok(writer.finish()?.into_inner())
    }

    pub fn write_to(&self, path: &Path) -> Result<(), ArchiveError> {
        let bytes = self.to_zip()?;
        std::fs::write(path, bytes)?;
        tracing::info!(path = %path.display(), entries = self.entries.len(), "bundle exported");
        Ok(())
    }
}

/// Read every non-directory entry of an archive as text.
///
/// Entries that are not valid UTF-8 are decoded lossily.
pub fn read_archive_files(bytes: &[u8]) -> Result<FileMap, ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut files = FileMap::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let mut raw = Vec::new();
        entry.read_to_end(&mut raw)?;
        files.insert(name, String::from_utf8_lossy(&raw).into_owned());
    }

    Ok(files)
}

/// Inverse of export: a result with file contents only.
pub fn import_archive(bytes: &[u8]) -> Result<GenerationResult, ArchiveError> {
    let files = read_archive_files(bytes)?;
    tracing::info!(entries = files.len(), "archive imported");
    Ok(GenerationResult::from_files(files))
}

/// File name for an exported archive, e.g. `"Emerald Blade"` -> `emerald_blade.mcaddon`.
pub fn export_file_name(name: Option<&str>) -> String {
    let stem = name
        .map(|n| n.split_whitespace().collect::<Vec<_>>().join("_").to_lowercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "my_addon".to_string());
    format!("{}.{}", stem, ARCHIVE_EXTENSION)
}
