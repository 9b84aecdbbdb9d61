use std::collections::{BTreeMap, HashSet};
use std::io::{Cursor, Write};

use serde::Serialize;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::AppError;
use crate::models::input_file::InputFile;
use crate::services::name_service::sanitize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportEntry {
    pub index: usize,
    pub original: String,
    pub renamed: String,
    /// False when the name came from the sanitized original base name.
    pub computed: bool,
}

/// Entry names in import order. Files without a computed name fall back to
/// their sanitized base name; the fallback never touches the run's used names.
pub fn plan_entries(files: &[InputFile], names: &BTreeMap<usize, String>) -> Vec<ExportEntry> {
    files
        .iter()
        .map(|file| {
            let (base, computed) = match names.get(&file.index) {
                Some(name) => (name.clone(), true),
                None => (sanitize(file.base_name()), false),
            };
            ExportEntry {
                index: file.index,
                original: file.original_name.clone(),
                renamed: format!("{base}.{}", file.extension),
                computed,
            }
        })
        .collect()
}

pub fn build_archive(
    files: &[InputFile],
    names: &BTreeMap<usize, String>,
) -> Result<Vec<u8>, AppError> {
    if names.is_empty() {
        return Err(AppError::PackagingEmpty);
    }

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let mut written: HashSet<String> = HashSet::new();

    for (entry, file) in plan_entries(files, names).into_iter().zip(files) {
        if !written.insert(entry.renamed.clone()) {
            tracing::warn!(
                index = entry.index,
                entry = %entry.renamed,
                "duplicate archive entry name, keeping the first"
            );
            continue;
        }
        writer.start_file(entry.renamed.clone(), options)?;
        writer.write_all(&file.content)?;
    }

    let cursor = writer.finish()?;
    tracing::info!(entries = written.len(), "archive built");
    Ok(cursor.into_inner())
}

pub fn manifest_json(entries: &[ExportEntry]) -> Result<String, AppError> {
    Ok(serde_json::to_string_pretty(entries)?)
}
