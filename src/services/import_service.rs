use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::models::input_file::InputFile;

pub const VECTOR_EXTENSIONS: &[&str] = &["svg", "eps", "ai"];

pub fn is_vector_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    VECTOR_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(&format!(".{ext}")))
}

/// Collects vector files under `dir` in path order, indexed from zero.
pub fn import_folder(dir: &Path) -> Result<Vec<InputFile>, AppError> {
    if !dir.is_dir() {
        return Err(AppError::MissingInput(format!(
            "input folder does not exist: {}",
            dir.display()
        )));
    }

    let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name().to_str().is_some_and(is_vector_name))
        .map(|e| e.into_path())
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(AppError::MissingInput(
            "No SVG/EPS/AI files found.".to_string(),
        ));
    }

    let mut files = Vec::with_capacity(paths.len());
    for (index, path) in paths.into_iter().enumerate() {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| AppError::General(format!("invalid file path: {}", path.display())))?;
        let content = fs::read(&path)?;
        files.push(InputFile::new(index, &name, content)?.with_source_path(path));
    }

    tracing::info!(folder = %dir.display(), count = files.len(), "imported vector files");
    Ok(files)
}
