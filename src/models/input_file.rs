use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::error::AppError;

/// One imported file. `index` is its position in the import and is only
/// meaningful until the next import.
#[derive(Debug, Clone, Serialize)]
pub struct InputFile {
    pub index: usize,
    pub original_name: String,
    pub extension: String,
    pub source_path: Option<PathBuf>,
    #[serde(skip)]
    pub content: Arc<[u8]>,
}

impl InputFile {
    pub fn new(index: usize, original_name: &str, content: Vec<u8>) -> Result<Self, AppError> {
        let extension = extension_of(original_name).ok_or_else(|| {
            AppError::MissingInput(format!("file has no extension: {original_name}"))
        })?;
        Ok(Self {
            index,
            original_name: original_name.to_string(),
            extension: extension.to_string(),
            source_path: None,
            content: content.into(),
        })
    }

    pub fn with_source_path(mut self, path: PathBuf) -> Self {
        self.source_path = Some(path);
        self
    }

    /// Original name with its extension suffix removed.
    pub fn base_name(&self) -> &str {
        self.original_name
            .rsplit_once('.')
            .map_or(self.original_name.as_str(), |(base, _)| base)
    }

    pub fn extension_lower(&self) -> String {
        self.extension.to_ascii_lowercase()
    }
}

pub fn extension_of(name: &str) -> Option<&str> {
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext)
}
