use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("{0}")]
    General(String),

    #[error("{0}")]
    MissingInput(String),

    #[error("Naming service error: {0}")]
    NamingService(String),

    #[error("Nothing to export. Run structor first.")]
    PackagingEmpty,

    #[error("cannot {action} while run is {from}")]
    InvalidTransition {
        from: crate::state::RunStatus,
        action: &'static str,
    },

    #[error("no imported file at index {0}")]
    IndexOutOfRange(usize),
}

impl AppError {
    pub fn capture(self) -> Self {
        sentry::capture_message(&self.to_string(), sentry::Level::Error);
        self
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
