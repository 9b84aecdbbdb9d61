use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::input_file::InputFile;
use crate::models::run::RenameOutcome;
use crate::services::name_service::{sanitize, uniquify, FALLBACK_NAME};
use crate::services::naming_client::{ContentHint, NamingClient, NamingRequest};
use crate::services::settings_service::Credential;
use crate::state::RunSession;

/// Raw suggestion for one file, before sanitizing. A failed naming call is
/// carried as the fallback token plus the error it replaced.
#[derive(Debug, Clone)]
pub struct Suggestion {
    pub raw: String,
    pub error: Option<String>,
}

pub fn lock_session(session: &Mutex<RunSession>) -> MutexGuard<'_, RunSession> {
    session
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Naming client -> sanitizer -> uniquifier for a single file.
pub struct RenameEngine {
    client: Arc<dyn NamingClient>,
    credential: Credential,
}

impl RenameEngine {
    pub fn new(client: Arc<dyn NamingClient>, credential: Credential) -> Self {
        Self { client, credential }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub async fn suggest(&self, file: &InputFile) -> Suggestion {
        let hint = ContentHint::for_file(file);
        let request = NamingRequest {
            file,
            hint: &hint,
            credential: &self.credential,
        };
        match self.client.suggest(request).await {
            Ok(raw) => Suggestion { raw, error: None },
            Err(err) => {
                tracing::warn!(
                    index = file.index,
                    file = %file.original_name,
                    error = %err,
                    "naming failed, using fallback name"
                );
                Suggestion {
                    raw: FALLBACK_NAME.to_string(),
                    error: Some(err.capture().to_string()),
                }
            }
        }
    }

    /// Names one file against the session's reserved names and records it.
    /// Safe to call again for the same index; the previous name stays reserved.
    pub async fn process_one(&self, file: &InputFile, session: &Mutex<RunSession>) -> RenameOutcome {
        let suggestion = self.suggest(file).await;
        commit_suggestion(&mut lock_session(session), file.index, suggestion)
    }
}

pub fn commit_suggestion(
    session: &mut RunSession,
    index: usize,
    suggestion: Suggestion,
) -> RenameOutcome {
    let safe = sanitize(&suggestion.raw);
    let final_name = uniquify(&safe, &mut session.used);
    session.names.insert(index, final_name.clone());
    RenameOutcome {
        index,
        final_name,
        naming_error: suggestion.error,
    }
}
