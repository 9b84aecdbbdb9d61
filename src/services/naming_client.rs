use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::AppError;
use crate::models::input_file::InputFile;
use crate::services::name_service::FALLBACK_NAME;
use crate::services::settings_service::{Credential, Provider, Settings};

const SVG_SNIPPET_BYTES: usize = 8000;
const PROMPT_SNIPPET_CHARS: usize = 2000;

/// What the naming service is told about a file besides its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHint {
    pub description: &'static str,
    pub snippet: Option<String>,
}

impl ContentHint {
    pub fn for_file(file: &InputFile) -> Self {
        match file.extension_lower().as_str() {
            "svg" => {
                let end = file.content.len().min(SVG_SNIPPET_BYTES);
                let text = String::from_utf8_lossy(&file.content[..end]);
                let snippet: String = text.chars().take(PROMPT_SNIPPET_CHARS).collect();
                Self {
                    description: "SVG vector graphic content (XML).",
                    snippet: Some(snippet).filter(|s| !s.trim().is_empty()),
                }
            }
            "eps" => Self {
                description: "EPS vector graphic (PostScript-based).",
                snippet: None,
            },
            "ai" => Self {
                description: "Adobe Illustrator vector graphic.",
                snippet: None,
            },
            _ => Self {
                description: "Vector design file.",
                snippet: None,
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NamingRequest<'a> {
    pub file: &'a InputFile,
    pub hint: &'a ContentHint,
    pub credential: &'a Credential,
}

/// Produces a free-text title suggestion for one file.
#[async_trait]
pub trait NamingClient: Send + Sync {
    async fn suggest(&self, request: NamingRequest<'_>) -> Result<String, AppError>;
}

pub fn build_prompt(hint: &ContentHint) -> String {
    let mut prompt = String::from(
        "You are a professional digital asset curator.\n\
         Return a concise filename title for the file described below.\n\
         - Use ONLY English letters (A-Z, a-z). No digits. No spaces. No underscores. No hyphens. No punctuation.\n\
         - Length: 2-5 words concatenated (e.g., ElegantFloralMandala).\n\
         - Do NOT include any file extension.\n\
         - The name must be generic but content-relevant and stock-ready.\n\n",
    );
    prompt.push_str(&format!("Context hint: {}\n", hint.description));
    if let Some(snippet) = &hint.snippet {
        prompt.push_str("Snippet (may be truncated):\n");
        prompt.push_str(snippet);
    }
    prompt
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

fn first_choice_text(completion: ChatCompletion) -> String {
    completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .filter(|content| !content.is_empty())
        .unwrap_or_else(|| FALLBACK_NAME.to_string())
}

/// Chat-completions client for the OpenAI API.
pub struct OpenAiNamingClient {
    http: reqwest::Client,
    provider: Provider,
    model: String,
    temperature: f32,
    api_base: String,
}

impl OpenAiNamingClient {
    pub fn new(settings: &Settings) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            provider: settings.provider,
            model: settings.model.clone(),
            temperature: settings.temperature,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl NamingClient for OpenAiNamingClient {
    async fn suggest(&self, request: NamingRequest<'_>) -> Result<String, AppError> {
        if self.provider != Provider::OpenAi {
            return Err(AppError::NamingService(
                "Only OpenAI supported in this build".to_string(),
            ));
        }
        let key = request
            .credential
            .secret()
            .ok_or_else(|| AppError::MissingInput("Missing API key".to_string()))?;

        let prompt = build_prompt(request.hint);
        let messages = vec![ChatMessage {
            role: "user",
            content: &prompt,
        }];
        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect();
            return Err(AppError::NamingService(format!(
                "HTTP status {}: {detail}",
                status.as_u16()
            )));
        }

        let completion: ChatCompletion = response.json().await?;
        let text = first_choice_text(completion);
        tracing::debug!(
            file = %request.file.original_name,
            chars = text.len(),
            "naming service responded"
        );
        Ok(text)
    }
}
