use crate::config::Config;
use crate::error::AppError;
use crate::llm::{ChatCompletion, ChatMessage, CompletionRequest};
use crate::site::SiteFetcher;
use std::sync::Arc;

pub const FALLBACK_RESPONSE: &str = "Could not generate a response at this time.";

/// Per-request constants of the assistant, taken from [`Config`].
#[derive(Debug, Clone)]
pub struct AssistantSettings {
    pub name: String,
    pub language: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// `None` disables site augmentation.
    pub site_url: Option<String>,
    pub site_max_chars: usize,
}

impl From<&Config> for AssistantSettings {
    fn from(config: &Config) -> Self {
        Self {
            name: config.assistant.name.clone(),
            language: config.assistant.language.clone(),
            model: config.llm.model.clone(),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            site_url: config.site.enabled.then(|| config.site.url.clone()),
            site_max_chars: config.site.max_chars,
        }
    }
}

pub struct Assistant {
    settings: AssistantSettings,
    site_fetcher: Arc<dyn SiteFetcher>,
    completion: Arc<dyn ChatCompletion>,
}

impl Assistant {
    pub fn new(
        settings: AssistantSettings,
        site_fetcher: Arc<dyn SiteFetcher>,
        completion: Arc<dyn ChatCompletion>,
    ) -> Self {
        Self {
            settings,
            site_fetcher,
            completion,
        }
    }

    pub fn system_prompt(&self) -> String {
        let source = if self.settings.site_url.is_some() {
            "- Use **ONLY** the public information extracted from the official website (it is provided in the next system message)."
        } else {
            "- Use **ONLY** public information about the institution you represent."
        };

        [
            format!(
                "You are the institutional assistant \"{}\".",
                self.settings.name
            ),
            format!("- Respond **only in {}**.", self.settings.language),
            source.to_string(),
            "- Do not infer or invent facts that are not present in that information.".to_string(),
            "- If the requested information is NOT on the website, say so clearly and professionally and suggest the contact channels published on the website.".to_string(),
            "- Skip greetings and unnecessary courtesy phrases; answer directly and concisely.".to_string(),
            "- When you need clarification, **ask short questions** (10 words max).".to_string(),
            "- Never include or paste the website URL in your answers.".to_string(),
            "- Do not give outside opinions or recommendations beyond the official website.".to_string(),
        ]
        .join("\n")
    }

    pub fn site_message(site_text: &str) -> String {
        format!(
            "WEB_EXTRACT (text automatically extracted from the official website):\n{}",
            site_text
        )
    }

    pub fn build_messages(&self, prompt: &str, site_text: Option<&str>) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(self.system_prompt())];
        if let Some(text) = site_text {
            messages.push(ChatMessage::system(Self::site_message(text)));
        }
        messages.push(ChatMessage::user(prompt));
        messages
    }

    /// Runs one prompt through site extraction and the completion API.
    pub async fn answer(&self, prompt: &str) -> Result<String, AppError> {
        let site_text = match &self.settings.site_url {
            Some(url) => Some(
                self.site_fetcher
                    .fetch_text(url, self.settings.site_max_chars)
                    .await,
            ),
            None => None,
        };
        if let Some(text) = &site_text {
            tracing::debug!(chars = text.chars().count(), "Using site text as context");
        }

        let request = CompletionRequest {
            model: self.settings.model.clone(),
            messages: self.build_messages(prompt, site_text.as_deref()),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        let content = self
            .completion
            .complete(&request)
            .await
            .map_err(|e| AppError::Completion(format!("{:#}", e)))?;

        Ok(content
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| FALLBACK_RESPONSE.to_string()))
    }
}
