//! Narrative LLM client: generates reuse guidance for a search result via
//! Ollama or an OpenAI-compatible chat endpoint.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::services::NarrativeModel;

/// Cap on snippet characters included in the prompt, to bound prompt size.
const MAX_PROMPT_CODE_CHARS: usize = 2_000;

const SYSTEM_PROMPT: &str =
    "You are a code assistant that explains how to reuse code snippets correctly.";

pub struct NarrativeClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl NarrativeClient {
    /// Construct the client. Fails when the provider requires an API key
    /// and none is configured; the caller treats that as "narratives
    /// disabled", not as a search failure.
    pub fn new(http: reqwest::Client, config: LlmConfig) -> Result<Self> {
        if config.provider == "openai" && config.api_key.is_none() {
            anyhow::bail!("openai provider requires LLM_API_KEY");
        }
        Ok(Self { http, config })
    }

    async fn chat(&self, prompt: &str) -> Result<String> {
        match self.config.provider.as_str() {
            "ollama" => self.chat_ollama(prompt).await,
            "openai" => self.chat_openai(prompt).await,
            other => anyhow::bail!("Unknown LLM provider: {other}"),
        }
    }

    async fn chat_ollama(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.config.base_url);
        let req = OllamaChatRequest {
            model: self.config.model.clone(),
            messages: messages(prompt),
            stream: false,
        };

        let resp = self
            .http
            .post(&url)
            .json(&req)
            .send()
            .await
            .context("Failed to call Ollama chat API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Ollama chat API returned {status}: {body}");
        }

        let body: OllamaChatResponse = resp
            .json()
            .await
            .context("Failed to parse Ollama chat response")?;
        Ok(body.message.content.trim().to_string())
    }

    async fn chat_openai(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.config.base_url);
        let api_key = self.config.api_key.as_deref().unwrap_or_default();
        let req = OpenAiChatRequest {
            model: self.config.model.clone(),
            messages: messages(prompt),
            max_tokens: self.config.max_tokens,
            temperature: 0.7,
        };

        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&req)
            .send()
            .await
            .context("Failed to call OpenAI chat API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI chat API returned {status}: {body}");
        }

        let body: OpenAiChatResponse = resp
            .json()
            .await
            .context("Failed to parse OpenAI chat response")?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .context("OpenAI chat response had no choices")
    }
}

fn messages(prompt: &str) -> Vec<Message> {
    vec![
        Message {
            role: "system".to_string(),
            content: SYSTEM_PROMPT.to_string(),
        },
        Message {
            role: "user".to_string(),
            content: prompt.to_string(),
        },
    ]
}

fn build_prompt(code: &str, language: &str, dependencies: &[String], query: &str) -> String {
    let mut end = code.len().min(MAX_PROMPT_CODE_CHARS);
    while !code.is_char_boundary(end) {
        end -= 1;
    }
    let code = &code[..end];

    let mut prompt = format!(
        "Write reuse guidance for the following {language} code snippet.\n\n\
         Snippet:\n```{language}\n{code}\n```\n\n"
    );

    if !dependencies.is_empty() {
        prompt.push_str(&format!("Required libraries: {}\n\n", dependencies.join(", ")));
    }
    if !query.is_empty() {
        prompt.push_str(&format!("The user is looking for: {query}\n\n"));
    }

    prompt.push_str(
        "Cover, as a short bulleted list:\n\
         1. What the code does\n\
         2. How to integrate it into a project\n\
         3. Parameters and return values, if any\n\
         4. Caveats to watch out for\n\
         5. A minimal usage example",
    );

    prompt
}

#[async_trait]
impl NarrativeModel for NarrativeClient {
    async fn reuse_guidance(
        &self,
        code: &str,
        language: &str,
        dependencies: &[String],
        query: &str,
    ) -> Result<String> {
        let prompt = build_prompt(code, language, dependencies, query);
        self.chat(&prompt).await
    }
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: Message,
}

// ─── OpenAI-compatible ───────────────────────────────────

#[derive(Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: Message,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_prompt_truncates_long_code() {
        let code = "x".repeat(5_000);
        let prompt = build_prompt(&code, "python", &[], "");
        // The snippet section is bounded even though the source is not;
        // check the run length so template text cannot skew the count.
        assert!(prompt.contains(&"x".repeat(MAX_PROMPT_CODE_CHARS)));
        assert!(!prompt.contains(&"x".repeat(MAX_PROMPT_CODE_CHARS + 1)));
    }

    #[test]
    fn test_prompt_includes_dependencies_and_query() {
        let deps = vec!["flask".to_string(), "requests".to_string()];
        let prompt = build_prompt("print(1)", "python", &deps, "http client");
        assert!(prompt.contains("flask, requests"));
        assert!(prompt.contains("http client"));
    }

    #[test]
    fn test_openai_without_key_is_rejected_at_construction() {
        let config = LlmConfig {
            provider: "openai".to_string(),
            api_key: None,
            ..LlmConfig::default()
        };
        assert!(NarrativeClient::new(reqwest::Client::new(), config).is_err());
    }

    #[tokio::test]
    async fn test_ollama_guidance_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": { "role": "assistant", "content": "Use this as a helper.\n" },
                "done": true
            })))
            .mount(&server)
            .await;

        let client = NarrativeClient::new(
            reqwest::Client::new(),
            LlmConfig {
                provider: "ollama".to_string(),
                base_url: server.uri(),
                model: "llama3.2".to_string(),
                api_key: None,
                max_tokens: 500,
            },
        )
        .unwrap();

        let text = client
            .reuse_guidance("def foo(): pass", "python", &[], "helper")
            .await
            .unwrap();
        assert_eq!(text, "Use this as a helper.");
    }
}
