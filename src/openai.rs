/// OpenAI module
///
/// This module handles:
/// - Batched embedding requests used to cluster posts
/// - Chat-completion requests that summarize one cluster of posts

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Config;

/// Largest number of inputs sent in a single embedding request
const EMBEDDING_BATCH_SIZE: usize = 96;

const SUMMARY_PROMPT: &str = "You're a news analyst. Here are a few posts on the same topic. \
    Make a short and clear summary of this topic in English in the Australian manner. \
    Highlight the facts, no repetition. Here are the messages:";

/// Turns texts into embedding vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input text, in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Writes a short summary of a group of related posts
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, posts: &[String]) -> Result<String>;
}

/// A message in a chat-completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String, // "system", "user" or "assistant"
    pub content: String,
}

/// OpenAI API request/response structures
#[derive(Debug, Serialize)]
struct OpenAIEmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChatChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChatChoice {
    message: ChatMessage,
}

/// Build the summary prompt for a group of posts
pub fn build_summary_prompt(posts: &[String]) -> String {
    format!("{}\n\n{}", SUMMARY_PROMPT, posts.join("\n\n"))
}

/// Client for an OpenAI-compatible API
pub struct OpenAIClient {
    http_client: reqwest::Client,
    api_key: String,
    api_base: String,
    embedding_model: String,
    gpt_model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAIClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create OpenAI HTTP client")?;

        Ok(Self {
            http_client,
            api_key: config.openai_api_key.clone(),
            api_base: config.openai_api_base.clone(),
            embedding_model: config.embedding_model.clone(),
            gpt_model: config.gpt_model.clone(),
            temperature: config.summary_temperature,
            max_tokens: config.summary_max_tokens,
        })
    }

    /// POST a JSON body and return the raw response text, failing on non-2xx
    async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<String> {
        let url = format!("{}/{}", self.api_base, path);

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        // Check HTTP status
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(anyhow::anyhow!(
                "OpenAI API error (status {}): {}",
                status,
                error_text
            ));
        }

        response
            .text()
            .await
            .context("Failed to read response body")
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = OpenAIEmbeddingRequest {
            input: batch,
            model: &self.embedding_model,
        };

        let response_text = self.post_json("embeddings", &request).await?;

        let response: OpenAIEmbeddingResponse = serde_json::from_str(&response_text)
            .with_context(|| {
                format!(
                    "Failed to parse embedding response. Response was: {}",
                    response_text
                )
            })?;

        order_embeddings(response.data, batch.len())
    }
}

/// Put embeddings back in input order and check none is missing
fn order_embeddings(mut data: Vec<OpenAIEmbeddingData>, expected: usize) -> Result<Vec<Vec<f32>>> {
    if data.len() != expected {
        anyhow::bail!(
            "Embedding count mismatch: sent {} inputs, got {} vectors",
            expected,
            data.len()
        );
    }

    data.sort_by_key(|d| d.index);
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl Embedder for OpenAIClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(EMBEDDING_BATCH_SIZE) {
            log::debug!("Embedding batch of {} texts", batch.len());
            embeddings.extend(self.embed_batch(batch).await?);
        }

        Ok(embeddings)
    }
}

#[async_trait]
impl Summarizer for OpenAIClient {
    async fn summarize(&self, posts: &[String]) -> Result<String> {
        log::info!("Summarizing {} posts with {}", posts.len(), self.gpt_model);

        let request = OpenAIChatRequest {
            model: self.gpt_model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: build_summary_prompt(posts),
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response_text = self.post_json("chat/completions", &request).await?;

        let response: OpenAIChatResponse = serde_json::from_str(&response_text)
            .context("Failed to parse chat completion response")?;

        let answer = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .context("No response from GPT")?;

        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{config_with, serve};

    #[test]
    fn prompt_lists_posts_after_instructions() {
        let prompt = build_summary_prompt(&["first".to_string(), "second".to_string()]);

        assert!(prompt.starts_with("You're a news analyst."));
        assert!(prompt.contains("in the Australian manner"));
        assert!(prompt.ends_with("Here are the messages:\n\nfirst\n\nsecond"));
    }

    #[test]
    fn embeddings_are_reordered_by_index() {
        let body = r#"{"data": [
            {"index": 1, "embedding": [0.0, 1.0]},
            {"index": 0, "embedding": [1.0, 0.0]}
        ], "model": "text-embedding-3-small"}"#;
        let response: OpenAIEmbeddingResponse = serde_json::from_str(body).unwrap();

        let ordered = order_embeddings(response.data, 2).unwrap();
        assert_eq!(ordered, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn missing_embeddings_are_an_error() {
        let data = vec![OpenAIEmbeddingData {
            embedding: vec![1.0],
            index: 0,
        }];
        assert!(order_embeddings(data, 2).is_err());
    }

    #[test]
    fn chat_request_serializes_like_the_api_expects() {
        let request = OpenAIChatRequest {
            model: "gpt-4o".to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "hi".to_string(),
            }],
            temperature: 0.5,
            max_tokens: 400,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "gpt-4o");
        assert_eq!(value["max_tokens"], 400);
        assert_eq!(value["messages"][0]["role"], "user");
    }

    /// Answers embedding requests with `[n]` for input `"n"`, listed in
    /// reverse so the client has to reorder them
    fn numbered_embeddings(body: &str) -> String {
        let request: serde_json::Value = serde_json::from_str(body).unwrap();
        let inputs = request["input"].as_array().unwrap();

        let data: Vec<serde_json::Value> = inputs
            .iter()
            .enumerate()
            .rev()
            .map(|(index, input)| {
                let n: f32 = input.as_str().unwrap().parse().unwrap();
                serde_json::json!({"index": index, "embedding": [n]})
            })
            .collect();

        serde_json::json!({"data": data, "model": "text-embedding-3-small"}).to_string()
    }

    #[tokio::test]
    async fn large_inputs_are_embedded_in_ordered_batches() {
        let (url, requests) =
            serve("application/json", |r| numbered_embeddings(&r.body)).await;
        let client =
            OpenAIClient::new(&config_with(&[("OPENAI_API_BASE", format!("{}/v1", url))])).unwrap();
        let texts: Vec<String> = (0..200).map(|n| n.to_string()).collect();

        let embeddings = client.embed(&texts).await.unwrap();

        let expected: Vec<Vec<f32>> = (0..200).map(|n| vec![n as f32]).collect();
        assert_eq!(embeddings, expected);

        let requests = requests.lock().unwrap();
        let batches: Vec<(usize, String)> = requests
            .iter()
            .map(|r| {
                assert_eq!(r.path, "/v1/embeddings");
                let body: serde_json::Value = serde_json::from_str(&r.body).unwrap();
                let inputs = body["input"].as_array().unwrap();
                (inputs.len(), inputs[0].as_str().unwrap().to_string())
            })
            .collect();
        assert_eq!(
            batches,
            vec![
                (96, "0".to_string()),
                (96, "96".to_string()),
                (8, "192".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn no_texts_means_no_request() {
        let (url, requests) =
            serve("application/json", |r| numbered_embeddings(&r.body)).await;
        let client =
            OpenAIClient::new(&config_with(&[("OPENAI_API_BASE", format!("{}/v1", url))])).unwrap();

        assert!(client.embed(&[]).await.unwrap().is_empty());
        assert!(requests.lock().unwrap().is_empty());
    }
}
