use crate::error::ChatError;
use crate::{ChatProvider, GenerateRequest};
use async_trait::async_trait;
use configuration::GeminiConfig;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

const TOP_P: f32 = 0.8;
const TOP_K: u32 = 40;
const STREAM_CHANNEL_CAPACITY: usize = 64;

// --- Wire types ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    top_p: f32,
    top_k: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody<'a> {
    contents: &'a [Content],
    generation_config: GenerationConfig,
}

impl<'a> GenerateContentBody<'a> {
    fn from_request(request: &'a GenerateRequest) -> Self {
        Self {
            contents: &request.contents,
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
                top_p: TOP_P,
                top_k: TOP_K,
            },
        }
    }
}

/// One `generateContent` response, or one event of a streamed response.
#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<GoogleError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    code: u16,
    message: String,
}

impl GenerateContentResponse {
    /// Text of the first candidate. Blocked or empty candidates yield "".
    fn into_text(self) -> Result<String, ChatError> {
        if let Some(error) = self.error {
            return Err(ChatError::Api { status: error.code, message: error.message });
        }
        Ok(self
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().map(|part| part.text).collect())
            .unwrap_or_default())
    }
}

/// A `ChatProvider` backed by the Gemini REST API.
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> Result<Self, ChatError> {
        let mut api_key = HeaderValue::from_str(&config.api_key)
            .map_err(|_| ChatError::Configuration("Gemini API key contains invalid characters".to_string()))?;
        api_key.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert("x-goog-api-key", api_key);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post(&self, url: String, request: &GenerateRequest) -> Result<reqwest::Response, ChatError> {
        let response = self
            .client
            .post(&url)
            .json(&GenerateContentBody::from_request(request))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<GoogleErrorBody>(&text)
            .map(|body| body.error.message)
            .unwrap_or(text);
        Err(ChatError::Api { status: status.as_u16(), message })
    }
}

#[async_trait]
impl ChatProvider for GeminiClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, ChatError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, request.model);
        let response = self.post(url, request).await?;
        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ChatError::Deserialization(e.to_string()))?;
        body.into_text()
    }

    async fn stream(&self, request: &GenerateRequest) -> Result<mpsc::Receiver<Result<String, ChatError>>, ChatError> {
        let url = format!("{}/models/{}:streamGenerateContent?alt=sse", self.base_url, request.model);
        let response = self.post(url, request).await?;
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            let mut buffer = Vec::new();

            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(Err(ChatError::Http(e))).await;
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);

                if !forward_payloads(&tx, drain_sse_data(&mut buffer)).await {
                    return;
                }
            }
            forward_payloads(&tx, finish_sse_data(&mut buffer)).await;
        });

        Ok(rx)
    }
}

/// Parses each payload and sends its text. Returns `false` once the stream
/// should stop, either because a payload failed or the receiver is gone.
async fn forward_payloads(tx: &mpsc::Sender<Result<String, ChatError>>, payloads: Vec<String>) -> bool {
    for payload in payloads {
        let item = serde_json::from_str::<GenerateContentResponse>(&payload)
            .map_err(|e| ChatError::Deserialization(e.to_string()))
            .and_then(GenerateContentResponse::into_text);
        let failed = item.is_err();
        if tx.send(item).await.is_err() {
            tracing::debug!("Stream receiver dropped. Closing the Gemini response.");
            return false;
        }
        if failed {
            return false;
        }
    }
    true
}

/// Removes every complete line from `buffer` and returns the payloads of its
/// `data:` lines. A trailing partial line stays in the buffer for the next
/// network chunk.
pub(crate) fn drain_sse_data(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut payloads = Vec::new();
    while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=newline).collect();
        let line = String::from_utf8_lossy(&line);
        let line = line.trim_end_matches(['\r', '\n']);
        if let Some(data) = line.strip_prefix("data:") {
            let data = data.trim_start();
            if !data.is_empty() {
                payloads.push(data.to_string());
            }
        }
    }
    payloads
}

/// Like [`drain_sse_data`], for the end of the body: a final line without a
/// trailing newline still counts.
pub(crate) fn finish_sse_data(buffer: &mut Vec<u8>) -> Vec<String> {
    if !buffer.is_empty() && !buffer.ends_with(b"\n") {
        buffer.push(b'\n');
    }
    drain_sse_data(buffer)
}
