use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::ModelError;
use crate::config::ModelConfig;
use crate::pipeline::cancel::CancelToken;

/// How often a pending call checks its cancel token.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Text-completion client abstraction (allows mocking).
///
/// `generate` must stop the underlying request once `cancel` trips and
/// return [`ModelError::Cancelled`]; nothing may keep running afterwards.
pub trait LlmClient: Send + Sync {
    fn generate(
        &self,
        model: &str,
        prompt: &str,
        system: &str,
        cancel: Option<&CancelToken>,
    ) -> Result<String, ModelError>;

    fn list_models(&self) -> Result<Vec<String>, ModelError>;

    fn is_model_available(&self, model: &str) -> Result<bool, ModelError> {
        let models = self.list_models()?;
        Ok(models.iter().any(|m| m.starts_with(model)))
    }

    /// Cheap liveness probe; any error counts as unavailable.
    fn is_available(&self) -> bool {
        self.list_models().is_ok()
    }
}

/// Ollama-compatible HTTP client.
///
/// Requests run on a private runtime so a cancelled call can be dropped
/// mid-flight, which closes its connection. Call from blocking code only.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
    timeout_secs: u64,
    runtime: Option<tokio::runtime::Runtime>,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ModelError::HttpClient(e.to_string()))?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("ollama-client")
            .enable_all()
            .build()
            .map_err(|e| ModelError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
            runtime: Some(runtime),
        })
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self, ModelError> {
        Self::new(&config.endpoint, config.timeout_secs)
    }

    fn map_send_error(&self, e: reqwest::Error) -> ModelError {
        if e.is_connect() {
            ModelError::Connection(self.base_url.clone())
        } else if e.is_timeout() {
            ModelError::Timeout(self.timeout_secs)
        } else {
            ModelError::HttpClient(e.to_string())
        }
    }

    /// Drive `request` to completion, dropping it as soon as `cancel` trips.
    fn run<T>(
        &self,
        request: impl Future<Output = Result<T, ModelError>>,
        cancel: Option<&CancelToken>,
    ) -> Result<T, ModelError> {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| ModelError::HttpClient("client runtime is shut down".into()))?;

        runtime.block_on(async {
            match cancel {
                None => request.await,
                Some(token) => tokio::select! {
                    result = request => result,
                    _ = cancelled(token) => Err(ModelError::Cancelled),
                },
            }
        })
    }

    async fn post_generate(&self, body: &GenerateRequest<'_>) -> Result<String, ModelError> {
        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ModelError::ResponseParsing(e.to_string()))?;
        Ok(parsed.response)
    }

    async fn get_tags(&self) -> Result<Vec<String>, ModelError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TagsResponse = response
            .json()
            .await
            .map_err(|e| ModelError::ResponseParsing(e.to_string()))?;
        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }
}

impl Drop for OllamaClient {
    fn drop(&mut self) {
        // The client may be dropped from inside an async task.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

async fn cancelled(token: &CancelToken) {
    while !token.is_cancelled() {
        tokio::time::sleep(CANCEL_POLL_INTERVAL).await;
    }
}

/// Request body for /api/generate
#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    format: &'a str,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

/// Response body from /api/generate
#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Response body from /api/tags
#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
}

impl LlmClient for OllamaClient {
    fn generate(
        &self,
        model: &str,
        prompt: &str,
        system: &str,
        cancel: Option<&CancelToken>,
    ) -> Result<String, ModelError> {
        let body = GenerateRequest {
            model,
            prompt,
            system,
            stream: false,
            format: "json",
            options: GenerateOptions { temperature: 0.0 },
        };
        self.run(self.post_generate(&body), cancel)
    }

    fn list_models(&self) -> Result<Vec<String>, ModelError> {
        self.run(self.get_tags(), None)
    }
}

/// Mock client for tests: fixed reply or fixed failure, optional delay
/// that honours cancellation, a call counter and peak concurrency.
pub struct MockLlmClient {
    reply: Result<String, String>,
    available_models: Vec<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl MockLlmClient {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            available_models: vec!["llama3.1:latest".to_string()],
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    /// Client whose every call fails with a connection error.
    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            available_models: vec![],
            ..Self::new("")
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.available_models = models;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls running right now.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Most calls ever running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().ok().and_then(|p| p.clone())
    }

    fn respond(&self, cancel: Option<&CancelToken>) -> Result<String, ModelError> {
        if let Some(delay) = self.delay {
            let deadline = Instant::now() + delay;
            loop {
                if cancel.is_some_and(CancelToken::is_cancelled) {
                    return Err(ModelError::Cancelled);
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                std::thread::sleep(CANCEL_POLL_INTERVAL.min(deadline - now));
            }
        }
        self.reply.clone().map_err(ModelError::Connection)
    }
}

impl LlmClient for MockLlmClient {
    fn generate(
        &self,
        _model: &str,
        prompt: &str,
        _system: &str,
        cancel: Option<&CancelToken>,
    ) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_prompt.lock() {
            *last = Some(prompt.to_string());
        }
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let result = self.respond(cancel);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn list_models(&self) -> Result<Vec<String>, ModelError> {
        match &self.reply {
            Ok(_) => Ok(self.available_models.clone()),
            Err(msg) => Err(ModelError::Connection(msg.clone())),
        }
    }
}
