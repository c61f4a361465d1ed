//! HTTP inference endpoint adapters.
//!
//! Both the step handler and the planner post `{message, model, mode}` to a
//! chat endpoint and read `{response}` back. Requests are rate limited with
//! a direct `governor` limiter and retried with exponential backoff on
//! connect errors, timeouts, 429 and 5xx responses.

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::errors::{PlanningError, StepError};
use crate::domain::models::{HandlerConfig, Plan, Step, StepAction};
use crate::domain::ports::{validate_plan, Planner, StepHandler, StepOutput, TaskContext};
use crate::services::heuristic_planner::HeuristicPlanner;

static STEP_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:\d+\.|step \d+:)").expect("step marker pattern is valid"));

/// Request mode understood by the inference endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChatMode {
    Agent,
    Plan,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    model: &'a str,
    mode: ChatMode,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    response: String,
}

/// Rate-limited, retrying client for the chat endpoint.
pub struct InferenceClient {
    client: Client,
    config: HandlerConfig,
    limiter: DefaultDirectRateLimiter,
}

impl InferenceClient {
    pub fn new(config: HandlerConfig) -> Result<Self, StepError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| StepError::Unavailable(format!("failed to create HTTP client: {e}")))?;

        let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let limiter = RateLimiter::direct(Quota::per_second(rps));

        Ok(Self {
            client,
            config,
            limiter,
        })
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Send one message and return the endpoint's `response` text.
    pub async fn chat(&self, message: &str, mode: ChatMode) -> Result<String, StepError> {
        let request = ChatRequest {
            message,
            model: &self.config.model,
            mode,
        };
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.config.initial_backoff_ms))
            .with_max_interval(Duration::from_millis(self.config.max_backoff_ms))
            .with_max_elapsed_time(None)
            .build();

        let attempts = AtomicU32::new(0);
        let attempts = &attempts;
        let request = &request;

        backoff::future::retry(policy, move || async move {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            let retryable = attempt < self.config.max_retries;

            self.limiter.until_ready().await;
            debug!(endpoint = %self.config.endpoint, attempt, ?mode, "inference request");

            let response = match self
                .client
                .post(&self.config.endpoint)
                .json(request)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    let transient = e.is_connect() || e.is_timeout();
                    let err = if e.is_timeout() {
                        StepError::Timeout(self.config.timeout_ms)
                    } else {
                        StepError::Unavailable(e.to_string())
                    };
                    return Err(classify(err, transient && retryable, attempt));
                }
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let transient = status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;
                let err = StepError::Failed(format!("HTTP {status}: {body}"));
                return Err(classify(err, transient && retryable, attempt));
            }

            response
                .json::<ChatResponse>()
                .await
                .map(|body| body.response)
                .map_err(|e| {
                    backoff::Error::permanent(StepError::Failed(format!(
                        "failed to parse inference response: {e}"
                    )))
                })
        })
        .await
    }
}

fn classify(err: StepError, transient: bool, attempt: u32) -> backoff::Error<StepError> {
    if transient {
        warn!(attempt, error = %err, "transient inference failure, retrying");
        backoff::Error::transient(err)
    } else {
        backoff::Error::permanent(err)
    }
}

/// Step handler backed by the inference endpoint.
pub struct HttpStepHandler {
    client: Arc<InferenceClient>,
}

impl HttpStepHandler {
    pub fn new(client: Arc<InferenceClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StepHandler for HttpStepHandler {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn handle(&self, step: &Step, ctx: &TaskContext) -> Result<StepOutput, StepError> {
        let message = format!(
            "Task: {}\n\nStep {}/{} ({}): {}",
            ctx.prompt,
            ctx.step_index + 1,
            ctx.total_steps,
            step.action,
            step.description
        );
        let response = self.client.chat(&message, ChatMode::Agent).await?;
        Ok(StepOutput::ok(json!({ "response": response })))
    }
}

/// Planner that asks the inference endpoint for a numbered step list.
///
/// Falls back to the heuristic planner when the endpoint fails or the
/// answer contains no recognizable steps.
pub struct HttpPlanner {
    client: Arc<InferenceClient>,
    fallback: HeuristicPlanner,
}

impl HttpPlanner {
    pub fn new(client: Arc<InferenceClient>, fallback: HeuristicPlanner) -> Self {
        Self { client, fallback }
    }
}

#[async_trait]
impl Planner for HttpPlanner {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn plan(&self, prompt: &str) -> Result<Plan, PlanningError> {
        let message = format!(
            "Break down this task into executable steps. Be specific about files to create and commands to run:\n\n{prompt}"
        );
        let steps = match self.client.chat(&message, ChatMode::Plan).await {
            Ok(response) => parse_plan(&response),
            Err(e) => {
                warn!(error = %e, "inference planning failed, using heuristic plan");
                Vec::new()
            }
        };

        if steps.len() <= 1 {
            return self.fallback.plan(prompt).await;
        }

        let plan = Plan {
            complexity: self.fallback.classify(prompt),
            estimated_time_ms: self.fallback.step_time_estimate_ms() * steps.len() as u64,
            steps,
        };
        validate_plan(&plan)?;
        Ok(plan)
    }
}

/// Parse "1. ..." or "Step N: ..." lines into steps, appending verify.
pub fn parse_plan(response: &str) -> Vec<Step> {
    let mut steps: Vec<Step> = response
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            let marker = STEP_MARKER.find(line)?;
            let description = line[marker.end()..].trim();
            (!description.is_empty()).then(|| Step::new(detect_action(description), description))
        })
        .collect();

    if steps.last().map(|s| s.action) != Some(StepAction::Verify) {
        steps.push(Step::of(StepAction::Verify));
    }
    steps
}

fn detect_action(description: &str) -> StepAction {
    let lower = description.to_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|w| lower.contains(w));
    if mentions(&["verify", "check", "confirm"]) {
        StepAction::Verify
    } else if mentions(&["test"]) {
        StepAction::Test
    } else if mentions(&["run", "execute", "deploy", "install"]) {
        StepAction::Execute
    } else if mentions(&["create", "write", "build", "compile", "implement"]) {
        StepAction::Create
    } else {
        StepAction::Analyze
    }
}
