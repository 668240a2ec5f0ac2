// SPDX-License-Identifier: MIT
//! Async video generation: submit a job, poll it, wait for a terminal state.
//!
//! The vendor runs generation asynchronously. A submission returns only a
//! task id; the task is then polled until it reports `SUCCEEDED` or `FAILED`.
//! The wait loop is explicit and budgeted: the caller owns the poll count and
//! interval, and dropping the returned future abandons the wait without
//! affecting the remote task.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::GatewayError;

// ─── Task model ──────────────────────────────────────────────────────────────

/// Lifecycle of a generation task as the gateway reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Processing,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskState::Processing)
    }

    /// Map the vendor's status string. Only the two terminal states are
    /// recognized; anything else (PENDING, RUNNING, unknown additions) is
    /// still in flight as far as the gateway is concerned.
    fn from_vendor(status: &str) -> Self {
        match status {
            "SUCCEEDED" => TaskState::Succeeded,
            "FAILED" => TaskState::Failed,
            _ => TaskState::Processing,
        }
    }
}

/// Snapshot of a generation task, normalized from the vendor payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationTask {
    pub task_id: String,
    pub status: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Generation knobs forwarded to the vendor's `parameters` object.
///
/// `size` is the only knob the dashboard sets today; anything else the
/// caller supplies is passed through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ─── Poll budget ─────────────────────────────────────────────────────────────

/// Budget for awaiting a terminal task state.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Maximum number of status checks before giving up.
    pub max_polls: u32,
    /// Delay between consecutive checks.
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        // 60 checks 5s apart: five minutes of patience, matching how long
        // the dashboard is willing to show a spinner.
        Self {
            max_polls: 60,
            interval: Duration::from_secs(5),
        }
    }
}

impl PollConfig {
    /// Zero delay between checks. For tests.
    pub fn instant() -> Self {
        Self {
            max_polls: 60,
            interval: Duration::ZERO,
        }
    }
}

// ─── Client ──────────────────────────────────────────────────────────────────

/// Client for the vendor's asynchronous video generation service.
#[derive(Clone)]
pub struct VideoClient {
    client: reqwest::Client,
    api_key: String,
    submit_url: String,
    tasks_base_url: String,
    model: String,
    default_size: Option<String>,
}

impl VideoClient {
    pub fn new(
        client: reqwest::Client,
        api_key: impl Into<String>,
        submit_url: impl Into<String>,
        tasks_base_url: impl Into<String>,
        model: impl Into<String>,
        default_size: Option<String>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            submit_url: submit_url.into(),
            tasks_base_url: tasks_base_url.into(),
            model: model.into(),
            default_size,
        }
    }

    /// Submit a generation job and return its initial snapshot: the extracted
    /// task id with status `Processing`.
    ///
    /// The request is marked asynchronous via the vendor's `X-DashScope-Async`
    /// header, so the response carries no video, only the id to poll. A non-2xx
    /// response, or a success response with no task id in it, surfaces as
    /// [`GatewayError::SubmissionFailed`] with the upstream status and raw
    /// body preserved for diagnostics.
    pub async fn submit(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationTask, GatewayError> {
        if prompt.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "prompt must not be empty".to_string(),
            ));
        }

        let mut parameters = options.extra.clone();
        if let Some(size) = options.size.as_ref().or(self.default_size.as_ref()) {
            parameters.insert("size".to_string(), json!(size));
        }
        let body = json!({
            "model": self.model,
            "input": { "prompt": prompt },
            "parameters": parameters,
        });

        let resp = self
            .client
            .post(&self.submit_url)
            .bearer_auth(&self.api_key)
            .header("X-DashScope-Async", "enable")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(GatewayError::SubmissionFailed {
                status: status.as_u16(),
                body: text,
            });
        }

        // A 2xx answer without a task id leaves nothing to poll; the job never
        // started as far as the gateway can tell, so it counts as a failed
        // submission and keeps the body for diagnostics.
        let Some(task_id) = extract_submit_task_id(&text) else {
            warn!(%status, "submission response carried no task id");
            return Err(GatewayError::SubmissionFailed {
                status: status.as_u16(),
                body: text,
            });
        };
        info!(task_id = %task_id, model = %self.model, "video generation task submitted");
        Ok(GenerationTask {
            task_id,
            status: TaskState::Processing,
            result_url: None,
            error_message: None,
        })
    }

    /// Fetch the current snapshot of a task. One request, no waiting; the
    /// snapshot is returned whatever state the task is in.
    pub async fn poll(&self, task_id: &str) -> Result<GenerationTask, GatewayError> {
        let url = format!("{}/{}", self.tasks_base_url.trim_end_matches('/'), task_id);
        let resp = self.client.get(&url).bearer_auth(&self.api_key).send().await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            // Unknown ids and expired tasks come back as vendor errors.
            return Err(GatewayError::UpstreamFailed {
                message: format!("task endpoint returned {status}: {text}"),
            });
        }
        decode_task_payload(task_id, &text)
    }

    /// Poll until the task reaches a terminal state or the budget runs out.
    ///
    /// Returns the final snapshot on success. A `FAILED` report becomes
    /// [`GatewayError::UpstreamFailed`] carrying the vendor's message, and an
    /// exhausted budget becomes [`GatewayError::PollTimeout`]. Transport
    /// errors abort the wait immediately; whether to re-enter is the caller's
    /// call, the remote task keeps running either way.
    pub async fn wait_until_terminal(
        &self,
        task_id: &str,
        poll: &PollConfig,
    ) -> Result<GenerationTask, GatewayError> {
        for attempt in 1..=poll.max_polls {
            let task = self.poll(task_id).await?;
            match task.status {
                TaskState::Succeeded => {
                    info!(task_id, attempt, "video generation succeeded");
                    return Ok(task);
                }
                TaskState::Failed => {
                    let message = task
                        .error_message
                        .unwrap_or_else(|| "task failed with no message".to_string());
                    warn!(task_id, attempt, %message, "video generation failed");
                    return Err(GatewayError::UpstreamFailed { message });
                }
                TaskState::Processing => {
                    debug!(task_id, attempt, max_polls = poll.max_polls, "task still processing");
                    if attempt < poll.max_polls {
                        tokio::time::sleep(poll.interval).await;
                    }
                }
            }
        }
        Err(GatewayError::PollTimeout {
            task_id: task_id.to_string(),
            attempts: poll.max_polls,
        })
    }
}

// ─── Payload decoding ────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct SubmitEnvelope {
    output: Option<SubmitOutput>,
}

#[derive(Deserialize)]
struct SubmitOutput {
    task_id: Option<String>,
}

/// Pull the task id out of a submission response body. `None` when the body
/// is not JSON or the nested id is absent or blank; the caller treats that
/// as a failed submission, not a decode error.
fn extract_submit_task_id(body: &str) -> Option<String> {
    serde_json::from_str::<SubmitEnvelope>(body)
        .ok()?
        .output?
        .task_id
        .filter(|id| !id.is_empty())
}

#[derive(Deserialize)]
struct TaskEnvelope {
    output: Option<TaskOutput>,
}

#[derive(Deserialize)]
struct TaskOutput {
    task_id: Option<String>,
    task_status: Option<String>,
    video_url: Option<String>,
    message: Option<String>,
}

fn decode_task_payload(polled_id: &str, body: &str) -> Result<GenerationTask, GatewayError> {
    let envelope: TaskEnvelope =
        serde_json::from_str(body).map_err(|e| GatewayError::UnexpectedPayload {
            context: "task-status",
            detail: format!("not valid JSON: {e}"),
        })?;
    let output = envelope.output.ok_or(GatewayError::UnexpectedPayload {
        context: "task-status",
        detail: "missing output object".to_string(),
    })?;
    let vendor_status = output.task_status.ok_or(GatewayError::UnexpectedPayload {
        context: "task-status",
        detail: "missing output.task_status".to_string(),
    })?;

    let status = TaskState::from_vendor(&vendor_status);
    // A success report without the artifact is a broken payload, not a
    // success. Refuse it rather than hand the dashboard an empty URL.
    if status == TaskState::Succeeded && output.video_url.is_none() {
        return Err(GatewayError::UnexpectedPayload {
            context: "task-status",
            detail: "status SUCCEEDED but output.video_url is missing".to_string(),
        });
    }

    // Failures without a vendor message still carry a marker.
    let error_message = match (status, output.message) {
        (TaskState::Failed, None) => Some("task failed with no message".to_string()),
        (_, message) => message,
    };

    Ok(GenerationTask {
        task_id: output.task_id.unwrap_or_else(|| polled_id.to_string()),
        status,
        result_url: output.video_url,
        error_message,
    })
}
