//! Platform adapter — bootstrap and service registration.
//!
//! [`setup`] builds the remote client, constructs exactly one sensor entity,
//! spawns its single-owner task, and registers the `openai_input` service.
//! The returned [`Platform`] owns the registry and the sensor task handle.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{PlatformConfig, RemoteConfig};
use crate::error::AppError;
use crate::remote::PredictClient;
use crate::sensor::{SensorCommand, SensorEntity, StateEvent, run_sensor};
use crate::service::{ServiceError, ServiceHandler, ServiceRegistry, ServiceReply};

/// Component domain identifier.
pub const DOMAIN: &str = "openai_response";
/// Full id of the prompt service.
pub const SERVICE_OPENAI_INPUT: &str = "openai_response.openai_input";

/// Payload field carrying the model identifier.
pub const ATTR_MODEL: &str = "model";
/// Payload field carrying the prompt string.
pub const ATTR_PROMPT: &str = "prompt";

// ── Platform ──────────────────────────────────────────────────────────────────

/// A running platform: the service registry plus the sensor task handle.
pub struct Platform {
    pub registry: Arc<ServiceRegistry>,
    sensor_task: JoinHandle<()>,
}

impl Platform {
    /// Wait for the sensor task to exit (it stops once the shutdown token is
    /// cancelled or every command sender is dropped).
    pub async fn join(self) -> Result<(), AppError> {
        self.sensor_task
            .await
            .map_err(|e| AppError::Platform(format!("sensor task panicked: {e}")))
    }
}

/// Construct the sensor entity and its task, and register the
/// `openai_input` service.
///
/// Publishes the initial idle state to `events` as soon as the sensor task
/// starts. Fails only when the HTTP client cannot be built — schema
/// validation already happened at config load.
pub fn setup(
    platform: &PlatformConfig,
    remote: &RemoteConfig,
    events: mpsc::Sender<StateEvent>,
    shutdown: CancellationToken,
) -> Result<Platform, AppError> {
    let client = PredictClient::new(
        remote.base_url.clone(),
        platform.session_cookie.clone(),
        remote.timeout_seconds,
    )
    .map_err(|e| AppError::Platform(e.to_string()))?;

    let entity = SensorEntity::new(platform.name.clone(), platform.model.clone(), events);
    let (cmd_tx, cmd_rx) = mpsc::channel::<SensorCommand>(16);

    info!(entity = %platform.name, model = %platform.model, "sensor entity registered");
    let sensor_task = tokio::spawn(run_sensor(entity, client, cmd_rx, shutdown));

    let mut registry = ServiceRegistry::new();
    registry.register(Box::new(OpenAiInputHandler {
        cmd_tx,
        default_model: platform.model.clone(),
    }));

    Ok(Platform {
        registry: Arc::new(registry),
        sensor_task,
    })
}

// ── Service handler ───────────────────────────────────────────────────────────

/// Handler for [`SERVICE_OPENAI_INPUT`].
///
/// Reads `model` and `prompt` from an arbitrary payload — no validation
/// beyond presence. A missing `prompt` is forwarded as `None`; a missing or
/// non-string `model` falls back to the configured default.
struct OpenAiInputHandler {
    cmd_tx: mpsc::Sender<SensorCommand>,
    default_model: String,
}

/// Extract `(model, prompt)` from a service payload, falling back to
/// `default_model`.
fn read_request_fields(payload: &Value, default_model: &str) -> (String, Option<String>) {
    let model = payload
        .get(ATTR_MODEL)
        .and_then(Value::as_str)
        .unwrap_or(default_model)
        .to_string();
    let prompt = payload
        .get(ATTR_PROMPT)
        .and_then(Value::as_str)
        .map(str::to_string);
    (model, prompt)
}

impl ServiceHandler for OpenAiInputHandler {
    fn id(&self) -> &str {
        SERVICE_OPENAI_INPUT
    }

    /// Forward the call as a [`SensorCommand::RunPrompt`]. Ownership of
    /// `reply_tx` moves into a spawned task — the caller returns immediately.
    fn handle(&self, payload: Value, reply_tx: oneshot::Sender<ServiceReply>) {
        debug!(payload = %payload, "service call received");
        let (model, prompt) = read_request_fields(&payload, &self.default_model);

        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            let (done_tx, done_rx) = oneshot::channel();
            let cmd = SensorCommand::RunPrompt { model, prompt, reply_tx: done_tx };
            if cmd_tx.send(cmd).await.is_err() {
                let _ = reply_tx.send(Err(ServiceError::Failed(
                    "sensor task is not running".into(),
                )));
                return;
            }
            let result = match done_rx.await {
                Ok(Ok(text)) => Ok(text),
                Ok(Err(e)) => Err(ServiceError::Failed(e.to_string())),
                Err(_) => Err(ServiceError::Failed(
                    "sensor task dropped the request".into(),
                )),
            };
            let _ = reply_tx.send(result);
        });
    }
}

// ── Linked-input watcher ──────────────────────────────────────────────────────

/// Spawn the linked-input watcher: each observed input value becomes an
/// `openai_input` service call with the default model, and the reply (or
/// error) is rendered.
///
/// Standalone analogue of a state-change callback on a tracked input entity.
/// Empty values are ignored.
pub fn spawn_input_watcher(
    registry: Arc<ServiceRegistry>,
    mut input_rx: mpsc::Receiver<String>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("input watcher shutting down");
                    break;
                }

                changed = input_rx.recv() => {
                    let Some(new_text) = changed else {
                        info!("input channel closed, watcher exiting");
                        break;
                    };
                    if new_text.is_empty() {
                        continue;
                    }
                    debug!(input = %new_text, "linked input changed");

                    let payload = serde_json::json!({ "prompt": new_text });
                    match registry.call(SERVICE_OPENAI_INPUT, payload).await {
                        Ok(reply) => println!("{reply}"),
                        Err(e) => warn!("service call failed: {e}"),
                    }
                }
            }
        }
    })
}
