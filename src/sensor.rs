//! Sensor entity — display-state mirror for the prediction sensor, plus the
//! single-owner task that drives it.
//!
//! The entity is owned exclusively by [`run_sensor`]; all mutation goes
//! through [`SensorCommand`]s delivered over a bounded channel. Every
//! mutation publishes a [`StateEvent`] snapshot to the observer channel.
//!
//! The state machine is cyclic with no terminal and no error state:
//! idle → requesting → response_received → requesting → … A failed exchange
//! is logged and leaves the sensor at `requesting`.

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::remote::{PredictClient, RemoteError};

// ── Status ────────────────────────────────────────────────────────────────────

/// Sensor display status. A fresh entity has no status at all (`None`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorStatus {
    Requesting,
    ResponseReceived,
}

impl SensorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorStatus::Requesting => "requesting",
            SensorStatus::ResponseReceived => "response_received",
        }
    }
}

// ── State events ──────────────────────────────────────────────────────────────

/// Attribute bag published alongside the status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateAttributes {
    pub response_text: String,
    pub prompt: Option<String>,
    pub model: String,
}

/// Snapshot pushed to the observer channel on every entity mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateEvent {
    /// Entity display name.
    pub entity: String,
    pub native_value: Option<SensorStatus>,
    pub attributes: StateAttributes,
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// Commands delivered to the sensor task.
pub enum SensorCommand {
    /// Run one prompt through the remote model and record the result.
    ///
    /// `model` is already resolved by the caller (payload value or configured
    /// default). `prompt` may be absent — it is forwarded to the remote call
    /// as-is.
    RunPrompt {
        model: String,
        prompt: Option<String>,
        reply_tx: oneshot::Sender<Result<String, RemoteError>>,
    },
}

// ── Entity ────────────────────────────────────────────────────────────────────

/// The prediction sensor entity.
///
/// Mutated only through [`request_running`](Self::request_running) and
/// [`response_received`](Self::response_received); both publish the new
/// state before returning.
pub struct SensorEntity {
    name: String,
    model: String,
    prompt: Option<String>,
    native_value: Option<SensorStatus>,
    response_text: String,
    events: mpsc::Sender<StateEvent>,
}

impl SensorEntity {
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        events: mpsc::Sender<StateEvent>,
    ) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            prompt: None,
            native_value: None,
            response_text: String::new(),
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn native_value(&self) -> Option<SensorStatus> {
        self.native_value
    }

    pub fn state_attributes(&self) -> StateAttributes {
        StateAttributes {
            response_text: self.response_text.clone(),
            prompt: self.prompt.clone(),
            model: self.model.clone(),
        }
    }

    /// Start a new request: record model and prompt, clear the previous
    /// response, move to `requesting`.
    ///
    /// No guard against overlapping calls — a second request overwrites the
    /// first with no ordering protection.
    pub fn request_running(&mut self, model: String, prompt: Option<String>) {
        self.model = model;
        self.prompt = prompt;
        self.response_text.clear();
        self.native_value = Some(SensorStatus::Requesting);
        self.publish();
    }

    /// Record the response text and move to `response_received`. Model and
    /// prompt are left unchanged.
    pub fn response_received(&mut self, response_text: String) {
        self.response_text = response_text;
        self.native_value = Some(SensorStatus::ResponseReceived);
        self.publish();
    }

    /// Push the current state to the observer channel.
    ///
    /// Non-blocking: drops the event and logs a warning if the consumer is
    /// not keeping up (channel full) or has already exited (closed).
    fn publish(&self) {
        let event = StateEvent {
            entity: self.name.clone(),
            native_value: self.native_value,
            attributes: self.state_attributes(),
        };
        if let Err(e) = self.events.try_send(event) {
            warn!("state event dropped: {e}");
        }
    }
}

// ── Sensor task ───────────────────────────────────────────────────────────────

/// Exchange outcome routed back to the sensor task.
struct ExchangeDone {
    result: Result<String, RemoteError>,
    reply_tx: oneshot::Sender<Result<String, RemoteError>>,
}

/// Run the sensor state machine until `shutdown` is cancelled or the command
/// channel closes.
///
/// The task is the sole owner of the entity. Each [`SensorCommand::RunPrompt`]
/// moves the sensor to `requesting` and hands the HTTP exchange to a spawned
/// task, so this loop is never blocked on I/O. Overlapping exchanges share
/// the entity: whichever completes last wins, and intermediate transitions
/// can be clobbered out of order.
pub async fn run_sensor(
    mut entity: SensorEntity,
    client: PredictClient,
    mut commands: mpsc::Receiver<SensorCommand>,
    shutdown: CancellationToken,
) {
    // Publish once at startup so observers see the initial idle state.
    entity.publish();

    let (done_tx, mut done_rx) = mpsc::channel::<ExchangeDone>(8);

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!(entity = %entity.name(), "sensor task shutting down");
                break;
            }

            cmd = commands.recv() => {
                match cmd {
                    None => {
                        info!(entity = %entity.name(), "command channel closed, sensor task exiting");
                        break;
                    }
                    Some(SensorCommand::RunPrompt { model, prompt, reply_tx }) => {
                        entity.request_running(model.clone(), prompt.clone());

                        let client = client.clone();
                        let done_tx = done_tx.clone();
                        tokio::spawn(async move {
                            let result = client.ask(&model, prompt.as_deref()).await;
                            if done_tx.send(ExchangeDone { result, reply_tx }).await.is_err() {
                                debug!("sensor task gone before exchange completed");
                            }
                        });
                    }
                }
            }

            done = done_rx.recv() => {
                // This loop holds a done_tx clone, so recv() cannot yield None.
                let Some(ExchangeDone { result, reply_tx }) = done else { break };
                match result {
                    Ok(text) => {
                        entity.response_received(text.clone());
                        let _ = reply_tx.send(Ok(text));
                    }
                    Err(e) => {
                        // No failure state: the sensor stays at `requesting`.
                        error!(entity = %entity.name(), error = %e, "predict exchange failed");
                        let _ = reply_tx.send(Err(e));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity_with_events() -> (SensorEntity, mpsc::Receiver<StateEvent>) {
        let (tx, rx) = mpsc::channel(8);
        (SensorEntity::new("hassio_openai_response", "gpt4hassio", tx), rx)
    }

    #[test]
    fn new_entity_is_idle() {
        let (entity, _rx) = entity_with_events();
        assert_eq!(entity.native_value(), None);
        let attrs = entity.state_attributes();
        assert_eq!(attrs.response_text, "");
        assert_eq!(attrs.prompt, None);
        assert_eq!(attrs.model, "gpt4hassio");
    }

    #[test]
    fn request_running_sets_requesting_state() {
        let (mut entity, _rx) = entity_with_events();
        entity.request_running("other-model".into(), Some("hi".into()));
        assert_eq!(entity.native_value(), Some(SensorStatus::Requesting));
        let attrs = entity.state_attributes();
        assert_eq!(attrs.response_text, "");
        assert_eq!(attrs.prompt.as_deref(), Some("hi"));
        assert_eq!(attrs.model, "other-model");
    }

    #[test]
    fn request_running_clears_previous_response() {
        let (mut entity, _rx) = entity_with_events();
        entity.request_running("m1".into(), Some("first".into()));
        entity.response_received("first answer".into());
        entity.request_running("m2".into(), Some("second".into()));
        assert_eq!(entity.native_value(), Some(SensorStatus::Requesting));
        let attrs = entity.state_attributes();
        assert_eq!(attrs.response_text, "");
        assert_eq!(attrs.prompt.as_deref(), Some("second"));
        assert_eq!(attrs.model, "m2");
    }

    #[test]
    fn response_received_keeps_model_and_prompt() {
        let (mut entity, _rx) = entity_with_events();
        entity.request_running("gpt4hassio".into(), Some("hi".into()));
        entity.response_received("hello".into());
        assert_eq!(entity.native_value(), Some(SensorStatus::ResponseReceived));
        let attrs = entity.state_attributes();
        assert_eq!(attrs.response_text, "hello");
        assert_eq!(attrs.prompt.as_deref(), Some("hi"));
        assert_eq!(attrs.model, "gpt4hassio");
    }

    #[test]
    fn mutations_publish_state_events() {
        let (mut entity, mut rx) = entity_with_events();
        entity.request_running("gpt4hassio".into(), Some("hi".into()));
        entity.response_received("hello".into());

        let first = rx.try_recv().unwrap();
        assert_eq!(first.native_value, Some(SensorStatus::Requesting));
        assert_eq!(first.attributes.response_text, "");

        let second = rx.try_recv().unwrap();
        assert_eq!(second.native_value, Some(SensorStatus::ResponseReceived));
        assert_eq!(second.attributes.response_text, "hello");
        assert_eq!(second.entity, "hassio_openai_response");
    }

    #[test]
    fn publish_drops_event_when_channel_full() {
        let (tx, _rx) = mpsc::channel(1);
        let mut entity = SensorEntity::new("s", "m", tx);
        entity.request_running("m".into(), None);
        // Channel is full now; the second publish is dropped, not blocked.
        entity.response_received("hello".into());
        assert_eq!(entity.native_value(), Some(SensorStatus::ResponseReceived));
    }

    #[test]
    fn status_strings_match_display_contract() {
        assert_eq!(SensorStatus::Requesting.as_str(), "requesting");
        assert_eq!(SensorStatus::ResponseReceived.as_str(), "response_received");
        assert_eq!(
            serde_json::to_string(&SensorStatus::ResponseReceived).unwrap(),
            "\"response_received\""
        );
    }
}
