//! Fax gateway simulation.
//!
//! Clients submit `sendFax` requests naming the scenario they want to
//! exercise and receive `faxStatus` updates keyed by the request's
//! `referenceId`. A `cancelFax` message with the same reference cancels a
//! fax queued by [`FaxCancelled`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    correlation::{CorrelationKeySet, JsonFieldExtractor},
    execution::EXECUTION_ID_VARIABLE,
    message::Message,
    scenario::{Scenario, ScenarioContext, ScenarioError, ScenarioParameter},
    simulator::SimulatorBuilder,
};

/// `type` field of a send request.
pub const SEND_FAX: &str = "sendFax";
/// `type` field of a cancel request.
pub const CANCEL_FAX: &str = "cancelFax";
/// `type` field of a status update.
pub const FAX_STATUS: &str = "faxStatus";

pub const QUEUED_MESSAGE: &str = "The fax message has been queued and will be send shortly";
pub const SENT_MESSAGE: &str = "The fax message has been successfully sent";
pub const CANCELLED_MESSAGE: &str = "The fax message has been cancelled";
pub const BUSY_MESSAGE: &str = "Error transmitting fax: The receiving fax was busy";
pub const NO_ANSWER_MESSAGE: &str = "Error transmitting fax: No answer from the receiving fax";

/// Delay between the QUEUED update and the final status.
pub const DEFAULT_TRANSMIT_DELAY: Duration = Duration::from_secs(2);

/// Status reported for a fax.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaxStatus {
    Queued,
    Success,
    Error,
    Cancelled,
}

impl FaxStatus {
    fn parse(text: &str) -> Option<Self> {
        match text {
            "QUEUED" => Some(Self::Queued),
            "SUCCESS" => Some(Self::Success),
            "ERROR" => Some(Self::Error),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Details of the fax being sent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fax {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub recipient: String,
}

/// Inbound request to send a fax.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendFax {
    #[serde(rename = "type")]
    pub kind: String,
    /// Scenario the client asks the simulator to play.
    pub scenario: String,
    pub reference_id: String,
    #[serde(default)]
    pub fax: Fax,
    #[serde(default)]
    pub status_updates: bool,
}

impl SendFax {
    #[must_use]
    pub fn new(scenario: impl Into<String>, reference_id: impl Into<String>, fax: Fax) -> Self {
        Self {
            kind: SEND_FAX.to_owned(),
            scenario: scenario.into(),
            reference_id: reference_id.into(),
            fax,
            status_updates: true,
        }
    }

    /// Encode as an inbound message.
    #[must_use]
    pub fn to_message(&self) -> Message { Message::new(json(self)) }

    /// Decode from a message payload.
    #[must_use]
    pub fn from_message(message: &Message) -> Option<Self> {
        serde_json::from_str::<Self>(&message.payload)
            .ok()
            .filter(|request| request.kind == SEND_FAX)
    }
}

/// Inbound request to cancel a queued fax.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelFax {
    #[serde(rename = "type")]
    pub kind: String,
    pub reference_id: String,
}

impl CancelFax {
    #[must_use]
    pub fn new(reference_id: impl Into<String>) -> Self {
        Self {
            kind: CANCEL_FAX.to_owned(),
            reference_id: reference_id.into(),
        }
    }

    #[must_use]
    pub fn to_message(&self) -> Message { Message::new(json(self)) }
}

/// Outbound status update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaxStatusUpdate {
    #[serde(rename = "type")]
    pub kind: String,
    pub reference_id: String,
    pub status: FaxStatus,
    pub status_message: String,
}

impl FaxStatusUpdate {
    #[must_use]
    pub fn new(reference_id: impl Into<String>, status: FaxStatus, status_message: impl Into<String>) -> Self {
        Self {
            kind: FAX_STATUS.to_owned(),
            reference_id: reference_id.into(),
            status,
            status_message: status_message.into(),
        }
    }

    #[must_use]
    pub fn to_message(&self) -> Message { Message::new(json(self)) }

    /// Decode from a message payload.
    #[must_use]
    pub fn from_message(message: &Message) -> Option<Self> {
        serde_json::from_str::<Self>(&message.payload)
            .ok()
            .filter(|update| update.kind == FAX_STATUS)
    }
}

fn json(value: &impl Serialize) -> String {
    // Plain structs of strings and enums always serialize.
    serde_json::to_string(value).unwrap_or_default()
}

/// Scenario name requested by a `sendFax` message.
#[must_use]
pub fn requested_scenario(message: &Message) -> Option<String> {
    SendFax::from_message(message).map(|request| request.scenario)
}

/// The `sendFax` request being played.
///
/// Router launches carry it as the trigger message. Launches by name build
/// it from the `referenceId` and `name` parameters instead, with the
/// reference defaulting to the execution id.
fn request(ctx: &ScenarioContext) -> Result<SendFax, ScenarioError> {
    if let Some(request) = ctx.trigger().and_then(SendFax::from_message) {
        return Ok(request);
    }
    let reference_id = match ctx.variable("referenceId").filter(|v| !v.is_empty()) {
        Some(template) => ctx.resolve(template)?,
        None => ctx.require(EXECUTION_ID_VARIABLE)?.to_owned(),
    };
    let fax = Fax {
        sender: ctx.variable("name").unwrap_or_default().to_owned(),
        ..Fax::default()
    };
    Ok(SendFax::new(ctx.scenario_name(), reference_id, fax))
}

fn launch_parameters() -> Vec<ScenarioParameter> {
    vec![
        ScenarioParameter::builder()
            .name("referenceId")
            .label("Reference Id")
            .textbox()
            .value(format!("${{{EXECUTION_ID_VARIABLE}}}"))
            .build(),
        ScenarioParameter::builder()
            .name("name")
            .label("Sender Name")
            .textbox()
            .build(),
    ]
}

async fn report(
    ctx: &ScenarioContext,
    reference_id: &str,
    status: FaxStatus,
    status_message: &str,
) -> Result<(), ScenarioError> {
    ctx.send(FaxStatusUpdate::new(reference_id, status, status_message).to_message())
        .await
}

/// Default scenario: acknowledges the fax as queued and nothing else.
#[derive(Clone, Copy, Debug, Default)]
pub struct FaxQueued;

#[async_trait]
impl Scenario for FaxQueued {
    async fn run(&self, ctx: &mut ScenarioContext) -> Result<(), ScenarioError> {
        let request = request(ctx)?;
        report(ctx, &request.reference_id, FaxStatus::Queued, QUEUED_MESSAGE).await
    }

    fn parameters(&self) -> Vec<ScenarioParameter> { launch_parameters() }
}

/// Queues the fax, then reports a final status after a delay.
#[derive(Clone, Debug)]
pub struct FaxOutcome {
    status: FaxStatus,
    status_message: &'static str,
    delay: Duration,
}

impl FaxOutcome {
    #[must_use]
    pub fn sent(delay: Duration) -> Self { Self::new(FaxStatus::Success, SENT_MESSAGE, delay) }

    #[must_use]
    pub fn busy(delay: Duration) -> Self { Self::new(FaxStatus::Error, BUSY_MESSAGE, delay) }

    #[must_use]
    pub fn no_answer(delay: Duration) -> Self { Self::new(FaxStatus::Error, NO_ANSWER_MESSAGE, delay) }

    fn new(status: FaxStatus, status_message: &'static str, delay: Duration) -> Self {
        Self {
            status,
            status_message,
            delay,
        }
    }
}

#[async_trait]
impl Scenario for FaxOutcome {
    async fn run(&self, ctx: &mut ScenarioContext) -> Result<(), ScenarioError> {
        let request = request(ctx)?;
        report(ctx, &request.reference_id, FaxStatus::Queued, QUEUED_MESSAGE).await?;
        ctx.sleep(self.delay).await?;
        report(ctx, &request.reference_id, self.status, self.status_message).await
    }

    fn parameters(&self) -> Vec<ScenarioParameter> { launch_parameters() }
}

/// Queues the fax and waits for the client to cancel it.
#[derive(Clone, Copy, Debug, Default)]
pub struct FaxCancelled;

#[async_trait]
impl Scenario for FaxCancelled {
    async fn run(&self, ctx: &mut ScenarioContext) -> Result<(), ScenarioError> {
        let request = request(ctx)?;
        let keys = CorrelationKeySet::new()
            .with("type", CANCEL_FAX)
            .with("referenceId", request.reference_id.clone());
        // Register before queueing so an immediate cancel is not missed.
        let handle = ctx.expect(ctx.correlation(keys).with_extractor(JsonFieldExtractor))?;
        report(ctx, &request.reference_id, FaxStatus::Queued, QUEUED_MESSAGE).await?;
        ctx.wait(handle).await?;
        report(ctx, &request.reference_id, FaxStatus::Cancelled, CANCELLED_MESSAGE).await
    }

    fn parameters(&self) -> Vec<ScenarioParameter> { launch_parameters() }
}

/// Starter sending an arbitrary status update for a reference.
#[derive(Clone, Copy, Debug, Default)]
pub struct UpdateFaxStatus;

#[async_trait]
impl Scenario for UpdateFaxStatus {
    async fn run(&self, ctx: &mut ScenarioContext) -> Result<(), ScenarioError> {
        let reference_id = ctx.require("referenceId")?.to_owned();
        let status = FaxStatus::parse(ctx.require("status")?)
            .ok_or_else(|| ScenarioError::failed("unsupported fax status"))?;
        let status_message = ctx.require("statusMessage")?.to_owned();
        report(ctx, &reference_id, status, &status_message).await
    }

    fn parameters(&self) -> Vec<ScenarioParameter> {
        vec![
            ScenarioParameter::builder()
                .name("referenceId")
                .label("Reference Id")
                .required()
                .textbox()
                .build(),
            ScenarioParameter::builder()
                .name("status")
                .label("Status")
                .required()
                .dropdown()
                .add_option("QUEUED", "Queued")
                .add_option("SUCCESS", "Success")
                .add_option("ERROR", "Error")
                .add_option("CANCELLED", "Cancelled")
                .value("QUEUED")
                .build(),
            ScenarioParameter::builder()
                .name("statusMessage")
                .label("Status Message")
                .textarea()
                .value(QUEUED_MESSAGE)
                .build(),
        ]
    }
}

/// Register the fax scenarios with `delay` between status updates.
///
/// `FaxQueued` handles any `sendFax` whose scenario name is unknown.
///
/// # Errors
///
/// Returns [`crate::SimulatorError::ScenarioContract`] if any of the names is
/// already registered on `builder`.
pub fn register_with_delay(builder: SimulatorBuilder, delay: Duration) -> crate::Result<SimulatorBuilder> {
    Ok(builder
        .mapper(|message: &Message| {
            let requested = requested_scenario(message)?;
            Some(match requested.as_str() {
                "FaxSent" | "FaxBusy" | "FaxNoAnswer" | "FaxCancelled" => requested,
                _ => "FaxQueued".to_owned(),
            })
        })
        .scenario("FaxQueued", FaxQueued)?
        .scenario("FaxSent", FaxOutcome::sent(delay))?
        .scenario("FaxBusy", FaxOutcome::busy(delay))?
        .scenario("FaxNoAnswer", FaxOutcome::no_answer(delay))?
        .scenario("FaxCancelled", FaxCancelled)?
        .scenario("UpdateFaxStatus", UpdateFaxStatus)?)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn status_updates_use_camel_case_json() {
        let message = FaxStatusUpdate::new("7", FaxStatus::Queued, QUEUED_MESSAGE).to_message();
        let value: serde_json::Value = serde_json::from_str(&message.payload).expect("json payload");
        assert_eq!(value["type"], FAX_STATUS);
        assert_eq!(value["referenceId"], "7");
        assert_eq!(value["status"], "QUEUED");
    }

    #[rstest]
    #[case("FaxSent", Some("FaxSent"))]
    #[case("Non-Matchable Scenario", Some("Non-Matchable Scenario"))]
    fn send_fax_requests_name_their_scenario(#[case] scenario: &str, #[case] expected: Option<&str>) {
        let message = SendFax::new(scenario, "1", Fax::default()).to_message();
        assert_eq!(requested_scenario(&message).as_deref(), expected);
    }

    #[test]
    fn cancel_requests_are_not_send_requests() {
        assert!(requested_scenario(&CancelFax::new("1").to_message()).is_none());
    }
}
