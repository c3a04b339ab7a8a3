//! Operator-launched greeting with one parameter of each input kind.

use async_trait::async_trait;
use tracing::info;

use crate::{
    message::Message,
    scenario::{Scenario, ScenarioContext, ScenarioError, ScenarioParameter},
};

/// Header carrying the greeting line on the outbound message.
pub const SALUTATION_HEADER: &str = "salutation";

#[derive(Clone, Copy, Debug, Default)]
pub struct HelloStarter;

#[async_trait]
impl Scenario for HelloStarter {
    async fn run(&self, ctx: &mut ScenarioContext) -> Result<(), ScenarioError> {
        let salutation = ctx.resolve("${title} ${firstname} ${lastname}")?;
        let greeting = ctx.resolve("${greeting}")?;
        info!(execution_id = %ctx.execution_id(), %salutation, %greeting, "hello");
        ctx.send(Message::new(greeting).with_header(SALUTATION_HEADER, salutation))
            .await
    }

    fn parameters(&self) -> Vec<ScenarioParameter> {
        vec![
            ScenarioParameter::builder()
                .name("title")
                .label("Title")
                .required()
                .dropdown()
                .add_option("Mr", "Mr.")
                .add_option("Mrs", "Mrs.")
                .add_option("Miss", "Miss")
                .value("Miss")
                .build(),
            ScenarioParameter::builder()
                .name("firstname")
                .label("First Name")
                .required()
                .textbox()
                .value("Mickey")
                .build(),
            ScenarioParameter::builder()
                .name("lastname")
                .label("Last Name")
                .required()
                .textbox()
                .value("Mouse")
                .build(),
            ScenarioParameter::builder()
                .name("greeting")
                .label("Greeting")
                .required()
                .textarea()
                .value("Hey there Mini")
                .build(),
        ]
    }
}
