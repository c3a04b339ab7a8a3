//! Ready-made scenarios for demos and tests.
//!
//! [`fax`] simulates a fax gateway driven by inbound JSON requests and
//! [`hello`] is an operator-launched starter showing every parameter kind.

pub mod fax;
pub mod hello;

use crate::{Result, simulator::SimulatorBuilder};

/// Register the fax gateway scenarios with their default timing.
///
/// # Errors
///
/// Returns [`crate::SimulatorError::ScenarioContract`] if a fax scenario
/// name is already taken.
pub fn register_fax_scenarios(builder: SimulatorBuilder) -> Result<SimulatorBuilder> {
    fax::register_with_delay(builder, fax::DEFAULT_TRANSMIT_DELAY)
}

/// Register every sample scenario.
///
/// # Errors
///
/// See [`register_fax_scenarios`].
pub fn register_all(builder: SimulatorBuilder) -> Result<SimulatorBuilder> {
    register_fax_scenarios(builder)?.scenario("HelloStarter", hello::HelloStarter)
}
