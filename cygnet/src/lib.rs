//! Scenario construction, standard applications, and prebuilt simulations
//! on top of the `cygnet-core` engine.

pub mod applications;
pub mod logging;
pub mod scenario;
pub mod simulations;
