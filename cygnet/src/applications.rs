//! Concrete software used to populate scenarios and exercise the network.

mod message_sink;
pub use message_sink::MessageSink;

mod message_source;
pub use message_source::MessageSource;

mod echo_service;
pub use echo_service::EchoService;

use cygnet_core::software::SoftwareError;
use cygnet_core::SoftwareRegistry;

/// A registry holding every application in this module, keyed by the names
/// scenario records use.
pub fn standard_registry() -> Result<SoftwareRegistry, SoftwareError> {
    let mut registry = SoftwareRegistry::new();
    registry.register("message_sink", |_| Box::new(MessageSink::new()))?;
    registry.register("message_source", |config| {
        Box::new(MessageSource::from_config(config))
    })?;
    registry.register("echo_service", |_| Box::new(EchoService::new()))?;
    Ok(registry)
}
