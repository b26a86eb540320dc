use cygnet_core::software::{Software, SoftwareCtx};
use cygnet_core::{Message, SessionId};
use std::any::Any;

/// A service that stores every message it receives.
///
/// Simulations install a sink at the far end of a traffic flow and downcast
/// to it afterwards to assert on what arrived.
#[derive(Debug, Default)]
pub struct MessageSink {
    received: Vec<(SessionId, Message)>,
}

impl MessageSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything received so far, in arrival order.
    pub fn received(&self) -> &[(SessionId, Message)] {
        &self.received
    }

    /// The most recent message, if any arrived.
    pub fn last(&self) -> Option<&Message> {
        self.received.last().map(|(_, message)| message)
    }
}

impl Software for MessageSink {
    fn kind(&self) -> &'static str {
        "message_sink"
    }

    fn receive(&mut self, _ctx: &mut SoftwareCtx, session: SessionId, message: Message) {
        self.received.push((session, message));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
