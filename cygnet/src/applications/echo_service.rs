use cygnet_core::software::{Software, SoftwareCtx};
use cygnet_core::{Message, SessionId};
use std::any::Any;

/// A service that sends every payload straight back on the same session.
#[derive(Debug, Default)]
pub struct EchoService {
    echoed: u64,
}

impl EchoService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn echoed(&self) -> u64 {
        self.echoed
    }
}

impl Software for EchoService {
    fn kind(&self) -> &'static str {
        "echo_service"
    }

    fn receive(&mut self, ctx: &mut SoftwareCtx, session: SessionId, message: Message) {
        self.echoed += 1;
        ctx.reply(session, message);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
