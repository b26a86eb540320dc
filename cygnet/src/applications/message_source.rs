use cygnet_core::software::{Software, SoftwareConfig, SoftwareCtx};
use cygnet_core::{IpProtocol, Ipv4Address, Message, SessionId, Tick};
use std::any::Any;

/// An application that sends a configured payload to an endpoint on a fixed
/// schedule.
///
/// Options read from the install config: `dst`, `dst_port`, `payload`,
/// `start` (first sending tick), `period` (ticks between sends, 0 for a
/// single send), and `count` (total sends, 0 for unlimited).
#[derive(Debug)]
pub struct MessageSource {
    protocol: IpProtocol,
    dst: Ipv4Address,
    dst_port: u16,
    payload: Message,
    start: Tick,
    period: u64,
    limit: u64,
    sent: u64,
}

impl MessageSource {
    pub fn from_config(config: &SoftwareConfig) -> Self {
        fn option_or<T: std::str::FromStr>(config: &SoftwareConfig, key: &str, default: T) -> T {
            config
                .option(key)
                .and_then(|value| value.parse().ok())
                .unwrap_or(default)
        }
        Self {
            protocol: config.protocol,
            dst: option_or(config, "dst", Ipv4Address::UNSPECIFIED),
            dst_port: option_or(config, "dst_port", config.port),
            payload: Message::new(config.option("payload").unwrap_or("ping")),
            start: option_or(config, "start", 1),
            period: option_or(config, "period", 0),
            limit: option_or(config, "count", 1),
            sent: 0,
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    fn due(&self, tick: Tick) -> bool {
        if tick < self.start || (self.limit != 0 && self.sent >= self.limit) {
            return false;
        }
        if self.period == 0 {
            self.sent == 0
        } else {
            (tick - self.start) % self.period == 0
        }
    }
}

impl Software for MessageSource {
    fn kind(&self) -> &'static str {
        "message_source"
    }

    fn receive(&mut self, _ctx: &mut SoftwareCtx, _session: SessionId, _message: Message) {}

    fn tick(&mut self, ctx: &mut SoftwareCtx) {
        if self.due(ctx.tick) {
            ctx.send(self.protocol, self.dst, self.dst_port, self.payload.clone());
            self.sent += 1;
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(options: &[(&str, &str)]) -> MessageSource {
        let mut config = SoftwareConfig::application("source", "message_source");
        for (key, value) in options {
            config = config.with_option(*key, *value);
        }
        MessageSource::from_config(&config)
    }

    #[test]
    fn one_shot_sends_once() {
        let mut source = source(&[("start", "3")]);
        assert!(!source.due(2));
        assert!(source.due(3));
        source.sent = 1;
        assert!(!source.due(4));
    }

    #[test]
    fn periodic_sends_respect_period_and_count() {
        let source = source(&[("start", "2"), ("period", "5"), ("count", "0")]);
        assert!(source.due(2));
        assert!(!source.due(4));
        assert!(source.due(7));
        assert!(source.due(12));
    }
}
