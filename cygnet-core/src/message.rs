//! Opaque application payloads carried by [`Frame`](crate::frame::Frame)s.

use std::{
    fmt::{self, Display},
    sync::Arc,
};

/// An opaque byte payload.
///
/// Frames carry their application data as a `Message`. The simulation never
/// inspects payload bytes; they exist so that installed software can exchange
/// recognizable content and so that frame sizes count against link bandwidth.
/// Cloning is cheap because the bytes are shared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Message {
    bytes: Arc<[u8]>,
}

impl Message {
    /// Creates a new message with the given body content.
    ///
    /// # Examples
    ///
    /// ```
    /// # use cygnet_core::message::Message;
    /// let message = Message::new("Hello!");
    /// assert_eq!(message.len(), 6);
    /// ```
    pub fn new(body: impl Into<Message>) -> Self {
        body.into()
    }

    /// The number of bytes in the message.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the message contains no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The message body.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Copies the message body into an owned buffer.
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.bytes) {
            Ok(text) => write!(f, "{}", text),
            Err(_) => {
                for byte in self.bytes.iter() {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for Message {
    fn from(body: &str) -> Self {
        Self {
            bytes: body.as_bytes().into(),
        }
    }
}

impl From<String> for Message {
    fn from(body: String) -> Self {
        Self {
            bytes: body.into_bytes().into(),
        }
    }
}

impl From<Vec<u8>> for Message {
    fn from(body: Vec<u8>) -> Self {
        Self { bytes: body.into() }
    }
}

impl From<&[u8]> for Message {
    fn from(body: &[u8]) -> Self {
        Self { bytes: body.into() }
    }
}

impl<const N: usize> From<&[u8; N]> for Message {
    fn from(body: &[u8; N]) -> Self {
        Self {
            bytes: body.as_slice().into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prints_utf8_text() {
        let message = Message::new("ping");
        assert_eq!(message.to_string(), "ping");
    }

    #[test]
    fn display_prints_hex_for_binary() {
        let message = Message::new(&[0xffu8, 0x00]);
        assert_eq!(message.to_string(), "ff00");
    }

    #[test]
    fn clones_share_bytes() {
        let message = Message::new("payload");
        let clone = message.clone();
        assert_eq!(message, clone);
        assert_eq!(clone.len(), 7);
    }
}
