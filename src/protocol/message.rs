//! RPC message envelope.
//!
//! Every message on the wire carries a method name, a message type, a
//! sequence id used for reply correlation, and a payload. Payloads are
//! opaque JSON values; their shape belongs to the service stubs.
//!
//! | Type | Direction | Payload |
//! |------|-----------|---------|
//! | `Call` | Client → Server | Argument list |
//! | `Reply` | Server → Client | Result value |
//! | `Exception` | Server → Client | `{"message": "..."}` |
//! | `Oneway` | Client → Server | Argument list, no reply |

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Value, json};

use crate::error::{Error, Result};

// ============================================================================
// MessageType
// ============================================================================

/// Message type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Request expecting a reply.
    Call = 1,
    /// Successful reply.
    Reply = 2,
    /// Remote service raised an error.
    Exception = 3,
    /// Request without a reply.
    Oneway = 4,
}

impl MessageType {
    /// Parses the wire representation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for an unknown discriminator.
    pub fn from_wire(value: i64) -> Result<Self> {
        match value {
            1 => Ok(Self::Call),
            2 => Ok(Self::Reply),
            3 => Ok(Self::Exception),
            4 => Ok(Self::Oneway),
            other => Err(Error::protocol(format!("unknown message type {other}"))),
        }
    }

    /// Returns the wire representation.
    #[inline]
    #[must_use]
    pub const fn as_wire(self) -> u8 {
        self as u8
    }
}

// ============================================================================
// Message
// ============================================================================

/// One RPC message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Method name.
    pub name: String,
    /// Message type.
    pub message_type: MessageType,
    /// Sequence id, echoed by the server in its reply.
    pub seqid: i32,
    /// Opaque payload.
    pub payload: Value,
}

impl Message {
    /// Creates a call message.
    #[inline]
    #[must_use]
    pub fn call(name: impl Into<String>, seqid: i32, args: Value) -> Self {
        Self {
            name: name.into(),
            message_type: MessageType::Call,
            seqid,
            payload: args,
        }
    }

    /// Creates a reply message.
    #[inline]
    #[must_use]
    pub fn reply(name: impl Into<String>, seqid: i32, result: Value) -> Self {
        Self {
            name: name.into(),
            message_type: MessageType::Reply,
            seqid,
            payload: result,
        }
    }

    /// Creates an exception message.
    #[inline]
    #[must_use]
    pub fn exception(name: impl Into<String>, seqid: i32, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message_type: MessageType::Exception,
            seqid,
            payload: json!({ "message": message.into() }),
        }
    }

    /// Returns `true` if the sender expects a reply.
    #[inline]
    #[must_use]
    pub fn expects_reply(&self) -> bool {
        self.message_type == MessageType::Call
    }

    /// Converts a reply to the call result.
    ///
    /// # Errors
    ///
    /// - [`Error::Application`] if the server answered with an exception
    /// - [`Error::Protocol`] if the message is not a reply to `method`
    pub fn into_result(self, method: &str) -> Result<Value> {
        if self.name != method {
            return Err(Error::protocol(format!(
                "reply for '{}' received while calling '{method}'",
                self.name
            )));
        }

        match self.message_type {
            MessageType::Reply => Ok(self.payload),
            MessageType::Exception => {
                let message = self
                    .payload
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown remote error")
                    .to_string();
                Err(Error::application(self.name, message))
            }
            other => Err(Error::protocol(format!(
                "expected a reply, got {other:?}"
            ))),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_wire() {
        assert_eq!(MessageType::from_wire(2).expect("reply"), MessageType::Reply);
        assert_eq!(MessageType::Exception.as_wire(), 3);
        assert!(MessageType::from_wire(9).is_err());
    }

    #[test]
    fn test_reply_into_result() {
        let reply = Message::reply("add", 7, json!(3));
        assert_eq!(reply.into_result("add").expect("reply"), json!(3));
    }

    #[test]
    fn test_exception_into_result() {
        let reply = Message::exception("divide", 1, "division by zero");
        let err = reply.into_result("divide").unwrap_err();
        assert!(err.is_application_error());
        assert!(err.to_string().contains("division by zero"));
    }

    #[test]
    fn test_mismatched_name_is_protocol_error() {
        let reply = Message::reply("subtract", 1, json!(0));
        let err = reply.into_result("add").unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_call_is_not_a_result() {
        let call = Message::call("add", 1, json!([1, 2]));
        assert!(call.expects_reply());
        assert!(call.into_result("add").is_err());
    }
}
