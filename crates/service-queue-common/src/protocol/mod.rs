//! Control protocol spoken on the control endpoint.
//!
//! A control message is three frames: the issuer identity, an empty delimiter
//! and a JSON object carrying at least an `action` field.

pub mod action;
pub mod error;
pub mod message;


pub use action::Action;
pub use error::{BrokerError, Result};
pub use message::{
    control_envelope, parse_action, task_envelope, ControlMessage, ControlPayload, BROKER_ISSUER,
};
