use std::fmt;

/// Action carried in the `action` field of a control payload.
///
/// Workers send `service.register`, `service.shutdown`, `pong` and `quit`;
/// the broker sends `ping` and `shutdown`. Anything else, including an empty
/// or missing action, decodes to [`Action::Unknown`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    ServiceRegister,
    ServiceShutdown,
    Ping,
    Pong,
    Shutdown,
    Quit,
    Unknown(String),
}

impl Action {
    pub fn parse(action: &str) -> Self {
        match action {
            "service.register" => Action::ServiceRegister,
            "service.shutdown" => Action::ServiceShutdown,
            "ping" => Action::Ping,
            "pong" => Action::Pong,
            "shutdown" => Action::Shutdown,
            "quit" => Action::Quit,
            other => Action::Unknown(other.to_string()),
        }
    }

    /// Wire name of the action.
    pub fn as_str(&self) -> &str {
        match self {
            Action::ServiceRegister => "service.register",
            Action::ServiceShutdown => "service.shutdown",
            Action::Ping => "ping",
            Action::Pong => "pong",
            Action::Shutdown => "shutdown",
            Action::Quit => "quit",
            Action::Unknown(other) => other,
        }
    }
}

impl From<&str> for Action {
    fn from(action: &str) -> Self {
        Action::parse(action)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
