use std::fmt;

/// Text signals two agents exchange to synchronise a session.
///
/// They travel over the same text channels a human would use, so parsing is
/// exact: a message is a signal only if its trimmed text is one of the three
/// words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeSignal {
    /// Sender has opened its side of the session
    Initialized,
    /// Sender finished adding items (or echoes the adder's ready)
    Ready,
    /// Sender gives up on the session
    Failed,
}

impl HandshakeSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandshakeSignal::Initialized => "initialized",
            HandshakeSignal::Ready => "ready",
            HandshakeSignal::Failed => "failed",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "initialized" => Some(HandshakeSignal::Initialized),
            "ready" => Some(HandshakeSignal::Ready),
            "failed" => Some(HandshakeSignal::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for HandshakeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_exact() {
        assert_eq!(HandshakeSignal::parse("ready"), Some(HandshakeSignal::Ready));
        assert_eq!(HandshakeSignal::parse(" initialized\n"), Some(HandshakeSignal::Initialized));
        assert_eq!(HandshakeSignal::parse("Ready"), None);
        assert_eq!(HandshakeSignal::parse("are you ready?"), None);
        assert_eq!(HandshakeSignal::parse("failed"), Some(HandshakeSignal::Failed));
    }
}
