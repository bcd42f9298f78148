//! Operator commands: plain text sent to one agent

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    /// Run a consolidation pass now
    Craft,
    /// Halt the agent
    Stop,
    /// Resume a halted agent and replay its login
    Start,
    /// Log the agent's session phase and registry view
    Status,
    Unknown(String),
}

impl OperatorCommand {
    /// Looks at the first word only, case-insensitively
    pub fn parse(text: &str) -> Self {
        let word = text.split_whitespace().next().unwrap_or_default();
        match word.to_ascii_lowercase().as_str() {
            "craft" => OperatorCommand::Craft,
            "stop" => OperatorCommand::Stop,
            "start" => OperatorCommand::Start,
            "status" => OperatorCommand::Status,
            _ => OperatorCommand::Unknown(text.trim().to_string()),
        }
    }
}

impl fmt::Display for OperatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatorCommand::Craft => write!(f, "craft"),
            OperatorCommand::Stop => write!(f, "stop"),
            OperatorCommand::Start => write!(f, "start"),
            OperatorCommand::Status => write!(f, "status"),
            OperatorCommand::Unknown(text) => write!(f, "unknown({})", text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_word_case_insensitively() {
        assert_eq!(OperatorCommand::parse("CRAFT"), OperatorCommand::Craft);
        assert_eq!(OperatorCommand::parse("  stop now please"), OperatorCommand::Stop);
        assert_eq!(OperatorCommand::parse("Start"), OperatorCommand::Start);
        assert_eq!(OperatorCommand::parse("status"), OperatorCommand::Status);
    }

    #[test]
    fn anything_else_is_unknown() {
        assert_eq!(
            OperatorCommand::parse("dance "),
            OperatorCommand::Unknown("dance".to_string())
        );
        assert_eq!(OperatorCommand::parse(""), OperatorCommand::Unknown(String::new()));
    }
}
