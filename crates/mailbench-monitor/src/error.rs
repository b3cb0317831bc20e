use thiserror::Error;

/// Errors raised while sampling the system under test.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Request to the metrics endpoint failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Metrics endpoint answered with a non-success status.
    #[error("metrics endpoint returned status {0}")]
    Status(u16),

    /// A sampling command could not be run or exited unsuccessfully.
    #[error("command `{command}` failed: {message}")]
    Command {
        /// Program and arguments as they were invoked.
        command: String,
        /// Exit status or stderr output.
        message: String,
    },

    /// Command or endpoint output did not have the expected shape.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MonitorError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    pub fn command(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            message: message.into(),
        }
    }
}

pub type MonitorResult<T> = std::result::Result<T, MonitorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_names_the_command() {
        let err = MonitorError::command("free -m", "exit status: 127");
        assert_eq!(err.to_string(), "command `free -m` failed: exit status: 127");
    }

    #[test]
    fn test_status_error_display() {
        assert_eq!(
            MonitorError::Status(503).to_string(),
            "metrics endpoint returned status 503"
        );
    }
}
