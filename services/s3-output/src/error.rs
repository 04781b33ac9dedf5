use thiserror::Error;

/// Status codes handed back to the host pipeline from the init and flush
/// entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum FlbStatus {
    Error = 0,
    Ok = 1,
    Retry = 2,
}

impl FlbStatus {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an entry point outcome to the status the host expects
    pub fn from_result<T>(result: &Result<T, OutputError>) -> Self {
        match result {
            Ok(_) => FlbStatus::Ok,
            Err(e) => e.status(),
        }
    }
}

/// Errors that can occur in the output stage
#[derive(Error, Debug)]
pub enum OutputError {
    /// A record could not be serialized; aborts the current flush only.
    #[error("Failed to encode record: {0}")]
    Encoding(String),

    /// Credential, bucket or region configuration is unusable. Only raised
    /// during initialization.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The upload client reported a failure.
    #[error("Failed to upload object: {0}")]
    Upload(String),

    #[error("Plugin is shutting down")]
    ShuttingDown,
}

impl OutputError {
    /// Host status for this error. Upload failures are left to the host's
    /// retry policy; everything else is a hard error.
    pub fn status(&self) -> FlbStatus {
        match self {
            OutputError::Upload(_) => FlbStatus::Retry,
            OutputError::Encoding(_)
            | OutputError::Configuration(_)
            | OutputError::ShuttingDown => FlbStatus::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(FlbStatus::Error.code(), 0);
        assert_eq!(FlbStatus::Ok.code(), 1);
        assert_eq!(FlbStatus::Retry.code(), 2);
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            OutputError::Encoding("bad".to_string()).status(),
            FlbStatus::Error
        );
        assert_eq!(
            OutputError::Configuration("bad".to_string()).status(),
            FlbStatus::Error
        );
        assert_eq!(
            OutputError::Upload("timeout".to_string()).status(),
            FlbStatus::Retry
        );
        assert_eq!(OutputError::ShuttingDown.status(), FlbStatus::Error);
    }
}
