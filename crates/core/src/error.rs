use thiserror::Error;

/// Startup-fatal errors: unknown enumerated values and invalid configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("unsupported stream kind: {0}")]
    UnsupportedStreamKind(String),

    #[error("unsupported alert channel: {0}")]
    UnsupportedAlertChannel(String),

    #[error("invalid configuration:\n{}", .0.join("\n"))]
    InvalidConfig(Vec<String>),
}

/// How loudly a validation problem should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A non-fatal problem found while normalizing a raw record.
///
/// Validation errors never reject a record; they travel alongside the
/// normalized output so callers can inspect them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{field} out of range: {value} (expected {min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
        severity: Severity,
    },

    #[error("{field} is malformed: {reason}")]
    Malformed { field: &'static str, reason: String },
}

impl ValidationError {
    pub fn severity(&self) -> Severity {
        match self {
            ValidationError::OutOfRange { severity, .. } => *severity,
            ValidationError::Malformed { .. } => Severity::Error,
        }
    }

    /// Name of the offending field.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::OutOfRange { field, .. } | ValidationError::Malformed { field, .. } => {
                field
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_lists_every_problem() {
        let err = CoreError::InvalidConfig(vec![
            "PROCESS_POOL_SIZE must be greater than 0".to_string(),
            "unsupported alert channel: sms".to_string(),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("PROCESS_POOL_SIZE"));
        assert!(msg.contains("sms"));
    }

    #[test]
    fn out_of_range_display() {
        let err = ValidationError::OutOfRange {
            field: "ph",
            value: 9.1,
            min: 6.5,
            max: 8.0,
            severity: Severity::Warning,
        };
        assert_eq!(err.to_string(), "ph out of range: 9.1 (expected 6.5..=8)");
        assert_eq!(err.severity(), Severity::Warning);
        assert_eq!(err.field(), "ph");
    }

    #[test]
    fn malformed_is_error_severity() {
        let err = ValidationError::Malformed {
            field: "quality",
            reason: "expected a number".to_string(),
        };
        assert_eq!(err.severity(), Severity::Error);
    }
}
