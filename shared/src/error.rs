use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

/// Failure taxonomy shared by every engine and handler.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("internal: {0}")]
    Internal(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not enough stock for order {order_id}")]
    InsufficientStock { order_id: i64 },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl ServiceError {
    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }

    pub fn invalid(err: impl std::fmt::Display) -> Self {
        Self::InvalidMessage(err.to_string())
    }

    /// Short label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Internal(_) => "internal",
            Self::NotFound(_) => "not_found",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::Conflict(_) => "conflict",
            Self::FailedPrecondition(_) => "failed_precondition",
            Self::InvalidMessage(_) => "invalid_message",
        }
    }

    /// Prefixes the message with the operation that failed, keeping the kind.
    pub fn context(self, op: &str) -> Self {
        match self {
            Self::Internal(m) => Self::Internal(format!("{op}: {m}")),
            Self::NotFound(m) => Self::NotFound(format!("{op}: {m}")),
            Self::Conflict(m) => Self::Conflict(format!("{op}: {m}")),
            Self::FailedPrecondition(m) => Self::FailedPrecondition(format!("{op}: {m}")),
            Self::InvalidMessage(m) => Self::InvalidMessage(format!("{op}: {m}")),
            other @ Self::InsufficientStock { .. } => other,
        }
    }
}

/// Constraint violations surface as `FailedPrecondition`, a missing row as
/// `NotFound`, everything else as `Internal`.
impl From<DieselError> for ServiceError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Self::NotFound(err.to_string()),
            DieselError::DatabaseError(ref kind, ref info) => match kind {
                DatabaseErrorKind::UniqueViolation
                | DatabaseErrorKind::ForeignKeyViolation
                | DatabaseErrorKind::CheckViolation
                | DatabaseErrorKind::NotNullViolation => Self::FailedPrecondition(format!(
                    "{} ({})",
                    info.message(),
                    info.constraint_name().unwrap_or("unnamed constraint")
                )),
                _ => Self::Internal(err.to_string()),
            },
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Returns the violated constraint name when `err` is a unique violation.
pub fn unique_violation(err: &DieselError) -> Option<&str> {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            info.constraint_name()
        }
        _ => None,
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidMessage(err.to_string())
    }
}
