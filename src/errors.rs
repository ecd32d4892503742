use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(Uuid),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::InsufficientStock(_) => "insufficient_stock",
            Self::ConcurrentModification(_) => "concurrent_modification",
            Self::Conflict(_) => "conflict",
            Self::InternalError(_) | Self::Other(_) => "internal_error",
        }
    }

    /// Whether the caller may retry the same operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification(_))
    }

    /// Message suitable for showing to kitchen staff.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn user_message(&self) -> String {
        match self {
            Self::InternalError(_) | Self::Other(_) => "Internal error".to_string(),
            Self::ConcurrentModification(id) => {
                format!("Batch {} was modified concurrently, please retry", id)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn user_message_hides_internal_details() {
        assert_eq!(
            ServiceError::InternalError("lock poisoned".into()).user_message(),
            "Internal error"
        );

        assert_eq!(
            ServiceError::InsufficientStock("Need 3 kg more".into()).user_message(),
            "Insufficient stock: Need 3 kg more"
        );
        assert_eq!(
            ServiceError::ValidationError("weight must be positive".into()).user_message(),
            "Validation error: weight must be positive"
        );
    }

    #[test]
    fn retryable_kinds() {
        assert!(ServiceError::ConcurrentModification(Uuid::new_v4()).is_retryable());
        assert!(!ServiceError::ValidationError("x".into()).is_retryable());
        assert_eq!(ServiceError::Other(anyhow::anyhow!("boom")).code(), "internal_error");
    }

    #[derive(Validate)]
    struct Named {
        #[validate(length(min = 1))]
        name: String,
    }

    #[test]
    fn validation_errors_convert() {
        let err: ServiceError = Named { name: String::new() }.validate().unwrap_err().into();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }
}
