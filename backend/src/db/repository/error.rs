//! Error types for repository operations.
//!
//! Every backend reports failures through [`RepositoryError`]. The attached
//! [`ErrorContext`] names the table and key involved, so a failed import or a
//! failed background calculation can be traced from its log line alone.

use std::fmt;

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Where a repository failure happened.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Repository method, e.g. `replace_facts` or `set_status_if`
    pub operation: Option<String>,
    /// Table or entity, e.g. `calc_tou`, `seasonal_set`
    pub entity: Option<String>,
    pub entity_id: Option<String>,
    /// Free-form detail, surfaced to HTTP clients as `details`
    pub details: Option<String>,
    /// Set for pool exhaustion and serialization failures
    pub retryable: bool,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            ..Default::default()
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    pub fn with_entity_id(mut self, id: impl ToString) -> Self {
        self.entity_id = Some(id.to_string());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    fn is_empty(&self) -> bool {
        self.operation.is_none()
            && self.entity.is_none()
            && self.entity_id.is_none()
            && self.details.is_none()
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        let fields = [
            ("op", &self.operation),
            ("entity", &self.entity),
            ("id", &self.entity_id),
            ("details", &self.details),
        ];
        let parts: Vec<String> = fields
            .iter()
            .filter_map(|(label, value)| value.as_ref().map(|v| format!("{}={}", label, v)))
            .collect();
        write!(f, "[{}]", parts.join(" "))
    }
}

/// Error type for repository operations
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Pool or connection failure; retried by the Postgres backend.
    #[error("connection failed: {message} {context}")]
    Connection {
        message: String,
        context: ErrorContext,
    },

    #[error("query failed: {message} {context}")]
    Query {
        message: String,
        context: ErrorContext,
    },

    /// A calculation, seasonal set or report does not exist.
    #[error("not found: {message} {context}")]
    NotFound {
        message: String,
        context: ErrorContext,
    },

    /// A stored value cannot be mapped back onto a domain type.
    #[error("invalid data: {message} {context}")]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("configuration error: {message} {context}")]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("internal error: {message} {context}")]
    Internal {
        message: String,
        context: ErrorContext,
    },
}

impl RepositoryError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::connection_with_context(message, ErrorContext::default())
    }

    pub fn connection_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Connection {
            message: message.into(),
            context: context.retryable(),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::not_found_with_context(message, ErrorContext::default())
    }

    pub fn not_found_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::NotFound {
            message: message.into(),
            context,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::internal_with_context(message, ErrorContext::default())
    }

    pub fn internal_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Internal {
            message: message.into(),
            context,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { context, .. } | Self::Query { context, .. } => context.retryable,
            _ => false,
        }
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::Connection { context, .. }
            | Self::Query { context, .. }
            | Self::NotFound { context, .. }
            | Self::Validation { context, .. }
            | Self::Configuration { context, .. }
            | Self::Internal { context, .. } => context,
        }
    }
}

#[cfg(feature = "postgres-repo")]
impl From<diesel::result::Error> for RepositoryError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};

        match err {
            Error::NotFound => RepositoryError::not_found("row not found"),
            Error::DatabaseError(kind, info) => {
                let mut context = ErrorContext::default().with_details(format!("{:?}", kind));
                if let Some(table) = info.table_name() {
                    context = context.with_entity(table);
                }
                // A concurrent status CAS or fact replace may lose a serialization race.
                if matches!(kind, DatabaseErrorKind::SerializationFailure) {
                    context = context.retryable();
                }
                RepositoryError::Query {
                    message: info.message().to_string(),
                    context,
                }
            }
            Error::DeserializationError(e) | Error::SerializationError(e) => {
                RepositoryError::internal(format!("row conversion failed: {}", e))
            }
            other => RepositoryError::query(other.to_string()),
        }
    }
}

#[cfg(feature = "postgres-repo")]
impl From<diesel::r2d2::PoolError> for RepositoryError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        RepositoryError::connection_with_context(
            err.to_string(),
            ErrorContext::default().with_details("pool"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_display_skips_missing_fields() {
        let ctx = ErrorContext::new("set_status_if")
            .with_entity("calc_tou")
            .with_entity_id(12);
        assert_eq!(ctx.to_string(), "[op=set_status_if entity=calc_tou id=12]");
        assert_eq!(ErrorContext::default().to_string(), "");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(RepositoryError::connection("pool exhausted").is_retryable());
        assert!(!RepositoryError::query("syntax").is_retryable());
        assert!(!RepositoryError::not_found("calc 3").is_retryable());
    }

    #[test]
    fn test_not_found_message_carries_entity() {
        let err = RepositoryError::not_found_with_context(
            "calculation 7",
            ErrorContext::new("get_calculation").with_entity("calc_tou"),
        );
        assert!(err.to_string().contains("calculation 7"));
        assert_eq!(err.context().entity.as_deref(), Some("calc_tou"));
    }
}
