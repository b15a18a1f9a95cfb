use serde_json::{json, Value};
use thiserror::Error as ThisError;
use warp::http::StatusCode;

/// Error taxonomy shared by every action and handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Unauthorized,
    Forbidden,
    Internal,
}

impl ErrorKind {
    pub fn new(self, info: &str) -> Error {
        Error {
            kind: self,
            field: None,
            info: info.to_string(),
        }
    }

    /// Same as [`ErrorKind::new`], but names the request field at fault.
    pub fn field(self, field: &str, info: &str) -> Error {
        Error {
            kind: self,
            field: Some(field.to_string()),
            info: info.to_string(),
        }
    }

    pub fn default(self) -> Error {
        let info = match self {
            ErrorKind::Validation => "Invalid input.",
            ErrorKind::Conflict => "Object already exists.",
            ErrorKind::NotFound => "Not found.",
            ErrorKind::Unauthorized => "Authentication credentials were not provided.",
            ErrorKind::Forbidden => "You do not have permission to perform this action.",
            ErrorKind::Internal => "Internal server error.",
        };
        self.new(info)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Clone, ThisError)]
#[error("{kind:?}: {info}")]
pub struct Error {
    pub kind: ErrorKind,
    pub field: Option<String>,
    pub info: String,
}

impl Error {
    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }

    /// `{"<field>": ["<message>"]}` when the field is known, `{"detail": "<message>"}` otherwise.
    pub fn body(&self) -> Value {
        match &self.field {
            Some(field) => json!({ field.as_str(): [self.info.as_str()] }),
            None => json!({ "detail": self.info.as_str() }),
        }
    }
}

impl warp::reject::Reject for Error {}

#[derive(Debug, ThisError)]
#[error("{info}")]
pub struct QueryError {
    info: String,
    unique_violation: bool,
}

impl QueryError {
    pub fn new(info: String) -> Self {
        Self {
            info,
            unique_violation: false,
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        self.unique_violation
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Database(e) => Self {
                unique_violation: e.is_unique_violation(),
                info: format!("{e}"),
            },
            sqlx::Error::RowNotFound => Self::new(String::from("RowNotFound")),
            sqlx::Error::PoolTimedOut => Self::new(String::from("Pool timed out")),
            sqlx::Error::PoolClosed => Self::new(String::from("Pool closed")),
            e => Self::new(format!("{e}")),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for QueryError {
    fn from(value: sqlx::migrate::MigrateError) -> Self {
        Self::new(format!("Migration failed: {value}"))
    }
}

impl From<QueryError> for Error {
    fn from(value: QueryError) -> Self {
        if value.unique_violation {
            log::debug!("Unique constraint rejected a write: {}", value.info);
            return ErrorKind::Conflict.default();
        }

        log::error!("Query failed: {}", value.info);
        ErrorKind::Internal.default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_are_keyed_by_field() {
        let error = ErrorKind::Validation.field("ingredients", "This list may not be empty.");

        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            error.body(),
            json!({ "ingredients": ["This list may not be empty."] })
        );
    }

    #[test]
    fn plain_errors_use_detail() {
        let error = ErrorKind::NotFound.default();

        assert_eq!(error.status(), StatusCode::NOT_FOUND);
        assert_eq!(error.body(), json!({ "detail": "Not found." }));
    }

    #[test]
    fn non_database_query_errors_become_internal() {
        let error: Error = QueryError::from(sqlx::Error::PoolClosed).into();

        assert_eq!(error.kind, ErrorKind::Internal);
    }
}
