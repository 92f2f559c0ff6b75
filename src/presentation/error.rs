// Mapping of service errors onto HTTP responses
use crate::application::digitisation_service::DigitisationError;
use crate::application::plot_repository::PersistenceError;
use crate::application::plot_service::{PlotServiceError, QueryError};
use crate::domain::gate::ValidationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(what: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("{} not found", what))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<PersistenceError> for ApiError {
    fn from(e: PersistenceError) -> Self {
        match e {
            PersistenceError::Duplicate(_) => ApiError::new(StatusCode::CONFLICT, e.to_string()),
            _ => {
                tracing::error!("Persistence error: {}", e);
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        let status = match e {
            ValidationError::InvalidTransition { .. } => StatusCode::CONFLICT,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        };
        ApiError::new(status, e.to_string())
    }
}

impl From<DigitisationError> for ApiError {
    fn from(e: DigitisationError) -> Self {
        match e {
            DigitisationError::NoSession | DigitisationError::PlotAlreadyExists { .. } => {
                ApiError::new(StatusCode::CONFLICT, e.to_string())
            }
            DigitisationError::InvalidDoi(_)
            | DigitisationError::MissingFigureNumber
            | DigitisationError::Calibration(_) => {
                ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
            }
            DigitisationError::Validation(e) => e.into(),
            DigitisationError::Persistence(e) => e.into(),
            DigitisationError::Export(_) => {
                tracing::error!("Session export failed: {}", e);
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        }
    }
}

impl From<PlotServiceError> for ApiError {
    fn from(e: PlotServiceError) -> Self {
        match e {
            PlotServiceError::Persistence(e) => e.into(),
            PlotServiceError::Export(_) => {
                tracing::error!("Plot export failed: {}", e);
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::Security(e) => ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
            // Bad SQL and statements refused by the read-only check
            QueryError::Persistence(e @ PersistenceError::Storage(_)) => {
                ApiError::new(StatusCode::BAD_REQUEST, e.to_string())
            }
            QueryError::Persistence(e) => e.into(),
        }
    }
}

impl From<StatusCode> for ApiError {
    fn from(status: StatusCode) -> Self {
        ApiError::new(status, status.canonical_reason().unwrap_or("error"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calibration::{Axis, CalibrationError};
    use crate::domain::gate::GateState;

    fn status_of(e: impl Into<ApiError>) -> StatusCode {
        e.into().status
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_of(DigitisationError::NoSession), StatusCode::CONFLICT);
        assert_eq!(
            status_of(DigitisationError::Calibration(CalibrationError::NonFinite { axis: Axis::X })),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(DigitisationError::Validation(ValidationError::InvalidTransition {
                event: "accept",
                state: GateState::Collecting,
            })),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(DigitisationError::Validation(ValidationError::EmptyName)),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(DigitisationError::Persistence(PersistenceError::Storage(
                "disk full".to_string()
            ))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(PersistenceError::Duplicate("x".to_string())),
            StatusCode::CONFLICT
        );
    }
}
