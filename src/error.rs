use std::collections::BTreeMap;

use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::auth::AuthError;
use crate::repo::RepoError;

/// Field name → messages. `__all__` carries form-wide messages.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub status: u16,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form: Option<serde_json::Value>,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("not found")] NotFound,
    /// Missing or invalid bearer token where one is required.
    #[error("unauthorized")] Unauthorized,
    #[error("forbidden")] Forbidden,
    #[error("conflict")] Conflict,
    /// The submitted form is echoed back so a client can redisplay it.
    #[error("validation failed")] Validation { errors: FieldErrors, form: serde_json::Value },
    #[error("too many requests")] TooManyRequests,
    #[error("internal error")] Internal,
}

impl ApiError {
    pub fn field(field: &str, message: impl Into<String>, form: serde_json::Value) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        ApiError::Validation { errors, form }
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound,
            RepoError::Conflict => ApiError::Conflict,
            RepoError::Invalid(msg) => {
                tracing::warn!("store rejected a value: {msg}");
                ApiError::field("__all__", "Ensure every value fits its field.", serde_json::Value::Null)
            }
            RepoError::Internal(msg) => {
                tracing::error!("repository failure: {msg}");
                ApiError::Internal
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        tracing::error!("token or password handling failed: {e}");
        ApiError::Internal
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (errors, form) = match self {
            ApiError::Validation { errors, form } => (Some(errors.clone()), Some(form.clone())),
            _ => (None, None),
        };
        let status = self.status_code();
        let mut builder = HttpResponse::build(status);
        if matches!(self, ApiError::Unauthorized) {
            builder.insert_header((actix_web::http::header::WWW_AUTHENTICATE, "Bearer"));
        }
        builder.json(ApiErrorBody {
            status: status.as_u16(),
            error: self.to_string(),
            errors,
            form,
        })
    }
}

/// Fallback for unmatched routes so they render the same 404 page.
pub async fn page_not_found() -> Result<HttpResponse, ApiError> {
    Err(ApiError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_errors_map_to_pages() {
        assert!(matches!(ApiError::from(RepoError::NotFound), ApiError::NotFound));
        assert!(matches!(ApiError::from(RepoError::Conflict), ApiError::Conflict));
        assert!(matches!(ApiError::from(RepoError::Internal("x".into())), ApiError::Internal));
        let too_long = ApiError::from(RepoError::Invalid("value too long for type character varying(50)".into()));
        assert_eq!(too_long.status_code().as_u16(), 400);
        assert!(matches!(too_long, ApiError::Validation { ref errors, .. } if errors.contains_key("__all__")));
    }

    #[test]
    fn validation_is_a_bad_request() {
        let e = ApiError::field("title", "This field is required.", serde_json::json!({}));
        assert_eq!(e.status_code().as_u16(), 400);
    }
}
