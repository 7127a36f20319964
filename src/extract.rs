//! Request extractors whose rejections go through [`AppError`].

use axum::extract::{FromRequest, Request, rejection::JsonRejection};

use crate::app_error::{AppError, FieldErrors, NON_FIELD_ERRORS};

/// JSON body. Bodies that do not deserialize are reported as field errors.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct Json<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(err) => {
                let text = err.body_text();
                let detail = text.split_once(": ").map_or(text.as_str(), |(_, rest)| rest);
                let (field, message) = split_field(detail);
                AppError::Validation(FieldErrors::single(field, message))
            }
            JsonRejection::JsonSyntaxError(err) => {
                AppError::BadRequest(format!("Malformed JSON body: {}", err.body_text()))
            }
            other => AppError::BadRequest(other.body_text()),
        }
    }
}

/// Splits `"price: invalid type ..."` into the offending field and its message.
fn split_field(detail: &str) -> (&str, &str) {
    match detail.split_once(": ") {
        Some((path, message))
            if !path.is_empty() && !path.contains(char::is_whitespace) && path != "." =>
        {
            (path, message)
        }
        _ => (NON_FIELD_ERRORS, detail),
    }
}

/// Multipart body whose rejection is a plain 400.
pub struct Multipart(pub axum::extract::Multipart);

impl<S> FromRequest<S> for Multipart
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        axum::extract::Multipart::from_request(req, state)
            .await
            .map(Multipart)
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
    }
}
