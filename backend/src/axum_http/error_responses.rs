use application::usecases::subscriptions::SubscriptionError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}

pub fn subscription_error_response(err: SubscriptionError) -> Response {
    let status = err.status_code();
    let message = match &err {
        // Internal detail stays in the logs.
        SubscriptionError::Internal(_) => "internal server error".to_string(),
        _ => err.to_string(),
    };

    (
        status,
        Json(ErrorResponse {
            code: status.as_u16(),
            message,
        }),
    )
        .into_response()
}

pub fn plain_error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            code: status.as_u16(),
            message: message.to_string(),
        }),
    )
        .into_response()
}
