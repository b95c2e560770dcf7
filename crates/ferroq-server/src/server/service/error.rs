use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ferroq_core::Error;

/// A queue error on its way out as an HTTP response.
///
/// The body is a short plain-text diagnostic.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    pub const fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Serialization { .. } | Error::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Error::ServiceShutdown => StatusCode::SERVICE_UNAVAILABLE,
            Error::Config { .. }
            | Error::Store(_)
            | Error::DispatchSubmission { .. }
            | Error::ChannelError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(%status, error = %self.0, "request failed");
        } else {
            tracing::debug!(%status, error = %self.0, "request rejected");
        }
        (status, self.0.to_string()).into_response()
    }
}
