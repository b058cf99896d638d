use axum::{http::StatusCode, response::Response};
use thiserror::Error;

use crate::{application::repos::RepoError, infra::error::InfraError};

/// Internal diagnostics carried on an error response for the logging middleware.
///
/// Never serialized into the response body.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Errors that abort a command (`serve`, `migrate`, `seed`) before or after serving.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_stores_report_in_response_extensions() {
        let mut response = Response::new(axum::body::Body::empty());
        ErrorReport::from_message("tests", StatusCode::NOT_FOUND, "missing").attach(&mut response);

        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert_eq!(report.status, StatusCode::NOT_FOUND);
        assert_eq!(report.messages, vec!["missing"]);
    }
}
