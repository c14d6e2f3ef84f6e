use reqwest::StatusCode;

/// Error taxonomy for every SDK operation.
///
/// Non-2xx responses are classified by status; the 400/401/404/500 families
/// get their own variants because callers routinely branch on them. Each
/// classified variant carries the provider transaction id when the response
/// included one, for support tickets.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("provider returned HTTP 400 (transaction id: {})", display_opt(transaction_id))]
    BadRequest { transaction_id: Option<String> },
    /// A 401 that survived the single refresh-and-retry cycle, or a 401
    /// straight from the identity exchange (bad credentials).
    #[error("provider rejected the auth token (transaction id: {})", display_opt(transaction_id))]
    NotAuthorized { transaction_id: Option<String> },
    #[error("provider returned HTTP 404 (transaction id: {})", display_opt(transaction_id))]
    NotFound { transaction_id: Option<String> },
    #[error("provider returned HTTP 500 (transaction id: {})", display_opt(transaction_id))]
    ServerError { transaction_id: Option<String> },
    #[error("provider returned HTTP {status} (transaction id: {})", display_opt(transaction_id))]
    Http {
        status: StatusCode,
        transaction_id: Option<String>,
    },
    /// Raised only after the timeout retry budget is spent.
    #[error("timeout from provider while trying {method} {path}")]
    Timeout { method: String, path: String },
    #[error("no endpoints for service: {0}")]
    UnknownService(String),
    #[error("multiple regions available for {service}, pass one of: {regions}")]
    AmbiguousRegion { service: String, regions: String },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unexpected response from provider: {0}")]
    UnexpectedResponse(String),
    #[error("reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

fn display_opt(id: &Option<String>) -> &str {
    id.as_deref().unwrap_or("-")
}

impl Error {
    /// Map a non-2xx status to its variant. The `X-Trans-Id` header should
    /// already have been pulled off the response by the caller.
    pub(crate) fn from_status(status: StatusCode, transaction_id: Option<String>) -> Self {
        match status {
            StatusCode::BAD_REQUEST => Error::BadRequest { transaction_id },
            StatusCode::UNAUTHORIZED => Error::NotAuthorized { transaction_id },
            StatusCode::NOT_FOUND => Error::NotFound { transaction_id },
            StatusCode::INTERNAL_SERVER_ERROR => Error::ServerError { transaction_id },
            status => Error::Http {
                status,
                transaction_id,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_status_test() {
        assert!(matches!(
            Error::from_status(StatusCode::BAD_REQUEST, None),
            Error::BadRequest { .. }
        ));
        assert!(matches!(
            Error::from_status(StatusCode::UNAUTHORIZED, None),
            Error::NotAuthorized { .. }
        ));
        assert!(Error::from_status(StatusCode::NOT_FOUND, None).is_not_found());
        assert!(matches!(
            Error::from_status(StatusCode::INTERNAL_SERVER_ERROR, None),
            Error::ServerError { .. }
        ));
        assert!(matches!(
            Error::from_status(StatusCode::IM_A_TEAPOT, None),
            Error::Http { .. }
        ));
    }

    #[test]
    fn transaction_id_in_message_test() {
        let err = Error::from_status(StatusCode::NOT_FOUND, Some("tx-abc123".to_owned()));
        assert!(err.to_string().contains("tx-abc123"));
    }
}
