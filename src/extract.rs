use axum::extract::FromRequestParts;
use axum::http::{request::Parts, StatusCode};
use tracing::error;

use crate::middleware::RequestSession;
use crate::session::Session;

impl<S> FromRequestParts<S> for RequestSession
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<RequestSession>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "Can't extract session. Is `SessionLayer` enabled?",
        ))
    }
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let request_session = RequestSession::from_request_parts(parts, state).await?;
        request_session.start().await.map_err(|err| {
            error!(error = %err, "failed to start session");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to start session")
        })
    }
}
