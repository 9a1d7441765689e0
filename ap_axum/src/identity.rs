use axum::extract::FromRequestParts;
use lambda_http::RequestExt;

/// Identity claims of the caller, when the request went through the JWT
/// authorizer. Both fields are `None` for unauthenticated or local calls.
#[derive(Debug, Clone, Default)]
pub struct CallerIdentity {
    pub user_id: Option<String>,
    pub tenant_id: Option<String>,
}

impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let claims = parts
            .request_context_ref()
            .and_then(|ctx| ctx.authorizer())
            .and_then(|auth| auth.jwt.as_ref().map(|jwt| jwt.claims.clone()))
            .unwrap_or_default();

        let identity = Self {
            user_id: claims.get("sub").cloned(),
            tenant_id: claims.get("custom:tenant_id").cloned(),
        };

        tracing::debug!(
            has_user = identity.user_id.is_some(),
            has_tenant = identity.tenant_id.is_some(),
            "extracted caller identity"
        );

        Ok(identity)
    }
}
