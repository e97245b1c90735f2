use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::header::CONTENT_TYPE,
    Form, Json,
};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// JSON or `application/x-www-form-urlencoded` body. Rejections become 400s.
#[derive(Debug)]
pub struct JsonOrForm<T>(pub T);

pub(crate) fn content_type(req: &Request) -> Option<&str> {
    req.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
}

#[async_trait]
impl<S, T> FromRequest<S> for JsonOrForm<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let urlencoded = content_type(&req)
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
        if urlencoded {
            let Form(payload) = Form::<T>::from_request(req, state)
                .await
                .map_err(|e| ApiError::validation(e.body_text()))?;
            return Ok(Self(payload));
        }
        let Json(payload) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::validation(e.body_text()))?;
        Ok(Self(payload))
    }
}
