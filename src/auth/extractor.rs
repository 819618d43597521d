//! Actix-web extractor guarding operator endpoints.

use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use secrecy::{ExposeSecret, SecretString};
use std::future::{ready, Ready};

use super::AdminKey;
use crate::config::ADMIN_KEY_HEADER;
use crate::error::AppError;

/// Proof that the request carried the configured `X-Admin-Key`.
///
/// ```ignore
/// async fn reload(_auth: AdminAuth) -> AppResult<HttpResponse> { .. }
/// ```
#[derive(Debug)]
pub struct AdminAuth;

impl FromRequest for AdminAuth {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let Some(stored) = req.app_data::<web::Data<AdminKey>>() else {
            return ready(Err(AppError::Unauthorized(
                "Operator endpoints are disabled".to_string(),
            )));
        };

        let provided: Option<SecretString> = req
            .headers()
            .get(ADMIN_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| SecretString::from(s.to_string()));

        match provided {
            Some(ref key) if stored.verify(key.expose_secret()) => ready(Ok(AdminAuth)),
            Some(_) => ready(Err(AppError::Unauthorized("Invalid admin key".to_string()))),
            None => ready(Err(AppError::Unauthorized(format!(
                "Missing admin key. Provide {} header.",
                ADMIN_KEY_HEADER
            )))),
        }
    }
}
