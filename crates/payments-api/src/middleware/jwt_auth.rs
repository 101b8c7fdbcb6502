//! JWT Bearer Authentication
//!
//! Guards the `/api/payments` scope. A valid HS256 token puts a [`Caller`] into
//! the request extensions; anything else is answered with 401 before the
//! handler runs.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header,
    Error, HttpMessage, HttpRequest, HttpResponse,
};
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::{
    future::{ready, Ready},
    rc::Rc,
};

use crate::models::ErrorResponse;
use crate::services::Caller;

/// Token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(default)]
    pub admin: bool,
}

impl Claims {
    pub fn new(user_id: impl Into<String>, admin: bool, expiration_hours: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: user_id.into(),
            exp: now + expiration_hours * 3600,
            iat: now,
            admin,
        }
    }
}

/// The authenticated caller, if [`JwtAuth`] accepted the request
pub fn caller_from_request(req: &HttpRequest) -> Option<Caller> {
    req.extensions().get::<Caller>().cloned()
}

fn bearer_token(req: &ServiceRequest) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Authentication failure: `(code, message)`
fn authenticate(
    token: Option<&str>,
    key: &DecodingKey,
) -> Result<Caller, (&'static str, &'static str)> {
    let token = token.ok_or(("missing_token", "Access token required"))?;

    let data = decode::<Claims>(token, key, &Validation::new(Algorithm::HS256)).map_err(|e| {
        match e.kind() {
            ErrorKind::ExpiredSignature => ("token_expired", "Token expired"),
            _ => ("invalid_token", "Invalid token"),
        }
    })?;

    if data.claims.sub.trim().is_empty() {
        return Err(("invalid_token", "Token has no subject"));
    }

    Ok(Caller {
        user_id: data.claims.sub,
        is_admin: data.claims.admin,
    })
}

/// JWT authentication middleware
pub struct JwtAuth {
    key: Rc<DecodingKey>,
}

impl JwtAuth {
    pub fn new(secret: &str) -> Self {
        Self {
            key: Rc::new(DecodingKey::from_secret(secret.as_bytes())),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtAuthMiddleware {
            service: Rc::new(service),
            key: self.key.clone(),
        }))
    }
}

pub struct JwtAuthMiddleware<S> {
    service: Rc<S>,
    key: Rc<DecodingKey>,
}

impl<S, B> Service<ServiceRequest> for JwtAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let authenticated = authenticate(bearer_token(&req), &self.key);

        match authenticated {
            Ok(caller) => {
                tracing::debug!(
                    user_id = %caller.user_id,
                    admin = caller.is_admin,
                    "Authenticated request"
                );
                req.extensions_mut().insert(caller);
                Box::pin(async move {
                    service
                        .call(req)
                        .await
                        .map(ServiceResponse::map_into_left_body)
                })
            }
            Err((code, message)) => {
                tracing::debug!(code = code, path = %req.path(), "Authentication failed");
                let response =
                    HttpResponse::Unauthorized().json(ErrorResponse::new(code, message));
                Box::pin(async move { Ok(req.into_response(response).map_into_right_body()) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{test, web, App};
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test_jwt_secret_for_payment_tests";

    fn token(claims: &Claims, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    async fn whoami(req: HttpRequest) -> HttpResponse {
        match caller_from_request(&req) {
            Some(caller) => {
                HttpResponse::Ok().body(format!("{}:{}", caller.user_id, caller.is_admin))
            }
            None => HttpResponse::InternalServerError().finish(),
        }
    }

    macro_rules! app {
        () => {
            test::init_service(
                App::new().service(
                    web::scope("/api")
                        .wrap(JwtAuth::new(SECRET))
                        .route("/me", web::get().to(whoami)),
                ),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_valid_token_sets_caller() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/api/me")
            .insert_header((
                "Authorization",
                format!("Bearer {}", token(&Claims::new("user-1", false, 1), SECRET)),
            ))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await, "user-1:false");
    }

    #[actix_web::test]
    async fn test_admin_claim() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/api/me")
            .insert_header((
                "Authorization",
                format!("Bearer {}", token(&Claims::new("ops", true, 1), SECRET)),
            ))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(test::read_body(resp).await, "ops:true");
    }

    #[actix_web::test]
    async fn test_missing_token() {
        let app = app!();
        let req = test::TestRequest::get().uri("/api/me").to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: ErrorResponse = test::read_body_json(resp).await;
        assert_eq!(body.error, "missing_token");
    }

    #[actix_web::test]
    async fn test_expired_token() {
        let app = app!();
        let claims = Claims::new("user-1", false, -2);
        let req = test::TestRequest::get()
            .uri("/api/me")
            .insert_header(("Authorization", format!("Bearer {}", token(&claims, SECRET))))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: ErrorResponse = test::read_body_json(resp).await;
        assert_eq!(body.error, "token_expired");
    }

    #[actix_web::test]
    async fn test_wrong_secret() {
        let app = app!();
        let claims = Claims::new("user-1", false, 1);
        let req = test::TestRequest::get()
            .uri("/api/me")
            .insert_header((
                "Authorization",
                format!("Bearer {}", token(&claims, "another_secret_entirely")),
            ))
            .to_request();

        let resp = test::call_service(&app, req).await;
        let body: ErrorResponse = test::read_body_json(resp).await;
        assert_eq!(body.error, "invalid_token");
    }

    #[actix_web::test]
    async fn test_non_bearer_scheme() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/api/me")
            .insert_header(("Authorization", "Basic dXNlcjpwYXNz"))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
