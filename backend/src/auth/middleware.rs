use super::jwt::{JwtError, JwtService};
use super::models::Identity;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage, HttpResponse,
};
use actix_web::{FromRequest, HttpRequest};
use futures::future::{ok, Ready};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Attaches an [`Identity`] when a valid bearer token is present.
///
/// Requests without an `Authorization` header pass through anonymously;
/// a header that does not verify is answered with 401.
#[derive(Clone)]
pub struct AuthMiddleware {
    jwt_service: Arc<JwtService>,
}

impl AuthMiddleware {
    pub fn new(jwt_service: JwtService) -> Self {
        Self {
            jwt_service: Arc::new(jwt_service),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<actix_web::body::EitherBody<B>>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareService {
            service: Arc::new(service),
            jwt_service: self.jwt_service.clone(),
        })
    }
}

pub struct AuthMiddlewareService<S> {
    service: Arc<S>,
    jwt_service: Arc<JwtService>,
}

#[derive(Debug)]
enum AuthError {
    InvalidHeaderFormat,
    NotBearerToken,
    Verification(JwtError),
}

impl AuthError {
    fn client_message(&self) -> &'static str {
        match self {
            AuthError::Verification(JwtError::TokenExpired) => "Token expired",
            AuthError::Verification(_) => "Token verification failed",
            _ => "Invalid authorization header",
        }
    }
}

/// `Ok(None)` when the request carries no credentials at all.
fn identify_request(
    req: &ServiceRequest,
    jwt_service: &JwtService,
) -> Result<Option<Identity>, AuthError> {
    let Some(auth_header) = req.headers().get("Authorization") else {
        return Ok(None);
    };
    let auth_str = auth_header
        .to_str()
        .map_err(|_| AuthError::InvalidHeaderFormat)?;
    let token = auth_str
        .strip_prefix("Bearer ")
        .ok_or(AuthError::NotBearerToken)?;

    jwt_service
        .identify(token.trim())
        .map(Some)
        .map_err(AuthError::Verification)
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<actix_web::body::EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let jwt_service = self.jwt_service.clone();

        Box::pin(async move {
            match identify_request(&req, &jwt_service) {
                Ok(identity) => {
                    if let Some(identity) = identity {
                        log::debug!("Request to {} as user {}", req.path(), identity.user_id);
                        req.extensions_mut().insert(identity);
                    }
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Err(auth_error) => {
                    log::warn!("Rejected credentials for {}: {:?}", req.path(), auth_error);

                    let (http_req, _payload) = req.into_parts();
                    let response = HttpResponse::Unauthorized()
                        .json(serde_json::json!({ "error": auth_error.client_message() }))
                        .map_into_right_body();
                    Ok(ServiceResponse::new(http_req, response))
                }
            }
        })
    }
}

/// The caller's identity if the middleware attached one.
pub struct MaybeIdentity(pub Option<Identity>);

impl MaybeIdentity {
    pub fn into_inner(self) -> Option<Identity> {
        self.0
    }
}

impl FromRequest for MaybeIdentity {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        ok(MaybeIdentity(req.extensions().get::<Identity>().cloned()))
    }
}
