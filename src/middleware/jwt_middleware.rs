/// Bearer Authentication Middleware
///
/// Validates the access token from the Authorization header and injects its
/// claims into request extensions. Rejections use the standard error envelope
/// and are written to the audit log.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::sync::Arc;

use crate::audit::{self, AuditEntry};
use crate::auth::validate_access_token;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError, ErrorHandler, RequestContext};
use crate::logger::RequestId;
use crate::repository::AuditLog;

pub struct JwtMiddleware {
    jwt_config: JwtSettings,
    audit: Arc<dyn AuditLog>,
}

impl JwtMiddleware {
    pub fn new(jwt_config: JwtSettings, audit: Arc<dyn AuditLog>) -> Self {
        Self { jwt_config, audit }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(JwtMiddlewareService {
            service: Rc::new(service),
            jwt_config: self.jwt_config.clone(),
            audit: self.audit.clone(),
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: Rc<S>,
    jwt_config: JwtSettings,
    audit: Arc<dyn AuditLog>,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let bearer = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string());

        let verified = match bearer {
            None => Err(AppError::from(AuthError::MissingToken)),
            Some(token) => validate_access_token(&token, &self.jwt_config),
        };

        match verified {
            Ok(claims) => {
                tracing::debug!(
                    user_id = claims.sub,
                    username = %claims.username,
                    "Access token validated"
                );
                req.extensions_mut().insert(claims);

                let service = self.service.clone();
                Box::pin(async move { service.call(req).await })
            }
            Err(e) => {
                let mut ctx = RequestContext::new("authenticate", req.path());
                let request_id = req.extensions().get::<RequestId>().map(|id| id.0.clone());
                if let Some(id) = request_id {
                    ctx = ctx.with_request_id(id);
                }
                let entry = AuditEntry::capture(&e, &ctx);
                e.log_error(&ctx);

                let audit_log = self.audit.clone();
                Box::pin(async move {
                    audit::record(audit_log.as_ref(), entry).await;
                    Err(Error::from(e))
                })
            }
        }
    }
}
