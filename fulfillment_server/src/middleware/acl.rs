//! Access control middleware for the staff endpoints.
//!
//! Placed on any route or service, it resolves the `sfg-api-key` header against the configured key registry,
//! inserts the resulting [`StaffClaims`] into the request extensions (where handlers can extract them), and
//! rejects the request unless the claims carry every role the route requires. Authorization failures happen here,
//! before any business logic runs.

use std::{pin::Pin, rc::Rc};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::ErrorInternalServerError,
    web,
    Error,
    HttpMessage,
};
use futures::{
    future::{ok, Ready},
    Future,
};
use fulfillment_engine::db_types::Role;

use crate::{
    auth::{ApiKeyRegistry, StaffClaims, API_KEY_HEADER},
    errors::{AuthError, ServerError},
};

pub struct AclMiddlewareFactory {
    required_roles: Vec<Role>,
}

impl AclMiddlewareFactory {
    pub fn new(required_roles: &[Role]) -> Self {
        AclMiddlewareFactory { required_roles: required_roles.to_vec() }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AclMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AclMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AclMiddlewareService { required_roles: self.required_roles.clone(), service: Rc::new(service) })
    }
}

pub struct AclMiddlewareService<S> {
    required_roles: Vec<Role>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AclMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let required_roles = self.required_roles.clone();
        Box::pin(async move {
            let registry = req.app_data::<web::Data<ApiKeyRegistry>>().ok_or_else(|| {
                log::warn!("💻️ No API key registry registered with the app. This is a wiring bug.");
                ErrorInternalServerError("No API key registry configured")
            })?;
            let key = req
                .headers()
                .get(API_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
                .ok_or(ServerError::AuthenticationError(AuthError::MissingApiKey))?;
            let claims = registry
                .resolve(key)
                .cloned()
                .ok_or(ServerError::AuthenticationError(AuthError::UnknownApiKey))?;
            if !required_roles.iter().all(|role| claims.has_role(*role)) {
                let wanted = required_roles.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(", ");
                return Err(ServerError::AuthenticationError(AuthError::InsufficientPermissions(format!(
                    "This action requires: {wanted}"
                )))
                .into());
            }
            req.extensions_mut().insert(claims);
            service.call(req).await
        })
    }
}
