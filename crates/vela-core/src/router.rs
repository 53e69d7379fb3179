// MESSAGE & QUERY ROUTING
// Lookup tables from a route key to the capability that serves it.
//
// SAFETY INVARIANTS:
// 1. A route is registered at most once per router
// 2. Routing is an exact key match; there is no fallback handler
// 3. Routers are built during protocol wiring and are read-only afterwards

use crate::context::Context;
use crate::error::AppError;
use crate::tx::Msg;
use std::collections::BTreeMap;
use thiserror::Error;

/// Output of one successful message handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerResult {
    pub data: Vec<u8>,
    pub log: String,
}

impl HandlerResult {
    pub fn with_data(data: Vec<u8>) -> Self {
        HandlerResult { data, log: String::new() }
    }
}

pub trait Handler<M: Msg>: Send + Sync {
    fn handle(&self, ctx: &mut Context<'_>, msg: &M) -> Result<HandlerResult, AppError>;
}

impl<M, F> Handler<M> for F
where
    M: Msg,
    F: Fn(&mut Context<'_>, &M) -> Result<HandlerResult, AppError> + Send + Sync,
{
    fn handle(&self, ctx: &mut Context<'_>, msg: &M) -> Result<HandlerResult, AppError> {
        self(ctx, msg)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("route {0:?} is already registered")]
    Duplicate(String),

    #[error("route key must be non-empty and alphanumeric, got {0:?}")]
    InvalidKey(String),
}

fn check_route(route: &str) -> Result<(), RouteError> {
    if route.is_empty() || !route.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(RouteError::InvalidKey(route.to_string()));
    }
    Ok(())
}

pub struct Router<M: Msg> {
    routes: BTreeMap<String, Box<dyn Handler<M>>>,
}

impl<M: Msg> Router<M> {
    pub fn new() -> Self {
        Router { routes: BTreeMap::new() }
    }

    pub fn add_route(&mut self, route: &str, handler: Box<dyn Handler<M>>) -> Result<&mut Self, RouteError> {
        check_route(route)?;
        if self.routes.contains_key(route) {
            return Err(RouteError::Duplicate(route.to_string()));
        }
        self.routes.insert(route.to_string(), handler);
        Ok(self)
    }

    pub fn route(&self, route: &str) -> Option<&dyn Handler<M>> {
        self.routes.get(route).map(|h| h.as_ref())
    }

    pub fn has_route(&self, route: &str) -> bool {
        self.routes.contains_key(route)
    }

    pub fn routes(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }
}

impl<M: Msg> Default for Router<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Serves `custom/<module>/<path...>` queries for one module.
pub trait Querier: Send + Sync {
    fn query(&self, ctx: &mut Context<'_>, path: &[&str], data: &[u8]) -> Result<Vec<u8>, AppError>;
}

impl<F> Querier for F
where
    F: Fn(&mut Context<'_>, &[&str], &[u8]) -> Result<Vec<u8>, AppError> + Send + Sync,
{
    fn query(&self, ctx: &mut Context<'_>, path: &[&str], data: &[u8]) -> Result<Vec<u8>, AppError> {
        self(ctx, path, data)
    }
}

#[derive(Default)]
pub struct QueryRouter {
    routes: BTreeMap<String, Box<dyn Querier>>,
}

impl QueryRouter {
    pub fn new() -> Self {
        QueryRouter { routes: BTreeMap::new() }
    }

    pub fn add_route(&mut self, module: &str, querier: Box<dyn Querier>) -> Result<&mut Self, RouteError> {
        check_route(module)?;
        if self.routes.contains_key(module) {
            return Err(RouteError::Duplicate(module.to_string()));
        }
        self.routes.insert(module.to_string(), querier);
        Ok(self)
    }

    pub fn route(&self, module: &str) -> Option<&dyn Querier> {
        self.routes.get(module).map(|q| q.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Address;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Noop;

    impl Msg for Noop {
        fn route(&self) -> &'static str {
            "noop"
        }
        fn msg_type(&self) -> &'static str {
            "noop"
        }
        fn validate_basic(&self) -> Result<(), AppError> {
            Ok(())
        }
        fn signers(&self) -> Vec<Address> {
            Vec::new()
        }
    }

    fn noop_handler(_: &mut Context<'_>, _: &Noop) -> Result<HandlerResult, AppError> {
        Ok(HandlerResult::default())
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let mut router = Router::<Noop>::new();
        router.add_route("noop", Box::new(noop_handler)).unwrap();
        assert_eq!(
            router.add_route("noop", Box::new(noop_handler)).err(),
            Some(RouteError::Duplicate("noop".into()))
        );
        assert!(router.has_route("noop"));
        assert!(router.route("other").is_none());
    }

    #[test]
    fn test_invalid_route_key() {
        let mut router = Router::<Noop>::new();
        assert!(matches!(router.add_route("bad/key", Box::new(noop_handler)), Err(RouteError::InvalidKey(_))));
        assert!(matches!(router.add_route("", Box::new(noop_handler)), Err(RouteError::InvalidKey(_))));
    }
}
