//! Handler-side controller.
//!
//! This module provides [`InterceptController`], which registers routes with
//! the traffic side, runs request and response handlers for intercepted
//! traffic, and keeps the interception records and alias ledger for later
//! lookup.

use crate::codec::encode_matcher;
use crate::config::settings::EngineConfig;
use crate::driver::alias::AliasLedger;
use crate::driver::context::{ActiveTest, TestId};
use crate::driver::handler::{RequestHandler, RouteHandler};
use crate::driver::interception::SharedInterception;
use crate::driver::request::on_request_received;
use crate::driver::response::on_response_received;
use crate::error::{NetStubError, Result};
use crate::events::frames::{CreateRouteFrame, SetRouteDisabledFrame};
use crate::events::{EventEmitter, EventReceiver, NetEvent};
use crate::sync::lock;
use crate::types::interception::InterceptionSnapshot;
use crate::types::matcher::{AnnotatedRouteMatcher, RouteMatcher};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Route as the handler side knows it.
struct DriverRoute {
    /// Declared matcher, kept for error context
    matcher: AnnotatedRouteMatcher,
    handler: Option<RequestHandler>,
    alias: Option<String>,
    /// Every interception of this route, oldest first
    requests: Vec<SharedInterception>,
}

#[derive(Default)]
struct DriverState {
    routes: HashMap<String, DriverRoute>,
    /// Interceptions still waiting for a request or response continuation
    interceptions: HashMap<String, SharedInterception>,
}

pub(crate) struct Shared {
    pub(crate) config: EngineConfig,
    pub(crate) emitter: EventEmitter,
    pub(crate) aliases: AliasLedger,
    pub(crate) active_test: ActiveTest,
    state: Mutex<DriverState>,
    failures: mpsc::UnboundedSender<NetStubError>,
    handler_counter: AtomicU64,
    subscription_counter: AtomicU64,
}

impl Shared {
    pub(crate) fn next_subscription_id(&self) -> String {
        let n = self.subscription_counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("Subscription{n}")
    }

    /// Handler and declared matcher of a known route.
    pub(crate) fn route_handler(
        &self,
        handler_id: &str,
    ) -> Option<(Option<RequestHandler>, AnnotatedRouteMatcher)> {
        lock(&self.state)
            .routes
            .get(handler_id)
            .map(|route| (route.handler.clone(), route.matcher.clone()))
    }

    /// Append to the route's history and to the ledger under the route alias.
    pub(crate) fn record_route_request(&self, handler_id: &str, interception: SharedInterception) {
        let alias = {
            let mut state = lock(&self.state);
            let Some(route) = state.routes.get_mut(handler_id) else {
                return;
            };
            route.requests.push(Arc::clone(&interception));
            route.alias.clone()
        };
        if let Some(alias) = alias {
            self.aliases.record(alias, interception);
        }
    }

    pub(crate) fn track_interception(&self, request_id: &str, interception: SharedInterception) {
        lock(&self.state)
            .interceptions
            .insert(request_id.to_owned(), interception);
    }

    pub(crate) fn untrack_interception(&self, request_id: &str) {
        lock(&self.state).interceptions.remove(request_id);
    }

    pub(crate) fn interception(&self, request_id: &str) -> Option<SharedInterception> {
        lock(&self.state).interceptions.get(request_id).cloned()
    }

    /// Surface a fatal handler error as a failed command.
    pub(crate) fn fail(&self, err: NetStubError) {
        error!(error = %err, "interception failed");
        if self.failures.send(err).is_err() {
            warn!("command failure dropped; nobody is listening");
        }
    }
}

/// Stream of fatal handler errors, in the order they occurred.
pub struct CommandFailures {
    rx: mpsc::UnboundedReceiver<NetStubError>,
}

impl CommandFailures {
    pub async fn next(&mut self) -> Option<NetStubError> {
        self.rx.recv().await
    }

    pub fn try_next(&mut self) -> Option<NetStubError> {
        self.rx.try_recv().ok()
    }
}

/// Handler side of the engine. Cloning shares the same controller.
#[derive(Clone)]
pub struct InterceptController {
    shared: Arc<Shared>,
}

impl InterceptController {
    pub fn new(config: EngineConfig, emitter: EventEmitter) -> (Self, CommandFailures) {
        let (failures, rx) = mpsc::unbounded_channel();
        let controller = Self {
            shared: Arc::new(Shared {
                config,
                emitter,
                aliases: AliasLedger::default(),
                active_test: ActiveTest::default(),
                state: Mutex::new(DriverState::default()),
                failures,
                handler_counter: AtomicU64::new(0),
                subscription_counter: AtomicU64::new(0),
            }),
        };
        (controller, CommandFailures { rx })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Register a route and wait until the traffic side has stored it.
    ///
    /// Returns the new route's handler id.
    pub async fn intercept(&self, matcher: RouteMatcher, handler: RouteHandler) -> Result<String> {
        let (request_handler, static_response) = match handler {
            RouteHandler::Function(f) => (Some(f), None),
            RouteHandler::StaticResponse(response) => {
                response.validate("intercept")?;
                (None, Some(response.to_backend()))
            }
            RouteHandler::None => (None, None),
        };

        let n = self.shared.handler_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let handler_id = n.to_string();
        let route_matcher = encode_matcher(&matcher);
        let has_interceptor = request_handler.is_some();

        lock(&self.shared.state).routes.insert(
            handler_id.clone(),
            DriverRoute {
                matcher: route_matcher.clone(),
                handler: request_handler,
                alias: None,
                requests: Vec::new(),
            },
        );

        let created = self
            .shared
            .emitter
            .emit_with_ack(&NetEvent::CreateRoute(CreateRouteFrame {
                handler_id: handler_id.clone(),
                route_matcher,
                static_response,
                has_interceptor,
            }))
            .await;

        if let Err(err) = created {
            lock(&self.shared.state).routes.remove(&handler_id);
            return Err(err);
        }
        debug!(handler_id = %handler_id, has_interceptor, "route created");
        Ok(handler_id)
    }

    pub fn set_route_disabled(&self, handler_id: &str, disabled: bool) -> Result<()> {
        self.shared
            .emitter
            .emit(&NetEvent::SetRouteDisabled(SetRouteDisabledFrame {
                handler_id: handler_id.to_owned(),
                disabled,
            }))
    }

    /// Name a route. Returns `false` for an unknown handler id.
    pub fn set_route_alias(&self, handler_id: &str, alias: impl Into<String>) -> bool {
        match lock(&self.shared.state).routes.get_mut(handler_id) {
            Some(route) => {
                route.alias = Some(alias.into());
                true
            }
            None => false,
        }
    }

    pub fn set_active_test(&self, test: Option<TestId>) {
        self.shared.active_test.set(test);
    }

    pub fn active_test(&self) -> Option<TestId> {
        self.shared.active_test.current()
    }

    fn latest_for_alias(&self, alias: &str) -> Option<SharedInterception> {
        self.shared.aliases.latest(alias)
    }

    /// Latest interception recorded under `alias`, either a request alias set
    /// by a handler or the alias of its route.
    pub fn find_by_alias(&self, alias: &str) -> Option<InterceptionSnapshot> {
        self.latest_for_alias(alias)
            .map(|interception| lock(&interception).snapshot())
    }

    /// Like [`Self::find_by_alias`], marking the interception as waited on.
    pub fn wait_for_alias(&self, alias: &str) -> Option<InterceptionSnapshot> {
        let interception = self.latest_for_alias(alias)?;
        let mut record = lock(&interception);
        record.request_waited = true;
        record.response_waited = record.response.is_some() && record.state().is_terminal();
        Some(record.snapshot())
    }

    /// Snapshot of a live or finished interception.
    pub fn interception(&self, request_id: &str) -> Option<InterceptionSnapshot> {
        if let Some(live) = self.shared.interception(request_id) {
            return Some(lock(&live).snapshot());
        }
        let state = lock(&self.shared.state);
        let finished = state
            .routes
            .values()
            .flat_map(|route| route.requests.iter())
            .find(|interception| lock(interception).id == request_id)
            .map(|interception| lock(interception).snapshot());
        finished
    }

    /// All interceptions of a route, oldest first.
    pub fn route_requests(&self, handler_id: &str) -> Vec<InterceptionSnapshot> {
        lock(&self.shared.state)
            .routes
            .get(handler_id)
            .map(|route| {
                route
                    .requests
                    .iter()
                    .map(|interception| lock(interception).snapshot())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn live_interception_count(&self) -> usize {
        lock(&self.shared.state).interceptions.len()
    }

    /// Forget routes, interceptions and aliases.
    pub fn reset(&self) {
        *lock(&self.shared.state) = DriverState::default();
        self.shared.aliases.clear();
        debug!("intercept controller reset");
    }

    /// Dispatch frames from the traffic side until the channel closes. Each
    /// interception runs as its own task. Stops with an error on an event
    /// this side does not consume.
    pub async fn run(&self, mut receiver: EventReceiver) -> Result<()> {
        while let Some(envelope) = receiver.recv().await {
            let (frame, acknowledger) = envelope.into_parts();
            let event = frame.event.clone();
            debug!(event = %event, "controller received net event");

            let result = match NetEvent::from_raw(frame) {
                Ok(NetEvent::RequestReceived(frame)) => {
                    let shared = Arc::clone(&self.shared);
                    tokio::spawn(async move {
                        let request_id = frame.request_id.clone();
                        if let Err(err) = on_request_received(shared, frame).await {
                            error!(request_id = %request_id, error = %err, "request leg failed");
                        }
                    });
                    Ok(())
                }
                Ok(NetEvent::ResponseReceived(frame)) => {
                    let shared = Arc::clone(&self.shared);
                    tokio::spawn(async move {
                        let request_id = frame.request_id.clone();
                        if let Err(err) = on_response_received(shared, frame).await {
                            error!(request_id = %request_id, error = %err, "response leg failed");
                        }
                    });
                    Ok(())
                }
                Ok(other) => Err(NetStubError::UnrecognizedEvent {
                    event: other.name().to_owned(),
                }),
                Err(err) => Err(err),
            };

            match result {
                Err(err) if err.is_channel_fatal() => {
                    error!(event = %event, error = %err, "stopping controller dispatch loop");
                    let _ = acknowledger.ack(Err(NetStubError::UnrecognizedEvent {
                        event: event.clone(),
                    }));
                    return Err(err);
                }
                result => {
                    if let Err(err) = acknowledger.ack(result) {
                        warn!(event = %event, error = %err, "net event failed");
                    }
                }
            }
        }
        Ok(())
    }
}
