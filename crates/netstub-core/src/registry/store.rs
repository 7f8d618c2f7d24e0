//! Traffic-side route registry.
//!
//! [`RouteRegistry`] stores routes and the live records of matched requests.
//! The traffic collaborator calls [`RouteRegistry::intercept_request`] and
//! [`RouteRegistry::intercept_response`] for every real request and response;
//! frames from the handler side are applied through [`RouteRegistry::run`].

use crate::codec::decode_matcher;
use crate::error::{NetStubError, ProtocolMisuse, Result};
use crate::events::frames::{
    CreateRouteFrame, RequestContinueFrame, RequestReceivedFrame, ResponseContinueFrame,
    ResponseReceivedFrame, SubscribeFrame,
};
use crate::events::{EventEmitter, EventReceiver, NetEvent};
use crate::matching::MatchableRequest;
use crate::registry::route::{Route, RouteSnapshot};
use crate::resolver::StaticResponseResolver;
use crate::sync::lock;
use crate::types::interception::{Subscription, SubscriptionEvent};
use crate::types::request::{RequestData, ResponseData};
use crate::types::static_response::ResolvedStaticResponse;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

/// What the traffic collaborator should do with an observed request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    /// No route matched. Send the request to the origin as received.
    Passthrough(RequestData),
    /// Send `request` to the origin and report its response through
    /// [`RouteRegistry::intercept_response`].
    Forward {
        request_id: String,
        request: RequestData,
        has_response_handler: bool,
    },
    /// Serve `response` without contacting the origin.
    Stub {
        request_id: String,
        response: ResolvedStaticResponse,
    },
}

struct BackendRequest {
    route_handler_id: String,
    subscriptions: Vec<Subscription>,
    pending_continue: Option<oneshot::Sender<RequestContinueFrame>>,
    pending_response: Option<oneshot::Sender<ResponseContinueFrame>>,
}

#[derive(Default)]
struct RegistryState {
    routes: Vec<Route>,
    requests: HashMap<String, BackendRequest>,
    request_counter: u64,
}

impl RegistryState {
    fn next_request_id(&mut self) -> String {
        self.request_counter += 1;
        format!("interceptedRequest{}", self.request_counter)
    }
}

struct Inner {
    resolver: Arc<dyn StaticResponseResolver>,
    emitter: EventEmitter,
    state: Mutex<RegistryState>,
}

/// Route registry. Cloning shares the same registry.
#[derive(Clone)]
pub struct RouteRegistry {
    inner: Arc<Inner>,
}

impl RouteRegistry {
    pub fn new(resolver: Arc<dyn StaticResponseResolver>, emitter: EventEmitter) -> Self {
        Self {
            inner: Arc::new(Inner {
                resolver,
                emitter,
                state: Mutex::new(RegistryState::default()),
            }),
        }
    }

    /// Store a new route. Any static response is resolved first, so a route
    /// whose fixture fails to load never becomes matchable.
    pub async fn create_route(&self, frame: CreateRouteFrame) -> Result<()> {
        let matcher = decode_matcher(&frame.route_matcher)?;
        let static_response = match &frame.static_response {
            Some(response) => Some(self.inner.resolver.resolve(response).await?),
            None => None,
        };

        debug!(
            handler_id = %frame.handler_id,
            has_interceptor = frame.has_interceptor,
            has_static_response = static_response.is_some(),
            "route registered"
        );
        lock(&self.inner.state).routes.push(Route::new(
            frame.handler_id,
            matcher,
            static_response,
            frame.has_interceptor,
        ));
        Ok(())
    }

    /// Flip the disabled flag. Unknown ids are ignored.
    pub fn set_route_disabled(&self, handler_id: &str, disabled: bool) {
        let mut state = lock(&self.inner.state);
        match state.routes.iter_mut().find(|r| r.handler_id == handler_id) {
            Some(route) => route.disabled = disabled,
            None => debug!(handler_id, "set:route:disabled for unknown route ignored"),
        }
    }

    pub fn route(&self, handler_id: &str) -> Option<RouteSnapshot> {
        lock(&self.inner.state)
            .routes
            .iter()
            .find(|r| r.handler_id == handler_id)
            .map(Route::snapshot)
    }

    /// All routes in registration order.
    pub fn routes(&self) -> Vec<RouteSnapshot> {
        lock(&self.inner.state)
            .routes
            .iter()
            .map(Route::snapshot)
            .collect()
    }

    /// Handler id of the route that would serve `request`, without counting a hit.
    pub fn find_route(&self, request: &RequestData) -> Option<String> {
        let matchable = MatchableRequest::from_request(request);
        lock(&self.inner.state)
            .routes
            .iter()
            .rev()
            .find(|r| r.matches(&matchable))
            .map(|r| r.handler_id.clone())
    }

    pub fn subscriptions(&self, request_id: &str) -> Vec<Subscription> {
        lock(&self.inner.state)
            .requests
            .get(request_id)
            .map(|r| r.subscriptions.clone())
            .unwrap_or_default()
    }

    pub fn live_request_count(&self) -> usize {
        lock(&self.inner.state).requests.len()
    }

    /// Drop every route and live record. Requests waiting on a continuation
    /// fail with [`NetStubError::ChannelClosed`].
    pub fn reset(&self) {
        let mut state = lock(&self.inner.state);
        debug!(
            routes = state.routes.len(),
            requests = state.requests.len(),
            "resetting route registry"
        );
        *state = RegistryState::default();
    }

    fn forget(&self, request_id: &str) {
        lock(&self.inner.state).requests.remove(request_id);
    }

    /// Match an observed request. The most recently registered matching route
    /// wins and has its hit count incremented.
    pub async fn intercept_request(&self, request: RequestData) -> Result<RequestOutcome> {
        let matchable = MatchableRequest::from_request(&request);

        let (route_handler_id, request_id, static_response, waiter) = {
            let mut state = lock(&self.inner.state);
            let Some(index) = state.routes.iter().rposition(|r| r.matches(&matchable)) else {
                debug!(method = %request.method, url = %request.url, "no route matched");
                return Ok(RequestOutcome::Passthrough(request));
            };
            let request_id = state.next_request_id();

            let route = &mut state.routes[index];
            route.record_hit();
            let route_handler_id = route.handler_id.clone();
            let static_response = route.static_response.clone();
            let (pending, waiter) = if route.has_interceptor {
                let (tx, rx) = oneshot::channel();
                (Some(tx), Some(rx))
            } else {
                (None, None)
            };
            debug!(
                handler_id = %route_handler_id,
                request_id = %request_id,
                hit_count = route.hit_count(),
                "route matched"
            );

            state.requests.insert(
                request_id.clone(),
                BackendRequest {
                    route_handler_id: route_handler_id.clone(),
                    subscriptions: Vec::new(),
                    pending_continue: pending,
                    pending_response: None,
                },
            );
            (route_handler_id, request_id, static_response, waiter)
        };

        let notified = self
            .inner
            .emitter
            .emit(&NetEvent::RequestReceived(RequestReceivedFrame {
                route_handler_id,
                request_id: request_id.clone(),
                data: request.clone(),
            }));
        if let Err(err) = notified {
            self.forget(&request_id);
            return Err(err);
        }

        let Some(waiter) = waiter else {
            return Ok(match static_response {
                Some(response) => {
                    self.forget(&request_id);
                    RequestOutcome::Stub {
                        request_id,
                        response,
                    }
                }
                None => RequestOutcome::Forward {
                    request_id,
                    request,
                    has_response_handler: false,
                },
            });
        };

        let frame = waiter.await.map_err(|_| NetStubError::ChannelClosed)?;
        match &frame.static_response {
            Some(static_response) => {
                let resolved = self.inner.resolver.resolve(static_response).await;
                self.forget(&request_id);
                Ok(RequestOutcome::Stub {
                    request_id,
                    response: resolved?,
                })
            }
            None => Ok(RequestOutcome::Forward {
                request_id,
                request: frame.data,
                has_response_handler: frame.has_response_handler,
            }),
        }
    }

    /// Deliver the origin's response for a forwarded request. Returns the
    /// response to send to the browser.
    pub async fn intercept_response(
        &self,
        request_id: &str,
        response: ResponseData,
    ) -> Result<ResponseData> {
        let (route_handler_id, waiter) = {
            let mut state = lock(&self.inner.state);
            let Some(record) = state.requests.get_mut(request_id) else {
                return Ok(response);
            };
            let mut subscribed = record
                .subscriptions
                .iter()
                .filter(|s| s.event_name == SubscriptionEvent::Response)
                .peekable();
            let has_subscription = subscribed.peek().is_some();
            let awaits = subscribed.any(|s| s.await_continue);

            if !has_subscription {
                state.requests.remove(request_id);
                return Ok(response);
            }

            let waiter = if awaits {
                let (tx, rx) = oneshot::channel();
                record.pending_response = Some(tx);
                Some(rx)
            } else {
                None
            };
            (record.route_handler_id.clone(), waiter)
        };

        let notified = self
            .inner
            .emitter
            .emit(&NetEvent::ResponseReceived(ResponseReceivedFrame {
                route_handler_id,
                request_id: request_id.to_owned(),
                data: response.clone(),
            }));
        if let Err(err) = notified {
            self.forget(request_id);
            return Err(err);
        }

        let Some(waiter) = waiter else {
            self.forget(request_id);
            return Ok(response);
        };

        let frame = waiter.await.map_err(|_| NetStubError::ChannelClosed)?;
        self.forget(request_id);

        let mut data = frame.data;
        if let Some(static_response) = &frame.static_response {
            let resolved = self.inner.resolver.resolve(static_response).await?;
            resolved.apply_to(&mut data, static_response.status_code.is_some());
        }
        Ok(data)
    }

    fn resume_request(&self, frame: RequestContinueFrame) -> Result<()> {
        let sender = {
            let mut state = lock(&self.inner.state);
            let Some(record) = state.requests.get_mut(&frame.request_id) else {
                debug!(request_id = %frame.request_id, "request:continue for unknown request ignored");
                return Ok(());
            };
            record.pending_continue.take()
        };

        let Some(sender) = sender else {
            return Err(ProtocolMisuse::DoubleContinuation {
                request_id: frame.request_id,
            }
            .into());
        };
        if sender.send(frame).is_err() {
            warn!("request:continue arrived after the traffic side stopped waiting");
        }
        Ok(())
    }

    fn resume_response(&self, frame: ResponseContinueFrame) -> Result<()> {
        let sender = {
            let mut state = lock(&self.inner.state);
            let Some(record) = state.requests.get_mut(&frame.request_id) else {
                debug!(request_id = %frame.request_id, "response:continue for unknown request ignored");
                return Ok(());
            };
            record.pending_response.take()
        };

        let Some(sender) = sender else {
            return Err(ProtocolMisuse::DoubleContinuation {
                request_id: frame.request_id,
            }
            .into());
        };
        if sender.send(frame).is_err() {
            warn!("response:continue arrived after the traffic side stopped waiting");
        }
        Ok(())
    }

    fn subscribe(&self, frame: SubscribeFrame) {
        let mut state = lock(&self.inner.state);
        match state.requests.get_mut(&frame.request_id) {
            Some(record) => record.subscriptions.push(frame.subscription),
            None => debug!(request_id = %frame.request_id, "subscribe for unknown request ignored"),
        }
    }

    /// Apply one frame from the handler side.
    pub async fn on_net_event(&self, event: NetEvent) -> Result<()> {
        match event {
            NetEvent::CreateRoute(frame) => self.create_route(frame).await,
            NetEvent::SetRouteDisabled(frame) => {
                self.set_route_disabled(&frame.handler_id, frame.disabled);
                Ok(())
            }
            NetEvent::RequestContinue(frame) => self.resume_request(frame),
            NetEvent::ResponseContinue(frame) => self.resume_response(frame),
            NetEvent::Subscribe(frame) => {
                self.subscribe(frame);
                Ok(())
            }
            NetEvent::RequestReceived(_) | NetEvent::ResponseReceived(_) => {
                Err(NetStubError::UnrecognizedEvent {
                    event: event.name().to_owned(),
                })
            }
        }
    }

    /// Dispatch frames until the channel closes. Stops with an error on an
    /// event this side does not consume.
    pub async fn run(&self, mut receiver: EventReceiver) -> Result<()> {
        while let Some(envelope) = receiver.recv().await {
            let (frame, acknowledger) = envelope.into_parts();
            let event = frame.event.clone();
            debug!(event = %event, "registry received net event");

            let result = match NetEvent::from_raw(frame) {
                Ok(decoded) => self.on_net_event(decoded).await,
                Err(err) => Err(err),
            };

            match result {
                Err(err) if err.is_channel_fatal() => {
                    error!(event = %event, error = %err, "stopping registry dispatch loop");
                    // the waiter gets its own copy; `err` stops the loop
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
