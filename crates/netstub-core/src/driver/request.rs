//! Request leg of the handler side.
//!
//! [`IncomingHttpRequest`] is the mutable view a request handler receives.
//! Only the fields of [`RequestData`] are copied back at continuation time;
//! the alias and extra properties stay on the view. A body the handler did not
//! replace is sent back exactly as it was received.

use crate::driver::controller::Shared;
use crate::driver::handler::{Reply, ResponseHandler};
use crate::driver::interception::{Interception, SharedInterception, SubscriptionEntry};
use crate::driver::latch::ContinuationLatch;
use crate::error::{NetStubError, ProtocolMisuse, Result};
use crate::events::frames::{RequestContinueFrame, RequestReceivedFrame, SubscribeFrame};
use crate::events::NetEvent;
use crate::sync::lock;
use crate::types::interception::{InterceptionState, Subscription, SubscriptionEvent};
use crate::types::request::{flatten_body, parse_json_body, set_header, Headers, RequestData};
use crate::types::static_response::{BackendStaticResponse, StaticResponse};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

struct RequestEnvelope {
    data: RequestData,
    alias: Option<String>,
    extras: HashMap<String, Value>,
}

struct RequestView {
    shared: Arc<Shared>,
    interception: SharedInterception,
    request_id: String,
    route_handler_id: String,
    envelope: Mutex<RequestEnvelope>,
    /// Wire form of the body as received
    received_body: Option<Value>,
    body_replaced: AtomicBool,
    reply_called: AtomicBool,
    resolved: AtomicBool,
    latch: ContinuationLatch,
}

/// Mutable request handed to a request handler. Clones share the same request.
#[derive(Clone)]
pub struct IncomingHttpRequest {
    view: Arc<RequestView>,
}

impl IncomingHttpRequest {
    pub(crate) fn new(
        shared: Arc<Shared>,
        interception: SharedInterception,
        request_id: String,
        route_handler_id: String,
        mut data: RequestData,
    ) -> Self {
        let received_body = data.body.clone();
        parse_json_body(&data.headers, &mut data.body);
        Self {
            view: Arc::new(RequestView {
                shared,
                interception,
                request_id,
                route_handler_id,
                envelope: Mutex::new(RequestEnvelope {
                    data,
                    alias: None,
                    extras: HashMap::new(),
                }),
                received_body,
                body_replaced: AtomicBool::new(false),
                reply_called: AtomicBool::new(false),
                resolved: AtomicBool::new(false),
                latch: ContinuationLatch::new(),
            }),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.view.request_id
    }

    pub fn route_handler_id(&self) -> &str {
        &self.view.route_handler_id
    }

    /// Copy of the serializable request fields.
    pub fn data(&self) -> RequestData {
        lock(&self.view.envelope).data.clone()
    }

    pub fn method(&self) -> String {
        lock(&self.view.envelope).data.method.clone()
    }

    pub fn set_method(&self, method: impl Into<String>) {
        lock(&self.view.envelope).data.method = method.into();
    }

    pub fn url(&self) -> String {
        lock(&self.view.envelope).data.url.clone()
    }

    pub fn set_url(&self, url: impl Into<String>) {
        lock(&self.view.envelope).data.url = url.into();
    }

    pub fn headers(&self) -> Headers {
        lock(&self.view.envelope).data.headers.clone()
    }

    pub fn header(&self, name: &str) -> Option<String> {
        lock(&self.view.envelope).data.header(name).map(str::to_owned)
    }

    pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) {
        let mut envelope = lock(&self.view.envelope);
        set_header(&mut envelope.data.headers, name, value);
    }

    pub fn remove_header(&self, name: &str) {
        lock(&self.view.envelope)
            .data
            .headers
            .retain(|k, _| !k.eq_ignore_ascii_case(name));
    }

    /// Body as received; JSON requests arrive parsed.
    pub fn body(&self) -> Option<Value> {
        lock(&self.view.envelope).data.body.clone()
    }

    pub fn set_body(&self, body: impl Into<Value>) {
        lock(&self.view.envelope).data.body = Some(body.into());
        self.view.body_replaced.store(true, Ordering::Release);
    }

    pub fn follow_redirect(&self) -> Option<bool> {
        lock(&self.view.envelope).data.follow_redirect
    }

    pub fn set_follow_redirect(&self, follow: bool) {
        lock(&self.view.envelope).data.follow_redirect = Some(follow);
    }

    pub fn response_timeout(&self) -> Option<u64> {
        lock(&self.view.envelope).data.response_timeout
    }

    pub fn set_response_timeout(&self, timeout_ms: u64) {
        lock(&self.view.envelope).data.response_timeout = Some(timeout_ms);
    }

    pub fn alias(&self) -> Option<String> {
        lock(&self.view.envelope).alias.clone()
    }

    /// Name this request for later lookup with `find_by_alias`.
    pub fn set_alias(&self, alias: impl Into<String>) {
        lock(&self.view.envelope).alias = Some(alias.into());
    }

    pub(crate) fn take_alias(&self) -> Option<String> {
        lock(&self.view.envelope).alias.take()
    }

    /// Arbitrary handler-local property. Never sent to the traffic side.
    pub fn extra(&self, key: &str) -> Option<Value> {
        lock(&self.view.envelope).extras.get(key).cloned()
    }

    pub fn set_extra(&self, key: impl Into<String>, value: impl Into<Value>) {
        lock(&self.view.envelope)
            .extras
            .insert(key.into(), value.into());
    }

    /// Register `handler` for a future event of this request.
    pub fn on(&self, event: SubscriptionEvent, handler: ResponseHandler) -> Result<()> {
        let subscription = Subscription {
            id: self.view.shared.next_subscription_id(),
            route_handler_id: self.view.route_handler_id.clone(),
            event_name: event,
            await_continue: true,
        };
        lock(&self.view.interception)
            .subscriptions
            .push(SubscriptionEntry {
                subscription: subscription.clone(),
                handler,
            });

        self.view
            .shared
            .emitter
            .emit(&NetEvent::Subscribe(SubscribeFrame {
                route_handler_id: self.view.route_handler_id.clone(),
                request_id: self.view.request_id.clone(),
                subscription,
            }))
    }

    /// Finish the request leg. Fails after the handler has resolved or when
    /// called a second time.
    pub fn reply(&self, reply: Reply) -> Result<()> {
        if self.view.resolved.load(Ordering::Acquire) {
            return Err(ProtocolMisuse::ReplyCalledAfterResolved.into());
        }
        if self.view.reply_called.swap(true, Ordering::AcqRel) {
            return Err(ProtocolMisuse::MultipleReplyCalls.into());
        }

        match reply {
            Reply::Continue => self.send_continue_frame(None),
            Reply::Handler(handler) => {
                lock(&self.view.interception).response_handler = Some(Arc::clone(&handler));
                self.on(SubscriptionEvent::Response, handler)?;
                {
                    let mut envelope = lock(&self.view.envelope);
                    if envelope.data.response_timeout.is_none() {
                        envelope.data.response_timeout =
                            Some(self.view.shared.config.response_timeout_ms);
                    }
                }
                self.send_continue_frame(None)
            }
            shorthand => match shorthand.into_static_response() {
                Some(static_response) => {
                    static_response.validate("req.reply")?;
                    self.send_continue_frame(Some(static_response.to_backend()))
                }
                None => self.send_continue_frame(None),
            },
        }
    }

    /// Reply with a `location` header and `status_code`.
    pub fn redirect(&self, location: impl Into<String>, status_code: u16) -> Result<()> {
        self.reply(Reply::Static(
            StaticResponse::status(status_code).with_header("location", location),
        ))
    }

    /// Reply with a network error.
    pub fn destroy(&self) -> Result<()> {
        self.reply(Reply::Static(StaticResponse::network_error()))
    }

    pub fn continuation_sent(&self) -> bool {
        self.view.latch.has_fired()
    }

    pub(crate) fn mark_resolved(&self) {
        self.view.resolved.store(true, Ordering::Release);
    }

    /// Copy the allow-listed fields onto the record and emit `request:continue`.
    pub(crate) fn send_continue_frame(
        &self,
        static_response: Option<BackendStaticResponse>,
    ) -> Result<()> {
        if !self.view.latch.try_fire() {
            return Err(ProtocolMisuse::DoubleContinuation {
                request_id: self.view.request_id.clone(),
            }
            .into());
        }

        let mut data = self.data();
        if self.view.body_replaced.load(Ordering::Acquire) {
            flatten_body(&mut data.body);
        } else {
            data.body = self.view.received_body.clone();
        }

        let has_response_handler = {
            let mut interception = lock(&self.view.interception);
            interception.request = data.clone();
            static_response.is_none() && interception.has_response_handler()
        };
        let stubbed = static_response.is_some();

        self.view
            .shared
            .emitter
            .emit(&NetEvent::RequestContinue(RequestContinueFrame {
                route_handler_id: self.view.route_handler_id.clone(),
                request_id: self.view.request_id.clone(),
                data,
                has_response_handler,
                static_response,
            }))?;

        let mut interception = lock(&self.view.interception);
        interception.advance(InterceptionState::Intercepted);
        if stubbed || !has_response_handler {
            interception.advance(InterceptionState::Complete);
        }
        debug!(
            request_id = %self.view.request_id,
            has_response_handler,
            stubbed,
            "request continued"
        );
        Ok(())
    }
}

/// Run the request leg for one `request:received` frame.
pub(crate) async fn on_request_received(
    shared: Arc<Shared>,
    frame: RequestReceivedFrame,
) -> Result<()> {
    let RequestReceivedFrame {
        route_handler_id,
        request_id,
        data,
    } = frame;

    let Some((handler, matcher)) = shared.route_handler(&route_handler_id) else {
        debug!(
            handler_id = %route_handler_id,
            request_id = %request_id,
            "request for unknown route continued unchanged"
        );
        return shared.emitter.emit(&NetEvent::RequestContinue(RequestContinueFrame {
            route_handler_id,
            request_id,
            data,
            has_response_handler: false,
            static_response: None,
        }));
    };

    let interception: SharedInterception = Arc::new(Mutex::new(Interception::new(
        request_id.clone(),
        route_handler_id.clone(),
        data.clone(),
    )));
    shared.record_route_request(&route_handler_id, Arc::clone(&interception));

    let Some(handler) = handler else {
        lock(&interception).advance(InterceptionState::Complete);
        debug!(handler_id = %route_handler_id, request_id = %request_id, "notification only");
        return Ok(());
    };

    shared.track_interception(&request_id, Arc::clone(&interception));
    let req = IncomingHttpRequest::new(
        Arc::clone(&shared),
        Arc::clone(&interception),
        request_id.clone(),
        route_handler_id.clone(),
        data,
    );

    let captured_test = shared.active_test.capture();
    let timeout = shared.config.default_command_timeout();
    let outcome = tokio::time::timeout(timeout, handler(req.clone())).await;
    req.mark_resolved();

    let failure = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(source)) => Some(NetStubError::HandlerRuntime {
            handler_id: route_handler_id.clone(),
            request: Box::new(req.data()),
            route: Box::new(matcher),
            source,
        }),
        Err(_) if !shared.active_test.is_current(captured_test) => {
            warn!(
                handler_id = %route_handler_id,
                request_id = %request_id,
                "request handler timed out after its test finished; ignoring"
            );
            None
        }
        Err(_) => Some(NetStubError::HandlerTimeout {
            handler_id: route_handler_id.clone(),
            timeout_ms: shared.config.default_command_timeout_ms,
            request: Box::new(req.data()),
            route: Box::new(matcher),
        }),
    };

    if let Some(alias) = req.take_alias() {
        shared.aliases.record(alias, Arc::clone(&interception));
    }

    if failure.is_some() {
        lock(&interception).advance(InterceptionState::Errored);
    }
    if !req.continuation_sent() {
        match req.send_continue_frame(None) {
            Ok(()) => {}
            // a late reply won the latch
            Err(NetStubError::ProtocolMisuse(ProtocolMisuse::DoubleContinuation { .. })) => {}
            Err(err) => return Err(err),
        }
    }

    if let Some(err) = failure {
        shared.fail(err);
    }
    if lock(&interception).state().is_terminal() {
        shared.untrack_interception(&request_id);
    }
    Ok(())
}
