//! Response leg of the handler side.

use crate::driver::controller::Shared;
use crate::driver::interception::SharedInterception;
use crate::driver::latch::ContinuationLatch;
use crate::error::{NetStubError, ProtocolMisuse, Result};
use crate::events::frames::{ResponseContinueFrame, ResponseReceivedFrame};
use crate::events::NetEvent;
use crate::sync::lock;
use crate::types::interception::InterceptionState;
use crate::types::request::{
    flatten_body, parse_json_body, set_header, Headers, RequestData, ResponseData,
};
use crate::types::static_response::{BackendStaticResponse, StaticResponse};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

struct ResponseView {
    shared: Arc<Shared>,
    interception: SharedInterception,
    request_id: String,
    data: Mutex<ResponseData>,
    /// Wire form of the body as received
    received_body: Option<Value>,
    body_replaced: AtomicBool,
    send_called: AtomicBool,
    resolved: AtomicBool,
    latch: ContinuationLatch,
}

/// Mutable response handed to response handlers. Clones share the same response.
#[derive(Clone)]
pub struct IncomingHttpResponse {
    view: Arc<ResponseView>,
}

impl IncomingHttpResponse {
    pub(crate) fn new(
        shared: Arc<Shared>,
        interception: SharedInterception,
        request_id: String,
        mut data: ResponseData,
    ) -> Self {
        let received_body = data.body.clone();
        parse_json_body(&data.headers, &mut data.body);
        Self {
            view: Arc::new(ResponseView {
                shared,
                interception,
                request_id,
                data: Mutex::new(data),
                received_body,
                body_replaced: AtomicBool::new(false),
                send_called: AtomicBool::new(false),
                resolved: AtomicBool::new(false),
                latch: ContinuationLatch::new(),
            }),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.view.request_id
    }

    /// The request as it was sent to the origin.
    pub fn request(&self) -> RequestData {
        lock(&self.view.interception).request.clone()
    }

    pub fn data(&self) -> ResponseData {
        lock(&self.view.data).clone()
    }

    pub fn status_code(&self) -> u16 {
        lock(&self.view.data).status_code
    }

    pub fn set_status_code(&self, status_code: u16) {
        lock(&self.view.data).status_code = status_code;
    }

    pub fn status_message(&self) -> Option<String> {
        lock(&self.view.data).status_message.clone()
    }

    pub fn set_status_message(&self, message: impl Into<String>) {
        lock(&self.view.data).status_message = Some(message.into());
    }

    pub fn headers(&self) -> Headers {
        lock(&self.view.data).headers.clone()
    }

    pub fn header(&self, name: &str) -> Option<String> {
        lock(&self.view.data).header(name).map(str::to_owned)
    }

    pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) {
        let mut data = lock(&self.view.data);
        set_header(&mut data.headers, name, value);
    }

    pub fn body(&self) -> Option<Value> {
        lock(&self.view.data).body.clone()
    }

    pub fn set_body(&self, body: impl Into<Value>) {
        lock(&self.view.data).body = Some(body.into());
        self.view.body_replaced.store(true, Ordering::Release);
    }

    /// Hold the response for `delay_ms` before delivering it.
    pub fn set_delay(&self, delay_ms: u64) {
        lock(&self.view.data).delay_ms = Some(delay_ms);
    }

    /// Limit delivery to `kbps` kilobits per second.
    pub fn set_throttle(&self, kbps: f64) {
        lock(&self.view.data).throttle_kbps = Some(kbps);
    }

    /// Finish the response leg now, optionally overriding parts of the
    /// response. Later handlers for this response do not run.
    pub fn send(&self, static_response: Option<StaticResponse>) -> Result<()> {
        if self.view.resolved.load(Ordering::Acquire) {
            return Err(ProtocolMisuse::SendCalledAfterResolved.into());
        }
        if self.view.send_called.swap(true, Ordering::AcqRel) {
            return Err(ProtocolMisuse::MultipleSendCalls.into());
        }

        match static_response {
            Some(static_response) => {
                static_response.validate("res.send")?;
                self.send_continue_frame(Some(static_response.to_backend()))
            }
            None => self.send_continue_frame(None),
        }
    }

    pub fn continuation_sent(&self) -> bool {
        self.view.latch.has_fired()
    }

    pub(crate) fn mark_resolved(&self) {
        self.view.resolved.store(true, Ordering::Release);
    }

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
        lock(&self.view.interception).response = Some(data.clone());

        self.view
            .shared
            .emitter
            .emit(&NetEvent::ResponseContinue(ResponseContinueFrame {
                request_id: self.view.request_id.clone(),
                data,
                static_response,
            }))?;

        let mut interception = lock(&self.view.interception);
        interception.advance(InterceptionState::ResponseIntercepted);
        interception.advance(InterceptionState::Complete);
        debug!(request_id = %self.view.request_id, "response continued");
        Ok(())
    }
}

/// Run the response leg for one `response:received` frame.
pub(crate) async fn on_response_received(
    shared: Arc<Shared>,
    frame: ResponseReceivedFrame,
) -> Result<()> {
    let ResponseReceivedFrame {
        route_handler_id,
        request_id,
        data,
    } = frame;

    let Some(interception) = shared.interception(&request_id) else {
        debug!(request_id = %request_id, "response for unknown request continued unchanged");
        return shared.emitter.emit(&NetEvent::ResponseContinue(ResponseContinueFrame {
            request_id,
            data,
            static_response: None,
        }));
    };

    let handlers = {
        let mut record = lock(&interception);
        record.response = Some(data.clone());
        record.advance(InterceptionState::ResponseReceived);
        record.response_handlers()
    };
    let matcher = shared
        .route_handler(&route_handler_id)
        .map(|(_, matcher)| matcher)
        .unwrap_or_default();

    let res = IncomingHttpResponse::new(
        Arc::clone(&shared),
        Arc::clone(&interception),
        request_id.clone(),
        data,
    );

    let captured_test = shared.active_test.capture();
    let timeout = shared.config.default_command_timeout();
    let mut failure = None;

    for handler in handlers {
        if res.continuation_sent() {
            break;
        }
        match tokio::time::timeout(timeout, handler(res.clone())).await {
            Ok(Ok(())) => {}
            Ok(Err(source)) => {
                failure = Some(NetStubError::HandlerRuntime {
                    handler_id: route_handler_id.clone(),
                    request: Box::new(res.request()),
                    route: Box::new(matcher.clone()),
                    source,
                });
                break;
            }
            Err(_) if !shared.active_test.is_current(captured_test) => {
                warn!(
                    handler_id = %route_handler_id,
                    request_id = %request_id,
                    "response handler timed out after its test finished; ignoring"
                );
                break;
            }
            Err(_) => {
                failure = Some(NetStubError::HandlerTimeout {
                    handler_id: route_handler_id.clone(),
                    timeout_ms: shared.config.default_command_timeout_ms,
                    request: Box::new(res.request()),
                    route: Box::new(matcher.clone()),
                });
                break;
            }
        }
    }
    res.mark_resolved();

    if failure.is_some() {
        lock(&interception).advance(InterceptionState::Errored);
    }
    if !res.continuation_sent() {
        match res.send_continue_frame(None) {
            Ok(()) => {}
            // a late send won the latch
            Err(NetStubError::ProtocolMisuse(ProtocolMisuse::DoubleContinuation { .. })) => {}
            Err(err) => return Err(err),
        }
    }

    if let Some(err) = failure {
        shared.fail(err);
    }
    shared.untrack_interception(&request_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::EngineConfig;
    use crate::driver::context::TestId;
    use crate::driver::controller::{CommandFailures, InterceptController};
    use crate::driver::handler::{
        request_handler, response_handler, Reply, ResponseHandler, RouteHandler,
    };
    use crate::driver::harness::{
        bare_controller, next_event, received, register, request_id, settle, start, Harness,
    };
    use crate::events::ChannelEnd;
    use crate::types::interception::SubscriptionEvent;
    use rstest::rstest;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::{mpsc, Notify};

    /// Route that installs `handler` on the response and returns the id of
    /// one forwarded request.
    async fn forwarded(h: &Harness, handler: ResponseHandler) -> String {
        h.route(
            "GET",
            "/api/*",
            RouteHandler::Function(request_handler(move |req| {
                let handler = Arc::clone(&handler);
                async move {
                    req.reply(Reply::Handler(handler))?;
                    anyhow::Ok(())
                }
            })),
        )
        .await;
        let outcome = h.send(RequestData::new("GET", "http://localhost/api/users")).await;
        request_id(&outcome)
    }

    #[rstest]
    #[tokio::test]
    async fn test_handler_edits_reach_the_browser() {
        let h = start(EngineConfig::default());
        let request_id = forwarded(
            &h,
            response_handler(|res| async move {
                assert_eq!(res.body(), Some(json!({"count": 1})));
                assert_eq!(res.request().url, "http://localhost/api/users");
                res.set_status_code(503);
                res.set_status_message("Service Unavailable");
                res.set_header("retry-after", "5");
                res.set_header("content-type", "application/problem+json");
                res.set_body(json!({"count": 2}));
                res.set_delay(250);
                anyhow::Ok(())
            }),
        )
        .await;

        let origin = ResponseData::new(200)
            .with_header("Content-Type", "application/json")
            .with_body("{\"count\":1}");
        let response = h
            .registry
            .intercept_response(&request_id, origin)
            .await
            .expect("Should deliver response");

        assert_eq!(response.status_code, 503);
        assert_eq!(response.status_message.as_deref(), Some("Service Unavailable"));
        assert_eq!(response.header("retry-after"), Some("5"));
        assert_eq!(response.headers.len(), 2);
        assert_eq!(response.header("content-type"), Some("application/problem+json"));
        assert_eq!(response.body, Some(json!("{\"count\":2}")));
        assert_eq!(response.delay_ms, Some(250));
    }

    #[rstest]
    #[tokio::test]
    async fn test_send_overrides_with_static_response() {
        let h = start(EngineConfig::default());
        let request_id = forwarded(
            &h,
            response_handler(|res| async move {
                res.send(Some(StaticResponse::status(201).with_body("patched")))?;
                anyhow::Ok(())
            }),
        )
        .await;

        let response = h
            .registry
            .intercept_response(&request_id, ResponseData::new(200).with_body("origin"))
            .await
            .expect("Should deliver response");
        assert_eq!(response.status_code, 201);
        assert_eq!(response.body, Some(json!("patched")));

        settle(|| {
            h.controller.interception(&request_id).map(|s| s.state)
                == Some(InterceptionState::Complete)
        })
        .await;
    }

    #[rstest]
    #[tokio::test]
    async fn test_send_skips_later_handlers() {
        let h = start(EngineConfig::default());
        let later_runs = Arc::new(AtomicUsize::new(0));
        h.route(
            "GET",
            "/api/*",
            RouteHandler::Function(request_handler({
                let later_runs = Arc::clone(&later_runs);
                move |req| {
                    let later_runs = Arc::clone(&later_runs);
                    async move {
                        req.on(
                            SubscriptionEvent::Response,
                            response_handler(|res| async move {
                                res.send(None)?;
                                anyhow::Ok(())
                            }),
                        )?;
                        req.on(
                            SubscriptionEvent::Response,
                            response_handler(move |_res| {
                                let later_runs = Arc::clone(&later_runs);
                                async move {
                                    later_runs.fetch_add(1, Ordering::SeqCst);
                                    anyhow::Ok(())
                                }
                            }),
                        )?;
                        anyhow::Ok(())
                    }
                }
            })),
        )
        .await;

        let outcome = h.send(RequestData::new("GET", "http://localhost/api/users")).await;
        let request_id = request_id(&outcome);
        assert_eq!(h.registry.subscriptions(&request_id).len(), 2);

        h.registry
            .intercept_response(&request_id, ResponseData::new(200))
            .await
            .expect("Should deliver response");
        settle(|| h.controller.live_interception_count() == 0).await;
        assert_eq!(later_runs.load(Ordering::SeqCst), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn test_second_send_is_rejected() {
        let h = start(EngineConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let request_id = forwarded(
            &h,
            response_handler(move |res| {
                let tx = tx.clone();
                async move {
                    res.send(None)?;
                    let _ = tx.send(res.send(None));
                    anyhow::Ok(())
                }
            }),
        )
        .await;

        h.registry
            .intercept_response(&request_id, ResponseData::new(200))
            .await
            .expect("Should deliver response");
        let second = rx.recv().await.expect("Should report the second send");
        assert!(matches!(
            second,
            Err(NetStubError::ProtocolMisuse(ProtocolMisuse::MultipleSendCalls))
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn test_send_after_handler_resolved_is_rejected() {
        let h = start(EngineConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let go = Arc::new(Notify::new());
        let request_id = forwarded(
            &h,
            response_handler({
                let go = Arc::clone(&go);
                move |res| {
                    let tx = tx.clone();
                    let go = Arc::clone(&go);
                    async move {
                        tokio::spawn(async move {
                            go.notified().await;
                            let _ = tx.send(res.send(None));
                        });
                        anyhow::Ok(())
                    }
                }
            }),
        )
        .await;

        let response = h
            .registry
            .intercept_response(&request_id, ResponseData::new(200).with_body("origin"))
            .await
            .expect("Should deliver response");
        assert_eq!(response.body, Some(json!("origin")));

        go.notify_one();
        let late = rx.recv().await.expect("Should report the late send");
        assert!(matches!(
            late,
            Err(NetStubError::ProtocolMisuse(ProtocolMisuse::SendCalledAfterResolved))
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn test_failing_handler_still_delivers_response() {
        let mut h = start(EngineConfig::default());
        let request_id = forwarded(
            &h,
            response_handler(|res| async move {
                res.set_header("x-partial", "1");
                Err::<(), _>(anyhow::anyhow!("unexpected payload"))
            }),
        )
        .await;

        let response = h
            .registry
            .intercept_response(&request_id, ResponseData::new(200))
            .await
            .expect("Should deliver response");
        assert_eq!(response.header("x-partial"), Some("1"));

        let failure = h.failures.next().await.expect("Should fail the command");
        assert!(matches!(failure, NetStubError::HandlerRuntime { .. }));
        settle(|| {
            h.controller.interception(&request_id).map(|s| s.state)
                == Some(InterceptionState::Errored)
        })
        .await;
    }

    #[rstest]
    #[tokio::test]
    async fn test_untouched_json_body_is_delivered_verbatim() {
        let h = start(EngineConfig::default());
        let request_id = forwarded(
            &h,
            response_handler(|res| async move {
                assert!(res.body().is_some_and(|body| body.is_object()));
                res.set_header("x-seen", "yes");
                anyhow::Ok(())
            }),
        )
        .await;

        let body = "{\"b\":1,\"a\":12345678901234567890123}";
        let response = h
            .registry
            .intercept_response(
                &request_id,
                ResponseData::new(200)
                    .with_header("content-type", "application/json")
                    .with_body(body),
            )
            .await
            .expect("Should deliver response");
        assert_eq!(response.body, Some(json!(body)));
        assert_eq!(response.header("x-seen"), Some("yes"));
    }

    /// Catch-all route whose response handler is `handler`, driven by hand up
    /// to the `response:received` frame.
    async fn slow_response_leg(
        timeout_ms: u64,
        handler: ResponseHandler,
    ) -> (InterceptController, CommandFailures, ChannelEnd, String) {
        let (controller, failures, mut traffic) = bare_controller(EngineConfig {
            default_command_timeout_ms: timeout_ms,
            ..EngineConfig::default()
        });
        controller.set_active_test(Some(TestId::from("loads users")));
        let handler_id = register(
            &controller,
            &mut traffic,
            RouteHandler::Function(request_handler(move |req| {
                let handler = Arc::clone(&handler);
                async move {
                    req.reply(Reply::Handler(handler))?;
                    anyhow::Ok(())
                }
            })),
        )
        .await;

        traffic
            .emitter
            .emit(&received(&handler_id, RequestData::new("GET", "http://localhost/api/users")))
            .expect("Should emit");
        assert!(matches!(next_event(&mut traffic).await, NetEvent::Subscribe(_)));
        assert!(matches!(next_event(&mut traffic).await, NetEvent::RequestContinue(_)));

        traffic
            .emitter
            .emit(&NetEvent::ResponseReceived(ResponseReceivedFrame {
                route_handler_id: handler_id.clone(),
                request_id: "interceptedRequest1".to_string(),
                data: ResponseData::new(200).with_body("origin"),
            }))
            .expect("Should emit");
        (controller, failures, traffic, handler_id)
    }

    fn sleeping_handler() -> ResponseHandler {
        response_handler(|_res| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            anyhow::Ok(())
        })
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_response_handler_timeout_fails_the_command() {
        let (controller, mut failures, mut traffic, handler_id) =
            slow_response_leg(100, sleeping_handler()).await;

        let NetEvent::ResponseContinue(frame) = next_event(&mut traffic).await else {
            panic!("Expected response:continue");
        };
        assert_eq!(frame.request_id, "interceptedRequest1");
        assert_eq!(frame.data.body, Some(json!("origin")));
        assert!(frame.static_response.is_none());

        let failure = failures.next().await.expect("Should fail the command");
        let NetStubError::HandlerTimeout {
            handler_id: failed,
            timeout_ms,
            ..
        } = failure
        else {
            panic!("Expected a timeout, got {failure}");
        };
        assert_eq!(failed, handler_id);
        assert_eq!(timeout_ms, 100);

        settle(|| controller.live_interception_count() == 0).await;
        assert!(traffic.receiver.try_recv().is_none());
        assert_eq!(
            controller.interception("interceptedRequest1").map(|s| s.state),
            Some(InterceptionState::Errored)
        );
    }

    #[rstest]
    #[case("loads posts")]
    #[case("loads users")]
    #[tokio::test(start_paused = true)]
    async fn test_response_timeout_after_test_changed_is_ignored(#[case] next_test: &'static str) {
        let active = Arc::new(Mutex::new(None::<InterceptController>));
        let handler = response_handler({
            let active = Arc::clone(&active);
            move |_res| {
                let controller = lock(&active).clone();
                async move {
                    if let Some(controller) = controller {
                        controller.set_active_test(Some(TestId::from(next_test)));
                    }
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    anyhow::Ok(())
                }
            }
        });
        let (controller, mut failures, mut traffic, _) = slow_response_leg(100, handler).await;
        *lock(&active) = Some(controller.clone());

        assert!(matches!(
            next_event(&mut traffic).await,
            NetEvent::ResponseContinue(_)
        ));
        settle(|| controller.live_interception_count() == 0).await;
        assert!(failures.try_next().is_none());
        assert!(traffic.receiver.try_recv().is_none());
        assert_eq!(
            controller.interception("interceptedRequest1").map(|s| s.state),
            Some(InterceptionState::Complete)
        );
    }
}
