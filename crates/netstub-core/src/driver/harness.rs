//! Both sides of the engine wired over a real channel, for driver tests.

use crate::config::settings::EngineConfig;
use crate::driver::controller::{CommandFailures, InterceptController};
use crate::driver::handler::RouteHandler;
use crate::events::frames::{RequestReceivedFrame, CREATE_ROUTE};
use crate::events::{pair, ChannelEnd, NetEvent};
use crate::registry::{RequestOutcome, RouteRegistry};
use crate::resolver::FixtureResolver;
use crate::types::matcher::RouteMatcher;
use crate::types::request::RequestData;
use std::sync::Arc;

pub(crate) struct Harness {
    pub registry: RouteRegistry,
    pub controller: InterceptController,
    pub failures: CommandFailures,
}

pub(crate) fn start(config: EngineConfig) -> Harness {
    let (traffic, handler) = pair();
    let registry = RouteRegistry::new(
        Arc::new(FixtureResolver::from_config(&config)),
        traffic.emitter,
    );
    let (controller, failures) = InterceptController::new(config, handler.emitter);

    let traffic_receiver = traffic.receiver;
    let handler_receiver = handler.receiver;
    tokio::spawn({
        let registry = registry.clone();
        async move { registry.run(traffic_receiver).await }
    });
    tokio::spawn({
        let controller = controller.clone();
        async move { controller.run(handler_receiver).await }
    });

    Harness {
        registry,
        controller,
        failures,
    }
}

impl Harness {
    pub async fn route(&self, method: &str, url: &str, handler: RouteHandler) -> String {
        self.controller
            .intercept(RouteMatcher::method_and_path(method, url), handler)
            .await
            .expect("Should register route")
    }

    pub async fn send(&self, request: RequestData) -> RequestOutcome {
        self.registry
            .intercept_request(request)
            .await
            .expect("Should intercept request")
    }
}

/// Controller driven by a hand-written traffic side.
pub(crate) fn bare_controller(
    config: EngineConfig,
) -> (InterceptController, CommandFailures, ChannelEnd) {
    let (traffic, handler) = pair();
    let (controller, failures) = InterceptController::new(config, handler.emitter);
    tokio::spawn({
        let controller = controller.clone();
        let receiver = handler.receiver;
        async move { controller.run(receiver).await }
    });
    (controller, failures, traffic)
}

/// Register a catch-all route, acknowledging `create:route` by hand.
pub(crate) async fn register(
    controller: &InterceptController,
    traffic: &mut ChannelEnd,
    handler: RouteHandler,
) -> String {
    let pending = tokio::spawn({
        let controller = controller.clone();
        async move { controller.intercept(RouteMatcher::default(), handler).await }
    });
    let create = traffic.receiver.recv().await.expect("Should receive create:route");
    assert_eq!(create.frame.event, CREATE_ROUTE);
    let (_, acknowledger) = create.into_parts();
    acknowledger.ack(Ok(())).expect("Should ack");
    pending
        .await
        .expect("Should join")
        .expect("Should register route")
}

pub(crate) fn received(handler_id: &str, data: RequestData) -> NetEvent {
    NetEvent::RequestReceived(RequestReceivedFrame {
        route_handler_id: handler_id.to_string(),
        request_id: "interceptedRequest1".to_string(),
        data,
    })
}

/// Next frame from the handler side, decoded.
pub(crate) async fn next_event(traffic: &mut ChannelEnd) -> NetEvent {
    let envelope = traffic.receiver.recv().await.expect("Should receive a frame");
    NetEvent::from_raw(envelope.frame).expect("Should decode")
}

pub(crate) fn request_id(outcome: &RequestOutcome) -> String {
    match outcome {
        RequestOutcome::Forward { request_id, .. } | RequestOutcome::Stub { request_id, .. } => {
            request_id.clone()
        }
        RequestOutcome::Passthrough(_) => panic!("Expected a matched request"),
    }
}

/// Yield until `check` holds; the spawned legs finish their bookkeeping after
/// the frame the traffic side waits on.
pub(crate) async fn settle(check: impl Fn() -> bool) {
    for _ in 0..1000 {
        if check() {
            return;
        }
        tokio::task::yield_now().await;
    }
    assert!(check(), "condition never held");
}
