//! In-process bidirectional event channel.
//!
//! Delivery is reliable and ordered in each direction. A frame can carry an
//! acknowledgement slot that the receiving side resolves once it has processed
//! the frame.

use crate::error::NetStubError;
use crate::events::frames::{NetEvent, RawFrame};
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

pub type AckResult = Result<(), NetStubError>;

/// A frame in flight, with its optional acknowledgement slot.
#[derive(Debug)]
pub struct Envelope {
    pub frame: RawFrame,
    ack: Option<oneshot::Sender<AckResult>>,
}

impl Envelope {
    pub fn wants_ack(&self) -> bool {
        self.ack.is_some()
    }

    /// Split into the frame and a closure that resolves the acknowledgement.
    pub fn into_parts(self) -> (RawFrame, Acknowledger) {
        (self.frame, Acknowledger(self.ack))
    }
}

/// Resolves the acknowledgement of one frame. Dropping it without calling
/// [`Acknowledger::ack`] makes the emitter observe a closed channel.
#[derive(Debug)]
pub struct Acknowledger(Option<oneshot::Sender<AckResult>>);

impl Acknowledger {
    /// Hand `result` back to the emitter; returns it unchanged when nobody waits.
    pub fn ack(self, result: AckResult) -> AckResult {
        match self.0 {
            Some(tx) => {
                // emitter may have given up waiting
                let _ = tx.send(result);
                Ok(())
            }
            None => result,
        }
    }
}

/// Sending half of one direction.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl EventEmitter {
    pub fn emit(&self, event: &NetEvent) -> Result<(), NetStubError> {
        self.emit_raw(event.to_raw()?)
    }

    pub fn emit_raw(&self, frame: RawFrame) -> Result<(), NetStubError> {
        trace!(event = %frame.event, "emitting net event");
        self.tx
            .send(Envelope { frame, ack: None })
            .map_err(|_| NetStubError::ChannelClosed)
    }

    /// Emit and wait until the other side has processed the frame.
    pub async fn emit_with_ack(&self, event: &NetEvent) -> Result<(), NetStubError> {
        let frame = event.to_raw()?;
        let (ack_tx, ack_rx) = oneshot::channel();
        trace!(event = %frame.event, "emitting net event with ack");
        self.tx
            .send(Envelope {
                frame,
                ack: Some(ack_tx),
            })
            .map_err(|_| NetStubError::ChannelClosed)?;
        ack_rx.await.map_err(|_| NetStubError::ChannelClosed)?
    }
}

/// Receiving half of one direction.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Next frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }
}

/// One side's view of the channel.
#[derive(Debug)]
pub struct ChannelEnd {
    pub emitter: EventEmitter,
    pub receiver: EventReceiver,
}

impl ChannelEnd {
    pub fn split(self) -> (EventEmitter, EventReceiver) {
        (self.emitter, self.receiver)
    }
}

/// Connected pair of channel ends: `(traffic side, handler side)`.
pub fn pair() -> (ChannelEnd, ChannelEnd) {
    let (to_handler_tx, to_handler_rx) = mpsc::unbounded_channel();
    let (to_traffic_tx, to_traffic_rx) = mpsc::unbounded_channel();
    (
        ChannelEnd {
            emitter: EventEmitter { tx: to_handler_tx },
            receiver: EventReceiver { rx: to_traffic_rx },
        },
        ChannelEnd {
            emitter: EventEmitter { tx: to_traffic_tx },
            receiver: EventReceiver { rx: to_handler_rx },
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::frames::{SetRouteDisabledFrame, SET_ROUTE_DISABLED};
    use rstest::rstest;

    fn disable(id: &str) -> NetEvent {
        NetEvent::SetRouteDisabled(SetRouteDisabledFrame {
            handler_id: id.to_string(),
            disabled: true,
        })
    }

    #[rstest]
    #[tokio::test]
    async fn test_pair_delivers_in_order() {
        let (traffic, handler) = pair();
        let (handler_emitter, _handler_receiver) = handler.split();
        let (_traffic_emitter, mut traffic_receiver) = traffic.split();

        handler_emitter.emit(&disable("1")).expect("Should emit");
        handler_emitter.emit(&disable("2")).expect("Should emit");

        let first = traffic_receiver.recv().await.expect("Should receive");
        let second = traffic_receiver.recv().await.expect("Should receive");
        assert_eq!(first.frame.event, SET_ROUTE_DISABLED);
        assert_eq!(first.frame.data["handlerId"], "1");
        assert_eq!(second.frame.data["handlerId"], "2");
        assert!(!first.wants_ack());
    }

    #[rstest]
    #[tokio::test]
    async fn test_emit_with_ack_returns_receiver_result() {
        let (traffic, handler) = pair();
        let (handler_emitter, _) = handler.split();
        let (_, mut traffic_receiver) = traffic.split();

        let responder = tokio::spawn(async move {
            let envelope = traffic_receiver.recv().await.expect("Should receive");
            assert!(envelope.wants_ack());
            let (_, acknowledger) = envelope.into_parts();
            acknowledger.ack(Err(NetStubError::FixtureLoad {
                fixture: "missing.json".to_string(),
                reason: "not found".to_string(),
            }))
        });

        let result = handler_emitter.emit_with_ack(&disable("1")).await;
        assert!(matches!(result, Err(NetStubError::FixtureLoad { .. })));
        assert!(responder.await.expect("Should join").is_ok());
    }

    #[rstest]
    #[tokio::test]
    async fn test_emit_after_receiver_dropped() {
        let (traffic, handler) = pair();
        drop(traffic);
        let (handler_emitter, _) = handler.split();
        assert!(matches!(
            handler_emitter.emit(&disable("1")),
            Err(NetStubError::ChannelClosed)
        ));
    }
}
