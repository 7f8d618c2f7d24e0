//! Event channel between the traffic side and the handler side.

pub mod channel;
pub mod frames;

pub use channel::{pair, Acknowledger, ChannelEnd, Envelope, EventEmitter, EventReceiver};
pub use frames::NetEvent;
