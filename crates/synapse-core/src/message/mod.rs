pub mod bus;
mod delivery;
pub mod envelope;
pub mod guard;
pub mod handler;
pub mod pending;
pub mod queue;
mod retry;
pub mod router;
pub mod stats;

pub use bus::MessageBus;
pub use envelope::{EnvelopeState, MessageEnvelope, RetryDecision};
pub use guard::LoopGuard;
pub use handler::{
    BoxMessageHandler, FnHandler, HandlerResult, MessageHandler, MessageHandlerDyn, SinkHandler,
    handler_fn,
};
pub use pending::PendingTable;
pub use queue::PriorityQueue;
pub use router::Router;
