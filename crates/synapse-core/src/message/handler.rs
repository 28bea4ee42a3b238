//! Message handler traits for agents registered with the bus.
//!
//! `MessageHandler` is the ergonomic async trait agents implement. The bus
//! stores handlers behind `MessageHandlerDyn`, an object-safe twin with boxed
//! futures, so agents with different handler types can share one registry:
//! 1. Implement `MessageHandler` (or wrap a closure with [`handler_fn`])
//! 2. The blanket impl provides `MessageHandlerDyn`
//! 3. The router keeps a [`BoxMessageHandler`] per agent

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use synapse_types::error::HandlerError;
use synapse_types::message::Message;

/// Result of handling one message: an optional response to route back.
pub type HandlerResult = Result<Option<Message>, HandlerError>;

/// Receives messages addressed to one agent.
///
/// An `Err` is a delivery failure for this agent only and causes a retry.
/// Handlers run on a bus worker, so long-running work should be spawned or
/// must yield regularly.
pub trait MessageHandler: Send + Sync + 'static {
    fn handle(&self, message: &Message) -> impl Future<Output = HandlerResult> + Send;
}

/// Object-safe version of [`MessageHandler`].
pub trait MessageHandlerDyn: Send + Sync {
    fn handle_boxed<'a>(
        &'a self,
        message: &'a Message,
    ) -> Pin<Box<dyn Future<Output = HandlerResult> + Send + 'a>>;
}

impl<T: MessageHandler> MessageHandlerDyn for T {
    fn handle_boxed<'a>(
        &'a self,
        message: &'a Message,
    ) -> Pin<Box<dyn Future<Output = HandlerResult> + Send + 'a>> {
        Box::pin(self.handle(message))
    }
}

/// Shared, type-erased handler as stored in the router.
pub type BoxMessageHandler = Arc<dyn MessageHandlerDyn>;

/// Handler backed by an async closure that receives an owned copy of the message.
pub struct FnHandler<F> {
    f: F,
}

impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn handle(&self, message: &Message) -> impl Future<Output = HandlerResult> + Send {
        (self.f)(message.clone())
    }
}

/// Wrap an async closure as a handler.
///
/// ```ignore
/// bus.register_agent("echo", handler_fn(|msg| async move {
///     Ok(Some(Message::response_to(&msg, "echo", msg.content.clone())))
/// }));
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    FnHandler { f }
}

/// Handler that accepts every message and never responds.
pub struct SinkHandler;

impl MessageHandler for SinkHandler {
    async fn handle(&self, _message: &Message) -> HandlerResult {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use synapse_types::message::MessageType;

    #[tokio::test]
    async fn closure_handler_receives_message() {
        let handler = handler_fn(|msg: Message| async move {
            Ok(Some(Message::response_to(&msg, "echo", msg.content.clone())))
        });
        let boxed: BoxMessageHandler = Arc::new(handler);

        let msg = Message::new("a", "echo", MessageType::DirectMessage, json!("ping")).with_id("m-1");
        let resp = boxed.handle_boxed(&msg).await.unwrap().unwrap();

        assert_eq!(resp.content, json!("ping"));
        assert_eq!(resp.correlation_id.as_deref(), Some("m-1"));
    }

    #[tokio::test]
    async fn closure_handler_errors_propagate() {
        let boxed: BoxMessageHandler =
            Arc::new(handler_fn(|_msg: Message| async { Err(HandlerError::rejected("busy")) }));
        let msg = Message::new("a", "b", MessageType::DirectMessage, json!(null));

        assert_eq!(
            boxed.handle_boxed(&msg).await,
            Err(HandlerError::Rejected("busy".to_string()))
        );
    }

    #[tokio::test]
    async fn sink_handler_returns_none() {
        let boxed: BoxMessageHandler = Arc::new(SinkHandler);
        let msg = Message::new("a", "b", MessageType::Heartbeat, json!(null));
        assert_eq!(boxed.handle_boxed(&msg).await, Ok(None));
    }
}
