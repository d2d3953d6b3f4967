//! # Dispatch
//!
//! The seam between the transcoder and whatever actually executes the RPC.
//!
//! The transcoder calls [`Dispatcher::invoke`] exactly once per matched request and never
//! retries. Two implementations ship with the crate:
//!
//! * [`HandlerRegistry`]: in-process async handlers keyed by `package.Service.Method`.
//! * [`crate::grpc::GrpcDispatcher`]: forwards the call to an upstream gRPC server.
use crate::schema::MethodDescriptor;
use crate::status::Status;
use crate::value::MessageValue;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;

/// Executes RPC methods on behalf of the transcoder.
pub trait Dispatcher: Send + Sync + 'static {
    /// Invokes `method` with `request`.
    ///
    /// Any integer status code may be reported; the transcoder forwards it unchanged.
    fn invoke(
        &self,
        method: &MethodDescriptor,
        request: MessageValue,
    ) -> impl Future<Output = Result<MessageValue, Status>> + Send;
}

type Handler = Box<dyn Fn(MessageValue) -> BoxFuture<'static, Result<MessageValue, Status>> + Send + Sync>;

/// A table of async handlers, one per method.
///
/// Methods without a handler fail with `UNIMPLEMENTED`.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Handler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for the method named `package.Service.Method`, replacing any
    /// previous handler for it.
    pub fn register<F, Fut>(mut self, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(MessageValue) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<MessageValue, Status>> + Send + 'static,
    {
        self.handlers
            .insert(method.into(), Box::new(move |request| handler(request).boxed()));
        self
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("methods", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Dispatcher for HandlerRegistry {
    fn invoke(
        &self,
        method: &MethodDescriptor,
        request: MessageValue,
    ) -> impl Future<Output = Result<MessageValue, Status>> + Send {
        let name = method.full_name();
        let call = self.handlers.get(&name).map(|handler| handler(request));

        async move {
            match call {
                Some(call) => call.await,
                None => Err(Status::unimplemented(format!(
                    "Method '{name}' has no registered handler"
                ))),
            }
        }
    }
}
