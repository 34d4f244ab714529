use std::fmt;
use std::sync::Arc;

/// Receives the messages a request produces on its way through the acceptor.
///
/// Implementations typically forward them into a distributed tracing session
/// that was started by the coordinator.
pub trait Tracer: Send + Sync {
    fn trace(&self, message: fmt::Arguments<'_>);
}

/// The tracing session a request belongs to, if any.
#[derive(Clone, Default)]
pub struct Trace(Option<Arc<dyn Tracer>>);

impl Trace {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn to(tracer: Arc<dyn Tracer>) -> Self {
        Self(Some(tracer))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.is_some()
    }

    pub fn message(&self, message: fmt::Arguments<'_>) {
        if let Some(tracer) = &self.0 {
            tracer.trace(message);
        }
    }
}

impl<T: Tracer + 'static> From<Arc<T>> for Trace {
    fn from(tracer: Arc<T>) -> Self {
        Self(Some(tracer))
    }
}

impl fmt::Debug for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Trace")
            .field(&if self.is_enabled() { "enabled" } else { "none" })
            .finish()
    }
}
