use std::any::Any;
use std::fmt;

/// The result of a worker panicking inside a [`crate::task::run`] loop or inside a
/// [`crate::managed_queue::Consumer`] invoked by a managed queue's consumer loop.
///
/// Rust has no exceptions, so a caught `panic!` is the closest analogue of a worker
/// throwing; its payload is carried here rather than dropped.
#[derive(thiserror::Error)]
#[error("task panicked: {message}")]
pub struct TaskFailure {
    message: String,
    payload: Box<dyn Any + Send + 'static>,
}

impl TaskFailure {
    pub(crate) fn new(payload: Box<dyn Any + Send + 'static>) -> Self {
        let message = panic_message(&payload);
        Self { message, payload }
    }

    /// The panic message, downcast from `&str` or `String` where possible.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The raw panic payload, for callers that need more than the message.
    pub fn into_payload(self) -> Box<dyn Any + Send + 'static> {
        self.payload
    }
}

impl fmt::Debug for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFailure").field("message", &self.message).finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Surfaced by [`crate::managed_queue::ManagedQueue`]'s destructor when the consumer
/// task failed and no error sink was registered to receive it.
#[derive(thiserror::Error, Debug)]
#[error("managed queue consumer failed: {0}")]
pub struct ManagedQueueError(#[from] TaskFailure);
