use tokio::sync::oneshot;

use crate::error::{CommErr, Result};

/// A handle to the result of an in-flight communication operation.
///
/// Issuing an exchange never blocks; the result is consumed later through
/// `wait`. Transport failures travel through the handle and surface exactly
/// once, at the wait point.
#[derive(Debug)]
pub struct Awaitable<T> {
    inner: Inner<T>,
}

#[derive(Debug)]
enum Inner<T> {
    Ready(T),
    Pending(oneshot::Receiver<Result<T>>),
}

impl<T> Awaitable<T> {
    /// Wraps an already-available value, for operations with no pending work.
    pub fn ready(value: T) -> Self {
        Self {
            inner: Inner::Ready(value),
        }
    }

    /// Creates a pending handle together with its resolving end.
    ///
    /// # Returns
    /// The `Resolver` held by the producer and the `Awaitable` held by the consumer.
    pub fn pending() -> (Resolver<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (
            Resolver(tx),
            Self {
                inner: Inner::Pending(rx),
            },
        )
    }

    /// Suspends until the value is available and returns it.
    ///
    /// Consumes the handle: a result can be taken at most once.
    ///
    /// # Errors
    /// The failure reported by the producer, or `CommErr::Lost` if the
    /// producer dropped its end without resolving.
    pub async fn wait(self) -> Result<T> {
        match self.inner {
            Inner::Ready(value) => Ok(value),
            Inner::Pending(rx) => match rx.await {
                Ok(result) => result,
                Err(_) => Err(CommErr::Lost),
            },
        }
    }
}

/// The producing end of a pending `Awaitable`.
#[derive(Debug)]
pub struct Resolver<T>(oneshot::Sender<Result<T>>);

impl<T> Resolver<T> {
    /// Fulfills the paired handle with `value`.
    pub fn resolve(self, value: T) {
        // A dropped consumer is fine, the result is simply discarded.
        let _ = self.0.send(Ok(value));
    }

    /// Fails the paired handle; the error surfaces at its wait point.
    pub fn fail(self, err: CommErr) {
        let _ = self.0.send(Err(err));
    }
}
