//! Deferred values: bridging engine callbacks to futures.
//!
//! A [`Deferred`] is the settling side, a [`Promise`] the awaiting side.
//! Engine handlers only ever push into channels, so every continuation runs
//! on the task that awaits the promise rather than inside a handler.

use crate::error::{CoreError, CoreResult};
use crate::translate::error_message_for;
use keyshelf_engine::Request;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use tokio::sync::{mpsc, oneshot};

struct Senders<T, P> {
    result: Option<oneshot::Sender<CoreResult<T>>>,
    progress: Option<mpsc::UnboundedSender<P>>,
}

/// The settling side of a [`Promise`].
///
/// Clones settle the same promise. The first `resolve` or `reject` wins;
/// later calls and notifications after settlement are ignored. If every
/// clone is dropped without settling, the promise rejects with
/// [`CoreError::Abandoned`].
pub struct Deferred<T, P = ()> {
    senders: Arc<Mutex<Senders<T, P>>>,
}

impl<T, P> Clone for Deferred<T, P> {
    fn clone(&self) -> Self {
        Self {
            senders: Arc::clone(&self.senders),
        }
    }
}

impl<T, P> fmt::Debug for Deferred<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl<T, P> Deferred<T, P> {
    /// Creates a deferred and the promise it settles.
    #[must_use]
    pub fn new() -> (Self, Promise<T, P>) {
        let (result_tx, result_rx) = oneshot::channel();
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let deferred = Self {
            senders: Arc::new(Mutex::new(Senders {
                result: Some(result_tx),
                progress: Some(progress_tx),
            })),
        };
        let promise = Promise {
            result: Some(result_rx),
            progress: progress_rx,
        };
        (deferred, promise)
    }

    /// Returns whether the promise has been settled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.senders.lock().result.is_none()
    }

    /// Resolves the promise with `value`.
    pub fn resolve(&self, value: T) {
        self.settle(Ok(value));
    }

    /// Rejects the promise with `error`.
    pub fn reject(&self, error: CoreError) {
        self.settle(Err(error));
    }

    /// Sends a progress notification.
    pub fn notify(&self, progress: P) {
        if let Some(sender) = &self.senders.lock().progress {
            let _ = sender.send(progress);
        }
    }

    fn settle(&self, result: CoreResult<T>) {
        let mut senders = self.senders.lock();
        if let Some(sender) = senders.result.take() {
            // Dropping the progress sender ends the stream once drained.
            senders.progress = None;
            let _ = sender.send(result);
        }
    }
}

impl<T: Send + 'static, P: Send + 'static> Deferred<T, P> {
    /// Rejects the promise when `request` fails or is blocked.
    pub fn reject_with<R: Send + 'static>(&self, request: &Request<R>) {
        let on_error = self.clone();
        request.on_error(move |event| {
            on_error.reject(CoreError::request(error_message_for(&event)));
        });
        let on_blocked = self.clone();
        request.on_blocked(move |event| {
            on_blocked.reject(CoreError::request(error_message_for(&event)));
        });
    }

    /// Settles the promise with the outcome of `request`.
    pub fn resolve_with(&self, request: &Request<T>) {
        self.reject_with(request);
        let on_success = self.clone();
        request.on_success(move |value| on_success.resolve(value));
    }
}

/// The awaiting side of a [`Deferred`].
///
/// Awaiting yields the settled result. Progress notifications are pulled
/// separately with [`Promise::progress`]; they stay available after the
/// promise settles until drained. Await `&mut promise` to keep access to
/// them.
pub struct Promise<T, P = ()> {
    result: Option<oneshot::Receiver<CoreResult<T>>>,
    progress: mpsc::UnboundedReceiver<P>,
}

impl<T, P> Promise<T, P> {
    /// Returns an already resolved promise.
    #[must_use]
    pub fn resolved(value: T) -> Self {
        let (deferred, promise) = Deferred::new();
        deferred.resolve(value);
        promise
    }

    /// Returns an already rejected promise.
    #[must_use]
    pub fn rejected(error: CoreError) -> Self {
        let (deferred, promise) = Deferred::new();
        deferred.reject(error);
        promise
    }

    /// Waits for the next progress notification.
    ///
    /// Returns `None` once the promise has settled and every notification
    /// sent before settlement has been returned.
    pub async fn progress(&mut self) -> Option<P> {
        self.progress.recv().await
    }

    /// Drops the progress stream, keeping only the result.
    #[must_use]
    pub fn without_progress(self) -> Promise<T, ()> {
        let (_closed, progress) = mpsc::unbounded_channel();
        Promise {
            result: self.result,
            progress,
        }
    }

    /// Returns the notifications received so far without waiting.
    pub fn drain_progress(&mut self) -> Vec<P> {
        let mut drained = Vec::new();
        while let Ok(progress) = self.progress.try_recv() {
            drained.push(progress);
        }
        drained
    }
}

impl<T, P> Future for Promise<T, P> {
    type Output = CoreResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let Some(receiver) = this.result.as_mut() else {
            return Poll::Ready(Err(CoreError::Abandoned));
        };
        let settled = ready!(Pin::new(receiver).poll(cx));
        this.result = None;
        Poll::Ready(settled.unwrap_or(Err(CoreError::Abandoned)))
    }
}

impl<T, P> fmt::Debug for Promise<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("consumed", &self.result.is_none())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_settlement_wins() {
        let (deferred, promise) = Deferred::<u32>::new();
        deferred.resolve(1);
        deferred.resolve(2);
        deferred.reject(CoreError::request("late"));
        assert!(deferred.is_settled());
        assert_eq!(promise.await, Ok(1));
    }

    #[tokio::test]
    async fn notifications_arrive_in_order_and_end_after_settling() {
        let (deferred, mut promise) = Deferred::<Vec<u32>, u32>::new();
        deferred.notify(1);
        deferred.notify(2);
        deferred.resolve(vec![1, 2]);
        deferred.notify(3);

        assert_eq!((&mut promise).await, Ok(vec![1, 2]));
        assert_eq!(promise.progress().await, Some(1));
        assert_eq!(promise.drain_progress(), vec![2]);
        assert_eq!(promise.progress().await, None);
    }

    #[tokio::test]
    async fn dropping_every_clone_abandons() {
        let (deferred, promise) = Deferred::<u32>::new();
        let clone = deferred.clone();
        drop(deferred);
        drop(clone);
        assert_eq!(promise.await, Err(CoreError::Abandoned));
    }

    #[tokio::test]
    async fn settled_constructors() {
        assert_eq!(Promise::<_, ()>::resolved(5).await, Ok(5));
        let rejected = Promise::<u32, ()>::rejected(CoreError::request("no"));
        assert_eq!(rejected.await, Err(CoreError::request("no")));
    }

    #[tokio::test]
    async fn resolves_across_tasks() {
        let (deferred, promise) = Deferred::<&'static str>::new();
        tokio::spawn(async move { deferred.resolve("done") });
        assert_eq!(promise.await, Ok("done"));
    }
}
