use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project::pin_project;

/// Resolves with whichever of two futures completes first.
///
/// `first` is polled first, so it wins if both are ready.
#[pin_project]
pub struct Race<A, B, T>
where
    A: Future<Output = T>,
    B: Future<Output = T>,
{
    #[pin]
    first: A,
    #[pin]
    second: B,
}

impl<A, B, T> Race<A, B, T>
where
    A: Future<Output = T>,
    B: Future<Output = T>,
{
    pub fn between(first: A, second: B) -> Self {
        Race { first, second }
    }
}

impl<A, B, T> Future for Race<A, B, T>
where
    A: Future<Output = T>,
    B: Future<Output = T>,
{
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        match this.first.poll(cx) {
            Poll::Pending => this.second.poll(cx),
            ready => ready,
        }
    }
}

/// Measures how long the wrapped future takes to complete.
///
/// `on_complete` is called exactly once, when the inner future resolves,
/// whatever it resolves to.
#[pin_project]
pub struct Timed<F, R>
where
    F: Future,
    R: FnOnce(std::time::Duration),
{
    #[pin]
    inner: F,
    started: instant::Instant,
    on_complete: Option<R>,
}

impl<F, R> Timed<F, R>
where
    F: Future,
    R: FnOnce(std::time::Duration),
{
    pub fn new(inner: F, on_complete: R) -> Self {
        Self {
            inner,
            started: instant::Instant::now(),
            on_complete: Some(on_complete),
        }
    }
}

impl<F, R> Future for Timed<F, R>
where
    F: Future,
    R: FnOnce(std::time::Duration),
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        match this.inner.poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(output) => {
                if let Some(on_complete) = this.on_complete.take() {
                    on_complete(this.started.elapsed());
                }

                Poll::Ready(output)
            }
        }
    }
}
