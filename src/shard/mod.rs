//! One event loop per shard.
//!
//! A [`ShardKeeper`] owns the shard's [`Acceptor`] and serves requests that
//! arrive through [`ShardHandle`]s. Every request becomes a task of the
//! keeper, so requests for different keys interleave while requests for the
//! same key queue up on the key's lock.

mod handle;
mod macros;
mod msg;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::{mpsc, oneshot};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{info, trace};

use crate::acceptor::Acceptor;
use crate::storage::Storage;

pub use handle::ShardHandle;
use msg::{Request, Response};

type RequestAndResponseSender<S> = (Request<S>, oneshot::Sender<Response<S>>);

/// The event loop of one shard.
///
/// Resolves once it was asked to shut down, or every handle was dropped, and
/// all requests it received were answered.
#[must_use = "a shard keeper does nothing unless polled"]
pub struct ShardKeeper<S: Storage> {
    acceptor: Acceptor<S>,

    receiver: mpsc::Receiver<RequestAndResponseSender<S>>,
    receiver_exhausted: bool,

    tasks: FuturesUnordered<BoxFuture<'static, ()>>,
    max_in_flight: usize,

    shutdown_replies: Vec<oneshot::Sender<Response<S>>>,
}

impl<S: Storage> ShardKeeper<S> {
    /// Creates the keeper for `acceptor`'s shard and a handle to it.
    ///
    /// At most `queue_depth` requests are handled at once. Further requests
    /// wait in the queue until one of them was answered or their deadline
    /// passed.
    pub fn new(acceptor: Acceptor<S>, queue_depth: usize) -> (ShardHandle<S>, Self) {
        let (sender, receiver) = mpsc::channel(queue_depth);
        let handle = ShardHandle::new(acceptor.shard(), sender);

        let keeper = Self {
            acceptor,
            receiver,
            receiver_exhausted: false,
            tasks: FuturesUnordered::new(),
            max_in_flight: queue_depth.max(1),
            shutdown_replies: Vec::new(),
        };

        (handle, keeper)
    }

    pub fn acceptor(&self) -> &Acceptor<S> {
        &self.acceptor
    }

    fn handle_request(&mut self, req: Request<S>, reply: oneshot::Sender<Response<S>>) {
        if req.deadline().map_or(false, |d| d.has_passed()) {
            trace!("Dropping request whose deadline passed while it was queued.");

            respond(reply, req.timed_out());
            return;
        }

        match req {
            Request::Prepare {
                trace,
                table,
                token,
                key,
                ballot,
                deadline,
            } => {
                let acceptor = self.acceptor.clone();

                self.tasks.push(
                    async move {
                        let result = acceptor
                            .prepare(trace, table, token, key, ballot, deadline)
                            .await;

                        respond(reply, Response::Prepare(result));
                    }
                    .boxed(),
                );
            }

            Request::Accept {
                trace,
                table,
                token,
                proposal,
                deadline,
            } => {
                let acceptor = self.acceptor.clone();

                self.tasks.push(
                    async move {
                        let result = acceptor
                            .accept(trace, table, token, proposal, deadline)
                            .await;

                        respond(reply, Response::Accept(result));
                    }
                    .boxed(),
                );
            }

            Request::Shutdown => {
                info!("Shutting down {}.", self.acceptor.shard());

                // buffered requests are still served
                self.receiver.close();
                self.shutdown_replies.push(reply);
            }
        }
    }
}

impl<S: Storage> Unpin for ShardKeeper<S> {}

impl<S: Storage> Future for ShardKeeper<S> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        loop {
            while let Poll::Ready(Some(())) = this.tasks.poll_next_unpin(cx) {}

            let mut received = false;

            while !this.receiver_exhausted && this.tasks.len() < this.max_in_flight {
                match this.receiver.poll_next_unpin(cx) {
                    Poll::Ready(Some((req, reply))) => {
                        this.handle_request(req, reply);
                        received = true;
                    }
                    Poll::Ready(None) => this.receiver_exhausted = true,
                    Poll::Pending => break,
                }
            }

            // new tasks must be polled once to register their wakers
            if !received {
                break;
            }
        }

        if this.receiver_exhausted && this.tasks.is_empty() {
            info!("{} stopped.", this.acceptor.shard());

            for reply in this.shutdown_replies.drain(..) {
                respond(reply, Response::Shutdown(Ok(())));
            }

            return Poll::Ready(());
        }

        Poll::Pending
    }
}

fn respond<S: Storage>(reply: oneshot::Sender<Response<S>>, response: Response<S>) {
    if reply.send(response).is_err() {
        trace!("Requester went away before the response was ready.");
    }
}
