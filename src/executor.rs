//! Defines the [`Executor`] trait and its [default implementation][StdThread].

use futures::FutureExt;

/// Shorthand to extract `Error` type out of `E`.
pub type ErrorOf<E> = <E as Executor>::Error;

/// The executor used to run the event loop of each shard.
pub trait Executor: 'static {
    /// Type of error yielded when a task cannot be executed.
    type Error;

    /// Executes the given task.
    fn execute<F: std::future::Future<Output = ()> + Send + 'static>(
        self,
        task: F,
    ) -> Result<(), Self::Error>;
}

impl<S: futures::task::Spawn + 'static> Executor for S {
    type Error = futures::task::SpawnError;

    fn execute<F: std::future::Future<Output = ()> + Send + 'static>(
        self,
        task: F,
    ) -> Result<(), Self::Error> {
        self.spawn_obj(futures::task::FutureObj::from(task.boxed()))
    }
}

/// Executor which runs each task on a thread of its own.
///
/// Every shard thus gets a dedicated, single-threaded event loop.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdThread;

impl Executor for StdThread {
    type Error = std::io::Error;

    fn execute<F: std::future::Future<Output = ()> + Send + 'static>(
        self,
        task: F,
    ) -> Result<(), Self::Error> {
        std::thread::Builder::new()
            .name("cas-paxos-shard".to_owned())
            .spawn(|| {
                futures::executor::block_on(task);
            })
            .map(|_| ())
    }
}
