#[doc(hidden)]
#[macro_export]
macro_rules! dispatch_shard_req {
    ($self:ident, $name:ident) => {{
        let req = Request::$name;

        let (s, r) = oneshot::channel();

        let mut sender = $self.sender.clone();

        async move {
            sender.send((req, s)).await.map_err(|_| ShutDown)?;

            match r.await.map_err(|_| ShutDown)? {
                Response::$name(r) => Ok(r?),
                _ => unreachable!(),
            }
        }
    }};

    ($self:ident, $name:ident, $args:tt) => {{
        let req = Request::$name $args;

        let (s, r) = oneshot::channel();

        let mut sender = $self.sender.clone();

        async move {
            sender.send((req, s)).await.map_err(|_| ShutDown)?;

            match r.await.map_err(|_| ShutDown)? {
                Response::$name(r) => Ok(r?),
                _ => unreachable!(),
            }
        }
    }};

    ($self:ident, $name:ident, $args:tt, until $deadline:expr) => {{
        let req = Request::$name $args;

        let (s, r) = oneshot::channel();

        let mut sender = $self.sender.clone();
        let deadline: Deadline = $deadline;

        async move {
            let dispatched = async move {
                match sender.send((req, s)).await {
                    Ok(()) => r.await.map_err(|_| ShutDown),
                    Err(_) => Err(ShutDown),
                }
            };

            match deadline.run(dispatched).await {
                Ok(Ok(Response::$name(r))) => r,
                Ok(Ok(_)) => unreachable!(),
                Ok(Err(shut_down)) => Err(PaxosError::from(shut_down)),
                Err(elapsed) => Err(PaxosError::from(elapsed)),
            }
        }
    }};
}

/// Logs at `debug` and writes the same message to the request's trace.
#[doc(hidden)]
#[macro_export]
macro_rules! log_and_trace {
    ($trace:expr, $($arg:tt)+) => {{
        tracing::debug!($($arg)+);
        $trace.message(format_args!($($arg)+));
    }};
}
