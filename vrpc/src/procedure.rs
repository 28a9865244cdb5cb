//! Procedure traits and closure adapters
//!
//! A procedure receives the JSON `Args` of a request. Async procedures are
//! fire-and-forget: their outcome is never reported to the caller. Sync
//! procedures produce a JSON value that travels back in a result envelope.

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use eyre::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

/// A fire-and-forget procedure
#[async_trait]
pub trait AsyncProcedure: Send + Sync {
    async fn invoke(&self, args: Value) -> Result<()>;
}

/// A procedure whose result is sent back to the caller
#[async_trait]
pub trait SyncProcedure: Send + Sync {
    async fn invoke(&self, args: Value) -> Result<Value>;
}

/// Adapter for a plain closure taking typed args
pub struct AsyncFn<F, A> {
    f: F,
    _args: PhantomData<fn(A)>,
}

/// Adapter for a closure returning a future
pub struct AsyncFutureFn<F, A> {
    f: F,
    _args: PhantomData<fn(A)>,
}

/// Adapter for a plain closure returning a typed value
pub struct SyncFn<F, A, R> {
    f: F,
    _sig: PhantomData<fn(A) -> R>,
}

/// Adapter for a closure returning a future of a typed value
pub struct SyncFutureFn<F, A, R> {
    f: F,
    _sig: PhantomData<fn(A) -> R>,
}

/// Wrap a closure as an [`AsyncProcedure`]
pub fn async_fn<F, A>(f: F) -> AsyncFn<F, A>
where
    F: Fn(A) -> Result<()> + Send + Sync + 'static,
    A: DeserializeOwned + Send + 'static,
{
    AsyncFn { f, _args: PhantomData }
}

/// Wrap an async closure as an [`AsyncProcedure`]
pub fn async_future_fn<F, A, Fut>(f: F) -> AsyncFutureFn<F, A>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    A: DeserializeOwned + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    AsyncFutureFn { f, _args: PhantomData }
}

/// Wrap a closure as a [`SyncProcedure`]
pub fn sync_fn<F, A, R>(f: F) -> SyncFn<F, A, R>
where
    F: Fn(A) -> Result<R> + Send + Sync + 'static,
    A: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
{
    SyncFn { f, _sig: PhantomData }
}

/// Wrap an async closure as a [`SyncProcedure`]
pub fn sync_future_fn<F, A, R, Fut>(f: F) -> SyncFutureFn<F, A, R>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    A: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    SyncFutureFn { f, _sig: PhantomData }
}

fn decode_args<A: DeserializeOwned>(args: Value) -> Result<A> {
    serde_json::from_value(args).map_err(|e| eyre::eyre!("Invalid arguments: {}", e))
}

#[async_trait]
impl<F, A> AsyncProcedure for AsyncFn<F, A>
where
    F: Fn(A) -> Result<()> + Send + Sync + 'static,
    A: DeserializeOwned + Send + 'static,
{
    async fn invoke(&self, args: Value) -> Result<()> {
        debug!("AsyncFn::invoke: called");
        let args = decode_args(args)?;
        (self.f)(args)
    }
}

#[async_trait]
impl<F, A, Fut> AsyncProcedure for AsyncFutureFn<F, A>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    A: DeserializeOwned + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn invoke(&self, args: Value) -> Result<()> {
        debug!("AsyncFutureFn::invoke: called");
        let args = decode_args(args)?;
        (self.f)(args).await
    }
}

#[async_trait]
impl<F, A, R> SyncProcedure for SyncFn<F, A, R>
where
    F: Fn(A) -> Result<R> + Send + Sync + 'static,
    A: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
{
    async fn invoke(&self, args: Value) -> Result<Value> {
        debug!("SyncFn::invoke: called");
        let args = decode_args(args)?;
        let output = (self.f)(args)?;
        Ok(serde_json::to_value(output)?)
    }
}

#[async_trait]
impl<F, A, R, Fut> SyncProcedure for SyncFutureFn<F, A, R>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    A: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    async fn invoke(&self, args: Value) -> Result<Value> {
        debug!("SyncFutureFn::invoke: called");
        let args = decode_args(args)?;
        let output = (self.f)(args).await?;
        Ok(serde_json::to_value(output)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Deserialize)]
    struct AddArgs {
        a: i64,
        b: i64,
    }

    #[tokio::test]
    async fn test_sync_fn_decodes_and_encodes() {
        let add = sync_fn(|args: AddArgs| Ok(args.a + args.b));

        let value = add.invoke(json!({"a": 2, "b": 3})).await.unwrap();
        assert_eq!(value, json!(5));
    }

    #[tokio::test]
    async fn test_sync_fn_rejects_bad_args() {
        let add = sync_fn(|args: AddArgs| Ok(args.a + args.b));

        let err = add.invoke(json!({"a": "two"})).await.unwrap_err();
        assert!(err.to_string().contains("Invalid arguments"));
    }

    #[tokio::test]
    async fn test_sync_future_fn() {
        let echo = sync_future_fn(|args: String| async move { Ok::<_, eyre::Report>(format!("echo: {args}")) });

        let value = echo.invoke(json!("hi")).await.unwrap();
        assert_eq!(value, json!("echo: hi"));
    }

    #[tokio::test]
    async fn test_async_fn_runs_side_effect() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        let bump = async_fn(move |n: usize| {
            seen.fetch_add(n, Ordering::SeqCst);
            Ok(())
        });

        bump.invoke(json!(4)).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_async_future_fn_propagates_error() {
        let failing = async_future_fn(|_: Value| async move { Err::<(), _>(eyre::eyre!("boom")) });

        let err = failing.invoke(Value::Null).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}
