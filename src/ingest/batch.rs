// src/ingest/batch.rs
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// Run `f` over `inputs` with at most `concurrency` futures in flight.
///
/// Output slot `i` belongs to input `i` no matter which task finished first.
/// A task returning `Err` or panicking leaves `None` in its slot; the rest of
/// the batch keeps going.
pub async fn run_batched<I, T, E, F, Fut>(inputs: Vec<I>, concurrency: usize, f: F) -> Vec<Option<T>>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let limit = concurrency.max(1);
    stream::iter(inputs.into_iter().enumerate())
        .map(|(i, input)| {
            let fut = AssertUnwindSafe(f(input)).catch_unwind();
            async move {
                match fut.await {
                    Ok(Ok(v)) => Some(v),
                    Ok(Err(e)) => {
                        tracing::debug!(index = i, error = %e, "batch task failed");
                        None
                    }
                    Err(panic) => {
                        tracing::warn!(
                            index = i,
                            panic = %panic_message(panic.as_ref()),
                            "batch task panicked"
                        );
                        None
                    }
                }
            }
        })
        // `buffered` yields in input order while polling up to `limit` at once.
        .buffered(limit)
        .collect()
        .await
}

pub(crate) fn panic_message(p: &(dyn Any + Send)) -> String {
    if let Some(s) = p.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = p.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
