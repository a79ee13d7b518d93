use std::future::Future;

use futures::StreamExt;
use futures::stream;

use crate::error::{ScrapeError, format_fatal};

/// Runs `worker` over `items` with at most `limit` futures in flight.
///
/// Workers pull the next item as soon as one finishes, so completion order is
/// arbitrary; the returned vector is nevertheless in input order. A `limit`
/// of 0 is treated as 1.
pub async fn map_concurrent<T, R, F, Fut>(items: Vec<T>, limit: usize, worker: F) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    let limit = limit.max(1);
    let mut indexed: Vec<(usize, R)> = stream::iter(items.into_iter().enumerate())
        .map(|(index, item)| {
            let fut = worker(item);
            async move { (index, fut.await) }
        })
        .buffer_unordered(limit)
        .collect()
        .await;
    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, result)| result).collect()
}

/// Like [`map_concurrent`] for fallible workers: failed items are logged with
/// `label` and left out, the rest are returned in input order.
pub async fn map_concurrent_lenient<T, R, F, Fut>(
    items: Vec<T>,
    limit: usize,
    label: &str,
    worker: F,
) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, ScrapeError>>,
{
    let total = items.len();
    let results = map_concurrent(items, limit, worker).await;
    let mut ok = Vec::with_capacity(total);
    for result in results {
        match result {
            Ok(value) => ok.push(value),
            Err(e) => log::warn!("{}", format_fatal(&format!("[{label}] skipping item"), &e)),
        }
    }
    if ok.len() < total {
        log::warn!("[{label}] {} of {} item(s) succeeded", ok.len(), total);
    }
    ok
}
