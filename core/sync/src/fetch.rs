//! Fetch source contract.
//!
//! A fetch factory turns `(context, watermark)` into a [`PageStream`]: a
//! finite, lazily driven sequence of page fetches. Each poll performs at most
//! one remote round trip and the stream ends when the source reports no
//! further continuation. The sync engine never sees continuation tokens.

use futures::stream::{self, BoxStream, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use driftsync_common::{Error, Result, Timestamp, Tombstone};

use crate::retry::{RetryConfig, RetryExecutor};

/// Lazy sequence of fetched pages.
pub type PageStream<T> = BoxStream<'static, Result<Vec<T>>>;

/// Factory for the changed-record sequence of one entity kind.
///
/// Receives the current watermark; `None` asks for everything.
pub type ChangedFetch<C, R> =
    Arc<dyn Fn(Arc<C>, Option<Timestamp>) -> PageStream<R> + Send + Sync>;

/// Factory for the tombstone sequence of one entity kind.
///
/// Only invoked once a watermark exists.
pub type TombstoneFetch<C, K> =
    Arc<dyn Fn(Arc<C>, Timestamp) -> PageStream<Tombstone<K>> + Send + Sync>;

/// One page returned by a continuation-based source.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T, N> {
    /// Records in this page.
    pub items: Vec<T>,
    /// Continuation for the next page, if any.
    pub next: Option<N>,
}

impl<T, N> Page<T, N> {
    /// A page followed by another one.
    pub fn more(items: Vec<T>, next: N) -> Self {
        Self {
            items,
            next: Some(next),
        }
    }

    /// The final page.
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

/// Per-page timeout and retry applied by a fetch source.
#[derive(Debug, Clone, PartialEq)]
pub struct PageFetchPolicy {
    /// Upper bound for one page fetch.
    pub timeout: Option<Duration>,
    /// Retry behavior for transient failures.
    pub retry: RetryConfig,
}

impl Default for PageFetchPolicy {
    fn default() -> Self {
        Self {
            timeout: None,
            retry: RetryConfig::none(),
        }
    }
}

type Cursor<F, N> = (F, Option<Option<N>>);

async fn next_page<T, N, F, Fut>(
    (mut fetch, cursor): Cursor<F, N>,
) -> Result<Option<(Vec<T>, Cursor<F, N>)>>
where
    F: FnMut(Option<N>) -> Fut,
    Fut: Future<Output = Result<Page<T, N>>>,
{
    let Some(token) = cursor else {
        return Ok(None);
    };

    let page = fetch(token).await?;
    Ok(Some((page.items, (fetch, page.next.map(Some)))))
}

/// Build a page sequence from a continuation-token fetcher.
///
/// `fetch(None)` loads the first page; every page's `next` token is passed
/// to the following call until a page without one is returned. Pages are
/// fetched one at a time, in order.
pub fn paginate<T, N, F, Fut>(fetch: F) -> PageStream<T>
where
    T: Send + 'static,
    N: Send + 'static,
    F: FnMut(Option<N>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Page<T, N>>> + Send + 'static,
{
    stream::try_unfold((fetch, Some(None)), next_page::<T, N, F, Fut>).boxed()
}

async fn bounded<T, Fut>(timeout: Option<Duration>, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::Timeout(format!("page fetch exceeded {:?}", limit)))?,
        None => fut.await,
    }
}

/// Like [`paginate`], with every page fetch bounded by `policy`.
///
/// A page that times out or fails transiently is requested again with the
/// same continuation token.
pub fn paginate_with_policy<T, N, F, Fut>(policy: PageFetchPolicy, fetch: F) -> PageStream<T>
where
    T: Send + 'static,
    N: Clone + Send + Sync + 'static,
    F: Fn(Option<N>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Page<T, N>>> + Send + 'static,
{
    let fetch = Arc::new(fetch);
    let executor = RetryExecutor::new(policy.retry);
    let timeout = policy.timeout;

    paginate(move |token: Option<N>| {
        let fetch = fetch.clone();
        let executor = executor.clone();
        async move {
            let call = fetch.as_ref();
            executor
                .execute(|| bounded(timeout, call(token.clone())))
                .await
        }
    })
}

/// A page sequence over pages that are already in memory.
pub fn fixed_pages<T: Send + 'static>(pages: Vec<Vec<T>>) -> PageStream<T> {
    stream::iter(pages.into_iter().map(Ok)).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_paginate_follows_continuations() {
        let calls = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = calls.clone();

        let pages = paginate(move |token: Option<u32>| {
            seen.lock().unwrap().push(token);
            async move {
                Ok(match token {
                    None => Page::more(vec!["a", "b"], 1),
                    Some(1) => Page::more(vec!["c"], 2),
                    Some(_) => Page::last(vec!["d"]),
                })
            }
        });

        let collected: Vec<Vec<&str>> = pages.try_collect().await.unwrap();
        assert_eq!(collected, vec![vec!["a", "b"], vec!["c"], vec!["d"]]);
        assert_eq!(*calls.lock().unwrap(), vec![None, Some(1), Some(2)]);
    }

    #[tokio::test]
    async fn test_paginate_is_lazy() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let mut pages = paginate(move |_token: Option<u32>| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(Page::more(vec![1], 0)) }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        pages.try_next().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_paginate_stops_on_error() {
        let pages = paginate(|token: Option<u32>| async move {
            match token {
                None => Ok(Page::more(vec![1], 1)),
                Some(_) => Err(Error::Fetch("continuation expired".to_string())),
            }
        });

        let result: Result<Vec<Vec<i32>>> = pages.try_collect().await;
        assert!(matches!(result, Err(Error::Fetch(_))));
    }

    #[tokio::test]
    async fn test_policy_retries_same_token() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let policy = PageFetchPolicy {
            timeout: None,
            retry: RetryConfig::new(2)
                .with_initial_delay(Duration::from_millis(1))
                .with_jitter(false),
        };

        let pages = paginate_with_policy(policy, move |token: Option<u32>| {
            let counter = counter.clone();
            async move {
                match token {
                    None => Ok(Page::more(vec![1], 7)),
                    Some(7) if counter.fetch_add(1, Ordering::SeqCst) == 0 => {
                        Err(Error::Fetch("reset".to_string()))
                    }
                    Some(_) => Ok(Page::last(vec![2])),
                }
            }
        });

        let collected: Vec<Vec<i32>> = pages.try_collect().await.unwrap();
        assert_eq!(collected, vec![vec![1], vec![2]]);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_policy_timeout() {
        let policy = PageFetchPolicy {
            timeout: Some(Duration::from_secs(5)),
            retry: RetryConfig::none(),
        };

        let pages = paginate_with_policy(policy, |_token: Option<u32>| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Page::last(vec![1]))
        });

        let result: Result<Vec<Vec<i32>>> = pages.try_collect().await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn test_fixed_pages() {
        let collected: Vec<Vec<i32>> = fixed_pages(vec![vec![1, 2], vec![], vec![3]])
            .try_collect()
            .await
            .unwrap();
        assert_eq!(collected.concat(), vec![1, 2, 3]);
    }
}
