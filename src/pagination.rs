//! Cursor pagination over listing endpoints.
//!
//! [`paginate`] turns a `(cursor) -> Page` fetcher into a lazy stream of
//! items. A page is fetched only once the previous page's items have been
//! drained by the consumer, each fetch goes through the retry policy, and
//! the stream ends when a page reports no further cursor. The stream always
//! restarts from the first page; mid-stream resumption is not supported by
//! the vendor (a cursor is only valid against the query that issued it).

use crate::error::Result;
use crate::models::Page;
use crate::retry::RetryPolicy;
use futures::stream::{self, Stream, StreamExt};
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Lazily stream every item across every page of a cursor-paginated query.
///
/// On a page-fetch failure (after retry exhaustion) the error is yielded
/// once and the stream ends.
pub fn paginate<T, F, Fut>(
    fetch: F,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
    page_delay: Duration,
) -> impl Stream<Item = Result<T>>
where
    T: Send,
    F: Fn(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    struct State<T, F> {
        fetch: F,
        retry: RetryPolicy,
        cancel: CancellationToken,
        page_delay: Duration,
        buffer: VecDeque<T>,
        cursor: Option<String>,
        fetched_first: bool,
        finished: bool,
        pages_fetched: u32,
    }

    let state = State {
        fetch,
        retry: retry.clone(),
        cancel: cancel.clone(),
        page_delay,
        buffer: VecDeque::new(),
        cursor: None,
        fetched_first: false,
        finished: false,
        pages_fetched: 0,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.buffer.pop_front() {
                return Some((Ok(item), st));
            }
            if st.finished {
                return None;
            }
            // No more pages to ask for once the last response had no cursor.
            if st.fetched_first && st.cursor.is_none() {
                return None;
            }

            if st.fetched_first && !st.page_delay.is_zero() {
                tokio::time::sleep(st.page_delay).await;
            }

            let cursor = st.cursor.clone();
            let fetched = st
                .retry
                .run("fetch_page", &st.cancel, || (st.fetch)(cursor.clone()))
                .await;

            match fetched {
                Ok(page) => {
                    st.pages_fetched += 1;
                    debug!(
                        page = st.pages_fetched,
                        items = page.items.len(),
                        has_more = page.next_cursor.is_some(),
                        "fetched page"
                    );
                    st.fetched_first = true;
                    st.cursor = page.next_cursor;
                    st.buffer = page.items.into();
                }
                Err(e) => {
                    st.finished = true;
                    return Some((Err(e), st));
                }
            }
        }
    })
}

/// Drain the whole paginated query into a `Vec`, failing on the first
/// page-fetch error.
pub async fn collect_all<T, F, Fut>(
    fetch: F,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
    page_delay: Duration,
) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let stream = paginate(fetch, retry, cancel, page_delay);
    futures::pin_mut!(stream);

    let mut items = Vec::new();
    while let Some(item) = stream.next().await {
        items.push(item?);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;
    use crate::error::AuraError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn pages_fixture(pages: Vec<Vec<u32>>) -> impl Fn(Option<String>) -> futures::future::Ready<Result<Page<u32>>> {
        move |cursor: Option<String>| {
            let index: usize = cursor.map(|c| c.parse().unwrap()).unwrap_or(0);
            let items = pages[index].clone();
            let next = if index + 1 < pages.len() {
                Some((index + 1).to_string())
            } else {
                None
            };
            futures::future::ready(Ok(Page::new(items, next)))
        }
    }

    #[tokio::test]
    async fn test_yields_all_items_in_page_order_with_one_fetch_per_page() {
        let fetches = Arc::new(AtomicU32::new(0));
        let counter = fetches.clone();
        let inner = pages_fixture(vec![vec![1, 2], vec![3], vec![4, 5, 6]]);
        let fetch = move |cursor: Option<String>| {
            counter.fetch_add(1, Ordering::SeqCst);
            inner(cursor)
        };

        let retry = RetryPolicy::none();
        let cancel = CancellationToken::new();
        let items = tokio_test::assert_ok!(collect_all(fetch, &retry, &cancel, Duration::ZERO).await);

        assert_eq!(items, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_first_page_yields_nothing_with_single_fetch() {
        let fetches = Arc::new(AtomicU32::new(0));
        let counter = fetches.clone();
        let fetch = move |_cursor: Option<String>| {
            counter.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Ok(Page::<u32>::last(vec![])))
        };

        let retry = RetryPolicy::none();
        let cancel = CancellationToken::new();
        let items = tokio_test::assert_ok!(collect_all(fetch, &retry, &cancel, Duration::ZERO).await);

        assert!(items.is_empty());
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pages_fetched_lazily() {
        let fetches = Arc::new(AtomicU32::new(0));
        let counter = fetches.clone();
        let inner = pages_fixture(vec![vec![1, 2], vec![3, 4]]);
        let fetch = move |cursor: Option<String>| {
            counter.fetch_add(1, Ordering::SeqCst);
            inner(cursor)
        };

        let retry = RetryPolicy::none();
        let cancel = CancellationToken::new();
        let stream = paginate(fetch, &retry, &cancel, Duration::ZERO);
        futures::pin_mut!(stream);

        // Consuming the first page's items must not touch the second page.
        assert_eq!(stream.next().await.unwrap().unwrap(), 1);
        assert_eq!(stream.next().await.unwrap().unwrap(), 2);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        assert_eq!(stream.next().await.unwrap().unwrap(), 3);
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_page_failure_is_retried() {
        let fetches = Arc::new(AtomicU32::new(0));
        let counter = fetches.clone();
        let fetch = move |_cursor: Option<String>| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(if n == 0 {
                Err(AuraError::Transient("blip".into()))
            } else {
                Ok(Page::last(vec![7u32]))
            })
        };

        let retry = RetryPolicy::new(3, Duration::from_millis(10), 2.0, Duration::from_millis(40));
        let cancel = CancellationToken::new();
        let items = collect_all(fetch, &retry, &cancel, Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(items, vec![7]);
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausted_page_fetch_surfaces_error_and_ends_stream() {
        let fetch = |_cursor: Option<String>| {
            futures::future::ready(Err::<Page<u32>, _>(AuraError::Transient("down".into())))
        };

        let retry = RetryPolicy::new(2, Duration::ZERO, 1.0, Duration::ZERO);
        let cancel = CancellationToken::new();
        let stream = paginate(fetch, &retry, &cancel, Duration::ZERO);
        futures::pin_mut!(stream);

        let first = stream.next().await.unwrap();
        assert!(matches!(
            first.unwrap_err(),
            AuraError::RetriesExhausted { .. }
        ));
        assert!(stream.next().await.is_none());
    }
}
