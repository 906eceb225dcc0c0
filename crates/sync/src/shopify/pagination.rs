//! Collection pagination.

use std::future::Future;

use storepulse_core::EntityKind;
use tracing::debug;

use super::{FetchError, Protocol, Retrier, ShopifyError};

/// One page of a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Continuation token for the next page; `None` on the last page.
    pub next: Option<String>,
}

impl<T> Page<T> {
    #[must_use]
    pub const fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

/// Walk a collection page by page until no continuation token remains.
///
/// `fetch_page` receives the token of the page to fetch (`None` for the
/// first). Every call goes through `retrier`.
///
/// # Errors
///
/// Returns a `FetchError` tagged with `resource` and `protocol` as soon as
/// one page fails for good. Items of earlier pages are discarded.
pub async fn paginate<T, F, Fut>(
    retrier: &Retrier,
    resource: EntityKind,
    protocol: Protocol,
    mut fetch_page: F,
) -> Result<Vec<T>, FetchError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, ShopifyError>>,
{
    let mut items = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0_usize;

    loop {
        let page = retrier
            .run(resource.as_str(), || fetch_page(cursor.clone()))
            .await
            .map_err(|source| FetchError {
                resource,
                protocol,
                source,
            })?;

        pages += 1;
        let page_len = page.items.len();
        items.extend(page.items);
        debug!(
            resource = %resource,
            protocol = %protocol,
            page = pages,
            page_len,
            total = items.len(),
            has_next = page.next.is_some(),
            "Fetched page"
        );

        match page.next {
            Some(next) => cursor = Some(next),
            None => return Ok(items),
        }
    }
}
