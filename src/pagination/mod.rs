//! Cursor pagination.
//!
//! Listing endpoints return one page plus an opaque `nextCursor`.
//! [`AutoPager`] walks the cursor chain on demand; no page is fetched
//! until the consumer asks for an item beyond what is buffered.

use futures::stream::BoxStream;
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::defaults::LIST_LIMIT;
use crate::error::Error;
use crate::types::CursorPage;

/// Fetches one page for the given cursor (`None` for the first page).
pub type PageFetcher<T> =
    Arc<dyn Fn(Option<String>) -> BoxFuture<'static, Result<CursorPage<T>, Error>> + Send + Sync>;

/// Upper bound on how many items [`AutoPager::to_array`] materializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLimit {
    Count(usize),
    Unbounded,
}

impl Default for PageLimit {
    fn default() -> Self {
        PageLimit::Count(LIST_LIMIT)
    }
}

/// Servers signal the last page by omitting the cursor or sending an
/// empty one; both mean there is no next page.
fn live_cursor(cursor: Option<String>) -> Option<String> {
    cursor.filter(|c| !c.is_empty())
}

/// Demand-driven iterator over a cursor-paginated listing.
///
/// Fetches the next page only when the buffer runs dry and a cursor
/// remains. A page with zero items but a cursor advances to the next
/// page rather than ending iteration.
pub struct AutoPager<T> {
    fetch: PageFetcher<T>,
    buffer: VecDeque<T>,
    cursor: Option<String>,
    started: bool,
    exhausted: bool,
}

impl<T> AutoPager<T> {
    pub fn new(fetch: PageFetcher<T>) -> Self {
        Self {
            fetch,
            buffer: VecDeque::new(),
            cursor: None,
            started: false,
            exhausted: false,
        }
    }

    /// Pager seeded with an already-fetched first page.
    pub fn with_first_page(fetch: PageFetcher<T>, page: CursorPage<T>) -> Self {
        let cursor = live_cursor(page.next_cursor);
        Self {
            fetch,
            buffer: page.items.into(),
            exhausted: cursor.is_none(),
            cursor,
            started: true,
        }
    }

    /// Yields the next item, fetching pages as needed.
    pub async fn next_item(&mut self) -> Result<Option<T>, Error> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }
            if self.exhausted {
                return Ok(None);
            }
            let cursor = self.cursor.take();
            if self.started && cursor.is_none() {
                self.exhausted = true;
                return Ok(None);
            }
            let page = (self.fetch)(cursor).await?;
            self.started = true;
            self.cursor = live_cursor(page.next_cursor);
            if self.cursor.is_none() {
                self.exhausted = true;
            }
            self.buffer = page.items.into();
        }
    }

    /// Calls `visit` for each item; stop early by returning `false`.
    pub async fn for_each<F>(&mut self, mut visit: F) -> Result<(), Error>
    where
        F: FnMut(&T) -> bool,
    {
        while let Some(item) = self.next_item().await? {
            if !visit(&item) {
                break;
            }
        }
        Ok(())
    }

    /// Collects up to `limit` items into a vector.
    pub async fn to_array(&mut self, limit: PageLimit) -> Result<Vec<T>, Error> {
        let cap = match limit {
            PageLimit::Count(0) => return Ok(Vec::new()),
            PageLimit::Count(n) => Some(n),
            PageLimit::Unbounded => None,
        };
        let mut items = Vec::new();
        while let Some(item) = self.next_item().await? {
            items.push(item);
            if cap.is_some_and(|cap| items.len() >= cap) {
                break;
            }
        }
        Ok(items)
    }
}

impl<T: Send + 'static> AutoPager<T> {
    /// Consumes the pager into an item stream.
    pub fn into_stream(mut self) -> BoxStream<'static, Result<T, Error>> {
        Box::pin(async_stream::try_stream! {
            while let Some(item) = self.next_item().await? {
                yield item;
            }
        })
    }
}

/// First page of a listing together with the means to continue it.
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
    fetch: PageFetcher<T>,
}

impl<T> ListResponse<T> {
    pub fn new(page: CursorPage<T>, fetch: PageFetcher<T>) -> Self {
        Self {
            items: page.items,
            next_cursor: live_cursor(page.next_cursor),
            fetch,
        }
    }

    /// Fetches the page after this one, or `None` at the end.
    pub async fn next_page(&self) -> Result<Option<ListResponse<T>>, Error> {
        let Some(cursor) = self.next_cursor.clone() else {
            return Ok(None);
        };
        let page = (self.fetch)(Some(cursor)).await?;
        Ok(Some(ListResponse::new(page, Arc::clone(&self.fetch))))
    }
}

impl<T: Clone> ListResponse<T> {
    /// Pager over the remainder of the listing, starting from this page.
    pub fn pager(&self) -> AutoPager<T> {
        AutoPager::with_first_page(
            Arc::clone(&self.fetch),
            CursorPage {
                items: self.items.clone(),
                next_cursor: self.next_cursor.clone(),
            },
        )
    }
}
