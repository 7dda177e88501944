//! Generic resource API.
//!
//! One [`ResourceApi`] covers the standard operations every platform
//! resource exposes: create, upsert, retrieve, update, delete, search,
//! and cursor-paginated listing. Mutating operations are chunked
//! through the bulk coordinator; results come back [`Tracked`] so the
//! originating response's metadata stays retrievable.

use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::bulk::{chunk, execute_chunks, ExecutionMode};
use crate::defaults::CHUNK_SIZE;
use crate::error::Error;
use crate::execution::http::ApiHttpClient;
use crate::metadata::{MetadataMap, Tracked};
use crate::pagination::{ListResponse, PageFetcher};
use crate::types::{CursorPage, HttpRequest, HttpResponse, ItemsWrapper};

/// Typed access to one resource family under a project.
pub struct ResourceApi {
    resource_path: String,
    http: Arc<ApiHttpClient>,
    metadata: Arc<MetadataMap>,
    chunk_size: usize,
}

impl ResourceApi {
    pub fn new(
        resource_path: impl Into<String>,
        http: Arc<ApiHttpClient>,
        metadata: Arc<MetadataMap>,
    ) -> Self {
        Self {
            resource_path: resource_path.into(),
            http,
            metadata,
            chunk_size: CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn resource_path(&self) -> &str {
        &self.resource_path
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.resource_path)
    }

    /// Creates items, one sequential request per chunk.
    ///
    /// Sequential dispatch keeps a mid-stream failure from racing
    /// against later chunks of the same call.
    pub async fn create<I, R>(&self, items: &[I]) -> Result<Tracked<Vec<R>>, Error>
    where
        I: Serialize + Clone,
        R: Serialize + DeserializeOwned,
    {
        self.items_call(&self.resource_path, items, ExecutionMode::Sequential)
            .await
    }

    pub async fn upsert<I, R>(&self, items: &[I]) -> Result<Tracked<Vec<R>>, Error>
    where
        I: Serialize + Clone,
        R: Serialize + DeserializeOwned,
    {
        self.items_call(&self.url("/upsert"), items, ExecutionMode::Sequential)
            .await
    }

    /// Looks up items by their identifiers, chunks in parallel.
    pub async fn retrieve<I, R>(&self, ids: &[I]) -> Result<Tracked<Vec<R>>, Error>
    where
        I: Serialize + Clone,
        R: Serialize + DeserializeOwned,
    {
        self.items_call(&self.url("/byids"), ids, ExecutionMode::Parallel)
            .await
    }

    pub async fn update<I, R>(&self, changes: &[I]) -> Result<Tracked<Vec<R>>, Error>
    where
        I: Serialize + Clone,
        R: Serialize + DeserializeOwned,
    {
        self.items_call(&self.url("/update"), changes, ExecutionMode::Parallel)
            .await
    }

    /// Deletes items by their identifiers, chunks in parallel.
    pub async fn delete<I>(&self, ids: &[I]) -> Result<Tracked<()>, Error>
    where
        I: Serialize + Clone,
    {
        let url = self.url("/delete");
        let chunks = chunk(ids, self.chunk_size);
        let responses = execute_chunks(chunks, ExecutionMode::Parallel, |chunk| {
            let url = url.clone();
            async move {
                self.http
                    .request_json::<ItemsWrapper<Value>>(
                        HttpRequest::post(url).with_body(json!({ "items": chunk })),
                    )
                    .await
            }
        })
        .await?;
        Ok(self.track_merged(responses).map(|_| ()))
    }

    /// Free-text / filtered search; a single non-chunked request.
    pub async fn search<Q, R>(&self, query: &Q) -> Result<Tracked<Vec<R>>, Error>
    where
        Q: Serialize,
        R: DeserializeOwned,
    {
        let response = self
            .http
            .request_json::<ItemsWrapper<R>>(
                HttpRequest::post(self.url("/search")).with_json(query)?,
            )
            .await?;
        let HttpResponse {
            data,
            status,
            headers,
        } = response;
        let source = HttpResponse {
            data: (),
            status,
            headers,
        };
        Ok(self.metadata.track(data.items, &source))
    }

    /// Starts a cursor-paginated listing with the given filter body.
    pub async fn list<R>(&self, filter: Value) -> Result<ListResponse<R>, Error>
    where
        R: DeserializeOwned + Send + 'static,
    {
        let fetch = self.page_fetcher::<R>(filter);
        let first = (fetch)(None).await?;
        Ok(ListResponse::new(first, fetch))
    }

    fn page_fetcher<R>(&self, filter: Value) -> PageFetcher<R>
    where
        R: DeserializeOwned + Send + 'static,
    {
        let http = Arc::clone(&self.http);
        let url = self.url("/list");
        Arc::new(move |cursor| {
            let http = Arc::clone(&http);
            let url = url.clone();
            let mut body = filter.clone();
            async move {
                if !body.is_object() {
                    body = json!({});
                }
                if let (Some(cursor), Some(map)) = (cursor, body.as_object_mut()) {
                    map.insert("cursor".into(), Value::String(cursor));
                }
                let response = http
                    .request_json::<CursorPage<R>>(HttpRequest::post(url).with_body(body))
                    .await?;
                Ok(response.data)
            }
            .boxed()
        })
    }

    async fn items_call<I, R>(
        &self,
        url: &str,
        items: &[I],
        mode: ExecutionMode,
    ) -> Result<Tracked<Vec<R>>, Error>
    where
        I: Serialize + Clone,
        R: Serialize + DeserializeOwned,
    {
        let chunks = chunk(items, self.chunk_size);
        let responses = execute_chunks(chunks, mode, |chunk| {
            let url = url.to_string();
            async move {
                self.http
                    .request_json::<ItemsWrapper<R>>(
                        HttpRequest::post(url).with_body(json!({ "items": chunk })),
                    )
                    .await
            }
        })
        .await?;
        Ok(self.track_merged(responses))
    }

    /// Merges chunk responses in order and records the first response's
    /// metadata for the whole call.
    fn track_merged<R>(&self, responses: Vec<HttpResponse<ItemsWrapper<R>>>) -> Tracked<Vec<R>> {
        let metadata_source = responses
            .first()
            .map(|r| HttpResponse {
                data: (),
                status: r.status,
                headers: r.headers.clone(),
            })
            .unwrap_or(HttpResponse {
                data: (),
                status: 200,
                headers: Default::default(),
            });
        let items = responses
            .into_iter()
            .flat_map(|r| r.data.items)
            .collect();
        self.metadata.track(items, &metadata_source)
    }
}
