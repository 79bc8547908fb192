//! # Remote Store
//!
//! [`DocumentStore`] over the `/replication` endpoints of another avotrace
//! server. This is the remote tier of a
//! [`TieredStore`](avotrace_core::TieredStore). It is also a [`BlobStore`]
//! over `/replication/blobs`, so document contents can follow their
//! metadata.
//!
//! The client is blocking; call it from a blocking thread
//! (`tokio::task::spawn_blocking`), never from an async task.

use crate::api::{
    CommitRequest, CommitResponse, ErrorResponse, ReplicatedDocument, ReplicationOp,
    ReplicationScan, USER_HEADER,
};
use avotrace_core::{
    BlobStore, Collection, DocumentStore, RecordId, StoredDocument, TraceError, WriteOp,
};
use reqwest::{StatusCode, Url};
use reqwest::blocking::{Client, Response};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use std::time::Duration;

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// User the sync client acts as on the remote.
const SYNC_USER: &str = "avotrace-sync";

fn remote_err(e: reqwest::Error) -> TraceError {
    TraceError::Remote(e.to_string())
}

/// HTTP client for a remote avotrace server.
#[derive(Debug, Clone)]
pub struct RemoteStore {
    client: Client,
    base_url: String,
}

impl RemoteStore {
    /// Build a client for `base_url`, authenticating with `api_key` if set.
    pub fn new(base_url: &str, api_key: Option<&str>) -> Result<Self, TraceError> {
        let base_url = base_url.trim().trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(TraceError::InvalidInput(format!(
                "remote url must start with http:// or https://, got {base_url:?}"
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(USER_HEADER, HeaderValue::from_static(SYNC_USER));
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|_| TraceError::InvalidInput("API key is not a valid header".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(remote_err)?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// URL of a blob, with each key segment percent-encoded.
    fn blob_url(&self, key: &str) -> Result<Url, TraceError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| TraceError::InvalidInput(format!("invalid remote url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| TraceError::InvalidInput("remote url cannot take a path".to_string()))?
            .pop_if_empty()
            .extend(["replication", "blobs"])
            .extend(key.split('/'));
        Ok(url)
    }
}

/// Turn an error response into a [`TraceError`].
///
/// 409 carries the conflict details so the sync engine can resolve it.
fn error_from(response: Response) -> TraceError {
    let status = response.status();
    let body: Option<ErrorResponse> = response.json().ok();
    let message = body
        .as_ref()
        .map(|b| b.error.clone())
        .unwrap_or_else(|| status.to_string());

    if status == StatusCode::CONFLICT {
        if let Some(c) = body.and_then(|b| b.conflict) {
            return TraceError::VersionConflict {
                collection: c.collection,
                id: c.id,
                expected: c.expected,
                found: c.found,
            };
        }
    }
    if status == StatusCode::BAD_REQUEST {
        return TraceError::InvalidInput(message);
    }
    TraceError::Remote(format!("{}: {}", status, message))
}

impl DocumentStore for RemoteStore {
    fn get(
        &self,
        collection: Collection,
        id: RecordId,
    ) -> Result<Option<StoredDocument>, TraceError> {
        let response = self
            .client
            .get(self.url(&format!("/replication/{}/{}", collection, id)))
            .send()
            .map_err(remote_err)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let doc: ReplicatedDocument = response.json().map_err(remote_err)?;
                let (_, stored) = doc.into_stored()?;
                Ok(Some(stored))
            }
            _ => Err(error_from(response)),
        }
    }

    fn scan(&self, collection: Collection) -> Result<Vec<(RecordId, StoredDocument)>, TraceError> {
        let response = self
            .client
            .get(self.url(&format!("/replication/{}", collection)))
            .send()
            .map_err(remote_err)?;
        if !response.status().is_success() {
            return Err(error_from(response));
        }

        let scan: ReplicationScan = response.json().map_err(remote_err)?;
        let mut documents = scan
            .documents
            .into_iter()
            .map(ReplicatedDocument::into_stored)
            .collect::<Result<Vec<_>, _>>()?;
        documents.sort_by_key(|(id, _)| *id);
        tracing::debug!(%collection, documents = documents.len(), "remote scan");
        Ok(documents)
    }

    fn commit(&mut self, ops: &[WriteOp]) -> Result<Vec<u64>, TraceError> {
        let request = CommitRequest {
            ops: ops.iter().map(ReplicationOp::from).collect(),
        };
        let response = self
            .client
            .post(self.url("/replication/commit"))
            .json(&request)
            .send()
            .map_err(remote_err)?;
        if !response.status().is_success() {
            return Err(error_from(response));
        }

        let committed: CommitResponse = response.json().map_err(remote_err)?;
        if committed.versions.len() != ops.len() {
            return Err(TraceError::Remote(format!(
                "remote returned {} versions for {} operations",
                committed.versions.len(),
                ops.len()
            )));
        }
        Ok(committed.versions)
    }

    /// The remote only accepts versioned writes.
    fn replicate(
        &mut self,
        collection: Collection,
        id: RecordId,
        _doc: Option<StoredDocument>,
    ) -> Result<(), TraceError> {
        Err(TraceError::Remote(format!(
            "cannot replicate {collection}/{id} onto the remote tier"
        )))
    }
}

impl BlobStore for RemoteStore {
    fn put(&self, key: &str, data: &[u8]) -> Result<(), TraceError> {
        let response = self
            .client
            .put(self.blob_url(key)?)
            .body(data.to_vec())
            .send()
            .map_err(remote_err)?;
        if !response.status().is_success() {
            return Err(error_from(response));
        }
        tracing::debug!(%key, bytes = data.len(), "uploaded document content");
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TraceError> {
        let response = self
            .client
            .get(self.blob_url(key)?)
            .send()
            .map_err(remote_err)?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Ok(Some(response.bytes().map_err(remote_err)?.to_vec())),
            _ => Err(error_from(response)),
        }
    }

    /// Contents are removed on the server when their record is deleted.
    fn delete(&self, key: &str) -> Result<bool, TraceError> {
        Err(TraceError::Remote(format!("cannot delete {key} on the remote tier")))
    }

    fn exists(&self, key: &str) -> Result<bool, TraceError> {
        let response = self
            .client
            .head(self.blob_url(key)?)
            .send()
            .map_err(remote_err)?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            _ => Err(error_from(response)),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, TraceError> {
        Err(TraceError::Remote(format!("cannot list {prefix} on the remote tier")))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_urls() {
        assert!(matches!(
            RemoteStore::new("ftp://hub", None),
            Err(TraceError::InvalidInput(_))
        ));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let store = RemoteStore::new("http://hub:8080/", Some("key")).unwrap();
        assert_eq!(store.base_url(), "http://hub:8080");
        assert_eq!(store.url("/replication/lots"), "http://hub:8080/replication/lots");
    }

    #[test]
    fn blob_keys_are_encoded_per_segment() {
        let store = RemoteStore::new("http://hub:8080/", None).unwrap();
        let url = store.blob_url("documents/abc/bill of lading#2.pdf").unwrap();
        assert_eq!(
            url.as_str(),
            "http://hub:8080/replication/blobs/documents/abc/bill%20of%20lading%232.pdf"
        );
    }

    #[test]
    fn replicate_is_refused() {
        let mut store = RemoteStore::new("http://hub:8080", None).unwrap();
        let err = store
            .replicate(Collection::Lots, RecordId::generate(), None)
            .unwrap_err();
        assert!(matches!(err, TraceError::Remote(_)));
    }
}
