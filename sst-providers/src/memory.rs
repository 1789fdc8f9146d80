//! In-process object client
//!
//! Behaves like an S3 endpoint for listing order, pagination, idempotent
//! removal and missing-bucket errors. Used for dry runs and tests.

use crate::object::{ObjectClient, ObjectInfo, ObjectPage};
use async_trait::async_trait;
use bytes::Bytes;
use sst_core::error::{SstError, SstResult};
use std::collections::BTreeMap;
use std::ops::Bound;
use tokio::sync::RwLock;

const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: Option<String>,
}

type Bucket = BTreeMap<String, StoredObject>;

pub struct MemoryClient {
    buckets: RwLock<BTreeMap<String, Bucket>>,
    page_size: usize,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(BTreeMap::new()),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_bucket(mut self, name: impl Into<String>) -> Self {
        self.buckets.get_mut().entry(name.into()).or_default();
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub async fn create_bucket(&self, name: impl Into<String>) {
        self.buckets.write().await.entry(name.into()).or_default();
    }

    pub async fn object_count(&self, bucket: &str) -> usize {
        self.buckets
            .read()
            .await
            .get(bucket)
            .map(|b| b.len())
            .unwrap_or(0)
    }

    pub async fn content_type(&self, bucket: &str, key: &str) -> Option<String> {
        self.buckets
            .read()
            .await
            .get(bucket)
            .and_then(|b| b.get(key))
            .and_then(|o| o.content_type.clone())
    }
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectClient for MemoryClient {
    fn name(&self) -> &str {
        "memory"
    }

    async fn bucket_exists(&self, bucket: &str) -> SstResult<bool> {
        Ok(self.buckets.read().await.contains_key(bucket))
    }

    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> SstResult<ObjectPage> {
        let buckets = self.buckets.read().await;
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| SstError::BucketNotFound(bucket.to_string()))?;

        let lower = match continuation {
            Some(token) => Bound::Excluded(token),
            None => Bound::Included(prefix.to_string()),
        };

        let mut page: Vec<ObjectInfo> = objects
            .range((lower, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .take(self.page_size + 1)
            .map(|(key, object)| ObjectInfo {
                key: key.clone(),
                size: object.data.len() as u64,
            })
            .collect();

        let next_continuation = if page.len() > self.page_size {
            page.truncate(self.page_size);
            page.last().map(|o| o.key.clone())
        } else {
            None
        };

        Ok(ObjectPage {
            objects: page,
            next_continuation,
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> SstResult<()> {
        let mut buckets = self.buckets.write().await;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| SstError::BucketNotFound(bucket.to_string()))?;
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.map(String::from),
            },
        );
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> SstResult<Bytes> {
        let buckets = self.buckets.read().await;
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| SstError::BucketNotFound(bucket.to_string()))?;
        objects
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| SstError::NotFound(format!("{}/{}", bucket, key)))
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> SstResult<()> {
        let mut buckets = self.buckets.write().await;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| SstError::BucketNotFound(bucket.to_string()))?;
        objects.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pagination_tokens() {
        let client = MemoryClient::new().with_bucket("b").with_page_size(2);
        for key in ["p/1", "p/2", "p/3", "q/1"] {
            client.put_object("b", key, Bytes::from_static(b"x"), None).await.unwrap();
        }

        let first = client.list_page("b", "p/", None).await.unwrap();
        assert_eq!(first.objects.len(), 2);
        assert_eq!(first.next_continuation.as_deref(), Some("p/2"));

        let second = client.list_page("b", "p/", first.next_continuation).await.unwrap();
        let keys: Vec<_> = second.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["p/3"]);
        assert!(second.next_continuation.is_none());
    }

    #[tokio::test]
    async fn test_missing_bucket() {
        let client = MemoryClient::new();
        assert!(!client.bucket_exists("b").await.unwrap());
        let err = client.list_page("b", "", None).await.unwrap_err();
        assert!(matches!(err, SstError::BucketNotFound(_)));

        client.create_bucket("b").await;
        assert!(client.bucket_exists("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_absent_is_ok() {
        let client = MemoryClient::new().with_bucket("b");
        client.remove_object("b", "nothing").await.unwrap();
        assert!(client.get_object("b", "nothing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_content_type_kept() {
        let client = MemoryClient::new().with_bucket("b");
        client
            .put_object("b", "example/", Bytes::new(), Some("application/x-directory"))
            .await
            .unwrap();
        assert_eq!(
            client.content_type("b", "example/").await.as_deref(),
            Some("application/x-directory")
        );
    }
}
