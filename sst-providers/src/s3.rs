//! S3-compatible object client
//!
//! Works with Isilon/PowerScale OneFS S3, MinIO and AWS S3. Requests are
//! signed with AWS Signature Version 4 and always use path-style URLs.

use crate::object::{ObjectClient, ObjectInfo, ObjectPage};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, Method, StatusCode};
use sst_core::config::ObjectStoreSection;
use sst_core::error::{SstError, SstResult};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// S3 client configuration
#[derive(Clone)]
pub struct S3Config {
    /// `host:port` or a full URL (e.g. "data.ucdenver.pvt:9021")
    pub endpoint: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Scheme used when `endpoint` carries none
    pub secure: bool,
    /// Verify the server certificate
    pub verify_tls: bool,
    /// Permit plain-HTTP endpoints
    pub allow_http: bool,
    pub page_size: Option<u32>,
}

impl S3Config {
    pub fn new(endpoint: &str, access_key: &str, secret_key: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            region: "us-east-1".to_string(),
            access_key_id: access_key.to_string(),
            secret_access_key: secret_key.to_string(),
            secure: true,
            verify_tls: true,
            allow_http: false,
            page_size: None,
        }
    }

    /// Build from the `[object_store]` section and explicitly supplied credentials.
    pub fn from_section(section: &ObjectStoreSection, access_key: &str, secret_key: &str) -> Self {
        Self {
            endpoint: section.endpoint.clone(),
            region: section.region.clone(),
            access_key_id: access_key.to_string(),
            secret_access_key: secret_key.to_string(),
            secure: section.secure,
            verify_tls: section.verify_tls,
            allow_http: section.allow_http,
            page_size: section.page_size,
        }
    }

    pub fn with_allow_http(mut self, allow_http: bool) -> Self {
        self.allow_http = allow_http;
        self
    }

    pub fn with_verify_tls(mut self, verify_tls: bool) -> Self {
        self.verify_tls = verify_tls;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    fn base_url(&self) -> SstResult<Url> {
        let endpoint = self.endpoint.trim().trim_end_matches('/');
        if endpoint.is_empty() {
            return Err(SstError::Config("object store endpoint is empty".into()));
        }

        let raw = if endpoint.contains("://") {
            endpoint.to_string()
        } else if self.secure {
            format!("https://{}", endpoint)
        } else {
            format!("http://{}", endpoint)
        };

        let url = Url::parse(&raw)
            .map_err(|e| SstError::Config(format!("invalid endpoint {:?}: {}", raw, e)))?;

        match url.scheme() {
            "https" => Ok(url),
            "http" if self.allow_http => Ok(url),
            "http" => Err(SstError::Config(format!(
                "endpoint {} is not TLS; plain HTTP must be allowed explicitly",
                raw
            ))),
            other => Err(SstError::Config(format!("unsupported scheme: {}", other))),
        }
    }
}

impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("secure", &self.secure)
            .field("verify_tls", &self.verify_tls)
            .field("allow_http", &self.allow_http)
            .field("page_size", &self.page_size)
            .finish()
    }
}

/// S3 client over a single reused HTTP connection pool
pub struct S3Client {
    config: S3Config,
    base: Url,
    http: Client,
}

impl S3Client {
    pub fn new(config: S3Config) -> SstResult<Self> {
        let base = config.base_url()?;
        let http = Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| SstError::Network(e.to_string()))?;

        if !config.verify_tls {
            tracing::warn!(endpoint = %base, "TLS certificate verification disabled");
        }

        Ok(Self { config, base, http })
    }

    fn host_header(url: &Url) -> String {
        let host = url.host_str().unwrap_or("");
        match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    /// Path-style URL: `{endpoint}/{bucket}/{key}` with each segment encoded.
    fn url(&self, bucket: &str, key: &str, query: &[(String, String)]) -> SstResult<Url> {
        let mut path = format!("/{}", urlencoding::encode(bucket));
        if !key.is_empty() {
            let encoded: Vec<String> = key
                .split('/')
                .map(|seg| urlencoding::encode(seg).into_owned())
                .collect();
            path.push('/');
            path.push_str(&encoded.join("/"));
        }

        let mut url = self.base.clone();
        url.set_path(&path);
        url.set_query(None);
        if !query.is_empty() {
            url.set_query(Some(&canonical_query(query)));
        }
        Ok(url)
    }

    /// Sign a request with AWS Signature Version 4, returning the
    /// Authorization header value. Adds `host`, `x-amz-date` and
    /// `x-amz-content-sha256` to `headers`.
    fn sign(
        &self,
        method: &Method,
        url: &Url,
        query: &[(String, String)],
        headers: &mut BTreeMap<String, String>,
        payload_hash: &str,
        now: DateTime<Utc>,
    ) -> String {
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        headers.insert("host".to_string(), Self::host_header(url));
        headers.insert("x-amz-date".to_string(), amz_date.clone());
        headers.insert("x-amz-content-sha256".to_string(), payload_hash.to_string());

        let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
            .collect();

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method.as_str(),
            url.path(),
            canonical_query(query),
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.config.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            sha256_hex(canonical_request.as_bytes())
        );

        let k_date = hmac_sha256(
            format!("AWS4{}", self.config.secret_access_key).as_bytes(),
            date_stamp.as_bytes(),
        );
        let k_region = hmac_sha256(&k_date, self.config.region.as_bytes());
        let k_service = hmac_sha256(&k_region, b"s3");
        let k_signing = hmac_sha256(&k_service, b"aws4_request");
        let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes()));

        format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.config.access_key_id, credential_scope, signed_headers, signature
        )
    }

    async fn request(
        &self,
        method: Method,
        bucket: &str,
        key: &str,
        query: &[(String, String)],
        body: Option<(Bytes, Option<&str>)>,
    ) -> SstResult<reqwest::Response> {
        let url = self.url(bucket, key, query)?;

        let payload_hash = match &body {
            Some((data, _)) => sha256_hex(data),
            None => EMPTY_PAYLOAD_SHA256.to_string(),
        };

        let mut headers = BTreeMap::new();
        if let Some((_, Some(content_type))) = &body {
            headers.insert("content-type".to_string(), content_type.to_string());
        }
        let auth = self.sign(&method, &url, query, &mut headers, &payload_hash, Utc::now());

        let mut request = self.http.request(method, url);
        for (k, v) in &headers {
            request = request.header(k, v);
        }
        request = request.header(header::AUTHORIZATION, auth);

        if let Some((data, _)) = body {
            request = request.body(data);
        }

        request
            .send()
            .await
            .map_err(|e| SstError::Network(e.to_string()))
    }

    async fn api_error(&self, bucket: &str, key: &str, response: reqwest::Response) -> SstError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if body.contains("<Code>NoSuchBucket</Code>") {
            return SstError::BucketNotFound(bucket.to_string());
        }
        if status == StatusCode::NOT_FOUND {
            return SstError::NotFound(format!("{}/{}", bucket, key));
        }
        let code = extract_tag(&body, "Code").unwrap_or_default();
        SstError::ProviderApi {
            provider: "s3".into(),
            message: format!("{} {}", status, code).trim_end().to_string(),
        }
    }
}

#[async_trait]
impl ObjectClient for S3Client {
    fn name(&self) -> &str {
        "s3"
    }

    async fn bucket_exists(&self, bucket: &str) -> SstResult<bool> {
        let response = self.request(Method::HEAD, bucket, "", &[], None).await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(self.api_error(bucket, "", response).await),
        }
    }

    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> SstResult<ObjectPage> {
        let mut query = vec![("list-type".to_string(), "2".to_string())];
        if !prefix.is_empty() {
            query.push(("prefix".to_string(), prefix.to_string()));
        }
        if let Some(token) = continuation {
            query.push(("continuation-token".to_string(), token));
        }
        if let Some(max_keys) = self.config.page_size {
            query.push(("max-keys".to_string(), max_keys.to_string()));
        }

        let response = self.request(Method::GET, bucket, "", &query, None).await?;
        if !response.status().is_success() {
            let err = self.api_error(bucket, "", response).await;
            return Err(match err {
                SstError::NotFound(_) => SstError::BucketNotFound(bucket.to_string()),
                other => other,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| SstError::Network(e.to_string()))?;
        parse_list_objects_v2(&text)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> SstResult<()> {
        let response = self
            .request(Method::PUT, bucket, key, &[], Some((data, content_type)))
            .await?;
        if !response.status().is_success() {
            return Err(self.api_error(bucket, key, response).await);
        }
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> SstResult<Bytes> {
        let response = self.request(Method::GET, bucket, key, &[], None).await?;
        if !response.status().is_success() {
            return Err(self.api_error(bucket, key, response).await);
        }
        response
            .bytes()
            .await
            .map_err(|e| SstError::Network(e.to_string()))
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> SstResult<()> {
        let response = self.request(Method::DELETE, bucket, key, &[], None).await?;
        if response.status().is_success() {
            return Ok(());
        }
        match self.api_error(bucket, key, response).await {
            SstError::NotFound(_) => Ok(()),
            other => Err(other),
        }
    }
}

/// Sorted, RFC 3986 encoded query string
fn canonical_query(query: &[(String, String)]) -> String {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| (urlencoding::encode(k).into_owned(), urlencoding::encode(v).into_owned()))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Parse a ListObjectsV2 XML response
fn parse_list_objects_v2(xml: &str) -> SstResult<ObjectPage> {
    if !xml.contains("<ListBucketResult") {
        return Err(SstError::ProviderApi {
            provider: "s3".into(),
            message: "unexpected listing response".into(),
        });
    }

    let mut page = ObjectPage::default();
    for block in element_blocks(xml, "Contents") {
        let key = extract_tag(block, "Key").map(|k| xml_unescape(&k)).ok_or_else(|| {
            SstError::ProviderApi {
                provider: "s3".into(),
                message: "listing entry without a key".into(),
            }
        })?;
        let size = extract_tag(block, "Size")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        page.objects.push(ObjectInfo { key, size });
    }

    let truncated = extract_tag(xml, "IsTruncated").as_deref() == Some("true");
    if truncated {
        page.next_continuation =
            extract_tag(xml, "NextContinuationToken").map(|t| xml_unescape(&t));
    }

    Ok(page)
}

/// Bodies of every `<tag>...</tag>` element
fn element_blocks<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let start_tag = format!("<{}>", tag);
    let end_tag = format!("</{}>", tag);
    let mut blocks = Vec::new();
    let mut rest = xml;

    while let Some(start) = rest.find(&start_tag) {
        let content_start = start + start_tag.len();
        match rest[content_start..].find(&end_tag) {
            Some(end) => {
                blocks.push(&rest[content_start..content_start + end]);
                rest = &rest[content_start + end + end_tag.len()..];
            }
            None => break,
        }
    }
    blocks
}

/// Value of the first `<tag>...</tag>` element
fn extract_tag(xml: &str, tag: &str) -> Option<String> {
    element_blocks(xml, tag).first().map(|s| s.to_string())
}

fn xml_unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// SHA-256 hash as hex string
fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// HMAC-SHA256
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC takes keys of any size"),
    };
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mockito::Matcher;

    const LIST_PAGE_ONE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/"><Name>bandicoot</Name><Prefix>example/</Prefix><KeyCount>2</KeyCount><IsTruncated>true</IsTruncated><NextContinuationToken>tok1</NextContinuationToken><Contents><Key>example/</Key><Size>0</Size></Contents><Contents><Key>example/a.tif</Key><LastModified>2025-04-24T22:42:19.000Z</LastModified><Size>4</Size></Contents></ListBucketResult>"#;

    const LIST_PAGE_TWO: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>bandicoot</Name>
  <IsTruncated>false</IsTruncated>
  <Contents>
    <Key>example/b &amp; c.tif</Key>
    <Size>7</Size>
  </Contents>
</ListBucketResult>"#;

    fn client(endpoint: &str) -> S3Client {
        let config = S3Config::new(endpoint, "AKID", "SECRET").with_allow_http(true);
        S3Client::new(config).unwrap()
    }

    #[test]
    fn test_parse_single_line_listing() {
        let page = parse_list_objects_v2(LIST_PAGE_ONE).unwrap();
        assert_eq!(
            page.objects,
            vec![
                ObjectInfo { key: "example/".into(), size: 0 },
                ObjectInfo { key: "example/a.tif".into(), size: 4 },
            ]
        );
        assert_eq!(page.next_continuation.as_deref(), Some("tok1"));
    }

    #[test]
    fn test_parse_multi_line_listing_unescapes_keys() {
        let page = parse_list_objects_v2(LIST_PAGE_TWO).unwrap();
        assert_eq!(page.objects[0].key, "example/b & c.tif");
        assert_eq!(page.objects[0].size, 7);
        assert!(page.next_continuation.is_none());
    }

    #[test]
    fn test_parse_rejects_non_listing() {
        assert!(parse_list_objects_v2("<Error><Code>AccessDenied</Code></Error>").is_err());
    }

    #[test]
    fn test_canonical_query_sorted_and_encoded() {
        let query = vec![
            ("prefix".to_string(), "example/a b".to_string()),
            ("list-type".to_string(), "2".to_string()),
        ];
        assert_eq!(canonical_query(&query), "list-type=2&prefix=example%2Fa%20b");
    }

    #[test]
    fn test_endpoint_requires_tls() {
        let config = S3Config::new("http://localhost:9000", "a", "b");
        assert!(matches!(S3Client::new(config), Err(SstError::Config(_))));

        let config = S3Config::new("data.ucdenver.pvt:9021", "a", "b");
        assert_eq!(config.base_url().unwrap().as_str(), "https://data.ucdenver.pvt:9021/");
    }

    #[test]
    fn test_insecure_section_needs_allow_http() {
        let mut section = ObjectStoreSection {
            endpoint: "minio.local:9000".into(),
            secure: false,
            ..ObjectStoreSection::default()
        };
        let config = S3Config::from_section(&section, "a", "b");
        assert!(matches!(config.base_url(), Err(SstError::Config(_))));

        section.allow_http = true;
        let config = S3Config::from_section(&section, "a", "b");
        assert_eq!(config.base_url().unwrap().as_str(), "http://minio.local:9000/");
        assert!(S3Client::new(config).is_ok());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = S3Config::new("data.ucdenver.pvt:9021", "AKID", "SECRET");
        let rendered = format!("{:?}", config);
        assert!(rendered.contains("AKID"));
        assert!(!rendered.contains("SECRET\""));
    }

    #[test]
    fn test_object_url_encodes_segments() {
        let client = client("http://127.0.0.1:9000");
        let url = client.url("bandicoot", "example/b c.tif", &[]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/bandicoot/example/b%20c.tif");

        let url = client.url("bandicoot", "example/", &[]).unwrap();
        assert_eq!(url.path(), "/bandicoot/example/");
    }

    #[test]
    fn test_signature_shape_is_stable() {
        let client = client("http://127.0.0.1:9000");
        let url = client.url("bandicoot", "example/a.tif", &[]).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 4, 24, 22, 42, 19).unwrap();

        let mut headers = BTreeMap::new();
        let first = client.sign(&Method::GET, &url, &[], &mut headers, EMPTY_PAYLOAD_SHA256, now);
        let mut headers_again = BTreeMap::new();
        let second = client.sign(
            &Method::GET,
            &url,
            &[],
            &mut headers_again,
            EMPTY_PAYLOAD_SHA256,
            now,
        );

        assert_eq!(first, second);
        assert!(first.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKID/20250424/us-east-1/s3/aws4_request, \
             SignedHeaders=host;x-amz-content-sha256;x-amz-date, Signature="
        ));
        assert_eq!(headers.get("host").map(String::as_str), Some("127.0.0.1:9000"));
        assert_eq!(headers.get("x-amz-date").map(String::as_str), Some("20250424T224219Z"));
    }

    #[tokio::test]
    async fn test_bucket_exists() {
        let mut server = mockito::Server::new_async().await;
        let found = server
            .mock("HEAD", "/bandicoot")
            .match_header(
                "authorization",
                Matcher::Regex("^AWS4-HMAC-SHA256 Credential=AKID/".into()),
            )
            .with_status(200)
            .create_async()
            .await;
        server.mock("HEAD", "/missing").with_status(404).create_async().await;

        let client = client(&server.url());
        assert!(client.bucket_exists("bandicoot").await.unwrap());
        assert!(!client.bucket_exists("missing").await.unwrap());
        found.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_page_with_continuation() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/bandicoot")
            .match_query(Matcher::Regex("^list-type=2&prefix=example%2F$".into()))
            .with_status(200)
            .with_body(LIST_PAGE_ONE)
            .create_async()
            .await;
        server
            .mock("GET", "/bandicoot")
            .match_query(Matcher::Regex("continuation-token=tok1".into()))
            .with_status(200)
            .with_body(LIST_PAGE_TWO)
            .create_async()
            .await;

        let client = client(&server.url());
        let first = client.list_page("bandicoot", "example/", None).await.unwrap();
        assert_eq!(first.objects.len(), 2);
        let second = client
            .list_page("bandicoot", "example/", first.next_continuation)
            .await
            .unwrap();
        assert_eq!(second.objects[0].key, "example/b & c.tif");
    }

    #[tokio::test]
    async fn test_list_missing_bucket() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/missing")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body("<Error><Code>NoSuchBucket</Code></Error>")
            .create_async()
            .await;

        let err = client(&server.url()).list_page("missing", "", None).await.unwrap_err();
        assert!(matches!(err, SstError::BucketNotFound(_)));
    }

    #[tokio::test]
    async fn test_put_sends_body_and_content_type() {
        let mut server = mockito::Server::new_async().await;
        let put = server
            .mock("PUT", "/bandicoot/example/")
            .match_header("content-type", "application/x-directory")
            .match_header("x-amz-content-sha256", EMPTY_PAYLOAD_SHA256)
            .with_status(200)
            .create_async()
            .await;

        client(&server.url())
            .put_object("bandicoot", "example/", Bytes::new(), Some("application/x-directory"))
            .await
            .unwrap();
        put.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_object_and_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/bandicoot/example/a.tif")
            .with_status(200)
            .with_body("AAAA")
            .create_async()
            .await;
        server
            .mock("GET", "/bandicoot/example/gone.tif")
            .with_status(404)
            .with_body("<Error><Code>NoSuchKey</Code></Error>")
            .create_async()
            .await;

        let client = client(&server.url());
        let data = client.get_object("bandicoot", "example/a.tif").await.unwrap();
        assert_eq!(&data[..], b"AAAA");
        let err = client.get_object("bandicoot", "example/gone.tif").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_remove_absent_object_is_ok() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/bandicoot/example/gone.tif")
            .with_status(404)
            .with_body("<Error><Code>NoSuchKey</Code></Error>")
            .create_async()
            .await;
        server
            .mock("DELETE", "/bandicoot/example/a.tif")
            .with_status(204)
            .create_async()
            .await;
        server
            .mock("DELETE", "/bandicoot/example/locked.tif")
            .with_status(403)
            .with_body("<Error><Code>AccessDenied</Code></Error>")
            .create_async()
            .await;

        let client = client(&server.url());
        client.remove_object("bandicoot", "example/a.tif").await.unwrap();
        client.remove_object("bandicoot", "example/gone.tif").await.unwrap();
        let err = client.remove_object("bandicoot", "example/locked.tif").await.unwrap_err();
        assert!(matches!(err, SstError::ProviderApi { ref message, .. } if message.contains("AccessDenied")));
    }
}
