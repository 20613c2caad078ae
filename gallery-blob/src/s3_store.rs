use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::{primitives::ByteStream as AwsByteStream, Client};

use crate::{
    collect_stream, stream_from_bytes, Annotations, BlobError, BlobResult, BlobStore, ByteStream,
    GetResult, ObjectHead, PutResult, StoreCapabilities,
};

/// Connection settings for an S3-compatible bucket
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Custom endpoint for S3-compatible services; `None` targets AWS
    pub endpoint_url: Option<String>,
    /// Base URL used when building public object URLs
    pub public_url: Option<String>,
}

impl S3Config {
    pub fn new(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            endpoint_url: None,
            public_url: None,
        }
    }

    pub fn with_credentials(mut self, access_key_id: impl Into<String>, secret: impl Into<String>) -> Self {
        self.access_key_id = access_key_id.into();
        self.secret_access_key = secret.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into());
        self
    }

    pub fn with_public_url(mut self, public_url: impl Into<String>) -> Self {
        self.public_url = Some(public_url.into());
        self
    }

    /// Base URL objects are published under.
    pub fn object_base_url(&self) -> String {
        if let Some(public) = &self.public_url {
            return public.trim_end_matches('/').to_string();
        }
        match &self.endpoint_url {
            Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), self.bucket),
            None => format!("https://{}.s3.{}.amazonaws.com", self.bucket, self.region),
        }
    }
}

/// Blob store backed by any S3-compatible service (AWS, MinIO, RustFS, ...)
#[derive(Clone)]
pub struct S3CompatibleStore {
    client: Client,
    bucket: String,
    base_url: String,
}

impl S3CompatibleStore {
    pub async fn connect(config: S3Config) -> BlobResult<Self> {
        if config.bucket.is_empty() {
            return Err(BlobError::invalid("s3 bucket name is required"));
        }
        let base_url = config.object_base_url();
        let bucket = config.bucket.clone();
        let client = Self::create_client(config).await;
        Ok(Self {
            client,
            bucket,
            base_url,
        })
    }

    async fn create_client(config: S3Config) -> Client {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region));

        if !config.access_key_id.is_empty() {
            let credentials = Credentials::new(
                config.access_key_id,
                config.secret_access_key,
                None,
                None,
                "gallery",
            );
            loader = loader.credentials_provider(credentials);
        }

        let custom_endpoint = config.endpoint_url.is_some();
        if let Some(endpoint) = config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }

        let aws_config = loader.load().await;

        Client::from_conf(
            aws_sdk_s3::config::Builder::from(&aws_config)
                // path-style addressing is what self-hosted S3 clones understand
                .force_path_style(custom_endpoint)
                .build(),
        )
    }

    fn map_aws_error(err: impl std::error::Error + Send + Sync + 'static) -> BlobError {
        BlobError::backend(err)
    }

    /// Object metadata must be ASCII; anything else is dropped from the value.
    fn metadata_value(value: &str) -> String {
        value.chars().filter(|c| c.is_ascii() && !c.is_ascii_control()).collect()
    }

    fn metadata_key(key: &str) -> String {
        key.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c.to_ascii_lowercase() } else { '-' })
            .collect()
    }
}

#[async_trait]
impl BlobStore for S3CompatibleStore {
    async fn put(
        &self,
        key: &str,
        content_type: Option<&str>,
        annotations: &Annotations,
        stream: ByteStream,
    ) -> BlobResult<PutResult> {
        let data = collect_stream(stream).await?;
        let size_bytes = data.len() as u64;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(AwsByteStream::from(data));

        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }
        for (name, value) in annotations {
            request = request.metadata(Self::metadata_key(name), Self::metadata_value(value));
        }

        let result = request.send().await.map_err(Self::map_aws_error)?;

        Ok(PutResult {
            etag: result.e_tag,
            size_bytes,
        })
    }

    async fn get(&self, key: &str) -> BlobResult<GetResult> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e.into_service_error() {
                err if err.is_no_such_key() => BlobError::not_found(key),
                err => Self::map_aws_error(err),
            })?;

        let content_type = result.content_type;
        let etag = result.e_tag;
        let body = result.body.collect().await.map_err(Self::map_aws_error)?;
        let bytes = body.into_bytes();

        Ok(GetResult {
            size_bytes: bytes.len() as u64,
            content_type,
            etag,
            stream: stream_from_bytes(bytes),
        })
    }

    async fn head(&self, key: &str) -> BlobResult<ObjectHead> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e.into_service_error() {
                err if err.is_not_found() => BlobError::not_found(key),
                err => Self::map_aws_error(err),
            })?;

        let annotations = result
            .metadata()
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        Ok(ObjectHead {
            size_bytes: result.content_length.unwrap_or(0) as u64,
            content_type: result.content_type,
            etag: result.e_tag,
            last_modified: result.last_modified.map(|dt| dt.secs()),
            annotations,
        })
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        // S3 deletes are idempotent, so probe first to report missing keys.
        self.head(key).await?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(Self::map_aws_error)?;
        Ok(())
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    async fn ping(&self) -> BlobResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(Self::map_aws_error)?;
        Ok(())
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::basic().durable()
    }
}
