use super::{ObjectMeta, ObjectStore, StorageConfig, StoreError, StoreResult};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::Region,
    error::{DisplayErrorContext, ProvideErrorMetadata},
    primitives::ByteStream,
    Client,
};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

/// [`ObjectStore`] backed by S3 or any S3-compatible endpoint (MinIO).
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub async fn new(config: &StorageConfig) -> Self {
        debug!("Initializing object store with config: {:?}", config.endpoint);

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "partload-storage",
            ));
        }

        let sdk_config = loader.load().await;
        let mut s3_config_builder =
            aws_sdk_s3::config::Builder::from(&sdk_config).force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!(region = %config.region, "Object store client initialized");

        Self { client }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn transient(op: &str, err: impl std::error::Error) -> StoreError {
    StoreError::Transient(format!("{} failed: {}", op, DisplayErrorContext(err)))
}

fn to_chrono(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self))]
    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Vec<u8>> {
        debug!("Downloading from s3://{}/{}", bucket, key);

        let response = match self.client.get_object().bucket(bucket).key(key).send().await {
            Ok(response) => response,
            Err(err) => {
                if err.as_service_error().is_some_and(|e| e.is_no_such_key()) {
                    return Err(StoreError::not_found(bucket, key));
                }
                return Err(transient("GetObject", err));
            }
        };

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| transient("GetObject body", e))?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), bucket, key);

        Ok(data)
    }

    #[instrument(skip(self, body))]
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> StoreResult<()> {
        debug!("Uploading {} bytes to s3://{}/{}", body.len(), bucket, key);

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| transient("PutObject", e))?;

        info!("Successfully uploaded to s3://{}/{}", bucket, key);

        Ok(())
    }

    #[instrument(skip(self))]
    async fn copy_object(&self, bucket: &str, src_key: &str, dst_key: &str) -> StoreResult<()> {
        debug!(
            "Copying s3://{}/{} to s3://{}/{}",
            bucket, src_key, bucket, dst_key
        );

        let copy_source = format!("{}/{}", bucket, src_key);

        match self
            .client
            .copy_object()
            .bucket(bucket)
            .copy_source(&copy_source)
            .key(dst_key)
            .send()
            .await
        {
            Ok(_) => {}
            Err(err) => {
                if err
                    .as_service_error()
                    .and_then(|e| e.code())
                    .is_some_and(|code| code == "NoSuchKey")
                {
                    return Err(StoreError::not_found(bucket, src_key));
                }
                return Err(transient("CopyObject", err));
            }
        }

        info!(
            "Successfully copied s3://{}/{} to s3://{}/{}",
            bucket, src_key, bucket, dst_key
        );

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        debug!("Deleting s3://{}/{}", bucket, key);

        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| transient("DeleteObject", e))?;

        info!("Successfully deleted s3://{}/{}", bucket, key);

        Ok(())
    }

    #[instrument(skip(self))]
    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<Option<ObjectMeta>> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(response) => Ok(Some(ObjectMeta {
                key: key.to_string(),
                size: response.content_length().unwrap_or(0).max(0) as u64,
                last_modified: response.last_modified().and_then(to_chrono),
            })),
            Err(err) => {
                if err.as_service_error().is_some_and(|e| e.is_not_found()) {
                    Ok(None)
                } else {
                    Err(transient("HeadObject", err))
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn list_objects(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<ObjectMeta>> {
        debug!("Listing objects in s3://{}/{}", bucket, prefix);

        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| transient("ListObjectsV2", e))?;

            objects.extend(response.contents().iter().filter_map(|obj| {
                obj.key().map(|key| ObjectMeta {
                    key: key.to_string(),
                    size: obj.size().unwrap_or(0).max(0) as u64,
                    last_modified: obj.last_modified().and_then(to_chrono),
                })
            }));

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        debug!("Listed {} objects under s3://{}/{}", objects.len(), bucket, prefix);

        Ok(objects)
    }
}
