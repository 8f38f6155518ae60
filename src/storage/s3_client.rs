// S3-compatible object store (AWS S3, Cloudflare R2, MinIO)
//
// S3 has no per-object TTL, so the expiration instant travels as user
// metadata and is checked on every read. Bulk purge is left to a bucket
// lifecycle rule.

use std::collections::HashMap;
use std::io;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::serde_types::Part;
use s3::Region;
use tracing::{debug, info, warn};

use super::{is_expired, ByteStream, ObjectStore, PutOptions, StorageError, StorageResult, StoredObject};
use crate::config::StorageConfig;

const META_PREFIX: &str = "x-amz-meta-";
const META_ORIGINAL_FILENAME: &str = "original-filename";
const META_EXPIRE_AT: &str = "expire-at";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
/// Multipart part size. S3 needs at least 5 MiB for every part but the last.
const PART_SIZE: usize = 8 * 1024 * 1024;

pub struct S3Store {
    bucket: Box<Bucket>,
}

impl S3Store {
    pub fn new(config: &StorageConfig) -> StorageResult<Self> {
        if config.s3_bucket.is_empty() {
            return Err(StorageError::Config("S3_BUCKET must be set".to_string()));
        }

        let credentials = match (&config.s3_access_key_id, &config.s3_secret_access_key) {
            (Some(access_key), Some(secret_key)) => {
                Credentials::new(Some(access_key.as_str()), Some(secret_key.as_str()), None, None, None)
            }
            _ => Credentials::default(),
        }
        .map_err(|e| StorageError::Config(format!("failed to load S3 credentials: {}", e)))?;

        let endpoint = config
            .s3_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", config.s3_region));
        let region = Region::Custom {
            region: config.s3_region.clone(),
            endpoint,
        };

        let bucket = Bucket::new(&config.s3_bucket, region, credentials)?;
        let bucket = if config.s3_path_style {
            bucket.with_path_style()
        } else {
            bucket
        };

        info!(
            bucket = %config.s3_bucket,
            region = %config.s3_region,
            path_style = config.s3_path_style,
            "S3 object store configured"
        );

        Ok(Self {
            bucket: bucket.into(),
        })
    }

    /// Per-request bucket handle carrying the object's user metadata headers.
    fn bucket_for_put(&self, options: &PutOptions) -> Box<Bucket> {
        let mut bucket = self.bucket.clone();
        for (name, value) in metadata_headers(options) {
            bucket.add_header(&name, &value);
        }
        bucket
    }

    /// Send `first` and then the rest of `body` one part at a time, and
    /// complete the upload. Returns the number of bytes written.
    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        content_type: &str,
        first: Vec<u8>,
        body: &mut ByteStream<'_>,
    ) -> StorageResult<usize> {
        let mut parts: Vec<Part> = Vec::new();
        let mut size = 0;
        let mut part = BodyPart {
            data: first,
            last: false,
        };

        loop {
            size += part.data.len();
            let part_number = parts.len() as u32 + 1;
            let uploaded = self
                .bucket
                .put_multipart_chunk(part.data, key, part_number, upload_id, content_type)
                .await?;
            parts.push(uploaded);
            if part.last {
                break;
            }

            part = next_part(body, PART_SIZE).await?;
            // A body that ends exactly on a part boundary leaves nothing to send.
            if part.data.is_empty() {
                break;
            }
        }

        self.bucket
            .complete_multipart_upload(key, upload_id, parts)
            .await?;
        Ok(size)
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) {
        match self.bucket.abort_upload(key, upload_id).await {
            Ok(()) => debug!(key, upload_id, "Aborted multipart upload"),
            Err(e) => warn!(key, upload_id, error = %e, "Failed to abort multipart upload"),
        }
    }

    async fn delete_expired(&self, key: &str) {
        match self.bucket.delete_object(key).await {
            Ok(_) => debug!(key, "Deleted expired object"),
            Err(e) => warn!(key, error = %e, "Failed to delete expired object"),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, key: &str, mut body: ByteStream<'_>, options: PutOptions) -> StorageResult<()> {
        let bucket = self.bucket_for_put(&options);
        let content_type = options
            .content_type
            .as_deref()
            .unwrap_or(DEFAULT_CONTENT_TYPE);

        let first = next_part(&mut body, PART_SIZE).await?;
        if first.last {
            let size = first.data.len();
            let response = bucket
                .put_object_with_content_type(key, &first.data, content_type)
                .await?;
            if response.status_code() >= 300 {
                return Err(S3Error::HttpFailWithBody(
                    response.status_code(),
                    String::from_utf8_lossy(response.as_slice()).into_owned(),
                )
                .into());
            }
            debug!(key, content_type, size, "Object stored in S3");
            return Ok(());
        }

        let upload_id = bucket
            .initiate_multipart_upload(key, content_type)
            .await?
            .upload_id;
        debug!(key, %upload_id, "Started multipart upload");

        match self
            .upload_parts(key, &upload_id, content_type, first.data, &mut body)
            .await
        {
            Ok(size) => {
                debug!(key, content_type, size, "Object streamed to S3");
                Ok(())
            }
            Err(e) => {
                self.abort_multipart(key, &upload_id).await;
                Err(e)
            }
        }
    }

    async fn get(&self, key: &str) -> StorageResult<Option<StoredObject>> {
        let head = match self.bucket.head_object(key).await {
            Ok((_, 404)) => return Ok(None),
            Ok((head, _)) => head,
            Err(e) if is_not_found(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let metadata = head.metadata.unwrap_or_default();
        let expire_at = expire_at_from_metadata(&metadata);
        if let Some(expire_at) = expire_at {
            if is_expired(expire_at, Utc::now()) {
                self.delete_expired(key).await;
                return Ok(None);
            }
        }

        let response = match self.bucket.get_object_stream(key).await {
            Ok(response) if response.status_code == 404 => return Ok(None),
            Ok(response) => response,
            Err(e) if is_not_found(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let body = response
            .bytes
            .map(|chunk| chunk.map_err(io::Error::other))
            .boxed();

        Ok(Some(StoredObject {
            body,
            content_type: head.content_type,
            original_filename: filename_from_metadata(&metadata),
            expire_at,
            size: head.content_length.and_then(|len| u64::try_from(len).ok()),
        }))
    }

    fn name(&self) -> &'static str {
        "s3"
    }
}

/// One multipart part read off the upload body.
#[derive(Debug)]
struct BodyPart {
    data: Vec<u8>,
    /// The body ended while filling this part.
    last: bool,
}

/// Read at least `part_size` bytes from `body`, or whatever remains if it
/// ends first. Only one part is held in memory at a time.
async fn next_part(body: &mut ByteStream<'_>, part_size: usize) -> io::Result<BodyPart> {
    let mut data = Vec::with_capacity(part_size);
    while data.len() < part_size {
        match body.try_next().await? {
            Some(chunk) => data.extend_from_slice(&chunk),
            None => return Ok(BodyPart { data, last: true }),
        }
    }
    Ok(BodyPart { data, last: false })
}

fn is_not_found(error: &S3Error) -> bool {
    matches!(error, S3Error::HttpFailWithBody(404, _))
}

/// `x-amz-meta-*` headers for an upload. Header values must be ASCII, so the
/// filename is percent-encoded.
fn metadata_headers(options: &PutOptions) -> Vec<(String, String)> {
    vec![
        (
            format!("{}{}", META_PREFIX, META_ORIGINAL_FILENAME),
            urlencoding::encode(&options.original_filename).into_owned(),
        ),
        (
            format!("{}{}", META_PREFIX, META_EXPIRE_AT),
            options.expire_at.to_rfc3339(),
        ),
    ]
}

fn metadata_value<'a>(metadata: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    metadata
        .get(name)
        .or_else(|| metadata.get(&format!("{}{}", META_PREFIX, name)))
        .map(String::as_str)
}

fn filename_from_metadata(metadata: &HashMap<String, String>) -> Option<String> {
    let raw = metadata_value(metadata, META_ORIGINAL_FILENAME)?;
    match urlencoding::decode(raw) {
        Ok(decoded) => Some(decoded.into_owned()),
        Err(_) => Some(raw.to_string()),
    }
}

fn expire_at_from_metadata(metadata: &HashMap<String, String>) -> Option<DateTime<Utc>> {
    let raw = metadata_value(metadata, META_EXPIRE_AT)?;
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| warn!(value = raw, error = %e, "Ignoring unparseable expire-at metadata"))
        .ok()
}
