use anyhow::Result;
use object_store::{ObjectStore, aws::AmazonS3Builder, local::LocalFileSystem, memory::InMemory};
use std::sync::Arc;
use url::Url;

/// Parse and check an archive URL.
///
/// Supported forms:
/// - `memory://` one in-memory store per bucket
/// - `file:///path/to/root` each bucket is a directory below the root
/// - `s3://[access_key:secret_key@]host[:port]` each bucket is an S3 bucket
pub fn parse_archive_url(url: &str) -> Result<Url> {
    let parsed =
        Url::parse(url).map_err(|e| anyhow::anyhow!("Invalid archive URL '{}': {}", url, e))?;

    match parsed.scheme() {
        "memory" => {}
        "file" => {
            let path = parsed.path();
            if path.is_empty() || path == "/" {
                return Err(anyhow::anyhow!(
                    "File archive URL must specify a path: file:///path/to/archive"
                ));
            }
        }
        "s3" => {
            if parsed.host_str().is_none_or(str::is_empty) {
                return Err(anyhow::anyhow!(
                    "S3 archive URL must specify a host: s3://host[:port]"
                ));
            }
        }
        scheme => {
            return Err(anyhow::anyhow!(
                "Unsupported archive scheme: {}. Supported: file, memory, s3",
                scheme
            ));
        }
    }

    Ok(parsed)
}

/// Create the object store that holds `bucket` under an archive URL
/// previously accepted by [`parse_archive_url`].
pub fn create_bucket_store(url: &Url, bucket: &str, region: &str) -> Result<Arc<dyn ObjectStore>> {
    if bucket.is_empty() || bucket.contains('/') {
        return Err(anyhow::anyhow!("Invalid bucket name '{}'", bucket));
    }

    match url.scheme() {
        "memory" => Ok(Arc::new(InMemory::new())),
        "file" => {
            let root = std::path::Path::new(url.path()).join(bucket);
            std::fs::create_dir_all(&root)?;
            Ok(Arc::new(LocalFileSystem::new_with_prefix(root)?))
        }
        "s3" => {
            let builder = create_s3_builder(url, bucket, region)?;
            Ok(Arc::new(builder.build()?))
        }
        scheme => Err(anyhow::anyhow!(
            "Unsupported archive scheme: {}. Supported: file, memory, s3",
            scheme
        )),
    }
}

/// Create an S3 builder for one bucket.
/// URL format: s3://[access_key:secret_key@]host[:port]
pub fn create_s3_builder(url: &Url, bucket: &str, region: &str) -> Result<AmazonS3Builder> {
    let host = url
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("Missing S3 host in archive URL"))?;
    let port = url.port();

    let mut builder = AmazonS3Builder::new()
        .with_bucket_name(bucket)
        .with_region(region);

    let access_key = url.username();
    let secret_key = url.password().unwrap_or("");

    if !access_key.is_empty() {
        builder = builder
            .with_access_key_id(access_key)
            .with_secret_access_key(secret_key);
    } else {
        if let Ok(env_key) = std::env::var("AWS_ACCESS_KEY_ID") {
            builder = builder.with_access_key_id(env_key);
        }
        if let Ok(env_secret) = std::env::var("AWS_SECRET_ACCESS_KEY") {
            builder = builder.with_secret_access_key(env_secret);
        }
    }

    // S3-compatible services (MinIO and friends) need an explicit endpoint
    if !host.contains("amazonaws.com") {
        let scheme = if port == Some(443) { "https" } else { "http" };
        let endpoint = match port {
            Some(p) => format!("{scheme}://{host}:{p}"),
            None => format!("{scheme}://{host}"),
        };
        builder = builder
            .with_endpoint(endpoint)
            .with_allow_http(true)
            .with_virtual_hosted_style_request(false); // MinIO requires path-style URLs
    }

    Ok(builder)
}
