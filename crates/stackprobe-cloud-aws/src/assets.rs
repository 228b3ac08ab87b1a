//! Function code assets
//!
//! Packages local directories into zip archives and uploads them to the
//! asset bucket before a stack referencing them is deployed.

use crate::error::{AwsError, Result};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use chrono::{DateTime, Utc};
use stackprobe_cloud::FunctionAsset;
use stackprobe_cloud::stack::ASSET_BUCKET_PARAMETER;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Zip every file below `dir`, with paths relative to `dir`
pub fn package_directory(dir: &Path) -> Result<Vec<u8>> {
    if !dir.is_dir() {
        return Err(AwsError::AssetPackaging(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let pattern = format!(
        "{}/**/*",
        glob::Pattern::escape(&dir.to_string_lossy())
    );
    let mut files: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| AwsError::AssetPackaging(e.to_string()))?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(AwsError::AssetPackaging(format!(
            "{} contains no files",
            dir.display()
        )));
    }

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for file in &files {
        let relative = file
            .strip_prefix(dir)
            .map_err(|e| AwsError::AssetPackaging(e.to_string()))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        zip.start_file(name, options)?;
        zip.write_all(&std::fs::read(file)?)?;
    }

    let archive = zip.finish()?.into_inner();
    tracing::debug!(
        "Packaged {} files from {} ({} bytes)",
        files.len(),
        dir.display(),
        archive.len()
    );
    Ok(archive)
}

/// Object key for an uploaded asset
pub fn asset_object_key(stack_name: &str, logical_id: &str, at: DateTime<Utc>) -> String {
    format!(
        "assets/{}/{}-{}.zip",
        stack_name,
        logical_id,
        at.format("%Y%m%dT%H%M%S%3fZ")
    )
}

/// Uploads function assets to S3
pub struct AssetPublisher {
    s3: aws_sdk_s3::Client,
    bucket: Option<String>,
}

impl AssetPublisher {
    pub fn new(s3: aws_sdk_s3::Client, bucket: Option<String>) -> Self {
        Self { s3, bucket }
    }

    /// Upload every asset and return the template parameters pointing at them
    pub async fn publish(
        &self,
        stack_name: &str,
        assets: &[FunctionAsset],
    ) -> Result<Vec<(String, String)>> {
        if assets.is_empty() {
            return Ok(Vec::new());
        }

        let bucket = self
            .bucket
            .as_ref()
            .ok_or_else(|| AwsError::AssetBucketMissing(stack_name.to_string()))?;

        let mut parameters = vec![(ASSET_BUCKET_PARAMETER.to_string(), bucket.clone())];
        for asset in assets {
            let archive = package_directory(&asset.source)?;
            let key = asset_object_key(stack_name, &asset.logical_id, Utc::now());

            tracing::info!("Uploading asset for {} to s3://{}/{}", asset.logical_id, bucket, key);
            self.s3
                .put_object()
                .bucket(bucket)
                .key(&key)
                .content_type("application/zip")
                .body(ByteStream::from(archive))
                .send()
                .await
                .map_err(|e| AwsError::S3(DisplayErrorContext(&e).to_string()))?;

            parameters.push((asset.key_parameter.clone(), key));
        }

        Ok(parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::config::{BehaviorVersion, Region};
    use chrono::TimeZone;
    use std::io::Read;
    use tempfile::tempdir;

    fn offline_client() -> aws_sdk_s3::Client {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .build();
        aws_sdk_s3::Client::from_conf(config)
    }

    #[test]
    fn test_package_directory() {
        let temp_dir = tempdir().unwrap();
        std::fs::write(temp_dir.path().join("index.js"), "exports.handler = 1;").unwrap();
        std::fs::create_dir(temp_dir.path().join("lib")).unwrap();
        std::fs::write(temp_dir.path().join("lib").join("util.js"), "// util").unwrap();

        let archive = package_directory(temp_dir.path()).unwrap();
        let mut zip = zip::ZipArchive::new(Cursor::new(archive)).unwrap();

        let mut names: Vec<String> = zip.file_names().map(|n| n.to_string()).collect();
        names.sort();
        assert_eq!(names, vec!["index.js", "lib/util.js"]);

        let mut content = String::new();
        zip.by_name("index.js")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "exports.handler = 1;");
    }

    #[test]
    fn test_package_empty_or_missing_directory() {
        let temp_dir = tempdir().unwrap();
        assert!(matches!(
            package_directory(temp_dir.path()),
            Err(AwsError::AssetPackaging(_))
        ));
        assert!(matches!(
            package_directory(&temp_dir.path().join("missing")),
            Err(AwsError::AssetPackaging(_))
        ));
    }

    #[test]
    fn test_asset_object_key() {
        let at = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();
        assert_eq!(
            asset_object_key("TestFeatureStack", "TestLambda", at),
            "assets/TestFeatureStack/TestLambda-20261018T093000000Z.zip"
        );
    }

    #[tokio::test]
    async fn test_publish_without_assets_is_noop() {
        let publisher = AssetPublisher::new(offline_client(), None);
        let parameters = publisher.publish("Stack", &[]).await.unwrap();
        assert!(parameters.is_empty());
    }

    #[tokio::test]
    async fn test_publish_requires_bucket() {
        let publisher = AssetPublisher::new(offline_client(), None);
        let assets = vec![FunctionAsset {
            logical_id: "Fn".to_string(),
            source: PathBuf::from("lambda"),
            key_parameter: "FnAssetKey".to_string(),
        }];

        let result = publisher.publish("Stack", &assets).await;
        assert!(matches!(result, Err(AwsError::AssetBucketMissing(_))));
    }
}
