//! AWS toolkit error types

use stackprobe_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("CloudFormation API error: {0}")]
    CloudFormation(String),

    #[error("S3 API error: {0}")]
    S3(String),

    #[error("STS API error: {0}")]
    Sts(String),

    #[error("Stack {0} uses code assets but no asset bucket is configured")]
    AssetBucketMissing(String),

    #[error("Asset packaging failed: {0}")]
    AssetPackaging(String),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudError),
}

impl From<AwsError> for CloudError {
    fn from(error: AwsError) -> Self {
        match error {
            AwsError::Cloud(e) => e,
            AwsError::AssetBucketMissing(_) | AwsError::AssetPackaging(_) | AwsError::Zip(_) => {
                CloudError::AssetError(error.to_string())
            }
            AwsError::Sts(message) => CloudError::AuthenticationFailed(message),
            AwsError::Io(e) => CloudError::Io(e),
            AwsError::CloudFormation(_) | AwsError::S3(_) => CloudError::ApiError(error.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AwsError>;
