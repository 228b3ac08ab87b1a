//! AWS toolkit for stackprobe
//!
//! This crate implements the `Toolkit` and `FunctionInvoker` traits on top
//! of the AWS SDK: stacks are deployed and destroyed through CloudFormation,
//! code assets are uploaded to S3, and functions are invoked through Lambda.
//!
//! # Requirements
//!
//! - AWS credentials resolvable by the default provider chain
//!   (environment, shared profile, SSO, instance role, ...)
//! - An S3 bucket for code assets when a function uses `FunctionCode::Asset`
//!
//! # Example
//!
//! ```ignore
//! use stackprobe_cloud::{StackSelector, Toolkit, WaitConfig};
//! use stackprobe_cloud_aws::{CloudFormationToolkit, load_sdk_config};
//!
//! let config = load_sdk_config(Some("ap-northeast-1".to_string())).await;
//! let toolkit = CloudFormationToolkit::new(&config, None, WaitConfig::default());
//!
//! let auth = toolkit.check_auth().await?;
//! if !auth.authenticated {
//!     panic!("Not authenticated: {:?}", auth.error);
//! }
//!
//! let result = toolkit
//!     .deploy(&assembly, &StackSelector::must_match(["TestFeatureStack"]))
//!     .await?;
//! ```

pub mod assets;
pub mod cloudformation;
pub mod error;
pub mod lambda;
pub mod status;

pub use assets::{AssetPublisher, package_directory};
pub use cloudformation::CloudFormationToolkit;
pub use error::{AwsError, Result};
pub use lambda::LambdaInvoker;

use aws_config::{BehaviorVersion, Region, SdkConfig};

/// Load shared AWS configuration, optionally pinning the region
pub async fn load_sdk_config(region: Option<String>) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(Region::new(region));
    }
    loader.load().await
}
