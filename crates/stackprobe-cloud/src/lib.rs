//! stackprobe cloud model
//!
//! This crate provides the provider-neutral half of stackprobe: a
//! declarative description of a stack's resources, synthesis into a
//! deployable cloud assembly, and the traits a toolkit implements to deploy,
//! invoke and destroy it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 stackprobe CLI                   │
//! │      (synth → deploy → invoke → destroy)         │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               stackprobe-cloud                   │
//! │  ┌──────────────┐  ┌──────────────────────────┐ │
//! │  │ StackBuilder │─▶│ CloudAssembly / Store    │ │
//! │  └──────────────┘  └──────────────────────────┘ │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  trait Toolkit / trait FunctionInvoker    │   │
//! │  └──────────────────────────────────────────┘   │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//!           ┌───────▼────────┐
//!           │ stackprobe-    │
//!           │ cloud-aws      │
//!           └────────────────┘
//! ```

pub mod assembly;
pub mod error;
pub mod result;
pub mod stack;
pub mod toolkit;

// Re-exports
pub use assembly::{AssemblyStore, CloudAssembly, SelectionStrategy, StackArtifact, StackSelector};
pub use error::{CloudError, Result};
pub use result::{
    DeployResult, DeployedStack, DestroyResult, InvokeResponse, StackAction, StackDestroyOutcome,
};
pub use stack::{
    AttributeDef, AttributeType, BucketProps, EnvValue, FunctionAsset, FunctionCode,
    FunctionProps, OutputValue, RemovalPolicy, StackBuilder, StackDefinition, TableProps,
};
pub use toolkit::{AuthStatus, FunctionInvoker, Toolkit, WaitConfig};
