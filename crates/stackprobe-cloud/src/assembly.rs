//! Cloud assembly: the synthesized, deployable form of one or more stacks
//!
//! An assembly can be written to an output directory (`manifest.json` plus
//! one `<stack>.template.json` per stack) and read back later, so deploy and
//! destroy can run against the exact templates that were synthesized.

use crate::error::{CloudError, Result};
use crate::stack::{FunctionAsset, StackDefinition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

const ASSEMBLY_VERSION: u32 = 1;
const MANIFEST_FILE: &str = "manifest.json";
const MANIFEST_BACKUP: &str = "manifest.json.backup";

/// Synthesized stacks ready for deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudAssembly {
    /// Manifest format version
    pub version: u32,

    /// When the assembly was synthesized
    pub created_at: DateTime<Utc>,

    /// One artifact per stack
    pub stacks: Vec<StackArtifact>,
}

/// A single synthesized stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackArtifact {
    pub stack_name: String,

    /// CloudFormation template body
    #[serde(skip)]
    pub template: serde_json::Value,

    /// Template file name relative to the assembly directory
    pub template_file: String,

    /// Local code assets to upload before deployment
    #[serde(default)]
    pub assets: Vec<FunctionAsset>,
}

impl StackArtifact {
    /// Serialized template body
    pub fn template_body(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.template)?)
    }
}

impl CloudAssembly {
    /// Synthesize every stack produced by `builder`
    pub fn from_builder<F>(builder: F) -> Result<Self>
    where
        F: FnOnce() -> Result<Vec<StackDefinition>>,
    {
        let definitions = builder()?;
        Self::from_definitions(&definitions)
    }

    pub fn from_definitions(definitions: &[StackDefinition]) -> Result<Self> {
        let mut stacks: Vec<StackArtifact> = Vec::with_capacity(definitions.len());
        for definition in definitions {
            if stacks.iter().any(|s| s.stack_name == definition.name) {
                return Err(CloudError::AssemblyError(format!(
                    "stack {} defined more than once",
                    definition.name
                )));
            }
            let synthesized = definition.synthesize()?;
            stacks.push(StackArtifact {
                template_file: format!("{}.template.json", synthesized.stack_name),
                stack_name: synthesized.stack_name,
                template: synthesized.template,
                assets: synthesized.assets,
            });
        }

        Ok(Self {
            version: ASSEMBLY_VERSION,
            created_at: Utc::now(),
            stacks,
        })
    }

    pub fn stack(&self, name: &str) -> Option<&StackArtifact> {
        self.stacks.iter().find(|s| s.stack_name == name)
    }

    /// Resolve a selector against the stacks in this assembly
    pub fn select(&self, selector: &StackSelector) -> Result<Vec<&StackArtifact>> {
        if selector.strategy == SelectionStrategy::AllStacks {
            return Ok(self.stacks.iter().collect());
        }

        let patterns = selector
            .patterns
            .iter()
            .map(|p| {
                glob::Pattern::new(p).map_err(|e| CloudError::InvalidPattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let selected: Vec<&StackArtifact> = self
            .stacks
            .iter()
            .filter(|s| patterns.iter().any(|p| p.matches(&s.stack_name)))
            .collect();

        match selector.strategy {
            SelectionStrategy::PatternMustMatch if selected.is_empty() => Err(
                CloudError::NoStacksMatched(selector.patterns.join(", ")),
            ),
            SelectionStrategy::PatternMustMatchSingle if selected.len() != 1 => {
                Err(CloudError::NoStacksMatched(format!(
                    "{} (expected exactly one stack, matched {})",
                    selector.patterns.join(", "),
                    selected.len()
                )))
            }
            _ => Ok(selected),
        }
    }
}

/// How a [`StackSelector`] treats its patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// Ignore patterns, select every stack
    AllStacks,
    /// Select stacks matching any pattern; an empty selection is fine
    PatternMatch,
    /// Select stacks matching any pattern; at least one must match
    PatternMustMatch,
    /// The patterns must match exactly one stack
    PatternMustMatchSingle,
}

/// Which stacks of an assembly an operation applies to
#[derive(Debug, Clone)]
pub struct StackSelector {
    pub strategy: SelectionStrategy,
    pub patterns: Vec<String>,
}

impl StackSelector {
    pub fn all() -> Self {
        Self {
            strategy: SelectionStrategy::AllStacks,
            patterns: Vec::new(),
        }
    }

    pub fn must_match(patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            strategy: SelectionStrategy::PatternMustMatch,
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }
}

/// Reads and writes assemblies in an output directory
pub struct AssemblyStore {
    out_dir: PathBuf,
}

impl AssemblyStore {
    pub fn new(out_dir: impl AsRef<Path>) -> Self {
        Self {
            out_dir: out_dir.as_ref().to_path_buf(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    fn manifest_path(&self) -> PathBuf {
        self.out_dir.join(MANIFEST_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.out_dir.join(MANIFEST_BACKUP)
    }

    async fn ensure_out_dir(&self) -> Result<()> {
        if !self.out_dir.exists() {
            fs::create_dir_all(&self.out_dir).await?;
            tracing::debug!("Created assembly directory: {}", self.out_dir.display());
        }
        Ok(())
    }

    pub fn exists(&self) -> bool {
        self.manifest_path().exists()
    }

    /// Write the manifest and every stack template
    pub async fn save(&self, assembly: &CloudAssembly) -> Result<()> {
        self.ensure_out_dir().await?;

        let path = self.manifest_path();
        let backup = self.backup_path();

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
            tracing::debug!("Created manifest backup");
        }

        for stack in &assembly.stacks {
            let content = serde_json::to_string_pretty(&stack.template)?;
            fs::write(self.out_dir.join(&stack.template_file), content).await?;
        }

        let content = serde_json::to_string_pretty(assembly)?;
        fs::write(&path, content).await?;

        tracing::debug!(
            "Saved assembly with {} stacks to {}",
            assembly.stacks.len(),
            self.out_dir.display()
        );
        Ok(())
    }

    /// Load a previously saved assembly
    pub async fn load(&self) -> Result<CloudAssembly> {
        let path = self.manifest_path();
        if !path.exists() {
            return Err(CloudError::AssemblyError(format!(
                "no assembly found in {}",
                self.out_dir.display()
            )));
        }

        let content = fs::read_to_string(&path).await?;
        let mut assembly: CloudAssembly = serde_json::from_str(&content)?;

        if assembly.version > ASSEMBLY_VERSION {
            return Err(CloudError::AssemblyError(format!(
                "assembly version {} is newer than supported version {}",
                assembly.version, ASSEMBLY_VERSION
            )));
        }

        for stack in &mut assembly.stacks {
            let template = fs::read_to_string(self.out_dir.join(&stack.template_file)).await?;
            stack.template = serde_json::from_str(&template)?;
        }

        tracing::debug!("Loaded assembly with {} stacks", assembly.stacks.len());
        Ok(assembly)
    }
}
