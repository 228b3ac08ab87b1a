//! Declarative stack description
//!
//! A [`StackDefinition`] is an in-memory description of the desired
//! resources of one stack. [`StackDefinition::synthesize`] turns it into a
//! CloudFormation template plus the list of local assets the template
//! depends on. Provisioning order, diffing and rollback are left to the
//! provisioning service.

use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

/// Template parameter holding the bucket that function assets are uploaded to
pub const ASSET_BUCKET_PARAMETER: &str = "AssetBucket";

const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";
const POLICY_VERSION: &str = "2012-10-17";
const MAX_STACK_NAME_LEN: usize = 128;

const DEFAULT_READ_CAPACITY: u32 = 5;
const DEFAULT_WRITE_CAPACITY: u32 = 5;

const TABLE_READ_ACTIONS: &[&str] = &[
    "dynamodb:BatchGetItem",
    "dynamodb:GetRecords",
    "dynamodb:GetShardIterator",
    "dynamodb:Query",
    "dynamodb:GetItem",
    "dynamodb:Scan",
    "dynamodb:ConditionCheckItem",
    "dynamodb:DescribeTable",
];

const TABLE_WRITE_ACTIONS: &[&str] = &[
    "dynamodb:BatchWriteItem",
    "dynamodb:PutItem",
    "dynamodb:UpdateItem",
    "dynamodb:DeleteItem",
    "dynamodb:DescribeTable",
];

/// What happens to a stateful resource when it leaves the stack
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    /// Keep the physical resource (default for buckets and tables)
    #[default]
    Retain,
    /// Delete the physical resource together with the stack
    Destroy,
}

impl RemovalPolicy {
    fn as_cfn(self) -> &'static str {
        match self {
            RemovalPolicy::Retain => "Retain",
            RemovalPolicy::Destroy => "Delete",
        }
    }
}

/// Key attribute type of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    String,
    Number,
    Binary,
}

impl AttributeType {
    fn as_cfn(self) -> &'static str {
        match self {
            AttributeType::String => "S",
            AttributeType::Number => "N",
            AttributeType::Binary => "B",
        }
    }
}

/// Key attribute definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,
    pub attribute_type: AttributeType,
}

impl AttributeDef {
    pub fn new(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attribute_type,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::String)
    }
}

/// Object storage bucket
#[derive(Debug, Clone)]
pub struct BucketProps {
    pub logical_id: String,
    pub removal_policy: RemovalPolicy,
}

impl BucketProps {
    pub fn new(logical_id: impl Into<String>) -> Self {
        Self {
            logical_id: logical_id.into(),
            removal_policy: RemovalPolicy::default(),
        }
    }

    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy = policy;
        self
    }
}

/// Key-value table with provisioned capacity
#[derive(Debug, Clone)]
pub struct TableProps {
    pub logical_id: String,
    pub partition_key: AttributeDef,
    pub sort_key: Option<AttributeDef>,
    pub removal_policy: RemovalPolicy,
}

impl TableProps {
    pub fn new(logical_id: impl Into<String>, partition_key: AttributeDef) -> Self {
        Self {
            logical_id: logical_id.into(),
            partition_key,
            sort_key: None,
            removal_policy: RemovalPolicy::default(),
        }
    }

    pub fn with_sort_key(mut self, sort_key: AttributeDef) -> Self {
        self.sort_key = Some(sort_key);
        self
    }

    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy = policy;
        self
    }
}

/// Source of a function's code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionCode {
    /// Source embedded directly in the template
    Inline(String),
    /// Local directory packaged as a zip archive and uploaded before deploy
    Asset(PathBuf),
}

/// Value of a function environment variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvValue {
    Literal(String),
    /// Physical name of a table in the same stack
    TableName(String),
    /// Physical name of a bucket in the same stack
    BucketName(String),
}

/// Compute function
#[derive(Debug, Clone)]
pub struct FunctionProps {
    pub logical_id: String,
    pub runtime: String,
    pub handler: String,
    pub code: FunctionCode,
    pub environment: BTreeMap<String, EnvValue>,
    pub memory_size: Option<u32>,
    pub timeout_secs: Option<u32>,
}

impl FunctionProps {
    pub fn new(
        logical_id: impl Into<String>,
        runtime: impl Into<String>,
        handler: impl Into<String>,
        code: FunctionCode,
    ) -> Self {
        Self {
            logical_id: logical_id.into(),
            runtime: runtime.into(),
            handler: handler.into(),
            code,
            environment: BTreeMap::new(),
            memory_size: None,
            timeout_secs: None,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: EnvValue) -> Self {
        self.environment.insert(key.into(), value);
        self
    }

    pub fn with_memory_size(mut self, memory_size: u32) -> Self {
        self.memory_size = Some(memory_size);
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u32) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }
}

/// Kind of a described resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Bucket,
    Table,
    Function,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Bucket => write!(f, "bucket"),
            ResourceKind::Table => write!(f, "table"),
            ResourceKind::Function => write!(f, "function"),
        }
    }
}

/// A resource in a stack
#[derive(Debug, Clone)]
pub enum Resource {
    Bucket(BucketProps),
    Table(TableProps),
    Function(FunctionProps),
}

impl Resource {
    pub fn logical_id(&self) -> &str {
        match self {
            Resource::Bucket(p) => &p.logical_id,
            Resource::Table(p) => &p.logical_id,
            Resource::Function(p) => &p.logical_id,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Bucket(_) => ResourceKind::Bucket,
            Resource::Table(_) => ResourceKind::Table,
            Resource::Function(_) => ResourceKind::Function,
        }
    }
}

/// Data access a table grants to a function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantKind {
    ReadData,
    ReadWriteData,
}

impl GrantKind {
    fn actions(self) -> Vec<&'static str> {
        let mut actions: Vec<&'static str> = TABLE_READ_ACTIONS.to_vec();
        if self == GrantKind::ReadWriteData {
            for action in TABLE_WRITE_ACTIONS {
                if !actions.contains(action) {
                    actions.push(action);
                }
            }
        }
        actions
    }
}

/// Permission grant from a table to a function
#[derive(Debug, Clone)]
pub struct Grant {
    pub kind: GrantKind,
    pub table: String,
    pub grantee: String,
}

/// Value exported as a stack output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputValue {
    FunctionArn(String),
    TableName(String),
    BucketName(String),
}

impl OutputValue {
    fn target(&self) -> (&str, ResourceKind) {
        match self {
            OutputValue::FunctionArn(id) => (id, ResourceKind::Function),
            OutputValue::TableName(id) => (id, ResourceKind::Table),
            OutputValue::BucketName(id) => (id, ResourceKind::Bucket),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StackOutput {
    pub key: String,
    pub value: OutputValue,
    pub description: Option<String>,
}

/// Function code that must be uploaded before the template can be deployed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionAsset {
    /// Logical id of the function using the asset
    pub logical_id: String,
    /// Local directory packaged into the archive
    pub source: PathBuf,
    /// Template parameter receiving the uploaded object key
    pub key_parameter: String,
}

/// Result of synthesizing a [`StackDefinition`]
#[derive(Debug, Clone)]
pub struct SynthesizedStack {
    pub stack_name: String,
    pub template: Value,
    pub assets: Vec<FunctionAsset>,
}

/// In-memory description of the desired resources of one stack
#[derive(Debug, Clone)]
pub struct StackDefinition {
    pub name: String,
    pub description: Option<String>,
    pub resources: Vec<Resource>,
    pub grants: Vec<Grant>,
    pub outputs: Vec<StackOutput>,
}

impl StackDefinition {
    /// Look up a resource by logical id
    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.logical_id() == logical_id)
    }

    /// Check names, logical ids and every cross-resource reference
    pub fn validate(&self) -> Result<()> {
        validate_stack_name(&self.name)?;

        if self.resources.is_empty() {
            return Err(CloudError::InvalidDefinition(format!(
                "stack {} has no resources",
                self.name
            )));
        }

        // Parameters share the logical id namespace with resources
        let mut seen = HashSet::new();
        let mut asset_bucket_reserved = false;
        for resource in &self.resources {
            let id = resource.logical_id();
            validate_logical_id(id)?;

            let mut ids = vec![id.to_string()];
            if resource.kind() == ResourceKind::Function {
                ids.push(role_logical_id(id));
                ids.push(policy_logical_id(id));
            }
            if let Resource::Function(function) = resource {
                if matches!(function.code, FunctionCode::Asset(_)) {
                    ids.push(asset_key_parameter(id));
                    if !asset_bucket_reserved {
                        ids.push(ASSET_BUCKET_PARAMETER.to_string());
                        asset_bucket_reserved = true;
                    }
                }
            }
            for id in ids {
                if !seen.insert(id.clone()) {
                    return Err(CloudError::InvalidDefinition(format!(
                        "duplicate logical id: {}",
                        id
                    )));
                }
            }

            if let Resource::Function(function) = resource {
                for (key, value) in &function.environment {
                    match value {
                        EnvValue::Literal(_) => {}
                        EnvValue::TableName(target) => {
                            self.expect_kind(target, ResourceKind::Table, key)?
                        }
                        EnvValue::BucketName(target) => {
                            self.expect_kind(target, ResourceKind::Bucket, key)?
                        }
                    }
                }
            }
        }

        for grant in &self.grants {
            self.expect_kind(&grant.table, ResourceKind::Table, "grant")?;
            self.expect_kind(&grant.grantee, ResourceKind::Function, "grant")?;
        }

        let mut output_keys = HashSet::new();
        for output in &self.outputs {
            validate_logical_id(&output.key)?;
            if !output_keys.insert(output.key.as_str()) {
                return Err(CloudError::InvalidDefinition(format!(
                    "duplicate output key: {}",
                    output.key
                )));
            }
            let (target, kind) = output.value.target();
            self.expect_kind(target, kind, &output.key)?;
        }

        Ok(())
    }

    fn expect_kind(&self, logical_id: &str, kind: ResourceKind, context: &str) -> Result<()> {
        match self.resource(logical_id) {
            Some(resource) if resource.kind() == kind => Ok(()),
            Some(resource) => Err(CloudError::InvalidDefinition(format!(
                "{}: {} is a {}, expected a {}",
                context,
                logical_id,
                resource.kind(),
                kind
            ))),
            None => Err(CloudError::InvalidDefinition(format!(
                "{}: unknown {} {}",
                context, kind, logical_id
            ))),
        }
    }

    /// Render the CloudFormation template for this stack
    pub fn synthesize(&self) -> Result<SynthesizedStack> {
        self.validate()?;

        let mut resources = Map::new();
        let mut parameters = Map::new();
        let mut assets = Vec::new();

        for resource in &self.resources {
            match resource {
                Resource::Bucket(bucket) => {
                    resources.insert(bucket.logical_id.clone(), bucket_resource(bucket));
                }
                Resource::Table(table) => {
                    resources.insert(table.logical_id.clone(), table_resource(table));
                }
                Resource::Function(function) => {
                    let id = &function.logical_id;
                    let role_id = role_logical_id(id);
                    resources.insert(role_id.clone(), service_role_resource());

                    let mut depends_on = vec![role_id.clone()];
                    let statements = self.policy_statements(id);
                    if !statements.is_empty() {
                        let policy_id = policy_logical_id(id);
                        resources.insert(
                            policy_id.clone(),
                            json!({
                                "Type": "AWS::IAM::Policy",
                                "Properties": {
                                    "PolicyDocument": {
                                        "Version": POLICY_VERSION,
                                        "Statement": statements,
                                    },
                                    "PolicyName": policy_id,
                                    "Roles": [{ "Ref": role_id }],
                                },
                            }),
                        );
                        depends_on.push(policy_id);
                    }

                    let code = match &function.code {
                        FunctionCode::Inline(source) => json!({ "ZipFile": source }),
                        FunctionCode::Asset(path) => {
                            let key_parameter = asset_key_parameter(id);
                            parameters
                                .entry(ASSET_BUCKET_PARAMETER.to_string())
                                .or_insert_with(|| {
                                    json!({
                                        "Type": "String",
                                        "Description": "Bucket holding function code assets",
                                    })
                                });
                            parameters.insert(
                                key_parameter.clone(),
                                json!({
                                    "Type": "String",
                                    "Description": format!("Object key of the code asset for {}", id),
                                }),
                            );
                            assets.push(FunctionAsset {
                                logical_id: id.clone(),
                                source: path.clone(),
                                key_parameter: key_parameter.clone(),
                            });
                            json!({
                                "S3Bucket": { "Ref": ASSET_BUCKET_PARAMETER },
                                "S3Key": { "Ref": key_parameter },
                            })
                        }
                    };

                    let mut properties = Map::new();
                    properties.insert("Code".to_string(), code);
                    properties.insert("Handler".to_string(), json!(function.handler));
                    properties.insert(
                        "Role".to_string(),
                        json!({ "Fn::GetAtt": [role_id, "Arn"] }),
                    );
                    properties.insert("Runtime".to_string(), json!(function.runtime));
                    if !function.environment.is_empty() {
                        let variables: Map<String, Value> = function
                            .environment
                            .iter()
                            .map(|(key, value)| (key.clone(), env_value(value)))
                            .collect();
                        properties.insert(
                            "Environment".to_string(),
                            json!({ "Variables": variables }),
                        );
                    }
                    if let Some(memory_size) = function.memory_size {
                        properties.insert("MemorySize".to_string(), json!(memory_size));
                    }
                    if let Some(timeout) = function.timeout_secs {
                        properties.insert("Timeout".to_string(), json!(timeout));
                    }

                    resources.insert(
                        id.clone(),
                        json!({
                            "Type": "AWS::Lambda::Function",
                            "Properties": properties,
                            "DependsOn": depends_on,
                        }),
                    );
                }
            }
        }

        let outputs: Map<String, Value> = self
            .outputs
            .iter()
            .map(|output| {
                let mut body = Map::new();
                body.insert("Value".to_string(), output_value(&output.value));
                if let Some(description) = &output.description {
                    body.insert("Description".to_string(), json!(description));
                }
                (output.key.clone(), Value::Object(body))
            })
            .collect();

        let mut template = Map::new();
        template.insert(
            "AWSTemplateFormatVersion".to_string(),
            json!(TEMPLATE_FORMAT_VERSION),
        );
        if let Some(description) = &self.description {
            template.insert("Description".to_string(), json!(description));
        }
        if !parameters.is_empty() {
            template.insert("Parameters".to_string(), Value::Object(parameters));
        }
        template.insert("Resources".to_string(), Value::Object(resources));
        if !outputs.is_empty() {
            template.insert("Outputs".to_string(), Value::Object(outputs));
        }

        tracing::debug!(
            "Synthesized stack {} ({} resources, {} assets)",
            self.name,
            self.resources.len(),
            assets.len()
        );

        Ok(SynthesizedStack {
            stack_name: self.name.clone(),
            template: Value::Object(template),
            assets,
        })
    }

    fn policy_statements(&self, function_id: &str) -> Vec<Value> {
        self.grants
            .iter()
            .filter(|g| g.grantee == function_id)
            .map(|g| {
                json!({
                    "Action": g.kind.actions(),
                    "Effect": "Allow",
                    "Resource": [{ "Fn::GetAtt": [g.table, "Arn"] }],
                })
            })
            .collect()
    }
}

/// Fluent builder for [`StackDefinition`]
///
/// ```
/// use stackprobe_cloud::stack::{AttributeDef, FunctionCode, FunctionProps, OutputValue, StackBuilder, TableProps};
///
/// let stack = StackBuilder::new("Demo")
///     .table(TableProps::new("Items", AttributeDef::string("id")))
///     .function(FunctionProps::new(
///         "Handler",
///         "nodejs20.x",
///         "index.handler",
///         FunctionCode::Inline("exports.handler = async () => ({ status: 'ok' });".into()),
///     ))
///     .grant_read_write_data("Items", "Handler")
///     .output("HandlerArn", OutputValue::FunctionArn("Handler".into()))
///     .build()
///     .unwrap();
/// assert_eq!(stack.resources.len(), 2);
/// ```
pub struct StackBuilder {
    definition: StackDefinition,
}

impl StackBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            definition: StackDefinition {
                name: name.into(),
                description: None,
                resources: Vec::new(),
                grants: Vec::new(),
                outputs: Vec::new(),
            },
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.definition.description = Some(description.into());
        self
    }

    pub fn bucket(mut self, props: BucketProps) -> Self {
        self.definition.resources.push(Resource::Bucket(props));
        self
    }

    pub fn table(mut self, props: TableProps) -> Self {
        self.definition.resources.push(Resource::Table(props));
        self
    }

    pub fn function(mut self, props: FunctionProps) -> Self {
        self.definition.resources.push(Resource::Function(props));
        self
    }

    pub fn grant_read_data(self, table: impl Into<String>, function: impl Into<String>) -> Self {
        self.grant(GrantKind::ReadData, table, function)
    }

    pub fn grant_read_write_data(
        self,
        table: impl Into<String>,
        function: impl Into<String>,
    ) -> Self {
        self.grant(GrantKind::ReadWriteData, table, function)
    }

    fn grant(
        mut self,
        kind: GrantKind,
        table: impl Into<String>,
        function: impl Into<String>,
    ) -> Self {
        self.definition.grants.push(Grant {
            kind,
            table: table.into(),
            grantee: function.into(),
        });
        self
    }

    pub fn output(mut self, key: impl Into<String>, value: OutputValue) -> Self {
        self.definition.outputs.push(StackOutput {
            key: key.into(),
            value,
            description: None,
        });
        self
    }

    /// Validate and return the finished definition
    pub fn build(self) -> Result<StackDefinition> {
        self.definition.validate()?;
        Ok(self.definition)
    }
}

fn role_logical_id(function_id: &str) -> String {
    format!("{}ServiceRole", function_id)
}

fn policy_logical_id(function_id: &str) -> String {
    format!("{}ServiceRoleDefaultPolicy", function_id)
}

fn asset_key_parameter(function_id: &str) -> String {
    format!("{}AssetKey", function_id)
}

fn validate_stack_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            first.is_ascii_alphabetic()
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
                && name.len() <= MAX_STACK_NAME_LEN
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(CloudError::InvalidDefinition(format!(
            "invalid stack name '{}': must start with a letter and contain only letters, digits and '-' (max {} characters)",
            name, MAX_STACK_NAME_LEN
        )))
    }
}

fn validate_logical_id(id: &str) -> Result<()> {
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        Err(CloudError::InvalidDefinition(format!(
            "invalid logical id '{}': must be non-empty and alphanumeric",
            id
        )))
    }
}

fn bucket_resource(bucket: &BucketProps) -> Value {
    json!({
        "Type": "AWS::S3::Bucket",
        "DeletionPolicy": bucket.removal_policy.as_cfn(),
        "UpdateReplacePolicy": bucket.removal_policy.as_cfn(),
    })
}

fn table_resource(table: &TableProps) -> Value {
    let mut attributes = vec![json!({
        "AttributeName": table.partition_key.name,
        "AttributeType": table.partition_key.attribute_type.as_cfn(),
    })];
    let mut key_schema = vec![json!({
        "AttributeName": table.partition_key.name,
        "KeyType": "HASH",
    })];
    if let Some(sort_key) = &table.sort_key {
        attributes.push(json!({
            "AttributeName": sort_key.name,
            "AttributeType": sort_key.attribute_type.as_cfn(),
        }));
        key_schema.push(json!({
            "AttributeName": sort_key.name,
            "KeyType": "RANGE",
        }));
    }

    json!({
        "Type": "AWS::DynamoDB::Table",
        "Properties": {
            "AttributeDefinitions": attributes,
            "KeySchema": key_schema,
            "ProvisionedThroughput": {
                "ReadCapacityUnits": DEFAULT_READ_CAPACITY,
                "WriteCapacityUnits": DEFAULT_WRITE_CAPACITY,
            },
        },
        "DeletionPolicy": table.removal_policy.as_cfn(),
        "UpdateReplacePolicy": table.removal_policy.as_cfn(),
    })
}

fn service_role_resource() -> Value {
    json!({
        "Type": "AWS::IAM::Role",
        "Properties": {
            "AssumeRolePolicyDocument": {
                "Version": POLICY_VERSION,
                "Statement": [{
                    "Action": "sts:AssumeRole",
                    "Effect": "Allow",
                    "Principal": { "Service": "lambda.amazonaws.com" },
                }],
            },
            "ManagedPolicyArns": [{
                "Fn::Join": ["", [
                    "arn:",
                    { "Ref": "AWS::Partition" },
                    ":iam::aws:policy/service-role/AWSLambdaBasicExecutionRole",
                ]],
            }],
        },
    })
}

fn env_value(value: &EnvValue) -> Value {
    match value {
        EnvValue::Literal(literal) => json!(literal),
        EnvValue::TableName(id) | EnvValue::BucketName(id) => json!({ "Ref": id }),
    }
}

fn output_value(value: &OutputValue) -> Value {
    match value {
        OutputValue::FunctionArn(id) => json!({ "Fn::GetAtt": [id, "Arn"] }),
        OutputValue::TableName(id) | OutputValue::BucketName(id) => json!({ "Ref": id }),
    }
}
