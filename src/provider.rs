//! Control-plane boundary: the three DynamoDB operations this tool consumes.
//!
//! The [`ControlPlane`] trait exists so the orchestrator, provisioner, and
//! validator take an injected client instead of touching the SDK directly;
//! tests substitute an in-memory implementation. [`DynamoControlPlane`] is
//! the real one, mapping SDK inputs/outputs to the compact snapshot types
//! the rest of the crate works with.

use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, ConsumedCapacity, CreateGlobalSecondaryIndexAction,
    GlobalSecondaryIndexUpdate, IndexStatus as SdkIndexStatus, KeySchemaElement, KeyType,
    Projection as SdkProjection, ProjectionType, ReturnConsumedCapacity, ScalarAttributeType,
    Select,
};

use crate::errors::ProviderError;
use crate::plan::{IndexSpec, KeyAttribute, Projection, ScalarType};

/// Build status of an index as reported by DescribeTable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexBuildStatus {
    Creating,
    Active,
    Deleting,
    Updating,
    /// A status value this crate does not recognize.
    Other,
}

#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    pub index_name: String,
    pub status: IndexBuildStatus,
}

/// What a describe call says about a table right now.
#[derive(Debug, Clone)]
pub struct TableSnapshot {
    pub table_status: String,
    pub attribute_definitions: Vec<KeyAttribute>,
    pub indexes: Vec<IndexSnapshot>,
}

impl TableSnapshot {
    pub fn index(&self, name: &str) -> Option<&IndexSnapshot> {
        self.indexes.iter().find(|ix| ix.index_name == name)
    }
}

/// Where the service attributed the capacity consumed by a probe query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacitySource {
    /// The index served the query.
    Index,
    /// Only base-table capacity was consumed; the index did not serve it.
    TableOnly,
    /// The response carried no capacity attribution.
    Unreported,
}

/// Result of a validation probe against an index.
#[derive(Debug, Clone)]
pub struct IndexProbe {
    pub item_count: usize,
    pub capacity: CapacitySource,
}

/// The control-plane operations consumed by this tool.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Current status, attribute definitions, and index list of a table.
    async fn describe_table(&self, table: &str) -> Result<TableSnapshot, ProviderError>;

    /// Initiate creation of one index. `attribute_definitions` is the full
    /// definition list to submit; assembling it (merging the table's existing
    /// declarations with the index's keys) is the caller's job.
    async fn create_index(
        &self,
        table: &str,
        spec: &IndexSpec,
        attribute_definitions: &[KeyAttribute],
    ) -> Result<(), ProviderError>;

    /// Query the index with a synthetic partition-key value and report how
    /// the service attributed the consumed capacity.
    async fn probe_index(
        &self,
        table: &str,
        index_name: &str,
        key: &KeyAttribute,
        probe_value: &str,
    ) -> Result<IndexProbe, ProviderError>;
}

// ========== SDK IMPLEMENTATION ==========

/// [`ControlPlane`] over a real `aws_sdk_dynamodb::Client`.
#[derive(Debug, Clone)]
pub struct DynamoControlPlane {
    client: Client,
}

impl DynamoControlPlane {
    pub fn new(client: Client) -> Self {
        DynamoControlPlane { client }
    }
}

#[async_trait]
impl ControlPlane for DynamoControlPlane {
    async fn describe_table(&self, table: &str) -> Result<TableSnapshot, ProviderError> {
        let output = self
            .client
            .describe_table()
            .table_name(table)
            .send()
            .await
            .map_err(ProviderError::from_sdk)?;

        let desc = output.table.ok_or_else(|| {
            ProviderError::transport(format!(
                "describe_table returned no description for '{table}'"
            ))
        })?;

        let table_status = desc
            .table_status
            .as_ref()
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| "UNKNOWN".to_string());

        let attribute_definitions = desc
            .attribute_definitions
            .unwrap_or_default()
            .iter()
            .filter_map(|def| {
                scalar_from_sdk(&def.attribute_type)
                    .map(|t| KeyAttribute::new(def.attribute_name.clone(), t))
            })
            .collect();

        let indexes = desc
            .global_secondary_indexes
            .unwrap_or_default()
            .into_iter()
            .filter_map(|gsi| {
                let index_name = gsi.index_name?;
                Some(IndexSnapshot {
                    index_name,
                    status: build_status_from_sdk(gsi.index_status.as_ref()),
                })
            })
            .collect();

        Ok(TableSnapshot {
            table_status,
            attribute_definitions,
            indexes,
        })
    }

    async fn create_index(
        &self,
        table: &str,
        spec: &IndexSpec,
        attribute_definitions: &[KeyAttribute],
    ) -> Result<(), ProviderError> {
        let mut key_schema = vec![
            KeySchemaElement::builder()
                .attribute_name(&spec.partition_key.name)
                .key_type(KeyType::Hash)
                .build()
                .map_err(|e| ProviderError::transport(format!("invalid key schema: {e}")))?,
        ];
        if let Some(sort) = &spec.sort_key {
            key_schema.push(
                KeySchemaElement::builder()
                    .attribute_name(&sort.name)
                    .key_type(KeyType::Range)
                    .build()
                    .map_err(|e| ProviderError::transport(format!("invalid key schema: {e}")))?,
            );
        }

        let projection = match &spec.projection {
            Projection::All => SdkProjection::builder()
                .projection_type(ProjectionType::All)
                .build(),
            Projection::KeysOnly => SdkProjection::builder()
                .projection_type(ProjectionType::KeysOnly)
                .build(),
            Projection::Include { non_key_attributes } => SdkProjection::builder()
                .projection_type(ProjectionType::Include)
                .set_non_key_attributes(Some(non_key_attributes.clone()))
                .build(),
        };

        let action = CreateGlobalSecondaryIndexAction::builder()
            .index_name(&spec.index_name)
            .set_key_schema(Some(key_schema))
            .projection(projection)
            .build()
            .map_err(|e| {
                ProviderError::transport(format!("invalid index creation request: {e}"))
            })?;

        let definitions = attribute_definitions
            .iter()
            .map(|attr| {
                AttributeDefinition::builder()
                    .attribute_name(&attr.name)
                    .attribute_type(scalar_to_sdk(attr.attr_type))
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                ProviderError::transport(format!("invalid attribute definition: {e}"))
            })?;

        self.client
            .update_table()
            .table_name(table)
            .set_attribute_definitions(Some(definitions))
            .global_secondary_index_updates(
                GlobalSecondaryIndexUpdate::builder().create(action).build(),
            )
            .send()
            .await
            .map_err(ProviderError::from_sdk)?;
        Ok(())
    }

    async fn probe_index(
        &self,
        table: &str,
        index_name: &str,
        key: &KeyAttribute,
        probe_value: &str,
    ) -> Result<IndexProbe, ProviderError> {
        let value = match key.attr_type {
            ScalarType::S => AttributeValue::S(probe_value.to_string()),
            ScalarType::N => AttributeValue::N(probe_value.to_string()),
            ScalarType::B => AttributeValue::B(Blob::new(probe_value.as_bytes().to_vec())),
        };

        let output = self
            .client
            .query()
            .table_name(table)
            .index_name(index_name)
            .key_condition_expression("#pk = :probe")
            .expression_attribute_names("#pk", &key.name)
            .expression_attribute_values(":probe", value)
            .select(Select::Count)
            .limit(1)
            .return_consumed_capacity(ReturnConsumedCapacity::Indexes)
            .send()
            .await
            .map_err(ProviderError::from_sdk)?;

        Ok(IndexProbe {
            item_count: output.count.max(0) as usize,
            capacity: capacity_source(output.consumed_capacity.as_ref(), index_name),
        })
    }
}

/// Derive where the consumed capacity was attributed.
fn capacity_source(consumed: Option<&ConsumedCapacity>, index_name: &str) -> CapacitySource {
    let Some(consumed) = consumed else {
        return CapacitySource::Unreported;
    };
    let served_by_index = consumed
        .global_secondary_indexes
        .as_ref()
        .map(|indexes| indexes.contains_key(index_name))
        .unwrap_or(false);
    if served_by_index {
        CapacitySource::Index
    } else if consumed.capacity_units.is_some() || consumed.table.is_some() {
        CapacitySource::TableOnly
    } else {
        CapacitySource::Unreported
    }
}

fn scalar_to_sdk(t: ScalarType) -> ScalarAttributeType {
    match t {
        ScalarType::S => ScalarAttributeType::S,
        ScalarType::N => ScalarAttributeType::N,
        ScalarType::B => ScalarAttributeType::B,
    }
}

fn scalar_from_sdk(t: &ScalarAttributeType) -> Option<ScalarType> {
    match t {
        ScalarAttributeType::S => Some(ScalarType::S),
        ScalarAttributeType::N => Some(ScalarType::N),
        ScalarAttributeType::B => Some(ScalarType::B),
        _ => None,
    }
}

fn build_status_from_sdk(status: Option<&SdkIndexStatus>) -> IndexBuildStatus {
    match status {
        Some(SdkIndexStatus::Creating) => IndexBuildStatus::Creating,
        Some(SdkIndexStatus::Active) => IndexBuildStatus::Active,
        Some(SdkIndexStatus::Deleting) => IndexBuildStatus::Deleting,
        Some(SdkIndexStatus::Updating) => IndexBuildStatus::Updating,
        _ => IndexBuildStatus::Other,
    }
}
