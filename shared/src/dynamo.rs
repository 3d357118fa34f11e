use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;

use crate::error::StoreError;
use crate::store::ResourceStore;

/// Resource Store backed by a DynamoDB table. Each logical key is one item
/// (`PK = STORE#<key>`, `SK = VALUE`) whose `value` attribute holds the whole
/// serialized collection.
pub struct DynamoStore {
    client: DynamoClient,
    table_name: String,
}

impl DynamoStore {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }
}

fn partition_key(key: &str) -> AttributeValue {
    AttributeValue::S(format!("STORE#{}", key))
}

fn sort_key() -> AttributeValue {
    AttributeValue::S("VALUE".to_string())
}

impl ResourceStore for DynamoStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("PK", partition_key(key))
            .key("SK", sort_key())
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to read {}: {}", key, e)))?;

        Ok(result
            .item()
            .and_then(|item| item.get("value"))
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string()))
    }

    async fn set_string(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .item("PK", partition_key(key))
            .item("SK", sort_key())
            .item("value", AttributeValue::S(value.to_string()))
            .item(
                "updated_at",
                AttributeValue::S(chrono::Utc::now().to_rfc3339()),
            )
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to write {}: {}", key, e)))?;

        tracing::info!("Stored {} ({} bytes)", key, value.len());
        Ok(())
    }
}
