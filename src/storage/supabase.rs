use async_trait::async_trait;
use postgrest::Postgrest;
use serde::Deserialize;
use serde_json::{from_str, json, Value};
use tracing::debug;

use super::{Collection, StorageGateway};
use crate::models::error::StorageError;

/// Supabase-backed store. Each collection is a table of `(id text primary key, doc jsonb)`.
#[derive(Clone)]
pub struct PostgrestStore {
    client: Postgrest,
}

#[derive(Deserialize)]
struct Row {
    doc: Value,
}

/// Reads a PostgREST response body, turning transport failures and non-2xx
/// statuses into [`StorageError::Backend`].
macro_rules! read_body {
    ($res:expr) => {{
        let response = $res.map_err(|e| StorageError::Backend(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        if !status.is_success() {
            return Err(StorageError::Backend(format!("{status}: {body}")));
        }
        body
    }};
}

fn rows(body: &str) -> Result<Vec<Value>, StorageError> {
    let rows: Vec<Row> = from_str(body).map_err(|e| StorageError::Backend(e.to_string()))?;
    Ok(rows.into_iter().map(|r| r.doc).collect())
}

impl PostgrestStore {
    pub fn new(project_url: &str, service_role_key: &str) -> Self {
        let client = Postgrest::new(format!("{}/rest/v1", project_url.trim_end_matches('/')))
            .insert_header("apikey", service_role_key)
            .insert_header("Authorization", format!("Bearer {service_role_key}"));
        Self { client }
    }
}

/// PostgREST filters compare text, so strings go in unquoted.
fn filter_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl StorageGateway for PostgrestStore {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StorageError> {
        let res = self
            .client
            .from(collection.table_name())
            .select("doc")
            .eq("id", id)
            .execute()
            .await;
        Ok(rows(&read_body!(res))?.into_iter().next())
    }

    async fn list_all(&self, collection: Collection) -> Result<Vec<Value>, StorageError> {
        let res = self
            .client
            .from(collection.table_name())
            .select("doc")
            .execute()
            .await;
        rows(&read_body!(res))
    }

    async fn list_by_field(
        &self,
        collection: Collection,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Value>, StorageError> {
        let res = self
            .client
            .from(collection.table_name())
            .select("doc")
            .eq(format!("doc->>{field}"), filter_value(value))
            .execute()
            .await;
        rows(&read_body!(res))
    }

    async fn save(&self, collection: Collection, id: &str, doc: Value) -> Result<(), StorageError> {
        self.save_all(collection, vec![(id.to_string(), doc)]).await
    }

    async fn save_all(
        &self,
        collection: Collection,
        docs: Vec<(String, Value)>,
    ) -> Result<(), StorageError> {
        if docs.is_empty() {
            return Ok(());
        }
        let count = docs.len();
        let body: Vec<Value> = docs
            .into_iter()
            .map(|(id, doc)| json!({"id": id, "doc": doc}))
            .collect();
        let res = self
            .client
            .from(collection.table_name())
            .upsert(Value::Array(body).to_string())
            .on_conflict("id")
            .execute()
            .await;
        read_body!(res);
        debug!("Upserted {count} documents into {collection}");
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StorageError> {
        let res = self
            .client
            .from(collection.table_name())
            .eq("id", id)
            .delete()
            .execute()
            .await;
        read_body!(res);
        Ok(())
    }

    async fn delete_all(&self, collection: Collection) -> Result<(), StorageError> {
        // PostgREST refuses unfiltered deletes.
        let res = self
            .client
            .from(collection.table_name())
            .neq("id", "")
            .delete()
            .execute()
            .await;
        read_body!(res);
        Ok(())
    }
}
