//! Database operations for the records table.

use fieldsync_engine::record::SYNCED_AT_FIELD;
use fieldsync_engine::{CommitReceipt, Fields, Record, WriteBatch};
use serde_json::Value;
use sqlx::{PgPool, Row};

/// A stored record row from the database.
#[derive(Debug)]
pub struct StoredRecord {
    pub id: String,
    pub fields: Value,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredRecord {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredRecord {
            id: row.try_get("id")?,
            fields: row.try_get("fields")?,
        })
    }
}

impl StoredRecord {
    /// Convert database row to an engine record.
    pub fn to_record(&self) -> fieldsync_engine::Result<Record> {
        match &self.fields {
            Value::Object(fields) => Ok(Record::new(self.id.clone(), fields.clone())),
            other => Err(fieldsync_engine::Error::InvalidRecord(format!(
                "record {} has non-object fields: {other}",
                self.id
            ))),
        }
    }
}

/// Copy of `fields` carrying the commit timestamp.
pub fn stamped(fields: &Fields, synced_at: &str) -> Value {
    let mut fields = fields.clone();
    fields.remove("id");
    fields.insert(
        SYNCED_AT_FIELD.to_string(),
        Value::String(synced_at.to_string()),
    );
    Value::Object(fields)
}

/// Get every record, ordered by id.
pub async fn fetch_all(pool: &PgPool) -> Result<Vec<StoredRecord>, sqlx::Error> {
    sqlx::query_as::<_, StoredRecord>(
        r#"
        SELECT id, fields
        FROM records
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Apply a batch in one transaction.
///
/// Creates get fresh ids; updates merge their fields over the stored ones
/// (inserting the record if it does not exist yet). Every written record
/// is stamped with the same `syncedAt`.
pub async fn commit_batch(pool: &PgPool, batch: &WriteBatch) -> Result<CommitReceipt, sqlx::Error> {
    let synced_at = chrono::Utc::now().to_rfc3339();
    let mut receipt = CommitReceipt::default();
    let mut tx = pool.begin().await?;

    for create in &batch.creates {
        let id = uuid::Uuid::new_v4().simple().to_string();
        sqlx::query(
            r#"
            INSERT INTO records (id, fields)
            VALUES ($1, $2)
            "#,
        )
        .bind(&id)
        .bind(stamped(&create.fields, &synced_at))
        .execute(&mut *tx)
        .await?;
        receipt.assigned.insert(create.id.clone(), id);
    }

    for update in &batch.updates {
        sqlx::query(
            r#"
            INSERT INTO records (id, fields)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET
                fields = records.fields || EXCLUDED.fields,
                updated_at = now()
            "#,
        )
        .bind(&update.id)
        .bind(stamped(&update.fields, &synced_at))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stamped_adds_synced_at_and_drops_id() {
        let fields = json!({"id": "x", "name": "Asha"}).as_object().cloned().unwrap();
        let value = stamped(&fields, "2024-01-01T00:00:00+00:00");
        assert_eq!(
            value,
            json!({"name": "Asha", "syncedAt": "2024-01-01T00:00:00+00:00"})
        );
    }

    #[test]
    fn non_object_row_is_rejected() {
        let row = StoredRecord {
            id: "r1".into(),
            fields: json!([1, 2]),
        };
        assert!(row.to_record().is_err());

        let row = StoredRecord {
            id: "r1".into(),
            fields: json!({"name": "Asha"}),
        };
        let record = row.to_record().unwrap();
        assert_eq!(record.id, "r1");
        assert_eq!(record.get("name"), Some(&json!("Asha")));
    }
}
