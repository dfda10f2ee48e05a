use async_trait::async_trait;
use common::{NotificationId, OrderId};
use sqlx::{PgPool, Row, postgres::PgRow, types::Json};
use uuid::Uuid;

use crate::{
    NotificationError, NotificationKind, NotificationRecord, NotificationStore, Recipient, Result,
    notification::Priority,
};

const NOTIFICATION_COLUMNS: &str =
    "id, recipient_type, recipient_id, order_id, payload, title, message, priority, is_read, created_at";

/// PostgreSQL-backed notification store. Shares the order schema's `notifications` table.
#[derive(Clone)]
pub struct PostgresNotificationStore {
    pool: PgPool,
}

impl PostgresNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn decode_priority(value: String) -> Result<Priority> {
    Ok(serde_json::from_value(serde_json::Value::String(value))?)
}

fn row_to_record(row: &PgRow) -> Result<NotificationRecord> {
    let recipient = Recipient::from_parts(
        row.try_get::<&str, _>("recipient_type")?,
        row.try_get::<Uuid, _>("recipient_id")?,
    )?;
    let Json(kind) = row.try_get::<Json<NotificationKind>, _>("payload")?;

    Ok(NotificationRecord {
        id: NotificationId::from_uuid(row.try_get::<Uuid, _>("id")?),
        recipient,
        order_id: row
            .try_get::<Option<Uuid>, _>("order_id")?
            .map(OrderId::from_uuid),
        kind,
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        priority: decode_priority(row.try_get("priority")?)?,
        is_read: row.try_get("is_read")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl NotificationStore for PostgresNotificationStore {
    async fn insert(&self, record: NotificationRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (
                id, recipient_type, recipient_id, order_id, kind, title, message,
                payload, priority, is_read, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.recipient.recipient_type())
        .bind(record.recipient.id())
        .bind(record.order_id.map(|id| id.as_uuid()))
        .bind(record.kind.as_str())
        .bind(&record.title)
        .bind(&record.message)
        .bind(Json(&record.kind))
        .bind(record.priority.as_str())
        .bind(record.is_read)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(
        &self,
        recipient: Recipient,
        limit: Option<usize>,
    ) -> Result<Vec<NotificationRecord>> {
        let mut sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
             WHERE recipient_type = $1 AND recipient_id = $2 \
             ORDER BY created_at DESC, id ASC"
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let rows = sqlx::query(&sql)
            .bind(recipient.recipient_type())
            .bind(recipient.id())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn unread_count(&self, recipient: Recipient) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications \
             WHERE recipient_type = $1 AND recipient_id = $2 AND NOT is_read",
        )
        .bind(recipient.recipient_type())
        .bind(recipient.id())
        .fetch_one(&self.pool)
        .await?;

        Ok(count as usize)
    }

    async fn mark_read(&self, id: NotificationId) -> Result<NotificationRecord> {
        let row = sqlx::query(&format!(
            "UPDATE notifications SET is_read = TRUE WHERE id = $1 RETURNING {NOTIFICATION_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_record(&row),
            None => Err(NotificationError::NotFound(id)),
        }
    }

    async fn mark_all_read(&self, recipient: Recipient) -> Result<usize> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE \
             WHERE recipient_type = $1 AND recipient_id = $2 AND NOT is_read",
        )
        .bind(recipient.recipient_type())
        .bind(recipient.id())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() as usize)
    }
}
