use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, MenuItemId, OrderId, RestaurantId, SessionId, StaffId, TableId};
use domain::{
    CustomerSession, Money, Order, OrderGuard, OrderItem, OrderPatch, QueueEntry, StaffGuard,
};
use serde::de::DeserializeOwned;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    OrderQuery, Result, StoreError,
    store::{ConditionalUpdate, CreatedOrder, NewOrder, OfferUsage, OrderStore},
};

const ORDER_COLUMNS: &str = "id, restaurant_id, table_id, session_id, customer_id, order_number, \
     status, order_type, subtotal, platform_fee, tip, discount, total, payment_method, \
     payment_status, assigned_staff_id, special_instructions, rejection_reason, \
     cancellation_reason, created_at, assigned_at, started_at, ready_at, completed_at, \
     cancelled_at, updated_at";

const SESSION_COLUMNS: &str = "id, restaurant_id, table_id, customer_name, customer_phone, \
     customer_email, customer_id, created_by_staff, staff_id, status, started_at, ended_at";

/// PostgreSQL-backed order store implementation.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Decodes a snake_case enum stored as text.
pub(crate) fn decode_enum<T: DeserializeOwned>(value: String) -> Result<T> {
    Ok(serde_json::from_value(serde_json::Value::String(value))?)
}

fn row_to_order(row: &PgRow) -> Result<Order> {
    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        restaurant_id: RestaurantId::from_uuid(row.try_get::<Uuid, _>("restaurant_id")?),
        table_id: TableId::from_uuid(row.try_get::<Uuid, _>("table_id")?),
        session_id: row
            .try_get::<Option<Uuid>, _>("session_id")?
            .map(SessionId::from_uuid),
        customer_id: row
            .try_get::<Option<Uuid>, _>("customer_id")?
            .map(CustomerId::from_uuid),
        order_number: row.try_get("order_number")?,
        status: decode_enum(row.try_get("status")?)?,
        order_type: decode_enum(row.try_get("order_type")?)?,
        subtotal: Money::new(row.try_get("subtotal")?),
        platform_fee: Money::new(row.try_get("platform_fee")?),
        tip: Money::new(row.try_get("tip")?),
        discount: Money::new(row.try_get("discount")?),
        total: Money::new(row.try_get("total")?),
        payment_method: decode_enum(row.try_get("payment_method")?)?,
        payment_status: decode_enum(row.try_get("payment_status")?)?,
        assigned_staff_id: row
            .try_get::<Option<Uuid>, _>("assigned_staff_id")?
            .map(StaffId::from_uuid),
        special_instructions: row.try_get("special_instructions")?,
        rejection_reason: row.try_get("rejection_reason")?,
        cancellation_reason: row.try_get("cancellation_reason")?,
        created_at: row.try_get("created_at")?,
        assigned_at: row.try_get("assigned_at")?,
        started_at: row.try_get("started_at")?,
        ready_at: row.try_get("ready_at")?,
        completed_at: row.try_get("completed_at")?,
        cancelled_at: row.try_get("cancelled_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_item(row: &PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        id: row.try_get("id")?,
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        item_id: MenuItemId::new(row.try_get::<String, _>("item_id")?),
        name: row.try_get("name")?,
        quantity: row.try_get::<i32, _>("quantity")?.max(0) as u32,
        unit_price: Money::new(row.try_get("unit_price")?),
        total_price: Money::new(row.try_get("total_price")?),
        instructions: row.try_get("instructions")?,
    })
}

fn row_to_queue_entry(row: &PgRow) -> Result<QueueEntry> {
    Ok(QueueEntry {
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        restaurant_id: RestaurantId::from_uuid(row.try_get::<Uuid, _>("restaurant_id")?),
        position: row.try_get("position")?,
        priority: decode_enum(row.try_get("priority")?)?,
        estimated_wait_minutes: row.try_get::<i32, _>("estimated_wait_minutes")?.max(0) as u32,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_session(row: &PgRow) -> Result<CustomerSession> {
    Ok(CustomerSession {
        id: SessionId::from_uuid(row.try_get::<Uuid, _>("id")?),
        restaurant_id: RestaurantId::from_uuid(row.try_get::<Uuid, _>("restaurant_id")?),
        table_id: TableId::from_uuid(row.try_get::<Uuid, _>("table_id")?),
        customer_name: row.try_get("customer_name")?,
        customer_phone: row.try_get("customer_phone")?,
        customer_email: row.try_get("customer_email")?,
        customer_id: row
            .try_get::<Option<Uuid>, _>("customer_id")?
            .map(CustomerId::from_uuid),
        created_by_staff: row.try_get("created_by_staff")?,
        staff_id: row
            .try_get::<Option<Uuid>, _>("staff_id")?
            .map(StaffId::from_uuid),
        status: decode_enum(row.try_get("status")?)?,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
    })
}

fn row_to_offer_usage(row: &PgRow) -> Result<OfferUsage> {
    Ok(OfferUsage {
        offer_id: row.try_get("offer_id")?,
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        restaurant_id: RestaurantId::from_uuid(row.try_get::<Uuid, _>("restaurant_id")?),
        session_id: row
            .try_get::<Option<Uuid>, _>("session_id")?
            .map(SessionId::from_uuid),
        customer_id: row
            .try_get::<Option<Uuid>, _>("customer_id")?
            .map(CustomerId::from_uuid),
        discount: Money::new(row.try_get("discount")?),
        used_at: row.try_get("used_at")?,
    })
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn create_order(&self, new_order: NewOrder) -> Result<CreatedOrder> {
        let NewOrder {
            order,
            items,
            queue,
            offer_usage,
        } = new_order;

        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, \
             $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26)"
        ))
        .bind(order.id.as_uuid())
        .bind(order.restaurant_id.as_uuid())
        .bind(order.table_id.as_uuid())
        .bind(order.session_id.map(|id| id.as_uuid()))
        .bind(order.customer_id.map(|id| id.as_uuid()))
        .bind(&order.order_number)
        .bind(order.status.as_str())
        .bind(order.order_type.as_str())
        .bind(order.subtotal.amount())
        .bind(order.platform_fee.amount())
        .bind(order.tip.amount())
        .bind(order.discount.amount())
        .bind(order.total.amount())
        .bind(order.payment_method.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.assigned_staff_id.map(|id| id.as_uuid()))
        .bind(&order.special_instructions)
        .bind(&order.rejection_reason)
        .bind(&order.cancellation_reason)
        .bind(order.created_at)
        .bind(order.assigned_at)
        .bind(order.started_at)
        .bind(order.ready_at)
        .bind(order.completed_at)
        .bind(order.cancelled_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.constraint() == Some("unique_restaurant_order_number")
                    || db_err.constraint() == Some("orders_pkey")
                {
                    return StoreError::Duplicate {
                        restaurant_id: order.restaurant_id,
                        order_number: order.order_number.clone(),
                    };
                }
            }
            StoreError::Database(e)
        })?;

        for (line_no, item) in items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, item_id, name, quantity, unit_price, total_price, instructions, line_no)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(item.id)
            .bind(item.order_id.as_uuid())
            .bind(item.item_id.as_str())
            .bind(&item.name)
            .bind(i32::try_from(item.quantity).unwrap_or(i32::MAX))
            .bind(item.unit_price.amount())
            .bind(item.total_price.amount())
            .bind(&item.instructions)
            .bind(line_no as i32)
            .execute(&mut *tx)
            .await?;
        }

        let queue_row = sqlx::query(
            r#"
            INSERT INTO order_queue (order_id, restaurant_id, position, priority, estimated_wait_minutes, created_at)
            SELECT $1, $2, COALESCE(MAX(position), 0) + 1, $3, $4, $5
            FROM order_queue
            WHERE restaurant_id = $2
            RETURNING order_id, restaurant_id, position, priority, estimated_wait_minutes, created_at
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.restaurant_id.as_uuid())
        .bind(queue.priority.as_str())
        .bind(i32::try_from(queue.estimated_wait_minutes).unwrap_or(i32::MAX))
        .bind(order.created_at)
        .fetch_one(&mut *tx)
        .await?;
        let queue_entry = row_to_queue_entry(&queue_row)?;

        if let Some(usage) = &offer_usage {
            sqlx::query(
                r#"
                INSERT INTO offer_usages (order_id, offer_id, restaurant_id, session_id, customer_id, discount, used_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(usage.order_id.as_uuid())
            .bind(&usage.offer_id)
            .bind(usage.restaurant_id.as_uuid())
            .bind(usage.session_id.map(|id| id.as_uuid()))
            .bind(usage.customer_id.map(|id| id.as_uuid()))
            .bind(usage.discount.amount())
            .bind(usage.used_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(CreatedOrder {
            order,
            items,
            queue_entry,
        })
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_order).transpose()
    }

    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, item_id, name, quantity, unit_price, total_price, instructions
            FROM order_items
            WHERE order_id = $1
            ORDER BY line_no ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_item).collect()
    }

    async fn get_queue_entry(&self, order_id: OrderId) -> Result<Option<QueueEntry>> {
        let row = sqlx::query(
            r#"
            SELECT order_id, restaurant_id, position, priority, estimated_wait_minutes, created_at
            FROM order_queue
            WHERE order_id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_queue_entry).transpose()
    }

    async fn update_order_if(
        &self,
        order_id: OrderId,
        guard: &OrderGuard,
        patch: &OrderPatch,
    ) -> Result<ConditionalUpdate> {
        let statuses: Vec<&str> = guard.statuses.iter().map(|s| s.as_str()).collect();

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE orders SET updated_at = ");
        builder.push_bind(patch.at);
        if let Some(status) = patch.status {
            builder.push(", status = ").push_bind(status.as_str());
            if let Some(column) = OrderPatch::stamp_column(status) {
                builder
                    .push(format!(", {column} = COALESCE({column}, "))
                    .push_bind(patch.at)
                    .push(")");
            }
        }
        if let Some(assigned) = patch.assigned_staff {
            builder
                .push(", assigned_staff_id = ")
                .push_bind(assigned.map(|id| id.as_uuid()));
        }
        if let Some(reason) = &patch.rejection_reason {
            builder.push(", rejection_reason = ").push_bind(reason.clone());
        }
        if let Some(reason) = &patch.cancellation_reason {
            builder.push(", cancellation_reason = ").push_bind(reason.clone());
        }

        builder
            .push(" WHERE id = ")
            .push_bind(order_id.as_uuid())
            .push(" AND status = ANY(")
            .push_bind(statuses)
            .push(")");
        match guard.staff {
            StaffGuard::Any => {}
            StaffGuard::Unassigned => {
                builder.push(" AND assigned_staff_id IS NULL");
            }
            StaffGuard::AssignedTo(staff_id) => {
                builder
                    .push(" AND assigned_staff_id = ")
                    .push_bind(staff_id.as_uuid());
            }
        }
        builder.push(format!(" RETURNING {ORDER_COLUMNS}"));

        if let Some(row) = builder.build().fetch_optional(&self.pool).await? {
            return Ok(ConditionalUpdate::Applied(row_to_order(&row)?));
        }

        match self.get_order(order_id).await? {
            Some(current) => Ok(ConditionalUpdate::ConditionFailed(current)),
            None => Ok(ConditionalUpdate::NotFound),
        }
    }

    async fn query_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if query.restaurant_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND restaurant_id = ${param_count}"));
        }
        if !query.statuses.is_empty() {
            param_count += 1;
            sql.push_str(&format!(" AND status = ANY(${param_count})"));
        }
        if query.assigned_staff_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND assigned_staff_id = ${param_count}"));
        }
        if query.session_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND session_id = ${param_count}"));
        }

        sql.push_str(" ORDER BY created_at DESC, id ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(id) = query.restaurant_id {
            sqlx_query = sqlx_query.bind(id.as_uuid());
        }
        if !query.statuses.is_empty() {
            let statuses: Vec<&str> = query.statuses.iter().map(|s| s.as_str()).collect();
            sqlx_query = sqlx_query.bind(statuses);
        }
        if let Some(id) = query.assigned_staff_id {
            sqlx_query = sqlx_query.bind(id.as_uuid());
        }
        if let Some(id) = query.session_id {
            sqlx_query = sqlx_query.bind(id.as_uuid());
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_order).collect()
    }

    async fn create_session(&self, session: CustomerSession) -> Result<CustomerSession> {
        sqlx::query(&format!(
            "INSERT INTO customer_sessions ({SESSION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        ))
        .bind(session.id.as_uuid())
        .bind(session.restaurant_id.as_uuid())
        .bind(session.table_id.as_uuid())
        .bind(&session.customer_name)
        .bind(&session.customer_phone)
        .bind(&session.customer_email)
        .bind(session.customer_id.map(|id| id.as_uuid()))
        .bind(session.created_by_staff)
        .bind(session.staff_id.map(|id| id.as_uuid()))
        .bind(session.status.as_str())
        .bind(session.started_at)
        .bind(session.ended_at)
        .execute(&self.pool)
        .await?;

        Ok(session)
    }

    async fn get_session(&self, session_id: SessionId) -> Result<Option<CustomerSession>> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM customer_sessions WHERE id = $1"
        ))
        .bind(session_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_session).transpose()
    }

    async fn find_active_session(
        &self,
        restaurant_id: RestaurantId,
        table_id: TableId,
    ) -> Result<Option<CustomerSession>> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM customer_sessions \
             WHERE restaurant_id = $1 AND table_id = $2 AND status = 'active' \
             ORDER BY started_at DESC LIMIT 1"
        ))
        .bind(restaurant_id.as_uuid())
        .bind(table_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_session).transpose()
    }

    async fn complete_session(
        &self,
        session_id: SessionId,
        ended_at: DateTime<Utc>,
    ) -> Result<Option<CustomerSession>> {
        let row = sqlx::query(&format!(
            "UPDATE customer_sessions \
             SET status = 'completed', ended_at = COALESCE(ended_at, $2) \
             WHERE id = $1 \
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(session_id.as_uuid())
        .bind(ended_at)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_session).transpose()
    }

    async fn get_offer_usage(&self, order_id: OrderId) -> Result<Option<OfferUsage>> {
        let row = sqlx::query(
            r#"
            SELECT order_id, offer_id, restaurant_id, session_id, customer_id, discount, used_at
            FROM offer_usages
            WHERE order_id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_offer_usage).transpose()
    }
}
