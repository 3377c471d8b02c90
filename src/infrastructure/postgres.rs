//! PostgreSQL backend.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{PgConnection, Postgres, Row, Transaction};
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::aggregates::{InventoryError, Order, OrderItem, Refund, StockHold, StockKey, StockLevel, StockLine};
use crate::domain::history::HistoryEntry;
use crate::infrastructure::{HistoryRepository, InventoryRepository, OrderFilter, OrderRepository, RefundRepository, StoreError};

const ORDER_COLUMNS: &str = "id, order_number, customer_id, customer_email, status, payment_status, payment_method, \
    currency, subtotal, shipping_fee, discount, grand_total, refunded_total, admin_notes, cancelled_reason, \
    is_stock_restored, stock_hold, version, created_at, updated_at, awaiting_payment_at, confirmed_at, \
    processing_at, shipped_at, completed_at, cancelled_at, refunded_at, failed_at, paid_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool { &self.pool }

    async fn order_exists(&self, id: Uuid) -> Result<bool, StoreError> {
        let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM orders WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        Ok(row.is_some())
    }

    /// Runs `sql` once per line inside one transaction; `sql` must bind
    /// `$1` product, `$2` variation, `$3` quantity and touch one row or none.
    async fn apply_lines(&self, lines: &[StockLine], sql: &str, diagnose: Diagnose) -> Result<(), InventoryError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;
        for line in lines {
            let done = sqlx::query(sql)
                .bind(line.key.product_id)
                .bind(line.key.variation_id)
                .bind(line.quantity)
                .execute(&mut *tx)
                .await
                .map_err(storage)?;
            if done.rows_affected() == 0 {
                let err = explain_failure(&mut tx, line, diagnose).await;
                tx.rollback().await.map_err(storage)?;
                return Err(err);
            }
        }
        tx.commit().await.map_err(storage)?;
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Diagnose {
    Reserve,
    Bookkeeping(&'static str),
    Missing,
}

async fn explain_failure(tx: &mut Transaction<'_, Postgres>, line: &StockLine, diagnose: Diagnose) -> InventoryError {
    let current = sqlx::query("SELECT product_id, variation_id, on_hand, reserved, updated_at FROM stock_levels WHERE product_id = $1 AND variation_id IS NOT DISTINCT FROM $2")
        .bind(line.key.product_id)
        .bind(line.key.variation_id)
        .fetch_optional(&mut **tx)
        .await;
    let level = match current {
        Ok(Some(row)) => match stock_from_row(&row) {
            Ok(level) => level,
            Err(e) => return e,
        },
        Ok(None) => return InventoryError::UnknownItem(line.key),
        Err(e) => return storage(e),
    };
    match diagnose {
        Diagnose::Reserve => InventoryError::Insufficient { key: line.key, requested: line.quantity, available: level.available() },
        Diagnose::Bookkeeping(op) => InventoryError::Inconsistent {
            key: line.key,
            detail: format!("{op} {} with {} reserved and {} on hand", line.quantity, level.reserved, level.on_hand),
        },
        Diagnose::Missing => InventoryError::UnknownItem(line.key),
    }
}

fn storage(e: sqlx::Error) -> InventoryError { InventoryError::Storage(e.to_string()) }

fn parse<T: FromStr>(row: &PgRow, column: &str) -> Result<T, StoreError> {
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|_| StoreError::Corrupt(format!("{column}={raw}")))
}

fn order_from_row(row: &PgRow) -> Result<Order, StoreError> {
    Ok(Order {
        id: row.try_get("id")?,
        order_number: row.try_get("order_number")?,
        customer_id: row.try_get("customer_id")?,
        customer_email: row.try_get("customer_email")?,
        status: parse(row, "status")?,
        payment_status: parse(row, "payment_status")?,
        payment_method: parse(row, "payment_method")?,
        currency: row.try_get("currency")?,
        subtotal: row.try_get("subtotal")?,
        shipping_fee: row.try_get("shipping_fee")?,
        discount: row.try_get("discount")?,
        grand_total: row.try_get("grand_total")?,
        refunded_total: row.try_get("refunded_total")?,
        admin_notes: row.try_get("admin_notes")?,
        cancelled_reason: row.try_get("cancelled_reason")?,
        is_stock_restored: row.try_get("is_stock_restored")?,
        stock_hold: parse(row, "stock_hold")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        awaiting_payment_at: row.try_get("awaiting_payment_at")?,
        confirmed_at: row.try_get("confirmed_at")?,
        processing_at: row.try_get("processing_at")?,
        shipped_at: row.try_get("shipped_at")?,
        completed_at: row.try_get("completed_at")?,
        cancelled_at: row.try_get("cancelled_at")?,
        refunded_at: row.try_get("refunded_at")?,
        failed_at: row.try_get("failed_at")?,
        paid_at: row.try_get("paid_at")?,
    })
}

fn item_from_row(row: &PgRow) -> Result<OrderItem, StoreError> {
    let quantity: i32 = row.try_get("quantity")?;
    Ok(OrderItem {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        product_id: row.try_get("product_id")?,
        variation_id: row.try_get("variation_id")?,
        name: row.try_get("name")?,
        quantity: u32::try_from(quantity).map_err(|_| StoreError::Corrupt(format!("quantity={quantity}")))?,
        price: row.try_get("price")?,
    })
}

fn stock_from_row(row: &PgRow) -> Result<StockLevel, InventoryError> {
    let get = || -> Result<StockLevel, sqlx::Error> {
        Ok(StockLevel {
            product_id: row.try_get("product_id")?,
            variation_id: row.try_get("variation_id")?,
            on_hand: row.try_get("on_hand")?,
            reserved: row.try_get("reserved")?,
            updated_at: row.try_get("updated_at")?,
        })
    };
    get().map_err(storage)
}

fn history_from_row(row: &PgRow) -> Result<HistoryEntry, StoreError> {
    Ok(HistoryEntry {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        action: parse(row, "action")?,
        description: row.try_get("description")?,
        actor_id: row.try_get("actor_id")?,
        actor_name: row.try_get("actor_name")?,
        actor_type: parse(row, "actor_type")?,
        old_value: row.try_get("old_value")?,
        new_value: row.try_get("new_value")?,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
    })
}

fn refund_from_row(row: &PgRow) -> Result<Refund, StoreError> {
    Ok(Refund {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        kind: parse(row, "type")?,
        reason: row.try_get("reason")?,
        processed_by: row.try_get("processed_by")?,
        created_at: row.try_get("created_at")?,
    })
}

async fn insert_history(conn: &mut PgConnection, entry: &HistoryEntry) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO order_history (id, order_id, action, description, actor_id, actor_name, actor_type, old_value, new_value, metadata, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(entry.id)
    .bind(entry.order_id)
    .bind(entry.action.as_str())
    .bind(&entry.description)
    .bind(&entry.actor_id)
    .bind(&entry.actor_name)
    .bind(entry.actor_type.as_str())
    .bind(&entry.old_value)
    .bind(&entry.new_value)
    .bind(&entry.metadata)
    .bind(entry.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn insert_refund(conn: &mut PgConnection, refund: &Refund) -> Result<(), StoreError> {
    sqlx::query("INSERT INTO refunds (id, order_id, amount, currency, type, reason, processed_by, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
        .bind(refund.id)
        .bind(refund.order_id)
        .bind(refund.amount)
        .bind(&refund.currency)
        .bind(refund.kind.as_str())
        .bind(&refund.reason)
        .bind(&refund.processed_by)
        .bind(refund.created_at)
        .execute(conn)
        .await?;
    Ok(())
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn insert(&self, order: &Order, items: &[OrderItem], created: &HistoryEntry) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, \
             $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29)"
        ))
        .bind(order.id)
        .bind(&order.order_number)
        .bind(order.customer_id)
        .bind(&order.customer_email)
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.payment_method.as_str())
        .bind(&order.currency)
        .bind(order.subtotal)
        .bind(order.shipping_fee)
        .bind(order.discount)
        .bind(order.grand_total)
        .bind(order.refunded_total)
        .bind(&order.admin_notes)
        .bind(&order.cancelled_reason)
        .bind(order.is_stock_restored)
        .bind(order.stock_hold.as_str())
        .bind(order.version)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.awaiting_payment_at)
        .bind(order.confirmed_at)
        .bind(order.processing_at)
        .bind(order.shipped_at)
        .bind(order.completed_at)
        .bind(order.cancelled_at)
        .bind(order.refunded_at)
        .bind(order.failed_at)
        .bind(order.paid_at)
        .execute(&mut *tx)
        .await?;

        for item in items {
            let quantity = i32::try_from(item.quantity).map_err(|_| StoreError::Corrupt(format!("quantity={}", item.quantity)))?;
            sqlx::query("INSERT INTO order_items (id, order_id, product_id, variation_id, name, quantity, price) VALUES ($1, $2, $3, $4, $5, $6, $7)")
                .bind(item.id)
                .bind(item.order_id)
                .bind(item.product_id)
                .bind(item.variation_id)
                .bind(&item.name)
                .bind(quantity)
                .bind(item.price)
                .execute(&mut *tx)
                .await?;
        }
        insert_history(&mut *tx, created).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn items(&self, id: Uuid) -> Result<Vec<OrderItem>, StoreError> {
        let rows = sqlx::query("SELECT id, order_id, product_id, variation_id, name, quantity, price FROM order_items WHERE order_id = $1 ORDER BY product_id, variation_id")
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(item_from_row).collect()
    }

    async fn list(&self, filter: &OrderFilter) -> Result<(Vec<Order>, i64), StoreError> {
        const WHERE: &str = "WHERE ($1::text IS NULL OR status = $1) \
            AND ($2::text IS NULL OR payment_status = $2) \
            AND ($3::text IS NULL OR lower(customer_email) = lower($3))";
        let status = filter.status.map(|s| s.as_str());
        let payment = filter.payment_status.map(|p| p.as_str());

        let rows = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders {WHERE} ORDER BY created_at DESC, id DESC LIMIT $4 OFFSET $5"))
            .bind(status)
            .bind(payment)
            .bind(filter.customer_email.as_deref())
            .bind(filter.limit())
            .bind(filter.offset())
            .fetch_all(&self.pool)
            .await?;
        let total: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM orders {WHERE}"))
            .bind(status)
            .bind(payment)
            .bind(filter.customer_email.as_deref())
            .fetch_one(&self.pool)
            .await?;
        let orders = rows.iter().map(order_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok((orders, total.0))
    }

    async fn commit(&self, order: &mut Order, entries: &[HistoryEntry], refund: Option<&Refund>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "UPDATE orders SET status = $3, payment_status = $4, refunded_total = $5, admin_notes = $6, \
             cancelled_reason = $7, updated_at = $8, awaiting_payment_at = $9, confirmed_at = $10, processing_at = $11, \
             shipped_at = $12, completed_at = $13, cancelled_at = $14, refunded_at = $15, failed_at = $16, paid_at = $17, \
             version = version + 1 \
             WHERE id = $1 AND version = $2 \
             RETURNING version, stock_hold, is_stock_restored",
        )
        .bind(order.id)
        .bind(order.version)
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.refunded_total)
        .bind(&order.admin_notes)
        .bind(&order.cancelled_reason)
        .bind(order.updated_at)
        .bind(order.awaiting_payment_at)
        .bind(order.confirmed_at)
        .bind(order.processing_at)
        .bind(order.shipped_at)
        .bind(order.completed_at)
        .bind(order.cancelled_at)
        .bind(order.refunded_at)
        .bind(order.failed_at)
        .bind(order.paid_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            if self.order_exists(order.id).await? {
                return Err(StoreError::Conflict { order_id: order.id, expected: order.version });
            }
            return Err(StoreError::NotFound(order.id));
        };
        let version: i64 = row.try_get("version")?;
        let stock_hold: StockHold = parse(&row, "stock_hold")?;
        let is_stock_restored: bool = row.try_get("is_stock_restored")?;

        for entry in entries {
            insert_history(&mut *tx, entry).await?;
        }
        if let Some(refund) = refund {
            insert_refund(&mut *tx, refund).await?;
        }
        tx.commit().await?;

        order.version = version;
        order.stock_hold = stock_hold;
        order.is_stock_restored = is_stock_restored;
        Ok(())
    }

    async fn swap_stock_hold(&self, id: Uuid, expected: StockHold, hold: StockHold) -> Result<bool, StoreError> {
        let done = sqlx::query("UPDATE orders SET stock_hold = $3 WHERE id = $1 AND stock_hold = $2 AND NOT is_stock_restored")
            .bind(id)
            .bind(expected.as_str())
            .bind(hold.as_str())
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            if !self.order_exists(id).await? {
                return Err(StoreError::NotFound(id));
            }
            return Ok(false);
        }
        Ok(true)
    }

    /// Locks the row, so the hold read and the restored flag write cannot
    /// interleave with another claim or a hold swap.
    async fn claim_stock_restoration(&self, id: Uuid) -> Result<Option<StockHold>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT stock_hold, is_stock_restored FROM orders WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            tx.rollback().await?;
            return Err(StoreError::NotFound(id));
        };
        let restored: bool = row.try_get("is_stock_restored")?;
        if restored {
            tx.commit().await?;
            return Ok(None);
        }
        let previous: StockHold = parse(&row, "stock_hold")?;
        sqlx::query("UPDATE orders SET is_stock_restored = TRUE, stock_hold = 'released' WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Some(previous))
    }
}

#[async_trait]
impl InventoryRepository for PgStore {
    async fn get(&self, key: StockKey) -> Result<Option<StockLevel>, InventoryError> {
        let row = sqlx::query("SELECT product_id, variation_id, on_hand, reserved, updated_at FROM stock_levels WHERE product_id = $1 AND variation_id IS NOT DISTINCT FROM $2")
            .bind(key.product_id)
            .bind(key.variation_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.as_ref().map(stock_from_row).transpose()
    }

    async fn set_on_hand(&self, key: StockKey, on_hand: i64) -> Result<StockLevel, InventoryError> {
        let updated = sqlx::query(
            "UPDATE stock_levels SET on_hand = $3, updated_at = NOW() \
             WHERE product_id = $1 AND variation_id IS NOT DISTINCT FROM $2 AND reserved <= $3 \
             RETURNING product_id, variation_id, on_hand, reserved, updated_at",
        )
        .bind(key.product_id)
        .bind(key.variation_id)
        .bind(on_hand)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        if let Some(row) = updated {
            return stock_from_row(&row);
        }
        if let Some(existing) = self.get(key).await? {
            return Err(InventoryError::BelowReserved { key, on_hand, reserved: existing.reserved });
        }
        if on_hand < 0 {
            return Err(InventoryError::BelowReserved { key, on_hand, reserved: 0 });
        }
        let row = sqlx::query(
            "INSERT INTO stock_levels (product_id, variation_id, on_hand, reserved, updated_at) VALUES ($1, $2, $3, 0, NOW()) \
             RETURNING product_id, variation_id, on_hand, reserved, updated_at",
        )
        .bind(key.product_id)
        .bind(key.variation_id)
        .bind(on_hand)
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;
        stock_from_row(&row)
    }

    async fn reserve(&self, lines: &[StockLine]) -> Result<(), InventoryError> {
        self.apply_lines(
            lines,
            "UPDATE stock_levels SET reserved = reserved + $3, updated_at = NOW() \
             WHERE product_id = $1 AND variation_id IS NOT DISTINCT FROM $2 AND on_hand - reserved >= $3",
            Diagnose::Reserve,
        )
        .await
    }

    async fn deduct(&self, lines: &[StockLine]) -> Result<(), InventoryError> {
        self.apply_lines(
            lines,
            "UPDATE stock_levels SET reserved = reserved - $3, on_hand = on_hand - $3, updated_at = NOW() \
             WHERE product_id = $1 AND variation_id IS NOT DISTINCT FROM $2 AND reserved >= $3",
            Diagnose::Bookkeeping("deduct"),
        )
        .await
    }

    async fn release_reserved(&self, lines: &[StockLine]) -> Result<(), InventoryError> {
        self.apply_lines(
            lines,
            "UPDATE stock_levels SET reserved = reserved - $3, updated_at = NOW() \
             WHERE product_id = $1 AND variation_id IS NOT DISTINCT FROM $2 AND reserved >= $3",
            Diagnose::Bookkeeping("release"),
        )
        .await
    }

    async fn restock(&self, lines: &[StockLine]) -> Result<(), InventoryError> {
        self.apply_lines(
            lines,
            "UPDATE stock_levels SET on_hand = on_hand + $3, updated_at = NOW() \
             WHERE product_id = $1 AND variation_id IS NOT DISTINCT FROM $2",
            Diagnose::Missing,
        )
        .await
    }
}

#[async_trait]
impl HistoryRepository for PgStore {
    async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<HistoryEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, order_id, action, description, actor_id, actor_name, actor_type, old_value, new_value, metadata, created_at \
             FROM order_history WHERE order_id = $1 ORDER BY created_at, id",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(history_from_row).collect()
    }
}

#[async_trait]
impl RefundRepository for PgStore {
    async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<Refund>, StoreError> {
        let rows = sqlx::query("SELECT id, order_id, amount, currency, type, reason, processed_by, created_at FROM refunds WHERE order_id = $1 ORDER BY created_at, id")
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(refund_from_row).collect()
    }
}
