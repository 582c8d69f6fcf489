//! Stationery purchase orders: multi-line stock reservation with
//! all-or-nothing semantics.
//!
//! Placing an order deducts stock for every line inside one atomic unit; if
//! any line fails its precondition the whole order rolls back and no stock
//! moves. Cancellation restores every reserved line the same way.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::inventory_item::{self, Entity as InventoryItemEntity};
use crate::entities::order::{self, Entity as OrderEntity, OrderStatus};
use crate::entities::order_item::{self, Entity as OrderItemEntity};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::ledger::codes::{self, MAX_CODE_ATTEMPTS};
use crate::ledger::retry::is_unique_violation;
use crate::ledger::{run_atomic, RejectReason, RetryPolicy};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OrderLineRequest {
    pub item_id: Uuid,
    #[validate(range(min = 1, message = "Line quantity must be positive"))]
    pub quantity: i32,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct PlaceOrderRequest {
    pub placed_by: Uuid,
    #[validate(length(min = 1, message = "An order needs at least one line"))]
    pub lines: Vec<OrderLineRequest>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderLineResponse {
    pub item_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_code: String,
    pub placed_by: Uuid,
    pub status: String,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<OrderLineResponse>,
}

impl OrderResponse {
    fn from_parts(order: order::Model, items: Vec<order_item::Model>) -> Self {
        Self {
            id: order.id,
            order_code: order.order_code,
            placed_by: order.placed_by,
            status: order.status,
            total_amount: order.total_amount,
            created_at: order.created_at,
            lines: items
                .into_iter()
                .map(|item| OrderLineResponse {
                    item_id: item.item_id,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                })
                .collect(),
        }
    }
}

/// Service for placing and transitioning purchase orders.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    retry: RetryPolicy,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(
        db_pool: Arc<DbPool>,
        retry: RetryPolicy,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db_pool,
            retry,
            event_sender,
        }
    }

    /// Places an order, reserving stock for every line atomically.
    ///
    /// A collision on the generated order code is retried with a fresh
    /// candidate; it never surfaces to the caller unless the bound is
    /// exhausted.
    #[instrument(skip(self, request), fields(placed_by = %request.placed_by, lines = request.lines.len()))]
    pub async fn place_order(
        &self,
        request: PlaceOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        for line in &request.lines {
            line.validate()
                .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        }

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let code = codes::order_code();

            match self
                .place_order_with_code(request.placed_by, &request.lines, &code)
                .await
            {
                Err(ServiceError::DatabaseError(db_err))
                    if is_unique_violation(&db_err) && attempt < MAX_CODE_ATTEMPTS =>
                {
                    warn!(code = %code, attempt, "Order code collided, regenerating");
                    continue;
                }
                Err(ServiceError::DatabaseError(db_err)) if is_unique_violation(&db_err) => {
                    return Err(ServiceError::TransientFailure(format!(
                        "Order code generation exhausted after {} attempts",
                        MAX_CODE_ATTEMPTS
                    )));
                }
                other => return other,
            }
        }

        unreachable!("code attempt loop exited without a result")
    }

    async fn place_order_with_code(
        &self,
        placed_by: Uuid,
        lines: &[OrderLineRequest],
        code: &str,
    ) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db_pool;
        let lines = lines.to_vec();
        let code = code.to_string();

        let (order, items) = run_atomic(db, &self.retry, "order_place", move |txn| {
            let lines = lines.clone();
            let code = code.clone();
            Box::pin(async move {
                let now = Utc::now();
                let order_id = Uuid::new_v4();
                let mut total = Decimal::ZERO;
                let mut order_items = Vec::with_capacity(lines.len());

                for line in &lines {
                    let item = InventoryItemEntity::find_by_id(line.item_id)
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Item {} not found", line.item_id))
                        })?;

                    if item.quantity_in_stock < line.quantity {
                        return Err(ServiceError::Rejected(RejectReason::InsufficientCapacity));
                    }

                    let updated = InventoryItemEntity::update_many()
                        .col_expr(
                            inventory_item::Column::QuantityInStock,
                            Expr::col(inventory_item::Column::QuantityInStock).sub(line.quantity),
                        )
                        .col_expr(
                            inventory_item::Column::Version,
                            Expr::col(inventory_item::Column::Version).add(1),
                        )
                        .col_expr(inventory_item::Column::UpdatedAt, Expr::value(now))
                        .filter(inventory_item::Column::Id.eq(line.item_id))
                        .filter(inventory_item::Column::Version.eq(item.version))
                        .exec(txn)
                        .await?;

                    if updated.rows_affected == 0 {
                        return Err(ServiceError::ConcurrentModification(line.item_id));
                    }

                    total += item.unit_price * Decimal::from(line.quantity);
                    order_items.push((line.item_id, line.quantity, item.unit_price));
                }

                let order = order::ActiveModel {
                    id: Set(order_id),
                    order_code: Set(code),
                    placed_by: Set(placed_by),
                    status: Set(OrderStatus::Pending.as_str().to_string()),
                    total_amount: Set(total),
                    version: Set(1),
                    created_at: Set(now),
                    updated_at: Set(Some(now)),
                }
                .insert(txn)
                .await?;

                let mut inserted_items = Vec::with_capacity(order_items.len());
                for (item_id, quantity, unit_price) in order_items {
                    let model = order_item::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        order_id: Set(order_id),
                        item_id: Set(item_id),
                        quantity: Set(quantity),
                        unit_price: Set(unit_price),
                    }
                    .insert(txn)
                    .await?;
                    inserted_items.push(model);
                }

                Ok((order, inserted_items))
            })
        })
        .await?;

        info!(order_id = %order.id, order_code = %order.order_code, "Order placed");

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::OrderPlaced {
                    order_id: order.id,
                    order_code: order.order_code.clone(),
                })
                .await
            {
                warn!(error = %e, order_id = %order.id, "Failed to send order placed event");
            }
        }

        Ok(OrderResponse::from_parts(order, items))
    }

    /// Retrieves an order with its lines.
    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<Option<OrderResponse>, ServiceError> {
        let db = &*self.db_pool;

        let order = OrderEntity::find_by_id(order_id).one(db).await?;

        match order {
            Some(order) => {
                let items = OrderItemEntity::find()
                    .filter(order_item::Column::OrderId.eq(order_id))
                    .all(db)
                    .await?;
                Ok(Some(OrderResponse::from_parts(order, items)))
            }
            None => Ok(None),
        }
    }

    /// Marks a pending order completed. Terminal; completed orders accept no
    /// further transitions.
    #[instrument(skip(self))]
    pub async fn complete_order(&self, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let order = self
            .transition_order(order_id, "order_complete", OrderStatus::Completed)
            .await?;

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(Event::OrderCompleted(order_id)).await {
                warn!(error = %e, order_id = %order_id, "Failed to send order completed event");
            }
        }

        Ok(order)
    }

    /// Cancels a pending order, restoring the stock every line reserved.
    ///
    /// Cancelling a completed or already-cancelled order rejects with
    /// `IllegalTransition` and moves no stock.
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db_pool;

        let (order, items) = run_atomic(db, &self.retry, "order_cancel", move |txn| {
            Box::pin(async move {
                let order = OrderEntity::find_by_id(order_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Order {} not found", order_id))
                    })?;

                if OrderStatus::from_str(&order.status) != Some(OrderStatus::Pending) {
                    return Err(ServiceError::Rejected(RejectReason::IllegalTransition));
                }

                let now = Utc::now();
                let flipped = OrderEntity::update_many()
                    .col_expr(
                        order::Column::Status,
                        Expr::value(OrderStatus::Cancelled.as_str()),
                    )
                    .col_expr(order::Column::Version, Expr::col(order::Column::Version).add(1))
                    .col_expr(order::Column::UpdatedAt, Expr::value(now))
                    .filter(order::Column::Id.eq(order_id))
                    .filter(order::Column::Version.eq(order.version))
                    .exec(txn)
                    .await?;

                if flipped.rows_affected == 0 {
                    return Err(ServiceError::ConcurrentModification(order_id));
                }

                let items = OrderItemEntity::find()
                    .filter(order_item::Column::OrderId.eq(order_id))
                    .all(txn)
                    .await?;

                for item in &items {
                    let pool_item = InventoryItemEntity::find_by_id(item.item_id)
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::InternalError(format!(
                                "Order {} references missing item {}",
                                order_id, item.item_id
                            ))
                        })?;

                    let restored = InventoryItemEntity::update_many()
                        .col_expr(
                            inventory_item::Column::QuantityInStock,
                            Expr::col(inventory_item::Column::QuantityInStock).add(item.quantity),
                        )
                        .col_expr(
                            inventory_item::Column::Version,
                            Expr::col(inventory_item::Column::Version).add(1),
                        )
                        .col_expr(inventory_item::Column::UpdatedAt, Expr::value(now))
                        .filter(inventory_item::Column::Id.eq(item.item_id))
                        .filter(inventory_item::Column::Version.eq(pool_item.version))
                        .exec(txn)
                        .await?;

                    if restored.rows_affected == 0 {
                        return Err(ServiceError::ConcurrentModification(item.item_id));
                    }
                }

                let refreshed = OrderEntity::find_by_id(order_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::InternalError(format!("Order {} vanished mid-cancel", order_id))
                    })?;

                Ok((refreshed, items))
            })
        })
        .await?;

        info!(order_id = %order_id, "Order cancelled, stock restored");

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(Event::OrderCancelled(order_id)).await {
                warn!(error = %e, order_id = %order_id, "Failed to send order cancelled event");
            }
        }

        Ok(OrderResponse::from_parts(order, items))
    }

    async fn transition_order(
        &self,
        order_id: Uuid,
        operation: &str,
        target: OrderStatus,
    ) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db_pool;

        let (order, items) = run_atomic(db, &self.retry, operation, move |txn| {
            Box::pin(async move {
                let order = OrderEntity::find_by_id(order_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Order {} not found", order_id))
                    })?;

                if OrderStatus::from_str(&order.status) != Some(OrderStatus::Pending) {
                    return Err(ServiceError::Rejected(RejectReason::IllegalTransition));
                }

                let now = Utc::now();
                let flipped = OrderEntity::update_many()
                    .col_expr(order::Column::Status, Expr::value(target.as_str()))
                    .col_expr(order::Column::Version, Expr::col(order::Column::Version).add(1))
                    .col_expr(order::Column::UpdatedAt, Expr::value(now))
                    .filter(order::Column::Id.eq(order_id))
                    .filter(order::Column::Version.eq(order.version))
                    .exec(txn)
                    .await?;

                if flipped.rows_affected == 0 {
                    return Err(ServiceError::ConcurrentModification(order_id));
                }

                let refreshed = OrderEntity::find_by_id(order_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::InternalError(format!(
                            "Order {} vanished mid-transition",
                            order_id
                        ))
                    })?;

                let items = OrderItemEntity::find()
                    .filter(order_item::Column::OrderId.eq(order_id))
                    .all(txn)
                    .await?;

                Ok((refreshed, items))
            })
        })
        .await?;

        info!(order_id = %order_id, status = %order.status, "Order transitioned");

        Ok(OrderResponse::from_parts(order, items))
    }
}
