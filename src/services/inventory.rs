//! Stationery inventory: stock intake and direct issuance.
//!
//! `quantity_in_stock` is mutated only inside atomic units; an issuance
//! deducts stock and appends the issuance record together.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::inventory_item::{self, Entity as InventoryItemEntity};
use crate::entities::item_issuance::{self, Entity as ItemIssuanceEntity};
use crate::entities::order_item::{self, Entity as OrderItemEntity};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::ledger::{run_atomic, RejectReason, RetryPolicy};

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct AddItemRequest {
    #[validate(length(min = 1, message = "SKU is required"))]
    pub sku: String,
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(range(min = 0))]
    pub initial_quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct IssueItemRequest {
    pub item_id: Uuid,
    pub recipient_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ItemResponse {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub quantity_in_stock: i32,
    pub unit_price: Decimal,
}

impl From<inventory_item::Model> for ItemResponse {
    fn from(model: inventory_item::Model) -> Self {
        Self {
            id: model.id,
            sku: model.sku,
            name: model.name,
            quantity_in_stock: model.quantity_in_stock,
            unit_price: model.unit_price,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IssuanceResponse {
    pub id: Uuid,
    pub item_id: Uuid,
    pub recipient_id: Uuid,
    pub quantity: i32,
}

impl From<item_issuance::Model> for IssuanceResponse {
    fn from(model: item_issuance::Model) -> Self {
        Self {
            id: model.id,
            item_id: model.item_id,
            recipient_id: model.recipient_id,
            quantity: model.quantity,
        }
    }
}

/// Service for managing inventory items and issuances.
#[derive(Clone)]
pub struct InventoryService {
    db_pool: Arc<DbPool>,
    retry: RetryPolicy,
    event_sender: Option<Arc<EventSender>>,
}

impl InventoryService {
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

    /// Adds a new inventory item.
    #[instrument(skip(self, request), fields(sku = %request.sku))]
    pub async fn add_item(&self, request: AddItemRequest) -> Result<ItemResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let db = &*self.db_pool;
        let now = Utc::now();

        let model = inventory_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set(request.sku),
            name: Set(request.name),
            quantity_in_stock: Set(request.initial_quantity),
            unit_price: Set(request.unit_price),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(db)
        .await
        .map_err(|e| {
            if crate::ledger::retry::is_unique_violation(&e) {
                ServiceError::Conflict("SKU already exists".to_string())
            } else {
                ServiceError::DatabaseError(e)
            }
        })?;

        info!(item_id = %model.id, "Inventory item added");

        Ok(ItemResponse::from(model))
    }

    /// Retrieves an item by ID.
    #[instrument(skip(self))]
    pub async fn get_item(&self, item_id: Uuid) -> Result<Option<ItemResponse>, ServiceError> {
        let db = &*self.db_pool;

        let item = InventoryItemEntity::find_by_id(item_id).one(db).await?;

        Ok(item.map(ItemResponse::from))
    }

    /// Increases the stock counter for an item.
    #[instrument(skip(self))]
    pub async fn restock_item(
        &self,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<ItemResponse, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Restock quantity must be positive".to_string(),
            ));
        }

        let db = &*self.db_pool;

        let item = run_atomic(db, &self.retry, "item_restock", move |txn| {
            Box::pin(async move {
                let item = InventoryItemEntity::find_by_id(item_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("Item {} not found", item_id)))?;

                let updated = InventoryItemEntity::update_many()
                    .col_expr(
                        inventory_item::Column::QuantityInStock,
                        Expr::col(inventory_item::Column::QuantityInStock).add(quantity),
                    )
                    .col_expr(
                        inventory_item::Column::Version,
                        Expr::col(inventory_item::Column::Version).add(1),
                    )
                    .col_expr(inventory_item::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(inventory_item::Column::Id.eq(item_id))
                    .filter(inventory_item::Column::Version.eq(item.version))
                    .exec(txn)
                    .await?;

                if updated.rows_affected == 0 {
                    return Err(ServiceError::ConcurrentModification(item_id));
                }

                let refreshed = InventoryItemEntity::find_by_id(item_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::InternalError(format!("Item {} vanished mid-restock", item_id))
                    })?;

                Ok(refreshed)
            })
        })
        .await?;

        info!(item_id = %item_id, quantity, "Item restocked");

        Ok(ItemResponse::from(item))
    }

    /// Issues stock directly to a recipient (e.g. stationery to staff).
    ///
    /// The stock check, the deduction, and the issuance record are one
    /// atomic unit.
    #[instrument(skip(self, request), fields(item_id = %request.item_id, quantity = request.quantity))]
    pub async fn issue_item(
        &self,
        request: IssueItemRequest,
    ) -> Result<IssuanceResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let db = &*self.db_pool;
        let item_id = request.item_id;
        let recipient_id = request.recipient_id;
        let quantity = request.quantity;

        let issuance = run_atomic(db, &self.retry, "item_issue", move |txn| {
            Box::pin(async move {
                let item = InventoryItemEntity::find_by_id(item_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("Item {} not found", item_id)))?;

                if item.quantity_in_stock < quantity {
                    return Err(ServiceError::Rejected(RejectReason::InsufficientCapacity));
                }

                let now = Utc::now();
                let updated = InventoryItemEntity::update_many()
                    .col_expr(
                        inventory_item::Column::QuantityInStock,
                        Expr::col(inventory_item::Column::QuantityInStock).sub(quantity),
                    )
                    .col_expr(
                        inventory_item::Column::Version,
                        Expr::col(inventory_item::Column::Version).add(1),
                    )
                    .col_expr(inventory_item::Column::UpdatedAt, Expr::value(now))
                    .filter(inventory_item::Column::Id.eq(item_id))
                    .filter(inventory_item::Column::Version.eq(item.version))
                    .exec(txn)
                    .await?;

                if updated.rows_affected == 0 {
                    return Err(ServiceError::ConcurrentModification(item_id));
                }

                let issuance = item_issuance::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    item_id: Set(item_id),
                    recipient_id: Set(recipient_id),
                    quantity: Set(quantity),
                    issued_at: Set(now),
                }
                .insert(txn)
                .await?;

                Ok(issuance)
            })
        })
        .await?;

        info!(issuance_id = %issuance.id, item_id = %item_id, "Item issued");

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::ItemIssued {
                    item_id,
                    issuance_id: issuance.id,
                    quantity,
                })
                .await
            {
                warn!(error = %e, issuance_id = %issuance.id, "Failed to send issuance event");
            }
        }

        Ok(IssuanceResponse::from(issuance))
    }

    /// Removes an item from the catalog; blocked while issuances or order
    /// lines reference it.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, item_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;

        run_atomic(db, &self.retry, "item_remove", move |txn| {
            Box::pin(async move {
                let item = InventoryItemEntity::find_by_id(item_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("Item {} not found", item_id)))?;

                let issuances = ItemIssuanceEntity::find()
                    .filter(item_issuance::Column::ItemId.eq(item_id))
                    .count(txn)
                    .await?;
                let order_lines = OrderItemEntity::find()
                    .filter(order_item::Column::ItemId.eq(item_id))
                    .count(txn)
                    .await?;

                if issuances > 0 || order_lines > 0 {
                    return Err(ServiceError::Conflict(format!(
                        "Item {} has {} dependent records and cannot be removed",
                        item_id,
                        issuances + order_lines
                    )));
                }

                let deleted = InventoryItemEntity::delete_many()
                    .filter(inventory_item::Column::Id.eq(item_id))
                    .filter(inventory_item::Column::Version.eq(item.version))
                    .exec(txn)
                    .await?;

                if deleted.rows_affected == 0 {
                    return Err(ServiceError::ConcurrentModification(item_id));
                }

                Ok(())
            })
        })
        .await?;

        info!(item_id = %item_id, "Inventory item removed");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn item_model_to_response() {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let model = inventory_item::Model {
            id,
            sku: "PEN-01".to_string(),
            name: "Ballpoint pen".to_string(),
            quantity_in_stock: 120,
            unit_price: dec!(1.50),
            version: 1,
            created_at: now,
            updated_at: None,
        };

        let response = ItemResponse::from(model);
        assert_eq!(response.id, id);
        assert_eq!(response.quantity_in_stock, 120);
        assert_eq!(response.unit_price, dec!(1.50));
    }

    #[test]
    fn issue_request_rejects_non_positive_quantity() {
        let request = IssueItemRequest {
            item_id: Uuid::new_v4(),
            recipient_id: Uuid::new_v4(),
            quantity: 0,
        };
        assert!(request.validate().is_err());
    }
}
