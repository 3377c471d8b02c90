mod common;

use common::*;
use opensase_orders::domain::events::OrderEvent;
use opensase_orders::infrastructure::{OrderFilter, OrderRepository, StoreError};
use opensase_orders::{
    DomainError, EcommerceError, HistoryAction, InventoryError, OrderStatus, PaymentMethod, PaymentStatus, RefundType,
    StockHold,
};

#[tokio::test]
async fn test_create_reserves_stock_and_records_history() {
    let h = stocked().await;
    let details = h.service.create_order(new_order(PaymentMethod::Cod), &admin()).await.unwrap();

    assert_eq!(details.order.status(), OrderStatus::Pending);
    assert_eq!(details.order.grand_total().amount(), vnd(400_000));
    assert_eq!(details.items.len(), 2);
    assert_eq!(counts(&h, tee()).await, (10, 2));
    assert_eq!(counts(&h, cap()).await, (5, 1));

    let history = h.service.history(details.order.id()).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, HistoryAction::Created);
    assert_eq!(history[0].actor_name, "Lan");
    assert!(matches!(h.events.events().await.as_slice(), [OrderEvent::Created { .. }]));
}

#[tokio::test]
async fn test_prepaid_orders_start_awaiting_payment() {
    let h = stocked().await;
    let details = h.service.create_order(new_order(PaymentMethod::BankTransfer), &admin()).await.unwrap();
    assert_eq!(details.order.status(), OrderStatus::AwaitingPayment);
}

#[tokio::test]
async fn test_insufficient_stock_rejects_order_without_side_effects() {
    let h = harness();
    h.service.set_stock(tee(), 10).await.unwrap();
    h.service.set_stock(cap(), 0).await.unwrap();

    let err = h.service.create_order(new_order(PaymentMethod::Cod), &admin()).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Inventory(InventoryError::Insufficient { .. })));
    assert_eq!(counts(&h, tee()).await, (10, 0));
    let page = h.service.list_orders(OrderFilter::default()).await.unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn test_confirm_deducts_and_cancel_restocks() {
    let h = stocked().await;
    let id = h.service.create_order(new_order(PaymentMethod::Cod), &admin()).await.unwrap().order.id();

    let order = h.service.update_status(id, OrderStatus::Confirmed, None, &admin()).await.unwrap();
    assert_eq!(order.stock_hold(), StockHold::Deducted);
    assert_eq!(counts(&h, tee()).await, (8, 0));
    assert_eq!(counts(&h, cap()).await, (4, 0));

    let order = h.service.cancel_order(id, "customer changed mind".into(), &admin()).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Cancelled);
    assert_eq!(order.cancelled_reason(), Some("customer changed mind"));
    assert!(order.is_stock_restored());
    assert_eq!(counts(&h, tee()).await, (10, 0));
    assert_eq!(counts(&h, cap()).await, (5, 0));
}

#[tokio::test]
async fn test_cancel_pending_releases_reservation_once() {
    let h = stocked().await;
    let id = h.service.create_order(new_order(PaymentMethod::Cod), &admin()).await.unwrap().order.id();

    h.service.cancel_order(id, "duplicate".into(), &admin()).await.unwrap();
    assert_eq!(counts(&h, tee()).await, (10, 0));

    let err = h.service.cancel_order(id, "again".into(), &admin()).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Domain(DomainError::InvalidTransition { .. })));
    assert_eq!(h.store.claim_stock_restoration(id).await.unwrap(), None);
    assert_eq!(counts(&h, tee()).await, (10, 0));
    assert_eq!(h.service.history(id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_failed_cancel_does_not_touch_stock_twice() {
    let h = stocked().await;
    let id = h.service.create_order(new_order(PaymentMethod::Cod), &admin()).await.unwrap().order.id();

    h.service.update_status(id, OrderStatus::Failed, Some("gateway timeout".into()), &admin()).await.unwrap();
    assert_eq!(counts(&h, tee()).await, (10, 2));

    h.service.cancel_order(id, "gave up".into(), &admin()).await.unwrap();
    assert_eq!(counts(&h, tee()).await, (10, 0));
}

#[tokio::test]
async fn test_back_to_pending_reserves_again() {
    let h = stocked().await;
    let id = h.service.create_order(new_order(PaymentMethod::Cod), &admin()).await.unwrap().order.id();
    h.service.update_status(id, OrderStatus::Confirmed, None, &admin()).await.unwrap();
    h.service.update_status(id, OrderStatus::Failed, None, &admin()).await.unwrap();
    assert_eq!(counts(&h, tee()).await, (8, 0));

    let order = h.service.update_status(id, OrderStatus::Pending, Some("retry".into()), &admin()).await.unwrap();
    assert_eq!(order.stock_hold(), StockHold::Reserved);
    assert_eq!(counts(&h, tee()).await, (10, 2));

    h.service.update_status(id, OrderStatus::Confirmed, None, &admin()).await.unwrap();
    assert_eq!(counts(&h, tee()).await, (8, 0));
}

#[tokio::test]
async fn test_invalid_transition_changes_nothing() {
    let h = stocked().await;
    let created = h.service.create_order(new_order(PaymentMethod::Cod), &admin()).await.unwrap().order;

    let err = h.service.update_status(created.id(), OrderStatus::Shipping, None, &admin()).await.unwrap_err();
    assert!(matches!(
        err,
        EcommerceError::Domain(DomainError::InvalidTransition { from: OrderStatus::Pending, to: OrderStatus::Shipping })
    ));

    let order = h.service.get_order(created.id()).await.unwrap().order;
    assert_eq!(order.status(), OrderStatus::Pending);
    assert_eq!(order.version(), created.version());
    assert_eq!(h.service.history(created.id()).await.unwrap().len(), 1);
    assert_eq!(counts(&h, tee()).await, (10, 2));
}

#[tokio::test]
async fn test_refunded_is_not_reachable_through_status_update() {
    let h = stocked().await;
    let id = h.service.create_order(new_order(PaymentMethod::Cod), &admin()).await.unwrap().order.id();
    h.service.update_status(id, OrderStatus::Confirmed, None, &admin()).await.unwrap();

    let err = h.service.update_status(id, OrderStatus::Refunded, None, &admin()).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Domain(DomainError::RefundViaStatusUpdate)));
}

#[tokio::test]
async fn test_paying_pending_order_confirms_it() {
    let h = stocked().await;
    let id = h.service.create_order(new_order(PaymentMethod::Cod), &admin()).await.unwrap().order.id();

    let order = h.service.update_payment_status(id, PaymentStatus::Paid, &admin()).await.unwrap();
    assert_eq!(order.payment_status(), PaymentStatus::Paid);
    assert_eq!(order.status(), OrderStatus::Confirmed);
    assert!(order.paid_at().is_some());
    assert_eq!(counts(&h, tee()).await, (8, 0));

    let actions: Vec<_> = h.service.history(id).await.unwrap().into_iter().map(|e| e.action).collect();
    assert_eq!(actions, [HistoryAction::Created, HistoryAction::PaymentStatusChanged, HistoryAction::StatusChanged]);

    let events = h.events.events().await;
    assert!(matches!(
        events.as_slice(),
        [OrderEvent::Created { .. }, OrderEvent::PaymentStatusChanged { .. }, OrderEvent::StatusChanged { .. }]
    ));
}

#[tokio::test]
async fn test_payment_rejected_for_cancelled_order() {
    let h = stocked().await;
    let id = h.service.create_order(new_order(PaymentMethod::Cod), &admin()).await.unwrap().order.id();
    h.service.cancel_order(id, "out of stock".into(), &admin()).await.unwrap();

    let err = h.service.update_payment_status(id, PaymentStatus::Paid, &admin()).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Domain(DomainError::PaymentRejected { .. })));
    assert_eq!(h.service.get_order(id).await.unwrap().order.payment_status(), PaymentStatus::Pending);
}

#[tokio::test]
async fn test_refund_requires_paid_order() {
    let h = stocked().await;
    let id = h.service.create_order(new_order(PaymentMethod::Cod), &admin()).await.unwrap().order.id();

    let err = h.service.process_refund(id, vnd(50_000), "damaged".into(), &admin()).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Domain(DomainError::RefundNotAllowed(PaymentStatus::Pending))));
    assert!(h.service.refunds(id).await.unwrap().is_empty());
    assert_eq!(h.service.history(id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_full_refund_moves_to_refunded_and_restocks() {
    let h = stocked().await;
    let id = h.service.create_order(new_order(PaymentMethod::Cod), &admin()).await.unwrap().order.id();
    h.service.update_payment_status(id, PaymentStatus::Paid, &admin()).await.unwrap();
    h.service.update_status(id, OrderStatus::Processing, None, &admin()).await.unwrap();

    let result = h.service.process_refund(id, vnd(400_000), "lost parcel".into(), &admin()).await.unwrap();
    assert_eq!(result.refund.kind, RefundType::Full);
    assert_eq!(result.order.status(), OrderStatus::Refunded);
    assert_eq!(result.order.payment_status(), PaymentStatus::Refunded);
    assert!(result.order.is_stock_restored());
    assert_eq!(counts(&h, tee()).await, (10, 0));

    let actions: Vec<_> = h.service.history(id).await.unwrap().into_iter().map(|e| e.action).collect();
    assert_eq!(
        actions[actions.len() - 3..],
        [HistoryAction::RefundProcessed, HistoryAction::PaymentStatusChanged, HistoryAction::StatusChanged]
    );

    let err = h.service.process_refund(id, vnd(1), "again".into(), &admin()).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Domain(DomainError::RefundNotAllowed(PaymentStatus::Refunded))));
    assert_eq!(counts(&h, tee()).await, (10, 0));
}

#[tokio::test]
async fn test_partial_refunds_accumulate_without_status_change() {
    let h = stocked().await;
    let id = h.service.create_order(new_order(PaymentMethod::Cod), &admin()).await.unwrap().order.id();
    h.service.update_payment_status(id, PaymentStatus::Paid, &admin()).await.unwrap();

    let first = h.service.process_refund(id, vnd(100_000), "one cap missing".into(), &admin()).await.unwrap();
    assert_eq!(first.refund.kind, RefundType::Partial);
    assert_eq!(first.order.status(), OrderStatus::Confirmed);
    assert_eq!(first.order.refunded_total().amount(), vnd(100_000));

    let err = h.service.process_refund(id, vnd(300_001), "too much".into(), &admin()).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Domain(DomainError::RefundExceedsRemaining { .. })));

    let last = h.service.process_refund(id, vnd(300_000), "rest".into(), &admin()).await.unwrap();
    assert_eq!(last.refund.kind, RefundType::Partial);
    assert_eq!(last.order.status(), OrderStatus::Confirmed);
    assert_eq!(last.order.payment_status(), PaymentStatus::Refunded);
    assert!(!last.order.is_stock_restored());
    assert_eq!(counts(&h, tee()).await, (8, 0));
    assert_eq!(h.service.refunds(id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_full_refund_from_failed_order_is_rejected_whole() {
    let h = stocked().await;
    let id = h.service.create_order(new_order(PaymentMethod::Cod), &admin()).await.unwrap().order.id();
    h.service.update_payment_status(id, PaymentStatus::Paid, &admin()).await.unwrap();
    h.service.update_status(id, OrderStatus::Failed, None, &admin()).await.unwrap();

    let err = h.service.process_refund(id, vnd(400_000), "refund".into(), &admin()).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Domain(DomainError::InvalidTransition { .. })));
    assert!(h.service.refunds(id).await.unwrap().is_empty());
    let order = h.service.get_order(id).await.unwrap().order;
    assert_eq!(order.refunded_total().amount(), vnd(0));
    assert_eq!(order.status(), OrderStatus::Failed);
}

#[tokio::test]
async fn test_cancelled_paid_order_refunds_without_restocking_twice() {
    let h = stocked().await;
    let id = h.service.create_order(new_order(PaymentMethod::Online), &admin()).await.unwrap().order.id();
    h.service.update_payment_status(id, PaymentStatus::Paid, &admin()).await.unwrap();
    h.service.cancel_order(id, "address undeliverable".into(), &admin()).await.unwrap();
    assert_eq!(counts(&h, tee()).await, (10, 0));

    let options = h.service.allowed_transitions(id).await.unwrap();
    assert!(options.next.is_empty());
    assert!(options.can_refund);

    let result = h.service.process_refund(id, vnd(400_000), "cancelled after payment".into(), &admin()).await.unwrap();
    assert_eq!(result.refund.kind, RefundType::Full);
    assert_eq!(result.order.status(), OrderStatus::Refunded);
    assert_eq!(result.order.payment_status(), PaymentStatus::Refunded);
    assert_eq!(counts(&h, tee()).await, (10, 0));
    assert_eq!(counts(&h, cap()).await, (5, 0));

    let err = h.service.update_status(id, OrderStatus::Pending, None, &admin()).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Domain(DomainError::InvalidTransition { .. })));
}

#[tokio::test]
async fn test_stale_version_is_a_conflict() {
    let h = stocked().await;
    let id = h.service.create_order(new_order(PaymentMethod::Cod), &admin()).await.unwrap().order.id();
    let mut stale = h.service.get_order(id).await.unwrap().order;

    h.service.update_status(id, OrderStatus::Confirmed, None, &admin()).await.unwrap();
    let err = h.store.commit(&mut stale, &[], None).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));
}

#[tokio::test]
async fn test_admin_notes_are_audited() {
    let h = stocked().await;
    let id = h.service.create_order(new_order(PaymentMethod::Cod), &admin()).await.unwrap().order.id();

    let order = h.service.set_admin_notes(id, Some("call before delivery".into()), &admin()).await.unwrap();
    assert_eq!(order.admin_notes(), Some("call before delivery"));
    h.service.set_admin_notes(id, Some("call before delivery".into()), &admin()).await.unwrap();

    let history = h.service.history(id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].action, HistoryAction::NoteUpdated);
    assert_eq!(history[1].new_value.as_deref(), Some("call before delivery"));
}

#[tokio::test]
async fn test_transition_options() {
    let h = stocked().await;
    let id = h.service.create_order(new_order(PaymentMethod::Cod), &admin()).await.unwrap().order.id();

    let options = h.service.allowed_transitions(id).await.unwrap();
    assert_eq!(options.current, OrderStatus::Pending);
    assert!(options.next.contains(&OrderStatus::Confirmed));
    assert!(!options.next.contains(&OrderStatus::Refunded));
    assert!(options.can_cancel);
    assert!(!options.can_refund);
}

#[tokio::test]
async fn test_unknown_order() {
    let h = harness();
    let id = uuid::Uuid::from_u128(99);
    assert!(matches!(h.service.get_order(id).await, Err(EcommerceError::OrderNotFound(_))));
    assert!(matches!(h.service.history(id).await, Err(EcommerceError::OrderNotFound(_))));
}

#[tokio::test]
async fn test_list_filters_by_status() {
    let h = stocked().await;
    let a = h.service.create_order(new_order(PaymentMethod::Cod), &admin()).await.unwrap().order.id();
    h.service.create_order(new_order(PaymentMethod::Online), &admin()).await.unwrap();
    h.service.cancel_order(a, "test".into(), &admin()).await.unwrap();

    let filter = OrderFilter { status: Some(OrderStatus::Cancelled), page: 1, per_page: 20, ..Default::default() };
    let page = h.service.list_orders(filter).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.data[0].id(), a);
}
