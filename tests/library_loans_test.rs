mod common;

use assert_matches::assert_matches;
use campus_ledger::events::{event_channel, process_events};
use campus_ledger::services::library::{AddBookRequest, CheckoutRequest, LibraryService};
use campus_ledger::{RejectReason, ServiceError};
use std::sync::Arc;
use uuid::Uuid;

use common::TestDb;

async fn service(db: &TestDb) -> LibraryService {
    LibraryService::new(db.pool.clone(), db.retry(), None)
}

async fn seed_book(svc: &LibraryService, copies: i32) -> Uuid {
    svc.add_book(AddBookRequest {
        title: "Structure and Interpretation of Computer Programs".to_string(),
        author: Some("Abelson".to_string()),
        isbn: None,
        copies,
    })
    .await
    .expect("add book")
    .id
}

#[tokio::test]
async fn checkout_and_return_round_trip() {
    let db = TestDb::new().await;
    let svc = service(&db).await;
    let book_id = seed_book(&svc, 2).await;
    let borrower = Uuid::new_v4();

    let loan = svc
        .checkout_book(CheckoutRequest {
            book_id,
            borrower_id: borrower,
            due_date: None,
        })
        .await
        .expect("checkout");
    assert_eq!(loan.book_id, book_id);
    assert_eq!(loan.status, "active");

    let book = svc.get_book(book_id).await.expect("get").expect("exists");
    assert_eq!(book.available_copies, 1);
    assert_eq!(book.total_copies, 2);

    let returned = svc.return_book(loan.id).await.expect("return");
    assert_eq!(returned.status, "returned");
    assert!(returned.returned_at.is_some());

    let book = svc.get_book(book_id).await.expect("get").expect("exists");
    assert_eq!(book.available_copies, 2);
}

#[tokio::test]
async fn returning_twice_rejects_and_leaves_counter_alone() {
    let db = TestDb::new().await;
    let svc = service(&db).await;
    let book_id = seed_book(&svc, 1).await;

    let loan = svc
        .checkout_book(CheckoutRequest {
            book_id,
            borrower_id: Uuid::new_v4(),
            due_date: None,
        })
        .await
        .expect("checkout");

    svc.return_book(loan.id).await.expect("first return");

    let err = svc.return_book(loan.id).await.expect_err("second return");
    assert_matches!(err, ServiceError::Rejected(RejectReason::IllegalTransition));

    let book = svc.get_book(book_id).await.expect("get").expect("exists");
    assert_eq!(book.available_copies, 1);
}

#[tokio::test]
async fn checkout_with_no_copies_rejects() {
    let db = TestDb::new().await;
    let svc = service(&db).await;
    let book_id = seed_book(&svc, 1).await;

    svc.checkout_book(CheckoutRequest {
        book_id,
        borrower_id: Uuid::new_v4(),
        due_date: None,
    })
    .await
    .expect("first checkout");

    let err = svc
        .checkout_book(CheckoutRequest {
            book_id,
            borrower_id: Uuid::new_v4(),
            due_date: None,
        })
        .await
        .expect_err("exhausted checkout");
    assert_matches!(
        err,
        ServiceError::Rejected(RejectReason::InsufficientCapacity)
    );

    let book = svc.get_book(book_id).await.expect("get").expect("exists");
    assert_eq!(book.available_copies, 0);
}

#[tokio::test]
async fn checkout_unknown_book_is_not_found() {
    let db = TestDb::new().await;
    let svc = service(&db).await;

    let err = svc
        .checkout_book(CheckoutRequest {
            book_id: Uuid::new_v4(),
            borrower_id: Uuid::new_v4(),
            due_date: None,
        })
        .await
        .expect_err("missing book");
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn concurrent_checkouts_never_oversubscribe() {
    let db = TestDb::new().await;
    let svc = service(&db).await;
    let book_id = seed_book(&svc, 5).await;

    let mut tasks = Vec::new();
    for _ in 0..12 {
        let svc = svc.clone();
        tasks.push(tokio::spawn(async move {
            svc.checkout_book(CheckoutRequest {
                book_id,
                borrower_id: Uuid::new_v4(),
                due_date: None,
            })
            .await
        }));
    }

    let mut successes = 0;
    let mut rejections = 0;
    for task in tasks {
        match task.await.expect("task join") {
            Ok(_) => successes += 1,
            Err(ServiceError::Rejected(RejectReason::InsufficientCapacity)) => rejections += 1,
            Err(other) => panic!("unexpected outcome: {other}"),
        }
    }

    assert_eq!(successes, 5);
    assert_eq!(rejections, 7);

    let book = svc.get_book(book_id).await.expect("get").expect("exists");
    assert_eq!(book.available_copies, 0);
}

#[tokio::test]
async fn remove_book_blocked_while_loans_reference_it() {
    let db = TestDb::new().await;
    let svc = service(&db).await;
    let book_id = seed_book(&svc, 1).await;

    let loan = svc
        .checkout_book(CheckoutRequest {
            book_id,
            borrower_id: Uuid::new_v4(),
            due_date: None,
        })
        .await
        .expect("checkout");

    let err = svc.remove_book(book_id).await.expect_err("blocked remove");
    assert_matches!(err, ServiceError::Conflict(_));

    // Returned loans are history, not clearance; removal stays blocked.
    svc.return_book(loan.id).await.expect("return");
    let err = svc.remove_book(book_id).await.expect_err("still blocked");
    assert_matches!(err, ServiceError::Conflict(_));

    let untouched = seed_book(&svc, 1).await;
    svc.remove_book(untouched).await.expect("remove clean book");
    assert!(svc.get_book(untouched).await.expect("get").is_none());
}

#[tokio::test]
async fn checkout_emits_event_after_commit() {
    let db = TestDb::new().await;
    let (sender, receiver) = event_channel(16);
    tokio::spawn(process_events(receiver));

    let svc = LibraryService::new(db.pool.clone(), db.retry(), Some(Arc::new(sender)));
    let book_id = seed_book(&svc, 1).await;

    // The event channel is best-effort; the operation must succeed whether
    // or not a consumer keeps up.
    let loan = svc
        .checkout_book(CheckoutRequest {
            book_id,
            borrower_id: Uuid::new_v4(),
            due_date: None,
        })
        .await
        .expect("checkout with events wired");
    assert_eq!(loan.status, "active");
}
