mod common;

use assert_matches::assert_matches;
use campus_ledger::services::exams::{CreateSessionRequest, ExamService};
use campus_ledger::{RejectReason, ServiceError};
use uuid::Uuid;

use common::TestDb;

fn service(db: &TestDb) -> ExamService {
    ExamService::new(db.pool.clone(), db.retry(), None)
}

async fn seed_session(svc: &ExamService, capacity: i32) -> Uuid {
    svc.create_session(CreateSessionRequest {
        exam_name: "Linear Algebra Final".to_string(),
        scheduled_at: None,
        capacity,
    })
    .await
    .expect("create session")
    .id
}

#[tokio::test]
async fn register_and_cancel_round_trip() {
    let db = TestDb::new().await;
    let svc = service(&db);
    let session_id = seed_session(&svc, 2).await;
    let student = Uuid::new_v4();

    let registration = svc.register(session_id, student).await.expect("register");
    assert_eq!(registration.status, "registered");

    let session = svc
        .get_session(session_id)
        .await
        .expect("get")
        .expect("exists");
    assert_eq!(session.registered_count, 1);

    let cancelled = svc
        .cancel_registration(registration.id)
        .await
        .expect("cancel");
    assert_eq!(cancelled.status, "cancelled");

    let session = svc
        .get_session(session_id)
        .await
        .expect("get")
        .expect("exists");
    assert_eq!(session.registered_count, 0);

    let err = svc
        .cancel_registration(registration.id)
        .await
        .expect_err("re-cancel");
    assert_matches!(err, ServiceError::Rejected(RejectReason::IllegalTransition));
    let session = svc
        .get_session(session_id)
        .await
        .expect("get")
        .expect("exists");
    assert_eq!(session.registered_count, 0);
}

#[tokio::test]
async fn full_session_rejects_further_registrations() {
    let db = TestDb::new().await;
    let svc = service(&db);
    let session_id = seed_session(&svc, 1).await;

    svc.register(session_id, Uuid::new_v4())
        .await
        .expect("first seat");

    let err = svc
        .register(session_id, Uuid::new_v4())
        .await
        .expect_err("no seats left");
    assert_matches!(
        err,
        ServiceError::Rejected(RejectReason::InsufficientCapacity)
    );
}

#[tokio::test]
async fn duplicate_registration_rejects() {
    let db = TestDb::new().await;
    let svc = service(&db);
    let session_id = seed_session(&svc, 5).await;
    let student = Uuid::new_v4();

    svc.register(session_id, student).await.expect("register");

    let err = svc
        .register(session_id, student)
        .await
        .expect_err("duplicate seat");
    assert_matches!(
        err,
        ServiceError::Rejected(RejectReason::DuplicateAssignment)
    );

    let session = svc
        .get_session(session_id)
        .await
        .expect("get")
        .expect("exists");
    assert_eq!(session.registered_count, 1);
}

#[tokio::test]
async fn cancelled_seat_stays_on_the_student_record() {
    let db = TestDb::new().await;
    let svc = service(&db);
    let session_id = seed_session(&svc, 5).await;
    let student = Uuid::new_v4();

    let registration = svc.register(session_id, student).await.expect("register");
    svc.cancel_registration(registration.id)
        .await
        .expect("cancel");

    // Registration records are history; the same student cannot register a
    // second row for the same session.
    let err = svc
        .register(session_id, student)
        .await
        .expect_err("re-register");
    assert_matches!(
        err,
        ServiceError::Rejected(RejectReason::DuplicateAssignment)
    );
}

#[tokio::test]
async fn concurrent_registrations_respect_capacity() {
    let db = TestDb::new().await;
    let svc = service(&db);
    let session_id = seed_session(&svc, 3).await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let svc = svc.clone();
        tasks.push(tokio::spawn(
            async move { svc.register(session_id, Uuid::new_v4()).await },
        ));
    }

    let mut successes = 0;
    for task in tasks {
        match task.await.expect("task join") {
            Ok(_) => successes += 1,
            Err(ServiceError::Rejected(RejectReason::InsufficientCapacity)) => {}
            Err(other) => panic!("unexpected outcome: {other}"),
        }
    }

    assert_eq!(successes, 3);
    let session = svc
        .get_session(session_id)
        .await
        .expect("get")
        .expect("exists");
    assert_eq!(session.registered_count, 3);
}

#[tokio::test]
async fn registering_for_an_unknown_session_is_not_found() {
    let db = TestDb::new().await;
    let svc = service(&db);

    let err = svc
        .register(Uuid::new_v4(), Uuid::new_v4())
        .await
        .expect_err("missing session");
    assert_matches!(err, ServiceError::NotFound(_));
}
