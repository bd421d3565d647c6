use chrono::{NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;

use tripgate_core::audit::{AuditContext, InMemoryAuditSink};
use tripgate_core::domain::approval::TripApproval;
use tripgate_core::domain::approver::{ApprovalDelegation, Approver, ApproverId, DelegationId};
use tripgate_core::domain::catalog::{
    SecurityLevel, TravelCategory, TravelMode, TravelType, TravelerKind,
};
use tripgate_core::domain::traveler::{
    Country, CountryId, Department, DepartmentId, Person, PersonId, Traveler, TravelerId,
};
use tripgate_core::domain::trip::{
    ExpenseId, ItineraryLegId, NewTrip, Trip, TripExpense, TripId, TripItinerary, TripPoet,
};
use tripgate_core::errors::{StoreError, WorkflowError};
use tripgate_core::notify::InMemoryNotifier;
use tripgate_core::workflow::{ApprovalStage, ApprovalWorkflow, WorkflowStore};
use tripgate_db::repositories::{DirectoryRepository, TripRepository};
use tripgate_db::{connect_with_settings, migrations, DbPool, SqlWorkflowStore};

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

fn person(id: &str, name: &str) -> Person {
    Person {
        id: PersonId(id.to_string()),
        display_name: name.to_string(),
        email: format!("{id}@example.org"),
    }
}

fn approver(id: &str, person: &str, level: SecurityLevel) -> Approver {
    Approver {
        id: ApproverId(id.to_string()),
        person: PersonId(person.to_string()),
        security_level: level,
        active: true,
    }
}

fn trip(id: &str, level: SecurityLevel) -> Trip {
    Trip::new(NewTrip {
        id: TripId(id.to_string()),
        name: "Kisumu field monitoring".to_string(),
        traveler: TravelerId("trv-amina".to_string()),
        start_date: date(2026, 11, 9),
        end_date: date(2026, 11, 13),
        category: TravelCategory::Business,
        travel_type: TravelType::Domestic,
        mode: TravelMode::Air,
        reason: "Quarterly programme monitoring".to_string(),
        is_mission_critical: true,
        security_level: level,
    })
    .expect("valid trip")
}

async fn setup() -> (DbPool, SqlWorkflowStore) {
    setup_at("sqlite::memory:", 1).await
}

async fn setup_at(database_url: &str, max_connections: u32) -> (DbPool, SqlWorkflowStore) {
    let pool = connect_with_settings(database_url, max_connections, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("run migrations");
    let store = SqlWorkflowStore::new(pool.clone());
    let directory = store.directory_repository();

    for (id, name) in [
        ("u-amina", "Amina Njeri"),
        ("u-lm", "Peter Otieno"),
        ("u-dh", "Grace Wanjiku"),
        ("u-sec", "Daniel Baraka"),
        ("u-cover", "Halima Said"),
    ] {
        directory.save_person(&person(id, name)).await.expect("save person");
    }
    for approver in [
        approver("apr-lm", "u-lm", SecurityLevel::Level1),
        approver("apr-dh", "u-dh", SecurityLevel::Level2),
        approver("apr-sec", "u-sec", SecurityLevel::Level3),
        approver("apr-cover", "u-cover", SecurityLevel::Level2),
    ] {
        directory.save_approver(&approver).await.expect("save approver");
    }
    directory
        .save_department(&Department {
            id: DepartmentId("dept-programs".to_string()),
            name: "Programmes".to_string(),
            level1_approver: Some(ApproverId("apr-lm".to_string())),
            level2_approver: Some(ApproverId("apr-dh".to_string())),
        })
        .await
        .expect("save department");
    directory
        .save_country(&Country {
            id: CountryId("KE".to_string()),
            name: "Kenya".to_string(),
            security_level: SecurityLevel::Level2,
            level3_approver: Some(ApproverId("apr-sec".to_string())),
        })
        .await
        .expect("save country");
    directory
        .save_traveler(&Traveler {
            id: TravelerId("trv-amina".to_string()),
            person: PersonId("u-amina".to_string()),
            first_name: "Amina".to_string(),
            last_name: "Njeri".to_string(),
            kind: TravelerKind::Employee,
            department: Some(DepartmentId("dept-programs".to_string())),
            country: Some(CountryId("KE".to_string())),
            approver: None,
            line_manager: None,
            dependant_of: None,
        })
        .await
        .expect("save traveler");

    (pool, store)
}

async fn save_trip_with_details(store: &SqlWorkflowStore, trip: &Trip) {
    let trips = store.trip_repository();
    trips.save(trip).await.expect("save trip");
    trips
        .save_itinerary(&TripItinerary {
            id: ItineraryLegId(format!("LEG-{}", trip.id.0)),
            trip: trip.id.clone(),
            departure_date: trip.start_date,
            departure_time: NaiveTime::from_hms_opt(7, 15, 0).expect("time"),
            departure_city: "Nairobi".to_string(),
            left_transit: false,
            leg_status: true,
            comment: None,
        })
        .await
        .expect("save itinerary");
    trips
        .save_poet(&TripPoet {
            trip: trip.id.clone(),
            project: "P-4410".to_string(),
            organisation: "ORG-KE".to_string(),
            expenditure_type: "Travel".to_string(),
            task: "2.1".to_string(),
        })
        .await
        .expect("save poet");
}

fn workflow(
    store: SqlWorkflowStore,
) -> ApprovalWorkflow<SqlWorkflowStore, InMemoryNotifier, InMemoryAuditSink> {
    ApprovalWorkflow::new(store, InMemoryNotifier::default(), InMemoryAuditSink::default())
}

#[tokio::test]
async fn second_valid_row_for_a_tier_hits_the_partial_unique_index() {
    let (_pool, store) = setup().await;
    let trip = trip("TRIP-1", SecurityLevel::Level2);
    save_trip_with_details(&store, &trip).await;

    let first = TripApproval::request(
        trip.id.clone(),
        SecurityLevel::Level1,
        ApproverId("apr-lm".to_string()),
    );
    store.insert_approval(&first).await.expect("first row");

    let duplicate = TripApproval::request(
        trip.id.clone(),
        SecurityLevel::Level1,
        ApproverId("apr-lm".to_string()),
    );
    let error = store.insert_approval(&duplicate).await.expect_err("duplicate tier");
    assert!(matches!(error, StoreError::UniqueViolation(_)), "got {error:?}");

    let mut invalidated = duplicate.clone();
    invalidated.is_valid = false;
    store.insert_approval(&invalidated).await.expect("invalid rows are not constrained");
}

#[tokio::test]
async fn repeated_request_maps_to_already_requested() {
    let (_pool, store) = setup().await;
    let trip = trip("TRIP-1", SecurityLevel::Level2);
    save_trip_with_details(&store, &trip).await;
    let workflow = workflow(store);
    let owner = PersonId("u-amina".to_string());
    let audit = AuditContext::new("req-1", "u-amina");

    workflow
        .request_approval(&owner, &trip.id, SecurityLevel::Level1, &audit)
        .await
        .expect("first request");
    let error = workflow
        .request_approval(&owner, &trip.id, SecurityLevel::Level1, &audit)
        .await
        .expect_err("second request");

    assert!(matches!(error, WorkflowError::AlreadyRequested { .. }), "got {error:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_requests_for_one_tier_leave_a_single_row() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("tripgate.db").display());
    let (_pool, store) = setup_at(&url, 4).await;
    let trip = trip("TRIP-1", SecurityLevel::Level2);
    save_trip_with_details(&store, &trip).await;
    let workflow = workflow(store);
    let owner = PersonId("u-amina".to_string());
    let first_audit = AuditContext::new("req-a", "u-amina");
    let second_audit = AuditContext::new("req-b", "u-amina");

    let (first, second) = tokio::join!(
        workflow.request_approval(&owner, &trip.id, SecurityLevel::Level1, &first_audit),
        workflow.request_approval(&owner, &trip.id, SecurityLevel::Level1, &second_audit),
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1, "{results:?}");
    let rejected = results
        .iter()
        .filter(|result| matches!(result, Err(WorkflowError::AlreadyRequested { .. })))
        .count();
    assert_eq!(rejected, 1, "{results:?}");

    let rows = workflow.store().approvals_for_trip(&trip.id).await.expect("rows");
    let valid_level1 = rows
        .iter()
        .filter(|row| row.is_valid && row.security_level == SecurityLevel::Level1)
        .count();
    assert_eq!(valid_level1, 1);
}

#[tokio::test]
async fn approving_every_tier_completes_the_trip_in_the_database() {
    let (_pool, store) = setup().await;
    let trip = trip("TRIP-1", SecurityLevel::Level2);
    save_trip_with_details(&store, &trip).await;
    let workflow = workflow(store);
    let audit = AuditContext::new("req-2", "cli");

    let owner = PersonId("u-amina".to_string());
    let level1 = workflow
        .request_approval(&owner, &trip.id, SecurityLevel::Level1, &audit)
        .await
        .expect("request level 1")
        .value;
    let decision = workflow
        .decide(&PersonId("u-lm".to_string()), &level1.id, true, None, &audit)
        .await
        .expect("approve level 1")
        .value;
    let level2 = decision.escalated.expect("level 2 opened");
    assert_eq!(level2.security_level, SecurityLevel::Level2);
    assert_eq!(level2.approver, ApproverId("apr-dh".to_string()));

    let decision = workflow
        .decide(&PersonId("u-dh".to_string()), &level2.id, true, Some("ok".to_string()), &audit)
        .await
        .expect("approve level 2")
        .value;
    assert!(decision.approval_complete);

    let stored = workflow.store().trip(&trip.id).await.expect("load").expect("trip");
    assert!(stored.approval_complete);
    let status = workflow.get_approval_status(&trip.id).await.expect("status");
    assert_eq!(status.stage, ApprovalStage::Approved);

    let history = workflow.approval_history(&trip.id).await.expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].approval_comment.as_deref(), Some("ok"));
}

#[tokio::test]
async fn invalidation_voids_rows_and_reopens_level_one() {
    let (pool, store) = setup().await;
    let trip = trip("TRIP-1", SecurityLevel::Level1);
    save_trip_with_details(&store, &trip).await;
    let workflow = workflow(store);
    let owner = PersonId("u-amina".to_string());
    let audit = AuditContext::new("req-3", "u-amina");

    let approval = workflow
        .request_approval(&owner, &trip.id, SecurityLevel::Level1, &audit)
        .await
        .expect("request")
        .value;
    workflow
        .decide(&PersonId("u-lm".to_string()), &approval.id, true, None, &audit)
        .await
        .expect("approve");

    let invalidated =
        workflow.invalidate_trip_approval(&trip.id, &audit).await.expect("invalidate");
    assert_eq!(invalidated, 1);

    let complete: bool = sqlx::query_scalar("SELECT approval_complete FROM trip WHERE id = ?")
        .bind(&trip.id.0)
        .fetch_one(&pool)
        .await
        .expect("query trip");
    assert!(!complete);
    let valid_rows: i64 =
        sqlx::query_scalar("SELECT COUNT(1) FROM trip_approval WHERE trip_id = ? AND is_valid = 1")
            .bind(&trip.id.0)
            .fetch_one(&pool)
            .await
            .expect("count rows");
    assert_eq!(valid_rows, 0);

    let status = workflow.get_approval_status(&trip.id).await.expect("status");
    assert_eq!(status.stage, ApprovalStage::NotRequested);
    workflow
        .request_approval(&owner, &trip.id, SecurityLevel::Level1, &audit)
        .await
        .expect("request again after invalidation");
}

#[tokio::test]
async fn store_reports_missing_rows_as_not_found() {
    let (_pool, store) = setup().await;
    let trip = trip("TRIP-1", SecurityLevel::Level1);
    save_trip_with_details(&store, &trip).await;

    let error =
        store.invalidate_approvals(&TripId("TRIP-404".to_string())).await.expect_err("missing");
    assert!(matches!(error, StoreError::NotFound(_)));

    let mut approval = TripApproval::request(
        trip.id.clone(),
        SecurityLevel::Level1,
        ApproverId("apr-lm".to_string()),
    );
    store.insert_approval(&approval).await.expect("insert");
    approval.record_decision(false, Some("no budget".to_string()));
    store.record_decision(&approval).await.expect("first decision");

    let error = store.record_decision(&approval).await.expect_err("already decided");
    assert!(matches!(error, StoreError::NotFound(_)));
    let stored = store.approval(&approval.id).await.expect("load").expect("row");
    assert!(stored.is_declined());
    assert_eq!(stored.approval_comment.as_deref(), Some("no budget"));
}

#[tokio::test]
async fn trip_children_cascade_but_referenced_approvers_are_restricted() {
    let (pool, store) = setup().await;
    let trip = trip("TRIP-1", SecurityLevel::Level1);
    save_trip_with_details(&store, &trip).await;
    store
        .insert_approval(&TripApproval::request(
            trip.id.clone(),
            SecurityLevel::Level1,
            ApproverId("apr-lm".to_string()),
        ))
        .await
        .expect("insert approval");

    let restricted = sqlx::query("DELETE FROM approver WHERE id = 'apr-lm'").execute(&pool).await;
    assert!(restricted.is_err(), "approver referenced by department and approval rows");

    assert!(store.trip_repository().delete(&trip.id).await.expect("delete trip"));
    for table in ["trip_itinerary", "trip_poet", "trip_approval"] {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(1) FROM {table}"))
            .fetch_one(&pool)
            .await
            .expect("count rows");
        assert_eq!(count, 0, "{table} should cascade");
    }
}

#[tokio::test]
async fn trip_details_round_trip_through_sqlite() {
    let (_pool, store) = setup().await;
    let trip = trip("TRIP-1", SecurityLevel::Level2);
    save_trip_with_details(&store, &trip).await;
    store
        .trip_repository()
        .save_expense(&TripExpense {
            id: ExpenseId("EXP-1".to_string()),
            trip: trip.id.clone(),
            expense_type: "Per diem".to_string(),
            currency: "KES".to_string(),
            amount: Decimal::new(1_800_050, 2),
        })
        .await
        .expect("save expense");

    let loaded = store.trip(&trip.id).await.expect("load").expect("trip");
    assert_eq!(loaded, trip);

    let details = store.trip_details(&trip.id).await.expect("details");
    assert!(details.missing_for_approval().is_empty());
    assert_eq!(details.itinerary[0].departure_city, "Nairobi");
    assert_eq!(details.expenses[0].amount, Decimal::new(1_800_050, 2));

    let listed = store
        .trip_repository()
        .list_for_traveler(&TravelerId("trv-amina".to_string()))
        .await
        .expect("list trips");
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn negative_expense_is_rejected_before_insert() {
    let (_pool, store) = setup().await;
    let trip = trip("TRIP-1", SecurityLevel::Level1);
    save_trip_with_details(&store, &trip).await;

    let result = store
        .trip_repository()
        .save_expense(&TripExpense {
            id: ExpenseId("EXP-1".to_string()),
            trip: trip.id.clone(),
            expense_type: "Refund".to_string(),
            currency: "USD".to_string(),
            amount: Decimal::new(-100, 0),
        })
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn delegations_persist_and_feed_resolution() {
    let (_pool, store) = setup().await;
    let today = Utc::now().date_naive();
    let delegation = ApprovalDelegation {
        id: DelegationId("DLG-1".to_string()),
        delegator: ApproverId("apr-dh".to_string()),
        delegate: ApproverId("apr-cover".to_string()),
        start_date: today,
        end_date: today + chrono::Duration::days(7),
        active: true,
        reason: "Annual leave".to_string(),
        revocation_reason: None,
        created_at: Utc::now(),
    };
    store.insert_delegation(&delegation).await.expect("insert delegation");
    let error = store.insert_delegation(&delegation).await.expect_err("duplicate id");
    assert!(matches!(error, StoreError::UniqueViolation(_)));

    let workflow = workflow(store.clone());
    let resolved = workflow
        .resolve_approver(&TravelerId("trv-amina".to_string()), SecurityLevel::Level2)
        .await
        .expect("resolve")
        .expect("approver");
    assert_eq!(resolved.id, ApproverId("apr-cover".to_string()));

    let mut revoked = delegation.clone();
    revoked.active = false;
    revoked.revocation_reason = Some("Back early".to_string());
    store.update_delegation(&revoked).await.expect("update delegation");

    let directory = store.directory().await.expect("directory");
    let stored = directory.delegation(&delegation.id).expect("delegation");
    assert!(!stored.active);
    assert_eq!(stored.revocation_reason.as_deref(), Some("Back early"));
    assert_eq!(stored.created_at, delegation.created_at);

    let missing = ApprovalDelegation { id: DelegationId("DLG-404".to_string()), ..revoked };
    let error = store.update_delegation(&missing).await.expect_err("unknown delegation");
    assert!(matches!(error, StoreError::NotFound(_)));
}

#[tokio::test]
async fn registering_an_account_creates_a_default_traveler() {
    let (_pool, store) = setup().await;
    let traveler = store
        .directory_repository()
        .register_account(&person("u-new", "Wanjiru Kamau"))
        .await
        .expect("register account");

    let directory = store.directory().await.expect("directory");
    let loaded = directory.traveler(&traveler.id).expect("traveler row");
    assert_eq!(loaded.person, PersonId("u-new".to_string()));
    assert_eq!(loaded.kind, TravelerKind::Employee);
    assert_eq!(loaded.full_name(), "Wanjiru Kamau");
    assert!(loaded.department.is_none());

    let duplicate =
        store.directory_repository().register_account(&person("u-new", "Wanjiru Kamau")).await;
    assert!(duplicate.is_err());
}
