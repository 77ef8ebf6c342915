use bulk_verify::{
    config::AppConfig,
    db::{self, ledger::PgCreditLedger, PgJobStore},
    models::{
        credit::job_charge_key,
        job::{BulkJob, JobStatus, JobUpdate, NewResult},
        stats::JobStats,
        verification::DeliveryState,
    },
    services::{
        ledger::CreditLedger,
        queue::{JobQueue, QueuedJob},
        store::JobStore,
    },
};
use chrono::Utc;
use uuid::Uuid;

/// Integration test: job store, credit ledger and queue against live services
///
/// This test verifies:
/// 1. Database connection and schema
/// 2. Job lifecycle writes and their status guards
/// 3. Result storage and paging
/// 4. Idempotent credit deduction
/// 5. Job queue (enqueue/dequeue/complete)
///
/// Note: This requires a running PostgreSQL and Redis instance
/// configured via environment variables.
#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_full_integration() {
    // Load config from environment
    let config = AppConfig::from_env().expect("Failed to load config");

    // Initialize database
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run migrations");

    let store = PgJobStore::new(db_pool.clone());
    let ledger = PgCreditLedger::new(db_pool.clone());
    let queue = JobQueue::new(&config.redis_url).expect("Failed to initialize queue");

    let org = format!("org_it_{}", Uuid::new_v4().simple());

    // 1. Job creation and scoped lookup
    let job = BulkJob::new_pending(&org, "user_it", None, 3);
    store.create_job(&job).await.expect("Failed to create job");

    let fetched = store
        .find_job(job.id, &org)
        .await
        .expect("Failed to get job")
        .expect("Job not found");
    assert_eq!(fetched.status, JobStatus::Pending);
    assert_eq!(fetched.total_count, 3);

    let foreign = store
        .find_job(job.id, "org_someone_else")
        .await
        .expect("Failed to get job");
    assert!(foreign.is_none());

    // 2. Claim is conditional on pending
    let claimed = store
        .update_job(job.id, &JobUpdate::start(Utc::now()))
        .await
        .expect("Failed to claim job");
    assert!(claimed);
    let reclaimed = store
        .update_job(job.id, &JobUpdate::start(Utc::now()))
        .await
        .expect("Failed to claim job");
    assert!(!reclaimed);

    // 3. Results and progress
    for (n, email) in ["a@x.com", "b@x.com", "c@x.com"].iter().enumerate() {
        store
            .insert_result(&NewResult {
                job_id: job.id,
                organization_id: org.clone(),
                user_id: "user_it".to_string(),
                email: email.to_string(),
                state: DeliveryState::Deliverable,
                score: 90 + n as i32,
                reason: "accepted_email".to_string(),
                result: serde_json::json!({ "email": email }),
                created_at: Utc::now(),
            })
            .await
            .expect("Failed to insert result");
    }
    store
        .update_job(job.id, &JobUpdate::progress(3))
        .await
        .expect("Failed to write progress");
    // Progress never moves backwards
    store
        .update_job(job.id, &JobUpdate::progress(1))
        .await
        .expect("Failed to write progress");

    let page = store
        .list_results(job.id, &org, 0, 2)
        .await
        .expect("Failed to list results");
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].email, "c@x.com");
    assert_eq!(
        store.count_results(job.id, &org).await.expect("Failed to count"),
        3
    );

    // 4. Billing is idempotent per job
    sqlx::query("INSERT INTO credit_accounts (organization_id, balance) VALUES ($1, $2)")
        .bind(&org)
        .bind(10_i64)
        .execute(&db_pool)
        .await
        .expect("Failed to seed credits");

    let key = job_charge_key(job.id);
    let first = ledger
        .deduct_credits(&org, 3, &key)
        .await
        .expect("Failed to deduct");
    let replay = ledger
        .deduct_credits(&org, 3, &key)
        .await
        .expect("Failed to deduct");
    assert!(first.success && replay.success);
    assert_eq!(
        ledger.check_credits(&org).await.expect("Failed to read balance").remaining,
        7
    );

    let overdraft = ledger
        .deduct_credits(&org, 100, &job_charge_key(Uuid::new_v4()))
        .await
        .expect("Failed to deduct");
    assert!(!overdraft.success);

    // 5. Completion writes stats with the terminal status
    let stats = JobStats {
        total: 3,
        processed: 3,
        deliverable: 3,
        ..Default::default()
    };
    let completed = store
        .update_job(job.id, &JobUpdate::complete(stats.clone(), Utc::now()))
        .await
        .expect("Failed to complete job");
    assert!(completed);

    let final_job = store
        .find_job(job.id, &org)
        .await
        .expect("Failed to get job")
        .expect("Job not found");
    assert_eq!(final_job.status, JobStatus::Completed);
    assert_eq!(final_job.processed_count, 3);
    assert_eq!(final_job.stats, Some(stats));

    // 6. Queue operations
    let queued_job = QueuedJob {
        job_id: job.id,
        organization_id: org.clone(),
        user_id: "user_it".to_string(),
        emails: vec!["a@x.com".to_string()],
        options: Default::default(),
        request: Default::default(),
        attempt: 0,
    };

    queue.enqueue(&queued_job).await.expect("Failed to enqueue");

    let dequeued = queue
        .dequeue()
        .await
        .expect("Failed to dequeue")
        .expect("No job in queue");
    assert_eq!(dequeued, queued_job);

    queue
        .complete(&dequeued)
        .await
        .expect("Failed to complete job in queue");

    // 7. A payload left on the processing list goes back with attempt raised
    queue.enqueue(&queued_job).await.expect("Failed to enqueue");
    queue.dequeue().await.expect("Failed to dequeue");
    let swept = queue.requeue_stranded().await.expect("Failed to sweep");
    assert!(swept >= 1);
    let redelivered = queue
        .dequeue()
        .await
        .expect("Failed to dequeue")
        .expect("No job in queue");
    assert_eq!(redelivered.job_id, job.id);
    assert_eq!(redelivered.attempt, 1);
    queue
        .complete(&redelivered)
        .await
        .expect("Failed to complete job in queue");

    println!("✅ All integration tests passed!");
}
