//! End-to-end lifecycle scenarios: create → review → execute → rollback.

use std::path::Path;
use std::sync::Arc;

use vouch_core::{CommandSpec, Justification, Request, RequestStatus, ReviewDecision, RiskTier, Session};
use vouch_engine::creator::{CreateRequestOptions, CreatorConfig, RequestCreator};
use vouch_engine::executor::{compute_command_hash, ExecuteOptions, Executor};
use vouch_engine::ratelimit::{RateLimitAction, RateLimitConfig, RateLimiter};
use vouch_engine::review::{ReviewConfig, ReviewOptions, ReviewService};
use vouch_engine::{rollback, EngineError};
use vouch_storage::Store;

struct Broker {
    store: Arc<Store>,
    creator: RequestCreator,
    reviews: ReviewService,
    executor: Executor,
    requestor: Session,
    reviewer: Session,
}

fn broker(project: &Path, limits: RateLimitConfig) -> Broker {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let requestor = Session::new(project.to_string_lossy(), "agent-a", "prog", "model");
    let reviewer = Session::new(project.to_string_lossy(), "agent-b", "prog", "model");
    store.create_session(&requestor).unwrap();
    store.create_session(&reviewer).unwrap();

    let limiter = RateLimiter::new(Arc::clone(&store), limits);
    let creator = RequestCreator::new(
        Arc::clone(&store),
        limiter,
        None,
        CreatorConfig::default(),
    );
    let reviews = ReviewService::new(Arc::clone(&store), ReviewConfig::default());
    let executor = Executor::new(Arc::clone(&store), None);

    Broker {
        store,
        creator,
        reviews,
        executor,
        requestor,
        reviewer,
    }
}

fn run_opts(broker: &Broker, project: &Path, cwd: &Path, command: &str, reason: &str) -> CreateRequestOptions {
    CreateRequestOptions {
        session_id: broker.requestor.id.clone(),
        command: command.to_string(),
        cwd: cwd.to_string_lossy().to_string(),
        shell: true,
        argv: None,
        justification: Justification {
            reason: reason.to_string(),
            ..Justification::default()
        },
        attachments: Vec::new(),
        project_path: project.to_string_lossy().to_string(),
    }
}

fn approve(broker: &Broker, request_id: &str) -> ReviewOptions {
    ReviewOptions {
        session_id: broker.reviewer.id.clone(),
        session_key: broker.reviewer.hmac_key.clone(),
        request_id: request_id.to_string(),
        decision: ReviewDecision::Approve,
        comments: String::new(),
    }
}

/// Scenario: safe commands bypass review entirely.
#[tokio::test]
async fn safe_command_bypasses_review() {
    let project = tempfile::tempdir().unwrap();
    let broker = broker(project.path(), RateLimitConfig::default());

    let result = broker
        .creator
        .create(run_opts(&broker, project.path(), project.path(), "echo hi", ""))
        .await
        .unwrap();
    assert!(result.skipped);
    assert!(result.request.is_none());
    assert!(broker.store.list_pending(&project.path().to_string_lossy()).unwrap().is_empty());

    // The caller executes the safe command itself through the primitive.
    let mut spec = CommandSpec::shell("echo hi", project.path().to_string_lossy());
    spec.hash = compute_command_hash(&spec);
    let cancel = tokio_util::sync::CancellationToken::new();
    let out = vouch_engine::executor::run_command(
        &spec,
        &project.path().join("safe.log"),
        None,
        &cancel,
        std::time::Duration::from_secs(5),
    )
    .await
    .unwrap();
    assert_eq!(out.exit_code, 0);
    assert!(out.output.contains("hi"));
}

/// Scenario: quorum approval, execution, and rollback round trip.
#[tokio::test]
async fn quorum_approval_then_execute_with_rollback() {
    let project = tempfile::tempdir().unwrap();
    let work = project.path().join("work");
    let build = work.join("build");
    std::fs::create_dir_all(&build).unwrap();
    std::fs::write(build.join("a.txt"), "precious").unwrap();

    let broker = broker(project.path(), RateLimitConfig::default());

    // Create: dangerous tier, quorum of one.
    let request = broker
        .creator
        .create(run_opts(&broker, project.path(), &work, "rm -rf ./build", "cleanup"))
        .await
        .unwrap()
        .request
        .unwrap();
    assert_eq!(request.risk_tier, RiskTier::Dangerous);
    assert_eq!(request.min_approvals, 1);

    // Approve.
    let outcome = broker.reviews.submit(approve(&broker, &request.id)).await.unwrap();
    assert_eq!(outcome.new_request_status, Some(RequestStatus::Approved));

    // Execute with rollback capture; the command really deletes the tree.
    let mut opts = ExecuteOptions::new(&request.id, project.path().join("logs"));
    opts.capture_rollback = true;
    opts.max_rollback_size_mb = 10;
    let result = broker.executor.execute_approved(opts).await.unwrap();
    assert_eq!(result.status, RequestStatus::Executed);
    assert_eq!(result.execution.exit_code, 0);
    assert!(!build.exists(), "command should have deleted build/");

    // The capture brings the tree back.
    let settled = broker.store.get_request(&request.id).unwrap().unwrap();
    let rollback_path = settled.rollback_path.expect("rollback captured");
    let data = rollback::load(Path::new(&rollback_path)).unwrap();
    rollback::restore(&data, &rollback::RestoreOptions::default())
        .await
        .unwrap();
    assert_eq!(
        std::fs::read_to_string(build.join("a.txt")).unwrap(),
        "precious"
    );
}

/// Scenario: one reject settles the request regardless of approvals.
#[tokio::test]
async fn reject_settles_immediately() {
    let project = tempfile::tempdir().unwrap();
    let broker = broker(project.path(), RateLimitConfig::default());

    let request = broker
        .creator
        .create(run_opts(&broker, project.path(), project.path(), "rm -rf ./build", "cleanup"))
        .await
        .unwrap()
        .request
        .unwrap();

    // The requestor blocks on the decision while the reviewer rejects.
    let wait = broker
        .creator
        .wait_for_decision(&request.id, std::time::Duration::from_secs(10));

    let reject = broker.reviews.submit(ReviewOptions {
        session_id: broker.reviewer.id.clone(),
        session_key: broker.reviewer.hmac_key.clone(),
        request_id: request.id.clone(),
        decision: ReviewDecision::Reject,
        comments: "too broad".to_string(),
    });

    let (wait_result, reject_result) = tokio::join!(wait, reject);
    reject_result.unwrap();
    let err = wait_result.unwrap_err();
    assert_eq!(err.kind(), "rejected");

    let settled = broker.store.get_request(&request.id).unwrap().unwrap();
    assert_eq!(settled.status, RequestStatus::Rejected);
    let reviews = broker.store.list_reviews(&request.id).unwrap();
    assert_eq!(reviews.len(), 1);
    assert!(reviews[0].comments.contains("too broad"));
}

/// Scenario: a tampered command context fails preflight with an integrity
/// violation and the request stays approved.
#[tokio::test]
async fn tampered_command_is_integrity_violation() {
    let project = tempfile::tempdir().unwrap();
    let broker = broker(project.path(), RateLimitConfig::default());

    // An approved request whose stored hash no longer matches its fields.
    let mut spec = CommandSpec::shell("rm -rf ./build", project.path().to_string_lossy());
    spec.hash = compute_command_hash(&spec);
    let mut request = Request::new(
        project.path().to_string_lossy(),
        &broker.requestor.id,
        "agent-a",
        spec,
        RiskTier::Dangerous,
    );
    request.status = RequestStatus::Approved;
    request.approval_expires_at = Some(chrono::Utc::now() + chrono::Duration::hours(1));
    // in-flight tamper: the raw drifts after the hash was bound
    request.command.raw = "rm -rf /".to_string();
    broker.store.create_request(&request).unwrap();

    let err = broker
        .executor
        .execute_approved(ExecuteOptions::new(&request.id, project.path().join("logs")))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "integrity_violation");

    let loaded = broker.store.get_request(&request.id).unwrap().unwrap();
    assert_eq!(loaded.status, RequestStatus::Approved);
    assert!(broker.store.get_execution(&request.id).unwrap().is_none());
}

/// Scenario: executing after the approval TTL moves the request to
/// `approved_expired` and records no execution.
#[tokio::test]
async fn ttl_expiry_blocks_execution() {
    let project = tempfile::tempdir().unwrap();
    let broker = broker(project.path(), RateLimitConfig::default());

    let mut spec = CommandSpec::shell("echo hi", project.path().to_string_lossy());
    spec.hash = compute_command_hash(&spec);
    let mut request = Request::new(
        project.path().to_string_lossy(),
        &broker.requestor.id,
        "agent-a",
        spec,
        RiskTier::Dangerous,
    );
    request.status = RequestStatus::Approved;
    request.approval_expires_at = Some(chrono::Utc::now() - chrono::Duration::minutes(1));
    broker.store.create_request(&request).unwrap();

    let err = broker
        .executor
        .execute_approved(ExecuteOptions::new(&request.id, project.path().join("logs")))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "expired");

    let loaded = broker.store.get_request(&request.id).unwrap().unwrap();
    assert_eq!(loaded.status, RequestStatus::ApprovedExpired);
    assert!(broker.store.get_execution(&request.id).unwrap().is_none());
}

/// Scenario: the third back-to-back request trips the pending cap.
#[tokio::test]
async fn rate_limit_rejects_third_request() {
    let project = tempfile::tempdir().unwrap();
    let broker = broker(
        project.path(),
        RateLimitConfig {
            max_pending_per_session: 2,
            max_requests_per_minute: 0,
            action: RateLimitAction::Reject,
        },
    );

    broker
        .creator
        .create(run_opts(&broker, project.path(), project.path(), "rm -rf ./a", "r"))
        .await
        .unwrap();
    broker
        .creator
        .create(run_opts(&broker, project.path(), project.path(), "rm -rf ./b", "r"))
        .await
        .unwrap();
    let err = broker
        .creator
        .create(run_opts(&broker, project.path(), project.path(), "rm -rf ./c", "r"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "rate_limited");
    assert!(err.to_string().contains("pending limit exceeded 2/2"));
    match err {
        EngineError::RateLimited(limit) => {
            assert_eq!(limit.pending, 2);
            assert_eq!(limit.max_pending, 2);
        }
        other => panic!("expected rate limit error, got {other}"),
    }
}

/// The full happy path as one story: create, wait, approve, execute.
#[tokio::test]
async fn wait_loop_sees_approval() {
    let project = tempfile::tempdir().unwrap();
    let broker = broker(project.path(), RateLimitConfig::default());

    let request = broker
        .creator
        .create(run_opts(&broker, project.path(), project.path(), "rm -rf ./build", "cleanup"))
        .await
        .unwrap()
        .request
        .unwrap();

    let wait = broker
        .creator
        .wait_for_decision(&request.id, std::time::Duration::from_secs(10));
    let review = broker.reviews.submit(approve(&broker, &request.id));

    let (wait_result, review_result) = tokio::join!(wait, review);
    review_result.unwrap();
    let approved = wait_result.unwrap();
    assert_eq!(approved.status, RequestStatus::Approved);
    assert!(approved.approval_expires_at.unwrap() > chrono::Utc::now());
}
