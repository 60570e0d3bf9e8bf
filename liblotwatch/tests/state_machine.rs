//! Integration tests for the application state machine
//!
//! Drives the full `App` against the scriptable mock backend: the
//! registration/verification lifecycle, client-side guards, the
//! optimistic vote toggle with rollback, feed-view exclusivity, and the
//! ticket-scan sub-machine.

use std::sync::Arc;

use liblotwatch::api::mock::MockBackend;
use liblotwatch::api::{ScanResponse, VerifyResponse};
use liblotwatch::app::{App, AuthPhase, FeedView, ScanPhase};
use liblotwatch::config::Config;
use liblotwatch::error::ApiError;
use liblotwatch::store::{CredentialConfig, StorageBackend, TokenStore};
use liblotwatch::types::{ScanOutcome, Sighting, VoteKind};
use tempfile::TempDir;

fn test_store(dir: &TempDir) -> TokenStore {
    TokenStore::open_at(
        CredentialConfig {
            storage: StorageBackend::PlainFile,
            path: dir.path().join("creds.json").to_string_lossy().into_owned(),
            passphrase: None,
        },
        dir.path().join("state.json"),
    )
    .unwrap()
}

/// App wired to a mock backend seeded with two lots.
fn setup() -> (App, Arc<MockBackend>, TempDir) {
    let dir = TempDir::new().unwrap();
    let mock = Arc::new(MockBackend::new());
    mock.seed_lots(vec![
        MockBackend::make_lot("lot-a", "Pavilion Structure", "PS"),
        MockBackend::make_lot("lot-b", "Gateway", "GW"),
    ]);
    let app = App::with_backend(Config::default(), mock.clone(), test_store(&dir));
    (app, mock, dir)
}

/// Register a pre-verified device, landing the app in `Ready` with data
/// loaded.
async fn ready(app: &App, mock: &MockBackend) {
    mock.set_register_verified(true);
    app.register().await;
    assert!(app.snapshot().is_ready());
}

fn seeded_sighting(mock: &MockBackend, upvotes: u32, downvotes: u32) -> Sighting {
    let lot = MockBackend::make_lot("lot-a", "Pavilion Structure", "PS");
    let mut sighting = MockBackend::make_sighting("s-1", &lot, 4);
    sighting.upvotes = upvotes;
    sighting.downvotes = downvotes;
    sighting.net_score = upvotes as i32 - downvotes as i32;
    mock.seed_feed("lot-a", vec![sighting.clone()]);
    sighting
}

// ---------------------------------------------------------------------------
// Registration and verification
// ---------------------------------------------------------------------------

#[tokio::test]
async fn register_unverified_awaits_email_verification() {
    let (app, mock, _dir) = setup();
    mock.set_register_verified(false);

    app.register().await;

    let state = app.snapshot();
    assert!(state.authenticated);
    assert!(!state.email_verified);
    assert_eq!(state.phase, AuthPhase::AwaitingVerification);
    assert!(state.error.is_none());
    // The issued token is carried on subsequent requests
    assert!(mock.token().is_some());
}

#[tokio::test]
async fn register_failure_stays_unauthenticated_with_server_message() {
    let (app, mock, _dir) = setup();
    mock.fail_with(
        "register",
        ApiError::Server {
            status: 400,
            message: Some("Registration failed".to_string()),
        },
    );

    app.register().await;

    let state = app.snapshot();
    assert!(!state.authenticated);
    assert_eq!(state.phase, AuthPhase::Unauthenticated);
    assert_eq!(state.error.as_deref(), Some("Registration failed"));
}

#[tokio::test]
async fn verify_email_success_transitions_to_ready_and_loads_lots() {
    let (app, mock, _dir) = setup();
    mock.set_register_verified(false);
    app.register().await;
    assert_eq!(app.snapshot().phase, AuthPhase::AwaitingVerification);

    app.verify_email("student@ucdavis.edu").await;

    let state = app.snapshot();
    assert_eq!(state.phase, AuthPhase::Ready);
    assert!(state.email_verified);
    assert_eq!(state.lots.len(), 2);
    assert!(matches!(state.feed, FeedView::All(_)));
}

#[tokio::test]
async fn verify_email_rejects_wrong_domain_before_any_call() {
    let (app, mock, _dir) = setup();
    mock.set_register_verified(false);
    app.register().await;

    app.verify_email("student@gmail.com").await;

    let state = app.snapshot();
    assert_eq!(state.phase, AuthPhase::AwaitingVerification);
    assert!(state.error.as_deref().unwrap().contains("@ucdavis.edu"));
    assert_eq!(mock.call_count("verify_email"), 0);
}

#[tokio::test]
async fn verify_email_surfaces_server_message_when_not_verified() {
    let (app, mock, _dir) = setup();
    mock.set_register_verified(false);
    app.register().await;

    mock.set_verify_response(VerifyResponse {
        success: true,
        message: "Check your inbox for the confirmation link".to_string(),
        email_verified: false,
        access_token: None,
    });
    app.verify_email("student@ucdavis.edu").await;

    let state = app.snapshot();
    assert_eq!(state.phase, AuthPhase::AwaitingVerification);
    assert_eq!(
        state.error.as_deref(),
        Some("Check your inbox for the confirmation link")
    );
}

#[tokio::test]
async fn otp_flow_reaches_ready() {
    let (app, mock, _dir) = setup();
    mock.set_register_verified(false);
    app.register().await;

    app.send_code("student@ucdavis.edu").await;
    assert!(app
        .snapshot()
        .success_message
        .as_deref()
        .unwrap()
        .contains("student@ucdavis.edu"));

    app.verify_code("student@ucdavis.edu", "123456").await;
    assert_eq!(app.snapshot().phase, AuthPhase::Ready);
    assert_eq!(mock.call_count("send_otp"), 1);
    assert_eq!(mock.call_count("verify_otp"), 1);
}

// ---------------------------------------------------------------------------
// Startup transition
// ---------------------------------------------------------------------------

#[tokio::test]
async fn initialize_without_token_stays_unauthenticated() {
    let (app, mock, _dir) = setup();

    app.initialize().await;

    let state = app.snapshot();
    assert_eq!(state.phase, AuthPhase::Unauthenticated);
    assert!(!state.authenticated);
    assert!(state.device_id.is_some());
    assert_eq!(mock.call_count("register"), 0);
}

#[tokio::test]
async fn initialize_with_token_and_verified_device_goes_ready() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    store.set_auth_token("persisted-token").unwrap();

    let mock = Arc::new(MockBackend::new());
    mock.seed_lots(vec![MockBackend::make_lot("lot-a", "Pavilion Structure", "PS")]);
    mock.set_register_verified(true);

    let app = App::with_backend(Config::default(), mock.clone(), store);
    app.initialize().await;

    let state = app.snapshot();
    assert_eq!(state.phase, AuthPhase::Ready);
    assert!(state.email_verified);
    assert_eq!(state.lots.len(), 1);
    assert_eq!(mock.call_count("register"), 1);
}

#[tokio::test]
async fn initialize_fails_open_for_onboarded_device_without_network() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    store.set_auth_token("persisted-token").unwrap();
    store.set_onboarded(true).unwrap();

    let mock = Arc::new(MockBackend::new());
    mock.seed_lots(vec![MockBackend::make_lot("lot-a", "Pavilion Structure", "PS")]);
    mock.fail_with("register", ApiError::Network("connection refused".to_string()));

    let app = App::with_backend(Config::default(), mock.clone(), store);
    app.initialize().await;

    let state = app.snapshot();
    assert_eq!(state.phase, AuthPhase::Ready);
    assert!(state.authenticated);
    // The data load was still attempted
    assert_eq!(mock.call_count("lots"), 1);
}

#[tokio::test]
async fn initialize_forces_reverification_when_never_onboarded() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    store.set_auth_token("persisted-token").unwrap();

    let mock = Arc::new(MockBackend::new());
    mock.fail_with("register", ApiError::Network("connection refused".to_string()));

    let app = App::with_backend(Config::default(), mock.clone(), store);
    app.initialize().await;

    let state = app.snapshot();
    assert_eq!(state.phase, AuthPhase::AwaitingVerification);
    assert_eq!(mock.call_count("lots"), 0);
}

// ---------------------------------------------------------------------------
// Parking sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn check_in_rejected_when_already_parked_without_api_call() {
    let (app, mock, _dir) = setup();
    ready(&app, &mock).await;

    app.select_lot("lot-a").await;
    app.check_in().await;
    assert!(app.snapshot().is_parked());
    assert_eq!(mock.call_count("check_in"), 1);

    app.check_in().await;

    let state = app.snapshot();
    assert_eq!(state.error.as_deref(), Some("Already checked in to a lot"));
    assert_eq!(mock.call_count("check_in"), 1);
    // The existing session is untouched
    assert!(state.is_parked());
}

#[tokio::test]
async fn check_out_rejected_when_not_parked_without_api_call() {
    let (app, mock, _dir) = setup();
    ready(&app, &mock).await;

    app.check_out().await;

    assert_eq!(app.snapshot().error.as_deref(), Some("Not currently parked"));
    assert_eq!(mock.call_count("check_out"), 0);
}

#[tokio::test]
async fn check_in_then_out_roundtrip() {
    let (app, mock, _dir) = setup();
    ready(&app, &mock).await;

    app.select_lot("lot-a").await;
    app.check_in().await;
    let state = app.snapshot();
    assert!(state.is_parked());
    assert_eq!(
        state.success_message.as_deref(),
        Some("Checked in to Pavilion Structure")
    );

    app.check_out().await;
    let state = app.snapshot();
    assert!(!state.is_parked());
    assert!(state.current_session.is_none());
    assert_eq!(mock.call_count("check_out"), 1);
}

#[tokio::test]
async fn check_in_failure_leaves_session_state_untouched() {
    let (app, mock, _dir) = setup();
    ready(&app, &mock).await;
    app.select_lot("lot-a").await;

    mock.fail_with(
        "check_in",
        ApiError::Server {
            status: 409,
            message: Some("Lot is closed".to_string()),
        },
    );
    app.check_in().await;

    let state = app.snapshot();
    assert!(!state.is_parked());
    assert_eq!(state.error.as_deref(), Some("Lot is closed"));
}

#[tokio::test]
async fn missing_session_is_not_an_error() {
    // The backend reports "not parked" as an empty payload (the REST
    // binding reinterprets its 404); it must not surface as an error
    let (app, mock, _dir) = setup();
    ready(&app, &mock).await;

    let state = app.snapshot();
    assert!(state.current_session.is_none());
    assert!(state.error.is_none());
    assert!(mock.call_count("current_session") >= 1);
}

// ---------------------------------------------------------------------------
// Feed views and voting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn feed_filter_switches_between_exclusive_views() {
    let (app, mock, _dir) = setup();
    ready(&app, &mock).await;

    app.select_feed_filter(Some("lot-a".to_string())).await;
    let state = app.snapshot();
    assert_eq!(state.feed_filter.as_deref(), Some("lot-a"));
    match &state.feed {
        FeedView::Lot(feed) => assert_eq!(feed.lot.id, "lot-a"),
        other => panic!("expected per-lot feed, got {:?}", other),
    }

    app.select_feed_filter(None).await;
    let state = app.snapshot();
    assert_eq!(state.feed_filter, None);
    assert!(matches!(state.feed, FeedView::All(_)));
}

#[tokio::test]
async fn vote_same_type_twice_toggles_back_to_original() {
    let (app, mock, _dir) = setup();
    let original = seeded_sighting(&mock, 2, 1);
    ready(&app, &mock).await;
    app.select_feed_filter(Some("lot-a".to_string())).await;

    // First call sets the vote and bumps the matching counter
    app.vote("s-1", VoteKind::Upvote).await;
    let state = app.snapshot();
    let sighting = state.feed.find("s-1").unwrap();
    assert_eq!(sighting.upvotes, 3);
    assert_eq!(sighting.downvotes, 1);
    assert_eq!(sighting.net_score, 2);
    assert_eq!(sighting.user_vote, Some(VoteKind::Upvote));

    // Second identical call is a removal back to the original counts
    app.vote("s-1", VoteKind::Upvote).await;
    let state = app.snapshot();
    let sighting = state.feed.find("s-1").unwrap();
    assert_eq!(sighting.upvotes, original.upvotes);
    assert_eq!(sighting.downvotes, original.downvotes);
    assert_eq!(sighting.net_score, original.net_score);
    assert_eq!(sighting.user_vote, None);

    // Exactly one of {set, remove} per toggle
    assert_eq!(mock.call_count("cast_vote"), 1);
    assert_eq!(mock.call_count("remove_vote"), 1);
}

#[tokio::test]
async fn vote_switch_moves_one_count_each_way() {
    let (app, mock, _dir) = setup();
    seeded_sighting(&mock, 2, 1);
    ready(&app, &mock).await;
    app.select_feed_filter(Some("lot-a".to_string())).await;

    app.vote("s-1", VoteKind::Upvote).await;
    app.vote("s-1", VoteKind::Downvote).await;

    let state = app.snapshot();
    let sighting = state.feed.find("s-1").unwrap();
    assert_eq!(sighting.upvotes, 2);
    assert_eq!(sighting.downvotes, 2);
    assert_eq!(sighting.net_score, 0);
    assert_eq!(sighting.user_vote, Some(VoteKind::Downvote));
    // The switch is a single set call, not remove-then-set
    assert_eq!(mock.call_count("cast_vote"), 2);
    assert_eq!(mock.call_count("remove_vote"), 0);
    // Untouched fields survive the transitions
    assert_eq!(sighting.lot_code, "PS");
    assert_eq!(sighting.minutes_ago, 4);
}

#[tokio::test]
async fn failed_vote_rolls_back_to_pre_call_state() {
    let (app, mock, _dir) = setup();
    seeded_sighting(&mock, 5, 2);
    ready(&app, &mock).await;
    app.select_feed_filter(Some("lot-a".to_string())).await;

    mock.fail_with("cast_vote", ApiError::Network("timeout".to_string()));
    app.vote("s-1", VoteKind::Upvote).await;

    let state = app.snapshot();
    let sighting = state.feed.find("s-1").unwrap();
    assert_eq!(sighting.upvotes, 5);
    assert_eq!(sighting.downvotes, 2);
    assert_eq!(sighting.net_score, 3);
    assert_eq!(sighting.user_vote, None);
    assert_eq!(state.error.as_deref(), Some("Vote failed"));
}

#[tokio::test]
async fn vote_on_unknown_sighting_makes_no_call() {
    let (app, mock, _dir) = setup();
    ready(&app, &mock).await;

    app.vote("ghost", VoteKind::Upvote).await;

    assert!(app.snapshot().error.is_some());
    assert_eq!(mock.call_count("cast_vote"), 0);
    assert_eq!(mock.call_count("remove_vote"), 0);
}

// ---------------------------------------------------------------------------
// Sighting reports
// ---------------------------------------------------------------------------

#[tokio::test]
async fn report_sighting_without_lot_is_a_guarded_noop() {
    let (app, mock, _dir) = setup();
    ready(&app, &mock).await;

    app.report_sighting(None).await;

    assert_eq!(
        app.snapshot().error.as_deref(),
        Some("Select a lot before reporting")
    );
    assert_eq!(mock.call_count("report_sighting"), 0);
}

#[tokio::test]
async fn report_sighting_reports_notified_count_and_refreshes() {
    let (app, mock, _dir) = setup();
    ready(&app, &mock).await;
    app.select_lot("lot-a").await;
    let feed_loads_before = mock.call_count("lot_feed");

    app.report_sighting(Some("officer near row 3".to_string()))
        .await;

    let state = app.snapshot();
    assert_eq!(
        state.success_message.as_deref(),
        Some("Sighting reported. 7 parkers notified.")
    );
    assert_eq!(mock.call_count("report_sighting"), 1);
    assert!(mock.call_count("lot_feed") > feed_loads_before);
}

// ---------------------------------------------------------------------------
// Ticket scan sub-machine
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scan_flow_preview_processing_success() {
    let (app, mock, dir) = setup();
    ready(&app, &mock).await;

    let image_path = dir.path().join("ticket.jpg");
    std::fs::write(&image_path, b"not-really-a-jpeg").unwrap();

    app.select_scan_image(image_path.clone());
    assert!(matches!(app.snapshot().scan, ScanPhase::Preview { .. }));
    // Nothing has been submitted yet
    assert_eq!(mock.call_count("scan_ticket"), 0);

    mock.seed_scan_response(ScanResponse {
        success: true,
        outcome: ScanOutcome {
            ticket_date: Some("2026-02-03".to_string()),
            ticket_time: Some("14:10".to_string()),
            ticket_location: Some("Pavilion Structure".to_string()),
            mapped_lot_id: Some("lot-a".to_string()),
            mapped_lot_name: Some("Pavilion Structure".to_string()),
            is_recent: true,
            sighting_id: Some("s-created".to_string()),
            users_notified: 3,
        },
    });
    let feed_calls_before = mock.call_count("all_feeds");
    app.submit_ticket_scan().await;

    match &app.snapshot().scan {
        ScanPhase::Success(outcome) => {
            assert_eq!(outcome.mapped_lot_id.as_deref(), Some("lot-a"));
            assert_eq!(outcome.users_notified, 3);
        }
        other => panic!("expected scan success, got {:?}", other),
    }
    // A created sighting triggers a feed refresh
    assert!(mock.call_count("all_feeds") > feed_calls_before);

    app.reset_scan();
    assert!(matches!(app.snapshot().scan, ScanPhase::Idle));
}

#[tokio::test]
async fn scan_without_preview_sets_error_and_skips_upload() {
    let (app, mock, _dir) = setup();
    ready(&app, &mock).await;

    app.submit_ticket_scan().await;

    assert_eq!(
        app.snapshot().error.as_deref(),
        Some("Select a ticket image first")
    );
    assert_eq!(mock.call_count("scan_ticket"), 0);
}

#[tokio::test]
async fn scan_failure_lands_in_error_state_and_resets() {
    let (app, mock, dir) = setup();
    ready(&app, &mock).await;

    let image_path = dir.path().join("ticket.jpg");
    std::fs::write(&image_path, b"bytes").unwrap();
    app.select_scan_image(image_path);

    mock.fail_with(
        "scan_ticket",
        ApiError::Server {
            status: 422,
            message: Some("Image too blurry".to_string()),
        },
    );
    app.submit_ticket_scan().await;

    match &app.snapshot().scan {
        ScanPhase::Error(message) => assert_eq!(message, "Image too blurry"),
        other => panic!("expected scan error, got {:?}", other),
    }

    app.reset_scan();
    assert!(matches!(app.snapshot().scan, ScanPhase::Idle));
}

// ---------------------------------------------------------------------------
// Notifications, messages, auth expiry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unread_count_loads_and_clears() {
    let (app, mock, _dir) = setup();
    let lot = MockBackend::make_lot("lot-a", "Pavilion Structure", "PS");
    mock.seed_notifications(vec![
        liblotwatch::types::Notification {
            id: "n-1".to_string(),
            message: format!("TAPS spotted in {}", lot.name),
            lot_id: Some(lot.id.clone()),
            created_at: chrono::Utc::now(),
        },
        liblotwatch::types::Notification {
            id: "n-2".to_string(),
            message: "Your lot went high risk".to_string(),
            lot_id: Some(lot.id),
            created_at: chrono::Utc::now(),
        },
    ]);
    ready(&app, &mock).await;

    assert_eq!(app.snapshot().unread_count, 2);

    app.mark_all_read().await;
    assert_eq!(app.snapshot().unread_count, 0);
    assert_eq!(mock.call_count("mark_notifications_read"), 1);
}

#[tokio::test]
async fn unread_count_failure_is_silent() {
    let (app, mock, _dir) = setup();
    mock.fail_with(
        "unread_notifications",
        ApiError::Network("flaky".to_string()),
    );
    ready(&app, &mock).await;

    let state = app.snapshot();
    assert_eq!(state.unread_count, 0);
    // Non-critical background refresh: no user-visible error
    assert!(state.error.is_none());
}

#[tokio::test]
async fn notices_clear_only_on_explicit_dismissal() {
    let (app, mock, _dir) = setup();
    ready(&app, &mock).await;

    app.check_out().await; // guard error
    assert!(app.snapshot().error.is_some());

    // An unrelated successful operation does not clear it
    app.fetch_unread_count().await;
    assert!(app.snapshot().error.is_some());

    app.clear_error();
    assert!(app.snapshot().error.is_none());

    app.select_lot("lot-a").await;
    app.check_in().await;
    assert!(app.snapshot().success_message.is_some());
    app.clear_success_message();
    assert!(app.snapshot().success_message.is_none());
}

#[tokio::test]
async fn auth_failure_drops_back_to_unauthenticated() {
    let (app, mock, _dir) = setup();
    ready(&app, &mock).await;

    mock.fail_with("lot_stats", ApiError::Auth("Token rejected".to_string()));
    app.select_lot("lot-a").await;

    let state = app.snapshot();
    assert_eq!(state.phase, AuthPhase::Unauthenticated);
    assert!(!state.authenticated);
    assert!(state.error.is_some());
    assert_eq!(mock.token(), None);
}
