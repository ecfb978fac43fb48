/*
Notification pipeline tests

Drive a NotificationCenter end to end against the in-memory broker and backend:
initial fetch, live pushes, read-state changes, broadcasts and refreshes.
*/

use chrono::{Duration, Utc};
use serde_json::json;

use civic_notify::application::ports::output::notification_port::NotificationPortError;
use civic_notify::core::platform::container::category::Category;
use civic_notify::{ConnectionState, Identity, MarkReadOutcome, NotificationChannel, PipelineError, Role};

use crate::support::{admin, citizen, eventually, settle, Fixture};

fn ids(center: &civic_notify::NotificationCenter) -> Vec<String> {
    center.store().snapshot().iter().map(|r| r.id.to_string()).collect()
}

#[tokio::test]
async fn test_fetch_push_then_mark_read() {
    let fixture = Fixture::new();
    let first = fixture.api.seed("42", "Problem reported", "Your report was received");
    let center = fixture.center();

    center.sign_in(citizen()).await.unwrap();
    assert_eq!(center.unread_count(), 1);
    eventually("connection", || center.connection_state() == ConnectionState::Connected).await;

    let second = fixture.api.notify("42", "Volunteer assigned", "A volunteer is on the way");
    eventually("live push", || center.unread_count() == 2).await;
    assert_eq!(ids(&center), vec![second.to_string(), first.to_string()]);

    assert_eq!(center.mark_read(&first).await.unwrap(), MarkReadOutcome::Confirmed);
    assert_eq!(center.unread_count(), 1);
    assert!(center.store().get(&first).unwrap().is_read);
    assert_eq!(fixture.api.is_read(&first), Some(true));
    assert_eq!(center.server_unread_count().await.unwrap(), 1);

    center.sign_out().await;
    assert!(matches!(center.server_unread_count().await, Err(PipelineError::NotSignedIn)));
}

#[tokio::test]
async fn test_duplicate_frames_are_stored_once() {
    let fixture = Fixture::new();
    let center = fixture.center();
    center.sign_in(citizen()).await.unwrap();
    eventually("connection", || center.connection_state() == ConnectionState::Connected).await;

    let payload = json!({
        "id": 77,
        "title": "Donation received",
        "message": "Thank you",
        "createdAt": "2025-03-01T10:00:00",
        "isRead": false
    });
    fixture.broker.publish_json("/topic/notifications/42", &payload).unwrap();
    fixture.broker.publish_json("/topic/notifications/42", &payload).unwrap();

    eventually("first delivery", || center.unread_count() == 1).await;
    settle().await;
    assert_eq!(center.store().len(), 1);
    assert_eq!(center.unread_count(), 1);

    center.sign_out().await;
}

#[tokio::test]
async fn test_failed_confirmation_rolls_back() {
    let fixture = Fixture::new();
    let id = fixture.api.seed("42", "Request approved", "Your request was approved");
    let center = fixture.center();
    center.sign_in(citizen()).await.unwrap();

    fixture
        .api
        .fail_mark_read(Some(NotificationPortError::ConnectionError("backend down".to_string())));
    let result = center.mark_read(&id).await;

    assert!(matches!(result, Err(PipelineError::Backend(NotificationPortError::ConnectionError(_)))));
    assert_eq!(center.unread_count(), 1);
    assert!(!center.store().get(&id).unwrap().is_read);

    center.sign_out().await;
}

#[tokio::test]
async fn test_same_id_marked_twice_confirms_once() {
    let fixture = Fixture::new();
    let id = fixture.api.seed("42", "Comment", "Someone commented");
    let center = fixture.center();
    center.sign_in(citizen()).await.unwrap();

    fixture.api.pause_mark_read();
    let (first, second) = tokio::join!(center.mark_read(&id), async {
        eventually("confirmation in flight", || fixture.api.mark_read_calls().len() == 1).await;
        let outcome = center.mark_read(&id).await;
        assert_eq!(center.unread_count(), 0);
        fixture.api.resume_mark_read();
        outcome
    });

    assert_eq!(first.unwrap(), MarkReadOutcome::Confirmed);
    assert_eq!(second.unwrap(), MarkReadOutcome::AlreadyRead);
    assert_eq!(fixture.api.mark_read_calls(), vec![id]);

    center.sign_out().await;
}

#[tokio::test]
async fn test_mark_all_read() {
    let fixture = Fixture::new();
    fixture.api.seed("42", "a", "one");
    fixture.api.seed("42", "b", "two");
    fixture.api.seed("42", "c", "three");
    let center = fixture.center();
    center.sign_in(citizen()).await.unwrap();
    assert_eq!(center.unread_count(), 3);

    let summary = center.mark_all_read().await.unwrap();
    assert_eq!(summary.confirmed, 3);
    assert_eq!(summary.first_error, None);
    assert_eq!(center.unread_count(), 0);

    center.sign_out().await;
}

#[tokio::test]
async fn test_fetch_failure_keeps_store() {
    let fixture = Fixture::new();
    fixture.api.seed("42", "a", "one");
    fixture.api.seed("42", "b", "two");
    let center = fixture.center();
    center.sign_in(citizen()).await.unwrap();
    let before = center.store().snapshot();

    fixture.api.fail_fetch(Some(NotificationPortError::Timeout));
    let result = center.refresh().await;

    assert!(matches!(result, Err(PipelineError::Backend(NotificationPortError::Timeout))));
    assert_eq!(center.store().snapshot(), before);
    assert_eq!(center.unread_count(), 2);

    center.sign_out().await;
}

#[tokio::test]
async fn test_initial_fetch_failure_still_receives_pushes() {
    let fixture = Fixture::new();
    fixture.api.fail_fetch(Some(NotificationPortError::Status {
        status: 503,
        message: "unavailable".to_string(),
    }));
    let center = fixture.center();

    assert!(center.sign_in(citizen()).await.is_err());
    assert_eq!(center.identity(), Some(citizen()));
    eventually("connection", || center.connection_state() == ConnectionState::Connected).await;

    fixture.api.notify("42", "Welcome", "Glad to have you");
    eventually("live push", || center.unread_count() == 1).await;

    center.sign_out().await;
}

#[tokio::test]
async fn test_refresh_replaces_with_server_view() {
    let fixture = Fixture::new();
    let id = fixture.api.seed("42", "a", "one");
    let center = fixture.center();
    center.sign_in(citizen()).await.unwrap();
    eventually("connection", || center.connection_state() == ConnectionState::Connected).await;

    // live record the backend never stored
    fixture
        .broker
        .publish_json(
            "/topic/notifications/42",
            &json!({"id": 500, "title": "x", "message": "y", "createdAt": Utc::now().to_rfc3339()}),
        )
        .unwrap();
    eventually("live push", || center.store().len() == 2).await;

    center.refresh().await.unwrap();
    assert_eq!(ids(&center), vec![id.to_string()]);

    center.sign_out().await;
}

#[tokio::test]
async fn test_admin_broadcast_reaches_everyone() {
    let fixture = Fixture::new();
    let admin_center = fixture.center();
    let citizen_center = fixture.center();
    admin_center.sign_in(admin()).await.unwrap();
    citizen_center.sign_in(citizen()).await.unwrap();
    eventually("both connected", || fixture.broker.subscription_count("/topic/announcements") == 2).await;

    admin_center
        .send_broadcast("Admin Announcement", "Road closures on Friday")
        .await
        .unwrap();

    eventually("broadcast delivered", || citizen_center.unread_count() == 1).await;
    let record = citizen_center.store().snapshot().remove(0);
    assert_eq!(record.channel, NotificationChannel::Broadcast);
    assert!(record.id.is_synthetic());

    let cards = citizen_center.cards(Utc::now());
    assert_eq!(cards[0].presentation.category, Category::Announcement);
    assert_eq!(cards[0].relative_time, "just now");

    assert_eq!(citizen_center.mark_read(&record.id).await.unwrap(), MarkReadOutcome::LocalOnly);
    assert_eq!(citizen_center.unread_count(), 0);
    assert!(fixture.api.mark_read_calls().is_empty());

    admin_center.sign_out().await;
    citizen_center.sign_out().await;
}

#[tokio::test]
async fn test_broadcast_requires_admin() {
    let fixture = Fixture::new();
    let center = fixture.center();
    center.sign_in(Identity::new("5", Role::Ngo)).await.unwrap();

    let result = center.send_broadcast("Admin Announcement", "Hello").await;
    assert!(matches!(result, Err(PipelineError::Backend(NotificationPortError::Forbidden(_)))));
    assert!(fixture.api.broadcasts().is_empty());

    center.sign_out().await;
    assert!(matches!(
        center.send_broadcast("t", "m").await,
        Err(PipelineError::NotSignedIn)
    ));
}

#[tokio::test]
async fn test_cards_use_role_table() {
    let fixture = Fixture::new();
    fixture.api.seed_at(
        "9",
        "Verification rejected",
        "Your documents were rejected",
        Utc::now() - Duration::hours(3),
    );
    let center = fixture.center();
    center.sign_in(Identity::new("9", Role::Volunteer)).await.unwrap();

    let cards = center.cards(Utc::now());
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].presentation.category, Category::VerificationRejected);
    assert_eq!(cards[0].relative_time, "3h ago");

    center.sign_out().await;
}
