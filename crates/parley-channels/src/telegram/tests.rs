//! Tests for telegram module

use super::*;
use parley_core::{Button, EventKind, TransportError};
use serde_json::json;
use teloxide::types::{CallbackQuery, Message, User};
use teloxide::requests::HasPayload;
use teloxide::{ApiError, RequestError};
use tokio_test::{assert_err, assert_ok};

fn user_json(id: i64) -> serde_json::Value {
    json!({
        "id": id,
        "is_bot": false,
        "first_name": "Ada",
        "last_name": "Lovelace",
        "username": "ada",
        "language_code": "en",
        "is_premium": true
    })
}

fn private_message(text: &str) -> Message {
    serde_json::from_value(json!({
        "message_id": 17,
        "date": 1_700_000_000,
        "chat": { "id": 42, "type": "private", "first_name": "Ada" },
        "from": user_json(42),
        "text": text
    }))
    .unwrap()
}

fn group_message(text: &str) -> Message {
    serde_json::from_value(json!({
        "message_id": 18,
        "date": 1_700_000_000,
        "chat": { "id": -1001, "type": "supergroup", "title": "Team" },
        "from": user_json(42),
        "text": text
    }))
    .unwrap()
}

fn callback_query(data: Option<&str>) -> CallbackQuery {
    let mut query = json!({
        "id": "4382bfdwdsb323b2d9",
        "from": user_json(42),
        "chat_instance": "-1234",
        "message": {
            "message_id": 100,
            "date": 1_700_000_000,
            "chat": { "id": 42, "type": "private", "first_name": "Ada" },
            "from": { "id": 7, "is_bot": true, "first_name": "Parley" },
            "text": "menu"
        }
    });
    if let Some(data) = data {
        query["data"] = json!(data);
    }
    serde_json::from_value(query).unwrap()
}

fn adapter() -> TelegramAdapter {
    TelegramAdapter::new(TelegramConfig::new("123456:test_token"))
}

#[test]
fn test_telegram_config() {
    let config = TelegramConfig::new("test_token").with_allowed_users(vec![123, 456]);

    assert_eq!(config.bot_token, "test_token");
    assert_eq!(config.allowed_users, vec![123, 456]);
}

#[test]
fn test_config_validation() {
    assert_ok!(TelegramConfig::new("123456:abc").validate());
    assert_err!(TelegramConfig::new("").validate());
    assert_err!(TelegramConfig::new("not-a-token").validate());
    assert_err!(TelegramConfig::new("abc:def").validate());
}

#[test]
fn test_user_allowed() {
    let config = TelegramConfig::new("token").with_allowed_users(vec![123, 456]);
    let adapter = TelegramAdapter::new(config);

    assert!(adapter.is_user_allowed(123));
    assert!(adapter.is_user_allowed(456));
    assert!(!adapter.is_user_allowed(789));
}

#[test]
fn test_empty_allowlist_allows_all() {
    let adapter = adapter();

    assert!(adapter.is_user_allowed(123));
    assert!(adapter.is_user_allowed(999999));
}

#[test]
fn test_identity_from_user() {
    let user: User = serde_json::from_value(user_json(42)).unwrap();
    let identity = TelegramAdapter::identity_from_user(&user);

    assert_eq!(identity.id, 42);
    assert_eq!(identity.display_name(), "Ada Lovelace");
    assert_eq!(identity.username.as_deref(), Some("ada"));
    assert_eq!(identity.language_code.as_deref(), Some("en"));
    assert!(identity.is_premium);
    assert!(!identity.is_bot);
}

#[test]
fn test_private_command_becomes_event() {
    let event = adapter()
        .event_from_message(&private_message("/start deep_link"))
        .unwrap();

    assert_eq!(event.chat_id, 42);
    assert_eq!(event.sender.as_ref().map(|s| s.id), Some(42));
    assert_eq!(
        event.kind,
        EventKind::Command {
            message_id: 17,
            name: "start".to_string(),
            args: "deep_link".to_string(),
        }
    );
}

#[test]
fn test_group_messages_are_ignored() {
    assert!(adapter().event_from_message(&group_message("hi")).is_none());
}

#[test]
fn test_disallowed_user_is_ignored() {
    let adapter = TelegramAdapter::new(TelegramConfig::new("token").with_allowed_users(vec![1]));
    assert!(adapter.event_from_message(&private_message("hi")).is_none());
    assert!(adapter.event_from_callback(&callback_query(Some("menu"))).is_none());
}

#[test]
fn test_callback_becomes_event() {
    let event = adapter()
        .event_from_callback(&callback_query(Some("page:2")))
        .unwrap();

    assert_eq!(event.chat_id, 42);
    assert_eq!(
        event.kind,
        EventKind::Callback {
            query_id: "4382bfdwdsb323b2d9".to_string(),
            message_id: 100,
            data: "page:2".to_string(),
        }
    );
}

#[test]
fn test_callback_without_data_is_ignored() {
    assert!(adapter().event_from_callback(&callback_query(None)).is_none());
}

#[test]
fn test_dropped_callback_is_acknowledged_empty() {
    let adapter = TelegramAdapter::new(TelegramConfig::new("token").with_allowed_users(vec![1]));
    let query = callback_query(Some("menu"));
    assert!(adapter.event_from_callback(&query).is_none());

    let request = adapter.acknowledgement(&query);
    let payload = request.payload_ref();
    assert_eq!(payload.callback_query_id.to_string(), "4382bfdwdsb323b2d9");
    assert!(payload.text.is_none());
    assert!(payload.show_alert.is_none());
}

#[test]
fn test_build_keyboard() {
    let rows = vec![
        vec![Button::callback("Yes", "approve:yes"), Button::callback("No", "approve:no")],
        vec![],
    ];
    let keyboard = TelegramAdapter::build_keyboard(&rows).unwrap();
    assert_eq!(keyboard.inline_keyboard.len(), 1);
    assert_eq!(keyboard.inline_keyboard[0].len(), 2);

    assert!(TelegramAdapter::build_keyboard(&[]).is_none());
}

#[test]
fn test_error_mapping() {
    assert_eq!(
        map_request_error(RequestError::Api(ApiError::MessageNotModified)),
        TransportError::NotModified
    );
    assert_eq!(
        map_request_error(RequestError::Api(ApiError::MessageToDeleteNotFound)),
        TransportError::NotFound
    );
    assert_eq!(
        map_request_error(RequestError::Api(ApiError::BotBlocked)),
        TransportError::Blocked
    );
    assert_eq!(
        map_request_error(RequestError::Api(ApiError::UserDeactivated)),
        TransportError::Blocked
    );
    assert!(matches!(
        map_request_error(RequestError::Api(ApiError::Unknown("boom".to_string()))),
        TransportError::Api(_)
    ));
}
