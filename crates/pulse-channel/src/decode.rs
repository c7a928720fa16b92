use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Result};
use serde_json::Value;

use crate::color::ThreadColor;
use crate::types::{
    value_to_string, value_to_u64, DecodeFailure, DeliveryReceipt, Event, InboxUpdate,
    NewMessage, NicknameChanged, ParticipantRemoved, ParticipantsAdded, PresenceUpdate, Primer,
    ReadReceipt, ThreadColorChanged, ThreadEmojiChanged, ThreadKey, ThreadTitleChanged,
    ThreadsMarkedRead, UnknownEvent,
};

/// Decodes one raw envelope into typed events, one per message item, in
/// original order.
///
/// Per-item failures are isolated: a malformed item becomes a `DecodeFailure`
/// event and decoding continues with the next item. `deltaflow` items are
/// consumed without emitting anything.
pub fn decode_envelope(envelope: &Value) -> Vec<Event> {
    let Some(items) = envelope.get("ms").and_then(Value::as_array) else {
        return Vec::new();
    };
    let mut events = Vec::with_capacity(items.len());
    for item in items {
        match decode_item(item) {
            Ok(Some(event)) => events.push(event),
            Ok(None) => {}
            Err(cause) => events.push(Event::DecodeFailure(DecodeFailure {
                raw: item.clone(),
                cause: cause.to_string(),
            })),
        }
    }
    events
}

fn decode_item(item: &Value) -> Result<Option<Event>> {
    match item.get("type").and_then(Value::as_str) {
        Some("delta") => decode_delta(item).map(Some),
        Some("inbox") => decode_inbox(item).map(Some),
        Some("qprimer") => Ok(Some(Event::Primer(Primer {
            made_ts_ms: item.get("made").and_then(value_to_u64),
        }))),
        // Sent once before any other item; carries nothing the caller needs.
        Some("deltaflow") => Ok(None),
        Some("chatproxy-presence") => Ok(Some(decode_presence(item))),
        _ => Ok(Some(Event::Unknown(UnknownEvent { raw: item.clone() }))),
    }
}

fn decode_inbox(item: &Value) -> Result<Event> {
    Ok(Event::InboxUpdate(InboxUpdate {
        unseen: require_u64(item, "unseen")?,
        unread: require_u64(item, "unread")?,
        recent_unread: require_u64(item, "recent_unread")?,
    }))
}

fn decode_presence(item: &Value) -> Event {
    let mut buddy_list = BTreeMap::new();
    if let Some(entries) = item.get("buddyList").and_then(Value::as_object) {
        for (buddy_id, payload) in entries {
            let last_active = payload.get("lat").and_then(value_to_u64);
            buddy_list.insert(buddy_id.clone(), last_active);
        }
    }
    Event::PresenceUpdate(PresenceUpdate { buddy_list })
}

/// Message metadata shared by most delta kinds. Parsed strictly whenever it is
/// present, matching the wire contract: an item carrying metadata without an
/// actor or timestamp is malformed even if the matched kind would not use them.
struct DeltaMetadata<'a> {
    message_id: String,
    author_id: String,
    timestamp_ms: u64,
    raw: &'a Value,
}

impl DeltaMetadata<'_> {
    fn thread(&self) -> Result<ThreadKey> {
        resolve_thread_key(self.raw)
    }

    /// The group-thread id; participant changes only ever target groups.
    fn group_thread_id(&self) -> Result<String> {
        self.raw
            .get("threadKey")
            .and_then(|key| key.get("threadFbId"))
            .and_then(value_to_string)
            .ok_or_else(|| anyhow!("messageMetadata.threadKey missing threadFbId"))
    }
}

fn parse_delta_metadata(value: &Value) -> Result<DeltaMetadata<'_>> {
    let message_id = value
        .get("messageId")
        .and_then(value_to_string)
        .ok_or_else(|| anyhow!("messageMetadata missing messageId"))?;
    let author_id = value
        .get("actorFbId")
        .and_then(value_to_string)
        .ok_or_else(|| anyhow!("messageMetadata missing actorFbId"))?;
    let timestamp_ms = value
        .get("timestamp")
        .and_then(value_to_u64)
        .ok_or_else(|| anyhow!("messageMetadata missing timestamp"))?;
    Ok(DeltaMetadata {
        message_id,
        author_id,
        timestamp_ms,
        raw: value,
    })
}

/// Resolves the thread key from a container exposing a `threadKey` object:
/// a group-thread id wins, then a one-to-one peer id; neither present is a
/// resolution failure.
fn resolve_thread_key(container: &Value) -> Result<ThreadKey> {
    let key = container
        .get("threadKey")
        .ok_or_else(|| anyhow!("missing threadKey"))?;
    resolve_thread_key_object(key)
}

fn resolve_thread_key_object(key: &Value) -> Result<ThreadKey> {
    if let Some(thread_id) = key.get("threadFbId").and_then(value_to_string) {
        return Ok(ThreadKey::group(thread_id));
    }
    if let Some(thread_id) = key.get("otherUserFbId").and_then(value_to_string) {
        return Ok(ThreadKey::user(thread_id));
    }
    bail!("threadKey carries neither threadFbId nor otherUserFbId")
}

// The delta kinds below are matched strictly first-to-last. The order is a
// wire-compatibility contract: payloads can legitimately satisfy more than one
// predicate, and the earliest match governs.
fn decode_delta(item: &Value) -> Result<Event> {
    let delta = item
        .get("delta")
        .ok_or_else(|| anyhow!("delta item missing delta payload"))?;
    let delta_type = delta.get("type").and_then(Value::as_str);
    let delta_class = delta.get("class").and_then(Value::as_str);
    let metadata = delta
        .get("messageMetadata")
        .map(parse_delta_metadata)
        .transpose()?;

    // 1. Added participants
    if let Some(added) = delta.get("addedParticipants") {
        let meta = require_metadata(metadata.as_ref())?;
        let added = added
            .as_array()
            .ok_or_else(|| anyhow!("addedParticipants is not an array"))?;
        let added_ids = added
            .iter()
            .map(|participant| {
                participant
                    .get("userFbId")
                    .and_then(value_to_string)
                    .ok_or_else(|| anyhow!("participant entry missing userFbId"))
            })
            .collect::<Result<Vec<_>>>()?;
        return Ok(Event::ParticipantsAdded(ParticipantsAdded {
            message_id: meta.message_id.clone(),
            author_id: meta.author_id.clone(),
            thread: ThreadKey::group(meta.group_thread_id()?),
            timestamp_ms: meta.timestamp_ms,
            added_ids,
        }));
    }

    // 2. Left/removed participant
    if let Some(removed) = delta.get("leftParticipantFbId") {
        let meta = require_metadata(metadata.as_ref())?;
        let removed_id = value_to_string(removed)
            .ok_or_else(|| anyhow!("leftParticipantFbId is not an id"))?;
        return Ok(Event::ParticipantRemoved(ParticipantRemoved {
            message_id: meta.message_id.clone(),
            author_id: meta.author_id.clone(),
            thread: ThreadKey::group(meta.group_thread_id()?),
            timestamp_ms: meta.timestamp_ms,
            removed_id,
        }));
    }

    // 3. Thread theme change
    if delta_type == Some("change_thread_theme") {
        let meta = require_metadata(metadata.as_ref())?;
        let token = untyped_field(delta, "theme_color")?;
        return Ok(Event::ThreadColorChanged(ThreadColorChanged {
            message_id: meta.message_id.clone(),
            author_id: meta.author_id.clone(),
            thread: meta.thread()?,
            timestamp_ms: meta.timestamp_ms,
            new_color: ThreadColor::from_theme_token(&token),
        }));
    }

    // 4. Thread icon change
    if delta_type == Some("change_thread_icon") {
        let meta = require_metadata(metadata.as_ref())?;
        return Ok(Event::ThreadEmojiChanged(ThreadEmojiChanged {
            message_id: meta.message_id.clone(),
            author_id: meta.author_id.clone(),
            thread: meta.thread()?,
            timestamp_ms: meta.timestamp_ms,
            new_emoji: untyped_field(delta, "thread_icon")?,
        }));
    }

    // 5. Thread title change
    if delta_class == Some("ThreadName") {
        let meta = require_metadata(metadata.as_ref())?;
        let new_title = delta
            .get("name")
            .and_then(value_to_string)
            .ok_or_else(|| anyhow!("thread name change missing name"))?;
        return Ok(Event::ThreadTitleChanged(ThreadTitleChanged {
            message_id: meta.message_id.clone(),
            author_id: meta.author_id.clone(),
            thread: meta.thread()?,
            timestamp_ms: meta.timestamp_ms,
            new_title,
        }));
    }

    // 6. Nickname change
    if delta_type == Some("change_thread_nickname") {
        let meta = require_metadata(metadata.as_ref())?;
        return Ok(Event::NicknameChanged(NicknameChanged {
            message_id: meta.message_id.clone(),
            author_id: meta.author_id.clone(),
            thread: meta.thread()?,
            timestamp_ms: meta.timestamp_ms,
            changed_for: untyped_field(delta, "participant_id")?,
            new_nickname: untyped_field(delta, "nickname")?,
        }));
    }

    // 7. Delivery receipt
    if delta_class == Some("DeliveryReceipt") {
        let message_ids = delta
            .get("messageIds")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("delivery receipt missing messageIds"))?
            .iter()
            .map(|id| value_to_string(id).ok_or_else(|| anyhow!("messageIds entry is not an id")))
            .collect::<Result<Vec<_>>>()?;
        return Ok(Event::DeliveryReceipt(DeliveryReceipt {
            message_ids,
            delivered_for: actor_or_peer(delta)?,
            thread: resolve_thread_key(delta)?,
            delivered_ts_ms: require_u64(delta, "deliveredWatermarkTimestampMs")?,
        }));
    }

    // 8. Read receipt
    if delta_class == Some("ReadReceipt") {
        return Ok(Event::ReadReceipt(ReadReceipt {
            seen_by: actor_or_peer(delta)?,
            thread: resolve_thread_key(delta)?,
            seen_ts_ms: require_u64(delta, "actionTimestampMs")?,
            delivered_ts_ms: require_u64(delta, "watermarkTimestampMs")?,
        }));
    }

    // 9. Threads marked read
    if delta_class == Some("MarkRead") {
        let seen_ts_ms = first_u64(delta, &["actionTimestampMs", "actionTimestamp"])?;
        let delivered_ts_ms = first_u64(delta, &["watermarkTimestampMs", "watermarkTimestamp"])?;
        // A folder-scoped receipt names no explicit threads.
        let threads = if delta.get("folders").is_some() {
            Vec::new()
        } else {
            delta
                .get("threadKeys")
                .and_then(Value::as_array)
                .ok_or_else(|| anyhow!("mark-read receipt missing threadKeys"))?
                .iter()
                .map(resolve_thread_key_object)
                .collect::<Result<Vec<_>>>()?
        };
        return Ok(Event::ThreadsMarkedRead(ThreadsMarkedRead {
            threads,
            seen_ts_ms,
            delivered_ts_ms,
        }));
    }

    // 10. New message
    if delta_class == Some("NewMessage") {
        let meta = require_metadata(metadata.as_ref())?;
        let body = delta
            .get("body")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Ok(Event::NewMessage(NewMessage {
            message_id: meta.message_id.clone(),
            author_id: meta.author_id.clone(),
            thread: meta.thread()?,
            timestamp_ms: meta.timestamp_ms,
            body,
        }));
    }

    Ok(Event::Unknown(UnknownEvent { raw: item.clone() }))
}

fn require_metadata<'a, 'b>(
    metadata: Option<&'a DeltaMetadata<'b>>,
) -> Result<&'a DeltaMetadata<'b>> {
    metadata.ok_or_else(|| anyhow!("delta missing messageMetadata"))
}

fn untyped_field(delta: &Value, field: &str) -> Result<String> {
    delta
        .get("untypedData")
        .and_then(|data| data.get(field))
        .and_then(value_to_string)
        .ok_or_else(|| anyhow!("delta missing untypedData.{field}"))
}

/// Receipts may omit the actor; the one-to-one peer id stands in for it.
fn actor_or_peer(delta: &Value) -> Result<String> {
    if let Some(actor) = delta.get("actorFbId").and_then(value_to_string) {
        return Ok(actor);
    }
    delta
        .get("threadKey")
        .and_then(|key| key.get("otherUserFbId"))
        .and_then(value_to_string)
        .ok_or_else(|| anyhow!("receipt carries neither actorFbId nor a peer id"))
}

fn require_u64(value: &Value, field: &str) -> Result<u64> {
    value
        .get(field)
        .and_then(value_to_u64)
        .ok_or_else(|| anyhow!("missing numeric field {field}"))
}

fn first_u64(value: &Value, fields: &[&str]) -> Result<u64> {
    for field in fields {
        if let Some(found) = value.get(field).and_then(value_to_u64) {
            return Ok(found);
        }
    }
    bail!("missing numeric field {}", fields.join("/"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn decode_one(item: Value) -> Event {
        let mut events = decode_envelope(&json!({ "ms": [item] }));
        assert_eq!(events.len(), 1);
        events.remove(0)
    }

    #[test]
    fn envelope_without_items_decodes_to_nothing() {
        assert!(decode_envelope(&json!({ "seq": "7" })).is_empty());
    }

    #[test]
    fn item_count_and_order_are_preserved() {
        let envelope = json!({ "ms": [
            { "type": "qprimer", "made": 1600000000000_u64 },
            { "type": "inbox", "unseen": 1, "unread": 2, "recent_unread": 3 },
            { "type": "something-new", "payload": true },
        ]});
        let events = decode_envelope(&envelope);
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], Event::Primer(_)));
        assert!(matches!(events[1], Event::InboxUpdate(_)));
        assert!(matches!(events[2], Event::Unknown(_)));
    }

    #[test]
    fn deltaflow_items_are_silently_consumed() {
        let envelope = json!({ "ms": [
            { "type": "deltaflow" },
            { "type": "qprimer", "made": 5 },
        ]});
        let events = decode_envelope(&envelope);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::Primer(_)));
    }

    #[test]
    fn malformed_item_is_isolated_from_its_neighbors() {
        let envelope = json!({ "ms": [
            { "type": "inbox", "unseen": 0, "unread": 0, "recent_unread": 0 },
            { "type": "delta", "delta": {
                "class": "NewMessage",
                "body": "hi",
                "messageMetadata": {
                    "messageId": "mid.2",
                    "timestamp": 1600000000000_u64,
                    "threadKey": { "otherUserFbId": "456" }
                }
            }},
            { "type": "qprimer", "made": 9 },
        ]});
        let events = decode_envelope(&envelope);
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], Event::InboxUpdate(_)));
        match &events[1] {
            Event::DecodeFailure(failure) => {
                assert!(failure.cause.contains("actorFbId"), "cause: {}", failure.cause);
            }
            other => panic!("expected decode failure, got {other:?}"),
        }
        assert!(matches!(events[2], Event::Primer(_)));
    }

    #[test]
    fn new_message_decodes_with_user_thread() {
        let event = decode_one(json!({ "type": "delta", "delta": {
            "class": "NewMessage",
            "body": "hello there",
            "messageMetadata": {
                "messageId": "mid.100",
                "actorFbId": 100001234,
                "timestamp": "1600000000000",
                "threadKey": { "otherUserFbId": "456" }
            }
        }}));
        match event {
            Event::NewMessage(message) => {
                assert_eq!(message.message_id, "mid.100");
                assert_eq!(message.author_id, "100001234");
                assert_eq!(message.thread, ThreadKey::user("456"));
                assert_eq!(message.timestamp_ms, 1_600_000_000_000);
                assert_eq!(message.body, "hello there");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn new_message_body_defaults_to_empty() {
        let event = decode_one(json!({ "type": "delta", "delta": {
            "class": "NewMessage",
            "messageMetadata": {
                "messageId": "mid.101",
                "actorFbId": "7",
                "timestamp": 1,
                "threadKey": { "threadFbId": "2000" }
            }
        }}));
        match event {
            Event::NewMessage(message) => assert_eq!(message.body, ""),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn addition_marker_takes_precedence_over_removal_marker() {
        let event = decode_one(json!({ "type": "delta", "delta": {
            "addedParticipants": [ { "userFbId": "111" }, { "userFbId": 222 } ],
            "leftParticipantFbId": "333",
            "messageMetadata": {
                "messageId": "mid.200",
                "actorFbId": "999",
                "timestamp": 1600000000001_u64,
                "threadKey": { "threadFbId": "2000" }
            }
        }}));
        match event {
            Event::ParticipantsAdded(added) => {
                assert_eq!(added.added_ids, vec!["111", "222"]);
                assert_eq!(added.thread, ThreadKey::group("2000"));
            }
            other => panic!("expected addition to win precedence, got {other:?}"),
        }
    }

    #[test]
    fn removal_marker_decodes_participant_removed() {
        let event = decode_one(json!({ "type": "delta", "delta": {
            "leftParticipantFbId": 333,
            "messageMetadata": {
                "messageId": "mid.201",
                "actorFbId": "999",
                "timestamp": 2,
                "threadKey": { "threadFbId": "2000" }
            }
        }}));
        match event {
            Event::ParticipantRemoved(removed) => {
                assert_eq!(removed.removed_id, "333");
                assert_eq!(removed.author_id, "999");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn theme_change_decodes_end_to_end() {
        let event = decode_one(json!({ "type": "delta", "delta": {
            "type": "change_thread_theme",
            "untypedData": { "theme_color": "FF0084FF" },
            "messageMetadata": {
                "messageId": "mid.300",
                "actorFbId": "1000",
                "timestamp": 1600000000000_u64,
                "threadKey": { "threadFbId": "2000" }
            }
        }}));
        match event {
            Event::ThreadColorChanged(changed) => {
                assert_eq!(changed.author_id, "1000");
                assert_eq!(changed.thread, ThreadKey::group("2000"));
                assert_eq!(changed.timestamp_ms, 1_600_000_000_000);
                assert_eq!(changed.new_color, ThreadColor::MessengerBlue);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn icon_title_and_nickname_changes_decode() {
        let icon = decode_one(json!({ "type": "delta", "delta": {
            "type": "change_thread_icon",
            "untypedData": { "thread_icon": "🌊" },
            "messageMetadata": {
                "messageId": "mid.301",
                "actorFbId": "1",
                "timestamp": 3,
                "threadKey": { "otherUserFbId": "456" }
            }
        }}));
        assert!(
            matches!(icon, Event::ThreadEmojiChanged(ref changed) if changed.new_emoji == "🌊")
        );

        let title = decode_one(json!({ "type": "delta", "delta": {
            "class": "ThreadName",
            "name": "weekend plans",
            "messageMetadata": {
                "messageId": "mid.302",
                "actorFbId": "1",
                "timestamp": 4,
                "threadKey": { "threadFbId": "2000" }
            }
        }}));
        assert!(
            matches!(title, Event::ThreadTitleChanged(ref changed) if changed.new_title == "weekend plans")
        );

        let nickname = decode_one(json!({ "type": "delta", "delta": {
            "type": "change_thread_nickname",
            "untypedData": { "participant_id": 456, "nickname": "cap" },
            "messageMetadata": {
                "messageId": "mid.303",
                "actorFbId": "1",
                "timestamp": 5,
                "threadKey": { "otherUserFbId": "456" }
            }
        }}));
        match nickname {
            Event::NicknameChanged(changed) => {
                assert_eq!(changed.changed_for, "456");
                assert_eq!(changed.new_nickname, "cap");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn delivery_receipt_falls_back_to_peer_actor() {
        let event = decode_one(json!({ "type": "delta", "delta": {
            "class": "DeliveryReceipt",
            "messageIds": ["mid.1", "mid.2"],
            "deliveredWatermarkTimestampMs": "1600000000500",
            "threadKey": { "otherUserFbId": 456 }
        }}));
        match event {
            Event::DeliveryReceipt(receipt) => {
                assert_eq!(receipt.delivered_for, "456");
                assert_eq!(receipt.message_ids, vec!["mid.1", "mid.2"]);
                assert_eq!(receipt.thread, ThreadKey::user("456"));
                assert_eq!(receipt.delivered_ts_ms, 1_600_000_000_500);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn read_receipt_prefers_explicit_actor() {
        let event = decode_one(json!({ "type": "delta", "delta": {
            "class": "ReadReceipt",
            "actorFbId": "789",
            "actionTimestampMs": 1600000001000_u64,
            "watermarkTimestampMs": 1600000000900_u64,
            "threadKey": { "threadFbId": "2000" }
        }}));
        match event {
            Event::ReadReceipt(receipt) => {
                assert_eq!(receipt.seen_by, "789");
                assert_eq!(receipt.seen_ts_ms, 1_600_000_001_000);
                assert_eq!(receipt.delivered_ts_ms, 1_600_000_000_900);
                assert_eq!(receipt.thread, ThreadKey::group("2000"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn mark_read_collects_thread_keys_and_honors_folder_scope() {
        let explicit = decode_one(json!({ "type": "delta", "delta": {
            "class": "MarkRead",
            "actionTimestamp": 10,
            "watermarkTimestamp": 9,
            "threadKeys": [
                { "threadFbId": "2000" },
                { "otherUserFbId": "456" }
            ]
        }}));
        match explicit {
            Event::ThreadsMarkedRead(marked) => {
                assert_eq!(
                    marked.threads,
                    vec![ThreadKey::group("2000"), ThreadKey::user("456")]
                );
                assert_eq!(marked.seen_ts_ms, 10);
                assert_eq!(marked.delivered_ts_ms, 9);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let folder_scoped = decode_one(json!({ "type": "delta", "delta": {
            "class": "MarkRead",
            "actionTimestampMs": 11,
            "watermarkTimestampMs": 10,
            "folders": ["inbox"]
        }}));
        match folder_scoped {
            Event::ThreadsMarkedRead(marked) => assert!(marked.threads.is_empty()),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn thread_key_resolution_failure_degrades_to_decode_failure() {
        let event = decode_one(json!({ "type": "delta", "delta": {
            "class": "NewMessage",
            "body": "hi",
            "messageMetadata": {
                "messageId": "mid.400",
                "actorFbId": "1",
                "timestamp": 6,
                "threadKey": { "somethingElse": "2000" }
            }
        }}));
        match event {
            Event::DecodeFailure(failure) => {
                assert!(failure.cause.contains("threadKey"), "cause: {}", failure.cause);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unmatched_delta_kind_is_unknown_not_failure() {
        let event = decode_one(json!({ "type": "delta", "delta": {
            "class": "ClientPayload",
            "payload": [1, 2, 3]
        }}));
        assert!(matches!(event, Event::Unknown(_)));
    }

    #[test]
    fn presence_maps_buddies_to_last_active() {
        let event = decode_one(json!({ "type": "chatproxy-presence", "buddyList": {
            "100": { "lat": 1600000000_u64 },
            "200": { "p": 0 }
        }}));
        match event {
            Event::PresenceUpdate(presence) => {
                assert_eq!(presence.buddy_list.len(), 2);
                assert_eq!(presence.buddy_list["100"], Some(1_600_000_000));
                assert_eq!(presence.buddy_list["200"], None);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn inbox_missing_counters_is_a_decode_failure() {
        let event = decode_one(json!({ "type": "inbox", "unseen": 1 }));
        assert!(matches!(event, Event::DecodeFailure(_)));
    }
}
