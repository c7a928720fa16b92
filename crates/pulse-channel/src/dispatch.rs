use anyhow::Result;
use tracing::{debug, warn};

use crate::types::{
    ChannelError, DecodeFailure, DeliveryReceipt, Event, InboxUpdate, NewMessage, NicknameChanged,
    ParticipantRemoved, ParticipantsAdded, PresenceUpdate, Primer, ReadReceipt, ThreadColorChanged,
    ThreadEmojiChanged, ThreadTitleChanged, ThreadsMarkedRead, UnknownEvent,
};

/// Trait contract for `EventHandler` behavior.
///
/// One callback per event kind. Every method has a passive default, so an
/// application implements only the kinds it cares about. Callbacks run
/// synchronously in the poll loop's execution context, in decode order; a
/// failing callback is isolated and routed through `on_listen_error`.
pub trait EventHandler: Send + Sync {
    /// Called once the channel is bootstrapped and the loop starts pulling.
    fn on_listening(&self) {
        debug!("listening");
    }

    /// Generic failure hook; the return value decides whether the loop keeps
    /// running. The default logs and continues.
    fn on_listen_error(&self, error: &ChannelError) -> bool {
        warn!(error = %error, "listen error ignored");
        true
    }

    fn on_message(&self, event: &NewMessage) -> Result<()> {
        debug!(?event, "unhandled message");
        Ok(())
    }

    fn on_participants_added(&self, event: &ParticipantsAdded) -> Result<()> {
        debug!(?event, "unhandled participant addition");
        Ok(())
    }

    fn on_participant_removed(&self, event: &ParticipantRemoved) -> Result<()> {
        debug!(?event, "unhandled participant removal");
        Ok(())
    }

    fn on_color_changed(&self, event: &ThreadColorChanged) -> Result<()> {
        debug!(?event, "unhandled color change");
        Ok(())
    }

    fn on_emoji_changed(&self, event: &ThreadEmojiChanged) -> Result<()> {
        debug!(?event, "unhandled emoji change");
        Ok(())
    }

    fn on_title_changed(&self, event: &ThreadTitleChanged) -> Result<()> {
        debug!(?event, "unhandled title change");
        Ok(())
    }

    fn on_nickname_changed(&self, event: &NicknameChanged) -> Result<()> {
        debug!(?event, "unhandled nickname change");
        Ok(())
    }

    fn on_message_delivered(&self, event: &DeliveryReceipt) -> Result<()> {
        debug!(?event, "unhandled delivery receipt");
        Ok(())
    }

    fn on_message_seen(&self, event: &ReadReceipt) -> Result<()> {
        debug!(?event, "unhandled read receipt");
        Ok(())
    }

    fn on_threads_marked_read(&self, event: &ThreadsMarkedRead) -> Result<()> {
        debug!(?event, "unhandled mark-read receipt");
        Ok(())
    }

    fn on_inbox_update(&self, event: &InboxUpdate) -> Result<()> {
        debug!(?event, "unhandled inbox update");
        Ok(())
    }

    fn on_presence_update(&self, event: &PresenceUpdate) -> Result<()> {
        debug!(buddies = event.buddy_list.len(), "unhandled presence update");
        Ok(())
    }

    fn on_primer(&self, event: &Primer) -> Result<()> {
        debug!(?event, "unhandled primer");
        Ok(())
    }

    fn on_unknown_event(&self, event: &UnknownEvent) -> Result<()> {
        debug!(raw = %event.raw, "unknown event kind");
        Ok(())
    }

    fn on_decode_failure(&self, event: &DecodeFailure) -> Result<()> {
        warn!(cause = %event.cause, "item failed to decode");
        Ok(())
    }
}

/// Routes one event to the matching handler callback.
pub fn dispatch(handler: &dyn EventHandler, event: &Event) -> Result<()> {
    match event {
        Event::NewMessage(payload) => handler.on_message(payload),
        Event::ParticipantsAdded(payload) => handler.on_participants_added(payload),
        Event::ParticipantRemoved(payload) => handler.on_participant_removed(payload),
        Event::ThreadColorChanged(payload) => handler.on_color_changed(payload),
        Event::ThreadEmojiChanged(payload) => handler.on_emoji_changed(payload),
        Event::ThreadTitleChanged(payload) => handler.on_title_changed(payload),
        Event::NicknameChanged(payload) => handler.on_nickname_changed(payload),
        Event::DeliveryReceipt(payload) => handler.on_message_delivered(payload),
        Event::ReadReceipt(payload) => handler.on_message_seen(payload),
        Event::ThreadsMarkedRead(payload) => handler.on_threads_marked_read(payload),
        Event::InboxUpdate(payload) => handler.on_inbox_update(payload),
        Event::PresenceUpdate(payload) => handler.on_presence_update(payload),
        Event::Primer(payload) => handler.on_primer(payload),
        Event::Unknown(payload) => handler.on_unknown_event(payload),
        Event::DecodeFailure(payload) => handler.on_decode_failure(payload),
    }
}

/// Dispatches a decoded batch in order. A failing callback never aborts the
/// remaining events; its error goes through `on_listen_error`, whose combined
/// verdict is returned as the keep-listening flag.
pub(crate) fn dispatch_batch(handler: &dyn EventHandler, events: &[Event]) -> bool {
    let mut keep_listening = true;
    for event in events {
        if let Err(error) = dispatch(handler, event) {
            keep_listening &= handler.on_listen_error(&ChannelError::Callback(error));
        }
    }
    keep_listening
}
