//! Message-thread statistics read from the local message archive.
//!
//! Statistics are recomputed on every sync run and never persisted directly;
//! they are folded into [`Person`](crate::person::Person) rows by the
//! enrichment step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the archive reader aggregates messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
  /// One row per conversation, with its participant handles.
  #[default]
  Conversation,
  /// One row per raw handle, with an aggregate unread count and a
  /// needs-response flag.
  Handle,
}

/// Aggregate activity for one conversation, or for one handle in
/// [`QueryMode::Handle`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageThreadStat {
  /// Conversation GUID. In handle mode, the conversation holding the handle's
  /// most recent message.
  pub conversation_guid: Option<String>,
  /// Raw, unnormalized participant handles.
  pub handles:           Vec<String>,
  pub display_name:      Option<String>,
  pub is_group:          bool,
  pub has_unread:        bool,
  pub unread_count:      u32,
  /// Only derived in handle mode: the latest message is inbound.
  pub needs_response:    Option<bool>,
  pub last_message_at:   Option<DateTime<Utc>>,
}

impl MessageThreadStat {
  /// The sole participant of a one-to-one thread.
  pub fn individual_handle(&self) -> Option<&str> {
    match self.handles.as_slice() {
      [only] if !self.is_group => Some(only.as_str()),
      _ => None,
    }
  }
}

/// Message activity merged across every thread that resolves to the same
/// normalized handle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandleActivity {
  pub has_unread:        bool,
  pub unread_count:      u32,
  pub last_message_at:   Option<DateTime<Utc>>,
  pub conversation_guid: Option<String>,
  pub needs_response:    Option<bool>,
}

impl From<&MessageThreadStat> for HandleActivity {
  fn from(stat: &MessageThreadStat) -> Self {
    Self {
      has_unread:        stat.has_unread,
      unread_count:      stat.unread_count,
      last_message_at:   stat.last_message_at,
      conversation_guid: stat.conversation_guid.clone(),
      needs_response:    stat.needs_response,
    }
  }
}

impl HandleActivity {
  /// Fold another thread for the same handle into this one.
  ///
  /// Unread flags and needs-response flags are OR-ed, counts are summed, and
  /// the later activity time wins. The linked conversation switches to the
  /// incoming thread only when that thread is unread and this one is not.
  pub fn merge(&mut self, other: &MessageThreadStat) {
    let take_guid = self.conversation_guid.is_none()
      || (other.has_unread && !self.has_unread);
    if take_guid && other.conversation_guid.is_some() {
      self.conversation_guid = other.conversation_guid.clone();
    }

    self.has_unread |= other.has_unread;
    self.unread_count = self.unread_count.saturating_add(other.unread_count);
    self.last_message_at = self.last_message_at.max(other.last_message_at);
    self.needs_response = match (self.needs_response, other.needs_response) {
      (Some(a), Some(b)) => Some(a || b),
      (a, b) => a.or(b),
    };
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn stat(guid: &str, unread: bool, at: i64) -> MessageThreadStat {
    MessageThreadStat {
      conversation_guid: Some(guid.into()),
      handles:           vec!["+15551234567".into()],
      display_name:      None,
      is_group:          false,
      has_unread:        unread,
      unread_count:      u32::from(unread),
      needs_response:    None,
      last_message_at:   Some(Utc.timestamp_opt(at, 0).unwrap()),
    }
  }

  #[test]
  fn merge_ors_unread_and_keeps_latest_time() {
    let read = stat("chat-read", false, 2_000);
    let unread = stat("chat-unread", true, 1_000);

    let mut activity = HandleActivity::from(&read);
    activity.merge(&unread);

    assert!(activity.has_unread);
    assert_eq!(activity.unread_count, 1);
    assert_eq!(activity.last_message_at, read.last_message_at);
    assert_eq!(activity.conversation_guid.as_deref(), Some("chat-unread"));
  }

  #[test]
  fn merge_keeps_existing_guid_unless_incoming_is_newly_unread() {
    let mut activity = HandleActivity::from(&stat("first", true, 1_000));
    activity.merge(&stat("second", true, 3_000));
    assert_eq!(activity.conversation_guid.as_deref(), Some("first"));
    assert_eq!(activity.unread_count, 2);

    let mut activity = HandleActivity::from(&stat("first", false, 1_000));
    activity.merge(&stat("second", false, 3_000));
    assert_eq!(activity.conversation_guid.as_deref(), Some("first"));
    assert!(!activity.has_unread);
  }

  #[test]
  fn merge_handles_missing_times() {
    let mut a = stat("a", false, 0);
    a.last_message_at = None;
    let mut activity = HandleActivity::from(&a);
    activity.merge(&stat("b", false, 5_000));
    assert_eq!(activity.last_message_at, Some(Utc.timestamp_opt(5_000, 0).unwrap()));
  }

  #[test]
  fn group_threads_have_no_individual_handle() {
    let mut s = stat("g", false, 1);
    assert_eq!(s.individual_handle(), Some("+15551234567"));
    s.handles.push("friend@example.com".into());
    s.is_group = true;
    assert_eq!(s.individual_handle(), None);
  }
}
