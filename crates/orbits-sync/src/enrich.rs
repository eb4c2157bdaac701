//! Join directory contacts with message activity into person candidates.
//!
//! Message threads are indexed by normalized handle (individual threads only,
//! duplicates merged). Each directory contact is then looked up by its primary
//! phone, falling back to its primary email, and emitted as a
//! [`PersonCandidate`] unless it fails the eligibility filter.

use std::collections::{HashMap, HashSet};

use orbits_core::{
  contact::{ContactRecord, build_handle_index},
  message::{HandleActivity, MessageThreadStat},
  normalize::{digit_count, is_email, normalize_handle},
  person::PersonCandidate,
};

/// Phone numbers with fewer digits than this are not real contacts.
pub const MIN_PHONE_DIGITS: usize = 7;

/// Characters a phone number may be written with.
const PHONE_PUNCTUATION: &[char] = &['+', '-', '(', ')', '.', ' ', '#', '*'];

// ─── Activity index ──────────────────────────────────────────────────────────

/// Index individual threads by normalized handle, merging threads that
/// resolve to the same handle. Group threads are ignored.
pub fn build_activity_index(threads: &[MessageThreadStat]) -> HashMap<String, HandleActivity> {
  let mut index: HashMap<String, HandleActivity> = HashMap::new();

  for thread in threads {
    let Some(handle) = thread.individual_handle() else { continue };
    let key = normalize_handle(handle);
    if key.is_empty() {
      continue;
    }

    index
      .entry(key)
      .and_modify(|existing| existing.merge(thread))
      .or_insert_with(|| HandleActivity::from(thread));
  }

  index
}

// ─── Eligibility ─────────────────────────────────────────────────────────────

/// Why a contact was not synced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligible {
  PhoneTooShort,
  EmptyName,
  NameIsEmail,
  NameIsPhoneNumber,
  NameHasNoLetters,
  NameTooShort,
}

/// Reject contacts that are really a raw handle with no human-assigned name.
///
/// `identifier` is the contact's chosen identifier: its primary phone if it
/// has one, else its primary email.
pub fn check_eligibility(identifier: &str, display_name: &str) -> Result<(), Ineligible> {
  if !is_email(identifier) && digit_count(identifier) < MIN_PHONE_DIGITS {
    return Err(Ineligible::PhoneTooShort);
  }

  let name = display_name.trim();
  if name.is_empty() {
    return Err(Ineligible::EmptyName);
  }
  if is_email(name) {
    return Err(Ineligible::NameIsEmail);
  }
  if name.chars().any(|c| c.is_ascii_digit())
    && name
      .chars()
      .all(|c| c.is_ascii_digit() || PHONE_PUNCTUATION.contains(&c))
  {
    return Err(Ineligible::NameIsPhoneNumber);
  }
  if !name.chars().any(char::is_alphabetic) {
    return Err(Ineligible::NameHasNoLetters);
  }
  if name.chars().count() < 2 {
    return Err(Ineligible::NameTooShort);
  }
  Ok(())
}

// ─── Enrichment ──────────────────────────────────────────────────────────────

/// Candidates plus the counters describing how they were produced.
#[derive(Debug, Clone, Default)]
pub struct Enrichment {
  pub candidates:            Vec<PersonCandidate>,
  pub contacts_observed:     usize,
  pub skipped_ineligible:    usize,
  pub skipped_no_identifier: usize,
  pub threads_processed:     usize,
  /// Individual handles with message activity but no matching contact.
  pub unmatched_handles:     usize,
}

/// Build one candidate per eligible directory contact.
pub fn enrich(contacts: &[ContactRecord], threads: &[MessageThreadStat]) -> Enrichment {
  let activity = build_activity_index(threads);
  let handle_index = build_handle_index(contacts);

  let unmatched_handles = activity
    .keys()
    .filter(|handle| !handle_index.contains_key(handle.as_str()))
    .count();
  if unmatched_handles > 0 {
    tracing::debug!(unmatched_handles, "message handles without a matching contact");
  }

  let mut out = Enrichment {
    contacts_observed: contacts.len(),
    threads_processed: threads.len(),
    unmatched_handles,
    ..Default::default()
  };

  let mut seen = HashSet::new();
  for contact in contacts {
    if !seen.insert(contact.identifier.as_str()) {
      continue;
    }

    let phone = contact.primary_phone();
    let email = contact.primary_email();
    let Some(chosen) = phone.as_deref().or(email.as_deref()) else {
      out.skipped_no_identifier += 1;
      continue;
    };

    let display_name = contact.display_name();
    if let Err(reason) = check_eligibility(chosen, &display_name) {
      tracing::trace!(contact = %contact.identifier, ?reason, "contact not eligible");
      out.skipped_ineligible += 1;
      continue;
    }

    let found = phone
      .as_deref()
      .and_then(|p| activity.get(p))
      .or_else(|| email.as_deref().and_then(|e| activity.get(e)));

    out.candidates.push(PersonCandidate {
      contact_identifier: contact.identifier.clone(),
      phone,
      email,
      display_name,
      photo_hash: contact.photo_hash(),
      photo_available: contact.photo_available,
      unread_count: found.map_or(0, |a| a.unread_count),
      last_message_at: found.and_then(|a| a.last_message_at),
      conversation_guid: found.and_then(|a| a.conversation_guid.clone()),
      needs_response: found.and_then(|a| a.needs_response),
    });
  }

  let dropped = dedupe_candidates(&mut out.candidates);
  if dropped > 0 {
    tracing::error!(dropped, "duplicate contact identifiers survived enrichment");
  }

  out
}

/// Drop repeated contact identifiers, keeping the first. Returns how many
/// were dropped; anything above zero is a logic error upstream.
fn dedupe_candidates(candidates: &mut Vec<PersonCandidate>) -> usize {
  let before = candidates.len();
  let mut seen = HashSet::new();
  candidates.retain(|c| seen.insert(c.contact_identifier.clone()));
  before - candidates.len()
}

#[cfg(test)]
mod tests {
  use chrono::{DateTime, TimeZone, Utc};

  use super::*;

  fn at(secs: i64) -> Option<DateTime<Utc>> { Some(Utc.timestamp_opt(secs, 0).unwrap()) }

  fn thread(guid: &str, handles: &[&str], unread: bool, secs: i64) -> MessageThreadStat {
    MessageThreadStat {
      conversation_guid: Some(guid.into()),
      handles:           handles.iter().map(|h| h.to_string()).collect(),
      display_name:      None,
      is_group:          handles.len() != 1,
      has_unread:        unread,
      unread_count:      u32::from(unread),
      needs_response:    None,
      last_message_at:   at(secs),
    }
  }

  fn contact(id: &str, given: &str, phones: &[&str], emails: &[&str]) -> ContactRecord {
    ContactRecord {
      identifier: id.into(),
      given_name: given.into(),
      phone_numbers: phones.iter().map(|p| p.to_string()).collect(),
      email_addresses: emails.iter().map(|e| e.to_string()).collect(),
      ..Default::default()
    }
  }

  // ── Activity index ──────────────────────────────────────────────────────

  #[test]
  fn threads_for_the_same_handle_merge() {
    let threads = vec![
      thread("sms", &["+1 (555) 123-4567"], true, 1_000),
      thread("imessage", &["5551234567"], false, 2_000),
    ];
    let index = build_activity_index(&threads);

    assert_eq!(index.len(), 1);
    let merged = &index["5551234567"];
    assert!(merged.has_unread);
    assert_eq!(merged.last_message_at, at(2_000));
    assert_eq!(merged.conversation_guid.as_deref(), Some("sms"));
  }

  #[test]
  fn group_threads_are_not_indexed() {
    let threads = vec![thread("group", &["+15551234567", "a@example.com"], true, 1)];
    assert!(build_activity_index(&threads).is_empty());
  }

  // ── Eligibility ─────────────────────────────────────────────────────────

  #[test]
  fn numeric_names_are_rejected() {
    assert_eq!(
      check_eligibility("5551234567", "5551234567"),
      Err(Ineligible::NameIsPhoneNumber)
    );
    assert_eq!(
      check_eligibility("5551234567", "+1 (555) 123-4567"),
      Err(Ineligible::NameIsPhoneNumber)
    );
    assert_eq!(check_eligibility("5551234567", "!!"), Err(Ineligible::NameHasNoLetters));
  }

  #[test]
  fn short_real_names_are_accepted() {
    assert_eq!(check_eligibility("5551234567", "Jo"), Ok(()));
    assert_eq!(check_eligibility("5551234567", "J"), Err(Ineligible::NameTooShort));
    assert_eq!(check_eligibility("jo@example.com", "Zoë"), Ok(()));
  }

  #[test]
  fn email_names_and_short_phones_are_rejected() {
    assert_eq!(
      check_eligibility("5551234567", "jo@example.com"),
      Err(Ineligible::NameIsEmail)
    );
    assert_eq!(check_eligibility("12345", "Jo"), Err(Ineligible::PhoneTooShort));
    assert_eq!(check_eligibility("5551234567", "   "), Err(Ineligible::EmptyName));
  }

  // ── Enrichment ──────────────────────────────────────────────────────────

  #[test]
  fn contacts_pick_up_activity_by_phone_then_email() {
    let contacts = vec![
      contact("ada", "Ada", &["+1 555 123 4567"], &["ada@example.com"]),
      contact("bob", "Bob", &[], &["Bob@Example.com"]),
    ];
    let threads = vec![
      thread("ada-chat", &["+15551234567"], true, 1_000),
      thread("bob-chat", &["bob@example.com"], false, 2_000),
    ];

    let out = enrich(&contacts, &threads);
    assert_eq!(out.candidates.len(), 2);
    assert_eq!(out.threads_processed, 2);
    assert_eq!(out.unmatched_handles, 0);

    let ada = &out.candidates[0];
    assert_eq!(ada.phone.as_deref(), Some("5551234567"));
    assert_eq!(ada.unread_count, 1);
    assert_eq!(ada.conversation_guid.as_deref(), Some("ada-chat"));

    let bob = &out.candidates[1];
    assert_eq!(bob.email.as_deref(), Some("bob@example.com"));
    assert_eq!(bob.unread_count, 0);
    assert_eq!(bob.last_message_at, at(2_000));
  }

  #[test]
  fn ineligible_and_identifierless_contacts_are_counted() {
    let contacts = vec![
      contact("ok", "Jo", &["5551234567"], &[]),
      contact("short", "Shorty", &["12345"], &[]),
      ContactRecord {
        organization: "5559876543".into(),
        ..contact("raw", "", &["5559876543"], &[])
      },
      contact("none", "Nobody", &[], &[]),
    ];

    let out = enrich(&contacts, &[]);
    assert_eq!(out.contacts_observed, 4);
    assert_eq!(out.candidates.len(), 1);
    assert_eq!(out.candidates[0].contact_identifier, "ok");
    assert_eq!(out.skipped_ineligible, 2);
    assert_eq!(out.skipped_no_identifier, 1);
  }

  #[test]
  fn repeated_contact_identifiers_yield_one_candidate() {
    let contacts = vec![
      contact("dup", "First", &["5551234567"], &[]),
      contact("dup", "Second", &["5550000000"], &[]),
    ];
    let out = enrich(&contacts, &[]);
    assert_eq!(out.candidates.len(), 1);
    assert_eq!(out.candidates[0].display_name, "First");
  }

  #[test]
  fn unmatched_handles_are_counted() {
    let contacts = vec![contact("ada", "Ada", &["5551234567"], &[])];
    let threads = vec![thread("stranger", &["+15550001111"], true, 1)];
    let out = enrich(&contacts, &threads);
    assert_eq!(out.unmatched_handles, 1);
    assert_eq!(out.candidates[0].unread_count, 0);
  }
}
