//! Contact records as read from the local contact directory.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::normalize::{normalize_email, normalize_handle, normalize_phone};

/// Display name used when a contact has neither a personal nor an
/// organisation name.
pub const UNKNOWN_CONTACT: &str = "Unknown Contact";

/// A read-only snapshot of one directory contact.
///
/// `identifier` is assigned by the directory, never regenerated, and is the
/// natural key a [`Person`](crate::person::Person) is matched on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
  pub identifier:      String,
  pub given_name:      String,
  pub family_name:     String,
  pub organization:    String,
  /// Raw phone numbers in directory order.
  pub phone_numbers:   Vec<String>,
  /// Raw email addresses in directory order.
  pub email_addresses: Vec<String>,
  #[serde(skip)]
  pub photo:           Option<Vec<u8>>,
  pub photo_available: bool,
}

impl ContactRecord {
  /// Given and family name joined by a space, else the organisation, else
  /// [`UNKNOWN_CONTACT`].
  pub fn display_name(&self) -> String {
    let parts: Vec<&str> = [self.given_name.trim(), self.family_name.trim()]
      .into_iter()
      .filter(|p| !p.is_empty())
      .collect();

    if !parts.is_empty() {
      parts.join(" ")
    } else if !self.organization.trim().is_empty() {
      self.organization.trim().to_owned()
    } else {
      UNKNOWN_CONTACT.to_owned()
    }
  }

  /// First phone number, normalized. Empty normalizations count as absent.
  pub fn primary_phone(&self) -> Option<String> {
    self
      .phone_numbers
      .first()
      .map(|p| normalize_phone(p))
      .filter(|p| !p.is_empty())
  }

  /// First email address, normalized.
  pub fn primary_email(&self) -> Option<String> {
    self
      .email_addresses
      .first()
      .map(|e| normalize_email(e))
      .filter(|e| !e.is_empty())
  }

  /// SHA-256 hex digest of the photo bytes, if the contact has a photo.
  pub fn photo_hash(&self) -> Option<String> {
    self.photo.as_deref().map(photo_hash)
  }
}

/// SHA-256 hex digest of raw image bytes.
pub fn photo_hash(bytes: &[u8]) -> String {
  hex::encode(Sha256::digest(bytes))
}

/// Map every handle a contact owns, raw and normalized, to that contact.
///
/// Colliding keys are last-write-wins; a handle realistically belongs to one
/// contact.
pub fn build_handle_index(contacts: &[ContactRecord]) -> HashMap<String, &ContactRecord> {
  let mut index = HashMap::new();
  for contact in contacts {
    let handles = contact.phone_numbers.iter().chain(&contact.email_addresses);
    for raw in handles {
      index.insert(raw.clone(), contact);
      let normalized = normalize_handle(raw);
      if !normalized.is_empty() {
        index.insert(normalized, contact);
      }
    }
  }
  index
}

#[cfg(test)]
mod tests {
  use super::*;

  fn contact(given: &str, family: &str, org: &str) -> ContactRecord {
    ContactRecord {
      identifier: "ABC".into(),
      given_name: given.into(),
      family_name: family.into(),
      organization: org.into(),
      ..Default::default()
    }
  }

  #[test]
  fn display_name_fallbacks() {
    assert_eq!(contact("Ada", "Lovelace", "").display_name(), "Ada Lovelace");
    assert_eq!(contact("", "Lovelace", "").display_name(), "Lovelace");
    assert_eq!(contact("", "", "Analytical Co").display_name(), "Analytical Co");
    assert_eq!(contact("", "", "").display_name(), UNKNOWN_CONTACT);
  }

  #[test]
  fn primary_identifiers_are_normalized() {
    let mut c = contact("Ada", "", "");
    c.phone_numbers = vec!["+1 (555) 123-4567".into(), "555 000 1111".into()];
    c.email_addresses = vec![" ADA@Example.com".into()];
    assert_eq!(c.primary_phone().as_deref(), Some("5551234567"));
    assert_eq!(c.primary_email().as_deref(), Some("ada@example.com"));
  }

  #[test]
  fn photo_hash_is_sha256_hex() {
    let mut c = contact("Ada", "", "");
    assert_eq!(c.photo_hash(), None);
    c.photo = Some(b"abc".to_vec());
    assert_eq!(
      c.photo_hash().as_deref(),
      Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
    );
  }

  #[test]
  fn handle_index_holds_raw_and_normalized_forms() {
    let mut ada = contact("Ada", "", "");
    ada.identifier = "ada".into();
    ada.phone_numbers = vec!["+1 (555) 123-4567".into()];
    ada.email_addresses = vec!["Ada@Example.com".into()];

    let mut bob = contact("Bob", "", "");
    bob.identifier = "bob".into();
    bob.phone_numbers = vec!["555-123-4567".into()];

    let contacts = vec![ada, bob];
    let index = build_handle_index(&contacts);

    assert_eq!(index["+1 (555) 123-4567"].identifier, "ada");
    assert_eq!(index["Ada@Example.com"].identifier, "ada");
    assert_eq!(index["ada@example.com"].identifier, "ada");
    // Shared normalized number: last write wins.
    assert_eq!(index["5551234567"].identifier, "bob");
  }
}
