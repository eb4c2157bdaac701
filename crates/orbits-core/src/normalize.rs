//! Identifier normalization.
//!
//! Phone numbers and email addresses arrive in many shapes from the contact
//! directory and the message archive. Both sides are canonicalised through the
//! functions here before they are compared, so that `+1 (555) 123-4567`,
//! `15551234567` and `555-123-4567` all meet at `5551234567`.
//!
//! The canonical phone form is the 10-digit national number: a leading `1` is
//! dropped from 11-digit numbers and never added to 10-digit ones. Every index
//! and every lookup goes through [`normalize_phone`].

/// Strip everything but ASCII digits; drop the country digit from 11-digit
/// North American numbers. Short codes and foreign numbers pass through as
/// bare digits.
pub fn normalize_phone(raw: &str) -> String {
  let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
  match digits.strip_prefix('1') {
    Some(national) if digits.len() == 11 => national.to_owned(),
    _ => digits,
  }
}

/// Lowercase and trim an email address.
pub fn normalize_email(raw: &str) -> String { raw.trim().to_lowercase() }

/// Normalize a messaging handle: emails contain `@`, everything else is
/// treated as a phone number.
pub fn normalize_handle(raw: &str) -> String {
  if is_email(raw) {
    normalize_email(raw)
  } else {
    normalize_phone(raw)
  }
}

/// Whether a raw handle looks like an email address.
pub fn is_email(raw: &str) -> bool { raw.contains('@') }

/// Number of ASCII digits in `raw`.
pub fn digit_count(raw: &str) -> usize {
  raw.chars().filter(char::is_ascii_digit).count()
}
