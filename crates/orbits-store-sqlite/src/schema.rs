//! SQL schema for the Orbits SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Owned by the user; the sync engine only reads these.
CREATE TABLE IF NOT EXISTS orbit (
    id            TEXT PRIMARY KEY,
    user_id       TEXT NOT NULL,
    name          TEXT NOT NULL,
    interval_days INTEGER NOT NULL,
    slack_days    INTEGER NOT NULL DEFAULT 0,
    position      INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL,   -- ISO 8601 UTC
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS person (
    id                       TEXT PRIMARY KEY,
    user_id                  TEXT NOT NULL,
    contact_identifier       TEXT NOT NULL,   -- directory-assigned, immutable
    phone                    TEXT,
    email                    TEXT,
    display_name             TEXT NOT NULL,
    photo_hash               TEXT,
    photo_available          INTEGER NOT NULL DEFAULT 0,
    orbit_id                 TEXT REFERENCES orbit(id) ON DELETE SET NULL,
    unread_count             INTEGER NOT NULL DEFAULT 0,
    last_message_at          TEXT,
    conversation_guid        TEXT,
    needs_response           INTEGER NOT NULL DEFAULT 0,
    needs_response_marked_at TEXT,
    created_at               TEXT NOT NULL,
    updated_at               TEXT NOT NULL,
    UNIQUE (user_id, contact_identifier)
);

CREATE INDEX IF NOT EXISTS person_user_idx  ON person(user_id);
CREATE INDEX IF NOT EXISTS orbit_user_idx   ON orbit(user_id);

PRAGMA user_version = 1;
";

/// Column list shared by every `person` insert; parameters `?1..?16` follow
/// this order.
pub const INSERT_PERSON: &str = "
INSERT INTO person (
    id, user_id, contact_identifier, phone, email, display_name,
    photo_hash, photo_available, orbit_id, unread_count, last_message_at,
    conversation_guid, needs_response, needs_response_marked_at,
    created_at, updated_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
";

/// [`INSERT_PERSON`] that silently skips rows whose natural key is taken.
pub const INSERT_PERSON_IGNORING_CONFLICTS: &str = "
INSERT INTO person (
    id, user_id, contact_identifier, phone, email, display_name,
    photo_hash, photo_available, orbit_id, unread_count, last_message_at,
    conversation_guid, needs_response, needs_response_marked_at,
    created_at, updated_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
ON CONFLICT (user_id, contact_identifier) DO NOTHING
";

/// Point update by row id. Same parameter order as [`INSERT_PERSON`]; `?1`
/// selects the row and `?2`/`?3` are not rewritten.
pub const UPDATE_PERSON: &str = "
UPDATE person SET
    phone                    = ?4,
    email                    = ?5,
    display_name             = ?6,
    photo_hash               = ?7,
    photo_available          = ?8,
    orbit_id                 = ?9,
    unread_count             = ?10,
    last_message_at          = ?11,
    conversation_guid        = ?12,
    needs_response           = ?13,
    needs_response_marked_at = ?14,
    created_at               = ?15,
    updated_at               = ?16
WHERE id = ?1 AND user_id = ?2 AND contact_identifier = ?3
";

/// Person rows joined with their orbit. Append a `WHERE` clause.
pub const SELECT_PERSON: &str = "
SELECT
    p.id, p.user_id, p.contact_identifier, p.phone, p.email, p.display_name,
    p.photo_hash, p.photo_available, p.orbit_id, p.unread_count,
    p.last_message_at, p.conversation_guid, p.needs_response,
    p.needs_response_marked_at, p.created_at, p.updated_at,
    o.id, o.user_id, o.name, o.interval_days, o.slack_days, o.position,
    o.created_at, o.updated_at
FROM person p
LEFT JOIN orbit o ON o.id = p.orbit_id
";
