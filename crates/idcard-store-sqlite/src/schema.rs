//! SQL schema for the identity-card SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Owned by the organisation directory; read-only to the card core.
CREATE TABLE IF NOT EXISTS holders (
    holder_id       TEXT PRIMARY KEY,
    external_id     TEXT NOT NULL UNIQUE,   -- student / staff number
    name            TEXT NOT NULL,
    email           TEXT,
    phone           TEXT,
    photo           TEXT,
    class_name      TEXT,
    department_name TEXT
);

-- holder_id is not a foreign key; a dangling holder reads back as NULL.
CREATE TABLE IF NOT EXISTS identity_cards (
    id            TEXT PRIMARY KEY,
    holder_id     TEXT NOT NULL,
    card_type     TEXT NOT NULL CHECK (card_type IN ('student', 'staff', 'visitor')),
    card_number   TEXT NOT NULL,
    valid_from    TEXT NOT NULL,   -- YYYY-MM-DD
    valid_until   TEXT NOT NULL,   -- YYYY-MM-DD
    status        TEXT NOT NULL DEFAULT 'pending'
                  CHECK (status IN ('pending', 'active', 'generated', 'suspended', 'expired')),
    notes         TEXT,
    artifact_path TEXT,
    created_by    TEXT NOT NULL,
    updated_by    TEXT,
    generated_by  TEXT,
    created_at    TEXT NOT NULL,   -- RFC 3339 UTC, microsecond precision
    updated_at    TEXT,
    generated_at  TEXT,
    CHECK (valid_from < valid_until)
);

CREATE UNIQUE INDEX IF NOT EXISTS identity_cards_number_idx  ON identity_cards(card_number);
CREATE INDEX IF NOT EXISTS identity_cards_holder_idx        ON identity_cards(holder_id, status);
CREATE INDEX IF NOT EXISTS identity_cards_status_idx        ON identity_cards(status);
CREATE INDEX IF NOT EXISTS identity_cards_created_idx       ON identity_cards(created_at, id);
CREATE INDEX IF NOT EXISTS identity_cards_valid_until_idx   ON identity_cards(valid_until);

PRAGMA user_version = 1;
";
