//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`)
//! so that string order is chronological order. Dates are `YYYY-MM-DD`.
//! Enumerations use their lowercase names. UUIDs are stored as hyphenated
//! lowercase strings.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use idcard_core::{
  card::{ActorId, CardStatus, CardType, IdentityCard, StoredCard},
  holder::Holder,
};
use rusqlite::types::Value;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── NaiveDate ────────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Enumerations ─────────────────────────────────────────────────────────────

pub fn encode_status(s: CardStatus) -> &'static str {
  match s {
    CardStatus::Pending => "pending",
    CardStatus::Active => "active",
    CardStatus::Generated => "generated",
    CardStatus::Suspended => "suspended",
    CardStatus::Expired => "expired",
  }
}

pub fn decode_status(s: &str) -> Result<CardStatus> {
  CardStatus::from_str(s)
    .map_err(|_| Error::UnknownValue { column: "status", value: s.to_owned() })
}

pub fn encode_card_type(t: CardType) -> &'static str {
  match t {
    CardType::Student => "student",
    CardType::Staff => "staff",
    CardType::Visitor => "visitor",
  }
}

pub fn decode_card_type(s: &str) -> Result<CardType> {
  CardType::from_str(s)
    .map_err(|_| Error::UnknownValue { column: "card_type", value: s.to_owned() })
}

// ─── Bind values ─────────────────────────────────────────────────────────────

pub fn text(s: impl Into<String>) -> Value { Value::Text(s.into()) }

pub fn opt_text(s: Option<impl Into<String>>) -> Value {
  s.map_or(Value::Null, |s| Value::Text(s.into()))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawCard::from_row`]. Always used with
/// [`CARD_FROM`], which aliases the card table `c` and holders `h`.
pub const CARD_COLUMNS: &str = "
  c.id, c.holder_id, c.card_type, c.card_number, c.valid_from, c.valid_until,
  c.status, c.notes, c.artifact_path, c.created_by, c.updated_by,
  c.generated_by, c.created_at, c.updated_at, c.generated_at,
  h.holder_id, h.external_id, h.name, h.email, h.phone, h.photo,
  h.class_name, h.department_name";

pub const CARD_FROM: &str =
  "FROM identity_cards c LEFT JOIN holders h ON h.holder_id = c.holder_id";

/// Raw strings read directly from an `identity_cards` row joined with
/// `holders`.
pub struct RawCard {
  pub id:            String,
  pub holder_id:     String,
  pub card_type:     String,
  pub card_number:   String,
  pub valid_from:    String,
  pub valid_until:   String,
  pub status:        String,
  pub notes:         Option<String>,
  pub artifact_path: Option<String>,
  pub created_by:    String,
  pub updated_by:    Option<String>,
  pub generated_by:  Option<String>,
  pub created_at:    String,
  pub updated_at:    Option<String>,
  pub generated_at:  Option<String>,
  // holders join
  pub holder:        Option<RawHolder>,
}

impl RawCard {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    let holder_id: Option<String> = row.get(15)?;
    let holder = match holder_id {
      Some(holder_id) => Some(RawHolder {
        holder_id,
        external_id:     row.get(16)?,
        name:            row.get(17)?,
        email:           row.get(18)?,
        phone:           row.get(19)?,
        photo:           row.get(20)?,
        class_name:      row.get(21)?,
        department_name: row.get(22)?,
      }),
      None => None,
    };

    Ok(Self {
      id: row.get(0)?,
      holder_id: row.get(1)?,
      card_type: row.get(2)?,
      card_number: row.get(3)?,
      valid_from: row.get(4)?,
      valid_until: row.get(5)?,
      status: row.get(6)?,
      notes: row.get(7)?,
      artifact_path: row.get(8)?,
      created_by: row.get(9)?,
      updated_by: row.get(10)?,
      generated_by: row.get(11)?,
      created_at: row.get(12)?,
      updated_at: row.get(13)?,
      generated_at: row.get(14)?,
      holder,
    })
  }

  pub fn into_stored(self) -> Result<StoredCard> {
    let card = IdentityCard {
      id:            decode_uuid(&self.id)?,
      holder_id:     decode_uuid(&self.holder_id)?,
      card_type:     decode_card_type(&self.card_type)?,
      card_number:   self.card_number,
      valid_from:    decode_date(&self.valid_from)?,
      valid_until:   decode_date(&self.valid_until)?,
      status:        decode_status(&self.status)?,
      notes:         self.notes,
      artifact_path: self.artifact_path,
      created_by:    ActorId(self.created_by),
      updated_by:    self.updated_by.map(ActorId),
      generated_by:  self.generated_by.map(ActorId),
      created_at:    decode_dt(&self.created_at)?,
      updated_at:    self.updated_at.as_deref().map(decode_dt).transpose()?,
      generated_at:  self.generated_at.as_deref().map(decode_dt).transpose()?,
    };
    let holder = self.holder.map(RawHolder::into_holder).transpose()?;
    Ok(StoredCard { card, holder })
  }
}

/// Raw strings read directly from a `holders` row.
pub struct RawHolder {
  pub holder_id:       String,
  pub external_id:     String,
  pub name:            String,
  pub email:           Option<String>,
  pub phone:           Option<String>,
  pub photo:           Option<String>,
  pub class_name:      Option<String>,
  pub department_name: Option<String>,
}

impl RawHolder {
  pub fn into_holder(self) -> Result<Holder> {
    Ok(Holder {
      holder_id:       decode_uuid(&self.holder_id)?,
      external_id:     self.external_id,
      name:            self.name,
      email:           self.email,
      phone:           self.phone,
      photo:           self.photo,
      class_name:      self.class_name,
      department_name: self.department_name,
    })
  }
}
