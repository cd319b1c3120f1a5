//! [`SqliteStore`]: the SQLite implementation of [`CardStore`] and
//! [`HolderDirectory`].

use std::path::Path;

use chrono::{DateTime, NaiveDate, SubsecRound as _, Utc};
use idcard_core::{
  card::{CardId, CardPatch, CardStatus, HolderId, IdentityCard, NewCard, Stamp, StoredCard},
  holder::{Holder, HolderDirectory},
  store::{
    CardFilter, CardStore, InsertOutcome, Page, PageRequest, Pagination, Statistics,
    UpdateOutcome,
  },
};
use rusqlite::{OptionalExtension as _, params_from_iter, types::Value};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    CARD_COLUMNS, CARD_FROM, RawCard, RawHolder, encode_card_type, encode_date, encode_dt,
    encode_status, encode_uuid, opt_text, text,
  },
  query::{compile_filter, compile_patch, placeholders},
  schema::SCHEMA,
};

fn is_unique_violation(err: &rusqlite::Error) -> bool {
  matches!(
    err,
    rusqlite::Error::SqliteFailure(e, _)
      if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
  )
}

fn current_status_values() -> impl Iterator<Item = Value> {
  CardStatus::CURRENT.into_iter().map(|s| text(encode_status(s)))
}

/// Whether card `?1` is current as of `?2`.
fn is_current_sql() -> String {
  format!(
    "SELECT EXISTS (
       SELECT 1 FROM identity_cards
       WHERE id = ?1 AND status IN ({}) AND valid_until >= ?2
     )",
    quoted_current()
  )
}

/// Whether the holder of card `?1` has some other card current as of `?2`.
fn other_current_sql() -> String {
  format!(
    "SELECT EXISTS (
       SELECT 1 FROM identity_cards c
       JOIN identity_cards o ON o.holder_id = c.holder_id AND o.id != c.id
       WHERE c.id = ?1 AND o.status IN ({}) AND o.valid_until >= ?2
     )",
    quoted_current()
  )
}

/// The current statuses as an inline SQL list.
fn quoted_current() -> String {
  CardStatus::CURRENT
    .into_iter()
    .map(|s| format!("'{}'", encode_status(s)))
    .collect::<Vec<_>>()
    .join(", ")
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// An identity-card store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. All calls
/// are serialised on the connection's thread, so each statement is atomic
/// with respect to every other caller.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Add a holder record. Holders are managed by the organisation directory;
  /// this exists for imports and fixtures.
  pub async fn insert_holder(&self, holder: &Holder) -> Result<()> {
    let external_id = holder.external_id.clone();
    let values = vec![
      text(encode_uuid(holder.holder_id)),
      text(holder.external_id.clone()),
      text(holder.name.clone()),
      opt_text(holder.email.clone()),
      opt_text(holder.phone.clone()),
      opt_text(holder.photo.clone()),
      opt_text(holder.class_name.clone()),
      opt_text(holder.department_name.clone()),
    ];

    let inserted = self
      .conn
      .call(move |conn| {
        let result = conn.execute(
          "INSERT INTO holders (
             holder_id, external_id, name, email, phone, photo,
             class_name, department_name
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          params_from_iter(values.iter()),
        );
        match result {
          Ok(_) => Ok(true),
          Err(e) if is_unique_violation(&e) => Ok(false),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    if inserted { Ok(()) } else { Err(Error::DuplicateHolder(external_id)) }
  }

  /// Run a card query (`tail` follows `SELECT ... FROM ...`) and decode rows.
  async fn query_cards(&self, tail: String, params: Vec<Value>) -> Result<Vec<StoredCard>> {
    let raws: Vec<RawCard> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!("SELECT {CARD_COLUMNS} {CARD_FROM} {tail}"))?;
        let rows = stmt
          .query_map(params_from_iter(params.iter()), RawCard::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCard::into_stored).collect()
  }
}

// ─── CardStore impl ──────────────────────────────────────────────────────────

impl CardStore for SqliteStore {
  type Error = Error;

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn list(&self, filter: &CardFilter, page: PageRequest) -> Result<Page<StoredCard>> {
    let compiled = compile_filter(filter);
    let limit = i64::from(page.page_size);
    let offset = i64::try_from(page.offset()).unwrap_or(i64::MAX);

    let (total, raws): (i64, Vec<RawCard>) = self
      .conn
      .call(move |conn| {
        // Count and page share one predicate and one snapshot.
        let tx = conn.transaction()?;
        let total: i64 = tx.query_row(
          &format!("SELECT COUNT(*) {CARD_FROM} {}", compiled.clause),
          params_from_iter(compiled.params.iter()),
          |r| r.get(0),
        )?;

        let mut page_params = compiled.params;
        page_params.push(Value::Integer(limit));
        page_params.push(Value::Integer(offset));

        let rows = {
          let mut stmt = tx.prepare(&format!(
            "SELECT {CARD_COLUMNS} {CARD_FROM} {}
             ORDER BY c.created_at DESC, c.id DESC
             LIMIT ? OFFSET ?",
            compiled.clause
          ))?;
          stmt
            .query_map(params_from_iter(page_params.iter()), RawCard::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        tx.commit()?;
        Ok((total, rows))
      })
      .await?;

    let items = raws.into_iter().map(RawCard::into_stored).collect::<Result<Vec<_>>>()?;
    Ok(Page { items, pagination: Pagination::new(page, total as u64) })
  }

  async fn get(&self, id: CardId) -> Result<Option<StoredCard>> {
    let mut cards = self
      .query_cards("WHERE c.id = ?".to_owned(), vec![text(encode_uuid(id))])
      .await?;
    Ok(cards.pop())
  }

  async fn active_for_holder(
    &self,
    holder_id: HolderId,
    today: NaiveDate,
  ) -> Result<Option<IdentityCard>> {
    let mut params = vec![text(encode_uuid(holder_id))];
    params.extend(current_status_values());
    params.push(text(encode_date(today)));

    let tail = format!(
      "WHERE c.holder_id = ?
         AND c.status IN ({})
         AND c.valid_until >= ?
       ORDER BY c.created_at DESC, c.id DESC
       LIMIT 1",
      placeholders(CardStatus::CURRENT.len())
    );
    let mut cards = self.query_cards(tail, params).await?;
    Ok(cards.pop().map(|s| s.card))
  }

  async fn card_number_exists(&self, number: &str, exclude: Option<CardId>) -> Result<bool> {
    let number = number.to_owned();
    let exclude = exclude.map(encode_uuid);

    let found = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM identity_cards
               WHERE card_number = ?1 AND (?2 IS NULL OR id != ?2)",
              rusqlite::params![number, exclude],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await?;
    Ok(found)
  }

  async fn statistics(&self, today: NaiveDate) -> Result<Statistics> {
    let today = encode_date(today);

    let counts: [i64; 7] = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT
             COUNT(*),
             COALESCE(SUM(status = 'pending'), 0),
             COALESCE(SUM(status = 'active'), 0),
             COALESCE(SUM(status = 'generated'), 0),
             COALESCE(SUM(status = 'suspended'), 0),
             COALESCE(SUM(status = 'expired'), 0),
             COALESCE(SUM(valid_until < ?1), 0)
           FROM identity_cards",
          rusqlite::params![today],
          |r| {
            Ok([r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?, r.get(6)?])
          },
        )?)
      })
      .await?;

    let [total, pending, active, generated, suspended, expired, expired_by_date] =
      counts.map(|n| n as u64);
    Ok(Statistics { total, pending, active, generated, suspended, expired, expired_by_date })
  }

  async fn list_by_status(&self, status: CardStatus) -> Result<Vec<StoredCard>> {
    self
      .query_cards(
        "WHERE c.status = ? ORDER BY c.created_at DESC, c.id DESC".to_owned(),
        vec![text(encode_status(status))],
      )
      .await
  }

  async fn expiring(&self, from: NaiveDate, until: NaiveDate) -> Result<Vec<StoredCard>> {
    self
      .query_cards(
        "WHERE c.status = ? AND c.valid_until BETWEEN ? AND ?
         ORDER BY c.valid_until ASC, c.id ASC"
          .to_owned(),
        vec![
          text(encode_status(CardStatus::Active)),
          text(encode_date(from)),
          text(encode_date(until)),
        ],
      )
      .await
  }

  async fn created_between(
    &self,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> Result<Vec<StoredCard>> {
    self
      .query_cards(
        "WHERE c.created_at BETWEEN ? AND ? ORDER BY c.created_at DESC, c.id DESC".to_owned(),
        vec![text(encode_dt(start)), text(encode_dt(end))],
      )
      .await
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn insert(&self, card: NewCard, today: NaiveDate) -> Result<InsertOutcome> {
    let record = IdentityCard {
      id:            Uuid::new_v4(),
      holder_id:     card.holder_id,
      card_type:     card.card_type,
      card_number:   card.card_number,
      valid_from:    card.valid_from,
      valid_until:   card.valid_until,
      status:        card.status,
      notes:         card.notes,
      artifact_path: None,
      created_by:    card.created_by,
      updated_by:    None,
      generated_by:  None,
      // Stored at microsecond precision.
      created_at:    Utc::now().trunc_subsecs(6),
      updated_at:    None,
      generated_at:  None,
    };

    let mut values = vec![
      text(encode_uuid(record.id)),
      text(encode_uuid(record.holder_id)),
      text(encode_card_type(record.card_type)),
      text(record.card_number.clone()),
      text(encode_date(record.valid_from)),
      text(encode_date(record.valid_until)),
      text(encode_status(record.status)),
      opt_text(record.notes.clone()),
      text(record.created_by.as_str()),
      text(encode_dt(record.created_at)),
      // NOT EXISTS guard
      text(encode_uuid(record.holder_id)),
    ];
    values.extend(current_status_values());
    values.push(text(encode_date(today)));

    let sql = format!(
      "INSERT INTO identity_cards (
         id, holder_id, card_type, card_number, valid_from, valid_until,
         status, notes, created_by, created_at
       )
       SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
       WHERE NOT EXISTS (
         SELECT 1 FROM identity_cards
         WHERE holder_id = ? AND status IN ({}) AND valid_until >= ?
       )",
      placeholders(CardStatus::CURRENT.len())
    );

    let changed: Option<usize> = self
      .conn
      .call(move |conn| match conn.execute(&sql, params_from_iter(values.iter())) {
        Ok(n) => Ok(Some(n)),
        Err(e) if is_unique_violation(&e) => {
          tracing::debug!(error = %e, "card number collided with the unique index");
          Ok(None)
        }
        Err(e) => Err(e.into()),
      })
      .await?;

    Ok(match changed {
      None => InsertOutcome::CardNumberTaken,
      Some(0) => InsertOutcome::HolderHasCurrentCard,
      Some(_) => InsertOutcome::Inserted(record),
    })
  }

  async fn update(&self, id: CardId, patch: CardPatch, stamp: Stamp) -> Result<UpdateOutcome> {
    let Some((sets, mut values)) = compile_patch(&patch, &stamp) else {
      return Ok(UpdateOutcome::Unchanged);
    };
    let id_str = encode_uuid(id);
    let today = encode_date(stamp.at.date_naive());
    values.push(text(id_str.clone()));

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let was_current: bool =
          tx.query_row(&is_current_sql(), rusqlite::params![id_str, today], |r| r.get(0))?;

        let changed = tx.execute(
          &format!("UPDATE identity_cards SET {sets} WHERE id = ?"),
          params_from_iter(values.iter()),
        )?;
        if changed == 0 {
          return Ok(UpdateOutcome::NotFound);
        }

        if !was_current {
          let now_current: bool =
            tx.query_row(&is_current_sql(), rusqlite::params![id_str, today], |r| r.get(0))?;
          let other: bool = tx.query_row(
            &other_current_sql(),
            rusqlite::params![id_str, today],
            |r| r.get(0),
          )?;
          if now_current && other {
            // Dropping the transaction rolls the write back.
            tracing::debug!(card_id = %id_str, "update refused: holder has a current card");
            return Ok(UpdateOutcome::HolderHasCurrentCard);
          }
        }

        tx.commit()?;
        Ok(UpdateOutcome::Updated)
      })
      .await?;
    Ok(outcome)
  }

  async fn delete(&self, id: CardId) -> Result<bool> {
    let id_str = encode_uuid(id);
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM identity_cards WHERE id = ?1", rusqlite::params![id_str])?)
      })
      .await?;
    Ok(changed > 0)
  }

  async fn bulk_set_status(
    &self,
    ids: &[CardId],
    status: CardStatus,
    from: &[CardStatus],
    stamp: Stamp,
  ) -> Result<u64> {
    if ids.is_empty() || from.is_empty() {
      return Ok(0);
    }

    let head = vec![
      text(encode_status(status)),
      text(stamp.actor.as_str()),
      text(encode_dt(stamp.at)),
    ];
    let sources: Vec<Value> = from.iter().map(|&s| text(encode_status(s))).collect();

    if !status.is_current() {
      let mut values = head;
      values.extend(ids.iter().map(|&id| text(encode_uuid(id))));
      values.extend(sources);
      let sql = format!(
        "UPDATE identity_cards SET status = ?, updated_by = ?, updated_at = ?
         WHERE id IN ({}) AND status IN ({})",
        placeholders(ids.len()),
        placeholders(from.len())
      );

      let changed = self
        .conn
        .call(move |conn| Ok(conn.execute(&sql, params_from_iter(values.iter()))?))
        .await?;
      return Ok(changed as u64);
    }

    // Activations run card by card inside one transaction, so a card made
    // current earlier in the batch blocks later cards of the same holder.
    let ids: Vec<String> = ids.iter().map(|&id| encode_uuid(id)).collect();
    let today = encode_date(stamp.at.date_naive());
    let sql = format!(
      "UPDATE identity_cards SET status = ?, updated_by = ?, updated_at = ?
       WHERE id = ? AND status IN ({})
         AND NOT EXISTS (
           SELECT 1 FROM identity_cards o
           WHERE o.holder_id = identity_cards.holder_id
             AND o.id != identity_cards.id
             AND o.status IN ({})
             AND o.valid_until >= ?
         )",
      placeholders(from.len()),
      placeholders(CardStatus::CURRENT.len())
    );

    let changed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut changed = 0;
        {
          let mut stmt = tx.prepare(&sql)?;
          for id in &ids {
            let mut row = head.clone();
            row.push(text(id.clone()));
            row.extend(sources.iter().cloned());
            row.extend(current_status_values());
            row.push(text(today.clone()));

            let n = stmt.execute(params_from_iter(row.iter()))?;
            if n == 0 {
              tracing::debug!(card_id = %id, "bulk activation skipped");
            }
            changed += n;
          }
        }
        tx.commit()?;
        Ok(changed)
      })
      .await?;
    Ok(changed as u64)
  }

  async fn bulk_delete(&self, ids: &[CardId]) -> Result<u64> {
    if ids.is_empty() {
      return Ok(0);
    }
    let values: Vec<Value> = ids.iter().map(|&id| text(encode_uuid(id))).collect();
    let sql = format!("DELETE FROM identity_cards WHERE id IN ({})", placeholders(ids.len()));

    let changed = self
      .conn
      .call(move |conn| Ok(conn.execute(&sql, params_from_iter(values.iter()))?))
      .await?;
    Ok(changed as u64)
  }
}

// ─── HolderDirectory impl ────────────────────────────────────────────────────

impl HolderDirectory for SqliteStore {
  type Error = Error;

  async fn get_holder(&self, id: HolderId) -> Result<Option<Holder>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawHolder> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT holder_id, external_id, name, email, phone, photo,
                      class_name, department_name
               FROM holders WHERE holder_id = ?1",
              rusqlite::params![id_str],
              |row| {
                Ok(RawHolder {
                  holder_id:       row.get(0)?,
                  external_id:     row.get(1)?,
                  name:            row.get(2)?,
                  email:           row.get(3)?,
                  phone:           row.get(4)?,
                  photo:           row.get(5)?,
                  class_name:      row.get(6)?,
                  department_name: row.get(7)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawHolder::into_holder).transpose()
  }
}
