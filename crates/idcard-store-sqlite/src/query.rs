//! Compilation of typed filters and patches into SQL fragments with
//! positional bind values.

use idcard_core::{
  card::{CardPatch, Stamp},
  store::CardFilter,
};
use rusqlite::types::Value;

use crate::encode::{encode_card_type, encode_date, encode_dt, encode_status, opt_text, text};

/// A `WHERE` clause (possibly empty) and the values for its `?`
/// placeholders, in order.
#[derive(Debug, Clone, Default)]
pub struct CompiledFilter {
  pub clause: String,
  pub params: Vec<Value>,
}

/// Escape `%`, `_` and the escape character itself for a `LIKE ... ESCAPE '\'`
/// pattern.
pub fn escape_like(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for ch in s.chars() {
    if matches!(ch, '%' | '_' | '\\') {
      out.push('\\');
    }
    out.push(ch);
  }
  out
}

/// Compile `filter` against the `c` (cards) / `h` (holders) aliases.
pub fn compile_filter(filter: &CardFilter) -> CompiledFilter {
  let mut conds: Vec<&'static str> = Vec::new();
  let mut params = Vec::new();

  if let Some(search) = &filter.search {
    let pattern = format!("%{}%", escape_like(&search.to_lowercase()));
    conds.push(
      "(lower(c.card_number) LIKE ? ESCAPE '\\' \
        OR lower(h.name) LIKE ? ESCAPE '\\' \
        OR lower(h.external_id) LIKE ? ESCAPE '\\')",
    );
    params.extend(std::iter::repeat_n(text(pattern), 3));
  }
  if let Some(status) = filter.status {
    conds.push("c.status = ?");
    params.push(text(encode_status(status)));
  }
  if let Some(card_type) = filter.card_type {
    conds.push("c.card_type = ?");
    params.push(text(encode_card_type(card_type)));
  }

  let clause = if conds.is_empty() {
    String::new()
  } else {
    format!("WHERE {}", conds.join(" AND "))
  };
  CompiledFilter { clause, params }
}

/// `SET` assignments for the mutable columns present in `patch`, followed by
/// the update stamp. Returns `None` when the patch touches nothing.
pub fn compile_patch(patch: &CardPatch, stamp: &Stamp) -> Option<(String, Vec<Value>)> {
  let mut sets: Vec<&'static str> = Vec::new();
  let mut params = Vec::new();

  if let Some(t) = patch.card_type {
    sets.push("card_type = ?");
    params.push(text(encode_card_type(t)));
  }
  if let Some(d) = patch.valid_from {
    sets.push("valid_from = ?");
    params.push(text(encode_date(d)));
  }
  if let Some(d) = patch.valid_until {
    sets.push("valid_until = ?");
    params.push(text(encode_date(d)));
  }
  if let Some(s) = patch.status {
    sets.push("status = ?");
    params.push(text(encode_status(s)));
  }
  if let Some(n) = &patch.notes {
    sets.push("notes = ?");
    params.push(opt_text(n.clone()));
  }
  if let Some(p) = &patch.artifact_path {
    sets.push("artifact_path = ?");
    params.push(opt_text(p.clone()));
  }
  if let Some(at) = patch.generated_at {
    sets.push("generated_at = ?");
    params.push(opt_text(at.map(encode_dt)));
  }
  if let Some(by) = &patch.generated_by {
    sets.push("generated_by = ?");
    params.push(opt_text(by.as_ref().map(|a| a.as_str().to_owned())));
  }

  if sets.is_empty() {
    return None;
  }

  sets.push("updated_by = ?");
  params.push(text(stamp.actor.as_str()));
  sets.push("updated_at = ?");
  params.push(text(encode_dt(stamp.at)));

  Some((sets.join(", "), params))
}

/// `?, ?, ?` with `n` placeholders.
pub fn placeholders(n: usize) -> String { vec!["?"; n].join(", ") }
