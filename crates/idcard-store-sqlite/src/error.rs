//! Error type for `idcard-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown {column} value in database: {value:?}")]
  UnknownValue { column: &'static str, value: String },

  #[error("holder {0} already exists")]
  DuplicateHolder(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
