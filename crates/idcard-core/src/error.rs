//! Error types for `idcard-core`.

use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;

use crate::card::{CardId, CardStatus, HolderId};

/// Coarse classification used by outer layers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// Missing or malformed input.
  Validation,
  /// The request collides with existing state.
  Conflict,
  /// A card, holder, or artifact does not exist.
  NotFound,
  /// A backend did not answer in time; the caller may retry.
  Unavailable,
  /// A backend failed.
  Internal,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("field '{0}' is required")]
  MissingField(&'static str),

  #[error("valid_from ({from}) must be before valid_until ({until})")]
  InvalidValidityWindow { from: NaiveDate, until: NaiveDate },

  #[error("no valid fields to update")]
  EmptyPatch,

  #[error("no cards selected")]
  EmptySelection,

  #[error("unknown status: {0:?}")]
  UnknownStatus(String),

  #[error("unknown card type: {0:?}")]
  UnknownCardType(String),

  #[error("unknown bulk action: {0:?}")]
  UnknownBulkAction(String),

  #[error("bulk delete is disabled")]
  BulkDeleteDisabled,

  #[error("new cards must start as pending or active, not {0}")]
  InvalidInitialStatus(CardStatus),

  #[error("status generated requires a rendered artifact")]
  MissingArtifact,

  #[error("renewing an expired card requires a new valid_until")]
  RenewalWithoutNewExpiry,

  #[error("card number prefix must be two ASCII uppercase letters, got {0:?}")]
  InvalidCardNumberPrefix(String),

  #[error("invalid engine configuration: {0}")]
  InvalidConfig(&'static str),

  #[error("invalid date range: {from} is after {to}")]
  InvalidDateRange { from: NaiveDate, to: NaiveDate },

  #[error("cannot move card from {from} to {to}")]
  IllegalTransition { from: CardStatus, to: CardStatus },

  #[error("holder {0} already has an active identity card")]
  ActiveCardExists(HolderId),

  #[error("could not allocate a unique card number after {0} attempts")]
  CardNumberExhausted(u32),

  #[error("identity card not found: {0}")]
  CardNotFound(CardId),

  #[error("holder not found: {0}")]
  HolderNotFound(HolderId),

  #[error("generated identity card not found: {0}")]
  ArtifactNotFound(CardId),

  #[error("{op} did not respond within {limit:?}")]
  Timeout { op: &'static str, limit: Duration },

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("holder directory error: {0}")]
  Directory(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("renderer error: {0}")]
  Renderer(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::MissingField(_)
      | Self::InvalidValidityWindow { .. }
      | Self::EmptyPatch
      | Self::EmptySelection
      | Self::UnknownStatus(_)
      | Self::UnknownCardType(_)
      | Self::UnknownBulkAction(_)
      | Self::BulkDeleteDisabled
      | Self::InvalidInitialStatus(_)
      | Self::MissingArtifact
      | Self::RenewalWithoutNewExpiry
      | Self::InvalidCardNumberPrefix(_)
      | Self::InvalidConfig(_)
      | Self::InvalidDateRange { .. } => ErrorKind::Validation,
      Self::IllegalTransition { .. }
      | Self::ActiveCardExists(_)
      | Self::CardNumberExhausted(_) => ErrorKind::Conflict,
      Self::CardNotFound(_)
      | Self::HolderNotFound(_)
      | Self::ArtifactNotFound(_) => ErrorKind::NotFound,
      Self::Timeout { .. } => ErrorKind::Unavailable,
      Self::Store(_) | Self::Directory(_) | Self::Renderer(_) => {
        ErrorKind::Internal
      }
    }
  }

  pub fn is_retryable(&self) -> bool { self.kind() == ErrorKind::Unavailable }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
