//! Tunables for the lifecycle engine.

use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result};

/// What the `delete` bulk action does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkDeletePolicy {
  /// Reject `delete` as a bulk action.
  #[default]
  Disabled,
  /// Permanently remove every selected card.
  HardDelete,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Two uppercase letters that start every card number.
  pub card_number_prefix:   String,
  /// How many numbers to try before giving up on a collision streak.
  pub card_number_attempts: u32,
  pub store_timeout_ms:     u64,
  /// Upper bound for one render or artifact fetch.
  pub render_timeout_ms:    u64,
  /// Width of the "expiring soon" window, in days.
  pub expiring_soon_days:   u32,
  pub default_page_size:    u32,
  pub max_page_size:        u32,
  pub bulk_delete:          BulkDeletePolicy,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      card_number_prefix:   "ID".to_owned(),
      card_number_attempts: 5,
      store_timeout_ms:     5_000,
      render_timeout_ms:    30_000,
      expiring_soon_days:   30,
      default_page_size:    10,
      max_page_size:        100,
      bulk_delete:          BulkDeletePolicy::default(),
    }
  }
}

impl EngineConfig {
  pub fn store_timeout(&self) -> Duration {
    Duration::from_millis(self.store_timeout_ms)
  }

  pub fn render_timeout(&self) -> Duration {
    Duration::from_millis(self.render_timeout_ms)
  }

  /// Check values that would otherwise only fail at first use.
  pub fn validate(&self) -> Result<()> {
    crate::number::check_prefix(&self.card_number_prefix)?;
    if self.card_number_attempts == 0 {
      return Err(Error::InvalidConfig("card_number_attempts must be at least 1"));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn zero_number_attempts_is_a_config_error() {
    let config = EngineConfig { card_number_attempts: 0, ..EngineConfig::default() };
    let err = config.validate().unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
    assert_eq!(err.kind(), crate::ErrorKind::Validation);
  }

  #[test]
  fn bad_prefix_is_rejected() {
    let config = EngineConfig { card_number_prefix: "id".into(), ..EngineConfig::default() };
    assert!(matches!(config.validate(), Err(Error::InvalidCardNumberPrefix(_))));
    assert!(EngineConfig::default().validate().is_ok());
  }
}
