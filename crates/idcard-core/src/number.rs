//! Card-number generation.
//!
//! A card number is a two-letter prefix, the four-digit issue year and a
//! random four-digit suffix in `0001..=9999`, e.g. `ID20250417`. Numbers are
//! not unique by construction; the store's unique index has the final word.

use rand_core::RngCore;

use crate::{Error, Result};

pub const SUFFIX_MAX: u32 = 9_999;

pub fn check_prefix(prefix: &str) -> Result<()> {
  if prefix.len() == 2 && prefix.bytes().all(|b| b.is_ascii_uppercase()) {
    Ok(())
  } else {
    Err(Error::InvalidCardNumberPrefix(prefix.to_owned()))
  }
}

/// Draw a candidate card number for `year`.
pub fn generate(prefix: &str, year: i32, rng: &mut impl RngCore) -> String {
  let suffix = rng.next_u32() % SUFFIX_MAX + 1;
  format!("{prefix}{year:04}{suffix:04}")
}
