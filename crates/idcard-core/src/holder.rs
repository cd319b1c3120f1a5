//! Holder: the person a card is issued to.
//!
//! Holder records belong to the organisation's directory; the card core only
//! ever reads them.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::card::HolderId;

/// Display attributes of a holder, as resolved from the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holder {
  pub holder_id:       HolderId,
  /// Organisation-issued identifier, e.g. a student or staff number.
  pub external_id:     String,
  pub name:            String,
  pub email:           Option<String>,
  pub phone:           Option<String>,
  pub photo:           Option<String>,
  pub class_name:      Option<String>,
  pub department_name: Option<String>,
}

/// Read-only lookup of holders by identifier.
pub trait HolderDirectory: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Resolve a holder. Returns `None` if the identifier is unknown.
  fn get_holder(
    &self,
    id: HolderId,
  ) -> impl Future<Output = Result<Option<Holder>, Self::Error>> + Send + '_;
}
