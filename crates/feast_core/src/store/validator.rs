//! Validation hook run before a child commit becomes visible upward.

use crate::model::restaurant::StoredRestaurant;
use crate::store::events::LayerId;

/// Hook invoked on the validation lane when one of its direct children
/// is about to commit.
///
/// Returning `Err(reason)` rejects the child's commit; nothing merges and
/// no cascade starts.
pub trait SaveValidator: Send + Sync + 'static {
    fn validate_save(&self, child: LayerId, rows: &[StoredRestaurant]) -> Result<(), String>;
}

/// Default hook: accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopValidator;

impl SaveValidator for NoopValidator {
    fn validate_save(&self, _child: LayerId, _rows: &[StoredRestaurant]) -> Result<(), String> {
        Ok(())
    }
}
