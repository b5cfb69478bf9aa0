//! Last-write-wins conflict resolution

use cadence_core::SyncRecord;
use cadence_storage::DirtyRow;

/// What to do with a pulled row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// No local row: store the remote one
    Insert,
    /// Remote is as new or newer: overwrite local
    Overwrite,
    /// Remote equals the clean local row: nothing to do
    Skip,
    /// Local is strictly newer: keep it and queue it for push
    KeepLocal,
}

/// Compare a pulled row with the stored one by `updated_at`
///
/// Equal timestamps resolve in favour of the remote row.
pub fn resolve<T: SyncRecord>(local: Option<&DirtyRow<T>>, remote: &T) -> Resolution {
    let Some(local) = local else {
        return Resolution::Insert;
    };

    if remote.updated_at() < local.row.updated_at() {
        Resolution::KeepLocal
    } else if !local.is_dirty() && local.row == *remote {
        Resolution::Skip
    } else {
        Resolution::Overwrite
    }
}
