use serde::{Deserialize, Serialize};

/// Counts for one legacy collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryReport {
    pub total: usize,
    pub migrated: usize,
    pub failed: usize,
}

impl CategoryReport {
    pub fn record(&mut self, ok: bool) {
        if ok {
            self.migrated += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Outcome of a migration run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    /// True only if no record of any collection failed
    pub success: bool,
    pub favorites: CategoryReport,
    pub play_history: CategoryReport,
    pub playlists: CategoryReport,
    /// One message per failed record or unreadable collection
    pub errors: Vec<String>,
}

impl MigrationReport {
    pub fn total(&self) -> usize {
        self.favorites.total + self.play_history.total + self.playlists.total
    }

    pub fn migrated(&self) -> usize {
        self.favorites.migrated + self.play_history.migrated + self.playlists.migrated
    }

    pub fn failed(&self) -> usize {
        self.favorites.failed + self.play_history.failed + self.playlists.failed
    }

    /// User-facing summary: counts plus the first `max_errors` messages
    pub fn summary(&self, max_errors: usize) -> String {
        let mut summary = format!(
            "Migrated {} of {} records ({} failed)",
            self.migrated(),
            self.total(),
            self.failed()
        );

        for error in self.errors.iter().take(max_errors) {
            summary.push_str("\n  - ");
            summary.push_str(error);
        }

        let hidden = self.errors.len().saturating_sub(max_errors);
        if hidden > 0 {
            summary.push_str(&format!("\n  ... and {hidden} more"));
        }
        summary
    }
}
