use imara_diff::{Algorithm, Diff, InternedInput};

/// How a changed region relates to the baseline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

/// A contiguous changed region in current-content line numbers.
///
/// Ranges are half-open and 0-based. `Deleted` regions are zero-width:
/// `start_line == end_line` marks where the removed lines used to be.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineChange {
    pub kind: ChangeKind,
    pub start_line: usize,
    pub end_line: usize,
}

/// Ordered changes from one diff computation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiffResult {
    pub changes: Vec<LineChange>,
    pub has_changes: bool,
}

/// Line-level diff of document content against a caller-set baseline.
///
/// The baseline is set and cleared explicitly; it is never inferred
/// from the content passed to [`compute_diff`](Self::compute_diff).
/// Without a baseline every diff is empty, which is a valid state and
/// not an error.
#[derive(Debug, Default)]
pub struct DiffEngine {
    baseline: Option<String>,
}

impl DiffEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the baseline with `content`.
    pub fn set_baseline(&mut self, content: impl Into<String>) {
        self.baseline = Some(content.into());
    }

    pub fn clear_baseline(&mut self) {
        self.baseline = None;
    }

    #[must_use]
    pub fn has_baseline(&self) -> bool {
        self.baseline.is_some()
    }

    /// Diff `current` against the baseline.
    ///
    /// A removed run immediately followed by an added run is reported
    /// as one `Modified` region spanning the added lines; a removed
    /// run on its own becomes a zero-width `Deleted` region at the
    /// line where the removal happened.
    #[must_use]
    pub fn compute_diff(&self, current: &str) -> DiffResult {
        let Some(baseline) = self.baseline.as_deref() else {
            return DiffResult::default();
        };

        let input = InternedInput::new(baseline, current);
        let mut diff = Diff::compute(Algorithm::Histogram, &input);
        diff.postprocess_lines(&input);

        let mut changes = Vec::new();
        for hunk in diff.hunks() {
            let kind = match (hunk.before.is_empty(), hunk.after.is_empty()) {
                (false, false) => ChangeKind::Modified,
                (true, false) => ChangeKind::Added,
                (false, true) => ChangeKind::Deleted,
                (true, true) => continue,
            };
            let (start_line, end_line) = if kind == ChangeKind::Deleted {
                (hunk.after.start as usize, hunk.after.start as usize)
            } else {
                (hunk.after.start as usize, hunk.after.end as usize)
            };
            changes.push(LineChange {
                kind,
                start_line,
                end_line,
            });
        }

        DiffResult {
            has_changes: !changes.is_empty(),
            changes,
        }
    }
}
