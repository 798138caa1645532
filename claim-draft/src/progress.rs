//! Progress Calculator: completion percentage derived from a validation report.

use crate::claim::ClaimFormData;
use crate::validator::{FieldRules, ValidationReport, validate};

/// Completion of `form` as a whole percentage in `0..=100`.
pub fn progress(form: &ClaimFormData, rules: &FieldRules) -> u8 {
    progress_from_report(&validate(form, rules))
}

/// Same as [`progress`] when a report is already at hand.
pub fn progress_from_report(report: &ValidationReport) -> u8 {
    percent(report.required_completed(), report.required_total())
}

/// `round(100 * completed / total)` with halves rounded up; an empty requirement set is 100.
fn percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let completed = completed.min(total);
    let rounded = (200 * completed + total) / (2 * total);
    // completed <= total keeps this within 0..=100
    rounded.min(100) as u8
}
