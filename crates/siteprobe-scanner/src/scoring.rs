//! Scan and module scoring.
//!
//! Two scores coexist. Each module deducts a flat amount per issue from its
//! own category score, while the overall scan score weighs every issue by
//! severity. They are intentionally not reconciled.

use siteprobe_core::{Issue, Severity, Summary};

/// Per-issue deduction for the accessibility category.
pub const ACCESSIBILITY_DEDUCTION: u32 = 5;

/// Per-issue deduction for SEO, security and best practices.
pub const STANDARD_DEDUCTION: u32 = 10;

/// `max(0, 100 - sum of severity weights)`.
#[must_use]
pub fn overall_score<I>(severities: I) -> u8
where
    I: IntoIterator<Item = Severity>,
{
    let penalty: u32 = severities.into_iter().map(Severity::weight).sum();
    clamp_score(100u32.saturating_sub(penalty))
}

/// `max(0, 100 - issue_count * per_issue)`.
#[must_use]
pub fn flat_deduction(issue_count: usize, per_issue: u32) -> u8 {
    let count = u32::try_from(issue_count).unwrap_or(u32::MAX);
    clamp_score(100u32.saturating_sub(count.saturating_mul(per_issue)))
}

/// Convert an engine score in `0.0..=1.0` to `0..=100`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn from_fraction(score: f64) -> u8 {
    if score.is_nan() {
        return 0;
    }
    (score.clamp(0.0, 1.0) * 100.0).round() as u8
}

/// Summary of a finished scan.
///
/// `completed_tests` counts every module that was invoked, including ones
/// whose test run failed; those are also counted in `failed_tests`.
#[must_use]
pub fn summarize(issues: &[Issue], total_tests: u32, failed_tests: u32) -> Summary {
    let count = |pred: fn(&Issue) -> bool| {
        u32::try_from(issues.iter().filter(|i| pred(i)).count()).unwrap_or(u32::MAX)
    };

    Summary {
        total_issues: count(|_| true),
        critical_issues: count(|i| i.severity().is_critical_or_high()),
        overall_score: overall_score(issues.iter().map(Issue::severity)),
        completed_tests: total_tests,
        total_tests,
        failed_tests,
        error: None,
    }
}

fn clamp_score(value: u32) -> u8 {
    u8::try_from(value.min(100)).unwrap_or(100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use siteprobe_core::{Category, IssueDraft, IssueLocation, ScanId};

    fn issue(severity: Severity) -> Issue {
        let draft = IssueDraft::new(
            "Issue",
            "desc",
            severity,
            IssueLocation::page("https://example.com"),
            "fix",
        )
        .expect("valid draft");
        Issue::from_draft(
            ScanId::new("scan-1").expect("valid id"),
            "run-1",
            Category::Seo,
            draft,
        )
    }

    #[test]
    fn test_overall_score_empty_is_perfect() {
        assert_eq!(overall_score(std::iter::empty()), 100);
    }

    #[test]
    fn test_overall_score_weights() {
        let severities = [
            Severity::High,
            Severity::High,
            Severity::High,
            Severity::Medium,
            Severity::Medium,
            Severity::Medium,
            Severity::Medium,
        ];
        assert_eq!(overall_score(severities), 50);
        assert_eq!(overall_score([Severity::Critical, Severity::Low]), 78);
    }

    #[test]
    fn test_overall_score_floors_at_zero() {
        assert_eq!(overall_score(vec![Severity::Critical; 6]), 0);
    }

    #[test]
    fn test_flat_deduction() {
        assert_eq!(flat_deduction(0, STANDARD_DEDUCTION), 100);
        assert_eq!(flat_deduction(3, STANDARD_DEDUCTION), 70);
        assert_eq!(flat_deduction(4, ACCESSIBILITY_DEDUCTION), 80);
        assert_eq!(flat_deduction(25, ACCESSIBILITY_DEDUCTION), 0);
        assert_eq!(flat_deduction(usize::MAX, STANDARD_DEDUCTION), 0);
    }

    #[test]
    fn test_from_fraction() {
        assert_eq!(from_fraction(0.87), 87);
        assert_eq!(from_fraction(1.0), 100);
        assert_eq!(from_fraction(1.7), 100);
        assert_eq!(from_fraction(-0.2), 0);
        assert_eq!(from_fraction(f64::NAN), 0);
    }

    #[test]
    fn test_summarize_counts_critical_and_high() {
        let issues = vec![
            issue(Severity::Critical),
            issue(Severity::High),
            issue(Severity::Medium),
            issue(Severity::Low),
        ];
        let summary = summarize(&issues, 5, 1);

        assert_eq!(summary.total_issues, 4);
        assert_eq!(summary.critical_issues, 2);
        assert_eq!(summary.overall_score, 100 - 20 - 10 - 5 - 2);
        assert_eq!(summary.completed_tests, 5);
        assert_eq!(summary.total_tests, 5);
        assert_eq!(summary.failed_tests, 1);
        assert!(summary.error.is_none());
    }
}
