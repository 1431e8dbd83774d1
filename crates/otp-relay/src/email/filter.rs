//! Sender/subject filter applied to parsed emails.

use crate::config::FilterCriteria;

/// Compiled form of [`FilterCriteria`]. Comparisons are case-insensitive
/// substring matches; an empty criterion is always satisfied.
#[derive(Debug, Clone, Default)]
pub struct EmailFilter {
    sender: Option<String>,
    subject: Option<String>,
}

impl EmailFilter {
    pub fn new(criteria: &FilterCriteria) -> Self {
        Self {
            sender: normalize(&criteria.sender),
            subject: normalize(&criteria.subject),
        }
    }

    /// Returns true when nothing is configured.
    pub fn is_pass_through(&self) -> bool {
        self.sender.is_none() && self.subject.is_none()
    }

    pub fn matches(&self, sender: &str, subject: &str) -> bool {
        contains(&self.sender, sender) && contains(&self.subject, subject)
    }
}

fn normalize(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
}

fn contains(needle: &Option<String>, haystack: &str) -> bool {
    needle
        .as_deref()
        .map_or(true, |n| haystack.to_lowercase().contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(sender: &str, subject: &str) -> EmailFilter {
        EmailFilter::new(&FilterCriteria {
            sender: sender.to_string(),
            subject: subject.to_string(),
        })
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let f = filter("", "");
        assert!(f.is_pass_through());
        assert!(f.matches("anyone@example.com", "anything"));
        assert!(f.matches("", ""));
    }

    #[test]
    fn test_subject_only() {
        let f = filter("", "Login Code");
        assert!(!f.is_pass_through());
        assert!(f.matches("whoever@else.org", "Your login code is inside"));
        assert!(!f.matches("noreply@service.com", "Welcome"));
    }

    #[test]
    fn test_sender_only() {
        let f = filter("noreply@service.com", "");
        assert!(f.matches("Service <NoReply@Service.com>", "anything"));
        assert!(!f.matches("other@service.com", "anything"));
    }

    #[test]
    fn test_both_required() {
        let f = filter("service.com", "code");
        assert!(f.matches("a@service.com", "Your code"));
        assert!(!f.matches("a@service.com", "Newsletter"));
        assert!(!f.matches("a@other.com", "Your code"));
    }

    #[test]
    fn test_whitespace_only_criteria_ignored() {
        assert!(filter("  ", "\t").is_pass_through());
    }
}
