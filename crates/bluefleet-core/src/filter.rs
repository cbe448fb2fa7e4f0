// ── Device filter ──

use regex::Regex;

/// The fleet's device filter: a single pattern matched against a device's
/// address or resolved name. No pattern means every device is accepted.
///
/// The decision is a pure function of the pattern and its inputs — the
/// same device always gets the same answer.
#[derive(Debug, Clone, Default)]
pub struct DeviceFilter {
    pattern: Option<Regex>,
}

impl DeviceFilter {
    pub fn new(pattern: Option<Regex>) -> Self {
        Self { pattern }
    }

    pub fn matches(&self, address: &str, name: Option<&str>) -> bool {
        let Some(pattern) = &self.pattern else {
            return true;
        };
        pattern.is_match(address) || name.is_some_and(|n| pattern.is_match(n))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn no_pattern_accepts_everything() {
        let filter = DeviceFilter::default();
        assert!(filter.matches("EE0001", None));
    }

    #[test]
    fn matches_address_or_name() {
        let filter = DeviceFilter::new(Some(Regex::new("^DD.*$").unwrap()));
        assert!(filter.matches("DD0001", None));
        assert!(filter.matches("EE0001", Some("DD-badge")));
        assert!(!filter.matches("EE0001", Some("printer")));
        assert!(!filter.matches("EE0001", None));
    }

    #[test]
    fn decision_is_stable_across_calls() {
        let filter = DeviceFilter::new(Some(Regex::new("^DD.*$").unwrap()));
        let first = filter.matches("DD42", Some("x"));
        for _ in 0..10 {
            assert_eq!(filter.matches("DD42", Some("x")), first);
        }
    }
}
