//! Risk classification for observed processes.
//!
//! Two deliberately separate strategies live here. `classify` serves the
//! process-table scan: it screens out processes with no capture signal
//! before any risk is assessed. `classify_attribution` serves the clipboard
//! and active-tool paths, where relevance is already established by the
//! observation itself and an unknown process is never downgraded below
//! `High`.

use crate::config::PolicyConfig;
use crate::event::RiskLevel;
use crate::probe::ObservedProcess;

/// Immutable classification policy, normalized to lowercase at build time.
///
/// Pure and deterministic: same identity in, same verdict out, no I/O.
#[derive(Debug, Clone)]
pub struct Classifier {
    whitelist: Vec<String>,
    blacklist: Vec<String>,
    indicators: Vec<String>,
}

impl Classifier {
    /// Build a classifier from a policy's vocabularies.
    #[must_use]
    pub fn new(policy: &PolicyConfig) -> Self {
        let lower = |items: &[String]| -> Vec<String> {
            items
                .iter()
                .map(|s| s.to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        };
        Self {
            whitelist: lower(&policy.whitelist),
            blacklist: lower(&policy.blacklist),
            indicators: lower(&policy.capture_indicators),
        }
    }

    /// Whether `name` exactly matches a trusted application.
    #[must_use]
    pub fn is_whitelisted(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.whitelist.iter().any(|w| *w == name)
    }

    /// Classify an observation from the process-table scan.
    ///
    /// Ordered, first match wins. `NotRelevant` means no capture indicator
    /// and no malicious pattern anywhere; such processes are dropped
    /// without further evaluation. A whitelisted name always wins over
    /// every escalation: trusted capture tools legitimately carry capture
    /// keywords in their own command lines.
    #[must_use]
    pub fn classify(&self, observed: &ObservedProcess) -> RiskLevel {
        let name = observed.name.to_lowercase();
        let exe = observed.exe_path.to_lowercase();
        let cmdline = observed.cmdline.join(" ").to_lowercase();

        let indicator_hit = |haystack: &str| self.indicators.iter().any(|k| haystack.contains(k.as_str()));
        let blacklist_hit = |haystack: &str| self.blacklist.iter().any(|k| haystack.contains(k.as_str()));

        let relevant = indicator_hit(&name)
            || indicator_hit(&exe)
            || indicator_hit(&cmdline)
            || blacklist_hit(&name)
            || blacklist_hit(&exe)
            || blacklist_hit(&cmdline);
        if !relevant {
            return RiskLevel::NotRelevant;
        }

        if self.whitelist.iter().any(|w| *w == name) {
            return RiskLevel::Safe;
        }

        if blacklist_hit(&name) || blacklist_hit(&exe) || blacklist_hit(&cmdline) {
            return RiskLevel::Critical;
        }

        if indicator_hit(&cmdline) || indicator_hit(&exe) {
            return RiskLevel::High;
        }

        if indicator_hit(&name) {
            return RiskLevel::Medium;
        }

        RiskLevel::Low
    }

    /// Classify a process already tied to a genuine capture observation.
    ///
    /// Relevance is given; the only questions left are trust and malice.
    /// An unknown binary attributed to a real capture floors at `High` and
    /// this path never returns `NotRelevant`.
    #[must_use]
    pub fn classify_attribution(&self, observed: &ObservedProcess) -> RiskLevel {
        let name = observed.name.to_lowercase();
        let exe = observed.exe_path.to_lowercase();
        let cmdline = observed.cmdline.join(" ").to_lowercase();

        if self.whitelist.iter().any(|w| *w == name) {
            return RiskLevel::Safe;
        }

        if self
            .blacklist
            .iter()
            .any(|k| name.contains(k.as_str()) || exe.contains(k.as_str()) || cmdline.contains(k.as_str()))
        {
            return RiskLevel::Critical;
        }

        RiskLevel::High
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::testing::proc;

    fn classifier() -> Classifier {
        Classifier::new(&PolicyConfig::default())
    }

    #[test]
    fn test_whitelisted_capture_tool_is_safe() {
        let c = classifier();
        let observed = proc(
            12346,
            "SnippingTool.exe",
            "C:\\Windows\\System32\\SnippingTool.exe",
            &["SnippingTool.exe"],
        );
        assert_eq!(c.classify(&observed), RiskLevel::Safe);
    }

    #[test]
    fn test_whitelist_is_case_insensitive() {
        let c = classifier();
        let observed = proc(1, "snippingtool.EXE", "", &[]);
        assert_eq!(c.classify(&observed), RiskLevel::Safe);
    }

    #[test]
    fn test_whitelist_wins_over_capture_cmdline() {
        // A trusted tool invoking itself with capture flags must not escalate.
        let c = classifier();
        let observed = proc(
            2,
            "ShareX.exe",
            "C:\\Program Files\\ShareX\\ShareX.exe",
            &["ShareX.exe", "--screenshot"],
        );
        assert_eq!(c.classify(&observed), RiskLevel::Safe);
    }

    #[test]
    fn test_blacklisted_name_is_critical() {
        let c = classifier();
        let observed = proc(12347, "keylogger.exe", "C:\\Temp\\keylogger.exe", &[]);
        assert_eq!(c.classify(&observed), RiskLevel::Critical);
    }

    #[test]
    fn test_blacklist_substring_in_path() {
        let c = classifier();
        let observed = proc(3, "svc.exe", "C:\\Users\\x\\stealer\\svc.exe", &[]);
        assert_eq!(c.classify(&observed), RiskLevel::Critical);
    }

    #[test]
    fn test_unknown_with_capture_cmdline_is_high() {
        let c = classifier();
        let observed = proc(
            12348,
            "unknown.exe",
            "C:\\Temp\\unknown.exe",
            &["unknown.exe", "--screenshot", "--capture"],
        );
        assert_eq!(c.classify(&observed), RiskLevel::High);
    }

    #[test]
    fn test_capture_indicator_in_name_only_is_medium() {
        let c = classifier();
        let observed = proc(4, "screenshot-helper.exe", "C:\\Apps\\helper.exe", &[]);
        assert_eq!(c.classify(&observed), RiskLevel::Medium);
    }

    #[test]
    fn test_unrelated_process_is_not_relevant() {
        let c = classifier();
        let observed = proc(
            12345,
            "Spotify.exe",
            "C:\\Users\\User\\AppData\\Roaming\\Spotify\\Spotify.exe",
            &["Spotify.exe"],
        );
        assert_eq!(c.classify(&observed), RiskLevel::NotRelevant);
    }

    #[test]
    fn test_indicator_in_exe_path_is_high() {
        let c = classifier();
        let observed = proc(5, "tool.exe", "C:\\screengrab\\tool.exe", &[]);
        assert_eq!(c.classify(&observed), RiskLevel::High);
    }

    #[test]
    fn test_attribution_whitelisted_is_safe() {
        let c = classifier();
        let observed = proc(6, "explorer.exe", "C:\\Windows\\explorer.exe", &[]);
        assert_eq!(c.classify_attribution(&observed), RiskLevel::Safe);
    }

    #[test]
    fn test_attribution_blacklisted_is_critical() {
        let c = classifier();
        let observed = proc(7, "spyware_host.exe", "C:\\Temp\\spyware_host.exe", &[]);
        assert_eq!(c.classify_attribution(&observed), RiskLevel::Critical);
    }

    #[test]
    fn test_attribution_unknown_floors_at_high() {
        let c = classifier();
        let observed = proc(8, "totally_normal.exe", "C:\\Temp\\totally_normal.exe", &[]);
        assert_eq!(c.classify_attribution(&observed), RiskLevel::High);
    }

    #[test]
    fn test_attribution_never_not_relevant() {
        let c = classifier();
        for name in ["a.exe", "Spotify.exe", "x", ""] {
            let observed = proc(9, name, "", &[]);
            assert_ne!(c.classify_attribution(&observed), RiskLevel::NotRelevant);
        }
    }

    #[test]
    fn test_empty_policy_entries_are_ignored() {
        let policy = PolicyConfig {
            whitelist: vec![String::new()],
            blacklist: vec![String::new()],
            capture_indicators: vec!["capture".to_string(), String::new()],
            ..PolicyConfig::default()
        };
        let c = Classifier::new(&policy);
        // An empty blacklist entry would otherwise match every string.
        let observed = proc(10, "Spotify.exe", "", &[]);
        assert_eq!(c.classify(&observed), RiskLevel::NotRelevant);
    }

    #[test]
    fn test_is_whitelisted() {
        let c = classifier();
        assert!(c.is_whitelisted("explorer.exe"));
        assert!(c.is_whitelisted("EXPLORER.EXE"));
        assert!(!c.is_whitelisted("explorer"));
    }
}
