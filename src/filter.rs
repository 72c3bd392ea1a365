/// Reference prefixes that never denote a fetchable resource.
const PSEUDO_URL_PREFIXES: [&str; 5] = ["data:", "#", "javascript:", "mailto:", "tel:"];

/// True for references that are never resolved or fetched.
pub fn should_skip_reference(reference: &str) -> bool {
    reference.is_empty()
        || reference == "/"
        || PSEUDO_URL_PREFIXES
            .iter()
            .any(|prefix| reference.starts_with(prefix))
}

/// Decides whether a URL path may be downloaded.
///
/// Reject rules are a substring denylist and always win. Exclude rules,
/// despite the name, act as a prefix allowlist once at least one is given:
/// the path must start with one of them to be admitted.
pub fn admit(url_path: &str, reject: &[String], exclude: &[String]) -> bool {
    if reject.iter().any(|rule| url_path.contains(rule.as_str())) {
        return false;
    }
    if !exclude.is_empty() {
        return exclude.iter().any(|rule| url_path.starts_with(rule.as_str()));
    }
    true
}

/// Reject and exclude rules for one mirror job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterRules {
    pub reject: Vec<String>,
    pub exclude: Vec<String>,
}

impl FilterRules {
    pub fn new(reject: Vec<String>, exclude: Vec<String>) -> Self {
        Self { reject, exclude }
    }

    pub fn admit(&self, url_path: &str) -> bool {
        admit(url_path, &self.reject, &self.exclude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_skip_pseudo_references() {
        for reference in [
            "",
            "/",
            "data:image/png;base64,AAAA",
            "#top",
            "javascript:void(0)",
            "mailto:me@example.test",
            "tel:+123456",
        ] {
            assert!(should_skip_reference(reference), "should skip {reference:?}");
        }
        for reference in ["/img/a.png", "style.css", "//cdn.example.test/x.js", "./"] {
            assert!(!should_skip_reference(reference), "should keep {reference:?}");
        }
    }

    #[test]
    fn test_admit_without_rules() {
        assert!(admit("/img/logo.png", &[], &[]));
    }

    #[test]
    fn test_reject_is_substring_denylist() {
        let reject = rules(&[".png", "tracking"]);
        assert!(!admit("/img/logo.png", &reject, &[]));
        assert!(!admit("/js/tracking/pixel.js", &reject, &[]));
        assert!(admit("/css/site.css", &reject, &[]));
    }

    #[test]
    fn test_exclude_is_prefix_allowlist() {
        let exclude = rules(&["/assets", "/css/"]);
        assert!(admit("/assets/app.js", &[], &exclude));
        assert!(admit("/css/site.css", &[], &exclude));
        assert!(!admit("/img/logo.png", &[], &exclude));
        assert!(!admit("/static/assets/app.js", &[], &exclude));
    }

    #[test]
    fn test_reject_wins_over_exclude() {
        let reject = rules(&[".js"]);
        let exclude = rules(&["/assets"]);
        assert!(!admit("/assets/app.js", &reject, &exclude));
        assert!(admit("/assets/app.css", &reject, &exclude));
    }

    #[test]
    fn test_admit_is_deterministic() {
        let filter = FilterRules::new(rules(&["gif"]), rules(&["/img"]));
        for path in ["/img/a.png", "/img/b.gif", "/other/c.png"] {
            assert_eq!(filter.admit(path), filter.admit(path));
            assert_eq!(filter.admit(path), admit(path, &filter.reject, &filter.exclude));
        }
    }
}
