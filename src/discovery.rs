//! Pattern-based discovery of resource references.
//!
//! Markup and stylesheets are scanned with a fixed set of regular expressions
//! rather than parsed. Each pattern captures the referenced value in group 1.
//! Callers depend on [`ReferenceScanner`], so a parser-backed scanner can
//! replace [`PatternScanner`] without touching the downloader.

use std::collections::BTreeSet;

use mime::Mime;
use regex::Regex;

/// Patterns applied to HTML pages, in scan order.
pub const PAGE_PATTERNS: [&str; 8] = [
    r#"src=['"]([^'"]*?)['"]"#,
    r#"href=['"]([^'"]*?)['"]"#,
    r#"url\(['"]?([^'"()]+)['"]?\)"#,
    r#"@import\s+['"]([^'"]+)['"]"#,
    r#"<script[^>]+src=['"]([^'"]+)['"]"#,
    r#"<link[^>]+href=['"]([^'"]+)['"]"#,
    r#"<img[^>]+src=['"]([^'"]+)['"]"#,
    r#"content=['"]([^'"]+\.(?:png|jpg|jpeg|gif|ico))['"]"#,
];

/// Patterns applied to fetched stylesheets.
pub const STYLESHEET_PATTERNS: [&str; 2] = [
    r#"url\(['"]?([^'"()]+)['"]?\)"#,
    r#"@import\s+['"]([^'"]+)['"]"#,
];

/// Finds candidate resource references in a block of text.
pub trait ReferenceScanner: Send + Sync {
    /// Returns every distinct reference literal found in `text`.
    fn scan(&self, text: &str) -> BTreeSet<String>;
}

#[derive(Debug, Clone)]
pub struct PatternScanner {
    patterns: Vec<Regex>,
}

impl PatternScanner {
    pub fn new(patterns: &[&str]) -> Self {
        let patterns = patterns
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect();
        Self { patterns }
    }

    /// Scanner for HTML pages: attributes, `url()`, `@import`, tag-scoped and meta image forms.
    pub fn page() -> Self {
        Self::new(&PAGE_PATTERNS)
    }

    /// Scanner for stylesheets: `url()` and `@import` only.
    pub fn stylesheet() -> Self {
        Self::new(&STYLESHEET_PATTERNS)
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }
}

impl ReferenceScanner for PatternScanner {
    fn scan(&self, text: &str) -> BTreeSet<String> {
        self.patterns
            .iter()
            .flat_map(|pattern| pattern.captures_iter(text))
            .filter_map(|cap| cap.get(1))
            .map(|m| m.as_str().to_string())
            .collect()
    }
}

fn guess_mime(path: &str) -> Option<Mime> {
    mime_guess::from_path(path).first()
}

/// True when `path` ends in a stylesheet extension.
pub fn is_stylesheet(path: &str) -> bool {
    guess_mime(path).is_some_and(|m| m == mime::TEXT_CSS)
}

/// True when `path` ends in a script extension.
pub fn is_script(path: &str) -> bool {
    guess_mime(path).is_some_and(|m| m.subtype() == mime::JAVASCRIPT)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html>
            <head>
                <meta property="og:image" content="/img/share.jpg">
                <link rel="stylesheet" href="/css/site.css">
                <script src='/js/app.js'></script>
                <style>@import "print.css"; .hero { background: url(/img/hero.png); }</style>
            </head>
            <body>
                <img src="/img/logo.png" alt="logo">
                <div style="background-image: url('/img/bg.jpg')"></div>
                <a href="/about">About</a>
            </body>
        </html>
    "#;

    #[test]
    fn test_all_patterns_compile() {
        assert_eq!(PatternScanner::page().pattern_count(), PAGE_PATTERNS.len());
        assert_eq!(
            PatternScanner::stylesheet().pattern_count(),
            STYLESHEET_PATTERNS.len()
        );
    }

    #[test]
    fn test_page_scan_finds_every_syntax() {
        let refs = PatternScanner::page().scan(PAGE);
        for expected in [
            "/img/share.jpg",
            "/css/site.css",
            "/js/app.js",
            "print.css",
            "/img/hero.png",
            "/img/logo.png",
            "/img/bg.jpg",
            "/about",
        ] {
            assert!(refs.contains(expected), "missing {expected} in {refs:?}");
        }
    }

    #[test]
    fn test_reference_matched_by_several_patterns_is_yielded_once() {
        // Matches src=, <img ...src= and nothing else, twice over.
        let html = r#"<img src="/a.png"><img class="x" src="/a.png">"#;
        let refs = PatternScanner::page().scan(html);
        assert_eq!(refs.len(), 1);
        assert!(refs.contains("/a.png"));
    }

    #[test]
    fn test_scan_is_idempotent() {
        let scanner = PatternScanner::page();
        assert_eq!(scanner.scan(PAGE), scanner.scan(PAGE));
    }

    #[test]
    fn test_stylesheet_scan_ignores_attributes() {
        let css = r#"
            @import 'fonts.css';
            body { background: url("../img/paper.png"); }
            .icon { background-image: url(icons/star.svg); }
            /* src="not-a-resource.png" */
        "#;
        let refs = PatternScanner::stylesheet().scan(css);
        let expected: BTreeSet<String> = ["fonts.css", "../img/paper.png", "icons/star.svg"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(refs, expected);
    }

    #[test]
    fn test_asset_kinds() {
        assert!(is_stylesheet("css/site.css"));
        assert!(is_stylesheet("/THEME.CSS"));
        assert!(!is_stylesheet("css/site.css?v=2"));
        assert!(!is_stylesheet("img/logo.png"));
        assert!(is_script("js/app.js"));
        assert!(!is_script("js/app.json"));
        assert!(!is_script("about"));
    }

    #[test]
    fn test_scan_of_plain_text_is_empty() {
        assert!(PatternScanner::page().scan("no references here").is_empty());
    }
}
