use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::discovery::{is_script, is_stylesheet};
use crate::downloader::ResourceMapping;

/// Which references [`rewrite`] points at local copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteMode {
    /// Every mapped reference in `src=`, `href=` and `url(...)` form.
    ConvertLinks,
    /// Only stylesheet and script references, and only in `src=`/`href=` form.
    AssetsOnly,
}

impl RewriteMode {
    pub fn from_convert_links(convert_links: bool) -> Self {
        if convert_links {
            Self::ConvertLinks
        } else {
            Self::AssetsOnly
        }
    }
}

const REFERENCE_FORMS: &str = concat!(
    r#"(?P<attr>src|href)=(?:"(?P<attr_dq>[^"]*)"|'(?P<attr_sq>[^']*)')"#,
    "|",
    r#"url\((?:"(?P<url_dq>[^"]*)"|'(?P<url_sq>[^']*)'|(?P<url_bare>[^'"()]*))\)"#,
);

fn reference_forms() -> Option<&'static Regex> {
    static FORMS: OnceLock<Option<Regex>> = OnceLock::new();
    FORMS.get_or_init(|| Regex::new(REFERENCE_FORMS).ok()).as_ref()
}

/// Rewrites references found in `mapping` to `./<local path>`.
///
/// Only the exact forms `src="x"`, `src='x'`, `href="x"`, `href='x'`,
/// `url(x)`, `url('x')` and `url("x")` are touched, in a single pass, so a
/// replaced reference is never rewritten twice. Quote style is preserved;
/// a bare `url(x)` becomes `url("./local")`.
pub fn rewrite(page: &str, mapping: &ResourceMapping, mode: RewriteMode) -> String {
    if mapping.is_empty() {
        return page.to_string();
    }
    let Some(forms) = reference_forms() else {
        return page.to_string();
    };

    forms
        .replace_all(page, |caps: &Captures<'_>| {
            rewrite_match(caps, mapping, mode).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn rewrite_match(caps: &Captures<'_>, mapping: &ResourceMapping, mode: RewriteMode) -> Option<String> {
    if let Some(attr) = caps.name("attr") {
        let (value, quote) = match (caps.name("attr_dq"), caps.name("attr_sq")) {
            (Some(value), _) => (value.as_str(), '"'),
            (None, Some(value)) => (value.as_str(), '\''),
            (None, None) => return None,
        };
        if mode == RewriteMode::AssetsOnly && !is_asset(value) {
            return None;
        }
        let local = mapping.get(value)?;
        return Some(format!("{}={quote}./{local}{quote}", attr.as_str()));
    }

    if mode == RewriteMode::AssetsOnly {
        return None;
    }
    let (value, quote) = if let Some(value) = caps.name("url_dq") {
        (value.as_str(), '"')
    } else if let Some(value) = caps.name("url_sq") {
        (value.as_str(), '\'')
    } else {
        (caps.name("url_bare")?.as_str(), '"')
    };
    let local = mapping.get(value)?;
    Some(format!("url({quote}./{local}{quote})"))
}

fn is_asset(reference: &str) -> bool {
    is_stylesheet(reference) || is_script(reference)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(entries: &[(&str, &str)]) -> ResourceMapping {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_convert_links_rewrites_attributes() {
        let map = mapping(&[("a.png", "a.png"), ("/css/s.css", "css/s.css")]);
        let page = r#"<p>keep a.png text</p><img src="a.png"><link href="/css/s.css" rel="stylesheet">"#;

        let out = rewrite(page, &map, RewriteMode::ConvertLinks);

        assert!(out.contains(r#"src="./a.png""#), "got: {out}");
        assert!(out.contains(r#"href="./css/s.css""#), "got: {out}");
        assert!(out.contains("<p>keep a.png text</p>"));
        assert!(out.contains(r#"rel="stylesheet""#));
    }

    #[test]
    fn test_convert_links_rewrites_every_url_form() {
        let map = mapping(&[("/img/bg.png", "img/bg.png")]);
        let page = r#"a{background:url(/img/bg.png)} b{background:url('/img/bg.png')} c{background:url("/img/bg.png")}"#;

        let out = rewrite(page, &map, RewriteMode::ConvertLinks);

        assert_eq!(
            out,
            r#"a{background:url("./img/bg.png")} b{background:url('./img/bg.png')} c{background:url("./img/bg.png")}"#
        );
    }

    #[test]
    fn test_single_quoted_attributes_keep_their_quotes() {
        let map = mapping(&[("/js/app.js", "js/app.js")]);
        let out = rewrite("<script src='/js/app.js'></script>", &map, RewriteMode::ConvertLinks);
        assert_eq!(out, "<script src='./js/app.js'></script>");
    }

    #[test]
    fn test_assets_only_touches_stylesheets_and_scripts_in_attributes() {
        let map = mapping(&[
            ("/css/s.css", "css/s.css"),
            ("/js/app.js", "js/app.js"),
            ("/img/a.png", "img/a.png"),
            ("/img/bg.png", "img/bg.png"),
        ]);
        let page = concat!(
            r#"<link href="/css/s.css"><script src="/js/app.js"></script>"#,
            r#"<img src="/img/a.png"><div style="background:url(/img/bg.png)"></div>"#,
            r#"<style>@font-face{src:url("/css/s.css")}</style>"#,
        );

        let out = rewrite(page, &map, RewriteMode::AssetsOnly);

        assert!(out.contains(r#"href="./css/s.css""#), "got: {out}");
        assert!(out.contains(r#"src="./js/app.js""#), "got: {out}");
        assert!(out.contains(r#"src="/img/a.png""#), "got: {out}");
        assert!(out.contains("url(/img/bg.png)"), "got: {out}");
        assert!(out.contains(r#"url("/css/s.css")"#), "got: {out}");
    }

    #[test]
    fn test_unmapped_references_are_untouched() {
        let map = mapping(&[("/a.png", "a.png")]);
        let page = r#"<img src="/b.png"><img data-x="/a.png">"#;
        assert_eq!(rewrite(page, &map, RewriteMode::ConvertLinks), page);
    }

    #[test]
    fn test_rewritten_reference_is_not_rewritten_again() {
        let map = mapping(&[("a.png", "a.png"), ("./a.png", "other/a.png")]);
        let out = rewrite(r#"<img src="a.png">"#, &map, RewriteMode::ConvertLinks);
        assert_eq!(out, r#"<img src="./a.png">"#);
    }

    #[test]
    fn test_mode_from_flag() {
        assert_eq!(RewriteMode::from_convert_links(true), RewriteMode::ConvertLinks);
        assert_eq!(RewriteMode::from_convert_links(false), RewriteMode::AssetsOnly);
    }
}
