use std::borrow::Cow;

use url::Url;

use crate::error::MirrorError;

/// Resolves `reference` against the page URL `base`.
///
/// References that already carry an `http`/`https` scheme come back as-is.
/// Everything else goes through standard reference resolution, so a rooted
/// path replaces the base path while scheme, host and port are kept.
pub fn resolve(base: &str, reference: &str) -> Result<Url, MirrorError> {
    let base = Url::parse(base).map_err(|e| MirrorError::parse(base, e))?;
    resolve_against(&base, reference)
}

/// Same as [`resolve`] with an already parsed base.
///
/// A protocol-relative `//host/x` follows RFC 3986 and names another host,
/// so it is not treated as a rooted path on the base host.
pub fn resolve_against(base: &Url, reference: &str) -> Result<Url, MirrorError> {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        Url::parse(reference).map_err(|e| MirrorError::parse(reference, e))
    } else {
        base.join(reference)
            .map_err(|e| MirrorError::parse(reference, e))
    }
}

/// True iff both URLs parse and their site hosts are byte-equal.
pub fn same_site(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(a), Ok(b)) => same_site_url(&a, &b),
        _ => false,
    }
}

pub fn same_site_url(a: &Url, b: &Url) -> bool {
    match (site_host(a), site_host(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Host plus explicit non-default port, e.g. `example.test` or `127.0.0.1:8080`.
///
/// This is both the same-site comparison key and the mirror directory name.
pub fn site_host(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Percent-decoded path of `url`, falling back to the raw path when the
/// decoded bytes are not UTF-8.
pub fn url_path(url: &Url) -> Cow<'_, str> {
    urlencoding::decode(url.path()).unwrap_or(Cow::Borrowed(url.path()))
}
