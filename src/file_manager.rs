use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use futures::{Stream, StreamExt};
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::error::MirrorError;
use crate::rate_limit::RateLimiter;
use crate::resolver::url_path;

/// Owns the on-disk layout of one mirror: every path handed out is relative
/// to `base_dir` and checked not to escape it.
#[derive(Debug, Clone)]
pub struct FileManager {
    base_dir: PathBuf,
}

impl FileManager {
    /// Creates `base_dir` if needed. An existing directory is not an error.
    pub fn new(base_dir: &Path) -> Result<Self, MirrorError> {
        let base_dir = base_dir.to_path_buf();
        fs::create_dir_all(&base_dir)
            .map_err(|e| MirrorError::directory_create(&base_dir, e))?;

        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Local path for a resource URL: the decoded URL path without its leading
    /// slash. A path ending in `/` is stored as `index.html` inside it.
    pub fn local_path(&self, url: &Url) -> Result<String, MirrorError> {
        let path = url_path(url);
        let mut relative = path.strip_prefix('/').unwrap_or(&path).to_string();
        if relative.is_empty() {
            return Err(MirrorError::invalid_path(url));
        }
        if relative.ends_with('/') {
            relative.push_str("index.html");
        }
        if !is_contained(&relative) {
            return Err(MirrorError::invalid_path(url));
        }
        Ok(relative)
    }

    pub fn full_path(&self, relative: &str) -> PathBuf {
        self.base_dir.join(relative)
    }

    /// Creates every parent directory of `relative` and returns its full path.
    ///
    /// A file already saved where a directory is needed (`/blog` then
    /// `/blog/pic.png`) is an [`MirrorError::Io`] for this path only. Any
    /// other failure is [`MirrorError::DirectoryCreate`].
    pub fn create_directories_for(&self, relative: &str) -> Result<PathBuf, MirrorError> {
        let path = self.full_path(relative);
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                return Err(match self.file_in_the_way(parent) {
                    Some(file) => MirrorError::io(file, e),
                    None => MirrorError::directory_create(parent, e),
                });
            }
        }
        Ok(path)
    }

    /// First existing non-directory between `base_dir` and `dir`.
    fn file_in_the_way(&self, dir: &Path) -> Option<PathBuf> {
        let relative = dir.strip_prefix(&self.base_dir).ok()?;
        let mut current = self.base_dir.clone();
        for component in relative.components() {
            current.push(component);
            match fs::metadata(&current) {
                Ok(meta) if meta.is_dir() => continue,
                Ok(_) => return Some(current),
                Err(_) => return None,
            }
        }
        None
    }

    /// Writes `content` to `relative`, creating parent directories.
    pub fn save_file(&self, relative: &str, content: &[u8]) -> Result<PathBuf, MirrorError> {
        let path = self.create_directories_for(relative)?;

        let mut file = fs::File::create(&path).map_err(|e| MirrorError::io(&path, e))?;
        file.write_all(content)
            .map_err(|e| MirrorError::io(&path, e))?;

        Ok(path)
    }

    /// Streams `body` into `path`, truncating any existing file.
    pub async fn write_stream<S, B, E>(
        &self,
        path: &Path,
        url: &Url,
        body: S,
        mut limiter: Option<RateLimiter>,
    ) -> Result<u64, MirrorError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        futures::pin_mut!(body);
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| MirrorError::io(path, e))?;

        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| MirrorError::resource_fetch(url, e))?;
            let bytes = chunk.as_ref();
            if let Some(limiter) = limiter.as_mut() {
                limiter.consume(bytes.len()).await;
            }
            file.write_all(bytes)
                .await
                .map_err(|e| MirrorError::io(path, e))?;
            written += bytes.len() as u64;
        }
        file.flush().await.map_err(|e| MirrorError::io(path, e))?;

        Ok(written)
    }

    /// Writes `content` to a throwaway probe file in the mirror directory,
    /// reads it back and reports whether it carries an HTML signature. The
    /// probe is removed before returning.
    pub fn probe_is_html(&self, content: &str) -> Result<bool, MirrorError> {
        let mut probe = tempfile::Builder::new()
            .prefix(".probe")
            .tempfile_in(&self.base_dir)
            .map_err(|e| MirrorError::io(&self.base_dir, e))?;
        probe
            .write_all(content.as_bytes())
            .map_err(|e| MirrorError::io(probe.path(), e))?;

        let written = fs::read(probe.path()).map_err(|e| MirrorError::io(probe.path(), e))?;
        Ok(looks_like_html(&String::from_utf8_lossy(&written)))
    }
}

/// True when `content` contains an opening `<html` tag or an HTML doctype.
pub fn looks_like_html(content: &str) -> bool {
    let lower = content.to_ascii_lowercase();
    lower.contains("<html") || lower.contains("<!doctype html")
}

/// True when `relative` only consists of plain file or directory names.
pub fn is_contained(relative: &str) -> bool {
    let path = Path::new(relative);
    path.components().next().is_some()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_file_manager_saves_nested_files() {
        let temp_dir = tempdir().unwrap();
        let file_manager = FileManager::new(temp_dir.path()).unwrap();

        let files: Vec<(&str, &[u8])> = vec![
            ("test1.txt", b"Content 1"),
            ("subdir/test2.txt", b"Content 2"),
            ("a/b/c/test3.html", b"<html>Content 3</html>"),
        ];

        for (path, content) in files {
            let saved_path = file_manager.save_file(path, content).unwrap();
            assert!(saved_path.exists(), "File {} was not created", path);
            assert_eq!(fs::read(&saved_path).unwrap(), content);
        }

        assert!(temp_dir.path().join("subdir").is_dir());
        assert!(temp_dir.path().join("a/b/c").is_dir());
    }

    #[test]
    fn test_new_accepts_existing_directory() {
        let temp_dir = tempdir().unwrap();
        FileManager::new(temp_dir.path()).unwrap();
        FileManager::new(temp_dir.path()).unwrap();
    }

    #[test]
    fn test_local_path_strips_leading_slash_and_query() {
        let temp_dir = tempdir().unwrap();
        let fm = FileManager::new(temp_dir.path()).unwrap();

        assert_eq!(
            fm.local_path(&url("http://example.test/css/site.css?v=3")).unwrap(),
            "css/site.css"
        );
        assert_eq!(
            fm.local_path(&url("http://example.test/img/my%20logo.png")).unwrap(),
            "img/my logo.png"
        );
        assert_eq!(
            fm.local_path(&url("http://example.test/docs/")).unwrap(),
            "docs/index.html"
        );
    }

    #[test]
    fn test_local_path_rejects_empty_and_escaping_paths() {
        let temp_dir = tempdir().unwrap();
        let fm = FileManager::new(temp_dir.path()).unwrap();

        let err = fm.local_path(&url("http://example.test")).unwrap_err();
        assert!(matches!(err, MirrorError::EmptyOrInvalidPath { .. }));

        let err = fm
            .local_path(&url("http://example.test/a/..%2F..%2Fsecret"))
            .unwrap_err();
        assert!(matches!(err, MirrorError::EmptyOrInvalidPath { .. }));
    }

    #[test]
    fn test_file_in_place_of_directory_is_not_fatal() {
        let temp_dir = tempdir().unwrap();
        let fm = FileManager::new(temp_dir.path()).unwrap();
        fm.save_file("blog", b"<!DOCTYPE html>").unwrap();

        let err = fm.create_directories_for("blog/pic.png").unwrap_err();
        assert!(matches!(err, MirrorError::Io { .. }), "got: {err:?}");
        assert!(!err.is_fatal());

        let err = fm.create_directories_for("blog/2024/pic.png").unwrap_err();
        assert!(matches!(err, MirrorError::Io { .. }), "got: {err:?}");
    }

    #[test]
    fn test_uncreatable_directory_is_fatal() {
        let temp_dir = tempdir().unwrap();
        let fm = FileManager::new(temp_dir.path()).unwrap();
        let too_long = format!("{}/pic.png", "d".repeat(300));

        let err = fm.create_directories_for(&too_long).unwrap_err();
        assert!(matches!(err, MirrorError::DirectoryCreate { .. }), "got: {err:?}");
        assert!(err.is_fatal());
    }

    #[test]
    fn test_is_contained() {
        assert!(is_contained("img/logo.png"));
        assert!(!is_contained(""));
        assert!(!is_contained("../secret"));
        assert!(!is_contained("img/../../secret"));
        assert!(!is_contained("/etc/passwd"));
    }

    #[test]
    fn test_looks_like_html() {
        assert!(looks_like_html("<!DOCTYPE html><title>x</title>"));
        assert!(looks_like_html("<!doctype html>"));
        assert!(looks_like_html("  <html lang=\"en\">"));
        assert!(!looks_like_html("{\"json\": true}"));
    }

    #[test]
    fn test_probe_leaves_no_artifact() {
        let temp_dir = tempdir().unwrap();
        let fm = FileManager::new(temp_dir.path()).unwrap();

        assert!(fm.probe_is_html("<!DOCTYPE html><p>hi</p>").unwrap());
        assert!(!fm.probe_is_html("plain text").unwrap());
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_write_stream_truncates_existing_file() {
        let temp_dir = tempdir().unwrap();
        let fm = FileManager::new(temp_dir.path()).unwrap();
        let target = fm.save_file("data.bin", b"old content that is long").unwrap();

        let chunks: Vec<Result<Vec<u8>, std::io::Error>> =
            vec![Ok(b"new ".to_vec()), Ok(b"bytes".to_vec())];
        let written = fm
            .write_stream(
                &target,
                &url("http://example.test/data.bin"),
                futures::stream::iter(chunks),
                None,
            )
            .await
            .unwrap();

        assert_eq!(written, 9);
        assert_eq!(fs::read(&target).unwrap(), b"new bytes");
    }
}
