//! In-memory template cache.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{fill, TemplateError, TemplateKind};

/// Process-wide cache, set by the first successful [`TemplateCache::init`].
static CACHE: Mutex<Option<Arc<TemplateCache>>> = Mutex::new(None);

/// Raw template files loaded from a base directory, keyed by path.
#[derive(Debug, Clone)]
pub struct TemplateCache {
    dir: PathBuf,
    files: HashMap<PathBuf, Vec<u8>>,
}

impl TemplateCache {
    /// Initialize the process-wide cache from `dir`.
    ///
    /// Only the first successful call walks the directory; later calls return
    /// that same cache and ignore their `dir` argument, even when it differs.
    pub fn init(dir: impl AsRef<Path>) -> Result<Arc<TemplateCache>, TemplateError> {
        let mut guard = CACHE.lock();
        if let Some(ref cache) = *guard {
            return Ok(Arc::clone(cache));
        }

        let cache = Arc::new(Self::load(dir)?);
        *guard = Some(Arc::clone(&cache));
        Ok(cache)
    }

    /// The process-wide cache, if [`init`](Self::init) has run.
    pub fn global() -> Option<Arc<TemplateCache>> {
        CACHE.lock().clone()
    }

    /// Walk `dir` recursively and load every regular `.html` file.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let dir = dir.as_ref().to_path_buf();
        let mut files = HashMap::new();
        walk(&dir, &mut files)?;

        tracing::info!(
            templates = files.len(),
            base_dir = %dir.display(),
            "Template cache initialized"
        );

        Ok(Self { dir, files })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Raw contents of a cached file.
    pub fn get(&self, path: impl AsRef<Path>) -> Option<&[u8]> {
        self.files.get(path.as_ref()).map(Vec::as_slice)
    }

    /// Path of the template file mapped to `kind`.
    pub fn path_for(&self, kind: TemplateKind) -> Result<PathBuf, TemplateError> {
        kind.file_name()
            .map(|name| self.dir.join(name))
            .ok_or(TemplateError::NotFound { kind, path: None })
    }

    /// Template text for `kind`.
    pub fn source(&self, kind: TemplateKind) -> Result<&str, TemplateError> {
        let path = self.path_for(kind)?;
        let bytes = self.get(&path).ok_or_else(|| TemplateError::NotFound {
            kind,
            path: Some(path.clone()),
        })?;
        std::str::from_utf8(bytes).map_err(|_| TemplateError::InvalidEncoding {
            path: path.display().to_string(),
        })
    }

    /// Fill the placeholders of the `kind` template with `args`.
    pub fn render(&self, kind: TemplateKind, args: &[&str]) -> Result<String, TemplateError> {
        fill(self.source(kind)?, args)
    }

    /// Place a rendered fragment inside the layout template.
    pub fn wrap_in_layout(&self, fragment: &str) -> Result<String, TemplateError> {
        self.render(TemplateKind::Layout, &[fragment])
    }
}

fn walk(dir: &Path, files: &mut HashMap<PathBuf, Vec<u8>>) -> Result<(), TemplateError> {
    let io_err = |path: &Path| {
        let path = path.display().to_string();
        move |source| TemplateError::Io { path, source }
    };

    for entry in fs::read_dir(dir).map_err(io_err(dir))? {
        let entry = entry.map_err(io_err(dir))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(io_err(&path))?;

        if file_type.is_dir() {
            walk(&path, files)?;
        } else if file_type.is_file() && path.extension().is_some_and(|ext| ext == "html") {
            let contents = fs::read(&path).map_err(io_err(&path))?;
            files.insert(path, contents);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_loads_only_html_files_recursively() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "layout.html", "<html>%s</html>");
        write(tmp.path(), "partials/footer.html", "<footer/>");
        write(tmp.path(), "notes.txt", "ignored");

        let cache = TemplateCache::load(tmp.path()).unwrap();
        assert_eq!(cache.len(), 2);
        assert!(cache.get(tmp.path().join("partials/footer.html")).is_some());
        assert!(cache.get(tmp.path().join("notes.txt")).is_none());
    }

    #[test]
    fn test_render_and_wrap() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "layout.html", "<body>%s</body>");
        write(tmp.path(), "welcome.html", "<p>Hi %s, go to %s</p>");

        let cache = TemplateCache::load(tmp.path()).unwrap();
        let fragment = cache
            .render(TemplateKind::Welcome, &["Ada", "https://example.com"])
            .unwrap();
        let html = cache.wrap_in_layout(&fragment).unwrap();

        assert_eq!(html, "<body><p>Hi Ada, go to https://example.com</p></body>");
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "layout.html", "%s");

        let cache = TemplateCache::load(tmp.path()).unwrap();
        let err = cache.render(TemplateKind::Reset, &["u", "u"]).unwrap_err();
        assert!(matches!(
            err,
            TemplateError::NotFound {
                kind: TemplateKind::Reset,
                path: Some(_)
            }
        ));
    }

    #[test]
    fn test_unmapped_kind_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = TemplateCache::load(tmp.path()).unwrap();

        let err = cache.path_for(TemplateKind::Reminder).unwrap_err();
        assert!(matches!(
            err,
            TemplateError::NotFound {
                kind: TemplateKind::Reminder,
                path: None
            }
        ));
    }

    #[test]
    fn test_missing_directory_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let result = TemplateCache::load(tmp.path().join("absent"));
        assert!(matches!(result, Err(TemplateError::Io { .. })));
    }
}
