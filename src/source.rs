use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    span::{Idx, Span},
    symbol::{FileId, FxMap},
};

/// One source file, read once per assembly run.
#[derive(Debug)]
pub struct SourceFile {
    id: FileId,
    path: PathBuf,
    text: Arc<str>,
    /// Byte range of every line, terminator excluded
    lines: Vec<(usize, usize)>,
}

impl SourceFile {
    fn new(id: FileId, path: PathBuf, text: String) -> Self {
        let mut lines = Vec::new();
        let mut start = 0;
        for (i, c) in text.char_indices() {
            if c == '\n' {
                let end = if text[start..i].ends_with('\r') { i - 1 } else { i };
                lines.push((start, end));
                start = i + 1;
            }
        }
        if start < text.len() {
            lines.push((start, text.len()));
        }
        SourceFile {
            id,
            path,
            text: text.into(),
            lines,
        }
    }

    pub fn id(&self) -> FileId {
        self.id
    }

    /// Base name used in diagnostics.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn text(&self) -> Arc<str> {
        Arc::clone(&self.text)
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Text of a 1-based line, empty when out of range.
    pub fn line(&self, line: usize) -> &str {
        match line.checked_sub(1).and_then(|i| self.lines.get(i)) {
            Some(&(start, end)) => &self.text[start..end],
            None => "",
        }
    }

    /// Span of the trimmed text of a 1-based line.
    pub fn line_span(&self, line: usize) -> Span {
        let Some(&(start, end)) = line.checked_sub(1).and_then(|i| self.lines.get(i)) else {
            return Span::new(Idx(self.text.len() as u32), 0);
        };
        let raw = &self.text[start..end];
        let lead = raw.len() - raw.trim_start().len();
        let len = raw.trim().len();
        Span::new(Idx((start + lead) as u32), len as u32)
    }

    /// Directory that relative includes from this file are searched in first.
    pub fn dir(&self) -> Option<&Path> {
        self.path.parent()
    }
}

/// Run-scoped file cache: a file included from several places is read once.
/// Insertion order doubles as the file identity used for local label keys.
#[derive(Default)]
pub struct SourceCache {
    files: FxMap<PathBuf, Arc<SourceFile>>,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file's contents without touching the disk.
    pub fn insert(&mut self, path: impl AsRef<Path>, text: impl Into<String>) -> Arc<SourceFile> {
        let path = normalize(path.as_ref());
        let id = match self.files.get_index_of(&path) {
            Some(idx) => FileId(idx as u32),
            None => FileId(self.files.len() as u32),
        };
        let file = Arc::new(SourceFile::new(id, path.clone(), text.into()));
        self.files.insert(path, Arc::clone(&file));
        file
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(&normalize(path))
    }

    /// Return the cached file or read it from disk.
    pub fn load(&mut self, path: &Path) -> io::Result<Arc<SourceFile>> {
        let path = normalize(path);
        if let Some(file) = self.files.get(&path) {
            return Ok(Arc::clone(file));
        }
        let bytes = fs::read(&path)?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        Ok(self.insert(path, text))
    }

    /// Resolve an include name: the including file's directory first, then every search path.
    /// On failure, returns every location that was tried.
    pub fn find_include(
        &self,
        name: &str,
        including_dir: Option<&Path>,
        search_paths: &[PathBuf],
    ) -> Result<PathBuf, Vec<PathBuf>> {
        let mut searched = Vec::new();
        for dir in including_dir.into_iter().chain(search_paths.iter().map(PathBuf::as_path)) {
            let candidate = dir.join(name);
            if self.contains(&candidate) || candidate.is_file() {
                return Ok(normalize(&candidate));
            }
            searched.push(dir.to_path_buf());
        }
        Err(searched)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn normalize(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
