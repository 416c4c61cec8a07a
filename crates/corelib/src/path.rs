//! File path lookup: stat info for a path plus an ordered list of search
//! roots tried most-recently-pushed first.

use std::{
    env, fs,
    path::{Path, PathBuf},
    time::SystemTime,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PathKind {
    #[default]
    DoesNotExist,
    Directory,
    File,
    Other,
}

/// Resolved information about a single path.
#[derive(Clone, Debug, Default)]
pub struct FilePathInfo {
    kind: PathKind,
    absolute: PathBuf,
    relative: Option<PathBuf>,
    parent: PathBuf,
    filename: String,
    stem: String,
    extension: String,
    modified: Option<SystemTime>,
}

impl FilePathInfo {
    /// Stat `path` (relative paths are taken against the working directory).
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let cwd = env::current_dir().unwrap_or_default();

        let (kind, modified) = match fs::metadata(path) {
            Ok(meta) => {
                let kind = if meta.is_dir() {
                    PathKind::Directory
                } else if meta.is_file() {
                    PathKind::File
                } else {
                    PathKind::Other
                };
                (kind, meta.modified().ok())
            }
            Err(_) => (PathKind::DoesNotExist, None),
        };

        let absolute = match kind {
            PathKind::DoesNotExist => cwd.join(path),
            _ => fs::canonicalize(path).unwrap_or_else(|_| cwd.join(path)),
        };
        let relative = fs::canonicalize(&cwd)
            .ok()
            .and_then(|root| absolute.strip_prefix(root).ok().map(Path::to_path_buf))
            .filter(|rel| !rel.as_os_str().is_empty());

        let lossy = |s: Option<&std::ffi::OsStr>| {
            s.map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
        };

        Self {
            kind,
            parent: absolute.parent().map(Path::to_path_buf).unwrap_or_default(),
            filename: lossy(absolute.file_name()),
            stem: lossy(absolute.file_stem()),
            extension: lossy(absolute.extension()),
            absolute,
            relative,
            modified,
        }
    }

    /// Look `reference` up under each root (last root first), then as given.
    pub fn search(reference: impl AsRef<Path>, roots: &[PathBuf]) -> Self {
        let reference = reference.as_ref();
        if reference.is_absolute() {
            return Self::new(reference);
        }
        for root in roots.iter().rev() {
            let candidate = Self::new(root.join(reference));
            if candidate.exists() {
                return candidate;
            }
        }
        Self::new(reference)
    }

    #[inline]
    pub fn kind(&self) -> PathKind {
        self.kind
    }

    #[inline]
    pub fn exists(&self) -> bool {
        self.kind != PathKind::DoesNotExist
    }

    #[inline]
    pub fn is_directory(&self) -> bool {
        self.kind == PathKind::Directory
    }

    #[inline]
    pub fn is_file(&self) -> bool {
        self.kind == PathKind::File
    }

    pub fn absolute_path(&self) -> &Path {
        &self.absolute
    }

    /// Path relative to the working directory when the file lives below it,
    /// otherwise the absolute path.
    pub fn shortest_path(&self) -> &Path {
        self.relative.as_deref().unwrap_or(&self.absolute)
    }

    pub fn parent_path(&self) -> &Path {
        &self.parent
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// Extension without the leading dot, as written.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    /// `true` when both files exist and `self` was not modified before `other`.
    pub fn not_older_than(&self, other: &FilePathInfo) -> bool {
        match (self.modified, other.modified) {
            (Some(mine), Some(theirs)) => mine >= theirs,
            _ => false,
        }
    }
}

/// Ordered search roots. Lookups try the most recently pushed root first.
#[derive(Clone, Debug, Default)]
pub struct PathFinder {
    roots: Vec<PathBuf>,
}

impl PathFinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an existing directory (a file pushes its parent).
    /// Returns `false` if the path does not exist.
    pub fn push(&mut self, path: impl AsRef<Path>) -> bool {
        let info = FilePathInfo::search(path, &self.roots);
        if !info.exists() {
            return false;
        }
        let root = if info.is_directory() {
            info.shortest_path().to_path_buf()
        } else {
            info.parent_path().to_path_buf()
        };
        self.roots.push(root);
        true
    }

    pub fn pop(&mut self) -> Option<PathBuf> {
        self.roots.pop()
    }

    pub fn clear(&mut self) {
        self.roots.clear();
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Roots in lookup order.
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.roots.iter().rev().map(PathBuf::as_path)
    }

    /// Resolve `reference`; `None` if no root (nor the working directory) has it.
    pub fn find(&self, reference: impl AsRef<Path>) -> Option<FilePathInfo> {
        let info = FilePathInfo::search(reference, &self.roots);
        info.exists().then_some(info)
    }

    pub fn find_shortest_path(&self, reference: impl AsRef<Path>) -> Option<PathBuf> {
        self.find(reference).map(|info| info.shortest_path().to_path_buf())
    }
}
