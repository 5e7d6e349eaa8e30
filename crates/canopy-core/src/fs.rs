//! Filesystem access for bundling and the pipeline.
//!
//! All side effects on the build tree go through [`BuildFs`], so that the
//! bundler and pipeline can run against [`DiskFs`] in production and against
//! [`MemoryFs`] in tests.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use walkdir::WalkDir;

/// Directory names never copied into a build tree.
const SKIPPED_DIRS: &[&str] = &["__pycache__"];

/// Filesystem operations used by the build.
pub trait BuildFs {
    /// Read a whole file.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Write a whole file, creating parent directories as needed.
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Copy a single file, overwriting the destination.
    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Recursively copy a directory, merging into an existing destination.
    fn copy_tree(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Remove a directory tree. Removing a missing path is not an error.
    fn remove_tree(&self, path: &Path) -> io::Result<()>;

    /// Create a directory and its parents.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Rename a file, replacing the destination.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Whether a file or directory exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    fn is_file(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    /// Read a file as UTF-8 text.
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskFs;

impl BuildFs for DiskFs {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)
    }

    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(from, to).map(|_| ())
    }

    fn copy_tree(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::create_dir_all(to)?;

        let walker = WalkDir::new(from)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_skipped(entry.path()));

        for entry in walker {
            let entry = entry.map_err(io::Error::other)?;
            let relative = entry
                .path()
                .strip_prefix(from)
                .map_err(io::Error::other)?;
            let target = to.join(relative);

            if entry.file_type().is_dir() {
                fs::create_dir_all(&target)?;
            } else {
                fs::copy(entry.path(), &target)?;
            }
        }

        Ok(())
    }

    fn remove_tree(&self, path: &Path) -> io::Result<()> {
        match fs::remove_dir_all(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }
}

fn is_skipped(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

/// In-memory filesystem for deterministic tests.
///
/// Paths are used verbatim as keys; callers should use absolute paths.
#[derive(Debug, Default)]
pub struct MemoryFs {
    inner: Mutex<MemoryTree>,
}

#[derive(Debug, Default)]
struct MemoryTree {
    files: BTreeMap<PathBuf, Vec<u8>>,
    dirs: BTreeSet<PathBuf>,
}

impl MemoryTree {
    fn add_dir_all(&mut self, path: &Path) {
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            self.dirs.insert(ancestor.to_path_buf());
        }
    }

    fn add_file(&mut self, path: &Path, contents: Vec<u8>) -> io::Result<()> {
        if self.dirs.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("{} is a directory", path.display()),
            ));
        }
        if let Some(parent) = path.parent() {
            self.add_dir_all(parent);
        }
        self.files.insert(path.to_path_buf(), contents);
        Ok(())
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} not found", path.display()),
    )
}

impl MemoryFs {
    /// Create an empty in-memory filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file (builder style, for test fixtures).
    pub fn with_file(self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Self {
        // Fixture paths are never directories, so the write cannot fail.
        let _ = self.write(path.as_ref(), contents.as_ref());
        self
    }

    /// Add an empty directory (builder style, for test fixtures).
    pub fn with_dir(self, path: impl AsRef<Path>) -> Self {
        let _ = self.create_dir_all(path.as_ref());
        self
    }

    /// All files at or below `root`, sorted.
    pub fn files_under(&self, root: &Path) -> Vec<PathBuf> {
        let tree = self.lock();
        tree.files
            .keys()
            .filter(|path| path.starts_with(root))
            .cloned()
            .collect()
    }

    /// Snapshot of all files at or below `root` with their contents.
    pub fn snapshot(&self, root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
        let tree = self.lock();
        tree.files
            .iter()
            .filter(|(path, _)| path.starts_with(root))
            .map(|(path, contents)| (path.clone(), contents.clone()))
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryTree> {
        // A panic while holding the lock only happens inside a failing test.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl BuildFs for MemoryFs {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.lock()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        self.lock().add_file(path, contents.to_vec())
    }

    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut tree = self.lock();
        let contents = tree.files.get(from).cloned().ok_or_else(|| not_found(from))?;
        tree.add_file(to, contents)
    }

    fn copy_tree(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut tree = self.lock();
        if !tree.dirs.contains(from) {
            return Err(not_found(from));
        }

        let skipped = |relative: &Path| relative.components().any(|c| is_skipped(Path::new(&c)));

        let dirs: Vec<PathBuf> = tree
            .dirs
            .iter()
            .filter_map(|dir| dir.strip_prefix(from).ok())
            .filter(|relative| !skipped(relative))
            .map(|relative| to.join(relative))
            .collect();
        let files: Vec<(PathBuf, Vec<u8>)> = tree
            .files
            .iter()
            .filter_map(|(path, contents)| {
                path.strip_prefix(from)
                    .ok()
                    .filter(|relative| !skipped(relative))
                    .map(|relative| (to.join(relative), contents.clone()))
            })
            .collect();

        tree.add_dir_all(to);
        for dir in dirs {
            tree.add_dir_all(&dir);
        }
        for (path, contents) in files {
            tree.add_file(&path, contents)?;
        }
        Ok(())
    }

    fn remove_tree(&self, path: &Path) -> io::Result<()> {
        let mut tree = self.lock();
        tree.files.retain(|file, _| !file.starts_with(path));
        tree.dirs.retain(|dir| !dir.starts_with(path));
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut tree = self.lock();
        if tree.files.contains_key(path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} is a file", path.display()),
            ));
        }
        tree.add_dir_all(path);
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut tree = self.lock();
        let contents = tree.files.remove(from).ok_or_else(|| not_found(from))?;
        tree.add_file(to, contents)
    }

    fn exists(&self, path: &Path) -> bool {
        let tree = self.lock();
        tree.files.contains_key(path) || tree.dirs.contains(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.lock().files.contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.lock().dirs.contains(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_copy_tree_merges() {
        let fs = MemoryFs::new()
            .with_file("/src/pkg/__init__.py", "")
            .with_file("/src/pkg/a.py", "A")
            .with_file("/src/pkg/__pycache__/a.cpython-311.pyc", "junk")
            .with_file("/dst/pkg/existing.py", "keep");

        fs.copy_tree(Path::new("/src/pkg"), Path::new("/dst/pkg")).unwrap();

        assert_eq!(fs.read(Path::new("/dst/pkg/a.py")).unwrap(), b"A");
        assert_eq!(fs.read(Path::new("/dst/pkg/existing.py")).unwrap(), b"keep");
        assert!(fs.is_file(Path::new("/dst/pkg/__init__.py")));
        assert!(!fs.exists(Path::new("/dst/pkg/__pycache__")));
    }

    #[test]
    fn test_memory_remove_and_exists() {
        let fs = MemoryFs::new().with_file("/a/b/c.txt", "x");
        assert!(fs.is_dir(Path::new("/a/b")));
        assert!(fs.exists(Path::new("/a/b/c.txt")));

        fs.remove_tree(Path::new("/a/b")).unwrap();
        assert!(!fs.exists(Path::new("/a/b/c.txt")));
        assert!(!fs.exists(Path::new("/a/b")));
        assert!(fs.is_dir(Path::new("/a")));

        // Missing paths are fine
        fs.remove_tree(Path::new("/nope")).unwrap();
    }

    #[test]
    fn test_memory_rename_replaces() {
        let fs = MemoryFs::new()
            .with_file("/out/app.wasm.gz.tmp", "new")
            .with_file("/out/app.wasm.gz", "old");
        fs.rename(Path::new("/out/app.wasm.gz.tmp"), Path::new("/out/app.wasm.gz"))
            .unwrap();
        assert_eq!(fs.read(Path::new("/out/app.wasm.gz")).unwrap(), b"new");
        assert!(!fs.exists(Path::new("/out/app.wasm.gz.tmp")));
    }

    #[test]
    fn test_disk_copy_tree_merges() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");

        DiskFs.write(&src.join("pkg/__init__.py"), b"").unwrap();
        DiskFs.write(&src.join("pkg/sub/mod.py"), b"x = 1").unwrap();
        DiskFs.write(&src.join("pkg/__pycache__/mod.pyc"), b"junk").unwrap();
        DiskFs.write(&dst.join("other.py"), b"keep").unwrap();

        DiskFs.copy_tree(&src, &dst).unwrap();
        // Copying twice merges without error
        DiskFs.copy_tree(&src, &dst).unwrap();

        assert!(dst.join("pkg/__init__.py").is_file());
        assert_eq!(fs::read_to_string(dst.join("pkg/sub/mod.py")).unwrap(), "x = 1");
        assert_eq!(fs::read_to_string(dst.join("other.py")).unwrap(), "keep");
        assert!(!dst.join("pkg/__pycache__").exists());
    }

    #[test]
    fn test_disk_remove_missing_is_ok() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        DiskFs.remove_tree(&temp.path().join("missing")).unwrap();
    }
}
