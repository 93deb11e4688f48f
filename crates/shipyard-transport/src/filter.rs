//! Ignore filter for deployment packages.
//!
//! Two layers decide what never reaches the platform: a fixed list of editor,
//! OS and version-control artifacts matched by file name, and the project's
//! own `.gitignore` files.

use ignore::Match;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use regex::RegexSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use shipyard_core::{Error, IgnoredPaths, Result};

/// File-name patterns that are never deployed.
static DEFAULT_IGNORED: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        // macOS
        r"^\.DS_Store$",
        r"^\.Trashes$",
        r"^\.Spotlight-V100$",
        // Windows
        r"^Thumbs\.db$",
        r"^[Dd]esktop\.ini$",
        // KDE
        r"^\.directory$",
        r".*\.kdev4$",
        // Editors
        r"^\.project$",
        r"^\.settings$",
        r"^\.idea$",
        r"^\.vscode$",
        r"^\..+\.swp$",
        r"^.+~$",
        // Version control
        r"^\.git$",
        r"^\.svn$",
        r"^\.hg$",
    ])
    .expect("default ignore patterns are valid")
});

const GITIGNORE: &str = ".gitignore";

/// Whether a path's file name is in the default ignore list.
pub fn is_default_ignored(path: &Path) -> bool {
    path.file_name()
        .map(|name| DEFAULT_IGNORED.is_match(&name.to_string_lossy()))
        .unwrap_or(false)
}

/// Collect every path under `root` excluded by the project's `.gitignore` files.
///
/// The tree is walked once. Each directory's `.gitignore` is compiled when the
/// walk enters it and applies to that directory's subtree, with deeper files
/// taking precedence. Ignored directories are reported once and not descended
/// into, so rules inside them never apply, as with git itself.
pub fn collect_ignored(root: &Path) -> Result<IgnoredPaths> {
    let mut ignored = IgnoredPaths::new();
    let mut stack = Vec::new();
    walk(root, &mut stack, &mut ignored)?;
    Ok(ignored)
}

fn walk(dir: &Path, stack: &mut Vec<Gitignore>, ignored: &mut IgnoredPaths) -> Result<()> {
    let pushed = match compile(dir)? {
        Some(matcher) => {
            stack.push(matcher);
            true
        }
        None => false,
    };

    let mut entries: Vec<(PathBuf, bool)> = std::fs::read_dir(dir)?
        .map(|entry| {
            let entry = entry?;
            let is_dir = entry.file_type()?.is_dir();
            Ok((entry.path(), is_dir))
        })
        .collect::<std::io::Result<_>>()?;
    entries.sort();

    for (path, is_dir) in entries {
        if is_dir && path.file_name().is_some_and(|name| name == ".git") {
            continue;
        }
        if is_ignored(stack, &path, is_dir) {
            ignored.insert(path);
        } else if is_dir {
            walk(&path, stack, ignored)?;
        }
    }

    if pushed {
        stack.pop();
    }
    Ok(())
}

fn compile(dir: &Path) -> Result<Option<Gitignore>> {
    let path = dir.join(GITIGNORE);
    if !path.is_file() {
        return Ok(None);
    }

    let mut builder = GitignoreBuilder::new(dir);
    if let Some(err) = builder.add(&path) {
        return Err(Error::InvalidInput(format!(
            "{}: {}",
            path.display(),
            err
        )));
    }
    builder
        .build()
        .map(Some)
        .map_err(|e| Error::InvalidInput(format!("{}: {}", path.display(), e)))
}

/// The innermost rule that matches decides.
fn is_ignored(stack: &[Gitignore], path: &Path, is_dir: bool) -> bool {
    let mut result = false;
    for matcher in stack {
        match matcher.matched(path, is_dir) {
            Match::Ignore(_) => result = true,
            Match::Whitelist(_) => result = false,
            Match::None => {}
        }
    }
    result
}

/// Whether `path` is in the ignored set, directly or through an ignored ancestor.
pub fn is_excluded(ignored: &IgnoredPaths, path: &Path) -> bool {
    path.ancestors().any(|p| ignored.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_default_list() {
        assert!(is_default_ignored(Path::new(".DS_Store")));
        assert!(is_default_ignored(Path::new("/foo/bar/.DS_Store")));
        assert!(is_default_ignored(Path::new("/foo/bar/.kdev4")));
        assert!(is_default_ignored(Path::new("project.kdev4")));
        assert!(is_default_ignored(Path::new(".main.rs.swp")));
        assert!(is_default_ignored(Path::new("notes.txt~")));
        assert!(is_default_ignored(Path::new("/src/.git")));

        assert!(!is_default_ignored(Path::new("file")));
        assert!(!is_default_ignored(Path::new("DS_Store")));
        assert!(!is_default_ignored(Path::new("swp.swp")));
        assert!(!is_default_ignored(Path::new("/foo/.gitignore")));
    }

    #[test]
    fn test_collect_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join(".gitignore"), "*.log\nbuild/\n").unwrap();
        fs::write(root.join("app.log"), "").unwrap();
        fs::write(root.join("main.go"), "").unwrap();
        fs::create_dir_all(root.join("build/out")).unwrap();
        fs::write(root.join("build/out/bin"), "").unwrap();

        let ignored = collect_ignored(root).unwrap();
        assert!(ignored.contains(&root.join("app.log")));
        assert!(ignored.contains(&root.join("build")));
        assert!(!ignored.contains(&root.join("build/out")));
        assert!(!ignored.contains(&root.join("main.go")));
        assert!(is_excluded(&ignored, &root.join("build/out/bin")));
    }

    #[test]
    fn test_nested_gitignore_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join(".gitignore"), "*.txt\n").unwrap();
        fs::create_dir_all(root.join("docs")).unwrap();
        fs::write(root.join("docs/.gitignore"), "!keep.txt\n").unwrap();
        fs::write(root.join("docs/keep.txt"), "").unwrap();
        fs::write(root.join("docs/drop.txt"), "").unwrap();
        fs::write(root.join("top.txt"), "").unwrap();

        let ignored = collect_ignored(root).unwrap();
        assert!(ignored.contains(&root.join("top.txt")));
        assert!(ignored.contains(&root.join("docs/drop.txt")));
        assert!(!ignored.contains(&root.join("docs/keep.txt")));
    }

    #[test]
    fn test_no_gitignore() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), "").unwrap();
        assert!(collect_ignored(dir.path()).unwrap().is_empty());
    }
}
