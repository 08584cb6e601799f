//! Knowledge-base loader: one unit per file, text verbatim.

use std::path::Path;

use walkdir::{DirEntry, WalkDir};

use super::CorpusUnit;
use crate::error::{IndexError, IndexResult};

/// Loads every regular file under `root`, ordered by relative path.
///
/// Hidden files and directories (such as `.git`) are skipped. Files
/// must be UTF-8. Each unit carries a `path` field holding the
/// slash-separated path relative to `root`.
pub fn load_documents(root: &Path) -> IndexResult<Vec<CorpusUnit>> {
    if !root.is_dir() {
        return Err(IndexError::CorpusLoad {
            path: root.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));
    for entry in walker {
        let entry = entry.map_err(|e| IndexError::CorpusLoad {
            path: root.to_path_buf(),
            reason: e.to_string(),
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let normalized = relative.to_string_lossy().replace('\\', "/");
        files.push((normalized, entry.into_path()));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));

    let mut units = Vec::with_capacity(files.len());
    for (relative, path) in files {
        let bytes = std::fs::read(&path).map_err(|e| IndexError::CorpusLoad {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let text = String::from_utf8(bytes).map_err(|e| IndexError::CorpusLoad {
            path: path.clone(),
            reason: format!("not valid UTF-8: {e}"),
        })?;
        units.push(CorpusUnit::new(text).with_field("path", relative));
    }

    tracing::debug!(root = %root.display(), files = units.len(), "loaded knowledge base");
    Ok(units)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_str().is_some_and(|name| name.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_files_sorted_by_relative_path() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("sub")).unwrap();
        fs::write(root.join("b.txt"), "visit a museum").unwrap();
        fs::write(root.join("a.txt"), "walk in the park").unwrap();
        fs::write(root.join("sub").join("c.txt"), "attend a concert").unwrap();

        let units = load_documents(root).unwrap();
        let paths: Vec<_> = units.iter().map(|u| u.fields["path"].as_str()).collect();
        assert_eq!(paths, ["a.txt", "b.txt", "sub/c.txt"]);
        assert_eq!(units[0].text, "walk in the park");
    }

    #[test]
    fn test_content_is_verbatim() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("doc.md"), "  line one\nline two\n").unwrap();

        let units = load_documents(temp_dir.path()).unwrap();
        assert_eq!(units[0].text, "  line one\nline two\n");
    }

    #[test]
    fn test_non_utf8_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("bin.dat"), [0xff, 0xfe, 0x00]).unwrap();

        let err = load_documents(temp_dir.path()).unwrap_err();
        assert!(
            matches!(err, IndexError::CorpusLoad { ref path, .. } if path.ends_with("bin.dat"))
        );
    }

    #[test]
    fn test_hidden_entries_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join(".git").join("objects")).unwrap();
        fs::write(root.join(".git").join("objects").join("ab"), [0xff, 0xfe]).unwrap();
        fs::write(root.join(".hidden.txt"), "not a document").unwrap();
        fs::write(root.join("guide.md"), "list repository forks").unwrap();

        let units = load_documents(root).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].fields["path"].as_str(), "guide.md");
    }

    #[test]
    fn test_hidden_root_is_walked() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join(".kb");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("doc.txt"), "walk in the park").unwrap();

        assert_eq!(load_documents(&root).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let err = load_documents(&temp_dir.path().join("absent")).unwrap_err();
        assert_eq!(err.status_code(), "CORPUS_LOAD_ERROR");
    }
}
