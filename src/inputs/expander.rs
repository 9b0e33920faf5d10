/// Filesystem backed artifact expansion and fileset resolution
use glob::glob;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{ArtifactExpander, FilesetResolver};
use crate::spawn::ActionInput;

/// Expands a tree artifact by walking its directory under the exec root
pub struct DirectoryArtifactExpander {
    exec_root: PathBuf,
}

impl DirectoryArtifactExpander {
    pub fn new(exec_root: impl Into<PathBuf>) -> Self {
        Self {
            exec_root: exec_root.into(),
        }
    }
}

impl ArtifactExpander for DirectoryArtifactExpander {
    fn expand(&self, tree: &ActionInput) -> io::Result<Vec<ActionInput>> {
        let dir = self.exec_root.join(&tree.exec_path);
        let mut files = Vec::new();

        for entry in WalkDir::new(&dir).follow_links(true).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            files.push(ActionInput::file(relative_to(&self.exec_root, entry.path())));
        }

        Ok(files)
    }
}

/// Resolves fileset patterns with `glob`, relative to the exec root
///
/// Matches are mounted under the fileset's exec path, keeping their location
/// relative to the non-glob prefix of the pattern: `data/json/*.json` mounted
/// at `resources` maps `data/json/a.json` to `resources/a.json`.
pub struct GlobFilesetResolver {
    exec_root: PathBuf,
}

impl GlobFilesetResolver {
    pub fn new(exec_root: impl Into<PathBuf>) -> Self {
        Self {
            exec_root: exec_root.into(),
        }
    }
}

impl FilesetResolver for GlobFilesetResolver {
    fn resolve(
        &self,
        fileset: &ActionInput,
        pattern: &str,
    ) -> io::Result<Vec<(PathBuf, ActionInput)>> {
        let base = literal_prefix(pattern);
        let full_pattern = self.exec_root.join(pattern).to_string_lossy().to_string();

        let entries = glob(&full_pattern).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Invalid fileset pattern {}: {}", pattern, e),
            )
        })?;

        let mut resolved = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| e.into_error())?;
            if !path.is_file() {
                continue;
            }
            let source = relative_to(&self.exec_root, &path);
            let mounted = fileset
                .exec_path
                .join(source.strip_prefix(&base).unwrap_or(&source));
            resolved.push((mounted, ActionInput::file(source)));
        }

        resolved.sort();
        Ok(resolved)
    }
}

/// Leading path components of a glob pattern that contain no wildcards
fn literal_prefix(pattern: &str) -> PathBuf {
    let mut prefix = PathBuf::new();
    let components: Vec<&str> = pattern.split('/').collect();
    // Last component names files, never part of the mount base
    for component in &components[..components.len().saturating_sub(1)] {
        if component.contains(['*', '?', '[']) {
            break;
        }
        prefix.push(component);
    }
    prefix
}

fn relative_to(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_expand_tree_recursively() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("gen/sub")).unwrap();
        fs::write(root.join("gen/b.txt"), "b").unwrap();
        fs::write(root.join("gen/a.txt"), "a").unwrap();
        fs::write(root.join("gen/sub/c.txt"), "c").unwrap();

        let files = DirectoryArtifactExpander::new(root)
            .expand(&ActionInput::tree("gen"))
            .unwrap();

        let paths: Vec<_> = files.iter().map(|f| f.exec_path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("gen/a.txt"),
                PathBuf::from("gen/b.txt"),
                PathBuf::from("gen/sub/c.txt"),
            ]
        );
    }

    #[test]
    fn test_expand_missing_tree_fails() {
        let temp = TempDir::new().unwrap();
        let result = DirectoryArtifactExpander::new(temp.path()).expand(&ActionInput::tree("gone"));
        assert!(result.is_err());
    }

    #[test]
    fn test_literal_prefix() {
        assert_eq!(literal_prefix("data/json/*.json"), PathBuf::from("data/json"));
        assert_eq!(literal_prefix("data/**/*.json"), PathBuf::from("data"));
        assert_eq!(literal_prefix("*.txt"), PathBuf::new());
    }

    #[test]
    fn test_recursive_fileset_keeps_structure() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("assets/img/icons")).unwrap();
        fs::write(root.join("assets/img/logo.png"), "png").unwrap();
        fs::write(root.join("assets/img/icons/x.png"), "png").unwrap();

        let resolved = GlobFilesetResolver::new(root)
            .resolve(&ActionInput::fileset("static", "assets/**/*.png"), "assets/**/*.png")
            .unwrap();

        let mounted: Vec<_> = resolved.iter().map(|(p, _)| p.clone()).collect();
        assert_eq!(
            mounted,
            vec![
                PathBuf::from("static/img/icons/x.png"),
                PathBuf::from("static/img/logo.png"),
            ]
        );
    }
}
