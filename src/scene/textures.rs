//! Texture file lookup.

use std::path::{Component, Path, PathBuf};

/// Finds the file behind a material's texture name.
pub trait TextureResolver: Sync {
    /// Path of `filename`, searching `extra_root` after the resolver's own
    /// locations.
    fn resolve(&self, filename: &str, extra_root: Option<&Path>) -> Option<PathBuf>;

    /// Locations [`resolve`](Self::resolve) looks in, for diagnostics.
    fn search_roots(&self, extra_root: Option<&Path>) -> Vec<PathBuf> {
        extra_root.map(Path::to_path_buf).into_iter().collect()
    }
}

/// Filesystem resolver: the model's own directory first, then a recursive
/// walk of the extra root matching file names case-insensitively.
#[derive(Clone, Debug)]
pub struct FsTextureResolver {
    model_dir: PathBuf,
}

impl FsTextureResolver {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self { model_dir: model_dir.into() }
    }

    /// Resolver for the directory containing `model_path`.
    pub fn for_model(model_path: &Path) -> Self {
        let dir = model_path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        Self::new(dir)
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }
}

impl TextureResolver for FsTextureResolver {
    fn resolve(&self, filename: &str, extra_root: Option<&Path>) -> Option<PathBuf> {
        if filename.is_empty() {
            return None;
        }
        if stays_inside(Path::new(filename)) {
            let direct = self.model_dir.join(filename);
            if direct.is_file() {
                return Some(direct);
            }
        }
        // stored names may carry a directory part that no longer exists,
        // or one that points outside the model directory
        let name = Path::new(filename).file_name()?.to_str()?;
        if let Some(found) = find_in_dir(&self.model_dir, name) {
            return Some(found);
        }
        extra_root.and_then(|root| find_recursive(root, name))
    }

    fn search_roots(&self, extra_root: Option<&Path>) -> Vec<PathBuf> {
        let mut roots = vec![self.model_dir.clone()];
        roots.extend(extra_root.map(Path::to_path_buf));
        roots
    }
}

/// Relative path without `..`, root or drive components.
fn stays_inside(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn name_matches(entry: &Path, name: &str) -> bool {
    entry
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.eq_ignore_ascii_case(name))
}

fn find_in_dir(dir: &Path, name: &str) -> Option<PathBuf> {
    walkdir::WalkDir::new(dir)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_type().is_file() && name_matches(e.path(), name))
        .map(|e| e.into_path())
}

fn find_recursive(root: &Path, name: &str) -> Option<PathBuf> {
    for entry in walkdir::WalkDir::new(root).follow_links(true).sort_by_file_name() {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() && name_matches(entry.path(), name) {
                    return Some(entry.into_path());
                }
            }
            Err(e) => tracing::debug!("skipping texture search entry: {e}"),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_model_dir_first() {
        let model = tempfile::tempdir().unwrap();
        let extra = tempfile::tempdir().unwrap();
        fs::write(model.path().join("road.png"), b"a").unwrap();
        fs::write(extra.path().join("road.png"), b"b").unwrap();

        let resolver = FsTextureResolver::new(model.path());
        let found = resolver.resolve("road.png", Some(extra.path())).unwrap();
        assert_eq!(found, model.path().join("road.png"));
    }

    #[test]
    fn test_recursive_case_insensitive() {
        let model = tempfile::tempdir().unwrap();
        let extra = tempfile::tempdir().unwrap();
        let nested = extra.path().join("tracks").join("sand");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("Sand_Diffuse.PNG"), b"x").unwrap();

        let resolver = FsTextureResolver::new(model.path());
        let found = resolver.resolve("textures/sand_diffuse.png", Some(extra.path())).unwrap();
        assert_eq!(found, nested.join("Sand_Diffuse.PNG"));
        assert!(resolver.resolve("sand_diffuse.png", None).is_none());
    }

    #[test]
    fn test_names_cannot_escape_model_dir() {
        let root = tempfile::tempdir().unwrap();
        let model = root.path().join("kart");
        fs::create_dir_all(&model).unwrap();
        fs::write(root.path().join("secret.png"), b"s").unwrap();
        let resolver = FsTextureResolver::new(&model);

        assert!(resolver.resolve("../secret.png", None).is_none());
        let absolute = root.path().join("secret.png");
        assert!(resolver.resolve(absolute.to_str().unwrap(), None).is_none());

        // the bare file name is still looked up in the model directory
        fs::write(model.join("secret.png"), b"k").unwrap();
        assert_eq!(resolver.resolve("../secret.png", None).unwrap(), model.join("secret.png"));
        assert!(stays_inside(Path::new("./sub/a.png")));
    }

    #[test]
    fn test_missing() {
        let model = tempfile::tempdir().unwrap();
        let resolver = FsTextureResolver::for_model(&model.path().join("kart.spm"));
        assert_eq!(resolver.model_dir(), model.path());
        assert!(resolver.resolve("nope.png", None).is_none());
        assert!(resolver.resolve("", None).is_none());
        assert_eq!(resolver.search_roots(Some(Path::new("/tex"))).len(), 2);
    }
}
