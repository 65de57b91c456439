//! Face frame sets
//!
//! Idle faces and viseme mouth frames are image files discovered once at
//! startup and shared read-only for the process lifetime.

use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;

use crate::{Error, Result};

/// The face images available to the renderer
#[derive(Debug, Clone)]
pub struct FaceSet {
    idle: Vec<PathBuf>,
    visemes: Vec<PathBuf>,
}

impl FaceSet {
    /// Discover face images in `dir`
    ///
    /// All `.jpg`/`.png` files (sorted by name) become idle faces. The
    /// `.png` subset becomes the viseme frame set, ordered closed-mouth to
    /// open-mouth by filename; when no PNGs exist every face doubles as a
    /// viseme frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read or holds no images;
    /// a device without faces cannot start.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut idle: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| Error::Face(format!("cannot read {}: {e}", dir.display())))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| has_extension(path, &["jpg", "png"]))
            .collect();
        idle.sort();

        Self::from_paths(idle)
    }

    /// Build a face set from explicit paths (sorted order preserved)
    ///
    /// # Errors
    ///
    /// Returns an error when `paths` is empty.
    pub fn from_paths(paths: Vec<PathBuf>) -> Result<Self> {
        if paths.is_empty() {
            return Err(Error::Face("no face images found".to_string()));
        }

        let visemes: Vec<PathBuf> = paths
            .iter()
            .filter(|path| has_extension(path, &["png"]))
            .cloned()
            .collect();
        let visemes = if visemes.is_empty() {
            paths.clone()
        } else {
            visemes
        };

        tracing::debug!(
            idle = paths.len(),
            visemes = visemes.len(),
            "face set loaded"
        );

        Ok(Self {
            idle: paths,
            visemes,
        })
    }

    /// Number of viseme frames (always ≥ 1)
    #[must_use]
    pub fn viseme_count(&self) -> usize {
        self.visemes.len()
    }

    /// The viseme frame at `index`, clamped to the valid range
    #[must_use]
    pub fn viseme(&self, index: usize) -> &Path {
        &self.visemes[index.min(self.visemes.len() - 1)]
    }

    /// A randomly chosen idle face
    #[must_use]
    pub fn random_idle(&self) -> &Path {
        self.idle
            .choose(&mut rand::thread_rng())
            .map_or_else(|| self.visemes[0].as_path(), PathBuf::as_path)
    }

    /// All idle faces
    #[must_use]
    pub fn idle_faces(&self) -> &[PathBuf] {
        &self.idle
    }
}

/// Case-insensitive extension check
fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            extensions
                .iter()
                .any(|wanted| ext.eq_ignore_ascii_case(wanted))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn png_subset_becomes_viseme_frames() {
        let set = FaceSet::from_paths(paths(&[
            "faces/idle.jpg",
            "faces/mouth0.png",
            "faces/mouth1.png",
            "faces/mouth2.png",
        ]))
        .unwrap();

        assert_eq!(set.viseme_count(), 3);
        assert_eq!(set.viseme(0), Path::new("faces/mouth0.png"));
        assert_eq!(set.idle_faces().len(), 4);
    }

    #[test]
    fn all_faces_serve_as_visemes_when_no_png() {
        let set = FaceSet::from_paths(paths(&["faces/a.jpg", "faces/b.jpg"])).unwrap();
        assert_eq!(set.viseme_count(), 2);
    }

    #[test]
    fn viseme_index_is_clamped() {
        let set = FaceSet::from_paths(paths(&["faces/m0.png", "faces/m1.png"])).unwrap();
        assert_eq!(set.viseme(99), Path::new("faces/m1.png"));
    }

    #[test]
    fn empty_set_is_a_startup_error() {
        assert!(FaceSet::from_paths(Vec::new()).is_err());
    }

    #[test]
    fn random_idle_is_a_member() {
        let set = FaceSet::from_paths(paths(&["faces/a.jpg", "faces/b.jpg"])).unwrap();
        for _ in 0..10 {
            let face = set.random_idle().to_path_buf();
            assert!(set.idle_faces().contains(&face));
        }
    }

    #[test]
    fn load_discovers_images_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["one.PNG", "two.jpg", "notes.txt"] {
            std::fs::File::create(dir.path().join(name)).unwrap();
        }

        let set = FaceSet::load(dir.path()).unwrap();
        assert_eq!(set.idle_faces().len(), 2);
        assert_eq!(set.viseme_count(), 1);
    }
}
