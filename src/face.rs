//! Face rendering boundary
//!
//! The display layer is external to the core; [`FaceRenderer`] is the
//! contract it must satisfy. The assistant loop is the only caller, so
//! implementations need no internal synchronization.

use std::path::{Path, PathBuf};

/// Receives frame changes from the animation engine
pub trait FaceRenderer: Send {
    /// Display `image` immediately
    fn show_frame(&mut self, image: &Path);

    /// Display `image` with a short cross-fade
    fn fade_to(&mut self, image: &Path);
}

/// Renderer that records the current frame and logs changes
///
/// Used headless and in diagnostics; a real display plugs in here.
#[derive(Debug, Default)]
pub struct LogRenderer {
    current: Option<PathBuf>,
}

impl LogRenderer {
    /// The most recently shown frame
    #[must_use]
    pub fn current(&self) -> Option<&Path> {
        self.current.as_deref()
    }
}

impl FaceRenderer for LogRenderer {
    fn show_frame(&mut self, image: &Path) {
        tracing::trace!(frame = %image.display(), "show frame");
        self.current = Some(image.to_path_buf());
    }

    fn fade_to(&mut self, image: &Path) {
        tracing::debug!(frame = %image.display(), "fade to");
        self.current = Some(image.to_path_buf());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_renderer_tracks_current_frame() {
        let mut renderer = LogRenderer::default();
        assert!(renderer.current().is_none());

        renderer.show_frame(Path::new("m1.png"));
        assert_eq!(renderer.current(), Some(Path::new("m1.png")));

        renderer.fade_to(Path::new("idle.jpg"));
        assert_eq!(renderer.current(), Some(Path::new("idle.jpg")));
    }
}
