use std::{
    io::{self, Write},
    path::Path,
};

use tempfile::NamedTempFile;
use tracing::warn;

/// Transient on-disk home for one job's concatenated stylesheets.
///
/// Exactly one exists per job, created by the resolver and read by every
/// per-viewport extraction call. It is released unconditionally when the
/// job's pipeline finishes, whether it succeeded or failed.
pub struct CombinedStylesheet {
    file: NamedTempFile,
}

impl CombinedStylesheet {
    /// Persist `css` to a fresh temp file with a `.css` suffix.
    pub fn write(css: &str) -> Result<Self, io::Error> {
        let mut file = tempfile::Builder::new()
            .prefix("ccsss-")
            .suffix(".css")
            .tempfile()?;
        file.write_all(css.as_bytes())?;
        file.flush()?;
        Ok(Self { file })
    }

    /// Path handed to the extraction engine, which consumes CSS by reference.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Best-effort removal. A failed release is logged and suppressed; it is
    /// never allowed to become a job outcome or block the queue.
    pub fn release(self) {
        let path = self.file.path().display().to_string();
        if let Err(err) = self.file.close() {
            warn!(
                target = "infra::storage",
                path = %path,
                error = %err,
                "failed to remove combined stylesheet temp file"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_document_round_trips() {
        let document = CombinedStylesheet::write(".a{color:red}").expect("temp file");
        let body = std::fs::read_to_string(document.path()).expect("readable");
        assert_eq!(body, ".a{color:red}");
        document.release();
    }

    #[test]
    fn release_removes_the_file() {
        let document = CombinedStylesheet::write("body{}").expect("temp file");
        let path = document.path().to_path_buf();
        document.release();
        assert!(!path.exists());
    }
}
