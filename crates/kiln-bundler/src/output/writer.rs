//! Writing a build to the output directory.
//!
//! Every filename is validated against the output directory before anything
//! is written, so a bad template cannot leave a half-written build behind.
//! The manifest is written last.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_graph::Runtime;
use path_clean::PathClean;

use super::BuildOutput;
use super::manifest::BuildManifest;
use crate::error::{Error, Result};

/// Files touched by [`OutputWriter::write`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub written: Vec<PathBuf>,
    /// Stale files from the previous manifest that were deleted.
    pub removed: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct OutputWriter {
    runtime: Arc<dyn Runtime>,
    dir: PathBuf,
}

impl OutputWriter {
    /// `dir` is resolved against the runtime's working directory.
    pub fn new(runtime: Arc<dyn Runtime>, dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().clean();
        let dir = if dir.is_absolute() {
            dir
        } else {
            runtime.get_cwd()?.join(dir).clean()
        };
        Ok(Self { runtime, dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write every artifact, then the manifest. With `clean`, files listed
    /// in the previous manifest that this build no longer emits are removed.
    pub async fn write(
        &self,
        output: &BuildOutput,
        manifest_name: &str,
        clean: bool,
    ) -> Result<WriteReport> {
        let mut files = Vec::with_capacity(output.artifacts.len() + 1);
        for artifact in &output.artifacts {
            let path = validate_output_path(&self.dir, &artifact.filename)?;
            files.push((path, artifact.content.bytes.as_slice()));
        }
        let manifest_path = validate_output_path(&self.dir, manifest_name)?;
        let manifest_json = output.manifest.to_json()?;

        let previous = if clean {
            self.previous_manifest(&manifest_path).await
        } else {
            None
        };

        self.create_dir(&self.dir).await?;
        let mut report = WriteReport::default();
        for (path, bytes) in files.into_iter().chain([(manifest_path, manifest_json.as_bytes())]) {
            if let Some(parent) = path.parent() {
                self.create_dir(parent).await?;
            }
            self.runtime
                .write_file(&path, bytes)
                .await
                .map_err(|source| Error::Write {
                    path: path.clone(),
                    source,
                })?;
            report.written.push(path);
        }

        if let Some(previous) = previous {
            for filename in previous.filenames() {
                let Ok(path) = validate_output_path(&self.dir, filename) else {
                    continue;
                };
                if report.written.contains(&path) || !self.runtime.exists(&path) {
                    continue;
                }
                self.runtime
                    .remove_file(&path)
                    .await
                    .map_err(|source| Error::Write {
                        path: path.clone(),
                        source,
                    })?;
                report.removed.push(path);
            }
        }

        tracing::debug!(
            dir = %self.dir.display(),
            written = report.written.len(),
            removed = report.removed.len(),
            "output written"
        );
        Ok(report)
    }

    async fn previous_manifest(&self, path: &Path) -> Option<BuildManifest> {
        let bytes = self.runtime.read_file(path).await.ok()?;
        let json = String::from_utf8(bytes).ok()?;
        match BuildManifest::from_json(&json) {
            Ok(manifest) => Some(manifest),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable previous manifest");
                None
            }
        }
    }

    async fn create_dir(&self, dir: &Path) -> Result<()> {
        self.runtime
            .create_dir(dir, true)
            .await
            .map_err(|source| Error::Write {
                path: dir.to_path_buf(),
                source,
            })
    }
}

/// Resolve `filename` under `base_dir`, rejecting anything that escapes it.
pub fn validate_output_path(base_dir: &Path, filename: &str) -> Result<PathBuf> {
    if filename.contains('\0') {
        return Err(Error::InvalidOutputPath(
            "Filename contains null byte".to_string(),
        ));
    }
    if filename.is_empty() {
        return Err(Error::InvalidOutputPath("Filename is empty".to_string()));
    }

    let filename_path = Path::new(filename).clean();
    let full_path = base_dir.join(&filename_path).clean();

    if !full_path.starts_with(base_dir) || full_path == base_dir {
        return Err(Error::InvalidOutputPath(format!(
            "Path '{}' escapes output directory '{}' (resolved to '{}')",
            filename,
            base_dir.display(),
            full_path.display()
        )));
    }

    Ok(full_path)
}
