//! Compiled-artifact cache keyed by source modification time

use std::path::{Path, PathBuf};

use crate::dialect::{Compilers, EXECUTABLE_EXTENSION};
use crate::error::RenderError;
use crate::fs::ThemeFs;

use super::resolver::TemplateFile;

/// Compiles Haml and Jade sources into executable artifacts under a temp
/// directory and reuses them while they are not older than their source.
#[derive(Debug, Clone)]
pub struct CompileCache {
    views_root: PathBuf,
    temp_root: PathBuf,
    dir_mode: u32,
}

impl CompileCache {
    pub fn new(views_root: impl Into<PathBuf>, temp_root: impl Into<PathBuf>, dir_mode: u32) -> Self {
        Self {
            views_root: views_root.into(),
            temp_root: temp_root.into(),
            dir_mode,
        }
    }

    /// Where the compiled form of `source` lives.
    ///
    /// The source's location below the views root is kept, so
    /// `views/posts/index.html.haml` maps to `tmp/posts/index.html.haml.php`.
    /// A trailing executable extension is stripped before one is appended.
    pub fn artifact_path(&self, source: &Path) -> PathBuf {
        let relative = match source.strip_prefix(&self.views_root) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => source
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| source.to_path_buf()),
        };
        let file_name = relative
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dotted = format!(".{}", EXECUTABLE_EXTENSION);
        let stem = file_name.strip_suffix(&dotted).unwrap_or(&file_name);
        let artifact_name = format!("{}{}", stem, dotted);

        match relative.parent() {
            Some(dir) => self.temp_root.join(dir).join(artifact_name),
            None => self.temp_root.join(artifact_name),
        }
    }

    /// An artifact is fresh when it exists and is not older than its source
    pub fn is_fresh(
        &self,
        source: &Path,
        artifact: &Path,
        fs: &dyn ThemeFs,
    ) -> Result<bool, RenderError> {
        if !fs.is_file(artifact) {
            return Ok(false);
        }
        let source_time = fs
            .modified(source)
            .map_err(|e| RenderError::io(source, e))?;
        let artifact_time = fs
            .modified(artifact)
            .map_err(|e| RenderError::io(artifact, e))?;
        Ok(artifact_time >= source_time)
    }

    /// Make sure `dir` exists and accepts new files.
    ///
    /// Every level from the temp root down to `dir` is prepared in turn: a
    /// missing directory is created with the configured mode, and one that
    /// refuses writes gets that mode applied. Either step may fail quietly;
    /// what counts is whether `dir` is writable afterwards.
    pub fn ensure_writable(&self, dir: &Path, fs: &dyn ThemeFs) -> Result<(), RenderError> {
        let mut levels: Vec<&Path> = dir
            .ancestors()
            .take_while(|level| level.starts_with(&self.temp_root))
            .collect();
        if levels.is_empty() {
            levels.push(dir);
        }
        for level in levels.into_iter().rev() {
            self.prepare_dir(level, fs);
        }

        if fs.is_dir(dir) && fs.is_writable(dir) {
            Ok(())
        } else {
            Err(RenderError::not_writable(dir))
        }
    }

    fn prepare_dir(&self, dir: &Path, fs: &dyn ThemeFs) {
        if !fs.is_dir(dir) {
            if let Err(err) = fs.create_dir_all(dir, self.dir_mode) {
                tracing::warn!(dir = %dir.display(), error = %err, "could not create cache directory");
            }
        }
        if fs.is_dir(dir) && !fs.is_writable(dir) {
            tracing::warn!(
                dir = %dir.display(),
                mode = %format!("{:o}", self.dir_mode),
                "cache directory not writable, changing mode"
            );
            if let Err(err) = fs.set_mode(dir, self.dir_mode) {
                tracing::warn!(dir = %dir.display(), error = %err, "could not change mode");
            }
        }
    }

    /// Path of an executable form of `file`, compiling it if needed.
    ///
    /// Native templates are already executable and are returned unchanged.
    pub fn ensure_compiled(
        &self,
        file: &TemplateFile,
        fs: &dyn ThemeFs,
        compilers: &Compilers,
    ) -> Result<PathBuf, RenderError> {
        if !file.dialect.is_compiled() {
            return Ok(file.path.clone());
        }

        let artifact = self.artifact_path(&file.path);
        if self.is_fresh(&file.path, &artifact, fs)? {
            tracing::debug!(
                source = %file.path.display(),
                artifact = %artifact.display(),
                "compiled template is fresh"
            );
            return Ok(artifact);
        }

        let compiler = compilers.get(file.dialect).ok_or_else(|| {
            RenderError::runtime(
                file.path.display().to_string(),
                format!("no compiler registered for {} templates", file.dialect),
            )
        })?;

        if let Some(dir) = artifact.parent() {
            self.ensure_writable(dir, fs)?;
        }

        let source = fs
            .read_to_string(&file.path)
            .map_err(|e| RenderError::io(&file.path, e))?;
        let compiled = compiler.compile(&source, &file.path)?;
        fs.write(&artifact, &compiled)
            .map_err(|e| RenderError::io(&artifact, e))?;

        tracing::info!(
            source = %file.path.display(),
            artifact = %artifact.display(),
            dialect = %file.dialect,
            "compiled template"
        );
        Ok(artifact)
    }
}
