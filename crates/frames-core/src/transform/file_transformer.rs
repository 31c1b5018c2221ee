/*!
# FileTransformer - Declaration Files to Rust

Reads `.frames` / `.json` declaration files, frames their classes and writes
the generated Rust next to (or under) an output directory.
*/

use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, warn};

use crate::ast::{EmitConfig, RustEmitter};
use crate::parser::parser_for_path;

use super::{class_transformer::ClassTransformer, TransformationContext, TransformationSummary};

/// File-based framing pipeline
pub struct FileTransformer {
    transformer: ClassTransformer,
    emit: EmitConfig,
    source_extensions: Vec<String>,
    output_extension: String,
    preserve_structure: bool,
}

impl FileTransformer {
    pub fn new(emit: EmitConfig) -> Self {
        let context = TransformationContext::new().with_record_suffix(emit.record_suffix.clone());
        Self {
            transformer: ClassTransformer::framing().with_context(context),
            emit,
            source_extensions: vec!["frames".to_string(), "json".to_string()],
            output_extension: "rs".to_string(),
            preserve_structure: true,
        }
    }

    /// Set the file extensions to process
    pub fn source_extensions(mut self, extensions: Vec<String>) -> Self {
        self.source_extensions = extensions;
        self
    }

    /// Whether to preserve directory structure in output
    pub fn preserve_structure(mut self, preserve: bool) -> Self {
        self.preserve_structure = preserve;
        self
    }

    pub fn transformer(&self) -> &ClassTransformer {
        &self.transformer
    }

    /// Frame one source text and render it as Rust
    pub fn transform_source(&mut self, source: &str, format: &str, origin: &str) -> Result<(String, TransformationSummary)> {
        let module = crate::parser::create_parser(format)?.parse(source)?;
        let outcome = self.transformer.transform_module(module);
        if !outcome.summary.success() {
            let messages: Vec<String> = outcome.summary.errors.iter().map(ToString::to_string).collect();
            bail!("{origin}: {}", messages.join("; "));
        }
        let code = RustEmitter::new(self.emit.clone()).emit_module(&outcome.module, origin)?;
        Ok((code, outcome.summary))
    }

    /// Transform a single file
    pub fn transform_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &mut self,
        source_file: P,
        output_file: Q,
    ) -> Result<FileTransformationSummary> {
        let source_path = source_file.as_ref();
        let output_path = output_file.as_ref();

        let module = parser_for_path(source_path)?
            .parse_file(source_path)
            .with_context(|| format!("failed to load {}", source_path.display()))?;
        let origin = source_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();

        let outcome = self.transformer.transform_module(module);
        if !outcome.summary.success() {
            let messages: Vec<String> = outcome.summary.errors.iter().map(ToString::to_string).collect();
            bail!("{}: {}", source_path.display(), messages.join("; "));
        }
        let code = RustEmitter::new(self.emit.clone()).emit_module(&outcome.module, &origin)?;

        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(output_path, code)
            .with_context(|| format!("failed to write {}", output_path.display()))?;
        debug!(source = %source_path.display(), output = %output_path.display(), "wrote generated source");

        Ok(FileTransformationSummary {
            files_processed: 1,
            files_written: 1,
            classes: outcome.summary,
            errors: Vec::new(),
        })
    }

    /// Transform all files in a directory
    pub fn transform_directory<P: AsRef<Path>, Q: AsRef<Path>>(
        &mut self,
        source_dir: P,
        output_dir: Q,
    ) -> Result<FileTransformationSummary> {
        let source_path = source_dir.as_ref();
        let output_path = output_dir.as_ref();

        if !source_path.exists() {
            return Err(anyhow!("Source directory does not exist: {}", source_path.display()));
        }
        fs::create_dir_all(output_path)?;

        let mut summary = FileTransformationSummary::new();
        self.transform_directory_recursive(source_path, output_path, source_path, &mut summary)?;
        Ok(summary)
    }

    fn transform_directory_recursive(
        &mut self,
        current_dir: &Path,
        output_dir: &Path,
        source_root: &Path,
        summary: &mut FileTransformationSummary,
    ) -> Result<()> {
        let mut entries = fs::read_dir(current_dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        entries.sort();

        for path in entries {
            if path.is_dir() {
                self.transform_directory_recursive(&path, output_dir, source_root, summary)?;
            } else if self.should_process_file(&path) {
                let relative = if self.preserve_structure {
                    path.strip_prefix(source_root)?.to_path_buf()
                } else {
                    path.file_name().unwrap_or_default().into()
                };
                let output_file = output_dir.join(relative).with_extension(&self.output_extension);

                summary.files_processed += 1;
                match self.transform_file(&path, &output_file) {
                    Ok(file_summary) => {
                        summary.files_written += file_summary.files_written;
                        summary.classes.merge(file_summary.classes);
                    }
                    Err(e) => {
                        warn!(file = %path.display(), error = %e, "skipping file");
                        summary.errors.push(format!("Error processing {}: {e:#}", path.display()));
                    }
                }
            }
        }
        Ok(())
    }

    /// Check if a file should be processed based on its extension
    fn should_process_file(&self, path: &Path) -> bool {
        if let Some(extension) = path.extension() {
            let ext_str = extension.to_string_lossy().to_lowercase();
            self.source_extensions.iter().any(|ext| ext.to_lowercase() == ext_str)
        } else {
            false
        }
    }
}

impl Default for FileTransformer {
    fn default() -> Self {
        Self::new(EmitConfig::default())
    }
}

/// Summary of file transformation results
#[derive(Debug, Default)]
pub struct FileTransformationSummary {
    pub files_processed: u64,
    pub files_written: u64,
    pub classes: TransformationSummary,
    pub errors: Vec<String>,
}

impl FileTransformationSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_transform_directory_writes_rust() {
        let source = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        fs::create_dir_all(source.path().join("widgets")).unwrap();
        fs::write(
            source.path().join("widgets/counter.frames"),
            "@Framed class Counter { var count: Int = 0 }",
        )
        .unwrap();
        fs::write(source.path().join("notes.txt"), "ignored").unwrap();

        let mut transformer = FileTransformer::default();
        let summary = transformer.transform_directory(source.path(), output.path()).unwrap();

        assert!(summary.success(), "{:?}", summary.errors);
        assert_eq!(summary.files_processed, 1);
        let code = fs::read_to_string(output.path().join("widgets/counter.rs")).unwrap();
        assert!(code.contains("pub struct CounterRecord"));
        assert!(code.contains("impl Framed for Counter"));
    }

    #[test]
    fn test_transform_source_from_json() {
        let json = r#"{"classes":[{"name":"Flag","annotations":["Framed"],
            "properties":[{"name":"on","ty":{"name":"Boolean"},"mutable":true}]}]}"#;
        let mut transformer = FileTransformer::default();
        let (code, summary) = transformer.transform_source(json, "json", "flag.json").unwrap();
        assert_eq!(summary.properties_framed, 1);
        assert!(code.contains("pub on: bool"));
    }

    #[test]
    fn test_failing_class_reported_per_file() {
        let source = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        fs::write(
            source.path().join("broken.frames"),
            "@Framed class Broken { var doubled: Int get() = 2 }",
        )
        .unwrap();

        let mut transformer = FileTransformer::default();
        let summary = transformer.transform_directory(source.path(), output.path()).unwrap();
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].contains("no backing field"), "{}", summary.errors[0]);
        assert!(!output.path().join("broken.rs").exists());
    }
}
