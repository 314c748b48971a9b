//! One instrumentation run.
//!
//! ```text
//! Init -> Discover -> for each descriptor: CheckCache -> (Skip | Transform -> Publish) -> Finalize
//! ```
//!
//! Only [`SetupError`]s abort a run. A descriptor that cannot be parsed,
//! whose bound class is missing, whose transform reports errors or whose
//! publish fails is recorded in the [`RunReport`] and the run moves on. Such
//! a descriptor is neither published nor cached, so the next run retries it.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::cache::CacheFile;
use crate::classpath::ResolutionContextBuilder;
use crate::descriptor::DescriptorParser;
use crate::environment::AmbientEnvironment;
use crate::error::{DescriptorError, SetupError};
use crate::nested::NestedDescriptorResolver;
use crate::scan::{resolve_class_file, scan_descriptors};
use crate::transform::{TransformRequest, Transformer};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub build_dir: PathBuf,
    pub compile_classpath: Vec<PathBuf>,
    pub use_jb_scaling: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    SourceMissing,
    NoDescriptors,
    UpToDate,
    Instrumented,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DescriptorIssue {
    pub descriptor: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub discovered: usize,
    pub unbound: usize,
    pub up_to_date: usize,
    pub transformed: usize,
    pub published: usize,
    pub failures: Vec<DescriptorIssue>,
    pub warnings: Vec<DescriptorIssue>,
    pub cache_written: bool,
}

impl RunReport {
    fn new(outcome: RunOutcome) -> Self {
        Self {
            outcome,
            discovered: 0,
            unbound: 0,
            up_to_date: 0,
            transformed: 0,
            published: 0,
            failures: Vec::new(),
            warnings: Vec::new(),
            cache_written: false,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.failures.is_empty()
    }

    fn fail(&mut self, descriptor: &Path, message: impl Into<String>) {
        let message = message.into();
        error!("{}: {message}", descriptor.display());
        self.failures.push(DescriptorIssue {
            descriptor: descriptor.to_path_buf(),
            message,
        });
    }
}

pub struct Orchestrator<E, P, T> {
    env: E,
    parser: P,
    transformer: T,
}

impl<E, P, T> Orchestrator<E, P, T>
where
    E: AmbientEnvironment,
    P: DescriptorParser,
    T: Transformer,
{
    pub fn new(env: E, parser: P, transformer: T) -> Self {
        Self {
            env,
            parser,
            transformer,
        }
    }

    pub fn transformer(&self) -> &T {
        &self.transformer
    }

    pub fn run(&self, options: &RunOptions) -> Result<RunReport, SetupError> {
        let source_dir = absolute(&options.source_dir)?;
        let output_dir = absolute(&options.output_dir)?;

        if !source_dir.is_dir() {
            info!("{} is not exists", source_dir.display());
            return Ok(RunReport::new(RunOutcome::SourceMissing));
        }

        let descriptors = match scan_descriptors(&source_dir) {
            Ok(found) => found,
            Err(err) => {
                warn!("Failed to scan {}: {err:#}", source_dir.display());
                Vec::new()
            }
        };
        if descriptors.is_empty() {
            debug!("no form descriptors under {}", source_dir.display());
            return Ok(RunReport::new(RunOutcome::NoDescriptors));
        }

        let context = ResolutionContextBuilder::new(&self.env).build(&options.compile_classpath)?;
        let mut nested = NestedDescriptorResolver::new(&descriptors, &context, &self.parser, &output_dir);
        let mut cache = CacheFile::new(&options.build_dir).read();

        let mut report = RunReport::new(RunOutcome::UpToDate);
        report.discovered = descriptors.len();
        let mut changed = false;

        for descriptor_path in &descriptors {
            let descriptor = match self.parser.parse_file(descriptor_path) {
                Ok(descriptor) => descriptor,
                Err(err) => {
                    report.fail(descriptor_path, err.to_string());
                    continue;
                }
            };

            let Some(class_to_bind) = descriptor.class_to_bind.as_deref() else {
                debug!("{} has no bound class", descriptor_path.display());
                report.unbound += 1;
                continue;
            };

            let Some(class_file) = resolve_class_file(&output_dir, class_to_bind) else {
                let err = DescriptorError::UnboundClass {
                    descriptor: descriptor_path.clone(),
                    class_name: class_to_bind.to_string(),
                };
                report.fail(descriptor_path, err.to_string());
                continue;
            };

            if cache.is_up_to_date(descriptor_path, &class_file) {
                debug!("Up to date: {}", descriptor_path.display());
                report.up_to_date += 1;
                continue;
            }

            cache.remove_cache_entry(descriptor_path, &class_file);

            let outcome = self.transformer.transform(TransformRequest {
                descriptor: &descriptor,
                descriptor_path,
                class_file: &class_file,
                context: &context,
                nested: &mut nested,
                use_jb_scaling: options.use_jb_scaling,
            });
            changed = true;
            report.transformed += 1;

            for warning in outcome.warnings {
                warn!("{}: {warning}", descriptor_path.display());
                report.warnings.push(DescriptorIssue {
                    descriptor: descriptor_path.clone(),
                    message: warning.to_string(),
                });
            }
            if !outcome.errors.is_empty() {
                for err in outcome.errors {
                    report.fail(descriptor_path, err.to_string());
                }
                continue;
            }

            match publish(&source_dir, &output_dir, descriptor_path) {
                Ok(target) => {
                    cache.put_cache_entry(descriptor_path, &class_file);
                    report.published += 1;
                    debug!("Processed: {} -> {}", descriptor_path.display(), target.display());
                }
                Err(err) => report.fail(descriptor_path, err.to_string()),
            }
        }

        if changed {
            report.outcome = RunOutcome::Instrumented;
            report.cache_written = cache.write();
        } else {
            info!("Nothing to instrument - all classes are up to date");
        }
        Ok(report)
    }
}

fn absolute(path: &Path) -> Result<PathBuf, SetupError> {
    std::path::absolute(path).map_err(SetupError::WorkingDirectory)
}

/// Copy the descriptor verbatim to the same relative path under the output
/// root.
fn publish(source_dir: &Path, output_dir: &Path, descriptor: &Path) -> Result<PathBuf, DescriptorError> {
    let relative = descriptor.strip_prefix(source_dir).unwrap_or(descriptor);
    let target = output_dir.join(relative);
    let publish_err = |source| DescriptorError::Publish {
        from: descriptor.to_path_buf(),
        to: target.clone(),
        source,
    };

    if same_file(descriptor, &target) {
        return Ok(target);
    }
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(publish_err)?;
    }
    std::fs::copy(descriptor, &target).map_err(publish_err)?;
    Ok(target)
}

/// Copying a file onto itself truncates it before it is read.
fn same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
