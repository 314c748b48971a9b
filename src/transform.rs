use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::classpath::ResolutionContext;
use crate::descriptor::{DescriptorOrigin, DescriptorRef};
use crate::environment::PATH_LIST_SEPARATOR;
use crate::nested::NestedDescriptorResolver;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Diagnostic {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(message: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{} ({cause})", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOutcome {
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

impl TransformOutcome {
    pub fn failed(error: Diagnostic) -> Self {
        Self {
            errors: vec![error],
            warnings: Vec::new(),
        }
    }
}

pub struct TransformRequest<'r, 'a> {
    pub descriptor: &'r DescriptorRef,
    pub descriptor_path: &'r Path,
    pub class_file: &'r Path,
    pub context: &'r ResolutionContext,
    pub nested: &'r mut NestedDescriptorResolver<'a>,
    pub use_jb_scaling: bool,
}

/// Rewrites a compiled class in place from its descriptor.
pub trait Transformer {
    fn transform(&self, request: TransformRequest<'_, '_>) -> TransformOutcome;
}

fn java_command(args: &[String]) -> std::io::Result<std::process::Output> {
    let java_bin = std::env::var("GUI_FORMS_JAVA").unwrap_or_else(|_| "java".to_string());

    #[cfg(windows)]
    {
        let lower = java_bin.to_ascii_lowercase();
        if lower.ends_with(".cmd") || lower.ends_with(".bat") {
            return Command::new("cmd")
                .arg("/C")
                .arg(&java_bin)
                .args(args)
                .output();
        }
    }

    Command::new(&java_bin).args(args).output()
}

/// Drives an instrumenter jar through `java -jar`.
///
/// The tool reports diagnostics on stdout, one per line, as
/// `ERROR: message[ | cause]` or `WARNING: message[ | cause]`.
#[derive(Debug, Clone)]
pub struct ExternalTransformer {
    instrumenter_jar: PathBuf,
}

impl ExternalTransformer {
    pub fn new(instrumenter_jar: PathBuf) -> Self {
        Self { instrumenter_jar }
    }

    fn arguments(&self, request: &mut TransformRequest<'_, '_>) -> Result<Vec<String>, Diagnostic> {
        let separator = PATH_LIST_SEPARATOR.to_string();
        let classpath = request
            .context
            .locations()
            .iter()
            .map(|l| l.path.to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join(separator.as_str());

        let mut args = vec![
            "-jar".to_string(),
            self.instrumenter_jar.to_string_lossy().to_string(),
            "--classpath".to_string(),
            classpath,
        ];
        if let Some(platform) = request.context.platform_module() {
            args.push("--platform".to_string());
            args.push(platform.runtime_home.to_string_lossy().to_string());
        }
        args.push("--form".to_string());
        args.push(request.descriptor_path.to_string_lossy().to_string());
        args.push("--class".to_string());
        args.push(request.class_file.to_string_lossy().to_string());

        let mut pending: Vec<String> = request.descriptor.nested_forms.clone();
        let mut visited = HashSet::new();
        while let Some(name) = pending.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }
            let nested = request
                .nested
                .resolve(&name)
                .map_err(|err| Diagnostic::new(err.to_string()))?;
            if let DescriptorOrigin::File(path) = &nested.origin {
                args.push("--nested-form".to_string());
                args.push(format!("{name}={}", path.to_string_lossy()));
            }
            if let Some(binding) = request.nested.class_binding_name(&nested) {
                args.push("--nested-class".to_string());
                args.push(format!("{name}={binding}"));
            }
            pending.extend(nested.nested_forms.iter().rev().cloned());
        }

        if request.use_jb_scaling {
            args.push("--jb-scaling".to_string());
        }
        Ok(args)
    }
}

impl Transformer for ExternalTransformer {
    fn transform(&self, mut request: TransformRequest<'_, '_>) -> TransformOutcome {
        let args = match self.arguments(&mut request) {
            Ok(args) => args,
            Err(diagnostic) => return TransformOutcome::failed(diagnostic),
        };

        let output = match java_command(&args) {
            Ok(output) => output,
            Err(err) => {
                return TransformOutcome::failed(Diagnostic::with_cause(
                    "Failed to execute java (ensure JRE/JDK is installed)",
                    err.to_string(),
                ));
            }
        };

        let mut outcome = parse_diagnostics(&String::from_utf8_lossy(&output.stdout));
        if !output.status.success() && outcome.errors.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            outcome.errors.push(Diagnostic::with_cause(
                format!("Instrumenter failed with {}", output.status),
                stderr.trim(),
            ));
        }
        outcome
    }
}

pub fn parse_diagnostics(stdout: &str) -> TransformOutcome {
    let mut outcome = TransformOutcome::default();
    for line in stdout.lines() {
        let line = line.trim();
        let (sink, body) = if let Some(body) = line.strip_prefix("ERROR:") {
            (&mut outcome.errors, body)
        } else if let Some(body) = line.strip_prefix("WARNING:") {
            (&mut outcome.warnings, body)
        } else {
            continue;
        };
        let diagnostic = match body.split_once(" | ") {
            Some((message, cause)) => Diagnostic::with_cause(message.trim(), cause.trim()),
            None => Diagnostic::new(body.trim()),
        };
        sink.push(diagnostic);
    }
    outcome
}
