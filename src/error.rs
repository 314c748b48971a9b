//! Error taxonomy for an instrumentation run.
//!
//! Only [`SetupError`] escapes [`crate::orchestrator::Orchestrator::run`].
//! Everything that goes wrong while processing a single descriptor is a
//! [`DescriptorError`] or [`ResolveError`] and ends up in the run report.

use std::path::PathBuf;

/// Fatal problems acquiring the resources a run needs.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("Failed to determine working directory: {0}")]
    WorkingDirectory(#[source] std::io::Error),

    #[error("Failed to read classpath file {path}: {source}")]
    ClasspathFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Instrumenter jar is not configured (use --instrumenter or GUI_FORMS_INSTRUMENTER)")]
    InstrumenterMissing,

    #[error("Instrumenter jar does not exist: {0}")]
    InstrumenterNotFound(PathBuf),
}

/// Failures isolated to one descriptor; the run continues.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("Failed to read descriptor {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed descriptor {origin}: {reason}")]
    Malformed { origin: String, reason: String },

    #[error("Class to bind does not exist: {class_name}")]
    UnboundClass {
        descriptor: PathBuf,
        class_name: String,
    },

    #[error("Failed to publish {from} -> {to}: {source}")]
    Publish {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Lookup failures inside the resolution context or the nested resolver.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Cannot find nested form file {0}")]
    DescriptorNotFound(String),

    #[error("Malformed classpath location {location:?}: {reason}")]
    MalformedLocation { location: String, reason: String },

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}
