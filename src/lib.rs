//! # gui-forms
//!
//! Incremental instrumentation of compiled classes bound to GUI form
//! descriptors (`.form` files).
//!
//! ## Architecture
//!
//! - **cache**: Persistent (descriptor, class) up-to-date cache keyed by modification times
//! - **classpath**: Resolution context assembled once per run from the host, runtime and dependencies
//! - **environment**: Injectable view of the host runtime the classpath is built from
//! - **probe**: Jar/jmod inspection used by the resolution context
//! - **scan**: Descriptor discovery and nested-class file probing
//! - **descriptor**: Descriptor model and the `.form` parser
//! - **nested**: Resolution of descriptors referenced from other descriptors
//! - **transform**: Transformer seam and the external instrumenter driver
//! - **orchestrator**: The per-run pipeline tying everything together
//! - **config** / **cli**: Command line and environment configuration

pub mod cache;
pub mod classpath;
pub mod cli;
pub mod config;
pub mod descriptor;
pub mod environment;
pub mod error;
pub mod nested;
pub mod orchestrator;
pub mod probe;
pub mod scan;
pub mod transform;
