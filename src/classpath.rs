//! Resolution context: the ordered set of binary locations classes and
//! resources are looked up in.
//!
//! Assembly order (duplicates by URL dropped, first occurrence kept):
//!
//! 1. ambient locations from [`discover_ambient_locations`],
//! 2. `<runtime-home>/lib/rt.jar` when present,
//! 3. the project's compile dependencies,
//!
//! plus a platform module location when the runtime has a module system.

use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

use crate::environment::{AmbientEnvironment, split_path_list};
use crate::error::{ResolveError, SetupError};
use crate::probe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationKind {
    Directory,
    Archive,
}

/// One classpath element. Identity is `url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub url: String,
    pub path: PathBuf,
    pub kind: LocationKind,
}

impl Location {
    /// Accepts a plain path or a `file:` URL. Relative paths are made
    /// absolute against the working directory.
    pub fn parse(raw: &str) -> Result<Self, ResolveError> {
        let malformed = |reason: &str| ResolveError::MalformedLocation {
            location: raw.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(malformed("empty location"));
        }
        if trimmed.contains('\0') {
            return Err(malformed("contains NUL byte"));
        }

        let path = match trimmed.split_once(':') {
            Some((scheme, rest)) if is_url_scheme(scheme) => {
                if !scheme.eq_ignore_ascii_case("file") {
                    return Err(malformed("unsupported URL scheme"));
                }
                PathBuf::from(percent_decode(strip_authority(rest)).ok_or_else(|| malformed("bad percent escape"))?)
            }
            _ => PathBuf::from(trimmed),
        };

        let path = std::path::absolute(&path).map_err(|e| malformed(&e.to_string()))?;
        Ok(Self::from_absolute(path))
    }

    fn from_absolute(path: PathBuf) -> Self {
        let kind = if path.is_dir() {
            LocationKind::Directory
        } else {
            LocationKind::Archive
        };
        Self {
            url: file_url(&path, kind),
            path,
            kind,
        }
    }
}

// Single-letter schemes are Windows drive letters, not URLs.
fn is_url_scheme(scheme: &str) -> bool {
    scheme.len() > 1
        && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn strip_authority(rest: &str) -> &str {
    match rest.strip_prefix("//") {
        Some(after) => match after.find('/') {
            Some(idx) => &after[idx..],
            None => "/",
        },
        None => rest,
    }
}

fn percent_decode(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = raw.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

fn file_url(path: &Path, kind: LocationKind) -> String {
    let mut normalized = path.to_string_lossy().replace('\\', "/");
    if !normalized.starts_with('/') {
        normalized.insert(0, '/');
    }
    if kind == LocationKind::Directory && !normalized.ends_with('/') {
        normalized.push('/');
    }

    let mut url = String::from("file://");
    for b in normalized.bytes() {
        if b.is_ascii_alphanumeric() || b"/-._~:".contains(&b) {
            url.push(b as char);
        } else {
            url.push_str(&format!("%{b:02X}"));
        }
    }
    url
}

/// Ordered locations contributed by the host itself.
///
/// Without a module system the loader chain is walked ancestor first and
/// split into application and extension locations; application locations
/// come first. With a module system the runtime classpath string replaces
/// the walk. Malformed entries are logged and skipped.
pub fn discover_ambient_locations(env: &dyn AmbientEnvironment) -> Vec<Location> {
    if env.has_module_system() {
        return env
            .runtime_classpath()
            .map(|raw| parse_all(split_path_list(&raw)))
            .unwrap_or_default();
    }

    let ext_dirs = env.extension_dirs();
    let mut application = Vec::new();
    let mut extension = Vec::new();
    for loader in env.loader_chain() {
        for location in parse_all(loader) {
            if is_under_any(&location.path, &ext_dirs) {
                extension.push(location);
            } else {
                application.push(location);
            }
        }
    }
    application.extend(extension);
    application
}

fn parse_all(raw: Vec<String>) -> Vec<Location> {
    raw.iter()
        .filter_map(|item| match Location::parse(item) {
            Ok(location) => Some(location),
            Err(err) => {
                error!("{err}");
                None
            }
        })
        .collect()
}

fn is_under_any(path: &Path, dirs: &[PathBuf]) -> bool {
    dirs.iter()
        .any(|dir| path != dir.as_path() && path.starts_with(dir))
}

/// Synthetic location standing for the runtime's module image.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformModule {
    pub url: String,
    pub runtime_home: PathBuf,
    #[serde(skip)]
    modules: Vec<IndexedArchive>,
}

#[derive(Debug, Clone)]
struct IndexedArchive {
    path: PathBuf,
    prefix: &'static str,
    entries: HashSet<String>,
}

impl IndexedArchive {
    fn read(&self, name: &str) -> Option<Vec<u8>> {
        let entry = format!("{}{name}", self.prefix);
        if !self.entries.contains(&entry) {
            return None;
        }
        match probe::read_entry(&self.path, &entry) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("{err:#}");
                None
            }
        }
    }
}

/// Immutable lookup context shared by the transformer and the nested
/// descriptor resolver.
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionContext {
    locations: Vec<Location>,
    platform: Option<PlatformModule>,
    #[serde(skip)]
    archives: Vec<Option<IndexedArchive>>,
}

impl ResolutionContext {
    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    pub fn platform_module(&self) -> Option<&PlatformModule> {
        self.platform.as_ref()
    }

    /// Class bytes for a binary name such as `a.b.C` or `a.b.C$Inner`.
    pub fn find_class(&self, class_name: &str) -> Option<Vec<u8>> {
        let entry = format!("{}.class", class_name.replace('.', "/"));
        if let Some(platform) = self.platform.as_ref()
            && let Some(bytes) = platform.modules.iter().find_map(|m| m.read(&entry))
        {
            return Some(bytes);
        }
        self.find_in_locations(&entry)
    }

    /// Resource bytes by `/`-separated name. A leading `/` is ignored.
    pub fn find_resource(&self, name: &str) -> Option<Vec<u8>> {
        let name = name.trim_start_matches('/');
        if name.is_empty() {
            return None;
        }
        if let Some(bytes) = self.find_in_locations(name) {
            return Some(bytes);
        }
        self.platform
            .as_ref()
            .and_then(|platform| platform.modules.iter().find_map(|m| m.read(name)))
    }

    fn find_in_locations(&self, name: &str) -> Option<Vec<u8>> {
        self.locations
            .iter()
            .zip(self.archives.iter())
            .find_map(|(location, archive)| match location.kind {
                LocationKind::Directory => read_from_directory(&location.path, name),
                LocationKind::Archive => archive.as_ref().and_then(|a| a.read(name)),
            })
    }
}

fn read_from_directory(dir: &Path, name: &str) -> Option<Vec<u8>> {
    if name.split('/').any(|segment| segment == "..") {
        return None;
    }
    let candidate = dir.join(name);
    if !candidate.is_file() {
        return None;
    }
    std::fs::read(candidate).ok()
}

pub struct ResolutionContextBuilder<'a> {
    env: &'a dyn AmbientEnvironment,
}

impl<'a> ResolutionContextBuilder<'a> {
    pub fn new(env: &'a dyn AmbientEnvironment) -> Self {
        Self { env }
    }

    pub fn build(&self, compile_dependencies: &[PathBuf]) -> Result<ResolutionContext, SetupError> {
        std::env::current_dir().map_err(SetupError::WorkingDirectory)?;

        let mut seen = HashSet::new();
        let mut locations = Vec::new();
        let mut push = |location: Location| {
            if seen.insert(location.url.clone()) {
                locations.push(location);
            }
        };

        for location in discover_ambient_locations(self.env) {
            push(location);
        }

        let runtime_home = self.env.runtime_home();
        if let Some(home) = runtime_home.as_deref() {
            let rt_jar = home.join("lib").join("rt.jar");
            if rt_jar.is_file() {
                push(Location::from_absolute(absolute_or_self(rt_jar)));
            }
        }

        for dependency in compile_dependencies {
            match Location::parse(&dependency.to_string_lossy()) {
                Ok(location) => push(location),
                Err(err) => error!("{err}"),
            }
        }

        let platform = match runtime_home {
            Some(home) if self.env.has_module_system() => Some(platform_module(home)),
            _ => None,
        };

        let archives = index_archives(&locations);
        debug!(
            locations = locations.len(),
            platform = platform.is_some(),
            "resolution context built"
        );
        Ok(ResolutionContext {
            locations,
            platform,
            archives,
        })
    }
}

fn absolute_or_self(path: PathBuf) -> PathBuf {
    std::path::absolute(&path).unwrap_or(path)
}

fn index_archives(locations: &[Location]) -> Vec<Option<IndexedArchive>> {
    locations
        .par_iter()
        .map(|location| match location.kind {
            LocationKind::Directory => None,
            LocationKind::Archive => index_archive(&location.path, ""),
        })
        .collect()
}

fn index_archive(path: &Path, prefix: &'static str) -> Option<IndexedArchive> {
    if !path.is_file() {
        debug!(path = %path.display(), "classpath archive does not exist");
        return None;
    }
    match probe::list_entries(path) {
        Ok(entries) => Some(IndexedArchive {
            path: path.to_path_buf(),
            prefix,
            entries: entries.into_iter().collect(),
        }),
        Err(err) => {
            warn!("{err:#}");
            None
        }
    }
}

fn platform_module(runtime_home: PathBuf) -> PlatformModule {
    let mut jmods: Vec<PathBuf> = std::fs::read_dir(runtime_home.join("jmods"))
        .map(|rd| {
            rd.filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|e| e == "jmod"))
                .collect()
        })
        .unwrap_or_default();
    jmods.sort();

    let modules = jmods
        .par_iter()
        .filter_map(|jmod| index_archive(jmod, "classes/"))
        .collect();

    let home = absolute_or_self(runtime_home);
    PlatformModule {
        url: format!("jrt:{}", file_url(&home, LocationKind::Directory).trim_start_matches("file:")),
        runtime_home: home,
        modules,
    }
}
