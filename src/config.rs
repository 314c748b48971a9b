use std::env;
use std::path::{Path, PathBuf};

use crate::cli::Cli;
use crate::environment::{HostEnvironment, split_path_list};
use crate::error::SetupError;

pub const INSTRUMENTER_ENV: &str = "GUI_FORMS_INSTRUMENTER";
pub const EXT_DIRS_ENV: &str = "GUI_FORMS_EXT_DIRS";
pub const HOST_CLASSPATH_ENV: &str = "GUI_FORMS_HOST_CLASSPATH";

pub fn resolve_source_dir(cli: &Cli) -> PathBuf {
    cli.source
        .clone()
        .unwrap_or_else(|| Path::new("src").join("main").join("java"))
}

pub fn resolve_output_dir(cli: &Cli) -> PathBuf {
    cli.output
        .clone()
        .unwrap_or_else(|| Path::new("target").join("classes"))
}

pub fn resolve_build_dir(cli: &Cli) -> PathBuf {
    cli.build_dir.clone().unwrap_or_else(|| PathBuf::from("target"))
}

pub fn resolve_java_home(cli: &Cli) -> Option<PathBuf> {
    if let Some(p) = cli.java_home.clone() {
        return Some(p);
    }
    non_empty_var("JAVA_HOME").map(PathBuf::from)
}

/// `--classpath` values in order, followed by the lines of `--classpath-file`.
pub fn resolve_compile_classpath(cli: &Cli) -> Result<Vec<PathBuf>, SetupError> {
    let mut entries: Vec<PathBuf> = cli
        .classpath
        .iter()
        .flat_map(|raw| split_path_list(raw))
        .map(PathBuf::from)
        .collect();

    if let Some(file) = cli.classpath_file.as_deref() {
        let raw = std::fs::read_to_string(file).map_err(|source| SetupError::ClasspathFile {
            path: file.to_path_buf(),
            source,
        })?;
        entries.extend(
            raw.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(PathBuf::from),
        );
    }
    Ok(entries)
}

pub fn resolve_instrumenter(explicit: Option<&Path>) -> Result<PathBuf, SetupError> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| non_empty_var(INSTRUMENTER_ENV).map(PathBuf::from))
        .ok_or(SetupError::InstrumenterMissing)?;
    if !path.is_file() {
        return Err(SetupError::InstrumenterNotFound(path));
    }
    Ok(path)
}

pub fn host_environment(cli: &Cli) -> HostEnvironment {
    HostEnvironment {
        runtime_home: resolve_java_home(cli),
        extension_dirs: non_empty_var(EXT_DIRS_ENV)
            .map(|raw| split_path_list(&raw).into_iter().map(PathBuf::from).collect()),
        host_classpath: non_empty_var(HOST_CLASSPATH_ENV),
        runtime_classpath: non_empty_var("CLASSPATH"),
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::PATH_LIST_SEPARATOR;
    use clap::Parser;

    #[test]
    fn defaults_follow_maven_layout() {
        let cli = Cli::parse_from(["gui-forms"]);
        assert_eq!(resolve_source_dir(&cli), PathBuf::from("src/main/java"));
        assert_eq!(resolve_output_dir(&cli), PathBuf::from("target/classes"));
        assert_eq!(resolve_build_dir(&cli), PathBuf::from("target"));
    }

    #[test]
    fn compile_classpath_keeps_order_across_flags_and_file() {
        let file = std::env::temp_dir().join(format!(
            "gui_forms_cp_{}_{}.txt",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::write(&file, "# deps\n/m2/c.jar\n\n/m2/d.jar\n").unwrap();

        let joined = format!("/m2/a.jar{PATH_LIST_SEPARATOR}/m2/b.jar");
        let cli = Cli::parse_from([
            "gui-forms",
            "--classpath",
            joined.as_str(),
            "--classpath-file",
            file.to_str().unwrap(),
        ]);
        let cp = resolve_compile_classpath(&cli).unwrap();
        assert_eq!(
            cp,
            ["/m2/a.jar", "/m2/b.jar", "/m2/c.jar", "/m2/d.jar"]
                .iter()
                .map(PathBuf::from)
                .collect::<Vec<_>>()
        );
        let _ = std::fs::remove_file(file);
    }

    #[test]
    fn unreadable_classpath_file_is_a_setup_error() {
        let cli = Cli::parse_from(["gui-forms", "--classpath-file", "/nonexistent/gui-forms/cp.txt"]);
        assert!(matches!(
            resolve_compile_classpath(&cli),
            Err(SetupError::ClasspathFile { .. })
        ));
    }

    #[test]
    fn explicit_instrumenter_must_exist() {
        let missing = Path::new("/nonexistent/gui-forms/instrumenter.jar");
        assert!(matches!(
            resolve_instrumenter(Some(missing)),
            Err(SetupError::InstrumenterNotFound(_))
        ));
    }
}
