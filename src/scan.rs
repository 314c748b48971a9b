use anyhow::Result;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

pub const DESCRIPTOR_EXTENSION: &str = "form";

/// Every `*.form` file under `source_dir`, sorted by path so runs are
/// deterministic.
pub fn scan_descriptors(source_dir: &Path) -> Result<Vec<PathBuf>> {
    let (tx, rx) = mpsc::channel();

    let walker = WalkBuilder::new(source_dir)
        .hidden(false)
        .ignore(false)
        .parents(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .build_parallel();

    walker.run(|| {
        let tx = tx.clone();
        Box::new(move |entry| {
            if let Ok(entry) = entry {
                let path = entry.path();
                if entry.file_type().is_some_and(|t| t.is_file())
                    && path.extension().is_some_and(|e| e == DESCRIPTOR_EXTENSION)
                {
                    let _ = tx.send(path.to_path_buf());
                }
            }
            ignore::WalkState::Continue
        })
    });

    drop(tx);
    let mut descriptors: Vec<PathBuf> = rx.iter().collect();
    descriptors.sort();
    Ok(descriptors)
}

/// `a.b.C` -> `a/b/C`
pub fn class_name_to_internal_name(class_name: &str) -> String {
    class_name.replace('.', "/")
}

/// Most specific existing class for an internal name under `class_root`.
///
/// Tries the literal name first, then keeps turning the last `/` into `$`
/// (`a/B/C` -> `a/B$C` -> `a$B$C`) until a class file exists or no `/` is
/// left.
pub fn class_or_inner_name(class_root: &Path, internal_name: &str) -> Option<String> {
    let mut candidate = internal_name.to_string();
    loop {
        if class_root.join(format!("{candidate}.class")).is_file() {
            return Some(candidate);
        }
        let pos = candidate.rfind('/')?;
        candidate.replace_range(pos..pos + 1, "$");
    }
}

/// Class file a binding resolves to, if any.
pub fn resolve_class_file(class_root: &Path, class_name: &str) -> Option<PathBuf> {
    let internal = class_name_to_internal_name(class_name);
    class_or_inner_name(class_root, &internal)
        .map(|name| class_root.join(format!("{name}.class")))
}
