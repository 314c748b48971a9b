//! Resolution of descriptors referenced from inside other descriptors.
//!
//! Lookup order for a reference:
//!
//! 1. descriptors already resolved during this run,
//! 2. descriptor files discovered for this run, matched by case-insensitive
//!    path suffix (files are kept sorted, the first match wins),
//! 3. resources of the [`ResolutionContext`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::classpath::ResolutionContext;
use crate::descriptor::{DescriptorOrigin, DescriptorParser, DescriptorRef};
use crate::error::ResolveError;
use crate::scan::{class_name_to_internal_name, class_or_inner_name};

pub struct NestedDescriptorResolver<'a> {
    known: Vec<(String, PathBuf)>,
    context: &'a ResolutionContext,
    parser: &'a dyn DescriptorParser,
    class_root: PathBuf,
    resolved: HashMap<String, Arc<DescriptorRef>>,
}

impl<'a> NestedDescriptorResolver<'a> {
    pub fn new(
        known_files: &[PathBuf],
        context: &'a ResolutionContext,
        parser: &'a dyn DescriptorParser,
        class_root: &Path,
    ) -> Self {
        let mut known: Vec<(String, PathBuf)> = known_files
            .iter()
            .map(|file| {
                let absolute = std::path::absolute(file).unwrap_or_else(|_| file.clone());
                (normalize(&absolute.to_string_lossy()), file.clone())
            })
            .collect();
        known.sort();

        Self {
            known,
            context,
            parser,
            class_root: class_root.to_path_buf(),
            resolved: HashMap::new(),
        }
    }

    pub fn resolve(&mut self, name: &str) -> Result<Arc<DescriptorRef>, ResolveError> {
        if let Some(hit) = self.resolved.get(name) {
            return Ok(Arc::clone(hit));
        }

        let wanted = normalize(name);
        debug!("Searching for form {wanted}");
        let descriptor = match self.known.iter().find(|(key, _)| key.ends_with(&wanted)) {
            Some((_, file)) => self.parser.parse_file(file)?,
            None => {
                let bytes = self
                    .context
                    .find_resource(name)
                    .ok_or_else(|| ResolveError::DescriptorNotFound(name.to_string()))?;
                self.parser
                    .parse(&bytes, DescriptorOrigin::Resource(name.to_string()))?
            }
        };

        let descriptor = Arc::new(descriptor);
        self.resolved
            .insert(name.to_string(), Arc::clone(&descriptor));
        Ok(descriptor)
    }

    /// Binding of `descriptor` mapped onto the class files that actually
    /// exist, so `a.B.Inner` becomes `a.B$Inner` when only the nested class
    /// was compiled. Falls back to the declared name.
    pub fn class_binding_name(&self, descriptor: &DescriptorRef) -> Option<String> {
        let declared = descriptor.class_to_bind.as_deref()?;
        let internal = class_name_to_internal_name(declared);
        Some(
            class_or_inner_name(&self.class_root, &internal)
                .map(|name| name.replace('/', "."))
                .unwrap_or_else(|| declared.to_string()),
        )
    }
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classpath::ResolutionContextBuilder;
    use crate::descriptor::FormParser;
    use crate::environment::StaticEnvironment;
    use std::cell::Cell;
    use std::io::Write;
    use std::time::{SystemTime, UNIX_EPOCH};
    use zip::write::FileOptions;

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "gui_forms_nested_test_{}_{}_{}",
            std::process::id(),
            nanos,
            name
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn form(binding: &str) -> String {
        format!(r#"<form version="1" bind-to-class="{binding}"><grid id="g"/></form>"#)
    }

    struct CountingParser {
        calls: Cell<usize>,
    }

    impl DescriptorParser for CountingParser {
        fn parse(
            &self,
            bytes: &[u8],
            origin: DescriptorOrigin,
        ) -> Result<DescriptorRef, crate::error::DescriptorError> {
            self.calls.set(self.calls.get() + 1);
            FormParser.parse(bytes, origin)
        }
    }

    #[test]
    fn resolves_known_files_case_insensitively_and_memoizes() {
        let base = temp_dir("known");
        let src = base.join("src");
        std::fs::create_dir_all(src.join("Org/UI")).unwrap();
        std::fs::create_dir_all(src.join("org/ui")).unwrap();
        std::fs::write(src.join("Org/UI/Header.form"), form("org.ui.UpperHeader")).unwrap();
        std::fs::write(src.join("org/ui/header.form"), form("org.ui.LowerHeader")).unwrap();

        let env = StaticEnvironment::default();
        let context = ResolutionContextBuilder::new(&env).build(&[]).unwrap();
        let parser = CountingParser { calls: Cell::new(0) };
        let known = vec![src.join("org/ui/header.form"), src.join("Org/UI/Header.form")];
        let mut resolver = NestedDescriptorResolver::new(&known, &context, &parser, &base);

        let first = resolver.resolve("org/ui/Header.form").unwrap();
        assert_eq!(first.class_to_bind.as_deref(), Some("org.ui.UpperHeader"));
        assert_eq!(first.origin, DescriptorOrigin::File(src.join("Org/UI/Header.form")));

        let again = resolver.resolve("org/ui/Header.form").unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(parser.calls.get(), 1);
        let _ = std::fs::remove_dir_all(base);
    }

    #[test]
    fn falls_back_to_context_resources_then_fails() {
        let base = temp_dir("fallback");
        let jar = base.join("shared.jar");
        let file = std::fs::File::create(&jar).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("shared/Footer.form", FileOptions::default())
            .unwrap();
        zip.write_all(form("shared.Footer").as_bytes()).unwrap();
        zip.finish().unwrap();

        let env = StaticEnvironment::default();
        let context = ResolutionContextBuilder::new(&env)
            .build(std::slice::from_ref(&jar))
            .unwrap();
        let mut resolver = NestedDescriptorResolver::new(&[], &context, &FormParser, &base);

        let footer = resolver.resolve("shared/Footer.form").unwrap();
        assert_eq!(footer.class_to_bind.as_deref(), Some("shared.Footer"));
        assert_eq!(
            footer.origin,
            DescriptorOrigin::Resource("shared/Footer.form".to_string())
        );

        let err = resolver.resolve("shared/Missing.form").unwrap_err();
        assert!(matches!(&err, ResolveError::DescriptorNotFound(name) if name == "shared/Missing.form"));
        assert_eq!(err.to_string(), "Cannot find nested form file shared/Missing.form");
        let _ = std::fs::remove_dir_all(base);
    }

    #[test]
    fn class_binding_name_prefers_existing_inner_class() {
        let base = temp_dir("binding");
        std::fs::create_dir_all(base.join("a")).unwrap();
        std::fs::write(base.join("a/B$Inner.class"), b"").unwrap();

        let env = StaticEnvironment::default();
        let context = ResolutionContextBuilder::new(&env).build(&[]).unwrap();
        let resolver = NestedDescriptorResolver::new(&[], &context, &FormParser, &base);

        let bound = |binding: Option<&str>| DescriptorRef {
            class_to_bind: binding.map(str::to_string),
            nested_forms: Vec::new(),
            origin: DescriptorOrigin::Resource("x.form".to_string()),
        };
        assert_eq!(
            resolver.class_binding_name(&bound(Some("a.B.Inner"))).as_deref(),
            Some("a.B$Inner")
        );
        assert_eq!(
            resolver.class_binding_name(&bound(Some("a.Missing"))).as_deref(),
            Some("a.Missing")
        );
        assert_eq!(resolver.class_binding_name(&bound(None)), None);
        let _ = std::fs::remove_dir_all(base);
    }
}
