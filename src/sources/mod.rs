//! Source provisioning.
//!
//! The orchestrator never fetches sources itself; a provider guarantees that
//! each component's source tree exists at a known path before any stage
//! referencing it is scheduled.

use std::path::{Path, PathBuf};

use crate::core::errors::SourceNotFound;

/// A collaborator supplying component source trees.
pub trait SourceProvider: Send + Sync {
    /// Path of a component's source tree.
    fn source_path(&self, component: &str) -> Result<PathBuf, SourceNotFound>;
}

/// Provider over a flat home-directory layout: one directory per component
/// (`<home>/binutils`, `<home>/gcc`, ...).
#[derive(Debug, Clone)]
pub struct DirSourceProvider {
    home: PathBuf,
    strict: bool,
}

impl DirSourceProvider {
    /// Strict provider: missing trees are an error, surfaced at graph
    /// construction before anything executes.
    pub fn new(home: impl Into<PathBuf>) -> Self {
        DirSourceProvider {
            home: home.into(),
            strict: true,
        }
    }

    /// Lenient provider for planning on machines without the trees.
    pub fn lenient(home: impl Into<PathBuf>) -> Self {
        DirSourceProvider {
            home: home.into(),
            strict: false,
        }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }
}

impl SourceProvider for DirSourceProvider {
    fn source_path(&self, component: &str) -> Result<PathBuf, SourceNotFound> {
        let path = self.home.join(component);
        if !self.strict || path.is_dir() {
            Ok(path)
        } else {
            Err(SourceNotFound {
                component: component.to_string(),
                path,
            })
        }
    }
}

/// Resolve a component source, preferring a vendor-patched tree.
///
/// Kernel and C-library sources may carry vendor modifications as
/// `<component>-<vendor>`; when the vendored tree is absent the generic one
/// is used.
pub fn resolve_source(
    provider: &dyn SourceProvider,
    component: &str,
    vendor: Option<&str>,
) -> Result<PathBuf, SourceNotFound> {
    if let Some(vendor) = vendor {
        let vendored = format!("{component}-{vendor}");
        match provider.source_path(&vendored) {
            Ok(path) => return Ok(path),
            Err(_) => {
                tracing::warn!(
                    component,
                    vendor,
                    "no vendor-patched source tree, falling back to the generic one"
                );
            }
        }
    }
    provider.source_path(component)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_dir_provider_finds_existing_tree() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("binutils")).unwrap();

        let provider = DirSourceProvider::new(tmp.path());
        assert_eq!(
            provider.source_path("binutils").unwrap(),
            tmp.path().join("binutils")
        );

        let err = provider.source_path("gcc").unwrap_err();
        assert_eq!(err.component, "gcc");

        // Lenient mode hands out the layout path regardless.
        let lenient = DirSourceProvider::lenient(tmp.path());
        assert!(lenient.source_path("gcc").is_ok());
    }

    #[test]
    fn test_vendor_override_preferred_with_fallback() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("glibc")).unwrap();
        std::fs::create_dir(tmp.path().join("glibc-pc")).unwrap();

        let provider = DirSourceProvider::new(tmp.path());

        let vendored = resolve_source(&provider, "glibc", Some("pc")).unwrap();
        assert!(vendored.ends_with("glibc-pc"));

        // Unknown vendor falls back to the generic tree.
        let generic = resolve_source(&provider, "glibc", Some("acme")).unwrap();
        assert!(generic.ends_with("glibc"));
    }
}
