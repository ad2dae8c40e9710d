//! Borrow execution: copy-only artifact transfer between environments.
//!
//! A borrow reads declared paths from the source environment's prefix and
//! writes them below the borrowing environment's prefix. The source is never
//! mutated. File names are preserved, so a shared library borrowed together
//! with its split debug-symbol file keeps the name-convention link between
//! the two resolvable after the copy.

use anyhow::{bail, Context, Result};

use crate::core::environment::{BorrowEdge, EnvironmentId, EnvironmentSet};
use crate::util::fs::{copy_dir_all, copy_file};

/// Copy one borrowed artifact into the destination environment.
pub fn execute_borrow(
    set: &EnvironmentSet,
    dest: &EnvironmentId,
    edge: &BorrowEdge,
) -> Result<()> {
    let source_env = set
        .get(&edge.source)
        .with_context(|| format!("unknown borrow source environment `{}`", edge.source))?;
    let dest_env = set
        .get(dest)
        .with_context(|| format!("unknown borrow destination environment `{dest}`"))?;

    let src = source_env.prefix().join(&edge.source_rel);
    let dst = dest_env.prefix().join(&edge.dest_rel);

    if !src.exists() {
        bail!(
            "borrowed artifact {} is missing from environment `{}`",
            src.display(),
            edge.source
        );
    }

    tracing::debug!(
        from = %src.display(),
        to = %dst.display(),
        "borrowing artifact"
    );

    if src.is_dir() {
        copy_dir_all(&src, &dst)
    } else {
        copy_file(&src, &dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::core::request::BuildRequest;
    use crate::test_support::test_config;
    use crate::util::hash::sha256_file;

    /// A freestanding set borrowing runtime + debug symbols + scripts from a
    /// native sibling.
    fn freestanding_set(dir: &std::path::Path) -> EnvironmentSet {
        let mut request = BuildRequest {
            build: Some("x86_64-linux-gnu".into()),
            host: Some("x86_64-linux-gnu".into()),
            target: Some("arm-none-eabi".into()),
            ..BuildRequest::default()
        };
        request.features.libc = false;
        request.features.scripting_support = true;
        EnvironmentSet::for_request(&request.resolve().unwrap(), &test_config(dir))
    }

    #[test]
    fn test_borrow_copies_without_mutating_source() {
        let tmp = tempfile::TempDir::new().unwrap();
        let set = freestanding_set(tmp.path());

        let edges: Vec<BorrowEdge> = set.primary().borrows().to_vec();
        let lib_edge = edges
            .iter()
            .find(|e| e.source_rel.ends_with("libstdc++.so.6"))
            .unwrap();

        let source_env = set.get(&lib_edge.source).unwrap();
        let src = source_env.prefix().join(&lib_edge.source_rel);
        crate::util::fs::write_file(&src, b"shared-object-bytes").unwrap();
        let before = sha256_file(&src).unwrap();

        execute_borrow(&set, set.primary_id(), lib_edge).unwrap();

        let dst = set.primary().prefix().join(&lib_edge.dest_rel);
        assert_eq!(sha256_file(&dst).unwrap(), sha256_file(&src).unwrap());
        // Borrow is read-only on the source side.
        assert_eq!(sha256_file(&src).unwrap(), before);
    }

    #[test]
    fn test_debug_symbol_link_survives_the_copy() {
        let tmp = tempfile::TempDir::new().unwrap();
        let set = freestanding_set(tmp.path());

        let edges: Vec<BorrowEdge> = set.primary().borrows().to_vec();
        let source_env = set.get(&edges[0].source).unwrap().clone();

        for edge in edges.iter().filter(|e| {
            e.source_rel.ends_with("libstdc++.so.6")
                || e.source_rel.ends_with("libstdc++.so.6.debug")
        }) {
            let src = source_env.prefix().join(&edge.source_rel);
            crate::util::fs::write_file(&src, edge.source_rel.to_string_lossy().as_bytes())
                .unwrap();
            execute_borrow(&set, set.primary_id(), edge).unwrap();
        }

        // Library and split debug file land side by side under the same
        // names, so the debuglink convention still resolves.
        let runtime = set.primary().runtime_lib_dir();
        assert!(runtime.join("libstdc++.so.6").is_file());
        assert!(runtime.join("libstdc++.so.6.debug").is_file());
    }

    #[test]
    fn test_directory_borrow_copies_recursively() {
        let tmp = tempfile::TempDir::new().unwrap();
        let set = freestanding_set(tmp.path());

        let edges: Vec<BorrowEdge> = set.primary().borrows().to_vec();
        let scripts = edges
            .iter()
            .find(|e| e.source_rel.starts_with(PathBuf::from("share")))
            .unwrap();

        let source_env = set.get(&scripts.source).unwrap();
        let src_dir = source_env.prefix().join(&scripts.source_rel);
        crate::util::fs::write_file(&src_dir.join("python/printers.py"), "class P: pass")
            .unwrap();

        execute_borrow(&set, set.primary_id(), scripts).unwrap();

        let dst = set.primary().prefix().join(&scripts.dest_rel);
        assert!(dst.join("python/printers.py").is_file());
    }

    #[test]
    fn test_missing_source_fails() {
        let tmp = tempfile::TempDir::new().unwrap();
        let set = freestanding_set(tmp.path());
        let edge = set.primary().borrows()[0].clone();

        assert!(execute_borrow(&set, set.primary_id(), &edge).is_err());
    }
}
