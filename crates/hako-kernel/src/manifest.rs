//! Capability manifest — the restricted set of modules fragments may use.
//!
//! At engine start the `ManifestBuilder` enumerates the modules visible to
//! the host, introspects each module's type surface for capability markers,
//! and excludes any module carrying a denied marker. The result is an
//! immutable `CapabilityManifest` shared read-only by every execution.
//!
//! Filtering is exclusion-based: known-risky capabilities are denied rather
//! than safe modules being allow-listed. A module whose surface cannot be
//! introspected is skipped silently — the sandbox stays available even when
//! the catalog is incomplete.

use std::collections::BTreeSet;

use thiserror::Error;

/// Capability markers a module's type surface can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    /// Raw filesystem primitives (open/unlink on host paths).
    FsRaw,
    /// Host process control (spawn/signal/exit).
    ProcessControl,
    /// Raw socket access.
    NetRaw,
    /// Unsafe/unchecked code surfaces.
    UnsafeCode,
}

/// The introspected type surface of one host module.
#[derive(Debug, Clone)]
pub struct ModuleSurface {
    /// Module name as fragments reference it.
    pub name: String,
    /// Capability markers found on the module's types.
    pub capabilities: BTreeSet<Capability>,
}

impl ModuleSurface {
    /// A surface with no capability markers.
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capabilities: BTreeSet::new(),
        }
    }

    /// A surface carrying the given markers.
    pub fn with_capabilities(
        name: impl Into<String>,
        caps: impl IntoIterator<Item = Capability>,
    ) -> Self {
        Self {
            name: name.into(),
            capabilities: caps.into_iter().collect(),
        }
    }
}

/// Failure to introspect a module's type surface.
#[derive(Debug, Clone, Error)]
#[error("cannot introspect module {module}: {reason}")]
pub struct IntrospectError {
    /// The module that failed.
    pub module: String,
    /// Why introspection failed.
    pub reason: String,
}

/// Enumerates the modules visible to the host process.
///
/// This is the seam that stands in for runtime reflection: the host supplies
/// whatever catalog it actually links.
pub trait ModuleEnumerator: Send + Sync {
    /// Names of all modules visible to the host.
    fn names(&self) -> Vec<String>;

    /// Introspect one module's type surface.
    fn introspect(&self, name: &str) -> Result<ModuleSurface, IntrospectError>;
}

/// Default enumerator backed by a fixed catalog of the host's built-ins.
pub struct StaticModules {
    modules: Vec<ModuleSurface>,
}

impl StaticModules {
    /// The host's built-in module catalog.
    pub fn host_defaults() -> Self {
        Self {
            modules: vec![
                ModuleSurface::plain("core"),
                ModuleSurface::plain("collections"),
                ModuleSurface::plain("text"),
                ModuleSurface::plain("terminal"),
                ModuleSurface::plain("peripherals"),
                ModuleSurface::with_capabilities("fs", [Capability::FsRaw]),
                ModuleSurface::with_capabilities("proc", [Capability::ProcessControl]),
                ModuleSurface::with_capabilities("net", [Capability::NetRaw]),
            ],
        }
    }

    /// A catalog built from explicit surfaces (tests, embedders).
    pub fn from_surfaces(modules: Vec<ModuleSurface>) -> Self {
        Self { modules }
    }
}

impl ModuleEnumerator for StaticModules {
    fn names(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.name.clone()).collect()
    }

    fn introspect(&self, name: &str) -> Result<ModuleSurface, IntrospectError> {
        self.modules
            .iter()
            .find(|m| m.name == name)
            .cloned()
            .ok_or_else(|| IntrospectError {
                module: name.to_string(),
                reason: "unknown module".to_string(),
            })
    }
}

/// The restricted set of modules and default imports, immutable once built.
#[derive(Debug, Clone)]
pub struct CapabilityManifest {
    modules: BTreeSet<String>,
    imports: Vec<String>,
}

impl CapabilityManifest {
    /// True if fragments may reference `module`.
    pub fn allows(&self, module: &str) -> bool {
        self.modules.contains(module)
    }

    /// All allowed module references, sorted.
    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(String::as_str)
    }

    /// Namespaces imported into every fragment by default.
    pub fn imports(&self) -> &[String] {
        &self.imports
    }
}

/// Builds the `CapabilityManifest` once, at engine start.
pub struct ManifestBuilder {
    denied: BTreeSet<Capability>,
    imports: Vec<String>,
}

impl ManifestBuilder {
    /// A builder with the standard denials: raw filesystem and process
    /// control are excluded from sandboxed code.
    pub fn new() -> Self {
        Self {
            denied: [Capability::FsRaw, Capability::ProcessControl]
                .into_iter()
                .collect(),
            imports: vec![
                "core".to_string(),
                "collections".to_string(),
                "text".to_string(),
            ],
        }
    }

    /// Deny an additional capability marker.
    pub fn deny(mut self, cap: Capability) -> Self {
        self.denied.insert(cap);
        self
    }

    /// Replace the default import list.
    pub fn default_imports(mut self, imports: impl IntoIterator<Item = String>) -> Self {
        self.imports = imports.into_iter().collect();
        self
    }

    /// Enumerate, introspect, filter, and produce the manifest.
    ///
    /// Modules whose introspection fails are skipped rather than aborting
    /// construction.
    pub fn build(self, source: &dyn ModuleEnumerator) -> CapabilityManifest {
        let mut modules = BTreeSet::new();

        for name in source.names() {
            let surface = match source.introspect(&name) {
                Ok(surface) => surface,
                Err(e) => {
                    tracing::debug!(module = %name, "skipping module: {}", e);
                    continue;
                }
            };

            if surface.capabilities.iter().any(|c| self.denied.contains(c)) {
                tracing::debug!(module = %name, "excluded by capability filter");
                continue;
            }

            modules.insert(surface.name);
        }

        tracing::debug!(allowed = modules.len(), "capability manifest built");
        CapabilityManifest {
            modules,
            imports: self.imports,
        }
    }
}

impl Default for ManifestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_denials_exclude_fs_and_proc() {
        let manifest = ManifestBuilder::new().build(&StaticModules::host_defaults());
        assert!(manifest.allows("core"));
        assert!(manifest.allows("collections"));
        assert!(manifest.allows("terminal"));
        assert!(!manifest.allows("fs"));
        assert!(!manifest.allows("proc"));
        // net is risky but not denied by default
        assert!(manifest.allows("net"));
    }

    #[test]
    fn extra_denials_apply() {
        let manifest = ManifestBuilder::new()
            .deny(Capability::NetRaw)
            .build(&StaticModules::host_defaults());
        assert!(!manifest.allows("net"));
    }

    #[test]
    fn uninspectable_module_is_skipped_silently() {
        struct Flaky;
        impl ModuleEnumerator for Flaky {
            fn names(&self) -> Vec<String> {
                vec!["good".into(), "broken".into()]
            }
            fn introspect(&self, name: &str) -> Result<ModuleSurface, IntrospectError> {
                if name == "broken" {
                    Err(IntrospectError {
                        module: name.to_string(),
                        reason: "metadata unreadable".to_string(),
                    })
                } else {
                    Ok(ModuleSurface::plain(name))
                }
            }
        }

        let manifest = ManifestBuilder::new().build(&Flaky);
        assert!(manifest.allows("good"));
        assert!(!manifest.allows("broken"));
    }

    #[test]
    fn default_imports_present() {
        let manifest = ManifestBuilder::new().build(&StaticModules::host_defaults());
        assert!(manifest.imports().contains(&"core".to_string()));
    }
}
