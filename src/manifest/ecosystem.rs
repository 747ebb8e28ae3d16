//! Installer-facing manifest generation
//!
//! The installer collaborator only understands its own ecosystem files, so
//! before an install the declared dependencies are rendered into
//! `package.json` (registry), `bower.json` (vcs) and the `.bowerrc`
//! directory mapping. The files are registered with the run scope and
//! removed during cleanup.

use crate::error::{DepcacheError, DepcacheResult};
use crate::manifest::{DependencyKind, DependencyManifest, DependencyRoots};
use crate::pipeline::RunScope;
use serde_json::{json, Map, Value};
use tokio::fs;
use tracing::debug;

/// npm manifest
pub const NPM_MANIFEST: &str = "package.json";
/// bower manifest
pub const BOWER_MANIFEST: &str = "bower.json";
/// bower directory mapping
pub const BOWER_RC: &str = ".bowerrc";

/// Names of every file [`write_installer_manifests`] may create
pub const GENERATED_FILES: [&str; 3] = [BOWER_RC, NPM_MANIFEST, BOWER_MANIFEST];

/// A rendered installer manifest
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedFile {
    pub name: &'static str,
    pub contents: Value,
}

/// Render the installer manifests for `manifest`
pub fn render(manifest: &DependencyManifest, roots: &DependencyRoots) -> Vec<GeneratedFile> {
    let registry: Map<String, Value> = manifest
        .of_kind(DependencyKind::Registry)
        .filter_map(|dep| {
            dep.version
                .as_ref()
                .map(|version| (dep.name.clone(), Value::String(version.clone())))
        })
        .collect();

    let vcs: Map<String, Value> = manifest
        .of_kind(DependencyKind::Vcs)
        .filter_map(|dep| match (&dep.repo, &dep.reference) {
            (Some(repo), Some(reference)) => {
                Some((dep.name.clone(), Value::String(format!("{repo}#{reference}"))))
            }
            _ => None,
        })
        .collect();

    vec![
        GeneratedFile {
            name: BOWER_RC,
            contents: json!({ "directory": roots.vcs.path.to_string_lossy() }),
        },
        GeneratedFile {
            name: NPM_MANIFEST,
            contents: json!({
                "name": "depcache-install",
                "private": true,
                "dependencies": registry,
            }),
        },
        GeneratedFile {
            name: BOWER_MANIFEST,
            contents: json!({
                "name": "depcache-install",
                "dependencies": vcs,
                "resolutions": manifest.resolutions(),
            }),
        },
    ]
}

/// Write the installer manifests into the scope's working directory.
///
/// Existing files are never overwritten: they belong to the project, and
/// cleanup would otherwise delete them.
pub async fn write_installer_manifests(
    manifest: &DependencyManifest,
    roots: &DependencyRoots,
    scope: &RunScope,
) -> DepcacheResult<()> {
    let files = render(manifest, roots);

    for file in &files {
        let path = scope.work_dir().join(file.name);
        if path.exists() {
            return Err(DepcacheError::GeneratedFileExists(path));
        }
    }

    for file in files {
        let path = scope.work_dir().join(file.name);
        let content = serde_json::to_string_pretty(&file.contents)?;
        scope.track_generated(path.clone());
        fs::write(&path, content)
            .await
            .map_err(|e| DepcacheError::io(format!("writing {}", path.display()), e))?;
        debug!("Generated {}", path.display());
    }

    Ok(())
}
