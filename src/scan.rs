use crate::{order::ModEntry, submodule};
use anyhow::{bail, Result};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

#[derive(Debug, Default)]
pub struct ScanResult {
    pub entries: Vec<ModEntry>,
    pub warnings: Vec<String>,
}

/// Discovers installed modules by reading `Modules/*/SubModule.xml`.
/// Malformed or duplicate manifests become warnings, not failures; the
/// first manifest claiming an id wins.
pub fn scan_modules(modules_dir: &Path) -> Result<ScanResult> {
    if !modules_dir.is_dir() {
        bail!("modules dir not found: {}", modules_dir.display());
    }

    let mut manifests: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(modules_dir)
        .min_depth(2)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        if entry
            .file_name()
            .to_string_lossy()
            .eq_ignore_ascii_case("SubModule.xml")
        {
            manifests.push(entry.path().to_path_buf());
        }
    }

    let mut result = ScanResult::default();
    let mut seen: HashSet<String> = HashSet::new();
    for path in manifests {
        let Some(info) = submodule::read_submodule_xml(&path) else {
            result
                .warnings
                .push(format!("Unreadable manifest: {}", path.display()));
            continue;
        };
        if info.id.trim().is_empty() {
            result
                .warnings
                .push(format!("No module id in {}", path.display()));
            continue;
        }
        if !seen.insert(info.id.clone()) {
            result.warnings.push(format!(
                "Duplicate module id {} in {} (kept first)",
                info.id,
                path.display()
            ));
            continue;
        }
        result.entries.push(ModEntry {
            id: info.id,
            name: info.name,
            version: info.version,
            dependencies: info.dependencies,
            incompatible: info.incompatible,
            official: info.official,
            enabled: true,
            has_conflicts: false,
        });
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_manifest(root: &Path, dir: &str, id: &str, deps: &[&str]) {
        let module_dir = root.join(dir);
        fs::create_dir_all(&module_dir).unwrap();
        let deps: String = deps
            .iter()
            .map(|dep| format!("    <DependedModule Id=\"{dep}\"/>\n"))
            .collect();
        let xml = format!(
            "<Module>\n  <Id value=\"{id}\"/>\n  <Name value=\"{id}\"/>\n  \
             <Version value=\"v1.0.0\"/>\n  <DependedModules>\n{deps}  </DependedModules>\n</Module>\n"
        );
        fs::write(module_dir.join("SubModule.xml"), xml).unwrap();
    }

    #[test]
    fn scans_modules_in_directory_name_order() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(tmp.path(), "Beta", "Beta", &["Alpha"]);
        write_manifest(tmp.path(), "Alpha", "Alpha", &[]);
        let result = scan_modules(tmp.path()).unwrap();
        let ids: Vec<&str> = result.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["Alpha", "Beta"]);
        assert_eq!(result.entries[1].dependencies, vec!["Alpha"]);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn duplicate_ids_keep_first_and_warn() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(tmp.path(), "AAA", "Same", &[]);
        write_manifest(tmp.path(), "BBB", "Same", &["Extra"]);
        let result = scan_modules(tmp.path()).unwrap();
        assert_eq!(result.entries.len(), 1);
        assert!(result.entries[0].dependencies.is_empty());
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("Duplicate module id Same"));
    }

    #[test]
    fn manifests_without_ids_warn() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("Broken");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("SubModule.xml"), "<Module><Name value=\"x\"/></Module>").unwrap();
        let result = scan_modules(tmp.path()).unwrap();
        assert!(result.entries.is_empty());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn missing_modules_dir_fails() {
        assert!(scan_modules(Path::new("/nonexistent/Modules")).is_err());
    }
}
