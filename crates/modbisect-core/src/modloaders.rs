//! Mod discovery: scan the mod directory for jars and read their loader metadata
//! (fabric.mod.json / quilt.mod.json) for id, display name and declared dependencies.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error_handling::{configuration_error, io_error, BisectError};
use crate::graph::{ModId, ModSet};
use crate::jar::JarReader;
use crate::utils;

pub const DISABLED_SUFFIX: &str = ".disabled";
pub const FABRIC_FILE: &str = "fabric.mod.json";
pub const QUILT_FILE: &str = "quilt.mod.json";

/// One mod file in the mod directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModEntry {
    pub id: ModId,
    pub name: String,
    /// Path relative to the mod root, always without the `.disabled` suffix.
    pub path: PathBuf,
    pub enabled: bool,
    /// Dependencies declared in the mod's own metadata (may name non-mod ids like `minecraft`).
    pub depends: Vec<ModId>,
}

impl ModEntry {
    /// (enabled path, disabled path) under `root`.
    pub fn paths(&self, root: &Path) -> (PathBuf, PathBuf) {
        let enabled = root.join(&self.path);
        let mut disabled_name = enabled.as_os_str().to_os_string();
        disabled_name.push(DISABLED_SUFFIX);
        (enabled, PathBuf::from(disabled_name))
    }
}

#[derive(Clone, Debug, Default)]
pub struct ModIndex {
    pub root: PathBuf,
    pub mods: BTreeMap<ModId, ModEntry>,
}

impl ModIndex {
    pub fn ids(&self) -> ModSet {
        self.mods.keys().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<&ModEntry> {
        self.mods.get(id)
    }

    pub fn enabled_ids(&self) -> ModSet {
        self.mods
            .values()
            .filter(|m| m.enabled)
            .map(|m| m.id.clone())
            .collect()
    }

    /// True when exactly `enabled` is active on disk.
    pub fn is_applied(&self, enabled: &ModSet) -> bool {
        self.enabled_ids() == *enabled
    }

    pub fn declared_deps(&self) -> BTreeMap<ModId, Vec<ModId>> {
        self.mods
            .values()
            .filter(|m| !m.depends.is_empty())
            .map(|m| (m.id.clone(), m.depends.clone()))
            .collect()
    }

    /// sha256 over sorted `(id, path)` pairs. Changes when mods are added, removed,
    /// renamed or replaced by a different file; enabling/disabling does not change it.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for entry in self.mods.values() {
            hasher.update(entry.id.as_bytes());
            hasher.update(b"\t");
            hasher.update(entry.path.to_string_lossy().replace('\\', "/").as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Deserialize)]
struct FabricMod {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    depends: BTreeMap<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct QuiltMod {
    quilt_loader: QuiltLoader,
}

#[derive(Deserialize)]
struct QuiltLoader {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    metadata: Option<QuiltMetadata>,
    #[serde(default)]
    depends: Vec<QuiltDepends>,
}

#[derive(Deserialize)]
struct QuiltMetadata {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QuiltDepends {
    Id(String),
    Object { id: String },
}

/// Parsed loader metadata: (id, name, declared dependencies).
type ModMeta = (ModId, String, Vec<ModId>);

/// Some mods ship manifests with raw newlines inside strings; strip them before parsing.
fn clean_json(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).replace(['\n', '\r'], "")
}

pub fn parse_fabric(bytes: &[u8]) -> Result<ModMeta, String> {
    let m: FabricMod =
        serde_json::from_str(&clean_json(bytes)).map_err(|e| format!("{}: {}", FABRIC_FILE, e))?;
    let name = m.name.unwrap_or_else(|| m.id.clone());
    Ok((m.id, name, m.depends.into_keys().collect()))
}

pub fn parse_quilt(bytes: &[u8]) -> Result<ModMeta, String> {
    let m: QuiltMod =
        serde_json::from_str(&clean_json(bytes)).map_err(|e| format!("{}: {}", QUILT_FILE, e))?;
    let loader = m.quilt_loader;
    let name = loader
        .name
        .or_else(|| loader.metadata.and_then(|md| md.name))
        .unwrap_or_else(|| loader.id.clone());
    let depends = loader
        .depends
        .into_iter()
        .map(|d| match d {
            QuiltDepends::Id(id) | QuiltDepends::Object { id } => id,
        })
        .collect();
    Ok((loader.id, name, depends))
}

/// Read loader metadata from a jar. Fabric first, then Quilt.
pub fn read_mod_meta(jar_path: &Path) -> Result<Option<ModMeta>, String> {
    let mut jar = JarReader::open(jar_path)?;
    if let Some(bytes) = jar.read(FABRIC_FILE)? {
        return parse_fabric(&bytes).map(Some);
    }
    if let Some(bytes) = jar.read(QUILT_FILE)? {
        return parse_quilt(&bytes).map(Some);
    }
    Ok(None)
}

fn is_mod_file(name: &str) -> bool {
    name.ends_with(".jar") || name.ends_with(".jar.disabled")
}

fn find_mod_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), BisectError> {
    let entries = fs::read_dir(dir).map_err(|e| io_error("scan mods", Some(dir), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_error("scan mods", Some(dir), e))?;
        let path = entry.path();
        if path.is_dir() {
            find_mod_files(&path, out)?;
        } else if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(is_mod_file)
        {
            out.push(path);
        }
    }
    Ok(())
}

/// Scan `root` recursively for `*.jar` / `*.jar.disabled` and build the index.
/// Jars without readable loader metadata fall back to their file stem as id.
pub fn load_mods(root: &Path) -> Result<ModIndex, BisectError> {
    if !root.is_dir() {
        return Err(configuration_error(
            "scan mods",
            vec![format!("mod directory {} does not exist", root.display())],
        ));
    }
    let mut files = Vec::new();
    find_mod_files(root, &mut files)?;
    files.sort();

    let mut index = ModIndex {
        root: root.to_path_buf(),
        mods: BTreeMap::new(),
    };
    let mut issues = Vec::new();

    for file in files {
        let rel = file.strip_prefix(root).unwrap_or(&file).to_path_buf();
        let rel_str = rel.to_string_lossy().to_string();
        let (path, enabled) = match rel_str.strip_suffix(DISABLED_SUFFIX) {
            Some(stripped) => (PathBuf::from(stripped), false),
            None => (rel.clone(), true),
        };

        let (id, name, depends) = match read_mod_meta(&file) {
            Ok(Some(meta)) => meta,
            Ok(None) | Err(_) => {
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| rel_str.clone());
                utils::log(&format!(
                    "No loader metadata in {}; using `{}` as its id",
                    rel.display(),
                    stem
                ));
                (stem.clone(), stem, Vec::new())
            }
        };

        if let Some(existing) = index.mods.get(&id) {
            if existing.path == path {
                issues.push(format!(
                    "both {} and {}{} exist",
                    path.display(),
                    path.display(),
                    DISABLED_SUFFIX
                ));
            } else {
                issues.push(format!(
                    "mod id `{}` is provided by both {} and {}",
                    id,
                    existing.path.display(),
                    path.display()
                ));
            }
            continue;
        }

        index.mods.insert(
            id.clone(),
            ModEntry {
                id,
                name,
                path,
                enabled,
                depends,
            },
        );
    }

    if !issues.is_empty() {
        return Err(configuration_error("scan mods", issues));
    }
    utils::log(&format!("Loaded {} mods from {}", index.mods.len(), root.display()));
    Ok(index)
}
