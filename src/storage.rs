//! Reading metamodels and item snapshots from disk, and writing artifacts.
//!
//! Item snapshots are JSON or YAML documents in one of three shapes:
//!
//! - a `needs.json` export: `{"versions": {"1.0": {"needs": {id: {...}}}}}`
//! - `{"items": {id: {...}}}` or `{"items": [{...}]}`
//! - a bare list of items
//!
//! A directory is walked recursively and every snapshot in it is loaded.

use std::{
    collections::BTreeMap,
    ffi::OsStr,
    fs, io,
    path::{Path, PathBuf},
};

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::domain::{
    loader, DuplicateItemError, FieldValue, Item, ItemGraph, Location, Metamodel, MetamodelError,
    MetamodelSource,
};

const SNAPSHOT_EXTENSIONS: &[&str] = &["json", "yaml", "yml"];

/// An error reading or writing files.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A file could not be read.
    #[error("failed to read '{}': {source}", path.display())]
    Read {
        /// The file.
        path: PathBuf,
        /// The I/O error.
        source: io::Error,
    },
    /// A file could not be written.
    #[error("failed to write '{}': {source}", path.display())]
    Write {
        /// The file.
        path: PathBuf,
        /// The I/O error.
        source: io::Error,
    },
    /// A JSON file could not be parsed.
    #[error("failed to parse '{}': {source}", path.display())]
    Json {
        /// The file.
        path: PathBuf,
        /// The parse error.
        source: serde_json::Error,
    },
    /// A YAML file could not be parsed.
    #[error("failed to parse '{}': {source}", path.display())]
    Yaml {
        /// The file.
        path: PathBuf,
        /// The parse error.
        source: serde_yaml::Error,
    },
    /// The metamodel is invalid.
    #[error("invalid metamodel '{}': {source}", path.display())]
    Metamodel {
        /// The metamodel file.
        path: PathBuf,
        /// Why loading failed.
        source: MetamodelError,
    },
    /// A list entry has no `id`.
    #[error("'{}' contains an item without an id", path.display())]
    MissingId {
        /// The snapshot file.
        path: PathBuf,
    },
    /// Two snapshots define the same item.
    #[error("'{}': {source}", path.display())]
    DuplicateItem {
        /// The snapshot that redefined the item.
        path: PathBuf,
        /// The duplicate id.
        source: DuplicateItemError,
    },
    /// An artifact could not be serialized.
    #[error("failed to serialize '{}': {source}", path.display())]
    Serialize {
        /// The artifact file.
        path: PathBuf,
        /// The serialization error.
        source: serde_json::Error,
    },
}

/// Reads the metamodel text.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn read_metamodel(path: &Path) -> Result<String, StorageError> {
    fs::read_to_string(path).map_err(|source| StorageError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads and resolves the metamodel.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the metamodel is invalid.
#[instrument(level = "debug")]
pub fn load_metamodel(path: &Path) -> Result<Metamodel, StorageError> {
    let text = read_metamodel(path)?;
    MetamodelSource::from_yaml(&text)
        .and_then(loader::load)
        .map_err(|source| StorageError::Metamodel {
            path: path.to_path_buf(),
            source,
        })
}

/// Loads items from a snapshot file or a directory of snapshots.
///
/// # Errors
///
/// Returns an error if a snapshot cannot be read or parsed, or if an item id
/// appears twice.
#[instrument(level = "debug")]
pub fn load_items(path: &Path) -> Result<ItemGraph, StorageError> {
    let paths = if path.is_dir() {
        collect_snapshot_paths(path)
    } else {
        vec![path.to_path_buf()]
    };

    let snapshots: Vec<(PathBuf, Vec<Item>)> = paths
        .par_iter()
        .map(|path| load_snapshot(path).map(|items| (path.clone(), items)))
        .collect::<Result<_, _>>()?;

    let mut graph = ItemGraph::new();
    for (path, items) in snapshots {
        debug!(path = %path.display(), items = items.len(), "loaded snapshot");
        for item in items {
            graph
                .insert(item)
                .map_err(|source| StorageError::DuplicateItem {
                    path: path.clone(),
                    source,
                })?;
        }
    }
    Ok(graph)
}

/// Writes a value as pretty-printed JSON, creating parent directories.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized or the file cannot be
/// written.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let content = serde_json::to_string_pretty(value).map_err(|source| StorageError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;

    let write_error = |source| StorageError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_error)?;
    }
    fs::write(path, content + "\n").map_err(write_error)
}

fn collect_snapshot_paths(root: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(OsStr::to_str)
                .is_some_and(|extension| SNAPSHOT_EXTENSIONS.contains(&extension))
        })
        .map(walkdir::DirEntry::into_path)
        .collect();
    // loading order decides which file a duplicate is reported against
    paths.sort();
    paths
}

fn load_snapshot(path: &Path) -> Result<Vec<Item>, StorageError> {
    let content = fs::read_to_string(path).map_err(|source| StorageError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let snapshot: Snapshot = match path.extension().and_then(OsStr::to_str) {
        Some("yaml" | "yml") => {
            serde_yaml::from_str(&content).map_err(|source| StorageError::Yaml {
                path: path.to_path_buf(),
                source,
            })?
        }
        _ => serde_json::from_str(&content).map_err(|source| StorageError::Json {
            path: path.to_path_buf(),
            source,
        })?,
    };

    snapshot
        .into_raw_items()
        .into_iter()
        .map(|(key, raw)| {
            raw.into_item(key).ok_or_else(|| StorageError::MissingId {
                path: path.to_path_buf(),
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Snapshot {
    Export {
        current_version: Option<String>,
        versions: BTreeMap<String, ExportVersion>,
    },
    Items {
        items: RawItems,
    },
    List(Vec<RawItem>),
}

#[derive(Debug, Deserialize)]
struct ExportVersion {
    #[serde(default)]
    needs: BTreeMap<String, RawItem>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawItems {
    Map(BTreeMap<String, RawItem>),
    List(Vec<RawItem>),
}

impl Snapshot {
    /// Flattens the snapshot into items, each with the map key it was stored
    /// under (if any).
    fn into_raw_items(self) -> Vec<(Option<String>, RawItem)> {
        match self {
            Self::Export {
                current_version,
                mut versions,
            } => {
                let version = current_version
                    .and_then(|current| versions.remove(&current))
                    .or_else(|| versions.pop_last().map(|(_, version)| version));
                version.map(|version| keyed(version.needs)).unwrap_or_default()
            }
            Self::Items {
                items: RawItems::Map(map),
            } => keyed(map),
            Self::Items {
                items: RawItems::List(list),
            }
            | Self::List(list) => list.into_iter().map(|raw| (None, raw)).collect(),
        }
    }
}

fn keyed(map: BTreeMap<String, RawItem>) -> Vec<(Option<String>, RawItem)> {
    map.into_iter().map(|(key, raw)| (Some(key), raw)).collect()
}

#[derive(Debug, Deserialize)]
struct RawItem {
    id: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    is_external: bool,
    docname: Option<String>,
    lineno: Option<u32>,
    #[serde(flatten)]
    fields: BTreeMap<String, serde_json::Value>,
}

impl RawItem {
    fn into_item(self, key: Option<String>) -> Option<Item> {
        let id = self.id.or(key)?;
        let mut item = Item::new(id, self.kind);
        if self.is_external {
            item = item.external();
        }
        if let Some(docname) = self.docname {
            item = item.with_location(Location {
                docname,
                lineno: self.lineno,
            });
        }
        for (name, value) in self.fields {
            if let Some(value) = field_value(value) {
                item.set_field(name, value);
            }
        }
        Some(item)
    }
}

fn field_value(value: serde_json::Value) -> Option<FieldValue> {
    use serde_json::Value;

    match value {
        Value::Null | Value::Object(_) => None,
        Value::String(text) => Some(FieldValue::Text(text)),
        Value::Array(values) => Some(FieldValue::List(
            values.into_iter().filter_map(scalar).collect(),
        )),
        scalar_value => scalar(scalar_value).map(FieldValue::Text),
    }
}

fn scalar(value: serde_json::Value) -> Option<String> {
    use serde_json::Value;

    match value {
        Value::String(text) => Some(text),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
