use std::collections::HashMap;
use std::env;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::component::ComponentHandle;
use crate::error::NamespaceError;
use crate::namespace::NamespaceRef;
use crate::registry::NamespaceRegistry;

/// Version tag written at the head of every archive; readers reject anything
/// else. Increment on breaking changes to the field list below.
pub const ARCHIVE_FORMAT_VERSION: u32 = 1;

/// Environment variable naming the colon-separated directory list searched
/// for pre-compiled namespace archives.
pub const PATH_ENV_VARIABLE: &str = "DT_NAMESPACE_PATH";

/// Directory searched when the environment variable is unset, and substituted
/// for the `+` sentinel within it.
pub const DEFAULT_ARCHIVE_DIR: &str = "bindings/raw";

/// Sentinel path entry standing for [`DEFAULT_ARCHIVE_DIR`].
pub const DEFAULT_PATH_SENTINEL: &str = "+";

/// File extension identifying archive candidates during an index scan.
pub const ARCHIVE_EXTENSION: &str = "wxs";

/// The non-bound metadata of a namespace as persisted in an archive.
///
/// The bound prefix is deliberately excluded: bound namespaces are created by
/// the infrastructure at startup, never restored from a file. Context hints
/// carry URIs rather than [`NamespaceRef`]s, which are process-local.
///
/// The archive stream is, in order: `[version: u32][uri: String]
/// [ArchiveMetadata][category count: u64]` followed by one
/// `(tag: String, Vec<(local name, ComponentRecord)>)` per category. Index
/// scans read only the version and URI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct ArchiveMetadata {
    pub(crate) schema_location: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) module_path: Option<String>,
    pub(crate) binding_configuration: Option<String>,
    pub(crate) context_default_namespace: Option<String>,
    pub(crate) context_in_scope: Vec<(String, Option<String>)>,
}

/// One archived component: its kind tag and the payload its own serializer
/// produced. The local name lives in the enclosing category entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub kind: String,
    pub payload: Vec<u8>,
}

/// Context available to component serializers while a save is in progress.
pub struct ArchiveContext<'a> {
    registry: &'a NamespaceRegistry,
    namespace: NamespaceRef,
}

impl<'a> ArchiveContext<'a> {
    pub fn registry(&self) -> &NamespaceRegistry {
        self.registry
    }

    /// The namespace being serialized.
    pub fn namespace(&self) -> NamespaceRef {
        self.namespace
    }

    /// Validate that `component` belongs to the namespace being saved.
    /// Nested serializers use this to refuse embedding foreign components.
    pub fn ensure_local(&self, component: &ComponentHandle) -> Result<(), NamespaceError> {
        if self
            .registry
            .get(self.namespace)
            .components()
            .contains(component)
        {
            Ok(())
        } else {
            Err(NamespaceError::InvalidOperation(format!(
                "{} does not belong to namespace {} being serialized",
                component.diagnostic_label(),
                self.registry.get(self.namespace)
            )))
        }
    }
}

/// Reconstructs components from their archived records. Implemented by the
/// grammar layer, which owns the concrete component shapes.
pub trait ComponentDecoder {
    fn decode(
        &self,
        kind: &str,
        local_name: &str,
        payload: &[u8],
        target: NamespaceRef,
        registry: &mut NamespaceRegistry,
    ) -> Result<ComponentHandle, NamespaceError>;
}

/// Save `namespace`, with its category maps and their components, to `path`
/// so it can be loaded later. Absent namespaces cannot be serialized.
pub fn save(
    registry: &mut NamespaceRegistry,
    namespace: NamespaceRef,
    path: &Path,
) -> Result<(), NamespaceError> {
    if registry.get(namespace).is_absent_namespace() {
        return Err(NamespaceError::InvalidOperation(
            "absent namespaces cannot be serialized".into(),
        ));
    }
    registry.begin_serializing(namespace)?;
    let result = write_archive(registry, namespace, path);
    registry.end_serializing();
    result
}

fn write_archive(
    registry: &NamespaceRegistry,
    namespace: NamespaceRef,
    path: &Path,
) -> Result<(), NamespaceError> {
    let ns = registry.get(namespace);
    let uri = ns.uri().expect("absent namespaces were rejected above");
    let context = ArchiveContext {
        registry,
        namespace,
    };

    let mut writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(&mut writer, &ARCHIVE_FORMAT_VERSION)?;
    bincode::serialize_into(&mut writer, uri)?;
    bincode::serialize_into(&mut writer, &ns.archive_metadata())?;

    let category_count = ns.category_maps().count() as u64;
    bincode::serialize_into(&mut writer, &category_count)?;
    for map in ns.category_maps() {
        bincode::serialize_into(&mut writer, map.category())?;
        let mut entries: Vec<(String, ComponentRecord)> = Vec::with_capacity(map.len());
        for (local_name, component) in map.iter() {
            let record = ComponentRecord {
                kind: component.borrow().kind().to_string(),
                payload: component.borrow().archive_payload(&context)?,
            };
            entries.push((local_name.to_owned(), record));
        }
        bincode::serialize_into(&mut writer, &entries)?;
    }
    writer.flush()?;
    debug!(uri = %uri, path = %path.display(), "saved namespace archive");
    Ok(())
}

/// Load a namespace archive, identifying or creating the namespace instance
/// for its URI via the registry.
///
/// The whole stream is read before the registry is touched, so a malformed or
/// version-mismatched file never registers a partial namespace. The target
/// namespace's category maps must be empty: aggregating component sets from
/// multiple sources is unsupported (programmatic schema "include" being the
/// schema layer's own affair).
pub fn load(
    registry: &mut NamespaceRegistry,
    path: &Path,
    decoder: &dyn ComponentDecoder,
) -> Result<NamespaceRef, NamespaceError> {
    let mut reader = BufReader::new(File::open(path)?);

    let version: u32 = bincode::deserialize_from(&mut reader)?;
    if version != ARCHIVE_FORMAT_VERSION {
        return Err(NamespaceError::FormatMismatch {
            found: version,
            expected: ARCHIVE_FORMAT_VERSION,
        });
    }
    let uri: String = bincode::deserialize_from(&mut reader)?;
    let metadata: ArchiveMetadata = bincode::deserialize_from(&mut reader)?;
    let category_count: u64 = bincode::deserialize_from(&mut reader)?;
    let mut categories: Vec<(String, Vec<(String, ComponentRecord)>)> = Vec::new();
    for _ in 0..category_count {
        let tag: String = bincode::deserialize_from(&mut reader)?;
        let entries: Vec<(String, ComponentRecord)> = bincode::deserialize_from(&mut reader)?;
        categories.push((tag, entries));
    }

    // Re-loading an already-live namespace augments it rather than
    // duplicating it.
    let namespace = registry.get_or_create(&uri);
    if !registry.get(namespace).category_store_is_empty() {
        return Err(NamespaceError::InvalidOperation(format!(
            "namespace {uri} already holds components; merging archives is unsupported"
        )));
    }
    registry.get_mut(namespace).apply_archive_metadata(metadata);

    for (tag, entries) in categories {
        registry.get_mut(namespace).configure_categories(&[tag.as_str()]);
        for (local_name, record) in entries {
            let component =
                decoder.decode(&record.kind, &local_name, &record.payload, namespace, registry)?;
            let ns = registry.get_mut(namespace);
            ns.add_category_object(&tag, &local_name, component.clone())?;
            ns.associate_component(component);
        }
    }
    debug!(uri = %uri, "loaded namespace archive");
    Ok(namespace)
}

/// Read only the version tag and URI from the head of an archive.
pub fn read_archive_preface(path: &Path) -> Result<String, NamespaceError> {
    let mut reader = BufReader::new(File::open(path)?);
    let version: u32 = bincode::deserialize_from(&mut reader)?;
    if version != ARCHIVE_FORMAT_VERSION {
        return Err(NamespaceError::FormatMismatch {
            found: version,
            expected: ARCHIVE_FORMAT_VERSION,
        });
    }
    Ok(bincode::deserialize_from(&mut reader)?)
}

/// Map from namespace URIs to the archive files that provide them.
///
/// Building the index reads only each candidate's preface, never the
/// component graph; the full load happens lazily, when a namespace's
/// declarations are actually needed.
#[derive(Debug, Default)]
pub struct ArchiveIndex {
    by_uri: HashMap<String, PathBuf>,
}

impl ArchiveIndex {
    /// Scan the directories named by [`PATH_ENV_VARIABLE`] (or the built-in
    /// default location).
    pub fn scan_default() -> Self {
        let search_path =
            env::var(PATH_ENV_VARIABLE).unwrap_or_else(|_| DEFAULT_ARCHIVE_DIR.to_owned());
        let directories: Vec<PathBuf> = search_path
            .split(':')
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                if entry == DEFAULT_PATH_SENTINEL {
                    PathBuf::from(DEFAULT_ARCHIVE_DIR)
                } else {
                    PathBuf::from(entry)
                }
            })
            .collect();
        Self::scan_directories(&directories)
    }

    /// Index every readable archive in the given directories. The first
    /// directory providing a URI wins; unreadable candidates are skipped.
    pub fn scan_directories(directories: &[PathBuf]) -> Self {
        let mut by_uri = HashMap::new();
        for directory in directories {
            let entries = match fs::read_dir(directory) {
                Ok(entries) => entries,
                Err(error) => {
                    debug!(
                        directory = %directory.display(),
                        %error,
                        "skipping unreadable archive directory"
                    );
                    continue;
                }
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some(ARCHIVE_EXTENSION) {
                    continue;
                }
                match read_archive_preface(&path) {
                    Ok(uri) => {
                        debug!(uri = %uri, path = %path.display(), "indexed namespace archive");
                        by_uri.entry(uri).or_insert(path);
                    }
                    Err(error) => {
                        warn!(
                            path = %path.display(),
                            %error,
                            "ignoring malformed namespace archive"
                        );
                    }
                }
            }
        }
        Self { by_uri }
    }

    pub fn uris(&self) -> impl Iterator<Item = &str> {
        self.by_uri.keys().map(String::as_str)
    }

    pub fn path_for(&self, uri: &str) -> Option<&Path> {
        self.by_uri.get(uri).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.by_uri.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_uri.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{DecodeAnything, FakeComponent};

    fn scratch_dir(label: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("dt-namespace-{}-{}", label, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn populated_registry(uri: &str) -> (NamespaceRegistry, NamespaceRef) {
        let mut registry = NamespaceRegistry::new();
        let namespace = registry.get_or_create(uri);
        {
            let ns = registry.get_mut(namespace);
            ns.set_description("archive test namespace");
            ns.configure_categories(&["elementDeclaration", "typeDefinition"]);
        }
        for name in ["alpha", "beta"] {
            let component = FakeComponent::resolved_type(name)
                .in_namespace(namespace)
                .with_payload(name.as_bytes().to_vec())
                .handle();
            registry.get_mut(namespace).associate_component(component.clone());
            registry
                .get_mut(namespace)
                .add_category_object("typeDefinition", name, component)
                .unwrap();
        }
        (registry, namespace)
    }

    #[test]
    fn round_trip_reproduces_category_contents() {
        let dir = scratch_dir("round-trip");
        let path = dir.join("roundtrip.wxs");
        let uri = "urn:archive:round-trip";

        let (mut registry, namespace) = populated_registry(uri);
        save(&mut registry, namespace, &path).unwrap();
        assert!(registry.serializing_namespace().is_none());

        let mut fresh = NamespaceRegistry::new();
        let loaded = load(&mut fresh, &path, &DecodeAnything).unwrap();

        let ns = fresh.get(loaded);
        assert_eq!(ns.uri(), Some(uri));
        assert_eq!(ns.description(), Some("archive test namespace"));
        let pairs: Vec<(String, String)> = ns
            .category_maps()
            .flat_map(|map| {
                map.iter()
                    .map(|(name, _)| (map.category().to_owned(), name.to_owned()))
            })
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("typeDefinition".to_owned(), "alpha".to_owned()),
                ("typeDefinition".to_owned(), "beta".to_owned()),
            ]
        );
        assert_eq!(ns.components().len(), 2);
        assert!(ns
            .category_map("elementDeclaration")
            .is_some_and(|map| map.is_empty()));
    }

    #[test]
    fn saving_an_absent_namespace_is_rejected() {
        let dir = scratch_dir("absent");
        let mut registry = NamespaceRegistry::new();
        let absent = registry.create_absent_namespace();
        let err = save(&mut registry, absent, &dir.join("absent.wxs"))
            .expect_err("absent namespaces cannot be serialized");
        assert!(matches!(err, NamespaceError::InvalidOperation(_)));
        assert!(registry.serializing_namespace().is_none());
    }

    #[test]
    fn version_mismatch_fails_without_registering() {
        let dir = scratch_dir("version");
        let path = dir.join("stale.wxs");
        let uri = "urn:archive:stale";
        {
            let mut writer = BufWriter::new(File::create(&path).unwrap());
            bincode::serialize_into(&mut writer, &(ARCHIVE_FORMAT_VERSION + 1)).unwrap();
            bincode::serialize_into(&mut writer, uri).unwrap();
        }

        let mut registry = NamespaceRegistry::new();
        let err = load(&mut registry, &path, &DecodeAnything)
            .expect_err("stale format version must be rejected");
        assert!(matches!(
            err,
            NamespaceError::FormatMismatch {
                found,
                expected: ARCHIVE_FORMAT_VERSION,
            } if found == ARCHIVE_FORMAT_VERSION + 1
        ));
        assert!(registry.lookup(uri).is_none());
    }

    #[test]
    fn loading_into_a_populated_namespace_is_rejected() {
        let dir = scratch_dir("merge");
        let path = dir.join("merge.wxs");
        let uri = "urn:archive:merge";

        let (mut registry, namespace) = populated_registry(uri);
        save(&mut registry, namespace, &path).unwrap();

        // The same registry still holds the components; merging is refused.
        let err = load(&mut registry, &path, &DecodeAnything)
            .expect_err("duplicate aggregation is unsupported");
        assert!(matches!(err, NamespaceError::InvalidOperation(_)));
    }

    #[test]
    fn index_scan_reads_prefaces_only() {
        let dir = scratch_dir("index");
        let uri = "urn:archive:indexed";
        let (mut registry, namespace) = populated_registry(uri);
        save(&mut registry, namespace, &dir.join("indexed.wxs")).unwrap();
        fs::write(dir.join("ignored.txt"), b"not an archive").unwrap();
        fs::write(dir.join("garbage.wxs"), b"\xff\xff\xff").unwrap();

        let index = ArchiveIndex::scan_directories(&[dir]);
        assert_eq!(index.len(), 1);
        assert!(index.path_for(uri).is_some());
        assert!(index.path_for("urn:archive:other").is_none());
    }

    #[test]
    fn reentrant_schema_load_is_rejected() {
        /// Decoder that tries to re-enter the load of the namespace it is
        /// decoding for, as a defective grammar layer might.
        struct ReentrantDecoder;

        impl ComponentDecoder for ReentrantDecoder {
            fn decode(
                &self,
                _kind: &str,
                _local_name: &str,
                _payload: &[u8],
                target: NamespaceRef,
                registry: &mut NamespaceRegistry,
            ) -> Result<ComponentHandle, NamespaceError> {
                registry.load_namespace_schema(target, &DecodeAnything)?;
                unreachable!("re-entering the load must fail");
            }
        }

        let dir = scratch_dir("reentrant");
        let uri = "urn:archive:reentrant";
        let (mut registry, namespace) = populated_registry(uri);
        save(&mut registry, namespace, &dir.join("reentrant.wxs")).unwrap();

        let mut fresh = NamespaceRegistry::new();
        fresh.set_archive_index(ArchiveIndex::scan_directories(&[dir]));
        let ns = fresh.get_or_create(uri);
        let err = fresh
            .load_namespace_schema(ns, &ReentrantDecoder)
            .expect_err("nested load of the same namespace is caller misuse");
        assert!(matches!(err, NamespaceError::InvalidOperation(_)));
        // The guard is released even though the load failed.
        assert!(!fresh.get(ns).in_schema_load);
    }

    #[test]
    fn available_for_load_exposes_indexed_uris() {
        let dir = scratch_dir("available");
        let uri = "urn:archive:available";
        let (mut registry, namespace) = populated_registry(uri);
        save(&mut registry, namespace, &dir.join("available.wxs")).unwrap();

        let mut fresh = NamespaceRegistry::new();
        fresh.set_archive_index(ArchiveIndex::scan_directories(&[dir]));
        assert_eq!(fresh.available_for_load(), vec![uri.to_owned()]);

        let ns = fresh.get_or_create(uri);
        assert!(fresh.load_namespace_schema(ns, &DecodeAnything).unwrap());
        assert_eq!(fresh.get(ns).components().len(), 2);

        // A namespace with no discoverable archive is simply not loaded.
        let other = fresh.get_or_create("urn:archive:nowhere");
        assert!(!fresh.load_namespace_schema(other, &DecodeAnything).unwrap());
    }
}
