use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use lazy_static::lazy_static;
use tracing::debug;

use crate::archive::{self, ArchiveIndex, ComponentDecoder};
use crate::context::PrefixMap;
use crate::error::NamespaceError;
use crate::namespace::{Namespace, NamespaceOptions, NamespaceRef};

// Namespaces known to the infrastructure (pt. 1, §1.3.1 and the namespaces
// recommendation).
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const XS_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
pub const XHTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";
pub const HFP_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-hasFacetAndProperty";

lazy_static! {
    /// Prefixes usable without any declaration, per the namespaces
    /// recommendation: xml is reserved, and xsi is treated the same way by
    /// the schema specification.
    static ref UNDECLARED_PREFIXES: HashMap<&'static str, &'static str> = {
        let mut prefixes = HashMap::new();
        prefixes.insert("xml", XML_NAMESPACE);
        prefixes.insert("xsi", XSI_NAMESPACE);
        prefixes
    };
}

struct BuiltinDescriptor {
    uri: &'static str,
    bound_prefix: Option<&'static str>,
    schema_location: Option<&'static str>,
    description: &'static str,
    is_undeclared: bool,
    context_default_namespace: Option<&'static str>,
    /// (prefix, URI) pairs; a `None` URI denotes the namespace itself.
    context_in_scope: &'static [(&'static str, Option<&'static str>)],
}

// XMLSchema-instance must come first; its presence marks the namespace
// system as initialized.
const BUILTIN_NAMESPACES: &[BuiltinDescriptor] = &[
    BuiltinDescriptor {
        uri: XSI_NAMESPACE,
        bound_prefix: Some("xsi"),
        schema_location: None,
        description: "XML Schema Instance",
        is_undeclared: true,
        context_default_namespace: None,
        context_in_scope: &[],
    },
    BuiltinDescriptor {
        uri: HFP_NAMESPACE,
        bound_prefix: None,
        schema_location: Some(HFP_NAMESPACE),
        description: "Facets appearing in appinfo section",
        is_undeclared: false,
        context_default_namespace: Some(XS_NAMESPACE),
        context_in_scope: &[("hfp", None), ("xhtml", Some(XHTML_NAMESPACE))],
    },
    BuiltinDescriptor {
        uri: XS_NAMESPACE,
        bound_prefix: None,
        schema_location: Some("http://www.w3.org/2001/XMLSchema.xsd"),
        description: "XML Schema",
        is_undeclared: false,
        context_default_namespace: None,
        context_in_scope: &[("xs", None)],
    },
    BuiltinDescriptor {
        uri: XMLNS_NAMESPACE,
        bound_prefix: Some("xmlns"),
        schema_location: None,
        description: "Namespaces in XML",
        is_undeclared: false,
        context_default_namespace: None,
        context_in_scope: &[],
    },
    BuiltinDescriptor {
        uri: XML_NAMESPACE,
        bound_prefix: Some("xml"),
        schema_location: Some("http://www.w3.org/2001/xml.xsd"),
        description: "XML namespace",
        is_undeclared: true,
        context_default_namespace: Some(XHTML_NAMESPACE),
        context_in_scope: &[],
    },
    BuiltinDescriptor {
        uri: XHTML_NAMESPACE,
        bound_prefix: None,
        schema_location: Some("http://www.w3.org/1999/xhtml.xsd"),
        description: "Family of document types that extend HTML",
        is_undeclared: false,
        context_default_namespace: Some(XS_NAMESPACE),
        context_in_scope: &[],
    },
];

/// Process-wide table mapping URI to [`Namespace`], enforcing the
/// one-instance-per-URI invariant.
///
/// The registry owns every namespace it creates, including absent ones, and
/// hands out [`NamespaceRef`]s addressing them. One registry serves one
/// logical compilation pass; tests and hosts that want isolation simply
/// construct their own.
pub struct NamespaceRegistry {
    arena: Vec<Namespace>,
    by_uri: HashMap<String, NamespaceRef>,
    next_absent_id: u32,
    /// The namespace currently being written to an archive, if any. Lets
    /// nested component serializers validate they are not asked to embed
    /// components foreign to that namespace.
    serializing: Option<NamespaceRef>,
    archive_index: Option<ArchiveIndex>,
}

impl NamespaceRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            arena: Vec::new(),
            by_uri: HashMap::new(),
            next_absent_id: 0,
            serializing: None,
            archive_index: None,
        };
        for descriptor in BUILTIN_NAMESPACES {
            let namespace = Namespace::new_builtin(
                descriptor.uri,
                descriptor.bound_prefix,
                descriptor.schema_location,
                descriptor.description,
                descriptor.is_undeclared,
            );
            let ref_ = registry.alloc(namespace);
            registry.by_uri.insert(descriptor.uri.to_owned(), ref_);
        }
        // Context hints may point at builtins created later in the list, so
        // they are applied once every builtin exists.
        for descriptor in BUILTIN_NAMESPACES {
            let ref_ = registry.by_uri[descriptor.uri];
            let namespace = registry.get_mut(ref_);
            namespace.context_default_namespace =
                descriptor.context_default_namespace.map(str::to_owned);
            namespace.context_in_scope = descriptor
                .context_in_scope
                .iter()
                .map(|(prefix, uri)| ((*prefix).to_owned(), uri.map(str::to_owned)))
                .collect();
        }
        registry
    }

    fn alloc(&mut self, namespace: Namespace) -> NamespaceRef {
        self.arena.push(namespace);
        let position = NonZeroUsize::new(self.arena.len()).unwrap();
        NamespaceRef::from_position(position)
    }

    pub fn get(&self, ref_: NamespaceRef) -> &Namespace {
        self.arena
            .get(ref_.index())
            .expect("invalid namespace reference (out-of-bounds)")
    }

    pub fn get_mut(&mut self, ref_: NamespaceRef) -> &mut Namespace {
        self.arena
            .get_mut(ref_.index())
            .expect("invalid namespace reference (out-of-bounds)")
    }

    /// If a namespace instance for the given URI exists, return it.
    ///
    /// Absent namespaces are not stored in the table; if you use one, don't
    /// lose hold of the reference you got when creating it.
    pub fn lookup(&self, uri: &str) -> Option<NamespaceRef> {
        self.by_uri.get(uri).copied()
    }

    /// Return the namespace for `uri`, creating and registering it first if
    /// none exists. Construction is idempotent by URI.
    pub fn get_or_create(&mut self, uri: &str) -> NamespaceRef {
        if let Some(existing) = self.lookup(uri) {
            return existing;
        }
        let ref_ = self.alloc(Namespace::new(Some(uri.to_owned()), 0));
        self.by_uri.insert(uri.to_owned(), ref_);
        debug!(%uri, "registered namespace");
        ref_
    }

    /// User-facing construction with schema-location and description.
    ///
    /// A URI colliding with an existing non-absent entry yields the existing
    /// instance unchanged. Only built-in namespaces may carry a bound prefix.
    pub fn create_namespace(
        &mut self,
        uri: &str,
        options: NamespaceOptions,
    ) -> Result<NamespaceRef, NamespaceError> {
        if options.bound_prefix.is_some() {
            return Err(NamespaceError::InvalidOperation(
                "only built-in namespaces may have bound prefixes".into(),
            ));
        }
        if let Some(existing) = self.lookup(uri) {
            return Ok(existing);
        }
        let ref_ = self.get_or_create(uri);
        self.get_mut(ref_).apply_options(options);
        Ok(ref_)
    }

    /// Create an absent namespace for declarations from a schema with no
    /// target namespace. Each call yields a distinct instance; it is never
    /// entered into the URI table.
    pub fn create_absent_namespace(&mut self) -> NamespaceRef {
        let absent_id = self.next_absent_id;
        self.next_absent_id += 1;
        self.alloc(Namespace::new(None, absent_id))
    }

    /// Given a URI, provide the namespace instance corresponding to it, or
    /// `None` unless `create_if_missing` is set.
    pub fn namespace_for_uri(
        &mut self,
        uri: &str,
        create_if_missing: bool,
    ) -> Option<NamespaceRef> {
        match self.lookup(uri) {
            Some(existing) => Some(existing),
            None if create_if_missing => Some(self.get_or_create(uri)),
            None => None,
        }
    }

    pub fn xml_schema(&self) -> NamespaceRef {
        self.builtin(XS_NAMESPACE)
    }

    pub fn xml_schema_instance(&self) -> NamespaceRef {
        self.builtin(XSI_NAMESPACE)
    }

    pub fn xml(&self) -> NamespaceRef {
        self.builtin(XML_NAMESPACE)
    }

    pub fn xmlns(&self) -> NamespaceRef {
        self.builtin(XMLNS_NAMESPACE)
    }

    pub fn xhtml(&self) -> NamespaceRef {
        self.builtin(XHTML_NAMESPACE)
    }

    pub fn has_facet_and_property(&self) -> NamespaceRef {
        self.builtin(HFP_NAMESPACE)
    }

    fn builtin(&self, uri: &str) -> NamespaceRef {
        *self
            .by_uri
            .get(uri)
            .expect("builtin namespace is always registered")
    }

    /// The prefix bindings every scope starts from (xml and xsi).
    pub(crate) fn undeclared_prefix_map(&self) -> PrefixMap {
        UNDECLARED_PREFIXES
            .iter()
            .map(|(prefix, uri)| (Some((*prefix).to_owned()), self.builtin(uri)))
            .collect()
    }

    pub(crate) fn begin_serializing(
        &mut self,
        namespace: NamespaceRef,
    ) -> Result<(), NamespaceError> {
        if self.serializing.is_some() {
            return Err(NamespaceError::InvalidOperation(
                "an archive save is already in progress".into(),
            ));
        }
        self.serializing = Some(namespace);
        Ok(())
    }

    pub(crate) fn end_serializing(&mut self) {
        self.serializing = None;
    }

    /// The namespace currently being written to an archive, if any.
    pub fn serializing_namespace(&self) -> Option<NamespaceRef> {
        self.serializing
    }

    /// Replace the archive index, e.g. with one scanned from explicit
    /// directories instead of the environment search path.
    pub fn set_archive_index(&mut self, index: ArchiveIndex) {
        self.archive_index = Some(index);
    }

    fn ensure_archive_index(&mut self) -> &ArchiveIndex {
        if self.archive_index.is_none() {
            self.archive_index = Some(ArchiveIndex::scan_default());
        }
        self.archive_index.as_ref().unwrap()
    }

    /// URIs for which a namespace archive has been discovered on the search
    /// path. Success of a later load is not guaranteed.
    pub fn available_for_load(&mut self) -> Vec<String> {
        let mut uris: Vec<String> = self
            .ensure_archive_index()
            .uris()
            .map(str::to_owned)
            .collect();
        uris.sort();
        uris
    }

    /// Attempt to load the archived schema contents for `namespace`.
    ///
    /// Absent namespaces have nothing to load, as do namespaces without a
    /// discoverable archive; both return `false`. Returns `true` once the
    /// archive has been merged in. Re-entering the load for a namespace
    /// already loading is caller misuse.
    pub fn load_namespace_schema(
        &mut self,
        namespace: NamespaceRef,
        decoder: &dyn ComponentDecoder,
    ) -> Result<bool, NamespaceError> {
        if self.get(namespace).is_absent_namespace() {
            return Ok(false);
        }
        if self.get(namespace).in_schema_load {
            return Err(NamespaceError::InvalidOperation(format!(
                "schema load re-entered for namespace {}",
                self.get(namespace)
            )));
        }
        let uri = self
            .get(namespace)
            .uri()
            .expect("non-absent namespace has a URI")
            .to_owned();
        let Some(path) = self
            .ensure_archive_index()
            .path_for(&uri)
            .map(PathBuf::from)
        else {
            return Ok(false);
        };
        debug!(%uri, path = %path.display(), "loading namespace from archive");
        self.get_mut(namespace).in_schema_load = true;
        let result = archive::load(self, &path, decoder);
        self.get_mut(namespace).in_schema_load = false;
        result.map(|_| true)
    }

    /// Ensure this namespace is ready for use, attempting an archive load at
    /// most once. Re-entering validation while it is in progress is caller
    /// misuse.
    pub fn validate_schema(
        &mut self,
        namespace: NamespaceRef,
        decoder: &dyn ComponentDecoder,
    ) -> Result<(), NamespaceError> {
        if self.get(namespace).did_validation {
            return Ok(());
        }
        if self.get(namespace).in_validation {
            return Err(NamespaceError::InvalidOperation(format!(
                "validation re-entered for namespace {}",
                self.get(namespace)
            )));
        }
        self.get_mut(namespace).in_validation = true;
        let result = self.load_namespace_schema(namespace, decoder);
        self.get_mut(namespace).in_validation = false;
        result?;
        self.get_mut(namespace).did_validation = true;
        Ok(())
    }
}

impl Default for NamespaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
