use std::fmt;
use std::num::{NonZeroU32, NonZeroUsize};

use crate::archive::ArchiveMetadata;
use crate::category::{CategoryMap, CategoryStore};
use crate::component::{ComponentHandle, ComponentSet};
use crate::error::NamespaceError;

/// A reference to a [`Namespace`] stored in a
/// [`NamespaceRegistry`](crate::registry::NamespaceRegistry).
///
/// Reference equality is namespace identity: there is exactly one live
/// `Namespace` per non-absent URI, and every `get_or_create` for that URI
/// yields the same reference.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct NamespaceRef(NonZeroU32);

impl NamespaceRef {
    pub(crate) fn from_position(position: NonZeroUsize) -> Self {
        let id: NonZeroU32 = position
            .try_into()
            .expect("namespace reference did not fit into 32-bit integer");
        Self(id)
    }

    pub(crate) fn index(self) -> usize {
        u32::from(self.0) as usize - 1
    }
}

impl fmt::Debug for NamespaceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<namespace #{}>", self.0)
    }
}

/// Caller-supplied attributes for a user-created namespace.
///
/// A bound prefix is deliberately absent here; only built-in namespaces may
/// carry one, and supplying one through
/// [`create_namespace`](crate::registry::NamespaceRegistry::create_namespace)
/// is rejected.
#[derive(Debug, Default, Clone)]
pub struct NamespaceOptions {
    pub schema_location: Option<String>,
    pub description: Option<String>,
    pub bound_prefix: Option<String>,
}

/// An XML namespace, viz. a URI, together with the declarations it holds.
///
/// The instance aggregates arbitrary maps from local names to components in
/// separate categories; the default categories are configured externally (the
/// schema layer defines one per named XSD component kind, and customizations
/// such as WSDL add their own). A namespace with no URI is *absent*: it holds
/// declarations from schemas with no target namespace, is never placed in the
/// registry table, and has independent identity each time one is created.
pub struct Namespace {
    uri: Option<String>,
    /// Distinguishes absent namespaces in diagnostics.
    absent_id: u32,
    bound_prefix: Option<&'static str>,
    schema_location: Option<String>,
    description: Option<String>,
    is_builtin: bool,
    is_undeclared: bool,
    module_path: Option<String>,
    /// Identifier of the compiled bindings module, set by generated code.
    module: Option<String>,
    /// Opaque record of the options the bindings were generated with.
    binding_configuration: Option<String>,

    /// Seed data for [`initial_context`](crate::context::NamespaceContext::initial_context):
    /// URI of the default namespace, and (prefix, URI) pairs for the in-scope
    /// map. A `None` URI denotes this namespace itself.
    pub(crate) context_default_namespace: Option<String>,
    pub(crate) context_in_scope: Vec<(String, Option<String>)>,

    categories: CategoryStore,
    components: ComponentSet,
    /// Components still awaiting resolution. Present only during active
    /// compilation; `None` once resolution has completed, after which queueing
    /// is an invalid operation.
    pending: Option<Vec<ComponentHandle>>,

    // Reentrancy guards; see the registry's load/validate operations.
    pub(crate) in_schema_load: bool,
    pub(crate) in_validation: bool,
    pub(crate) did_validation: bool,
}

impl Namespace {
    pub(crate) fn new(uri: Option<String>, absent_id: u32) -> Self {
        let mut namespace = Self {
            uri,
            absent_id,
            bound_prefix: None,
            schema_location: None,
            description: None,
            is_builtin: false,
            is_undeclared: false,
            module_path: None,
            module: None,
            binding_configuration: None,
            context_default_namespace: None,
            context_in_scope: Vec::new(),
            categories: CategoryStore::default(),
            components: ComponentSet::default(),
            pending: None,
            in_schema_load: false,
            in_validation: false,
            did_validation: false,
        };
        namespace.reset();
        namespace
    }

    pub(crate) fn new_builtin(
        uri: &str,
        bound_prefix: Option<&'static str>,
        schema_location: Option<&str>,
        description: &str,
        is_undeclared: bool,
    ) -> Self {
        let mut namespace = Self::new(Some(uri.to_owned()), 0);
        namespace.bound_prefix = bound_prefix;
        namespace.schema_location = schema_location.map(str::to_owned);
        namespace.description = Some(description.to_owned());
        namespace.is_builtin = true;
        namespace.is_undeclared = is_undeclared;
        namespace
    }

    /// Clear the per-compilation state. Sub-stores are reset in a fixed
    /// order: category maps, then the component set, then the pending queue.
    pub(crate) fn reset(&mut self) {
        self.categories.reset();
        self.components.reset();
        self.pending = Some(Vec::new());
    }

    /// The URI for the namespace represented by this instance; `None` for an
    /// absent namespace.
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    /// Whether this namespace exists only to hold components from schemas
    /// with no target namespace.
    pub fn is_absent_namespace(&self) -> bool {
        self.uri.is_none()
    }

    /// The standard prefix for this namespace (`xml`, `xmlns`, `xsi`, ...).
    /// `None` for every namespace that is not built-in.
    pub fn bound_prefix(&self) -> Option<&'static str> {
        self.bound_prefix
    }

    /// Whether this namespace was defined by the infrastructure at startup.
    pub fn is_builtin_namespace(&self) -> bool {
        self.is_builtin
    }

    /// Whether this namespace is in scope regardless of whether a document
    /// declares it (only xml and xsi).
    pub fn is_undeclared_namespace(&self) -> bool {
        self.is_undeclared
    }

    /// URI hinting at where the document defining this namespace lives.
    pub fn schema_location(&self) -> Option<&str> {
        self.schema_location.as_deref()
    }

    pub fn set_schema_location(&mut self, schema_location: impl Into<String>) {
        self.schema_location = Some(schema_location.into());
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = Some(description.into());
    }

    /// Path by which this namespace is imported into generated modules.
    pub fn module_path(&self) -> Option<&str> {
        self.module_path.as_deref()
    }

    pub fn set_module_path(&mut self, module_path: impl Into<String>) {
        self.module_path = Some(module_path.into());
    }

    /// The compiled bindings module for this namespace, if one has been
    /// produced and registered by generated code.
    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    pub fn set_module(&mut self, module: impl Into<String>) {
        self.module = Some(module.into());
    }

    pub fn binding_configuration(&self) -> Option<&str> {
        self.binding_configuration.as_deref()
    }

    pub fn set_binding_configuration(&mut self, configuration: impl Into<String>) {
        self.binding_configuration = Some(configuration.into());
    }

    pub(crate) fn apply_options(&mut self, options: NamespaceOptions) {
        if let Some(schema_location) = options.schema_location {
            self.schema_location = Some(schema_location);
        }
        if let Some(description) = options.description {
            self.description = Some(description);
        }
    }

    /// Ensure a category map exists for each of the given categories, without
    /// disturbing existing ones.
    pub fn configure_categories(&mut self, categories: &[&str]) {
        self.categories.configure(categories);
    }

    /// The category tags held in this namespace, in stable order.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.categories()
    }

    pub fn category_map(&self, category: &str) -> Option<&CategoryMap> {
        self.categories.get(category)
    }

    pub(crate) fn category_maps(&self) -> impl Iterator<Item = &CategoryMap> {
        self.categories.maps()
    }

    pub(crate) fn category_store_is_empty(&self) -> bool {
        self.categories.is_devoid_of_components()
    }

    /// Allow access to `component` by looking up `local_name` in the given
    /// category. Fails with [`NamespaceError::NameCollision`] if the name is
    /// already bound to a different component.
    pub fn add_category_object(
        &mut self,
        category: &str,
        local_name: &str,
        component: ComponentHandle,
    ) -> Result<ComponentHandle, NamespaceError> {
        self.categories.add_object(category, local_name, component)
    }

    /// Record that the given component, named or unnamed, is found within
    /// this namespace.
    pub fn associate_component(&mut self, component: ComponentHandle) {
        self.components.associate(component);
    }

    /// Swap a provisional definition for its replacement.
    pub fn replace_component(
        &mut self,
        existing: &ComponentHandle,
        replacement: ComponentHandle,
    ) -> ComponentHandle {
        self.components.replace(existing, replacement)
    }

    pub fn components(&self) -> &ComponentSet {
        &self.components
    }

    /// Note that a component may have unresolved references.
    ///
    /// Newly created named components are unresolved, as are components
    /// which, in the course of resolution, are found to depend on another
    /// unresolved component. Once resolution for this namespace has
    /// completed, the queue is gone and this is caller misuse.
    pub fn queue_for_resolution(
        &mut self,
        component: ComponentHandle,
    ) -> Result<(), NamespaceError> {
        match self.pending.as_mut() {
            Some(pending) => {
                pending.push(component);
                Ok(())
            }
            None => Err(NamespaceError::InvalidOperation(format!(
                "namespace {} has completed resolution and no longer accepts unresolved components",
                self
            ))),
        }
    }

    /// The components still awaiting resolution; `None` once resolution has
    /// completed.
    pub fn unresolved_components(&self) -> Option<&[ComponentHandle]> {
        self.pending.as_deref()
    }

    /// Take the pending work list for one resolution pass, leaving an empty
    /// list to capture re-queued and newly discovered components. `None` if
    /// resolution has already completed.
    pub(crate) fn begin_resolution_pass(&mut self) -> Option<Vec<ComponentHandle>> {
        let pending = self.pending.take()?;
        self.pending = Some(Vec::new());
        Some(pending)
    }

    pub(crate) fn invalidate_pending(&mut self) {
        self.pending = None;
    }

    pub(crate) fn archive_metadata(&self) -> ArchiveMetadata {
        ArchiveMetadata {
            schema_location: self.schema_location.clone(),
            description: self.description.clone(),
            module_path: self.module_path.clone(),
            binding_configuration: self.binding_configuration.clone(),
            context_default_namespace: self.context_default_namespace.clone(),
            context_in_scope: self.context_in_scope.clone(),
        }
    }

    /// Merge archived metadata into this instance. Re-loading an already-live
    /// namespace augments it: fields are filled only where currently unset.
    /// The bound prefix is never part of an archive; bound namespaces are
    /// created by the infrastructure, not restored.
    pub(crate) fn apply_archive_metadata(&mut self, metadata: ArchiveMetadata) {
        if self.schema_location.is_none() {
            self.schema_location = metadata.schema_location;
        }
        if self.description.is_none() {
            self.description = metadata.description;
        }
        if self.module_path.is_none() {
            self.module_path = metadata.module_path;
        }
        if self.binding_configuration.is_none() {
            self.binding_configuration = metadata.binding_configuration;
        }
        if self.context_default_namespace.is_none() {
            self.context_default_namespace = metadata.context_default_namespace;
        }
        if self.context_in_scope.is_empty() {
            self.context_in_scope = metadata.context_in_scope;
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.uri.as_deref(), self.bound_prefix) {
            (None, _) => write!(f, "AbsentNamespace{}", self.absent_id),
            (Some(uri), Some(prefix)) => write!(f, "{prefix}={uri}"),
            (Some(uri), None) => f.write_str(uri),
        }
    }
}
