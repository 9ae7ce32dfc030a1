use std::cell::{Ref as CellRef, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexSet;

use crate::archive::ArchiveContext;
use crate::error::NamespaceError;
use crate::namespace::NamespaceRef;
use crate::resolution::ResolveContext;

/// Tag identifying a concrete component kind (e.g. "complexTypeDefinition").
///
/// The concrete component shapes live in the grammar layer; the core only ever
/// sees this tag, which partitions components for dependency ordering and keys
/// archived component records.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ComponentKind(pub &'static str);

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Outcome of one resolution step.
///
/// `Deferred` means the component still depends on an unresolved peer; the
/// resolution engine re-enqueues it for a later pass.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Resolved,
    Deferred,
}

/// How a component participates in the orderer's scope filter.
///
/// Declarations without a scope are discarded from the emission order (nothing
/// that is emitted can depend on them); components to which scope does not
/// apply at all pass the filter unchanged.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Scoping {
    /// Scope does not apply to this component (e.g. type definitions).
    NotDeclaration,
    /// A declaration with a scope; participates in ordering.
    Scoped,
    /// A declaration with no scope; never emitted, never blocks others.
    Unscoped,
}

/// Capability contract every schema component must satisfy to participate in
/// registration, resolution, ordering and archiving. Concrete kinds (type
/// definitions, element declarations, model groups, ...) are owned by the
/// grammar layer.
pub trait SchemaComponent {
    /// The concrete kind tag of this component.
    fn kind(&self) -> ComponentKind;

    /// Whether every reference held by this component has been resolved.
    fn is_resolved(&self) -> bool;

    /// Perform whatever steps are required to resolve this component.
    ///
    /// Return [`Resolution::Deferred`] if resolution cannot complete because a
    /// peer is still unresolved; the engine retries on the next pass. Prior to
    /// returning [`Resolution::Resolved`], discard any cached parse-tree
    /// handle. The sole caller is [`resolve_definitions`](crate::resolution::resolve_definitions).
    fn resolve(&mut self, ctx: &mut ResolveContext) -> Result<Resolution, NamespaceError>;

    /// The namespace this component belongs to, if it can be named at all.
    fn target_namespace(&self) -> Option<NamespaceRef> {
        None
    }

    fn scoping(&self) -> Scoping {
        Scoping::NotDeclaration
    }

    /// Components this one depends on, for emission ordering.
    fn dependent_components(&self) -> Vec<ComponentHandle> {
        Vec::new()
    }

    /// Whether this is the root type sentinel from which all others derive.
    /// Ur-types never contribute dependency edges.
    fn is_ur_type(&self) -> bool {
        false
    }

    /// Best-effort human-readable name, used for diagnostics and as the
    /// tie-breaker when sorting ready components.
    fn best_name(&self) -> Option<String> {
        None
    }

    /// Serialized form of this component for the namespace archive.
    ///
    /// Nested serializers may consult `ctx` to validate that they are not
    /// asked to embed components foreign to the namespace being saved.
    fn archive_payload(&self, ctx: &ArchiveContext) -> Result<Vec<u8>, NamespaceError> {
        let _ = ctx;
        Err(NamespaceError::InvalidOperation(format!(
            "component kind {} cannot be archived",
            self.kind()
        )))
    }
}

/// Process-unique identity of a component, independent of its contents.
///
/// Membership tests during resolution and ordering use this identity rather
/// than structural equality of component values.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ComponentId(usize);

/// Shared handle to a schema component.
///
/// Cloning the handle shares the component; equality and hashing are pointer
/// identity. The grammar layer constructs components, wraps them in handles
/// and registers those with a [`Namespace`](crate::namespace::Namespace).
#[derive(Clone)]
pub struct ComponentHandle(Rc<RefCell<dyn SchemaComponent>>);

impl ComponentHandle {
    pub fn new<C: SchemaComponent + 'static>(component: C) -> Self {
        Self(Rc::new(RefCell::new(component)))
    }

    pub fn id(&self) -> ComponentId {
        ComponentId(Rc::as_ptr(&self.0) as *const () as usize)
    }

    pub fn borrow(&self) -> CellRef<'_, dyn SchemaComponent> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, dyn SchemaComponent> {
        self.0.borrow_mut()
    }

    /// "«kind» named «name»", or "anonymous «kind»" for unnamed components.
    pub fn diagnostic_label(&self) -> String {
        let component = self.0.borrow();
        match component.best_name() {
            Some(name) => format!("{} named {}", component.kind(), name),
            None => format!("anonymous {}", component.kind()),
        }
    }
}

impl PartialEq for ComponentHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ComponentHandle {}

impl std::hash::Hash for ComponentHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for ComponentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.try_borrow().is_ok() {
            write!(f, "<{}>", self.diagnostic_label())
        } else {
            write!(f, "<component (borrowed)>")
        }
    }
}

/// The full set of components, named or unnamed, belonging to one namespace.
///
/// Identity-keyed and insertion-ordered, so enumeration (and therefore the
/// orderer's input) is deterministic for a given registration sequence.
#[derive(Default)]
pub struct ComponentSet {
    members: IndexSet<ComponentHandle>,
}

impl ComponentSet {
    /// Record that the given component is found within this namespace.
    pub(crate) fn associate(&mut self, component: ComponentHandle) {
        let inserted = self.members.insert(component);
        assert!(inserted, "component is already associated with this namespace");
    }

    /// Swap a provisional definition for its replacement, preserving identity
    /// of the set.
    pub(crate) fn replace(
        &mut self,
        existing: &ComponentHandle,
        replacement: ComponentHandle,
    ) -> ComponentHandle {
        let removed = self.members.shift_remove(existing);
        assert!(removed, "replaced component was not associated with this namespace");
        self.members.insert(replacement.clone());
        replacement
    }

    pub fn contains(&self, component: &ComponentHandle) -> bool {
        self.members.contains(component)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentHandle> {
        self.members.iter()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub(crate) fn reset(&mut self) {
        self.members.clear();
    }
}
