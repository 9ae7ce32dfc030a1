//! Scriptable component stand-ins for exercising the registry, the
//! resolution engine, the orderer and the archive without a grammar layer.

use std::cell::RefCell;
use std::rc::Rc;

use crate::archive::{ArchiveContext, ComponentDecoder};
use crate::component::{
    ComponentHandle, ComponentKind, Resolution, SchemaComponent, Scoping,
};
use crate::error::NamespaceError;
use crate::namespace::NamespaceRef;
use crate::registry::NamespaceRegistry;
use crate::resolution::ResolveContext;

pub(crate) const TYPE_KIND: ComponentKind = ComponentKind("typeDefinition");
pub(crate) const ELEMENT_KIND: ComponentKind = ComponentKind("elementDeclaration");

pub(crate) type ResolutionLog = Rc<RefCell<Vec<String>>>;
pub(crate) type SharedDependencies = Rc<RefCell<Vec<ComponentHandle>>>;

/// A component whose capabilities are all set up by the test. Its resolution
/// step completes once every dependency reports itself resolved.
pub(crate) struct FakeComponent {
    kind: ComponentKind,
    name: Option<String>,
    target_namespace: Option<NamespaceRef>,
    scoping: Scoping,
    dependencies: SharedDependencies,
    ur_type: bool,
    resolved: bool,
    log: Option<ResolutionLog>,
    payload: Vec<u8>,
}

impl FakeComponent {
    /// A type-kind component that needs no resolution.
    pub(crate) fn resolved_type(name: &str) -> Self {
        Self {
            kind: TYPE_KIND,
            name: Some(name.to_owned()),
            target_namespace: None,
            scoping: Scoping::NotDeclaration,
            dependencies: Self::shared_dependencies(),
            ur_type: false,
            resolved: true,
            log: None,
            payload: Vec::new(),
        }
    }

    /// A type-kind component that resolves only once its dependencies have.
    pub(crate) fn unresolved_type(name: &str, namespace: NamespaceRef) -> Self {
        let mut component = Self::resolved_type(name);
        component.target_namespace = Some(namespace);
        component.resolved = false;
        component
    }

    pub(crate) fn shared_dependencies() -> SharedDependencies {
        Rc::new(RefCell::new(Vec::new()))
    }

    pub(crate) fn resolution_log() -> ResolutionLog {
        Rc::new(RefCell::new(Vec::new()))
    }

    pub(crate) fn in_namespace(mut self, namespace: NamespaceRef) -> Self {
        self.target_namespace = Some(namespace);
        self
    }

    pub(crate) fn depending_on(self, dependency: &ComponentHandle) -> Self {
        self.dependencies.borrow_mut().push(dependency.clone());
        self
    }

    pub(crate) fn with_shared_dependencies(mut self, dependencies: SharedDependencies) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub(crate) fn logging_to(mut self, log: &ResolutionLog) -> Self {
        self.log = Some(log.clone());
        self
    }

    pub(crate) fn anonymous(mut self) -> Self {
        self.name = None;
        self
    }

    pub(crate) fn with_scoping(mut self, scoping: Scoping) -> Self {
        self.scoping = scoping;
        self
    }

    pub(crate) fn as_ur_type(mut self) -> Self {
        self.ur_type = true;
        self
    }

    pub(crate) fn with_kind(mut self, kind: ComponentKind) -> Self {
        self.kind = kind;
        self
    }

    pub(crate) fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub(crate) fn handle(self) -> ComponentHandle {
        ComponentHandle::new(self)
    }
}

impl SchemaComponent for FakeComponent {
    fn kind(&self) -> ComponentKind {
        self.kind
    }

    fn is_resolved(&self) -> bool {
        self.resolved
    }

    fn resolve(&mut self, _ctx: &mut ResolveContext) -> Result<Resolution, NamespaceError> {
        if self.resolved {
            return Ok(Resolution::Resolved);
        }
        let blocked = self
            .dependencies
            .borrow()
            .iter()
            .any(|dependency| !dependency.borrow().is_resolved());
        if blocked {
            return Ok(Resolution::Deferred);
        }
        self.resolved = true;
        if let (Some(log), Some(name)) = (self.log.as_ref(), self.name.as_ref()) {
            log.borrow_mut().push(name.clone());
        }
        Ok(Resolution::Resolved)
    }

    fn target_namespace(&self) -> Option<NamespaceRef> {
        self.target_namespace
    }

    fn scoping(&self) -> Scoping {
        self.scoping
    }

    fn dependent_components(&self) -> Vec<ComponentHandle> {
        self.dependencies.borrow().clone()
    }

    fn is_ur_type(&self) -> bool {
        self.ur_type
    }

    fn best_name(&self) -> Option<String> {
        self.name.clone()
    }

    fn archive_payload(&self, _ctx: &ArchiveContext) -> Result<Vec<u8>, NamespaceError> {
        Ok(self.payload.clone())
    }
}

/// Decoder that reconstitutes every archived record as a resolved
/// [`FakeComponent`] carrying the record's payload.
pub(crate) struct DecodeAnything;

impl ComponentDecoder for DecodeAnything {
    fn decode(
        &self,
        kind: &str,
        local_name: &str,
        payload: &[u8],
        target: NamespaceRef,
        _registry: &mut NamespaceRegistry,
    ) -> Result<ComponentHandle, NamespaceError> {
        let kind = match kind {
            "elementDeclaration" => ELEMENT_KIND,
            _ => TYPE_KIND,
        };
        Ok(FakeComponent::resolved_type(local_name)
            .in_namespace(target)
            .with_kind(kind)
            .with_payload(payload.to_vec())
            .handle())
    }
}
