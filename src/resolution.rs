use std::collections::HashSet;

use tracing::debug;

use crate::component::{ComponentHandle, ComponentId, Resolution};
use crate::error::NamespaceError;
use crate::namespace::NamespaceRef;
use crate::registry::NamespaceRegistry;

/// Context handed to every [`resolve`](crate::component::SchemaComponent::resolve)
/// step, giving the component access to the registry and letting it queue
/// peers discovered during its own resolution.
pub struct ResolveContext<'a> {
    registry: &'a mut NamespaceRegistry,
    namespace: NamespaceRef,
}

impl<'a> ResolveContext<'a> {
    pub fn registry(&self) -> &NamespaceRegistry {
        &*self.registry
    }

    pub fn registry_mut(&mut self) -> &mut NamespaceRegistry {
        self.registry
    }

    /// The namespace whose definitions are being resolved.
    pub fn namespace(&self) -> NamespaceRef {
        self.namespace
    }

    /// Queue a component created or uncovered during this resolution step.
    pub fn queue(&mut self, component: ComponentHandle) {
        self.registry
            .get_mut(self.namespace)
            .queue_for_resolution(component)
            .expect("resolution queue is live while a pass is running");
    }
}

/// Loop until every component associated with a name in `namespace` is
/// sufficiently defined.
///
/// Each pass snapshots the pending work list, clears it, and invokes the
/// resolution step on every snapshotted component; deferred components are
/// re-queued, as are components discovered mid-pass. A pass that reproduces
/// exactly the set it started from made no progress, which only happens when
/// the schema has a circular dependency in some named component (or a
/// component implementation is defective); that is reported, never looped on
/// forever. On success the pending queue is invalidated for good.
pub fn resolve_definitions(
    registry: &mut NamespaceRegistry,
    namespace: NamespaceRef,
) -> Result<(), NamespaceError> {
    let mut num_passes = 0u32;
    loop {
        let unresolved = match registry.get_mut(namespace).begin_resolution_pass() {
            Some(pending) => pending,
            None => {
                return Err(NamespaceError::InvalidOperation(format!(
                    "resolution has already completed for namespace {}",
                    registry.get(namespace)
                )))
            }
        };
        if unresolved.is_empty() {
            registry.get_mut(namespace).invalidate_pending();
            return Ok(());
        }
        num_passes += 1;
        debug!(
            pass = num_passes,
            pending = unresolved.len(),
            "resolution pass"
        );

        for component in &unresolved {
            if component.borrow().is_resolved() {
                continue;
            }
            let outcome = {
                let mut ctx = ResolveContext {
                    registry: &mut *registry,
                    namespace,
                };
                component.borrow_mut().resolve(&mut ctx)?
            };
            match outcome {
                // Either we resolved it, or we queue it to try again later.
                Resolution::Resolved => assert!(
                    component.borrow().is_resolved(),
                    "{} reported completion but remains unresolved",
                    component.diagnostic_label()
                ),
                Resolution::Deferred => registry
                    .get_mut(namespace)
                    .queue_for_resolution(component.clone())
                    .expect("resolution queue is live while a pass is running"),
            }
        }

        let snapshot_ids: HashSet<ComponentId> = unresolved.iter().map(ComponentHandle::id).collect();
        let requeued = registry
            .get(namespace)
            .unresolved_components()
            .expect("resolution queue is live while a pass is running");
        let requeued_ids: HashSet<ComponentId> = requeued.iter().map(ComponentHandle::id).collect();
        if requeued_ids == snapshot_ids {
            let components = requeued
                .iter()
                .map(ComponentHandle::diagnostic_label)
                .collect();
            return Err(NamespaceError::ResolutionCycle { components });
        }
    }
}
