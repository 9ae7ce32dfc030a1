use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::component::{ComponentHandle, ComponentId, ComponentKind, Scoping};
use crate::error::NamespaceError;
use crate::namespace::NamespaceRef;
use crate::registry::NamespaceRegistry;

/// The components of `namespace`, restricted to the kinds in `kind_order` and
/// arranged so that no component precedes one it depends on.
///
/// Kinds are processed one cohort at a time, in the caller's order; within a
/// cohort only dependencies of that same kind count toward ordering. This is
/// the sequence a code generator may safely emit bindings in.
pub fn ordered_components(
    registry: &NamespaceRegistry,
    namespace: NamespaceRef,
    kind_order: &[ComponentKind],
) -> Result<Vec<ComponentHandle>, NamespaceError> {
    let mut by_kind: HashMap<ComponentKind, Vec<ComponentHandle>> = HashMap::new();
    for component in registry.get(namespace).components().iter() {
        by_kind
            .entry(component.borrow().kind())
            .or_default()
            .push(component.clone());
    }

    let mut emit_order = Vec::new();
    for kind in kind_order {
        let Some(cohort) = by_kind.remove(kind) else {
            continue;
        };
        emit_order.extend(sort_by_dependency(cohort, *kind, namespace)?);
    }
    Ok(emit_order)
}

/// Arrange `components` so that none is referenced by a component preceding
/// it in the returned sequence.
///
/// Any dependency that is not of the `kind_filter` kind is ignored, as are
/// dependencies outside `target_namespace`, on ur-types, and on the component
/// itself. Candidates whose own target namespace differs (and is non-absent)
/// are discarded, as are declarations without a scope: nothing that is
/// emitted can depend on them.
pub fn sort_by_dependency(
    components: Vec<ComponentHandle>,
    kind_filter: ComponentKind,
    target_namespace: NamespaceRef,
) -> Result<Vec<ComponentHandle>, NamespaceError> {
    let mut emit_order: Vec<ComponentHandle> = Vec::new();
    let mut emitted: HashSet<ComponentId> = HashSet::new();
    let mut remaining = components;

    while !remaining.is_empty() {
        let mut ready: Vec<ComponentHandle> = Vec::new();
        let mut deferred: Vec<ComponentHandle> = Vec::new();
        let mut discarded = 0usize;

        for candidate in remaining.drain(..) {
            let is_ready = {
                let component = candidate.borrow();

                // Anything belonging to another namespace is just thrown away.
                if component
                    .target_namespace()
                    .is_some_and(|tns| tns != target_namespace)
                {
                    debug!(
                        component = %candidate.diagnostic_label(),
                        "discarding candidate with foreign target namespace"
                    );
                    discarded += 1;
                    continue;
                }
                // Scoped declarations that don't have a scope are tossed out
                // too; nothing emitted can depend on them.
                if component.scoping() == Scoping::Unscoped {
                    debug!(
                        component = %candidate.diagnostic_label(),
                        "discarding declaration with no scope"
                    );
                    discarded += 1;
                    continue;
                }

                component.dependent_components().iter().all(|dependency| {
                    !counts_toward_ordering(&candidate, dependency, kind_filter, target_namespace)
                        || emitted.contains(&dependency.id())
                })
            };

            if is_ready {
                ready.push(candidate);
            } else {
                deferred.push(candidate);
            }
        }

        if ready.is_empty() && discarded == 0 && !deferred.is_empty() {
            let candidates = deferred
                .iter()
                .map(|candidate| {
                    let unmet: Vec<String> = candidate
                        .borrow()
                        .dependent_components()
                        .iter()
                        .filter(|dependency| {
                            counts_toward_ordering(
                                candidate,
                                dependency,
                                kind_filter,
                                target_namespace,
                            ) && !emitted.contains(&dependency.id())
                        })
                        .map(ComponentHandle::diagnostic_label)
                        .collect();
                    format!("{}: {}", candidate.diagnostic_label(), unmet.join(" "))
                })
                .collect();
            return Err(NamespaceError::OrderingStagnation { candidates });
        }

        ready.sort_by_key(|candidate| candidate.borrow().best_name().unwrap_or_default());
        // Components ready in this pass join the emitted set only after the
        // pass completes; counting them early could produce order violations
        // once they've been sorted.
        emitted.extend(ready.iter().map(ComponentHandle::id));
        emit_order.extend(ready);
        remaining = deferred;
    }

    Ok(emit_order)
}

/// Whether `dependency` constrains the position of `candidate`: it must be of
/// the filtered kind, belong to the home namespace, not be the root type
/// sentinel, and not be the candidate itself.
fn counts_toward_ordering(
    candidate: &ComponentHandle,
    dependency: &ComponentHandle,
    kind_filter: ComponentKind,
    target_namespace: NamespaceRef,
) -> bool {
    if dependency.id() == candidate.id() {
        return false;
    }
    let dependency = dependency.borrow();
    dependency.kind() == kind_filter
        && dependency.target_namespace() == Some(target_namespace)
        && !dependency.is_ur_type()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{FakeComponent, ELEMENT_KIND, TYPE_KIND};

    fn registry_with_namespace() -> (NamespaceRegistry, NamespaceRef) {
        let mut registry = NamespaceRegistry::new();
        let namespace = registry.get_or_create("urn:ordering-test");
        (registry, namespace)
    }

    fn names(order: &[ComponentHandle]) -> Vec<String> {
        order
            .iter()
            .map(|c| c.borrow().best_name().unwrap_or_default())
            .collect()
    }

    #[test]
    fn dependencies_precede_their_dependents() {
        let (mut registry, namespace) = registry_with_namespace();

        let d = FakeComponent::resolved_type("D").in_namespace(namespace).handle();
        let c = FakeComponent::resolved_type("C")
            .in_namespace(namespace)
            .depending_on(&d)
            .handle();
        registry.get_mut(namespace).associate_component(c.clone());
        registry.get_mut(namespace).associate_component(d.clone());

        let order = ordered_components(&registry, namespace, &[TYPE_KIND]).unwrap();
        assert_eq!(names(&order), ["D", "C"]);
    }

    #[test]
    fn acyclic_graph_emits_every_candidate() {
        let (mut registry, namespace) = registry_with_namespace();

        let a = FakeComponent::resolved_type("a").in_namespace(namespace).handle();
        let b = FakeComponent::resolved_type("b")
            .in_namespace(namespace)
            .depending_on(&a)
            .handle();
        let c = FakeComponent::resolved_type("c")
            .in_namespace(namespace)
            .depending_on(&a)
            .depending_on(&b)
            .handle();
        let d = FakeComponent::resolved_type("d")
            .in_namespace(namespace)
            .depending_on(&c)
            .handle();
        for component in [&d, &c, &b, &a] {
            registry
                .get_mut(namespace)
                .associate_component((*component).clone());
        }

        let order = ordered_components(&registry, namespace, &[TYPE_KIND]).unwrap();
        assert_eq!(order.len(), 4);
        assert_eq!(names(&order), ["a", "b", "c", "d"]);
    }

    #[test]
    fn ready_components_within_a_pass_sort_by_name() {
        let (mut registry, namespace) = registry_with_namespace();

        let z = FakeComponent::resolved_type("zeta").in_namespace(namespace).handle();
        let m = FakeComponent::resolved_type("mu").in_namespace(namespace).handle();
        let a = FakeComponent::resolved_type("alpha").in_namespace(namespace).handle();
        for component in [&z, &m, &a] {
            registry
                .get_mut(namespace)
                .associate_component((*component).clone());
        }

        let order = ordered_components(&registry, namespace, &[TYPE_KIND]).unwrap();
        assert_eq!(names(&order), ["alpha", "mu", "zeta"]);
    }

    #[test]
    fn foreign_and_unscoped_candidates_are_discarded_not_blocking() {
        let (mut registry, namespace) = registry_with_namespace();
        let foreign = registry.get_or_create("urn:elsewhere");

        let local = FakeComponent::resolved_type("local").in_namespace(namespace).handle();
        let alien = FakeComponent::resolved_type("alien").in_namespace(foreign).handle();
        let unscoped = FakeComponent::resolved_type("unscoped")
            .in_namespace(namespace)
            .with_scoping(Scoping::Unscoped)
            .handle();
        for component in [&local, &alien, &unscoped] {
            registry
                .get_mut(namespace)
                .associate_component((*component).clone());
        }

        let order = ordered_components(&registry, namespace, &[TYPE_KIND]).unwrap();
        assert_eq!(names(&order), ["local"]);
    }

    #[test]
    fn ur_type_dependencies_do_not_constrain_order() {
        let (mut registry, namespace) = registry_with_namespace();

        let ur = FakeComponent::resolved_type("anyType")
            .in_namespace(namespace)
            .as_ur_type()
            .handle();
        let derived = FakeComponent::resolved_type("derived")
            .in_namespace(namespace)
            .depending_on(&ur)
            .handle();
        // Only the derived type is associated; the ur-type edge must not
        // block it even though the ur-type is never emitted here.
        registry
            .get_mut(namespace)
            .associate_component(derived.clone());

        let order = ordered_components(&registry, namespace, &[TYPE_KIND]).unwrap();
        assert_eq!(names(&order), ["derived"]);
    }

    #[test]
    fn dependencies_of_other_kinds_are_ignored() {
        let (mut registry, namespace) = registry_with_namespace();

        let element = FakeComponent::resolved_type("elt")
            .in_namespace(namespace)
            .with_kind(ELEMENT_KIND)
            .handle();
        let type_def = FakeComponent::resolved_type("T")
            .in_namespace(namespace)
            .depending_on(&element)
            .handle();
        registry
            .get_mut(namespace)
            .associate_component(type_def.clone());
        registry
            .get_mut(namespace)
            .associate_component(element.clone());

        let order = ordered_components(&registry, namespace, &[TYPE_KIND, ELEMENT_KIND]).unwrap();
        assert_eq!(names(&order), ["T", "elt"]);
    }

    #[test]
    fn dependency_cycle_stagnates_with_diagnostics() {
        let (mut registry, namespace) = registry_with_namespace();

        let a_dependencies = FakeComponent::shared_dependencies();
        let a = FakeComponent::resolved_type("A")
            .in_namespace(namespace)
            .with_shared_dependencies(a_dependencies.clone())
            .handle();
        let b = FakeComponent::resolved_type("B")
            .in_namespace(namespace)
            .depending_on(&a)
            .handle();
        a_dependencies.borrow_mut().push(b.clone());
        registry.get_mut(namespace).associate_component(a);
        registry.get_mut(namespace).associate_component(b);

        let err = ordered_components(&registry, namespace, &[TYPE_KIND])
            .expect_err("mutually dependent types cannot be ordered");
        match err {
            NamespaceError::OrderingStagnation { candidates } => {
                assert_eq!(candidates.len(), 2);
                assert!(candidates.iter().any(|c| c.contains("named A")));
                assert!(candidates.iter().any(|c| c.contains("named B")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn self_dependency_does_not_block_emission() {
        let (mut registry, namespace) = registry_with_namespace();

        let recursive_dependencies = FakeComponent::shared_dependencies();
        let recursive = FakeComponent::resolved_type("tree")
            .in_namespace(namespace)
            .with_shared_dependencies(recursive_dependencies.clone())
            .handle();
        recursive_dependencies.borrow_mut().push(recursive.clone());
        registry
            .get_mut(namespace)
            .associate_component(recursive.clone());

        let order = ordered_components(&registry, namespace, &[TYPE_KIND]).unwrap();
        assert_eq!(names(&order), ["tree"]);
    }
}
