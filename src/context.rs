use std::collections::HashMap;
use std::rc::Rc;

use crate::error::NamespaceError;
use crate::namespace::NamespaceRef;
use crate::registry::NamespaceRegistry;

pub(crate) type PrefixMap = HashMap<Option<String>, NamespaceRef>;

/// Attribute introducing a default namespace declaration, or prefixed
/// declarations via `xmlns:`.
const XMLNS_ATTRIBUTE: &str = "xmlns";
const XMLNS_PREFIX: &str = "xmlns:";
const TARGET_NAMESPACE_ATTRIBUTE: &str = "targetNamespace";

/// How an unprefixed qualified name is to be interpreted.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum QNameUsage {
    /// The name being given to a new top-level declaration; resolves against
    /// the target namespace.
    Definition,
    /// A reference to some named component; resolves against the default
    /// namespace, which may be absent ("no namespace").
    Reference,
}

/// The namespace scope in effect at one document node.
///
/// Contexts are built while descending the document tree: a child element
/// shares its parent's in-scope map until it declares namespace bindings of
/// its own, at which point a private copy is forked. The context may be
/// retained alongside the node it was computed for, for later qualified-name
/// interpretation of attribute values.
#[derive(Clone)]
pub struct NamespaceContext {
    default_namespace: Option<NamespaceRef>,
    target_namespace: NamespaceRef,
    /// Shared with the parent context until a local declaration forces a
    /// private copy. The `None` key carries the default namespace binding.
    in_scope: Rc<PrefixMap>,
    /// The node's attributes other than namespace declarations, by the name
    /// they were written with.
    attributes: HashMap<String, String>,
}

impl NamespaceContext {
    /// Build the context for an element, given its parent's context (if any)
    /// and its attributes in document order, as written.
    ///
    /// `xmlns="…"` sets or (with an empty value) clears the default
    /// namespace; `xmlns:p="…"` sets or clears the binding for `p`. Clearing
    /// a prefix, rather than the default, is not explicitly sanctioned by the
    /// namespaces recommendation, but is tolerated here. A `targetNamespace`
    /// attribute fixes the node's target namespace; a root node without one
    /// gets a fresh absent namespace.
    pub fn for_element<'a, I>(
        parent: Option<&NamespaceContext>,
        attributes: I,
        registry: &mut NamespaceRegistry,
    ) -> Result<Self, NamespaceError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let (mut default_namespace, inherited_target, mut in_scope) = match parent {
            Some(parent) => (
                parent.default_namespace,
                Some(parent.target_namespace),
                Rc::clone(&parent.in_scope),
            ),
            None => (None, None, Rc::new(registry.undeclared_prefix_map())),
        };
        let mut attribute_map = HashMap::new();

        for (name, value) in attributes {
            if name == XMLNS_ATTRIBUTE {
                let scope = Rc::make_mut(&mut in_scope);
                if value.is_empty() {
                    default_namespace = None;
                    scope.remove(&None);
                } else {
                    let namespace = registry.get_or_create(value);
                    default_namespace = Some(namespace);
                    scope.insert(None, namespace);
                }
            } else if let Some(prefix) = name.strip_prefix(XMLNS_PREFIX) {
                let scope = Rc::make_mut(&mut in_scope);
                if value.is_empty() {
                    scope.remove(&Some(prefix.to_owned()));
                } else {
                    let namespace = registry.get_or_create(value);
                    scope.insert(Some(prefix.to_owned()), namespace);
                }
            } else {
                attribute_map.insert(name.to_owned(), value.to_owned());
            }
        }

        let (target_namespace, establishes_target) =
            match attribute_map.get(TARGET_NAMESPACE_ATTRIBUTE) {
                Some(uri) => (registry.get_or_create(uri), true),
                None => match inherited_target {
                    Some(inherited) => (inherited, false),
                    None => (registry.create_absent_namespace(), true),
                },
            };
        // A node establishing the target namespace also supplies the default,
        // where none has otherwise been declared.
        if establishes_target && default_namespace.is_none() {
            default_namespace = Some(target_namespace);
        }

        Ok(Self {
            default_namespace,
            target_namespace,
            in_scope,
            attributes: attribute_map,
        })
    }

    /// The scope a builtin namespace's own schema is parsed in, seeded from
    /// the hints recorded on the namespace.
    pub fn initial_context(
        registry: &mut NamespaceRegistry,
        namespace: NamespaceRef,
    ) -> NamespaceContext {
        let default_hint = registry.get(namespace).context_default_namespace.clone();
        let in_scope_hints = registry.get(namespace).context_in_scope.clone();

        let mut in_scope = registry.undeclared_prefix_map();
        for (prefix, uri) in in_scope_hints {
            let bound = match uri {
                Some(uri) => registry.get_or_create(&uri),
                None => namespace,
            };
            in_scope.insert(Some(prefix), bound);
        }
        let default_namespace = default_hint.map(|uri| registry.get_or_create(&uri));

        NamespaceContext {
            default_namespace,
            target_namespace: namespace,
            in_scope: Rc::new(in_scope),
            attributes: HashMap::new(),
        }
    }

    pub fn default_namespace(&self) -> Option<NamespaceRef> {
        self.default_namespace
    }

    pub fn target_namespace(&self) -> NamespaceRef {
        self.target_namespace
    }

    pub fn in_scope_namespaces(&self) -> &HashMap<Option<String>, NamespaceRef> {
        &self.in_scope
    }

    /// A non-namespace attribute of the node this context was built for.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Every non-namespace attribute of the node, for later qualified-name
    /// interpretation of attribute values.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Split a qualified name into its namespace and local parts.
    ///
    /// A prefixed name resolves through the in-scope map regardless of usage;
    /// an undeclared prefix is a validation error attributable to the name.
    /// An unprefixed name resolves per [`QNameUsage`]; the returned namespace
    /// is `None` when the name is a reference and no default namespace is in
    /// effect.
    pub fn interpret_qname(
        &self,
        name: &str,
        usage: QNameUsage,
    ) -> Result<(Option<NamespaceRef>, String), NamespaceError> {
        if let Some((prefix, local_name)) = name.split_once(':') {
            let namespace = self
                .in_scope
                .get(&Some(prefix.to_owned()))
                .copied()
                .ok_or_else(|| NamespaceError::UnboundPrefix {
                    prefix: prefix.to_owned(),
                    name: name.to_owned(),
                })?;
            Ok((Some(namespace), local_name.to_owned()))
        } else {
            let namespace = match usage {
                QNameUsage::Definition => Some(self.target_namespace),
                QNameUsage::Reference => self.default_namespace,
            };
            Ok((namespace, name.to_owned()))
        }
    }
}
