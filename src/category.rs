use std::collections::BTreeMap;

use crate::component::ComponentHandle;
use crate::error::NamespaceError;

/// A uniqueness-checked mapping from local names to components, partitioned by
/// a category tag.
///
/// The specifications for various documents require that certain groups of
/// named objects be unique among themselves, while uniqueness is not required
/// between groups; each such group is one `CategoryMap`, owned by exactly one
/// [`Namespace`](crate::namespace::Namespace).
pub struct CategoryMap {
    category: String,
    by_name: BTreeMap<String, ComponentHandle>,
}

impl CategoryMap {
    fn new(category: &str) -> Self {
        Self {
            category: category.to_owned(),
            by_name: BTreeMap::new(),
        }
    }

    /// The category of objects held here (e.g. "typeDefinition").
    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn get(&self, local_name: &str) -> Option<&ComponentHandle> {
        self.by_name.get(local_name)
    }

    pub fn contains(&self, local_name: &str) -> bool {
        self.by_name.contains_key(local_name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Entries in local-name order, stable across runs for diagnostics and
    /// serialization.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ComponentHandle)> {
        self.by_name.iter().map(|(name, c)| (name.as_str(), c))
    }

    fn insert(
        &mut self,
        local_name: &str,
        component: ComponentHandle,
    ) -> Result<ComponentHandle, NamespaceError> {
        match self.by_name.get(local_name) {
            // Re-registering the identical component is a no-op.
            Some(existing) if *existing == component => Ok(component),
            Some(_) => Err(NamespaceError::NameCollision {
                category: self.category.clone(),
                local_name: local_name.to_owned(),
            }),
            None => {
                self.by_name.insert(local_name.to_owned(), component.clone());
                Ok(component)
            }
        }
    }
}

/// The set of category maps owned by one namespace, keyed by category tag.
///
/// Category enumeration is stable (tag order) so that diagnostics and the
/// archive stream are deterministic.
#[derive(Default)]
pub struct CategoryStore {
    maps: BTreeMap<String, CategoryMap>,
}

impl CategoryStore {
    /// Ensure a map exists for each of the given categories. Existing maps
    /// are not affected.
    pub fn configure(&mut self, categories: &[&str]) {
        for category in categories {
            self.maps
                .entry((*category).to_owned())
                .or_insert_with(|| CategoryMap::new(category));
        }
    }

    pub fn get(&self, category: &str) -> Option<&CategoryMap> {
        self.maps.get(category)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.maps.keys().map(String::as_str)
    }

    pub fn maps(&self) -> impl Iterator<Item = &CategoryMap> {
        self.maps.values()
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Allow access to `component` by looking up `local_name` in the given
    /// category. The category must have been configured beforehand.
    pub fn add_object(
        &mut self,
        category: &str,
        local_name: &str,
        component: ComponentHandle,
    ) -> Result<ComponentHandle, NamespaceError> {
        let map = self.maps.get_mut(category).ok_or_else(|| {
            NamespaceError::InvalidOperation(format!("category {category:?} is not configured"))
        })?;
        map.insert(local_name, component)
    }

    /// Whether no category map holds any component. This is the state that
    /// must hold prior to merging in an archived namespace.
    pub fn is_devoid_of_components(&self) -> bool {
        self.maps.values().all(CategoryMap::is_empty)
    }

    pub(crate) fn reset(&mut self) {
        self.maps.clear();
    }
}
