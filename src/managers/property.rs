//! Per-cluster property caches
//!
//! A `Property<T>` is a dense vector indexed by the global index of clusters
//! of one (order, depth). It must be resized for the current manager before
//! any write; reads of unset slots, mismatched clusters or a property sized
//! for a previous update fail with `ManagerError::Precondition`.

use std::any::Any;
use std::collections::HashMap;
use std::ops::{Index, IndexMut};

use super::{ClusterRef, ManagerError, StructureManager};

#[derive(Debug, Clone)]
pub struct Property<T> {
    name: String,
    order: usize,
    depth: usize,
    values: Vec<Option<T>>,
    /// Manager revision the property was sized for, `None` if sized by hand
    revision: Option<u64>,
    sized: bool,
}

impl<T> Property<T> {
    pub fn new(name: &str, order: usize, depth: usize) -> Self {
        Self {
            name: name.to_string(),
            order,
            depth,
            values: Vec::new(),
            revision: None,
            sized: false,
        }
    }

    /// Fully populated property bound to a manager revision
    pub(crate) fn from_values(name: &str, order: usize, depth: usize, values: Vec<T>, revision: u64) -> Self {
        Self {
            name: name.to_string(),
            order,
            depth,
            values: values.into_iter().map(Some).collect(),
            revision: Some(revision),
            sized: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn revision(&self) -> Option<u64> {
        self.revision
    }

    /// True between a resize and the next invalidation
    pub fn is_sized(&self) -> bool {
        self.sized
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Size the property to `count` unset slots, not bound to any manager
    pub fn resize(&mut self, count: usize) {
        self.values.clear();
        self.values.resize_with(count, || None);
        self.revision = None;
        self.sized = true;
    }

    /// Size the property to the number of clusters of its order in `manager`
    ///
    /// All previous values are dropped and the property is bound to the
    /// manager's current revision.
    pub fn resize_for(&mut self, manager: &dyn StructureManager) -> Result<(), ManagerError> {
        if !manager.is_updated() {
            return Err(ManagerError::Precondition(format!(
                "cannot size property '{}': manager '{}' is not updated",
                self.name,
                manager.name()
            )));
        }

        let depth = manager.cluster_depth(self.order).ok_or_else(|| {
            ManagerError::Configuration(format!(
                "property '{}' has order {} but manager '{}' only provides up to order {}",
                self.name,
                self.order,
                manager.name(),
                manager.max_order()
            ))
        })?;
        if depth != self.depth {
            return Err(ManagerError::Precondition(format!(
                "property '{}' has depth {} but order-{} clusters of '{}' have depth {}",
                self.name,
                self.depth,
                self.order,
                manager.name(),
                depth
            )));
        }

        self.resize(manager.nb_clusters(self.order));
        self.revision = Some(manager.revision());
        Ok(())
    }

    /// Mark every value stale; the length is kept, reads fail until resized
    pub fn invalidate(&mut self) {
        for value in self.values.iter_mut() {
            *value = None;
        }
        self.sized = false;
    }

    /// Drop all values and the size
    pub fn clear(&mut self) {
        self.values.clear();
        self.revision = None;
        self.sized = false;
    }

    fn check_cluster(&self, cluster: &ClusterRef<'_>) -> Result<usize, ManagerError> {
        if !self.sized {
            return Err(ManagerError::Precondition(format!(
                "property '{}' must be resized before use",
                self.name
            )));
        }
        if cluster.order() != self.order || cluster.depth() != self.depth {
            return Err(ManagerError::Precondition(format!(
                "property '{}' stores (order {}, depth {}) but the cluster is (order {}, depth {})",
                self.name,
                self.order,
                self.depth,
                cluster.order(),
                cluster.depth()
            )));
        }
        if let Some(revision) = self.revision {
            if revision != cluster.manager().revision() {
                return Err(ManagerError::Precondition(format!(
                    "property '{}' was sized for a previous update",
                    self.name
                )));
            }
        }
        self.check_index(cluster.global_index())
    }

    fn check_index(&self, index: usize) -> Result<usize, ManagerError> {
        if !self.sized {
            return Err(ManagerError::Precondition(format!(
                "property '{}' must be resized before use",
                self.name
            )));
        }
        if index >= self.values.len() {
            return Err(ManagerError::Precondition(format!(
                "index {} out of range for property '{}' of size {}",
                index,
                self.name,
                self.values.len()
            )));
        }
        Ok(index)
    }

    fn unset(&self, index: usize) -> ManagerError {
        ManagerError::Precondition(format!(
            "property '{}' has no value for cluster {}",
            self.name, index
        ))
    }

    pub fn get(&self, cluster: ClusterRef<'_>) -> Result<&T, ManagerError> {
        let index = self.check_cluster(&cluster)?;
        self.values[index].as_ref().ok_or_else(|| self.unset(index))
    }

    pub fn get_mut(&mut self, cluster: ClusterRef<'_>) -> Result<&mut T, ManagerError> {
        let index = self.check_cluster(&cluster)?;
        let err = self.unset(index);
        self.values[index].as_mut().ok_or(err)
    }

    pub fn set(&mut self, cluster: ClusterRef<'_>, value: T) -> Result<(), ManagerError> {
        let index = self.check_cluster(&cluster)?;
        self.values[index] = Some(value);
        Ok(())
    }

    /// Read by global index, without checking the cluster's order and depth
    pub fn get_index(&self, index: usize) -> Result<&T, ManagerError> {
        let index = self.check_index(index)?;
        self.values[index].as_ref().ok_or_else(|| self.unset(index))
    }

    pub fn set_index(&mut self, index: usize, value: T) -> Result<(), ManagerError> {
        let index = self.check_index(index)?;
        self.values[index] = Some(value);
        Ok(())
    }

    /// True if every slot holds a value
    pub fn is_complete(&self) -> bool {
        self.sized && self.values.iter().all(Option::is_some)
    }

    /// Values in global index order, `None` for unset slots
    pub fn iter(&self) -> impl Iterator<Item = Option<&T>> + '_ {
        self.values.iter().map(Option::as_ref)
    }
}

impl<'a, T> Index<ClusterRef<'a>> for Property<T> {
    type Output = T;

    fn index(&self, cluster: ClusterRef<'a>) -> &T {
        match self.get(cluster) {
            Ok(value) => value,
            Err(e) => panic!("{}", e),
        }
    }
}

/// Writing through an index inserts `T::default()` into unset slots first
impl<'a, T: Default> IndexMut<ClusterRef<'a>> for Property<T> {
    fn index_mut(&mut self, cluster: ClusterRef<'a>) -> &mut T {
        match self.check_cluster(&cluster) {
            Ok(index) => self.values[index].get_or_insert_with(T::default),
            Err(e) => panic!("{}", e),
        }
    }
}

/// Identity of a property in a `PropertyStore`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PropertyKey {
    name: String,
    order: usize,
    depth: usize,
}

trait ErasedProperty: Send {
    fn invalidate(&mut self);
    fn type_name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Send + 'static> ErasedProperty for Property<T> {
    fn invalidate(&mut self) {
        Property::invalidate(self)
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Heterogeneous properties keyed by (name, order, depth)
#[derive(Default)]
pub struct PropertyStore {
    properties: HashMap<PropertyKey, Box<dyn ErasedProperty>>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Fetch a property, creating an empty one on first use
    ///
    /// Asking for an existing key with a different value type is a
    /// configuration error.
    pub fn get_or_create<T: Send + 'static>(
        &mut self,
        name: &str,
        order: usize,
        depth: usize,
    ) -> Result<&mut Property<T>, ManagerError> {
        let entry = self
            .properties
            .entry(key(name, order, depth))
            .or_insert_with(|| {
                log::trace!("Creating property '{}' (order {}, depth {})", name, order, depth);
                Box::new(Property::<T>::new(name, order, depth))
            });
        let stored = entry.type_name();
        entry
            .as_any_mut()
            .downcast_mut::<Property<T>>()
            .ok_or_else(|| type_clash(name, stored, std::any::type_name::<T>()))
    }

    pub fn get<T: Send + 'static>(
        &self,
        name: &str,
        order: usize,
        depth: usize,
    ) -> Result<&Property<T>, ManagerError> {
        let entry = self.properties.get(&key(name, order, depth)).ok_or_else(|| {
            ManagerError::Precondition(format!(
                "no property '{}' for order {} and depth {}",
                name, order, depth
            ))
        })?;
        entry
            .as_any()
            .downcast_ref::<Property<T>>()
            .ok_or_else(|| type_clash(name, entry.type_name(), std::any::type_name::<T>()))
    }

    /// Invalidate every stored property without resizing it
    pub fn invalidate_all(&mut self) {
        for property in self.properties.values_mut() {
            property.invalidate();
        }
    }
}

fn key(name: &str, order: usize, depth: usize) -> PropertyKey {
    PropertyKey {
        name: name.to_string(),
        order,
        depth,
    }
}

fn type_clash(name: &str, stored: &str, requested: &str) -> ManagerError {
    ManagerError::Configuration(format!(
        "property '{}' holds {} values, requested as {}",
        name, stored, requested
    ))
}
