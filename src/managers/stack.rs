//! Assembled manager stacks
//!
//! `make_manager` builds the base manager, wraps it in the configured
//! adaptors and runs the first update. The resulting `ManagerStack` owns the
//! top adaptor and a `PropertyStore` whose entries are invalidated on every
//! update.

use super::{
    clusters, CentersManager, ClusterIter, ManagerError, NeighbourList, Property, PropertyStore, StrictCutoff,
    StructureManager,
};
use crate::config::AdaptorConfig;
use crate::structure::AtomicStructure;

/// A structure manager with its adaptors and property store
pub struct ManagerStack {
    manager: Box<dyn StructureManager>,
    properties: PropertyStore,
    configs: Vec<AdaptorConfig>,
}

/// Build and update a manager stack
///
/// # Arguments
/// * `structure` - initial structure
/// * `configs` - adaptors, applied bottom-up on top of the atoms
pub fn make_manager(structure: AtomicStructure, configs: &[AdaptorConfig]) -> Result<ManagerStack, ManagerError> {
    let mut manager: Box<dyn StructureManager> = Box::new(CentersManager::new(structure));

    for config in configs {
        config.validate()?;
        let adapted: Box<dyn StructureManager> = match config {
            AdaptorConfig::NeighbourList(params) => Box::new(NeighbourList::new(manager, params.clone())?),
            AdaptorConfig::Strict(params) => Box::new(StrictCutoff::new(manager, params.clone())?),
        };
        manager = adapted;
        log::trace!("Stacked adaptor '{}' at depth {}", config.name(), manager.stack_depth());
    }

    let mut stack = ManagerStack {
        manager,
        properties: PropertyStore::new(),
        configs: configs.to_vec(),
    };
    stack.update(None)?;

    log::debug!(
        "Manager stack ready: {} adaptors, max order {}, {} centers",
        stack.configs.len(),
        stack.manager.max_order(),
        stack.manager.size()
    );
    Ok(stack)
}

impl ManagerStack {
    /// Rebuild every layer; `None` keeps the current structure
    ///
    /// Stored properties are invalidated, not resized.
    pub fn update(&mut self, structure: Option<AtomicStructure>) -> Result<(), ManagerError> {
        self.properties.invalidate_all();
        self.manager.update(structure)
    }

    pub fn is_updated(&self) -> bool {
        self.manager.is_updated()
    }

    /// The top of the stack, if the last update succeeded
    pub fn manager(&self) -> Result<&dyn StructureManager, ManagerError> {
        if !self.manager.is_updated() {
            return Err(ManagerError::Precondition(
                "manager stack is not updated".to_string(),
            ));
        }
        Ok(self.manager.as_ref())
    }

    /// The top of the stack and the property store, borrowed together so
    /// properties can be written while iterating clusters
    pub fn parts_mut(&mut self) -> Result<(&dyn StructureManager, &mut PropertyStore), ManagerError> {
        if !self.manager.is_updated() {
            return Err(ManagerError::Precondition(
                "manager stack is not updated".to_string(),
            ));
        }
        Ok((self.manager.as_ref(), &mut self.properties))
    }

    pub fn configs(&self) -> &[AdaptorConfig] {
        &self.configs
    }

    pub fn max_order(&self) -> usize {
        self.manager.max_order()
    }

    pub fn stack_depth(&self) -> usize {
        self.manager.stack_depth()
    }

    pub fn clusters(&self, order: usize) -> Result<ClusterIter<'_>, ManagerError> {
        clusters(self.manager()?, order)
    }

    pub fn centers(&self) -> Result<ClusterIter<'_>, ManagerError> {
        self.clusters(1)
    }

    pub fn nb_clusters(&self, order: usize) -> Result<usize, ManagerError> {
        let manager = self.manager()?;
        if order == 0 || order > manager.max_order() {
            return Err(ManagerError::Configuration(format!(
                "stack provides clusters up to order {}, requested order {}",
                manager.max_order(),
                order
            )));
        }
        Ok(manager.nb_clusters(order))
    }

    /// Depth of the clusters of an order, the depth their properties use
    pub fn cluster_depth(&self, order: usize) -> Result<usize, ManagerError> {
        self.manager()?.cluster_depth(order).ok_or_else(|| {
            ManagerError::Configuration(format!("no clusters of order {} in the stack", order))
        })
    }

    /// Fetch or create a property in the stack's store
    pub fn get_or_create_property<T: Send + 'static>(
        &mut self,
        name: &str,
        order: usize,
        depth: usize,
    ) -> Result<&mut Property<T>, ManagerError> {
        if order == 0 || order > self.manager.max_order() {
            return Err(ManagerError::Configuration(format!(
                "stack provides clusters up to order {}, property '{}' asks for order {}",
                self.manager.max_order(),
                name,
                order
            )));
        }
        self.properties.get_or_create(name, order, depth)
    }

    pub fn property<T: Send + 'static>(
        &self,
        name: &str,
        order: usize,
        depth: usize,
    ) -> Result<&Property<T>, ManagerError> {
        self.properties.get(name, order, depth)
    }

    pub fn properties(&self) -> &PropertyStore {
        &self.properties
    }
}
