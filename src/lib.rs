pub mod common;
pub mod config;
pub mod control;
pub mod error;
pub mod lifecycle;
pub mod perception;
pub mod sim;
pub mod state;

pub use crate::error::{Error, Result};

use crate::lifecycle::LifecycleNode;

/// Lifecycle registry for the localization components
pub struct LocalizationCore {
    components: Vec<Box<dyn LifecycleNode>>,
}

impl Default for LocalizationCore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalizationCore {
    /// Create an empty core
    pub fn new() -> Self {
        LocalizationCore {
            components: Vec::new(),
        }
    }

    /// Register a component with the core
    pub fn register<T: LifecycleNode + 'static>(&mut self, component: T) {
        log::debug!("LocalizationCore: registered {}", component.name());
        self.components.push(Box::new(component));
    }

    /// Configure and activate all registered components, in registration order
    pub fn init(&mut self) -> Result<()> {
        for component in &mut self.components {
            component.on_configure()?;
            component.on_activate()?;
            log::info!("LocalizationCore: {} active", component.name());
        }
        Ok(())
    }

    /// Deactivate and clean up all registered components, in reverse order
    pub fn shutdown(&mut self) -> Result<()> {
        for component in self.components.iter_mut().rev() {
            component.on_deactivate()?;
            component.on_cleanup()?;
            log::info!("LocalizationCore: {} stopped", component.name());
        }
        Ok(())
    }

    /// Number of registered components
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether no component is registered
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// First registered component of type `T`
    pub fn component_mut<T: LifecycleNode + 'static>(&mut self) -> Option<&mut T> {
        self.components
            .iter_mut()
            .find_map(|component| component.as_any_mut().downcast_mut::<T>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RobotConfig;
    use crate::lifecycle::{PeriodicWorker, State};
    use crate::perception::{GridCorrector, PoseIntegrator};
    use crate::sim::SimulatedDrive;
    use crate::state::StateHub;
    use std::sync::Arc;

    #[test]
    fn init_and_shutdown_drive_all_components() {
        let config = RobotConfig::default();
        let hub = Arc::new(StateHub::new().unwrap());
        let sim = Arc::new(SimulatedDrive::new(Arc::clone(&hub), &config));

        let mut core = LocalizationCore::new();
        core.register(PeriodicWorker::new(
            "odometry",
            PoseIntegrator::new(Arc::clone(&hub), sim, &config.drive),
        ));
        core.register(GridCorrector::new(
            Arc::clone(&hub),
            &config.grid,
            &config.floor_sensor,
        ));
        assert_eq!(core.len(), 2);

        core.init().unwrap();
        assert_eq!(hub.listener_count(), 1);
        let worker = core.component_mut::<PeriodicWorker<PoseIntegrator>>().unwrap();
        assert_eq!(worker.state(), State::Active);
        assert!(worker.is_running());

        core.shutdown().unwrap();
        assert_eq!(hub.listener_count(), 0);
        let worker = core.component_mut::<PeriodicWorker<PoseIntegrator>>().unwrap();
        assert_eq!(worker.state(), State::Unconfigured);
        assert!(!worker.is_running());
        assert!(core.component_mut::<PeriodicWorker<crate::perception::RangeSampler>>().is_none());
    }
}
