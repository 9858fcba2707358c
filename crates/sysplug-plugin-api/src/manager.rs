use dashmap::DashMap;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use sysplug_core::config::{AppConfig, PluginConfig};
use sysplug_core::event::EventSources;

use crate::capabilities::Capabilities;
use crate::error::{PluginError, PluginResult};
use crate::plugin::Plugin;
use crate::tables::TableRegistry;

/// Central plugin manager
///
/// Owns every loaded plugin, the shared table registry and the event source
/// catalog sourcing plugins register into.
pub struct PluginManager {
    tables: Arc<TableRegistry>,
    sources: EventSources,
    plugins: DashMap<String, Arc<Plugin>>,
    /// Plugin names in load order; also serializes registration
    order: Mutex<Vec<String>>,
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginManager {
    /// Create a new plugin manager
    pub fn new() -> Self {
        Self::with_shared(Arc::new(TableRegistry::new()), EventSources::new())
    }

    /// Create a plugin manager sharing an existing table registry and source catalog
    pub fn with_shared(tables: Arc<TableRegistry>, sources: EventSources) -> Self {
        Self {
            tables,
            sources,
            plugins: DashMap::new(),
            order: Mutex::new(Vec::new()),
        }
    }

    pub fn tables(&self) -> &Arc<TableRegistry> {
        &self.tables
    }

    pub fn sources(&self) -> &EventSources {
        &self.sources
    }

    /// Load a plugin from its configuration entry
    pub fn load(&self, config: &PluginConfig) -> PluginResult<Arc<Plugin>> {
        config
            .validate()
            .map_err(|e| PluginError::LoadError(e.to_string()))?;
        tracing::info!(
            "Loading plugin: {} from {}",
            config.name,
            config.library_path.display()
        );

        let plugin = Plugin::load(&config.library_path, self.tables.clone())?;
        if plugin.name() != config.name {
            tracing::warn!(
                "Plugin configured as '{}' reports its name as '{}'",
                config.name,
                plugin.name()
            );
        }
        self.register(plugin)
    }

    /// Register an already loaded plugin
    pub fn register(&self, plugin: Arc<Plugin>) -> PluginResult<Arc<Plugin>> {
        let mut order = self.order.lock();
        let name = plugin.name().to_string();

        if self.plugins.contains_key(&name) {
            return Err(PluginError::LoadError(format!(
                "found another plugin with name {}. Aborting.",
                name
            )));
        }

        if plugin.capabilities().contains(Capabilities::SOURCING) {
            for other in self.plugins.iter() {
                if !other.capabilities().contains(Capabilities::SOURCING) {
                    continue;
                }
                if plugin.id() != 0 && other.id() == plugin.id() {
                    return Err(PluginError::LoadError(format!(
                        "found another plugin with id {}. Aborting.",
                        plugin.id()
                    )));
                }
                if !plugin.event_source().is_empty()
                    && other.event_source() == plugin.event_source()
                {
                    return Err(PluginError::LoadError(format!(
                        "found another plugin with event source {}. Aborting.",
                        plugin.event_source()
                    )));
                }
            }
            if !plugin.event_source().is_empty() {
                let idx = self.sources.add(plugin.event_source());
                tracing::debug!(
                    "Registered event source '{}' at index {}",
                    plugin.event_source(),
                    idx
                );
            }
        }

        self.plugins.insert(name.clone(), plugin.clone());
        order.push(name);
        Ok(plugin)
    }

    /// Load every enabled plugin listed by the configuration
    pub fn load_all(&self, config: &AppConfig) -> PluginResult<usize> {
        let mut count = 0;
        for plugin in config.plugins_to_load() {
            self.load(plugin)?;
            count += 1;
        }
        Ok(count)
    }

    /// Initialize a loaded plugin
    pub fn init(&self, name: &str, init_config: &str) -> PluginResult<()> {
        let plugin = self
            .get(name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;
        plugin.init(init_config)
    }

    /// Initialize every loaded plugin with its configured init config
    pub fn init_all(&self, config: &AppConfig) -> PluginResult<()> {
        for plugin in self.list() {
            let init_config = config
                .get_plugin(plugin.name())
                .map(|c| c.init_config.to_config_string())
                .unwrap_or_default();
            plugin.init(&init_config)?;
        }
        Ok(())
    }

    /// Destroy every plugin, in reverse load order
    pub fn destroy_all(&self) {
        for plugin in self.list().iter().rev() {
            plugin.destroy();
        }
    }

    /// Destroy and unregister a plugin
    pub fn unload(&self, name: &str) -> PluginResult<()> {
        let mut order = self.order.lock();
        let (_, plugin) = self
            .plugins
            .remove(name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;
        order.retain(|n| n != name);
        plugin.destroy();

        tracing::info!("Unloaded plugin: {}", name);
        Ok(())
    }

    /// Get a plugin by name
    pub fn get(&self, name: &str) -> Option<Arc<Plugin>> {
        self.plugins.get(name).map(|p| p.clone())
    }

    /// List all loaded plugins, in load order
    pub fn list(&self) -> Vec<Arc<Plugin>> {
        self.order
            .lock()
            .iter()
            .filter_map(|name| self.get(name))
            .collect()
    }

    /// Extraction plugins that accept events from `source`
    pub fn extraction_plugins_for(&self, source: &str) -> Vec<Arc<Plugin>> {
        self.list()
            .into_iter()
            .filter(|p| {
                p.capabilities().contains(Capabilities::EXTRACTION)
                    && p.extract_event_sources().is_compatible(source)
            })
            .collect()
    }

    /// Parsing plugins that accept events from `source`
    pub fn parsing_plugins_for(&self, source: &str) -> Vec<Arc<Plugin>> {
        self.list()
            .into_iter()
            .filter(|p| {
                p.capabilities().contains(Capabilities::PARSING)
                    && p.parse_event_sources().is_compatible(source)
            })
            .collect()
    }

    /// Sourcing plugin producing events for `source`
    pub fn source_plugin(&self, source: &str) -> Option<Arc<Plugin>> {
        self.list().into_iter().find(|p| {
            p.capabilities().contains(Capabilities::SOURCING) && p.event_source() == source
        })
    }

    /// Whether a module at `path` is already loaded
    pub fn is_loaded(&self, path: &Path) -> bool {
        self.plugins
            .iter()
            .any(|p| p.module_path().is_some_and(|loaded| loaded == path))
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("plugins", &*self.order.lock())
            .field("tables", &self.tables.len())
            .finish()
    }
}
