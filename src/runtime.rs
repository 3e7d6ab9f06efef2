//! The collaborator bundle every binding runs against.

use std::sync::Arc;

use crate::binding::BindingRefs;
use crate::component::ComponentRegistry;
use crate::config::Config;
use crate::engine::ActionEngine;
use crate::host::{Dom, TemplateCompiler, TemplateLoader};
use crate::scheduler::Spawner;

struct RuntimeInner {
    config: Config,
    dom: Arc<dyn Dom>,
    loader: Arc<dyn TemplateLoader>,
    compiler: Arc<dyn TemplateCompiler>,
    spawner: Arc<dyn Spawner>,
    components: ComponentRegistry,
    actions: ActionEngine,
    refs: BindingRefs,
}

/// Shared context for bindings: configuration, the host collaborators, the
/// component and action registries, and the marker association store.
///
/// Cheap to clone; clones share everything.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use oxide_bind::testing::{TestDom, TestLoader, TestCompiler};
/// use oxide_bind::{Config, Runtime, Scheduler};
///
/// let scheduler = Scheduler::new();
/// let runtime = Runtime::new(
///     Config::default(),
///     Arc::new(TestDom::new()),
///     Arc::new(TestLoader::new()),
///     Arc::new(TestCompiler::new()),
///     Arc::new(scheduler.clone()),
/// );
/// assert_eq!(runtime.config().prefix, "ox-");
/// ```
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime.
    ///
    /// # Arguments
    ///
    /// * `config` - Markup surface names
    /// * `dom` - The host document
    /// * `loader` - Loader for external component templates
    /// * `compiler` - Compiler used to bind transcluded content
    /// * `spawner` - Spawner for asynchronous lifecycle work
    pub fn new(
        config: Config,
        dom: Arc<dyn Dom>,
        loader: Arc<dyn TemplateLoader>,
        compiler: Arc<dyn TemplateCompiler>,
        spawner: Arc<dyn Spawner>,
    ) -> Self {
        let actions = ActionEngine::new(config.clone(), dom.clone(), spawner.clone());

        Self {
            inner: Arc::new(RuntimeInner {
                config,
                dom,
                loader,
                compiler,
                spawner,
                components: ComponentRegistry::new(),
                actions,
                refs: BindingRefs::default(),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn dom(&self) -> &Arc<dyn Dom> {
        &self.inner.dom
    }

    pub fn loader(&self) -> &Arc<dyn TemplateLoader> {
        &self.inner.loader
    }

    pub fn compiler(&self) -> &Arc<dyn TemplateCompiler> {
        &self.inner.compiler
    }

    pub fn spawner(&self) -> &Arc<dyn Spawner> {
        &self.inner.spawner
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.inner.components
    }

    pub fn actions(&self) -> &ActionEngine {
        &self.inner.actions
    }

    /// Marker node → component binding associations.
    pub fn bindings(&self) -> &BindingRefs {
        &self.inner.refs
    }
}
