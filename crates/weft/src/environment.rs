//! The environment: loader, registries, caches, and render entry points.

use std::{
    fmt,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use ahash::AHashMap;
use indexmap::IndexMap;
use tracing::debug;

use crate::{
    cache::{CacheStats, TtlCache},
    context::{Context, ContextWrapper},
    ctx_hash::hash_context,
    exception::{RenderError, TemplateError},
    expressions::ExprLoc,
    filters::FilterRegistry,
    inherit::{InheritanceHierarchy, ResolvedTemplate, build_hierarchy, resolve_template},
    loader::TemplateLoader,
    namespace::{TemplateNamespace, collect_exports},
    nodes::Node,
    run::Renderer,
    testers::TestRegistry,
    types::{cycler_constructor, joiner_constructor},
    value::Value,
};

/// Default time-to-live for cached inheritance hierarchies.
pub const HIERARCHY_CACHE_TTL: Duration = Duration::from_secs(15 * 60);
/// Default time-to-live for cached resolved templates.
pub const RESOLVED_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
/// Default capacity of each cache store.
pub const CACHE_CAPACITY: usize = 1000;

/// One independent filter-chain evaluation for batch mode.
///
/// Each job owns its context; callers clone upfront so workers never share
/// mutable state.
pub struct FilterJob {
    pub expr: ExprLoc,
    pub context: ContextWrapper,
}

/// Owns everything a render needs: the template loader, the filter and test
/// registries, global helper values, and the inheritance caches.
///
/// The environment is `Sync`; renders borrow it immutably, so one instance
/// serves concurrent renders. The caches are the only shared mutable state
/// and guard themselves.
pub struct Environment {
    loader: Arc<dyn TemplateLoader>,
    filters: FilterRegistry,
    tests: TestRegistry,
    globals: Context,
    hierarchy_cache: TtlCache<Arc<InheritanceHierarchy>>,
    resolved_cache: TtlCache<ResolvedTemplate>,
    namespaces: RwLock<AHashMap<String, Arc<TemplateNamespace>>>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("filters", &self.filters)
            .field("tests", &self.tests)
            .finish_non_exhaustive()
    }
}

impl Environment {
    pub fn new(loader: impl TemplateLoader + 'static) -> Self {
        Self::with_cache_config(loader, HIERARCHY_CACHE_TTL, RESOLVED_CACHE_TTL, CACHE_CAPACITY)
    }

    pub fn with_cache_config(
        loader: impl TemplateLoader + 'static,
        hierarchy_ttl: Duration,
        resolved_ttl: Duration,
        capacity: usize,
    ) -> Self {
        let mut globals = Context::new();
        globals.set("cycler", cycler_constructor());
        globals.set("joiner", joiner_constructor());

        Self {
            loader: Arc::new(loader),
            filters: FilterRegistry::new(),
            tests: TestRegistry::new(),
            globals,
            hierarchy_cache: TtlCache::new("hierarchy", hierarchy_ttl, capacity),
            resolved_cache: TtlCache::new("resolved", resolved_ttl, capacity),
            namespaces: RwLock::new(AHashMap::new()),
        }
    }

    #[must_use]
    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut FilterRegistry {
        &mut self.filters
    }

    #[must_use]
    pub fn tests(&self) -> &TestRegistry {
        &self.tests
    }

    pub fn tests_mut(&mut self) -> &mut TestRegistry {
        &mut self.tests
    }

    #[must_use]
    pub(crate) fn loader(&self) -> &dyn TemplateLoader {
        self.loader.as_ref()
    }

    /// Registers a global value visible to every render.
    pub fn add_global(&mut self, name: impl Into<String>, value: Value) {
        self.globals.set(name, value);
    }

    #[must_use]
    pub(crate) fn global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).cloned()
    }

    /// Renders the named template with the given variables.
    pub fn render(&self, name: &str, context: Context) -> Result<String, TemplateError> {
        self.render_with(name, ContextWrapper::new(context))
    }

    /// Renders the named template with a pre-configured context wrapper
    /// (autoescaper installed, escape context selected).
    pub fn render_with(&self, name: &str, mut ctx: ContextWrapper) -> Result<String, TemplateError> {
        let (resolved, hierarchy) = self.resolve(name, ctx.context())?;
        let mut renderer = Renderer::for_template(self, Some(hierarchy), name);
        renderer.render_entry(&resolved.node, &mut ctx)
    }

    /// Renders an AST directly, bypassing the loader and the inheritance
    /// resolver. `extends` nodes in the body are inert on this path.
    pub fn render_node(&self, node: &Node, context: Context) -> Result<String, TemplateError> {
        self.render_node_with(node, ContextWrapper::new(context))
    }

    pub fn render_node_with(&self, node: &Node, mut ctx: ContextWrapper) -> Result<String, TemplateError> {
        let mut renderer = Renderer::new(self);
        renderer.render_entry(node, &mut ctx)
    }

    /// Resolves a template through the caches: hierarchy by template name,
    /// resolved AST by template name plus context fingerprint.
    pub(crate) fn resolve(
        &self,
        name: &str,
        context: &Context,
    ) -> Result<(ResolvedTemplate, Arc<InheritanceHierarchy>), TemplateError> {
        let key = format!("{name}::{}", hash_context(context));
        if let Some(resolved) = self.resolved_cache.get(&key) {
            let hierarchy = self.hierarchy_for(name)?;
            return Ok((resolved, hierarchy));
        }

        let hierarchy = self.hierarchy_for(name)?;
        let resolved = resolve_template(&hierarchy)?;
        self.resolved_cache.insert(key, resolved.clone());
        Ok((resolved, hierarchy))
    }

    fn hierarchy_for(&self, name: &str) -> Result<Arc<InheritanceHierarchy>, TemplateError> {
        if let Some(hierarchy) = self.hierarchy_cache.get(name) {
            return Ok(hierarchy);
        }
        let hierarchy = Arc::new(build_hierarchy(self.loader.as_ref(), name)?);
        self.hierarchy_cache.insert(name.to_owned(), Arc::clone(&hierarchy));
        Ok(hierarchy)
    }

    /// The namespace of an imported template, extracted once and cached.
    ///
    /// A template the loader does not know yields an empty placeholder
    /// namespace, keeping imports tolerant of optional templates.
    pub fn namespace_for(&self, name: &str) -> Result<Arc<TemplateNamespace>, TemplateError> {
        if let Some(namespace) = self
            .namespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Ok(Arc::clone(namespace));
        }

        let namespace = if self.loader.template_exists(name) {
            let ast = self.loader.load_template(name)?;
            let mut scope = Context::new();
            let mut macros = IndexMap::new();
            let mut variables = IndexMap::new();
            let mut eval = |expr: &ExprLoc, scope: &Context| -> Result<Value, TemplateError> {
                let mut renderer = Renderer::new(self);
                let wrapper = ContextWrapper::new(scope.clone());
                renderer
                    .eval_expr(expr, &wrapper)
                    .map_err(RenderError::into_template_error)
            };
            collect_exports(ast.top_level_body(), &mut scope, &mut macros, &mut variables, &mut eval);
            Arc::new(TemplateNamespace {
                template_name: name.to_owned(),
                macros,
                variables,
            })
        } else {
            debug!(template = name, "import of unknown template, using empty namespace");
            Arc::new(TemplateNamespace::empty(name))
        };

        let mut namespaces = self.namespaces.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(namespaces.entry(name.to_owned()).or_insert(namespace)))
    }

    /// Drops every cached artifact derived from `name`: its hierarchy, its
    /// namespace, and every resolved template whose chain contains it. A
    /// base template change therefore invalidates all of its descendants.
    pub fn invalidate_template(&self, name: &str) {
        self.hierarchy_cache.remove(name);
        self.resolved_cache
            .invalidate_where(|_, resolved| resolved.chain.iter().any(|t| t == name));
        self.namespaces
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        debug!(template = name, "invalidated cached state");
    }

    /// Removes expired entries from both caches now.
    pub fn sweep_caches(&self) {
        self.hierarchy_cache.sweep();
        self.resolved_cache.sweep();
    }

    #[must_use]
    pub fn hierarchy_cache_stats(&self) -> CacheStats {
        self.hierarchy_cache.stats()
    }

    #[must_use]
    pub fn resolved_cache_stats(&self) -> CacheStats {
        self.resolved_cache.stats()
    }

    /// Evaluates independent filter chains concurrently.
    ///
    /// One worker per job; each job owns its context. Completion is awaited
    /// as a barrier and results come back in job order regardless of which
    /// worker finished first, with each job's error captured independently.
    pub fn eval_filter_batch(&self, jobs: Vec<FilterJob>) -> Vec<Result<Value, TemplateError>> {
        std::thread::scope(|scope| {
            let handles: Vec<_> = jobs
                .into_iter()
                .map(|job| {
                    scope.spawn(move || {
                        let mut renderer = Renderer::new(self);
                        renderer
                            .eval_expr(&job.expr, &job.context)
                            .map_err(RenderError::into_template_error)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(TemplateError::value_error("filter worker panicked")))
                })
                .collect()
        })
    }
}
