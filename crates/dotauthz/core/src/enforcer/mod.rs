// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Enforcement orchestration
//!
//! The [`Enforcer`] owns the model (policy rows and role graphs) behind one
//! reader-writer lock. Enforcement takes the read side, looks up the decision
//! cache, and on a miss evaluates the compiled matcher against every row of
//! the policy type before folding the outcomes with the declared effect.
//! Mutations take the write side and keep role graphs, the cache, the adapter
//! and the watcher in step (see [`management`]).

pub mod management;
pub mod rbac_api;

use crate::adapter::{Adapter, NullAdapter};
use crate::cache::{Cache, Decision, Fingerprint};
use crate::config::EnforcerConfig;
use crate::effect::EffectFold;
use crate::error::{AdapterError, AuthzError, AuthzResult};
use crate::matcher::{CompiledMatcher, CustomFunction, FunctionMap};
use crate::memo::BoundedMemo;
use crate::model::{Model, Section};
use crate::rbac::{DefaultRoleManager, MatchingFn, RoleManager};
use crate::value::{IntoRequest, Value};
use crate::watcher::{PolicyChange, Watcher};
use metrics::counter;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Which request, policy, effect and matcher definitions an enforcement uses
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnforceContext {
    pub rtype: String,
    pub ptype: String,
    pub etype: String,
    pub mtype: String,
}

impl EnforceContext {
    /// Context for numbered definitions: `new("2")` selects `r2`, `p2`, `e2`, `m2`
    pub fn new(suffix: &str) -> Self {
        Self {
            rtype: format!("r{}", suffix),
            ptype: format!("p{}", suffix),
            etype: format!("e{}", suffix),
            mtype: format!("m{}", suffix),
        }
    }

    fn parts(&self) -> [&str; 4] {
        [&self.rtype, &self.ptype, &self.etype, &self.mtype]
    }
}

impl Default for EnforceContext {
    fn default() -> Self {
        Self::new("")
    }
}

/// Options for [`Enforcer::batch_enforce_with`]
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub context: EnforceContext,
    /// Checked between requests; once set the batch fails with [`AuthzError::Cancelled`]
    pub cancel: Option<Arc<AtomicBool>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum MatcherSource {
    Named(String),
    Inline(String),
}

type MatcherKey = (String, String, MatcherSource);

/// Upper bound on compiled matchers kept per enforcer, ad hoc ones included
const MATCHER_MEMO_CAPACITY: usize = 256;

/// Everything guarded by the state lock
pub(crate) struct CoreState {
    pub(crate) model: Model,
    functions: FunctionMap,
    matchers: BoundedMemo<MatcherKey, Arc<CompiledMatcher>>,
}

impl CoreState {
    fn matcher(&self, ctx: &EnforceContext, inline: Option<&str>) -> AuthzResult<Arc<CompiledMatcher>> {
        let source = match inline {
            Some(text) => MatcherSource::Inline(text.to_string()),
            None => MatcherSource::Named(ctx.mtype.clone()),
        };
        let key = (ctx.rtype.clone(), ctx.ptype.clone(), source);
        if let Some(compiled) = self.matchers.get(&key) {
            return Ok(compiled);
        }

        let text = match inline {
            Some(text) => text,
            None => self.model.matcher(&ctx.mtype)?,
        };
        let scope = self.model.compile_scope(&ctx.rtype, &ctx.ptype)?.with_functions(self.functions.clone());
        let compiled = Arc::new(CompiledMatcher::compile(text, Arc::new(scope))?);
        debug!(rtype = %ctx.rtype, ptype = %ctx.ptype, matcher = %text, "Matcher compiled");
        self.matchers.insert(key, Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Evaluate one request against every row of the context's policy type
    fn evaluate(&self, ctx: &EnforceContext, matcher: &CompiledMatcher, request: &[Value]) -> AuthzResult<Decision> {
        let request_def = self.model.get(Section::Request, &ctx.rtype)?;
        if request.len() != request_def.arity() {
            return Err(AuthzError::ArityMismatch {
                ptype: ctx.rtype.clone(),
                expected: request_def.arity(),
                actual: request.len(),
            });
        }

        let effect = self.model.effect(&ctx.etype)?;
        let policy = self.model.get(Section::Policy, &ctx.ptype)?;
        let rows = policy.rows();
        if rows.is_empty() {
            return Ok(Decision::new(false, Vec::new()));
        }

        // a matcher that never reads `p` gives the same answer for every row
        let row_independent = match matcher.uses_policy() {
            true => None,
            false => Some(matcher.evaluate(request, &[], &self.model)?),
        };

        let mut fold = EffectFold::new(effect);
        for (index, row) in rows.iter().enumerate() {
            let matched = match row_independent {
                Some(matched) => matched,
                None => matcher.evaluate(request, row, &self.model)?,
            };
            if matched && fold.observe(index, policy.effect_of(row)).is_break() {
                break;
            }
        }

        let (allowed, decisive) = fold.finish();
        Ok(Decision::new(allowed, decisive.into_iter().map(|i| rows[i].clone()).collect()))
    }
}

/// Policy enforcement engine
pub struct Enforcer {
    state: RwLock<CoreState>,
    adapter: Mutex<Box<dyn Adapter>>,
    watcher: Mutex<Option<Box<dyn Watcher>>>,
    cache: Option<Arc<dyn Cache>>,
    config: EnforcerConfig,
    enabled: AtomicBool,
    batch_pool: rayon::ThreadPool,
}

impl fmt::Debug for Enforcer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Enforcer")
            .field("config", &self.config)
            .field("enabled", &self.enabled.load(Ordering::Relaxed))
            .field("cache", &self.cache)
            .finish()
    }
}

/// Assembles an [`Enforcer`] from a model and optional collaborators
pub struct EnforcerBuilder {
    model: Model,
    adapter: Option<Box<dyn Adapter>>,
    watcher: Option<Box<dyn Watcher>>,
    cache: Option<Arc<dyn Cache>>,
    functions: FunctionMap,
    config: EnforcerConfig,
}

impl EnforcerBuilder {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            adapter: None,
            watcher: None,
            cache: None,
            functions: FunctionMap::new(),
            config: EnforcerConfig::default(),
        }
    }

    /// Register a custom matcher function before the default matcher is compiled
    pub fn with_function<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&[Value]) -> AuthzResult<Value> + Send + Sync + 'static,
    {
        let f: CustomFunction = Arc::new(f);
        self.functions.add(name, f);
        self
    }

    pub fn with_adapter(mut self, adapter: impl Adapter + 'static) -> Self {
        self.adapter = Some(Box::new(adapter));
        self
    }

    pub fn with_watcher(mut self, watcher: impl Watcher + 'static) -> Self {
        self.watcher = Some(Box::new(watcher));
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_config(mut self, config: EnforcerConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the model, compile the default matcher and load the adapter's rows
    pub fn build(self) -> AuthzResult<Enforcer> {
        let mut model = self.model;
        for section in [Section::Request, Section::Policy, Section::Effect, Section::Matcher] {
            if !model.has_section(section) {
                return Err(AuthzError::model(format!("model is missing the '{}' section", section)));
            }
        }

        let role_types: Vec<String> = model.section(Section::Role).map(|a| a.key.clone()).collect();
        for ptype in &role_types {
            model.set_role_manager(ptype, Box::new(DefaultRoleManager::new(self.config.max_hierarchy_level)))?;
        }

        let batch_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.batch_parallelism)
            .thread_name(|i| format!("dotauthz-batch-{}", i))
            .build()
            .map_err(|e| AuthzError::InvalidArgument {
                message: format!("failed to build batch worker pool: {}", e),
            })?;

        let enforcer = Enforcer {
            state: RwLock::new(CoreState {
                model,
                functions: self.functions,
                matchers: BoundedMemo::new(MATCHER_MEMO_CAPACITY),
            }),
            adapter: Mutex::new(self.adapter.unwrap_or_else(|| Box::new(NullAdapter))),
            watcher: Mutex::new(self.watcher),
            cache: self.cache,
            enabled: AtomicBool::new(self.config.enabled),
            config: self.config,
            batch_pool,
        };

        {
            let state = enforcer.read_state()?;
            let ctx = EnforceContext::default();
            if state.model.get(Section::Request, &ctx.rtype).is_ok() && state.model.get(Section::Matcher, &ctx.mtype).is_ok() {
                state.matcher(&ctx, None)?;
            }
        }

        enforcer.load_policy()?;
        Ok(enforcer)
    }
}

impl Enforcer {
    /// Enforcer over `model` with no adapter, watcher or cache
    pub fn new(model: Model) -> AuthzResult<Self> {
        EnforcerBuilder::new(model).build()
    }

    pub fn builder(model: Model) -> EnforcerBuilder {
        EnforcerBuilder::new(model)
    }

    pub fn config(&self) -> &EnforcerConfig {
        &self.config
    }

    fn read_state(&self) -> AuthzResult<RwLockReadGuard<'_, CoreState>> {
        match self.config.lock_timeout {
            Some(waited) => self.state.try_read_for(waited).ok_or(AuthzError::LockTimeout {
                operation: "reading policy state",
                waited,
            }),
            None => Ok(self.state.read()),
        }
    }

    fn write_state(&self) -> AuthzResult<RwLockWriteGuard<'_, CoreState>> {
        match self.config.lock_timeout {
            Some(waited) => self.state.try_write_for(waited).ok_or(AuthzError::LockTimeout {
                operation: "mutating policy state",
                waited,
            }),
            None => Ok(self.state.write()),
        }
    }

    /// Run `f` against the current model under the read lock
    pub fn with_model<T>(&self, f: impl FnOnce(&Model) -> T) -> AuthzResult<T> {
        let state = self.read_state()?;
        Ok(f(&state.model))
    }

    // Enforcement

    /// Decide a request under the default context
    pub fn enforce<R: IntoRequest>(&self, request: R) -> AuthzResult<bool> {
        Ok(self.decide(&EnforceContext::default(), None, request)?.allowed)
    }

    /// Decide a request and return the rows that produced the outcome
    pub fn enforce_ex<R: IntoRequest>(&self, request: R) -> AuthzResult<(bool, Vec<Vec<String>>)> {
        let decision = self.decide(&EnforceContext::default(), None, request)?;
        Ok((decision.allowed, decision.explain))
    }

    pub fn enforce_with_context<R: IntoRequest>(&self, ctx: &EnforceContext, request: R) -> AuthzResult<bool> {
        Ok(self.decide(ctx, None, request)?.allowed)
    }

    /// Decide a request with an ad hoc matcher instead of the model's `m`
    pub fn enforce_with_matcher<R: IntoRequest>(&self, matcher: &str, request: R) -> AuthzResult<bool> {
        Ok(self.decide(&EnforceContext::default(), Some(matcher), request)?.allowed)
    }

    /// Full enforcement entry point
    ///
    /// A disabled enforcer allows everything without touching the cache.
    pub fn decide<R: IntoRequest>(&self, ctx: &EnforceContext, matcher: Option<&str>, request: R) -> AuthzResult<Decision> {
        let request = request.into_request();
        if !self.is_enabled() {
            return Ok(Decision::new(true, Vec::new()));
        }
        let state = self.read_state()?;
        self.decide_locked(&state, ctx, matcher, &request)
    }

    fn decide_locked(&self, state: &CoreState, ctx: &EnforceContext, matcher: Option<&str>, request: &[Value]) -> AuthzResult<Decision> {
        let start_time = Instant::now();
        counter!("dotauthz_enforce_total", 1);

        let fingerprint = self.cache.as_ref().map(|_| Fingerprint::new(&ctx.parts(), request, matcher));
        if let (Some(cache), Some(key)) = (&self.cache, &fingerprint) {
            if let Some(decision) = cache.get(key) {
                counter!("dotauthz_cache_hits_total", 1);
                if decision.allowed {
                    counter!("dotauthz_enforce_allowed_total", 1);
                }
                debug!(fingerprint = %key, allowed = %decision.allowed, "Decision cache hit");
                return Ok(decision);
            }
            counter!("dotauthz_cache_misses_total", 1);
        }

        let compiled = state.matcher(ctx, matcher)?;
        let decision = state.evaluate(ctx, &compiled, request)?;

        if let (Some(cache), Some(key)) = (&self.cache, fingerprint) {
            cache.set(key, decision.clone());
        }
        if decision.allowed {
            counter!("dotauthz_enforce_allowed_total", 1);
        }

        let duration = start_time.elapsed();
        if duration > self.config.slow_enforce_threshold {
            warn!(
                ptype = %ctx.ptype,
                request = ?request,
                duration_ms = %duration.as_millis(),
                "Slow enforcement detected"
            );
        }

        debug!(
            ptype = %ctx.ptype,
            request = ?request,
            allowed = %decision.allowed,
            duration_us = %duration.as_micros(),
            "Enforcement completed"
        );

        Ok(decision)
    }

    /// Decide many requests on the batch worker pool under the default context
    pub fn batch_enforce<R: IntoRequest>(&self, requests: Vec<R>) -> AuthzResult<Vec<bool>> {
        let decisions = self.batch_enforce_with(requests, &BatchOptions::default())?;
        Ok(decisions.into_iter().map(|d| d.allowed).collect())
    }

    /// Decide many requests; all units see the same policy snapshot
    pub fn batch_enforce_with<R: IntoRequest>(&self, requests: Vec<R>, options: &BatchOptions) -> AuthzResult<Vec<Decision>> {
        let requests: Vec<Vec<Value>> = requests.into_iter().map(IntoRequest::into_request).collect();
        if !self.is_enabled() {
            return Ok(requests.iter().map(|_| Decision::new(true, Vec::new())).collect());
        }

        let cancelled = || options.cancel.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed));
        if cancelled() {
            return Err(AuthzError::Cancelled);
        }

        let state = self.read_state()?;
        let core: &CoreState = &state;
        let ctx = &options.context;
        self.batch_pool.install(|| {
            requests
                .par_iter()
                .map(|request| {
                    if cancelled() {
                        return Err(AuthzError::Cancelled);
                    }
                    self.decide_locked(core, ctx, None, request)
                })
                .collect::<AuthzResult<Vec<Decision>>>()
        })
    }

    // Control

    /// Toggle enforcement; while disabled every request is allowed
    pub fn enable_enforce(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        info!(enabled = %enabled, "Enforcement toggled");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn enable_auto_save(&mut self, auto_save: bool) {
        self.config.auto_save = auto_save;
    }

    pub fn enable_auto_build_role_links(&mut self, auto_build_role_links: bool) {
        self.config.auto_build_role_links = auto_build_role_links;
    }

    pub fn enable_auto_notify_watcher(&mut self, auto_notify_watcher: bool) {
        self.config.auto_notify_watcher = auto_notify_watcher;
    }

    pub fn enable_auto_clean_cache(&mut self, auto_clean_cache: bool) {
        self.config.auto_clean_cache = auto_clean_cache;
    }

    pub fn set_watcher(&self, watcher: impl Watcher + 'static) {
        *self.watcher.lock() = Some(Box::new(watcher));
    }

    pub fn set_adapter(&self, adapter: impl Adapter + 'static) {
        *self.adapter.lock() = Box::new(adapter);
    }

    /// Replace the stored rows with the adapter's and rebuild role graphs
    pub fn load_policy(&self) -> AuthzResult<()> {
        let lines = self.adapter.lock().load_policy()?;
        let count = lines.len();

        {
            let mut state = self.write_state()?;
            for line in &lines {
                let section = Section::of_ptype(&line.ptype)?;
                state.model.check_arity(section.key(), &line.ptype, std::slice::from_ref(&line.rule))?;
            }
            state.model.clear_policy();
            state.model.load_lines(lines)?;
            if self.config.auto_build_role_links {
                state.model.build_role_links()?;
            }
        }

        self.clear_cache();
        info!(rows = %count, "Policy loaded");
        Ok(())
    }

    /// Write every stored row to the adapter
    pub fn save_policy(&self) -> AuthzResult<()> {
        let lines = self.read_state()?.model.to_lines();
        self.adapter.lock().save_policy(&lines)?;
        info!(rows = %lines.len(), "Policy saved");
        self.notify(PolicyChange::SavePolicy);
        Ok(())
    }

    /// Inbound hook for watchers: reload from the adapter and drop cached decisions
    pub fn on_external_change(&self) -> AuthzResult<()> {
        info!("External policy change signalled");
        self.load_policy()
    }

    /// Rebuild every role graph from the grouping rows
    pub fn build_role_links(&self) -> AuthzResult<()> {
        self.write_state()?.model.build_role_links()?;
        self.clear_cache();
        info!("Role links rebuilt");
        Ok(())
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    /// Register a custom matcher function; compiled matchers are discarded
    pub fn add_function<F>(&self, name: &str, f: F) -> AuthzResult<()>
    where
        F: Fn(&[Value]) -> AuthzResult<Value> + Send + Sync + 'static,
    {
        let mut state = self.write_state()?;
        let f: CustomFunction = Arc::new(f);
        state.functions.add(name, f);
        state.matchers.clear();
        drop(state);
        self.clear_cache();
        Ok(())
    }

    /// Install a name matching function on the role graph of `ptype`
    pub fn add_named_matching_fn<F>(&self, ptype: &str, f: F) -> AuthzResult<()>
    where
        F: Fn(&str, &str) -> bool + Send + Sync + 'static,
    {
        let f: MatchingFn = Arc::new(f);
        self.write_state()?.model.get_mut(Section::Role, ptype)?.add_matching_fn(f);
        self.clear_cache();
        Ok(())
    }

    /// Install a domain matching function on the role graph of `ptype`
    pub fn add_named_domain_matching_fn<F>(&self, ptype: &str, f: F) -> AuthzResult<()>
    where
        F: Fn(&str, &str) -> bool + Send + Sync + 'static,
    {
        let f: MatchingFn = Arc::new(f);
        self.write_state()?.model.get_mut(Section::Role, ptype)?.add_domain_matching_fn(f);
        self.clear_cache();
        Ok(())
    }

    /// Swap the role manager of `ptype` and populate it from the current rows
    pub fn set_role_manager(&self, ptype: &str, rm: Box<dyn RoleManager>) -> AuthzResult<()> {
        self.write_state()?.model.set_role_manager(ptype, rm)?;
        self.clear_cache();
        Ok(())
    }

    // Mutation plumbing shared by the management API

    /// Forward a mutation to the adapter when auto-save is on
    ///
    /// `NotImplemented` is swallowed; other failures are returned to the
    /// caller after the in-memory state has been updated.
    fn persist(&self, op: impl FnOnce(&mut dyn Adapter) -> Result<(), AdapterError>) -> AuthzResult<()> {
        if !self.config.auto_save {
            return Ok(());
        }
        let mut adapter = self.adapter.lock();
        match op(&mut **adapter) {
            Ok(()) => Ok(()),
            Err(AdapterError::NotImplemented(operation)) => {
                warn!(operation = %operation, "Adapter does not implement operation; change kept in memory only");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Adapter failed to persist policy change");
                Err(e.into())
            }
        }
    }

    /// Fire-and-forget watcher notification
    fn notify(&self, change: PolicyChange) {
        if !self.config.auto_notify_watcher {
            return;
        }
        if let Some(watcher) = self.watcher.lock().as_mut() {
            if let Err(e) = watcher.update(&change) {
                warn!(error = %e, change = ?change, "Watcher notification failed");
            }
        }
    }

    fn after_mutation(&self, change: PolicyChange) {
        counter!("dotauthz_policy_mutations_total", 1);
        if self.config.auto_clean_cache {
            self.clear_cache();
        }
        self.notify(change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DefaultCache;

    fn acl_model() -> Model {
        Model::from_defs(&[
            ("r", "r", "sub, obj, act"),
            ("p", "p", "sub, obj, act"),
            ("e", "e", "some(where (p.eft == allow))"),
            ("m", "m", "r.sub == p.sub && r.obj == p.obj && r.act == p.act"),
        ])
        .unwrap()
    }

    #[test]
    fn test_context_suffix() {
        let ctx = EnforceContext::new("2");
        assert_eq!(ctx.parts(), ["r2", "p2", "e2", "m2"]);
        assert_eq!(EnforceContext::default().parts(), ["r", "p", "e", "m"]);
    }

    #[test]
    fn test_build_rejects_incomplete_model() {
        let model = Model::from_defs(&[("r", "r", "sub"), ("p", "p", "sub"), ("e", "e", "some(where (p.eft == allow))")]).unwrap();
        assert!(matches!(Enforcer::new(model), Err(AuthzError::ModelDefinition { .. })));
    }

    #[test]
    fn test_build_fails_fast_on_bad_matcher() {
        let model = Model::from_defs(&[
            ("r", "r", "sub, obj, act"),
            ("p", "p", "sub, obj, act"),
            ("e", "e", "some(where (p.eft == allow))"),
            ("m", "m", "r.sub == p.owner"),
        ])
        .unwrap();
        assert!(matches!(Enforcer::new(model), Err(AuthzError::ModelDefinition { .. })));
    }

    #[test]
    fn test_request_arity_is_checked() {
        let e = Enforcer::new(acl_model()).unwrap();
        e.add_policy(&["alice", "data1", "read"]).unwrap();
        assert!(matches!(e.enforce(["alice", "data1"]), Err(AuthzError::ArityMismatch { expected: 3, actual: 2, .. })));
    }

    #[test]
    fn test_lock_timeout_is_reported() {
        let config = EnforcerConfig {
            lock_timeout: Some(std::time::Duration::from_millis(10)),
            ..EnforcerConfig::default()
        };
        let e = Enforcer::builder(acl_model()).with_config(config).build().unwrap();
        let guard = e.state.write();
        let err = e.enforce(["alice", "data1", "read"]).unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(e.add_policy(&["a", "b", "c"]), Err(AuthzError::LockTimeout { .. })));
        drop(guard);
        assert!(!e.enforce(["alice", "data1", "read"]).unwrap());
    }

    #[test]
    fn test_cache_is_populated_and_cleared_on_mutation() {
        let cache: Arc<DefaultCache> = Arc::new(DefaultCache::default());
        let e = Enforcer::builder(acl_model()).with_cache(cache.clone()).build().unwrap();
        e.add_policy(&["alice", "data1", "read"]).unwrap();
        assert!(e.enforce(["alice", "data1", "read"]).unwrap());
        assert_eq!(cache.len(), 1);
        assert!(e.enforce(["alice", "data1", "read"]).unwrap());
        assert_eq!(cache.stats().hits, 1);

        e.add_policy(&["bob", "data2", "write"]).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_row_independent_matcher_is_evaluated_once() {
        use std::sync::atomic::AtomicUsize;

        let e = Enforcer::new(acl_model()).unwrap();
        e.add_policies(&[["alice", "data1", "read"], ["bob", "data2", "write"], ["carol", "data3", "read"]]).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        e.add_function("isRoot", move |args: &[Value]| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Bool(args[0].as_str() == Some("root")))
        })
        .unwrap();

        assert!(e.enforce_with_matcher("isRoot(r.sub)", ["root", "anything", "delete"]).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!e.enforce_with_matcher("isRoot(r.sub)", ["alice", "data1", "read"]).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // rows are still required for a grant
        e.clear_policy().unwrap();
        assert!(!e.enforce_with_matcher("isRoot(r.sub)", ["root", "anything", "delete"]).unwrap());
    }

    #[test]
    fn test_compiled_matchers_are_bounded() {
        let e = Enforcer::new(acl_model()).unwrap();
        e.add_policy(&["alice", "data1", "read"]).unwrap();

        for i in 0..(MATCHER_MEMO_CAPACITY * 2) {
            let matcher = format!("r.sub == p.sub && r.obj != 'other{}'", i);
            assert!(e.enforce_with_matcher(&matcher, ["alice", "data1", "read"]).unwrap());
        }
        assert!(e.state.read().matchers.len() <= MATCHER_MEMO_CAPACITY);
        assert!(e.enforce(["alice", "data1", "read"]).unwrap());
    }

    #[test]
    fn test_batch_cancellation() {
        let e = Enforcer::new(acl_model()).unwrap();
        let cancel = Arc::new(AtomicBool::new(true));
        let options = BatchOptions {
            context: EnforceContext::default(),
            cancel: Some(cancel),
        };
        assert!(matches!(e.batch_enforce_with(vec![["a", "b", "c"]], &options), Err(AuthzError::Cancelled)));
    }
}
