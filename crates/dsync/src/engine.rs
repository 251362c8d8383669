//! 🔁 The reconciliation engine: where two accounts are told to agree.
//!
//! 🎬 *[a source account and a destination account stare at each other across a diner booth]*
//! *[neither knows the other's ids]* *[the engine slides a napkin with identity keys on it]*
//!
//! 🧠 Knowledge graph:
//! - `import`: source listing → filters → adapter `import` → `source[type]` → disk.
//! - `sync`, per type:
//!   1. 🚧 `pre_apply` builds the Destination Cache. Hard barrier: nothing is written
//!      for the type until it returns.
//!   2. 📋 plan: each source entry is a create (not in `destination[type]`, or in it
//!      but no longer in the cache), an update (there, but different once excluded
//!      attributes are ignored), or a skip.
//!   3. 🧵 apply: writes sharing a cache match key run one after another in the same
//!      slot; distinct keys run concurrently, at most `max_workers` at a time.
//!   4. 🧹 cleanup (opt-in): destination entries whose identity left the source are deleted.
//!   5. 💾 state for the type is saved, whatever happened above.
//! - `diffs`: read-only comparison of the two sides of the State Store.
//! - `migrate`: import, then sync.
//!
//! 🚦 Failure triage (see `errors::classify`):
//! - one bad item: logged with type and identity, counted, siblings carry on
//! - transport down: the rest of this type is cancelled, other types still run
//! - invariant violation: the run stops right after this type's state is saved
//!
//! 🦆 The duck has seen things. Two accounts, one identity. It doesn't talk about it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::cache::DestinationCache;
use crate::context::{ApplyContext, SyncContext};
use crate::diff::{diff_paths, differs, strip_excluded};
use crate::errors::{Severity, classify, is_not_found};
use crate::filters::FilterSet;
use crate::progress::ApplyProgress;
use crate::report::{RunReport, TypeReport};
use crate::resources::{Resource, ResourceBackend, ResourceConfig};
use crate::state::{ResourceMap, StateStorage, StateStore};

/// 🎛️ Run-wide knobs.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Upper bound on concurrent writes within one resource type.
    pub max_workers: usize,
    pub show_progress: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_workers: 10,
            show_progress: false,
        }
    }
}

/// 🔍 What `sync` would do to one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Create,
    /// Dotted paths that differ, excluded attributes ignored.
    Update(Vec<String>),
    /// At the destination, gone from the source. Only acted on with cleanup.
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub resource_type: &'static str,
    pub identity: String,
    pub change: Change,
}

impl fmt::Display for DiffEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.change {
            Change::Create => write!(f, "➕ {} '{}' would be created", self.resource_type, self.identity),
            Change::Update(paths) => write!(
                f,
                "✏️ {} '{}' differs at: {}",
                self.resource_type,
                self.identity,
                paths.join(", ")
            ),
            Change::Delete => write!(
                f,
                "➖ {} '{}' is no longer in the source (removed by cleanup)",
                self.resource_type, self.identity
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Create,
    Update,
}

#[derive(Debug)]
struct PlannedWrite {
    identity: String,
    payload: Value,
    action: Action,
}

#[derive(Debug)]
enum Outcome {
    Created,
    Updated,
    Deleted,
    Failed { severity: Severity, error: anyhow::Error },
    Cancelled,
}

/// 📋 Everything one apply pass needs to know before it starts writing.
#[derive(Debug, Default)]
struct Plan {
    writes: Vec<PlannedWrite>,
    skipped: usize,
    stale: Vec<String>,
    /// In `destination[type]` but missing from the live cache: recreated, not updated.
    vanished: Vec<String>,
}

impl Plan {
    fn build(state: &StateStore, resource: &dyn Resource, cache: &DestinationCache) -> Self {
        let config = resource.config();
        let resource_type = config.resource_type;
        let excluded = config.excluded_attributes;
        let source = state.source(resource_type);
        let destination = state.destination(resource_type);

        let mut plan = Plan::default();
        for (identity, instance) in source {
            let action = match destination.get(identity) {
                Some(existing) if vanished(resource, cache, instance, existing) => {
                    plan.vanished.push(identity.clone());
                    Action::Create
                }
                Some(existing) if !differs(instance, existing, excluded) => {
                    plan.skipped += 1;
                    continue;
                }
                Some(_) => Action::Update,
                None => Action::Create,
            };
            plan.writes.push(PlannedWrite {
                identity: identity.clone(),
                payload: strip_excluded(instance, excluded),
                action,
            });
        }
        plan.stale = destination
            .keys()
            .filter(|identity| !source.contains_key(*identity))
            .cloned()
            .collect();
        plan
    }
}

/// 👻 Known to the State Store but absent from the live destination.
///
/// Either the last-known destination shape or the source shape may carry the key
/// the cache was indexed by. Keyless instances never count as vanished.
fn vanished(
    resource: &dyn Resource,
    cache: &DestinationCache,
    instance: &Value,
    existing: &Value,
) -> bool {
    let keys: Vec<String> = [resource.match_key(existing), resource.match_key(instance)]
        .into_iter()
        .flatten()
        .collect();
    !keys.is_empty() && !keys.iter().any(|key| cache.contains(key))
}

/// 🧮 Running totals for one apply pass, plus the first showstoppers seen.
#[derive(Debug, Default)]
struct Tally {
    cancelled: usize,
    abort: Option<anyhow::Error>,
    fatal: Option<anyhow::Error>,
}

impl Tally {
    fn absorb(&mut self, report: &mut TypeReport, outcome: Outcome) {
        match outcome {
            Outcome::Created => report.created += 1,
            Outcome::Updated => report.updated += 1,
            Outcome::Deleted => report.deleted += 1,
            Outcome::Cancelled => self.cancelled += 1,
            Outcome::Failed { severity, error } => {
                report.failed += 1;
                let slot = match severity {
                    Severity::Item => return,
                    Severity::TypeAbort => &mut self.abort,
                    Severity::Fatal => &mut self.fatal,
                };
                if slot.is_none() {
                    *slot = Some(error);
                }
            }
        }
    }

    fn stopped(&self) -> bool {
        self.abort.is_some() || self.fatal.is_some()
    }
}

/// 🔁 One reconciliation run: both accounts, the State Store, and the rules.
#[derive(Debug)]
pub struct Engine {
    ctx: SyncContext,
    storage: Arc<dyn StateStorage>,
    filters: FilterSet,
    options: EngineOptions,
}

impl Engine {
    pub fn new(
        ctx: SyncContext,
        storage: Arc<dyn StateStorage>,
        filters: FilterSet,
        options: EngineOptions,
    ) -> Self {
        Self {
            ctx,
            storage,
            filters,
            options,
        }
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    pub fn into_state(self) -> StateStore {
        self.ctx.into_state()
    }

    /// 📥 Refresh `source[type]` from the source account for every selected type.
    pub async fn import(&self, backends: &[ResourceBackend]) -> Result<RunReport> {
        let mut report = RunReport::default();
        for backend in backends {
            report.push(self.import_type(backend.as_resource()).await?);
        }
        Ok(report)
    }

    /// 🔄 Make the destination look like `source[type]` for every selected type.
    ///
    /// Item failures and aborted types end up in the report; only an invariant
    /// violation comes back as `Err`, after the offending type's state is saved.
    pub async fn sync(&self, backends: &[ResourceBackend], cleanup: bool) -> Result<RunReport> {
        let mut report = RunReport::default();
        for backend in backends {
            report.push(self.apply_type(backend.as_resource(), cleanup).await?);
        }
        Ok(report)
    }

    /// 🚚 Import, then sync.
    pub async fn migrate(&self, backends: &[ResourceBackend], cleanup: bool) -> Result<RunReport> {
        let mut report = self.import(backends).await?;
        report.merge(self.sync(backends, cleanup).await?);
        Ok(report)
    }

    /// 🔍 What `sync` would change, computed from the State Store alone. No network.
    pub async fn diffs(&self, backends: &[ResourceBackend]) -> Vec<DiffEntry> {
        let state = self.ctx.state().await;
        let mut entries = Vec::new();
        for backend in backends {
            let config = backend.as_resource().config();
            let resource_type = config.resource_type;
            let source = state.source(resource_type);
            let destination = state.destination(resource_type);

            for (identity, instance) in source {
                let change = match destination.get(identity) {
                    None => Change::Create,
                    Some(existing) => {
                        let paths = diff_paths(instance, existing, config.excluded_attributes);
                        if paths.is_empty() {
                            continue;
                        }
                        Change::Update(paths)
                    }
                };
                entries.push(DiffEntry {
                    resource_type,
                    identity: identity.clone(),
                    change,
                });
            }
            entries.extend(
                destination
                    .keys()
                    .filter(|identity| !source.contains_key(*identity))
                    .map(|identity| DiffEntry {
                        resource_type,
                        identity: identity.clone(),
                        change: Change::Delete,
                    }),
            );
        }
        entries
    }

    fn workers_for(&self, config: &ResourceConfig) -> usize {
        if config.concurrent {
            self.options.max_workers.max(1)
        } else {
            1
        }
    }

    async fn persist(&self, resource_type: &str) -> Result<()> {
        let state = self.ctx.state().await;
        self.storage
            .save(&state, resource_type)
            .await
            .with_context(|| format!("💀 Failed to save {resource_type} state"))
    }

    async fn import_type(&self, resource: &dyn Resource) -> Result<TypeReport> {
        let config = resource.config();
        let resource_type = config.resource_type;
        let mut report = TypeReport::new(resource_type);
        info!("📥 Importing {} from the source account", resource_type);

        let results: Vec<Result<(String, Value)>> = if let Some(field) = config.lookup_field {
            let names = self.filters.equals_values(resource_type, field);
            if names.is_empty() {
                // -- 📋 the adapter explains how to name what it can't list
                resource.list(self.ctx.source()).await?;
            }
            stream::iter(names)
                .map(|name| async move { resource.import(&self.ctx, Some(&name), None).await })
                .buffered(self.workers_for(config))
                .collect::<Vec<_>>()
                .await
        } else {
            let instances = match resource.list(self.ctx.source()).await {
                Ok(instances) => instances,
                Err(err) => {
                    error!(
                        "💀 Couldn't list {} in the source account, keeping the previous import: {:#}",
                        resource_type, err
                    );
                    report.aborted = Some(format!("{err:#}"));
                    return Ok(report);
                }
            };
            let mut results = Vec::with_capacity(instances.len());
            for instance in instances {
                results.push(resource.import(&self.ctx, None, Some(instance)).await);
            }
            results
        };

        let mut imported = ResourceMap::new();
        let mut outage = None;
        for result in results {
            match result {
                Ok((identity, instance)) => {
                    if !self.filters.allows(resource_type, &instance) {
                        debug!("🚫 {} '{}' filtered out", resource_type, identity);
                        continue;
                    }
                    if imported.insert(identity.clone(), instance).is_some() {
                        warn!(
                            "⚠️ Two {} instances share the identity '{}'; the last one wins",
                            resource_type, identity
                        );
                    }
                }
                Err(err) => {
                    report.failed += 1;
                    warn!("⚠️ Failed to import a {}: {:#}", resource_type, err);
                    if classify(&err) != Severity::Item && outage.is_none() {
                        outage = Some(format!("{err:#}"));
                    }
                }
            }
        }

        if let Some(reason) = outage {
            error!(
                "💀 Lost the source account while importing {}, keeping the previous import",
                resource_type
            );
            report.aborted = Some(reason);
            return Ok(report);
        }

        report.imported = imported.len();
        self.ctx
            .state()
            .await
            .replace_source(resource_type, imported);
        self.persist(resource_type).await?;
        info!("✅ Imported {} {}", report.imported, resource_type);
        Ok(report)
    }

    async fn apply_type(&self, resource: &dyn Resource, cleanup: bool) -> Result<TypeReport> {
        let config = resource.config();
        let resource_type = config.resource_type;
        let mut report = TypeReport::new(resource_type);
        info!("🔄 Syncing {}", resource_type);

        // -- 🚧 barrier: no write for this type starts before the cache exists
        let cache = match resource.pre_apply(&self.ctx).await {
            Ok(cache) => cache,
            Err(err) => {
                error!("💀 Couldn't prepare {}, skipping it this run: {:#}", resource_type, err);
                report.aborted = Some(format!("{err:#}"));
                return Ok(report);
            }
        };
        debug!(
            "🗂️ {} destination cache holds {} instance(s)",
            resource_type,
            cache.len()
        );

        let plan = Plan::build(&*self.ctx.state().await, resource, &cache);
        for identity in &plan.vanished {
            warn!(
                "👻 {} '{}' is gone from the destination, recreating it",
                resource_type, identity
            );
            self.ctx.forget_destination(resource_type, identity).await;
        }
        report.skipped = plan.skipped;
        let planned_deletes = if cleanup { plan.stale.len() } else { 0 };
        let progress = ApplyProgress::new(
            resource_type,
            (plan.writes.len() + planned_deletes) as u64,
            self.options.show_progress,
        );

        let workers = self.workers_for(config);
        let apply = ApplyContext::new(&self.ctx, &cache);
        let stop = AtomicBool::new(false);
        let mut tally = Tally::default();

        let groups = group_by_match_key(resource, plan.writes);
        let outcomes = stream::iter(groups)
            .map(|group| {
                let (stop, progress) = (&stop, &progress);
                async move {
                    let mut outcomes = Vec::with_capacity(group.len());
                    for write in group {
                        outcomes.push(self.apply_write(resource, apply, write, stop, progress).await);
                    }
                    outcomes
                }
            })
            .buffer_unordered(workers)
            .collect::<Vec<_>>()
            .await;
        for outcome in outcomes.into_iter().flatten() {
            tally.absorb(&mut report, outcome);
        }

        if cleanup && !tally.stopped() {
            let outcomes = stream::iter(plan.stale)
                .map(|identity| {
                    let (stop, progress) = (&stop, &progress);
                    async move { self.delete_stale(resource, apply, identity, stop, progress).await }
                })
                .buffer_unordered(workers)
                .collect::<Vec<_>>()
                .await;
            for outcome in outcomes {
                tally.absorb(&mut report, outcome);
            }
        } else if !plan.stale.is_empty() {
            debug!(
                "🧹 {} {} instance(s) are no longer in the source; cleanup is off",
                plan.stale.len(),
                resource_type
            );
        }

        progress.finish();
        self.persist(resource_type).await?;

        if let Some(err) = tally.fatal {
            return Err(err.context(format!(
                "💀 Stopped the run while syncing {resource_type}; completed work was saved"
            )));
        }
        if let Some(err) = tally.abort {
            error!(
                "💀 Gave up on {} with {} write(s) left undone",
                resource_type, tally.cancelled
            );
            report.aborted = Some(format!("{err:#}"));
        }
        info!(
            "✅ {}: {} created, {} updated, {} skipped, {} deleted, {} failed",
            resource_type,
            report.created,
            report.updated,
            report.skipped,
            report.deleted,
            report.failed
        );
        Ok(report)
    }

    async fn apply_write(
        &self,
        resource: &dyn Resource,
        apply: ApplyContext<'_>,
        write: PlannedWrite,
        stop: &AtomicBool,
        progress: &ApplyProgress,
    ) -> Outcome {
        let resource_type = resource.config().resource_type;
        let PlannedWrite {
            identity,
            payload,
            action,
        } = write;
        if stop.load(Ordering::SeqCst) {
            debug!("⏭️ Not writing {} '{}': the type was stopped", resource_type, identity);
            return Outcome::Cancelled;
        }

        // -- 🔑 a create whose match key is already at the destination lands as an update
        let adopted = action == Action::Create
            && resource
                .match_key(&payload)
                .is_some_and(|key| apply.cache.contains(&key));

        let result = match resource.pre_action(&apply, &identity, &payload).await {
            Ok(()) => match action {
                Action::Create => resource.create(&apply, &identity, &payload).await,
                Action::Update => resource.update(&apply, &identity, &payload).await,
            },
            Err(err) => Err(err),
        };

        match result {
            Ok((written_identity, instance)) => {
                self.ctx
                    .record_destination(resource_type, &written_identity, instance)
                    .await;
                let (outcome, verb) = match action {
                    Action::Create if !adopted => (Outcome::Created, "created"),
                    _ => (Outcome::Updated, "updated"),
                };
                debug!("✅ {} {} '{}'", verb, resource_type, written_identity);
                progress.tick(format!("{verb} {written_identity}"));
                outcome
            }
            Err(error) => {
                if action == Action::Create {
                    // -- 🧽 the upsert may have seeded state before the write failed
                    self.ctx.forget_destination(resource_type, &identity).await;
                }
                let severity = classify(&error);
                if severity != Severity::Item {
                    stop.store(true, Ordering::SeqCst);
                }
                error!("💀 {} '{}' failed: {:#}", resource_type, identity, error);
                progress.tick(format!("failed {identity}"));
                Outcome::Failed { severity, error }
            }
        }
    }

    async fn delete_stale(
        &self,
        resource: &dyn Resource,
        apply: ApplyContext<'_>,
        identity: String,
        stop: &AtomicBool,
        progress: &ApplyProgress,
    ) -> Outcome {
        let resource_type = resource.config().resource_type;
        if stop.load(Ordering::SeqCst) {
            return Outcome::Cancelled;
        }
        match resource.delete(&apply, &identity).await {
            Ok(()) => {
                self.ctx.forget_destination(resource_type, &identity).await;
                info!("🗑️ Deleted {} '{}'", resource_type, identity);
                progress.tick(format!("deleted {identity}"));
                Outcome::Deleted
            }
            Err(error) if is_not_found(&error) => {
                debug!("🗑️ {} '{}' was already gone", resource_type, identity);
                self.ctx.forget_destination(resource_type, &identity).await;
                progress.tick(format!("deleted {identity}"));
                Outcome::Deleted
            }
            Err(error) => {
                let severity = classify(&error);
                if severity != Severity::Item {
                    stop.store(true, Ordering::SeqCst);
                }
                error!("💀 Deleting {} '{}' failed: {:#}", resource_type, identity, error);
                progress.tick(format!("failed {identity}"));
                Outcome::Failed { severity, error }
            }
        }
    }
}

/// 🧵 One group per cache match key, in plan order. Keyless writes get a group each.
fn group_by_match_key(resource: &dyn Resource, writes: Vec<PlannedWrite>) -> Vec<Vec<PlannedWrite>> {
    let mut groups: Vec<Vec<PlannedWrite>> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();
    for write in writes {
        match resource.match_key(&write.payload) {
            Some(key) => match slots.get(&key) {
                Some(&slot) => groups[slot].push(write),
                None => {
                    slots.insert(key, groups.len());
                    groups.push(vec![write]);
                }
            },
            None => groups.push(vec![write]),
        }
    }
    groups
}
