//! Dependency-ordered seeding driver.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::plan::{NodePayload, SeedNode, SeedPlan};
use super::store::{EntryStatus, SeedStore};
use crate::error::{PlatformError, SeedError, StoreError};
use crate::model::{GeneratedRecord, PlatformId, ProvisionalId};
use crate::platform::PlatformClient;
use crate::validation::SchemaValidator;

/// Outcome counts of one seeding pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub total: usize,
    /// Created during this pass.
    pub created: usize,
    /// Already created by an earlier pass.
    pub already_created: usize,
    pub failed: usize,
    /// Accepted by the platform without a readable id; never resubmitted.
    pub unresolved: usize,
    /// Not attempted: an ancestor is missing, the claim was held elsewhere,
    /// or the pass was cancelled first.
    pub skipped: usize,
    pub cancelled: bool,
}

impl SeedSummary {
    /// Every entity now exists on the platform.
    pub fn is_complete(&self) -> bool {
        self.created + self.already_created == self.total
    }
}

impl fmt::Display for SeedSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "seeded: {} created, {} already present, {} failed, {} skipped",
            self.created, self.already_created, self.failed, self.skipped
        )?;
        if self.unresolved > 0 {
            write!(f, ", {} unresolved", self.unresolved)?;
        }
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}

enum NodeOutcome {
    Created(ProvisionalId, PlatformId),
    Failed,
    Unresolved,
    Skipped,
    Aborted(PlatformError),
}

pub struct Seeder {
    client: Arc<PlatformClient>,
    store: SeedStore,
    concurrency: usize,
}

impl fmt::Debug for Seeder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seeder")
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl Seeder {
    pub fn new(client: Arc<PlatformClient>, store: SeedStore, concurrency: usize) -> Self {
        Self {
            client,
            store,
            concurrency: concurrency.max(1),
        }
    }

    pub fn store(&self) -> &SeedStore {
        &self.store
    }

    /// Validate `record`, then seed it. Nothing is sent when validation fails.
    pub async fn seed_record(
        &self,
        record: &GeneratedRecord,
        cancel: &CancellationToken,
    ) -> Result<SeedSummary, SeedError> {
        let record = SchemaValidator::check(record)?;
        let plan = SeedPlan::from_record(record);
        self.run(&plan, cancel).await
    }

    /// One pass over `plan`, against the state of the plan's record.
    ///
    /// Levels are processed in order; siblings within a level run
    /// concurrently up to the concurrency limit. A node is dispatched only
    /// when every ancestor is recorded as created. Per-entity failures are
    /// recorded and counted; an authentication failure stops the pass.
    /// Cancellation stops new dispatches while requests already sent finish
    /// and persist their outcome.
    pub async fn run(
        &self,
        plan: &SeedPlan,
        cancel: &CancellationToken,
    ) -> Result<SeedSummary, SeedError> {
        let store = self.store.for_record(plan.record_id());
        tracing::info!(
            run_id = %store.run_id(),
            record_id = plan.record_id(),
            entities = plan.len(),
            concurrency = self.concurrency,
            "Seeding pass started"
        );
        store.register(plan).await?;

        let mut resolved: HashMap<ProvisionalId, PlatformId> = HashMap::new();
        let mut unresolved: HashSet<ProvisionalId> = HashSet::new();
        for entry in store.snapshot().await?.into_values() {
            match entry.status {
                EntryStatus::Created(platform_id) => {
                    resolved.insert(entry.id, platform_id);
                }
                EntryStatus::Unresolved(_) => {
                    unresolved.insert(entry.id);
                }
                _ => {}
            }
        }

        let mut summary = SeedSummary {
            total: plan.len(),
            ..Default::default()
        };
        let semaphore = Semaphore::new(self.concurrency);
        let abort = cancel.child_token();

        for (depth, level) in plan.levels().iter().enumerate() {
            if abort.is_cancelled() {
                break;
            }

            let mut pending = Vec::new();
            for node in level {
                if resolved.contains_key(&node.id) {
                    summary.already_created += 1;
                } else if unresolved.contains(&node.id) {
                    summary.unresolved += 1;
                    tracing::warn!(entity = %node.id, "Unresolved entity, not resubmitting");
                } else if let Some(missing) =
                    node.ancestors.iter().find(|a| !resolved.contains_key(*a))
                {
                    tracing::debug!(
                        entity = %node.id,
                        ancestor = %missing,
                        "Skipping, ancestor not created"
                    );
                } else {
                    pending.push(node);
                }
            }

            tracing::debug!(depth, dispatched = pending.len(), "Seeding level");

            let outcomes = join_all(
                pending
                    .into_iter()
                    .map(|node| self.seed_node(&store, node, &resolved, &semaphore, &abort)),
            )
            .await;

            let mut auth_error = None;
            for outcome in outcomes {
                match outcome? {
                    NodeOutcome::Created(id, platform_id) => {
                        summary.created += 1;
                        resolved.insert(id, platform_id);
                    }
                    NodeOutcome::Failed => summary.failed += 1,
                    NodeOutcome::Unresolved => summary.unresolved += 1,
                    NodeOutcome::Skipped => {}
                    NodeOutcome::Aborted(error) => auth_error = Some(error),
                }
            }

            if let Some(error) = auth_error {
                tracing::error!(error = %error, "Platform rejected credentials, aborting seeding");
                return Err(SeedError::Auth(error));
            }
        }

        summary.cancelled = cancel.is_cancelled();
        summary.skipped = summary.total
            - summary.created
            - summary.already_created
            - summary.failed
            - summary.unresolved;

        tracing::info!(
            created = summary.created,
            already_created = summary.already_created,
            failed = summary.failed,
            unresolved = summary.unresolved,
            skipped = summary.skipped,
            cancelled = summary.cancelled,
            "Seeding pass finished"
        );
        Ok(summary)
    }

    async fn seed_node(
        &self,
        store: &SeedStore,
        node: &SeedNode,
        resolved: &HashMap<ProvisionalId, PlatformId>,
        semaphore: &Semaphore,
        abort: &CancellationToken,
    ) -> Result<NodeOutcome, StoreError> {
        let Ok(_permit) = semaphore.acquire().await else {
            return Ok(NodeOutcome::Skipped);
        };
        if abort.is_cancelled() {
            return Ok(NodeOutcome::Skipped);
        }
        if !store.claim(&node.id, node.kind).await? {
            tracing::debug!(entity = %node.id, "Entity claimed elsewhere, skipping");
            return Ok(NodeOutcome::Skipped);
        }

        match self.create(node, resolved).await {
            Ok(platform_id) => {
                if let Err(error) = store.mark_created(&node.id, &platform_id).await {
                    // The row stays in flight and is retried next run.
                    tracing::error!(
                        entity = %node.id,
                        kind = %node.kind,
                        platform_id = %platform_id,
                        error = %error,
                        "Created on the platform but not recorded; reconcile manually"
                    );
                    return Err(error);
                }
                tracing::info!(
                    entity = %node.id,
                    kind = %node.kind,
                    platform_id = %platform_id,
                    "Created"
                );
                Ok(NodeOutcome::Created(node.id.clone(), platform_id))
            }
            Err(error) if error.is_fatal() => {
                store.release(&node.id).await?;
                abort.cancel();
                Ok(NodeOutcome::Aborted(error))
            }
            Err(error @ PlatformError::Unconfirmed { .. }) => {
                store.mark_unresolved(&node.id, &error.to_string()).await?;
                tracing::error!(
                    entity = %node.id,
                    kind = %node.kind,
                    error = %error,
                    "Platform accepted the entity without an id; it will not be resubmitted"
                );
                Ok(NodeOutcome::Unresolved)
            }
            Err(error) => {
                store.mark_failed(&node.id, &error.to_string()).await?;
                tracing::warn!(
                    entity = %node.id,
                    kind = %node.kind,
                    error = %error,
                    "Creation failed"
                );
                Ok(NodeOutcome::Failed)
            }
        }
    }

    async fn create(
        &self,
        node: &SeedNode,
        resolved: &HashMap<ProvisionalId, PlatformId>,
    ) -> Result<PlatformId, PlatformError> {
        let ancestor = |i: usize| {
            node.ancestors
                .get(i)
                .and_then(|id| resolved.get(id))
                .ok_or_else(|| {
                    PlatformError::InvalidResponse(format!(
                        "{}: ancestor {i} has no platform id",
                        node.id
                    ))
                })
        };

        match &node.payload {
            NodePayload::Workspace(workspace) => self.client.create_workspace(workspace).await,
            NodePayload::Member(member) => self.client.create_member(ancestor(0)?, member).await,
            NodePayload::Survey(survey) => self.client.create_survey(ancestor(0)?, survey).await,
            NodePayload::Question(question) => {
                self.client.create_question(ancestor(1)?, question).await
            }
            NodePayload::Response(response) => {
                self.client
                    .submit_response(ancestor(1)?, ancestor(2)?, response)
                    .await
            }
        }
    }
}
