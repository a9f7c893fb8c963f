//! Admin group membership resolution.
//!
//! `resolve` checks the candidates against three tiers in order of cost:
//!
//! 1. Fast tier (process-local mappings)
//! 2. Persistent tier (shared store)
//! 3. Directory (authoritative, in the token's own tenant)
//!
//! The first tier that matches decides. A directory match is written back to
//! both faster tiers; a failed write is reported on the outcome but does not
//! change the decision. A read or directory failure aborts the resolution,
//! so an outage is never mistaken for "not an admin".
//!
//! A persistent-tier hit is not copied into the fast tier.

pub mod stages;

pub use stages::{DirectoryStage, RepositoryStage, ResolveRequest, ResolverStage, StageOutcome};

use crate::directory::DirectoryProvider;
use crate::errors::{ResolveError, TierKind};
use crate::observability::metrics;
use crate::repositories::AdminGroupRepository;
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// How the directory decides that a group is the admin group.
#[derive(Debug, Clone)]
pub enum MembershipPolicy {
    /// Look up the id of the group with this display name and require it
    /// among the candidates.
    ExactId { admin_group_name: String },

    /// Look up each candidate's display name and match it against the
    /// pattern (unanchored search).
    Pattern { pattern: Regex },
}

impl MembershipPolicy {
    pub fn exact_id(admin_group_name: &str) -> Self {
        MembershipPolicy::ExactId {
            admin_group_name: admin_group_name.to_string(),
        }
    }

    /// # Errors
    ///
    /// Returns the regex error if `pattern` does not compile.
    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(MembershipPolicy::Pattern {
            pattern: Regex::new(pattern)?,
        })
    }
}

/// Tier that decided a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierHit {
    Fast,
    Persistent,
    Directory,
    None,
}

impl TierHit {
    pub fn as_str(self) -> &'static str {
        match self {
            TierHit::Fast => "fast",
            TierHit::Persistent => "persistent",
            TierHit::Directory => "directory",
            TierHit::None => "none",
        }
    }
}

impl From<TierKind> for TierHit {
    fn from(tier: TierKind) -> Self {
        match tier {
            TierKind::Fast => TierHit::Fast,
            TierKind::Persistent => TierHit::Persistent,
        }
    }
}

impl fmt::Display for TierHit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision of one resolution.
#[derive(Debug)]
pub struct ResolutionOutcome {
    pub admin: bool,
    pub matched_group_id: Option<String>,
    pub tier: TierHit,
    /// `TierWrite` errors from writing a directory match back.
    pub backfill_errors: Vec<ResolveError>,
}

impl ResolutionOutcome {
    fn not_admin() -> Self {
        Self {
            admin: false,
            matched_group_id: None,
            tier: TierHit::None,
            backfill_errors: Vec::new(),
        }
    }

    fn matched(group_id: String, tier: TierHit) -> Self {
        Self {
            admin: true,
            matched_group_id: Some(group_id),
            tier,
            backfill_errors: Vec::new(),
        }
    }
}

/// Cascading membership resolver.
///
/// Holds no mutable state; the tiers and the directory are shared
/// collaborators that other instances may write concurrently.
pub struct MembershipResolver {
    fast: Arc<dyn AdminGroupRepository>,
    persistent: Arc<dyn AdminGroupRepository>,
    stages: Vec<Box<dyn ResolverStage>>,
    default_tenant: Option<String>,
}

impl MembershipResolver {
    /// Standard cascade: fast, persistent, then the directory when one is
    /// configured.
    pub fn new(
        fast: Arc<dyn AdminGroupRepository>,
        persistent: Arc<dyn AdminGroupRepository>,
        directory: Option<Arc<dyn DirectoryProvider>>,
        policy: MembershipPolicy,
        default_tenant: Option<String>,
    ) -> Self {
        let mut stages: Vec<Box<dyn ResolverStage>> = vec![
            Box::new(RepositoryStage::new(TierKind::Fast, Arc::clone(&fast))),
            Box::new(RepositoryStage::new(
                TierKind::Persistent,
                Arc::clone(&persistent),
            )),
        ];

        match directory {
            Some(directory) => stages.push(Box::new(DirectoryStage::new(directory, policy))),
            None => tracing::warn!(
                target: "admin_check.resolver",
                "No directory configured, resolution uses the mapping tiers only"
            ),
        }

        Self::with_stages(fast, persistent, stages, default_tenant)
    }

    /// Resolver over an explicit stage list. `fast` and `persistent` receive
    /// the write-back of a directory match.
    pub fn with_stages(
        fast: Arc<dyn AdminGroupRepository>,
        persistent: Arc<dyn AdminGroupRepository>,
        stages: Vec<Box<dyn ResolverStage>>,
        default_tenant: Option<String>,
    ) -> Self {
        Self {
            fast,
            persistent,
            stages,
            default_tenant,
        }
    }

    /// Tiers in evaluation order.
    pub fn stage_order(&self) -> Vec<TierHit> {
        self.stages.iter().map(|s| s.tier()).collect()
    }

    /// Is `client` an admin through one of `candidates`?
    ///
    /// `tenant_id` scopes the directory session; when absent or empty the
    /// service's default tenant is used.
    ///
    /// # Errors
    ///
    /// `TierRead` if a tier cannot be read, `DirectoryLookup` or
    /// `DirectoryConsistency` if the directory cannot answer.
    #[instrument(skip_all, fields(client = %client, candidates = candidates.len()))]
    pub async fn resolve(
        &self,
        client: &str,
        candidates: &[String],
        tenant_id: Option<&str>,
    ) -> Result<ResolutionOutcome, ResolveError> {
        let start = Instant::now();
        let result = self.resolve_inner(client, candidates, tenant_id).await;

        let label = match &result {
            Ok(outcome) => outcome.tier.as_str(),
            Err(_) => "error",
        };
        metrics::record_resolution(label, start.elapsed());

        result
    }

    async fn resolve_inner(
        &self,
        client: &str,
        candidates: &[String],
        tenant_id: Option<&str>,
    ) -> Result<ResolutionOutcome, ResolveError> {
        if candidates.is_empty() {
            tracing::debug!(target: "admin_check.resolver", "No candidate groups");
            return Ok(ResolutionOutcome::not_admin());
        }

        let request = ResolveRequest {
            client,
            candidates,
            tenant_id: tenant_id
                .filter(|t| !t.is_empty())
                .or(self.default_tenant.as_deref()),
        };

        for stage in &self.stages {
            let tier = stage.tier();
            let group_id = match stage.evaluate(&request).await {
                Ok(StageOutcome::Matched(group_id)) => group_id,
                Ok(StageOutcome::NotMatched) => continue,
                Err(e) => {
                    tracing::warn!(
                        target: "admin_check.resolver",
                        tier = %tier,
                        error = %e,
                        "Resolution aborted"
                    );
                    return Err(e);
                }
            };

            tracing::info!(
                target: "admin_check.resolver",
                tier = %tier,
                group_id = %group_id,
                "Admin group matched"
            );

            let mut outcome = ResolutionOutcome::matched(group_id, tier);
            if tier == TierHit::Directory {
                outcome.backfill_errors = self.backfill(client, &outcome).await;
            }
            return Ok(outcome);
        }

        tracing::debug!(target: "admin_check.resolver", "No tier matched");
        Ok(ResolutionOutcome::not_admin())
    }

    /// Write a directory match into both faster tiers.
    async fn backfill(&self, client: &str, outcome: &ResolutionOutcome) -> Vec<ResolveError> {
        let Some(group_id) = outcome.matched_group_id.as_deref() else {
            return Vec::new();
        };

        let (fast, persistent) = tokio::join!(
            self.fast.create(client, group_id),
            self.persistent.create(client, group_id)
        );

        [(TierKind::Fast, fast), (TierKind::Persistent, persistent)]
            .into_iter()
            .filter_map(|(tier, result)| match result {
                Ok(()) => {
                    metrics::record_backfill(tier.as_str(), "success");
                    None
                }
                Err(source) => {
                    metrics::record_backfill(tier.as_str(), "error");
                    tracing::warn!(
                        target: "admin_check.resolver",
                        tier = %tier,
                        error = %source,
                        "Backfill write failed, admin decision stands"
                    );
                    Some(ResolveError::TierWrite { tier, source })
                }
            })
            .collect()
    }
}
