//! Resolution stages.
//!
//! Each stage answers "does one of these candidates make the client an
//! admin?" from a single data source. The resolver runs them in order and
//! stops at the first stage that does not answer [`StageOutcome::NotMatched`].

use super::{MembershipPolicy, TierHit};
use crate::directory::DirectoryProvider;
use crate::errors::{DirectoryError, ResolveError, TierKind};
use crate::repositories::AdminGroupRepository;
use async_trait::async_trait;
use std::sync::Arc;

/// Inputs shared by every stage of one resolution.
#[derive(Debug, Clone, Copy)]
pub struct ResolveRequest<'a> {
    pub client: &'a str,
    pub candidates: &'a [String],
    pub tenant_id: Option<&'a str>,
}

/// Result of a stage that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// The group id that proved membership.
    Matched(String),
    NotMatched,
}

/// One step of the resolution cascade.
#[async_trait]
pub trait ResolverStage: Send + Sync {
    /// Tier reported when this stage matches.
    fn tier(&self) -> TierHit;

    async fn evaluate(&self, request: &ResolveRequest<'_>) -> Result<StageOutcome, ResolveError>;
}

/// Per-candidate `count` check against a mapping tier.
pub struct RepositoryStage {
    tier: TierKind,
    repository: Arc<dyn AdminGroupRepository>,
}

impl RepositoryStage {
    pub fn new(tier: TierKind, repository: Arc<dyn AdminGroupRepository>) -> Self {
        Self { tier, repository }
    }
}

#[async_trait]
impl ResolverStage for RepositoryStage {
    fn tier(&self) -> TierHit {
        self.tier.into()
    }

    async fn evaluate(&self, request: &ResolveRequest<'_>) -> Result<StageOutcome, ResolveError> {
        for candidate in request.candidates {
            let count = self
                .repository
                .count(request.client, candidate)
                .await
                .map_err(|source| ResolveError::TierRead {
                    tier: self.tier,
                    source,
                })?;

            if count > 0 {
                return Ok(StageOutcome::Matched(candidate.clone()));
            }
        }
        Ok(StageOutcome::NotMatched)
    }
}

/// Directory check under a [`MembershipPolicy`], in the token's tenant.
pub struct DirectoryStage {
    directory: Arc<dyn DirectoryProvider>,
    policy: MembershipPolicy,
}

impl DirectoryStage {
    pub fn new(directory: Arc<dyn DirectoryProvider>, policy: MembershipPolicy) -> Self {
        Self { directory, policy }
    }
}

#[async_trait]
impl ResolverStage for DirectoryStage {
    fn tier(&self) -> TierHit {
        TierHit::Directory
    }

    async fn evaluate(&self, request: &ResolveRequest<'_>) -> Result<StageOutcome, ResolveError> {
        let tenant_id = request.tenant_id.ok_or_else(|| {
            ResolveError::from(DirectoryError::Credentials(
                "no tenant to open a directory session for".to_string(),
            ))
        })?;

        let session = self.directory.open_session(tenant_id).await?;

        match &self.policy {
            MembershipPolicy::ExactId { admin_group_name } => {
                let admin_group_id = session.resolve_group_id(admin_group_name).await?;
                if request.candidates.iter().any(|c| *c == admin_group_id) {
                    Ok(StageOutcome::Matched(admin_group_id))
                } else {
                    Ok(StageOutcome::NotMatched)
                }
            }
            MembershipPolicy::Pattern { pattern } => {
                for candidate in request.candidates {
                    let name = session.resolve_group_name(candidate).await?;
                    if pattern.is_match(&name) {
                        tracing::debug!(
                            target: "admin_check.resolver",
                            group_id = %candidate,
                            group_name = %name,
                            "Group name matches admin pattern"
                        );
                        return Ok(StageOutcome::Matched(candidate.clone()));
                    }
                }
                Ok(StageOutcome::NotMatched)
            }
        }
    }
}
