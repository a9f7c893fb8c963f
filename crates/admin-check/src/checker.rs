//! Token-to-decision entry point.

use crate::auth::{KeyCache, TokenValidator};
use crate::config::Config;
use crate::directory::{DirectoryProvider, GraphDirectory};
use crate::errors::{CheckError, KeyCacheError, ResolveError, SetupError};
use crate::repositories::{build_repository, RepositoryKind};
use crate::resolver::{MembershipResolver, ResolutionOutcome};
use std::sync::Arc;
use tracing::instrument;

/// A [`TokenValidator`] and a [`MembershipResolver`] wired together.
pub struct AdminChecker {
    validator: TokenValidator,
    resolver: MembershipResolver,
}

impl AdminChecker {
    pub fn new(validator: TokenValidator, resolver: MembershipResolver) -> Self {
        Self {
            validator,
            resolver,
        }
    }

    /// Assemble a checker from configuration.
    ///
    /// The fast tier is always process-local; the persistent tier follows
    /// `persistent_repository`. Without directory credentials the resolver
    /// only consults the mapping tiers.
    ///
    /// # Errors
    ///
    /// `SetupError` if the policy is invalid or the persistent tier cannot
    /// be reached.
    pub async fn from_config(config: &Config) -> Result<Self, SetupError> {
        let policy = config.membership_policy()?;

        let key_cache = Arc::new(KeyCache::new(config.key_cache_config()));
        let validator = TokenValidator::new(key_cache, config.jwt_clock_skew);

        let fast = build_repository(RepositoryKind::Memory, config).await?;
        let persistent = build_repository(config.persistent_repository, config).await?;
        let directory = config
            .directory
            .as_ref()
            .map(|d| Arc::new(GraphDirectory::from_config(d)) as Arc<dyn DirectoryProvider>);

        tracing::info!(
            target: "admin_check.resolver",
            persistent = persistent.backend(),
            directory = directory.is_some(),
            "Admin checker assembled"
        );

        let resolver = MembershipResolver::new(
            fast,
            persistent,
            directory,
            policy,
            config.default_tenant().map(str::to_string),
        );

        Ok(Self::new(validator, resolver))
    }

    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    pub fn resolver(&self) -> &MembershipResolver {
        &self.resolver
    }

    /// Fetch the key set once, surfacing any failure.
    ///
    /// # Errors
    ///
    /// The key cache's refresh error.
    pub async fn warm_up(&self) -> Result<(), KeyCacheError> {
        self.validator.key_cache().refresh().await
    }

    /// Validate `raw_token` and resolve its groups for `client` in the
    /// token's tenant.
    ///
    /// # Errors
    ///
    /// `CheckError::Token` for a rejected token, `CheckError::Resolve` when
    /// membership could not be determined.
    #[instrument(skip_all, fields(client = %client))]
    pub async fn check_token(
        &self,
        client: &str,
        raw_token: &str,
    ) -> Result<ResolutionOutcome, CheckError> {
        let token = self.validator.parse(raw_token).await?;

        tracing::debug!(
            target: "admin_check.resolver",
            principal = token.principal_type().as_str(),
            groups = token.group_ids().len(),
            "Token accepted, resolving membership"
        );

        let tenant = Some(token.tenant_id()).filter(|t| !t.is_empty());
        let outcome = self
            .resolver
            .resolve(client, token.group_ids(), tenant)
            .await?;
        Ok(outcome)
    }

    /// Resolve groups obtained without a token.
    ///
    /// # Errors
    ///
    /// As [`MembershipResolver::resolve`].
    pub async fn check_groups(
        &self,
        client: &str,
        group_ids: &[String],
        tenant_id: Option<&str>,
    ) -> Result<ResolutionOutcome, ResolveError> {
        self.resolver.resolve(client, group_ids, tenant_id).await
    }
}
