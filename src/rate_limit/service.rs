use super::clock::{Clock, SystemClock};
use super::counter::WindowCounter;
use super::identity::{resolve_tier, IdentityResolver, RequestIdentity};
use super::policy::{AdminPolicy, PolicyTable};
use super::reclaimer::Reclaimer;
use super::store::{InMemoryWindowStore, StoreKey, WindowStore};
use super::types::{ClientKey, Decision, EndpointCategory, Tier};
use crate::config::RateLimitingConfig;
use crate::metrics;
use axum::http::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const ADMIN_NAMESPACE: &str = "admin";

/// Which policy a request was counted under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyScope {
    Tiered {
        tier: Tier,
        category: EndpointCategory,
    },
    Admin,
}

impl PolicyScope {
    fn labels(&self) -> (&'static str, &'static str) {
        match self {
            PolicyScope::Tiered { tier, category } => (tier.as_str(), category.as_str()),
            PolicyScope::Admin => ("admin", "admin"),
        }
    }
}

/// A counted request: the decision plus what is needed to refund it later
#[derive(Debug, Clone)]
pub struct AdmissionTicket {
    pub client: ClientKey,
    pub key: StoreKey,
    pub scope: PolicyScope,
    pub decision: Decision,
}

impl AdmissionTicket {
    pub fn allowed(&self) -> bool {
        self.decision.allowed
    }
}

/// Result of consulting the controller
#[derive(Debug, Clone)]
pub enum Admission {
    /// Accounting skipped entirely
    Bypass,
    Decided(AdmissionTicket),
}

/// Admission controller: resolves identity and policy, then counts the request
#[derive(Clone)]
pub struct AdmissionController {
    enabled: bool,
    table: Arc<PolicyTable>,
    admin: Arc<AdminPolicy>,
    resolver: IdentityResolver,
    counter: WindowCounter,
    bypass_paths: Arc<Vec<String>>,
    skip_successful_requests: bool,
    skip_failed_requests: bool,
    trust_forwarded_for: bool,
    stale_after: Duration,
    sweep_interval: Duration,
}

impl AdmissionController {
    /// Create a controller with an in-memory store and the system clock
    pub fn new(config: &RateLimitingConfig) -> Self {
        Self::with_store(
            config,
            Arc::new(InMemoryWindowStore::new()),
            Arc::new(SystemClock),
        )
    }

    /// Create a controller over an injected store and clock
    pub fn with_store(
        config: &RateLimitingConfig,
        store: Arc<dyn WindowStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        info!(
            enabled = config.enabled,
            admin_limit = config.admin.limit,
            admin_window_secs = config.admin.window_secs,
            bypass_paths = ?config.bypass_paths,
            "Initializing admission controller"
        );

        Self {
            enabled: config.enabled,
            table: Arc::new(config.policies.clone()),
            admin: Arc::new(config.admin.clone()),
            resolver: IdentityResolver::new(config.ipv6_prefix_len),
            counter: WindowCounter::new(store, clock),
            bypass_paths: Arc::new(config.bypass_paths.clone()),
            skip_successful_requests: config.skip_successful_requests,
            skip_failed_requests: config.skip_failed_requests,
            trust_forwarded_for: config.trust_forwarded_for,
            stale_after: Duration::from_secs(config.stale_after_secs),
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether client addresses are taken from forwarding headers
    pub fn trust_forwarded_for(&self) -> bool {
        self.trust_forwarded_for
    }

    /// Whether a path skips accounting
    pub fn is_bypass_path(&self, path: &str) -> bool {
        self.bypass_paths.iter().any(|p| p == path)
    }

    /// Decide whether a request may proceed, counting it when it is not bypassed
    pub fn admit(&self, identity: &RequestIdentity, path: &str) -> Admission {
        if !self.enabled || self.is_bypass_path(path) {
            debug!(path = %path, "Admission bypassed");
            return Admission::Bypass;
        }

        let client = self.resolver.resolve(identity);

        let (key, scope, policy) = if self.admin.applies_to(path) {
            (
                StoreKey::namespaced(ADMIN_NAMESPACE, &client, path),
                PolicyScope::Admin,
                self.admin.entry(),
            )
        } else {
            let tier = resolve_tier(identity);
            let category = EndpointCategory::from_path(path);
            (
                StoreKey::new(&client, path),
                PolicyScope::Tiered { tier, category },
                self.table.entry(tier, category),
            )
        };

        let decision = self.counter.check_and_increment(&key, policy);

        let (tier_label, category_label) = scope.labels();
        metrics::record_admission(tier_label, category_label, decision.allowed);

        if decision.allowed {
            debug!(
                client = %client,
                path = %path,
                tier = tier_label,
                remaining = decision.remaining,
                "Request admitted"
            );
        } else {
            warn!(
                client = %client,
                path = %path,
                tier = tier_label,
                limit = decision.limit,
                retry_after_secs = decision.retry_after_secs,
                "Rate limit exceeded"
            );
        }

        Admission::Decided(AdmissionTicket {
            client,
            key,
            scope,
            decision,
        })
    }

    /// Refund an admitted request once its downstream status is known,
    /// if the configuration excludes that kind of response from the budget.
    pub fn settle(&self, ticket: &AdmissionTicket, status: StatusCode) -> bool {
        if !ticket.allowed() {
            return false;
        }

        let failed = status.is_client_error() || status.is_server_error();
        let skip = if failed {
            self.skip_failed_requests
        } else {
            self.skip_successful_requests
        };

        if !skip {
            return false;
        }

        let refunded = self.counter.decrement(&ticket.key, ticket.decision.reset_at_ms);
        if refunded {
            metrics::record_refund();
            debug!(client = %ticket.client, status = status.as_u16(), "Request refunded");
        }
        refunded
    }

    /// Reclaimer bound to this controller's store and clock
    pub fn reclaimer(&self) -> Reclaimer {
        Reclaimer::new(
            self.counter.store().clone(),
            self.counter.clock().clone(),
            self.stale_after,
            self.sweep_interval,
        )
    }

    pub fn counter(&self) -> &WindowCounter {
        &self.counter
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.table
    }
}
