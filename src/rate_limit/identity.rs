//! Client identity and tier resolution.
//!
//! Both resolvers are pure functions of a [`RequestIdentity`], the admission
//! controller's view of an inbound request. They never fail: anything that
//! cannot be identified collapses into a coarser bucket instead.

use super::types::{ClientKey, Tier};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::debug;

/// Caller attached to a request by upstream authentication middleware
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedCaller {
    /// Stable user identifier
    pub user_id: String,
    /// Subscription plan, if the caller has one
    pub plan: Option<String>,
}

impl AuthenticatedCaller {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            plan: None,
        }
    }

    pub fn with_plan(mut self, plan: impl Into<String>) -> Self {
        self.plan = Some(plan.into());
        self
    }
}

/// Everything the resolvers read from a request
#[derive(Debug, Clone, Default)]
pub struct RequestIdentity {
    pub caller: Option<AuthenticatedCaller>,
    /// Raw `authorization` header value
    pub authorization: Option<String>,
    /// Raw `x-api-key` header value
    pub api_key: Option<String>,
    pub source_ip: Option<IpAddr>,
}

impl RequestIdentity {
    /// The credential used for `api:` keys: `x-api-key` wins over `authorization`
    fn credential(&self) -> Option<&str> {
        non_empty(self.api_key.as_deref()).or_else(|| {
            non_empty(self.authorization.as_deref()).map(|value| {
                let token = value
                    .split_once(' ')
                    .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
                    .map(|(_, token)| token.trim())
                    .unwrap_or(value);
                if token.is_empty() {
                    value
                } else {
                    token
                }
            })
        })
    }

    fn has_credential(&self) -> bool {
        self.caller.is_some() || self.credential().is_some()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Derives stable client keys from requests
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    ipv6_prefix_len: u8,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new(128)
    }
}

impl IdentityResolver {
    /// `ipv6_prefix_len` is the number of leading IPv6 bits kept; 128 keeps the full address
    pub fn new(ipv6_prefix_len: u8) -> Self {
        Self {
            ipv6_prefix_len: ipv6_prefix_len.min(128),
        }
    }

    /// Resolve the client key. First match wins: user id, API credential, source address.
    pub fn resolve(&self, identity: &RequestIdentity) -> ClientKey {
        if let Some(caller) = &identity.caller {
            if !caller.user_id.is_empty() {
                return ClientKey::user(&caller.user_id);
            }
        }

        if let Some(credential) = identity.credential() {
            return ClientKey::api(credential);
        }

        match identity.source_ip {
            Some(ip) => ClientKey::ip(&self.anonymize(ip).to_string()),
            None => {
                debug!("No source address available, using shared anonymous bucket");
                ClientKey::ip("unknown")
            }
        }
    }

    /// Zero the last IPv4 octet; mask IPv6 to the configured prefix
    pub fn anonymize(&self, ip: IpAddr) -> IpAddr {
        match ip {
            IpAddr::V4(v4) => IpAddr::V4(mask_v4(v4)),
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => IpAddr::V4(mask_v4(v4)),
                None => IpAddr::V6(mask_v6(v6, self.ipv6_prefix_len)),
            },
        }
    }
}

fn mask_v4(ip: Ipv4Addr) -> Ipv4Addr {
    let [a, b, c, _] = ip.octets();
    Ipv4Addr::new(a, b, c, 0)
}

fn mask_v6(ip: Ipv6Addr, prefix_len: u8) -> Ipv6Addr {
    if prefix_len >= 128 {
        return ip;
    }
    let mask = u128::MAX.checked_shl(128 - prefix_len as u32).unwrap_or(0);
    Ipv6Addr::from(u128::from(ip) & mask)
}

/// Resolve the caller's tier.
///
/// A caller plan wins; any credential without a plan is `free`; otherwise
/// `anonymous`. Unrecognised plan names are treated as `free`.
pub fn resolve_tier(identity: &RequestIdentity) -> Tier {
    if let Some(plan) = identity.caller.as_ref().and_then(|c| c.plan.as_deref()) {
        return plan.parse().unwrap_or_else(|_| {
            debug!(plan = %plan, "Unknown plan, treating caller as free tier");
            Tier::Free
        });
    }

    if identity.has_credential() {
        Tier::Free
    } else {
        Tier::Anonymous
    }
}
