//! Default-route ownership across a delegate chain
//!
//! When any attachment asks for the pod's default route (`default-route`),
//! exactly one delegate keeps default routes: the first one in chain order
//! that asked. Every other delegate has its default routes removed from its
//! result.

use crate::delegate::DelegateConfig;
use cni_client::{CniResult, Route};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tracing::debug;

/// What happens to the default routes in a delegate's ADD result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RoutePolicy {
    /// Result is left as the plugin returned it
    #[default]
    Unchanged,
    /// Delegate owns the default route, through these gateways
    Retain { gateways: Vec<IpAddr> },
    /// Default routes are removed
    StripDefault,
}

impl RoutePolicy {
    /// Rewrite `result` according to the policy
    ///
    /// `Retain` adds a default route via each requested gateway whose
    /// address family has none yet.
    pub fn apply(&self, result: &mut CniResult) {
        match self {
            RoutePolicy::Unchanged => {}
            RoutePolicy::StripDefault => {
                let removed = result.strip_default_routes();
                if removed > 0 {
                    debug!("Removed {} default route(s) from delegate result", removed);
                }
            }
            RoutePolicy::Retain { gateways } => {
                for gw in gateways {
                    let covered = result
                        .default_routes()
                        .any(|r| r.dst.is_ipv4() == gw.is_ipv4());
                    if !covered {
                        result.routes.push(Route::default_via(*gw));
                    }
                }
            }
        }
    }
}

/// Assign route policies to a delegate chain
///
/// Returns the index of the delegate that owns the default route, or `None`
/// (and leaves every policy `Unchanged`) when no delegate requested one.
pub fn apply_gateway_policy(delegates: &mut [DelegateConfig]) -> Option<usize> {
    let winner = delegates.iter().position(|d| d.gateway_request.is_some())?;
    for (i, delegate) in delegates.iter_mut().enumerate() {
        delegate.route_policy = if i == winner {
            RoutePolicy::Retain {
                gateways: delegate.gateway_request.clone().unwrap_or_default(),
            }
        } else {
            RoutePolicy::StripDefault
        };
    }
    debug!(
        "Delegate {} ({}) owns the default route",
        winner, delegates[winner].name
    );
    Some(winner)
}
