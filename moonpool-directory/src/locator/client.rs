//! Locator for connected clients.
//!
//! Clients are not grains: they are reachable through the gateway silos
//! they are connected to, and never registered in a grain directory. The
//! route table records which silos can reach which client.

use std::sync::Arc;

use dashmap::DashMap;

use super::{GrainLocator, LocatorError};
use crate::membership::MembershipService;
use crate::types::{GrainAddress, GrainId, UnregistrationCause};

/// Client id → gateway routes, in connection order.
#[derive(Debug, Default)]
pub struct ClientRouteTable {
    routes: DashMap<GrainId, Vec<GrainAddress>>,
}

impl ClientRouteTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the client `route.grain_id` is reachable via `route.silo`.
    ///
    /// Adding the same route twice keeps one copy.
    pub fn add_route(&self, route: GrainAddress) {
        let mut routes = self.routes.entry(route.grain_id.clone()).or_default();
        if !routes.iter().any(|r| r.matches(&route)) {
            routes.push(route);
        }
    }

    /// Remove a route. Returns whether it was present.
    pub fn remove_route(&self, route: &GrainAddress) -> bool {
        let removed = match self.routes.get_mut(&route.grain_id) {
            Some(mut routes) => {
                let before = routes.len();
                routes.retain(|r| !r.matches(route));
                before != routes.len()
            }
            None => false,
        };
        self.routes
            .remove_if(&route.grain_id, |_, routes| routes.is_empty());
        removed
    }

    /// All routes of a client, in connection order.
    pub fn routes(&self, client: &GrainId) -> Vec<GrainAddress> {
        self.routes
            .get(client)
            .map(|routes| routes.clone())
            .unwrap_or_default()
    }
}

/// Resolves client ids through a [`ClientRouteTable`].
///
/// Only routes through live silos are returned. Registration is rejected:
/// clients announce themselves by connecting, not through the directory.
#[derive(Debug)]
pub struct ClientGrainLocator {
    routes: Arc<ClientRouteTable>,
    membership: Arc<dyn MembershipService>,
}

impl ClientGrainLocator {
    /// Create a locator over `routes`.
    pub fn new(routes: Arc<ClientRouteTable>, membership: Arc<dyn MembershipService>) -> Self {
        Self { routes, membership }
    }

    /// The route table this locator reads.
    pub fn routes(&self) -> &Arc<ClientRouteTable> {
        &self.routes
    }

    fn live_route(&self, client: &GrainId) -> Option<GrainAddress> {
        let snapshot = self.membership.current_snapshot();
        self.routes.routes(client).into_iter().find(|route| {
            snapshot
                .get_status(&route.silo)
                .is_some_and(|status| status.is_live())
        })
    }
}

#[async_trait::async_trait]
impl GrainLocator for ClientGrainLocator {
    async fn register(
        &self,
        address: GrainAddress,
        _previous: Option<&GrainAddress>,
    ) -> Result<GrainAddress, LocatorError> {
        Err(LocatorError::ClientRegistration {
            grain_id: address.grain_id,
        })
    }

    async fn lookup(&self, grain_id: &GrainId) -> Result<Option<GrainAddress>, LocatorError> {
        Ok(self.live_route(grain_id))
    }

    async fn unregister(
        &self,
        address: &GrainAddress,
        cause: UnregistrationCause,
    ) -> Result<(), LocatorError> {
        if self.routes.remove_route(address) {
            tracing::debug!(grain_id = %address.grain_id, silo = %address.silo, %cause, "client route removed");
        }
        Ok(())
    }

    fn try_lookup_in_cache(&self, grain_id: &GrainId) -> Option<GrainAddress> {
        self.live_route(grain_id)
    }

    fn invalidate_cache(&self, _grain_id: &GrainId) {}
}
