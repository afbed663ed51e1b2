//! The DAO client (spec section 4.6): resolves the current set of peer
//! base URLs from an external registry. Out of scope per section 1
//! ("the access-control checker that consults an external blockchain");
//! this module only needs a narrow read capability.

use async_trait::async_trait;

use crate::error::ClusterError;

#[async_trait]
pub trait Dao: Send + Sync {
    /// Base URLs (e.g. `https://peer.example.com`) of every server the
    /// registry currently lists, reachable or not.
    async fn get_all_servers(&self) -> Result<Vec<String>, ClusterError>;
}

/// A fixed peer list, read from configuration (`DAO_ADDRESS` in spec
/// section 6 names an on-chain registry; resolving it is out of scope,
/// so this reads a pre-resolved list instead).
pub struct StaticDao {
    servers: Vec<String>,
}

impl StaticDao {
    pub fn new(servers: Vec<String>) -> Self {
        Self { servers }
    }
}

#[async_trait]
impl Dao for StaticDao {
    async fn get_all_servers(&self) -> Result<Vec<String>, ClusterError> {
        Ok(self.servers.clone())
    }
}
