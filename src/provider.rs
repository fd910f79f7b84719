use crate::{
    contract::DaoContract,
    errors::{
        DashboardError,
        Result,
    },
};
use alloy::primitives::Address;
use tracing::{
    debug,
    info,
};

/// The user-controlled component that holds keys and authorizes requests.
pub trait SigningAgent: Send + Sync + 'static {
    type Contract: DaoContract;

    /// Asks the user to authorize account access. May block on a prompt; a
    /// dismissed prompt must come back as `AuthorizationDenied`.
    fn request_accounts(&self) -> impl Future<Output = Result<Vec<Address>>> + Send;

    fn chain_id(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Binds the contract at `address` to the authorized signer.
    fn bind_contract(&self, address: Address) -> Result<Self::Contract>;

    /// Forgets any answer staged for a prompt that will not run.
    fn discard_pending(&self) {}
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Authorization {
    pub account: Address,
    pub chain_id: u64,
}

pub struct ProviderGateway<A> {
    agent: Option<A>,
}

impl<A: SigningAgent> ProviderGateway<A> {
    pub fn new(agent: Option<A>) -> Self {
        Self { agent }
    }

    pub fn detected(&self) -> bool {
        self.agent.is_some()
    }

    pub fn agent(&self) -> Option<&A> {
        self.agent.as_ref()
    }

    pub async fn connect(&self) -> Result<Authorization> {
        let agent = self
            .agent
            .as_ref()
            .ok_or(DashboardError::ProviderUnavailable)?;

        debug!("requesting account access");
        let accounts = agent.request_accounts().await?;
        let account = accounts.first().copied().ok_or_else(|| {
            DashboardError::AuthorizationDenied("no accounts were authorized".into())
        })?;
        let chain_id = agent.chain_id().await?;
        info!(%account, chain_id, "signing agent authorized");
        Ok(Authorization { account, chain_id })
    }

    pub fn discard_pending(&self) {
        if let Some(agent) = &self.agent {
            agent.discard_pending();
        }
    }

    pub fn bind(&self, address: Address) -> Result<A::Contract> {
        self.agent
            .as_ref()
            .ok_or(DashboardError::ProviderUnavailable)?
            .bind_contract(address)
    }
}
