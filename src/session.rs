use crate::{
    errors::{
        DashboardError,
        Result,
    },
    network::NetworkGuard,
    notify::{
        Notice,
        Notifier,
    },
    provider::{
        ProviderGateway,
        SigningAgent,
    },
};
use alloy::primitives::Address;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{
    debug,
    error,
    info,
    warn,
};

pub const CONNECT_PENDING_MESSAGE: &str =
    "A wallet connection is already pending. Please wait for it to finish.";

#[derive(Clone)]
pub struct Connection<C> {
    pub account: Address,
    pub chain_id: u64,
    pub contract: C,
}

/// The whole connection state as one value. Transitions replace it; nothing
/// mutates a session in place.
#[derive(Clone)]
pub enum Session<C> {
    Disconnected,
    Connecting,
    Connected(Connection<C>),
}

impl<C> Session<C> {
    pub fn is_connected(&self) -> bool {
        matches!(self, Session::Connected(_))
    }

    pub fn connection(&self) -> Option<&Connection<C>> {
        match self {
            Session::Connected(connection) => Some(connection),
            _ => None,
        }
    }

    pub fn account(&self) -> Option<Address> {
        self.connection().map(|c| c.account)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConnectOutcome {
    Connected(Address),
    AlreadyConnected(Address),
}

pub type SessionWatch<C> = watch::Receiver<Arc<Session<C>>>;

pub struct SessionManager<A: SigningAgent> {
    gateway: ProviderGateway<A>,
    guard: NetworkGuard,
    contract_address: Address,
    notifier: Arc<dyn Notifier>,
    state: watch::Sender<Arc<Session<A::Contract>>>,
}

impl<A: SigningAgent> SessionManager<A> {
    pub fn new(
        gateway: ProviderGateway<A>,
        guard: NetworkGuard,
        contract_address: Address,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (state, _) = watch::channel(Arc::new(Session::Disconnected));
        Self {
            gateway,
            guard,
            contract_address,
            notifier,
            state,
        }
    }

    pub fn gateway(&self) -> &ProviderGateway<A> {
        &self.gateway
    }

    pub fn contract_address(&self) -> Address {
        self.contract_address
    }

    pub fn required_chain_id(&self) -> u64 {
        self.guard.required_chain_id()
    }

    pub fn current(&self) -> Arc<Session<A::Contract>> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> SessionWatch<A::Contract> {
        self.state.subscribe()
    }

    /// Disconnected -> Connecting -> Connected. Calling again while connected
    /// is a no-op and never re-prompts the agent; calling while a connect is
    /// pending is rejected.
    pub async fn connect(&self) -> Result<ConnectOutcome> {
        let mut already_connected = None;
        let started = self.state.send_if_modified(|session| match session.as_ref() {
            Session::Disconnected => {
                *session = Arc::new(Session::Connecting);
                true
            }
            Session::Connecting => false,
            Session::Connected(connection) => {
                already_connected = Some(connection.account);
                false
            }
        });
        if let Some(account) = already_connected {
            debug!(%account, "connect ignored, session already connected");
            self.gateway.discard_pending();
            return Ok(ConnectOutcome::AlreadyConnected(account));
        }
        if !started {
            warn!("connect rejected, another connect is pending");
            self.gateway.discard_pending();
            self.notifier
                .notify(Notice::warning(CONNECT_PENDING_MESSAGE));
            return Err(DashboardError::ConnectInProgress);
        }

        match self.establish().await {
            Ok(connection) => {
                let account = connection.account;
                info!(%account, chain_id = connection.chain_id, "session connected");
                self.state
                    .send_replace(Arc::new(Session::Connected(connection)));
                Ok(ConnectOutcome::Connected(account))
            }
            Err(err) => {
                self.state.send_replace(Arc::new(Session::Disconnected));
                // the guard has already warned the user about a mismatch
                if !matches!(err, DashboardError::NetworkMismatch { .. }) {
                    error!(error = %err, "connect failed");
                    self.notifier
                        .notify(Notice::error(format!("Could not connect: {err}")));
                }
                Err(err)
            }
        }
    }

    /// Drops the contract handle. Returns whether a connection was closed.
    pub fn disconnect(&self) -> bool {
        let closed = self.state.send_if_modified(|session| {
            if session.is_connected() {
                *session = Arc::new(Session::Disconnected);
                true
            } else {
                false
            }
        });
        if closed {
            info!("session disconnected");
        }
        closed
    }

    async fn establish(&self) -> Result<Connection<A::Contract>> {
        let auth = self.gateway.connect().await?;
        self.guard.enforce(auth.chain_id, self.notifier.as_ref())?;
        let contract = self.gateway.bind(self.contract_address)?;
        Ok(Connection {
            account: auth.account,
            chain_id: auth.chain_id,
            contract,
        })
    }
}
