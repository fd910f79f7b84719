use crate::{
    contract::{
        ContractCall,
        DaoContract,
        TxConfirmation,
    },
    errors::{
        DashboardError,
        Result,
    },
    notify::{
        Notice,
        Notifier,
    },
    session::SessionWatch,
};
use alloy::primitives::{
    Address,
    U256,
};
use std::{
    collections::HashSet,
    fmt,
    sync::{
        Arc,
        Mutex,
    },
};
use tokio::task::JoinHandle;
use tracing::{
    error,
    info,
    warn,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum ActionKind {
    ApplyForMembership,
    ApproveMembership,
    CreateProposal,
    VoteOnProposal,
    VoteAgainstProposal,
    CloseVoting,
}

impl ActionKind {
    pub const ALL: [ActionKind; 6] = [
        ActionKind::ApplyForMembership,
        ActionKind::ApproveMembership,
        ActionKind::CreateProposal,
        ActionKind::VoteOnProposal,
        ActionKind::VoteAgainstProposal,
        ActionKind::CloseVoting,
    ];

    pub fn success_message(self) -> &'static str {
        match self {
            ActionKind::ApplyForMembership => {
                "Membership application submitted successfully."
            }
            ActionKind::ApproveMembership => "Membership approved successfully.",
            ActionKind::CreateProposal => "Proposal created successfully.",
            ActionKind::VoteOnProposal | ActionKind::VoteAgainstProposal => {
                "Vote submitted successfully."
            }
            ActionKind::CloseVoting => "Voting closed successfully.",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ActionKind::ApplyForMembership => "applyForMembership",
            ActionKind::ApproveMembership => "approveMembership",
            ActionKind::CreateProposal => "createProposal",
            ActionKind::VoteOnProposal => "voteOnProposal",
            ActionKind::VoteAgainstProposal => "voteAgainstProposal",
            ActionKind::CloseVoting => "closeVoting",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A user request against the DAO contract. Arguments are already parsed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DaoAction {
    ApplyForMembership,
    ApproveMembership(Address),
    CreateProposal(String),
    VoteOnProposal(U256),
    VoteAgainstProposal(U256),
    CloseVoting(U256),
}

impl DaoAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            DaoAction::ApplyForMembership => ActionKind::ApplyForMembership,
            DaoAction::ApproveMembership(_) => ActionKind::ApproveMembership,
            DaoAction::CreateProposal(_) => ActionKind::CreateProposal,
            DaoAction::VoteOnProposal(_) => ActionKind::VoteOnProposal,
            DaoAction::VoteAgainstProposal(_) => ActionKind::VoteAgainstProposal,
            DaoAction::CloseVoting(_) => ActionKind::CloseVoting,
        }
    }

    /// The vote direction flag is fixed by the variant: `true` for
    /// `voteOnProposal`, `false` for `voteAgainstProposal`.
    pub fn into_call(self) -> ContractCall {
        match self {
            DaoAction::ApplyForMembership => ContractCall::ApplyForMembership,
            DaoAction::ApproveMembership(applicant) => {
                ContractCall::ApproveMembership { applicant }
            }
            DaoAction::CreateProposal(description) => {
                ContractCall::CreateProposal { description }
            }
            DaoAction::VoteOnProposal(proposal_id) => ContractCall::VoteOnProposal {
                proposal_id,
                in_favor: true,
            },
            DaoAction::VoteAgainstProposal(proposal_id) => {
                ContractCall::VoteAgainstProposal {
                    proposal_id,
                    in_favor: false,
                }
            }
            DaoAction::CloseVoting(proposal_id) => {
                ContractCall::CloseVoting { proposal_id }
            }
        }
    }
}

type InFlight = Arc<Mutex<HashSet<ActionKind>>>;

fn lock_in_flight(
    in_flight: &InFlight,
) -> std::sync::MutexGuard<'_, HashSet<ActionKind>> {
    in_flight
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct InFlightGuard {
    in_flight: InFlight,
    kind: ActionKind,
}

impl InFlightGuard {
    fn acquire(in_flight: &InFlight, kind: ActionKind) -> Result<Self> {
        if !lock_in_flight(in_flight).insert(kind) {
            return Err(DashboardError::ActionInFlight(kind));
        }
        Ok(Self {
            in_flight: in_flight.clone(),
            kind,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock_in_flight(&self.in_flight).remove(&self.kind);
    }
}

pub struct ActionDispatcher<C> {
    session: SessionWatch<C>,
    notifier: Arc<dyn Notifier>,
    in_flight: InFlight,
}

impl<C> Clone for ActionDispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            notifier: self.notifier.clone(),
            in_flight: self.in_flight.clone(),
        }
    }
}

impl<C: DaoContract> ActionDispatcher<C> {
    pub fn new(session: SessionWatch<C>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            session,
            notifier,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Submits `action` and waits until it is mined. Every outcome is also
    /// reported through the notifier, so callers may ignore the result.
    pub async fn invoke(&self, action: DaoAction) -> Result<TxConfirmation> {
        let kind = action.kind();
        let result = self.submit(action).await;
        match &result {
            Ok(confirmation) => {
                info!(
                    action = %kind,
                    tx = %confirmation.tx_hash,
                    block = ?confirmation.block_number,
                    "transaction confirmed"
                );
                self.notifier.notify(Notice::info(kind.success_message()));
            }
            Err(DashboardError::ActionInFlight(_)) => {
                warn!(action = %kind, "duplicate submission rejected");
                self.notifier
                    .notify(Notice::warning(format!("{kind} is still pending")));
            }
            Err(err) => {
                error!(action = %kind, error = %err, "contract call failed");
                self.notifier
                    .notify(Notice::error(format!("{kind} failed: {err}")));
            }
        }
        result
    }

    /// Runs `invoke` on its own task so the caller can keep drawing.
    pub fn spawn(&self, action: DaoAction) -> JoinHandle<Result<TxConfirmation>> {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.invoke(action).await })
    }

    pub fn in_flight(&self) -> Vec<ActionKind> {
        let mut kinds: Vec<_> =
            lock_in_flight(&self.in_flight).iter().copied().collect();
        kinds.sort();
        kinds
    }

    async fn submit(&self, action: DaoAction) -> Result<TxConfirmation> {
        let session = self.session.borrow().clone();
        let connection = session.connection().ok_or(DashboardError::NotConnected)?;
        let _guard = InFlightGuard::acquire(&self.in_flight, action.kind())?;
        connection.contract.submit(action.into_call()).await
    }
}
