use crate::{
    dao_types::MyDAO,
    errors::{
        DashboardError,
        Result,
    },
};
use alloy::{
    network::ReceiptResponse,
    primitives::{
        Address,
        B256,
        U256,
    },
    providers::DynProvider,
    rpc::types::TransactionReceipt,
};
use std::time::Duration;
use tracing::debug;

/// One state-changing entry point of the MyDAO ABI, with its arguments.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ContractCall {
    ApplyForMembership,
    ApproveMembership { applicant: Address },
    CreateProposal { description: String },
    VoteOnProposal { proposal_id: U256, in_favor: bool },
    VoteAgainstProposal { proposal_id: U256, in_favor: bool },
    CloseVoting { proposal_id: U256 },
}

impl ContractCall {
    pub fn function_name(&self) -> &'static str {
        match self {
            ContractCall::ApplyForMembership => "applyForMembership",
            ContractCall::ApproveMembership { .. } => "approveMembership",
            ContractCall::CreateProposal { .. } => "createProposal",
            ContractCall::VoteOnProposal { .. } => "voteOnProposal",
            ContractCall::VoteAgainstProposal { .. } => "voteAgainstProposal",
            ContractCall::CloseVoting { .. } => "closeVoting",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TxConfirmation {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
}

/// A contract handle bound to an authorized signer. `submit` resolves once the
/// transaction has been mined.
pub trait DaoContract: Clone + Send + Sync + 'static {
    fn address(&self) -> Address;

    fn submit(
        &self,
        call: ContractCall,
    ) -> impl Future<Output = Result<TxConfirmation>> + Send;
}

#[derive(Clone)]
pub struct AlloyDao {
    instance: MyDAO::MyDAOInstance<DynProvider>,
    receipt_timeout: Option<Duration>,
}

impl AlloyDao {
    pub fn new(
        address: Address,
        provider: DynProvider,
        receipt_timeout: Option<Duration>,
    ) -> Self {
        Self {
            instance: MyDAO::new(address, provider),
            receipt_timeout,
        }
    }
}

impl DaoContract for AlloyDao {
    fn address(&self) -> Address {
        *self.instance.address()
    }

    async fn submit(&self, call: ContractCall) -> Result<TxConfirmation> {
        let dao = &self.instance;
        let name = call.function_name();
        let pending = match call {
            ContractCall::ApplyForMembership => dao.applyForMembership().send().await?,
            ContractCall::ApproveMembership { applicant } => {
                dao.approveMembership(applicant).send().await?
            }
            ContractCall::CreateProposal { description } => {
                dao.createProposal(description).send().await?
            }
            ContractCall::VoteOnProposal {
                proposal_id,
                in_favor,
            } => dao.voteOnProposal(proposal_id, in_favor).send().await?,
            ContractCall::VoteAgainstProposal {
                proposal_id,
                in_favor,
            } => dao.voteAgainstProposal(proposal_id, in_favor).send().await?,
            ContractCall::CloseVoting { proposal_id } => {
                dao.closeVoting(proposal_id).send().await?
            }
        };
        debug!(function = name, tx = %pending.tx_hash(), "transaction submitted");

        let receipt = pending
            .with_timeout(self.receipt_timeout)
            .get_receipt()
            .await?;
        confirm_receipt(name, &receipt)
    }
}

/// A mined receipt with a failed status is a revert, even though the RPC
/// call itself succeeded.
pub fn confirm_receipt(what: &str, receipt: &TransactionReceipt) -> Result<TxConfirmation> {
    if !receipt.status() {
        return Err(DashboardError::TransactionReverted(format!(
            "{what} reverted in transaction {}",
            receipt.transaction_hash
        )));
    }
    Ok(TxConfirmation {
        tx_hash: receipt.transaction_hash,
        block_number: receipt.block_number,
    })
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::test_helpers::mined_receipt;
    use alloy::sol_types::SolCall;

    #[test]
    fn function_name__matches_abi_selectors() {
        let calls = [
            (
                ContractCall::ApplyForMembership,
                MyDAO::applyForMembershipCall::SIGNATURE,
            ),
            (
                ContractCall::ApproveMembership {
                    applicant: Address::ZERO,
                },
                MyDAO::approveMembershipCall::SIGNATURE,
            ),
            (
                ContractCall::CreateProposal {
                    description: String::new(),
                },
                MyDAO::createProposalCall::SIGNATURE,
            ),
            (
                ContractCall::VoteOnProposal {
                    proposal_id: U256::ZERO,
                    in_favor: true,
                },
                MyDAO::voteOnProposalCall::SIGNATURE,
            ),
            (
                ContractCall::VoteAgainstProposal {
                    proposal_id: U256::ZERO,
                    in_favor: false,
                },
                MyDAO::voteAgainstProposalCall::SIGNATURE,
            ),
            (
                ContractCall::CloseVoting {
                    proposal_id: U256::ZERO,
                },
                MyDAO::closeVotingCall::SIGNATURE,
            ),
        ];

        for (call, signature) in calls {
            let (name, _) = signature.split_once('(').unwrap();
            assert_eq!(call.function_name(), name);
        }
    }

    #[test]
    fn confirm_receipt__failed_status_is_a_revert() {
        let mined = mined_receipt(false, None);

        let result = confirm_receipt("closeVoting", &mined);

        assert_eq!(
            result,
            Err(DashboardError::TransactionReverted(format!(
                "closeVoting reverted in transaction {}",
                B256::repeat_byte(0x0a)
            )))
        );
    }

    #[test]
    fn confirm_receipt__success_reports_hash_and_block() {
        let mined = mined_receipt(true, None);

        let confirmation = confirm_receipt("createProposal", &mined).unwrap();

        assert_eq!(
            confirmation,
            TxConfirmation {
                tx_hash: B256::repeat_byte(0x0a),
                block_number: Some(16),
            }
        );
    }

    #[test]
    fn abi__vote_functions_take_id_and_flag() {
        assert_eq!(
            MyDAO::voteOnProposalCall::SIGNATURE,
            "voteOnProposal(uint256,bool)"
        );
        assert_eq!(
            MyDAO::voteAgainstProposalCall::SIGNATURE,
            "voteAgainstProposal(uint256,bool)"
        );
    }
}
