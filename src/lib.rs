use alloy::primitives::{
    Address,
    address,
};

pub mod config;
pub mod contract;
pub mod deployer;
pub mod dispatcher;
pub mod errors;
pub mod network;
pub mod notify;
pub mod provider;
pub mod session;
pub mod wallets;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub mod dao_types {
    alloy::sol! {
        #[sol(rpc)]
        contract MyDAO {
            function applyForMembership() external;
            function approveMembership(address applicant) external;
            function createProposal(string calldata description) external;
            function voteOnProposal(uint256 proposalId, bool inFavor) external;
            function voteAgainstProposal(uint256 proposalId, bool inFavor) external;
            function closeVoting(uint256 proposalId) external;
        }
    }
}

/// MyDAO instance on Polygon Mumbai.
pub const DEFAULT_CONTRACT_ADDRESS: Address =
    address!("0x45D7A88E5A6d0f38eD3E1d5DE741dE265BF01E08");

pub const REQUIRED_CHAIN_ID: u64 = deployments::MUMBAI_CHAIN_ID;

pub use dispatcher::{
    ActionDispatcher,
    ActionKind,
    DaoAction,
};
pub use errors::{
    DashboardError,
    Result,
};
pub use session::{
    Session,
    SessionManager,
};
