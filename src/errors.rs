use crate::dispatcher::ActionKind;

pub type Result<T, E = DashboardError> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DashboardError {
    #[error("no signing agent available")]
    ProviderUnavailable,

    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("wrong network: expected chain id {expected}, connected to {actual}")]
    NetworkMismatch { expected: u64, actual: u64 },

    #[error("wallet is not connected")]
    NotConnected,

    #[error("a connection request is already pending")]
    ConnectInProgress,

    #[error("{0} is already being submitted")]
    ActionInFlight(ActionKind),

    #[error("transaction reverted: {0}")]
    TransactionReverted(String),

    #[error("rpc: {0}")]
    Rpc(String),

    #[error("timed out waiting for transaction confirmation")]
    Timeout,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Unknown(String),
}

fn looks_like_revert(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("revert") || lower.contains("execution failed")
}

fn looks_like_rejection(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("user rejected") || lower.contains("user denied")
}

impl DashboardError {
    pub fn from_rpc_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if looks_like_rejection(&message) {
            DashboardError::AuthorizationDenied(message)
        } else if looks_like_revert(&message) {
            DashboardError::TransactionReverted(message)
        } else {
            DashboardError::Rpc(message)
        }
    }
}

impl From<alloy::transports::RpcError<alloy::transports::TransportErrorKind>>
    for DashboardError
{
    fn from(
        e: alloy::transports::RpcError<alloy::transports::TransportErrorKind>,
    ) -> Self {
        DashboardError::from_rpc_message(e.to_string())
    }
}

impl From<alloy::contract::Error> for DashboardError {
    fn from(e: alloy::contract::Error) -> Self {
        DashboardError::from_rpc_message(e.to_string())
    }
}

impl From<alloy::providers::PendingTransactionError> for DashboardError {
    fn from(e: alloy::providers::PendingTransactionError) -> Self {
        match e {
            alloy::providers::PendingTransactionError::TxWatcher(
                alloy::providers::WatchTxError::Timeout,
            ) => DashboardError::Timeout,
            other => DashboardError::from_rpc_message(other.to_string()),
        }
    }
}

impl From<alloy::hex::FromHexError> for DashboardError {
    fn from(e: alloy::hex::FromHexError) -> Self {
        DashboardError::InvalidInput(e.to_string())
    }
}
