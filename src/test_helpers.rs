use crate::{
    contract::{
        ContractCall,
        DaoContract,
        TxConfirmation,
    },
    deployer::{
        ContractFactory,
        DeployedContract,
    },
    errors::{
        DashboardError,
        Result,
    },
    notify::{
        Notice,
        NoticeLevel,
        Notifier,
    },
    provider::SigningAgent,
};
use alloy::{
    primitives::{
        Address,
        B256,
        Bytes,
        address,
    },
    rpc::types::TransactionReceipt,
};
use std::sync::{
    Arc,
    Mutex,
    atomic::{
        AtomicUsize,
        Ordering,
    },
};
use tokio::sync::Notify;

pub const DEFAULT_ACCOUNT: Address =
    address!("0xabababababababababababababababababababab");

/// Blocks a fake until the test releases it.
#[derive(Clone, Debug, Default)]
struct Gate(Option<Arc<Notify>>);

impl Gate {
    fn closed() -> Self {
        Gate(Some(Arc::new(Notify::new())))
    }

    async fn pass(&self) {
        if let Some(notify) = &self.0 {
            notify.notified().await;
        }
    }

    fn open(&self) {
        if let Some(notify) = &self.0 {
            notify.notify_one();
        }
    }
}

/// Contract fake that records each call. Clones share the call log.
#[derive(Clone, Debug, Default)]
pub struct FakeDao {
    address: Address,
    calls: Arc<Mutex<Vec<ContractCall>>>,
    revert_reason: Option<String>,
    gate: Gate,
}

impl FakeDao {
    pub fn reverting(mut self, reason: impl Into<String>) -> Self {
        self.revert_reason = Some(reason.into());
        self
    }

    pub fn held(mut self) -> Self {
        self.gate = Gate::closed();
        self
    }

    pub fn release(&self) {
        self.gate.open();
    }

    pub fn calls(&self) -> Vec<ContractCall> {
        self.calls.lock().unwrap().clone()
    }

    fn bound_to(&self, address: Address) -> Self {
        Self {
            address,
            ..self.clone()
        }
    }
}

impl DaoContract for FakeDao {
    fn address(&self) -> Address {
        self.address
    }

    async fn submit(&self, call: ContractCall) -> Result<TxConfirmation> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(call);
            calls.len()
        };
        self.gate.pass().await;
        if let Some(reason) = &self.revert_reason {
            return Err(DashboardError::TransactionReverted(reason.clone()));
        }
        Ok(TxConfirmation {
            tx_hash: B256::with_last_byte(index as u8),
            block_number: Some(index as u64),
        })
    }
}

#[derive(Clone, Debug)]
pub struct FakeAgent {
    chain_id: u64,
    accounts: Vec<Address>,
    deny: bool,
    gate: Gate,
    dao: FakeDao,
    account_requests: Arc<AtomicUsize>,
    binds: Arc<AtomicUsize>,
    discards: Arc<AtomicUsize>,
}

impl FakeAgent {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            accounts: vec![DEFAULT_ACCOUNT],
            deny: false,
            gate: Gate::default(),
            dao: FakeDao::default(),
            account_requests: Arc::new(AtomicUsize::new(0)),
            binds: Arc::new(AtomicUsize::new(0)),
            discards: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_accounts(mut self, accounts: Vec<Address>) -> Self {
        self.accounts = accounts;
        self
    }

    pub fn with_dao(mut self, dao: FakeDao) -> Self {
        self.dao = dao;
        self
    }

    /// The user dismisses the authorization prompt.
    pub fn denying(mut self) -> Self {
        self.deny = true;
        self
    }

    /// `request_accounts` waits for `release`.
    pub fn held(mut self) -> Self {
        self.gate = Gate::closed();
        self
    }

    pub fn release(&self) {
        self.gate.open();
    }

    pub fn account(&self) -> Address {
        self.accounts.first().copied().unwrap_or(DEFAULT_ACCOUNT)
    }

    pub fn account_requests(&self) -> usize {
        self.account_requests.load(Ordering::SeqCst)
    }

    pub fn binds(&self) -> usize {
        self.binds.load(Ordering::SeqCst)
    }

    /// How many times the session dropped a staged answer unused.
    pub fn discards(&self) -> usize {
        self.discards.load(Ordering::SeqCst)
    }

    pub fn dao(&self) -> FakeDao {
        self.dao.clone()
    }
}

impl SigningAgent for FakeAgent {
    type Contract = FakeDao;

    async fn request_accounts(&self) -> Result<Vec<Address>> {
        self.account_requests.fetch_add(1, Ordering::SeqCst);
        self.gate.pass().await;
        if self.deny {
            return Err(DashboardError::AuthorizationDenied(
                "user dismissed the prompt".into(),
            ));
        }
        Ok(self.accounts.clone())
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(self.chain_id)
    }

    fn bind_contract(&self, address: Address) -> Result<FakeDao> {
        self.binds.fetch_add(1, Ordering::SeqCst);
        Ok(self.dao.bound_to(address))
    }

    fn discard_pending(&self) {
        self.discards.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Debug, Default)]
pub struct RecordingNotifier {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn count(&self, level: NoticeLevel) -> usize {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .filter(|notice| notice.level == level)
            .count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

/// Deploys nothing; hands back a fixed address and records the init code.
#[derive(Clone, Debug)]
pub struct FakeFactory {
    address: Address,
    failure: Option<String>,
    deployments: Arc<Mutex<Vec<Bytes>>>,
}

impl FakeFactory {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            failure: None,
            deployments: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(reason.into());
        self
    }

    pub fn deployments(&self) -> Vec<Bytes> {
        self.deployments.lock().unwrap().clone()
    }
}

impl ContractFactory for FakeFactory {
    async fn deploy(&self, bytecode: Bytes) -> Result<DeployedContract> {
        self.deployments.lock().unwrap().push(bytecode);
        if let Some(reason) = &self.failure {
            return Err(DashboardError::from_rpc_message(reason.clone()));
        }
        Ok(DeployedContract {
            address: self.address,
            tx_hash: B256::repeat_byte(0x01),
            block_number: Some(1),
        })
    }
}

/// An EIP-1559 receipt mined in block 16 with hash `0x0a..0a`. A creation
/// receipt carries `contract_address` and no recipient.
pub fn mined_receipt(success: bool, contract_address: Option<Address>) -> TransactionReceipt {
    let status = if success { "0x1" } else { "0x0" };
    let to = match contract_address {
        Some(_) => None,
        None => Some(Address::repeat_byte(0x42)),
    };
    serde_json::from_value(serde_json::json!({
        "type": "0x2",
        "status": status,
        "cumulativeGasUsed": "0x5208",
        "logs": [],
        "logsBloom": format!("0x{}", "0".repeat(512)),
        "transactionHash": B256::repeat_byte(0x0a),
        "transactionIndex": "0x0",
        "blockHash": B256::repeat_byte(0x0b),
        "blockNumber": "0x10",
        "gasUsed": "0x5208",
        "effectiveGasPrice": "0x3b9aca00",
        "from": DEFAULT_ACCOUNT,
        "to": to,
        "contractAddress": contract_address,
    }))
    .unwrap()
}
