use crate::{
    contract::confirm_receipt,
    errors::{
        DashboardError,
        Result,
    },
};
use alloy::{
    network::TransactionBuilder,
    primitives::{
        Address,
        B256,
        Bytes,
    },
    providers::{
        DynProvider,
        Provider,
    },
    rpc::types::{
        TransactionReceipt,
        TransactionRequest,
    },
};
use color_eyre::eyre::{
    self,
    WrapErr,
    eyre,
};
use deployments::{
    DeploymentRecord,
    DeploymentStore,
    compute_bytecode_hash,
};
use serde::Deserialize;
use std::{
    fs,
    io::Write,
    path::Path,
    time::Duration,
};
use tracing::info;

pub const DEFAULT_ARTIFACT_PATH: &str = "artifacts/contracts/MyDAO.sol/MyDAO.json";

/// The parts of a Hardhat compilation artifact needed to deploy.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractArtifact {
    pub contract_name: String,
    #[serde(default)]
    pub bytecode: String,
    #[serde(default)]
    pub abi: serde_json::Value,
}

impl ContractArtifact {
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let raw = fs::read_to_string(path)
            .wrap_err_with(|| format!("reading artifact {}", path.display()))?;
        Self::from_json(&raw)
            .wrap_err_with(|| format!("parsing artifact {}", path.display()))
    }

    pub fn from_json(raw: &str) -> eyre::Result<Self> {
        let artifact: Self = serde_json::from_str(raw)?;
        Ok(artifact)
    }

    /// Creation code. An abstract contract or interface compiles to `0x`,
    /// which cannot be deployed.
    pub fn bytecode(&self) -> eyre::Result<Bytes> {
        let code = alloy::hex::decode(self.bytecode.trim())
            .wrap_err_with(|| format!("{} has malformed bytecode", self.contract_name))?;
        if code.is_empty() {
            return Err(eyre!("{} has no deployable bytecode", self.contract_name));
        }
        Ok(Bytes::from(code))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeployedContract {
    pub address: Address,
    pub tx_hash: B256,
    pub block_number: Option<u64>,
}

/// Sends a single contract-creation transaction and waits for it to be mined.
pub trait ContractFactory: Send + Sync {
    fn deploy(
        &self,
        bytecode: Bytes,
    ) -> impl Future<Output = Result<DeployedContract>> + Send;
}

pub struct AlloyFactory {
    provider: DynProvider,
    receipt_timeout: Option<Duration>,
}

impl AlloyFactory {
    pub fn new(provider: DynProvider, receipt_timeout: Option<Duration>) -> Self {
        Self {
            provider,
            receipt_timeout,
        }
    }
}

impl ContractFactory for AlloyFactory {
    async fn deploy(&self, bytecode: Bytes) -> Result<DeployedContract> {
        let tx = TransactionRequest::default().with_deploy_code(bytecode);
        let pending = self.provider.send_transaction(tx).await?;
        info!(tx = %pending.tx_hash(), "creation transaction submitted");

        let receipt = pending
            .with_timeout(self.receipt_timeout)
            .get_receipt()
            .await?;
        deployed_from_receipt(&receipt)
    }
}

fn deployed_from_receipt(receipt: &TransactionReceipt) -> Result<DeployedContract> {
    let confirmation = confirm_receipt("contract creation", receipt)?;
    let address = receipt.contract_address.ok_or_else(|| {
        DashboardError::Unknown("receipt carries no contract address".into())
    })?;
    Ok(DeployedContract {
        address,
        tx_hash: confirmation.tx_hash,
        block_number: confirmation.block_number,
    })
}

/// Deploys a fresh instance and writes the announcement line to `out`.
/// Re-running always creates a new instance.
pub async fn deploy<F: ContractFactory>(
    factory: &F,
    artifact: &ContractArtifact,
    out: &mut impl Write,
) -> eyre::Result<DeployedContract> {
    let bytecode = artifact.bytecode()?;
    info!(
        contract = %artifact.contract_name,
        size = bytecode.len(),
        "deploying contract"
    );
    let deployed = factory
        .deploy(bytecode)
        .await
        .wrap_err_with(|| format!("deploying {}", artifact.contract_name))?;
    writeln!(
        out,
        "{} contract deployed to: {}",
        artifact.contract_name, deployed.address
    )?;
    info!(
        contract = %artifact.contract_name,
        address = %deployed.address,
        tx = %deployed.tx_hash,
        "contract deployed"
    );
    Ok(deployed)
}

pub fn record_deployment(
    store: &DeploymentStore,
    artifact: &ContractArtifact,
    deployed: &DeployedContract,
    network_url: &str,
    chain_id: u64,
    deployer: Option<Address>,
) -> eyre::Result<DeploymentRecord> {
    let bytecode = artifact.bytecode()?;
    let mut record = DeploymentRecord::new(
        artifact.contract_name.clone(),
        deployed.address.to_string(),
        compute_bytecode_hash(&bytecode),
        network_url.to_string(),
        chain_id,
    );
    record.tx_hash = Some(deployed.tx_hash.to_string());
    record.block_number = deployed.block_number;
    record.deployer = deployer.map(|address| address.to_string());
    store
        .append(record.clone())
        .map_err(|e| eyre!("{e:#}"))
        .wrap_err("recording deployment")?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::test_helpers::{
        FakeFactory,
        mined_receipt,
    };
    use deployments::DeploymentEnv;
    use tempdir::TempDir;

    const ARTIFACT: &str = r#"{
        "_format": "hh-sol-artifact-1",
        "contractName": "MyDAO",
        "sourceName": "contracts/MyDAO.sol",
        "abi": [],
        "bytecode": "0x6080604052348015600f57600080fd5b50",
        "deployedBytecode": "0x6080"
    }"#;

    #[test]
    fn from_json__reads_hardhat_artifact() {
        let artifact = ContractArtifact::from_json(ARTIFACT).unwrap();

        assert_eq!(artifact.contract_name, "MyDAO");
        assert_eq!(artifact.bytecode().unwrap().len(), 17);
    }

    #[test]
    fn bytecode__rejects_empty_creation_code() {
        let artifact = ContractArtifact::from_json(
            r#"{"contractName": "IMyDAO", "abi": [], "bytecode": "0x"}"#,
        )
        .unwrap();

        let err = artifact.bytecode().unwrap_err();

        assert!(err.to_string().contains("no deployable bytecode"));
    }

    #[test]
    fn bytecode__rejects_missing_field() {
        let artifact =
            ContractArtifact::from_json(r#"{"contractName": "MyDAO"}"#).unwrap();

        assert!(artifact.bytecode().is_err());
    }

    #[test]
    fn from_json__requires_contract_name() {
        assert!(ContractArtifact::from_json(r#"{"bytecode": "0x60"}"#).is_err());
    }

    #[test]
    fn deployed_from_receipt__reads_created_address() {
        let mined = mined_receipt(true, Some(Address::repeat_byte(0x99)));

        let deployed = deployed_from_receipt(&mined).unwrap();

        assert_eq!(deployed.address, Address::repeat_byte(0x99));
        assert_eq!(deployed.block_number, Some(16));
    }

    #[test]
    fn deployed_from_receipt__reverted_creation_is_an_error() {
        let mined = mined_receipt(false, Some(Address::repeat_byte(0x99)));

        let result = deployed_from_receipt(&mined);

        assert!(matches!(result, Err(DashboardError::TransactionReverted(_))));
    }

    #[test]
    fn deployed_from_receipt__missing_address_is_an_error() {
        let mined = mined_receipt(true, None);

        assert!(matches!(
            deployed_from_receipt(&mined),
            Err(DashboardError::Unknown(_))
        ));
    }

    #[tokio::test]
    async fn deploy__failed_creation_prints_nothing() {
        // given
        let factory = FakeFactory::new(Address::repeat_byte(0x99))
            .failing("execution reverted");
        let artifact = ContractArtifact::from_json(ARTIFACT).unwrap();
        let mut out: Vec<u8> = Vec::new();

        // when
        let result = deploy(&factory, &artifact, &mut out).await;

        // then
        assert!(result.is_err());
        assert!(out.is_empty());
        assert_eq!(factory.deployments().len(), 1);
    }

    #[tokio::test]
    async fn record_deployment__appends_to_store() {
        // given
        let tmp = TempDir::new("dao-deployer").unwrap();
        let store = DeploymentStore::with_root(tmp.path(), DeploymentEnv::Local).unwrap();
        let factory = FakeFactory::new(Address::repeat_byte(0x99));
        let artifact = ContractArtifact::from_json(ARTIFACT).unwrap();
        let deployed = deploy(&factory, &artifact, &mut Vec::<u8>::new()).await.unwrap();

        // when
        let record = record_deployment(
            &store,
            &artifact,
            &deployed,
            "http://127.0.0.1:8545",
            31337,
            Some(Address::repeat_byte(0x01)),
        )
        .unwrap();

        // then
        let latest = store.latest().unwrap().unwrap();
        assert_eq!(latest.contract_address, deployed.address.to_string());
        assert_eq!(latest.bytecode_hash, record.bytecode_hash);
        assert_eq!(latest.block_number, Some(1));
        assert_eq!(latest.chain_id, 31337);
    }
}
