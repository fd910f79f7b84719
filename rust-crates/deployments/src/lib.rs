use anyhow::{
    Context,
    Result,
};
use chrono::Utc;
use serde::{
    Deserialize,
    Serialize,
};
use sha2::{
    Digest,
    Sha256,
};
use std::{
    fmt,
    fs,
    io::Write,
    path::{
        Path,
        PathBuf,
    },
};

pub const DEPLOYMENTS_ROOT: &str = ".deployments";
const DEPLOYMENTS_FILE: &str = "deployments.json";

pub const MUMBAI_CHAIN_ID: u64 = 80001;
pub const LOCAL_CHAIN_ID: u64 = 31337;
pub const DEFAULT_MUMBAI_RPC_URL: &str = "https://rpc-mumbai.maticvigil.com";
pub const DEFAULT_LOCAL_RPC_URL: &str = "http://127.0.0.1:8545";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeploymentEnv {
    Mumbai,
    Local,
}

impl DeploymentEnv {
    pub fn dir_name(self) -> &'static str {
        match self {
            DeploymentEnv::Mumbai => "mumbai",
            DeploymentEnv::Local => "local",
        }
    }

    pub fn chain_id(self) -> u64 {
        match self {
            DeploymentEnv::Mumbai => MUMBAI_CHAIN_ID,
            DeploymentEnv::Local => LOCAL_CHAIN_ID,
        }
    }

    pub fn default_rpc_url(self) -> &'static str {
        match self {
            DeploymentEnv::Mumbai => DEFAULT_MUMBAI_RPC_URL,
            DeploymentEnv::Local => DEFAULT_LOCAL_RPC_URL,
        }
    }
}

impl fmt::Display for DeploymentEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeploymentEnv::Mumbai => "Mumbai",
            DeploymentEnv::Local => "Local",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub deployed_at: String,
    pub contract_name: String,
    pub contract_address: String,
    pub bytecode_hash: String,
    pub network_url: String,
    pub chain_id: u64,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub deployer: Option<String>,
}

impl DeploymentRecord {
    pub fn new(
        contract_name: impl Into<String>,
        contract_address: impl Into<String>,
        bytecode_hash: impl Into<String>,
        network_url: impl Into<String>,
        chain_id: u64,
    ) -> Self {
        Self {
            deployed_at: Utc::now().to_rfc3339(),
            contract_name: contract_name.into(),
            contract_address: contract_address.into(),
            bytecode_hash: bytecode_hash.into(),
            network_url: network_url.into(),
            chain_id,
            tx_hash: None,
            block_number: None,
            deployer: None,
        }
    }

    pub fn is_compatible_with_hash(&self, hash: &str) -> bool {
        self.bytecode_hash == hash
    }
}

#[derive(Debug)]
pub struct DeploymentStore {
    path: PathBuf,
}

impl DeploymentStore {
    pub fn new(env: DeploymentEnv) -> Result<Self> {
        Self::with_root(DEPLOYMENTS_ROOT, env)
    }

    pub fn with_root(root: impl AsRef<Path>, env: DeploymentEnv) -> Result<Self> {
        let path = ensure_store(root.as_ref(), env)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<DeploymentRecord>> {
        read_records(&self.path)
    }

    pub fn latest(&self) -> Result<Option<DeploymentRecord>> {
        Ok(self.load()?.pop())
    }

    pub fn append(&self, record: DeploymentRecord) -> Result<()> {
        let mut records = self.load()?;
        records.push(record);
        write_records(&self.path, &records)
    }
}

pub fn compute_bytecode_hash(bytecode: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytecode.as_ref());
    format!("{:x}", hasher.finalize())
}

pub fn ensure_structure() -> Result<()> {
    for env in [DeploymentEnv::Mumbai, DeploymentEnv::Local] {
        let _ = ensure_store(Path::new(DEPLOYMENTS_ROOT), env)?;
    }
    Ok(())
}

fn ensure_store(root: &Path, env: DeploymentEnv) -> Result<PathBuf> {
    let env_dir = root.join(env.dir_name());
    if !env_dir.exists() {
        fs::create_dir_all(&env_dir).with_context(|| {
            format!(
                "Failed to create {}/{} directory",
                root.display(),
                env.dir_name()
            )
        })?;
    }

    let file_path = env_dir.join(DEPLOYMENTS_FILE);
    if !file_path.exists() {
        let mut file = fs::File::create(&file_path).with_context(|| {
            format!(
                "Failed to create deployment record file for {} at {:?}",
                env, file_path
            )
        })?;
        file.write_all(b"[]").with_context(|| {
            format!("Failed to initialize deployment record file for {}", env)
        })?;
    }

    Ok(file_path)
}

fn read_records(path: impl AsRef<Path>) -> Result<Vec<DeploymentRecord>> {
    let data = fs::read(path.as_ref()).context("Failed to read deployment records")?;
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice::<Vec<DeploymentRecord>>(&data)
        .context("Failed to parse deployment records JSON")
}

fn write_records(path: impl AsRef<Path>, records: &[DeploymentRecord]) -> Result<()> {
    let json = serde_json::to_vec_pretty(records)
        .context("Failed to serialize deployment records")?;
    fs::write(path.as_ref(), json).context("Failed to write deployment records")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use tempdir::TempDir;

    fn record(address: &str) -> DeploymentRecord {
        DeploymentRecord::new(
            "MyDAO",
            address,
            compute_bytecode_hash([0x60, 0x80]),
            DEFAULT_LOCAL_RPC_URL,
            LOCAL_CHAIN_ID,
        )
    }

    #[test]
    fn with_root__creates_empty_record_file() {
        // given
        let dir = TempDir::new("deployments").unwrap();

        // when
        let store = DeploymentStore::with_root(dir.path(), DeploymentEnv::Local).unwrap();

        // then
        assert!(store.path().ends_with("local/deployments.json"));
        assert_eq!(store.load().unwrap(), Vec::new());
        assert_eq!(store.latest().unwrap(), None);
    }

    #[test]
    fn append__keeps_history_and_latest_is_last() {
        // given
        let dir = TempDir::new("deployments").unwrap();
        let store = DeploymentStore::with_root(dir.path(), DeploymentEnv::Mumbai).unwrap();
        let first = record("0x0000000000000000000000000000000000000001");
        let second = record("0x0000000000000000000000000000000000000002");

        // when
        store.append(first.clone()).unwrap();
        store.append(second.clone()).unwrap();

        // then
        assert_eq!(store.load().unwrap(), vec![first, second.clone()]);
        assert_eq!(store.latest().unwrap(), Some(second));
    }

    #[test]
    fn load__rejects_malformed_json() {
        // given
        let dir = TempDir::new("deployments").unwrap();
        let store = DeploymentStore::with_root(dir.path(), DeploymentEnv::Local).unwrap();
        fs::write(store.path(), b"{not json").unwrap();

        // when
        let result = store.load();

        // then
        assert!(result.is_err());
    }

    #[test]
    fn compute_bytecode_hash__is_hex_sha256() {
        let hash = compute_bytecode_hash(b"");
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert!(record("0x01").is_compatible_with_hash(&compute_bytecode_hash([0x60, 0x80])));
    }
}
