//! Compiled contract artifacts and ABI encoding.
//!
//! Artifacts follow the Hardhat layout: the artifact of `contracts/Factory.sol:HigherFactory`
//! lives at `<root>/contracts/Factory.sol/HigherFactory.json`, next to a `.dbg.json` file
//! pointing at the build-info used to compile it.

use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use alloy_core::{
    dyn_abi::{DynSolType, DynSolValue, JsonAbiExt, Specifier},
    json_abi::{Function, JsonAbi, Param},
    primitives::Bytes,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::registry::ArgValue;

/// Fully qualified artifact name, `path/File.sol:Contract`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactName {
    source: String,
    contract: String,
}

impl ArtifactName {
    /// Source file of the contract (`contracts/Factory.sol`).
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Contract name inside the source file (`HigherFactory`).
    pub fn contract(&self) -> &str {
        &self.contract
    }

    /// Path of the artifact JSON relative to the artifacts root.
    fn artifact_path(&self, root: &Path) -> PathBuf {
        root.join(&self.source).join(format!("{}.json", self.contract))
    }

    /// Path of the Hardhat debug file relative to the artifacts root.
    fn debug_path(&self, root: &Path) -> PathBuf {
        root.join(&self.source)
            .join(format!("{}.dbg.json", self.contract))
    }
}

impl FromStr for ArtifactName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (source, contract) = s
            .rsplit_once(':')
            .with_context(|| format!("Artifact `{s}` is not of the form `path/File.sol:Contract`"))?;

        if source.is_empty() || contract.is_empty() {
            anyhow::bail!("Artifact `{s}` is not of the form `path/File.sol:Contract`");
        }

        Ok(Self {
            source: source.to_string(),
            contract: contract.to_string(),
        })
    }
}

impl TryFrom<String> for ArtifactName {
    type Error = anyhow::Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<ArtifactName> for String {
    fn from(name: ArtifactName) -> Self {
        name.to_string()
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.contract)
    }
}

/// On-disk Hardhat artifact.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HardhatArtifact {
    abi: JsonAbi,
    bytecode: String,
    #[serde(default)]
    link_references: serde_json::Map<String, serde_json::Value>,
}

/// On-disk Hardhat debug file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HardhatDebugFile {
    build_info: PathBuf,
}

/// Compiler input and version needed by verification services.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    /// Full compiler version, without the leading `v` (`0.8.20+commit.a1b79de6`).
    pub solc_long_version: String,
    /// Standard-JSON compiler input.
    pub input: serde_json::Value,
}

/// A compiled contract: its ABI and creation bytecode.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    name: ArtifactName,
    abi: JsonAbi,
    bytecode: Bytes,
}

impl Artifact {
    pub fn new(name: ArtifactName, abi: JsonAbi, bytecode: Bytes) -> Self {
        Self {
            name,
            abi,
            bytecode,
        }
    }

    /// Parse a Hardhat artifact JSON document.
    pub fn from_hardhat_json(name: ArtifactName, json: &str) -> Result<Self> {
        let raw: HardhatArtifact = serde_json::from_str(json)
            .with_context(|| format!("Malformed artifact `{name}`"))?;

        if !raw.link_references.is_empty() || raw.bytecode.contains("__") {
            anyhow::bail!(
                "Artifact `{name}` has unlinked library references, link it before deploying"
            );
        }

        let bytecode = hex::decode(raw.bytecode.trim_start_matches("0x"))
            .with_context(|| format!("Artifact `{name}` has malformed bytecode"))?;

        Ok(Self::new(name, raw.abi, bytecode.into()))
    }

    pub fn name(&self) -> &ArtifactName {
        &self.name
    }

    pub fn abi(&self) -> &JsonAbi {
        &self.abi
    }

    pub fn bytecode(&self) -> &Bytes {
        &self.bytecode
    }

    /// Whether the artifact has creation code (interfaces and abstract contracts do not).
    pub fn is_deployable(&self) -> bool {
        !self.bytecode.is_empty()
    }

    /// Number of constructor parameters.
    pub fn constructor_arity(&self) -> usize {
        self.abi
            .constructor()
            .map(|c| c.inputs.len())
            .unwrap_or_default()
    }

    /// ABI-encode constructor arguments, without the creation code.
    pub fn encode_constructor_args(&self, args: &[ArgValue]) -> Result<Bytes> {
        match self.abi.constructor() {
            Some(constructor) => {
                let values = coerce_all(&constructor.inputs, args)
                    .with_context(|| format!("Invalid constructor arguments for `{}`", self.name))?;
                let encoded = constructor
                    .abi_encode_input(&values)
                    .with_context(|| format!("Failed to encode constructor of `{}`", self.name))?;
                Ok(encoded.into())
            }
            None if args.is_empty() => Ok(Bytes::new()),
            None => anyhow::bail!(
                "`{}` has no constructor but {} arguments were given",
                self.name,
                args.len()
            ),
        }
    }

    /// Creation code followed by the encoded constructor arguments.
    pub fn deploy_input(&self, args: &[ArgValue]) -> Result<Bytes> {
        if !self.is_deployable() {
            anyhow::bail!("`{}` has no creation bytecode", self.name);
        }

        let encoded_args = self.encode_constructor_args(args)?;
        let mut input = Vec::with_capacity(self.bytecode.len() + encoded_args.len());
        input.extend_from_slice(&self.bytecode);
        input.extend_from_slice(&encoded_args);
        Ok(input.into())
    }

    /// Find the function called by `method` with `arity` arguments.
    ///
    /// `method` is either a bare name (`setRouter`) or a full signature
    /// (`setRouter(address)`) to pick one overload.
    pub fn function(&self, method: &str, arity: usize) -> Result<&Function> {
        let candidates: Vec<&Function> = if method.contains('(') {
            self.abi
                .functions()
                .filter(|f| f.signature() == method)
                .collect()
        } else {
            self.abi
                .function(method)
                .map(|overloads| overloads.iter().collect())
                .unwrap_or_default()
        };

        if candidates.is_empty() {
            anyhow::bail!("`{}` has no method `{}`", self.name, method);
        }

        let mut matching = candidates.into_iter().filter(|f| f.inputs.len() == arity);
        let function = matching.next().with_context(|| {
            format!(
                "`{}.{}` takes a different number of arguments than the {} given",
                self.name, method, arity
            )
        })?;

        if matching.next().is_some() {
            anyhow::bail!(
                "`{}.{}` is overloaded with {} arguments, use the full signature",
                self.name,
                method,
                arity
            );
        }

        Ok(function)
    }

    /// Calldata for `method(args)`, selector included.
    pub fn encode_call(&self, method: &str, args: &[ArgValue]) -> Result<Bytes> {
        let function = self.function(method, args.len())?;
        let values = coerce_all(&function.inputs, args)
            .with_context(|| format!("Invalid arguments for `{}`", function.signature()))?;
        let encoded = function
            .abi_encode_input(&values)
            .with_context(|| format!("Failed to encode call to `{}`", function.signature()))?;
        Ok(encoded.into())
    }

    /// Decode the single return value of `method` from raw call output.
    pub fn decode_single_output(&self, method: &str, output: &[u8]) -> Result<ArgValue> {
        let function = self.function(method, 0)?;
        let [param] = function.outputs.as_slice() else {
            anyhow::bail!(
                "`{}` returns {} values, expected exactly one",
                function.signature(),
                function.outputs.len()
            );
        };

        let ty = resolve(param)?;
        let decoded = DynSolType::Tuple(vec![ty])
            .abi_decode_sequence(output)
            .with_context(|| format!("Failed to decode output of `{}`", function.signature()))?;

        match decoded {
            DynSolValue::Tuple(mut values) if values.len() == 1 => {
                ArgValue::from_sol_value(&values.remove(0))
            }
            _ => anyhow::bail!("Unexpected output shape for `{}`", function.signature()),
        }
    }
}

fn resolve(param: &Param) -> Result<DynSolType> {
    param
        .resolve()
        .with_context(|| format!("Unsupported ABI type `{}`", param.ty))
}

/// Coerce resolved arguments to the ABI types of `params`.
fn coerce_all(params: &[Param], args: &[ArgValue]) -> Result<Vec<DynSolValue>> {
    if params.len() != args.len() {
        anyhow::bail!("expected {} arguments, got {}", params.len(), args.len());
    }

    params
        .iter()
        .zip(args)
        .enumerate()
        .map(|(i, (param, arg))| {
            let ty = resolve(param)?;
            match (arg, &ty) {
                (ArgValue::Address(address), DynSolType::Address) => {
                    Ok(DynSolValue::Address(*address))
                }
                (ArgValue::Address(address), _) => anyhow::bail!(
                    "argument #{i} (`{}`) has type `{}` but an address ({address}) was given",
                    param.name,
                    param.ty
                ),
                (ArgValue::Literal(literal), _) => ty.coerce_str(literal).with_context(|| {
                    format!(
                        "argument #{i} (`{}`): `{literal}` is not a valid `{}`",
                        param.name, param.ty
                    )
                }),
            }
        })
        .collect()
}

/// Artifacts loaded from disk, cached by name.
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    root: PathBuf,
    cache: HashMap<ArtifactName, Arc<Artifact>>,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Register an in-memory artifact, replacing any cached one of the same name.
    pub fn insert(&mut self, artifact: Artifact) -> Arc<Artifact> {
        let artifact = Arc::new(artifact);
        self.cache
            .insert(artifact.name().clone(), Arc::clone(&artifact));
        artifact
    }

    /// Load `name` from disk unless it is already cached.
    pub fn load(&mut self, name: &ArtifactName) -> Result<Arc<Artifact>> {
        if let Some(artifact) = self.cache.get(name) {
            return Ok(Arc::clone(artifact));
        }

        let path = name.artifact_path(&self.root);
        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read artifact `{}` at {}", name, path.display()))?;
        let artifact = Artifact::from_hardhat_json(name.clone(), &json)?;

        tracing::debug!(artifact = %name, path = %path.display(), "Artifact loaded");

        Ok(self.insert(artifact))
    }

    /// Load every named artifact, failing on the first one that is missing or malformed.
    pub fn preload<'a>(&mut self, names: impl IntoIterator<Item = &'a ArtifactName>) -> Result<()> {
        for name in names {
            self.load(name)?;
        }
        Ok(())
    }

    /// A previously loaded artifact.
    pub fn get(&self, name: &ArtifactName) -> Result<Arc<Artifact>> {
        self.cache
            .get(name)
            .cloned()
            .with_context(|| format!("Artifact `{name}` was not loaded"))
    }

    /// Compiler version and standard-JSON input that produced `name`.
    pub fn build_info(&self, name: &ArtifactName) -> Result<BuildInfo> {
        let debug_path = name.debug_path(&self.root);
        let debug: HardhatDebugFile = serde_json::from_str(
            &std::fs::read_to_string(&debug_path)
                .with_context(|| format!("Failed to read {}", debug_path.display()))?,
        )
        .with_context(|| format!("Malformed debug file {}", debug_path.display()))?;

        let build_info_path = debug_path
            .parent()
            .map(|dir| dir.join(&debug.build_info))
            .unwrap_or(debug.build_info);

        let build_info = std::fs::read_to_string(&build_info_path)
            .with_context(|| format!("Failed to read build info {}", build_info_path.display()))?;

        serde_json::from_str(&build_info)
            .with_context(|| format!("Malformed build info {}", build_info_path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::{Address, B256, U256};
    use tempdir::TempDir;

    fn name(s: &str) -> ArtifactName {
        s.parse().unwrap()
    }

    fn liquidity_adder() -> Artifact {
        let abi = JsonAbi::parse([
            "constructor(address database, address router, address factory, bytes32 initCodeHash)",
            "function setRouter(address router)",
            "function setFee(uint256 fee)",
            "function setFee(uint256 fee, address recipient)",
            "function INIT_CODE_PAIR_HASH() view returns (bytes32)",
            "function owner() view returns (address)",
        ])
        .unwrap();
        Artifact::new(
            name("contracts/LiquidityAdder.sol:LiquidityAdder"),
            abi,
            Bytes::from(vec![0x60, 0x80]),
        )
    }

    #[test]
    fn test_artifact_name_parsing() {
        let parsed = name("contracts/Factory.sol:HigherFactory");
        assert_eq!(parsed.source(), "contracts/Factory.sol");
        assert_eq!(parsed.contract(), "HigherFactory");
        assert_eq!(parsed.to_string(), "contracts/Factory.sol:HigherFactory");

        assert!("HigherFactory".parse::<ArtifactName>().is_err());
        assert!("contracts/Factory.sol:".parse::<ArtifactName>().is_err());
    }

    #[test]
    fn test_artifact_paths() {
        let parsed = name("contracts/Factory.sol:HigherFactory");
        let root = Path::new("/artifacts");
        assert_eq!(
            parsed.artifact_path(root),
            PathBuf::from("/artifacts/contracts/Factory.sol/HigherFactory.json")
        );
        assert_eq!(
            parsed.debug_path(root),
            PathBuf::from("/artifacts/contracts/Factory.sol/HigherFactory.dbg.json")
        );
    }

    #[test]
    fn test_deploy_input_appends_constructor_args() {
        let artifact = liquidity_adder();
        let hash = B256::repeat_byte(0xab);
        let args = vec![
            ArgValue::Address(Address::repeat_byte(1)),
            ArgValue::Address(Address::repeat_byte(2)),
            ArgValue::Address(Address::repeat_byte(3)),
            ArgValue::Literal(hash.to_string()),
        ];

        let input = artifact.deploy_input(&args).unwrap();
        assert_eq!(&input[..2], &[0x60, 0x80]);
        assert_eq!(input.len(), 2 + 4 * 32);
        assert_eq!(&input[2 + 12..2 + 32], Address::repeat_byte(1).as_slice());
        assert_eq!(&input[2 + 96..], hash.as_slice());
    }

    #[test]
    fn test_constructor_arity_mismatch() {
        let artifact = liquidity_adder();
        let err = artifact
            .encode_constructor_args(&[ArgValue::Address(Address::ZERO)])
            .unwrap_err();
        assert!(format!("{err:#}").contains("expected 4 arguments, got 1"));
    }

    #[test]
    fn test_address_given_for_non_address_parameter() {
        let artifact = liquidity_adder();
        let err = artifact
            .encode_call("setFee", &[ArgValue::Address(Address::ZERO)])
            .unwrap_err();
        assert!(format!("{err:#}").contains("has type `uint256`"));
    }

    #[test]
    fn test_encode_call_picks_overload_by_arity() {
        let artifact = liquidity_adder();

        let one = artifact
            .encode_call("setFee", &[ArgValue::Literal("100".into())])
            .unwrap();
        let function = artifact.function("setFee", 1).unwrap();
        assert_eq!(&one[..4], function.selector().as_slice());
        assert_eq!(U256::from_be_slice(&one[4..]), U256::from(100));

        let two = artifact
            .encode_call(
                "setFee(uint256,address)",
                &[
                    ArgValue::Literal("1".into()),
                    ArgValue::Address(Address::repeat_byte(9)),
                ],
            )
            .unwrap();
        assert_eq!(two.len(), 4 + 64);
    }

    #[test]
    fn test_unknown_method() {
        let artifact = liquidity_adder();
        let err = artifact.encode_call("setRouterz", &[]).unwrap_err();
        assert!(err.to_string().contains("has no method `setRouterz`"));
    }

    #[test]
    fn test_invalid_literal() {
        let artifact = liquidity_adder();
        let err = artifact
            .encode_call("setFee", &[ArgValue::Literal("one hundred".into())])
            .unwrap_err();
        assert!(format!("{err:#}").contains("is not a valid `uint256`"));
    }

    #[test]
    fn test_decode_single_output() {
        let artifact = liquidity_adder();

        let hash = B256::repeat_byte(0x42);
        let value = artifact
            .decode_single_output("INIT_CODE_PAIR_HASH", hash.as_slice())
            .unwrap();
        assert_eq!(value, ArgValue::Literal(hash.to_string()));

        let owner = Address::repeat_byte(7);
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(owner.as_slice());
        let value = artifact.decode_single_output("owner", &word).unwrap();
        assert_eq!(value, ArgValue::Address(owner));
    }

    #[test]
    fn test_hardhat_artifact_parsing() {
        let json = r#"{
            "_format": "hh-sol-artifact-1",
            "contractName": "HigherFactory",
            "sourceName": "contracts/Factory.sol",
            "abi": [
                {"type": "constructor", "inputs": [{"name": "db", "type": "address", "internalType": "address"}], "stateMutability": "nonpayable"}
            ],
            "bytecode": "0x6080604052",
            "deployedBytecode": "0x6080",
            "linkReferences": {},
            "deployedLinkReferences": {}
        }"#;

        let artifact =
            Artifact::from_hardhat_json(name("contracts/Factory.sol:HigherFactory"), json).unwrap();
        assert_eq!(artifact.constructor_arity(), 1);
        assert_eq!(artifact.bytecode().as_ref(), &[0x60, 0x80, 0x60, 0x40, 0x52]);
    }

    #[test]
    fn test_unlinked_artifact_is_rejected() {
        let json = r#"{
            "abi": [],
            "bytecode": "0x6080__$a1b2c3$__6080",
            "linkReferences": {"contracts/Lib.sol": {"Lib": [{"length": 20, "start": 2}]}}
        }"#;

        let err = Artifact::from_hardhat_json(name("contracts/A.sol:A"), json).unwrap_err();
        assert!(err.to_string().contains("unlinked library"));
    }

    #[test]
    fn test_store_loads_from_disk_and_build_info() {
        let tmp = TempDir::new("launchpad-artifacts").unwrap();
        let root = tmp.path();
        let dir = root.join("contracts/Router.sol");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::create_dir_all(root.join("build-info")).unwrap();

        std::fs::write(
            dir.join("HigherRouter.json"),
            r#"{"abi": [], "bytecode": "0x00", "linkReferences": {}}"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("HigherRouter.dbg.json"),
            r#"{"_format": "hh-sol-dbg-1", "buildInfo": "../../build-info/abc.json"}"#,
        )
        .unwrap();
        std::fs::write(
            root.join("build-info/abc.json"),
            r#"{"solcVersion": "0.8.20", "solcLongVersion": "0.8.20+commit.a1b79de6", "input": {"language": "Solidity"}}"#,
        )
        .unwrap();

        let router = name("contracts/Router.sol:HigherRouter");
        let mut store = ArtifactStore::new(root);
        assert!(store.get(&router).is_err());

        store.preload([&router]).unwrap();
        assert!(store.get(&router).unwrap().is_deployable());

        let info = store.build_info(&router).unwrap();
        assert_eq!(info.solc_long_version, "0.8.20+commit.a1b79de6");
        assert_eq!(info.input["language"], "Solidity");

        let missing = name("contracts/Missing.sol:Missing");
        assert!(store.load(&missing).is_err());
    }
}
