use alloy::primitives::{address, Address};

/// Mantle mainnet chain ID.
pub const MANTLE_CHAIN_ID: u64 = 5000;

/// Mantle Sepolia testnet chain ID.
pub const MANTLE_SEPOLIA_CHAIN_ID: u64 = 5003;

/// Default RPC endpoint for Mantle mainnet.
pub const MANTLE_RPC_URL: &str = "https://rpc.mantle.xyz";

/// Default RPC endpoint for Mantle Sepolia.
pub const MANTLE_SEPOLIA_RPC_URL: &str = "https://rpc.sepolia.mantle.xyz";

/// Ezpay deployment on Mantle Sepolia.
pub const EZPAY_SEPOLIA_CONTRACT: Address = address!("407faeC3bFF9192Ef9a48444b8E1155950fD4c5C");

/// Reserved token address meaning "the chain's native asset" (MNT on Mantle).
pub const NATIVE_TOKEN: Address = Address::ZERO;

/// Mock USDC on Mantle Sepolia (6 decimals).
pub const SEPOLIA_USDC: Address = address!("C46ba842bAD10aAeB501667A80D39EE09BB62A7d");

/// Mock USDT on Mantle Sepolia (6 decimals).
pub const SEPOLIA_USDT: Address = address!("9c5C8F3ad18b8D1D32Ea803Aa09A6beA077e9471");

/// Mock WETH on Mantle Sepolia (18 decimals).
pub const SEPOLIA_WETH: Address = address!("AC8F7169CE823c86b3411dCD36576dA3f1B82710");

/// EIP-712 domain name used by the Ezpay contract.
pub const EIP712_DOMAIN_NAME: &str = "Ezpay";

/// EIP-712 domain version used by the Ezpay contract.
pub const EIP712_DOMAIN_VERSION: &str = "1";

/// How long the relay waits for a submitted transaction to be mined.
pub const DEFAULT_RECEIPT_TIMEOUT_SECS: u64 = 60;

/// Runtime description of one chain the relay can sponsor on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_url: String,
    pub explorer_base: String,
    pub native_symbol: String,
    /// Ezpay contract the relay is willing to submit to on this chain.
    pub contract_address: Address,
}

impl ChainConfig {
    pub fn mantle_sepolia(contract_address: Address) -> Self {
        Self {
            chain_id: MANTLE_SEPOLIA_CHAIN_ID,
            name: "Mantle Sepolia Testnet".to_string(),
            rpc_url: MANTLE_SEPOLIA_RPC_URL.to_string(),
            explorer_base: "https://explorer.sepolia.mantle.xyz".to_string(),
            native_symbol: "MNT".to_string(),
            contract_address,
        }
    }

    pub fn mantle_mainnet(contract_address: Address) -> Self {
        Self {
            chain_id: MANTLE_CHAIN_ID,
            name: "Mantle".to_string(),
            rpc_url: MANTLE_RPC_URL.to_string(),
            explorer_base: "https://explorer.mantle.xyz".to_string(),
            native_symbol: "MNT".to_string(),
            contract_address,
        }
    }

    /// Explorer link for a transaction hash.
    pub fn tx_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{tx_hash}", self.explorer_base)
    }
}

impl Default for ChainConfig {
    /// Defaults to the Mantle Sepolia deployment.
    fn default() -> Self {
        Self::mantle_sepolia(EZPAY_SEPOLIA_CONTRACT)
    }
}
