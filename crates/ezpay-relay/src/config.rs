//! Relay configuration, read once from the environment at startup.

use std::time::Duration;

use alloy::primitives::Address;
use ezpay::constants::ChainConfig;
use ezpay::{EzpayError, RelayIdentity, DEFAULT_RECEIPT_TIMEOUT_SECS};

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_RATE_LIMIT_RPM: u64 = 60;

#[derive(Debug)]
pub struct RelayConfig {
    pub identity: RelayIdentity,
    /// Chains the relay submits to. Sepolia is always served; mainnet only
    /// when `EZPAY_CONTRACT_MAINNET` is set.
    pub chains: Vec<ChainConfig>,
    pub receipt_timeout: Duration,
    pub port: u16,
    pub rate_limit_rpm: u64,
    pub allowed_origins: Vec<String>,
    pub metrics_token: Option<Vec<u8>>,
    pub public_metrics: bool,
    /// The served contracts expose `createBillWithAuthorization`.
    pub authorized_create: bool,
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, EzpayError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, EzpayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let key = get("PK_SPONSOR").ok_or_else(|| {
            EzpayError::Config("PK_SPONSOR environment variable is required".to_string())
        })?;
        let identity = RelayIdentity::from_private_key(&key)?;

        let mut sepolia = ChainConfig::mantle_sepolia(match get("EZPAY_CONTRACT_SEPOLIA") {
            Some(s) => parse_address("EZPAY_CONTRACT_SEPOLIA", &s)?,
            None => ezpay::EZPAY_SEPOLIA_CONTRACT,
        });
        if let Some(rpc) = get("MANTLE_SEPOLIA_RPC_URL") {
            sepolia.rpc_url = parse_rpc_url("MANTLE_SEPOLIA_RPC_URL", &rpc)?;
        }
        let mut chains = vec![sepolia];

        if let Some(contract) = get("EZPAY_CONTRACT_MAINNET") {
            let mut mainnet =
                ChainConfig::mantle_mainnet(parse_address("EZPAY_CONTRACT_MAINNET", &contract)?);
            if let Some(rpc) = get("MANTLE_RPC_URL") {
                mainnet.rpc_url = parse_rpc_url("MANTLE_RPC_URL", &rpc)?;
            }
            chains.push(mainnet);
        }

        let receipt_timeout = match get("RECEIPT_TIMEOUT_SECS") {
            Some(s) => match s.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(EzpayError::Config(format!(
                        "RECEIPT_TIMEOUT_SECS must be a positive integer, got {s:?}"
                    )))
                }
            },
            None => Duration::from_secs(DEFAULT_RECEIPT_TIMEOUT_SECS),
        };

        let port = get("RELAY_PORT")
            .or_else(|| get("PORT"))
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let rate_limit_rpm = get("RATE_LIMIT_RPM")
            .and_then(|r| r.trim().parse().ok())
            .filter(|r| *r > 0)
            .unwrap_or(DEFAULT_RATE_LIMIT_RPM);

        let allowed_origins = get("ALLOWED_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let metrics_token = get("METRICS_TOKEN").map(String::into_bytes);
        let public_metrics = get("EZPAY_PUBLIC_METRICS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        let authorized_create = get("EZPAY_AUTHORIZED_CREATE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Ok(Self {
            identity,
            chains,
            receipt_timeout,
            port,
            rate_limit_rpm,
            allowed_origins,
            metrics_token,
            public_metrics,
            authorized_create,
        })
    }
}

fn parse_address(var: &str, raw: &str) -> Result<Address, EzpayError> {
    raw.trim()
        .parse()
        .map_err(|e| EzpayError::Config(format!("{var} is not an address: {e}")))
}

fn parse_rpc_url(var: &str, raw: &str) -> Result<String, EzpayError> {
    let url = url::Url::parse(raw.trim())
        .map_err(|e| EzpayError::Config(format!("{var} is not a valid URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url.to_string()),
        other => Err(EzpayError::Config(format!(
            "{var} must use http or https, got {other}"
        ))),
    }
}
