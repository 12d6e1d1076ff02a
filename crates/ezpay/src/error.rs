use std::time::Duration;

use alloy::primitives::{Address, U256};
use thiserror::Error;

use crate::IEzpay::IEzpayErrors;

/// Errors returned by the ledger, the codecs and the relay.
///
/// The first group mirrors the Ezpay contract's custom errors and aborts a
/// ledger call atomically. The second group is raised by the relay before any
/// transaction is submitted, or by the chain plumbing after submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EzpayError {
    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("bill already exists")]
    BillAlreadyExists,

    #[error("bill not found")]
    BillNotFound,

    #[error("bill already paid")]
    BillAlreadyPaid,

    #[error("attached value does not match the amount due")]
    InsufficientBalance,

    #[error("token transfer failed")]
    TransferFailed,

    #[error("invalid authorization: {0}")]
    InvalidAuthorization(String),

    #[error("authorization nonce does not match the current nonce")]
    InvalidNonce,

    #[error("invalid permit: {0}")]
    InvalidPermit(String),

    #[error("permit deadline has passed")]
    PermitExpired,

    #[error("reentrant call rejected")]
    ReentrancyGuardReentrantCall,

    #[error("{0}")]
    Validation(String),

    #[error("unsupported chain: {0}")]
    UnsupportedChain(String),

    #[error("Gasless payment not supported for the native asset. Please use standard payment.")]
    UnsupportedForNativeAsset,

    #[error("insufficient allowance: {spender} may spend {current} of {token}, {required} required")]
    InsufficientAllowance {
        token: Address,
        spender: Address,
        required: U256,
        current: U256,
    },

    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    #[error("timed out after {0:?} waiting for the transaction receipt")]
    Timeout(Duration),

    #[error("chain error: {0}")]
    Chain(String),

    #[error("config error: {0}")]
    Config(String),
}

impl EzpayError {
    /// Stable machine-readable kind, distinct from the human-readable message.
    pub fn code(&self) -> &'static str {
        match self {
            EzpayError::InvalidAmount => "InvalidAmount",
            EzpayError::BillAlreadyExists => "BillAlreadyExists",
            EzpayError::BillNotFound => "BillNotFound",
            EzpayError::BillAlreadyPaid => "BillAlreadyPaid",
            EzpayError::InsufficientBalance => "InsufficientBalance",
            EzpayError::TransferFailed => "TransferFailed",
            EzpayError::InvalidAuthorization(_) => "InvalidAuthorization",
            EzpayError::InvalidNonce => "InvalidNonce",
            EzpayError::InvalidPermit(_) => "InvalidPermit",
            EzpayError::PermitExpired => "PermitExpired",
            EzpayError::ReentrancyGuardReentrantCall => "ReentrancyGuardReentrantCall",
            EzpayError::Validation(_) => "ValidationError",
            EzpayError::UnsupportedChain(_) => "UnsupportedChain",
            EzpayError::UnsupportedForNativeAsset => "UnsupportedForNativeAsset",
            EzpayError::InsufficientAllowance { .. } => "InsufficientAllowance",
            EzpayError::TransactionFailed(_) => "TransactionFailed",
            EzpayError::Timeout(_) => "Timeout",
            EzpayError::Chain(_) => "ChainError",
            EzpayError::Config(_) => "ConfigError",
        }
    }

    /// True for errors the contract itself raises (a revert), as opposed to
    /// relay-side preconditions and transport failures.
    pub fn is_ledger_error(&self) -> bool {
        matches!(
            self,
            EzpayError::InvalidAmount
                | EzpayError::BillAlreadyExists
                | EzpayError::BillNotFound
                | EzpayError::BillAlreadyPaid
                | EzpayError::InsufficientBalance
                | EzpayError::TransferFailed
                | EzpayError::InvalidAuthorization(_)
                | EzpayError::InvalidNonce
                | EzpayError::InvalidPermit(_)
                | EzpayError::PermitExpired
                | EzpayError::ReentrancyGuardReentrantCall
        )
    }
}

impl From<IEzpayErrors> for EzpayError {
    fn from(e: IEzpayErrors) -> Self {
        match e {
            IEzpayErrors::InvalidAmount(_) => EzpayError::InvalidAmount,
            IEzpayErrors::BillAlreadyExists(_) => EzpayError::BillAlreadyExists,
            IEzpayErrors::BillNotFound(_) => EzpayError::BillNotFound,
            IEzpayErrors::BillAlreadyPaid(_) => EzpayError::BillAlreadyPaid,
            IEzpayErrors::InsufficientBalance(_) => EzpayError::InsufficientBalance,
            IEzpayErrors::TransferFailed(_) => EzpayError::TransferFailed,
            IEzpayErrors::InvalidAuthorization(_) => {
                EzpayError::InvalidAuthorization("rejected by contract".to_string())
            }
            IEzpayErrors::InvalidNonce(_) => EzpayError::InvalidNonce,
            IEzpayErrors::InvalidPermit(_) => {
                EzpayError::InvalidPermit("rejected by contract".to_string())
            }
            IEzpayErrors::PermitExpired(_) => EzpayError::PermitExpired,
            IEzpayErrors::ReentrancyGuardReentrantCall(_) => {
                EzpayError::ReentrancyGuardReentrantCall
            }
        }
    }
}
