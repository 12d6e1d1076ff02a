//! Ezpay: blockchain bill payments with gasless settlement on Mantle.
//!
//! A merchant creates a bill (token, amount, receiver) on the Ezpay ledger and
//! shares its id; a payer settles it either directly or by signing an
//! authorization that a sponsor relays on-chain, paying the gas.
//!
//! # Layers
//!
//! - [`ledger`]: the bill state machine (`NonExistent → Open → Paid`), nonces,
//!   token accounting and events, as an atomic in-process ledger
//! - [`authorization`] / [`permit`]: EIP-712 and raw-hash authorization codecs
//!   with fail-closed signer recovery
//! - [`chain`]: the [`LedgerClient`] seam with [`RpcLedger`] (JSON-RPC via
//!   alloy) and [`LocalLedger`] (in-process) implementations
//! - [`relay`]: the sponsor service, which validates requests and submits with its own
//!   identity before waiting for receipts
//!
//! # Quick example (signing a gasless payment)
//!
//! ```no_run
//! use alloy::primitives::{address, B256, U256};
//! use alloy::signers::local::PrivateKeySigner;
//! use ezpay::authorization::{sign_authorization, SignatureScheme};
//! use ezpay::{Authorization, MANTLE_SEPOLIA_CHAIN_ID};
//!
//! let payer: PrivateKeySigner = "0xYOUR_KEY".parse().unwrap();
//! let contract = address!("407faeC3bFF9192Ef9a48444b8E1155950fD4c5C");
//! let message = Authorization {
//!     billId: B256::repeat_byte(0x11),
//!     nonce: U256::ZERO,
//!     chainId: U256::from(MANTLE_SEPOLIA_CHAIN_ID),
//!     contractAddress: contract,
//! };
//! let signed = sign_authorization(&payer, &message, SignatureScheme::TypedData).unwrap();
//! ```

pub mod constants;
pub mod error;
pub mod payment;
pub mod response;

pub mod authorization;
pub mod bill;
pub mod erc20;
pub mod permit;

pub mod chain;
pub mod ledger;
pub mod relay;
pub mod security;

use alloy::sol;

// EIP-712 messages. The sol! macro derives SolStruct, which provides
// eip712_signing_hash(); the field order is the encoded order.
sol! {
    /// Signed by a payer to let a sponsor settle one bill on their behalf.
    #[derive(Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    struct Authorization {
        bytes32 billId;
        uint256 nonce;
        uint256 chainId;
        address contractAddress;
    }

    /// Signed by a receiver: a reusable link that lets anyone pay them any amount.
    #[derive(Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    struct PayAuthorization {
        address receiver;
        address token;
        uint256 chainId;
        address contractAddress;
    }

    /// Signed by a receiver to let a sponsor open a bill in their name.
    #[derive(Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    struct CreateAuthorization {
        address receiver;
        bytes32 billId;
        address token;
        uint256 amount;
        uint256 nonce;
        uint256 chainId;
        address contractAddress;
    }

    /// EIP-2612 allowance-by-signature message.
    #[derive(Debug, PartialEq, Eq)]
    struct Permit {
        address owner;
        address spender;
        uint256 value;
        uint256 nonce;
        uint256 deadline;
    }
}

// Ezpay contract ABI. Calldata structs carry the signature next to the signed fields.
sol! {
    #[sol(rpc, all_derives)]
    interface IEzpay {
        struct Bill {
            address receiver;
            address token;
            uint256 amount;
            bool paid;
            uint256 createdAt;
            uint256 paidAt;
            address payer;
        }

        struct Authorization {
            address authorizer;
            bytes32 billId;
            uint256 nonce;
            uint256 chainId;
            address contractAddress;
            bytes signature;
        }

        struct PayAuthorization {
            address receiver;
            address token;
            uint256 chainId;
            address contractAddress;
            bytes signature;
        }

        struct CreateAuthorization {
            address receiver;
            bytes32 billId;
            address token;
            uint256 amount;
            uint256 nonce;
            uint256 chainId;
            address contractAddress;
            bytes signature;
        }

        struct PermitData {
            address owner;
            address token;
            uint256 value;
            uint256 deadline;
            uint8 v;
            bytes32 r;
            bytes32 s;
        }

        event BillCreated(bytes32 indexed billId, address indexed receiver, address indexed token, uint256 amount, uint256 timestamp);
        event BillPaid(bytes32 indexed billId, address indexed payer, address indexed receiver, address token, uint256 amount, uint256 timestamp);
        event DynamicPayment(address indexed payer, address indexed receiver, address indexed token, uint256 amount, uint256 timestamp);

        error InvalidAmount();
        error BillAlreadyExists();
        error BillNotFound();
        error BillAlreadyPaid();
        error InsufficientBalance();
        error TransferFailed();
        error InvalidAuthorization();
        error InvalidNonce();
        error InvalidPermit();
        error PermitExpired();
        error ReentrancyGuardReentrantCall();

        function createBill(bytes32 billId, address token, uint256 amount) external;
        function createBillWithAuthorization(CreateAuthorization calldata authorization) external;
        function payBill(bytes32 billId) external payable;
        function payBillWithAuthorization(Authorization calldata authorization) external payable;
        function payDynamicETH(PayAuthorization calldata auth) external payable;
        function payDynamicERC20WithPermit(PayAuthorization calldata auth, PermitData calldata permit) external;

        function getBill(bytes32 billId) external view returns (Bill memory);
        function bills(bytes32 billId) external view returns (address receiver, address token, uint256 amount, bool paid, uint256 createdAt, uint256 paidAt, address payer);
        function billStatus(bytes32 billId) external view returns (bool exists, bool isPaid);
        function getUserBills(address user) external view returns (bytes32[] memory);
        function userBills(address user, uint256 index) external view returns (bytes32);
        function getNonce(address user) external view returns (uint256);
        function nonces(address user) external view returns (uint256);
        function generateBillId(address user, uint256 nonce) external view returns (bytes32);
        function totalBills() external view returns (uint256);
        function totalPaidBills() external view returns (uint256);
    }
}

// ERC-20 surface used for allowance checks and the approve tool.
sol! {
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 value) external returns (bool);
    }
}

// Re-exports
pub use constants::*;
pub use error::EzpayError;
pub use payment::*;
pub use response::*;

pub use authorization::{SignatureScheme, SignedAuthorization};
pub use bill::{Bill, BillStatus};
pub use chain::{LedgerCall, LedgerClient, LocalLedger, RpcLedger, TxReceipt};
pub use ledger::{BillLedger, CallContext, LedgerEvent, NativeReceiver};
pub use relay::{RelayIdentity, RelayService};
