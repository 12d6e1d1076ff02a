//! The ledger seam the relay talks to.
//!
//! - [`LedgerClient`]: read bills and nonces, simulate and submit calls,
//!   wait for receipts
//! - [`RpcLedger`]: the deployed contract over JSON-RPC
//! - [`LocalLedger`]: an in-process [`BillLedger`](crate::BillLedger)

mod local;
mod rpc;

pub use local::LocalLedger;
pub use rpc::RpcLedger;

use std::time::Duration;

use alloy::primitives::{Address, TxHash, B256, U256};
use serde::Serialize;

use crate::{Bill, EzpayError, IEzpay};

/// A state-changing ledger call the relay submits from its own identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerCall {
    /// Opens a bill with the submitting identity as receiver.
    CreateBill {
        bill_id: B256,
        token: Address,
        amount: U256,
    },
    PayBillWithAuthorization(IEzpay::Authorization),
    CreateBillWithAuthorization(IEzpay::CreateAuthorization),
    PayDynamicErc20WithPermit {
        auth: IEzpay::PayAuthorization,
        permit: IEzpay::PermitData,
    },
}

impl LedgerCall {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerCall::CreateBill { .. } => "createBill",
            LedgerCall::PayBillWithAuthorization(_) => "payBillWithAuthorization",
            LedgerCall::CreateBillWithAuthorization(_) => "createBillWithAuthorization",
            LedgerCall::PayDynamicErc20WithPermit { .. } => "payDynamicERC20WithPermit",
        }
    }
}

/// Outcome of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub success: bool,
}

/// Access to one Ezpay deployment.
pub trait LedgerClient: Send + Sync {
    fn chain_id(&self) -> u64;

    fn contract_address(&self) -> Address;

    /// Identity that signs and pays for submitted transactions.
    fn sender(&self) -> Address;

    /// Whether the deployment exposes `createBillWithAuthorization`. When it
    /// does not, [`LedgerCall::CreateBillWithAuthorization`] is never sent.
    fn supports_authorized_create(&self) -> bool {
        false
    }

    fn block_number(&self) -> impl std::future::Future<Output = Result<u64, EzpayError>> + Send;

    fn get_bill(
        &self,
        bill_id: B256,
    ) -> impl std::future::Future<Output = Result<Bill, EzpayError>> + Send;

    fn get_nonce(
        &self,
        user: Address,
    ) -> impl std::future::Future<Output = Result<U256, EzpayError>> + Send;

    fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> impl std::future::Future<Output = Result<U256, EzpayError>> + Send;

    /// Dry-run `call` from [`sender`](Self::sender) against the latest state.
    /// A revert surfaces as the contract's error kind.
    fn simulate(
        &self,
        call: &LedgerCall,
    ) -> impl std::future::Future<Output = Result<(), EzpayError>> + Send;

    /// Sign and broadcast `call`, returning once the node accepted it.
    fn submit(
        &self,
        call: &LedgerCall,
    ) -> impl std::future::Future<Output = Result<TxHash, EzpayError>> + Send;

    /// Wait until `tx_hash` is mined. Elapsing `timeout` yields
    /// [`EzpayError::Timeout`]; the transaction may still land later.
    fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
        timeout: Duration,
    ) -> impl std::future::Future<Output = Result<TxReceipt, EzpayError>> + Send;
}
