use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use alloy::primitives::{keccak256, Address, TxHash, B256, U256};
use dashmap::DashMap;
use tokio::sync::{Mutex, MutexGuard};

use super::{LedgerCall, LedgerClient, TxReceipt};
use crate::ledger::CallContext;
use crate::{Bill, BillLedger, EzpayError};

/// Receipts older than this many blocks are forgotten.
pub const RECEIPT_RETENTION_BLOCKS: u64 = 1024;

/// [`LedgerClient`] over an in-process [`BillLedger`].
///
/// Each submission is mined immediately into its own block; transactions are
/// serialized through one mutex, which stands in for block ordering. A
/// reverted call still produces a receipt, with `success == false`.
#[derive(Debug, Clone)]
pub struct LocalLedger {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    ledger: Mutex<BillLedger>,
    sender: Address,
    chain_id: u64,
    contract: Address,
    block: AtomicU64,
    receipts: DashMap<TxHash, TxReceipt>,
    withhold_receipts: AtomicBool,
    authorized_create: AtomicBool,
}

impl LocalLedger {
    /// Wrap `ledger`, submitting as `sender`.
    pub fn new(ledger: BillLedger, sender: Address) -> Self {
        let (chain_id, contract) = (ledger.chain_id(), ledger.address());
        Self {
            inner: Arc::new(Inner {
                ledger: Mutex::new(ledger),
                sender,
                chain_id,
                contract,
                block: AtomicU64::new(1),
                receipts: DashMap::new(),
                withhold_receipts: AtomicBool::new(false),
                authorized_create: AtomicBool::new(true),
            }),
        }
    }

    /// Exclusive access to the ledger, for seeding balances and inspecting state.
    pub async fn lock(&self) -> MutexGuard<'_, BillLedger> {
        self.inner.ledger.lock().await
    }

    /// Number of receipts still held.
    pub fn retained_receipts(&self) -> usize {
        self.inner.receipts.len()
    }

    /// While set, submitted transactions still execute but their receipts are
    /// never reported, so waiting on them times out.
    pub fn set_withhold_receipts(&self, withhold: bool) {
        self.inner.withhold_receipts.store(withhold, Ordering::SeqCst);
    }

    /// Mirror a deployment without `createBillWithAuthorization`: such calls
    /// are refused before they execute.
    pub fn set_authorized_create(&self, enabled: bool) {
        self.inner.authorized_create.store(enabled, Ordering::SeqCst);
    }

    fn ensure_callable(&self, call: &LedgerCall) -> Result<(), EzpayError> {
        if matches!(call, LedgerCall::CreateBillWithAuthorization(_))
            && !self.supports_authorized_create()
        {
            return Err(EzpayError::Validation(format!(
                "{} is not available on contract {}",
                call.name(),
                self.inner.contract
            )));
        }
        Ok(())
    }

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }

    fn execute(ledger: &mut BillLedger, ctx: CallContext, call: &LedgerCall) -> Result<(), EzpayError> {
        match call {
            LedgerCall::CreateBill {
                bill_id,
                token,
                amount,
            } => ledger.create_bill(ctx, *bill_id, *token, *amount),
            LedgerCall::PayBillWithAuthorization(auth) => {
                ledger.pay_bill_with_authorization(ctx, auth)
            }
            LedgerCall::CreateBillWithAuthorization(auth) => {
                ledger.create_bill_with_authorization(ctx, auth)
            }
            LedgerCall::PayDynamicErc20WithPermit { auth, permit } => {
                ledger.pay_dynamic_erc20_with_permit(ctx, auth, permit)
            }
        }
    }
}

impl LedgerClient for LocalLedger {
    fn chain_id(&self) -> u64 {
        self.inner.chain_id
    }

    fn contract_address(&self) -> Address {
        self.inner.contract
    }

    fn sender(&self) -> Address {
        self.inner.sender
    }

    fn supports_authorized_create(&self) -> bool {
        self.inner.authorized_create.load(Ordering::SeqCst)
    }

    async fn block_number(&self) -> Result<u64, EzpayError> {
        Ok(self.inner.block.load(Ordering::SeqCst))
    }

    async fn get_bill(&self, bill_id: B256) -> Result<Bill, EzpayError> {
        Ok(self.lock().await.get_bill(bill_id))
    }

    async fn get_nonce(&self, user: Address) -> Result<U256, EzpayError> {
        Ok(self.lock().await.get_nonce(user))
    }

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, EzpayError> {
        Ok(self.lock().await.tokens().allowance(token, owner, spender))
    }

    async fn simulate(&self, call: &LedgerCall) -> Result<(), EzpayError> {
        self.ensure_callable(call)?;
        let ctx = CallContext::new(self.inner.sender, Self::now());
        let mut ledger = self.lock().await;
        ledger.dry_run(|l| Self::execute(l, ctx, call))
    }

    async fn submit(&self, call: &LedgerCall) -> Result<TxHash, EzpayError> {
        self.ensure_callable(call)?;
        let ctx = CallContext::new(self.inner.sender, Self::now());
        let mut ledger = self.lock().await;
        let outcome = Self::execute(&mut ledger, ctx, call);

        let block_number = self.inner.block.fetch_add(1, Ordering::SeqCst) + 1;
        let tx_hash = keccak256(
            [
                self.inner.contract.as_slice(),
                &block_number.to_be_bytes(),
                call.name().as_bytes(),
            ]
            .concat(),
        );

        if let Err(e) = &outcome {
            tracing::debug!(tx = %tx_hash, call = call.name(), error = %e, "local transaction reverted");
        }

        self.inner.receipts.insert(
            tx_hash,
            TxReceipt {
                tx_hash,
                block_number,
                success: outcome.is_ok(),
            },
        );
        if let Some(horizon) = block_number.checked_sub(RECEIPT_RETENTION_BLOCKS) {
            self.inner
                .receipts
                .retain(|_, receipt| receipt.block_number > horizon);
        }
        Ok(tx_hash)
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
        timeout: Duration,
    ) -> Result<TxReceipt, EzpayError> {
        let poll = async {
            loop {
                if !self.inner.withhold_receipts.load(Ordering::SeqCst) {
                    if let Some(receipt) = self.inner.receipts.get(&tx_hash) {
                        break receipt.clone();
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| EzpayError::Timeout(timeout))
    }
}
