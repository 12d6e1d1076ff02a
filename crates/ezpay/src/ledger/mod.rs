//! In-process Ezpay ledger.
//!
//! [`BillLedger`] reproduces the deployed contract's behavior: the same
//! operations, the same error kinds and the same events. Every state-changing
//! call runs against a snapshot and is rolled back on error, the way a reverted
//! transaction leaves no trace.

mod tokens;

pub use tokens::TokenBook;

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};

use crate::authorization::verify_any_scheme;
use crate::bill::{generate_bill_id, Bill};
use crate::constants::NATIVE_TOKEN;
use crate::permit::PermitSignature;
use crate::{Authorization, CreateAuthorization, EzpayError, IEzpay, PayAuthorization};

/// `msg.sender`, `msg.value` and `block.timestamp` for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    pub value: U256,
    pub timestamp: u64,
}

impl CallContext {
    pub fn new(caller: Address, timestamp: u64) -> Self {
        Self {
            caller,
            value: U256::ZERO,
            timestamp,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// Events emitted by successful calls, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    BillCreated(IEzpay::BillCreated),
    BillPaid(IEzpay::BillPaid),
    DynamicPayment(IEzpay::DynamicPayment),
}

/// Code run when native value lands on an address; an `Err` makes the
/// forwarding call fail.
pub trait NativeReceiver: Send + Sync {
    fn on_receive(
        &self,
        ledger: &mut BillLedger,
        from: Address,
        amount: U256,
    ) -> Result<(), EzpayError>;
}

#[derive(Debug, Clone, Default)]
struct LedgerState {
    bills: HashMap<B256, Bill>,
    nonces: HashMap<Address, U256>,
    user_bills: HashMap<Address, Vec<B256>>,
    total_bills: U256,
    total_paid_bills: U256,
    events: Vec<LedgerEvent>,
    tokens: TokenBook,
}

pub struct BillLedger {
    address: Address,
    chain_id: u64,
    state: LedgerState,
    entered: bool,
    receivers: HashMap<Address, Arc<dyn NativeReceiver>>,
}

impl std::fmt::Debug for BillLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BillLedger")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("bills", &self.state.bills.len())
            .finish_non_exhaustive()
    }
}

impl BillLedger {
    pub fn new(address: Address, chain_id: u64) -> Self {
        Self {
            address,
            chain_id,
            state: LedgerState::default(),
            entered: false,
            receivers: HashMap::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn tokens(&self) -> &TokenBook {
        &self.state.tokens
    }

    /// Direct access to balances for funding accounts and granting allowances.
    pub fn tokens_mut(&mut self) -> &mut TokenBook {
        &mut self.state.tokens
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.state.events
    }

    /// Install code at `account` that runs whenever it receives native value.
    pub fn set_native_receiver(&mut self, account: Address, hook: Arc<dyn NativeReceiver>) {
        self.receivers.insert(account, hook);
    }

    // ---- writes ----

    pub fn create_bill(
        &mut self,
        ctx: CallContext,
        bill_id: B256,
        token: Address,
        amount: U256,
    ) -> Result<(), EzpayError> {
        self.transact(|l| {
            l.reject_value(&ctx)?;
            l.open_bill(&ctx, bill_id, ctx.caller, token, amount)
        })
    }

    /// Relayed creation: the receiver is the signer, not the caller.
    pub fn create_bill_with_authorization(
        &mut self,
        ctx: CallContext,
        auth: &IEzpay::CreateAuthorization,
    ) -> Result<(), EzpayError> {
        self.transact(|l| {
            l.reject_value(&ctx)?;
            let msg = CreateAuthorization::from(auth);
            l.check_binding(msg.chainId, msg.contractAddress)?;
            verify_any_scheme(&msg, &auth.signature, auth.receiver)?;
            l.consume_nonce(auth.receiver, msg.nonce)?;
            l.open_bill(&ctx, msg.billId, auth.receiver, msg.token, msg.amount)
        })
    }

    pub fn pay_bill(&mut self, ctx: CallContext, bill_id: B256) -> Result<(), EzpayError> {
        self.guarded(|l| {
            l.take_value(&ctx)?;
            l.settle(&ctx, bill_id, ctx.caller)
        })
    }

    /// Pays `bill_id` on behalf of the authorizer. The authorizer is recorded
    /// and debited as payer; the caller only pays gas (and attaches the value
    /// for native bills).
    pub fn pay_bill_with_authorization(
        &mut self,
        ctx: CallContext,
        auth: &IEzpay::Authorization,
    ) -> Result<(), EzpayError> {
        self.guarded(|l| {
            let msg = Authorization::from(auth);
            l.check_binding(msg.chainId, msg.contractAddress)?;
            verify_any_scheme(&msg, &auth.signature, auth.authorizer)?;
            l.consume_nonce(auth.authorizer, msg.nonce)?;
            l.take_value(&ctx)?;
            l.settle(&ctx, msg.billId, auth.authorizer)
        })
    }

    /// Pays any attached native amount to the receiver of a signed link.
    pub fn pay_dynamic_eth(
        &mut self,
        ctx: CallContext,
        auth: &IEzpay::PayAuthorization,
    ) -> Result<(), EzpayError> {
        self.guarded(|l| {
            let msg = PayAuthorization::from(auth);
            l.check_binding(msg.chainId, msg.contractAddress)?;
            verify_any_scheme(&msg, &auth.signature, auth.receiver)?;
            if msg.token != NATIVE_TOKEN {
                return Err(EzpayError::InvalidAuthorization(
                    "link is not for the native asset".to_string(),
                ));
            }
            if ctx.value.is_zero() {
                return Err(EzpayError::InvalidAmount);
            }
            l.take_value(&ctx)?;
            l.send_native(msg.receiver, ctx.value)?;
            l.emit_dynamic(&ctx, ctx.caller, msg.receiver, NATIVE_TOKEN, ctx.value);
            Ok(())
        })
    }

    /// Applies the owner's permit, then pulls `permit.value` to the link's receiver.
    pub fn pay_dynamic_erc20_with_permit(
        &mut self,
        ctx: CallContext,
        auth: &IEzpay::PayAuthorization,
        permit: &IEzpay::PermitData,
    ) -> Result<(), EzpayError> {
        self.guarded(|l| {
            l.reject_value(&ctx)?;
            let msg = PayAuthorization::from(auth);
            l.check_binding(msg.chainId, msg.contractAddress)?;
            verify_any_scheme(&msg, &auth.signature, auth.receiver)?;
            if permit.token != msg.token {
                return Err(EzpayError::InvalidPermit(
                    "permit token does not match the link".to_string(),
                ));
            }
            if permit.token == NATIVE_TOKEN {
                return Err(EzpayError::InvalidPermit(
                    "native asset has no permit".to_string(),
                ));
            }
            if permit.deadline <= U256::from(ctx.timestamp) {
                return Err(EzpayError::PermitExpired);
            }
            if permit.value.is_zero() {
                return Err(EzpayError::InvalidAmount);
            }

            let signature = PermitSignature {
                v: permit.v,
                r: permit.r,
                s: permit.s,
            };
            let (contract, chain_id) = (l.address, U256::from(l.chain_id));
            l.state.tokens.permit(
                permit.token,
                permit.owner,
                contract,
                permit.value,
                permit.deadline,
                &signature,
                chain_id,
                ctx.timestamp,
            )?;
            l.state
                .tokens
                .transfer_from(permit.token, contract, permit.owner, msg.receiver, permit.value)
                .map_err(|_| EzpayError::TransferFailed)?;
            l.emit_dynamic(&ctx, permit.owner, msg.receiver, permit.token, permit.value);
            Ok(())
        })
    }

    // ---- reads ----

    /// Bill by id; a never-written id yields the zero bill.
    pub fn get_bill(&self, bill_id: B256) -> Bill {
        self.state.bills.get(&bill_id).cloned().unwrap_or_default()
    }

    /// Public-mapping accessor, identical to [`get_bill`](Self::get_bill).
    pub fn bills(&self, bill_id: B256) -> Bill {
        self.get_bill(bill_id)
    }

    /// `(exists, isPaid)`.
    pub fn bill_status(&self, bill_id: B256) -> (bool, bool) {
        let bill = self.get_bill(bill_id);
        (bill.exists(), bill.paid)
    }

    pub fn get_user_bills(&self, user: Address) -> Vec<B256> {
        self.state.user_bills.get(&user).cloned().unwrap_or_default()
    }

    /// One entry of a creator's bill index; `None` past the end.
    pub fn user_bills(&self, user: Address, index: usize) -> Option<B256> {
        self.state.user_bills.get(&user)?.get(index).copied()
    }

    pub fn get_nonce(&self, user: Address) -> U256 {
        self.state.nonces.get(&user).copied().unwrap_or_default()
    }

    pub fn nonces(&self, user: Address) -> U256 {
        self.get_nonce(user)
    }

    pub fn generate_bill_id(&self, user: Address, nonce: U256) -> B256 {
        generate_bill_id(user, nonce, self.address)
    }

    pub fn total_bills(&self) -> U256 {
        self.state.total_bills
    }

    pub fn total_paid_bills(&self) -> U256 {
        self.state.total_paid_bills
    }

    /// Runs `f` and discards every state change it made, like `eth_call`.
    pub fn dry_run<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, EzpayError>,
    ) -> Result<T, EzpayError> {
        let snapshot = self.state.clone();
        let out = f(self);
        self.state = snapshot;
        out
    }

    // ---- internals ----

    fn transact<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, EzpayError>,
    ) -> Result<T, EzpayError> {
        let snapshot = self.state.clone();
        let out = f(self);
        if out.is_err() {
            self.state = snapshot;
        }
        out
    }

    fn guarded<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, EzpayError>,
    ) -> Result<T, EzpayError> {
        if self.entered {
            return Err(EzpayError::ReentrancyGuardReentrantCall);
        }
        self.entered = true;
        let out = self.transact(f);
        self.entered = false;
        out
    }

    fn check_binding(&self, chain_id: U256, contract: Address) -> Result<(), EzpayError> {
        if chain_id != U256::from(self.chain_id) {
            return Err(EzpayError::InvalidAuthorization(
                "authorization is for another chain".to_string(),
            ));
        }
        if contract != self.address {
            return Err(EzpayError::InvalidAuthorization(
                "authorization is for another contract".to_string(),
            ));
        }
        Ok(())
    }

    fn consume_nonce(&mut self, user: Address, nonce: U256) -> Result<(), EzpayError> {
        let current = self.get_nonce(user);
        if nonce != current {
            return Err(EzpayError::InvalidNonce);
        }
        self.state.nonces.insert(user, current + U256::from(1u64));
        Ok(())
    }

    fn reject_value(&self, ctx: &CallContext) -> Result<(), EzpayError> {
        if !ctx.value.is_zero() {
            return Err(EzpayError::InsufficientBalance);
        }
        Ok(())
    }

    /// Moves `msg.value` from the caller into the contract.
    fn take_value(&mut self, ctx: &CallContext) -> Result<(), EzpayError> {
        if ctx.value.is_zero() {
            return Ok(());
        }
        self.state
            .tokens
            .transfer_native(ctx.caller, self.address, ctx.value)
    }

    /// Forwards native value out of the contract, running any receiver hook.
    fn send_native(&mut self, to: Address, amount: U256) -> Result<(), EzpayError> {
        let from = self.address;
        self.state
            .tokens
            .transfer_native(from, to, amount)
            .map_err(|_| EzpayError::TransferFailed)?;
        if let Some(hook) = self.receivers.get(&to).cloned() {
            hook.on_receive(self, from, amount).map_err(|e| {
                tracing::debug!(receiver = %to, error = %e, "native receiver rejected transfer");
                EzpayError::TransferFailed
            })?;
        }
        Ok(())
    }

    fn open_bill(
        &mut self,
        ctx: &CallContext,
        bill_id: B256,
        receiver: Address,
        token: Address,
        amount: U256,
    ) -> Result<(), EzpayError> {
        if self.get_bill(bill_id).exists() {
            return Err(EzpayError::BillAlreadyExists);
        }
        if amount.is_zero() {
            return Err(EzpayError::InvalidAmount);
        }

        let bill = Bill {
            receiver,
            token,
            amount,
            created_at: ctx.timestamp,
            ..Default::default()
        };
        self.state.bills.insert(bill_id, bill);
        self.state.user_bills.entry(receiver).or_default().push(bill_id);
        self.state.total_bills += U256::from(1u64);
        self.state
            .events
            .push(LedgerEvent::BillCreated(IEzpay::BillCreated {
                billId: bill_id,
                receiver,
                token,
                amount,
                timestamp: U256::from(ctx.timestamp),
            }));

        tracing::debug!(bill_id = %bill_id, receiver = %receiver, amount = %amount, "bill created");
        Ok(())
    }

    fn settle(&mut self, ctx: &CallContext, bill_id: B256, payer: Address) -> Result<(), EzpayError> {
        let bill = self.get_bill(bill_id);
        if !bill.exists() {
            return Err(EzpayError::BillNotFound);
        }
        if bill.paid {
            return Err(EzpayError::BillAlreadyPaid);
        }

        if bill.is_native() {
            if ctx.value != bill.amount {
                return Err(EzpayError::InsufficientBalance);
            }
            self.send_native(bill.receiver, bill.amount)?;
        } else {
            if !ctx.value.is_zero() {
                return Err(EzpayError::InsufficientBalance);
            }
            let contract = self.address;
            self.state
                .tokens
                .transfer_from(bill.token, contract, payer, bill.receiver, bill.amount)
                .map_err(|_| EzpayError::TransferFailed)?;
        }

        // The receiver hook may have touched state; re-read before marking paid.
        let stored = self
            .state
            .bills
            .get_mut(&bill_id)
            .ok_or(EzpayError::BillNotFound)?;
        if stored.paid {
            return Err(EzpayError::BillAlreadyPaid);
        }
        stored.paid = true;
        stored.payer = payer;
        stored.paid_at = ctx.timestamp;
        self.state.total_paid_bills += U256::from(1u64);
        self.state.events.push(LedgerEvent::BillPaid(IEzpay::BillPaid {
            billId: bill_id,
            payer,
            receiver: bill.receiver,
            token: bill.token,
            amount: bill.amount,
            timestamp: U256::from(ctx.timestamp),
        }));

        tracing::debug!(bill_id = %bill_id, payer = %payer, "bill paid");
        Ok(())
    }

    fn emit_dynamic(
        &mut self,
        ctx: &CallContext,
        payer: Address,
        receiver: Address,
        token: Address,
        amount: U256,
    ) {
        self.state
            .events
            .push(LedgerEvent::DynamicPayment(IEzpay::DynamicPayment {
                payer,
                receiver,
                token,
                amount,
                timestamp: U256::from(ctx.timestamp),
            }));
    }
}
