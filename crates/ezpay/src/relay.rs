//! Sponsor service: validates gasless requests off-chain, then submits the
//! ledger call from the relay's own funded identity.
//!
//! Every precondition that can be checked with a read is checked before any
//! transaction is sent, so rejected requests never cost gas. Failed
//! submissions are reported as-is and never retried.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::authorization::AuthorizationMessage;
use crate::chain::{LedgerCall, LedgerClient, TxReceipt};
use crate::constants::{DEFAULT_RECEIPT_TIMEOUT_SECS, NATIVE_TOKEN};
use crate::payment::{
    ApproveCheckRequest, DynamicPaymentRequest, GaslessCreateRequest, GaslessPaymentRequest,
    RequiredFields,
};
use crate::response::{ApprovalInstructions, ApproveCheckResponse, TxResponse};
use crate::EzpayError;

/// Parse a hex private key. Surrounding whitespace is trimmed and a missing
/// `0x` prefix is added; the result must be 66 characters.
pub fn parse_private_key(raw: &str) -> Result<PrivateKeySigner, EzpayError> {
    let trimmed = raw.trim();
    let key = if trimmed.starts_with("0x") {
        trimmed.to_string()
    } else {
        format!("0x{trimmed}")
    };
    if key.len() != 66 {
        return Err(EzpayError::Config(format!(
            "invalid private key length: expected 66 characters, got {}",
            key.len()
        )));
    }
    key.parse()
        .map_err(|_| EzpayError::Config("invalid private key".to_string()))
}

/// The sponsor's signing key. Built once at startup and shared; never
/// serialized, and redacted from `Debug`.
pub struct RelayIdentity {
    signer: PrivateKeySigner,
}

impl RelayIdentity {
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }

    pub fn from_private_key(raw: &str) -> Result<Self, EzpayError> {
        parse_private_key(raw).map(Self::new)
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn wallet(&self) -> EthereumWallet {
        EthereumWallet::from(self.signer.clone())
    }
}

impl std::fmt::Debug for RelayIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayIdentity")
            .field("address", &self.address())
            .field("signer", &"<redacted>")
            .finish()
    }
}

/// Relays gasless requests to the ledgers it is configured for, keyed by chain id.
pub struct RelayService<L> {
    identity: Arc<RelayIdentity>,
    ledgers: HashMap<u64, L>,
    receipt_timeout: Duration,
    /// Per-chain lock held from simulation through broadcast, so the sponsor's
    /// transactions get consecutive account nonces.
    submit_locks: DashMap<u64, Arc<Mutex<()>>>,
}

impl<L: LedgerClient> RelayService<L> {
    pub fn new(identity: Arc<RelayIdentity>) -> Self {
        Self {
            identity,
            ledgers: HashMap::new(),
            receipt_timeout: Duration::from_secs(DEFAULT_RECEIPT_TIMEOUT_SECS),
            submit_locks: DashMap::new(),
        }
    }

    /// Serve `ledger`'s chain. Replaces any ledger already registered for it.
    pub fn with_ledger(mut self, ledger: L) -> Self {
        if ledger.sender() != self.identity.address() {
            tracing::warn!(
                chain_id = ledger.chain_id(),
                sender = %ledger.sender(),
                sponsor = %self.identity.address(),
                "ledger submits from an address other than the relay identity"
            );
        }
        self.ledgers.insert(ledger.chain_id(), ledger);
        self
    }

    pub fn with_receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }

    pub fn identity(&self) -> &RelayIdentity {
        &self.identity
    }

    pub fn sponsor_address(&self) -> Address {
        self.identity.address()
    }

    pub fn receipt_timeout(&self) -> Duration {
        self.receipt_timeout
    }

    /// `(chain_id, contract)` pairs this relay will submit to, by chain id.
    pub fn supported(&self) -> Vec<(u64, Address)> {
        let mut out: Vec<_> = self
            .ledgers
            .values()
            .map(|l| (l.chain_id(), l.contract_address()))
            .collect();
        out.sort_unstable_by_key(|(chain_id, _)| *chain_id);
        out
    }

    pub fn ledger(&self, chain_id: u64) -> Option<&L> {
        self.ledgers.get(&chain_id)
    }

    /// Latest block per chain, for health reporting.
    pub async fn block_numbers(&self) -> Vec<(u64, Result<u64, EzpayError>)> {
        let mut out = Vec::with_capacity(self.ledgers.len());
        for (chain_id, _) in self.supported() {
            if let Some(ledger) = self.ledgers.get(&chain_id) {
                out.push((chain_id, ledger.block_number().await));
            }
        }
        out
    }

    fn resolve(&self, chain_id: u64, contract: Address) -> Result<&L, EzpayError> {
        let ledger = self
            .ledgers
            .get(&chain_id)
            .ok_or_else(|| EzpayError::UnsupportedChain(format!("chain id {chain_id}")))?;
        if ledger.contract_address() != contract {
            return Err(EzpayError::UnsupportedChain(format!(
                "contract {contract} is not served on chain {chain_id}"
            )));
        }
        Ok(ledger)
    }

    fn submit_lock(&self, chain_id: u64) -> Arc<Mutex<()>> {
        self.submit_locks
            .entry(chain_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Simulate, broadcast and wait for `call`. The submit lock is released
    /// before waiting, so receipts are awaited concurrently.
    async fn submit_and_confirm(&self, ledger: &L, call: LedgerCall) -> Result<TxReceipt, EzpayError> {
        let tx_hash = {
            let lock = self.submit_lock(ledger.chain_id());
            let _guard = lock.lock().await;
            ledger.simulate(&call).await?;
            ledger.submit(&call).await?
        };

        tracing::info!(
            chain_id = ledger.chain_id(),
            call = call.name(),
            tx = %tx_hash,
            "transaction submitted"
        );

        let receipt = match ledger.wait_for_receipt(tx_hash, self.receipt_timeout).await {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::warn!(
                    tx = %tx_hash,
                    error = %e,
                    "no receipt; the transaction may still be mined"
                );
                return Err(e);
            }
        };

        if !receipt.success {
            tracing::error!(tx = %tx_hash, block = receipt.block_number, "transaction reverted");
            return Err(EzpayError::TransactionFailed(format!(
                "{} reverted in tx {tx_hash}",
                call.name()
            )));
        }

        Ok(receipt)
    }

    fn check_binding<M: AuthorizationMessage>(
        msg: &M,
        chain_id: u64,
        contract: Address,
    ) -> Result<(), EzpayError> {
        if msg.chain_id() != U256::from(chain_id) || msg.contract_address() != contract {
            return Err(EzpayError::InvalidAuthorization(
                "authorization is bound to another deployment".to_string(),
            ));
        }
        Ok(())
    }

    /// Settle a bill for a payer who signed an [`Authorization`](crate::Authorization).
    pub async fn gasless_payment(&self, req: GaslessPaymentRequest) -> Result<TxResponse, EzpayError> {
        let mut fields = RequiredFields::default();
        let bill_id = fields.take("billId", req.bill_id);
        let contract = fields.take("contractAddress", req.contract_address);
        let chain_id = fields.take("chainId", req.chain_id);
        let auth = fields.take("authorization", req.authorization);
        fields.finish()?;
        let (Some(bill_id), Some(contract), Some(chain_id), Some(auth)) =
            (bill_id, contract, chain_id, auth)
        else {
            return Err(EzpayError::Validation("Missing required fields".to_string()));
        };

        let ledger = self.resolve(chain_id, contract)?;

        let bill = ledger.get_bill(bill_id).await?;
        if !bill.exists() {
            return Err(EzpayError::BillNotFound);
        }
        if bill.paid {
            return Err(EzpayError::BillAlreadyPaid);
        }
        if bill.is_native() {
            return Err(EzpayError::UnsupportedForNativeAsset);
        }

        let msg = auth.message();
        if msg.billId != bill_id {
            return Err(EzpayError::InvalidAuthorization(
                "authorization is for another bill".to_string(),
            ));
        }
        Self::check_binding(&msg, chain_id, contract)?;
        auth.verify(auth.authorizer)?;

        let nonce = ledger.get_nonce(auth.authorizer).await?;
        if msg.nonce != nonce {
            tracing::info!(
                payer = %auth.authorizer,
                expected = %nonce,
                got = %msg.nonce,
                "payment rejected: stale nonce"
            );
            return Err(EzpayError::InvalidNonce);
        }

        let current = ledger.allowance(bill.token, auth.authorizer, contract).await?;
        if current < bill.amount {
            tracing::info!(
                payer = %auth.authorizer,
                allowance = %current,
                required = %bill.amount,
                "payment rejected: insufficient allowance"
            );
            return Err(EzpayError::InsufficientAllowance {
                token: bill.token,
                spender: contract,
                required: bill.amount,
                current,
            });
        }

        let receipt = self
            .submit_and_confirm(ledger, LedgerCall::PayBillWithAuthorization(auth.to_call()))
            .await?;

        tracing::info!(
            bill_id = %bill_id,
            payer = %auth.authorizer,
            amount = %bill.amount,
            tx = %receipt.tx_hash,
            "gasless payment settled"
        );

        Ok(TxResponse {
            success: true,
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
            bill_id: Some(bill_id),
        })
    }

    /// Open a bill on a client's behalf.
    ///
    /// Without an `authorization` the relay calls `createBill` itself, so the
    /// sponsor becomes the bill's receiver; a `receiver` naming anyone else is
    /// refused. With one, the receiver's signed
    /// [`CreateAuthorization`](crate::CreateAuthorization) is relayed, which
    /// only deployments exposing `createBillWithAuthorization` accept.
    pub async fn gasless_create(&self, req: GaslessCreateRequest) -> Result<TxResponse, EzpayError> {
        let mut fields = RequiredFields::default();
        let bill_id = fields.take("billId", req.bill_id);
        let token = fields.take("token", req.token);
        let amount = fields.take("amount", req.amount);
        let contract = fields.take("contractAddress", req.contract_address);
        let chain_id = fields.take("chainId", req.chain_id);
        fields.finish()?;
        let (Some(bill_id), Some(token), Some(amount), Some(contract), Some(chain_id)) =
            (bill_id, token, amount, contract, chain_id)
        else {
            return Err(EzpayError::Validation("Missing required fields".to_string()));
        };

        let ledger = self.resolve(chain_id, contract)?;

        if amount.is_zero() {
            return Err(EzpayError::InvalidAmount);
        }
        if ledger.get_bill(bill_id).await?.exists() {
            return Err(EzpayError::BillAlreadyExists);
        }

        let (receiver, call) = match req.authorization {
            None => {
                let sponsor = self.sponsor_address();
                if req.receiver.is_some_and(|r| r != sponsor) {
                    return Err(EzpayError::Validation(
                        "a receiver other than the sponsor requires a signed authorization"
                            .to_string(),
                    ));
                }
                let call = LedgerCall::CreateBill {
                    bill_id,
                    token,
                    amount,
                };
                (sponsor, call)
            }
            Some(auth) => {
                if !ledger.supports_authorized_create() {
                    return Err(EzpayError::Validation(format!(
                        "contract {contract} does not accept signed bill creation"
                    )));
                }
                let receiver = req.receiver.unwrap_or(auth.receiver);
                if receiver == self.sponsor_address() {
                    return Err(EzpayError::Validation(
                        "receiver cannot be the sponsor".to_string(),
                    ));
                }

                let msg = auth.message();
                if msg.receiver != receiver
                    || msg.billId != bill_id
                    || msg.token != token
                    || msg.amount != amount
                {
                    return Err(EzpayError::InvalidAuthorization(
                        "authorization does not match the requested bill".to_string(),
                    ));
                }
                Self::check_binding(&msg, chain_id, contract)?;
                auth.verify(receiver)?;

                if ledger.get_nonce(receiver).await? != msg.nonce {
                    return Err(EzpayError::InvalidNonce);
                }
                (receiver, LedgerCall::CreateBillWithAuthorization(auth.to_call()))
            }
        };

        let receipt = self.submit_and_confirm(ledger, call).await?;

        tracing::info!(
            bill_id = %bill_id,
            receiver = %receiver,
            amount = %amount,
            tx = %receipt.tx_hash,
            "gasless bill created"
        );

        Ok(TxResponse {
            success: true,
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
            bill_id: Some(bill_id),
        })
    }

    /// Report whether `userAddress` has approved the contract for `amount`,
    /// with approval instructions when it has not. Sends nothing.
    pub async fn check_approval(
        &self,
        req: ApproveCheckRequest,
    ) -> Result<ApproveCheckResponse, EzpayError> {
        let mut fields = RequiredFields::default();
        let token = fields.take("tokenAddress", req.token_address);
        let amount = fields.take("amount", req.amount);
        let user = fields.take("userAddress", req.user_address);
        let contract = fields.take("contractAddress", req.contract_address);
        let chain_id = fields.take("chainId", req.chain_id);
        fields.finish()?;
        let (Some(token), Some(amount), Some(user), Some(contract), Some(chain_id)) =
            (token, amount, user, contract, chain_id)
        else {
            return Err(EzpayError::Validation("Missing required fields".to_string()));
        };

        let ledger = self.resolve(chain_id, contract)?;
        if token == NATIVE_TOKEN {
            return Err(EzpayError::UnsupportedForNativeAsset);
        }

        let current = ledger.allowance(token, user, contract).await?;
        tracing::debug!(user = %user, allowance = %current, required = %amount, "allowance checked");

        if current >= amount {
            Ok(ApproveCheckResponse::sufficient(current))
        } else {
            Ok(ApproveCheckResponse::approval_required(
                ApprovalInstructions::approve(token, contract, amount, current),
            ))
        }
    }

    /// Pay a receiver's link with the payer's EIP-2612 permit.
    pub async fn dynamic_payment(&self, req: DynamicPaymentRequest) -> Result<TxResponse, EzpayError> {
        let mut fields = RequiredFields::default();
        let auth = fields.take("auth", req.auth);
        let permit = fields.take("permit", req.permit);
        fields.finish()?;
        let (Some(auth), Some(permit)) = (auth, permit) else {
            return Err(EzpayError::Validation("Missing required fields".to_string()));
        };

        let ledger = self.resolve(auth.chain_id, auth.contract_address)?;

        if permit.token == NATIVE_TOKEN || auth.token == NATIVE_TOKEN {
            return Err(EzpayError::UnsupportedForNativeAsset);
        }
        if permit.token != auth.token {
            return Err(EzpayError::InvalidPermit(
                "permit token does not match the link".to_string(),
            ));
        }
        if permit.value.is_zero() {
            return Err(EzpayError::InvalidAmount);
        }
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| EzpayError::Config(format!("system time error: {e}")))?
            .as_secs();
        if permit.deadline <= U256::from(now) {
            return Err(EzpayError::PermitExpired);
        }

        auth.verify(auth.receiver)?;

        let call = LedgerCall::PayDynamicErc20WithPermit {
            auth: auth.to_call(),
            permit: permit.to_call(),
        };
        let receipt = self.submit_and_confirm(ledger, call).await?;

        tracing::info!(
            receiver = %auth.receiver,
            payer = %permit.owner,
            amount = %permit.value,
            tx = %receipt.tx_hash,
            "dynamic payment settled"
        );

        Ok(TxResponse {
            success: true,
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
            bill_id: None,
        })
    }
}
