use std::time::Duration;

use alloy::primitives::{Address, TxHash, B256, U256};
use alloy::providers::Provider;

use super::{LedgerCall, LedgerClient, TxReceipt};
use crate::{erc20, Bill, EzpayError, IEzpay};

/// Bound on `eth_sendRawTransaction` so a stuck RPC cannot hold the submit lock.
const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// The deployed Ezpay contract, reached through an alloy provider.
///
/// Writes go through the provider's wallet, so the provider must be built with
/// the sponsor signer attached (`ProviderBuilder::new().wallet(..)`).
#[derive(Debug, Clone)]
pub struct RpcLedger<P> {
    provider: P,
    chain_id: u64,
    contract: Address,
    sender: Address,
    poll_interval: Duration,
    authorized_create: bool,
}

impl<P> RpcLedger<P> {
    pub fn new(provider: P, chain_id: u64, contract: Address, sender: Address) -> Self {
        Self {
            provider,
            chain_id,
            contract,
            sender,
            poll_interval: Duration::from_secs(1),
            authorized_create: false,
        }
    }

    /// Declare that the contract at `contract` has `createBillWithAuthorization`.
    /// The released Ezpay contract does not.
    pub fn with_authorized_create(mut self, enabled: bool) -> Self {
        self.authorized_create = enabled;
        self
    }

    fn ensure_callable(&self, call: &LedgerCall) -> Result<(), EzpayError> {
        if matches!(call, LedgerCall::CreateBillWithAuthorization(_)) && !self.authorized_create {
            return Err(EzpayError::Validation(format!(
                "{} is not available on contract {}",
                call.name(),
                self.contract
            )));
        }
        Ok(())
    }

    /// How often to ask the node for a pending receipt.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

/// Map a contract call failure onto the contract's own error when the revert
/// data decodes, otherwise report it as a chain error.
fn contract_error(call: &str, e: alloy::contract::Error) -> EzpayError {
    match e.as_decoded_interface_error::<IEzpay::IEzpayErrors>() {
        Some(revert) => EzpayError::from(revert),
        None => EzpayError::Chain(format!("{call} failed: {e}")),
    }
}

impl<P> LedgerClient for RpcLedger<P>
where
    P: Provider + Send + Sync,
{
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn contract_address(&self) -> Address {
        self.contract
    }

    fn sender(&self) -> Address {
        self.sender
    }

    fn supports_authorized_create(&self) -> bool {
        self.authorized_create
    }

    async fn block_number(&self) -> Result<u64, EzpayError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| EzpayError::Chain(format!("block number failed: {e}")))
    }

    async fn get_bill(&self, bill_id: B256) -> Result<Bill, EzpayError> {
        let bill = IEzpay::new(self.contract, &self.provider)
            .getBill(bill_id)
            .call()
            .await
            .map_err(|e| contract_error("getBill", e))?;
        Ok(bill.into())
    }

    async fn get_nonce(&self, user: Address) -> Result<U256, EzpayError> {
        IEzpay::new(self.contract, &self.provider)
            .getNonce(user)
            .call()
            .await
            .map_err(|e| contract_error("getNonce", e))
    }

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, EzpayError> {
        erc20::allowance(&self.provider, token, owner, spender).await
    }

    async fn simulate(&self, call: &LedgerCall) -> Result<(), EzpayError> {
        self.ensure_callable(call)?;
        let contract = IEzpay::new(self.contract, &self.provider);
        let res = match call {
            LedgerCall::CreateBill {
                bill_id,
                token,
                amount,
            } => contract
                .createBill(*bill_id, *token, *amount)
                .from(self.sender)
                .call()
                .await
                .map(|_| ()),
            LedgerCall::PayBillWithAuthorization(auth) => contract
                .payBillWithAuthorization(auth.clone())
                .from(self.sender)
                .call()
                .await
                .map(|_| ()),
            LedgerCall::CreateBillWithAuthorization(auth) => contract
                .createBillWithAuthorization(auth.clone())
                .from(self.sender)
                .call()
                .await
                .map(|_| ()),
            LedgerCall::PayDynamicErc20WithPermit { auth, permit } => contract
                .payDynamicERC20WithPermit(auth.clone(), permit.clone())
                .from(self.sender)
                .call()
                .await
                .map(|_| ()),
        };
        res.map_err(|e| contract_error(call.name(), e))
    }

    async fn submit(&self, call: &LedgerCall) -> Result<TxHash, EzpayError> {
        self.ensure_callable(call)?;
        let contract = IEzpay::new(self.contract, &self.provider);
        let send = async {
            match call {
                LedgerCall::CreateBill {
                    bill_id,
                    token,
                    amount,
                } => {
                    contract
                        .createBill(*bill_id, *token, *amount)
                        .from(self.sender)
                        .send()
                        .await
                }
                LedgerCall::PayBillWithAuthorization(auth) => {
                    contract
                        .payBillWithAuthorization(auth.clone())
                        .from(self.sender)
                        .send()
                        .await
                }
                LedgerCall::CreateBillWithAuthorization(auth) => {
                    contract
                        .createBillWithAuthorization(auth.clone())
                        .from(self.sender)
                        .send()
                        .await
                }
                LedgerCall::PayDynamicErc20WithPermit { auth, permit } => {
                    contract
                        .payDynamicERC20WithPermit(auth.clone(), permit.clone())
                        .from(self.sender)
                        .send()
                        .await
                }
            }
        };

        let pending = tokio::time::timeout(SEND_TIMEOUT, send)
            .await
            .map_err(|_| {
                EzpayError::Chain(format!(
                    "{} send timed out after {}s",
                    call.name(),
                    SEND_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| contract_error(call.name(), e))?;

        Ok(*pending.tx_hash())
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
        timeout: Duration,
    ) -> Result<TxReceipt, EzpayError> {
        let poll = async {
            loop {
                match self.provider.get_transaction_receipt(tx_hash).await {
                    Ok(Some(receipt)) => break receipt,
                    Ok(None) => {}
                    Err(e) => {
                        tracing::debug!(tx = %tx_hash, error = %e, "receipt poll failed, retrying");
                    }
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        let receipt = tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| EzpayError::Timeout(timeout))?;

        Ok(TxReceipt {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number.unwrap_or_default(),
            success: receipt.status(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::providers::ProviderBuilder;
    use alloy::sol_types::{SolCall, SolValue};

    fn offline_ledger() -> RpcLedger<impl Provider + Send + Sync> {
        // Nothing listens here; any request that reaches the network fails as a chain error.
        let provider = ProviderBuilder::new().connect_http("http://127.0.0.1:9".parse().unwrap());
        RpcLedger::new(
            provider,
            5003,
            Address::repeat_byte(0xEC),
            Address::repeat_byte(0x99),
        )
    }

    #[tokio::test]
    async fn authorized_create_is_refused_unless_enabled() {
        let ledger = offline_ledger();
        assert!(!ledger.supports_authorized_create());
        let call = LedgerCall::CreateBillWithAuthorization(IEzpay::CreateAuthorization {
            receiver: Address::repeat_byte(0x11),
            billId: B256::repeat_byte(1),
            token: Address::repeat_byte(0xC4),
            amount: U256::from(1u64),
            nonce: U256::ZERO,
            chainId: U256::from(5003u64),
            contractAddress: Address::repeat_byte(0xEC),
            signature: Default::default(),
        });

        for err in [
            ledger.submit(&call).await.unwrap_err(),
            ledger.simulate(&call).await.unwrap_err(),
        ] {
            assert_eq!(err.code(), "ValidationError");
            assert!(err.to_string().contains("createBillWithAuthorization"));
        }

        let ledger = ledger.with_authorized_create(true);
        assert!(ledger.supports_authorized_create());
        assert_eq!(ledger.simulate(&call).await.unwrap_err().code(), "ChainError");
    }

    #[test]
    fn bills_getter_matches_deployed_abi() {
        assert_eq!(IEzpay::billsCall::SIGNATURE, "bills(bytes32)");

        let receiver = Address::repeat_byte(0x11);
        let payer = Address::repeat_byte(0x22);
        let encoded = (
            receiver,
            Address::ZERO,
            U256::from(10u64),
            true,
            U256::from(100u64),
            U256::from(200u64),
            payer,
        )
            .abi_encode_params();
        let row = IEzpay::billsCall::abi_decode_returns(&encoded).unwrap();
        assert_eq!(row.receiver, receiver);
        assert!(row.paid);
        assert_eq!(row.paidAt, U256::from(200u64));
        assert_eq!(row.payer, payer);
    }
}
