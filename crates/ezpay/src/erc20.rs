use std::time::Duration;

use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::Provider;

use crate::{EzpayError, IERC20};

/// Query the ERC-20 balance of `owner`.
pub async fn balance_of<P: Provider>(
    provider: &P,
    token: Address,
    owner: Address,
) -> Result<U256, EzpayError> {
    IERC20::new(token, provider)
        .balanceOf(owner)
        .call()
        .await
        .map_err(|e| EzpayError::Chain(format!("balanceOf failed: {e}")))
}

/// Query the allowance `owner` has granted to `spender`.
pub async fn allowance<P: Provider>(
    provider: &P,
    token: Address,
    owner: Address,
    spender: Address,
) -> Result<U256, EzpayError> {
    IERC20::new(token, provider)
        .allowance(owner, spender)
        .call()
        .await
        .map_err(|e| EzpayError::Chain(format!("allowance failed: {e}")))
}

/// Send `approve(spender, amount)` from the provider's wallet and wait for it
/// to be mined.
pub async fn approve<P: Provider>(
    provider: &P,
    token: Address,
    spender: Address,
    amount: U256,
    receipt_timeout: Duration,
) -> Result<TxHash, EzpayError> {
    let contract = IERC20::new(token, provider);
    let pending = contract
        .approve(spender, amount)
        .send()
        .await
        .map_err(|e| EzpayError::Chain(format!("approve send failed: {e}")))?;

    let receipt = tokio::time::timeout(receipt_timeout, pending.get_receipt())
        .await
        .map_err(|_| EzpayError::Timeout(receipt_timeout))?
        .map_err(|e| EzpayError::Chain(format!("approve receipt failed: {e}")))?;

    if !receipt.status() {
        return Err(EzpayError::TransactionFailed("approve reverted".to_string()));
    }

    Ok(receipt.transaction_hash)
}
