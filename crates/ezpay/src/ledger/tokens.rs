use std::collections::HashMap;

use alloy::primitives::{Address, U256};

use crate::permit::{recover_permit_owner, PermitSignature, TokenDomain};
use crate::{EzpayError, Permit};

/// Native and ERC-20 accounting backing an in-process ledger.
///
/// Failures here are reported loosely; the ledger maps them onto its own
/// error kinds (`InsufficientBalance`, `TransferFailed`, `InvalidPermit`).
#[derive(Debug, Clone, Default)]
pub struct TokenBook {
    native: HashMap<Address, U256>,
    domains: HashMap<Address, TokenDomain>,
    balances: HashMap<(Address, Address), U256>,
    allowances: HashMap<(Address, Address, Address), U256>,
    permit_nonces: HashMap<(Address, Address), U256>,
}

impl TokenBook {
    pub fn native_balance(&self, owner: Address) -> U256 {
        self.native.get(&owner).copied().unwrap_or_default()
    }

    /// Credit native value. A balance that would overflow reverts.
    pub fn mint_native(&mut self, owner: Address, amount: U256) -> Result<(), EzpayError> {
        let credited = self
            .native_balance(owner)
            .checked_add(amount)
            .ok_or(EzpayError::TransferFailed)?;
        self.native.insert(owner, credited);
        Ok(())
    }

    pub fn transfer_native(
        &mut self,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), EzpayError> {
        let from_bal = self.native_balance(from);
        if from_bal < amount {
            return Err(EzpayError::InsufficientBalance);
        }
        if from == to {
            return Ok(());
        }
        self.mint_native(to, amount)?;
        self.native.insert(from, from_bal - amount);
        Ok(())
    }

    /// Deploy a token with the EIP-712 identity it signs permits under.
    pub fn register_token(&mut self, token: Address, domain: TokenDomain) {
        self.domains.insert(token, domain);
    }

    pub fn is_registered(&self, token: Address) -> bool {
        self.domains.contains_key(&token)
    }

    pub fn domain(&self, token: Address) -> Option<&TokenDomain> {
        self.domains.get(&token)
    }

    /// Credit `amount` of `token`. A balance that would overflow reverts.
    pub fn mint(&mut self, token: Address, owner: Address, amount: U256) -> Result<(), EzpayError> {
        let credited = self
            .balance_of(token, owner)
            .checked_add(amount)
            .ok_or(EzpayError::TransferFailed)?;
        self.balances.insert((token, owner), credited);
        Ok(())
    }

    pub fn balance_of(&self, token: Address, owner: Address) -> U256 {
        self.balances.get(&(token, owner)).copied().unwrap_or_default()
    }

    pub fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default()
    }

    pub fn approve(&mut self, token: Address, owner: Address, spender: Address, amount: U256) {
        self.allowances.insert((token, owner, spender), amount);
    }

    pub fn permit_nonce(&self, token: Address, owner: Address) -> U256 {
        self.permit_nonces
            .get(&(token, owner))
            .copied()
            .unwrap_or_default()
    }

    /// `transferFrom` executed by `spender`. Spends allowance unless it is unlimited.
    pub fn transfer_from(
        &mut self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), EzpayError> {
        if !self.is_registered(token) {
            return Err(EzpayError::TransferFailed);
        }
        let allowed = self.allowance(token, from, spender);
        let balance = self.balance_of(token, from);
        if allowed < amount || balance < amount {
            tracing::debug!(
                token = %token,
                from = %from,
                allowed = %allowed,
                balance = %balance,
                amount = %amount,
                "transferFrom rejected"
            );
            return Err(EzpayError::TransferFailed);
        }
        if from != to {
            self.mint(token, to, amount)?;
            self.balances.insert((token, from), balance - amount);
        }
        if allowed != U256::MAX {
            self.approve(token, from, spender, allowed - amount);
        }
        Ok(())
    }

    /// EIP-2612 `permit`: on a valid owner signature over the current permit
    /// nonce, sets the allowance and consumes the nonce.
    #[allow(clippy::too_many_arguments)]
    pub fn permit(
        &mut self,
        token: Address,
        owner: Address,
        spender: Address,
        value: U256,
        deadline: U256,
        signature: &PermitSignature,
        chain_id: U256,
        now: u64,
    ) -> Result<(), EzpayError> {
        let domain = self
            .domain(token)
            .cloned()
            .ok_or_else(|| EzpayError::InvalidPermit(format!("token {token} has no permit")))?;
        if deadline < U256::from(now) {
            return Err(EzpayError::PermitExpired);
        }
        let nonce = self.permit_nonce(token, owner);
        let message = Permit {
            owner,
            spender,
            value,
            nonce,
            deadline,
        };
        let signer = recover_permit_owner(&message, &domain, chain_id, token, signature)?;
        if signer != owner {
            return Err(EzpayError::InvalidPermit(
                "permit not signed by owner".to_string(),
            ));
        }
        self.permit_nonces.insert((token, owner), nonce + U256::from(1u64));
        self.approve(token, owner, spender, value);
        Ok(())
    }
}
