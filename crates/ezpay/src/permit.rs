//! EIP-2612 permits: digest, signing and owner recovery.
//!
//! The permit domain belongs to the token, not to Ezpay:
//! `{name, version, chainId, verifyingContract: token}`.

use std::borrow::Cow;

use alloy::primitives::{Address, Signature, B256, U256};
use alloy::signers::SignerSync;
use alloy::sol_types::{Eip712Domain, SolStruct};

use crate::authorization::SECP256K1_N_DIV_2;
use crate::{EzpayError, Permit};

/// EIP-712 identity a token uses for its permits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDomain {
    pub name: String,
    pub version: String,
}

impl TokenDomain {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn eip712_domain(&self, chain_id: U256, token: Address) -> Eip712Domain {
        Eip712Domain {
            name: Some(Cow::Owned(self.name.clone())),
            version: Some(Cow::Owned(self.version.clone())),
            chain_id: Some(chain_id),
            verifying_contract: Some(token),
            salt: None,
        }
    }
}

/// A permit signature split into its `(v, r, s)` components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermitSignature {
    pub v: u8,
    pub r: B256,
    pub s: B256,
}

impl From<Signature> for PermitSignature {
    fn from(sig: Signature) -> Self {
        Self {
            v: if sig.v() { 28 } else { 27 },
            r: B256::from(sig.r()),
            s: B256::from(sig.s()),
        }
    }
}

/// Digest the token's `permit()` checks.
pub fn permit_digest(
    permit: &Permit,
    domain: &TokenDomain,
    chain_id: U256,
    token: Address,
) -> B256 {
    permit.eip712_signing_hash(&domain.eip712_domain(chain_id, token))
}

/// Sign a permit with a local signer.
pub fn sign_permit<S: SignerSync>(
    signer: &S,
    permit: &Permit,
    domain: &TokenDomain,
    chain_id: U256,
    token: Address,
) -> Result<PermitSignature, EzpayError> {
    let sig = signer
        .sign_hash_sync(&permit_digest(permit, domain, chain_id, token))
        .map_err(|e| EzpayError::InvalidPermit(format!("signing failed: {e}")))?;
    Ok(sig.into())
}

/// Recover the permit owner from `(v, r, s)`. Rejects malformed v and high-s.
pub fn recover_permit_owner(
    permit: &Permit,
    domain: &TokenDomain,
    chain_id: U256,
    token: Address,
    signature: &PermitSignature,
) -> Result<Address, EzpayError> {
    let parity = match signature.v {
        27 | 0 => false,
        28 | 1 => true,
        v => return Err(EzpayError::InvalidPermit(format!("invalid v value {v}"))),
    };
    let s = U256::from_be_bytes(signature.s.0);
    if s > SECP256K1_N_DIV_2 {
        return Err(EzpayError::InvalidPermit(
            "high-s signature rejected (EIP-2 malleability)".to_string(),
        ));
    }
    let sig = Signature::new(U256::from_be_bytes(signature.r.0), s, parity);
    sig.recover_address_from_prehash(&permit_digest(permit, domain, chain_id, token))
        .map_err(|e| EzpayError::InvalidPermit(format!("recovery failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::signers::local::PrivateKeySigner;

    fn setup() -> (PrivateKeySigner, Permit, TokenDomain, Address) {
        let owner = PrivateKeySigner::random();
        let permit = Permit {
            owner: owner.address(),
            spender: Address::repeat_byte(0xEE),
            value: U256::from(25_000_000u64),
            nonce: U256::ZERO,
            deadline: U256::from(1_900_000_000u64),
        };
        (owner, permit, TokenDomain::new("USD Coin", "1"), Address::repeat_byte(0xC4))
    }

    #[test]
    fn sign_and_recover_owner() {
        let (owner, permit, domain, token) = setup();
        let chain = U256::from(5003u64);
        let sig = sign_permit(&owner, &permit, &domain, chain, token).unwrap();
        assert!(sig.v == 27 || sig.v == 28);
        let recovered = recover_permit_owner(&permit, &domain, chain, token, &sig).unwrap();
        assert_eq!(recovered, owner.address());
    }

    #[test]
    fn digest_is_bound_to_token_and_value() {
        let (owner, permit, domain, token) = setup();
        let chain = U256::from(5003u64);
        let sig = sign_permit(&owner, &permit, &domain, chain, token).unwrap();

        let other_token = Address::repeat_byte(0xC5);
        let recovered = recover_permit_owner(&permit, &domain, chain, other_token, &sig).unwrap();
        assert_ne!(recovered, owner.address());

        let mut bigger = permit.clone();
        bigger.value = U256::from(26_000_000u64);
        let recovered = recover_permit_owner(&bigger, &domain, chain, token, &sig).unwrap();
        assert_ne!(recovered, owner.address());
    }

    #[test]
    fn bad_v_rejected() {
        let (owner, permit, domain, token) = setup();
        let chain = U256::from(5003u64);
        let mut sig = sign_permit(&owner, &permit, &domain, chain, token).unwrap();
        sig.v = 29;
        let err = recover_permit_owner(&permit, &domain, chain, token, &sig).unwrap_err();
        assert_eq!(err.code(), "InvalidPermit");
    }
}
