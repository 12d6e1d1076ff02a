//! Authorization codec: EIP-712 typed data and raw-hash signing, signature
//! verification with EIP-2 malleability protection.
//!
//! Every message binds its `chainId` and `contractAddress`, so a signature
//! produced for one deployment never verifies against another.
//!
//! Two strategies are supported:
//! - [`SignatureScheme::TypedData`]: EIP-712 over the "Ezpay" v1 domain
//! - [`SignatureScheme::RawHash`]: `keccak256(abi.encode(fields))`, signed as
//!   an EIP-191 personal message over the 32 hash bytes

use std::borrow::Cow;

use alloy::primitives::{eip191_hash_message, keccak256, Address, Bytes, Signature, B256, U256};
use alloy::signers::SignerSync;
use alloy::sol_types::{Eip712Domain, SolStruct, SolValue};
use serde::{Deserialize, Serialize};

use crate::constants::{EIP712_DOMAIN_NAME, EIP712_DOMAIN_VERSION};
use crate::{Authorization, CreateAuthorization, EzpayError, IEzpay, PayAuthorization};

/// secp256k1 curve order N / 2. Signatures with s > this are malleable (EIP-2).
pub(crate) const SECP256K1_N_DIV_2: U256 = U256::from_limbs([
    0xBFD25E8CD0364140,
    0xBAAEDCE6AF48A03B,
    0xFFFFFFFFFFFFFFFE,
    0x7FFFFFFFFFFFFFFF,
]);

/// How a signature was produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureScheme {
    #[default]
    #[serde(rename = "eip712")]
    TypedData,
    #[serde(rename = "raw")]
    RawHash,
}

/// A signature together with the strategy it was produced under.
///
/// On the wire: `{"scheme": "eip712" | "raw", "signature": "0x…"}`; a missing
/// `scheme` means `eip712`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedAuthorization {
    #[serde(default)]
    pub scheme: SignatureScheme,
    pub signature: Bytes,
}

/// A message signed under the Ezpay domain.
pub trait AuthorizationMessage: SolStruct + SolValue {
    fn chain_id(&self) -> U256;
    fn contract_address(&self) -> Address;
}

impl AuthorizationMessage for Authorization {
    fn chain_id(&self) -> U256 {
        self.chainId
    }
    fn contract_address(&self) -> Address {
        self.contractAddress
    }
}

impl AuthorizationMessage for PayAuthorization {
    fn chain_id(&self) -> U256 {
        self.chainId
    }
    fn contract_address(&self) -> Address {
        self.contractAddress
    }
}

impl AuthorizationMessage for CreateAuthorization {
    fn chain_id(&self) -> U256 {
        self.chainId
    }
    fn contract_address(&self) -> Address {
        self.contractAddress
    }
}

// Calldata carries the signature next to the signed fields.

impl From<&IEzpay::Authorization> for Authorization {
    fn from(a: &IEzpay::Authorization) -> Self {
        Self {
            billId: a.billId,
            nonce: a.nonce,
            chainId: a.chainId,
            contractAddress: a.contractAddress,
        }
    }
}

impl From<&IEzpay::PayAuthorization> for PayAuthorization {
    fn from(a: &IEzpay::PayAuthorization) -> Self {
        Self {
            receiver: a.receiver,
            token: a.token,
            chainId: a.chainId,
            contractAddress: a.contractAddress,
        }
    }
}

impl From<&IEzpay::CreateAuthorization> for CreateAuthorization {
    fn from(a: &IEzpay::CreateAuthorization) -> Self {
        Self {
            receiver: a.receiver,
            billId: a.billId,
            token: a.token,
            amount: a.amount,
            nonce: a.nonce,
            chainId: a.chainId,
            contractAddress: a.contractAddress,
        }
    }
}

impl Authorization {
    pub fn into_call(self, authorizer: Address, signature: Bytes) -> IEzpay::Authorization {
        IEzpay::Authorization {
            authorizer,
            billId: self.billId,
            nonce: self.nonce,
            chainId: self.chainId,
            contractAddress: self.contractAddress,
            signature,
        }
    }
}

impl PayAuthorization {
    pub fn into_call(self, signature: Bytes) -> IEzpay::PayAuthorization {
        IEzpay::PayAuthorization {
            receiver: self.receiver,
            token: self.token,
            chainId: self.chainId,
            contractAddress: self.contractAddress,
            signature,
        }
    }
}

impl CreateAuthorization {
    pub fn into_call(self, signature: Bytes) -> IEzpay::CreateAuthorization {
        IEzpay::CreateAuthorization {
            receiver: self.receiver,
            billId: self.billId,
            token: self.token,
            amount: self.amount,
            nonce: self.nonce,
            chainId: self.chainId,
            contractAddress: self.contractAddress,
            signature,
        }
    }
}

/// The Ezpay EIP-712 domain for a deployment.
pub fn ezpay_domain(chain_id: U256, contract: Address) -> Eip712Domain {
    Eip712Domain {
        name: Some(Cow::Borrowed(EIP712_DOMAIN_NAME)),
        version: Some(Cow::Borrowed(EIP712_DOMAIN_VERSION)),
        chain_id: Some(chain_id),
        verifying_contract: Some(contract),
        salt: None,
    }
}

/// EIP-712 signing hash of `msg` under the domain it names.
pub fn typed_data_hash<M: AuthorizationMessage>(msg: &M) -> B256 {
    msg.eip712_signing_hash(&ezpay_domain(msg.chain_id(), msg.contract_address()))
}

/// `keccak256(abi.encode(fields...))`, before the EIP-191 prefix is applied.
pub fn raw_message_hash<M: AuthorizationMessage>(msg: &M) -> B256 {
    keccak256(msg.abi_encode())
}

/// The digest actually signed under the given strategy.
pub fn signing_hash<M: AuthorizationMessage>(msg: &M, scheme: SignatureScheme) -> B256 {
    match scheme {
        SignatureScheme::TypedData => typed_data_hash(msg),
        SignatureScheme::RawHash => eip191_hash_message(raw_message_hash(msg)),
    }
}

/// Parse a 65-byte `r || s || v` signature, rejecting high-s values.
pub fn parse_signature(signature: &[u8]) -> Result<Signature, EzpayError> {
    if signature.len() != 65 {
        return Err(EzpayError::InvalidAuthorization(format!(
            "signature must be 65 bytes, got {}",
            signature.len()
        )));
    }

    let sig = Signature::from_raw(signature)
        .map_err(|e| EzpayError::InvalidAuthorization(format!("invalid signature: {e}")))?;

    if sig.s() > SECP256K1_N_DIV_2 {
        return Err(EzpayError::InvalidAuthorization(
            "high-s signature rejected (EIP-2 malleability)".to_string(),
        ));
    }

    Ok(sig)
}

/// Recover the address that signed `msg` under `scheme`.
pub fn recover_signer<M: AuthorizationMessage>(
    msg: &M,
    signature: &[u8],
    scheme: SignatureScheme,
) -> Result<Address, EzpayError> {
    let sig = parse_signature(signature)?;
    sig.recover_address_from_prehash(&signing_hash(msg, scheme))
        .map_err(|e| EzpayError::InvalidAuthorization(format!("recovery failed: {e}")))
}

/// Check that `expected` signed `msg` under the tagged strategy.
pub fn verify_signed<M: AuthorizationMessage>(
    msg: &M,
    signed: &SignedAuthorization,
    expected: Address,
) -> Result<(), EzpayError> {
    let recovered = recover_signer(msg, &signed.signature, signed.scheme)?;
    if recovered != expected {
        return Err(EzpayError::InvalidAuthorization(
            "signer does not match authorizer".to_string(),
        ));
    }
    Ok(())
}

/// Accept the signature if either strategy recovers to `expected`.
///
/// The contract receives untagged calldata, so it tries typed data first and
/// falls back to the raw hash.
pub fn verify_any_scheme<M: AuthorizationMessage>(
    msg: &M,
    signature: &[u8],
    expected: Address,
) -> Result<(), EzpayError> {
    let sig = parse_signature(signature)?;
    let matches = [SignatureScheme::TypedData, SignatureScheme::RawHash]
        .into_iter()
        .any(|scheme| {
            sig.recover_address_from_prehash(&signing_hash(msg, scheme))
                .is_ok_and(|addr| addr == expected)
        });
    if !matches {
        return Err(EzpayError::InvalidAuthorization(
            "signature does not recover to the authorizer".to_string(),
        ));
    }
    Ok(())
}

/// Sign `msg` with a local signer.
pub fn sign_authorization<S, M>(
    signer: &S,
    msg: &M,
    scheme: SignatureScheme,
) -> Result<SignedAuthorization, EzpayError>
where
    S: SignerSync,
    M: AuthorizationMessage,
{
    let sig = match scheme {
        SignatureScheme::TypedData => signer.sign_hash_sync(&typed_data_hash(msg)),
        SignatureScheme::RawHash => signer.sign_message_sync(raw_message_hash(msg).as_slice()),
    }
    .map_err(|e| EzpayError::InvalidAuthorization(format!("signing failed: {e}")))?;

    Ok(SignedAuthorization {
        scheme,
        signature: Bytes::copy_from_slice(&sig.as_bytes()),
    })
}
