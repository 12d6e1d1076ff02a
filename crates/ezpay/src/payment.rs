//! Relay request bodies.
//!
//! Top-level fields are optional so that a missing field is reported as a
//! validation error naming it, rather than as a JSON parse failure.
//!
//! Chain ids arrive as JSON numbers or as strings (`"5003"`, `"0x138b"`), and
//! a signature without a `scheme` tag is checked under both strategies.

use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Deserializer, Serialize};

use crate::authorization::{
    verify_any_scheme, verify_signed, AuthorizationMessage, SignatureScheme, SignedAuthorization,
};
use crate::permit::PermitSignature;
use crate::{Authorization, CreateAuthorization, EzpayError, IEzpay, PayAuthorization};

/// A payer's signed bill-payment authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationPayload {
    pub authorizer: Address,
    pub bill_id: B256,
    pub nonce: U256,
    #[serde(deserialize_with = "chain_id::deserialize")]
    pub chain_id: u64,
    pub contract_address: Address,
    pub signature: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<SignatureScheme>,
}

impl AuthorizationPayload {
    pub fn message(&self) -> Authorization {
        Authorization {
            billId: self.bill_id,
            nonce: self.nonce,
            chainId: U256::from(self.chain_id),
            contractAddress: self.contract_address,
        }
    }

    /// Check that `expected` signed this authorization.
    pub fn verify(&self, expected: Address) -> Result<(), EzpayError> {
        verify_tagged(&self.message(), &self.signature, self.scheme, expected)
    }

    pub fn to_call(&self) -> IEzpay::Authorization {
        self.message()
            .into_call(self.authorizer, self.signature.clone())
    }
}

/// A receiver's signed authorization to open a bill in their name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAuthorizationPayload {
    pub receiver: Address,
    pub bill_id: B256,
    pub token: Address,
    pub amount: U256,
    pub nonce: U256,
    #[serde(deserialize_with = "chain_id::deserialize")]
    pub chain_id: u64,
    pub contract_address: Address,
    pub signature: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<SignatureScheme>,
}

impl CreateAuthorizationPayload {
    pub fn message(&self) -> CreateAuthorization {
        CreateAuthorization {
            receiver: self.receiver,
            billId: self.bill_id,
            token: self.token,
            amount: self.amount,
            nonce: self.nonce,
            chainId: U256::from(self.chain_id),
            contractAddress: self.contract_address,
        }
    }

    /// Check that `expected` signed this authorization.
    pub fn verify(&self, expected: Address) -> Result<(), EzpayError> {
        verify_tagged(&self.message(), &self.signature, self.scheme, expected)
    }

    pub fn to_call(&self) -> IEzpay::CreateAuthorization {
        self.message().into_call(self.signature.clone())
    }
}

/// A receiver's signed, reusable payment link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayAuthorizationPayload {
    pub receiver: Address,
    pub token: Address,
    #[serde(deserialize_with = "chain_id::deserialize")]
    pub chain_id: u64,
    pub contract_address: Address,
    pub signature: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<SignatureScheme>,
}

impl PayAuthorizationPayload {
    pub fn message(&self) -> PayAuthorization {
        PayAuthorization {
            receiver: self.receiver,
            token: self.token,
            chainId: U256::from(self.chain_id),
            contractAddress: self.contract_address,
        }
    }

    /// Check that `expected` signed this authorization.
    pub fn verify(&self, expected: Address) -> Result<(), EzpayError> {
        verify_tagged(&self.message(), &self.signature, self.scheme, expected)
    }

    pub fn to_call(&self) -> IEzpay::PayAuthorization {
        self.message().into_call(self.signature.clone())
    }
}

/// Tagged signatures are checked under their scheme only; untagged ones are
/// accepted under either, matching what the contract itself recovers.
fn verify_tagged<M: AuthorizationMessage>(
    msg: &M,
    signature: &Bytes,
    scheme: Option<SignatureScheme>,
    expected: Address,
) -> Result<(), EzpayError> {
    match scheme {
        Some(scheme) => verify_signed(
            msg,
            &SignedAuthorization {
                scheme,
                signature: signature.clone(),
            },
            expected,
        ),
        None => verify_any_scheme(msg, signature, expected),
    }
}

/// EIP-2612 permit as submitted alongside a dynamic payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitPayload {
    pub owner: Address,
    pub token: Address,
    pub value: U256,
    pub deadline: U256,
    pub v: u8,
    pub r: B256,
    pub s: B256,
}

impl PermitPayload {
    pub fn signature(&self) -> PermitSignature {
        PermitSignature {
            v: self.v,
            r: self.r,
            s: self.s,
        }
    }

    pub fn to_call(&self) -> IEzpay::PermitData {
        IEzpay::PermitData {
            owner: self.owner,
            token: self.token,
            value: self.value,
            deadline: self.deadline,
            v: self.v,
            r: self.r,
            s: self.s,
        }
    }
}

/// `POST /api/gasless-payment`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GaslessPaymentRequest {
    pub bill_id: Option<B256>,
    pub contract_address: Option<Address>,
    #[serde(default, deserialize_with = "chain_id::deserialize_option")]
    pub chain_id: Option<u64>,
    pub authorization: Option<AuthorizationPayload>,
}

/// `POST /api/gasless-create`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GaslessCreateRequest {
    pub bill_id: Option<B256>,
    pub token: Option<Address>,
    pub amount: Option<U256>,
    pub receiver: Option<Address>,
    pub contract_address: Option<Address>,
    #[serde(default, deserialize_with = "chain_id::deserialize_option")]
    pub chain_id: Option<u64>,
    pub authorization: Option<CreateAuthorizationPayload>,
}

/// `POST /api/gasless-approve`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveCheckRequest {
    pub token_address: Option<Address>,
    pub amount: Option<U256>,
    pub user_address: Option<Address>,
    pub contract_address: Option<Address>,
    #[serde(default, deserialize_with = "chain_id::deserialize_option")]
    pub chain_id: Option<u64>,
}

/// `POST /api/gasless-dynamic-payment`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicPaymentRequest {
    pub auth: Option<PayAuthorizationPayload>,
    pub permit: Option<PermitPayload>,
}

mod chain_id {
    use serde::de::Error;

    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    fn parse<E: Error>(raw: Raw) -> Result<u64, E> {
        let text = match raw {
            Raw::Number(n) => return Ok(n),
            Raw::Text(text) => text,
        };
        let trimmed = text.trim();
        let parsed = match trimmed.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => trimmed.parse(),
        };
        parsed.map_err(|_| E::custom(format!("invalid chain id: {text:?}")))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        parse(Raw::deserialize(d)?)
    }

    pub(super) fn deserialize_option<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<u64>, D::Error> {
        Option::<Raw>::deserialize(d)?.map(parse).transpose()
    }
}

/// Collects the names of absent fields and fails once with all of them.
#[derive(Debug, Default)]
pub(crate) struct RequiredFields(Vec<&'static str>);

impl RequiredFields {
    pub(crate) fn take<T>(&mut self, name: &'static str, value: Option<T>) -> Option<T> {
        if value.is_none() {
            self.0.push(name);
        }
        value
    }

    pub(crate) fn finish(self) -> Result<(), EzpayError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(EzpayError::Validation(format!(
                "Missing required fields: {}",
                self.0.join(", ")
            )))
        }
    }
}
