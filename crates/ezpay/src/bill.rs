use alloy::primitives::{keccak256, Address, B256, U256};
use alloy::sol_types::SolValue;
use serde::{Deserialize, Serialize};

use crate::constants::NATIVE_TOKEN;
use crate::IEzpay;

/// A payable request for a fixed amount of one token to one receiver.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    pub receiver: Address,
    pub token: Address,
    pub amount: U256,
    pub paid: bool,
    pub created_at: u64,
    pub paid_at: u64,
    pub payer: Address,
}

/// Lifecycle position of a bill id. Nothing leaves `Paid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BillStatus {
    NonExistent,
    Open,
    Paid,
}

impl Bill {
    /// A zero receiver marks a slot that was never written.
    pub fn exists(&self) -> bool {
        self.receiver != Address::ZERO
    }

    pub fn is_native(&self) -> bool {
        self.token == NATIVE_TOKEN
    }

    pub fn status(&self) -> BillStatus {
        match (self.exists(), self.paid) {
            (false, _) => BillStatus::NonExistent,
            (true, false) => BillStatus::Open,
            (true, true) => BillStatus::Paid,
        }
    }
}

impl From<IEzpay::Bill> for Bill {
    fn from(b: IEzpay::Bill) -> Self {
        Self {
            receiver: b.receiver,
            token: b.token,
            amount: b.amount,
            paid: b.paid,
            created_at: b.createdAt.saturating_to(),
            paid_at: b.paidAt.saturating_to(),
            payer: b.payer,
        }
    }
}

impl From<&Bill> for IEzpay::Bill {
    fn from(b: &Bill) -> Self {
        Self {
            receiver: b.receiver,
            token: b.token,
            amount: b.amount,
            paid: b.paid,
            createdAt: U256::from(b.created_at),
            paidAt: U256::from(b.paid_at),
            payer: b.payer,
        }
    }
}

/// `keccak256(abi.encode(user, nonce, contract))`, the contract's deterministic id.
pub fn generate_bill_id(user: Address, nonce: U256, contract: Address) -> B256 {
    keccak256((user, nonce, contract).abi_encode())
}

/// Random bill id for client-side creation (keccak256 of 32 CSPRNG bytes).
pub fn random_bill_id() -> B256 {
    let mut bytes = [0u8; 32];
    rand::fill(&mut bytes);
    keccak256(bytes)
}
