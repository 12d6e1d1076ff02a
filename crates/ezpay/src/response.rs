use alloy::primitives::{Address, TxHash, B256, U256};
use serde::{Serialize, Serializer};

/// Token amounts go out as decimal strings, the way wallets display them.
pub fn as_decimal<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// A confirmed relayed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxResponse {
    pub success: bool,
    pub tx_hash: TxHash,
    pub block_number: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bill_id: Option<B256>,
}

/// What the payer must do before a gasless payment can go through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalInstructions {
    pub action: String,
    pub token_address: Address,
    pub spender: Address,
    #[serde(serialize_with = "as_decimal")]
    pub amount: U256,
    #[serde(serialize_with = "as_decimal")]
    pub current_allowance: U256,
}

impl ApprovalInstructions {
    pub fn approve(token: Address, spender: Address, amount: U256, current: U256) -> Self {
        Self {
            action: "approve".to_string(),
            token_address: token,
            spender,
            amount,
            current_allowance: current,
        }
    }
}

/// Result of an allowance check. `success == false` is an answer, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveCheckResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "option_as_decimal"
    )]
    pub current_allowance: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<ApprovalInstructions>,
}

fn option_as_decimal<S: Serializer>(value: &Option<U256>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => serializer.collect_str(v),
        None => serializer.serialize_none(),
    }
}

impl ApproveCheckResponse {
    pub fn sufficient(current: U256) -> Self {
        Self {
            success: true,
            message: "Sufficient allowance already exists".to_string(),
            error: None,
            current_allowance: Some(current),
            instructions: None,
        }
    }

    pub fn approval_required(instructions: ApprovalInstructions) -> Self {
        Self {
            success: false,
            message: "User needs to approve token spending first".to_string(),
            error: Some("Approval required".to_string()),
            current_allowance: None,
            instructions: Some(instructions),
        }
    }
}

/// Body of a `GET` on a relay endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityResponse {
    pub message: String,
    pub available: bool,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_required_shape() {
        let body = ApproveCheckResponse::approval_required(ApprovalInstructions::approve(
            Address::repeat_byte(0xC4),
            Address::repeat_byte(0xEC),
            U256::from(50_000_000u64),
            U256::from(10u64),
        ));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Approval required");
        assert_eq!(json["instructions"]["action"], "approve");
        assert_eq!(json["instructions"]["amount"], "50000000");
        assert_eq!(json["instructions"]["currentAllowance"], "10");
        assert!(json.get("currentAllowance").is_none());
    }

    #[test]
    fn sufficient_reports_current_allowance() {
        let json = serde_json::to_value(ApproveCheckResponse::sufficient(U256::MAX)).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["currentAllowance"], U256::MAX.to_string());
    }

    #[test]
    fn tx_response_is_camel_case() {
        let json = serde_json::to_value(TxResponse {
            success: true,
            tx_hash: TxHash::repeat_byte(1),
            block_number: 42,
            bill_id: None,
        })
        .unwrap();
        assert_eq!(json["blockNumber"], 42);
        assert!(json["txHash"].as_str().unwrap().starts_with("0x"));
        assert!(json.get("billId").is_none());
    }
}
