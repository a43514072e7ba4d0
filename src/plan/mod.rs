//! Transaction plans handed to the executor by an external planner
//!
//! A plan is an ordered list of unsigned transactions. All entries but the
//! last are approvals; the last one is the main transaction.

use crate::chain::NetworkId;
use crate::error::{ExecutorError, ExecutorResult};

use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unsigned transaction intent as produced by the planner.
///
/// Fields are kept loose so a malformed planner output can still be
/// represented; [`RawTransaction::validate`] checks the shape.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    /// Destination account
    #[serde(default)]
    pub to: Option<String>,
    /// Hex encoded call data
    #[serde(default)]
    pub data: Option<String>,
    /// Native currency amount in wei
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub value: Option<U256>,
    /// Target network
    #[serde(default)]
    pub chain_id: Option<NetworkId>,
}

/// A transaction whose destination, payload and network are known to be
/// present and well-formed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTransaction {
    pub to: Address,
    pub data: Bytes,
    pub value: Option<U256>,
    pub network: NetworkId,
}

impl RawTransaction {
    pub fn new(to: &str, data: &str, network: impl Into<NetworkId>) -> Self {
        Self {
            to: Some(to.to_string()),
            data: Some(data.to_string()),
            value: None,
            chain_id: Some(network.into()),
        }
    }

    /// Check destination, payload and network id
    pub fn validate(&self) -> ExecutorResult<ValidatedTransaction> {
        let to = self
            .to
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| shape_error("missing destination"))?;
        let to: Address = to
            .trim()
            .parse()
            .map_err(|_| shape_error(format!("malformed destination {:?}", to)))?;

        let data = self
            .data
            .as_deref()
            .ok_or_else(|| shape_error("missing payload"))?;
        let data = decode_payload(data)?;

        let network = self
            .chain_id
            .clone()
            .ok_or_else(|| shape_error("missing network id"))?;

        Ok(ValidatedTransaction {
            to,
            data,
            value: self.value,
            network,
        })
    }
}

fn shape_error(message: impl Into<String>) -> ExecutorError {
    ExecutorError::InvalidTransactionShape(message.into())
}

fn decode_payload(data: &str) -> ExecutorResult<Bytes> {
    let trimmed = data.trim();
    let hex_digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    hex::decode(hex_digits)
        .map(Bytes::from)
        .map_err(|e| shape_error(format!("malformed payload: {}", e)))
}

/// Accepts a JSON integer, a decimal string or a `0x` hex string
fn deserialize_amount<'de, D>(deserializer: D) -> Result<Option<U256>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Amount {
        Int(u64),
        Text(String),
    }

    match Option::<Amount>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Amount::Int(v)) => Ok(Some(U256::from(v))),
        Some(Amount::Text(s)) => parse_amount(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid amount {:?}", s))),
    }
}

fn parse_amount(s: &str) -> Option<U256> {
    let s = s.trim();
    match s.strip_prefix("0x") {
        Some(hex_digits) => U256::from_str_radix(hex_digits, 16).ok(),
        None => U256::from_dec_str(s).ok(),
    }
}

/// Identity of one constructed plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PlanId(Uuid);

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Ordered, immutable sequence of transactions.
///
/// Not `Clone`: two plans with the same contents are still two plans.
#[derive(Debug)]
pub struct TransactionPlan {
    id: PlanId,
    transactions: Vec<RawTransaction>,
}

impl TransactionPlan {
    pub fn new(transactions: Vec<RawTransaction>) -> Self {
        Self {
            id: PlanId(Uuid::new_v4()),
            transactions,
        }
    }

    /// Build a plan, rejecting it if any entry is malformed
    pub fn try_new(transactions: Vec<RawTransaction>) -> ExecutorResult<Self> {
        for (index, tx) in transactions.iter().enumerate() {
            if let Err(ExecutorError::InvalidTransactionShape(msg)) = tx.validate() {
                return Err(shape_error(format!("transaction {}: {}", index, msg)));
            }
        }
        Ok(Self::new(transactions))
    }

    pub fn id(&self) -> PlanId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Number of leading approval transactions
    pub fn total_approvals(&self) -> usize {
        self.transactions.len().saturating_sub(1)
    }

    pub fn approval(&self, index: usize) -> Option<&RawTransaction> {
        if index < self.total_approvals() {
            self.transactions.get(index)
        } else {
            None
        }
    }

    pub fn main_transaction(&self) -> Option<&RawTransaction> {
        self.transactions.last()
    }
}

/// Planner JSON envelope: `{"transactions": [...]}`
#[derive(Debug, Deserialize)]
pub struct PlanRequest {
    pub transactions: Vec<RawTransaction>,
}

impl PlanRequest {
    pub fn into_plan(self) -> ExecutorResult<TransactionPlan> {
        TransactionPlan::try_new(self.transactions)
    }
}
