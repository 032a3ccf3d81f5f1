//! Transfer models and leg pairing.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One side of a transfer as it appears in an account's transaction list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionLeg {
    pub transaction_id: String,
    pub transfer_group_id: String,
    pub account_id: String,
    /// Signed amount; negative is an outflow
    pub amount: Decimal,
    pub date: NaiveDate,
    pub description: Option<String>,
}

/// A single economic transfer between two accounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    /// Transaction on the source (outflow) side
    pub transaction_id: String,
    pub transfer_group_id: String,
    pub source_account_id: String,
    pub destination_account_id: String,
    /// Absolute amount moved
    pub amount: Decimal,
    pub date: NaiveDate,
    pub description: Option<String>,
}

impl Transfer {
    pub fn involves(&self, account_id: &str) -> bool {
        self.source_account_id == account_id || self.destination_account_id == account_id
    }

    /// The account on the other side of `account_id`, if the transfer touches
    /// it and the other side is a different account.
    pub fn counterparty_of(&self, account_id: &str) -> Option<&str> {
        if self.source_account_id == account_id && self.destination_account_id != account_id {
            Some(self.destination_account_id.as_str())
        } else if self.destination_account_id == account_id
            && self.source_account_id != account_id
        {
            Some(self.source_account_id.as_str())
        } else {
            None
        }
    }
}

/// Why a transfer group could not be paired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnpairedTransferGroup {
    pub transfer_group_id: String,
    pub reason: String,
}

/// Result of pairing transaction legs into transfers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferPairing {
    pub transfers: Vec<Transfer>,
    pub unpaired: Vec<UnpairedTransferGroup>,
}

/// Groups legs by `transfer_group_id` and pairs each group into a `Transfer`.
///
/// A group pairs only when it has exactly two legs in different accounts with
/// opposite signs. The negative leg is the source. Anything else lands in
/// `unpaired`.
pub fn pair_transfer_legs(legs: &[TransactionLeg]) -> TransferPairing {
    let mut groups: BTreeMap<&str, Vec<&TransactionLeg>> = BTreeMap::new();
    for leg in legs {
        groups.entry(leg.transfer_group_id.as_str()).or_default().push(leg);
    }

    let mut pairing = TransferPairing::default();
    for (group_id, group) in groups {
        match pair_group(&group) {
            Ok(transfer) => pairing.transfers.push(transfer),
            Err(reason) => pairing.unpaired.push(UnpairedTransferGroup {
                transfer_group_id: group_id.to_string(),
                reason,
            }),
        }
    }
    pairing
}

fn pair_group(group: &[&TransactionLeg]) -> Result<Transfer, String> {
    let [first, second] = group else {
        return Err(format!("expected 2 legs, found {}", group.len()));
    };
    if first.account_id == second.account_id {
        return Err("both legs belong to the same account".to_string());
    }
    let first_out = first.amount.is_sign_negative() && !first.amount.is_zero();
    let second_out = second.amount.is_sign_negative() && !second.amount.is_zero();
    let (source, destination) = match (first_out, second_out) {
        (true, false) if !second.amount.is_zero() => (first, second),
        (false, true) if !first.amount.is_zero() => (second, first),
        _ => return Err("legs do not have opposite signs".to_string()),
    };

    Ok(Transfer {
        transaction_id: source.transaction_id.clone(),
        transfer_group_id: source.transfer_group_id.clone(),
        source_account_id: source.account_id.clone(),
        destination_account_id: destination.account_id.clone(),
        amount: source.amount.abs(),
        date: source.date,
        description: source
            .description
            .clone()
            .or_else(|| destination.description.clone()),
    })
}
