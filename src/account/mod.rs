//! Accounts opened on onboarding.

mod number;
mod repository;

pub use number::*;
pub use repository::*;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::AccountDefaults;

/// Account as saved on database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_number: String,
    pub user_id: i64,
    pub tier: i32,
    pub r#type: String,
    pub currency: String,
    pub can_credit: bool,
    pub can_debit: bool,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    /// Active when `true`.
    pub status: bool,
    pub additional_field: serde_json::Value,
}

impl Account {
    /// Build a new, active account owned by `user_id`.
    pub fn open(
        defaults: &AccountDefaults,
        account_number: String,
        user_id: i64,
        r#type: &str,
    ) -> Self {
        Self {
            account_number,
            user_id,
            tier: defaults.tier,
            r#type: r#type.to_owned(),
            currency: defaults.currency.clone(),
            can_credit: true,
            can_debit: true,
            balance: defaults.starting_balance,
            status: true,
            additional_field: serde_json::json!({}),
        }
    }
}
