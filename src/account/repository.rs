//! Handle database requests.

use sqlx::PgConnection;
use sqlx::types::Json;

use crate::account::Account;
use crate::error::{Result, ServerError};

/// Writes on the `accounts` table, on a caller-owned transaction.
#[derive(Clone, Copy, Debug, Default)]
pub struct AccountRepository;

impl AccountRepository {
    /// Insert [`Account`] into database.
    ///
    /// A taken account number does not abort the surrounding transaction,
    /// it is reported as [`ServerError::AccountNumberTaken`] instead.
    pub async fn insert(&self, conn: &mut PgConnection, account: &Account) -> Result<()> {
        let result = sqlx::query(
            r#"INSERT INTO accounts (
                account_number, user_id, tier, type, currency,
                can_credit, can_debit, balance, status, additional_field
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (account_number) DO NOTHING"#,
        )
        .bind(&account.account_number)
        .bind(account.user_id)
        .bind(account.tier)
        .bind(&account.r#type)
        .bind(&account.currency)
        .bind(account.can_credit)
        .bind(account.can_debit)
        .bind(account.balance)
        .bind(account.status)
        .bind(Json(&account.additional_field))
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServerError::AccountNumberTaken(
                account.account_number.clone(),
            ));
        }

        Ok(())
    }
}
