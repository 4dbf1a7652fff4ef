//! Account opening workflow.
//!
//! A user and their first account are written on the same transaction:
//! both rows exist after a commit, neither after a rollback.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;
use sqlx::{PgConnection, Postgres, Transaction};
use tokio::time::Instant;

use crate::account::{Account, AccountNumberGenerator, AccountRepository};
use crate::config::AccountDefaults;
use crate::database::Database;
use crate::error::{Result, ServerError};
use crate::notifier::Notifier;
use crate::user::{User, UserRepository};
use crate::AppState;

/// Attempts to find a free account number before giving up.
pub const MAX_NUMBER_ATTEMPTS: u32 = 5;

/// Open users and accounts.
#[derive(Clone)]
pub struct Onboarding {
    db: Database,
    users: UserRepository,
    accounts: AccountRepository,
    numbers: Arc<dyn AccountNumberGenerator>,
    notifier: Notifier,
    defaults: AccountDefaults,
    timeout: Duration,
}

impl Onboarding {
    /// Create a new [`Onboarding`].
    pub fn new(
        db: Database,
        numbers: Arc<dyn AccountNumberGenerator>,
        notifier: Notifier,
        defaults: AccountDefaults,
        timeout: Duration,
    ) -> Self {
        Self {
            db,
            users: UserRepository,
            accounts: AccountRepository,
            numbers,
            notifier,
            defaults,
            timeout,
        }
    }

    /// Persist an already validated `user` with a new account.
    ///
    /// Opening the transaction and every write share one deadline. Any
    /// failure once the transaction is open rolls it back. A failed commit
    /// leaves the outcome unknown and is reported as [`ServerError::Commit`].
    pub async fn open(&self, mut user: User) -> Result<(User, Account)> {
        // waiting for a pooled connection counts against the deadline too.
        let deadline = Instant::now() + self.timeout;

        let mut tx = match tokio::time::timeout_at(deadline, self.db.begin()).await {
            Ok(tx) => tx?,
            Err(_) => return Err(ServerError::TransactionTimeout),
        };

        let written = tokio::time::timeout_at(deadline, self.write(&mut tx, &user))
            .await
            .unwrap_or(Err(ServerError::TransactionTimeout));

        let account = match written {
            Ok(account) => account,
            Err(err) => {
                rollback(tx, &err).await;
                return Err(err);
            },
        };

        tx.commit().await.map_err(ServerError::Commit)?;

        user.id = account.user_id;
        metrics::counter!("accounts_opened_total").increment(1);
        tracing::info!(
            user_id = user.id,
            account_number = %account.account_number,
            "account opened"
        );

        self.notifier.notify(&user, &account);

        Ok((user, account))
    }

    async fn write(&self, tx: &mut Transaction<'static, Postgres>, user: &User) -> Result<Account> {
        let conn: &mut PgConnection = tx;
        let user_id = self.users.insert(conn, user).await?;

        for attempt in 1..=MAX_NUMBER_ATTEMPTS {
            let account = Account::open(
                &self.defaults,
                self.numbers.generate(),
                user_id,
                &user.account_type,
            );

            match self.accounts.insert(conn, &account).await {
                Ok(()) => return Ok(account),
                Err(ServerError::AccountNumberTaken(number)) => {
                    tracing::warn!(%number, attempt, "account number collision");
                },
                Err(err) => return Err(err),
            }
        }

        Err(ServerError::AccountNumberExhausted(MAX_NUMBER_ATTEMPTS))
    }
}

impl FromRef<AppState> for Onboarding {
    fn from_ref(app_state: &AppState) -> Onboarding {
        app_state.onboarding.clone()
    }
}

async fn rollback(tx: Transaction<'static, Postgres>, cause: &ServerError) {
    match tx.rollback().await {
        Ok(()) => tracing::debug!(error = %cause, "transaction rolled back"),
        Err(err) => tracing::error!(
            error = %err,
            cause = %cause,
            "rollback failed, the server discards the transaction"
        ),
    }
}
