//! HTTP API.
pub mod create_account;

use axum::Json;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::ServerError;

/// JSON body that passed validation.
///
/// Malformed bodies and failing validation are both rejected with
/// `400 Bad Request` before the handler runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Valid<T>(pub T);

impl<S, T> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

#[cfg(test)]
pub(crate) fn state(pool: sqlx::Pool<sqlx::Postgres>) -> crate::AppState {
    use std::sync::Arc;

    use crate::account::RandomAccountNumber;
    use crate::config::Configuration;
    use crate::database::Database;
    use crate::notifier::{LogDelivery, Notifier};
    use crate::onboarding::Onboarding;

    let config = Arc::new(Configuration::default());
    let db = Database::from_pool(pool);
    let (notifier, _) = Notifier::spawn(
        Arc::new(LogDelivery),
        crate::notifier::tests::options(),
    );
    let onboarding = Onboarding::new(
        db.clone(),
        Arc::new(RandomAccountNumber::new(config.account.number_length)),
        notifier,
        config.account.clone(),
        config.transaction_timeout(),
    );

    crate::AppState {
        config,
        db,
        onboarding,
        metrics: None,
    }
}
