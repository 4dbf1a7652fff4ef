//! Onboard a customer: create the user and open their first account.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::error::Result;
use crate::onboarding::Onboarding;
use crate::router::Valid;
use crate::user::User;

pub const SUCCESS_MESSAGE: &str = "Account created successfully";

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: bool,
    pub message: String,
    pub user: User,
    pub account: Account,
}

/// Handler of `POST /createAccount`.
pub async fn handler(
    State(onboarding): State<Onboarding>,
    Valid(user): Valid<User>,
) -> Result<Json<Response>> {
    let (user, account) = onboarding.open(user).await?;

    Ok(Json(Response {
        status: true,
        message: SUCCESS_MESSAGE.to_owned(),
        user,
        account,
    }))
}
