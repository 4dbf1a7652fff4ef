//! Handle database requests.

use sqlx::PgConnection;

use crate::error::Result;
use crate::user::User;

/// Writes on the `users` table.
///
/// Every query runs on a connection supplied by the caller, which owns the
/// transaction.
#[derive(Clone, Copy, Debug, Default)]
pub struct UserRepository;

impl UserRepository {
    /// Insert [`User`] into database and return its generated id.
    ///
    /// Fails on duplicate NIN or BVN.
    pub async fn insert(&self, conn: &mut PgConnection, user: &User) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"INSERT INTO users (
                firstname, middlename, lastname, email, address, city, state,
                postal_code, country, date_of_birth, phone_number, nin, bvn, account_type
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING id"#,
        )
        .bind(&user.firstname)
        .bind(&user.middlename)
        .bind(&user.lastname)
        .bind(&user.email)
        .bind(&user.address)
        .bind(&user.city)
        .bind(&user.state)
        .bind(&user.postal_code)
        .bind(&user.country)
        .bind(user.date_of_birth)
        .bind(&user.phone_number)
        .bind(&user.nin)
        .bind(&user.bvn)
        .bind(&user.account_type)
        .fetch_one(&mut *conn)
        .await?;

        Ok(id)
    }
}
