//! Database operations for users.

use chrono::NaiveDateTime;
use sea_orm::*;

use crate::entity::user::{self, Entity as User};
use crate::error::{AppError, AppResult};

/// Insert a user and return its id. Duplicate usernames are a validation
/// failure, matching the admin endpoint contract.
pub async fn add_user<C: ConnectionTrait>(
    db: &C,
    username: &str,
    password_hash: &str,
    now: NaiveDateTime,
) -> AppResult<i32> {
    if find_by_username(db, username).await?.is_some() {
        return Err(AppError::Validation("User already exists".to_string()));
    }

    let model = user::ActiveModel {
        id: NotSet,
        username: Set(username.to_string()),
        password_hash: Set(password_hash.to_string()),
        created_at: Set(now),
    };

    let result = User::insert(model).exec(db).await?;
    Ok(result.last_insert_id)
}

/// Find a user by id.
pub async fn get_user<C: ConnectionTrait>(db: &C, id: i32) -> AppResult<Option<user::Model>> {
    let result = User::find_by_id(id).one(db).await?;
    Ok(result)
}

/// Find a user by username.
pub async fn find_by_username<C: ConnectionTrait>(
    db: &C,
    username: &str,
) -> AppResult<Option<user::Model>> {
    let result = User::find()
        .filter(user::Column::Username.eq(username))
        .one(db)
        .await?;
    Ok(result)
}

/// Delete a user by id. Returns false when it did not exist.
pub async fn delete_user<C: ConnectionTrait>(db: &C, id: i32) -> AppResult<bool> {
    let result = User::delete_by_id(id).exec(db).await?;
    Ok(result.rows_affected > 0)
}
