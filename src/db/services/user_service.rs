use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, Condition, DbConn, DbErr, EntityTrait, QueryFilter, Set};

use crate::db::entities::{prelude::User, user};

// --- User Service Functions ---

/// Creates a new user.
pub async fn create_user(
    db: &DbConn,
    username: String,
    email: String,
    password_hash: String,
) -> Result<user::Model, DbErr> {
    let now = Utc::now();
    let new_user = user::ActiveModel {
        username: Set(username),
        email: Set(email),
        password_hash: Set(password_hash),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    new_user.insert(db).await
}

/// Retrieves a user by their ID.
pub async fn get_user_by_id(db: &DbConn, user_id: i32) -> Result<Option<user::Model>, DbErr> {
    User::find_by_id(user_id).one(db).await
}

/// Retrieves a user by their email address.
pub async fn get_user_by_email(db: &DbConn, email: &str) -> Result<Option<user::Model>, DbErr> {
    User::find().filter(user::Column::Email.eq(email)).one(db).await
}

/// Finds any user that already holds the given username or email.
pub async fn find_user_by_username_or_email(
    db: &DbConn,
    username: &str,
    email: &str,
) -> Result<Option<user::Model>, DbErr> {
    User::find()
        .filter(
            Condition::any()
                .add(user::Column::Username.eq(username))
                .add(user::Column::Email.eq(email)),
        )
        .one(db)
        .await
}
