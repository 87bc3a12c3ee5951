use serde::Serialize;
use sqlx::FromRow;

use crate::message::UserId;

/// The slice of a user record the messaging core needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
}
