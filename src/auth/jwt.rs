use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{AppError, Result},
    message::UserId,
};

/// Claims issued by the account service. `sub` may arrive as a JSON string or
/// integer depending on the issuer.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Value,
    pub exp: i64,
}

impl Claims {
    /// The subject as a user id. Floats, negative ids and non-numeric strings
    /// are rejected rather than coerced.
    pub fn user_id(&self) -> Result<UserId> {
        let id = match &self.sub {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse::<i64>().ok(),
            _ => None,
        };

        id.filter(|id| *id > 0)
            .ok_or_else(|| AppError::Unauthorized("Invalid token subject".to_string()))
    }
}

pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized("Invalid token".to_string()))
}

#[cfg(test)]
pub(crate) fn create_test_jwt(sub: Value, secret: &str) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let claims = Claims {
        sub,
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(sub: Value) -> Claims {
        Claims { sub, exp: 0 }
    }

    #[test]
    fn test_user_id_accepts_integer_and_numeric_string() {
        assert_eq!(claims(json!(42)).user_id().unwrap(), 42);
        assert_eq!(claims(json!("42")).user_id().unwrap(), 42);
    }

    #[test]
    fn test_user_id_rejects_unclean_representations() {
        for sub in [json!(42.0), json!(4.5), json!("4.5"), json!("abc"), json!(null), json!(-1), json!(0)] {
            assert!(
                matches!(claims(sub.clone()).user_id(), Err(AppError::Unauthorized(_))),
                "accepted {sub}"
            );
        }
    }

    #[test]
    fn test_verify_roundtrip_and_wrong_secret() {
        let token = create_test_jwt(json!(7), "secret");
        let verified = verify_jwt(&token, "secret").unwrap();
        assert_eq!(verified.user_id().unwrap(), 7);

        assert!(verify_jwt(&token, "other").is_err());
        assert!(verify_jwt("not-a-token", "secret").is_err());
    }
}
