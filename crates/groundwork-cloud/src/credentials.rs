//! Scoped credential contexts
//!
//! The result of assuming the cross-account operator role. Always carried
//! as an explicit value on an adapter scoped to one account — never
//! written into ambient process state — so concurrent branches can hold
//! independent contexts.

use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// `sts assume-role` response envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct AssumeRoleResponse {
    #[serde(rename = "Credentials")]
    pub credentials: AssumedCredentials,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssumedCredentials {
    #[serde(rename = "AccessKeyId")]
    pub access_key_id: String,

    #[serde(rename = "SecretAccessKey")]
    pub secret_access_key: String,

    #[serde(rename = "SessionToken")]
    pub session_token: String,

    #[serde(rename = "Expiration")]
    pub expiration: Option<DateTime<Utc>>,
}

impl From<AssumedCredentials> for Credentials {
    fn from(c: AssumedCredentials) -> Self {
        Self {
            access_key_id: c.access_key_id,
            secret_access_key: c.secret_access_key,
            session_token: c.session_token,
            expiration: c.expiration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_assume_role_response() {
        let json = r#"{
            "Credentials": {
                "AccessKeyId": "ASIAEXAMPLE",
                "SecretAccessKey": "secret",
                "SessionToken": "token",
                "Expiration": "2026-08-07T13:00:00Z"
            },
            "AssumedRoleUser": {
                "AssumedRoleId": "AROAEXAMPLE:groundwork",
                "Arn": "arn:aws:sts::222222222222:assumed-role/OrganizationAccountAccessRole/groundwork"
            }
        }"#;

        let response: AssumeRoleResponse = serde_json::from_str(json).unwrap();
        let credentials: Credentials = response.credentials.into();
        assert_eq!(credentials.access_key_id, "ASIAEXAMPLE");
        assert!(credentials.expiration.is_some());
    }
}
