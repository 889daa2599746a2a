//! Credential generation and HMAC channel authentication.
//!
//! The signed message is the literal string
//! `"<ts>.<email>.<api_key>.<body>"`; signatures are lowercase-hex
//! HMAC-SHA256 keyed by the credential secret. Verification is
//! constant-time over equal lengths and rejects mismatched lengths
//! without iterating.

use chrono::Utc;
use hmac::{Hmac, Mac};
use quill_protocol::{API_KEY_PREFIX, ApiCredential, SECRET_PREFIX, SyncError, SyncResult};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use sqlx::Row;
use sqlx::postgres::PgRow;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{Store, db_error};

type HmacSha256 = Hmac<Sha256>;

/// Accepted clock skew between client and server, in seconds.
pub const TIMESTAMP_WINDOW_SECS: i64 = 300;

/// A freshly generated key/secret pair; the secret is only ever
/// returned at generation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCredentials {
    pub api_key: String,
    pub secret: String,
}

/// Generate an `rpa_`-prefixed key and `rps_`-prefixed secret, each 64
/// lowercase-hex characters drawn from the OS CSPRNG.
pub fn generate_credentials() -> GeneratedCredentials {
    GeneratedCredentials {
        api_key: format!("{API_KEY_PREFIX}{}", random_hex()),
        secret: format!("{SECRET_PREFIX}{}", random_hex()),
    }
}

fn random_hex() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Sign the canonical message for a join request.
pub fn create_signature(
    secret: &str,
    timestamp: i64,
    email: &str,
    api_key: &str,
    body: &str,
) -> String {
    let mac = signing_mac(secret, timestamp, email, api_key, body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a lowercase-hex signature.
pub fn verify_signature(
    secret: &str,
    signature: &str,
    timestamp: i64,
    email: &str,
    api_key: &str,
    body: &str,
) -> bool {
    let Ok(provided) = hex::decode(signature) else {
        return false;
    };
    let mac = signing_mac(secret, timestamp, email, api_key, body);
    mac.verify_slice(&provided).is_ok()
}

fn signing_mac(
    secret: &str,
    timestamp: i64,
    email: &str,
    api_key: &str,
    body: &str,
) -> HmacSha256 {
    let message = format!("{timestamp}.{email}.{api_key}.{body}");
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(message.as_bytes());
    mac
}

impl Store {
    /// Authenticate a join request. Checks run in order: timestamp
    /// window, active-credential lookup, signature. The `last_used_at`
    /// touch is best-effort and never fails the authentication.
    #[instrument(skip(self, signature, body))]
    pub async fn verify_hmac(
        &self,
        api_key: &str,
        signature: &str,
        timestamp: i64,
        email: &str,
        body: &str,
    ) -> SyncResult<ApiCredential> {
        let now = Utc::now().timestamp();
        if (now - timestamp).abs() > TIMESTAMP_WINDOW_SECS {
            return Err(SyncError::TimestampExpired);
        }

        let credential = self
            .find_active_credential(api_key)
            .await?
            .ok_or(SyncError::InvalidApiKey)?;

        if !verify_signature(&credential.secret, signature, timestamp, email, api_key, body) {
            return Err(SyncError::InvalidSignature);
        }

        if let Err(error) = self.touch_credential(credential.id).await {
            warn!(%error, api_key, "failed to update credential last_used_at");
        }

        Ok(credential)
    }

    /// Generate and persist a named credential pair.
    #[instrument(skip(self))]
    pub async fn create_credential(&self, name: &str) -> SyncResult<ApiCredential> {
        let generated = generate_credentials();
        let row = sqlx::query(
            "INSERT INTO api_credentials (id, api_key, secret, name) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, api_key, secret, name, last_used_at, is_active, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(&generated.api_key)
        .bind(&generated.secret)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        credential_from_row(&row).map_err(db_error)
    }

    async fn find_active_credential(&self, api_key: &str) -> SyncResult<Option<ApiCredential>> {
        let row = sqlx::query(
            "SELECT id, api_key, secret, name, last_used_at, is_active, created_at \
             FROM api_credentials WHERE api_key = $1 AND is_active",
        )
        .bind(api_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(|row| credential_from_row(&row).map_err(db_error))
            .transpose()
    }

    async fn touch_credential(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE api_credentials SET last_used_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn credential_from_row(row: &PgRow) -> Result<ApiCredential, sqlx::Error> {
    Ok(ApiCredential {
        id: row.try_get("id")?,
        api_key: row.try_get("api_key")?,
        secret: row.try_get("secret")?,
        name: row.try_get("name")?,
        last_used_at: row.try_get("last_used_at")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_lower_hex(s: &str) -> bool {
        s.chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
    }

    #[test]
    fn generated_credentials_match_the_documented_format() {
        let generated = generate_credentials();
        assert!(generated.api_key.starts_with(API_KEY_PREFIX));
        assert!(generated.secret.starts_with(SECRET_PREFIX));
        assert_eq!(generated.api_key.len(), 4 + 64);
        assert_eq!(generated.secret.len(), 4 + 64);
        assert!(is_lower_hex(&generated.api_key[4..]));
        assert!(is_lower_hex(&generated.secret[4..]));
    }

    #[test]
    fn generated_credentials_are_unique() {
        let a = generate_credentials();
        let b = generate_credentials();
        assert_ne!(a.api_key, b.api_key);
        assert_ne!(a.secret, b.secret);
    }

    #[test]
    fn signature_is_deterministic_lowercase_hex() {
        let a = create_signature("rps_secret", 1700000000, "a@b.c", "rpa_key", "");
        let b = create_signature("rps_secret", 1700000000, "a@b.c", "rpa_key", "");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(is_lower_hex(&a));
    }

    #[test]
    fn any_input_change_yields_a_different_signature() {
        let base = create_signature("rps_secret", 1700000000, "a@b.c", "rpa_key", "");
        assert_ne!(
            base,
            create_signature("rps_other", 1700000000, "a@b.c", "rpa_key", "")
        );
        assert_ne!(
            base,
            create_signature("rps_secret", 1700000001, "a@b.c", "rpa_key", "")
        );
        assert_ne!(
            base,
            create_signature("rps_secret", 1700000000, "x@b.c", "rpa_key", "")
        );
        assert_ne!(
            base,
            create_signature("rps_secret", 1700000000, "a@b.c", "rpa_other", "")
        );
        assert_ne!(
            base,
            create_signature("rps_secret", 1700000000, "a@b.c", "rpa_key", "{}")
        );
    }

    #[test]
    fn verify_accepts_the_matching_signature() {
        let signature = create_signature("rps_secret", 1700000000, "a@b.c", "rpa_key", "");
        assert!(verify_signature(
            "rps_secret",
            &signature,
            1700000000,
            "a@b.c",
            "rpa_key",
            ""
        ));
    }

    #[test]
    fn verify_rejects_tampering_and_bad_encodings() {
        let signature = create_signature("rps_secret", 1700000000, "a@b.c", "rpa_key", "");
        assert!(!verify_signature(
            "rps_secret",
            &signature,
            1700000001,
            "a@b.c",
            "rpa_key",
            ""
        ));
        // Truncated signature: wrong length fails outright.
        assert!(!verify_signature(
            "rps_secret",
            &signature[..32],
            1700000000,
            "a@b.c",
            "rpa_key",
            ""
        ));
        // Not hex at all.
        assert!(!verify_signature(
            "rps_secret",
            "zz-not-hex",
            1700000000,
            "a@b.c",
            "rpa_key",
            ""
        ));
    }
}
