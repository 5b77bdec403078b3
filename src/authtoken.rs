// Service-account flow for Google OAuth 2.0:
// https://developers.google.com/identity/protocols/oauth2/service-account
// A short-lived RS256 JWT assertion is exchanged at the token endpoint for a
// ~60 minute access token, used as the bearer on Firestore REST calls.

use std::{fs, time::{SystemTime, UNIX_EPOCH}, env};
use openssl::{hash::MessageDigest, pkey::{PKey, Private}, sign::Signer};
use base64::{engine::general_purpose, Engine};
use serde::Deserialize;
use serde_json::json;

use crate::util::{VAR_SA_EMAIL, VAR_SA_KEY_PATH};

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const SCOPE: &str = "https://www.googleapis.com/auth/datastore";
const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_S: u64 = 3600;

pub struct AuthToken {
    pub token: String,
    sa_email: String,
    private_key: PKey<Private>,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl AuthToken {
    pub async fn new() -> Result<AuthToken, AuthTokenError> {
        let key_path = env::var(VAR_SA_KEY_PATH).unwrap();
        let private_key_bytes = fs::read(key_path).map_err(AuthTokenError::IO)?;
        let private_key = PKey::private_key_from_pem(&private_key_bytes)
            .map_err(|_| AuthTokenError::BadPrivateKey)?;

        let mut auth_token = AuthToken {
            token: String::new(),
            sa_email: env::var(VAR_SA_EMAIL).unwrap(),
            private_key,
            http: reqwest::Client::new(),
        };
        auth_token.refresh().await?;
        Ok(auth_token)
    }

    pub async fn refresh(&mut self) -> Result<(), AuthTokenError> {
        let assertion = self.generate_signed_assertion()?;

        let response = self.http.post(TOKEN_URL)
            .form(&[("grant_type", GRANT_TYPE), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(AuthTokenError::Exchange)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthTokenError::Rejected(status, body));
        }

        let parsed: TokenResponse = response.json().await.map_err(AuthTokenError::Exchange)?;
        self.token = parsed.access_token;
        Ok(())
    }

    /// `header.claims.signature`, each segment base64url without padding.
    fn generate_signed_assertion(&self) -> Result<String, AuthTokenError> {
        let header = general_purpose::URL_SAFE_NO_PAD.encode(
            json!({ "alg": "RS256", "typ": "JWT" }).to_string().as_bytes()
        );
        let claims = self.generate_claims();
        let header_claims = format!("{header}.{claims}");

        let mut signer = Signer::new(MessageDigest::sha256(), &self.private_key)
            .map_err(|_| AuthTokenError::BadSignature)?;
        signer.update(header_claims.as_bytes()).map_err(|_| AuthTokenError::BadSignature)?;
        let signed = signer.sign_to_vec().map_err(|_| AuthTokenError::BadSignature)?;

        let signed_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signed);
        Ok(format!("{header_claims}.{signed_encoded}"))
    }

    fn generate_claims(&self) -> String {
        let now = SystemTime::now();
        let since_epoch = now.duration_since(UNIX_EPOCH).unwrap().as_secs();
        general_purpose::URL_SAFE_NO_PAD.encode(
            json!({
                "iss": self.sa_email,
                "scope": SCOPE,
                "aud": TOKEN_URL,
                "iat": since_epoch,
                "exp": since_epoch + ASSERTION_LIFETIME_S,
            }).to_string().as_bytes()
        )
    }
}

#[derive(Debug)]
pub enum AuthTokenError {
    IO(std::io::Error),
    BadPrivateKey,
    BadSignature,
    Exchange(reqwest::Error),
    Rejected(u16, String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::rsa::Rsa;

    fn test_auth_token() -> AuthToken {
        let rsa = Rsa::generate(2048).unwrap();
        AuthToken {
            token: String::new(),
            sa_email: String::from("reminder-svc@demo.iam.gserviceaccount.com"),
            private_key: PKey::from_rsa(rsa).unwrap(),
            http: reqwest::Client::new(),
        }
    }

    #[test]
    fn assertion_has_three_base64url_segments() {
        let assertion = test_auth_token().generate_signed_assertion().unwrap();
        let segments: Vec<&str> = assertion.split('.').collect();
        assert_eq!(segments.len(), 3);
        for segment in segments {
            general_purpose::URL_SAFE_NO_PAD.decode(segment).unwrap();
        }
    }

    #[test]
    fn claims_carry_issuer_scope_and_audience() {
        let auth_token = test_auth_token();
        let decoded = general_purpose::URL_SAFE_NO_PAD
            .decode(auth_token.generate_claims())
            .unwrap();
        let claims: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(claims["iss"], "reminder-svc@demo.iam.gserviceaccount.com");
        assert_eq!(claims["scope"], SCOPE);
        assert_eq!(claims["aud"], TOKEN_URL);
        assert_eq!(
            claims["exp"].as_u64().unwrap() - claims["iat"].as_u64().unwrap(),
            ASSERTION_LIFETIME_S
        );
    }
}
