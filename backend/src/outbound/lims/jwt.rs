//! Expiry extraction from LIMS access tokens.
//!
//! Only the payload's `exp` claim is read. The signature is never checked
//! here; the LIMS validates its own tokens.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ExpiryClaim {
    exp: i64,
}

/// Expiry instant carried by `token`.
pub(super) fn expiry(token: &str) -> Result<DateTime<Utc>, String> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_)) => payload,
        _ => return Err("access token is not a three-part JWT".to_owned()),
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|error| format!("access token payload is not base64url: {error}"))?;
    let claim: ExpiryClaim = serde_json::from_slice(&bytes)
        .map_err(|error| format!("access token payload has no numeric exp: {error}"))?;
    DateTime::from_timestamp(claim.exp, 0)
        .ok_or_else(|| format!("access token exp {} is out of range", claim.exp))
}

#[cfg(test)]
pub(super) fn forge(payload: &str) -> String {
    format!(
        "{}.{}.signature",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(payload.as_bytes())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    fn reads_exp_claim() {
        let token = forge(r#"{"token_type":"access","exp":1767614400,"user_id":3}"#);
        let expected = Utc
            .with_ymd_and_hms(2026, 1, 5, 12, 0, 0)
            .single()
            .expect("valid timestamp");

        assert_eq!(expiry(&token), Ok(expected));
    }

    #[rstest]
    #[case::not_a_jwt("opaque-token")]
    #[case::bad_base64("header.!!!.sig")]
    #[case::no_exp(&forge(r#"{"token_type":"access"}"#))]
    #[case::string_exp(&forge(r#"{"exp":"soon"}"#))]
    fn rejects_tokens_without_a_usable_expiry(#[case] token: &str) {
        assert!(expiry(token).is_err());
    }
}
