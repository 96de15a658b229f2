//! Helpers shared by the reqwest-backed adapters.

use reqwest::{StatusCode, Url};

/// Normalise `base` so relative joins append instead of replacing the last
/// path segment.
pub(crate) fn with_trailing_slash(mut base: Url) -> Url {
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

/// `status 502: <preview>` or `status 502` when the body is empty.
pub(crate) fn status_message(status: StatusCode, body: &[u8]) -> String {
    let body_preview = body_preview(body);
    if body_preview.is_empty() {
        format!("status {}", status.as_u16())
    } else {
        format!("status {}: {}", status.as_u16(), body_preview)
    }
}

fn body_preview(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let preview = compact.chars().take(PREVIEW_CHAR_LIMIT).collect::<String>();
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        format!("{preview}...")
    } else {
        preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://lims.example/api", "https://lims.example/api/token/")]
    #[case("https://lims.example/api/", "https://lims.example/api/token/")]
    #[case("https://lims.example", "https://lims.example/token/")]
    fn joins_append_to_the_base_path(#[case] base: &str, #[case] expected: &str) {
        let base = with_trailing_slash(Url::parse(base).expect("valid url"));
        let joined = base.join("token/").expect("join succeeds");

        assert_eq!(joined.as_str(), expected);
    }

    #[rstest]
    fn status_message_compacts_and_truncates_bodies() {
        let long = format!("{{\n  \"detail\": \"{}\"\n}}", "x".repeat(400));
        let message = status_message(StatusCode::BAD_GATEWAY, long.as_bytes());

        assert!(message.starts_with("status 502: { \"detail\""));
        assert!(message.ends_with("..."));
        assert_eq!(status_message(StatusCode::BAD_GATEWAY, b"  "), "status 502");
    }
}
