use url::Url;

const INVALID_SCHEME: &str = "Endpoint URL scheme must be https:// or http://";

/// Clap value_parser for `--endpoint-url`.
pub fn check_scheme(url: &str) -> Result<String, String> {
    let parsed = Url::parse(url).map_err(|e| e.to_string())?;

    match parsed.scheme() {
        "https" | "http" => Ok(url.to_string()),
        _ => Err(INVALID_SCHEME.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_https() {
        assert_eq!(
            check_scheme("https://s3.eu-north-1.amazonaws.com").unwrap(),
            "https://s3.eu-north-1.amazonaws.com"
        );
        assert!(check_scheme("http://localhost:9000").is_ok());
    }

    #[test]
    fn rejects_other_schemes() {
        assert_eq!(
            check_scheme("ftp://localhost").unwrap_err(),
            INVALID_SCHEME.to_string()
        );
        assert!(check_scheme("not a url").is_err());
    }
}
