use tracing::debug;
use url::Url;

/// Reduce a full page URL to its site-identity key: scheme + host (and
/// port, when one is present). Multiple crawled pages of one site must
/// collapse to a single Site node.
///
/// Never fails: anything that does not parse as a URL with a host is
/// returned unchanged and becomes its own domain key.
pub fn normalize_domain(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) => match url.host_str() {
            Some(host) => {
                let domain = match url.port() {
                    Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
                    None => format!("{}://{}", url.scheme(), host),
                };
                debug!(raw, domain = domain.as_str(), "Normalized site domain");
                domain
            }
            None => raw.to_string(),
        },
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_path_query_and_fragment() {
        assert_eq!(
            normalize_domain("https://example.com/deposit?ref=promo#top"),
            "https://example.com"
        );
    }

    #[test]
    fn keeps_explicit_port() {
        assert_eq!(
            normalize_domain("http://example.com:8080/login"),
            "http://example.com:8080"
        );
    }

    #[test]
    fn two_pages_of_one_site_share_a_key() {
        let a = normalize_domain("https://example.com/deposit");
        let b = normalize_domain("https://example.com/withdraw");
        assert_eq!(a, b);
    }

    #[test]
    fn unparsable_input_is_returned_unchanged() {
        assert_eq!(normalize_domain("not a url"), "not a url");
        assert_eq!(normalize_domain(""), "");
    }
}
