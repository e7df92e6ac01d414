//! Request URL building shared by the upstream clients

use url::Url;

use crate::error::ServiceError;

/// Appends `segments` to the path of `base_url`
///
/// Each segment is percent-encoded, so `/`, `?` and `#` in caller input stay
/// inside the segment.
pub(crate) fn endpoint_url(
    provider: &str,
    base_url: &str,
    segments: &[&str],
) -> Result<Url, ServiceError> {
    let mut url = Url::parse(base_url).map_err(|e| {
        ServiceError::malformed(provider, format!("bad base URL {}: {}", base_url, e))
    })?;
    url.path_segments_mut()
        .map_err(|_| {
            ServiceError::malformed(provider, format!("base URL {} cannot take a path", base_url))
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments_are_appended_to_base_path() {
        let url = endpoint_url("test", "https://restcountries.com/v3.1", &["alpha", "PE"]).unwrap();
        assert_eq!(url.as_str(), "https://restcountries.com/v3.1/alpha/PE");

        let url = endpoint_url("test", "http://127.0.0.1:8080/", &["photos", "abc"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/photos/abc");
    }

    #[test]
    fn test_reserved_characters_are_escaped() {
        let url = endpoint_url("test", "https://api.unsplash.com", &["photos", "a/b?c#d"]).unwrap();
        assert_eq!(url.path(), "/photos/a%2Fb%3Fc%23d");
        assert!(url.query().is_none());
        assert!(url.fragment().is_none());
    }

    #[test]
    fn test_bad_base_url_is_upstream_error() {
        let err = endpoint_url("test", "not a url", &["x"]).unwrap_err();
        assert!(matches!(err, ServiceError::Upstream { .. }));
    }
}
