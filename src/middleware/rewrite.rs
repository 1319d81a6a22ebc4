//! Pantry path rewriting.
//!
//! Translates a public request such as `GET /my-basket` with an
//! `X-Pantry-Key: <id>` header into the storage API path
//! `/apiv1/pantry/<id>/basket/my-basket`. The key header is consumed here and
//! never reaches the backend.
//!
//! The basket regex runs on the percent-decoded request path, as bytes. It is
//! compiled with Unicode mode off, so `[^/]` also matches bytes that are not
//! UTF-8; patterns can turn it back on locally with `(?u:...)`.
//!
//! Rewriting an already rewritten path is not supported: the basket regex runs
//! on whatever path it is given, so `/apiv1/pantry/x` becomes
//! `/apiv1/pantry/x/basket/x`.

use axum::http::header::HeaderName;
use axum::http::uri::PathAndQuery;
use axum::http::{HeaderValue, Request, Uri};
use regex::bytes::{Regex, RegexBuilder};

use super::escape::{decode_path, escape_path};
use crate::config::{MissingIdentifierPolicy, PantryPathConfig};
use crate::errors::{ConfigError, RewriteError};

/// Pantry ID substituted when the key header is missing and the policy allows it.
pub const UNKNOWN_PANTRY_ID: &str = "unknown";

// Compiled program cap for user supplied patterns.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Path to the root of a pantry.
pub fn build_pantry_path(key: &str) -> String {
    format!("/apiv1/pantry/{}", key)
}

/// Path to a basket inside a pantry.
pub fn build_pantry_path_with_basket(key: &str, basket: &str) -> String {
    format!("/apiv1/pantry/{}/basket/{}", key, basket)
}

/// Decoded form of the rewritten path, stored as a request extension when
/// `resync_raw_path` is on. The request URI holds the escaped form.
///
/// Kept as bytes since a valid escape such as `%E9` need not decode to UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenPath(pub Vec<u8>);

impl RewrittenPath {
    pub fn to_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }
}

/// Immutable rewrite rules: config plus the pre-compiled basket regex.
#[derive(Debug)]
pub struct PathRewriter {
    config: PantryPathConfig,
    key_header: HeaderName,
    replaced_path_header: Option<HeaderName>,
    basket_re: Regex,
}

impl PathRewriter {
    pub fn new(config: PantryPathConfig) -> Result<Self, ConfigError> {
        if config.key_header.is_empty() {
            return Err(ConfigError::EmptyKeyHeader);
        }
        if config.basket_regex.is_empty() {
            return Err(ConfigError::EmptyBasketRegex);
        }

        let key_header = parse_header_name(&config.key_header)?;
        let replaced_path_header = config
            .replaced_path_header
            .as_deref()
            .map(parse_header_name)
            .transpose()?;

        let basket_re = RegexBuilder::new(&config.basket_regex)
            .unicode(false)
            .size_limit(REGEX_SIZE_LIMIT)
            .build()
            .map_err(|source| ConfigError::InvalidBasketRegex {
                pattern: config.basket_regex.clone(),
                source,
            })?;

        // captures_len counts the implicit whole-match group
        if basket_re.captures_len() < 2 {
            return Err(ConfigError::MissingCaptureGroup {
                pattern: config.basket_regex.clone(),
            });
        }

        Ok(Self {
            config,
            key_header,
            replaced_path_header,
            basket_re,
        })
    }

    pub fn config(&self) -> &PantryPathConfig {
        &self.config
    }

    /// Basket name captured from a decoded `path`, if the regex matches.
    pub fn basket<'p>(&self, path: &'p [u8]) -> Option<&'p [u8]> {
        self.basket_re
            .captures(path)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_bytes())
    }

    /// Storage path for a decoded `path` under `pantry_id`, before escaping.
    pub fn target_path(&self, pantry_id: &str, path: &[u8]) -> Vec<u8> {
        let mut target = build_pantry_path(pantry_id).into_bytes();
        if let Some(basket) = self.basket(path) {
            target.extend_from_slice(b"/basket/");
            target.extend_from_slice(basket);
        }
        target
    }

    /// Rewrite `req` in place.
    ///
    /// On error the request must not be forwarded; the error converts into
    /// the response to send instead.
    pub fn rewrite<B>(&self, req: &mut Request<B>) -> Result<(), RewriteError> {
        let pantry_id = req
            .headers()
            .get(&self.key_header)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_owned);

        if let Some(name) = &self.replaced_path_header {
            if let Ok(original) = HeaderValue::from_str(req.uri().path()) {
                req.headers_mut().insert(name.clone(), original);
            }
        }
        req.headers_mut().remove(&self.key_header);

        let pantry_id = match pantry_id {
            Some(id) => id,
            None => {
                tracing::warn!(
                    header = %self.key_header,
                    path = %req.uri().path(),
                    policy = ?self.config.on_missing_identifier,
                    "pantry id not found"
                );
                match self.config.on_missing_identifier {
                    MissingIdentifierPolicy::Reject => return Err(RewriteError::MissingIdentifier),
                    MissingIdentifierPolicy::Substitute => UNKNOWN_PANTRY_ID.to_string(),
                }
            }
        };

        let raw_path = req.uri().path();
        let request_path = decode_path(raw_path.as_bytes()).unwrap_or_else(|err| {
            tracing::debug!(path = %raw_path, error = %err, "matching undecodable path as is");
            raw_path.as_bytes().to_vec()
        });
        let pantry_path = self.target_path(&pantry_id, &request_path);

        let target = if self.config.resync_raw_path {
            let decoded = decode_path(&pantry_path).map_err(|source| {
                let path = String::from_utf8_lossy(&pantry_path).into_owned();
                tracing::error!(new_path = %path, error = %source, "unable to parse the new URL");
                RewriteError::PathDecode { path, source }
            })?;
            let escaped = escape_path(&decoded);
            req.extensions_mut().insert(RewrittenPath(decoded));
            escaped
        } else {
            escape_path(&pantry_path)
        };

        let uri = with_path(req.uri(), &target).map_err(|source| {
            tracing::error!(new_path = %target, error = %source, "rewritten path is not a valid URI");
            RewriteError::InvalidUri {
                path: target.clone(),
                source,
            }
        })?;

        tracing::debug!(from = %req.uri().path(), to = %uri.path(), "rewrote pantry path");
        *req.uri_mut() = uri;
        Ok(())
    }
}

fn parse_header_name(name: &str) -> Result<HeaderName, ConfigError> {
    HeaderName::try_from(name).map_err(|_| ConfigError::InvalidHeaderName {
        name: name.to_string(),
    })
}

/// Replace the path of `uri`, keeping scheme, authority and query.
fn with_path(uri: &Uri, path: &str) -> Result<Uri, axum::http::Error> {
    let path_and_query = match uri.query() {
        Some(query) => format!("{}?{}", path, query),
        None => path.to_string(),
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::try_from(path_and_query)?);
    Ok(Uri::from_parts(parts)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "715489ae-0dfd-44a4-b12b-bd7b9f69a473";

    fn request(path: &str, key: Option<&str>) -> Request<()> {
        let mut builder = Request::builder().uri(path);
        if let Some(key) = key {
            builder = builder.header("X-Pantry-Key", key);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_build_paths() {
        assert_eq!(build_pantry_path("k"), "/apiv1/pantry/k");
        assert_eq!(build_pantry_path_with_basket("k", "b"), "/apiv1/pantry/k/basket/b");
    }

    #[test]
    fn test_basket_extraction_default_regex() {
        let rw = PathRewriter::new(PantryPathConfig::default()).unwrap();
        assert_eq!(rw.basket(b"/test-basket-name"), Some(&b"test-basket-name"[..]));
        assert_eq!(rw.basket(b"/this-is/the-prefix/b1/"), Some(&b"b1"[..]));
        assert_eq!(rw.basket(b"/caf\xE9"), Some(&b"caf\xE9"[..]));
        assert_eq!(rw.basket(b"/"), None);
        assert_eq!(rw.basket(b""), None);
    }

    #[test]
    fn test_optional_group_without_participation_is_no_basket() {
        let cfg = PantryPathConfig {
            basket_regex: r"^/(?:b/([a-z]+))?$".into(),
            ..PantryPathConfig::default()
        };
        let rw = PathRewriter::new(cfg).unwrap();
        assert_eq!(rw.basket(b"/"), None);
        assert_eq!(rw.basket(b"/b/abc"), Some(&b"abc"[..]));
    }

    #[test]
    fn test_rejects_empty_key_header() {
        let cfg = PantryPathConfig {
            key_header: String::new(),
            ..PantryPathConfig::default()
        };
        assert!(matches!(PathRewriter::new(cfg), Err(ConfigError::EmptyKeyHeader)));
    }

    #[test]
    fn test_rejects_empty_regex() {
        let cfg = PantryPathConfig {
            basket_regex: String::new(),
            ..PantryPathConfig::default()
        };
        assert!(matches!(PathRewriter::new(cfg), Err(ConfigError::EmptyBasketRegex)));
    }

    #[test]
    fn test_rejects_uncompilable_regex() {
        let cfg = PantryPathConfig {
            basket_regex: "([".into(),
            ..PantryPathConfig::default()
        };
        let err = PathRewriter::new(cfg).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBasketRegex { .. }));
        assert!(err.to_string().starts_with("error compiling regex \"([\""));
    }

    #[test]
    fn test_rejects_regex_without_group() {
        let cfg = PantryPathConfig {
            basket_regex: "[^/]+$".into(),
            ..PantryPathConfig::default()
        };
        assert!(matches!(
            PathRewriter::new(cfg),
            Err(ConfigError::MissingCaptureGroup { .. })
        ));
    }

    #[test]
    fn test_rejects_invalid_header_names() {
        let cfg = PantryPathConfig {
            key_header: "X Pantry Key".into(),
            ..PantryPathConfig::default()
        };
        assert!(matches!(
            PathRewriter::new(cfg),
            Err(ConfigError::InvalidHeaderName { .. })
        ));

        let cfg = PantryPathConfig {
            replaced_path_header: Some("bad header".into()),
            ..PantryPathConfig::default()
        };
        assert!(matches!(
            PathRewriter::new(cfg),
            Err(ConfigError::InvalidHeaderName { .. })
        ));
    }

    #[test]
    fn test_rewrite_with_basket() {
        let rw = PathRewriter::new(PantryPathConfig::default()).unwrap();
        let mut req = request("/test-basket-name", Some(ID));
        rw.rewrite(&mut req).unwrap();

        assert_eq!(
            req.uri().path(),
            format!("/apiv1/pantry/{}/basket/test-basket-name", ID)
        );
        assert!(req.headers().get("x-pantry-key").is_none());
        assert_eq!(req.headers()["x-replaced-path"], "/test-basket-name");
    }

    #[test]
    fn test_rewrite_root_has_no_basket() {
        let rw = PathRewriter::new(PantryPathConfig::default()).unwrap();
        let mut req = request("/", Some(ID));
        rw.rewrite(&mut req).unwrap();
        assert_eq!(req.uri().path(), format!("/apiv1/pantry/{}", ID));
    }

    #[test]
    fn test_rewrite_keeps_query() {
        let rw = PathRewriter::new(PantryPathConfig::default()).unwrap();
        let mut req = request("http://localhost/list?limit=5", Some("k"));
        rw.rewrite(&mut req).unwrap();
        assert_eq!(req.uri().to_string(), "http://localhost/apiv1/pantry/k/basket/list?limit=5");
    }

    #[test]
    fn test_empty_key_counts_as_missing() {
        let rw = PathRewriter::new(PantryPathConfig::lenient()).unwrap();
        let mut req = request("/b", Some(""));
        rw.rewrite(&mut req).unwrap();
        assert_eq!(req.uri().path(), "/apiv1/pantry/unknown/basket/b");
    }

    #[test]
    fn test_strict_missing_key_is_error() {
        let rw = PathRewriter::new(PantryPathConfig::default()).unwrap();
        let mut req = request("/b", None);
        assert!(matches!(rw.rewrite(&mut req), Err(RewriteError::MissingIdentifier)));
    }

    #[test]
    fn test_resync_decodes_into_extension() {
        let rw = PathRewriter::new(PantryPathConfig::default()).unwrap();
        let mut req = request("/my%20basket", Some("k"));
        rw.rewrite(&mut req).unwrap();

        let decoded = req.extensions().get::<RewrittenPath>().unwrap();
        assert_eq!(decoded.to_str(), Some("/apiv1/pantry/k/basket/my basket"));
        assert_eq!(req.uri().path(), "/apiv1/pantry/k/basket/my%20basket");
    }

    #[test]
    fn test_resync_bad_escape_is_decode_error() {
        let rw = PathRewriter::new(PantryPathConfig::default()).unwrap();
        let mut req = request("/bad%zzbasket", Some("k"));
        let err = rw.rewrite(&mut req).unwrap_err();
        assert!(matches!(err, RewriteError::PathDecode { .. }));
    }

    #[test]
    fn test_encoded_slash_is_decoded_before_matching() {
        for cfg in [PantryPathConfig::default(), PantryPathConfig::lenient()] {
            let rw = PathRewriter::new(cfg).unwrap();
            let mut req = request("/a%2Fb", Some("k"));
            rw.rewrite(&mut req).unwrap();
            assert_eq!(req.uri().path(), "/apiv1/pantry/k/basket/b");
        }
    }

    #[test]
    fn test_encoded_percent_in_basket() {
        let rw = PathRewriter::new(PantryPathConfig::default()).unwrap();
        let mut req = request("/50%25", Some("k"));
        let err = rw.rewrite(&mut req).unwrap_err();
        assert!(matches!(
            err,
            RewriteError::PathDecode { ref path, .. } if path == "/apiv1/pantry/k/basket/50%"
        ));

        let rw = PathRewriter::new(PantryPathConfig::lenient()).unwrap();
        let mut req = request("/50%25", Some("k"));
        rw.rewrite(&mut req).unwrap();
        assert_eq!(req.uri().path(), "/apiv1/pantry/k/basket/50%25");
    }

    #[test]
    fn test_non_utf8_escape_is_forwarded() {
        let rw = PathRewriter::new(PantryPathConfig::default()).unwrap();
        let mut req = request("/caf%E9", Some("k"));
        rw.rewrite(&mut req).unwrap();

        assert_eq!(req.uri().path(), "/apiv1/pantry/k/basket/caf%E9");
        let decoded = req.extensions().get::<RewrittenPath>().unwrap();
        assert_eq!(decoded.0, b"/apiv1/pantry/k/basket/caf\xE9");
        assert_eq!(decoded.to_str(), None);
    }

    #[test]
    fn test_plain_mode_escapes_built_path() {
        let rw = PathRewriter::new(PantryPathConfig::lenient()).unwrap();
        let mut req = request("/my%20basket", Some("k"));
        rw.rewrite(&mut req).unwrap();

        assert_eq!(req.uri().path(), "/apiv1/pantry/k/basket/my%20basket");
        assert!(req.extensions().get::<RewrittenPath>().is_none());
        assert!(req.headers().get("x-replaced-path").is_none());
    }

    #[test]
    fn test_plain_mode_key_cannot_inject_query_or_fragment() {
        let rw = PathRewriter::new(PantryPathConfig::lenient()).unwrap();

        let mut req = request("/basket", Some("a?b"));
        rw.rewrite(&mut req).unwrap();
        assert_eq!(req.uri().path(), "/apiv1/pantry/a%3Fb/basket/basket");
        assert_eq!(req.uri().query(), None);

        let mut req = request("/basket", Some("a#b"));
        rw.rewrite(&mut req).unwrap();
        assert_eq!(req.uri().path(), "/apiv1/pantry/a%23b/basket/basket");
        assert_eq!(req.uri().query(), None);
    }

    #[test]
    fn test_plain_mode_key_with_space() {
        let rw = PathRewriter::new(PantryPathConfig::lenient()).unwrap();
        let mut req = request("/b", Some("has space"));
        rw.rewrite(&mut req).unwrap();
        assert_eq!(req.uri().path(), "/apiv1/pantry/has%20space/basket/b");
    }

    #[test]
    fn test_resync_escapes_key_with_space() {
        let rw = PathRewriter::new(PantryPathConfig::default()).unwrap();
        let mut req = request("/b", Some("has space"));
        rw.rewrite(&mut req).unwrap();
        assert_eq!(req.uri().path(), "/apiv1/pantry/has%20space/basket/b");
    }
}
