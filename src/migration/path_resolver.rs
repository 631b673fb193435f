//! Turns the heterogeneous path/URL values found in the image table into a
//! bucket name, a canonical storage key and a URL the object can be fetched from.
//!
//! Accepted shapes:
//! - `https://<bucket>.<domain>/<key>` (bucket subdomain)
//! - `https://<domain>/<bucket>/<key>` (global endpoint)
//! - `<bucket>/<key...>` (bucket-prefixed relative path)
//!
//! Anything else that parses as an absolute URL is passed through untouched
//! with an empty bucket. All functions here are pure and never fail.

use super::types::ResolvedReference;
use std::borrow::Cow;
use url::Url;

pub const DEFAULT_STORAGE_DOMAIN: &str = "s3.amazonaws.com";

const PUBLIC_SEGMENT: &str = "public/";

#[derive(Debug, Clone)]
pub struct PathResolver {
    domain: String,
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::new(DEFAULT_STORAGE_DOMAIN)
    }
}

impl PathResolver {
    pub fn new(domain: impl Into<String>) -> Self {
        let domain = domain.into().trim().trim_matches('.').to_ascii_lowercase();
        Self { domain }
    }

    pub fn resolve(&self, raw: &str) -> ResolvedReference {
        let raw = raw.trim();
        if raw.is_empty() {
            return ResolvedReference::default();
        }
        match Url::parse(raw) {
            Ok(url) => self.resolve_absolute(raw, &url),
            Err(_) => self.resolve_relative(raw),
        }
    }

    fn resolve_absolute(&self, raw: &str, url: &Url) -> ResolvedReference {
        let host = match url.host_str() {
            Some(h) if matches!(url.scheme(), "http" | "https") => h.to_ascii_lowercase(),
            _ => return passthrough(raw),
        };
        let path = url.path().trim_start_matches('/');

        let (bucket, key) = if host == self.domain {
            match path.split_once('/') {
                Some((bucket, rest)) => (bucket.to_string(), percent_decode(rest)),
                None => (path.to_string(), String::new()),
            }
        } else if let Some(bucket) = host
            .strip_suffix(self.domain.as_str())
            .and_then(|prefix| prefix.strip_suffix('.'))
            .filter(|b| !b.is_empty())
        {
            (bucket.to_string(), percent_decode(path))
        } else {
            return passthrough(raw);
        };

        ResolvedReference {
            bucket_name: percent_decode(&bucket),
            canonical_key: strip_public(&key).to_string(),
            fetchable_url: raw.to_string(),
        }
    }

    fn resolve_relative(&self, raw: &str) -> ResolvedReference {
        // No '/' means we cannot tell "no bucket" from "bucket with empty key".
        let Some((bucket, key)) = raw.split_once('/') else {
            return ResolvedReference {
                bucket_name: String::new(),
                canonical_key: strip_public(raw).to_string(),
                fetchable_url: String::new(),
            };
        };
        let fetchable_url = if bucket.is_empty() || key.is_empty() {
            String::new()
        } else {
            self.object_url(bucket, key)
        };
        ResolvedReference {
            bucket_name: bucket.to_string(),
            canonical_key: strip_public(key).to_string(),
            fetchable_url,
        }
    }

    /// `https://<bucket>.<domain>/<encoded key segments>`
    pub fn object_url(&self, bucket: &str, key: &str) -> String {
        let encoded: Vec<Cow<'_, str>> = key.split('/').map(urlencoding::encode).collect();
        format!("https://{}.{}/{}", bucket, self.domain, encoded.join("/"))
    }
}

fn passthrough(raw: &str) -> ResolvedReference {
    ResolvedReference {
        bucket_name: String::new(),
        canonical_key: raw.to_string(),
        fetchable_url: raw.to_string(),
    }
}

fn strip_public(key: &str) -> &str {
    key.strip_prefix(PUBLIC_SEGMENT).unwrap_or(key)
}

fn percent_decode(s: &str) -> String {
    match urlencoding::decode(s) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> PathResolver {
        PathResolver::default()
    }

    #[test]
    fn bucket_prefixed_relative_path() {
        let r = resolver().resolve("my-bucket/images/a.jpg");
        assert_eq!(r.bucket_name, "my-bucket");
        assert_eq!(r.canonical_key, "images/a.jpg");
        assert_eq!(r.fetchable_url, "https://my-bucket.s3.amazonaws.com/images/a.jpg");
        assert!(r.is_transferable());
    }

    #[test]
    fn subdomain_url_strips_public_prefix_and_keeps_url() {
        let raw = "https://my-bucket.s3.amazonaws.com/public/images/a.jpg";
        let r = resolver().resolve(raw);
        assert_eq!(r.bucket_name, "my-bucket");
        assert_eq!(r.canonical_key, "images/a.jpg");
        assert_eq!(r.fetchable_url, raw);
    }

    #[test]
    fn global_endpoint_url_takes_bucket_from_first_segment() {
        let raw = "https://s3.amazonaws.com/my-bucket/images/a%20b.jpg";
        let r = resolver().resolve(raw);
        assert_eq!(r.bucket_name, "my-bucket");
        assert_eq!(r.canonical_key, "images/a b.jpg");
        assert_eq!(r.fetchable_url, raw);
    }

    #[test]
    fn all_three_forms_agree_on_canonical_key() {
        let forms = [
            "https://my-bucket.s3.amazonaws.com/public/images/cat%20photo.png",
            "https://s3.amazonaws.com/my-bucket/public/images/cat%20photo.png",
            "my-bucket/public/images/cat photo.png",
        ];
        let resolved: Vec<_> = forms.iter().map(|f| resolver().resolve(f)).collect();
        for r in &resolved {
            assert_eq!(r.bucket_name, "my-bucket");
            assert_eq!(r.canonical_key, "images/cat photo.png");
        }
    }

    #[test]
    fn relative_fetch_url_keeps_public_and_encodes_segments() {
        let r = resolver().resolve("my-bucket/public/images/cat photo.png");
        assert_eq!(
            r.fetchable_url,
            "https://my-bucket.s3.amazonaws.com/public/images/cat%20photo.png"
        );
    }

    #[test]
    fn empty_input_resolves_to_nothing() {
        assert_eq!(resolver().resolve(""), ResolvedReference::default());
        assert_eq!(resolver().resolve("   "), ResolvedReference::default());
    }

    #[test]
    fn input_without_slash_is_audit_only() {
        let r = resolver().resolve("photo.jpg");
        assert_eq!(r.bucket_name, "");
        assert_eq!(r.canonical_key, "photo.jpg");
        assert!(!r.is_transferable());
    }

    #[test]
    fn leading_slash_or_trailing_slash_is_not_transferable() {
        let r = resolver().resolve("/images/a.jpg");
        assert_eq!(r.bucket_name, "");
        assert!(!r.is_transferable());

        let r = resolver().resolve("my-bucket/");
        assert_eq!(r.bucket_name, "my-bucket");
        assert_eq!(r.canonical_key, "");
        assert!(!r.is_transferable());
    }

    #[test]
    fn foreign_urls_pass_through() {
        let raw = "https://cdn.example.com/images/a.jpg";
        let r = resolver().resolve(raw);
        assert_eq!(r.bucket_name, "");
        assert_eq!(r.canonical_key, raw);
        assert_eq!(r.fetchable_url, raw);
        assert!(!r.is_transferable());

        let r = resolver().resolve("mailto:someone@example.com");
        assert_eq!(r.bucket_name, "");
    }

    #[test]
    fn lookalike_host_is_not_a_bucket() {
        let r = resolver().resolve("https://evils3.amazonaws.com/x/y.jpg");
        assert_eq!(r.bucket_name, "");
    }

    #[test]
    fn custom_domain_is_honoured() {
        let r = PathResolver::new("storage.example.net").resolve("assets/public/a.jpg");
        assert_eq!(r.fetchable_url, "https://assets.storage.example.net/public/a.jpg");
        let r = PathResolver::new("storage.example.net")
            .resolve("https://assets.storage.example.net/public/a.jpg");
        assert_eq!(r.bucket_name, "assets");
        assert_eq!(r.canonical_key, "a.jpg");
    }

    #[test]
    fn resolution_is_idempotent() {
        let res = resolver();
        for raw in [
            "my-bucket/images/a.jpg",
            "https://s3.amazonaws.com/b/k.png",
            "",
            "nobucket",
            "http://[::1",
        ] {
            assert_eq!(res.resolve(raw), res.resolve(raw));
        }
    }

    #[test]
    fn unparseable_url_falls_back_to_relative_rules() {
        // Invalid IPv6 host: URL parsing fails, the first segment becomes the bucket.
        let r = resolver().resolve("http://[::1/a.jpg");
        assert_eq!(r.bucket_name, "http:");
        assert_eq!(r.canonical_key, "/[::1/a.jpg");
    }
}
