//! URL hygiene shared by the store, the fetcher and the extractors.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

const TRACKER_PARAMS: &[&str] = &[
    "gclid", "fbclid", "msclkid", "gbraid", "wbraid", "mc_eid", "mc_cid", "pk_campaign", "pk_kwd", "ref",
    "ref_src", "igshid", "yclid",
];

/// Prefix `https://` when the input has no scheme.
pub fn ensure_scheme(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed.trim_start_matches('/'))
    }
}

/// Normalize a URL so equivalent spellings compare equal: lowercase host, no default
/// port, no fragment, no tracking parameters, sorted query, no trailing slash.
/// Unparseable input is returned trimmed.
pub fn canonicalize_url(raw: &str) -> String {
    let with_scheme = ensure_scheme(raw);
    let mut url = match Url::parse(&with_scheme) {
        Ok(url) => url,
        Err(_) => return with_scheme,
    };

    url.set_fragment(None);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| {
            let key = k.to_ascii_lowercase();
            !key.starts_with("utm_") && !TRACKER_PARAMS.contains(&key.as_str())
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    let mut out = url.to_string();
    if url.query().is_none() && out.ends_with('/') {
        out.pop();
    }
    out
}

/// True only for http(s) URLs whose host is not loopback, private or link-local.
pub fn is_public_http_url(raw: &str) -> bool {
    let Ok(url) = Url::parse(raw) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    match url.host() {
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            domain != "localhost" && !domain.ends_with(".localhost") && !domain.ends_with(".internal")
        }
        Some(Host::Ipv4(ip)) => is_public_ipv4(ip),
        Some(Host::Ipv6(ip)) => is_public_ipv6(ip),
        None => false,
    }
}

pub fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_ipv4(v4),
        IpAddr::V6(v6) => is_public_ipv6(v6),
    }
}

fn is_public_ipv4(ip: Ipv4Addr) -> bool {
    let [a, b, c, _] = ip.octets();
    let this_network = a == 0;
    let shared = a == 100 && (b & 0xc0) == 64;
    let ietf = a == 192 && b == 0 && c == 0;
    let benchmarking = a == 198 && (b & 0xfe) == 18;
    let reserved = a >= 240;
    !(ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_multicast()
        || ip.is_documentation()
        || this_network
        || shared
        || ietf
        || benchmarking
        || reserved)
}

fn is_public_ipv6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_public_ipv4(v4);
    }
    let segments = ip.segments();
    let first = segments[0];
    let link_local = (first & 0xffc0) == 0xfe80;
    let unique_local = (first & 0xfe00) == 0xfc00;
    // 64:ff9b::/96 and 64:ff9b:1::/48 translate to IPv4 through a local NAT64 gateway.
    let nat64 = first == 0x0064 && segments[1] == 0xff9b;
    let documentation = first == 0x2001 && segments[1] == 0x0db8;
    !(ip.is_loopback() || ip.is_unspecified() || ip.is_multicast() || link_local || unique_local || nat64 || documentation)
}

/// Lowercased host without a leading `www.`.
pub fn site_host(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

/// Same host, or one is a subdomain of the other.
pub fn same_site(a: &str, b: &str) -> bool {
    a == b || a.ends_with(&format!(".{}", b)) || b.ends_with(&format!(".{}", a))
}

/// Scheme plus host of a URL, e.g. `https://example.com`.
pub fn origin(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    Some(format!("{}://{}", url.scheme(), url.host_str()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_missing_scheme() {
        assert_eq!(ensure_scheme("example.com/feed"), "https://example.com/feed");
        assert_eq!(ensure_scheme(" http://a.b "), "http://a.b");
    }

    #[test]
    fn canonical_form_drops_trackers_and_sorts() {
        assert_eq!(
            canonicalize_url("HTTPS://News.Example.com:443/story/?utm_source=x&b=2&a=1&fbclid=zz#top"),
            "https://news.example.com/story?a=1&b=2"
        );
        assert_eq!(canonicalize_url("https://example.com/"), "https://example.com");
        assert_eq!(canonicalize_url("example.com/rss/"), "https://example.com/rss");
    }

    #[test]
    fn ssrf_guard_rejects_private_targets() {
        assert!(is_public_http_url("https://example.com/a"));
        assert!(!is_public_http_url("http://localhost:8080/"));
        assert!(!is_public_http_url("http://127.0.0.1/"));
        assert!(!is_public_http_url("http://10.1.2.3/"));
        assert!(!is_public_http_url("http://172.20.0.1/"));
        assert!(!is_public_http_url("http://192.168.1.1/"));
        assert!(!is_public_http_url("http://[::1]/"));
        assert!(!is_public_http_url("http://[fe80::1]/"));
        assert!(!is_public_http_url("ftp://example.com/"));
        assert!(is_public_http_url("http://172.32.0.1/"));
    }

    #[test]
    fn special_purpose_ranges_are_not_public() {
        for ip in ["0.1.2.3", "100.64.0.1", "100.127.255.254", "224.0.0.251", "239.1.1.1", "198.18.0.5", "240.0.0.1", "255.255.255.255"] {
            assert!(!is_public_ip(ip.parse().unwrap()), "{ip}");
        }
        for ip in ["64:ff9b::a00:1", "ff02::1", "2001:db8::1", "::ffff:10.0.0.1"] {
            assert!(!is_public_ip(ip.parse().unwrap()), "{ip}");
        }
        assert!(is_public_ip("100.128.0.1".parse().unwrap()));
        assert!(is_public_ip("2606:4700::1111".parse().unwrap()));
        assert!(!is_public_http_url("http://[64:ff9b::7f00:1]/"));
    }

    #[test]
    fn subdomains_share_a_site() {
        assert!(same_site("m.example.com", "example.com"));
        assert!(same_site("example.com", "blog.example.com"));
        assert!(!same_site("example.com", "badexample.com"));
        assert_eq!(site_host("https://www.Example.com/x").as_deref(), Some("example.com"));
    }
}
