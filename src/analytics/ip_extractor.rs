//! Client address extraction with proxy trust validation
//!
//! Forwarding headers are only honoured when the deployment says a proxy sits
//! in front of the redirect listener. Chains are walked right to left and the
//! first hop that is not a trusted proxy is taken as the client.

use axum::http::HeaderMap;
use std::net::IpAddr;
use tracing::warn;

use crate::config::{AnalyticsConfig, TrustedProxyMode};

/// Extract the client IP address for a visit
///
/// Falls back to `socket_addr` whenever the configured headers are missing
/// or unparseable.
pub fn extract_client_ip(
    headers: &HeaderMap,
    socket_addr: IpAddr,
    config: &AnalyticsConfig,
) -> IpAddr {
    match config.trusted_proxy_mode {
        TrustedProxyMode::Cloudflare => extract_cloudflare_ip(headers).unwrap_or_else(|| {
            warn!("CF-Connecting-IP header missing in Cloudflare mode, using socket address");
            socket_addr
        }),
        TrustedProxyMode::Standard => extract_standard_ip(headers, config).unwrap_or(socket_addr),
        TrustedProxyMode::None => socket_addr,
    }
}

fn extract_cloudflare_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("cf-connecting-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

/// RFC 7239 `Forwarded` wins over `X-Forwarded-For` when both are present
fn extract_standard_ip(headers: &HeaderMap, config: &AnalyticsConfig) -> Option<IpAddr> {
    let chain = forwarded_chain(headers).or_else(|| x_forwarded_for_chain(headers))?;
    pick_client(&chain, config)
}

fn forwarded_chain(headers: &HeaderMap) -> Option<Vec<IpAddr>> {
    let forwarded = headers.get("forwarded")?.to_str().ok()?;

    let chain: Vec<IpAddr> = forwarded
        .split(',')
        .filter_map(|element| {
            element.split(';').find_map(|param| {
                let (key, value) = param.trim().split_once('=')?;
                if key.eq_ignore_ascii_case("for") {
                    parse_forwarded_node(value)
                } else {
                    None
                }
            })
        })
        .collect();

    (!chain.is_empty()).then_some(chain)
}

/// Parse a `for=` node: `1.2.3.4`, `1.2.3.4:80`, `"[2001:db8::1]:443"`
fn parse_forwarded_node(value: &str) -> Option<IpAddr> {
    let value = value.trim().trim_matches('"');

    if let Some(rest) = value.strip_prefix('[') {
        return rest.split(']').next()?.parse().ok();
    }

    value
        .parse::<IpAddr>()
        .ok()
        .or_else(|| value.rsplit_once(':')?.0.parse().ok())
}

fn x_forwarded_for_chain(headers: &HeaderMap) -> Option<Vec<IpAddr>> {
    let xff = headers.get("x-forwarded-for")?.to_str().ok()?;

    let chain: Vec<IpAddr> = xff
        .split(',')
        .filter_map(|s| s.trim().parse::<IpAddr>().ok())
        .collect();

    (!chain.is_empty()).then_some(chain)
}

fn pick_client(chain: &[IpAddr], config: &AnalyticsConfig) -> Option<IpAddr> {
    // Hop count wins over CIDR trust
    if let Some(num_trusted) = config.num_trusted_proxies {
        return if chain.len() > num_trusted {
            Some(chain[chain.len() - num_trusted - 1])
        } else {
            chain.first().copied()
        };
    }

    if !config.trusted_proxies.is_empty() {
        return chain
            .iter()
            .rev()
            .find(|ip| !config.trusted_proxies.iter().any(|net| net.contains(*ip)))
            .or_else(|| chain.first())
            .copied();
    }

    chain.last().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_cidr_list;
    use axum::http::HeaderValue;

    fn create_config(mode: TrustedProxyMode) -> AnalyticsConfig {
        AnalyticsConfig {
            trusted_proxy_mode: mode,
            ..AnalyticsConfig::default()
        }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_extract_client_ip_none_mode_ignores_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.1"));
        let config = create_config(TrustedProxyMode::None);

        let result = extract_client_ip(&headers, ip("192.168.1.1"), &config);
        assert_eq!(result, ip("192.168.1.1"));
    }

    #[test]
    fn test_extract_cloudflare_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", HeaderValue::from_static("203.0.113.1"));
        let config = create_config(TrustedProxyMode::Cloudflare);

        let result = extract_client_ip(&headers, ip("192.168.1.1"), &config);
        assert_eq!(result, ip("203.0.113.1"));
    }

    #[test]
    fn test_cloudflare_mode_without_header_uses_socket() {
        let config = create_config(TrustedProxyMode::Cloudflare);
        let result = extract_client_ip(&HeaderMap::new(), ip("192.168.1.1"), &config);
        assert_eq!(result, ip("192.168.1.1"));
    }

    #[test]
    fn test_extract_x_forwarded_for_rightmost_by_default() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.1, 198.51.100.1"),
        );
        let config = create_config(TrustedProxyMode::Standard);

        let result = extract_client_ip(&headers, ip("192.168.1.1"), &config);
        assert_eq!(result, ip("198.51.100.1"));
    }

    #[test]
    fn test_num_trusted_proxies_skips_hops() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("198.51.100.7, 10.0.0.2, 10.0.0.1"),
        );
        let mut config = create_config(TrustedProxyMode::Standard);
        config.num_trusted_proxies = Some(2);

        let result = extract_client_ip(&headers, ip("10.0.0.1"), &config);
        assert_eq!(result, ip("198.51.100.7"));
    }

    #[test]
    fn test_trusted_cidrs_are_skipped_right_to_left() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("6.6.6.6, 198.51.100.7, 10.1.0.9, 10.0.0.1"),
        );
        let mut config = create_config(TrustedProxyMode::Standard);
        config.trusted_proxies = parse_cidr_list("10.0.0.0/8").unwrap();

        let result = extract_client_ip(&headers, ip("10.0.0.1"), &config);
        // The spoofable leftmost entry is never reached
        assert_eq!(result, ip("198.51.100.7"));
    }

    #[test]
    fn test_forwarded_header_preferred_and_parsed() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "forwarded",
            HeaderValue::from_static(r#"for="[2001:db8::1]:443";proto=https, for=10.0.0.1:8080"#),
        );
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));
        let mut config = create_config(TrustedProxyMode::Standard);
        config.num_trusted_proxies = Some(1);

        let result = extract_client_ip(&headers, ip("10.0.0.1"), &config);
        assert_eq!(result, ip("2001:db8::1"));
    }

    #[test]
    fn test_garbage_headers_fall_back_to_socket() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("unknown, nope"));
        let config = create_config(TrustedProxyMode::Standard);

        let result = extract_client_ip(&headers, ip("192.168.1.1"), &config);
        assert_eq!(result, ip("192.168.1.1"));
    }
}
