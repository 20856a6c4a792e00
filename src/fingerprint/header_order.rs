//! Chrome request-header sequencer (spec §4.A).
//!
//! Builds the exact wire order of pseudo-headers and headers for a given
//! request, honoring the conditionals spec §4.A lists (client hints only
//! if requested, `sec-fetch-user` only for activated navigations, etc).
//! HTTP/2 and HTTP/1.1 get their own fixed orders per spec.

use super::sec_ch_ua::SecChUaGenerator;

/// High-entropy client hints the peer may have requested via `Accept-CH`.
#[derive(Debug, Clone, Default)]
pub struct HighEntropyHints {
    pub full_version_list: Option<String>,
    pub arch: Option<String>,
    pub bitness: Option<String>,
    pub model: Option<String>,
    pub wow64: Option<bool>,
    pub form_factors: Option<String>,
}

/// Everything the header sequencer needs to know about one request.
#[derive(Debug, Clone)]
pub struct RequestContext<'a> {
    pub method: &'a str,
    pub authority: &'a str,
    pub scheme: &'a str,
    pub path: &'a str,
    pub platform: &'a str,
    pub user_agent: &'a str,
    pub accept: &'a str,
    pub accept_encoding: &'a str,
    pub accept_language: &'a str,
    pub is_navigation: bool,
    pub is_activated: bool,
    pub sec_fetch_site: &'a str,
    pub sec_fetch_mode: &'a str,
    pub sec_fetch_dest: &'a str,
    pub high_entropy_hints: HighEntropyHints,
    pub custom_headers: &'a [(String, String)],
}

/// One emitted header or pseudo-header, in final wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: String,
    pub value: String,
}

impl HeaderField {
    fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into() }
    }
}

/// Builds the HTTP/2 header sequence in Chrome's exact order (spec §4.A).
pub fn build_h2_headers(ctx: &RequestContext<'_>, ua_gen: &SecChUaGenerator) -> Vec<HeaderField> {
    let mut out = Vec::with_capacity(20 + ctx.custom_headers.len());

    // 1. MASP pseudo-header order.
    out.push(HeaderField::new(":method", ctx.method));
    out.push(HeaderField::new(":authority", ctx.authority));
    out.push(HeaderField::new(":scheme", ctx.scheme));
    out.push(HeaderField::new(":path", ctx.path));

    // 2. Low-entropy Sec-CH-UA triad.
    out.push(HeaderField::new("sec-ch-ua", ua_gen.header_value()));
    out.push(HeaderField::new("sec-ch-ua-mobile", "?0"));
    out.push(HeaderField::new("sec-ch-ua-platform", format!("\"{}\"", ctx.platform)));

    // 3. High-entropy client hints, only if the peer asked for them.
    let h = &ctx.high_entropy_hints;
    if let Some(v) = &h.full_version_list {
        out.push(HeaderField::new("sec-ch-ua-full-version-list", v.clone()));
    }
    if let Some(v) = &h.arch {
        out.push(HeaderField::new("sec-ch-ua-arch", format!("\"{v}\"")));
    }
    if let Some(v) = &h.bitness {
        out.push(HeaderField::new("sec-ch-ua-bitness", format!("\"{v}\"")));
    }
    if let Some(v) = &h.model {
        out.push(HeaderField::new("sec-ch-ua-model", format!("\"{v}\"")));
    }
    if let Some(v) = h.wow64 {
        out.push(HeaderField::new("sec-ch-ua-wow64", if v { "?1" } else { "?0" }));
    }
    if let Some(v) = &h.form_factors {
        out.push(HeaderField::new("sec-ch-ua-form-factors", v.clone()));
    }

    // 4. Navigation-only.
    if ctx.is_navigation {
        out.push(HeaderField::new("upgrade-insecure-requests", "1"));
    }

    // 5-6.
    out.push(HeaderField::new("user-agent", ctx.user_agent));
    out.push(HeaderField::new("accept", ctx.accept));

    // 7. Sec-Fetch-*.
    out.push(HeaderField::new("sec-fetch-site", ctx.sec_fetch_site));
    out.push(HeaderField::new("sec-fetch-mode", ctx.sec_fetch_mode));
    if ctx.is_navigation && ctx.is_activated {
        out.push(HeaderField::new("sec-fetch-user", "?1"));
    }
    out.push(HeaderField::new("sec-fetch-dest", ctx.sec_fetch_dest));

    // 8.
    out.push(HeaderField::new("accept-encoding", ctx.accept_encoding));
    out.push(HeaderField::new("accept-language", ctx.accept_language));

    // 9. User-supplied, appended verbatim in caller order.
    for (name, value) in ctx.custom_headers {
        out.push(HeaderField::new(name.clone(), value.clone()));
    }

    out
}

/// Builds the HTTP/1.1 header sequence (spec §4.A): `Host, Connection,
/// sec-ch-ua*, Upgrade-Insecure-Requests, User-Agent, Accept, Sec-Fetch-*,
/// Accept-Encoding, Accept-Language`, then custom headers.
pub fn build_h1_headers(ctx: &RequestContext<'_>, ua_gen: &SecChUaGenerator) -> Vec<HeaderField> {
    let mut out = Vec::with_capacity(16 + ctx.custom_headers.len());

    out.push(HeaderField::new("Host", ctx.authority));
    out.push(HeaderField::new("Connection", "keep-alive"));

    out.push(HeaderField::new("sec-ch-ua", ua_gen.header_value()));
    out.push(HeaderField::new("sec-ch-ua-mobile", "?0"));
    out.push(HeaderField::new("sec-ch-ua-platform", format!("\"{}\"", ctx.platform)));

    if ctx.is_navigation {
        out.push(HeaderField::new("Upgrade-Insecure-Requests", "1"));
    }

    out.push(HeaderField::new("User-Agent", ctx.user_agent));
    out.push(HeaderField::new("Accept", ctx.accept));

    out.push(HeaderField::new("Sec-Fetch-Site", ctx.sec_fetch_site));
    out.push(HeaderField::new("Sec-Fetch-Mode", ctx.sec_fetch_mode));
    if ctx.is_navigation && ctx.is_activated {
        out.push(HeaderField::new("Sec-Fetch-User", "?1"));
    }
    out.push(HeaderField::new("Sec-Fetch-Dest", ctx.sec_fetch_dest));

    out.push(HeaderField::new("Accept-Encoding", ctx.accept_encoding));
    out.push(HeaderField::new("Accept-Language", ctx.accept_language));

    for (name, value) in ctx.custom_headers {
        out.push(HeaderField::new(name.clone(), value.clone()));
    }

    out
}

/// Re-orders user-supplied headers into a caller-provided explicit order
/// (spec §4.K "header-order escape hatch" / design note: full-control mode
/// must not inject Chrome defaults). Headers not named in `order` are
/// appended afterward in their original relative order.
pub fn apply_explicit_order(headers: &[(String, String)], order: &[String]) -> Vec<HeaderField> {
    let mut out = Vec::with_capacity(headers.len());
    let mut used = vec![false; headers.len()];

    for name in order {
        for (i, (hname, hvalue)) in headers.iter().enumerate() {
            if !used[i] && hname.eq_ignore_ascii_case(name) {
                out.push(HeaderField::new(hname.clone(), hvalue.clone()));
                used[i] = true;
            }
        }
    }
    for (i, (hname, hvalue)) in headers.iter().enumerate() {
        if !used[i] {
            out.push(HeaderField::new(hname.clone(), hvalue.clone()));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_ctx() -> RequestContext<'static> {
        RequestContext {
            method: "GET",
            authority: "example.com",
            scheme: "https",
            path: "/",
            platform: "Windows",
            user_agent: "Mozilla/5.0 Chrome/143.0.0.0",
            accept: "*/*",
            accept_encoding: "gzip, deflate, br, zstd",
            accept_language: "en-US,en;q=0.9",
            is_navigation: false,
            is_activated: false,
            sec_fetch_site: "same-origin",
            sec_fetch_mode: "cors",
            sec_fetch_dest: "empty",
            high_entropy_hints: HighEntropyHints::default(),
            custom_headers: &[],
        }
    }

    #[test]
    fn h2_pseudo_headers_come_first_in_masp_order() {
        let ctx = base_ctx();
        let gen = SecChUaGenerator::new(143);
        let headers = build_h2_headers(&ctx, &gen);
        let names: Vec<&str> = headers.iter().take(4).map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec![":method", ":authority", ":scheme", ":path"]);
    }

    #[test]
    fn high_entropy_hints_sit_between_platform_and_uir() {
        let mut ctx = base_ctx();
        ctx.is_navigation = true;
        ctx.high_entropy_hints.arch = Some("x86".to_string());
        let gen = SecChUaGenerator::new(143);
        let headers = build_h2_headers(&ctx, &gen);
        let platform_idx = headers.iter().position(|h| h.name == "sec-ch-ua-platform").unwrap();
        let arch_idx = headers.iter().position(|h| h.name == "sec-ch-ua-arch").unwrap();
        let uir_idx = headers.iter().position(|h| h.name == "upgrade-insecure-requests").unwrap();
        assert!(platform_idx < arch_idx && arch_idx < uir_idx);
    }

    #[test]
    fn sec_fetch_user_only_on_activated_navigation() {
        let mut ctx = base_ctx();
        let gen = SecChUaGenerator::new(143);
        assert!(!build_h2_headers(&ctx, &gen).iter().any(|h| h.name == "sec-fetch-user"));

        ctx.is_navigation = true;
        ctx.is_activated = true;
        assert!(build_h2_headers(&ctx, &gen).iter().any(|h| h.name == "sec-fetch-user"));
    }

    #[test]
    fn custom_headers_are_appended_last() {
        let mut ctx = base_ctx();
        let custom = vec![("X-Custom".to_string(), "1".to_string())];
        ctx.custom_headers = &custom;
        let gen = SecChUaGenerator::new(143);
        let headers = build_h2_headers(&ctx, &gen);
        assert_eq!(headers.last().unwrap().name, "X-Custom");
    }

    #[test]
    fn h1_order_starts_with_host_then_connection() {
        let ctx = base_ctx();
        let gen = SecChUaGenerator::new(143);
        let headers = build_h1_headers(&ctx, &gen);
        assert_eq!(headers[0].name, "Host");
        assert_eq!(headers[1].name, "Connection");
    }

    #[test]
    fn explicit_order_does_not_inject_chrome_defaults() {
        let headers = vec![
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "1".to_string()),
            ("c".to_string(), "3".to_string()),
        ];
        let order = vec!["a".to_string(), "b".to_string()];
        let out = apply_explicit_order(&headers, &order);
        let names: Vec<&str> = out.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
