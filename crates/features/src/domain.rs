//! Reduce background URLs to the registrable domain label.
//!
//! `https://www.en.example.co.uk/path` becomes `example`.
//! The label is compared against the website names of the foreground set, such that
//! background instances of a monitored website can be skipped.
//!
//! Public suffixes are looked up in the Public Suffix List, including the private section,
//! so `example.github.io` is the registrable domain of `www.example.github.io`.

use url::{Host, Url};

/// Extract the domain label (without subdomains and public suffix) from a URL or host name.
///
/// IP addresses are returned unchanged, as are hosts without a registrable domain like `localhost`.
/// Unparsable entries yield an empty label, which matches no website.
pub fn domain_label(link: &str) -> String {
    let link = link.trim();
    if link.is_empty() {
        return String::new();
    }
    let parsed = if link.contains("://") {
        Url::parse(link)
    } else {
        Url::parse(&format!("http://{}", link))
    };
    let url = match parsed {
        Ok(url) => url,
        Err(err) => {
            log::debug!("Cannot parse background URL {:?}: {}", link, err);
            return String::new();
        }
    };

    let host = match url.host() {
        Some(Host::Domain(domain)) => domain.trim_end_matches('.').to_ascii_lowercase(),
        Some(Host::Ipv4(addr)) => return addr.to_string(),
        Some(Host::Ipv6(addr)) => return addr.to_string(),
        None => return String::new(),
    };

    match psl::domain_str(&host) {
        Some(domain) => domain.split('.').next().unwrap_or_default().to_string(),
        None => host,
    }
}
