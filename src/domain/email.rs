//! Sender address validation and canonicalisation.
//!
//! Addresses are accepted as bare addr-specs only: no display text, no domain
//! literals, and a fully qualified domain whose top-level label is at least two
//! letters (so no bare IP addresses and no underscores). Accepted addresses are reduced to a
//! canonical form so that provider-specific aliases of one mailbox compare
//! equal: sub-address tags are dropped for the large consumer providers and
//! Gmail's dot-insensitive local parts are collapsed.

use email_address::{EmailAddress, Options};

const MAX_ADDRESS_LEN: usize = 254;

const GMAIL_DOMAINS: &[&str] = &["gmail.com", "googlemail.com"];
const ICLOUD_DOMAINS: &[&str] = &["icloud.com", "me.com"];
const OUTLOOK_DOMAINS: &[&str] = &[
    "hotmail.at",
    "hotmail.be",
    "hotmail.ca",
    "hotmail.cl",
    "hotmail.co.il",
    "hotmail.co.nz",
    "hotmail.co.th",
    "hotmail.co.uk",
    "hotmail.com",
    "hotmail.com.ar",
    "hotmail.com.au",
    "hotmail.com.br",
    "hotmail.com.mx",
    "hotmail.com.tr",
    "hotmail.de",
    "hotmail.es",
    "hotmail.fr",
    "hotmail.it",
    "hotmail.nl",
    "live.be",
    "live.co.uk",
    "live.com",
    "live.com.ar",
    "live.com.mx",
    "live.de",
    "live.es",
    "live.fr",
    "live.it",
    "live.nl",
    "msn.com",
    "outlook.at",
    "outlook.be",
    "outlook.cl",
    "outlook.co.il",
    "outlook.co.nz",
    "outlook.co.th",
    "outlook.com",
    "outlook.com.ar",
    "outlook.com.au",
    "outlook.com.br",
    "outlook.com.tr",
    "outlook.de",
    "outlook.es",
    "outlook.fr",
    "outlook.it",
    "outlook.jp",
    "passport.com",
];
const YAHOO_DOMAINS: &[&str] = &[
    "rocketmail.com",
    "yahoo.ca",
    "yahoo.co.uk",
    "yahoo.com",
    "yahoo.de",
    "yahoo.fr",
    "yahoo.in",
    "yahoo.it",
    "ymail.com",
];
const YANDEX_DOMAINS: &[&str] = &[
    "yandex.ru",
    "yandex.ua",
    "yandex.kz",
    "yandex.com",
    "yandex.by",
    "ya.ru",
];

fn parse_options() -> Options {
    Options::default()
        .with_required_tld()
        .without_display_text()
        .without_domain_literal()
}

/// Parse `input` as an addr-spec, rejecting anything longer than 254 bytes.
pub fn parse_address(input: &str) -> Option<EmailAddress> {
    if input.is_empty() || input.len() > MAX_ADDRESS_LEN {
        return None;
    }
    let address = EmailAddress::parse_with_options(input, parse_options()).ok()?;
    is_fqdn(address.domain()).then_some(address)
}

fn is_fqdn(domain: &str) -> bool {
    let labels: Vec<&str> = domain.split('.').collect();
    match labels.split_last() {
        Some((tld, rest)) if !rest.is_empty() => {
            is_top_level_label(tld) && labels.iter().all(|label| is_domain_label(label))
        }
        _ => false,
    }
}

fn is_top_level_label(label: &str) -> bool {
    let lower = label.to_lowercase();
    let alphabetic = lower.chars().count() >= 2
        && lower
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || (!ch.is_ascii() && ch.is_alphabetic()));
    // Punycode, e.g. `xn--p1ai`.
    let punycode = lower.strip_prefix("xn").is_some_and(|rest| {
        rest.len() >= 2 && rest.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-')
    });
    alphabetic || punycode
}

fn is_domain_label(label: &str) -> bool {
    !label.is_empty()
        && label.chars().count() <= 63
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || (!ch.is_ascii() && ch.is_alphanumeric()))
}

/// Reduce a parsed address to its canonical mailbox form.
///
/// Returns `None` when the local part collapses to nothing (for example
/// `+news@gmail.com`).
pub fn normalize(address: &EmailAddress) -> Option<String> {
    let domain = address.domain().to_lowercase();
    let local = address.local_part();

    let (local, domain) = if GMAIL_DOMAINS.contains(&domain.as_str()) {
        let local = strip_tag(local, '+').replace('.', "").to_lowercase();
        (local, "gmail.com".to_string())
    } else if ICLOUD_DOMAINS.contains(&domain.as_str())
        || OUTLOOK_DOMAINS.contains(&domain.as_str())
    {
        (strip_tag(local, '+').to_lowercase(), domain)
    } else if YAHOO_DOMAINS.contains(&domain.as_str()) {
        // Only the last dash segment is a tag.
        let local = local.rsplit_once('-').map_or(local, |(head, _)| head);
        (local.to_lowercase(), domain)
    } else if YANDEX_DOMAINS.contains(&domain.as_str()) {
        (local.to_lowercase(), "yandex.ru".to_string())
    } else {
        (local.to_lowercase(), domain)
    };

    if local.is_empty() {
        return None;
    }
    Some(format!("{local}@{domain}"))
}

fn strip_tag(local: &str, separator: char) -> &str {
    local.split(separator).next().unwrap_or(local)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical(input: &str) -> Option<String> {
        parse_address(input).and_then(|address| normalize(&address))
    }

    #[test]
    fn accepts_plain_addresses() {
        assert_eq!(canonical("ana@example.com").as_deref(), Some("ana@example.com"));
    }

    #[test]
    fn rejects_malformed_addresses() {
        for input in [
            "",
            "ana",
            "ana@",
            "@example.com",
            "ana@localhost",
            "ana@@example.com",
            "Ana <ana@example.com>",
            "ana@[127.0.0.1]",
            " ana@example.com",
            "ana@example.c",
            "ana@example.123",
            "ana@1.2.3.4",
            "ana@exa_mple.com",
            "ana@-example.com",
            "ana@example-.com",
            "ana@example..com",
        ] {
            assert!(parse_address(input).is_none(), "accepted `{input}`");
        }
    }

    #[test]
    fn rejects_overlong_addresses() {
        let input = format!("{}@example.com", "a".repeat(250));
        assert!(parse_address(&input).is_none());
    }

    #[test]
    fn lowercases_generic_domains_and_local_parts() {
        assert_eq!(
            canonical("Ana.Maria+Work@Example.COM").as_deref(),
            Some("ana.maria+work@example.com")
        );
    }

    #[test]
    fn collapses_gmail_aliases() {
        assert_eq!(
            canonical("Ana.Maria+news@GoogleMail.com").as_deref(),
            Some("anamaria@gmail.com")
        );
    }

    #[test]
    fn strips_outlook_and_icloud_tags() {
        assert_eq!(
            canonical("Ana+promo@Hotmail.com").as_deref(),
            Some("ana@hotmail.com")
        );
        assert_eq!(canonical("ana+x@me.com").as_deref(), Some("ana@me.com"));
    }

    #[test]
    fn strips_yahoo_dash_tags() {
        assert_eq!(
            canonical("ana-shopping@yahoo.com").as_deref(),
            Some("ana@yahoo.com")
        );
        assert_eq!(
            canonical("ana-maria-shop@yahoo.com").as_deref(),
            Some("ana-maria@yahoo.com")
        );
        assert_eq!(canonical("ana@ymail.com").as_deref(), Some("ana@ymail.com"));
    }

    #[test]
    fn accepts_subdomains_and_punycode_domains() {
        assert_eq!(
            canonical("ana@mail.example.co.uk").as_deref(),
            Some("ana@mail.example.co.uk")
        );
        assert!(parse_address("ana@xn--80ak6aa92e.xn--p1ai").is_some());
    }

    #[test]
    fn folds_yandex_domains() {
        assert_eq!(canonical("Ana@ya.ru").as_deref(), Some("ana@yandex.ru"));
    }

    #[test]
    fn empty_canonical_local_part_is_rejected() {
        assert_eq!(canonical("+news@gmail.com"), None);
    }
}
