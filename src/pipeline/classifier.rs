//! Maps feed-supplied indicator type strings onto canonical categories.
//!
//! The trusted universe is the table below; each raw type appears once, so
//! every trusted type lands in exactly one category. Matching is exact and
//! case-sensitive, as the feed emits these spellings verbatim.

use crate::domain::IocCategory;

const TRUSTED_TYPES: &[(&str, IocCategory)] = &[
    ("FileHash-MD5", IocCategory::Sample),
    ("FileHash-PEHASH", IocCategory::Sample),
    ("FileHash-SHA256", IocCategory::Sample),
    ("FileHash-SHA1", IocCategory::Sample),
    ("FileHash-IMPHASH", IocCategory::Sample),
    ("URL", IocCategory::Url),
    ("URI", IocCategory::Url),
    ("hostname", IocCategory::Domain),
    ("domain", IocCategory::Domain),
    ("IPv4", IocCategory::IpAddress),
    ("IPv6", IocCategory::IpAddress),
    // Wallet addresses ride along with IPs for downstream routing.
    ("BitcoinAddress", IocCategory::IpAddress),
];

/// Canonical category for `raw_type`, or `None` when it is not trusted.
pub fn classify(raw_type: &str) -> Option<IocCategory> {
    TRUSTED_TYPES
        .iter()
        .find(|(trusted, _)| *trusted == raw_type)
        .map(|(_, category)| *category)
}
