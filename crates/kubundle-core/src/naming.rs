//! Kubernetes object naming rules
//!
//! Deployment and webhook names coming out of a bundle end up as object
//! names in the cluster, so they are held to the same DNS-1123 rules the
//! API server applies.

use once_cell::sync::Lazy;
use regex::Regex;

/// Maximum length of a DNS-1123 subdomain
pub const DNS1123_SUBDOMAIN_MAX_LENGTH: usize = 253;

/// Maximum length of a DNS-1123 label (and of most generated names)
pub const DNS1123_LABEL_MAX_LENGTH: usize = 63;

const DNS1123_LABEL_FMT: &str = "[a-z0-9]([-a-z0-9]*[a-z0-9])?";

static DNS1123_SUBDOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^{DNS1123_LABEL_FMT}(\.{DNS1123_LABEL_FMT})*$"))
        .expect("static DNS-1123 subdomain pattern")
});

/// Check `value` against the DNS-1123 subdomain rules.
///
/// Returns one message per violated rule; an empty vector means the value is valid.
pub fn is_dns1123_subdomain(value: &str) -> Vec<String> {
    let mut errs = Vec::new();

    if value.len() > DNS1123_SUBDOMAIN_MAX_LENGTH {
        errs.push(format!(
            "must be no more than {} characters",
            DNS1123_SUBDOMAIN_MAX_LENGTH
        ));
    }

    if !DNS1123_SUBDOMAIN_RE.is_match(value) {
        errs.push(format!(
            "a lowercase RFC 1123 subdomain must consist of lower case alphanumeric characters, '-' or '.', \
             and must start and end with an alphanumeric character (e.g. 'example.com', regex used for \
             validation is '{DNS1123_LABEL_FMT}(\\.{DNS1123_LABEL_FMT})*')"
        ));
    }

    errs
}

/// Build an object name from `base` and `suffix`, truncating `base` so the
/// result never exceeds [`DNS1123_LABEL_MAX_LENGTH`].
pub fn object_name_for_base_and_suffix(base: &str, suffix: &str) -> String {
    let max_base = DNS1123_LABEL_MAX_LENGTH.saturating_sub(suffix.len() + 1);
    let truncated: String = base.chars().take(max_base).collect();
    format!("{truncated}-{suffix}")
}
