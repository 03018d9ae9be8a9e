use thiserror::Error;

use super::kind::ResourceKind;

const LABEL_MAX: usize = 63;
const SUBDOMAIN_MAX: usize = 253;

/// A user-supplied name that can't be used as an API path segment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field} {value:?}: must be a lowercase RFC 1123 {rule}")]
pub struct InvalidName {
    pub field: &'static str,
    pub value: String,
    pub rule: &'static str,
}

fn is_label(s: &str) -> bool {
    let b = s.as_bytes();
    !b.is_empty()
        && b.len() <= LABEL_MAX
        && b.iter().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == b'-')
        && b[0] != b'-'
        && b[b.len() - 1] != b'-'
}

/// Namespaces, API versions and resource plurals.
pub fn dns_label<'a>(field: &'static str, value: &'a str) -> Result<&'a str, InvalidName> {
    if is_label(value) {
        Ok(value)
    } else {
        Err(InvalidName {
            field,
            value: value.to_string(),
            rule: "label",
        })
    }
}

/// Object names and API groups. Dot-separated labels, so `.` and `..` never pass.
pub fn dns_subdomain<'a>(field: &'static str, value: &'a str) -> Result<&'a str, InvalidName> {
    if value.len() <= SUBDOMAIN_MAX && value.split('.').all(is_label) {
        Ok(value)
    } else {
        Err(InvalidName {
            field,
            value: value.to_string(),
            rule: "subdomain",
        })
    }
}

/// Checks the namespace (when the kind has one) and name of a single object.
pub fn object_ref(kind: ResourceKind, namespace: &str, name: &str) -> Result<(), InvalidName> {
    if kind.namespaced() {
        dns_label("namespace", namespace)?;
    }
    dns_subdomain("name", name)?;
    Ok(())
}
