//! Store key derivation.
//!
//! Every field lives under a key derived from its parent:
//!
//! - child key: `parent + "_" + escape(segment)`
//! - sentinel key: `key + "#" + suffix` (`#len`, `#size`)
//!
//! `escape` prefixes the reserved characters `\`, `_` and `#` with a
//! backslash. An escaped segment therefore never contains an unescaped
//! separator or sentinel mark, so two distinct schema paths never derive the
//! same key, and no child key equals a sentinel key. Segments free of
//! reserved characters are used verbatim.
//!
//! Root keys are used as given; keeping root namespaces apart is the
//! caller's responsibility.

use std::borrow::Cow;

use crate::error::{SchemaError, SchemaResult};

/// Separator between a parent key and a child segment.
pub const SEPARATOR: char = '_';

/// Marker introducing a sentinel suffix.
pub const SENTINEL_MARK: char = '#';

/// Escape character for reserved characters inside segments.
pub const ESCAPE: char = '\\';

const RESERVED: &[char] = &[ESCAPE, SEPARATOR, SENTINEL_MARK];

/// Auxiliary records that track whether a collection was set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Sentinel {
    /// Element count of a string list.
    Length,
    /// Member count of a set, hash, or field-name set.
    Size,
}

impl Sentinel {
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Length => "len",
            Self::Size => "size",
        }
    }
}

/// Escape a single key segment.
///
/// # Examples
///
/// ```
/// use kvshape_schema::key::escape_segment;
///
/// assert_eq!(escape_segment("title"), "title");
/// assert_eq!(escape_segment("first_name"), "first\\_name");
/// assert_eq!(escape_segment("a#b"), "a\\#b");
/// ```
pub fn escape_segment(segment: &str) -> Cow<'_, str> {
    if !segment.contains(RESERVED) {
        return Cow::Borrowed(segment);
    }
    let mut escaped = String::with_capacity(segment.len() + 4);
    for ch in segment.chars() {
        if RESERVED.contains(&ch) {
            escaped.push(ESCAPE);
        }
        escaped.push(ch);
    }
    Cow::Owned(escaped)
}

/// Derive the key of a named or indexed child.
///
/// # Examples
///
/// ```
/// use kvshape_schema::key::child_key;
///
/// assert_eq!(child_key("user", "posts"), "user_posts");
/// assert_eq!(child_key("user_posts", "0"), "user_posts_0");
/// ```
pub fn child_key(parent: &str, segment: &str) -> String {
    let segment = escape_segment(segment);
    let mut key = String::with_capacity(parent.len() + 1 + segment.len());
    key.push_str(parent);
    key.push(SEPARATOR);
    key.push_str(&segment);
    key
}

/// Derive the key of a sentinel record.
pub fn sentinel_key(key: &str, sentinel: Sentinel) -> String {
    format!("{key}{SENTINEL_MARK}{}", sentinel.suffix())
}

/// Strip `parent` and the separator from `key`.
///
/// Returns `key` unchanged if it is not a descendant of `parent`.
pub fn relative_key<'k>(key: &'k str, parent: &str) -> &'k str {
    key.strip_prefix(parent)
        .and_then(|rest| rest.strip_prefix(SEPARATOR))
        .unwrap_or(key)
}

/// Validate a root key.
pub fn validate_root_key(key: &str) -> SchemaResult<()> {
    if key.is_empty() {
        return Err(SchemaError::InvalidSchema("root key must not be empty".into()));
    }
    if key.chars().any(char::is_whitespace) {
        return Err(SchemaError::InvalidSchema(format!(
            "root key must not contain whitespace: {key:?}"
        )));
    }
    // `x#size` would alias the size sentinel of root `x`.
    if key.contains(SENTINEL_MARK) {
        return Err(SchemaError::InvalidSchema(format!(
            "root key must not contain {SENTINEL_MARK:?}: {key:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn plain_segments_are_verbatim() {
        assert_eq!(child_key("RedisTestModel", "listProp"), "RedisTestModel_listProp");
        assert!(matches!(escape_segment("listProp"), Cow::Borrowed(_)));
    }

    #[test]
    fn underscore_names_do_not_collide_with_nesting() {
        // field "a_b" vs field "a" holding a child "b"
        let flat = child_key("root", "a_b");
        let nested = child_key(&child_key("root", "a"), "b");
        assert_eq!(flat, "root_a\\_b");
        assert_eq!(nested, "root_a_b");
        assert_ne!(flat, nested);
    }

    #[test]
    fn sentinel_never_matches_a_child() {
        assert_eq!(sentinel_key("root_tags", Sentinel::Size), "root_tags#size");
        assert_ne!(child_key("root", "tags#size"), sentinel_key("root_tags", Sentinel::Size));
        assert_ne!(child_key("root", "size"), sentinel_key("root", Sentinel::Size));
    }

    #[test]
    fn relative_key_strips_parent() {
        assert_eq!(relative_key("user_posts_0", "user_posts"), "0");
        assert_eq!(relative_key("user_posts", "user"), "posts");
        assert_eq!(relative_key("other", "user"), "other");
    }

    #[test]
    fn root_key_validation() {
        assert!(validate_root_key("user:42").is_ok());
        assert!(validate_root_key("").is_err());
        assert!(validate_root_key("a b").is_err());
        assert!(validate_root_key("user_42").is_ok());
    }

    #[test]
    fn root_key_cannot_alias_a_sentinel() {
        let err = validate_root_key("x#size").unwrap_err();
        assert!(matches!(err, SchemaError::InvalidSchema(_)));
        assert!(validate_root_key(&sentinel_key("x", Sentinel::Length)).is_err());
    }

    proptest! {
        #[test]
        fn distinct_segments_derive_distinct_keys(
            parent in "[a-z_]{1,6}",
            a in "[a-z_#\\\\]{0,6}",
            b in "[a-z_#\\\\]{0,6}",
        ) {
            prop_assume!(a != b);
            prop_assert_ne!(child_key(&parent, &a), child_key(&parent, &b));
        }

        #[test]
        fn depth_is_unambiguous(
            a in "[a-z_#\\\\]{0,5}",
            b in "[a-z_#\\\\]{0,5}",
            c in "[a-z_#\\\\]{0,10}",
        ) {
            let nested = child_key(&child_key("root", &a), &b);
            prop_assert_ne!(nested, child_key("root", &c));
        }

        #[test]
        fn children_never_hit_sentinels(
            segment in "[a-z_#\\\\]{0,8}",
            key in "[a-z]{1,4}(_[a-z]{1,4}){0,2}",
        ) {
            let child = child_key("root", &segment);
            prop_assert_ne!(&child, &sentinel_key(&key, Sentinel::Size));
            prop_assert_ne!(&child, &sentinel_key(&key, Sentinel::Length));
            prop_assert_ne!(child, sentinel_key("root", Sentinel::Size));
        }
    }
}
