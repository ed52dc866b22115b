//! Canonical cache keys for REST collections and detail objects.
//!
//! A [`CacheKey`] is the only way to address cached data. Filters live in a
//! sorted map, so two keys built with the same filters in a different order
//! are equal and hash identically.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{DomainError, DomainResult};

/// Name of a REST resource, used as the first path segment (`quizzes`, `badges`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceType(String);

impl ResourceType {
    /// Creates a resource type.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidResource` if the name is empty or contains
    /// characters that are not valid in a single path segment.
    pub fn new(name: impl Into<String>) -> DomainResult<Self> {
        let name = name.into();
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/'))
            && !name.starts_with('/')
            && !name.ends_with('/');
        if valid {
            Ok(Self(name))
        } else {
            Err(DomainError::InvalidResource(name))
        }
    }

    /// Returns the resource path segment.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl SortOrder {
    /// Returns the wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl FromStr for SortOrder {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(DomainError::InvalidSortOrder(s.to_string())),
        }
    }
}

/// Sort field and direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    /// Field to sort by.
    pub field: String,
    /// Direction.
    pub order: SortOrder,
}

impl SortSpec {
    /// Creates a sort spec.
    #[must_use]
    pub fn new(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            field: field.into(),
            order,
        }
    }
}

/// Normalized set of query filters.
///
/// Keys are kept sorted; blank values are dropped since the backend treats
/// them as "no filter".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSet(BTreeMap<String, String>);

impl FilterSet {
    /// Creates an empty filter set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Sets a filter. Blank values remove the filter instead.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            self.0.remove(&key);
        } else {
            self.0.insert(key, trimmed.to_string());
        }
    }

    /// Returns the value of a filter.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Iterates filters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns true if no filter is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FilterSet {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut set = Self::new();
        for (k, v) in iter {
            set.set(k, v);
        }
        set
    }
}

/// Canonical address of one cached collection page or detail object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    resource: ResourceType,
    filters: FilterSet,
    page: u32,
    sort: Option<SortSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl CacheKey {
    /// Key for page 1 of a resource list with no filters and no sort.
    #[must_use]
    pub const fn list(resource: ResourceType) -> Self {
        Self {
            resource,
            filters: FilterSet::new(),
            page: 1,
            sort: None,
            detail: None,
        }
    }

    /// Key for a single object of a resource.
    #[must_use]
    pub fn detail(resource: ResourceType, id: impl Into<String>) -> Self {
        Self {
            resource,
            filters: FilterSet::new(),
            page: 1,
            sort: None,
            detail: Some(id.into()),
        }
    }

    /// Returns a copy of this key for another page. Page 0 is clamped to 1.
    #[must_use]
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    /// Returns a copy of this key with the given filters.
    #[must_use]
    pub fn with_filters(mut self, filters: FilterSet) -> Self {
        self.filters = filters;
        self
    }

    /// Returns a copy of this key with one more filter.
    #[must_use]
    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.set(key, value);
        self
    }

    /// Returns a copy of this key with a search term.
    #[must_use]
    pub fn with_search(self, term: impl Into<String>) -> Self {
        self.with_filter("search", term)
    }

    /// Returns a copy of this key with a sort.
    #[must_use]
    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Resource this key belongs to.
    #[must_use]
    pub const fn resource(&self) -> &ResourceType {
        &self.resource
    }

    /// Filters of this key.
    #[must_use]
    pub const fn filters(&self) -> &FilterSet {
        &self.filters
    }

    /// Requested page, 1-based.
    #[must_use]
    pub const fn page(&self) -> u32 {
        self.page
    }

    /// Sort of this key.
    #[must_use]
    pub const fn sort(&self) -> Option<&SortSpec> {
        self.sort.as_ref()
    }

    /// Detail id, for detail keys.
    #[must_use]
    pub fn detail_id(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Returns true for detail keys.
    #[must_use]
    pub const fn is_detail(&self) -> bool {
        self.detail.is_some()
    }

    /// Request path relative to the API base URL. The detail id is
    /// percent-encoded as a single path segment.
    #[must_use]
    pub fn path(&self) -> String {
        match &self.detail {
            Some(id) => format!("/{}/detail/{}", self.resource, encode_segment(id)),
            None => format!("/{}", self.resource),
        }
    }

    /// Query parameters for a list request, in canonical order.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        if self.detail.is_some() {
            return Vec::new();
        }
        let mut pairs = vec![("page".to_string(), self.page.to_string())];
        if let Some(sort) = &self.sort {
            pairs.push(("sortBy".to_string(), sort.field.clone()));
            pairs.push(("sortOrder".to_string(), sort.order.as_str().to_string()));
        }
        pairs.extend(
            self.filters
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );
        pairs
    }

    /// Stable string form of the key.
    #[must_use]
    pub fn canonical(&self) -> String {
        let mut out = format!("{}?page={}", self.resource, self.page);
        if let Some(sort) = &self.sort {
            out.push_str(&format!(
                "&sort={}:{}",
                escape(&sort.field),
                sort.order.as_str()
            ));
        }
        for (k, v) in self.filters.iter() {
            out.push_str(&format!("&{}={}", escape(k), escape(v)));
        }
        if let Some(id) = &self.detail {
            out.push_str(&format!("#{}", escape(id)));
        }
        out
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// Escapes the separators used by [`CacheKey::canonical`].
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '%' | '&' | '=' | '#' | ':' | '?' => out.push_str(&format!("%{:02X}", c as u32)),
            _ => out.push(c),
        }
    }
    out
}

/// Percent-encodes one path segment. Dot segments are encoded too, since
/// URL parsers would otherwise collapse them.
fn encode_segment(value: &str) -> String {
    match value {
        "." => "%2E".to_string(),
        ".." => "%2E%2E".to_string(),
        _ => urlencoding::encode(value).into_owned(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    fn quizzes() -> ResourceType {
        ResourceType::new("quizzes").unwrap()
    }

    #[test]
    fn test_resource_type_validation() {
        assert!(ResourceType::new("").is_err());
        assert!(ResourceType::new("quiz zes").is_err());
        assert!(ResourceType::new("/quizzes").is_err());
        assert!(ResourceType::new("admin/users").is_ok());
    }

    #[test]
    fn test_filter_order_is_irrelevant() {
        let a = CacheKey::list(quizzes())
            .with_filter("class", "7b")
            .with_filter("status", "open");
        let b = CacheKey::list(quizzes())
            .with_filter("status", "open")
            .with_filter("class", "7b");

        assert_eq!(a, b);
        assert_eq!(a.canonical(), b.canonical());

        let set: HashSet<CacheKey> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_keys_differ_by_any_component() {
        let base = CacheKey::list(quizzes());
        assert_ne!(base, base.clone().with_page(2));
        assert_ne!(base, base.clone().with_search("math"));
        assert_ne!(
            base,
            base.clone().with_sort(SortSpec::new("title", SortOrder::Desc))
        );
        assert_ne!(base, CacheKey::detail(quizzes(), "1"));
    }

    #[test]
    fn test_blank_filters_are_dropped() {
        let key = CacheKey::list(quizzes()).with_search("   ");
        assert!(key.filters().is_empty());
        assert_eq!(key, CacheKey::list(quizzes()));
    }

    #[test]
    fn test_page_zero_is_clamped() {
        assert_eq!(CacheKey::list(quizzes()).with_page(0).page(), 1);
    }

    #[test]
    fn test_canonical_escapes_separators() {
        let a = CacheKey::list(quizzes()).with_filter("q", "a&b=c");
        let b = CacheKey::list(quizzes())
            .with_filter("q", "a")
            .with_filter("b", "c");
        assert_ne!(a.canonical(), b.canonical());
        assert_eq!(a.canonical(), "quizzes?page=1&q=a%26b%3Dc");
    }

    #[test]
    fn test_query_pairs_and_path() {
        let key = CacheKey::list(quizzes())
            .with_page(3)
            .with_search("algebra")
            .with_sort(SortSpec::new("createdAt", SortOrder::Desc));

        assert_eq!(key.path(), "/quizzes");
        assert_eq!(
            key.query_pairs(),
            vec![
                ("page".to_string(), "3".to_string()),
                ("sortBy".to_string(), "createdAt".to_string()),
                ("sortOrder".to_string(), "desc".to_string()),
                ("search".to_string(), "algebra".to_string()),
            ]
        );
    }

    #[test]
    fn test_detail_key_path() {
        let key = CacheKey::detail(quizzes(), "q-42");
        assert_eq!(key.path(), "/quizzes/detail/q-42");
        assert!(key.query_pairs().is_empty());
        assert!(key.is_detail());
    }

    #[test]
    fn test_detail_id_stays_one_segment() {
        let key = CacheKey::detail(quizzes(), "a/b?c#d");
        assert_eq!(key.path(), "/quizzes/detail/a%2Fb%3Fc%23d");
        assert_eq!(key.detail_id(), Some("a/b?c#d"));

        let dots = CacheKey::detail(quizzes(), "..");
        assert_eq!(dots.path(), "/quizzes/detail/%2E%2E");
    }

    #[test]
    fn test_sort_order_parse() {
        assert_eq!("DESC".parse::<SortOrder>().unwrap(), SortOrder::Desc);
        assert!("sideways".parse::<SortOrder>().is_err());
    }
}
