use std::{borrow::Cow, fmt, sync::Arc};

/// A key/value pair attached to every point emitted through a reporter.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag {
    key: Cow<'static, str>,
    value: String,
}

impl Tag {
    /// Creates a `Tag`.
    pub fn new<K, V>(key: K, value: V) -> Self
    where
        K: Into<Cow<'static, str>>,
        V: Into<String>,
    {
        Tag { key: key.into(), value: value.into() }
    }

    /// Key of this tag.
    pub fn key(&self) -> &str {
        self.key.as_ref()
    }

    /// Value of this tag.
    pub fn value(&self) -> &str {
        self.value.as_str()
    }
}

/// A fixed, ordered set of tags.
///
/// Tag sets are immutable once built and cheap to clone: clones share the same storage, so every
/// reporter bound to a facade can hold its own handle to the facade's tags.
///
/// Keys are unique. When building a tag set from tags that repeat a key, the later value replaces
/// the earlier one, keeping the position of the first occurrence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagSet {
    tags: Arc<[Tag]>,
}

impl TagSet {
    /// Creates a `TagSet` from the given tags.
    pub fn new<I>(tags: I) -> Self
    where
        I: IntoIterator<Item = Tag>,
    {
        let mut unique: Vec<Tag> = Vec::new();
        for tag in tags {
            match unique.iter_mut().find(|existing| existing.key == tag.key) {
                Some(existing) => existing.value = tag.value,
                None => unique.push(tag),
            }
        }

        TagSet { tags: unique.into() }
    }

    /// Gets the value of the tag with the given key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags.iter().find(|tag| tag.key() == key).map(Tag::value)
    }

    /// Iterates over the tags in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Tag> {
        self.tags.iter()
    }

    /// Gets the number of tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Returns `true` if there are no tags.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl FromIterator<Tag> for TagSet {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        TagSet::new(iter)
    }
}

impl<K, V, const SIZE: usize> From<[(K, V); SIZE]> for TagSet
where
    K: Into<Cow<'static, str>>,
    V: Into<String>,
{
    fn from(tags: [(K, V); SIZE]) -> Self {
        tags.into_iter().map(|(k, v)| Tag::new(k, v)).collect()
    }
}

impl<'a> IntoIterator for &'a TagSet {
    type Item = &'a Tag;
    type IntoIter = std::slice::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, tag) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", tag.key(), tag.value())?;
        }
        Ok(())
    }
}
