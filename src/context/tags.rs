use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Tag must be in the format 'key=value', got '{0}'")]
pub struct TagParseError(String);

impl FromStr for Tag {
    type Err = TagParseError;

    /// Splits on the first `=` only, so values may contain `=`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s.split_once('=').ok_or_else(|| TagParseError(s.to_string()))?;
        Ok(Tag {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Flatten into a map; a repeated key keeps its last value
pub fn tags_to_map(tags: &[Tag]) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    append_tags_to(tags, &mut map);
    map
}

pub fn append_tags_to(tags: &[Tag], target: &mut BTreeMap<String, String>) {
    for tag in tags {
        target.insert(tag.key.clone(), tag.value.clone());
    }
}
