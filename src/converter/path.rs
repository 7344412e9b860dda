use serde_json::{Map, Value};
use std::fmt;

use super::ConvertError;

/// Placeholder for "the index of the surrounding repeatable block element".
pub const ARRAY_FIELD_MARKER: &str = "[]";
/// Placeholder for "the key of the surrounding free-form map entry".
pub const ALL_MAP_KEYS_MARKER: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Field(String),
    Index(usize),
    ArrayMarker,
    MapKeysMarker,
}

/// A location inside the model JSON, parsed once from its literal form
/// (`spec.assignedGroups[].cluster.name`, `meta.labels.*`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPath {
    segments: Vec<Segment>,
}

impl ModelPath {
    pub fn parse(literal: &str) -> Self {
        let mut segments = Vec::new();
        for part in literal.split('.').filter(|p| !p.is_empty()) {
            if part == ALL_MAP_KEYS_MARKER {
                segments.push(Segment::MapKeysMarker);
                continue;
            }
            let (name, mut rest) = match part.find('[') {
                Some(pos) => (&part[..pos], &part[pos..]),
                None => (part, ""),
            };
            if !name.is_empty() {
                segments.push(Segment::Field(name.to_string()));
            }
            while let Some(stripped) = rest.strip_prefix('[') {
                let end = stripped.find(']').unwrap_or(stripped.len());
                let inner = &stripped[..end];
                match inner.parse::<usize>() {
                    Ok(i) => segments.push(Segment::Index(i)),
                    Err(_) => segments.push(Segment::ArrayMarker),
                }
                rest = stripped.get(end + 1..).unwrap_or("");
            }
        }
        ModelPath { segments }
    }

    pub(crate) fn from_segments(segments: Vec<Segment>) -> Self {
        ModelPath { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn has_markers(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::ArrayMarker | Segment::MapKeysMarker))
    }

    /// Replaces the first array-field marker with a concrete index.
    pub fn with_index(&self, index: usize) -> Self {
        self.replace_first(&Segment::ArrayMarker, Segment::Index(index))
    }

    /// Replaces the first all-map-keys marker with a literal key.
    pub fn with_key(&self, key: &str) -> Self {
        self.replace_first(&Segment::MapKeysMarker, Segment::Field(key.to_string()))
    }

    /// The segments preceding the first occurrence of `marker`, if it occurs.
    pub fn prefix_before(&self, marker: &Segment) -> Option<&[Segment]> {
        self.segments
            .iter()
            .position(|s| s == marker)
            .map(|pos| &self.segments[..pos])
    }

    pub fn prefixed(&self, prefix: &ModelPath) -> Self {
        let mut segments = prefix.segments.clone();
        segments.extend(self.segments.iter().cloned());
        ModelPath { segments }
    }

    fn replace_first(&self, marker: &Segment, with: Segment) -> Self {
        let mut segments = self.segments.clone();
        if let Some(slot) = segments.iter_mut().find(|s| *s == marker) {
            *slot = with;
        }
        ModelPath { segments }
    }
}

impl fmt::Display for ModelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            match segment {
                Segment::Field(name) => {
                    if !first {
                        f.write_str(".")?;
                    }
                    f.write_str(name)?;
                }
                Segment::Index(i) => write!(f, "[{}]", i)?,
                Segment::ArrayMarker => f.write_str(ARRAY_FIELD_MARKER)?,
                Segment::MapKeysMarker => {
                    if !first {
                        f.write_str(".")?;
                    }
                    f.write_str(ALL_MAP_KEYS_MARKER)?;
                }
            }
            first = false;
        }
        Ok(())
    }
}

pub(crate) fn lookup<'a>(root: &'a Value, path: &[Segment]) -> Option<&'a Value> {
    let mut current = root;
    for segment in path {
        current = match segment {
            Segment::Field(name) => current.as_object()?.get(name)?,
            Segment::Index(i) => current.as_array()?.get(*i)?,
            Segment::ArrayMarker | Segment::MapKeysMarker => return None,
        };
    }
    Some(current)
}

/// Writes `value` at `path`, creating intermediate objects and arrays.
pub(crate) fn assign(root: &mut Value, path: &[Segment], value: Value) -> Result<(), ConvertError> {
    let Some((head, tail)) = path.split_first() else {
        *root = value;
        return Ok(());
    };
    match head {
        Segment::Field(name) => {
            if root.is_null() {
                *root = Value::Object(Map::new());
            }
            let Value::Object(map) = root else {
                return Err(shape_error(path, "object", root));
            };
            let slot = map.entry(name.clone()).or_insert(Value::Null);
            assign(slot, tail, value)
        }
        Segment::Index(i) => {
            if root.is_null() {
                *root = Value::Array(Vec::new());
            }
            let Value::Array(items) = root else {
                return Err(shape_error(path, "list", root));
            };
            if items.len() <= *i {
                items.resize(*i + 1, Value::Null);
            }
            assign(&mut items[*i], tail, value)
        }
        Segment::ArrayMarker | Segment::MapKeysMarker => Err(ConvertError::UnresolvedMarker(
            ModelPath::from_segments(path.to_vec()).to_string(),
        )),
    }
}

/// Makes sure an object exists at `path` so an element is allocated even
/// when none of its leaves carry a value.
pub(crate) fn ensure_object(root: &mut Value, path: &[Segment]) -> Result<(), ConvertError> {
    match lookup(root, path) {
        Some(v) if !v.is_null() => Ok(()),
        _ => assign(root, path, Value::Object(Map::new())),
    }
}

fn shape_error(path: &[Segment], expected: &'static str, found: &Value) -> ConvertError {
    ConvertError::ShapeMismatch {
        path: ModelPath::from_segments(path.to_vec()).to_string(),
        expected,
        found: super::value::kind_of(found),
    }
}
