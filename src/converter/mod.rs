/*!
    Declarative converter between Terraform resource data and TMC API models.

    A resource declares one [`Block`] describing, for every Terraform attribute, the
    model location it corresponds to. Keys of a block are Terraform attribute names,
    leaves are model paths in the model's JSON naming (`spec.template.ttl`).
    Repeatable blocks use the array-field marker (`spec.assignedGroups[].name`) and
    free-form maps use the all-map-keys marker (`meta.labels.*`).

    The model side goes through serde: converting builds a JSON object in the model's
    shape and deserializes it, filling serializes the model and walks the JSON.
*/

pub mod path;
pub mod value;

use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::marker::PhantomData;
use thiserror::Error;

use crate::error::ProviderResult;
use crate::resource_data::ResourceData;
pub use path::{ModelPath, Segment, ALL_MAP_KEYS_MARKER, ARRAY_FIELD_MARKER};
pub use value::Coercion;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("shape mismatch at {path}: expected {expected}, found {found}")]
    ShapeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("type mismatch at {path}: {message}")]
    TypeMismatch { path: String, message: String },
    #[error("path {0} still contains a marker after substitution")]
    UnresolvedMarker(String),
    #[error("invalid path mapping: {0}")]
    InvalidSpec(String),
    #[error("no data found for any mapped attribute")]
    NoData,
    #[error("failed to serialize model: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf {
    pub path: ModelPath,
    pub coercion: Coercion,
}

/// One correspondence between a Terraform location and the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathNode {
    /// A scalar, list or map attribute copied as a whole.
    Leaf(Leaf),
    /// A singleton nested block.
    Struct(Block),
    /// A repeatable block; every mapping is applied to each element with the
    /// element's index substituted for the array-field marker.
    StructSlice(Vec<Block>),
    /// A list attribute whose elements each land at the marked model path.
    ListToStruct(Leaf),
    /// A free-form map whose keys substitute the all-map-keys marker.
    Map(Leaf),
}

/// Terraform attribute name to nested mapping, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Block {
    fields: Vec<(String, PathNode)>,
}

impl Block {
    pub fn new<'a>(fields: impl IntoIterator<Item = (&'a str, PathNode)>) -> Self {
        Block {
            fields: fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &PathNode)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get(&self, key: &str) -> Option<&PathNode> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    fn map_paths(&self, f: &dyn Fn(&ModelPath) -> ModelPath) -> Block {
        Block {
            fields: self
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), v.map_paths(f)))
                .collect(),
        }
    }

    fn with_index(&self, index: usize) -> Block {
        self.map_paths(&|p| p.with_index(index))
    }

    /// Model path of the slice this block populates: everything before the
    /// first array-field marker of its first marked leaf.
    fn array_prefix(&self) -> Option<Vec<Segment>> {
        self.fields.iter().find_map(|(_, node)| node.array_prefix())
    }
}

impl PathNode {
    pub fn leaf(path: &str) -> Self {
        PathNode::Leaf(Leaf {
            path: ModelPath::parse(path),
            coercion: Coercion::Verbatim,
        })
    }

    pub fn number_as_string(path: &str) -> Self {
        PathNode::Leaf(Leaf {
            path: ModelPath::parse(path),
            coercion: Coercion::NumberAsString,
        })
    }

    pub fn block<'a>(fields: impl IntoIterator<Item = (&'a str, PathNode)>) -> Self {
        PathNode::Struct(Block::new(fields))
    }

    pub fn repeated<'a>(fields: impl IntoIterator<Item = (&'a str, PathNode)>) -> Self {
        PathNode::StructSlice(vec![Block::new(fields)])
    }

    pub fn list(path: &str) -> Self {
        PathNode::ListToStruct(Leaf {
            path: ModelPath::parse(path),
            coercion: Coercion::Verbatim,
        })
    }

    pub fn map(path: &str) -> Self {
        PathNode::Map(Leaf {
            path: ModelPath::parse(path),
            coercion: Coercion::Verbatim,
        })
    }

    fn map_paths(&self, f: &dyn Fn(&ModelPath) -> ModelPath) -> PathNode {
        match self {
            PathNode::Leaf(leaf) => PathNode::Leaf(leaf.map_path(f)),
            PathNode::Struct(block) => PathNode::Struct(block.map_paths(f)),
            PathNode::StructSlice(blocks) => {
                PathNode::StructSlice(blocks.iter().map(|b| b.map_paths(f)).collect())
            }
            PathNode::ListToStruct(leaf) => PathNode::ListToStruct(leaf.map_path(f)),
            PathNode::Map(leaf) => PathNode::Map(leaf.map_path(f)),
        }
    }

    fn array_prefix(&self) -> Option<Vec<Segment>> {
        match self {
            PathNode::Leaf(leaf) | PathNode::ListToStruct(leaf) | PathNode::Map(leaf) => leaf
                .path
                .prefix_before(&Segment::ArrayMarker)
                .map(<[Segment]>::to_vec),
            PathNode::Struct(block) => block.array_prefix(),
            PathNode::StructSlice(blocks) => blocks.iter().find_map(Block::array_prefix),
        }
    }
}

impl Leaf {
    fn map_path(&self, f: &dyn Fn(&ModelPath) -> ModelPath) -> Leaf {
        Leaf {
            path: f(&self.path),
            coercion: self.coercion,
        }
    }
}

/// Bidirectional converter for one resource family's model `M`.
#[derive(Debug, Clone)]
pub struct SchemaConverter<M> {
    root: Block,
    _model: PhantomData<fn() -> M>,
}

impl<M> SchemaConverter<M>
where
    M: Serialize + DeserializeOwned,
{
    pub fn new(root: Block) -> Self {
        SchemaConverter {
            root,
            _model: PhantomData,
        }
    }

    pub fn block(&self) -> &Block {
        &self.root
    }

    /// Builds a fresh model from resource data, skipping `ignored` top-level keys.
    pub fn convert_to_model(&self, data: &ResourceData, ignored: &[&str]) -> Result<M, ConvertError> {
        self.convert_map_to_model(data.attributes(), ignored)
    }

    pub fn convert_map_to_model(
        &self,
        attributes: &Map<String, Value>,
        ignored: &[&str],
    ) -> Result<M, ConvertError> {
        let mut model = Value::Object(Map::new());
        for (key, node) in self.root.fields() {
            if ignored.contains(&key) {
                continue;
            }
            if let Some(tf) = attributes.get(key) {
                read_node(node, tf, &mut model, key)?;
            }
        }
        if model.as_object().map_or(true, Map::is_empty) {
            return Err(ConvertError::NoData);
        }
        debug!("Converted resource data to model: {}", model);
        serde_path_to_error::deserialize(model).map_err(|e| ConvertError::TypeMismatch {
            path: e.path().to_string(),
            message: e.into_inner().to_string(),
        })
    }

    /// Writes every mapped location of `model` into the resource data.
    /// Mapped attributes the model has no value for are unset; attributes
    /// the block does not mention are left as they are.
    pub fn fill_from_model(&self, model: &M, data: &mut ResourceData) -> ProviderResult<()> {
        let mut filled = self.fill_map(model)?;
        for (key, _) in self.root.fields() {
            match filled.remove(key) {
                Some(value) => data.set(key, value)?,
                None => {
                    if data.remove(key).is_some() {
                        debug!("Cleared {} absent from the model", key);
                    }
                }
            }
        }
        Ok(())
    }

    /// The top-level attribute values `fill_from_model` would write.
    pub fn fill_map(&self, model: &M) -> Result<Map<String, Value>, ConvertError> {
        let model = serde_json::to_value(model)?;
        let mut out = Map::new();
        for (key, node) in self.root.fields() {
            if let Some(v) = write_node(node, &model)? {
                out.insert(key.to_string(), v);
            }
        }
        Ok(out)
    }

    /// Projects this converter's block into a repeatable block whose elements
    /// live under `prefix[]` in a list response model.
    pub fn nested_list(&self, prefix: &str) -> PathNode {
        let prefix = ModelPath::parse(&format!("{}{}", prefix, ARRAY_FIELD_MARKER));
        PathNode::StructSlice(vec![self.root.map_paths(&|p| p.prefixed(&prefix))])
    }
}

fn read_node(node: &PathNode, tf: &Value, model: &mut Value, tf_path: &str) -> Result<(), ConvertError> {
    if tf.is_null() {
        return Ok(());
    }
    match node {
        PathNode::Leaf(leaf) => {
            let v = leaf.coercion.to_model(tf, tf_path)?;
            path::assign(model, leaf.path.segments(), v)
        }
        PathNode::Struct(block) => {
            let obj = match tf {
                Value::Array(items) if items.is_empty() => return Ok(()),
                _ => value::block_object(tf).ok_or_else(|| tf_shape(tf_path, "single block", tf))?,
            };
            read_block(block, obj, model, tf_path)
        }
        PathNode::StructSlice(blocks) => {
            let items = tf.as_array().ok_or_else(|| tf_shape(tf_path, "list of blocks", tf))?;
            for (i, item) in items.iter().enumerate() {
                let element_path = format!("{}.{}", tf_path, i);
                let obj = match item {
                    Value::Null => None,
                    Value::Object(obj) => Some(obj),
                    other => return Err(tf_shape(&element_path, "block", other)),
                };
                for block in blocks {
                    let prefix = block.array_prefix().ok_or_else(|| {
                        ConvertError::InvalidSpec(format!("repeated block {} has no {} marker", tf_path, ARRAY_FIELD_MARKER))
                    })?;
                    let mut element = prefix;
                    element.push(Segment::Index(i));
                    path::ensure_object(model, &element)?;
                    if let Some(obj) = obj {
                        read_block(&block.with_index(i), obj, model, &element_path)?;
                    }
                }
            }
            Ok(())
        }
        PathNode::ListToStruct(leaf) => {
            let items = tf.as_array().ok_or_else(|| tf_shape(tf_path, "list", tf))?;
            for (i, item) in items.iter().enumerate() {
                let v = leaf.coercion.to_model(item, &format!("{}.{}", tf_path, i))?;
                path::assign(model, leaf.path.with_index(i).segments(), v)?;
            }
            Ok(())
        }
        PathNode::Map(leaf) => {
            let entries = tf.as_object().ok_or_else(|| tf_shape(tf_path, "map", tf))?;
            for (k, item) in entries {
                let v = leaf.coercion.to_model(item, &format!("{}.{}", tf_path, k))?;
                path::assign(model, leaf.path.with_key(k).segments(), v)?;
            }
            Ok(())
        }
    }
}

fn read_block(block: &Block, obj: &Map<String, Value>, model: &mut Value, tf_path: &str) -> Result<(), ConvertError> {
    for (key, child) in block.fields() {
        if let Some(v) = obj.get(key) {
            read_node(child, v, model, &format!("{}.{}", tf_path, key))?;
        }
    }
    Ok(())
}

fn write_node(node: &PathNode, model: &Value) -> Result<Option<Value>, ConvertError> {
    match node {
        PathNode::Leaf(leaf) => {
            if leaf.path.has_markers() {
                return Err(ConvertError::UnresolvedMarker(leaf.path.to_string()));
            }
            match path::lookup(model, leaf.path.segments()) {
                None | Some(Value::Null) => Ok(None),
                Some(v) => leaf.coercion.to_tf(v, &leaf.path.to_string()).map(Some),
            }
        }
        PathNode::Struct(block) => {
            let obj = write_block(block, model)?;
            Ok((!obj.is_empty()).then(|| Value::Array(vec![Value::Object(obj)])))
        }
        PathNode::StructSlice(blocks) => {
            let Some(prefix) = blocks.iter().find_map(Block::array_prefix) else {
                return Err(ConvertError::InvalidSpec("repeated block has no array-field marker".into()));
            };
            let items = match path::lookup(model, &prefix) {
                None | Some(Value::Null) => return Ok(None),
                Some(Value::Array(items)) => items.len(),
                Some(other) => return Err(model_shape(&prefix, "list", other)),
            };
            let mut out = Vec::with_capacity(items);
            for i in 0..items {
                let mut element = Map::new();
                for block in blocks {
                    element.extend(write_block(&block.with_index(i), model)?);
                }
                out.push(Value::Object(element));
            }
            Ok(Some(Value::Array(out)))
        }
        PathNode::ListToStruct(leaf) => {
            let Some(prefix) = leaf.path.prefix_before(&Segment::ArrayMarker) else {
                return Err(ConvertError::InvalidSpec(format!("list path {} has no array-field marker", leaf.path)));
            };
            let len = match path::lookup(model, prefix) {
                None | Some(Value::Null) => return Ok(None),
                Some(Value::Array(items)) => items.len(),
                Some(other) => return Err(model_shape(prefix, "list", other)),
            };
            let mut out = Vec::with_capacity(len);
            for i in 0..len {
                let element = leaf.path.with_index(i);
                let v = path::lookup(model, element.segments()).cloned().unwrap_or(Value::Null);
                out.push(leaf.coercion.to_tf(&v, &element.to_string())?);
            }
            Ok(Some(Value::Array(out)))
        }
        PathNode::Map(leaf) => {
            let Some(prefix) = leaf.path.prefix_before(&Segment::MapKeysMarker) else {
                return Err(ConvertError::InvalidSpec(format!("map path {} has no all-map-keys marker", leaf.path)));
            };
            let keys: Vec<String> = match path::lookup(model, prefix) {
                None | Some(Value::Null) => return Ok(None),
                Some(Value::Object(entries)) => entries.keys().cloned().collect(),
                Some(other) => return Err(model_shape(prefix, "map", other)),
            };
            let mut out = Map::new();
            for key in keys {
                let entry = leaf.path.with_key(&key);
                if let Some(v) = path::lookup(model, entry.segments()) {
                    out.insert(key, leaf.coercion.to_tf(v, &entry.to_string())?);
                }
            }
            Ok((!out.is_empty()).then_some(Value::Object(out)))
        }
    }
}

fn write_block(block: &Block, model: &Value) -> Result<Map<String, Value>, ConvertError> {
    let mut obj = Map::new();
    for (key, child) in block.fields() {
        if let Some(v) = write_node(child, model)? {
            obj.insert(key.to_string(), v);
        }
    }
    Ok(obj)
}

fn tf_shape(path: &str, expected: &'static str, found: &Value) -> ConvertError {
    ConvertError::ShapeMismatch {
        path: path.to_string(),
        expected,
        found: value::kind_of(found),
    }
}

fn model_shape(path: &[Segment], expected: &'static str, found: &Value) -> ConvertError {
    ConvertError::ShapeMismatch {
        path: ModelPath::from_segments(path.to_vec()).to_string(),
        expected,
        found: value::kind_of(found),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::collections::HashMap;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Group {
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        members: Vec<String>,
    }

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Sample {
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        bucket: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        enabled: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        count: Option<String>,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        labels: HashMap<String, String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        groups: Vec<Group>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tags: Vec<String>,
    }

    fn converter() -> SchemaConverter<Sample> {
        SchemaConverter::new(Block::new([
            ("name", PathNode::leaf("name")),
            (
                "spec",
                PathNode::block([
                    ("bucket", PathNode::leaf("bucket")),
                    ("enabled", PathNode::leaf("enabled")),
                    ("count", PathNode::number_as_string("count")),
                    ("labels", PathNode::map("labels.*")),
                    ("tags", PathNode::list("tags[]")),
                    (
                        "group",
                        PathNode::repeated([
                            ("name", PathNode::leaf("groups[].name")),
                            ("members", PathNode::leaf("groups[].members")),
                        ]),
                    ),
                ]),
            ),
        ]))
    }

    fn attrs(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_convert_nested_block_and_coercion() {
        let tf = attrs(json!({
            "name": "n",
            "spec": [{"bucket": "b", "enabled": true, "count": 3, "tags": ["x", "y"]}]
        }));
        let model = converter().convert_map_to_model(&tf, &[]).unwrap();
        assert_eq!(model.name.as_deref(), Some("n"));
        assert_eq!(model.bucket.as_deref(), Some("b"));
        assert_eq!(model.enabled, Some(true));
        assert_eq!(model.count.as_deref(), Some("3"));
        assert_eq!(model.tags, vec!["x", "y"]);
    }

    #[test]
    fn test_repeated_block_expansion_counts() {
        for n in [0usize, 1, 3] {
            let groups: Vec<Value> = (0..n)
                .map(|i| json!({"name": format!("g{}", i), "members": [format!("m{}", i)]}))
                .collect();
            let tf = attrs(json!({"name": "n", "spec": [{"group": groups}]}));
            let model = converter().convert_map_to_model(&tf, &[]).unwrap();
            assert_eq!(model.groups.len(), n);
            for (i, g) in model.groups.iter().enumerate() {
                assert_eq!(g.name.as_deref(), Some(format!("g{}", i).as_str()));
                assert_eq!(g.members, vec![format!("m{}", i)]);
            }
        }
    }

    #[test]
    fn test_empty_repeated_element_still_allocated() {
        let tf = attrs(json!({"spec": [{"group": [{"name": "a"}, {}, {"name": "c"}]}]}));
        let model = converter().convert_map_to_model(&tf, &[]).unwrap();
        assert_eq!(model.groups.len(), 3);
        assert_eq!(model.groups[1], Group::default());
    }

    #[test]
    fn test_free_form_map_identity() {
        let tf = attrs(json!({"spec": [{"labels": {"k1": "v1", "k2": "v2"}}]}));
        let conv = converter();
        let model = conv.convert_map_to_model(&tf, &[]).unwrap();
        let expected: HashMap<String, String> =
            [("k1", "v1"), ("k2", "v2")].iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        assert_eq!(model.labels, expected);

        let filled = conv.fill_map(&model).unwrap();
        assert_eq!(filled["spec"][0]["labels"], json!({"k2": "v2", "k1": "v1"}));
    }

    #[test]
    fn test_round_trip() {
        let model = Sample {
            name: Some("n".into()),
            bucket: Some("b".into()),
            enabled: Some(false),
            count: Some("12".into()),
            labels: [("app.kubernetes.io/name".to_string(), "web".to_string())].into_iter().collect(),
            groups: vec![
                Group { name: Some("a".into()), members: vec!["x".into()] },
                Group { name: Some("b".into()), members: vec![] },
            ],
            tags: vec!["t".into()],
        };
        let conv = converter();
        let filled = conv.fill_map(&model).unwrap();
        assert_eq!(filled["spec"][0]["count"], json!(12));
        let back = conv.convert_map_to_model(&filled, &[]).unwrap();
        assert_eq!(back, model);
    }

    #[test]
    fn test_ignored_keys_are_skipped() {
        let tf = attrs(json!({"name": "n", "spec": [{"bucket": "b"}]}));
        let model = converter().convert_map_to_model(&tf, &["spec"]).unwrap();
        assert_eq!(model.bucket, None);
        assert_eq!(model.name.as_deref(), Some("n"));
    }

    #[test]
    fn test_no_data() {
        let err = converter().convert_map_to_model(&Map::new(), &[]).unwrap_err();
        assert!(matches!(err, ConvertError::NoData));
    }

    #[test]
    fn test_block_holding_scalar_is_shape_mismatch() {
        let tf = attrs(json!({"spec": "oops"}));
        let err = converter().convert_map_to_model(&tf, &[]).unwrap_err();
        assert!(matches!(err, ConvertError::ShapeMismatch { .. }), "{err}");
    }

    #[test]
    fn test_leaf_of_wrong_kind_is_type_mismatch() {
        let tf = attrs(json!({"spec": [{"bucket": {"nested": true}}]}));
        let err = converter().convert_map_to_model(&tf, &[]).unwrap_err();
        match err {
            ConvertError::TypeMismatch { path, .. } => assert_eq!(path, "bucket"),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_fill_prunes_empty_blocks() {
        let model = Sample { name: Some("only".into()), ..Default::default() };
        let filled = converter().fill_map(&model).unwrap();
        assert_eq!(filled.len(), 1);
        assert_eq!(filled["name"], json!("only"));
    }

    #[test]
    fn test_fill_unsets_mapped_attributes_missing_from_model() {
        let mut data = ResourceData::from_value(
            "",
            json!({
                "name": "old",
                "spec": [{"bucket": "b", "labels": {"a": "1"}}],
                "backup_scope": "FULL_CLUSTER"
            }),
        )
        .unwrap();
        let model = Sample { name: Some("current".into()), ..Default::default() };
        converter().fill_from_model(&model, &mut data).unwrap();
        assert_eq!(data.get("name"), Some(&json!("current")));
        assert!(data.get("spec").is_none());
        assert_eq!(data.get("backup_scope"), Some(&json!("FULL_CLUSTER")));
    }

    #[test]
    fn test_singleton_block_with_several_elements_is_shape_mismatch() {
        let tf = attrs(json!({"spec": [{"bucket": "a"}, {"bucket": "b"}]}));
        let err = converter().convert_map_to_model(&tf, &[]).unwrap_err();
        assert!(matches!(err, ConvertError::ShapeMismatch { ref path, .. } if path == "spec"), "{err}");
    }

    #[test]
    fn test_nested_list_prefixes_every_leaf() {
        let derived = converter().nested_list("items");
        let PathNode::StructSlice(blocks) = &derived else {
            panic!("expected a repeated block");
        };
        let Some(PathNode::Leaf(leaf)) = blocks[0].get("name") else {
            panic!("expected name leaf");
        };
        assert_eq!(leaf.path.to_string(), "items[].name");
        let Some(PathNode::Struct(spec)) = blocks[0].get("spec") else {
            panic!("expected spec block");
        };
        let Some(PathNode::StructSlice(groups)) = spec.get("group") else {
            panic!("expected group slice");
        };
        let Some(PathNode::Leaf(group_name)) = groups[0].get("name") else {
            panic!("expected group name leaf");
        };
        assert_eq!(group_name.path.to_string(), "items[].groups[].name");
    }
}
