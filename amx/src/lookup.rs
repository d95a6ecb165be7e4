//! Lookup store: label arrays embedded in file metadata
//!
//! Each lookup `name` lives under the metadata key `LOOKUP:<name>` as the
//! hex text of a ZSTD-compressed Arrow IPC file holding one column. The
//! optional `LOOKUP_AXES` key binds lookups to axes as a JSON object
//! `{"<name>": <axis>}`.

use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::sync::Arc;

use amx_core::{
    AmxError, Label, LabelResolver, Result, Shape, LOOKUP_AXES_KEY, LOOKUP_KEY_PREFIX,
};
use arrow_array::cast::AsArray;
use arrow_array::types::Int64Type;
use arrow_array::{Array, ArrayRef, Int64Array, RecordBatch, StringArray};
use arrow_ipc::reader::FileReader;
use arrow_ipc::writer::{FileWriter, IpcWriteOptions};
use arrow_ipc::CompressionType;
use arrow_schema::{DataType, Field, Schema};
use tracing::debug;

/// Named label sequence with O(1) label to position lookups
#[derive(Debug, Clone)]
pub struct LookupArray {
    name: String,
    labels: Vec<Label>,
    positions: hashbrown::HashMap<Label, usize>,
    axis: Option<usize>,
}

impl LookupArray {
    /// Build a lookup; labels must be unique
    pub fn new(name: impl Into<String>, labels: Vec<Label>, axis: Option<usize>) -> Result<Self> {
        let name = name.into();
        let mut positions = hashbrown::HashMap::with_capacity(labels.len());
        for (position, label) in labels.iter().enumerate() {
            if positions.insert(label.clone(), position).is_some() {
                return Err(AmxError::DuplicateLabel {
                    lookup: name,
                    label: label.to_string(),
                });
            }
        }
        Ok(Self {
            name,
            labels,
            positions,
            axis,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Labels in position order
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Axis this lookup is bound to, if any
    pub fn axis(&self) -> Option<usize> {
        self.axis
    }

    pub fn position(&self, label: &Label) -> Option<usize> {
        self.positions.get(label).copied()
    }

    pub fn label(&self, position: usize) -> Option<&Label> {
        self.labels.get(position)
    }

    /// Positions of `labels`, in the order given
    pub fn resolve(&self, labels: &[Label]) -> Result<Vec<usize>> {
        labels
            .iter()
            .map(|label| {
                self.position(label).ok_or_else(|| AmxError::UnknownLabel {
                    lookup: self.name.clone(),
                    label: label.to_string(),
                })
            })
            .collect()
    }
}

/// Every lookup of an open file, with its axis bindings
#[derive(Debug, Clone, Default)]
pub struct LookupStore {
    lookups: Vec<LookupArray>,
    by_name: HashMap<String, usize>,
    by_axis: HashMap<usize, usize>,
}

impl LookupStore {
    /// Store with no lookups
    pub fn empty() -> Self {
        Self::default()
    }

    /// Decode every `LOOKUP:` entry and validate the axis bindings
    pub fn from_metadata(metadata: &HashMap<String, String>, shape: &Shape) -> Result<Self> {
        let axes: BTreeMap<String, usize> = match metadata.get(LOOKUP_AXES_KEY) {
            Some(json) => serde_json::from_str(json).map_err(|e| AmxError::UnsupportedColumn {
                column: LOOKUP_AXES_KEY.to_string(),
                reason: format!("not a JSON map of lookup name to axis: {e}"),
            })?,
            None => BTreeMap::new(),
        };

        let mut entries: Vec<(&str, &String)> = metadata
            .iter()
            .filter_map(|(key, value)| key.strip_prefix(LOOKUP_KEY_PREFIX).map(|name| (name, value)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        let mut store = Self::empty();
        for (name, encoded) in entries {
            let labels = decode_labels(name, encoded)?;
            let axis = axes.get(name).copied();
            store.insert(LookupArray::new(name, labels, axis)?, shape)?;
        }

        if let Some(name) = axes.keys().find(|name| !store.by_name.contains_key(*name)) {
            return Err(AmxError::UnknownLookup(format!(
                "{name:?} named in {LOOKUP_AXES_KEY}"
            )));
        }

        debug!(
            lookups = store.lookups.len(),
            bound = store.by_axis.len(),
            "loaded lookups"
        );
        Ok(store)
    }

    fn insert(&mut self, lookup: LookupArray, shape: &Shape) -> Result<()> {
        if let Some(axis) = lookup.axis {
            let bound = shape.dim(axis).unwrap_or(0);
            if lookup.len() != bound {
                return Err(AmxError::LookupAxisMismatch {
                    lookup: lookup.name,
                    axis,
                    len: lookup.labels.len(),
                    bound,
                });
            }
            if let Some(&existing) = self.by_axis.get(&axis) {
                return Err(AmxError::AmbiguousLookupBinding {
                    axis,
                    first: self.lookups[existing].name.clone(),
                    second: lookup.name,
                });
            }
            self.by_axis.insert(axis, self.lookups.len());
        }
        self.by_name.insert(lookup.name.clone(), self.lookups.len());
        self.lookups.push(lookup);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&LookupArray> {
        self.by_name
            .get(name)
            .map(|&i| &self.lookups[i])
            .ok_or_else(|| AmxError::UnknownLookup(format!("{name:?}")))
    }

    /// Lookup names in sorted order
    pub fn names(&self) -> Vec<&str> {
        self.lookups.iter().map(|l| l.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LookupArray> {
        self.lookups.iter()
    }

    pub fn len(&self) -> usize {
        self.lookups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookups.is_empty()
    }

    /// Lookup bound to `axis`, if any
    pub fn bound_to(&self, axis: usize) -> Option<&LookupArray> {
        self.by_axis.get(&axis).map(|&i| &self.lookups[i])
    }

    /// Positions of `labels` in the named lookup
    pub fn resolve(&self, name: &str, labels: &[Label]) -> Result<Vec<usize>> {
        self.get(name)?.resolve(labels)
    }
}

impl LabelResolver for LookupStore {
    fn resolve_labels(
        &self,
        axis: usize,
        bound: usize,
        lookup: Option<&str>,
        labels: &[Label],
    ) -> Result<Vec<usize>> {
        let array = match lookup {
            Some(name) => self.get(name)?,
            None => self
                .bound_to(axis)
                .ok_or_else(|| AmxError::UnknownLookup(format!("no lookup bound to axis {axis}")))?,
        };
        if array.len() != bound {
            return Err(AmxError::LookupAxisMismatch {
                lookup: array.name.clone(),
                axis,
                len: array.len(),
                bound,
            });
        }
        array.resolve(labels)
    }
}

fn lookup_error(name: &str, source: impl Into<amx_core::BoxedSource>) -> AmxError {
    AmxError::backend_io(format!("decoding lookup {name:?}"), source)
}

/// Hex text of a ZSTD-compressed Arrow IPC file with one label column
pub(crate) fn encode_labels(name: &str, labels: &[Label]) -> Result<String> {
    let array: ArrayRef = if labels.iter().all(|l| matches!(l, Label::Int(_))) {
        Arc::new(Int64Array::from_iter_values(labels.iter().filter_map(|l| match l {
            Label::Int(v) => Some(*v),
            Label::Text(_) => None,
        })))
    } else if labels.iter().all(|l| matches!(l, Label::Text(_))) {
        Arc::new(StringArray::from_iter_values(labels.iter().filter_map(|l| match l {
            Label::Text(s) => Some(s.as_str()),
            Label::Int(_) => None,
        })))
    } else {
        return Err(AmxError::UnsupportedColumn {
            column: name.to_string(),
            reason: "lookup mixes integer and text labels".into(),
        });
    };

    let encode_error = |e: arrow_schema::ArrowError| AmxError::backend_io(format!("encoding lookup {name:?}"), e);
    let schema = Arc::new(Schema::new(vec![Field::new(name, array.data_type().clone(), false)]));
    let batch = RecordBatch::try_new(schema.clone(), vec![array]).map_err(encode_error)?;
    let options = IpcWriteOptions::default()
        .try_with_compression(Some(CompressionType::ZSTD))
        .map_err(encode_error)?;
    let mut writer = FileWriter::try_new_with_options(Vec::new(), &schema, options).map_err(encode_error)?;
    writer.write(&batch).map_err(encode_error)?;
    writer.finish().map_err(encode_error)?;
    let bytes = writer.into_inner().map_err(encode_error)?;
    Ok(hex::encode(bytes))
}

fn decode_labels(name: &str, encoded: &str) -> Result<Vec<Label>> {
    let bytes = hex::decode(encoded.trim()).map_err(|e| lookup_error(name, e))?;
    let reader = FileReader::try_new(Cursor::new(bytes), None).map_err(|e| lookup_error(name, e))?;

    let unsupported = |reason: String| AmxError::UnsupportedColumn {
        column: format!("{LOOKUP_KEY_PREFIX}{name}"),
        reason,
    };

    let mut labels = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| lookup_error(name, e))?;
        let column = batch
            .columns()
            .first()
            .ok_or_else(|| unsupported("lookup file has no columns".into()))?;

        let data_type = column.data_type();
        if data_type.is_integer() {
            let values = arrow_cast::cast(column, &DataType::Int64).map_err(|e| lookup_error(name, e))?;
            if values.null_count() > 0 {
                return Err(unsupported("null or out-of-range labels".into()));
            }
            labels.extend(values.as_primitive::<Int64Type>().values().iter().map(|&v| Label::Int(v)));
        } else if matches!(data_type, DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View) {
            let values = arrow_cast::cast(column, &DataType::Utf8).map_err(|e| lookup_error(name, e))?;
            if values.null_count() > 0 {
                return Err(unsupported("null labels".into()));
            }
            labels.extend(values.as_string::<i32>().iter().flatten().map(Label::from));
        } else {
            return Err(unsupported(format!("labels stored as {data_type}")));
        }
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use amx_core::{lookup_key, resolve, ErrorCategory, Selection};

    fn metadata(entries: &[(&str, Vec<Label>)], axes: Option<&str>) -> HashMap<String, String> {
        let mut metadata: HashMap<String, String> = entries
            .iter()
            .map(|(name, labels)| (lookup_key(name), encode_labels(name, labels).unwrap()))
            .collect();
        if let Some(axes) = axes {
            metadata.insert(LOOKUP_AXES_KEY.to_string(), axes.to_string());
        }
        metadata
    }

    fn zones() -> Vec<Label> {
        [101, 205, 150].into_iter().map(Label::Int).collect()
    }

    #[test]
    fn test_labels_survive_encoding() {
        let text: Vec<Label> = ["a", "b", "c"].into_iter().map(Label::from).collect();
        let meta = metadata(&[("taz", zones()), ("mode", text.clone())], None);
        let store = LookupStore::from_metadata(&meta, &Shape::new(vec![3, 3]).unwrap()).unwrap();
        assert_eq!(store.names(), vec!["mode", "taz"]);
        assert_eq!(store.get("taz").unwrap().labels(), zones().as_slice());
        assert_eq!(store.get("mode").unwrap().labels(), text.as_slice());
        assert!(store.bound_to(0).is_none());
    }

    #[test]
    fn test_lookup_order_not_sorted() {
        let lookup = LookupArray::new("taz", zones(), Some(0)).unwrap();
        assert_eq!(
            lookup.resolve(&[Label::Int(150), Label::Int(101)]).unwrap(),
            vec![2, 0]
        );
        assert!(matches!(
            lookup.resolve(&[Label::Int(999)]),
            Err(AmxError::UnknownLabel { .. })
        ));
    }

    #[test]
    fn test_duplicate_labels() {
        assert!(matches!(
            LookupArray::new("taz", vec![Label::Int(1), Label::Int(1)], None),
            Err(AmxError::DuplicateLabel { .. })
        ));
    }

    #[test]
    fn test_axis_binding() {
        let shape = Shape::new(vec![3, 3]).unwrap();
        let meta = metadata(&[("taz", zones())], Some(r#"{"taz": 1}"#));
        let store = LookupStore::from_metadata(&meta, &shape).unwrap();
        assert_eq!(store.bound_to(1).map(LookupArray::name), Some("taz"));
        assert!(store.bound_to(0).is_none());

        let plan = resolve(
            &shape,
            &[Selection::Index(0), Selection::labels([205, 101])],
            &store,
        )
        .unwrap();
        assert_eq!(plan.offsets().collect::<Vec<_>>(), vec![1, 0]);

        // bound lookups are not used for other axes
        let err = resolve(&shape, &[Selection::labels([205])], &store).unwrap_err();
        assert!(matches!(err, AmxError::UnknownLookup(_)));
        // but naming one works when lengths agree
        let plan = resolve(&shape, &[Selection::labels_in("taz", [205])], &store).unwrap();
        assert_eq!(plan.shape(), &[1, 3]);
    }

    #[test]
    fn test_binding_errors() {
        let shape = Shape::new(vec![3, 4]).unwrap();

        let wrong_len = metadata(&[("taz", zones())], Some(r#"{"taz": 1}"#));
        assert!(matches!(
            LookupStore::from_metadata(&wrong_len, &shape),
            Err(AmxError::LookupAxisMismatch { axis: 1, len: 3, bound: 4, .. })
        ));

        let no_axis = metadata(&[("taz", zones())], Some(r#"{"taz": 5}"#));
        assert!(matches!(
            LookupStore::from_metadata(&no_axis, &shape),
            Err(AmxError::LookupAxisMismatch { bound: 0, .. })
        ));

        let other: Vec<Label> = [1, 2, 3].into_iter().map(Label::Int).collect();
        let twice = metadata(&[("a", zones()), ("b", other)], Some(r#"{"a": 0, "b": 0}"#));
        assert!(matches!(
            LookupStore::from_metadata(&twice, &shape),
            Err(AmxError::AmbiguousLookupBinding { axis: 0, .. })
        ));

        let dangling = metadata(&[], Some(r#"{"taz": 0}"#));
        assert!(matches!(
            LookupStore::from_metadata(&dangling, &shape),
            Err(AmxError::UnknownLookup(_))
        ));
    }

    #[test]
    fn test_malformed_axes_is_format_error() {
        let shape = Shape::new(vec![3, 3]).unwrap();
        for axes in [r#"{"taz": "one"}"#, "[0, 1]", "{taz: 0"] {
            let meta = metadata(&[("taz", zones())], Some(axes));
            let err = LookupStore::from_metadata(&meta, &shape).unwrap_err();
            assert!(
                matches!(&err, AmxError::UnsupportedColumn { column, .. } if column == LOOKUP_AXES_KEY),
                "{axes}: {err}"
            );
            assert_eq!(err.category(), ErrorCategory::Format);
        }
    }

    #[test]
    fn test_unbound_lookup_length_checked_at_use() {
        let shape = Shape::new(vec![3, 4]).unwrap();
        let store = LookupStore::from_metadata(&metadata(&[("taz", zones())], None), &shape).unwrap();
        let err = resolve(
            &shape,
            &[Selection::All, Selection::labels_in("taz", [101])],
            &store,
        )
        .unwrap_err();
        assert!(matches!(err, AmxError::LookupAxisMismatch { axis: 1, .. }));
    }

    #[test]
    fn test_mixed_labels_rejected() {
        assert!(matches!(
            encode_labels("x", &[Label::Int(1), Label::from("a")]),
            Err(AmxError::UnsupportedColumn { .. })
        ));
    }
}
