//! JSON application tunnel.
//!
//! One RMC method carries a JSON document addressed to a service path.
//!
//! ```text
//! request:  [["<path>", [["name", ...], [value, ...]]]]
//! response: [["<path>", "<types>", ["name", ...], [value, ...]]]
//!           [["<path>", "<types>", ["name", ...], [[value, ...], [value, ...]]]]
//! empty:    [["<path>", "", [], []]]
//! ```
//!
//! `types` has one character per column: `d` for integers, `s` for strings.
//! A list-valued field `foo` is flattened into columns `foo000`, `foo001`, ...
//! and collected back into one list on the receiving side.
//!
//! Services build rows through [`RowWriter`]. The first row of a response
//! records the column layout; every later row is written against that cached
//! layout and only contributes values.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::errors::{ProtocolError, Result};

/// Digits in the index suffix of a flattened list column.
pub const LIST_INDEX_DIGITS: usize = 3;

/// Column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Integer (`d`)
    Int,
    /// String (`s`)
    Str,
}

impl FieldKind {
    /// Character used in the types string.
    pub fn type_char(self) -> char {
        match self {
            Self::Int => 'd',
            Self::Str => 's',
        }
    }

    fn from_char(c: char) -> Result<Self> {
        match c {
            'd' => Ok(Self::Int),
            's' => Ok(Self::Str),
            other => Err(invalid(format!("unknown type character {other:?}"))),
        }
    }
}

/// One cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TunnelValue {
    /// Integer cell
    Int(i64),
    /// String cell
    Str(String),
}

impl TunnelValue {
    /// Column type of this cell.
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Int(_) => FieldKind::Int,
            Self::Str(_) => FieldKind::Str,
        }
    }

    /// Integer value; numeric strings are accepted.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Str(s) => s.trim().parse().ok(),
        }
    }

    /// String value; integers are formatted.
    pub fn as_string(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Str(s) => s.clone(),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Self::Int(v) => Value::from(*v),
            Self::Str(s) => Value::from(s.as_str()),
        }
    }

    fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .map(Self::Int)
                .ok_or_else(|| invalid(format!("number out of range: {n}"))),
            Value::String(s) => Ok(Self::Str(s.clone())),
            Value::Bool(b) => Ok(Self::Int(i64::from(*b))),
            other => Err(invalid(format!("unsupported value {other}"))),
        }
    }

    fn from_json_as(value: &Value, kind: FieldKind) -> Result<Self> {
        let cell = Self::from_json(value)?;
        match (kind, cell) {
            (FieldKind::Int, cell @ Self::Int(_)) | (FieldKind::Str, cell @ Self::Str(_)) => Ok(cell),
            (FieldKind::Int, Self::Str(s)) => {
                s.parse().map(Self::Int).map_err(|_| invalid(format!("expected integer, got {s:?}")))
            },
            (FieldKind::Str, Self::Int(v)) => Ok(Self::Str(v.to_string())),
        }
    }
}

impl From<i64> for TunnelValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for TunnelValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for TunnelValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<&str> for TunnelValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for TunnelValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

fn invalid(msg: impl Into<String>) -> ProtocolError {
    ProtocolError::InvalidTunnel(msg.into())
}

/// Column name for element `index` of list `prefix`.
pub fn list_field_name(prefix: &str, index: usize) -> String {
    format!("{prefix}{index:0width$}", width = LIST_INDEX_DIGITS)
}

fn list_index(name: &str, prefix: &str) -> Option<usize> {
    let suffix = name.strip_prefix(prefix)?;
    if suffix.len() != LIST_INDEX_DIGITS || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

/// Named arguments of one request (or one decoded response row).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TunnelArgs {
    fields: BTreeMap<String, TunnelValue>,
}

impl TunnelArgs {
    /// Empty argument map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<TunnelValue>) -> &mut Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Raw field.
    pub fn get(&self, name: &str) -> Option<&TunnelValue> {
        self.fields.get(name)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if no fields are present.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TunnelValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Required integer field.
    pub fn int(&self, name: &str) -> Result<i64> {
        let value = self.get(name).ok_or_else(|| invalid(format!("missing field {name:?}")))?;
        value.as_int().ok_or_else(|| invalid(format!("field {name:?} is not an integer")))
    }

    /// Optional integer field.
    pub fn opt_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(TunnelValue::as_int)
    }

    /// Required string field.
    pub fn string(&self, name: &str) -> Result<String> {
        self.get(name).map(TunnelValue::as_string).ok_or_else(|| invalid(format!("missing field {name:?}")))
    }

    /// Optional string field.
    pub fn opt_string(&self, name: &str) -> Option<String> {
        self.get(name).map(TunnelValue::as_string)
    }

    /// Collect `prefix000`, `prefix001`, ... in index order.
    fn list(&self, prefix: &str) -> Vec<&TunnelValue> {
        let mut items: Vec<(usize, &TunnelValue)> = self
            .fields
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .filter_map(|(name, value)| list_index(name, prefix).map(|i| (i, value)))
            .collect();
        items.sort_by_key(|(i, _)| *i);
        items.into_iter().map(|(_, v)| v).collect()
    }

    /// Integer list flattened under `prefix`.
    pub fn int_list(&self, prefix: &str) -> Result<Vec<i64>> {
        self.list(prefix)
            .into_iter()
            .map(|v| v.as_int().ok_or_else(|| invalid(format!("list {prefix:?} holds a non-integer"))))
            .collect()
    }

    /// String list flattened under `prefix`.
    pub fn string_list(&self, prefix: &str) -> Vec<String> {
        self.list(prefix).into_iter().map(TunnelValue::as_string).collect()
    }
}

/// Parsed tunnel request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelRequest {
    /// Service path, e.g. `"leaderboards/player/get"`
    pub path: String,
    /// Named arguments
    pub args: TunnelArgs,
}

impl TunnelRequest {
    /// Parse `[["<path>", [[names], [values]]]]`.
    ///
    /// # Errors
    ///
    /// - `InvalidTunnel` on malformed JSON, a missing path, mismatched name and
    ///   value counts, or unsupported value types
    pub fn parse(text: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(text)?;
        let entry = root
            .as_array()
            .and_then(|outer| outer.first())
            .and_then(Value::as_array)
            .ok_or_else(|| invalid("expected [[path, [[names], [values]]]]"))?;

        let path = entry.first().and_then(Value::as_str).ok_or_else(|| invalid("missing service path"))?;

        let mut args = TunnelArgs::new();
        let Some(columns) = entry.get(1).and_then(Value::as_array) else {
            return Ok(Self { path: path.to_string(), args });
        };

        let empty = Vec::new();
        let names = columns.first().and_then(Value::as_array).unwrap_or(&empty);
        let values = columns.get(1).and_then(Value::as_array).unwrap_or(&empty);
        if names.len() != values.len() {
            return Err(invalid(format!("{} names but {} values", names.len(), values.len())));
        }

        for (name, value) in names.iter().zip(values) {
            let name = name.as_str().ok_or_else(|| invalid("field name is not a string"))?;
            args.insert(name, TunnelValue::from_json(value)?);
        }

        Ok(Self { path: path.to_string(), args })
    }

    /// Serialize in request form.
    pub fn to_json_string(&self) -> String {
        let names: Vec<Value> = self.args.iter().map(|(k, _)| Value::from(k)).collect();
        let values: Vec<Value> = self.args.iter().map(|(_, v)| v.to_json()).collect();
        Value::Array(vec![Value::Array(vec![
            Value::from(self.path.as_str()),
            Value::Array(vec![Value::Array(names), Value::Array(values)]),
        ])])
        .to_string()
    }
}

/// Name and type of one response column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Column name as it appears on the wire
    pub name: String,
    /// Column type
    pub kind: FieldKind,
}

enum Layout<'a> {
    Recording(Vec<FieldSpec>),
    Cached(&'a [FieldSpec]),
}

/// Builder for one response row.
pub struct RowWriter<'a> {
    layout: Layout<'a>,
    values: Vec<TunnelValue>,
    mismatch: Option<String>,
}

impl<'a> RowWriter<'a> {
    fn recording() -> Self {
        Self { layout: Layout::Recording(Vec::new()), values: Vec::new(), mismatch: None }
    }

    fn cached(layout: &'a [FieldSpec]) -> Self {
        Self { layout: Layout::Cached(layout), values: Vec::with_capacity(layout.len()), mismatch: None }
    }

    fn push(&mut self, name: &str, value: TunnelValue) {
        match &mut self.layout {
            Layout::Recording(fields) => fields.push(FieldSpec { name: name.to_string(), kind: value.kind() }),
            Layout::Cached(fields) => {
                let matches =
                    fields.get(self.values.len()).is_some_and(|spec| spec.name == name && spec.kind == value.kind());
                if !matches && self.mismatch.is_none() {
                    self.mismatch = Some(format!("column {name:?} does not match the first row"));
                }
            },
        }
        self.values.push(value);
    }

    /// Integer column.
    pub fn int(&mut self, name: &str, value: impl Into<i64>) -> &mut Self {
        self.push(name, TunnelValue::Int(value.into()));
        self
    }

    /// String column.
    pub fn string(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.push(name, TunnelValue::Str(value.into()));
        self
    }

    /// Integer list flattened into `prefix000`, `prefix001`, ...
    pub fn int_list(&mut self, prefix: &str, values: &[i64]) -> &mut Self {
        for (i, v) in values.iter().enumerate() {
            self.push(&list_field_name(prefix, i), TunnelValue::Int(*v));
        }
        self
    }

    /// String list flattened into `prefix000`, `prefix001`, ...
    pub fn string_list(&mut self, prefix: &str, values: &[String]) -> &mut Self {
        for (i, v) in values.iter().enumerate() {
            self.push(&list_field_name(prefix, i), TunnelValue::Str(v.clone()));
        }
        self
    }

    fn finish(self) -> Result<(Vec<TunnelValue>, Option<Vec<FieldSpec>>)> {
        if let Some(msg) = self.mismatch {
            return Err(invalid(msg));
        }
        match self.layout {
            Layout::Recording(fields) => Ok((self.values, Some(fields))),
            Layout::Cached(fields) if fields.len() == self.values.len() => Ok((self.values, None)),
            Layout::Cached(fields) => {
                Err(invalid(format!("row has {} columns, first row had {}", self.values.len(), fields.len())))
            },
        }
    }
}

/// A value that serializes as one response row.
pub trait TunnelRow {
    /// Write every column of this row in order.
    fn write_row(&self, row: &mut RowWriter<'_>);
}

/// Response body for one service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelResponse {
    path: String,
    layout: Vec<FieldSpec>,
    rows: Vec<Vec<TunnelValue>>,
    nested: bool,
}

impl TunnelResponse {
    /// Response with no rows: `[["<path>", "", [], []]]`.
    pub fn empty(path: impl Into<String>) -> Self {
        Self { path: path.into(), layout: Vec::new(), rows: Vec::new(), nested: false }
    }

    /// Response with exactly one flat row.
    pub fn single<R: TunnelRow + ?Sized>(path: impl Into<String>, row: &R) -> Result<Self> {
        let mut writer = RowWriter::recording();
        row.write_row(&mut writer);
        let (values, layout) = writer.finish()?;

        Ok(Self { path: path.into(), layout: layout.unwrap_or_default(), rows: vec![values], nested: false })
    }

    /// Response with a nested list of rows. No rows gives the empty response.
    ///
    /// # Errors
    ///
    /// - `InvalidTunnel` if a row's columns differ from the first row's
    pub fn rows<R: TunnelRow>(path: impl Into<String>, rows: &[R]) -> Result<Self> {
        let path = path.into();
        let Some((first, rest)) = rows.split_first() else {
            return Ok(Self::empty(path));
        };

        let mut writer = RowWriter::recording();
        first.write_row(&mut writer);
        let (first_values, layout) = writer.finish()?;
        let layout = layout.unwrap_or_default();

        let mut values = Vec::with_capacity(rows.len());
        values.push(first_values);
        for row in rest {
            let mut writer = RowWriter::cached(&layout);
            row.write_row(&mut writer);
            values.push(writer.finish()?.0);
        }

        Ok(Self { path, layout, rows: values, nested: true })
    }

    /// Service path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Types string, one character per column.
    pub fn types(&self) -> String {
        self.layout.iter().map(|f| f.kind.type_char()).collect()
    }

    /// Column names.
    pub fn names(&self) -> Vec<&str> {
        self.layout.iter().map(|f| f.name.as_str()).collect()
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// True if the response carries no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Every row as a named argument map.
    pub fn row_args(&self) -> Vec<TunnelArgs> {
        self.rows
            .iter()
            .map(|row| {
                let mut args = TunnelArgs::new();
                for (spec, value) in self.layout.iter().zip(row) {
                    args.insert(spec.name.clone(), value.clone());
                }
                args
            })
            .collect()
    }

    /// Serialize to the wire form.
    pub fn to_json_string(&self) -> String {
        let names = self.layout.iter().map(|f| Value::from(f.name.as_str())).collect();
        let encode_row = |row: &Vec<TunnelValue>| Value::Array(row.iter().map(TunnelValue::to_json).collect());

        let values = if self.nested {
            Value::Array(self.rows.iter().map(encode_row).collect())
        } else {
            self.rows.first().map_or_else(|| Value::Array(Vec::new()), encode_row)
        };

        Value::Array(vec![Value::Array(vec![
            Value::from(self.path.as_str()),
            Value::from(self.types()),
            Value::Array(names),
            values,
        ])])
        .to_string()
    }

    /// Parse the wire form.
    ///
    /// # Errors
    ///
    /// - `InvalidTunnel` if the shape, types string or row widths disagree
    pub fn parse(text: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(text)?;
        let entry = root
            .as_array()
            .and_then(|outer| outer.first())
            .and_then(Value::as_array)
            .filter(|entry| entry.len() == 4)
            .ok_or_else(|| invalid("expected [[path, types, names, values]]"))?;

        let path = entry[0].as_str().ok_or_else(|| invalid("missing service path"))?;
        let types = entry[1].as_str().ok_or_else(|| invalid("types is not a string"))?;
        let names = entry[2].as_array().ok_or_else(|| invalid("names is not a list"))?;
        let values = entry[3].as_array().ok_or_else(|| invalid("values is not a list"))?;

        let kinds = types.chars().map(FieldKind::from_char).collect::<Result<Vec<_>>>()?;
        if kinds.len() != names.len() {
            return Err(invalid(format!("{} types but {} names", kinds.len(), names.len())));
        }

        let layout = names
            .iter()
            .zip(kinds)
            .map(|(name, kind)| {
                let name = name.as_str().ok_or_else(|| invalid("field name is not a string"))?;
                Ok(FieldSpec { name: name.to_string(), kind })
            })
            .collect::<Result<Vec<_>>>()?;

        let nested = values.first().is_some_and(Value::is_array);
        let raw_rows: Vec<&Vec<Value>> = if nested {
            values.iter().map(|row| row.as_array().ok_or_else(|| invalid("row is not a list"))).collect::<Result<_>>()?
        } else if values.is_empty() {
            Vec::new()
        } else {
            vec![values]
        };

        let rows = raw_rows
            .into_iter()
            .map(|row| {
                if row.len() != layout.len() {
                    return Err(invalid(format!("row has {} values for {} columns", row.len(), layout.len())));
                }
                row.iter()
                    .zip(&layout)
                    .map(|(v, spec)| TunnelValue::from_json_as(v, spec.kind))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { path: path.to_string(), layout, rows, nested })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CreationStatus {
        pid: i64,
        creator: i64,
    }

    impl TunnelRow for CreationStatus {
        fn write_row(&self, row: &mut RowWriter<'_>) {
            row.int("pid", self.pid).int("creator", self.creator);
        }
    }

    struct Setlist {
        id: i64,
        title: String,
        songs: Vec<i64>,
    }

    impl TunnelRow for Setlist {
        fn write_row(&self, row: &mut RowWriter<'_>) {
            row.int("id", self.id).string("title", self.title.clone()).int_list("s", &self.songs);
        }
    }

    #[test]
    fn single_row_marshals_flat() {
        let response = TunnelResponse::single(
            "misc/get_accounts_setlist_creation_status",
            &CreationStatus { pid: 12345, creator: 0 },
        )
        .unwrap();

        assert_eq!(
            response.to_json_string(),
            r#"[["misc/get_accounts_setlist_creation_status","dd",["pid","creator"],[12345,0]]]"#
        );
    }

    #[test]
    fn request_unmarshals_to_named_map() {
        let request =
            TunnelRequest::parse(r#"[["misc/get_accounts_setlist_creation_status",[["pid"],[12345]]]]"#).unwrap();

        assert_eq!(request.path, "misc/get_accounts_setlist_creation_status");
        assert_eq!(request.args.len(), 1);
        assert_eq!(request.args.int("pid").unwrap(), 12345);
    }

    #[test]
    fn empty_response_shape() {
        assert_eq!(TunnelResponse::empty("songlists/get").to_json_string(), r#"[["songlists/get","",[],[]]]"#);
        let none: [Setlist; 0] = [];
        assert_eq!(TunnelResponse::rows("songlists/get", &none).unwrap(), TunnelResponse::empty("songlists/get"));
    }

    #[test]
    fn list_fields_expand_with_index_suffix() {
        let response = TunnelResponse::single(
            "setlists/sync",
            &Setlist { id: 9, title: "Mix".to_string(), songs: vec![100, 200] },
        )
        .unwrap();

        assert_eq!(response.types(), "dsdd");
        assert_eq!(response.names(), vec!["id", "title", "s000", "s001"]);

        let args = &response.row_args()[0];
        assert_eq!(args.int_list("s").unwrap(), vec![100, 200]);
    }

    #[test]
    fn multiple_rows_nest() {
        let rows = [CreationStatus { pid: 1, creator: 0 }, CreationStatus { pid: 2, creator: 1 }];
        let response = TunnelResponse::rows("x", &rows).unwrap();

        assert_eq!(response.to_json_string(), r#"[["x","dd",["pid","creator"],[[1,0],[2,1]]]]"#);
        assert_eq!(TunnelResponse::parse(&response.to_json_string()).unwrap(), response);
    }

    #[test]
    fn rows_with_different_columns_are_rejected() {
        let rows = [
            Setlist { id: 1, title: "a".to_string(), songs: vec![1] },
            Setlist { id: 2, title: "b".to_string(), songs: vec![1, 2] },
        ];
        assert!(TunnelResponse::rows("x", &rows).is_err());
    }

    #[test]
    fn list_collection_ignores_similar_names() {
        let mut args = TunnelArgs::new();
        args.insert("song001", 2).insert("song000", 1).insert("songs", 9).insert("song0001", 5);

        assert_eq!(args.int_list("song").unwrap(), vec![1, 2]);
    }

    #[test]
    fn mismatched_request_columns_are_rejected() {
        assert!(TunnelRequest::parse(r#"[["x",[["a","b"],[1]]]]"#).is_err());
        assert!(TunnelRequest::parse(r#"{"x":1}"#).is_err());
        assert!(TunnelRequest::parse(r#"[["x",[["a"],[[1]]]]]"#).is_err());
    }

    #[test]
    fn request_without_columns_has_no_args() {
        let request = TunnelRequest::parse(r#"[["config/get",[[],[]]]]"#).unwrap();
        assert!(request.args.is_empty());
    }

    #[test]
    fn request_serialization_round_trips() {
        let mut args = TunnelArgs::new();
        args.insert("pid", 7).insert("name", "band");
        let request = TunnelRequest { path: "entities/band/update".to_string(), args };

        assert_eq!(TunnelRequest::parse(&request.to_json_string()).unwrap(), request);
    }
}
