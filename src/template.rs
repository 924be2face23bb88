//! Tile template
//!
//! A declarative per-cell field schema, compiled once into a list of typed field
//! descriptors so that `instantiate`/`parse` never need to re-interpret the schema at
//! call time — no reflection, no per-call string matching beyond a single `HashMap`
//! lookup for named access.
//!
//! Grounded on the source's `TileTemplate` class, which builds a dynamic
//! `namedtuple` per schema at runtime; here the schema is compiled into a static
//! `Vec<Field>` plus a name→position index, and a tile "instance" is a positional
//! `Vec<FieldValue>` aligned with that schema.

#![forbid(unsafe_code)]

use std::collections::HashMap;

use crate::bits::{read_number, Literal};

/// Errors raised while building, instantiating, or merging a tile template.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("alias {field:?} refers to undeclared field {target:?}")]
    UndeclaredAliasTarget { field: String, target: String },
    #[error("alias {field:?} refers to {target:?}, which is declared later in the template")]
    ForwardAliasReference { field: String, target: String },
    #[error("field {0:?} declared more than once")]
    DuplicateField(String),
    #[error("arr/num/signed_num/one_hot field {0:?} needs at least one dimension")]
    EmptyDimensions(String),
    #[error("cannot merge templates: field {0:?} has incompatible kinds")]
    IncompatibleMerge(String),
    #[error("bit vector length {got} is not a multiple of the template size {size}")]
    MisalignedBitVector { got: usize, size: usize },
    #[error("unknown field {0:?}")]
    UnknownField(String),
}

/// One field's declared shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// A single literal.
    Bool,
    /// A (possibly multi-dimensional) array of literals.
    Arr(Vec<usize>),
    /// An `n`-bit little-endian unsigned integer.
    Num(usize),
    /// An `n`-bit two's-complement integer.
    SignedNum(usize),
    /// `n` literals with exactly-one-true semantics (enforced by the caller, not here).
    OneHot(usize),
    /// A derived view concatenating (and optionally negating) previously declared
    /// fields; allocates no literals of its own.
    Alias(Vec<AliasTerm>),
}

/// One term of an `alias` field: a source field name and whether it is bit-negated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasTerm {
    pub field: String,
    pub negate: bool,
}

impl AliasTerm {
    pub fn new(field: impl Into<String>, negate: bool) -> Self {
        Self { field: field.into(), negate }
    }
}

#[derive(Debug, Clone)]
struct Field {
    name: String,
    kind: FieldKind,
}

/// The literal value(s) bound to one field of one tile instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Literal(Literal),
    List(Vec<FieldValue>),
}

impl FieldValue {
    /// Flatten into the literals it contains, in the schema's declared order —
    /// the view `num`/`signed_num`/`one_hot`/`arr` callers almost always want.
    pub fn flatten(&self) -> Vec<Literal> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(&self, out: &mut Vec<Literal>) {
        match self {
            FieldValue::Literal(l) => out.push(*l),
            FieldValue::List(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            },
        }
    }

    fn negate(&self) -> FieldValue {
        match self {
            FieldValue::Literal(l) => FieldValue::Literal(-l),
            FieldValue::List(items) => FieldValue::List(items.iter().map(FieldValue::negate).collect()),
        }
    }
}

/// The decoded value of one field under a satisfying assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedValue {
    Bool(bool),
    Arr(Vec<ParsedValue>),
    Num(i64),
    /// A one-hot field's selected index, or `None` if no position was true.
    OneHot(Option<usize>),
}

/// A tile instance: literals allocated for one grid cell, aligned positionally with
/// the owning [`TileTemplate`]'s field list.
#[derive(Debug, Clone)]
pub struct TileInstance {
    values: Vec<FieldValue>,
}

impl TileInstance {
    pub fn field(&self, template: &TileTemplate, name: &str) -> Option<&FieldValue> {
        template.index_of.get(name).map(|&i| &self.values[i])
    }

    /// Convenience: the flattened literal list for a named field, or `None` if the
    /// field does not exist.
    pub fn literals(&self, template: &TileTemplate, name: &str) -> Option<Vec<Literal>> {
        self.field(template, name).map(FieldValue::flatten)
    }

    /// Convenience: the single literal of a named `bool` field.
    pub fn literal(&self, template: &TileTemplate, name: &str) -> Option<Literal> {
        match self.field(template, name)? {
            FieldValue::Literal(l) => Some(*l),
            FieldValue::List(_) => None,
        }
    }
}

/// A tile record: the decoded fields of one grid cell under a satisfying assignment.
#[derive(Debug, Clone)]
pub struct TileRecord {
    values: Vec<ParsedValue>,
}

impl TileRecord {
    pub fn field(&self, template: &TileTemplate, name: &str) -> Option<&ParsedValue> {
        template.index_of.get(name).map(|&i| &self.values[i])
    }

    /// Render every field of this record as a JSON object keyed by field name, per
    /// §6's solution output format: booleans as `bool`, `arr`/alias fields as nested
    /// arrays, `num`/`signed_num` as integers, and `one_hot` as the selected index or
    /// `null` when no position was true.
    pub fn to_json(&self, template: &TileTemplate) -> serde_json::Value {
        let mut map = serde_json::Map::with_capacity(self.values.len());
        for (name, value) in template.field_names().zip(self.values.iter()) {
            map.insert(name.to_string(), value.to_json());
        }
        serde_json::Value::Object(map)
    }
}

impl ParsedValue {
    /// Render one decoded field value as JSON, per the same mapping as
    /// [`TileRecord::to_json`].
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ParsedValue::Bool(b) => serde_json::Value::Bool(*b),
            ParsedValue::Arr(items) => serde_json::Value::Array(items.iter().map(ParsedValue::to_json).collect()),
            ParsedValue::Num(n) => serde_json::Value::Number((*n).into()),
            ParsedValue::OneHot(Some(i)) => serde_json::Value::Number((*i as i64).into()),
            ParsedValue::OneHot(None) => serde_json::Value::Null,
        }
    }
}

/// A compiled per-cell field schema.
#[derive(Debug, Clone)]
pub struct TileTemplate {
    fields: Vec<Field>,
    index_of: HashMap<String, usize>,
    /// Total literals consumed by one instance of this template.
    pub size: usize,
}

fn dims_product(dims: &[usize]) -> usize {
    dims.iter().product()
}

impl TileTemplate {
    /// Build a template from an ordered list of `(name, kind)` declarations. Aliases
    /// may only reference fields declared strictly earlier in the list (mirroring the
    /// source's "reached" set).
    pub fn new(declarations: Vec<(impl Into<String>, FieldKind)>) -> Result<Self, TemplateError> {
        let declarations: Vec<(String, FieldKind)> = declarations.into_iter().map(|(n, k)| (n.into(), k)).collect();
        let all_names: std::collections::HashSet<&str> = declarations.iter().map(|(n, _)| n.as_str()).collect();

        let mut fields = Vec::with_capacity(declarations.len());
        let mut index_of = HashMap::with_capacity(declarations.len());
        let mut size = 0usize;

        for (name, kind) in declarations {
            if index_of.contains_key(&name) {
                return Err(TemplateError::DuplicateField(name));
            }

            match &kind {
                FieldKind::Bool => size += 1,
                FieldKind::Arr(dims) => {
                    if dims.is_empty() {
                        return Err(TemplateError::EmptyDimensions(name));
                    }
                    size += dims_product(dims);
                },
                FieldKind::Num(n) | FieldKind::SignedNum(n) | FieldKind::OneHot(n) => {
                    size += n;
                },
                FieldKind::Alias(terms) => {
                    for term in terms {
                        if !all_names.contains(term.field.as_str()) {
                            return Err(TemplateError::UndeclaredAliasTarget {
                                field: name.clone(),
                                target: term.field.clone(),
                            });
                        }
                        if !index_of.contains_key(&term.field) {
                            return Err(TemplateError::ForwardAliasReference {
                                field: name.clone(),
                                target: term.field.clone(),
                            });
                        }
                    }
                },
            }

            index_of.insert(name.clone(), fields.len());
            fields.push(Field { name, kind });
        }

        Ok(Self { fields, index_of, size })
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Allocate a fresh tile instance at `index`: literals are drawn sequentially from
    /// `index * size + 1`.
    pub fn instantiate(&self, index: usize) -> TileInstance {
        let mut next = (index * self.size + 1) as Literal;
        let mut values: Vec<FieldValue> = Vec::with_capacity(self.fields.len());

        for field in &self.fields {
            let value = match &field.kind {
                FieldKind::Bool => {
                    let lit = next;
                    next += 1;
                    FieldValue::Literal(lit)
                },
                FieldKind::Arr(dims) => instantiate_dims(dims, &mut next),
                FieldKind::Num(n) | FieldKind::SignedNum(n) | FieldKind::OneHot(n) => {
                    let items = (0..*n)
                        .map(|_| {
                            let lit = next;
                            next += 1;
                            FieldValue::Literal(lit)
                        })
                        .collect();
                    FieldValue::List(items)
                },
                FieldKind::Alias(_) => FieldValue::List(Vec::new()),
            };
            values.push(value);
        }

        // Aliases are resolved in a second pass since they may reference fields
        // declared earlier in this same loop.
        for (i, field) in self.fields.iter().enumerate() {
            if let FieldKind::Alias(terms) = &field.kind {
                let mut combined = Vec::new();
                for term in terms {
                    let source_idx = self.index_of[&term.field];
                    let value = if term.negate { values[source_idx].negate() } else { values[source_idx].clone() };
                    match value {
                        FieldValue::Literal(l) => combined.push(FieldValue::Literal(l)),
                        FieldValue::List(items) => combined.extend(items),
                    }
                }
                values[i] = FieldValue::List(combined);
            }
        }

        TileInstance { values }
    }

    /// Parse a single tile's worth of bits (`bits.len() == self.size`) into a record.
    pub fn parse_tile(&self, bits: &[bool]) -> Result<TileRecord, TemplateError> {
        if bits.len() != self.size {
            return Err(TemplateError::MisalignedBitVector { got: bits.len(), size: self.size });
        }

        let mut values = Vec::with_capacity(self.fields.len());
        let mut cursor = 0usize;
        for field in &self.fields {
            let parsed = match &field.kind {
                FieldKind::Bool => {
                    let v = ParsedValue::Bool(bits[cursor]);
                    cursor += 1;
                    v
                },
                FieldKind::Arr(dims) => {
                    let consumed = dims_product(dims);
                    let v = parse_dims(dims, &bits[cursor..(cursor + consumed)]);
                    cursor += consumed;
                    v
                },
                FieldKind::Num(n) | FieldKind::SignedNum(n) => {
                    let signed = matches!(field.kind, FieldKind::SignedNum(_));
                    let v = if *n == 0 {
                        ParsedValue::Num(0)
                    } else {
                        ParsedValue::Num(read_number(&bits[cursor..(cursor + n)], signed))
                    };
                    cursor += n;
                    v
                },
                FieldKind::OneHot(n) => {
                    let slice = &bits[cursor..(cursor + n)];
                    let v = ParsedValue::OneHot(slice.iter().position(|&b| b));
                    cursor += n;
                    v
                },
                FieldKind::Alias(_) => {
                    // Aliases allocate no literals of their own; re-derive from the
                    // already-parsed source fields.
                    ParsedValue::Arr(Vec::new())
                },
            };
            values.push(parsed);
        }

        // Resolve aliases against already-parsed values, same two-pass shape as
        // `instantiate`.
        for (i, field) in self.fields.iter().enumerate() {
            if let FieldKind::Alias(terms) = &field.kind {
                let mut combined = Vec::new();
                for term in terms {
                    let source_idx = self.index_of[&term.field];
                    combined.push(values[source_idx].clone());
                }
                values[i] = if combined.len() == 1 {
                    combined.into_iter().next().unwrap()
                } else {
                    ParsedValue::Arr(combined)
                };
            }
        }

        Ok(TileRecord { values })
    }

    /// Parse a flat bit vector holding `n` back-to-back tiles (`bits.len() == n *
    /// self.size`) into `n` records, batching the way the source's `parse` does.
    pub fn parse_all(&self, bits: &[bool]) -> Result<Vec<TileRecord>, TemplateError> {
        if self.size == 0 || bits.len() % self.size != 0 {
            return Err(TemplateError::MisalignedBitVector { got: bits.len(), size: self.size });
        }
        bits.chunks(self.size).map(|chunk| self.parse_tile(chunk)).collect()
    }

    /// Combine two templates: shared field names must have identical kinds;
    /// field order is `self`'s fields followed by `other`'s fields not already present.
    pub fn merge(&self, other: &TileTemplate) -> Result<TileTemplate, TemplateError> {
        let mut declarations: Vec<(String, FieldKind)> =
            self.fields.iter().map(|f| (f.name.clone(), f.kind.clone())).collect();

        for field in &other.fields {
            match self.index_of.get(&field.name) {
                Some(&i) if self.fields[i].kind == field.kind => {},
                Some(_) => return Err(TemplateError::IncompatibleMerge(field.name.clone())),
                None => declarations.push((field.name.clone(), field.kind.clone())),
            }
        }

        TileTemplate::new(declarations)
    }
}

fn instantiate_dims(dims: &[usize], next: &mut Literal) -> FieldValue {
    if dims.len() == 1 {
        let items = (0..dims[0])
            .map(|_| {
                let lit = *next;
                *next += 1;
                FieldValue::Literal(lit)
            })
            .collect();
        FieldValue::List(items)
    } else {
        let items = (0..dims[0]).map(|_| instantiate_dims(&dims[1..], next)).collect();
        FieldValue::List(items)
    }
}

fn parse_dims(dims: &[usize], bits: &[bool]) -> ParsedValue {
    if dims.len() == 1 {
        ParsedValue::Arr(bits.iter().map(|&b| ParsedValue::Bool(b)).collect())
    } else {
        let stride: usize = dims[1..].iter().product();
        let items = bits.chunks(stride).map(|chunk| parse_dims(&dims[1..], chunk)).collect();
        ParsedValue::Arr(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_template() -> TileTemplate {
        TileTemplate::new(vec![
            ("input_direction", FieldKind::OneHot(4)),
            ("output_direction", FieldKind::OneHot(4)),
            ("all_direction", FieldKind::Alias(vec![
                AliasTerm::new("input_direction", false),
                AliasTerm::new("output_direction", false),
            ])),
            ("colour", FieldKind::Num(3)),
            ("flag", FieldKind::Bool),
        ])
        .unwrap()
    }

    #[test]
    fn instantiate_allocates_sequential_literals_per_index() {
        let template = sample_template();
        assert_eq!(template.size, 4 + 4 + 3 + 1);

        let tile0 = template.instantiate(0);
        let tile1 = template.instantiate(1);

        assert_eq!(tile0.literals(&template, "input_direction").unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(tile0.literals(&template, "output_direction").unwrap(), vec![5, 6, 7, 8]);
        assert_eq!(tile0.literals(&template, "colour").unwrap(), vec![9, 10, 11]);
        assert_eq!(tile0.literal(&template, "flag").unwrap(), 12);

        assert_eq!(tile1.literal(&template, "flag").unwrap(), 12 + template.size as Literal);
    }

    #[test]
    fn alias_concatenates_referenced_fields() {
        let template = sample_template();
        let tile = template.instantiate(0);
        assert_eq!(
            tile.literals(&template, "all_direction").unwrap(),
            vec![1, 2, 3, 4, 5, 6, 7, 8]
        );
    }

    #[test]
    fn alias_negation_flips_sign() {
        let template = TileTemplate::new(vec![
            ("a", FieldKind::OneHot(2)),
            ("not_a", FieldKind::Alias(vec![AliasTerm::new("a", true)])),
        ])
        .unwrap();
        let tile = template.instantiate(0);
        assert_eq!(tile.literals(&template, "a").unwrap(), vec![1, 2]);
        assert_eq!(tile.literals(&template, "not_a").unwrap(), vec![-1, -2]);
    }

    #[test]
    fn alias_to_undeclared_field_is_rejected() {
        let err = TileTemplate::new(vec![("bad", FieldKind::Alias(vec![AliasTerm::new("missing", false)]))])
            .unwrap_err();
        assert_eq!(
            err,
            TemplateError::UndeclaredAliasTarget { field: "bad".into(), target: "missing".into() }
        );
    }

    #[test]
    fn alias_to_not_yet_declared_field_is_rejected() {
        let err = TileTemplate::new(vec![
            ("early", FieldKind::Alias(vec![AliasTerm::new("late", false)])),
            ("late", FieldKind::Bool),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            TemplateError::ForwardAliasReference { field: "early".into(), target: "late".into() }
        );
    }

    #[test]
    fn parse_tile_decodes_one_hot_num_and_bool() {
        let template = sample_template();
        // input_direction picks index 2, output_direction all zero, colour = 5, flag = true.
        let mut bits = vec![false; template.size];
        bits[2] = true; // input_direction[2]
        // output_direction all false
        bits[8] = true; // colour bit 0 (value 5 = 0b101)
        bits[10] = true; // colour bit 2
        bits[11] = true; // flag

        let record = template.parse_tile(&bits).unwrap();
        assert_eq!(record.field(&template, "input_direction").unwrap(), &ParsedValue::OneHot(Some(2)));
        assert_eq!(record.field(&template, "output_direction").unwrap(), &ParsedValue::OneHot(None));
        assert_eq!(record.field(&template, "colour").unwrap(), &ParsedValue::Num(5));
        assert_eq!(record.field(&template, "flag").unwrap(), &ParsedValue::Bool(true));
    }

    #[test]
    fn parse_all_batches_multiple_tiles() {
        let template = TileTemplate::new(vec![("flag", FieldKind::Bool)]).unwrap();
        let bits = vec![true, false, true];
        let records = template.parse_all(&bits).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].field(&template, "flag").unwrap(), &ParsedValue::Bool(true));
        assert_eq!(records[1].field(&template, "flag").unwrap(), &ParsedValue::Bool(false));
    }

    #[test]
    fn merge_requires_identical_kinds_for_shared_fields() {
        let a = TileTemplate::new(vec![("colour", FieldKind::Num(3))]).unwrap();
        let b = TileTemplate::new(vec![("colour", FieldKind::Num(4))]).unwrap();
        assert_eq!(a.merge(&b).unwrap_err(), TemplateError::IncompatibleMerge("colour".into()));
    }

    #[test]
    fn merge_unions_distinct_fields() {
        let a = TileTemplate::new(vec![("a", FieldKind::Bool)]).unwrap();
        let b = TileTemplate::new(vec![("b", FieldKind::Bool)]).unwrap();
        let merged = a.merge(&b).unwrap();
        assert_eq!(merged.size, 2);
        assert!(merged.field_names().eq(["a", "b"]));
    }

    #[test]
    fn signed_num_round_trips_negative_values() {
        let template = TileTemplate::new(vec![("s", FieldKind::SignedNum(3))]).unwrap();
        // -1 in 3-bit two's complement is 0b111
        let bits = vec![true, true, true];
        let record = template.parse_tile(&bits).unwrap();
        assert_eq!(record.field(&template, "s").unwrap(), &ParsedValue::Num(-1));
    }

    #[test]
    fn to_json_renders_one_hot_num_and_bool_fields_by_name() {
        let template = sample_template();
        let mut bits = vec![false; template.size];
        bits[2] = true; // input_direction[2]
        bits[8] = true; // colour bit 0 (value 5 = 0b101)
        bits[10] = true; // colour bit 2
        bits[11] = true; // flag

        let record = template.parse_tile(&bits).unwrap();
        let json = record.to_json(&template);
        assert_eq!(json["input_direction"], serde_json::json!(2));
        assert_eq!(json["output_direction"], serde_json::json!(null));
        assert_eq!(json["colour"], serde_json::json!(5));
        assert_eq!(json["flag"], serde_json::json!(true));
    }
}
