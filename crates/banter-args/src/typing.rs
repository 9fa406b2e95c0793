//! Type casting: the resolver registry, built-in types, and combinators.
//!
//! A type caster maps one raw unit of input to a domain value or a failure.
//! Failure is data, never an exception: casters return [`Cast`], and only
//! truly unexpected errors (a network failure inside an asynchronous
//! caster, for example) propagate as `anyhow::Error`.
//!
//! - [`TypeCaster`] -- the casting trait; [`caster`] adapts plain closures
//! - [`TypeSpec`] -- a closed description of how to cast: a registered
//!   name, literal alias groups, a regex, a boxed caster, or a combinator
//!   (union, product, validate, range, compose, tagged)
//! - [`TypeResolver`] -- the registry of named casters, seeded with
//!   built-ins, passed by reference into the argument pipeline

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use regex::Regex;
use serde_json::{json, Value};

use banter_types::{BanterError, CommandContext};

/// Outcome of casting one raw unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Cast {
    /// Casting succeeded.
    Ok(Value),
    /// The caster declined the input (no diagnostic payload).
    Miss,
    /// Casting failed with an optional diagnostic payload.
    Fail(Option<Value>),
}

impl Cast {
    /// Create a success outcome.
    pub fn ok(value: impl Into<Value>) -> Self {
        Cast::Ok(value.into())
    }

    /// Create a failure outcome with a diagnostic payload.
    pub fn fail(reason: impl Into<Value>) -> Self {
        Cast::Fail(Some(reason.into()))
    }

    /// Whether this outcome is anything other than a success.
    pub fn is_failure(&self) -> bool {
        !matches!(self, Cast::Ok(_))
    }

    /// Extract the value on success.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Cast::Ok(v) => Some(v),
            _ => None,
        }
    }
}

/// A function from raw input to a domain value or failure.
///
/// Casters may suspend (database lookups, HTTP fetches); the resolver
/// awaits them. Pure casters must be idempotent -- casting the same raw
/// unit twice yields the same result.
#[async_trait]
pub trait TypeCaster: Send + Sync {
    /// Cast one raw unit in the context of the triggering message.
    async fn cast(&self, ctx: &CommandContext, phrase: &str) -> Result<Cast>;
}

struct FnCaster<F>(F);

#[async_trait]
impl<F> TypeCaster for FnCaster<F>
where
    F: Fn(&CommandContext, &str) -> Result<Cast> + Send + Sync,
{
    async fn cast(&self, ctx: &CommandContext, phrase: &str) -> Result<Cast> {
        (self.0)(ctx, phrase)
    }
}

/// Adapt a synchronous closure into a boxed [`TypeCaster`].
pub fn caster<F>(f: F) -> Arc<dyn TypeCaster>
where
    F: Fn(&CommandContext, &str) -> Result<Cast> + Send + Sync + 'static,
{
    Arc::new(FnCaster(f))
}

/// A predicate over the context, the raw unit, and the cast value.
pub type Predicate = dyn Fn(&CommandContext, &str, &Value) -> bool + Send + Sync;

/// A closed description of how to cast a raw unit.
///
/// Combinators are structural variants here, not registry entries; their
/// constructor names are reserved in the [`TypeResolver`].
#[derive(Clone)]
pub enum TypeSpec {
    /// Look up a registered caster by name. An unknown name falls back to
    /// the raw unit itself (or a miss when the unit is empty).
    Name(String),
    /// Case-insensitive literal alias groups; a match yields the canonical
    /// first entry of its group.
    Literals(Vec<Vec<String>>),
    /// Match a regex against the raw unit. `all` also collects every
    /// match, not just the first.
    Pattern {
        /// The compiled expression.
        regex: Regex,
        /// Whether to populate the full match list.
        all: bool,
    },
    /// An explicit caster.
    Caster(Arc<dyn TypeCaster>),
    /// Try each spec in order; the first non-failing result wins.
    Union(Vec<TypeSpec>),
    /// Every spec must succeed; yields the ordered sequence of results and
    /// short-circuits on the first failure.
    Product(Vec<TypeSpec>),
    /// Wrap a spec with an extra predicate over the cast result.
    Validate {
        /// The wrapped spec.
        inner: Box<TypeSpec>,
        /// Accepts or rejects the cast value.
        predicate: Arc<Predicate>,
    },
    /// Validate specialized to numeric/length/size bounds.
    Range {
        /// The wrapped spec.
        inner: Box<TypeSpec>,
        /// Inclusive lower bound.
        min: f64,
        /// Upper bound; inclusive only when `inclusive` is set.
        max: f64,
        /// Whether `max` itself is accepted.
        inclusive: bool,
    },
    /// Pipe the raw input through a left-to-right chain of specs,
    /// short-circuiting on the first failure.
    Compose(Vec<TypeSpec>),
    /// Wrap the result (or failure) with a tag and/or the original input.
    Tagged {
        /// The wrapped spec.
        inner: Box<TypeSpec>,
        /// Metadata tag attached to the outcome.
        tag: Option<Value>,
        /// Whether to attach the original raw input.
        with_input: bool,
    },
}

impl TypeSpec {
    /// A registered type by name.
    pub fn name(name: impl Into<String>) -> Self {
        TypeSpec::Name(name.into())
    }

    /// Literal alias groups. Each group's first entry is canonical.
    pub fn literals(groups: Vec<Vec<String>>) -> Self {
        TypeSpec::Literals(groups)
    }

    /// Literal words, each its own group.
    pub fn words(words: &[&str]) -> Self {
        TypeSpec::Literals(words.iter().map(|w| vec![w.to_string()]).collect())
    }

    /// Match a regex, reporting the first match.
    pub fn pattern(regex: Regex) -> Self {
        TypeSpec::Pattern { regex, all: false }
    }

    /// Match a regex, reporting every match.
    pub fn pattern_all(regex: Regex) -> Self {
        TypeSpec::Pattern { regex, all: true }
    }

    /// An explicit caster.
    pub fn of(caster: Arc<dyn TypeCaster>) -> Self {
        TypeSpec::Caster(caster)
    }

    /// Try each spec in order, first non-failing result wins.
    pub fn union(specs: Vec<TypeSpec>) -> Self {
        TypeSpec::Union(specs)
    }

    /// Require every spec to succeed, yielding all results in order.
    pub fn product(specs: Vec<TypeSpec>) -> Self {
        TypeSpec::Product(specs)
    }

    /// Wrap a spec with a predicate over the cast result.
    pub fn validate<F>(inner: TypeSpec, predicate: F) -> Self
    where
        F: Fn(&CommandContext, &str, &Value) -> bool + Send + Sync + 'static,
    {
        TypeSpec::Validate {
            inner: Box::new(inner),
            predicate: Arc::new(predicate),
        }
    }

    /// Bound the cast result numerically (numbers by value, strings and
    /// sequences by length).
    pub fn range(inner: TypeSpec, min: f64, max: f64, inclusive: bool) -> Self {
        TypeSpec::Range {
            inner: Box::new(inner),
            min,
            max,
            inclusive,
        }
    }

    /// Pipe the raw input through a chain of specs.
    pub fn compose(specs: Vec<TypeSpec>) -> Self {
        TypeSpec::Compose(specs)
    }

    /// Tag the outcome with metadata.
    pub fn tagged(inner: TypeSpec, tag: impl Into<Value>) -> Self {
        TypeSpec::Tagged {
            inner: Box::new(inner),
            tag: Some(tag.into()),
            with_input: false,
        }
    }

    /// Attach the original raw input to the outcome.
    pub fn with_input(inner: TypeSpec) -> Self {
        TypeSpec::Tagged {
            inner: Box::new(inner),
            tag: None,
            with_input: true,
        }
    }

    /// Tag the outcome and attach the original raw input.
    pub fn tagged_with_input(inner: TypeSpec, tag: impl Into<Value>) -> Self {
        TypeSpec::Tagged {
            inner: Box::new(inner),
            tag: Some(tag.into()),
            with_input: true,
        }
    }

    /// Check configuration invariants, naming `owner` in any error.
    ///
    /// Called at command-load time; an empty literal alias group is a
    /// programmer error, not a runtime miss.
    pub fn validate_config(&self, owner: &str) -> Result<(), BanterError> {
        match self {
            TypeSpec::Literals(groups) => {
                if groups.iter().any(|g| g.is_empty()) {
                    return Err(BanterError::EmptyLiterals(owner.to_string()));
                }
                Ok(())
            }
            TypeSpec::Union(specs) | TypeSpec::Product(specs) | TypeSpec::Compose(specs) => {
                for spec in specs {
                    spec.validate_config(owner)?;
                }
                Ok(())
            }
            TypeSpec::Validate { inner, .. }
            | TypeSpec::Range { inner, .. }
            | TypeSpec::Tagged { inner, .. } => inner.validate_config(owner),
            _ => Ok(()),
        }
    }
}

impl From<&str> for TypeSpec {
    fn from(name: &str) -> Self {
        TypeSpec::name(name)
    }
}

impl fmt::Debug for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSpec::Name(n) => f.debug_tuple("Name").field(n).finish(),
            TypeSpec::Literals(g) => f.debug_tuple("Literals").field(g).finish(),
            TypeSpec::Pattern { regex, all } => f
                .debug_struct("Pattern")
                .field("regex", &regex.as_str())
                .field("all", all)
                .finish(),
            TypeSpec::Caster(_) => f.write_str("Caster(..)"),
            TypeSpec::Union(v) => f.debug_tuple("Union").field(v).finish(),
            TypeSpec::Product(v) => f.debug_tuple("Product").field(v).finish(),
            TypeSpec::Validate { inner, .. } => {
                f.debug_struct("Validate").field("inner", inner).finish_non_exhaustive()
            }
            TypeSpec::Range {
                inner,
                min,
                max,
                inclusive,
            } => f
                .debug_struct("Range")
                .field("inner", inner)
                .field("min", min)
                .field("max", max)
                .field("inclusive", inclusive)
                .finish(),
            TypeSpec::Compose(v) => f.debug_tuple("Compose").field(v).finish(),
            TypeSpec::Tagged {
                inner,
                tag,
                with_input,
            } => f
                .debug_struct("Tagged")
                .field("inner", inner)
                .field("tag", tag)
                .field("with_input", with_input)
                .finish(),
        }
    }
}

/// Names that can never be registered: they belong to the structural
/// combinators, not the registry.
pub const RESERVED_TYPE_NAMES: &[&str] = &[
    "union",
    "product",
    "tuple",
    "validate",
    "range",
    "compose",
    "tagged",
    "with_input",
];

/// Registry of named type casters.
///
/// Seeded with the built-in types at construction. Registrations validate
/// against the reserved-name set; re-registering a non-reserved name
/// (including a built-in) replaces the previous caster. The resolver is
/// passed by reference into the pipeline -- there is no global registry.
pub struct TypeResolver {
    types: HashMap<String, Arc<dyn TypeCaster>>,
}

impl Default for TypeResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeResolver {
    /// Create a resolver seeded with the built-in types.
    pub fn new() -> Self {
        let mut resolver = Self {
            types: HashMap::new(),
        };
        resolver.seed_builtins();
        resolver
    }

    fn seed_builtins(&mut self) {
        let entries: Vec<(&str, Arc<dyn TypeCaster>)> = vec![
            (
                "string",
                caster(|_, p| {
                    Ok(if p.is_empty() {
                        Cast::Miss
                    } else {
                        Cast::ok(p)
                    })
                }),
            ),
            (
                "lowercase",
                caster(|_, p| {
                    Ok(if p.is_empty() {
                        Cast::Miss
                    } else {
                        Cast::ok(p.to_lowercase())
                    })
                }),
            ),
            (
                "uppercase",
                caster(|_, p| {
                    Ok(if p.is_empty() {
                        Cast::Miss
                    } else {
                        Cast::ok(p.to_uppercase())
                    })
                }),
            ),
            (
                "integer",
                caster(|_, p| {
                    Ok(match p.trim().parse::<i64>() {
                        Ok(n) => Cast::ok(n),
                        Err(_) => Cast::Miss,
                    })
                }),
            ),
            (
                "natural",
                caster(|_, p| {
                    Ok(match p.trim().parse::<u64>() {
                        Ok(n) => Cast::ok(n),
                        Err(_) => Cast::Miss,
                    })
                }),
            ),
            (
                "number",
                caster(|_, p| {
                    Ok(match p.trim().parse::<f64>() {
                        Ok(n) if n.is_finite() => match serde_json::Number::from_f64(n) {
                            Some(num) => Cast::Ok(Value::Number(num)),
                            None => Cast::Miss,
                        },
                        _ => Cast::Miss,
                    })
                }),
            ),
            (
                "url",
                caster(|_, p| {
                    Ok(match url::Url::parse(p.trim()) {
                        Ok(u) => Cast::ok(u.to_string()),
                        Err(_) => Cast::Miss,
                    })
                }),
            ),
            (
                "date",
                caster(|_, p| {
                    let trimmed = p.trim();
                    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(trimmed) {
                        return Ok(Cast::ok(dt.to_rfc3339()));
                    }
                    Ok(match chrono::NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
                        Ok(d) => Cast::ok(d.to_string()),
                        Err(_) => Cast::Miss,
                    })
                }),
            ),
        ];
        for (name, c) in entries {
            self.types.insert(name.to_string(), c);
        }
    }

    /// Register a named caster. Rejects reserved names; otherwise the last
    /// registration wins.
    pub fn add_type(
        &mut self,
        name: impl Into<String>,
        caster: Arc<dyn TypeCaster>,
    ) -> Result<(), BanterError> {
        let name = name.into();
        if RESERVED_TYPE_NAMES.contains(&name.as_str()) {
            return Err(BanterError::ReservedType(name));
        }
        self.types.insert(name, caster);
        Ok(())
    }

    /// Register several named casters at once.
    pub fn add_types(
        &mut self,
        entries: impl IntoIterator<Item = (String, Arc<dyn TypeCaster>)>,
    ) -> Result<(), BanterError> {
        for (name, caster) in entries {
            self.add_type(name, caster)?;
        }
        Ok(())
    }

    /// Look up a registered caster by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn TypeCaster>> {
        self.types.get(name)
    }

    /// Cast one raw unit against a spec.
    pub async fn cast(
        &self,
        spec: &TypeSpec,
        ctx: &CommandContext,
        phrase: &str,
    ) -> Result<Cast> {
        self.cast_inner(spec, ctx, phrase).await
    }

    // Boxed for recursion through the combinator variants.
    fn cast_inner<'a>(
        &'a self,
        spec: &'a TypeSpec,
        ctx: &'a CommandContext,
        phrase: &'a str,
    ) -> BoxFuture<'a, Result<Cast>> {
        Box::pin(async move {
            match spec {
                TypeSpec::Name(name) => match self.types.get(name) {
                    Some(caster) => caster.cast(ctx, phrase).await,
                    // Unknown name: the raw unit itself, or a miss if empty.
                    None if !phrase.is_empty() => Ok(Cast::ok(phrase)),
                    None => Ok(Cast::Miss),
                },
                TypeSpec::Literals(groups) => {
                    let needle = phrase.to_lowercase();
                    for group in groups {
                        if group.iter().any(|entry| entry.to_lowercase() == needle) {
                            return Ok(Cast::ok(group[0].clone()));
                        }
                    }
                    Ok(Cast::Miss)
                }
                TypeSpec::Pattern { regex, all } => {
                    if *all {
                        let matches: Vec<Value> = regex
                            .find_iter(phrase)
                            .map(|m| Value::from(m.as_str()))
                            .collect();
                        match matches.first().cloned() {
                            Some(first) => Ok(Cast::Ok(json!({
                                "match": first,
                                "matches": matches,
                            }))),
                            None => Ok(Cast::Miss),
                        }
                    } else {
                        match regex.find(phrase) {
                            Some(m) => Ok(Cast::Ok(json!({
                                "match": m.as_str(),
                                "matches": Value::Null,
                            }))),
                            None => Ok(Cast::Miss),
                        }
                    }
                }
                TypeSpec::Caster(caster) => caster.cast(ctx, phrase).await,
                TypeSpec::Union(specs) => {
                    for entry in specs {
                        let outcome = self.cast_inner(entry, ctx, phrase).await?;
                        if !outcome.is_failure() {
                            return Ok(outcome);
                        }
                    }
                    Ok(Cast::fail(phrase))
                }
                TypeSpec::Product(specs) => {
                    let mut results = Vec::with_capacity(specs.len());
                    for entry in specs {
                        match self.cast_inner(entry, ctx, phrase).await? {
                            Cast::Ok(v) => results.push(v),
                            failure => return Ok(failure),
                        }
                    }
                    Ok(Cast::Ok(Value::Array(results)))
                }
                TypeSpec::Validate { inner, predicate } => {
                    match self.cast_inner(inner, ctx, phrase).await? {
                        Cast::Ok(v) if predicate(ctx, phrase, &v) => Ok(Cast::Ok(v)),
                        Cast::Ok(_) => Ok(Cast::fail(phrase)),
                        failure => Ok(failure),
                    }
                }
                TypeSpec::Range {
                    inner,
                    min,
                    max,
                    inclusive,
                } => match self.cast_inner(inner, ctx, phrase).await? {
                    Cast::Ok(v) => {
                        let measure = match &v {
                            Value::Number(n) => n.as_f64(),
                            Value::String(s) => Some(s.chars().count() as f64),
                            Value::Array(a) => Some(a.len() as f64),
                            Value::Object(o) => Some(o.len() as f64),
                            _ => None,
                        };
                        match measure {
                            Some(x)
                                if x >= *min && (if *inclusive { x <= *max } else { x < *max }) =>
                            {
                                Ok(Cast::Ok(v))
                            }
                            _ => Ok(Cast::fail(phrase)),
                        }
                    }
                    failure => Ok(failure),
                },
                TypeSpec::Compose(specs) => {
                    let mut current = phrase.to_string();
                    let mut last = Cast::Miss;
                    for entry in specs {
                        match self.cast_inner(entry, ctx, &current).await? {
                            Cast::Ok(v) => {
                                current = value_to_phrase(&v);
                                last = Cast::Ok(v);
                            }
                            failure => return Ok(failure),
                        }
                    }
                    Ok(last)
                }
                TypeSpec::Tagged {
                    inner,
                    tag,
                    with_input,
                } => {
                    let outcome = self.cast_inner(inner, ctx, phrase).await?;
                    let mut wrapped = serde_json::Map::new();
                    if let Some(tag) = tag {
                        wrapped.insert("tag".to_string(), tag.clone());
                    }
                    if *with_input {
                        wrapped.insert("input".to_string(), Value::from(phrase));
                    }
                    match outcome {
                        Cast::Ok(v) => {
                            wrapped.insert("value".to_string(), v);
                            Ok(Cast::Ok(Value::Object(wrapped)))
                        }
                        Cast::Fail(reason) => {
                            wrapped
                                .insert("reason".to_string(), reason.unwrap_or(Value::Null));
                            Ok(Cast::Fail(Some(Value::Object(wrapped))))
                        }
                        Cast::Miss => Ok(Cast::Fail(Some(Value::Object(wrapped)))),
                    }
                }
            }
        })
    }
}

impl fmt::Debug for TypeResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("TypeResolver").field("types", &names).finish()
    }
}

/// Render an intermediate cast value back into phrase form for the next
/// stage of a compose chain. Strings pass through unquoted.
fn value_to_phrase(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
