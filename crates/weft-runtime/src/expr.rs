#![forbid(unsafe_code)]

//! Binding expressions as handed over by the template compiler.
//!
//! Expressions are evaluated against a component's store, a loop [`Scope`],
//! the component's filter table and, inside event handlers, the `$event`
//! payload. Evaluation never fails: unknown paths read as absent and unknown
//! filters pass their input through.
//!
//! Every expression can report the paths it reads ([`Expr::reads`]); the
//! binding layer resolves those against the loop scope to decide whether a
//! batch touches the binding at all.

use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use smallvec::SmallVec;
use weft_core::{DataValue, Key, Path, PathStore};

/// A filter: input value plus evaluated arguments in, output value out.
pub type Filter = Rc<dyn Fn(Option<DataValue>, &[Option<DataValue>]) -> Option<DataValue>>;

pub type FilterTable = AHashMap<String, Filter>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    /// Loose equality: numbers and numeric strings compare by value, absent
    /// equals `Null`.
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    /// Returns the left operand when falsy, else the right one.
    And,
    /// Returns the left operand when truthy, else the right one.
    Or,
}

/// One step after the head of an [`ExprPath`].
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Key(Key),
    /// `a[expr]`: the key is computed at evaluation time.
    Dynamic(Expr),
}

/// A data read: a head name (a data key or a loop local) and further steps.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprPath {
    pub head: String,
    pub rest: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(DataValue),
    Read(ExprPath),
    /// `$event`.
    Event,
    /// Interpolated text, each part rendered and joined.
    Concat(Vec<Expr>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Conditional {
        test: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// `input | name(args)`.
    Filter {
        input: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl ExprPath {
    #[must_use]
    pub fn new(head: impl Into<String>) -> Self {
        Self {
            head: head.into(),
            rest: Vec::new(),
        }
    }

    #[must_use]
    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.rest.push(Segment::Key(key.into()));
        self
    }

    #[must_use]
    pub fn dynamic(mut self, expr: Expr) -> Self {
        self.rest.push(Segment::Dynamic(expr));
        self
    }

    /// From `a.b[0]` text. Text that does not parse as a path, or that starts
    /// with an index, becomes a single head name.
    #[must_use]
    pub fn parse_lenient(text: &str) -> Self {
        match Path::parse(text) {
            Ok(path) => match path.keys().split_first() {
                Some((Key::Name(head), rest)) => Self {
                    head: head.clone(),
                    rest: rest.iter().cloned().map(Segment::Key).collect(),
                },
                _ => Self::new(text),
            },
            Err(_) => Self::new(text),
        }
    }

    /// The store path this read is anchored on, up to its first dynamic
    /// segment. `None` when the head is a loop local holding a plain value.
    #[must_use]
    pub fn resolve_static(&self, scope: &Scope) -> Option<Path> {
        let mut base = match scope.lookup(&self.head) {
            Some(Local::Alias(path)) => path.clone(),
            Some(Local::Value(_)) => return None,
            None => Path::name(self.head.as_str()),
        };
        for segment in &self.rest {
            match segment {
                Segment::Key(key) => base.push(key.clone()),
                Segment::Dynamic(_) => break,
            }
        }
        Some(base)
    }

    /// The full store path this read addresses, evaluating dynamic segments.
    #[must_use]
    pub fn store_path(&self, env: &EvalEnv<'_>) -> Option<Path> {
        match locate(self, env)? {
            Located::Store(path) => Some(path),
            Located::Local(..) => None,
        }
    }
}

impl fmt::Display for ExprPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.head)?;
        for segment in &self.rest {
            match segment {
                Segment::Key(Key::Index(idx)) => write!(f, "[{idx}]")?,
                Segment::Key(Key::Name(name)) => write!(f, ".{name}")?,
                Segment::Dynamic(_) => f.write_str("[..]")?,
            }
        }
        Ok(())
    }
}

impl Expr {
    #[must_use]
    pub fn lit(value: impl Into<DataValue>) -> Self {
        Self::Literal(value.into())
    }

    /// A read of `a.b[0]` style text.
    #[must_use]
    pub fn path(text: &str) -> Self {
        Self::Read(ExprPath::parse_lenient(text))
    }

    #[must_use]
    pub fn concat(parts: impl IntoIterator<Item = Expr>) -> Self {
        Self::Concat(parts.into_iter().collect())
    }

    #[must_use]
    pub fn not(expr: Expr) -> Self {
        Self::Not(Box::new(expr))
    }

    #[must_use]
    pub fn neg(expr: Expr) -> Self {
        Self::Neg(Box::new(expr))
    }

    #[must_use]
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Self::Binary(op, Box::new(left), Box::new(right))
    }

    #[must_use]
    pub fn cond(test: Expr, then: Expr, otherwise: Expr) -> Self {
        Self::Conditional {
            test: Box::new(test),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    /// `self | name(args)`.
    #[must_use]
    pub fn pipe(self, name: impl Into<String>, args: impl IntoIterator<Item = Expr>) -> Self {
        Self::Filter {
            input: Box::new(self),
            name: name.into(),
            args: args.into_iter().collect(),
        }
    }

    /// Every path this expression may read, including paths inside dynamic
    /// segments and filter arguments.
    #[must_use]
    pub fn reads(&self) -> Vec<ExprPath> {
        let mut out = Vec::new();
        self.collect_reads(&mut out);
        out
    }

    fn collect_reads(&self, out: &mut Vec<ExprPath>) {
        match self {
            Self::Literal(_) | Self::Event => {}
            Self::Read(path) => {
                for segment in &path.rest {
                    if let Segment::Dynamic(inner) = segment {
                        inner.collect_reads(out);
                    }
                }
                out.push(path.clone());
            }
            Self::Concat(parts) => parts.iter().for_each(|p| p.collect_reads(out)),
            Self::Not(inner) | Self::Neg(inner) => inner.collect_reads(out),
            Self::Binary(_, left, right) => {
                left.collect_reads(out);
                right.collect_reads(out);
            }
            Self::Conditional {
                test,
                then,
                otherwise,
            } => {
                test.collect_reads(out);
                then.collect_reads(out);
                otherwise.collect_reads(out);
            }
            Self::Filter { input, args, .. } => {
                input.collect_reads(out);
                args.iter().for_each(|a| a.collect_reads(out));
            }
        }
    }

    /// The path read, when this expression is nothing but a read.
    #[must_use]
    pub fn as_read(&self) -> Option<&ExprPath> {
        match self {
            Self::Read(path) => Some(path),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// What a loop local stands for.
#[derive(Debug, Clone, PartialEq)]
pub enum Local {
    /// The item of a path-sourced loop: reads go to this store path.
    Alias(Path),
    /// A plain value (loop index, items of a computed source).
    Value(DataValue),
}

/// Chain of loop locals, innermost last.
#[derive(Debug, Default)]
pub struct Scope {
    parent: Option<Rc<Scope>>,
    locals: SmallVec<[(String, Local); 2]>,
}

impl Scope {
    #[must_use]
    pub fn root() -> Rc<Self> {
        Rc::new(Self::default())
    }

    #[must_use]
    pub fn child(parent: &Rc<Self>, locals: impl IntoIterator<Item = (String, Local)>) -> Rc<Self> {
        Rc::new(Self {
            parent: Some(Rc::clone(parent)),
            locals: locals.into_iter().collect(),
        })
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&Local> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some((_, local)) = current.locals.iter().find(|(n, _)| n == name) {
                return Some(local);
            }
            scope = current.parent.as_deref();
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Everything an expression may observe.
#[derive(Clone, Copy)]
pub struct EvalEnv<'a> {
    pub store: &'a PathStore,
    pub scope: &'a Scope,
    pub filters: &'a FilterTable,
    /// `$event`; absent outside event handlers and for payload-less fires.
    pub event: Option<&'a DataValue>,
}

impl<'a> EvalEnv<'a> {
    #[must_use]
    pub fn new(store: &'a PathStore, scope: &'a Scope, filters: &'a FilterTable) -> Self {
        Self {
            store,
            scope,
            filters,
            event: None,
        }
    }

    #[must_use]
    pub fn with_event(mut self, event: Option<&'a DataValue>) -> Self {
        self.event = event;
        self
    }
}

enum Located<'a> {
    Store(Path),
    Local(&'a DataValue, SmallVec<[Key; 4]>),
}

fn key_of(value: &DataValue) -> Option<Key> {
    match value {
        DataValue::Number(n) if *n >= 0.0 && n.fract() == 0.0 => Some(Key::Index(*n as usize)),
        DataValue::String(s) => Some(Key::Name(s.clone())),
        DataValue::Bool(b) => Some(Key::Name(b.to_string())),
        _ => None,
    }
}

fn locate<'a>(path: &ExprPath, env: &EvalEnv<'a>) -> Option<Located<'a>> {
    let mut keys: SmallVec<[Key; 4]> = SmallVec::new();
    for segment in &path.rest {
        match segment {
            Segment::Key(key) => keys.push(key.clone()),
            Segment::Dynamic(expr) => keys.push(key_of(&eval(expr, env)?)?),
        }
    }
    Some(match env.scope.lookup(&path.head) {
        Some(Local::Alias(base)) => Located::Store(base.join(&Path::from_keys(keys))),
        Some(Local::Value(value)) => Located::Local(value, keys),
        None => {
            let mut full = Path::name(path.head.as_str());
            keys.into_iter().for_each(|k| full.push(k));
            Located::Store(full)
        }
    })
}

fn read(path: &ExprPath, env: &EvalEnv<'_>) -> Option<DataValue> {
    match locate(path, env)? {
        Located::Store(full) => env
            .store
            .get(&full)
            .cloned()
            .or_else(|| length_of(full.parent().and_then(|p| env.store.get(&p)), full.keys().last())),
        Located::Local(value, keys) => {
            let mut node = value;
            for (i, key) in keys.iter().enumerate() {
                match node.child(key) {
                    Some(next) => node = next,
                    None if i + 1 == keys.len() => return length_of(Some(node), Some(key)),
                    None => return None,
                }
            }
            Some(node.clone())
        }
    }
}

/// `list.length` for sequences and strings.
fn length_of(container: Option<&DataValue>, key: Option<&Key>) -> Option<DataValue> {
    match (container?, key?) {
        (DataValue::Seq(items), Key::Name(name)) if name == "length" => Some(items.len().into()),
        (DataValue::String(s), Key::Name(name)) if name == "length" => {
            Some(s.chars().count().into())
        }
        _ => None,
    }
}

fn truthy(value: Option<&DataValue>) -> bool {
    value.is_some_and(DataValue::is_truthy)
}

fn number(value: Option<&DataValue>) -> f64 {
    value.map_or(f64::NAN, DataValue::to_number)
}

fn loose_eq(left: Option<&DataValue>, right: Option<&DataValue>) -> bool {
    use DataValue as V;
    match (left, right) {
        (None | Some(V::Null), None | Some(V::Null)) => true,
        (None | Some(V::Null), _) | (_, None | Some(V::Null)) => false,
        (Some(a @ (V::Number(_) | V::Bool(_) | V::String(_))), Some(b @ (V::Number(_) | V::Bool(_))))
        | (Some(a @ (V::Number(_) | V::Bool(_))), Some(b @ V::String(_))) => {
            a.to_number() == b.to_number()
        }
        (Some(a), Some(b)) => a == b,
    }
}

fn compare(op: BinaryOp, left: Option<&DataValue>, right: Option<&DataValue>) -> bool {
    let ordering = match (left, right) {
        (Some(DataValue::String(a)), Some(DataValue::String(b))) => Some(a.cmp(b)),
        _ => number(left).partial_cmp(&number(right)),
    };
    let Some(ordering) = ordering else {
        return false;
    };
    match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        BinaryOp::Ge => ordering.is_ge(),
        _ => false,
    }
}

fn binary(op: BinaryOp, left: &Expr, right: &Expr, env: &EvalEnv<'_>) -> Option<DataValue> {
    let l = eval(left, env);
    match op {
        BinaryOp::And => {
            return if truthy(l.as_ref()) { eval(right, env) } else { l };
        }
        BinaryOp::Or => {
            return if truthy(l.as_ref()) { l } else { eval(right, env) };
        }
        _ => {}
    }
    let r = eval(right, env);
    let (l, r) = (l.as_ref(), r.as_ref());
    let value = match op {
        BinaryOp::Add => match (l, r) {
            (Some(DataValue::String(_)), _) | (_, Some(DataValue::String(_))) => {
                DataValue::String(weft_core::text_of(l) + &weft_core::text_of(r))
            }
            _ => DataValue::Number(number(l) + number(r)),
        },
        BinaryOp::Sub => DataValue::Number(number(l) - number(r)),
        BinaryOp::Mul => DataValue::Number(number(l) * number(r)),
        BinaryOp::Div => DataValue::Number(number(l) / number(r)),
        BinaryOp::Eq => DataValue::Bool(loose_eq(l, r)),
        BinaryOp::Ne => DataValue::Bool(!loose_eq(l, r)),
        BinaryOp::StrictEq => DataValue::Bool(l == r),
        BinaryOp::StrictNe => DataValue::Bool(l != r),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            DataValue::Bool(compare(op, l, r))
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("short-circuit operators handled above"),
    };
    Some(value)
}

/// Evaluate `expr`. `None` means absent.
#[must_use]
pub fn eval(expr: &Expr, env: &EvalEnv<'_>) -> Option<DataValue> {
    match expr {
        Expr::Literal(value) => Some(value.clone()),
        Expr::Read(path) => read(path, env),
        Expr::Event => env.event.cloned(),
        Expr::Concat(parts) => Some(DataValue::String(
            parts
                .iter()
                .map(|part| weft_core::text_of(eval(part, env).as_ref()))
                .collect(),
        )),
        Expr::Not(inner) => Some(DataValue::Bool(!truthy(eval(inner, env).as_ref()))),
        Expr::Neg(inner) => Some(DataValue::Number(-number(eval(inner, env).as_ref()))),
        Expr::Binary(op, left, right) => binary(*op, left, right, env),
        Expr::Conditional {
            test,
            then,
            otherwise,
        } => {
            if truthy(eval(test, env).as_ref()) {
                eval(then, env)
            } else {
                eval(otherwise, env)
            }
        }
        Expr::Filter { input, name, args } => {
            let value = eval(input, env);
            match env.filters.get(name) {
                Some(filter) => {
                    let args: Vec<Option<DataValue>> = args.iter().map(|a| eval(a, env)).collect();
                    filter(value, &args)
                }
                None => {
                    tracing::warn!(filter = %name, "unknown filter; passing value through");
                    value
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store(value: serde_json::Value) -> PathStore {
        PathStore::from_value(value.into())
    }

    fn run(expr: &Expr, store: &PathStore) -> Option<DataValue> {
        let scope = Scope::root();
        let filters = FilterTable::default();
        eval(expr, &EvalEnv::new(store, &scope, &filters))
    }

    #[test]
    fn reads_nested_paths_and_length() {
        let s = store(json!({"projects": [{"author": {"email": "e@x"}}], "tags": ["a", "b"]}));
        assert_eq!(
            run(&Expr::path("projects[0].author.email"), &s),
            Some("e@x".into())
        );
        assert_eq!(run(&Expr::path("projects[1].author"), &s), None);
        assert_eq!(run(&Expr::path("tags.length"), &s), Some(2.into()));
    }

    #[test]
    fn dynamic_segments_evaluate_keys() {
        let s = store(json!({"colors": ["red", "blue"], "i": 1, "k": "name", "user": {"name": "erik"}}));
        let by_index = Expr::Read(ExprPath::new("colors").dynamic(Expr::path("i")));
        assert_eq!(run(&by_index, &s), Some("blue".into()));
        let by_name = Expr::Read(ExprPath::new("user").dynamic(Expr::path("k")));
        assert_eq!(run(&by_name, &s), Some("erik".into()));
        let reads: Vec<String> = by_index.reads().iter().map(ToString::to_string).collect();
        assert_eq!(reads, ["i", "colors[..]"]);
    }

    #[test]
    fn loose_and_strict_equality() {
        let s = store(json!({"value": "1", "n": 1}));
        let loose = Expr::binary(BinaryOp::Eq, Expr::path("value"), Expr::path("n"));
        let strict = Expr::binary(BinaryOp::StrictEq, Expr::path("value"), Expr::path("n"));
        assert_eq!(run(&loose, &s), Some(true.into()));
        assert_eq!(run(&strict, &s), Some(false.into()));
        let absent = Expr::binary(BinaryOp::Eq, Expr::path("missing"), Expr::lit(DataValue::Null));
        assert_eq!(run(&absent, &s), Some(true.into()));
    }

    #[test]
    fn arithmetic_and_concat() {
        let s = store(json!({"level": 1, "first": "first", "last": "last"}));
        let minus = Expr::binary(BinaryOp::Sub, Expr::path("level"), Expr::lit(1));
        assert_eq!(run(&minus, &s), Some(0.into()));
        let name = Expr::binary(
            BinaryOp::Add,
            Expr::binary(BinaryOp::Add, Expr::path("first"), Expr::lit(" ")),
            Expr::path("last"),
        );
        assert_eq!(run(&name, &s), Some("first last".into()));
        let text = Expr::concat([Expr::lit("color-"), Expr::path("level")]);
        assert_eq!(run(&text, &s), Some("color-1".into()));
    }

    #[test]
    fn logical_operators_return_operands() {
        let s = store(json!({"a": "", "b": "fallback"}));
        let or = Expr::binary(BinaryOp::Or, Expr::path("a"), Expr::path("b"));
        assert_eq!(run(&or, &s), Some("fallback".into()));
        let and = Expr::binary(BinaryOp::And, Expr::path("a"), Expr::path("b"));
        assert_eq!(run(&and, &s), Some("".into()));
        let pick = Expr::cond(Expr::path("b"), Expr::lit("yes"), Expr::lit("no"));
        assert_eq!(run(&pick, &s), Some("yes".into()));
    }

    #[test]
    fn filters_apply_or_pass_through() {
        let s = store(json!({"name": "erik"}));
        let scope = Scope::root();
        let mut filters = FilterTable::default();
        filters.insert(
            "upper".into(),
            Rc::new(|v: Option<DataValue>, _: &[Option<DataValue>]| {
                v.map(|v| DataValue::from(v.to_text().to_uppercase()))
            }),
        );
        let env = EvalEnv::new(&s, &scope, &filters);
        assert_eq!(
            eval(&Expr::path("name").pipe("upper", []), &env),
            Some("ERIK".into())
        );
        assert_eq!(
            eval(&Expr::path("name").pipe("nope", []), &env),
            Some("erik".into())
        );
    }

    #[test]
    fn scope_aliases_and_values() {
        let s = store(json!({"persons": [{"name": "a"}, {"name": "b"}]}));
        let filters = FilterTable::default();
        let root = Scope::root();
        let item = Scope::child(
            &root,
            [
                ("p".to_owned(), Local::Alias(Path::parse("persons[1]").expect("path"))),
                ("i".to_owned(), Local::Value(1.into())),
            ],
        );
        let env = EvalEnv::new(&s, &item, &filters);
        assert_eq!(eval(&Expr::path("p.name"), &env), Some("b".into()));
        assert_eq!(eval(&Expr::path("i"), &env), Some(1.into()));

        let read = ExprPath::parse_lenient("p.name");
        assert_eq!(
            read.resolve_static(&item),
            Some(Path::parse("persons[1].name").expect("path"))
        );
        assert_eq!(ExprPath::new("i").resolve_static(&item), None);
    }

    #[test]
    fn event_reads_payload() {
        let s = PathStore::new();
        let scope = Scope::root();
        let filters = FilterTable::default();
        let zero = DataValue::from(0);
        let env = EvalEnv::new(&s, &scope, &filters).with_event(Some(&zero));
        assert_eq!(eval(&Expr::Event, &env), Some(0.into()));
        let env = EvalEnv::new(&s, &scope, &filters);
        assert_eq!(eval(&Expr::Event, &env), None);
    }
}
