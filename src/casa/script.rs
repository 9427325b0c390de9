//! Structured CASA scripts.
//!
//! Engine calls are described as task invocations with typed arguments and
//! rendered to Python only when the script is written, so no parameter is
//! ever spliced into source text unescaped.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// A Python literal
#[derive(Debug, Clone, PartialEq)]
pub enum PyValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<PyValue>),
}

impl PyValue {
    /// Render as Python source
    pub fn render(&self) -> String {
        match self {
            PyValue::None => "None".to_string(),
            PyValue::Bool(true) => "True".to_string(),
            PyValue::Bool(false) => "False".to_string(),
            PyValue::Int(i) => i.to_string(),
            PyValue::Float(f) => render_float(*f),
            PyValue::Str(s) => quote(s),
            PyValue::List(items) => {
                let inner: Vec<String> = items.iter().map(PyValue::render).collect();
                format!("[{}]", inner.join(", "))
            }
        }
    }
}

fn render_float(f: f64) -> String {
    if f.is_nan() {
        "float('nan')".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "float('inf')".to_string() } else { "float('-inf')".to_string() }
    } else {
        // Debug keeps a trailing ".0" on whole numbers
        format!("{:?}", f)
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

impl From<bool> for PyValue {
    fn from(v: bool) -> Self {
        PyValue::Bool(v)
    }
}

impl From<i64> for PyValue {
    fn from(v: i64) -> Self {
        PyValue::Int(v)
    }
}

impl From<u32> for PyValue {
    fn from(v: u32) -> Self {
        PyValue::Int(i64::from(v))
    }
}

impl From<u64> for PyValue {
    fn from(v: u64) -> Self {
        // CASA iteration limits are far below i64::MAX
        PyValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for PyValue {
    fn from(v: f64) -> Self {
        PyValue::Float(v)
    }
}

impl From<&str> for PyValue {
    fn from(v: &str) -> Self {
        PyValue::Str(v.to_string())
    }
}

impl From<String> for PyValue {
    fn from(v: String) -> Self {
        PyValue::Str(v)
    }
}

impl From<&String> for PyValue {
    fn from(v: &String) -> Self {
        PyValue::Str(v.clone())
    }
}

impl From<&Path> for PyValue {
    fn from(v: &Path) -> Self {
        PyValue::Str(v.to_string_lossy().into_owned())
    }
}

impl From<PathBuf> for PyValue {
    fn from(v: PathBuf) -> Self {
        PyValue::from(v.as_path())
    }
}

impl From<&PathBuf> for PyValue {
    fn from(v: &PathBuf) -> Self {
        PyValue::from(v.as_path())
    }
}

impl<T: Into<PyValue>> From<Vec<T>> for PyValue {
    fn from(v: Vec<T>) -> Self {
        PyValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<PyValue> + Copy, const N: usize> From<[T; N]> for PyValue {
    fn from(v: [T; N]) -> Self {
        PyValue::List(v.iter().map(|x| (*x).into()).collect())
    }
}

/// A single CASA task invocation with keyword arguments
#[derive(Debug, Clone, PartialEq)]
pub struct TaskCall {
    pub task: String,
    pub args: Vec<(String, PyValue)>,
}

impl TaskCall {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            args: Vec::new(),
        }
    }

    /// Add a keyword argument
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<PyValue>) -> Self {
        self.args.push((name.into(), value.into()));
        self
    }

    /// Add a keyword argument only when a value is present
    pub fn arg_opt<V: Into<PyValue>>(self, name: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(v) => self.arg(name, v),
            None => self,
        }
    }

    /// Look up an argument by name
    pub fn get(&self, name: &str) -> Option<&PyValue> {
        self.args.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn render(&self) -> String {
        if self.args.is_empty() {
            return format!("{}()", self.task);
        }
        let mut out = format!("{}(\n", self.task);
        for (name, value) in &self.args {
            let _ = writeln!(out, "    {}={},", name, value.render());
        }
        out.push(')');
        out
    }
}

/// One line-level statement of a script
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Comment(String),
    Call(TaskCall),
    /// `target = task(...)`
    Assign { target: String, call: TaskCall },
    /// Dump the summary statistics dictionary held in `source` (as returned
    /// by imstat) to a JSON file
    WriteStats { source: String, path: PathBuf },
}

impl Statement {
    fn render(&self) -> String {
        match self {
            Statement::Comment(text) => text.lines().map(|l| format!("# {}", l)).collect::<Vec<_>>().join("\n"),
            Statement::Call(call) => call.render(),
            Statement::Assign { target, call } => format!("{} = {}", target, call.render()),
            Statement::WriteStats { source, path } => {
                let mut out = format!("with open({}, 'w') as f:\n", quote(&path.to_string_lossy()));
                out.push_str("    json.dump({\n");
                for key in ["rms", "max", "min", "mean"] {
                    let _ = writeln!(out, "        '{k}': float({src}['{k}'][0]),", k = key, src = source);
                }
                out.push_str("    }, f)");
                out
            }
        }
    }
}

/// A complete script for one engine invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CasaScript {
    imports: Vec<(String, Vec<String>)>,
    statements: Vec<Statement>,
}

impl CasaScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// `from module import names...`; a bare `import module` when `names` is empty
    pub fn import(mut self, module: &str, names: &[&str]) -> Self {
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        match self.imports.iter_mut().find(|(m, _)| m == module) {
            Some((_, existing)) => {
                for n in names {
                    if !existing.contains(&n) {
                        existing.push(n);
                    }
                }
            }
            None => self.imports.push((module.to_string(), names)),
        }
        self
    }

    pub fn comment(mut self, text: impl Into<String>) -> Self {
        self.statements.push(Statement::Comment(text.into()));
        self
    }

    pub fn call(mut self, call: TaskCall) -> Self {
        self.statements.push(Statement::Call(call));
        self
    }

    pub fn assign(mut self, target: impl Into<String>, call: TaskCall) -> Self {
        self.statements.push(Statement::Assign {
            target: target.into(),
            call,
        });
        self
    }

    pub fn write_stats(mut self, source: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.statements.push(Statement::WriteStats {
            source: source.into(),
            path: path.into(),
        });
        self
    }

    /// Task calls in order, including assigned ones
    pub fn calls(&self) -> impl Iterator<Item = &TaskCall> {
        self.statements.iter().filter_map(|s| match s {
            Statement::Call(c) | Statement::Assign { call: c, .. } => Some(c),
            _ => None,
        })
    }

    /// Find the first call of `task`
    pub fn find_call(&self, task: &str) -> Option<&TaskCall> {
        self.calls().find(|c| c.task == task)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (module, names) in &self.imports {
            if names.is_empty() {
                let _ = writeln!(out, "import {}", module);
            } else {
                let _ = writeln!(out, "from {} import {}", module, names.join(", "));
            }
        }
        for stmt in &self.statements {
            out.push('\n');
            out.push_str(&stmt.render());
            out.push('\n');
        }
        out
    }
}
