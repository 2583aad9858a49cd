// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::rpc::{CallResult, Connection, RpcError, TYPING_INTERFACE};
use crate::typing::{SchemaDocument, TypeClass, TypeDecl, TypeExpr, TypeInstance, TypingError};

/// Builtin types and their generic variables, always present in a registry.
pub const BUILTIN_TYPES: &[(&str, &[&str])] = &[
    ("null", &[]),
    ("bool", &[]),
    ("uint64", &[]),
    ("int64", &[]),
    ("double", &[]),
    ("string", &[]),
    ("binary", &[]),
    ("array", &["T"]),
    ("dictionary", &["T"]),
    ("any", &[]),
];

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

pub(crate) struct Shared {
    table: RwLock<TypeTable>,
    units: RwLock<Vec<SchemaUnit>>,
}

/// Declarations in insertion order, indexed by name.
#[derive(Default)]
struct TypeTable {
    order: Vec<Arc<TypeDecl>>,
    index: HashMap<String, usize>,
}

impl TypeTable {
    fn get(&self, name: &str) -> Option<&Arc<TypeDecl>> {
        self.index.get(name).map(|&i| &self.order[i])
    }

    /// Insert or replace; a replaced declaration keeps its position.
    fn upsert(&mut self, decl: Arc<TypeDecl>) {
        match self.index.get(decl.name()) {
            Some(&i) => self.order[i] = decl,
            None => {
                self.index.insert(decl.name().to_string(), self.order.len());
                self.order.push(decl);
            }
        }
    }
}

/// A loaded schema unit, kept so it can be served to peers.
#[derive(Debug, Clone)]
pub struct SchemaUnit {
    pub origin: String,
    pub document: SchemaDocument,
}

// ---------------------------------------------------------------------------
// BatchReport
// ---------------------------------------------------------------------------

/// Outcome of a multi-file load.
///
/// `loaded` lists every unit merged into the registry. `failures` lists
/// every problem found, per file: units that failed to parse or conflicted
/// (and were not merged), and merged units whose references did not
/// resolve once the whole batch was in.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub loaded: Vec<PathBuf>,
    pub failures: Vec<(PathBuf, TypingError)>,
}

impl BatchReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    /// Failures reported for one file.
    pub fn failures_for<'a>(&'a self, path: &'a Path) -> impl Iterator<Item = &'a TypingError> + 'a {
        self.failures
            .iter()
            .filter(move |(p, _)| p == path)
            .map(|(_, err)| err)
    }
}

// ---------------------------------------------------------------------------
// Declarations iterator
// ---------------------------------------------------------------------------

/// Lazy walk over the registry in insertion order.
///
/// Each step reads the live table, so declarations loaded while iterating
/// are picked up. Ask the registry again to restart.
#[derive(Clone)]
pub struct Declarations {
    shared: Arc<Shared>,
    position: usize,
    interfaces: bool,
}

impl Iterator for Declarations {
    type Item = Arc<TypeDecl>;

    fn next(&mut self) -> Option<Self::Item> {
        let table = self.shared.table.read();
        while let Some(decl) = table.order.get(self.position) {
            self.position += 1;
            if (decl.class() == TypeClass::Interface) == self.interfaces {
                return Some(decl.clone());
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Typing
// ---------------------------------------------------------------------------

/// Registry of type and interface declarations.
///
/// Cloning gives another handle to the same registry.
#[derive(Clone)]
pub struct Typing {
    shared: Arc<Shared>,
}

impl Default for Typing {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Typing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Typing")
            .field("declarations", &self.len())
            .field("units", &self.shared.units.read().len())
            .finish()
    }
}

impl Typing {
    /// Create a registry holding only the builtin types.
    pub fn new() -> Self {
        let shared = Arc::new_cyclic(|weak| {
            let mut table = TypeTable::default();
            for (name, vars) in BUILTIN_TYPES {
                table.upsert(Arc::new(TypeDecl::builtin(name, vars, weak.clone())));
            }
            Shared {
                table: RwLock::new(table),
                units: RwLock::new(Vec::new()),
            }
        });
        Self { shared }
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Merge one schema unit.
    ///
    /// The unit is merged atomically: a malformed declaration or a
    /// redefinition with a different kind leaves the registry untouched.
    /// A same-kind redefinition replaces the earlier declaration.
    /// Returns the names declared by the unit.
    pub fn load(&self, document: &SchemaDocument, origin: &str) -> Result<Vec<String>, TypingError> {
        let namespace = document.namespace();
        let mut parsed: Vec<Arc<TypeDecl>> = Vec::with_capacity(document.declarations.len());
        for (key, body) in &document.declarations {
            let key = key.as_str().ok_or_else(|| TypingError::Parse {
                origin: origin.to_string(),
                reason: "declaration keys must be strings".into(),
            })?;
            let decl = TypeDecl::from_document(key, body, namespace, origin, Arc::downgrade(&self.shared))?;
            parsed.push(Arc::new(decl));
        }

        let mut table = self.shared.table.write();
        let mut in_unit: HashMap<&str, TypeClass> = HashMap::new();
        for decl in &parsed {
            let existing = in_unit
                .get(decl.name())
                .copied()
                .or_else(|| table.get(decl.name()).map(|d| d.class()));
            if let Some(existing) = existing {
                if existing != decl.class() || existing == TypeClass::Builtin {
                    return Err(TypingError::Conflict {
                        name: decl.name().to_string(),
                        existing,
                        new: decl.class(),
                    });
                }
            }
            in_unit.insert(decl.name(), decl.class());
        }

        let names: Vec<String> = parsed.iter().map(|d| d.name().to_string()).collect();
        for decl in parsed {
            if table.get(decl.name()).is_some() {
                log::debug!("[typing] {} redefined by {}", decl.name(), origin);
            }
            table.upsert(decl);
        }
        drop(table);

        let mut units = self.shared.units.write();
        let unit = SchemaUnit {
            origin: origin.to_string(),
            document: document.clone(),
        };
        match units.iter_mut().find(|u| u.origin == origin) {
            Some(slot) => *slot = unit,
            None => units.push(unit),
        }

        log::debug!("[typing] loaded {} declarations from {}", names.len(), origin);
        Ok(names)
    }

    /// Parse a YAML schema unit and merge it.
    pub fn load_str(&self, text: &str, origin: &str) -> Result<Vec<String>, TypingError> {
        let document = SchemaDocument::from_yaml_str(text).map_err(|e| TypingError::Parse {
            origin: origin.to_string(),
            reason: e.to_string(),
        })?;
        self.load(&document, origin)
    }

    /// Read, parse and merge one schema file.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<Vec<String>, TypingError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| TypingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.load_str(&text, &path.display().to_string())
    }

    /// Load several files, continuing past failures.
    ///
    /// References are checked once every file is in, so files may refer to
    /// declarations from later files.
    pub fn load_batch<I, P>(&self, paths: I) -> BatchReport
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut report = BatchReport::default();
        let mut declared: Vec<(PathBuf, Vec<String>)> = Vec::new();

        for path in paths {
            let path = path.as_ref().to_path_buf();
            match self.load_file(&path) {
                Ok(names) => {
                    report.loaded.push(path.clone());
                    declared.push((path, names));
                }
                Err(err) => {
                    log::warn!("[typing] skipping {}: {}", path.display(), err);
                    report.failures.push((path, err));
                }
            }
        }

        self.check_units(declared, &mut report);
        report
    }

    /// Report unresolved references of freshly loaded units, per file.
    fn check_units(&self, declared: Vec<(PathBuf, Vec<String>)>, report: &mut BatchReport) {
        for (path, names) in declared {
            for name in names {
                let Some(decl) = self.lookup(&name, None) else {
                    continue;
                };
                for err in self.check_decl(&decl) {
                    log::warn!("[typing] {}: {}", path.display(), err);
                    report.failures.push((path.clone(), err));
                }
            }
        }
    }

    /// Load every `.yaml` / `.yml` file of a directory, in name order.
    pub fn load_dir<P: AsRef<Path>>(&self, dir: P) -> Result<BatchReport, TypingError> {
        let dir = dir.as_ref();
        let io_err = |source| TypingError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            let is_schema = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            );
            if is_schema && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(self.load_batch(paths))
    }

    /// Look up a declaration by its full name.
    pub fn resolve(&self, name: &str) -> Result<Arc<TypeDecl>, TypingError> {
        self.lookup(name, None)
            .ok_or_else(|| TypingError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.shared.table.read().get(name).is_some()
    }

    /// Look up `name`, trying `namespace.name` first.
    pub(crate) fn lookup(&self, name: &str, namespace: Option<&str>) -> Option<Arc<TypeDecl>> {
        let table = self.shared.table.read();
        if let Some(ns) = namespace.filter(|ns| !ns.is_empty()) {
            if let Some(decl) = table.get(&format!("{ns}.{name}")) {
                return Some(decl.clone());
            }
        }
        table.get(name).cloned()
    }

    /// Instantiate a type from its textual form, e.g. `array<Point>`.
    /// Missing generic arguments default to `any`.
    pub fn instantiate(&self, text: &str) -> Result<TypeInstance, TypingError> {
        let expr = TypeExpr::parse(text)?;
        self.instantiate_expr(&expr, None, None)
    }

    pub(crate) fn instantiate_expr(
        &self,
        expr: &TypeExpr,
        scope: Option<&TypeInstance>,
        namespace: Option<&str>,
    ) -> Result<TypeInstance, TypingError> {
        if expr.is_bare() {
            if let Some(bound) = scope.and_then(|s| s.variable(&expr.name)) {
                return Ok(bound.clone());
            }
        }

        let decl = self
            .lookup(&expr.name, namespace)
            .ok_or_else(|| TypingError::NotFound(expr.name.clone()))?;
        if expr.args.len() > decl.vars().len() {
            return Err(TypingError::malformed(
                expr.to_string(),
                format!(
                    "{} takes {} type arguments, got {}",
                    decl.name(),
                    decl.vars().len(),
                    expr.args.len()
                ),
            ));
        }

        let mut specializations = Vec::with_capacity(decl.vars().len());
        for index in 0..decl.vars().len() {
            let inst = match expr.args.get(index) {
                Some(arg) => self.instantiate_expr(arg, scope, namespace)?,
                None => self.any()?,
            };
            specializations.push(inst);
        }
        Ok(TypeInstance::new(decl, specializations))
    }

    /// The `any` builtin.
    pub fn any(&self) -> Result<TypeInstance, TypingError> {
        let decl = self.resolve("any")?;
        Ok(TypeInstance::new(decl, Vec::new()))
    }

    /// Non-interface declarations (builtins included), in insertion order.
    pub fn types(&self) -> Declarations {
        Declarations {
            shared: self.shared.clone(),
            position: 0,
            interfaces: false,
        }
    }

    /// Interface declarations, in insertion order.
    pub fn interfaces(&self) -> Declarations {
        Declarations {
            shared: self.shared.clone(),
            position: 0,
            interfaces: true,
        }
    }

    /// Number of declarations, builtins included.
    pub fn len(&self) -> usize {
        self.shared.table.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Schema units loaded so far, in load order.
    pub fn units(&self) -> Vec<SchemaUnit> {
        self.shared.units.read().clone()
    }

    /// Check every declaration's references.
    pub fn check(&self) -> Vec<TypingError> {
        let decls: Vec<Arc<TypeDecl>> = self.shared.table.read().order.clone();
        decls.iter().flat_map(|d| self.check_decl(d)).collect()
    }

    fn check_decl(&self, decl: &Arc<TypeDecl>) -> Vec<TypingError> {
        let any = match self.any() {
            Ok(any) => any,
            Err(err) => return vec![err],
        };
        let scope = TypeInstance::new(decl.clone(), vec![any; decl.vars().len()]);
        let mut errors = Vec::new();
        for expr in decl.references() {
            match scope.resolve(expr) {
                Ok(_) => {}
                Err(TypingError::NotFound(reference)) => errors.push(TypingError::Unresolved {
                    declaration: decl.name().to_string(),
                    reference,
                }),
                Err(err) => errors.push(err),
            }
        }
        errors
    }

    /// Fetch the schema units served by a peer and merge them.
    pub async fn download(&self, connection: &Connection) -> Result<BatchReport, RpcError> {
        let reply = connection.call("/", TYPING_INTERFACE, "download", Vec::new()).await?;
        let CallResult::Single(units) = reply else {
            return Err(RpcError::Protocol("Typing.download must not stream".into()));
        };
        let units = units
            .as_array()
            .ok_or_else(|| RpcError::Protocol("Typing.download must return an array".into()))?;

        let mut report = BatchReport::default();
        let mut declared = Vec::new();
        for unit in units {
            let origin = unit
                .get_key("origin")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            let source = unit
                .get_key("source")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            let path = PathBuf::from(&origin);
            match self.load_str(&source, &origin) {
                Ok(names) => {
                    report.loaded.push(path.clone());
                    declared.push((path, names));
                }
                Err(err) => report.failures.push((path, err)),
            }
        }
        self.check_units(declared, &mut report);

        log::info!(
            "[typing] downloaded {} schema units ({} problems)",
            report.loaded.len(),
            report.failures.len()
        );
        Ok(report)
    }
}
