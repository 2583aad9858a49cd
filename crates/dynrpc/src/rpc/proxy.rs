// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Local mirror of a peer's object tree.
//!
//! Built by [`Connection::introspect`]. Methods and properties whose
//! interface is declared in the connection's registry are typed: arguments,
//! results (each item, for streams) and property values are validated
//! locally.

use crate::dynamic::{conform, Value};
use crate::rpc::client::{CallResult, Connection};
use crate::rpc::error::{RpcError, RpcResult};
use crate::rpc::OBSERVABLE_INTERFACE;
use crate::typing::{MemberRole, TypeClass, TypeInstance};
use std::collections::BTreeMap;

/// A remote instance and the instances below it.
#[derive(Debug, Clone)]
pub struct RemoteInstance {
    path: String,
    description: String,
    interfaces: BTreeMap<String, RemoteInterface>,
    children: BTreeMap<String, RemoteInstance>,
}

impl RemoteInstance {
    pub(crate) fn new(path: &str, description: &str) -> Self {
        Self {
            path: path.to_string(),
            description: description.to_string(),
            interfaces: BTreeMap::new(),
            children: BTreeMap::new(),
        }
    }

    pub(crate) fn set_description(&mut self, description: &str) {
        self.description = description.to_string();
    }

    pub(crate) fn add_interface(&mut self, interface: RemoteInterface) {
        self.interfaces.insert(interface.name.clone(), interface);
    }

    /// Place `instance` below this node by path, creating empty
    /// intermediate nodes as needed.
    pub(crate) fn insert(&mut self, instance: RemoteInstance) {
        let segments: Vec<String> = instance
            .path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let Some((last, parents)) = segments.split_last() else {
            self.description = instance.description;
            self.interfaces = instance.interfaces;
            return;
        };

        let mut node = self;
        let mut prefix = String::new();
        for segment in parents {
            prefix.push('/');
            prefix.push_str(segment);
            node = node
                .children
                .entry(segment.clone())
                .or_insert_with(|| RemoteInstance::new(&prefix, ""));
        }

        match node.children.get_mut(last) {
            Some(existing) => {
                existing.description = instance.description;
                existing.interfaces = instance.interfaces;
            }
            None => {
                node.children.insert(last.clone(), instance);
            }
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn interface(&self, name: &str) -> Option<&RemoteInterface> {
        self.interfaces.get(name)
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &RemoteInterface> + '_ {
        self.interfaces.values()
    }

    /// Direct children, by last path segment.
    pub fn children(&self) -> impl Iterator<Item = &RemoteInstance> + '_ {
        self.children.values()
    }

    /// Descendant at an absolute path (`/` is this node).
    pub fn find(&self, path: &str) -> Option<&RemoteInstance> {
        let mut node = self;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            node = node.children.get(segment)?;
        }
        Some(node)
    }

    /// This node and every descendant, depth first.
    pub fn walk(&self) -> Vec<&RemoteInstance> {
        let mut nodes = vec![self];
        for child in self.children.values() {
            nodes.extend(child.walk());
        }
        nodes
    }
}

/// A remote interface bound to one instance path.
#[derive(Debug, Clone)]
pub struct RemoteInterface {
    path: String,
    name: String,
    description: Option<String>,
    methods: BTreeMap<String, RemoteMethod>,
    properties: BTreeMap<String, RemoteProperty>,
}

impl RemoteInterface {
    pub(crate) fn build(
        connection: &Connection,
        path: &str,
        name: &str,
        methods: Vec<String>,
        properties: Vec<(String, bool)>,
    ) -> Self {
        let declared = connection
            .typing()
            .instantiate(name)
            .ok()
            .filter(|inst| inst.class() == TypeClass::Interface);

        let methods = methods
            .into_iter()
            .map(|method| {
                let signature = declared.as_ref().and_then(|inst| signature(inst, &method));
                let remote = RemoteMethod {
                    connection: connection.clone(),
                    path: path.to_string(),
                    interface: name.to_string(),
                    name: method.clone(),
                    signature,
                };
                (method, remote)
            })
            .collect();

        let properties = properties
            .into_iter()
            .map(|(property, read_only)| {
                let ty = declared.as_ref().and_then(|inst| property_type(inst, &property));
                let remote = RemoteProperty {
                    connection: connection.clone(),
                    path: path.to_string(),
                    interface: name.to_string(),
                    name: property.clone(),
                    read_only,
                    ty,
                };
                (property, remote)
            })
            .collect();

        Self {
            path: path.to_string(),
            name: name.to_string(),
            description: declared.and_then(|inst| inst.decl().description().map(str::to_string)),
            methods,
            properties,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Description from the registry, when the interface is declared.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn method(&self, name: &str) -> Option<&RemoteMethod> {
        self.methods.get(name)
    }

    pub fn methods(&self) -> impl Iterator<Item = &RemoteMethod> + '_ {
        self.methods.values()
    }

    pub fn property(&self, name: &str) -> Option<&RemoteProperty> {
        self.properties.get(name)
    }

    pub fn properties(&self) -> impl Iterator<Item = &RemoteProperty> + '_ {
        self.properties.values()
    }

    /// Call a method by name.
    pub async fn call(&self, method: &str, args: Vec<Value>) -> RpcResult<CallResult> {
        let remote = self
            .method(method)
            .ok_or_else(|| RpcError::MethodNotFound(format!("{}.{} at {}", self.name, method, self.path)))?;
        remote.call(args).await
    }
}

#[derive(Debug, Clone)]
struct Signature {
    args: Vec<(String, TypeInstance)>,
    result: Option<TypeInstance>,
}

/// Callable handle to one remote method.
#[derive(Debug, Clone)]
pub struct RemoteMethod {
    connection: Connection,
    path: String,
    interface: String,
    name: String,
    signature: Option<Signature>,
}

impl RemoteMethod {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when calls are validated against a declared signature.
    pub fn is_typed(&self) -> bool {
        self.signature.is_some()
    }

    /// Declared argument names and types.
    pub fn arguments(&self) -> Vec<(&str, &TypeInstance)> {
        self.signature
            .iter()
            .flat_map(|sig| sig.args.iter().map(|(name, ty)| (name.as_str(), ty)))
            .collect()
    }

    /// Validate `args` against the signature, then call.
    pub async fn call(&self, args: Vec<Value>) -> RpcResult<CallResult> {
        let args = match &self.signature {
            Some(signature) => self.check_arguments(signature, args)?,
            None => args,
        };

        let result = self
            .connection
            .call(&self.path, &self.interface, &self.name, args)
            .await?;
        match (result, self.signature.as_ref().and_then(|s| s.result.as_ref())) {
            (CallResult::Single(value), Some(expected)) => Ok(CallResult::Single(conform(expected, value)?)),
            (CallResult::Stream(stream), Some(expected)) => {
                Ok(CallResult::Stream(stream.with_item_type(expected.clone())))
            }
            (result, _) => Ok(result),
        }
    }

    fn check_arguments(&self, signature: &Signature, args: Vec<Value>) -> RpcResult<Vec<Value>> {
        if args.len() != signature.args.len() {
            return Err(RpcError::InvalidArguments(format!(
                "{} takes {} arguments, got {}",
                self.name,
                signature.args.len(),
                args.len()
            )));
        }
        args.into_iter()
            .zip(&signature.args)
            .map(|(value, (name, expected))| {
                conform(expected, value)
                    .map_err(|e| RpcError::InvalidArguments(format!("argument '{name}' of {}: {e}", self.name)))
            })
            .collect()
    }
}

/// Handle to one remote property, accessed through the Observable
/// interface.
#[derive(Debug, Clone)]
pub struct RemoteProperty {
    connection: Connection,
    path: String,
    interface: String,
    name: String,
    read_only: bool,
    ty: Option<TypeInstance>,
}

impl RemoteProperty {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Declared type, when the interface is in the registry.
    pub fn type_instance(&self) -> Option<&TypeInstance> {
        self.ty.as_ref()
    }

    pub async fn get(&self) -> RpcResult<Value> {
        let args = vec![Value::from(self.interface.as_str()), Value::from(self.name.as_str())];
        let value = self
            .connection
            .call(&self.path, OBSERVABLE_INTERFACE, "get", args)
            .await?
            .single()?;
        match &self.ty {
            Some(expected) => Ok(conform(expected, value)?),
            None => Ok(value),
        }
    }

    pub async fn set(&self, value: impl Into<Value>) -> RpcResult<()> {
        let value = match &self.ty {
            Some(expected) => conform(expected, value.into())?,
            None => value.into(),
        };
        let args = vec![
            Value::from(self.interface.as_str()),
            Value::from(self.name.as_str()),
            value,
        ];
        self.connection
            .call(&self.path, OBSERVABLE_INTERFACE, "set", args)
            .await?
            .single()?;
        Ok(())
    }
}

fn signature(interface: &TypeInstance, method: &str) -> Option<Signature> {
    let (member, owner) = interface.lookup_member(method).ok()??;
    let MemberRole::Method(declared) = member.role() else {
        return None;
    };

    let mut args = Vec::with_capacity(declared.args.len());
    for arg in &declared.args {
        args.push((arg.name.clone(), owner.resolve(&arg.ty).ok()?));
    }
    let result = match &declared.result {
        Some(expr) => Some(owner.resolve(expr).ok()?),
        None => None,
    };
    Some(Signature { args, result })
}

fn property_type(interface: &TypeInstance, property: &str) -> Option<TypeInstance> {
    let (member, owner) = interface.lookup_member(property).ok()??;
    match member.role() {
        MemberRole::Property { .. } => owner.member_type(&member).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(paths: &[&str]) -> RemoteInstance {
        let mut root = RemoteInstance::new("/", "root");
        for path in paths {
            root.insert(RemoteInstance::new(path, path));
        }
        root
    }

    #[test]
    fn insert_builds_intermediate_nodes() {
        let root = tree(&["/a/b/c", "/a", "/x"]);

        let a = root.find("/a").expect("a");
        assert_eq!(a.description(), "/a");
        let b = root.find("/a/b").expect("b");
        assert_eq!(b.path(), "/a/b");
        assert_eq!(b.description(), "");
        assert_eq!(root.find("/a/b/c").expect("c").description(), "/a/b/c");
        assert!(root.find("/a/c").is_none());
        assert_eq!(root.find("/").expect("root").description(), "root");

        let paths: Vec<&str> = root.walk().into_iter().map(RemoteInstance::path).collect();
        assert_eq!(paths, ["/", "/a", "/a/b", "/a/b/c", "/x"]);
    }

    #[test]
    fn reinserting_keeps_children() {
        let mut root = tree(&["/a/b"]);
        root.insert(RemoteInstance::new("/a", "parent"));
        let a = root.find("/a").expect("a");
        assert_eq!(a.description(), "parent");
        assert_eq!(a.children().count(), 1);
    }
}
