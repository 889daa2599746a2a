//! Operational transformation of concurrent JSON Patch streams.
//!
//! Two clients editing the same array concurrently produce operations
//! whose indices assume the common ancestor. Transforming one stream
//! against the other rewrites those indices so either application
//! order converges. Move, copy, and test operations pass through
//! untransformed; same-path replace conflicts are reported by
//! returning the pair unchanged.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::pointer::{self, PathError};

/// Path-arithmetic failure while transforming; aborts the whole batch.
#[derive(Debug, Error, PartialEq)]
#[error("{0}")]
pub struct TransformError(pub String);

impl From<PathError> for TransformError {
    fn from(error: PathError) -> Self {
        TransformError(error.to_string())
    }
}

/// RFC 6902 operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Add,
    Remove,
    Replace,
    Move,
    Copy,
    Test,
}

/// A single edit operation in its on-wire shape. Keys beyond the RFC
/// 6902 set are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditOp {
    pub op: OpKind,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl EditOp {
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: OpKind::Add,
            path: path.into(),
            value: Some(value),
            from: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: OpKind::Remove,
            path: path.into(),
            value: None,
            from: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: OpKind::Replace,
            path: path.into(),
            value: Some(value),
            from: None,
            extra: serde_json::Map::new(),
        }
    }

    fn with_path(&self, path: String) -> Self {
        Self {
            path,
            ..self.clone()
        }
    }
}

/// Transform a concurrent pair so either side converges after applying
/// the peer's transformed operation.
pub fn transform_pair(
    local: &EditOp,
    remote: &EditOp,
) -> Result<(EditOp, EditOp), TransformError> {
    match (local.op, remote.op) {
        (OpKind::Add, OpKind::Add) => transform_add_add(local, remote),
        (OpKind::Remove, OpKind::Remove) => transform_remove_remove(local, remote),
        (OpKind::Add, OpKind::Remove) => transform_add_remove(local, remote),
        (OpKind::Remove, OpKind::Add) => {
            let (add, remove) = transform_add_remove(remote, local)?;
            Ok((remove, add))
        }
        _ => Ok((local.clone(), remote.clone())),
    }
}

/// Transform every local op against all remote ops in order, and vice
/// versa. Any path-arithmetic error short-circuits.
pub fn transform_lists(
    local_ops: &[EditOp],
    remote_ops: &[EditOp],
) -> Result<(Vec<EditOp>, Vec<EditOp>), TransformError> {
    let mut transformed_local = Vec::with_capacity(local_ops.len());
    for local in local_ops {
        let mut current = local.clone();
        for remote in remote_ops {
            let (next, _) = transform_pair(&current, remote)?;
            current = next;
        }
        transformed_local.push(current);
    }

    let mut transformed_remote = Vec::with_capacity(remote_ops.len());
    for remote in remote_ops {
        let mut current = remote.clone();
        for local in local_ops {
            let (_, next) = transform_pair(local, &current)?;
            current = next;
        }
        transformed_remote.push(current);
    }

    Ok((transformed_local, transformed_remote))
}

/// Both paths carry an array index and address the same parent.
fn array_siblings(a: &EditOp, b: &EditOp) -> Result<Option<(usize, usize)>, TransformError> {
    let index_a = pointer::extract_last_array_index(&a.path)?;
    let index_b = pointer::extract_last_array_index(&b.path)?;
    match (index_a, index_b) {
        (Some(index_a), Some(index_b)) => {
            let parent_a = pointer::parent(&a.path);
            let parent_b = pointer::parent(&b.path);
            if parent_a.is_some() && parent_a == parent_b {
                Ok(Some((index_a, index_b)))
            } else {
                Ok(None)
            }
        }
        _ => Ok(None),
    }
}

fn transform_add_add(
    local: &EditOp,
    remote: &EditOp,
) -> Result<(EditOp, EditOp), TransformError> {
    let Some((local_index, remote_index)) = array_siblings(local, remote)? else {
        return Ok((local.clone(), remote.clone()));
    };

    if local_index <= remote_index {
        // Local wins ordering; the remote insert lands one slot later.
        let shifted = pointer::adjust_array_index(&remote.path, remote_index, 1)?;
        Ok((local.clone(), remote.with_path(shifted)))
    } else {
        let shifted = pointer::adjust_array_index(&local.path, local_index, 1)?;
        Ok((local.with_path(shifted), remote.clone()))
    }
}

fn transform_remove_remove(
    local: &EditOp,
    remote: &EditOp,
) -> Result<(EditOp, EditOp), TransformError> {
    let Some((local_index, remote_index)) = array_siblings(local, remote)? else {
        return Ok((local.clone(), remote.clone()));
    };

    if local_index < remote_index {
        let shifted = pointer::adjust_array_index(&remote.path, remote_index, -1)?;
        Ok((local.clone(), remote.with_path(shifted)))
    } else if local_index > remote_index {
        let shifted = pointer::adjust_array_index(&local.path, local_index, -1)?;
        Ok((local.with_path(shifted), remote.clone()))
    } else {
        // Same element removed on both sides; surfaced unchanged so the
        // caller can treat it as a conflict.
        Ok((local.clone(), remote.clone()))
    }
}

fn transform_add_remove(add: &EditOp, remove: &EditOp) -> Result<(EditOp, EditOp), TransformError> {
    let Some((add_index, remove_index)) = array_siblings(add, remove)? else {
        return Ok((add.clone(), remove.clone()));
    };

    if add_index <= remove_index {
        let shifted = pointer::adjust_array_index(&remove.path, remove_index, 1)?;
        Ok((add.clone(), remove.with_path(shifted)))
    } else {
        let shifted = pointer::adjust_array_index(&add.path, add_index, -1)?;
        Ok((add.with_path(shifted), remove.clone()))
    }
}
