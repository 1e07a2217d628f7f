//! Resolution of named sets and scanning of their element snapshots.
//!
//! Nothing is cached: every lookup resolves the set and fetches a fresh
//! snapshot, so answers reflect the kernel state at call time. Sets hold one
//! element per device, a linear scan is cheap at that scale.

use crate::error::Error;
use crate::ops::{NfTablesOps, SetElement};
use crate::table::{SetRef, TableRef};
use crate::verdict::VerdictKind;

pub(crate) fn resolve_set<T: NfTablesOps + ?Sized>(ops: &mut T, table: &TableRef, name: &str) -> Result<SetRef, Error> {
    let set = ops.get_set(table, name)?.ok_or_else(|| Error::SetNotFound {
        table: table.clone(),
        set: name.to_string(),
    })?;
    tracing::debug!(%set, "resolved set");
    Ok(set)
}

pub(crate) fn fetch_elements<T: NfTablesOps + ?Sized>(ops: &mut T, set: &SetRef) -> Result<Vec<SetElement>, Error> {
    let elements = ops.get_set_elements(set)?;
    tracing::debug!(%set, count = elements.len(), "fetched set elements");
    Ok(elements)
}

/// True if an element has exactly `key` and carries `verdict`.
///
/// Lengths are compared first so a key can never match a longer element
/// that merely starts with it.
pub fn contains_verdict(elements: &[SetElement], key: &[u8], verdict: VerdictKind) -> bool {
    elements
        .iter()
        .filter(|elem| elem.key.len() == key.len())
        .filter(|elem| elem.key == key)
        .any(|elem| elem.verdict == Some(verdict))
}

pub(crate) fn has_element_verdict<T: NfTablesOps + ?Sized>(
    ops: &mut T,
    table: &TableRef,
    set_name: &str,
    key: &[u8],
    verdict: VerdictKind,
) -> Result<bool, Error> {
    let set = resolve_set(ops, table, set_name)?;
    let elements = fetch_elements(ops, &set)?;
    let found = contains_verdict(&elements, key, verdict);
    tracing::debug!(%set, %verdict, found, "scanned set for verdict");
    Ok(found)
}
