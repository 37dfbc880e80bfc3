//! Query executors: dispatch each query variant to its engine operation.

use shrike_btree::ops;
use shrike_btree::{ReadTransaction, WriteTransaction};
use shrike_common::query::{ReadQuery, ReadResponse, RgetStream, WriteQuery, WriteResponse};
use shrike_common::{Cas, StateTimestamp};

/// Execute a read against a pinned snapshot. The rget response stays
/// lazy; its iterator keeps the snapshot alive after the transaction and
/// the admission ticket are gone.
pub fn execute_read(txn: &ReadTransaction, query: &ReadQuery, effective_time: u32) -> ReadResponse {
    match query {
        ReadQuery::Get { key } => ReadResponse::Get(ops::get(txn, key, effective_time)),
        ReadQuery::Rget { range } => {
            ReadResponse::Rget(RgetStream::new(ops::rget(txn, range, effective_time)))
        }
    }
}

/// Execute a write against the exclusive working state.
///
/// `proposed_cas` comes from the caller when replicas must agree on the
/// minted value; `Cas::INVALID` lets the engine mint locally. Deletes
/// never mint, and assert as much.
pub fn execute_write(
    txn: &mut WriteTransaction<'_>,
    query: &WriteQuery,
    proposed_cas: Cas,
    effective_time: u32,
    timestamp: StateTimestamp,
) -> WriteResponse {
    match query {
        WriteQuery::GetCas { key } => {
            WriteResponse::GetCas(ops::get_cas(txn, key, proposed_cas, effective_time))
        }
        WriteQuery::Sarc {
            key,
            data,
            flags,
            exptime,
            add_policy,
            replace_policy,
            old_cas,
        } => WriteResponse::Sarc(ops::set(
            txn,
            ops::SetArgs {
                key: key.clone(),
                data: data.clone(),
                flags: *flags,
                exptime: *exptime,
                add_policy: *add_policy,
                replace_policy: *replace_policy,
                old_cas: *old_cas,
                proposed_cas,
                effective_time,
                timestamp,
            },
        )),
        WriteQuery::IncrDecr { key, kind, amount } => WriteResponse::IncrDecr(ops::incr_decr(
            txn,
            key,
            *kind,
            *amount,
            proposed_cas,
            effective_time,
            timestamp,
        )),
        WriteQuery::AppendPrepend { key, data, kind } => WriteResponse::AppendPrepend(
            ops::append_prepend(txn, key, data, *kind, proposed_cas, effective_time, timestamp),
        ),
        WriteQuery::Delete {
            key,
            suppress_delete_queue: _,
        } => {
            debug_assert_eq!(
                proposed_cas,
                Cas::INVALID,
                "deletes must not carry a proposed cas"
            );
            WriteResponse::Delete(ops::delete(txn, key, timestamp))
        }
    }
}
