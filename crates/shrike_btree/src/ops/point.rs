//! Single-key engine operations with memcached-style semantics.
//!
//! Expiration is evaluated lazily: a live slot whose exptime has passed
//! the caller's effective time behaves exactly like an absent key.

use bytes::Bytes;

use shrike_common::query::{
    AddPolicy, ArithmeticKind, ArithmeticResult, DeleteResult, ExtendKind, ExtendResult,
    GetResult, ReplacePolicy, SetResult,
};
use shrike_common::{Cas, StateTimestamp, StoreKey};

use crate::transaction::{ReadTransaction, WriteTransaction};
use crate::tree::{LiveSlot, Slot, TreeState};

/// Longest decimal representation accepted by incr/decr.
const MAX_NUMERIC_DIGITS: usize = 20;

fn live_slot<'a>(state: &'a TreeState, key: &StoreKey, effective_time: u32) -> Option<&'a LiveSlot> {
    state
        .slots
        .get(key)
        .and_then(Slot::as_live)
        .filter(|live| !live.is_expired(effective_time))
}

/// Point lookup under shared access.
pub fn get(txn: &ReadTransaction, key: &StoreKey, effective_time: u32) -> GetResult {
    match live_slot(txn.state(), key, effective_time) {
        Some(live) => GetResult::Value {
            value: live.value.clone(),
            flags: live.flags,
            cas: live.cas,
        },
        None => GetResult::Miss,
    }
}

/// Lookup under exclusive access, minting a cas if the slot has none.
pub fn get_cas(
    txn: &mut WriteTransaction<'_>,
    key: &StoreKey,
    proposed_cas: Cas,
    effective_time: u32,
) -> GetResult {
    let state = txn.state_mut();
    let needs_cas = match live_slot(state, key, effective_time) {
        None => return GetResult::Miss,
        Some(live) => !live.cas.is_valid(),
    };
    if needs_cas {
        let minted = if proposed_cas.is_valid() {
            proposed_cas
        } else {
            state.mint_cas()
        };
        if let Some(Slot::Live(live)) = state.slots.get_mut(key) {
            live.cas = minted;
        }
    }
    let Some(Slot::Live(live)) = state.slots.get(key) else {
        unreachable!("live slot vanished under exclusive access");
    };
    GetResult::Value {
        value: live.value.clone(),
        flags: live.flags,
        cas: live.cas,
    }
}

/// Arguments for the set/add/replace/cas operation.
#[derive(Debug, Clone)]
pub struct SetArgs {
    pub key: StoreKey,
    pub data: Bytes,
    pub flags: u32,
    pub exptime: u32,
    pub add_policy: AddPolicy,
    pub replace_policy: ReplacePolicy,
    pub old_cas: Cas,
    /// Cas to stamp on the stored slot; `INVALID` mints a fresh one.
    pub proposed_cas: Cas,
    pub effective_time: u32,
    pub timestamp: StateTimestamp,
}

pub fn set(txn: &mut WriteTransaction<'_>, args: SetArgs) -> SetResult {
    let state = txn.state_mut();
    let existing = live_slot(state, &args.key, args.effective_time);

    if args.old_cas.is_valid() {
        match existing {
            None => return SetResult::NotFound,
            Some(live) if live.cas != args.old_cas => return SetResult::Exists,
            Some(_) => {}
        }
    }
    match existing {
        Some(_) if args.replace_policy == ReplacePolicy::No => return SetResult::NotStored,
        None if args.add_policy == AddPolicy::No => return SetResult::NotStored,
        _ => {}
    }

    let cas = if args.proposed_cas.is_valid() {
        args.proposed_cas
    } else {
        state.mint_cas()
    };
    state.slots.insert(
        args.key,
        Slot::Live(LiveSlot {
            value: args.data,
            flags: args.flags,
            exptime: args.exptime,
            cas,
            recency: args.timestamp,
        }),
    );
    SetResult::Stored
}

pub fn incr_decr(
    txn: &mut WriteTransaction<'_>,
    key: &StoreKey,
    kind: ArithmeticKind,
    amount: u64,
    proposed_cas: Cas,
    effective_time: u32,
    timestamp: StateTimestamp,
) -> ArithmeticResult {
    let state = txn.state_mut();
    let Some(live) = live_slot(state, key, effective_time) else {
        return ArithmeticResult::NotFound;
    };
    let Some(old) = parse_numeric(&live.value) else {
        return ArithmeticResult::NotNumeric;
    };
    let new = match kind {
        ArithmeticKind::Incr => old.wrapping_add(amount),
        ArithmeticKind::Decr => old.saturating_sub(amount),
    };
    let cas = if proposed_cas.is_valid() {
        proposed_cas
    } else {
        state.mint_cas()
    };
    let Some(Slot::Live(live)) = state.slots.get_mut(key) else {
        unreachable!("live slot vanished under exclusive access");
    };
    live.value = Bytes::from(new.to_string());
    live.cas = cas;
    live.recency = timestamp;
    ArithmeticResult::New(new)
}

pub fn append_prepend(
    txn: &mut WriteTransaction<'_>,
    key: &StoreKey,
    data: &Bytes,
    kind: ExtendKind,
    proposed_cas: Cas,
    effective_time: u32,
    timestamp: StateTimestamp,
) -> ExtendResult {
    let state = txn.state_mut();
    if live_slot(state, key, effective_time).is_none() {
        return ExtendResult::NotFound;
    }
    let cas = if proposed_cas.is_valid() {
        proposed_cas
    } else {
        state.mint_cas()
    };
    let Some(Slot::Live(live)) = state.slots.get_mut(key) else {
        unreachable!("live slot vanished under exclusive access");
    };
    let mut combined = Vec::with_capacity(live.value.len() + data.len());
    match kind {
        ExtendKind::Append => {
            combined.extend_from_slice(&live.value);
            combined.extend_from_slice(data);
        }
        ExtendKind::Prepend => {
            combined.extend_from_slice(data);
            combined.extend_from_slice(&live.value);
        }
    }
    live.value = Bytes::from(combined);
    live.cas = cas;
    live.recency = timestamp;
    ExtendResult::Stored
}

/// Replace a live slot with a tombstone carrying `timestamp` as its
/// recency, so backfill can propagate the deletion.
pub fn delete(txn: &mut WriteTransaction<'_>, key: &StoreKey, timestamp: StateTimestamp) -> DeleteResult {
    let state = txn.state_mut();
    match state.slots.get(key).and_then(Slot::as_live) {
        Some(_) => {
            state
                .slots
                .insert(key.clone(), Slot::Tombstone { recency: timestamp });
            DeleteResult::Deleted
        }
        None => DeleteResult::NotFound,
    }
}

fn parse_numeric(value: &[u8]) -> Option<u64> {
    if value.is_empty() || value.len() > MAX_NUMERIC_DIGITS {
        return None;
    }
    let text = std::str::from_utf8(value).ok()?;
    text.parse::<u64>().ok()
}
