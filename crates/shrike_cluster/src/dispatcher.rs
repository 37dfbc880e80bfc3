//! Region-routed dispatch over a set of shard stores.
//!
//! The dispatcher owns a left-to-right partition of the universe into
//! `(region, store)` pairs. A read is sharded across every intersecting
//! store and the responses are unsharded back into one; a write is
//! routed to the single store owning its key. Write timestamps are
//! minted from one monotone counter, which keeps them monotone per
//! region.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use shrike_common::error::RoutingError;
use shrike_common::query::{ReadQuery, ReadResponse, WriteQuery, WriteResponse};
use shrike_common::region::Region;
use shrike_common::{Cas, Interruptor, RegionMap, ShrikeError, ShrikeResult, StateTimestamp};
use shrike_store::{Store, StoreView};

pub struct ShardedDispatcher {
    shards: Vec<(Region, Arc<Store>)>,
    clock: AtomicU64,
}

impl ShardedDispatcher {
    /// Build from `(region, store)` pairs; the regions must partition the
    /// universe.
    pub fn new(shards: Vec<(Region, Arc<Store>)>) -> ShrikeResult<ShardedDispatcher> {
        let layout: Vec<(Region, ())> = shards.iter().map(|(r, _)| (r.clone(), ())).collect();
        let layout = RegionMap::from_entries(layout)?;
        if layout.domain() != Region::universe() {
            return Err(ShrikeError::Routing(RoutingError::InvariantViolated(
                format!("shard layout covers {}, not the universe", layout.domain()),
            )));
        }
        let mut shards = shards;
        shards.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(ShardedDispatcher {
            shards,
            clock: AtomicU64::new(1),
        })
    }

    fn next_timestamp(&self) -> StateTimestamp {
        StateTimestamp(self.clock.fetch_add(1, Ordering::SeqCst))
    }

    /// Route a read: shard over every intersecting store, left to right,
    /// then unshard the responses.
    pub fn read(
        &self,
        query: &ReadQuery,
        effective_time: u32,
        interruptor: &Interruptor,
    ) -> ShrikeResult<ReadResponse> {
        let footprint = query.get_region();
        let mut responses = Vec::new();
        for (region, store) in &self.shards {
            let piece = region.intersection(&footprint);
            if piece.is_empty() {
                continue;
            }
            let sub_query = query.shard(&piece)?;
            let expected = store.get_metainfo(store.new_read_token(), interruptor)?;
            let response = store.read(
                &expected,
                &sub_query,
                effective_time,
                store.new_read_token(),
                interruptor,
            )?;
            responses.push(response);
        }
        Ok(query.unshard(responses)?)
    }

    /// Route a write to the store owning its key.
    pub fn write(
        &self,
        query: &WriteQuery,
        effective_time: u32,
        interruptor: &Interruptor,
    ) -> ShrikeResult<WriteResponse> {
        let footprint = query.get_region();
        let (region, store) = self
            .shards
            .iter()
            .find(|(region, _)| region.contains_key(query.key()))
            .ok_or_else(|| {
                ShrikeError::Routing(RoutingError::RegionMismatch {
                    context: format!("no shard owns key {}", query.key()),
                })
            })?;
        debug_assert!(region.is_superset(&footprint));
        let sub_query = query.shard(&footprint)?;
        let expected = store.get_metainfo(store.new_read_token(), interruptor)?;
        // Mint the cas alongside the timestamp so replicas replaying
        // this write stamp the same value. Deletes never mint.
        let timestamp = self.next_timestamp();
        let proposed_cas = match &sub_query {
            WriteQuery::Delete { .. } => Cas::INVALID,
            _ => Cas(timestamp.0),
        };
        let response = store.write(
            &expected,
            &expected,
            &sub_query,
            timestamp,
            proposed_cas,
            effective_time,
            store.new_write_token(),
            interruptor,
        )?;
        query.unshard(vec![response]).map_err(ShrikeError::from)
    }

    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    pub fn shard_regions(&self) -> impl Iterator<Item = &Region> {
        self.shards.iter().map(|(region, _)| region)
    }
}
