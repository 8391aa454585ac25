// SPDX-FileCopyrightText: The hidbridge authors
// SPDX-License-Identifier: MPL-2.0

//! Bounded FIFO of variable-length packets.
//!
//! Each session owns one queue of captured input reports. Packet boundaries
//! are preserved strictly: a packet is delivered whole or not at all. The
//! queue is bounded by a hard cap with head-drop overflow, so a client that
//! stops draining loses the oldest reports first.

use std::collections::VecDeque;

/// Initial soft capacity, in packets.
pub const SOFT_CAPACITY: usize = 8;

/// Hard cap, in packets. Pushing beyond this evicts the head packet.
pub const HARD_CAPACITY: usize = 64;

/// Bounded queue of byte packets.
///
/// Single-producer/single-consumer use is expected (the reader thread pushes,
/// the dispatcher drains); the owner serializes access externally.
#[derive(Debug)]
pub struct PacketFifo {
    packets: VecDeque<Box<[u8]>>,
    soft_capacity: usize,
}

impl PacketFifo {
    #[must_use]
    pub fn new() -> Self {
        Self {
            packets: VecDeque::with_capacity(SOFT_CAPACITY),
            soft_capacity: SOFT_CAPACITY,
        }
    }

    /// Current packet count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Append a copy of `bytes` at the tail.
    ///
    /// At the hard cap the head packet is evicted first. Returns the number
    /// of bytes queued.
    pub fn push(&mut self, bytes: &[u8]) -> usize {
        if self.packets.len() == HARD_CAPACITY {
            if let Some(dropped) = self.packets.pop_front() {
                log::debug!(
                    "Queue overflow: dropping oldest packet ({len} bytes)",
                    len = dropped.len()
                );
            }
        } else if self.packets.len() == self.soft_capacity && self.soft_capacity < HARD_CAPACITY {
            self.grow();
        }
        self.packets.push_back(bytes.into());
        bytes.len()
    }

    /// Length of the head packet without removing it, or 0 when empty.
    #[must_use]
    pub fn peek_len(&self) -> usize {
        self.packets.front().map_or(0, |packet| packet.len())
    }

    /// Remove the head packet and copy it into `dst`.
    ///
    /// A packet longer than `dst` is truncated silently. Returns the number
    /// of bytes delivered, or 0 when the queue is empty.
    pub fn pop_into(&mut self, dst: &mut [u8]) -> usize {
        let Some(packet) = self.packets.pop_front() else {
            return 0;
        };
        let len = packet.len().min(dst.len());
        dst[..len].copy_from_slice(&packet[..len]);
        len
    }

    /// Total byte count required to drain the queue completely.
    ///
    /// Pure: no packets are removed.
    #[must_use]
    pub fn drained_len(&self) -> usize {
        self.packets.iter().map(|packet| packet.len()).sum()
    }

    /// Consume packets from the head in order, concatenating them into `dst`.
    ///
    /// Stops before the first packet that would not fit entirely; the
    /// remaining packets stay queued in their original order. Returns the
    /// total number of bytes delivered, which may be 0 if even the head
    /// packet does not fit. Callers size `dst` with [`Self::drained_len`].
    pub fn drain_into(&mut self, dst: &mut [u8]) -> usize {
        let mut offset = 0;
        while let Some(packet) = self.packets.front() {
            let len = packet.len();
            if offset + len > dst.len() {
                break;
            }
            dst[offset..offset + len].copy_from_slice(packet);
            offset += len;
            self.packets.pop_front();
        }
        offset
    }

    // Double the soft capacity, bounded by the hard cap. Copy-then-swap;
    // the queue never shrinks.
    fn grow(&mut self) {
        let grown_capacity = (self.soft_capacity * 2).min(HARD_CAPACITY);
        let mut grown = VecDeque::with_capacity(grown_capacity);
        grown.extend(self.packets.drain(..));
        self.packets = grown;
        self.soft_capacity = grown_capacity;
    }
}

impl Default for PacketFifo {
    fn default() -> Self {
        Self::new()
    }
}
