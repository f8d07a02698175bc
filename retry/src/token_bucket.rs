// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::sync::atomic::{AtomicUsize, Ordering};

/// A fixed capacity counter of retry tokens.
///
/// Both [`TokenBucket::try_acquire`] and [`TokenBucket::release`] are
/// compare-and-swap loops: they never block and `0 <= current <= max` holds
/// at every observable point. Amounts are unsigned, so a negative request
/// cannot be expressed.
#[derive(Debug)]
pub struct TokenBucket {
    max_capacity: usize,
    capacity: AtomicUsize,
}

/// Outcome of [`TokenBucket::try_acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireResponse {
    max_capacity: usize,
    capacity_requested: usize,
    capacity_acquired: usize,
    capacity_remaining: usize,
}

impl AcquireResponse {
    /// Capacity of the bucket when full.
    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Amount asked for.
    pub fn capacity_requested(&self) -> usize {
        self.capacity_requested
    }

    /// Amount actually taken, either the full request or zero.
    pub fn capacity_acquired(&self) -> usize {
        self.capacity_acquired
    }

    /// Capacity left after this call.
    pub fn capacity_remaining(&self) -> usize {
        self.capacity_remaining
    }

    /// Whether the bucket could not cover the request.
    pub fn acquisition_failed(&self) -> bool {
        self.capacity_acquired < self.capacity_requested
    }
}

/// Outcome of [`TokenBucket::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseResponse {
    capacity_released: usize,
    current_capacity: usize,
    max_capacity: usize,
}

impl ReleaseResponse {
    /// Amount that was actually put back, overflow beyond the max is dropped.
    pub fn capacity_released(&self) -> usize {
        self.capacity_released
    }

    /// Capacity after this call.
    pub fn current_capacity(&self) -> usize {
        self.current_capacity
    }

    /// Capacity of the bucket when full.
    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(max_capacity: usize) -> Self {
        Self {
            max_capacity,
            capacity: AtomicUsize::new(max_capacity),
        }
    }

    /// Capacity of the bucket when full.
    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Capacity right now.
    pub fn current_capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    /// Take `amount` tokens if available.
    ///
    /// The bucket is left untouched when it holds fewer than `amount` tokens.
    /// A zero amount always succeeds and only reports the current state.
    /// `amount` is unsigned, so a negative request cannot be expressed and an
    /// amount beyond the capacity, up to `usize::MAX`, fails without wrapping.
    pub fn try_acquire(&self, amount: usize) -> AcquireResponse {
        let mut current = self.capacity.load(Ordering::Acquire);
        loop {
            if amount == 0 {
                return self.acquired(0, 0, current);
            }
            let Some(remaining) = current.checked_sub(amount) else {
                return self.acquired(amount, 0, current);
            };

            match self.capacity.compare_exchange_weak(
                current,
                remaining,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return self.acquired(amount, amount, remaining),
                Err(actual) => current = actual,
            }
        }
    }

    /// Put `amount` tokens back, clamping at the max capacity.
    ///
    /// `amount` is unsigned, so a release can never drain the bucket. A zero
    /// amount only reports the current state.
    pub fn release(&self, amount: usize) -> ReleaseResponse {
        let mut current = self.capacity.load(Ordering::Acquire);
        loop {
            if amount == 0 {
                return self.released(0, current);
            }
            let updated = current.saturating_add(amount).min(self.max_capacity);

            match self.capacity.compare_exchange_weak(
                current,
                updated,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return self.released(updated - current, updated),
                Err(actual) => current = actual,
            }
        }
    }

    fn acquired(&self, requested: usize, acquired: usize, remaining: usize) -> AcquireResponse {
        AcquireResponse {
            max_capacity: self.max_capacity,
            capacity_requested: requested,
            capacity_acquired: acquired,
            capacity_remaining: remaining,
        }
    }

    fn released(&self, released: usize, current: usize) -> ReleaseResponse {
        ReleaseResponse {
            capacity_released: released,
            current_capacity: current,
            max_capacity: self.max_capacity,
        }
    }
}
