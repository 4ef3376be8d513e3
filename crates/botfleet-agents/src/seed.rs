//! Identity-derived randomness.
//!
//! Every "stable but varied" choice an agent makes (its follower class, its
//! angle around the leader, its pace) is a pure function of its identity
//! plus, where the value should drift, a coarse tick bucket. The same agent
//! in the same bucket always draws the same numbers within one build.
//! [`StdRng`] is not guaranteed to keep its algorithm across `rand`
//! releases, so draws are not a stable format to persist or compare
//! between versions.

use std::f64::consts::TAU;

use botfleet_types::{AgentId, FollowerClass};
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Golden-ratio multiplier used for hashing and salting.
const GOLDEN: u64 = 0x9E37_79B9_7F4A_7C15;

/// Stream salts, one per kind of draw.
pub mod salt {
    /// Angle around the leader.
    pub const ANGLE: u64 = 1;
    /// Follow distance within the band.
    pub const DISTANCE: u64 = 2;
    /// Pace multiplier.
    pub const PACE: u64 = 3;
    /// Tick stagger offset.
    pub const STAGGER: u64 = 4;
}

/// One in this many agents is a close follower.
pub const CLOSE_FOLLOWER_MODULUS: u64 = 6;

/// Combine a seed with a salt into a well-distributed 64-bit value.
pub const fn mix_seed(seed: u64, salt: u64) -> u64 {
    let mut value = seed ^ salt.wrapping_mul(GOLDEN);
    value ^= value.rotate_left(29);
    value = value.wrapping_mul(0x517C_C1B7_2722_0A95);
    value ^ (value >> 31)
}

/// Stable 64-bit seed for an agent, derived from its identifier bytes.
pub fn identity_seed(id: AgentId) -> u64 {
    let mut hash = 0_u64;
    for byte in id.as_bytes() {
        hash = hash.rotate_left(5) ^ u64::from(*byte);
        hash = hash.wrapping_mul(GOLDEN);
    }
    mix_seed(hash, 0)
}

/// Map a 64-bit value onto `[0, 1)` using its top 53 bits.
#[allow(clippy::cast_precision_loss)]
pub fn unit_f64(value: u64) -> f64 {
    (value >> 11) as f64 / (1_u64 << 53) as f64
}

/// Follower class for an identity seed: close for one in six.
pub const fn follower_class(seed: u64) -> FollowerClass {
    if seed % CLOSE_FOLLOWER_MODULUS == 0 {
        FollowerClass::Close
    } else {
        FollowerClass::Radius
    }
}

/// The agent's fixed bearing around its leader, in radians.
pub fn follow_angle(seed: u64) -> f64 {
    unit_f64(mix_seed(seed, salt::ANGLE)) * TAU
}

/// Per-agent tick offset in `[0, period)` used to spread expensive work.
pub const fn stagger_offset(seed: u64, period: u64) -> u64 {
    if period == 0 {
        return 0;
    }
    mix_seed(seed, salt::STAGGER) % period
}

/// Index of the bucket `tick` falls in, with buckets shifted per agent so
/// that boundaries do not line up across the fleet.
pub const fn bucket_index(seed: u64, tick: u64, bucket_len: u64) -> u64 {
    if bucket_len == 0 {
        return tick;
    }
    tick.saturating_add(stagger_offset(seed, bucket_len)) / bucket_len
}

/// A generator seeded from identity, stream and bucket.
pub fn bucket_rng(seed: u64, stream: u64, bucket: u64) -> StdRng {
    StdRng::seed_from_u64(mix_seed(mix_seed(seed, stream), bucket))
}
