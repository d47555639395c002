//! Benchmark utilities.

use omnidm_codec::{Bytes, Record, Timestamp};
use omnidm_core::Entity;
use omnidm_testkit::{scenarios, User};
use rand::Rng;

/// Random users with ids `0..count`.
pub fn random_users(count: usize) -> Vec<User> {
    let mut rng = rand::thread_rng();
    (0..count as i64)
        .map(|id| User::new(id, format!("user{}", rng.gen::<u16>()), rng.gen_range(18..90), rng.gen()))
        .collect()
}

/// A profile record with `tags` tags and a `payload`-byte avatar.
pub fn profile_record(tags: usize, payload: usize) -> Record {
    let mut rng = rand::thread_rng();
    let mut profile = scenarios::profile(rng.gen());
    profile.tags = (0..tags).map(|i| format!("tag{i}")).collect();
    profile.avatar = Some(Bytes::from((0..payload).map(|_| rng.gen::<u8>()).collect::<Vec<_>>()));
    profile.joined = Timestamp::now();
    profile.to_record()
}
