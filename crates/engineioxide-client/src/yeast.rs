//! Cache-busting ids: the current timestamp in milliseconds encoded in base 64,
//! with a `.<seed>` suffix when the same millisecond is encoded twice.
use std::{
    sync::{Mutex, PoisonError},
    time::{SystemTime, UNIX_EPOCH},
};

const ALPHABET: &[u8; 64] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz-_";

/// Encode a number with the url-safe alphabet, most significant digit first.
pub(crate) fn encode(mut num: u64) -> String {
    let mut buf = Vec::with_capacity(11);
    loop {
        buf.push(ALPHABET[(num % 64) as usize]);
        num /= 64;
        if num == 0 {
            break;
        }
    }
    buf.reverse();
    // The alphabet is ascii
    buf.into_iter().map(char::from).collect()
}

/// Generates unique ids for the lifetime of a socket
#[derive(Debug, Default)]
pub(crate) struct Yeast {
    /// The last encoded timestamp and the collision counter
    state: Mutex<(String, u64)>,
}

impl Yeast {
    /// Generate an id from the current time
    pub fn next(&self) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        self.next_at(now)
    }

    fn next_at(&self, millis: u64) -> String {
        let id = encode(millis);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let (prev, seed) = &mut *state;
        if *prev == id {
            let suffix = encode(*seed);
            *seed += 1;
            format!("{id}.{suffix}")
        } else {
            *seed = 0;
            prev.clone_from(&id);
            id
        }
    }
}
