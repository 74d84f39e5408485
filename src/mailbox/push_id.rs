//! Chronologically sortable, collision-resistant mailbox ids.
//!
//! 8 characters of millisecond timestamp (most significant first) followed by
//! 12 random characters, all drawn from a 64-symbol alphabet whose ASCII order
//! matches its index order, so lexicographic order equals creation order.

use rand::Rng;
use std::sync::{LazyLock, Mutex, PoisonError};

pub const PUSH_CHARS: &[u8; 64] =
    b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

const TIME_LEN: usize = 8;
const RANDOM_LEN: usize = 12;
pub const PUSH_ID_LEN: usize = TIME_LEN + RANDOM_LEN;

static GLOBAL: LazyLock<PushIdGenerator> = LazyLock::new(PushIdGenerator::new);

/// Next id from the process-wide generator.
pub fn generate_push_id() -> String {
    GLOBAL.next_id()
}

#[derive(Debug, Default)]
struct State {
    last_ms: u64,
    last_random: [u8; RANDOM_LEN],
}

#[derive(Debug, Default)]
pub struct PushIdGenerator {
    state: Mutex<State>,
}

impl PushIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> String {
        let now = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0);
        self.next_id_at(now)
    }

    /// Id for an explicit clock reading. A reading at or before the previous one
    /// reuses the previous timestamp and increments the random suffix.
    pub fn next_id_at(&self, now_ms: u64) -> String {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if now_ms > state.last_ms {
            state.last_ms = now_ms;
            let mut rng = rand::rng();
            for slot in &mut state.last_random {
                *slot = rng.random_range(0..64);
            }
        } else if !increment(&mut state.last_random) {
            // Suffix space exhausted within one millisecond: borrow the next one.
            state.last_ms += 1;
            state.last_random = [0; RANDOM_LEN];
        }

        encode(state.last_ms, &state.last_random)
    }
}

/// Base-64 increment with carry; false on overflow.
fn increment(digits: &mut [u8; RANDOM_LEN]) -> bool {
    for digit in digits.iter_mut().rev() {
        if *digit == 63 {
            *digit = 0;
        } else {
            *digit += 1;
            return true;
        }
    }
    false
}

fn encode(mut ms: u64, random: &[u8; RANDOM_LEN]) -> String {
    let mut time_chars = [0u8; TIME_LEN];
    for slot in time_chars.iter_mut().rev() {
        *slot = PUSH_CHARS[(ms % 64) as usize];
        ms /= 64;
    }

    let mut id = String::with_capacity(PUSH_ID_LEN);
    id.extend(time_chars.iter().map(|&b| char::from(b)));
    id.extend(random.iter().map(|&d| char::from(PUSH_CHARS[usize::from(d)])));
    id
}
