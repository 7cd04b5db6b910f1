//! Monotonic expression id allocation.
//!
//! Every node the parser builds — including nodes synthesized by macro
//! expansion — gets a unique id from a single counter per parse, so macro
//! hygiene (fresh ids never collide with input ids) holds by construction.

#[derive(Debug, Default)]
pub struct IdGen {
    next: u64,
}

impl IdGen {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}
