use relay_protocol::CommandId;
use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out command ids, starting at 1.
///
/// After `u64::MAX` the counter wraps back to 1; 0 is never handed out
/// because it marks unadmitted commands.
#[derive(Debug)]
pub struct CommandIdAllocator {
    next: AtomicU64,
}

impl CommandIdAllocator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first.max(1)),
        }
    }

    pub fn next_id(&self) -> CommandId {
        let id = self
            .next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.checked_add(1).unwrap_or(1))
            })
            .unwrap_or_else(|current| current);
        CommandId::new(id)
    }
}

impl Default for CommandIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
