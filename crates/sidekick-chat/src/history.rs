/// Bounded conversation history quoted back into prompts.
///
/// Entries are literal lines such as `"User: hi"`; the oldest entry is
/// evicted once the capacity is exceeded.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<String>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn push_user(&mut self, message: &str) {
        self.push(format!("User: {}", message));
    }

    pub fn push_assistant(&mut self, message: &str) {
        self.push(format!("Assistant: {}", message));
    }

    fn push(&mut self, entry: String) {
        self.entries.push(entry);
        if self.entries.len() > self.capacity {
            let overflow = self.entries.len() - self.capacity;
            self.entries.drain(..overflow);
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
