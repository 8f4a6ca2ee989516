//! Completed run output.

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

use crate::core::response::Values;

/// Prompt/completion token counters reported by the model transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64) -> Self {
        Self { input, output }
    }

    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input += rhs.input;
        self.output += rhs.output;
    }
}

/// Values from the `done` call plus accounting for the whole run.
///
/// `tokens` includes every model round-trip, retries and nested sub-agent
/// runs included. `iterations` counts only the top-level run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BotResults {
    pub values: Values,
    pub tokens: TokenUsage,
    pub iterations: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_accumulates() {
        let mut usage = TokenUsage::default();
        usage += TokenUsage::new(10, 2);
        usage += TokenUsage::new(5, 1);
        assert_eq!(usage, TokenUsage::new(15, 3));
        assert_eq!(usage.total(), 18);
    }
}
