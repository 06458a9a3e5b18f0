use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::word::Word;

/// Conventional EVM stack depth, offered to hosts that want a bound.
pub const EVM_STACK_LIMIT: usize = 1024;

/// Operand stack of [`Word`]s. The top is the most recently pushed value.
///
/// Unbounded unless a depth limit is set.
#[derive(Clone, Debug, Default)]
pub struct Stack {
    items: Vec<Word>,
    limit: Option<usize>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    pub(super) fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    pub fn push(&mut self, word: Word) -> Result<(), VMError> {
        if let Some(limit) = self.limit
            && self.items.len() >= limit
        {
            return Err(VMError::StackOverflow { limit });
        }
        self.items.push(word);
        Ok(())
    }

    /// Fails with [`VMError::StackUnderflow`] unless `n` operands are present.
    pub fn require(&self, n: usize) -> Result<(), VMError> {
        if self.items.len() < n {
            return Err(VMError::StackUnderflow {
                required: n,
                available: self.items.len(),
            });
        }
        Ok(())
    }

    /// Removes the two topmost words and returns them as `(top, second)`.
    ///
    /// On underflow nothing is removed.
    pub fn pop_two(&mut self) -> Result<(Word, Word), VMError> {
        self.require(2)?;
        let base = self.items.len() - 2;
        let top = self.items[base + 1];
        let second = self.items[base];
        self.items.truncate(base);
        Ok((top, second))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Bottom-to-top view of the stack.
    pub fn as_slice(&self) -> &[Word] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<Word> {
        self.items
    }
}
