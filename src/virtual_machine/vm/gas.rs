use crate::virtual_machine::errors::VMError;

/// Gas budget used when the host does not supply one.
pub const DEFAULT_GAS_LIMIT: u64 = 1_000;

/// Number of gas categories tracked by [`GasProfile`].
const GAS_CATEGORY_COUNT: usize = 3;

/// Categories of gas consumption for profiling.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum GasCategory {
    /// ADD, MUL, SUB, DIV.
    Arithmetic = 0,
    /// PUSH1..PUSH32.
    Push = 1,
    /// STOP.
    Control = 2,
}

impl GasCategory {
    pub const fn as_str(&self) -> &'static str {
        match self {
            GasCategory::Arithmetic => "Arithmetic",
            GasCategory::Push => "Push",
            GasCategory::Control => "Control",
        }
    }

    /// All categories in discriminant order.
    const ALL: [GasCategory; GAS_CATEGORY_COUNT] = [
        GasCategory::Arithmetic,
        GasCategory::Push,
        GasCategory::Control,
    ];
}

/// Gas consumption broken down by [`GasCategory`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GasProfile {
    counts: [u64; GAS_CATEGORY_COUNT],
}

impl GasProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds gas to the specified category.
    #[inline(always)]
    pub fn add(&mut self, category: GasCategory, amount: u64) {
        let slot = &mut self.counts[category as usize];
        *slot = slot.saturating_add(amount);
    }

    /// Gas charged to a single category.
    pub fn get(&self, category: GasCategory) -> u64 {
        self.counts[category as usize]
    }

    /// Returns the total gas across all categories.
    pub fn total(&self) -> u64 {
        self.counts
            .iter()
            .fold(0u64, |acc, &v| acc.saturating_add(v))
    }

    /// Returns an iterator over all categories and their gas costs.
    pub fn iter(&self) -> impl Iterator<Item = (GasCategory, u64)> {
        GasCategory::ALL.into_iter().zip(self.counts)
    }
}

/// Monotonically decreasing gas counter.
///
/// A failed charge leaves the meter untouched, so the caller can report the
/// exact amount that was left when execution stopped.
#[derive(Clone, Debug)]
pub struct GasMeter {
    limit: u64,
    used: u64,
}

impl GasMeter {
    pub fn new(limit: u64) -> Self {
        Self { limit, used: 0 }
    }

    /// Deducts `amount`, or fails with [`VMError::OutOfGas`] if less is left.
    pub fn consume(&mut self, amount: u64) -> Result<(), VMError> {
        let remaining = self.remaining();
        if remaining < amount {
            return Err(VMError::OutOfGas {
                required: amount,
                remaining,
            });
        }
        self.used += amount;
        Ok(())
    }

    pub fn remaining(&self) -> u64 {
        self.limit - self.used
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_decrements_remaining() {
        let mut meter = GasMeter::new(10);
        meter.consume(3).unwrap();
        meter.consume(5).unwrap();
        assert_eq!(meter.remaining(), 2);
        assert_eq!(meter.used(), 8);
    }

    #[test]
    fn consume_exact_budget() {
        let mut meter = GasMeter::new(3);
        meter.consume(3).unwrap();
        assert_eq!(meter.remaining(), 0);
        meter.consume(0).unwrap();
    }

    #[test]
    fn consume_fails_without_side_effects() {
        let mut meter = GasMeter::new(2);
        assert_eq!(
            meter.consume(3),
            Err(VMError::OutOfGas {
                required: 3,
                remaining: 2
            })
        );
        assert_eq!(meter.remaining(), 2);
        assert_eq!(meter.used(), 0);
    }

    #[test]
    fn profile_accumulates_per_category() {
        let mut profile = GasProfile::new();
        profile.add(GasCategory::Push, 3);
        profile.add(GasCategory::Push, 3);
        profile.add(GasCategory::Arithmetic, 5);
        assert_eq!(profile.get(GasCategory::Push), 6);
        assert_eq!(profile.get(GasCategory::Control), 0);
        assert_eq!(profile.total(), 11);
        assert_eq!(profile.iter().count(), 3);
    }
}
