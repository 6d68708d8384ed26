//! Character-count profiles used by cosine name matching.
//!
//! A profile counts each character of `[a-z0-9]` (case-insensitive, everything
//! else ignored) and is L2-normalised, so the dot product of two profiles is
//! their cosine similarity. The zero profile (no countable characters) stays
//! zero and scores 0.0 against everything.

/// Alphabet of a profile, in slot order.
pub const CHAR_VOCAB: &str = "abcdefghijklmnopqrstuvwxyz0123456789";

pub const PROFILE_DIM: usize = 36;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CharProfile([f64; PROFILE_DIM]);

impl CharProfile {
    pub const fn zero() -> Self {
        Self([0.0; PROFILE_DIM])
    }

    /// Raw (unnormalised) character counts of `text`.
    pub fn counts(text: &str) -> [u32; PROFILE_DIM] {
        let mut counts = [0u32; PROFILE_DIM];
        for c in text.chars() {
            if let Some(slot) = slot_of(c) {
                counts[slot] += 1;
            }
        }
        counts
    }

    pub fn from_text(text: &str) -> Self {
        let counts = Self::counts(text);
        let mut values = [0.0f64; PROFILE_DIM];
        let mut norm2 = 0.0f64;
        for (v, &n) in values.iter_mut().zip(counts.iter()) {
            *v = f64::from(n);
            norm2 += *v * *v;
        }
        if norm2 <= 0.0 {
            return Self::zero();
        }
        let inv = 1.0 / norm2.sqrt();
        for v in values.iter_mut() {
            *v *= inv;
        }
        Self(values)
    }

    pub fn dot(&self, other: &CharProfile) -> f64 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| a * b)
            .sum()
    }

    /// Value of the slot for character `c` (0.0 for characters outside the vocabulary).
    pub fn get(&self, c: char) -> f64 {
        slot_of(c).map(|slot| self.0[slot]).unwrap_or(0.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }
}

/// Shorthand for [`CharProfile::from_text`].
pub fn char_profile(text: &str) -> CharProfile {
    CharProfile::from_text(text)
}

fn slot_of(c: char) -> Option<usize> {
    let lc = c.to_ascii_lowercase();
    match lc {
        'a'..='z' => Some(lc as usize - 'a' as usize),
        '0'..='9' => Some(26 + (lc as usize - '0' as usize)),
        _ => None,
    }
}
