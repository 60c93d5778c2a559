//! Emoji Ballot Mapping
//!
//! The fixed set of reaction markers that stand for poll option positions.
//! Marker `i` always means option `i` of whichever poll message it shows up
//! on; the marker itself carries no poll identity.
//!
//! ```text
//!   index   0    1    2    3    4    5    6    7    8    9
//!   marker  1️⃣   2️⃣   3️⃣   4️⃣   5️⃣   6️⃣   7️⃣   8️⃣   9️⃣   🔟
//! ```

use thiserror::Error;

/// Number of reserved ballot markers (and so the option limit of a poll)
pub const MARKER_COUNT: usize = 10;

/// The reserved markers, in option order
pub const MARKERS: [&str; MARKER_COUNT] = [
    "1\u{fe0f}\u{20e3}", // 1️⃣
    "2\u{fe0f}\u{20e3}", // 2️⃣
    "3\u{fe0f}\u{20e3}", // 3️⃣
    "4\u{fe0f}\u{20e3}", // 4️⃣
    "5\u{fe0f}\u{20e3}", // 5️⃣
    "6\u{fe0f}\u{20e3}", // 6️⃣
    "7\u{fe0f}\u{20e3}", // 7️⃣
    "8\u{fe0f}\u{20e3}", // 8️⃣
    "9\u{fe0f}\u{20e3}", // 9️⃣
    "\u{1f51f}",         // 🔟
];

/// Emoji presentation selector, which platforms sometimes drop from keycaps
const VARIATION_SELECTOR: char = '\u{fe0f}';

/// Errors from the marker mapping
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BallotError {
    /// No marker exists for this option position
    #[error("No ballot marker for option index {0} (max {max})", max = MARKER_COUNT - 1)]
    OutOfRange(usize),

    /// The symbol is not one of the reserved markers
    #[error("'{0}' is not a ballot marker")]
    UnknownMarker(String),
}

/// Get the marker for an option position
///
/// # Errors
///
/// Returns [`BallotError::OutOfRange`] when `index >= MARKER_COUNT`.
pub fn marker_for(index: usize) -> Result<&'static str, BallotError> {
    MARKERS
        .get(index)
        .copied()
        .ok_or(BallotError::OutOfRange(index))
}

/// Get the option position a marker stands for
///
/// The variation selector is ignored, so `1⃣` and `1️⃣` both map to 0.
///
/// # Errors
///
/// Returns [`BallotError::UnknownMarker`] for any other symbol.
pub fn index_for(marker: &str) -> Result<usize, BallotError> {
    MARKERS
        .iter()
        .position(|m| same_marker(m, marker))
        .ok_or_else(|| BallotError::UnknownMarker(marker.to_string()))
}

/// Whether a symbol is one of the reserved markers
#[must_use]
pub fn is_marker(symbol: &str) -> bool {
    index_for(symbol).is_ok()
}

fn same_marker(reserved: &str, candidate: &str) -> bool {
    fn strip(s: &str) -> impl Iterator<Item = char> + '_ {
        s.chars().filter(|c| *c != VARIATION_SELECTOR)
    }
    strip(reserved).eq(strip(candidate))
}
