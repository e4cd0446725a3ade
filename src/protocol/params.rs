use super::num::Num;
use once_cell::sync::Lazy;

pub const MAX_DECIMAL_WIDTH: u8 = 18;
pub const TICK_BYTE_COUNT: usize = 4;
/// Protocol whose ticks are held to `TICK_BYTE_COUNT` bytes on every chain.
pub const BRC20_PROTOCOL: &str = "brc-20";

/// Longest account-chain payload, in characters, still considered.
pub const MAX_INPUT_LENGTH: usize = 256;

/// Hex of the `data:` URI scheme every account-chain inscription starts with.
pub const DATA_PREFIX_HEX: &str = "0x646174613a";

pub static MAXIMUM_SUPPLY: Lazy<Num> = Lazy::new(|| Num::from(u64::MAX));

