pub mod btc;
pub mod evm;
pub mod exchange;

/// Media types accepted in front of inscription metadata. Parameters such
/// as `;charset=utf-8` are ignored.
pub fn is_supported_mime(mime: &str) -> bool {
  let essence = mime.split(';').next().unwrap_or_default().trim();
  essence.is_empty()
    || essence.eq_ignore_ascii_case("text/plain")
    || essence.eq_ignore_ascii_case("application/json")
}
