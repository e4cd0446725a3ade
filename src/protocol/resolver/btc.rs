use super::{super::error::JSONError, super::Metadata, is_supported_mime};

/// Only the first inscription of a reveal transaction is considered.
pub fn is_primary_inscription(inscription_id: &str) -> bool {
  inscription_id.ends_with("i0")
}

/// Decodes metadata from an ordinal inscription body.
pub fn resolve_content(content_type: Option<&str>, content: &[u8]) -> Result<Metadata, JSONError> {
  let content_type = content_type.unwrap_or_default();
  if !is_supported_mime(content_type) {
    return Err(JSONError::UnSupportContentType(content_type.to_string()));
  }
  let text = std::str::from_utf8(content).map_err(|_| JSONError::InvalidJson)?;
  Metadata::from_json(text)
}

/// Follows a sat through a transaction, first in first out.
///
/// `input_values` are the values of all inputs in order, `input` is the
/// input carrying the sat at `offset` within it. Returns the index of the
/// output the sat lands in, or `None` when it goes to fees.
pub fn locate_sat(
  input_values: &[u64],
  input: usize,
  offset: u64,
  output_values: &[u64],
) -> Option<usize> {
  let mut position = input_values.iter().take(input).sum::<u64>() + offset;
  for (index, value) in output_values.iter().enumerate() {
    if position < *value {
      return Some(index);
    }
    position -= value;
  }
  None
}
