use super::{
  super::{error::JSONError, params::MAX_INPUT_LENGTH, Metadata, DATA_PREFIX_HEX},
  is_supported_mime,
};

/// Cheap check run before any decoding.
pub fn has_data_prefix(input: &str) -> bool {
  input
    .get(..DATA_PREFIX_HEX.len())
    .map_or(false, |prefix| prefix.eq_ignore_ascii_case(DATA_PREFIX_HEX))
}

/// Decodes inscription metadata from a hex transaction input of the form
/// `data:<mime>,<json>`.
pub fn resolve_input(input: &str) -> Result<Metadata, JSONError> {
  let hex_str = input.strip_prefix("0x").ok_or(JSONError::InvalidPrefix)?;
  let bytes = hex::decode(hex_str).map_err(|_| JSONError::InvalidHex)?;
  let text = String::from_utf8(bytes).map_err(|_| JSONError::InvalidHex)?;

  let len = text.chars().count();
  if len > MAX_INPUT_LENGTH {
    return Err(JSONError::InputTooLong(len));
  }

  let body = text.strip_prefix("data:").ok_or(JSONError::InvalidPrefix)?;
  let (mime, json) = body.split_once(',').ok_or(JSONError::InvalidPrefix)?;
  if !is_supported_mime(mime) {
    return Err(JSONError::UnSupportContentType(mime.to_string()));
  }

  Metadata::from_json(json)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::protocol::{Mint, Operation};

  fn encode(s: &str) -> String {
    format!("0x{}", hex::encode(s))
  }

  #[test]
  fn test_resolve_plain_prefix() {
    let metadata = resolve_input(&encode(
      r#"data:,{"p":"asc-20","op":"mint","tick":"TEST","amt":"100"}"#,
    ))
    .unwrap();
    assert_eq!(metadata.tick, "test");
    assert_eq!(
      metadata.op,
      Operation::Mint(Mint {
        amount: "100".to_string()
      })
    );
  }

  #[test]
  fn test_resolve_mime_prefix() {
    for mime in ["text/plain", "application/json", "Application/JSON"] {
      assert!(resolve_input(&encode(&format!(
        r#"data:{mime},{{"p":"asc-20","op":"mint","tick":"test","amt":"1"}}"#
      )))
      .is_ok());
    }
    assert_eq!(
      resolve_input(&encode(
        r#"data:image/png,{"p":"asc-20","op":"mint","tick":"test","amt":"1"}"#
      ))
      .unwrap_err(),
      JSONError::UnSupportContentType("image/png".to_string())
    );
  }

  #[test]
  fn test_input_length_limit() {
    let head = r#"data:,{"p":"asc-20","op":"mint","tick":"test","amt":"1","x":""#;
    let tail = r#""}"#;
    let fill = 256 - head.len() - tail.len();

    let exact = format!("{head}{}{tail}", "a".repeat(fill));
    assert_eq!(exact.len(), 256);
    assert!(resolve_input(&encode(&exact)).is_ok());

    let over = format!("{head}{}{tail}", "a".repeat(fill + 1));
    assert_eq!(
      resolve_input(&encode(&over)).unwrap_err(),
      JSONError::InputTooLong(257)
    );
  }

  #[test]
  fn test_invalid_inputs() {
    assert_eq!(
      resolve_input("646174613a2c7b7d").unwrap_err(),
      JSONError::InvalidPrefix
    );
    assert_eq!(resolve_input("0xzz").unwrap_err(), JSONError::InvalidHex);
    assert_eq!(
      resolve_input(&encode("data:{}")).unwrap_err(),
      JSONError::InvalidPrefix
    );
    assert_eq!(
      resolve_input(&encode("hello,{}")).unwrap_err(),
      JSONError::InvalidPrefix
    );
    assert_eq!(
      resolve_input(&encode("data:,{")).unwrap_err(),
      JSONError::InvalidJson
    );
  }

  #[test]
  fn test_has_data_prefix() {
    assert!(has_data_prefix(&encode("data:,{}")));
    assert!(has_data_prefix("0x646174613A2c"));
    assert!(!has_data_prefix("0xa9059cbb"));
    assert!(!has_data_prefix("0x"));
  }
}
