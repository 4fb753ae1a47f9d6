//! Collection naming: `<kind_prefix>_<batch_tag>`, validated against
//! `[A-Za-z0-9_-]{1,64}`.

use crate::entities::CollectionKind;

const MAX_NAME_LEN: usize = 64;

fn is_valid_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Validate a collection name against the naming pattern. Case-sensitive; does not
/// normalize.
pub fn validate_collection_name(name: &str) -> crate::Result<()> {
  if name.is_empty() || name.len() > MAX_NAME_LEN {
    return Err(crate::Error::InvalidPredicate(format!(
      "collection name must be 1-{MAX_NAME_LEN} characters, got {}",
      name.len()
    )));
  }
  if !name.chars().all(is_valid_char) {
    return Err(crate::Error::InvalidPredicate(format!(
      "collection name '{name}' contains characters outside [A-Za-z0-9_-]"
    )));
  }
  Ok(())
}

/// Build a collection name from a kind and an optional caller-supplied batch tag.
/// A missing or empty tag yields the bare prefix.
pub fn collection_name(kind: CollectionKind, batch_tag: Option<&str>) -> crate::Result<String> {
  let name = match batch_tag {
    Some(tag) if !tag.is_empty() => format!("{}_{tag}", kind.prefix()),
    _ => kind.prefix().to_string(),
  };
  validate_collection_name(&name)?;
  Ok(name)
}
