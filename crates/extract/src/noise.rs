//! Noise Flagger: attaches `is_noise` to messages via an ordered, first-match
//! rule list — commercial/automated senders, not deleted, only flagged.

use sleuth_core::Message;
use std::path::Path;
use tracing::debug;

/// Built-in default commercial/marketing markers. Overridable via a
/// noise-rules file (`StoreConfig::noise_rules_file`).
pub const DEFAULT_NOISE_PATTERNS: &[&str] = &[
  "txt stop to",
  "reply stop",
  "text stop",
  "unsubscribe",
  "opt out",
  "opt-out",
  "free minutes",
  "msg & data rates",
  "limited time offer",
  "click here to",
  "% off",
  "promo code",
];

/// One rule in the ordered list: matches against the message text, or against
/// the sender-identifying fields (`contact`/`app`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoiseRule {
  TextPattern(String),
  SenderPattern(String),
}

/// An ordered rule list evaluated first-match-wins; falls through to
/// `is_noise = false` if nothing matches.
#[derive(Debug, Clone, Default)]
pub struct NoiseRules {
  rules: Vec<NoiseRule>,
}

impl NoiseRules {
  pub fn new(rules: Vec<NoiseRule>) -> Self {
    Self { rules }
  }

  /// The built-in default rule set: one `TextPattern` rule per entry in
  /// [`DEFAULT_NOISE_PATTERNS`].
  pub fn load_default() -> Self {
    Self { rules: DEFAULT_NOISE_PATTERNS.iter().map(|p| NoiseRule::TextPattern(p.to_string())).collect() }
  }

  /// Load an external rule file: one pattern per line, `sender:` prefix marks
  /// a sender-classification rule, everything else is a text pattern. Blank
  /// lines and lines starting with `#` are ignored.
  pub fn load_from_file(path: impl AsRef<Path>) -> sleuth_core::Result<Self> {
    let content = std::fs::read_to_string(path)?;
    let rules = content
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty() && !line.starts_with('#'))
      .map(|line| match line.strip_prefix("sender:") {
        Some(pattern) => NoiseRule::SenderPattern(pattern.trim().to_lowercase()),
        None => NoiseRule::TextPattern(line.to_lowercase()),
      })
      .collect();
    Ok(Self { rules })
  }

  pub fn rules(&self) -> &[NoiseRule] {
    &self.rules
  }
}

/// Evaluate the rule list against one message, first match wins.
pub fn classify_noise(message: &Message, rules: &NoiseRules) -> bool {
  let lower_text = message.text.to_lowercase();
  let lower_sender = format!(
    "{} {}",
    message.contact.to_lowercase(),
    message.app.as_deref().unwrap_or_default().to_lowercase()
  );

  for rule in rules.rules() {
    let is_match = match rule {
      NoiseRule::TextPattern(pattern) => lower_text.contains(pattern.as_str()),
      NoiseRule::SenderPattern(pattern) => lower_sender.contains(pattern.as_str()),
    };
    if is_match {
      return true;
    }
  }
  false
}

/// Set `is_noise` on a single message in place.
pub fn flag_message(message: &mut Message, rules: &NoiseRules) {
  message.is_noise = classify_noise(message, rules);
}

/// Set `is_noise` on every message in a batch in place.
pub fn flag_messages(messages: &mut [Message], rules: &NoiseRules) {
  let flagged = messages.iter().filter(|m| classify_noise(m, rules)).count();
  debug!(flagged, total = messages.len(), "noise flagging complete");
  for message in messages {
    flag_message(message, rules);
  }
}
