pub mod noise;
pub mod normalizer;

pub use noise::{DEFAULT_NOISE_PATTERNS, NoiseRule, NoiseRules, classify_noise, flag_message, flag_messages};
pub use normalizer::{NormalizeStats, RawRow, normalize_images, normalize_messages};
