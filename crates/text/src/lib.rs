//! Text processing shared by the session archive and interaction logger:
//! sanitization before storage, style metrics for logging, and a thin
//! emotion classifier collaborator.

pub mod emotion;
pub mod sanitize;
pub mod style;

pub use emotion::EmotionClassifier;
pub use sanitize::TextSanitizer;
pub use style::{calculate_style_metrics, StyleMetrics};
