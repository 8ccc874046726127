//! Shared UI icons used by the CLI and the sign-off prompt.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[!]");

// Pipeline indicators
pub static PHASE: Emoji<'_, '_> = Emoji("🔄 ", "[>]");
pub static REVIEW: Emoji<'_, '_> = Emoji("🔍 ", "[R]");
pub static BLOCKER: Emoji<'_, '_> = Emoji("🚧 ", "[BLOCK]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");
