//! Shared UI icons.

use console::Emoji;

pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[WARN]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");
pub static PAUSE: Emoji<'_, '_> = Emoji("⏸️  ", "[PAUSE]");
pub static RUNNING: Emoji<'_, '_> = Emoji("▶️  ", "[>]");
pub static FILE_NEW: Emoji<'_, '_> = Emoji("📄 ", "+");
pub static LOOP: Emoji<'_, '_> = Emoji("🔄 ", "[RETRY]");
