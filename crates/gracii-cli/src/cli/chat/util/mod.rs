pub mod shared_writer;
pub mod ui;

use std::io::Write;

use tracing::debug;

use super::ChatError;

/// Places `text` on the system clipboard.
pub fn copy_to_clipboard(text: &str) -> Result<(), ChatError> {
    let mut clipboard = arboard::Clipboard::new()?;
    clipboard.set_text(text)?;
    debug!(len = text.len(), "copied reply to the clipboard");
    Ok(())
}

/// Play the terminal bell notification sound
pub fn play_notification_bell(output: &mut impl Write, enabled: bool) -> std::io::Result<()> {
    if !enabled || !should_play_bell(std::env::var("TERM").ok().as_deref()) {
        return Ok(());
    }

    output.write_all(b"\x07")?;
    output.flush()
}

/// Determine if we should play the bell based on terminal type
fn should_play_bell(term: Option<&str>) -> bool {
    // List of terminals known to handle bell character well
    const BELL_COMPATIBLE_TERMS: &[&str] = &[
        "xterm",
        "screen",
        "tmux",
        "rxvt",
        "linux",
        "konsole",
        "gnome",
        "alacritty",
        "iterm2",
        "wezterm",
    ];

    term.is_some_and(|term| BELL_COMPATIBLE_TERMS.iter().any(|compatible| term.starts_with(compatible)))
}
