//! Terminal output helpers.

use colored::Colorize;

/// Section header: ">> Title" in cyan.
pub fn section(title: &str) {
    println!("  {} {}", ">>".bright_cyan().bold(), title.bold());
}

pub fn success(msg: &str) {
    println!("  {} {}", "\u{2714}".bright_green(), msg);
}

pub fn error(msg: &str) {
    eprintln!("  {} {}", "\u{2718}".bright_red(), msg.bright_red());
}

/// Key-value display: "  Label:       value".
pub fn kv(label: &str, value: &str) {
    println!("  {:<12} {}", format!("{label}:").dimmed(), value);
}

pub fn hint(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// One received chunk. Session 0 is traffic from an unassociated inbound
/// connection.
pub fn incoming(session: u64, text: &str) {
    let tag = if session == 0 {
        "[raw]".yellow().to_string()
    } else {
        format!("[#{session}]").bright_cyan().to_string()
    };
    println!("{tag} {}", text.trim_end_matches(['\r', '\n']));
}

/// Print an error and exit with status 1.
pub fn fatal(msg: &str) -> ! {
    error(msg);
    std::process::exit(1);
}
