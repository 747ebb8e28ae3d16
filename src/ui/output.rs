//! Output functions for consistent CLI formatting
//!
//! Fancy output goes through `cliclack`; plain output is one bracketed tag
//! per line so CI logs stay greppable (`[OK]`, `[WARN]`, `[INFO]`).

use super::context::UiContext;
use console::{style, Style, StyledObject};

#[derive(Debug, Clone, Copy)]
enum Level {
    Ok,
    Warn,
    Info,
}

impl Level {
    fn tag(self) -> StyledObject<&'static str> {
        match self {
            Self::Ok => style("[OK]").green(),
            Self::Warn => style("[WARN]").yellow(),
            Self::Info => style("[INFO]").cyan(),
        }
    }

    fn fancy(self, text: String) {
        let _ = match self {
            Self::Ok => cliclack::log::success(text),
            Self::Warn => cliclack::log::warning(text),
            Self::Info => cliclack::log::info(text),
        };
    }
}

/// Trailing part of a step line
#[derive(Debug, Clone, Copy)]
enum Suffix<'a> {
    None,
    /// `message (detail)`
    Detail(&'a str),
    /// `message - hint`
    Hint(&'a str),
}

fn step(ctx: &UiContext, level: Level, message: &str, suffix: Suffix<'_>) {
    if ctx.use_fancy_output() {
        level.fancy(match suffix {
            Suffix::None => message.to_string(),
            Suffix::Detail(detail) => format!("{} ({})", message, style(detail).dim()),
            Suffix::Hint(hint) => format!("{} - {}", message, style(hint).dim()),
        });
        return;
    }

    match suffix {
        Suffix::None => println!("  {} {}", level.tag(), message),
        Suffix::Detail(detail) => println!("  {} {} ({})", level.tag(), message, detail),
        Suffix::Hint(hint) => println!("  {} {} - {}", level.tag(), message, hint),
    }
}

/// Banner at the start of a command
pub fn intro(ctx: &UiContext, title: &str) {
    let title = style(title).cyan().bold();
    if ctx.use_fancy_output() {
        let _ = cliclack::intro(title);
    } else {
        println!("{title}");
    }
}

fn outro(ctx: &UiContext, level: Level, message: &str) {
    if ctx.use_fancy_output() {
        let styled = match level {
            Level::Warn => style(message).yellow().bold(),
            Level::Ok | Level::Info => style(message).green().bold(),
        };
        let _ = cliclack::outro(styled);
    } else {
        println!("{} {}", level.tag(), message);
    }
}

pub fn outro_success(ctx: &UiContext, message: &str) {
    outro(ctx, Level::Ok, message);
}

pub fn outro_warn(ctx: &UiContext, message: &str) {
    outro(ctx, Level::Warn, message);
}

pub fn step_ok(ctx: &UiContext, message: &str) {
    step(ctx, Level::Ok, message, Suffix::None);
}

/// Success step with a parenthesized detail, e.g. the entry key
pub fn step_ok_detail(ctx: &UiContext, message: &str, detail: &str) {
    step(ctx, Level::Ok, message, Suffix::Detail(detail));
}

pub fn step_warn(ctx: &UiContext, message: &str) {
    step(ctx, Level::Warn, message, Suffix::None);
}

/// Warning step followed by what went wrong or what to do about it
pub fn step_warn_hint(ctx: &UiContext, message: &str, hint: &str) {
    step(ctx, Level::Warn, message, Suffix::Hint(hint));
}

pub fn step_info(ctx: &UiContext, message: &str) {
    step(ctx, Level::Info, message, Suffix::None);
}

/// Dimmed secondary line, e.g. one removed blob name
pub fn remark(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        let _ = cliclack::log::remark(message);
    } else {
        println!("    {}", style(message).dim());
    }
}

pub fn key_value(ctx: &UiContext, key: &str, value: &str) {
    let key = if ctx.use_fancy_output() { style(key).dim() } else { style(key) };
    println!("  {key}: {value}");
}

/// Key-value line colored by whether the value is the good outcome
pub fn key_value_status(ctx: &UiContext, key: &str, value: &str, ok: bool) {
    if ctx.use_fancy_output() {
        let value_style = if ok { Style::new().green() } else { Style::new().yellow() };
        println!("  {}: {}", style(key).dim(), value_style.apply_to(value));
    } else {
        let marker = if ok { "[OK]" } else { "[--]" };
        println!("  {marker} {key}: {value}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_non_interactive() {
        let ctx = UiContext::non_interactive();
        intro(&ctx, "depcache");
        step_ok_detail(&ctx, "Stored in local cache", "prod_abc");
        step_warn_hint(&ctx, "Could not store in shared cache", "E170013");
        step_info(&ctx, "shared cache already up to date");
        remark(&ctx, "node_modules_prod_abc.tar.gz");
        key_value_status(&ctx, "shared", "missing", false);
        outro_warn(&ctx, "Dependencies ready, with warnings");
    }

    #[test]
    fn plain_tags_are_distinct() {
        assert!(Level::Ok.tag().to_string().contains("[OK]"));
        assert!(Level::Warn.tag().to_string().contains("[WARN]"));
        assert!(Level::Info.tag().to_string().contains("[INFO]"));
    }
}
