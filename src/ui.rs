// UI layer: the main menu loop plus the small terminal helpers shared by the
// test cycle and defect modules (banner, spinners, colored notices, tables).
// Prompts use `dialoguer`, colors come from `crossterm`.

use crate::api::ApiClient;
use crate::{defect, test_cycle};
use anyhow::Result;
use crossterm::cursor::MoveTo;
use crossterm::style::Stylize;
use crossterm::terminal::{Clear, ClearType};
use dialoguer::{Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::time::Duration;
use tracing::{error, info};

pub const APP_TITLE: &str = "Kualitee Management Tool";

/// Entries of the main menu. Adding a module means adding a variant here
/// and an arm in `main_menu`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    TestCycle,
    Defect,
    Exit,
}

impl MenuChoice {
    pub const ALL: [MenuChoice; 3] = [MenuChoice::TestCycle, MenuChoice::Defect, MenuChoice::Exit];

    /// Number the user types to pick this entry.
    pub fn key(&self) -> &'static str {
        match self {
            MenuChoice::TestCycle => "1",
            MenuChoice::Defect => "2",
            MenuChoice::Exit => "0",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MenuChoice::TestCycle => "Test Cycle Management",
            MenuChoice::Defect => "Defect Management",
            MenuChoice::Exit => "Exit",
        }
    }

    pub fn parse(input: &str) -> Option<MenuChoice> {
        let input = input.trim();
        MenuChoice::ALL.into_iter().find(|c| c.key() == input)
    }
}

/// Main interactive menu. Loops until the user picks "0". A failing module
/// prints its error and hands control back here; only a broken terminal
/// (the menu prompt itself failing) ends the loop with an error.
pub fn main_menu(api: &ApiClient) -> Result<()> {
    loop {
        header(None);
        println!("\n{}\n", "Select Module".bold());
        for choice in MenuChoice::ALL {
            println!("{}. {}", choice.key(), choice.label());
        }
        println!();

        let choice = prompt_menu_choice()?;
        info!("Main menu selection: {:?}", choice);
        let outcome = match choice {
            MenuChoice::TestCycle => test_cycle::run(api),
            MenuChoice::Defect => defect::run(api),
            MenuChoice::Exit => {
                println!("\n{}", "Goodbye!".yellow());
                return Ok(());
            }
        };
        if let Err(e) = outcome {
            error!("{} failed: {:#}", choice.label(), e);
            print_error(&format!("Error: {:#}", e));
            pause();
        }
    }
}

/// Read a menu number. Anything that is not a listed key is rejected by
/// the validator and the user is asked again.
fn prompt_menu_choice() -> Result<MenuChoice> {
    let input: String = Input::new()
        .with_prompt("Enter your choice")
        .validate_with(|s: &String| -> Result<(), &'static str> {
            match MenuChoice::parse(s) {
                Some(_) => Ok(()),
                None => Err("Please enter 1, 2 or 0"),
            }
        })
        .interact_text()?;
    MenuChoice::parse(&input).ok_or_else(|| anyhow::anyhow!("invalid menu choice '{}'", input))
}

/// Clear the screen and print the banner, with an optional context line.
pub fn header(context: Option<&str>) {
    let _ = crossterm::execute!(io::stdout(), Clear(ClearType::All), MoveTo(0, 0));
    let rule = "=".repeat(APP_TITLE.len() + 4);
    println!("{}", rule.as_str().cyan());
    println!("  {}", APP_TITLE.bold().cyan());
    println!("{}", rule.as_str().cyan());
    if let Some(ctx) = context {
        println!("{}", ctx.yellow());
    }
}

/// Spinner shown while a request is in flight. Call `finish_and_clear`
/// once the request returns.
pub fn spinner(msg: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(msg.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Block until the user presses Enter.
pub fn pause() {
    print!("\nPress Enter to continue...");
    let _ = io::stdout().flush();
    let mut line = String::new();
    let _ = io::stdin().lock().read_line(&mut line);
}

/// Message shown to the user after an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Warning(String),
    Failure(String),
}

impl Notice {
    pub fn text(&self) -> &str {
        match self {
            Notice::Success(t) | Notice::Warning(t) | Notice::Failure(t) => t.as_str(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Notice::Success(_))
    }

    pub fn print(&self) {
        match self {
            Notice::Success(t) => print_success(t),
            Notice::Warning(t) => print_warning(t),
            Notice::Failure(t) => print_error(t),
        }
    }
}

/// The three closing count lines of a batch run.
pub fn batch_totals(succeeded: usize, failed: usize, skipped: usize) -> [Notice; 3] {
    [
        Notice::Success(format!("Success: {}", succeeded)),
        Notice::Failure(format!("Failed: {}", failed)),
        Notice::Warning(format!("Skipped: {}", skipped)),
    ]
}

pub fn print_success(msg: &str) {
    println!("{}", format!("✓ {}", msg).green());
}

pub fn print_warning(msg: &str) {
    println!("{}", msg.yellow());
}

pub fn print_error(msg: &str) {
    println!("{}", format!("✗ {}", msg).red());
}

pub fn print_info(msg: &str) {
    println!("{}", msg.blue());
}

/// Prompt for free text; empty input yields `None`.
pub fn prompt_optional(prompt: &str) -> Result<Option<String>> {
    let value: String = Input::new()
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()?;
    let value = value.trim().to_string();
    Ok((!value.is_empty()).then_some(value))
}

/// Keyboard-driven pick from `items`; Esc or `q` returns `None`.
pub fn pick(prompt: &str, items: &[String]) -> Result<Option<usize>> {
    if items.is_empty() {
        return Ok(None);
    }
    let choice = Select::new()
        .with_prompt(prompt)
        .items(items)
        .default(0)
        .interact_opt()?;
    Ok(choice)
}

/// Strip artifacts terminals add when a file is dragged in: surrounding
/// whitespace, a leading PowerShell `& ` and wrapping quotes.
pub fn clean_path(input: &str) -> String {
    let mut s = input.trim();
    if let Some(rest) = s.strip_prefix("& ") {
        s = rest.trim_start();
    }
    s.trim_matches('"').trim_matches('\'').to_string()
}

/// Shorten `s` to at most `max` characters by cutting out the middle.
pub fn ellipsize_middle(s: &str, max: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max || max < 5 {
        return s.to_string();
    }
    let keep = (max - 3) / 2;
    let head: String = chars[..keep].iter().collect();
    let tail: String = chars[chars.len() - keep..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Render rows as a left-aligned text table with a header rule.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut out = String::new();
    out.push_str(&format_row(headers.iter().copied(), &widths));
    out.push('\n');
    out.push_str(
        &widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    out.push('\n');
    for row in rows {
        out.push_str(&format_row(row.iter().map(String::as_str), &widths));
        out.push('\n');
    }
    out
}

fn format_row<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    cells
        .zip(widths)
        .map(|(cell, w)| format!("{:<width$}", cell, width = *w))
        .collect::<Vec<_>>()
        .join(" | ")
        .trim_end()
        .to_string()
}

pub fn print_table(title: Option<&str>, headers: &[&str], rows: &[Vec<String>]) {
    if let Some(title) = title {
        println!("\n{}", title.bold().magenta());
    }
    print!("{}", render_table(headers, rows));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_parses_listed_keys_only() {
        assert_eq!(MenuChoice::parse("1"), Some(MenuChoice::TestCycle));
        assert_eq!(MenuChoice::parse(" 2 "), Some(MenuChoice::Defect));
        assert_eq!(MenuChoice::parse("0"), Some(MenuChoice::Exit));
        assert_eq!(MenuChoice::parse("9"), None);
        assert_eq!(MenuChoice::parse(""), None);
        assert_eq!(MenuChoice::parse("one"), None);
    }

    #[test]
    fn menu_keys_are_unique() {
        for a in MenuChoice::ALL {
            assert_eq!(MenuChoice::parse(a.key()), Some(a));
        }
    }

    #[test]
    fn clean_path_strips_drag_and_drop_artifacts() {
        assert_eq!(clean_path("  /tmp/a.png \n"), "/tmp/a.png");
        assert_eq!(clean_path("& 'C:\\Shots\\a b.png'"), "C:\\Shots\\a b.png");
        assert_eq!(clean_path("\"/tmp/x.pdf\""), "/tmp/x.pdf");
    }

    #[test]
    fn ellipsize_keeps_both_ends() {
        let long = "a".repeat(30) + &"b".repeat(30);
        let out = ellipsize_middle(&long, 50);
        assert_eq!(out.chars().count(), 49);
        assert!(out.starts_with("aaaa"));
        assert!(out.ends_with("bbbb"));
        assert!(out.contains("..."));
        assert_eq!(ellipsize_middle("short", 50), "short");
    }

    #[test]
    fn table_columns_are_aligned() {
        let rendered = render_table(
            &["#", "Name"],
            &[
                vec!["1".into(), "Login".into()],
                vec!["10".into(), "Checkout flow".into()],
            ],
        );
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "#  | Name");
        assert_eq!(lines[1], "---+--------------");
        assert_eq!(lines[2], "1  | Login");
        assert_eq!(lines[3], "10 | Checkout flow");
    }

    #[test]
    fn notice_success_flag() {
        assert!(Notice::Success("ok".into()).is_success());
        assert!(!Notice::Failure("HTTP 404".into()).is_success());
    }

    #[test]
    fn batch_totals_share_one_format() {
        let lines = batch_totals(3, 1, 2);
        let texts: Vec<&str> = lines.iter().map(Notice::text).collect();
        assert_eq!(texts, ["Success: 3", "Failed: 1", "Skipped: 2"]);
        assert!(lines[0].is_success());
        assert!(matches!(lines[2], Notice::Warning(_)));
    }
}
