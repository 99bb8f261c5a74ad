use std::io::{self, Write};
use std::time::Duration;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::draft::Draft;
use crate::prompt::chapter_label;
use crate::wire::{ChapterOutline, SavedChapter};

pub fn show_outline(draft: &Draft) {
    let outline = draft.outline();
    println!("\n=== OUTLINE ===");
    if outline.is_empty() {
        println!("(no outline)");
        return;
    }
    let total = outline.len();
    for (i, chapter) in outline.iter().enumerate() {
        let status = if draft.written(&chapter.id).is_some() {
            "[WRITTEN]".green().bold()
        } else {
            "[PENDING]".yellow().bold()
        };
        let saved = if draft.is_saved(&chapter.id) { "  (saved)".cyan().to_string() } else { String::new() };
        println!("{}. {}  {}{}", i + 1, status, chapter_label(i + 1, total, &chapter.title).bold(), saved);
        println!("   {}", chapter.overview.dimmed());
    }
    if draft.is_ready_for_review() {
        println!("\n{}", "All chapters written. `review` polishes the whole book.".green());
    }
    println!();
}

/// Full plan of the chapter at 1-based `position`, plus its text once written.
pub fn show_chapter(draft: &Draft, position: usize) {
    let Some(chapter) = draft.id_at(position).and_then(|id| draft.chapter(id)) else {
        println!("No chapter {position}.");
        return;
    };
    print_outline_entry(chapter, position, draft.outline().len());

    match draft.written(&chapter.id) {
        Some(written) => {
            println!("\n{}", "--- text ---".bold());
            println!("{}", written.content);
            println!("\n{} {}", "intent:".bold(), written.intent);
        }
        None => println!("\n{}", "(not written yet)".dimmed()),
    }
    if let Some(uri) = draft.cover(&chapter.id) {
        println!("{} {} bytes of base64 image data", "cover:".bold(), uri.len());
    }
    println!();
}

fn print_outline_entry(chapter: &ChapterOutline, position: usize, total: usize) {
    println!("\n{}", chapter_label(position, total, &chapter.title).bold());
    println!("{} {}", "id:".dimmed(), chapter.id);
    println!("{} {}", "overview:".bold(), chapter.overview);
    println!("{} {}", "purpose:".bold(), chapter.purpose);
    for (i, section) in chapter.sections.iter().enumerate() {
        println!("  {}. {}", i + 1, section.title.bold());
        println!("     {}", section.summary);
    }
}

pub fn show_saved_list(saved: &[SavedChapter]) {
    println!("\n=== SAVED ===");
    if saved.is_empty() {
        println!("(nothing saved)");
        return;
    }
    for chapter in saved {
        println!("{}  {}", chapter.id.to_string().cyan(), chapter.title.bold());
    }
    println!();
}

pub fn show_saved(chapter: &SavedChapter) {
    println!("\n{}", chapter.title.bold());
    println!("{} {}", "id:".dimmed(), chapter.id);
    println!("{} {}", "overview:".bold(), chapter.overview);
    println!("{} {}", "purpose:".bold(), chapter.purpose);
    println!("\n{}\n", chapter.content);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "error:".red().bold(), message);
}

pub fn print_lint(label: &str, warnings: &[String]) {
    for w in warnings {
        println!("{} {}: {}", "[LINT]".magenta().bold(), label, w);
    }
}

pub fn print_help() {
    let rows = [
        ("outline", "show the outline"),
        ("show N", "show chapter N"),
        ("write N|all", "write one chapter or every unwritten one"),
        ("adjust-outline N TEXT", "revise the plan of chapter N"),
        ("adjust N TEXT", "revise the text of chapter N"),
        ("review", "polish the whole book"),
        ("image N TONE", "cover for chapter N (line-art, watercolor, creative)"),
        ("save N", "save chapter N"),
        ("saved", "list saved chapters"),
        ("delete ID", "delete a saved chapter"),
        ("export [PATH]", "print the book as Markdown or write it to PATH"),
        ("regenerate", "generate a new outline for the same topic"),
        ("quit", "leave"),
    ];
    for (cmd, what) in rows {
        println!("  {:<24} {}", cmd.bold(), what);
    }
}

pub fn spinner(message: impl Into<String>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} {elapsed}") {
        pb.set_style(style);
    }
    pb.set_message(message.into());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

pub fn confirm(prompt: &str) -> bool {
    print!("{} [y/N]: ", prompt);
    let _ = io::stdout().flush();
    let mut s = String::new();
    if io::stdin().read_line(&mut s).is_ok() {
        let ans = s.trim().to_lowercase();
        ans == "y" || ans == "yes"
    } else {
        false
    }
}

/// One line from stdin; `None` at end of input.
pub fn read_command(prompt: &str) -> Option<String> {
    print!("{} ", prompt.bold());
    let _ = io::stdout().flush();
    let mut s = String::new();
    match io::stdin().read_line(&mut s) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(s.trim().to_string()),
    }
}
