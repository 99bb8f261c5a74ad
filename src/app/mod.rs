//! Command-line front end: one-shot `saved` commands and the interactive
//! drafting loop.

use std::path::PathBuf;

use clap::ValueEnum;
use colored::Colorize;
use fs_err as fs;
use tracing::info;
use uuid::Uuid;

use crate::cli::{Args, Command, DraftArgs, SavedAction};
use crate::config::Config;
use crate::draft::{Action, Draft};
use crate::errors::BookError;
use crate::gateway::Gateway;
use crate::log::ArtifactLog;
use crate::provider::make_provider;
use crate::session::Session;
use crate::storage::SavedChapterStore;
use crate::ux;
use crate::wire::{ChapterId, Difficulty, ImageTone, OutlineParams};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteTarget {
    One(usize),
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Outline,
    Show(usize),
    Write(WriteTarget),
    AdjustOutline(usize, String),
    Adjust(usize, String),
    Review,
    Image(usize, ImageTone),
    Save(usize),
    Saved,
    Delete(String),
    Export(Option<PathBuf>),
    Regenerate,
    Help,
    Quit,
}

fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim();
    match s.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (s, ""),
    }
}

fn position(arg: &str) -> Result<usize, String> {
    match arg.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("expected a chapter number, got `{arg}`")),
    }
}

/// Chapter number followed by a non-empty instruction.
fn position_and_text(rest: &str) -> Result<(usize, String), String> {
    let (n, text) = split_word(rest);
    let n = position(n)?;
    if text.is_empty() {
        return Err("missing instruction".into());
    }
    Ok((n, text.to_string()))
}

impl ReplCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let (cmd, rest) = split_word(line);
        let cmd = match cmd {
            "outline" | "ls" => ReplCommand::Outline,
            "show" => ReplCommand::Show(position(rest)?),
            "write" => match rest {
                "all" => ReplCommand::Write(WriteTarget::All),
                n => ReplCommand::Write(WriteTarget::One(position(n)?)),
            },
            "adjust-outline" => {
                let (n, text) = position_and_text(rest)?;
                ReplCommand::AdjustOutline(n, text)
            }
            "adjust" => {
                let (n, text) = position_and_text(rest)?;
                ReplCommand::Adjust(n, text)
            }
            "review" => ReplCommand::Review,
            "image" => {
                let (n, tone) = split_word(rest);
                let tone = ImageTone::from_str(tone, true)
                    .map_err(|_| format!("unknown tone `{tone}` (line-art, watercolor, creative)"))?;
                ReplCommand::Image(position(n)?, tone)
            }
            "save" => ReplCommand::Save(position(rest)?),
            "saved" => ReplCommand::Saved,
            "delete" if !rest.is_empty() => ReplCommand::Delete(rest.to_string()),
            "delete" => return Err("missing saved chapter id".into()),
            "export" => ReplCommand::Export((!rest.is_empty()).then(|| PathBuf::from(rest))),
            "regenerate" => ReplCommand::Regenerate,
            "help" | "?" => ReplCommand::Help,
            "quit" | "exit" | "q" => ReplCommand::Quit,
            other => return Err(format!("unknown command `{other}`; try `help`")),
        };
        Ok(cmd)
    }
}

pub async fn run(args: Args) -> anyhow::Result<()> {
    let mut cfg = Config::load(args.config.as_deref())?;
    if let Some(dir) = &args.data_dir {
        cfg.data_dir = dir.clone();
    }
    if args.save_artifacts {
        cfg.save_artifacts = true;
    }

    match args.command {
        Command::Saved { action } => run_saved(&cfg, action),
        Command::Draft(draft) => run_draft(cfg, draft).await,
    }
}

fn run_saved(cfg: &Config, action: SavedAction) -> anyhow::Result<()> {
    let store = SavedChapterStore::in_dir(cfg.data_path());
    let draft = Draft::with_saved(store.load());
    match action {
        SavedAction::List => ux::show_saved_list(draft.saved()),
        SavedAction::Show { id } => match draft.saved().iter().find(|c| c.id.as_str() == id) {
            Some(chapter) => ux::show_saved(chapter),
            None => ux::print_error(&format!("no saved chapter `{id}`")),
        },
        SavedAction::Delete { id } => {
            let (draft, effects) = draft.update(Action::ChapterDeleted(ChapterId::new(id.as_str())));
            if effects.is_empty() {
                ux::print_error(&format!("no saved chapter `{id}`"));
            } else {
                store.save(draft.saved())?;
                println!("Deleted {id}.");
            }
        }
    }
    Ok(())
}

async fn run_draft(mut cfg: Config, args: DraftArgs) -> anyhow::Result<()> {
    if args.no_thinking {
        cfg.thinking_mode = false;
    }
    let provider = make_provider(&cfg)?;
    let mut gateway = Gateway::new(provider, cfg.thinking_budget);
    if cfg.save_artifacts {
        let log = ArtifactLog::new(&cfg.data_path(), Uuid::new_v4());
        info!(dir = %log.dir().display(), "recording model exchanges");
        gateway = gateway.with_artifacts(log);
    }

    let mut session = Session::open(gateway, SavedChapterStore::in_dir(cfg.data_path()), &cfg);
    let params = OutlineParams {
        topic: args.topic,
        direction: args.direction,
        chapter_count: args.chapters,
        difficulty: Difficulty::try_from(args.difficulty)?,
        thinking: cfg.thinking_mode,
    };

    let pb = ux::spinner("目次案を生成中...");
    let generated = session.generate_outline(params).await;
    pb.finish_and_clear();
    if let Err(e) = generated {
        ux::print_error(&e.user_message());
    }
    ux::show_outline(session.draft());
    println!("Type `help` for commands.");

    while let Some(line) = ux::read_command("book>") {
        if line.is_empty() {
            continue;
        }
        match ReplCommand::parse(&line) {
            Ok(ReplCommand::Quit) => {
                if has_unsaved_work(session.draft()) && !ux::confirm("Written chapters are not saved. Quit anyway?") {
                    continue;
                }
                break;
            }
            Ok(cmd) => execute(&mut session, cmd).await,
            Err(msg) => ux::print_error(&msg),
        }
    }
    Ok(())
}

fn has_unsaved_work(draft: &Draft) -> bool {
    draft
        .outline()
        .iter()
        .any(|c| draft.written(&c.id).is_some() && !draft.is_saved(&c.id))
}

fn chapter_at(session: &Session, n: usize) -> Option<ChapterId> {
    let id = session.draft().id_at(n).cloned();
    if id.is_none() {
        ux::print_error(&format!("no chapter {n}; the outline has {}", session.draft().outline().len()));
    }
    id
}

fn report<T>(result: Result<T, BookError>) -> Option<T> {
    result.map_err(|e| ux::print_error(&e.user_message())).ok()
}

fn label(session: &Session, id: &ChapterId) -> String {
    session
        .draft()
        .chapter(id)
        .map(|c| c.title.clone())
        .unwrap_or_else(|| id.to_string())
}

async fn execute(session: &mut Session, cmd: ReplCommand) {
    match cmd {
        ReplCommand::Outline => ux::show_outline(session.draft()),
        ReplCommand::Show(n) => ux::show_chapter(session.draft(), n),
        ReplCommand::Write(WriteTarget::One(n)) => {
            let Some(id) = chapter_at(session, n) else { return };
            let pb = ux::spinner(format!("第{n}章を執筆中..."));
            let result = session.write_chapter(&id).await;
            pb.finish_and_clear();
            if let Some(warnings) = report(result) {
                println!("{} {}", "[WRITTEN]".green().bold(), label(session, &id));
                ux::print_lint(&label(session, &id), &warnings);
            }
        }
        ReplCommand::Write(WriteTarget::All) => {
            let draft = session.draft();
            let ids: Vec<ChapterId> = draft
                .outline()
                .iter()
                .filter(|c| draft.written(&c.id).is_none())
                .map(|c| c.id.clone())
                .collect();
            if ids.is_empty() {
                println!("Nothing left to write.");
                return;
            }
            let pb = ux::spinner(format!("{}章を執筆中...", ids.len()));
            let outcomes = session.write_chapters(&ids).await;
            pb.finish_and_clear();
            for (id, outcome) in outcomes {
                let name = label(session, &id);
                match outcome {
                    Ok(warnings) => {
                        println!("{} {}", "[WRITTEN]".green().bold(), name);
                        ux::print_lint(&name, &warnings);
                    }
                    Err(e) => println!("{} {}: {}", "[FAILED]".red().bold(), name, e.user_message()),
                }
            }
        }
        ReplCommand::AdjustOutline(n, text) => {
            let Some(id) = chapter_at(session, n) else { return };
            let pb = ux::spinner("構成案を修正中...");
            let result = session.adjust_outline(&id, &text).await;
            pb.finish_and_clear();
            if report(result).is_some() {
                ux::show_chapter(session.draft(), n);
            }
        }
        ReplCommand::Adjust(n, text) => {
            let Some(id) = chapter_at(session, n) else { return };
            let pb = ux::spinner("章を調整中...");
            let result = session.adjust_chapter(&id, &text).await;
            pb.finish_and_clear();
            if let Some(warnings) = report(result) {
                println!("{} {}", "[ADJUSTED]".yellow().bold(), label(session, &id));
                ux::print_lint(&label(session, &id), &warnings);
            }
        }
        ReplCommand::Review => {
            let pb = ux::spinner("全体を推敲中...");
            let result = session.final_review().await;
            pb.finish_and_clear();
            if let Some(count) = report(result) {
                println!("Review applied to {count} chapter(s).");
            }
        }
        ReplCommand::Image(n, tone) => {
            let Some(id) = chapter_at(session, n) else { return };
            let pb = ux::spinner("画像を生成中...");
            let result = session.generate_cover(&id, tone).await;
            pb.finish_and_clear();
            if report(result).is_some() {
                println!("Cover generated for {}.", label(session, &id));
            }
        }
        ReplCommand::Save(n) => {
            let Some(id) = chapter_at(session, n) else { return };
            match report(session.save_chapter(&id)) {
                Some(true) => println!("Saved {} as {id}.", label(session, &id)),
                Some(false) => println!("{} is already saved.", label(session, &id)),
                None => {}
            }
        }
        ReplCommand::Saved => ux::show_saved_list(session.draft().saved()),
        ReplCommand::Delete(id) => {
            let id = ChapterId::new(id);
            match report(session.delete_saved(&id)) {
                Some(true) => println!("Deleted {id}."),
                Some(false) => ux::print_error(&format!("no saved chapter `{id}`")),
                None => {}
            }
        }
        ReplCommand::Export(path) => {
            let Some(book) = session.export() else {
                ux::print_error("nothing to export yet");
                return;
            };
            match path {
                Some(path) => match fs::write(&path, &book) {
                    Ok(()) => println!("Wrote {}.", path.display()),
                    Err(e) => ux::print_error(&BookError::Io(e).user_message()),
                },
                None => println!("{book}"),
            }
        }
        ReplCommand::Regenerate => {
            let pb = ux::spinner("目次案を生成中...");
            let result = session.regenerate().await;
            pb.finish_and_clear();
            if report(result).is_some() {
                ux::show_outline(session.draft());
            }
        }
        ReplCommand::Help => ux::print_help(),
        ReplCommand::Quit => {}
    }
}
