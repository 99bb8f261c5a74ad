use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "book_drafter", version, about = "Drafts a multi-chapter note book with Gemini")]
pub struct Args {
    /// TOML configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Overrides `data_dir` from the configuration.
    #[arg(long)]
    pub data_dir: Option<String>,

    #[arg(long, default_value_t = false)]
    pub debug: bool,

    /// Record every model request and raw response under the data directory.
    #[arg(long, default_value_t = false)]
    pub save_artifacts: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate an outline for a topic and work on it interactively.
    Draft(DraftArgs),
    /// Inspect chapters saved by earlier sessions.
    Saved {
        #[command(subcommand)]
        action: SavedAction,
    },
}

#[derive(ClapArgs, Debug, Clone)]
pub struct DraftArgs {
    #[arg(long)]
    pub topic: String,

    /// Optional writing direction.
    #[arg(long)]
    pub direction: Option<String>,

    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u32).range(3..=12))]
    pub chapters: u32,

    /// Reader level: 1 novice .. 5 domain expert.
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(1..=5))]
    pub difficulty: u8,

    /// Skip the thinking budget for outline generation and chapter writing.
    #[arg(long, default_value_t = false)]
    pub no_thinking: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SavedAction {
    List,
    Show { id: String },
    Delete { id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_defaults() {
        let args = Args::try_parse_from(["book_drafter", "draft", "--topic", "持続可能な経営"]).unwrap();
        let Command::Draft(draft) = args.command else {
            panic!("expected draft");
        };
        assert_eq!(draft.chapters, 5);
        assert_eq!(draft.difficulty, 3);
        assert!(!draft.no_thinking);
        assert!(draft.direction.is_none());
    }

    #[test]
    fn chapter_count_is_range_checked() {
        for bad in ["2", "13"] {
            let parsed = Args::try_parse_from(["book_drafter", "draft", "--topic", "t", "--chapters", bad]);
            assert!(parsed.is_err(), "{bad} accepted");
        }
        assert!(Args::try_parse_from(["book_drafter", "draft", "--topic", "t", "--difficulty", "6"]).is_err());
    }

    #[test]
    fn saved_subcommands() {
        let args = Args::try_parse_from(["book_drafter", "--data-dir", "/tmp/x", "saved", "delete", "1-0"]).unwrap();
        assert_eq!(args.data_dir.as_deref(), Some("/tmp/x"));
        assert!(matches!(args.command, Command::Saved { action: SavedAction::Delete { ref id } } if id == "1-0"));
    }
}
