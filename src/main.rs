use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sitechat::Result;
use sitechat::commands::{build_index, run_chat, run_query, show_config};
use sitechat::config::Config;

#[derive(Parser)]
#[command(name = "sitechat")]
#[command(about = "Crawl a website, index it into a local vector store, and chat with it")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl a website and build the vector index
    Index {
        /// Seed URL to crawl from
        url: String,
        /// Maximum crawl depth (1 indexes only the seed page)
        #[arg(long, default_value_t = 2)]
        depth: usize,
        /// Where to write the index (defaults to the configured location)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Ask a single question against a built index
    Query {
        /// The question to answer
        question: String,
        /// Index file to query (defaults to the configured location)
        #[arg(long)]
        index: Option<PathBuf>,
        /// Conversation history file, read before and rewritten after the turn
        #[arg(long)]
        history: Option<PathBuf>,
    },
    /// Start an interactive chat session over a built index
    Chat {
        /// Index file to query (defaults to the configured location)
        #[arg(long)]
        index: Option<PathBuf>,
    },
    /// Show the active configuration
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Index { url, depth, output } => {
            build_index(&url, depth, output, &config)?;
        }
        Commands::Query {
            question,
            index,
            history,
        } => {
            run_query(&question, index, history, &config)?;
        }
        Commands::Chat { index } => {
            run_chat(index, &config)?;
        }
        Commands::Config => {
            show_config(&config)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["sitechat", "config"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            matches!(parsed.command, Commands::Config);
        }
    }

    #[test]
    fn index_command_with_url() {
        let cli = Cli::try_parse_from(["sitechat", "index", "https://example.com/news/"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Index { url, depth, output } = parsed.command {
                assert_eq!(url, "https://example.com/news/");
                assert_eq!(depth, 2);
                assert_eq!(output, None);
            }
        }
    }

    #[test]
    fn index_command_with_depth_and_output() {
        let cli = Cli::try_parse_from([
            "sitechat",
            "index",
            "https://example.com/news/",
            "--depth",
            "3",
            "--output",
            "/tmp/news.json",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Index { depth, output, .. } = parsed.command {
                assert_eq!(depth, 3);
                assert_eq!(output, Some(PathBuf::from("/tmp/news.json")));
            }
        }
    }

    #[test]
    fn query_command_with_history() {
        let cli = Cli::try_parse_from([
            "sitechat",
            "query",
            "What are the recent news on US mortgage rates?",
            "--history",
            "session.json",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Query {
                question, history, ..
            } = parsed.command
            {
                assert_eq!(question, "What are the recent news on US mortgage rates?");
                assert_eq!(history, Some(PathBuf::from("session.json")));
            }
        }
    }

    #[test]
    fn chat_command() {
        let cli = Cli::try_parse_from(["sitechat", "chat"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            matches!(parsed.command, Commands::Chat { .. });
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["sitechat", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["sitechat", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
