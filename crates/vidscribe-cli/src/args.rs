use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "vidscribe")]
#[command(version)]
#[command(about = "Convert a video to compressed audio and submit it for transcription")]
pub struct Cli {
    /// Print debug information about each pipeline step
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert a video to audio, upload it and request its transcription
    Submit(SubmitArgs),

    /// Show or change stored settings
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct SubmitArgs {
    /// MP4 video to submit
    pub video: PathBuf,

    /// Keywords mentioned in the video, comma separated
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Ask for the transcription prompt before submitting
    #[arg(short, long, conflicts_with = "prompt")]
    pub interactive: bool,

    /// Override the API URL for this run
    #[arg(long)]
    pub api_url: Option<String>,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Base URL of the video API
    #[arg(long)]
    pub api_url: Option<String>,

    /// Path to the ffmpeg program
    #[arg(long)]
    pub ffmpeg_path: Option<String>,

    /// Request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Print the current settings
    #[arg(long)]
    pub show: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_submit() {
        let cli = Cli::parse_from(["vidscribe", "-v", "submit", "talk.mp4", "--prompt", "rust"]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Submit(args) => {
                assert_eq!(args.video, PathBuf::from("talk.mp4"));
                assert_eq!(args.prompt.as_deref(), Some("rust"));
                assert!(!args.interactive);
            }
            _ => panic!("expected submit"),
        }
    }

    #[test]
    fn test_prompt_conflicts_with_interactive() {
        let result =
            Cli::try_parse_from(["vidscribe", "submit", "a.mp4", "-i", "--prompt", "x"]);
        assert!(result.is_err());
    }
}
