use std::{
    io::{BufRead, Write},
    path::PathBuf,
    str::FromStr,
};

use anyhow::bail;
use clap::{Parser, Subcommand};
use log::{LevelFilter, debug};
use notekeeper_core::{
    AskOutcome, NoteKeeper,
    llmclients::{ModelChoice, gemini::GeminiClient},
    render::{RenderOptions, render_with},
    session::SkipReason,
    settings::NoteKeeperSettings,
    templates::{self, KEYWORDS_ID},
    transform::TransformOutcome,
};

mod input;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Settings file, defaults to ~/.notekeeper.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the available templates
    Templates,
    /// Run one template over a note and print the result
    Transform {
        #[arg(short, long, default_value = templates::FORMAT_ID)]
        template: String,
        /// Read the note from this file instead of stdin
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Comma separated keywords for the keywords template
        #[arg(short, long)]
        keywords: Option<String>,
        /// Highlight color for the keywords template
        #[arg(short, long)]
        color: Option<String>,
        #[arg(short, long)]
        model: Option<String>,
        /// Print rendered HTML instead of markdown
        #[arg(long)]
        html: bool,
        /// With --html, turn single newlines into line breaks
        #[arg(long)]
        hard_breaks: bool,
    },
    /// Ask questions about a note, one per line on stdin
    Chat {
        #[arg(short, long)]
        file: Option<PathBuf>,
        #[arg(short, long)]
        model: Option<String>,
    },
    /// Render markdown to HTML without calling the service
    Render {
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Turn single newlines into line breaks
        #[arg(long)]
        hard_breaks: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => NoteKeeperSettings::load_from(path)?,
        None => NoteKeeperSettings::load_from_disk()?,
    };

    env_logger::Builder::new()
        .filter(
            Some("notekeeper"),
            LevelFilter::from_str(&settings.log_level).unwrap_or(LevelFilter::Info),
        )
        .parse_default_env()
        .init();

    match cli.command {
        Commands::Templates => {
            for template in templates::templates_list() {
                let extra = if template.requires_extra {
                    " (needs --keywords)"
                } else {
                    ""
                };
                println!("{:<10} {:<16} {}{}", template.id, template.name, template.icon, extra);
            }
        }
        Commands::Transform {
            template,
            file,
            keywords,
            color,
            model,
            html,
            hard_breaks,
        } => {
            let note = input::read_note(file.as_deref())?;
            let mut keeper = build_keeper(&settings, model.as_deref())?;
            keeper.edit_note(note);

            let outcome = if template == KEYWORDS_ID {
                keeper.open_keyword_form();
                keeper.set_keyword_input(keywords.unwrap_or_default());
                keeper.set_keyword_color(color.unwrap_or_else(|| settings.keyword_color.clone()));
                keeper.submit_keyword_form().await?
            } else {
                keeper.run_template_id(&template, None).await?
            };

            match outcome {
                TransformOutcome::Applied => {
                    let display = keeper.session().display();
                    if html {
                        print!("{}", render_with(display, &render_options(hard_breaks)));
                    } else {
                        println!("{display}");
                    }
                }
                TransformOutcome::EmptyResponse => {
                    eprintln!("The model returned no text, nothing to show");
                }
                TransformOutcome::Skipped(reason) => bail!(skip_message(reason)),
            }
        }
        Commands::Chat { file, model } => {
            let mut keeper = build_keeper(&settings, model.as_deref())?;
            if let Some(path) = file {
                keeper.edit_note(input::read_note(Some(path.as_path()))?);
            }
            chat_loop(&mut keeper).await?;
        }
        Commands::Render { file, hard_breaks } => {
            let markdown = input::read_note(file.as_deref())?;
            print!("{}", render_with(markdown, &render_options(hard_breaks)));
        }
    }

    Ok(())
}

fn build_keeper(
    settings: &NoteKeeperSettings,
    model: Option<&str>,
) -> anyhow::Result<NoteKeeper<GeminiClient>> {
    let client = GeminiClient::from_env(&settings.api_key_env, &settings.endpoint)?;
    let mut options = settings.request_options();
    if let Some(model) = model {
        options.model = ModelChoice::from_str(model)?;
    }
    debug!("Using model {} ({})", options.model.label(), options.model);
    Ok(NoteKeeper::with_options(client, options))
}

async fn chat_loop(keeper: &mut NoteKeeper<GeminiClient>) -> anyhow::Result<()> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    for line in stdin.lock().lines() {
        let question = line?;
        match keeper.ask(&question).await? {
            AskOutcome::Skipped(_) => continue,
            AskOutcome::Failed(e) => debug!("Chat failed: {}", e),
            AskOutcome::Answered => {}
        }
        if let Some(turn) = keeper.session().transcript().turns().last() {
            writeln!(stdout, "{}\n", turn.text())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn render_options(hard_line_breaks: bool) -> RenderOptions {
    RenderOptions {
        hard_line_breaks,
        ..Default::default()
    }
}

fn skip_message(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::EmptySource => "The note is empty, nothing to transform",
        SkipReason::MissingKeywords => "The keywords template needs --keywords",
        SkipReason::EmptyQuestion => "Empty question",
    }
}
