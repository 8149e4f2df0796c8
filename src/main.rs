use clap::{Parser, Subcommand};
use dotenv::dotenv;
use env_logger::Env;
use std::process::ExitCode;
use std::sync::Arc;
use techsage::{
    error_report, run_terminal, ChatSession, ConfigStore, Configurator, ConfigureArgs, CrewKind,
    Executor, OllamaCli, DEFAULT_MODEL,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Gather and synthesize information with a crew of LLM agents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write the configuration file, preparing the local model when needed.
    Configure {
        #[arg(short, long, default_value = DEFAULT_MODEL)]
        model: String,
        #[arg(long = "openai_api_key", visible_alias = "oak", default_value = "")]
        openai_api_key: String,
        #[arg(long = "google_search_api_key", visible_alias = "gsak", default_value = "")]
        google_search_api_key: String,
        /// "true" to run the model with Ollama.
        #[arg(short, long, default_value = "true")]
        local: String,
        #[arg(short, long, default_value_t = 0)]
        verbose: u8,
        #[arg(long = "model_url", visible_alias = "mu")]
        model_url: Option<String>,
    },
    /// Run a crew, once on `--topic` or interactively.
    Launch {
        #[arg(long, value_enum, default_value_t = CrewKind::TechSage)]
        crew: CrewKind,
        #[arg(long)]
        topic: Option<String>,
    },
}

/// Rewrites the single dash spellings `-oak`, `-gsak` and `-mu` to their long
/// form, which clap would otherwise read as bundled short flags.
fn normalize_args(args: impl IntoIterator<Item = String>) -> Vec<String> {
    args.into_iter()
        .map(|arg| {
            let name = arg.split_once('=').map_or(arg.as_str(), |(name, _)| name);
            match name {
                "-oak" | "-gsak" | "-mu" => format!("-{}", arg),
                _ => arg,
            }
        })
        .collect()
}

async fn configure(args: ConfigureArgs) -> ExitCode {
    let result = async {
        let store = ConfigStore::default_location()?;
        Configurator::new(OllamaCli::new(args.verbose > 0))
            .configure(&store, &args)
            .await
    }
    .await;

    match result {
        Ok(_) => {
            println!(" ✅ Configuration saved");
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!(" ❌ {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn launch(kind: CrewKind, topic: Option<String>) -> ExitCode {
    let loaded = async {
        let store = ConfigStore::default_location()?;
        let configurator = Configurator::new(OllamaCli::new(false));
        let config = store
            .load_or_configure(&configurator, &ConfigureArgs::default())
            .await?;
        Ok::<_, techsage::ConfigError>((store, config))
    }
    .await;
    let (store, config) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            println!(" ❌ {}", e);
            return ExitCode::FAILURE;
        }
    };

    let executor = match Executor::from_config(&config) {
        Ok(executor) => Arc::new(executor),
        Err(e) => {
            println!(" ❌ {}", e);
            return ExitCode::FAILURE;
        }
    };

    match topic {
        Some(topic) => match techsage::run(kind, &topic, &config, executor.as_ref()).await {
            Ok(result) => {
                println!("{}", result);
                ExitCode::SUCCESS
            }
            Err(e) => {
                println!(" ❌ An error occurred during the search:\n{}", error_report(&e));
                ExitCode::FAILURE
            }
        },
        None => {
            let session = ChatSession::new(kind, config, executor);
            match run_terminal(session, &store).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    println!(" ❌ {}", e);
                    ExitCode::FAILURE
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    let cli = Cli::parse_from(normalize_args(std::env::args()));

    let default_level = match &cli.command {
        Command::Configure { verbose, .. } if *verbose > 0 => "debug",
        _ => "info",
    };
    let env = Env::default().filter_or("LOG_LEVEL", default_level);
    env_logger::Builder::from_env(env).init();

    match cli.command {
        Command::Configure {
            model,
            openai_api_key,
            google_search_api_key,
            local,
            verbose,
            model_url,
        } => {
            configure(ConfigureArgs {
                model,
                api_key: openai_api_key,
                search_api_key: google_search_api_key,
                local,
                verbose,
                model_url,
            })
            .await
        }
        Command::Launch { crew, topic } => launch(crew, topic).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(normalize_args(args.iter().map(|arg| arg.to_string())))
    }

    #[test]
    fn test_configure_short_aliases() {
        let cli = parse(&[
            "techsage",
            "configure",
            "-oak",
            "sk-1",
            "-gsak",
            "gs-1",
            "-mu",
            "http://x/v1",
            "-l",
            "false",
        ])
        .expect("should parse");

        match cli.command {
            Command::Configure {
                model,
                openai_api_key,
                google_search_api_key,
                local,
                model_url,
                ..
            } => {
                assert_eq!(model, DEFAULT_MODEL);
                assert_eq!(openai_api_key, "sk-1");
                assert_eq!(google_search_api_key, "gs-1");
                assert_eq!(local, "false");
                assert_eq!(model_url.as_deref(), Some("http://x/v1"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_configure_long_and_inline_forms() {
        let cli = parse(&[
            "techsage",
            "configure",
            "-oak=sk-2",
            "--google_search_api_key",
            "gs-2",
            "-m",
            "phi3",
        ])
        .expect("should parse");

        let Command::Configure {
            model,
            openai_api_key,
            google_search_api_key,
            ..
        } = cli.command
        else {
            panic!("should be configure");
        };
        assert_eq!(model, "phi3");
        assert_eq!(openai_api_key, "sk-2");
        assert_eq!(google_search_api_key, "gs-2");
    }

    #[test]
    fn test_launch_defaults() {
        let cli = parse(&["techsage", "launch", "--topic", "Rust"]).expect("should parse");
        let Command::Launch { crew, topic } = cli.command else {
            panic!("should be launch");
        };
        assert_eq!(crew, CrewKind::TechSage);
        assert_eq!(topic.as_deref(), Some("Rust"));
    }
}
