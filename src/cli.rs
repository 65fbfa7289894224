use std::error::Error;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use atty::Stream;
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use iluto_rs::client::CompletionSource;
use iluto_rs::gateway::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE};
use iluto_rs::logging::{self, LogFormat};
use iluto_rs::upstream::DEFAULT_ENDPOINT;
use iluto_rs::view::{NO_INGREDIENTS, NO_INSTRUCTIONS, RecipeView};
use iluto_rs::{
    DEFAULT_RECIPE_COUNT, Gateway, GatewayConfig, GroqClient, IngredientList, Recipe,
    RecipeService, RemoteGateway, Shape, Suggestion, Suggestions, normalize,
};
use serde_json::json;
use termimad::{FmtText, MadSkin, terminal_size};

#[derive(Parser, Debug)]
#[command(
    name = "iluto-rs",
    about = "Recipe ideas from the ingredients you already have",
    version
)]
pub struct Cli {
    /// Emit JSON instead of formatted recipes.
    #[arg(long, global = true)]
    json: bool,

    /// Write logs to stderr as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the web front end and the completion gateway.
    #[cfg(feature = "web")]
    Serve {
        /// Address to bind.
        #[arg(long, env = "ILUTO_ADDR", default_value = "127.0.0.1:8080")]
        addr: std::net::SocketAddr,
        /// Public base URL used in canonical links.
        #[arg(long, env = "ILUTO_BASE_URL")]
        base_url: Option<String>,
        /// Recipes requested per ingredient search.
        #[arg(long, default_value_t = DEFAULT_RECIPE_COUNT)]
        recipes: usize,
        /// Do not serve /api-docs/openapi.json.
        #[arg(long)]
        no_openapi: bool,
        #[command(flatten)]
        upstream: UpstreamArgs,
    },
    /// Suggest recipes for a set of ingredients.
    Suggest {
        /// Ingredients on hand.
        #[arg(required = true)]
        ingredients: Vec<String>,
        /// Number of recipes to ask for.
        #[arg(short, long, default_value_t = DEFAULT_RECIPE_COUNT)]
        count: usize,
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Show the featured dish for today or a given date.
    Featured {
        /// Date in YYYY-MM-DD form.
        #[arg(long)]
        date: Option<NaiveDate>,
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Extract recipes from raw model output (stdin when no file is given).
    Normalize {
        file: Option<PathBuf>,
        /// Expect a single featured recipe instead of a list.
        #[arg(long)]
        featured: bool,
        /// Recipe count used when padding with fallback recipes.
        #[arg(short, long, default_value_t = DEFAULT_RECIPE_COUNT)]
        count: usize,
    },
}

#[derive(Args, Debug, Clone)]
struct UpstreamArgs {
    /// Credential for the chat-completion endpoint.
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    /// Chat-completion endpoint.
    #[arg(long, env = "ILUTO_UPSTREAM_URL", default_value = DEFAULT_ENDPOINT)]
    upstream_url: String,
    #[arg(long, env = "ILUTO_MODEL", default_value = DEFAULT_MODEL)]
    model: String,
    #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
    temperature: f32,
    #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
    max_tokens: u32,
}

impl UpstreamArgs {
    fn into_config(self) -> GatewayConfig {
        GatewayConfig {
            api_key: self.api_key.filter(|key| !key.trim().is_empty()),
            endpoint: self.upstream_url,
            model: self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[derive(Args, Debug, Clone)]
struct SourceArgs {
    /// Use a deployed gateway instead of calling the upstream directly.
    #[arg(long, env = "ILUTO_GATEWAY_URL")]
    gateway_url: Option<String>,
    #[command(flatten)]
    upstream: UpstreamArgs,
}

enum Source {
    Remote(RemoteGateway),
    Local(Gateway<GroqClient>),
}

impl SourceArgs {
    fn into_source(self) -> Result<Source, Box<dyn Error>> {
        if let Some(url) = self.gateway_url {
            return Ok(Source::Remote(RemoteGateway::new(url)));
        }
        let config = self.upstream.into_config();
        if config.api_key.is_none() {
            return Err("no API key: set GROQ_API_KEY, pass --api-key, or use --gateway-url".into());
        }
        let client = GroqClient::new(config.endpoint.clone());
        Ok(Source::Local(Gateway::new(config, client)))
    }
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    logging::init(format)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    match cli.command {
        #[cfg(feature = "web")]
        Command::Serve {
            addr,
            base_url,
            recipes,
            no_openapi,
            upstream,
        } => {
            let config = iluto_rs::web::WebConfig {
                addr,
                enable_openapi: !no_openapi,
                base_url: base_url.unwrap_or_else(|| format!("http://{addr}")),
                recipes_per_search: recipes,
            };
            runtime.block_on(iluto_rs::web::serve(config, upstream.into_config()))?;
            Ok(())
        }
        Command::Suggest {
            ingredients,
            count,
            source,
        } => runtime.block_on(handle_suggest(ingredients, count, source, cli.json)),
        Command::Featured { date, source } => {
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            runtime.block_on(handle_featured(date, source, cli.json))
        }
        Command::Normalize {
            file,
            featured,
            count,
        } => handle_normalize(file, Shape::from_flags(featured, count), cli.json),
    }
}

async fn handle_suggest(
    ingredients: Vec<String>,
    count: usize,
    source: SourceArgs,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let list: IngredientList = ingredients.iter().collect();
    if list.is_empty() {
        return Err("at least one non-blank ingredient is required".into());
    }
    let found = match source.into_source()? {
        Source::Remote(remote) => find_with(remote, count, &list).await,
        Source::Local(local) => find_with(local, count, &list).await,
    };

    if as_json {
        let payload = json!({
            "ingredients": list,
            "recipes": found.value,
            "notice": found.notice,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_notice(found.notice);
        if found.value.is_empty() {
            println!("No recipes found for {}.", list.joined());
        }
        for recipe in &found.value {
            render_markdown(&recipe_markdown(recipe));
        }
    }
    Ok(())
}

async fn find_with<S: CompletionSource>(
    source: S,
    count: usize,
    ingredients: &IngredientList,
) -> Suggestion<Vec<Recipe>> {
    RecipeService::new(source)
        .with_count(count)
        .find_recipes(ingredients)
        .await
}

async fn handle_featured(
    date: NaiveDate,
    source: SourceArgs,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let dish = match source.into_source()? {
        Source::Remote(remote) => RecipeService::new(remote).featured_dish(date).await,
        Source::Local(local) => RecipeService::new(local).featured_dish(date).await,
    };

    if as_json {
        let payload = json!({
            "date": date.to_string(),
            "recipe": dish.value,
            "notice": dish.notice,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_notice(dish.notice);
        render_markdown(&recipe_markdown(&dish.value));
    }
    Ok(())
}

fn handle_normalize(file: Option<PathBuf>, shape: Shape, as_json: bool) -> Result<(), Box<dyn Error>> {
    let raw = match file {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    let normalized = normalize(&raw, shape);
    let extraction = normalized.extraction.label();

    match normalized.suggestions {
        Suggestions::Featured(recipe) => {
            if as_json {
                let payload = json!({ "extraction": extraction, "recipe": recipe });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                eprintln!("extraction: {extraction}");
                render_markdown(&recipe_markdown(&recipe));
            }
        }
        Suggestions::List(recipes) => {
            if as_json {
                let payload = json!({ "extraction": extraction, "recipes": recipes });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                eprintln!("extraction: {extraction} ({} recipes)", recipes.len());
                for recipe in &recipes {
                    render_markdown(&recipe_markdown(recipe));
                }
            }
        }
    }
    Ok(())
}

fn print_notice(notice: Option<&str>) {
    if let Some(notice) = notice {
        eprintln!("note: {notice}");
    }
}

fn recipe_markdown(recipe: &Recipe) -> String {
    let view = RecipeView::new(recipe);
    let mut text = format!(
        "# {}\n\n{}\n\n**{}** · {} · {}\n\n## Ingredients\n\n",
        view.name, view.description, view.difficulty, view.cook_time, view.servings
    );
    if view.has_ingredients() {
        for ingredient in &view.ingredients {
            text.push_str(&format!("* {ingredient}\n"));
        }
    } else {
        text.push_str(&format!("*{NO_INGREDIENTS}*\n"));
    }
    text.push_str("\n## Instructions\n\n");
    if view.has_instructions() {
        for (step, instruction) in view.instructions.iter().enumerate() {
            text.push_str(&format!("{}. {instruction}\n", step + 1));
        }
    } else {
        text.push_str(&format!("*{NO_INSTRUCTIONS}*\n"));
    }
    text
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn markdown_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

fn render_markdown(body: &str) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return;
    }
    if stdout_is_tty() {
        let skin = MadSkin::default();
        let formatted = FmtText::from(&skin, trimmed, Some(markdown_width()));
        println!("{formatted}");
    } else {
        println!("{trimmed}\n");
    }
}
