mod login;

use std::path::PathBuf;
use std::sync::Arc;

use blogfront::callback::{CallbackView, complete_redirect};
use blogfront::config::{CognitoConfig, ConfigError, SessionStrategy, SiteConfig};
use blogfront::content::{ContentClient, ContentError, NewPost, PostStatus};
use blogfront::flow::AuthFlow;
use blogfront::identity::cognito::CognitoProvider;
use blogfront::identity::{AuthError, IdentityProvider};
use blogfront::session::{LocalSessionStore, ProviderSessionStore, SessionError, SessionStore};
use blogfront::storage::{FileStorage, KeyValueStorage, MemoryStorage};
use blogfront::watch::AuthWatch;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::login::{LoginOutcome, PromptError, TerminalPrompter};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error("io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to read {path}: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("not signed in; run `blog login` first")]
    NotSignedIn,
    #[error("no blog post with slug '{0}'")]
    PostNotFound(String),
    #[error("sign-in abandoned")]
    Abandoned,
    #[error("{0} requires --strategy {1}")]
    WrongStrategy(&'static str, &'static str),
}

#[derive(Parser, Debug)]
#[command(name = "blog", about = "Blog admin: sign-in, session status, and posts")]
struct Cli {
    #[arg(long, global = true, env = "BLOG_API_URL")]
    api_url: Option<String>,

    #[arg(long, global = true, env = "BLOG_SITE_ORIGIN")]
    origin: Option<String>,

    #[arg(long, global = true, env = "BLOG_SESSION_STRATEGY")]
    strategy: Option<SessionStrategy>,

    #[arg(long, global = true, env = "BLOG_STATE_DIR")]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in interactively.
    Login,
    /// Print the hosted login page address.
    LoginUrl,
    /// Import tokens from the hosted login redirect address.
    Callback { url: String },
    Logout,
    Status {
        /// Keep printing changes until Ctrl-C.
        #[arg(long)]
        watch: bool,
    },
    Whoami,
    Posts(PostsCommand),
    About,
}

#[derive(Args, Debug)]
struct PostsCommand {
    #[command(subcommand)]
    command: PostsSubcommand,
}

#[derive(Subcommand, Debug)]
enum PostsSubcommand {
    List,
    Show { slug: String },
    Create(CreateArgs),
}

#[derive(Args, Debug)]
struct CreateArgs {
    #[arg(long)]
    title: String,
    #[arg(long)]
    author: String,
    #[arg(long)]
    summary: String,
    /// Markdown file with the post body.
    #[arg(long)]
    content_file: PathBuf,
    /// Derived from the title when omitted.
    #[arg(long)]
    slug: Option<String>,
    #[arg(long = "tag")]
    tags: Vec<String>,
    #[arg(long, default_value = "draft")]
    status: PostStatus,
    #[arg(long)]
    image_key: Option<String>,
}

/// Everything a command may need, built once at startup.
struct App {
    site: SiteConfig,
    cognito: Option<CognitoConfig>,
    provider: Option<Arc<CognitoProvider>>,
    store: Arc<dyn SessionStore>,
}

impl App {
    fn build(cli: &Cli) -> Result<Self, CliError> {
        let mut site = SiteConfig::from_env()?;
        if let Some(api_url) = &cli.api_url {
            site.api_url = api_url.trim_end_matches('/').to_owned();
        }
        if let Some(origin) = &cli.origin {
            site.origin = origin.trim_end_matches('/').to_owned();
        }
        if let Some(strategy) = cli.strategy {
            site.strategy = strategy;
        }
        if let Some(state_dir) = &cli.state_dir {
            site.state_dir.clone_from(state_dir);
        }

        let storage: Arc<dyn KeyValueStorage> = Arc::new(FileStorage::new(site.state_dir.clone()));
        match site.strategy {
            SessionStrategy::Local => {
                let cognito = match CognitoConfig::from_env() {
                    Ok(cognito) => Some(cognito),
                    Err(e) => {
                        tracing::debug!(error = %e, "identity provider not configured");
                        None
                    }
                };
                // The self-managed session is the only durable state here.
                let provider = match &cognito {
                    Some(cognito) => {
                        Some(Arc::new(CognitoProvider::new(cognito, site.timeouts, Arc::new(MemoryStorage::new()))?))
                    }
                    None => None,
                };
                let store: Arc<dyn SessionStore> = Arc::new(LocalSessionStore::new(storage));
                Ok(Self { site, cognito, provider, store })
            }
            SessionStrategy::Provider => {
                let cognito = CognitoConfig::from_env()?;
                let provider = Arc::new(CognitoProvider::new(&cognito, site.timeouts, storage)?);
                let store: Arc<dyn SessionStore> = Arc::new(ProviderSessionStore::new(provider.clone()));
                Ok(Self { site, cognito: Some(cognito), provider: Some(provider), store })
            }
        }
    }

    fn cognito(&self) -> Result<&CognitoConfig, CliError> {
        self.cognito.as_ref().ok_or(CliError::Config(ConfigError::Missing("COGNITO_CLIENT_ID")))
    }

    fn provider(&self) -> Result<Arc<CognitoProvider>, CliError> {
        self.provider.clone().ok_or(CliError::Config(ConfigError::Missing("COGNITO_CLIENT_ID")))
    }

    fn content(&self) -> Result<ContentClient, CliError> {
        Ok(ContentClient::new(&self.site.api_url, self.site.timeouts)?)
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let app = App::build(&cli)?;

    match cli.command {
        Command::Login => run_login(&app).await,
        Command::LoginUrl => run_login_url(&app),
        Command::Callback { url } => run_callback(&app, &url).await,
        Command::Logout => run_logout(&app).await,
        Command::Status { watch } => run_status(&app, watch).await,
        Command::Whoami => run_whoami(&app).await,
        Command::Posts(posts) => match posts.command {
            PostsSubcommand::List => run_posts_list(&app).await,
            PostsSubcommand::Show { slug } => run_posts_show(&app, &slug).await,
            PostsSubcommand::Create(args) => run_posts_create(&app, args).await,
        },
        Command::About => run_about(&app).await,
    }
}

// =============================================================================
// SESSION
// =============================================================================

async fn run_login(app: &App) -> Result<(), CliError> {
    if app.store.is_authenticated().await {
        println!("Already signed in.");
        return Ok(());
    }

    let provider = app.provider()?;
    let flow = AuthFlow::new(provider, app.store.clone());
    match login::run(&flow, &mut TerminalPrompter).await? {
        LoginOutcome::SignedIn => {
            if !app.store.is_authenticated().await {
                return Err(CliError::NotSignedIn);
            }
            println!("Signed in.");
            Ok(())
        }
        LoginOutcome::Abandoned => Err(CliError::Abandoned),
    }
}

fn run_login_url(app: &App) -> Result<(), CliError> {
    let url = app.cognito()?.hosted_login_url(&app.site.origin)?;
    println!("{url}");
    Ok(())
}

async fn run_callback(app: &App, raw: &str) -> Result<(), CliError> {
    if app.site.strategy != SessionStrategy::Local {
        return Err(CliError::WrongStrategy("callback", "local"));
    }
    let location = Url::parse(raw)?;
    let outcome = complete_redirect(&location, app.store.as_ref()).await;
    println!("{}", outcome.location);
    match outcome.view {
        CallbackView::Authenticated => println!("Signed in."),
        CallbackView::Unauthenticated => println!("Not signed in."),
    }
    Ok(())
}

async fn run_logout(app: &App) -> Result<(), CliError> {
    app.store.clear_session().await?;
    println!("Signed out.");
    if app.site.strategy == SessionStrategy::Local {
        if let Some(cognito) = &app.cognito {
            match cognito.hosted_logout_url(&app.site.origin) {
                Ok(url) => println!("End the hosted session at: {url}"),
                Err(e) => tracing::debug!(error = %e, "no hosted logout page"),
            }
        }
    }
    Ok(())
}

fn status_line(authenticated: bool) -> &'static str {
    if authenticated { "authenticated" } else { "not authenticated" }
}

async fn run_status(app: &App, watch: bool) -> Result<(), CliError> {
    if !watch {
        println!("{}", status_line(app.store.is_authenticated().await));
        return Ok(());
    }

    let watcher = AuthWatch::spawn(app.store.clone(), app.site.poll_interval).await;
    let mut rx = watcher.subscribe();
    println!("{}", status_line(*rx.borrow_and_update()));
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("{}", status_line(*rx.borrow_and_update()));
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
        }
    }
    watcher.stop();
    Ok(())
}

async fn run_whoami(app: &App) -> Result<(), CliError> {
    if app.site.strategy != SessionStrategy::Provider {
        return Err(CliError::WrongStrategy("whoami", "provider"));
    }
    let user = app.provider()?.current_user().await?;
    println!("{}", user.username);
    for (name, value) in &user.attributes {
        println!("  {name}: {value}");
    }
    Ok(())
}

// =============================================================================
// CONTENT
// =============================================================================

async fn run_posts_list(app: &App) -> Result<(), CliError> {
    let cards = app.content()?.list_cards().await?;
    if cards.is_empty() {
        println!("No posts.");
    }
    for card in cards {
        println!("{}\t{}\t{}\t{}", card.slug, card.publish_date, card.author, card.title);
    }
    Ok(())
}

async fn run_posts_show(app: &App, slug: &str) -> Result<(), CliError> {
    let Some(post) = app.content()?.fetch_post(slug).await? else {
        return Err(CliError::PostNotFound(slug.to_owned()));
    };
    println!("{}", post.card.title);
    println!("by {} on {}", post.card.author, post.card.publish_date);
    if !post.card.tags.is_empty() {
        println!("tags: {}", post.card.tags.join(", "));
    }
    println!();
    println!("{}", post.content);
    Ok(())
}

async fn run_posts_create(app: &App, args: CreateArgs) -> Result<(), CliError> {
    if !app.store.is_authenticated().await {
        return Err(CliError::NotSignedIn);
    }
    let content = std::fs::read_to_string(&args.content_file)
        .map_err(|source| CliError::ReadFile { path: args.content_file.clone(), source })?;

    let mut post = NewPost {
        slug: args.slug.unwrap_or_default(),
        title: args.title,
        author: args.author,
        summary: args.summary,
        content,
        status: args.status,
        image_key: args.image_key,
        ..NewPost::default()
    };
    for tag in &args.tags {
        post.add_tag(tag);
    }
    post.ensure_slug();

    let created = app.content()?.create_post(app.store.as_ref(), &post).await?;
    println!("Blog post \"{}\" created successfully as {}!", post.title, created.status);
    Ok(())
}

async fn run_about(app: &App) -> Result<(), CliError> {
    let about = app.content()?.fetch_about().await?;
    println!("{}", about.name);
    if !about.bio.is_empty() {
        println!("{}", about.bio);
    }
    for (network, link) in &about.social {
        println!("  {network}: {link}");
    }
    if !about.content.is_empty() {
        println!();
        println!("{}", about.content);
    }
    Ok(())
}
